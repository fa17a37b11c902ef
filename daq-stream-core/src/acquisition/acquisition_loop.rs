use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use serde::Serialize;

use crate::acquisition::cancellation::CancellationToken;
use crate::models::config::ScanSelection;
use crate::models::error::DaqError;
use crate::processing::circular_buffer::CircularBuffer;
use crate::session::device::DeviceSession;
use crate::traits::daq_driver::DaqDriver;

/// Running totals for one acquisition run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    pub retrievals: u64,
    /// Retrievals that timed out with no scans.
    pub empty_retrievals: u64,
    pub scans_retrieved: u64,
    pub scans_appended: u64,
}

/// What the acquisition thread hands back when it finishes.
///
/// The session comes back stopped but still holding its handle; the
/// supervisor releases it (or lets it drop).
pub struct AcquisitionExit<D: DaqDriver> {
    pub session: DeviceSession<D>,
    pub stats: AcquisitionStats,
    /// Fatal driver fault that ended the run early, if any.
    pub error: Option<DaqError>,
}

/// Producer side of the pipeline: pulls scans from a streaming session into
/// a circular buffer until cancelled.
///
/// ```text
/// [DeviceSession] → retrieve_scans → append → [CircularBuffer] → snapshot → [consumers]
/// ```
pub struct AcquisitionLoop;

impl AcquisitionLoop {
    /// Move `session` onto a dedicated `daq-acquisition` thread.
    ///
    /// The session must already be streaming and the buffer must be as wide
    /// as the session's channel count.
    pub fn spawn<D: DaqDriver + 'static>(
        session: DeviceSession<D>,
        buffer: Arc<CircularBuffer>,
        token: CancellationToken,
    ) -> Result<AcquisitionHandle<D>, DaqError> {
        if !session.state().is_streaming() {
            return Err(DaqError::InvalidState {
                operation: "acquisition",
                state: session.state(),
            });
        }
        let width = session.config().channel_count;
        if buffer.width() != width {
            return Err(DaqError::ScanWidthMismatch {
                expected: buffer.width(),
                actual: width,
            });
        }

        let stats = Arc::new(Mutex::new(AcquisitionStats::default()));
        let thread_stats = Arc::clone(&stats);
        let thread_token = token.clone();

        let handle = thread::Builder::new()
            .name("daq-acquisition".into())
            .spawn(move || {
                let mut session = session;
                let result = Self::run(&mut session, &buffer, &thread_token, &thread_stats);
                let stats = *thread_stats.lock();
                AcquisitionExit {
                    session,
                    stats,
                    error: result.err(),
                }
            })
            .map_err(|e| DaqError::Unknown(format!("failed to spawn acquisition thread: {}", e)))?;

        Ok(AcquisitionHandle {
            token,
            stats,
            handle: Some(handle),
        })
    }

    /// Run the producer loop on the calling thread.
    ///
    /// Timeouts just loop again. A driver fault ends the loop and cancels
    /// `token` so consumers wind down too. `stop_stream` is issued on every
    /// exit path; its failure is logged and does not replace the result.
    pub fn run<D: DaqDriver>(
        session: &mut DeviceSession<D>,
        buffer: &CircularBuffer,
        token: &CancellationToken,
        stats: &Mutex<AcquisitionStats>,
    ) -> Result<(), DaqError> {
        let timeout = session.config().timeout();
        let selection = session.config().scan_selection;
        log::info!("session {}: acquisition started", session.id());

        let mut result = Ok(());
        while !token.is_cancelled() {
            let count = match session.retrieve_scans(timeout) {
                Ok(count) => count,
                Err(e) => {
                    log::error!("session {}: acquisition aborted: {}", session.id(), e);
                    token.cancel();
                    result = Err(e);
                    break;
                }
            };

            if count == 0 {
                let mut s = stats.lock();
                s.retrievals += 1;
                s.empty_retrievals += 1;
                continue;
            }

            let appended = match Self::append_batch(session, buffer, selection) {
                Ok(appended) => appended,
                Err(e) => {
                    log::error!("session {}: append failed: {}", session.id(), e);
                    token.cancel();
                    result = Err(e);
                    break;
                }
            };
            log::debug!("session {}: {} scans retrieved", session.id(), count);

            let mut s = stats.lock();
            s.retrievals += 1;
            s.scans_retrieved += count as u64;
            s.scans_appended += appended;
        }

        if let Err(e) = session.stop_stream() {
            log::warn!("session {}: stop after acquisition failed: {}", session.id(), e);
        }

        let s = *stats.lock();
        log::info!(
            "session {}: acquisition stopped after {} retrievals ({} empty), {} scans appended",
            session.id(),
            s.retrievals,
            s.empty_retrievals,
            s.scans_appended
        );
        result
    }

    fn append_batch<D: DaqDriver>(
        session: &DeviceSession<D>,
        buffer: &CircularBuffer,
        selection: ScanSelection,
    ) -> Result<u64, DaqError> {
        match selection {
            ScanSelection::All => {
                let mut appended = 0;
                for scan in session.retrieved() {
                    buffer.append(scan)?;
                    appended += 1;
                }
                Ok(appended)
            }
            ScanSelection::Latest => match session.latest_scan() {
                Some(scan) => buffer.append(scan).map(|_| 1),
                None => Ok(0),
            },
        }
    }
}

/// Supervisor's handle on a running acquisition thread.
///
/// Dropping the handle without joining cancels the run and waits for the
/// thread, which releases the session.
pub struct AcquisitionHandle<D: DaqDriver> {
    token: CancellationToken,
    stats: Arc<Mutex<AcquisitionStats>>,
    handle: Option<thread::JoinHandle<AcquisitionExit<D>>>,
}

impl<D: DaqDriver> AcquisitionHandle<D> {
    /// Signal the producer to stop after its current retrieval.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Live copy of the running totals.
    pub fn stats(&self) -> AcquisitionStats {
        *self.stats.lock()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the producer to exit and take back the session.
    pub fn join(mut self) -> Result<AcquisitionExit<D>, DaqError> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| DaqError::Unknown("acquisition already joined".into()))?;
        handle
            .join()
            .map_err(|_| DaqError::Unknown("acquisition thread panicked".into()))
    }

    /// `stop` followed by `join`.
    pub fn stop_and_join(self) -> Result<AcquisitionExit<D>, DaqError> {
        self.stop();
        self.join()
    }
}

impl<D: DaqDriver> Drop for AcquisitionHandle<D> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.token.cancel();
            let _ = handle.join();
        }
    }
}
