use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::acquisition::cancellation::CancellationToken;
use crate::models::error::DaqError;
use crate::processing::circular_buffer::{CircularBuffer, Snapshot};

/// Read-only access to a circular buffer for display or statistics threads.
///
/// Consumers only ever see copies: a snapshot is taken under the buffer lock
/// and everything derived from it happens after the lock is released, so a
/// slow consumer never holds up the producer for more than one copy.
#[derive(Debug, Clone)]
pub struct ConsumerView {
    buffer: Arc<CircularBuffer>,
    token: CancellationToken,
}

impl ConsumerView {
    pub fn new(buffer: Arc<CircularBuffer>, token: CancellationToken) -> Self {
        Self { buffer, token }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.buffer.snapshot()
    }

    pub fn snapshot_into(&self, snapshot: &mut Snapshot) {
        self.buffer.snapshot_into(snapshot);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn buffer(&self) -> &Arc<CircularBuffer> {
        &self.buffer
    }

    /// Call `f` with a fresh snapshot every `period` until cancelled.
    ///
    /// Returns how many snapshots were delivered.
    pub fn run<F>(&self, period: Duration, mut f: F) -> u64
    where
        F: FnMut(&Snapshot),
    {
        let mut snapshot = Snapshot::default();
        let mut delivered = 0;
        while !self.token.is_cancelled() {
            self.buffer.snapshot_into(&mut snapshot);
            f(&snapshot);
            delivered += 1;
            thread::sleep(period);
        }
        delivered
    }

    /// `run` on a named thread.
    pub fn spawn<F>(
        &self,
        name: &str,
        period: Duration,
        f: F,
    ) -> Result<thread::JoinHandle<u64>, DaqError>
    where
        F: FnMut(&Snapshot) + Send + 'static,
    {
        let view = self.clone();
        thread::Builder::new()
            .name(name.into())
            .spawn(move || view.run(period, f))
            .map_err(|e| DaqError::Unknown(format!("failed to spawn consumer {}: {}", name, e)))
    }
}
