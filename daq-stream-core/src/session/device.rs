use std::sync::Arc;
use std::time::Duration;

use crate::models::config::StreamConfiguration;
use crate::models::device_info::DeviceIdentity;
use crate::models::error::DaqError;
use crate::models::rate::{RatePlan, StreamInfo};
use crate::models::state::SessionState;
use crate::traits::daq_driver::{DaqDriver, StreamRequest};
use crate::traits::session_delegate::SessionDelegate;

/// Owner of one driver handle and its streaming lifecycle.
///
/// ```text
/// open() → [Open] → start_stream() → [Streaming] → stop_stream() → [Stopped]
///             └──────────── release() / drop ──────────────────────┴→ [Closed]
/// ```
///
/// The session is `Send` but not shared: once streaming it belongs to the
/// acquisition thread. Dropping it releases the handle if that has not
/// happened yet; release never fails and never runs twice.
pub struct DeviceSession<D: DaqDriver> {
    id: String,
    driver: D,
    config: StreamConfiguration,
    state: SessionState,
    delegate: Option<Arc<dyn SessionDelegate>>,

    // Interleaved scans from the last retrieval
    transfer: Vec<f32>,
    retrieved: usize,

    stream: Option<StreamInfo>,
}

impl<D: DaqDriver> DeviceSession<D> {
    /// Open the device selected by `config.device_index`.
    pub fn open(driver: D, config: StreamConfiguration) -> Result<Self, DaqError> {
        let index = config.device_index;
        Self::open_at(driver, config, index)
    }

    /// Open device `index`. Transitions: closed → open.
    pub fn open_at(mut driver: D, config: StreamConfiguration, index: usize) -> Result<Self, DaqError> {
        config.validate().map_err(DaqError::ConfigurationFailed)?;

        let available = driver.enumerate_devices()?;
        if available == 0 || index >= available {
            log::warn!("device {} requested, {} available", index, available);
            return Err(DaqError::DeviceUnavailable);
        }

        driver.open_device(index)?;

        let id = uuid::Uuid::new_v4().to_string();
        log::info!("session {}: opened device {} of {}", id, index, available);

        Ok(Self {
            id,
            driver,
            transfer: vec![0.0; config.transfer_len()],
            retrieved: 0,
            config,
            state: SessionState::Open,
            delegate: None,
            stream: None,
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &StreamConfiguration {
        &self.config
    }

    /// Rates negotiated by the last successful `start_stream`.
    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream.as_ref()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Reinitialize the device. Only valid while open and not streaming.
    pub fn reset(&mut self) -> Result<(), DaqError> {
        self.require(SessionState::Open, "reset")?;
        let result = self.driver.reset();
        self.check(result)
    }

    /// Negotiate rates and start streaming. Transitions: open → streaming.
    ///
    /// A rate the hardware could not match exactly is reported through the
    /// returned `StreamInfo`, the log and the delegate, and streaming goes on
    /// at the accepted rate.
    pub fn start_stream(&mut self, requested_rate: u32) -> Result<StreamInfo, DaqError> {
        self.require(SessionState::Open, "start_stream")?;
        if requested_rate == 0 {
            return Err(DaqError::ConfigurationFailed(
                "requested rate must be positive".into(),
            ));
        }

        let plan = RatePlan::new(requested_rate, &self.config)?;
        let request = StreamRequest::new(self.config.channel_count as u32, plan.scan_rate);

        let result = self.driver.start_stream(request);
        let actual_rate = self.check(result)?;

        let mismatch = plan.verify(actual_rate, &self.config);
        if let Some(ref m) = mismatch {
            log::warn!(
                "session {}: actual scan rate differs from requested (requested {}, got {})",
                self.id,
                m.requested,
                m.actual
            );
            if let Some(ref delegate) = self.delegate {
                delegate.on_rate_mismatch(m);
            }
        }

        let info = StreamInfo {
            requested_rate,
            sample_rate: plan.sample_rate,
            scan_rate: plan.scan_rate,
            actual_rate,
            mismatch,
            started_at: chrono::Utc::now().to_rfc3339(),
        };
        log::info!(
            "session {}: streaming {} channels at scan rate {} (driver reports {})",
            self.id,
            self.config.channel_count,
            info.scan_rate,
            info.actual_rate
        );

        self.retrieved = 0;
        self.stream = Some(info.clone());
        self.set_state(SessionState::Streaming);
        Ok(info)
    }

    /// Block up to `timeout` for one batch of scans.
    ///
    /// Returns how many scans landed in the transfer buffer; zero on timeout.
    pub fn retrieve_scans(&mut self, timeout: Duration) -> Result<usize, DaqError> {
        self.require(SessionState::Streaming, "retrieve_scans")?;
        self.retrieved = 0;

        let max_scans = self.config.scans_per_batch();
        let result = self
            .driver
            .retrieve_scans(max_scans, timeout, &mut self.transfer);
        let count = self.check(result)?;

        self.retrieved = count.min(max_scans);
        if count > max_scans {
            log::warn!(
                "session {}: driver reported {} scans for a {}-scan request",
                self.id,
                count,
                max_scans
            );
        }
        Ok(self.retrieved)
    }

    /// Scans written by the last retrieval, oldest first.
    pub fn retrieved(&self) -> impl Iterator<Item = &[f32]> + '_ {
        let width = self.config.channel_count;
        self.transfer[..self.retrieved * width].chunks_exact(width)
    }

    /// Newest scan of the last retrieval.
    pub fn latest_scan(&self) -> Option<&[f32]> {
        self.retrieved().last()
    }

    /// Stop streaming. Transitions: streaming → stopped.
    ///
    /// The session moves to `Stopped` even when the driver reports a fault so
    /// that release can still follow.
    pub fn stop_stream(&mut self) -> Result<(), DaqError> {
        self.require(SessionState::Streaming, "stop_stream")?;
        let result = self.driver.stop_stream();
        self.retrieved = 0;
        self.set_state(SessionState::Stopped);
        self.check(result)
    }

    /// Release the driver handle. Transitions: any → closed.
    ///
    /// Best effort: a session still streaming is stopped first, driver
    /// failures are logged and forwarded to the delegate, and calling this
    /// again is a no-op.
    pub fn release(&mut self) {
        if self.state.is_closed() {
            return;
        }

        if self.state.is_streaming() {
            if let Err(e) = self.driver.stop_stream() {
                log::warn!("session {}: stop during release failed: {}", self.id, e);
                self.notify_error(&e);
            }
        }

        if let Err(e) = self.driver.release_device() {
            log::warn!("session {}: release failed: {}", self.id, e);
            self.notify_error(&e);
        }

        self.retrieved = 0;
        self.set_state(SessionState::Closed);
        log::info!("session {}: released", self.id);
    }

    pub fn serial_number(&mut self) -> Result<i32, DaqError> {
        self.require_handle("serial_number")?;
        let result = self.driver.serial_number();
        self.check(result)
    }

    pub fn firmware_version(&mut self) -> Result<u32, DaqError> {
        self.require_handle("firmware_version")?;
        let result = self.driver.firmware_version();
        self.check(result)
    }

    pub fn device_id(&mut self) -> Result<u8, DaqError> {
        self.require_handle("device_id")?;
        let result = self.driver.device_id();
        self.check(result)
    }

    /// All identity queries in one call.
    pub fn identity(&mut self) -> Result<DeviceIdentity, DaqError> {
        Ok(DeviceIdentity {
            serial_number: self.serial_number()?,
            firmware_version: self.firmware_version()?,
            device_id: self.device_id()?,
            library_version: self.driver.library_version(),
        })
    }

    pub fn volts_to_bits(&self, voltage: f32) -> i32 {
        self.driver.volt_to_bits(voltage)
    }

    pub fn bits_to_volts(&self, bits: i32) -> f32 {
        self.driver.bits_to_volt(bits)
    }

    // --- Internal helpers ---

    fn require(&self, expected: SessionState, operation: &'static str) -> Result<(), DaqError> {
        if self.state != expected {
            return Err(DaqError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn require_handle(&self, operation: &'static str) -> Result<(), DaqError> {
        if !self.state.holds_handle() {
            return Err(DaqError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Forward driver failures to the delegate before propagating them.
    fn check<T>(&self, result: Result<T, DaqError>) -> Result<T, DaqError> {
        if let Err(ref e) = result {
            self.notify_error(e);
        }
        result
    }

    fn notify_error(&self, error: &DaqError) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(error);
        }
    }

    fn set_state(&mut self, new_state: SessionState) {
        if self.state == new_state {
            return;
        }
        log::debug!("session {}: {} -> {}", self.id, self.state, new_state);
        self.state = new_state;
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(new_state);
        }
    }
}

impl<D: DaqDriver> Drop for DeviceSession<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::models::rate::RateMismatch;
    use crate::simulation::driver::{Delivery, RateResponse, SimulatedDriver};

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<SessionState>>,
        mismatches: Mutex<Vec<RateMismatch>>,
        errors: Mutex<Vec<DaqError>>,
    }

    impl SessionDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: SessionState) {
            self.states.lock().push(state);
        }

        fn on_rate_mismatch(&self, mismatch: &RateMismatch) {
            self.mismatches.lock().push(*mismatch);
        }

        fn on_error(&self, error: &DaqError) {
            self.errors.lock().push(error.clone());
        }
    }

    fn matching_driver() -> SimulatedDriver {
        SimulatedDriver::new(8).with_rate_response(RateResponse::Fixed(138_240))
    }

    #[test]
    fn open_fails_without_devices() {
        let driver = SimulatedDriver::new(8).with_device_count(0);
        let counters = driver.counters();

        let err = DeviceSession::open(driver, StreamConfiguration::default()).err();
        assert_eq!(err, Some(DaqError::DeviceUnavailable));
        assert_eq!(counters.opens(), 0);
        assert_eq!(counters.releases(), 0);
    }

    #[test]
    fn open_rejects_out_of_range_index() {
        let driver = SimulatedDriver::new(8).with_device_count(2);
        let err = DeviceSession::open_at(driver, StreamConfiguration::default(), 2).err();
        assert_eq!(err, Some(DaqError::DeviceUnavailable));
    }

    #[test]
    fn open_propagates_driver_fault() {
        let driver = SimulatedDriver::new(8).with_open_fault(DaqError::driver(-3, "device busy"));
        let err = DeviceSession::open(driver, StreamConfiguration::default()).err();
        assert_eq!(err, Some(DaqError::driver(-3, "device busy")));
    }

    #[test]
    fn open_validates_configuration() {
        let config = StreamConfiguration {
            batch_size: 12,
            ..Default::default()
        };
        let err = DeviceSession::open(SimulatedDriver::new(8), config).err();
        assert!(matches!(err, Some(DaqError::ConfigurationFailed(_))));
    }

    #[test]
    fn oversized_rate_is_rejected_before_the_driver() {
        let driver = matching_driver();
        let counters = driver.counters();
        let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();

        let err = session.start_stream(20_000_000).unwrap_err();
        assert!(matches!(err, DaqError::ConfigurationFailed(_)));
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(counters.starts(), 0);

        let info = session.start_stream(60).unwrap();
        assert_eq!(info.scan_rate, 2_880);
    }

    #[test]
    fn full_lifecycle() {
        let driver = matching_driver();
        let counters = driver.counters();
        let delegate = Arc::new(RecordingDelegate::default());

        let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();
        session.set_delegate(delegate.clone());
        assert_eq!(session.state(), SessionState::Open);

        session.reset().unwrap();
        let info = session.start_stream(60).unwrap();
        assert_eq!(info.scan_rate, 2_880);
        assert_eq!(info.mismatch, None);
        assert_eq!(session.state(), SessionState::Streaming);

        session.stop_stream().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);

        session.release();
        assert_eq!(session.state(), SessionState::Closed);

        assert_eq!(counters.starts(), 1);
        assert_eq!(counters.stops(), 1);
        assert_eq!(counters.releases(), 1);
        assert_eq!(
            *delegate.states.lock(),
            vec![
                SessionState::Streaming,
                SessionState::Stopped,
                SessionState::Closed
            ]
        );
    }

    #[test]
    fn requested_scan_rate_reaches_driver() {
        let driver = matching_driver();
        let counters = driver.counters();
        let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();

        session.start_stream(60).unwrap();
        assert_eq!(counters.last_requested_rate(), 2_880);
    }

    #[test]
    fn rate_mismatch_is_reported_but_not_fatal() {
        let driver = SimulatedDriver::new(8).with_rate_response(RateResponse::Fixed(100_000));
        let delegate = Arc::new(RecordingDelegate::default());
        let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();
        session.set_delegate(delegate.clone());

        let info = session.start_stream(60).unwrap();

        // 100_000 * 8 / 384 = 2083
        let expected = RateMismatch {
            requested: 2_880,
            actual: 2_083,
        };
        assert_eq!(info.mismatch, Some(expected));
        assert_eq!(info.actual_rate, 100_000);
        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(*delegate.mismatches.lock(), vec![expected]);
        assert_eq!(session.stream_info(), Some(&info));
    }

    #[test]
    fn echoed_rate_is_flagged_as_mismatch() {
        let driver = SimulatedDriver::new(8).with_rate_response(RateResponse::Echo);
        let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();

        let info = session.start_stream(60).unwrap();
        assert_eq!(
            info.mismatch,
            Some(RateMismatch {
                requested: 2_880,
                actual: 60
            })
        );
    }

    #[test]
    fn failed_start_leaves_session_open_and_releases_once() {
        let driver = SimulatedDriver::new(8).with_start_fault(DaqError::driver(7, "bad rate"));
        let counters = driver.counters();
        let delegate = Arc::new(RecordingDelegate::default());
        let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();
        session.set_delegate(delegate.clone());

        let err = session.start_stream(60).unwrap_err();
        assert!(err.is_driver_fault());
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(delegate.errors.lock().len(), 1);

        session.release();
        session.release();
        drop(session);

        assert_eq!(counters.releases(), 1);
        assert_eq!(counters.stops(), 0);
    }

    #[test]
    fn drop_releases_exactly_once() {
        let driver = matching_driver();
        let counters = driver.counters();
        {
            let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();
            session.start_stream(60).unwrap();
        }
        assert_eq!(counters.stops(), 1);
        assert_eq!(counters.releases(), 1);
    }

    #[test]
    fn release_failure_is_swallowed() {
        let driver = matching_driver().with_release_fault(DaqError::driver(-1, "gone"));
        let counters = driver.counters();
        let delegate = Arc::new(RecordingDelegate::default());
        let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();
        session.set_delegate(delegate.clone());

        session.release();
        session.release();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(counters.releases(), 1);
        assert_eq!(*delegate.errors.lock(), vec![DaqError::driver(-1, "gone")]);
    }

    #[test]
    fn streaming_operations_require_streaming_state() {
        let mut session =
            DeviceSession::open(matching_driver(), StreamConfiguration::default()).unwrap();

        let err = session.retrieve_scans(Duration::from_millis(1)).unwrap_err();
        assert_eq!(
            err,
            DaqError::InvalidState {
                operation: "retrieve_scans",
                state: SessionState::Open
            }
        );
        assert!(session.stop_stream().is_err());

        session.start_stream(60).unwrap();
        assert!(session.reset().is_err());
        assert!(session.start_stream(60).is_err());

        session.release();
        assert!(session.start_stream(60).is_err());
        assert!(session.serial_number().is_err());
    }

    #[test]
    fn stop_fault_still_reaches_stopped() {
        let driver = matching_driver().with_stop_fault(DaqError::driver(4, "usb stall"));
        let counters = driver.counters();
        let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();
        session.start_stream(60).unwrap();

        assert!(session.stop_stream().is_err());
        assert_eq!(session.state(), SessionState::Stopped);

        session.release();
        assert_eq!(counters.stops(), 1);
        assert_eq!(counters.releases(), 1);
    }

    #[test]
    fn retrieve_exposes_scans_of_last_batch() {
        let driver = matching_driver().with_deliveries(vec![
            Delivery::Scans(vec![vec![1.0; 8], vec![2.0; 8], vec![3.0; 8]]),
            Delivery::Empty,
        ]);
        let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();
        session.start_stream(60).unwrap();

        let count = session.retrieve_scans(Duration::from_millis(5)).unwrap();
        assert_eq!(count, 3);
        let firsts: Vec<f32> = session.retrieved().map(|s| s[0]).collect();
        assert_eq!(firsts, vec![1.0, 2.0, 3.0]);
        assert_eq!(session.latest_scan(), Some(&[3.0; 8][..]));

        let count = session.retrieve_scans(Duration::from_millis(5)).unwrap();
        assert_eq!(count, 0);
        assert_eq!(session.retrieved().count(), 0);
        assert_eq!(session.latest_scan(), None);
    }

    #[test]
    fn retrieve_fault_propagates() {
        let driver =
            matching_driver().with_deliveries(vec![Delivery::Fault(DaqError::driver(9, "overrun"))]);
        let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();
        session.start_stream(60).unwrap();

        let err = session.retrieve_scans(Duration::from_millis(5)).unwrap_err();
        assert_eq!(err, DaqError::driver(9, "overrun"));
        assert_eq!(session.state(), SessionState::Streaming);
    }

    #[test]
    fn identity_queries() {
        let driver = matching_driver().with_identity(4242, 0x0102, 7);
        let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();

        let identity = session.identity().unwrap();
        assert_eq!(identity.serial_number, 4242);
        assert_eq!(identity.firmware_version, 0x0102);
        assert_eq!(identity.device_id, 7);
        assert_eq!(identity.library_version, None);

        let json = serde_json::to_string(&identity).unwrap();
        assert!(json.contains("\"serial_number\":4242"));
    }

    #[test]
    fn conversions_pass_through() {
        let session = DeviceSession::open(matching_driver(), StreamConfiguration::default()).unwrap();
        let bits = session.volts_to_bits(2.5);
        approx::assert_relative_eq!(session.bits_to_volts(bits), 2.5, epsilon = 0.01);
    }
}
