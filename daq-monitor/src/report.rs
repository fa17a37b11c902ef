//! Session event collection and the end-of-run summary.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;

use daq_stream_core::{
    AcquisitionStats, DaqError, DeviceIdentity, RateMismatch, SessionDelegate, SessionState,
    StreamInfo,
};

/// Collects driver errors and rate warnings raised during a run.
#[derive(Debug, Default)]
pub struct MonitorDelegate {
    errors: Mutex<Vec<String>>,
    mismatch: Mutex<Option<RateMismatch>>,
}

impl MonitorDelegate {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn mismatch(&self) -> Option<RateMismatch> {
        *self.mismatch.lock()
    }
}

impl SessionDelegate for MonitorDelegate {
    fn on_state_changed(&self, state: SessionState) {
        log::debug!("device session is now {}", state);
    }

    fn on_rate_mismatch(&self, mismatch: &RateMismatch) {
        *self.mismatch.lock() = Some(*mismatch);
    }

    fn on_error(&self, error: &DaqError) {
        self.errors.lock().push(error.to_string());
    }
}

/// Everything worth reporting once streaming has ended.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub device: Option<DeviceIdentity>,
    pub stream: StreamInfo,
    pub acquisition: AcquisitionStats,
    pub duration_secs: f64,
    pub driver_errors: Vec<String>,
    pub error: Option<String>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref device) = self.device {
            writeln!(
                f,
                "device: serial {} firmware {:#x} id {}",
                device.serial_number, device.firmware_version, device.device_id
            )?;
        }
        writeln!(
            f,
            "stream: requested {} -> scan rate {} (driver reported {})",
            self.stream.requested_rate, self.stream.scan_rate, self.stream.actual_rate
        )?;
        if let Some(m) = self.stream.mismatch {
            writeln!(f, "warning: requested scan rate {}, got {}", m.requested, m.actual)?;
        }
        writeln!(
            f,
            "acquired {} scans in {} retrievals ({} empty) over {:.1}s",
            self.acquisition.scans_appended,
            self.acquisition.retrievals,
            self.acquisition.empty_retrievals,
            self.duration_secs
        )?;
        for e in &self.driver_errors {
            writeln!(f, "driver error: {}", e)?;
        }
        if let Some(ref e) = self.error {
            writeln!(f, "acquisition failed: {}", e)?;
        }
        Ok(())
    }
}
