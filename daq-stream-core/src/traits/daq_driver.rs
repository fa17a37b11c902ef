use std::time::Duration;

use crate::models::error::DaqError;

/// Parameters of a driver-level stream start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub first_channel: u32,
    pub channel_count: u32,
    pub gain: u32,
    /// Scans per second requested from the hardware.
    pub scan_rate: u32,
    pub external_trigger: bool,
}

impl StreamRequest {
    /// Free-running stream over `channel_count` channels starting at channel 0.
    pub fn new(channel_count: u32, scan_rate: u32) -> Self {
        Self {
            first_channel: 0,
            channel_count,
            gain: 0,
            scan_rate,
            external_trigger: false,
        }
    }
}

/// Interface to the vendor driver of an acquisition device.
///
/// One value of the implementing type is one driver handle: it is opened once,
/// used from a single thread at a time and released once. Every call may block
/// and every call except the conversions may fail with `DaqError::Driver`.
///
/// Implemented by:
/// - `SimulatedDriver` (this crate)
/// - `IusbDaqDriver` (`daq-stream-iusb`, Windows)
pub trait DaqDriver: Send {
    /// Number of devices currently attached.
    fn enumerate_devices(&mut self) -> Result<usize, DaqError>;

    /// Acquire the handle for device `index`.
    fn open_device(&mut self, index: usize) -> Result<(), DaqError>;

    /// Give the handle back to the driver.
    fn release_device(&mut self) -> Result<(), DaqError>;

    /// Reinitialize the device's internal state.
    fn reset(&mut self) -> Result<(), DaqError>;

    /// Start a hardware-timed stream. Returns the rate the hardware accepted.
    fn start_stream(&mut self, request: StreamRequest) -> Result<u32, DaqError>;

    fn stop_stream(&mut self) -> Result<(), DaqError>;

    /// Block up to `timeout` for scans and write up to `max_scans` of them,
    /// interleaved by channel, into `out`.
    ///
    /// Returns the number of scans written. Zero means the timeout elapsed.
    fn retrieve_scans(
        &mut self,
        max_scans: usize,
        timeout: Duration,
        out: &mut [f32],
    ) -> Result<usize, DaqError>;

    fn serial_number(&mut self) -> Result<i32, DaqError>;

    fn firmware_version(&mut self) -> Result<u32, DaqError>;

    fn device_id(&mut self) -> Result<u8, DaqError>;

    /// Convert a voltage into the device's ADC code.
    fn volt_to_bits(&self, voltage: f32) -> i32;

    /// Convert an ADC code into a voltage.
    fn bits_to_volt(&self, bits: i32) -> f32;

    /// Version of the vendor library, if it reports one.
    fn library_version(&self) -> Option<u32> {
        None
    }
}
