//! `DaqDriver` implementation for iUSBDAQ devices.

use std::ffi::OsStr;
use std::os::raw::c_int;
use std::time::Duration;

use daq_stream_core::{DaqDriver, DaqError, StreamRequest};

use crate::ffi::{DevSession, IusbDaqLibrary};

/// Name the vendor installer registers the library under.
pub const LIBRARY_NAME: &str = "iUSBDAQ.dll";

/// iUSBDAQ driver handle.
///
/// Owns the loaded vendor library and, once opened, the device session
/// record. The record is boxed so its address stays fixed for the library.
pub struct IusbDaqDriver {
    lib: IusbDaqLibrary,
    session: Option<Box<DevSession>>,
    channel_count: usize,
}

// SAFETY: the session record's raw handles are only touched through `&mut self`,
// so the driver is used from one thread at a time.
unsafe impl Send for IusbDaqDriver {}

impl IusbDaqDriver {
    /// Load `iUSBDAQ.dll` from the standard search path.
    pub fn load() -> Result<Self, DaqError> {
        Self::load_from(LIBRARY_NAME)
    }

    /// Load the vendor library from an explicit path.
    pub fn load_from(path: impl AsRef<OsStr>) -> Result<Self, DaqError> {
        let lib = IusbDaqLibrary::load(path.as_ref())?;
        let driver = Self {
            lib,
            session: None,
            channel_count: 0,
        };
        log::info!("loaded iUSBDAQ library version {:#x}", driver.dll_version());
        Ok(driver)
    }

    pub fn dll_version(&self) -> u32 {
        // SAFETY: takes no arguments.
        unsafe { (self.lib.get_dll_version)() }
    }

    fn session_ptr(&mut self) -> Result<*mut DevSession, DaqError> {
        self.session
            .as_deref_mut()
            .map(|s| s as *mut DevSession)
            .ok_or(DaqError::DeviceUnavailable)
    }
}

fn to_c_int(value: usize) -> c_int {
    value.min(c_int::MAX as usize) as c_int
}

impl DaqDriver for IusbDaqDriver {
    fn enumerate_devices(&mut self) -> Result<usize, DaqError> {
        let mut count: c_int = 0;
        // SAFETY: `count` outlives the call.
        let rc = unsafe { (self.lib.enumerate_dev)(0, &mut count) };
        self.lib.check(rc)?;
        Ok(count.max(0) as usize)
    }

    fn open_device(&mut self, index: usize) -> Result<(), DaqError> {
        let mut session = Box::<DevSession>::default();
        // SAFETY: the record is valid and boxed; it is kept only on success.
        let rc = unsafe { (self.lib.open_device)(0, to_c_int(index), &mut *session) };
        self.lib.check(rc)?;
        self.session = Some(session);
        Ok(())
    }

    fn release_device(&mut self) -> Result<(), DaqError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        // SAFETY: the record came from a successful open and is released once.
        let rc = unsafe { (self.lib.release_device)(&mut *session) };
        self.lib.check(rc)
    }

    fn reset(&mut self) -> Result<(), DaqError> {
        let dev = self.session_ptr()?;
        // SAFETY: `dev` points at the open session record.
        let rc = unsafe { (self.lib.reset)(dev) };
        self.lib.check(rc)
    }

    fn start_stream(&mut self, request: StreamRequest) -> Result<u32, DaqError> {
        let dev = self.session_ptr()?;
        let scan_rate = c_int::try_from(request.scan_rate).map_err(|_| {
            DaqError::ConfigurationFailed(format!(
                "scan rate {} does not fit the driver's rate argument",
                request.scan_rate
            ))
        })?;
        let mut actual: c_int = 0;
        // SAFETY: `dev` points at the open session record and `actual` outlives the call.
        let rc = unsafe {
            (self.lib.ai_start_stream)(
                dev,
                request.first_channel as c_int,
                request.channel_count as c_int,
                request.gain as c_int,
                scan_rate,
                &mut actual,
                request.external_trigger as c_int,
            )
        };
        self.lib.check(rc)?;
        self.channel_count = request.channel_count as usize;
        Ok(actual.max(0) as u32)
    }

    fn stop_stream(&mut self) -> Result<(), DaqError> {
        let dev = self.session_ptr()?;
        // SAFETY: `dev` points at the open session record.
        let rc = unsafe { (self.lib.ai_stop_stream)(dev) };
        self.lib.check(rc)
    }

    fn retrieve_scans(
        &mut self,
        max_scans: usize,
        timeout: Duration,
        out: &mut [f32],
    ) -> Result<usize, DaqError> {
        let dev = self.session_ptr()?;
        let max_scans = max_scans.min(out.len() / self.channel_count.max(1));
        let timeout_ms = timeout.as_millis().min(c_int::MAX as u128) as c_int;
        let mut actual: c_int = 0;

        // SAFETY: `out` holds at least `max_scans * channel_count` floats.
        let rc = unsafe {
            (self.lib.ai_get_scans)(
                dev,
                to_c_int(max_scans),
                timeout_ms,
                out.as_mut_ptr(),
                &mut actual,
            )
        };
        self.lib.check(rc)?;
        Ok((actual.max(0) as usize).min(max_scans))
    }

    fn serial_number(&mut self) -> Result<i32, DaqError> {
        let dev = self.session_ptr()?;
        let mut serial: c_int = 0;
        // SAFETY: `dev` points at the open session record.
        let rc = unsafe { (self.lib.get_device_serial_no)(dev, &mut serial) };
        self.lib.check(rc)?;
        Ok(serial)
    }

    fn firmware_version(&mut self) -> Result<u32, DaqError> {
        let dev = self.session_ptr()?;
        let mut version: u32 = 0;
        // SAFETY: `dev` points at the open session record.
        let rc = unsafe { (self.lib.get_firmware_version)(dev, &mut version) };
        self.lib.check(rc)?;
        Ok(version)
    }

    fn device_id(&mut self) -> Result<u8, DaqError> {
        let dev = self.session_ptr()?;
        let mut id: u8 = 0;
        // SAFETY: `dev` points at the open session record.
        let rc = unsafe { (self.lib.read_devid)(dev, &mut id) };
        self.lib.check(rc)?;
        Ok(id)
    }

    fn volt_to_bits(&self, voltage: f32) -> i32 {
        // SAFETY: pure conversion.
        unsafe { (self.lib.volt_to_bits)(voltage) }
    }

    fn bits_to_volt(&self, bits: i32) -> f32 {
        // SAFETY: pure conversion.
        unsafe { (self.lib.bits_to_volt)(bits) }
    }

    fn library_version(&self) -> Option<u32> {
        Some(self.dll_version())
    }
}

impl Drop for IusbDaqDriver {
    fn drop(&mut self) {
        if let Err(e) = self.release_device() {
            log::warn!("iUSBDAQ release on drop failed: {}", e);
        }
    }
}
