//! Raw bindings to `iUSBDAQ.dll`, resolved at load time.

use std::ffi::OsStr;
use std::os::raw::{c_char, c_int, c_ulong, c_void};

use libloading::Library;

use daq_stream_core::DaqError;

use crate::status::{self, ERROR_TEXT_LEN};

/// Session record the library fills in on open and expects on every call.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct DevSession {
    pub dev_index: c_int,
    pub dev_instance: c_int,
    pub dev_type: c_ulong,
    pub session1: *mut c_void,
    pub session2: *mut c_void,
}

impl Default for DevSession {
    fn default() -> Self {
        Self {
            dev_index: 0,
            dev_instance: 0,
            dev_type: 0,
            session1: std::ptr::null_mut(),
            session2: std::ptr::null_mut(),
        }
    }
}

type GetDllVersionFn = unsafe extern "C" fn() -> u32;
type EnumerateDevFn = unsafe extern "C" fn(dev_type: c_int, count: *mut c_int) -> c_int;
type OpenDeviceFn = unsafe extern "C" fn(dev_type: c_int, index: c_int, dev: *mut DevSession) -> c_int;
type SessionFn = unsafe extern "C" fn(dev: *mut DevSession) -> c_int;
type GetSerialFn = unsafe extern "C" fn(dev: *mut DevSession, serial: *mut c_int) -> c_int;
type GetFirmwareFn = unsafe extern "C" fn(dev: *mut DevSession, version: *mut u32) -> c_int;
type ReadDevIdFn = unsafe extern "C" fn(dev: *mut DevSession, id: *mut u8) -> c_int;
type StartStreamFn = unsafe extern "C" fn(
    dev: *mut DevSession,
    first_channel: c_int,
    channel_count: c_int,
    gain: c_int,
    scan_rate: c_int,
    actual_rate: *mut c_int,
    external_trigger: c_int,
) -> c_int;
type GetScansFn = unsafe extern "C" fn(
    dev: *mut DevSession,
    scans: c_int,
    timeout_ms: c_int,
    buffer: *mut f32,
    actual_scans: *mut c_int,
) -> c_int;
type GetErrorDesFn = unsafe extern "C" fn(code: c_int, text: *mut c_char) -> c_int;
type VoltToBitsFn = unsafe extern "C" fn(voltage: f32) -> c_int;
type BitsToVoltFn = unsafe extern "C" fn(bits: c_int) -> f32;

/// Function table for one loaded copy of the vendor library.
pub(crate) struct IusbDaqLibrary {
    pub get_dll_version: GetDllVersionFn,
    pub enumerate_dev: EnumerateDevFn,
    pub open_device: OpenDeviceFn,
    pub release_device: SessionFn,
    pub reset: SessionFn,
    pub get_device_serial_no: GetSerialFn,
    pub get_firmware_version: GetFirmwareFn,
    pub read_devid: ReadDevIdFn,
    pub ai_start_stream: StartStreamFn,
    pub ai_stop_stream: SessionFn,
    pub ai_get_scans: GetScansFn,
    pub get_error_des: GetErrorDesFn,
    pub volt_to_bits: VoltToBitsFn,
    pub bits_to_volt: BitsToVoltFn,

    // Keeps the function pointers above valid.
    _library: Library,
}

macro_rules! symbol {
    ($library:expr, $name:literal) => {
        *$library
            .get(concat!("iUSBDAQ_", $name, "\0").as_bytes())
            .map_err(|e| DaqError::LibraryLoad(format!("missing symbol iUSBDAQ_{}: {}", $name, e)))?
    };
}

impl IusbDaqLibrary {
    pub fn load(path: &OsStr) -> Result<Self, DaqError> {
        // SAFETY: loading the vendor DLL runs its initialisers; it has no
        // requirements beyond being the genuine iUSBDAQ library.
        let library = unsafe { Library::new(path) }
            .map_err(|e| DaqError::LibraryLoad(format!("{}: {}", path.to_string_lossy(), e)))?;

        // SAFETY: each symbol is resolved with the signature the vendor
        // header declares.
        unsafe {
            Ok(Self {
                get_dll_version: symbol!(library, "GetDLLVersion"),
                enumerate_dev: symbol!(library, "EnumerateDev"),
                open_device: symbol!(library, "OpenDevice"),
                release_device: symbol!(library, "ReleaseDevice"),
                reset: symbol!(library, "Reset"),
                get_device_serial_no: symbol!(library, "GetDeviceSerialNo"),
                get_firmware_version: symbol!(library, "GetFirmwareVersion"),
                read_devid: symbol!(library, "ReadIUSB_DEVID"),
                ai_start_stream: symbol!(library, "AIStartStream"),
                ai_stop_stream: symbol!(library, "AIStopStream"),
                ai_get_scans: symbol!(library, "AIGetScans"),
                get_error_des: symbol!(library, "GetErrorDes"),
                volt_to_bits: symbol!(library, "VoltToBits"),
                bits_to_volt: symbol!(library, "BitsToVolt"),
                _library: library,
            })
        }
    }

    /// Map a status code to a result, asking the library for the text.
    pub fn check(&self, code: c_int) -> Result<(), DaqError> {
        status::check(code, |code| self.describe(code))
    }

    fn describe(&self, code: c_int) -> String {
        let mut text = [0u8; ERROR_TEXT_LEN];
        // SAFETY: the library writes at most ERROR_TEXT_LEN bytes including
        // the terminator.
        let rc = unsafe { (self.get_error_des)(code, text.as_mut_ptr() as *mut c_char) };
        if rc != status::STATUS_OK {
            return format!("unrecognised error code {}", code);
        }
        status::description_from_buffer(&text)
    }
}
