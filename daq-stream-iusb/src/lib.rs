//! # daq-stream-iusb
//!
//! iUSBDAQ backend for daq-stream.
//!
//! Provides:
//! - `IusbDaqDriver` — `DaqDriver` over the vendor `iUSBDAQ` library, loaded at runtime
//! - `status` — vendor status code translation
//!
//! ## Platform Requirements
//! - Windows with the iUSBDAQ driver installed (`iUSBDAQ.dll` on the search path)
//!
//! ## Usage
//! ```ignore
//! use daq_stream_core::{DeviceSession, StreamConfiguration};
//! use daq_stream_iusb::IusbDaqDriver;
//!
//! let driver = IusbDaqDriver::load().unwrap();
//! let mut session = DeviceSession::open(driver, StreamConfiguration::default()).unwrap();
//! session.start_stream(60).unwrap();
//! ```

pub mod status;

#[cfg(target_os = "windows")]
pub mod driver;
#[cfg(target_os = "windows")]
mod ffi;

#[cfg(target_os = "windows")]
pub use driver::IusbDaqDriver;
