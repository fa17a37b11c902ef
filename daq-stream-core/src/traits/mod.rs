pub mod daq_driver;
pub mod session_delegate;
