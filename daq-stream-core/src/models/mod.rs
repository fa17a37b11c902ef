pub mod config;
pub mod device_info;
pub mod error;
pub mod rate;
pub mod state;
