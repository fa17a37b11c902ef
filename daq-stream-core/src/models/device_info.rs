use serde::{Deserialize, Serialize};

/// Identity of an opened acquisition device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub serial_number: i32,
    pub firmware_version: u32,
    pub device_id: u8,
    /// Version of the vendor library, when the driver exposes one.
    pub library_version: Option<u32>,
}
