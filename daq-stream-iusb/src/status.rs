//! Status-code translation shared by every vendor call.

use daq_stream_core::DaqError;

/// Return value of a successful `iUSBDAQ_*` call.
pub const STATUS_OK: i32 = 0;

/// Size of the buffer `iUSBDAQ_GetErrorDes` writes into.
pub const ERROR_TEXT_LEN: usize = 256;

/// Turn a vendor status into a result, fetching the description only on failure.
pub fn check<F>(status: i32, describe: F) -> Result<(), DaqError>
where
    F: FnOnce(i32) -> String,
{
    if status == STATUS_OK {
        return Ok(());
    }
    Err(DaqError::Driver {
        code: status,
        description: describe(status),
    })
}

/// Decode a NUL-terminated description buffer.
pub fn description_from_buffer(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let text = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    if text.is_empty() {
        "unknown driver error".into()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_skips_description() {
        let result = check(STATUS_OK, |_| panic!("description requested for success"));
        assert!(result.is_ok());
    }

    #[test]
    fn failure_carries_code_and_text() {
        let err = check(-5, |code| format!("code {}", code)).unwrap_err();
        assert_eq!(err, DaqError::driver(-5, "code -5"));
    }

    #[test]
    fn description_stops_at_nul() {
        let mut buf = [0u8; ERROR_TEXT_LEN];
        buf[..14].copy_from_slice(b"Device timeout");
        buf[20] = b'x';
        assert_eq!(description_from_buffer(&buf), "Device timeout");
    }

    #[test]
    fn empty_description_falls_back() {
        assert_eq!(description_from_buffer(&[0u8; 8]), "unknown driver error");
        assert_eq!(description_from_buffer(b"  \0"), "unknown driver error");
    }
}
