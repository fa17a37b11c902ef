use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Largest driver-level sample rate. Vendor drivers take rates as a C `int`.
pub const MAX_SAMPLE_RATE: u32 = i32::MAX as u32;

/// Which scans of a retrieval batch are appended to the circular buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSelection {
    /// Every retrieved scan, in delivery order.
    #[default]
    All,
    /// Only the newest scan of each batch.
    Latest,
}

/// Configuration for a streaming acquisition.
///
/// Defaults match the iUSBDAQ reference setup: 8 channels, 128-sample
/// transfers, 3x oversampling at a requested rate of 60.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfiguration {
    /// Requested display rate before oversampling (default: 60).
    pub rate: u32,

    /// Oversample factor applied before driver rate computation (default: 3).
    pub oversample: u32,

    /// Number of analog channels per scan (default: 8).
    pub channel_count: usize,

    /// Raw samples transferred per retrieval call (default: 128).
    pub batch_size: usize,

    /// Number of scans kept by the circular buffer (default: 1000).
    pub buffer_length: usize,

    /// Upper bound on a single blocking retrieval, in milliseconds (default: 1000).
    pub timeout_ms: u64,

    /// Index of the device to open (default: 0, the first device).
    pub device_index: usize,

    /// Scans appended per retrieval (default: all).
    pub scan_selection: ScanSelection,
}

impl StreamConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.rate == 0 {
            return Err("rate must be positive".into());
        }
        if self.oversample == 0 {
            return Err("oversample factor must be positive".into());
        }
        if self.channel_count == 0 {
            return Err("channel count must be positive".into());
        }
        if self.batch_size == 0 || self.batch_size % self.channel_count != 0 {
            return Err(format!(
                "batch size {} must be a positive multiple of the channel count {}",
                self.batch_size, self.channel_count
            ));
        }
        if self.buffer_length == 0 {
            return Err("buffer length must be positive".into());
        }
        if self.timeout_ms == 0 {
            return Err("retrieval timeout must be positive".into());
        }
        if self.sample_rate().is_none() {
            return Err(format!(
                "rate {} x oversample {} x batch size {} exceeds the driver limit of {}",
                self.rate, self.oversample, self.batch_size, MAX_SAMPLE_RATE
            ));
        }
        Ok(())
    }

    /// Driver sample rate for the configured `rate`, `None` past `MAX_SAMPLE_RATE`.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate_for(self.rate)
    }

    /// Per-channel scan rate for the configured `rate`.
    pub fn scan_rate(&self) -> Option<u32> {
        self.scan_rate_for(self.rate)
    }

    /// `requested_rate * oversample * batch_size`, without overflow.
    pub fn sample_rate_for(&self, requested_rate: u32) -> Option<u32> {
        let rate = u64::from(requested_rate)
            .checked_mul(u64::from(self.oversample))?
            .checked_mul(self.batch_size as u64)?;
        if rate > u64::from(MAX_SAMPLE_RATE) {
            return None;
        }
        u32::try_from(rate).ok()
    }

    /// `sample_rate_for(requested_rate) / channel_count`, truncated.
    pub fn scan_rate_for(&self, requested_rate: u32) -> Option<u32> {
        let sample_rate = self.sample_rate_for(requested_rate)?;
        let channels = self.channel_count.max(1) as u64;
        u32::try_from(u64::from(sample_rate) / channels).ok()
    }

    /// Scans delivered by one full retrieval.
    pub fn scans_per_batch(&self) -> usize {
        self.batch_size / self.channel_count
    }

    /// Length of the float transfer buffer handed to the driver.
    pub fn transfer_len(&self) -> usize {
        self.scans_per_batch() * self.channel_count
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StreamConfiguration {
    fn default() -> Self {
        Self {
            rate: 60,
            oversample: 3,
            channel_count: 8,
            batch_size: 128,
            buffer_length: 1000,
            timeout_ms: 1000,
            device_index: 0,
            scan_selection: ScanSelection::All,
        }
    }
}
