use serde::{Deserialize, Serialize};

use super::config::{StreamConfiguration, MAX_SAMPLE_RATE};
use super::error::DaqError;

/// Non-fatal report that the hardware accepted a different scan rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateMismatch {
    pub requested: u32,
    pub actual: u32,
}

/// Driver-level rates derived from a requested display rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePlan {
    pub requested_rate: u32,
    /// `requested * oversample * batch_size`.
    pub sample_rate: u32,
    /// `sample_rate / channel_count`, truncated.
    pub scan_rate: u32,
}

impl RatePlan {
    /// Fails when the sample rate would exceed `MAX_SAMPLE_RATE`.
    pub fn new(requested_rate: u32, config: &StreamConfiguration) -> Result<Self, DaqError> {
        match (
            config.sample_rate_for(requested_rate),
            config.scan_rate_for(requested_rate),
        ) {
            (Some(sample_rate), Some(scan_rate)) => Ok(Self {
                requested_rate,
                sample_rate,
                scan_rate,
            }),
            _ => Err(DaqError::ConfigurationFailed(format!(
                "requested rate {} exceeds the driver limit of {} samples/s",
                requested_rate, MAX_SAMPLE_RATE
            ))),
        }
    }

    /// Maps the driver's reported rate back into scan-rate units.
    ///
    /// The round trip is `(actual * channels) / (batch_size * oversample)` with
    /// truncating division, compared against the planned scan rate.
    pub fn effective_rate(&self, actual_rate: u32, config: &StreamConfiguration) -> u32 {
        let divisor = (config.batch_size as u64 * config.oversample as u64).max(1);
        let actual = u64::from(actual_rate) * config.channel_count as u64 / divisor;
        u32::try_from(actual).unwrap_or(u32::MAX)
    }

    pub fn verify(&self, actual_rate: u32, config: &StreamConfiguration) -> Option<RateMismatch> {
        let actual = self.effective_rate(actual_rate, config);
        (actual != self.scan_rate).then_some(RateMismatch {
            requested: self.scan_rate,
            actual,
        })
    }
}

/// Result of a successful stream start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub requested_rate: u32,
    pub sample_rate: u32,
    pub scan_rate: u32,
    /// Rate reported back by the driver.
    pub actual_rate: u32,
    pub mismatch: Option<RateMismatch>,
    pub started_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_rates() {
        let config = StreamConfiguration::default();
        let plan = RatePlan::new(60, &config).unwrap();
        assert_eq!(plan.sample_rate, 23_040);
        assert_eq!(plan.scan_rate, 2_880);
    }

    #[test]
    fn rates_scale_with_configuration() {
        let config = StreamConfiguration {
            channel_count: 4,
            batch_size: 64,
            oversample: 2,
            ..Default::default()
        };
        let plan = RatePlan::new(100, &config).unwrap();
        assert_eq!(plan.sample_rate, 12_800);
        assert_eq!(plan.scan_rate, 3_200);
        // 102_400 * 4 / 128 = 3200
        assert_eq!(plan.verify(102_400, &config), None);
    }

    #[test]
    fn oversized_request_fails_instead_of_wrapping() {
        let config = StreamConfiguration::default();
        let err = RatePlan::new(20_000_000, &config).unwrap_err();
        assert!(matches!(err, DaqError::ConfigurationFailed(_)));

        let plan = RatePlan::new(5_592_405, &config).unwrap();
        assert_eq!(plan.scan_rate, 268_435_440);
        // 2_147_483_520 * 8 / 384 = 44_739_240, far above the plan
        assert!(plan.verify(2_147_483_520, &config).is_some());
        assert_eq!(plan.effective_rate(u32::MAX, &config), 89_478_485);
    }

    #[test]
    fn round_trip_is_compared_after_truncation() {
        let config = StreamConfiguration::default();
        let plan = RatePlan::new(60, &config).unwrap();

        // 138_240 * 8 / 384 = 2880
        assert_eq!(plan.verify(138_240, &config), None);
        // 138_287 * 8 / 384 = 2880.98 → 2880
        assert_eq!(plan.verify(138_287, &config), None);

        let mismatch = plan.verify(2_880, &config).unwrap();
        assert_eq!(mismatch.requested, 2_880);
        assert_eq!(mismatch.actual, 60);
    }
}
