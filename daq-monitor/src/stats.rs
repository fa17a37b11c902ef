//! Per-channel summary statistics computed from buffer snapshots.

use serde::Serialize;

/// Mean, RMS deviation and peak-to-peak of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelStats {
    pub mean: f32,
    /// Root-mean-square deviation from the mean.
    pub rms: f32,
    pub peak_to_peak: f32,
    pub samples: usize,
}

impl ChannelStats {
    pub fn from_samples(samples: &[f32]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let n = samples.len() as f64;
        let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n;
        let variance = samples
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n;

        let (min, max) = samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        Some(Self {
            mean: mean as f32,
            rms: variance.sqrt() as f32,
            peak_to_peak: max - min,
            samples: samples.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn empty_has_no_stats() {
        assert!(ChannelStats::from_samples(&[]).is_none());
    }

    #[test]
    fn constant_signal() {
        let stats = ChannelStats::from_samples(&[2.5; 10]).unwrap();
        assert_relative_eq!(stats.mean, 2.5);
        assert_relative_eq!(stats.rms, 0.0);
        assert_relative_eq!(stats.peak_to_peak, 0.0);
        assert_eq!(stats.samples, 10);
    }

    #[test]
    fn square_wave() {
        let samples: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { 3.0 }).collect();
        let stats = ChannelStats::from_samples(&samples).unwrap();
        assert_relative_eq!(stats.mean, 2.0);
        assert_relative_eq!(stats.rms, 1.0);
        assert_relative_eq!(stats.peak_to_peak, 2.0);
    }
}
