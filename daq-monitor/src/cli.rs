//! Command-line arguments and configuration resolution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use daq_stream_core::{ScanSelection, StreamConfiguration};

use crate::error::MonitorError;

/// Stream an acquisition device and print live channel statistics.
#[derive(Debug, Parser)]
#[command(name = "daq-monitor", version)]
pub struct Args {
    /// TOML file with stream configuration; CLI flags override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use the built-in simulated device instead of hardware.
    #[arg(long)]
    pub simulate: bool,

    /// Index of the device to open.
    #[arg(long)]
    pub device: Option<usize>,

    /// Requested rate before oversampling.
    #[arg(long)]
    pub rate: Option<u32>,

    /// Number of scans kept in the circular buffer.
    #[arg(long)]
    pub buffer_length: Option<usize>,

    /// Append only the newest scan of every retrieval.
    #[arg(long)]
    pub latest_only: bool,

    /// How long to stream, in seconds.
    #[arg(long, default_value_t = 30.0)]
    pub duration: f64,

    /// Channel to compute statistics for.
    #[arg(long, default_value_t = 1)]
    pub channel: usize,

    /// Milliseconds between statistics lines.
    #[arg(long, default_value_t = 100)]
    pub interval_ms: u64,

    /// Print the final summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Configuration file (or defaults) with CLI overrides applied and validated.
    pub fn stream_configuration(&self) -> Result<StreamConfiguration, MonitorError> {
        let mut config = match self.config {
            Some(ref path) => load_config(path)?,
            None => StreamConfiguration::default(),
        };

        if let Some(device) = self.device {
            config.device_index = device;
        }
        if let Some(rate) = self.rate {
            config.rate = rate;
        }
        if let Some(length) = self.buffer_length {
            config.buffer_length = length;
        }
        if self.latest_only {
            config.scan_selection = ScanSelection::Latest;
        }

        config.validate().map_err(MonitorError::Config)?;
        if self.channel >= config.channel_count {
            return Err(MonitorError::Config(format!(
                "channel {} out of range for {} channels",
                self.channel, config.channel_count
            )));
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(MonitorError::Config("duration must be positive".into()));
        }
        Ok(config)
    }

    pub fn run_time(&self) -> Duration {
        Duration::from_secs_f64(self.duration)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

pub fn load_config(path: &Path) -> Result<StreamConfiguration, MonitorError> {
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

pub fn parse_config(text: &str) -> Result<StreamConfiguration, MonitorError> {
    Ok(toml::from_str(text)?)
}
