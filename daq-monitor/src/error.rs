use thiserror::Error;

use daq_stream_core::DaqError;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Daq(#[from] DaqError),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to encode summary: {0}")]
    Json(#[from] serde_json::Error),
}
