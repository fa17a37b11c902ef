//! # daq-stream-core
//!
//! Platform-agnostic streaming acquisition core.
//!
//! Opens a device through the `DaqDriver` trait, negotiates the scan rate,
//! and runs a producer thread that copies retrieved scans into a fixed-size
//! `CircularBuffer`. Any number of consumers take snapshots of that buffer
//! concurrently; a `CancellationToken` shuts everything down and the producer
//! hands the session back for release.
//!
//! ## Architecture
//!
//! ```text
//! daq-stream-core (this crate)
//! ├── traits/       ← DaqDriver, SessionDelegate
//! ├── models/       ← DaqError, SessionState, StreamConfiguration, RatePlan, DeviceIdentity
//! ├── session/      ← DeviceSession (handle lifecycle + rate negotiation)
//! ├── processing/   ← CircularBuffer, Snapshot
//! ├── acquisition/  ← AcquisitionLoop, ConsumerView, CancellationToken
//! └── simulation/   ← SimulatedDriver
//! ```
//!
//! ## Usage
//! ```
//! use std::sync::Arc;
//! use daq_stream_core::{
//!     AcquisitionLoop, CancellationToken, CircularBuffer, ConsumerView, DeviceSession,
//!     SimulatedDriver, StreamConfiguration,
//! };
//!
//! let config = StreamConfiguration { timeout_ms: 10, ..Default::default() };
//! let buffer = Arc::new(CircularBuffer::new(config.buffer_length, config.channel_count)?);
//!
//! let mut session = DeviceSession::open(SimulatedDriver::new(8).with_sine(1.0, 2.5, 5.0), config)?;
//! session.start_stream(60)?;
//!
//! let token = CancellationToken::new();
//! let producer = AcquisitionLoop::spawn(session, Arc::clone(&buffer), token.clone())?;
//! let view = ConsumerView::new(buffer, token);
//! let _latest = view.snapshot();
//!
//! let mut exit = producer.stop_and_join()?;
//! exit.session.release();
//! # Ok::<(), daq_stream_core::DaqError>(())
//! ```

pub mod acquisition;
pub mod models;
pub mod processing;
pub mod session;
pub mod simulation;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use acquisition::acquisition_loop::{AcquisitionExit, AcquisitionHandle, AcquisitionLoop, AcquisitionStats};
pub use acquisition::cancellation::CancellationToken;
pub use acquisition::consumer::ConsumerView;
pub use models::config::{ScanSelection, StreamConfiguration, MAX_SAMPLE_RATE};
pub use models::device_info::DeviceIdentity;
pub use models::error::DaqError;
pub use models::rate::{RateMismatch, RatePlan, StreamInfo};
pub use models::state::SessionState;
pub use processing::circular_buffer::{CircularBuffer, Snapshot};
pub use session::device::DeviceSession;
pub use simulation::driver::{Delivery, DriverCounters, RateResponse, SimulatedDriver};
pub use traits::daq_driver::{DaqDriver, StreamRequest};
pub use traits::session_delegate::SessionDelegate;
