//! # daq-monitor
//!
//! Opens an acquisition device, streams it into a circular buffer on a
//! producer thread, prints mean / RMS / peak-to-peak of one channel from a
//! consumer thread, and shuts both down after `--duration` seconds.

mod cli;
mod error;
mod report;
mod stats;

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use daq_stream_core::{
    AcquisitionLoop, CancellationToken, CircularBuffer, ConsumerView, DaqDriver, DeviceSession,
    RatePlan, RateResponse, SimulatedDriver, StreamConfiguration,
};

use cli::Args;
use error::MonitorError;
use report::{MonitorDelegate, RunSummary};
use stats::ChannelStats;

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    match run(&args) {
        Ok(summary) => {
            if let Err(e) = print_summary(&summary, args.json) {
                log::error!("{}", e);
                return ExitCode::FAILURE;
            }
            if summary.error.is_some() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            log::error!("{}", e);
            eprintln!("daq-monitor: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<RunSummary, MonitorError> {
    let config = args.stream_configuration()?;

    if args.simulate {
        return stream(simulated_driver(&config)?, config, args);
    }

    #[cfg(target_os = "windows")]
    {
        let driver = daq_stream_iusb::IusbDaqDriver::load()?;
        stream(driver, config, args)
    }

    #[cfg(not(target_os = "windows"))]
    {
        Err(MonitorError::Config(
            "the iUSBDAQ backend is only available on Windows; pass --simulate".into(),
        ))
    }
}

/// Sine-wave device that accepts the requested rate exactly.
///
/// The reported rate is the one that maps back onto the planned scan rate:
/// `scan_rate * batch_size * oversample / channel_count`.
fn simulated_driver(config: &StreamConfiguration) -> Result<SimulatedDriver, MonitorError> {
    let plan = RatePlan::new(config.rate, config)?;
    let accepted = u64::from(plan.scan_rate) * config.batch_size as u64 * u64::from(config.oversample)
        / config.channel_count as u64;
    let accepted = u32::try_from(accepted).map_err(|_| {
        MonitorError::Config(format!("rate {} cannot be simulated", config.rate))
    })?;
    Ok(SimulatedDriver::new(config.channel_count)
        .with_rate_response(RateResponse::Fixed(accepted))
        .with_sine(1.0, 2.5, 2.0))
}

fn stream<D: DaqDriver + 'static>(
    driver: D,
    config: StreamConfiguration,
    args: &Args,
) -> Result<RunSummary, MonitorError> {
    let buffer = Arc::new(CircularBuffer::new(config.buffer_length, config.channel_count)?);
    let delegate = Arc::new(MonitorDelegate::default());

    let rate = config.rate;
    let mut session = DeviceSession::open(driver, config)?;
    session.set_delegate(delegate.clone());

    let device = match session.identity() {
        Ok(identity) => Some(identity),
        Err(e) => {
            log::warn!("device identity unavailable: {}", e);
            None
        }
    };

    // A failed start drops the session, which releases the device.
    let info = session.start_stream(rate)?;

    let token = CancellationToken::new();
    let started = Instant::now();
    let producer = AcquisitionLoop::spawn(session, Arc::clone(&buffer), token.clone())?;

    let view = ConsumerView::new(buffer, token.clone());
    let channel = args.channel;
    let printer = view.spawn("channel-stats", args.interval(), move |snap| {
        let samples: Vec<f32> = snap.chronological().iter().map(|scan| scan[channel]).collect();
        if let Some(s) = ChannelStats::from_samples(&samples) {
            println!("{:.5} {:.5} {:.5}", s.mean, s.rms, s.peak_to_peak);
        }
    })?;

    let run_time = args.run_time();
    while started.elapsed() < run_time && !producer.is_finished() {
        thread::sleep(Duration::from_millis(10));
    }

    token.cancel();
    let mut exit = producer.join()?;
    if printer.join().is_err() {
        log::error!("statistics consumer panicked");
    }
    exit.session.release();

    let mut driver_errors = delegate.errors();
    if let Some(ref e) = exit.error {
        // Already reported through the summary's error field.
        let text = e.to_string();
        driver_errors.retain(|d| *d != text);
    }

    Ok(RunSummary {
        device,
        stream: info,
        acquisition: exit.stats,
        duration_secs: started.elapsed().as_secs_f64(),
        driver_errors,
        error: exit.error.map(|e| e.to_string()),
    })
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<(), MonitorError> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print!("{}", summary);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use daq_stream_core::{DaqError, Delivery};

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["daq-monitor", "--simulate", "--interval-ms", "5"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn simulated_rate_round_trips() {
        for rate in [60, 1_000, 300_000] {
            let config = StreamConfiguration {
                rate,
                ..Default::default()
            };
            assert!(config.validate().is_ok());

            let driver = simulated_driver(&config).unwrap();
            let mut session = DeviceSession::open(driver, config).unwrap();
            let info = session.start_stream(rate).unwrap();
            assert_eq!(info.mismatch, None, "rate {}", rate);
        }
    }

    #[test]
    fn simulated_driver_rejects_oversized_rate() {
        let config = StreamConfiguration {
            rate: 20_000_000,
            ..Default::default()
        };
        let err = simulated_driver(&config).err();
        assert!(matches!(err, Some(MonitorError::Daq(DaqError::ConfigurationFailed(_)))));
    }

    #[test]
    fn stream_runs_for_duration_and_releases_once() {
        let args = args(&["--duration", "0.2", "--buffer-length", "64"]);
        let config = args.stream_configuration().unwrap();
        let driver = simulated_driver(&config).unwrap();
        let counters = driver.counters();

        let summary = stream(driver, config, &args).unwrap();

        assert_eq!(summary.stream.scan_rate, 2_880);
        assert_eq!(summary.stream.mismatch, None);
        assert!(summary.error.is_none());
        assert!(summary.driver_errors.is_empty());
        assert!(summary.acquisition.scans_appended > 0);
        assert!(summary.duration_secs >= 0.2);
        assert_eq!(summary.device.map(|d| d.serial_number), Some(1));
        assert_eq!(counters.starts(), 1);
        assert_eq!(counters.stops(), 1);
        assert_eq!(counters.releases(), 1);
    }

    #[test]
    fn producer_fault_ends_run_early() {
        let args = args(&["--duration", "30"]);
        let config = args.stream_configuration().unwrap();
        let scans = vec![vec![1.0; config.channel_count]; 4];
        let driver = simulated_driver(&config).unwrap().with_deliveries([
            Delivery::Scans(scans),
            Delivery::Fault(DaqError::driver(-7, "usb transfer stalled")),
        ]);
        let counters = driver.counters();

        let summary = stream(driver, config, &args).unwrap();

        let error = summary.error.as_deref();
        assert_eq!(error, Some("driver error -7: usb transfer stalled"));
        assert!(!summary.driver_errors.iter().any(|e| Some(e.as_str()) == error));
        assert_eq!(summary.acquisition.scans_appended, 4);
        assert!(summary.duration_secs < 30.0);
        assert_eq!(counters.stops(), 1);
        assert_eq!(counters.releases(), 1);
    }
}
