//! Full pipeline against the simulated driver: open, stream, consume, cancel,
//! join, release.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use daq_stream_core::{
    AcquisitionLoop, CancellationToken, CircularBuffer, ConsumerView, Delivery, DeviceSession,
    RateResponse, SessionState, SimulatedDriver, StreamConfiguration,
};

const CHANNELS: usize = 8;
const CAPACITY: usize = 1000;
const TIMEOUT_MS: u64 = 20;

fn injected(count: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|n| (0..CHANNELS).map(|c| (n * CHANNELS + c) as f32).collect())
        .collect()
}

fn run_pipeline(total_scans: usize) {
    let scans = injected(total_scans);
    // Mix timeouts in between deliveries of uneven size.
    let mut deliveries = Vec::new();
    for chunk in scans.chunks(37) {
        deliveries.push(Delivery::Scans(chunk.to_vec()));
        deliveries.push(Delivery::Empty);
    }

    let driver = SimulatedDriver::new(CHANNELS)
        .with_rate_response(RateResponse::Fixed(138_240))
        .with_deliveries(deliveries);
    let counters = driver.counters();

    let config = StreamConfiguration {
        buffer_length: CAPACITY,
        timeout_ms: TIMEOUT_MS,
        ..Default::default()
    };
    let buffer = Arc::new(CircularBuffer::new(config.buffer_length, config.channel_count).unwrap());

    let mut session = DeviceSession::open(driver, config).unwrap();
    let info = session.start_stream(60).unwrap();
    assert_eq!(info.scan_rate, 2_880);
    assert!(info.mismatch.is_none());

    let token = CancellationToken::new();
    let producer = AcquisitionLoop::spawn(session, Arc::clone(&buffer), token.clone()).unwrap();

    let view = ConsumerView::new(Arc::clone(&buffer), token.clone());
    let last_seen = Arc::new(AtomicU64::new(0));
    let consumer = {
        let last_seen = Arc::clone(&last_seen);
        view.spawn("stats", Duration::from_millis(1), move |snap| {
            // Appends are observed as a growing prefix.
            let previous = last_seen.swap(snap.appended, Ordering::SeqCst);
            assert!(snap.appended >= previous);
            for row in snap.chronological() {
                let base = row[0] as usize;
                assert_eq!(base % CHANNELS, 0);
                for (c, v) in row.iter().enumerate() {
                    assert_eq!(*v as usize, base + c);
                }
            }
        })
        .unwrap()
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    while producer.stats().scans_appended < total_scans as u64 {
        assert!(Instant::now() < deadline, "producer did not deliver all scans");
        thread::sleep(Duration::from_millis(2));
    }

    let cancelled_at = Instant::now();
    producer.stop();
    let mut exit = producer.join().unwrap();
    let shutdown = cancelled_at.elapsed();
    consumer.join().unwrap();

    assert!(
        shutdown < Duration::from_millis(TIMEOUT_MS * 10),
        "shutdown took {:?}",
        shutdown
    );
    assert!(exit.error.is_none());
    assert_eq!(exit.stats.scans_appended, total_scans as u64);
    assert_eq!(exit.session.state(), SessionState::Stopped);

    let snap = buffer.snapshot();
    assert_eq!(snap.write_index, total_scans % CAPACITY);
    let expected = &scans[total_scans.saturating_sub(CAPACITY)..];
    let actual = snap.chronological();
    assert_eq!(actual.len(), expected.len());
    for (got, want) in actual.iter().zip(expected) {
        assert_eq!(*got, want.as_slice());
    }

    exit.session.release();
    exit.session.release();
    drop(exit);

    assert_eq!(counters.starts(), 1);
    assert_eq!(counters.stops(), 1);
    assert_eq!(counters.releases(), 1);
}

#[test]
fn buffer_holds_everything_below_capacity() {
    run_pipeline(640);
}

#[test]
fn buffer_keeps_last_capacity_scans_after_wrap() {
    run_pipeline(2_345);
}
