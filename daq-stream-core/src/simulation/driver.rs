//! In-process stand-in for a vendor driver.
//!
//! Plays back a script of deliveries, then either times out or synthesizes
//! sine waves. Every lifecycle call is counted so tests can check that a
//! session stopped and released its handle exactly once, even after the
//! driver has moved into the acquisition thread.

use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::error::DaqError;
use crate::traits::daq_driver::{DaqDriver, StreamRequest};

/// One scripted answer to `retrieve_scans`.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Scans to hand out. Batches larger than the request are split across
    /// consecutive calls.
    Scans(Vec<Vec<f32>>),
    /// A timeout with no data.
    Empty,
    /// A transport failure.
    Fault(DaqError),
}

/// How the simulated hardware answers a stream start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateResponse {
    /// Report back the scan rate that was requested.
    Echo,
    /// Always report this rate.
    Fixed(u32),
}

/// Shared call counters for a `SimulatedDriver`.
#[derive(Debug, Default)]
pub struct DriverCounters {
    opens: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    releases: AtomicUsize,
    retrievals: AtomicUsize,
    last_requested_rate: AtomicU32,
}

impl DriverCounters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn retrievals(&self) -> usize {
        self.retrievals.load(Ordering::SeqCst)
    }

    pub fn last_requested_rate(&self) -> u32 {
        self.last_requested_rate.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
struct SineSource {
    amplitude: f32,
    offset: f32,
    base_frequency_hz: f32,
}

/// Scripted acquisition device.
#[derive(Debug)]
pub struct SimulatedDriver {
    channel_count: usize,
    device_count: usize,
    rate_response: RateResponse,
    deliveries: VecDeque<Delivery>,
    sine: Option<SineSource>,
    identity: (i32, u32, u8),
    full_scale_volts: f32,
    resolution_bits: u32,

    open_fault: Option<DaqError>,
    start_fault: Option<DaqError>,
    stop_fault: Option<DaqError>,
    release_fault: Option<DaqError>,

    streaming: bool,
    scan_rate: u32,
    scans_generated: u64,
    counters: Arc<DriverCounters>,
}

impl SimulatedDriver {
    /// One attached device with `channel_count` channels, 0-5 V, 12-bit.
    pub fn new(channel_count: usize) -> Self {
        Self {
            channel_count,
            device_count: 1,
            rate_response: RateResponse::Echo,
            deliveries: VecDeque::new(),
            sine: None,
            identity: (1, 1, 0),
            full_scale_volts: 5.0,
            resolution_bits: 12,
            open_fault: None,
            start_fault: None,
            stop_fault: None,
            release_fault: None,
            streaming: false,
            scan_rate: 0,
            scans_generated: 0,
            counters: Arc::new(DriverCounters::default()),
        }
    }

    pub fn with_device_count(mut self, count: usize) -> Self {
        self.device_count = count;
        self
    }

    pub fn with_rate_response(mut self, response: RateResponse) -> Self {
        self.rate_response = response;
        self
    }

    pub fn with_deliveries(mut self, deliveries: impl IntoIterator<Item = Delivery>) -> Self {
        self.deliveries.extend(deliveries);
        self
    }

    /// Synthesize sine waves once the script runs out. Channel `c` runs at
    /// `(c + 1) * base_frequency_hz`, paced by the negotiated scan rate.
    pub fn with_sine(mut self, amplitude: f32, offset: f32, base_frequency_hz: f32) -> Self {
        self.sine = Some(SineSource {
            amplitude,
            offset,
            base_frequency_hz,
        });
        self
    }

    pub fn with_identity(mut self, serial_number: i32, firmware_version: u32, device_id: u8) -> Self {
        self.identity = (serial_number, firmware_version, device_id);
        self
    }

    pub fn with_open_fault(mut self, error: DaqError) -> Self {
        self.open_fault = Some(error);
        self
    }

    pub fn with_start_fault(mut self, error: DaqError) -> Self {
        self.start_fault = Some(error);
        self
    }

    pub fn with_stop_fault(mut self, error: DaqError) -> Self {
        self.stop_fault = Some(error);
        self
    }

    pub fn with_release_fault(mut self, error: DaqError) -> Self {
        self.release_fault = Some(error);
        self
    }

    pub fn counters(&self) -> Arc<DriverCounters> {
        Arc::clone(&self.counters)
    }

    fn code_range(&self) -> f32 {
        ((1u32 << self.resolution_bits) - 1) as f32
    }

    fn play_scans(&mut self, mut scans: Vec<Vec<f32>>, max_scans: usize, out: &mut [f32]) -> usize {
        if scans.len() > max_scans {
            let rest = scans.split_off(max_scans);
            self.deliveries.push_front(Delivery::Scans(rest));
        }

        let width = self.channel_count;
        for (i, scan) in scans.iter().enumerate() {
            let n = scan.len().min(width);
            out[i * width..i * width + n].copy_from_slice(&scan[..n]);
        }
        scans.len()
    }

    fn generate(&mut self, sine: SineSource, max_scans: usize, timeout: Duration, out: &mut [f32]) -> usize {
        let rate = self.scan_rate.max(1) as f32;
        let batch_time = Duration::from_secs_f32(max_scans as f32 / rate);
        thread::sleep(batch_time.min(timeout));

        let width = self.channel_count;
        for i in 0..max_scans {
            let t = (self.scans_generated + i as u64) as f32 / rate;
            for c in 0..width {
                let freq = sine.base_frequency_hz * (c + 1) as f32;
                out[i * width + c] = sine.offset + sine.amplitude * (TAU * freq * t).sin();
            }
        }
        self.scans_generated += max_scans as u64;
        max_scans
    }
}

impl DaqDriver for SimulatedDriver {
    fn enumerate_devices(&mut self) -> Result<usize, DaqError> {
        Ok(self.device_count)
    }

    fn open_device(&mut self, index: usize) -> Result<(), DaqError> {
        if let Some(ref e) = self.open_fault {
            return Err(e.clone());
        }
        if index >= self.device_count {
            return Err(DaqError::DeviceUnavailable);
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release_device(&mut self) -> Result<(), DaqError> {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        self.streaming = false;
        match self.release_fault {
            Some(ref e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn reset(&mut self) -> Result<(), DaqError> {
        self.scans_generated = 0;
        Ok(())
    }

    fn start_stream(&mut self, request: StreamRequest) -> Result<u32, DaqError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        self.counters
            .last_requested_rate
            .store(request.scan_rate, Ordering::SeqCst);
        if let Some(ref e) = self.start_fault {
            return Err(e.clone());
        }

        self.streaming = true;
        self.scan_rate = request.scan_rate;
        Ok(match self.rate_response {
            RateResponse::Echo => request.scan_rate,
            RateResponse::Fixed(rate) => rate,
        })
    }

    fn stop_stream(&mut self) -> Result<(), DaqError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        self.streaming = false;
        match self.stop_fault {
            Some(ref e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn retrieve_scans(
        &mut self,
        max_scans: usize,
        timeout: Duration,
        out: &mut [f32],
    ) -> Result<usize, DaqError> {
        if !self.streaming {
            return Err(DaqError::driver(-2, "stream not started"));
        }
        self.counters.retrievals.fetch_add(1, Ordering::SeqCst);

        let max_scans = max_scans.min(out.len() / self.channel_count.max(1));
        match self.deliveries.pop_front() {
            Some(Delivery::Scans(scans)) => Ok(self.play_scans(scans, max_scans, out)),
            Some(Delivery::Empty) => Ok(0),
            Some(Delivery::Fault(e)) => Err(e),
            None => match self.sine {
                Some(sine) => Ok(self.generate(sine, max_scans, timeout, out)),
                None => {
                    thread::sleep(timeout);
                    Ok(0)
                }
            },
        }
    }

    fn serial_number(&mut self) -> Result<i32, DaqError> {
        Ok(self.identity.0)
    }

    fn firmware_version(&mut self) -> Result<u32, DaqError> {
        Ok(self.identity.1)
    }

    fn device_id(&mut self) -> Result<u8, DaqError> {
        Ok(self.identity.2)
    }

    fn volt_to_bits(&self, voltage: f32) -> i32 {
        let clamped = voltage.clamp(0.0, self.full_scale_volts);
        (clamped / self.full_scale_volts * self.code_range()).round() as i32
    }

    fn bits_to_volt(&self, bits: i32) -> f32 {
        bits as f32 / self.code_range() * self.full_scale_volts
    }
}
