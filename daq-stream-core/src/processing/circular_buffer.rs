use parking_lot::Mutex;

use crate::models::error::DaqError;

/// Fixed-capacity multi-channel scan store shared between one producer and
/// any number of consumers.
///
/// Storage is a flat `capacity * width` array of slots. Every append
/// overwrites the slot at the write index and advances it modulo capacity, so
/// the oldest scan is the one that gets replaced. Nothing is allocated after
/// construction. Wrap in `Arc` for cross-thread access; all access goes
/// through the internal lock.
#[derive(Debug)]
pub struct CircularBuffer {
    capacity: usize,
    width: usize,
    inner: Mutex<Slots>,
}

#[derive(Debug)]
struct Slots {
    data: Vec<f32>,
    write_index: usize,
    appended: u64,
}

impl CircularBuffer {
    /// Allocate a zero-filled buffer of `capacity` scans, `width` channels each.
    pub fn new(capacity: usize, width: usize) -> Result<Self, DaqError> {
        if capacity == 0 || width == 0 {
            return Err(DaqError::ConfigurationFailed(format!(
                "circular buffer needs a positive capacity and width, got {}x{}",
                capacity, width
            )));
        }

        Ok(Self {
            capacity,
            width,
            inner: Mutex::new(Slots {
                data: vec![0.0; capacity * width],
                write_index: 0,
                appended: 0,
            }),
        })
    }

    /// Write one scan into the current slot and advance the write index.
    ///
    /// The lock is held for a single slot copy.
    pub fn append(&self, scan: &[f32]) -> Result<(), DaqError> {
        if scan.len() != self.width {
            return Err(DaqError::ScanWidthMismatch {
                expected: self.width,
                actual: scan.len(),
            });
        }

        let mut slots = self.inner.lock();
        let start = slots.write_index * self.width;
        slots.data[start..start + self.width].copy_from_slice(scan);
        slots.write_index = (slots.write_index + 1) % self.capacity;
        slots.appended += 1;
        Ok(())
    }

    /// Copy the whole buffer and its write index under the lock.
    pub fn snapshot(&self) -> Snapshot {
        let slots = self.inner.lock();
        Snapshot {
            data: slots.data.clone(),
            width: self.width,
            capacity: self.capacity,
            write_index: slots.write_index,
            appended: slots.appended,
        }
    }

    /// Refresh `snapshot` in place, reusing its allocation.
    ///
    /// A snapshot of a differently shaped buffer is reshaped first.
    pub fn snapshot_into(&self, snapshot: &mut Snapshot) {
        snapshot.width = self.width;
        snapshot.capacity = self.capacity;
        snapshot.data.resize(self.capacity * self.width, 0.0);

        let slots = self.inner.lock();
        snapshot.data.copy_from_slice(&slots.data);
        snapshot.write_index = slots.write_index;
        snapshot.appended = slots.appended;
    }

    /// Number of scans retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Channels per scan.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Slot the next append will overwrite.
    pub fn write_index(&self) -> usize {
        self.inner.lock().write_index
    }

    /// Total appends since construction.
    pub fn appended(&self) -> u64 {
        self.inner.lock().appended
    }
}

/// Point-in-time copy of a `CircularBuffer`.
///
/// Slots are in storage order; `write_index` is the slot the producer will
/// overwrite next, which is also the oldest scan once the buffer has wrapped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub data: Vec<f32>,
    pub width: usize,
    pub capacity: usize,
    pub write_index: usize,
    /// Total appends observed by this snapshot.
    pub appended: u64,
}

impl Snapshot {
    /// Scan stored in slot `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= capacity`.
    pub fn scan(&self, slot: usize) -> &[f32] {
        let start = slot * self.width;
        &self.data[start..start + self.width]
    }

    /// All slots in storage order.
    pub fn scans(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.width.max(1))
    }

    /// Samples of one channel across all slots, in storage order.
    ///
    /// # Panics
    ///
    /// Panics if `channel >= width`.
    pub fn channel(&self, channel: usize) -> Vec<f32> {
        self.scans().map(|scan| scan[channel]).collect()
    }

    /// Scans from oldest to newest.
    ///
    /// Before the buffer has wrapped, only the scans actually written are
    /// returned.
    pub fn chronological(&self) -> Vec<&[f32]> {
        let filled = self.filled();
        let first = if filled < self.capacity { 0 } else { self.write_index };
        (0..filled)
            .map(|i| self.scan((first + i) % self.capacity))
            .collect()
    }

    /// Most recently written scan, if any.
    pub fn latest(&self) -> Option<&[f32]> {
        if self.appended == 0 {
            return None;
        }
        let slot = (self.write_index + self.capacity - 1) % self.capacity;
        Some(self.scan(slot))
    }

    /// Number of slots holding written scans.
    pub fn filled(&self) -> usize {
        self.appended.min(self.capacity as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.appended == 0
    }
}
