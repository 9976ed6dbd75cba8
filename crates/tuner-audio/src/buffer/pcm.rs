//! Bounded PCM queue with playback accounting.
//!
//! The renderer side pushes whole buffers or nothing; the device callback pops
//! whatever it needs and advances the played-sample counter that position
//! reporting is derived from.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct PcmQueue {
    samples: Mutex<VecDeque<f32>>,
    capacity: usize,
    /// Interleaved samples handed to the device since the last clear.
    played: AtomicU64,
}

impl PcmQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            played: AtomicU64::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    pub fn free(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    /// Append all of `samples`, or nothing if they do not fit.
    pub fn push_all(&self, samples: &[f32]) -> bool {
        let mut queue = self.samples.lock();
        if self.capacity - queue.len() < samples.len() {
            return false;
        }
        queue.extend(samples.iter().copied());
        true
    }

    /// Fill `output` from the queue, returning how many samples were real.
    pub fn pop_into(&self, output: &mut [f32]) -> usize {
        let mut queue = self.samples.lock();
        let count = output.len().min(queue.len());
        for (slot, sample) in output.iter_mut().zip(queue.drain(..count)) {
            *slot = sample;
        }
        drop(queue);
        self.played.fetch_add(count as u64, Ordering::AcqRel);
        count
    }

    pub fn played(&self) -> u64 {
        self.played.load(Ordering::Acquire)
    }

    /// Drop queued samples and restart the played counter.
    pub fn clear(&self) {
        self.samples.lock().clear();
        self.played.store(0, Ordering::Release);
    }
}

/// Queue shared between the sink and the device callback.
pub type SharedPcmQueue = Arc<PcmQueue>;

pub fn shared_pcm_queue(capacity: usize) -> SharedPcmQueue {
    Arc::new(PcmQueue::new(capacity))
}
