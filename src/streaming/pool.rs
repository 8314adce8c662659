//! Fixed ring of pre-allocated sample buffers
//!
//! The pool owns N buffers of identical length. `current` names the slot that
//! goes to the device next; it advances modulo N on every submission.

use crate::{FractalSoundError, Result};

/// One buffer of interleaved stereo samples
#[derive(Debug, Clone)]
pub struct BufferSlot {
    samples: Vec<i16>,
    prepared: bool,
}

impl BufferSlot {
    /// Samples of this buffer
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Mutable samples of this buffer
    pub fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }

    /// Whether the device accepted this buffer during start-up
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }
}

/// Ring of N buffers cycled through the output device
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<BufferSlot>,
    current: usize,
}

impl BufferPool {
    /// Allocate `slots` zeroed buffers of `samples_per_buffer` samples each
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - fewer than 2 slots are requested (no device look-ahead possible)
    /// - the buffer length is zero or not a whole number of stereo frames
    pub fn new(slots: usize, samples_per_buffer: usize) -> Result<Self> {
        if slots < 2 {
            return Err(FractalSoundError::ConfigError(format!(
                "Buffer pool needs at least 2 slots, got {slots}"
            )));
        }
        if samples_per_buffer == 0 || samples_per_buffer % 2 != 0 {
            return Err(FractalSoundError::ConfigError(format!(
                "Buffer length must be a non-zero multiple of 2, got {samples_per_buffer}"
            )));
        }

        let slots = (0..slots)
            .map(|_| BufferSlot {
                samples: vec![0; samples_per_buffer],
                prepared: false,
            })
            .collect();

        Ok(BufferPool { slots, current: 0 })
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a pool has at least two slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Samples per buffer
    pub fn buffer_len(&self) -> usize {
        self.slots[0].samples.len()
    }

    /// Index of the slot submitted next
    pub fn current(&self) -> usize {
        self.current
    }

    /// Move to the next slot, wrapping around
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.slots.len();
        self.current
    }

    /// Slot at `index`
    pub fn slot(&self, index: usize) -> &BufferSlot {
        &self.slots[index]
    }

    /// Mutable slot at `index`
    pub fn slot_mut(&mut self, index: usize) -> &mut BufferSlot {
        &mut self.slots[index]
    }

    /// Record whether the device accepted slot `index`
    pub fn mark_prepared(&mut self, index: usize, prepared: bool) {
        self.slots[index].prepared = prepared;
    }

    /// Number of slots the device accepted
    pub fn prepared_count(&self) -> usize {
        self.slots.iter().filter(|s| s.prepared).count()
    }

    /// Silence every slot, forget preparation and rewind to slot 0
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.samples.fill(0);
            slot.prepared = false;
        }
        self.current = 0;
    }
}
