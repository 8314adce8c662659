//! Output device abstraction
//!
//! A device owns the playback side of a [`DeviceQueue`]: the engine writes
//! finished buffers into the queue, the device plays them in submission order
//! and reports each completed buffer through the queue's completion callback.
//! Completion notifications run on the device's own thread and never with the
//! queue lock held, so the callback is free to write the next buffer.

use super::AudioFormat;
use crate::{FractalSoundError, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

type CompletionFn = dyn Fn() + Send + Sync;

#[derive(Debug)]
struct QueueState {
    storage: Vec<Vec<i16>>,
    lens: Vec<usize>,
    head: usize,
    outstanding: usize,
    read_pos: usize,
    closed: bool,
}

impl QueueState {
    /// Drop the oldest buffer
    fn retire(&mut self) {
        self.head = (self.head + 1) % self.storage.len();
        self.outstanding -= 1;
        self.read_pos = 0;
    }
}

/// FIFO of buffers handed to the output device
///
/// Holds at most `capacity` buffers. Storage is allocated once in [`new`];
/// `write` copies into it.
///
/// [`new`]: DeviceQueue::new
pub struct DeviceQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    buffer_len: usize,
    on_complete: Box<CompletionFn>,
    submitted: AtomicU64,
    completed: AtomicU64,
    max_outstanding: AtomicUsize,
}

impl std::fmt::Debug for DeviceQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceQueue")
            .field("capacity", &self.capacity)
            .field("buffer_len", &self.buffer_len)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl DeviceQueue {
    /// Create a queue of `capacity` buffers of up to `buffer_len` samples.
    ///
    /// `on_complete` runs once per buffer the device finishes playing.
    pub fn new<F>(capacity: usize, buffer_len: usize, on_complete: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let capacity = capacity.max(1);
        DeviceQueue {
            state: Mutex::new(QueueState {
                storage: vec![vec![0; buffer_len]; capacity],
                lens: vec![0; capacity],
                head: 0,
                outstanding: 0,
                read_pos: 0,
                closed: false,
            }),
            capacity,
            buffer_len,
            on_complete: Box::new(on_complete),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            max_outstanding: AtomicUsize::new(0),
        }
    }

    /// Queue a copy of `samples` for playback
    ///
    /// # Errors
    ///
    /// - [`FractalSoundError::DeviceClosed`] once the queue has been closed
    /// - [`FractalSoundError::QueueFull`] when `capacity` buffers are in flight
    /// - [`FractalSoundError::Submit`] when `samples` exceeds the buffer length
    pub fn write(&self, samples: &[i16]) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(FractalSoundError::DeviceClosed);
        }
        if state.outstanding == self.capacity {
            return Err(FractalSoundError::QueueFull {
                capacity: self.capacity,
            });
        }
        if samples.len() > self.buffer_len {
            return Err(FractalSoundError::Submit(format!(
                "buffer of {} samples exceeds device buffer of {}",
                samples.len(),
                self.buffer_len
            )));
        }

        let index = (state.head + state.outstanding) % self.capacity;
        state.storage[index][..samples.len()].copy_from_slice(samples);
        state.lens[index] = samples.len();
        state.outstanding += 1;

        self.max_outstanding
            .fetch_max(state.outstanding, Ordering::Relaxed);
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Play queued samples into `out`, returning how many came from buffers.
    ///
    /// The remainder of `out` is filled with silence (underrun). Every buffer
    /// drained completely is retired and reported through the completion
    /// callback after the lock is released.
    pub fn read_into(&self, out: &mut [i16]) -> usize {
        let mut written = 0;
        let mut finished = 0;
        {
            let mut state = self.state.lock();
            while written < out.len() && state.outstanding > 0 && !state.closed {
                let head = state.head;
                let len = state.lens[head];
                let take = (len - state.read_pos).min(out.len() - written);
                let from = state.read_pos;
                out[written..written + take]
                    .copy_from_slice(&state.storage[head][from..from + take]);
                written += take;
                state.read_pos += take;
                if state.read_pos >= len {
                    state.retire();
                    finished += 1;
                }
            }
        }
        out[written..].fill(0);

        for _ in 0..finished {
            self.notify_complete();
        }
        written
    }

    /// Mark the oldest buffer as played without reading it.
    ///
    /// Returns false if nothing was in flight.
    pub fn complete_next(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.outstanding == 0 || state.closed {
                return false;
            }
            state.retire();
        }
        self.notify_complete();
        true
    }

    fn notify_complete(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        (self.on_complete)();
    }

    /// Drop every pending buffer without reporting completion
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.head = 0;
        state.outstanding = 0;
        state.read_pos = 0;
    }

    /// Refuse further writes; the device stops playing
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Buffers written but not yet played
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }

    /// Highest number of buffers ever in flight at once
    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding.load(Ordering::Relaxed)
    }

    /// Buffers accepted by `write` since creation
    pub fn submitted_total(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Buffers reported as played since creation
    pub fn completed_total(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Maximum buffers in flight
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples per buffer
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }
}

/// A sink for 16-bit PCM buffers
pub trait OutputDevice {
    /// Short device name for log output
    fn name(&self) -> &str;

    /// Open the device for `format` and start draining `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`FractalSoundError::DeviceUnavailable`] if no device can be
    /// opened.
    fn open(&mut self, format: AudioFormat, queue: Arc<DeviceQueue>) -> Result<()>;

    /// Register pool slot `slot` holding `samples` samples with the device.
    ///
    /// The default accepts any buffer made of whole frames.
    fn prepare(&mut self, slot: usize, samples: usize, format: &AudioFormat) -> Result<()> {
        if samples == 0 || samples % format.channels.max(1) as usize != 0 {
            return Err(FractalSoundError::BufferPreparation {
                slot,
                reason: format!(
                    "{samples} samples is not a whole number of {}-channel frames",
                    format.channels
                ),
            });
        }
        Ok(())
    }

    /// Stop playback and release the device. Safe to call twice.
    fn close(&mut self);
}

/// Device that consumes buffers at real-time rate without producing sound
///
/// A background thread retires one buffer per buffer duration. Used for
/// headless runs and for exercising the engine's callback path in tests.
#[derive(Debug, Default)]
pub struct PacedDevice {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PacedDevice {
    /// Create an unopened paced device
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputDevice for PacedDevice {
    fn name(&self) -> &str {
        "paced"
    }

    fn open(&mut self, format: AudioFormat, queue: Arc<DeviceQueue>) -> Result<()> {
        if self.worker.is_some() {
            return Err(FractalSoundError::DeviceUnavailable(
                "paced device already open".into(),
            ));
        }
        self.stop.store(false, Ordering::SeqCst);

        let stop = Arc::clone(&self.stop);
        let period = format.duration_of(queue.buffer_len());
        let worker = thread::Builder::new()
            .name("fractal-sound-device".into())
            .spawn(move || {
                let mut deadline = Instant::now();
                while !stop.load(Ordering::SeqCst) && !queue.is_closed() {
                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else {
                        deadline = now;
                    }
                    queue.complete_next();
                }
            })
            .map_err(|e| {
                FractalSoundError::DeviceUnavailable(format!("Failed to spawn device thread: {e}"))
            })?;

        self.worker = Some(worker);
        Ok(())
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("paced device thread panicked");
            }
        }
    }
}

impl Drop for PacedDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Device whose buffer completions are driven by the caller
///
/// Nothing is played; call [`DeviceQueue::complete_next`] on the queue the
/// engine hands out to simulate the device finishing a buffer. Open and
/// prepare failures can be injected.
#[derive(Debug, Default)]
pub struct ManualDevice {
    open_error: Option<String>,
    failing_slots: HashSet<usize>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl ManualDevice {
    /// Create a device that opens and prepares successfully
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open` fail with `reason`
    pub fn fail_open(mut self, reason: impl Into<String>) -> Self {
        self.open_error = Some(reason.into());
        self
    }

    /// Make `prepare` fail for `slot`
    pub fn fail_prepare(mut self, slot: usize) -> Self {
        self.failing_slots.insert(slot);
        self
    }

    /// Shared counters of successful opens and of closes
    pub fn counters(&self) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (Arc::clone(&self.opened), Arc::clone(&self.closed))
    }
}

impl OutputDevice for ManualDevice {
    fn name(&self) -> &str {
        "manual"
    }

    fn open(&mut self, _format: AudioFormat, _queue: Arc<DeviceQueue>) -> Result<()> {
        if let Some(reason) = &self.open_error {
            return Err(FractalSoundError::DeviceUnavailable(reason.clone()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn prepare(&mut self, slot: usize, samples: usize, format: &AudioFormat) -> Result<()> {
        if self.failing_slots.contains(&slot) {
            return Err(FractalSoundError::BufferPreparation {
                slot,
                reason: "rejected by device".into(),
            });
        }
        if samples % format.channels.max(1) as usize != 0 {
            return Err(FractalSoundError::BufferPreparation {
                slot,
                reason: "partial frame".into(),
            });
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
