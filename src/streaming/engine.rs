//! Real-time audio engine
//!
//! Owns the buffer pool, the orbit synthesizer and the output device, and runs
//! the device callback: submit the current buffer, advance, regenerate the
//! buffer that is now current. The pool index, the pool buffers and the
//! synthesizer state are only touched under one engine lock; the callback holds
//! it for exactly one submission plus one chunk of synthesis.

use super::device::{DeviceQueue, OutputDevice};
use super::pool::BufferPool;
use super::AudioFormat;
use crate::config::EngineConfig;
use crate::synth::{OrbitSynthesizer, SynthControl};
use crate::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Counters collected by the callback path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Device completion callbacks handled
    pub callbacks: u64,
    /// Buffers accepted by the device
    pub submitted: u64,
    /// Buffers the device rejected
    pub submit_errors: u64,
    /// Times the ring stepped over a slot the device never prepared
    pub skipped_slots: u64,
    /// Chunks that carried new audio
    pub live_chunks: u64,
    /// Chunks left silent (paused, escaped or superseded)
    pub silent_chunks: u64,
}

#[derive(Debug, Default)]
struct Counters {
    callbacks: AtomicU64,
    submitted: AtomicU64,
    submit_errors: AtomicU64,
    skipped_slots: AtomicU64,
    live_chunks: AtomicU64,
    silent_chunks: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> EngineStats {
        EngineStats {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            submit_errors: self.submit_errors.load(Ordering::Relaxed),
            skipped_slots: self.skipped_slots.load(Ordering::Relaxed),
            live_chunks: self.live_chunks.load(Ordering::Relaxed),
            silent_chunks: self.silent_chunks.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct EngineInner {
    pool: BufferPool,
    synth: OrbitSynthesizer,
    queue: Option<Arc<DeviceQueue>>,
}

impl EngineInner {
    /// Move `current` forward past slots the device never prepared.
    ///
    /// Returns false if no slot in the pool is prepared.
    fn skip_unprepared(&mut self, counters: &Counters) -> bool {
        for _ in 0..self.pool.len() {
            let index = self.pool.current();
            if self.pool.slot(index).is_prepared() {
                return true;
            }
            log::trace!("skipping unprepared buffer {index}");
            Counters::bump(&counters.skipped_slots);
            self.pool.advance();
        }
        false
    }

    /// Submit the current slot, advance, and regenerate the new current slot.
    ///
    /// Unprepared slots are stepped over on both sides so every callback
    /// submits exactly one buffer and the device queue depth stays constant.
    fn submit_and_refill(&mut self, counters: &Counters) {
        let Some(queue) = self.queue.clone() else {
            return;
        };
        if !self.skip_unprepared(counters) {
            return;
        }

        let index = self.pool.current();
        match queue.write(self.pool.slot(index).samples()) {
            Ok(()) => Counters::bump(&counters.submitted),
            Err(e) => {
                log::error!("Failed to submit buffer {index}: {e}");
                Counters::bump(&counters.submit_errors);
            }
        }

        self.pool.advance();
        self.skip_unprepared(counters);
        let next = self.pool.current();
        let live = self.synth.fill_chunk(self.pool.slot_mut(next).samples_mut());
        if live {
            Counters::bump(&counters.live_chunks);
        } else {
            Counters::bump(&counters.silent_chunks);
        }
    }
}

/// State reachable from the device thread
struct EngineShared {
    releasing: AtomicBool,
    inner: Mutex<EngineInner>,
    counters: Counters,
}

impl EngineShared {
    fn on_buffer_complete(&self) {
        if self.releasing.load(Ordering::Acquire) {
            return;
        }
        let mut inner = self.inner.lock();
        // stop() may have won the lock while we waited
        if self.releasing.load(Ordering::Acquire) {
            return;
        }
        Counters::bump(&self.counters.callbacks);
        inner.submit_and_refill(&self.counters);
    }
}

/// Buffer-pool audio engine driving an [`OutputDevice`]
pub struct RealtimeAudioEngine {
    config: EngineConfig,
    format: AudioFormat,
    control: Arc<SynthControl>,
    shared: Arc<EngineShared>,
    device: Box<dyn OutputDevice>,
    queue: Option<Arc<DeviceQueue>>,
    running: bool,
}

impl RealtimeAudioEngine {
    /// Create an engine for `device`. Nothing is opened until [`start`].
    ///
    /// [`start`]: RealtimeAudioEngine::start
    ///
    /// # Errors
    ///
    /// Returns [`crate::FractalSoundError::ConfigError`] for an invalid config.
    pub fn new(config: EngineConfig, device: Box<dyn OutputDevice>) -> Result<Self> {
        config.validate()?;

        let control = Arc::new(SynthControl::new());
        let pool = BufferPool::new(config.buffer_count, config.buffer_samples)?;
        let synth = OrbitSynthesizer::new(&config, Arc::clone(&control));

        Ok(RealtimeAudioEngine {
            format: config.format(),
            config,
            control,
            shared: Arc::new(EngineShared {
                releasing: AtomicBool::new(false),
                inner: Mutex::new(EngineInner {
                    pool,
                    synth,
                    queue: None,
                }),
                counters: Counters::default(),
            }),
            device,
            queue: None,
            running: false,
        })
    }

    /// Open the device, prepare every pool buffer and prime the device.
    ///
    /// Buffers the device refuses to prepare are logged and stepped over by
    /// the callback. Calling `start` on a running engine does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FractalSoundError::DeviceUnavailable`] if the device
    /// cannot be opened, or [`crate::FractalSoundError::BufferPreparation`] if
    /// it rejected every buffer. The engine stays stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            log::warn!("audio engine already running");
            return Ok(());
        }

        self.shared.releasing.store(false, Ordering::Release);

        let weak = Arc::downgrade(&self.shared);
        let queue = Arc::new(DeviceQueue::new(
            self.config.buffer_count,
            self.config.buffer_samples,
            move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_buffer_complete();
                }
            },
        ));

        if let Err(e) = self.device.open(self.format, Arc::clone(&queue)) {
            log::error!("Failed to open {} output device: {e}", self.device.name());
            return Err(e);
        }

        {
            let mut inner = self.shared.inner.lock();
            inner.pool.reset();
            let mut last_error = None;
            for slot in 0..inner.pool.len() {
                match self
                    .device
                    .prepare(slot, self.config.buffer_samples, &self.format)
                {
                    Ok(()) => inner.pool.mark_prepared(slot, true),
                    Err(e) => {
                        log::error!("{e}");
                        last_error = Some(e);
                    }
                }
            }
            match (inner.pool.prepared_count(), last_error) {
                (0, Some(e)) => {
                    drop(inner);
                    queue.close();
                    self.device.close();
                    return Err(e);
                }
                (prepared, Some(_)) => log::warn!(
                    "only {prepared} of {} buffers prepared; running degraded",
                    self.config.buffer_count
                ),
                _ => {}
            }
            inner.queue = Some(Arc::clone(&queue));

            for _ in 0..self.config.primed_buffers {
                inner.submit_and_refill(&self.shared.counters);
            }
        }

        self.queue = Some(queue);
        self.running = true;

        log::info!(
            "audio engine started on {} device: {} Hz, {} buffers x {} samples, {:.1} ms latency",
            self.device.name(),
            self.format.sample_rate,
            self.config.buffer_count,
            self.config.buffer_samples,
            self.config.latency_ms()
        );
        Ok(())
    }

    /// Stop playback and release the device. Safe to call repeatedly and while
    /// a device callback is in flight.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }

        self.shared.releasing.store(true, Ordering::Release);
        {
            let mut inner = self.shared.inner.lock();
            if let Some(queue) = inner.queue.take() {
                queue.reset();
                queue.close();
            }
        }
        // Device threads may still be waiting on the engine lock; it must be
        // free before the device joins them.
        self.device.close();
        self.queue = None;
        self.running = false;

        let stats = self.stats();
        log::info!(
            "audio engine stopped: {} callbacks, {} buffers submitted, {} errors, {} skipped",
            stats.callbacks,
            stats.submitted,
            stats.submit_errors,
            stats.skipped_slots
        );
    }

    /// Device completion callback.
    ///
    /// Devices reach the engine through the queue's completion hook; this entry
    /// point runs the same path for callers that drive the engine directly.
    pub fn on_buffer_complete(&self) {
        self.shared.on_buffer_complete();
    }

    /// Control handle for the UI thread
    pub fn control(&self) -> Arc<SynthControl> {
        Arc::clone(&self.control)
    }

    /// Whether the device is open and being fed
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Snapshot of the callback counters
    pub fn stats(&self) -> EngineStats {
        self.shared.counters.snapshot()
    }

    /// Index of the pool slot submitted next
    pub fn current_index(&self) -> usize {
        self.shared.inner.lock().pool.current()
    }

    /// Device-side queue while running
    pub fn device_queue(&self) -> Option<Arc<DeviceQueue>> {
        self.queue.clone()
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Output format
    pub fn format(&self) -> AudioFormat {
        self.format
    }
}

impl Drop for RealtimeAudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{ManualDevice, PacedDevice};
    use crate::FractalSoundError;
    use std::time::Duration;

    fn small_config() -> EngineConfig {
        EngineConfig::default().buffer_samples(96)
    }

    #[test]
    fn test_start_primes_two_buffers() {
        let mut engine = RealtimeAudioEngine::new(small_config(), Box::new(ManualDevice::new()))
            .unwrap();
        engine.start().unwrap();

        let queue = engine.device_queue().unwrap();
        assert_eq!(queue.outstanding(), 2);
        assert_eq!(engine.current_index(), 2);
        assert_eq!(engine.stats().callbacks, 0);
        assert_eq!(engine.stats().submitted, 2);
    }

    #[test]
    fn test_callback_keeps_pool_in_flight_bounded() {
        let config = small_config();
        let mut engine =
            RealtimeAudioEngine::new(config, Box::new(ManualDevice::new())).unwrap();
        engine.start().unwrap();
        engine.control().set_target_point(-0.5, 0.0);

        let queue = engine.device_queue().unwrap();
        let mut order = Vec::new();
        for _ in 0..23 {
            assert!(queue.complete_next());
            order.push(engine.current_index());
        }

        assert!(queue.max_outstanding() <= config.buffer_count);
        assert_eq!(queue.outstanding(), 2);
        let expected: Vec<usize> = (0..23).map(|i| (i + 3) % config.buffer_count).collect();
        assert_eq!(order, expected);

        let stats = engine.stats();
        assert_eq!(stats.callbacks, 23);
        assert_eq!(stats.submitted, 25);
        assert!(stats.live_chunks > 0);
    }

    #[test]
    fn test_start_fails_without_device() {
        let device = ManualDevice::new().fail_open("no audio hardware");
        let mut engine = RealtimeAudioEngine::new(small_config(), Box::new(device)).unwrap();
        assert!(matches!(
            engine.start(),
            Err(FractalSoundError::DeviceUnavailable(_))
        ));
        assert!(!engine.is_running());
        assert!(engine.device_queue().is_none());
    }

    #[test]
    fn test_unprepared_slot_keeps_stream_alive() {
        let device = ManualDevice::new().fail_prepare(1);
        let mut engine = RealtimeAudioEngine::new(small_config(), Box::new(device)).unwrap();
        engine.start().unwrap();

        // slots 0 and 2 primed, slot 1 stepped over
        let stats = engine.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.skipped_slots, 1);
        assert_eq!(engine.current_index(), 3);

        let queue = engine.device_queue().unwrap();
        for _ in 0..50 {
            assert!(queue.complete_next(), "device queue ran dry");
            assert_eq!(queue.outstanding(), 2);
            assert_ne!(engine.current_index(), 1);
        }
        let stats = engine.stats();
        assert_eq!(stats.submitted, 52);
        assert!(stats.skipped_slots >= 10);
        assert_eq!(stats.submit_errors, 0);
    }

    #[test]
    fn test_single_prepared_slot_still_streams() {
        let device = ManualDevice::new()
            .fail_prepare(0)
            .fail_prepare(1)
            .fail_prepare(2)
            .fail_prepare(3);
        let mut engine = RealtimeAudioEngine::new(small_config(), Box::new(device)).unwrap();
        engine.start().unwrap();

        let queue = engine.device_queue().unwrap();
        assert_eq!(queue.outstanding(), 2);
        for _ in 0..20 {
            assert!(queue.complete_next());
        }
        assert_eq!(engine.current_index(), 4);
    }

    #[test]
    fn test_start_fails_when_no_slot_prepared() {
        let mut device = ManualDevice::new();
        for slot in 0..5 {
            device = device.fail_prepare(slot);
        }
        let (_, closed) = device.counters();
        let mut engine = RealtimeAudioEngine::new(small_config(), Box::new(device)).unwrap();
        assert!(matches!(
            engine.start(),
            Err(FractalSoundError::BufferPreparation { slot: 4, .. })
        ));
        assert!(!engine.is_running());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let device = ManualDevice::new();
        let (opened, closed) = device.counters();
        let mut engine = RealtimeAudioEngine::new(small_config(), Box::new(device)).unwrap();
        engine.start().unwrap();
        let queue = engine.device_queue().unwrap();

        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
        assert!(queue.is_closed());
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        // callbacks after stop do nothing
        let before = engine.stats();
        engine.on_buffer_complete();
        assert_eq!(engine.stats(), before);
    }

    #[test]
    fn test_restart_after_stop() {
        let mut engine = RealtimeAudioEngine::new(small_config(), Box::new(ManualDevice::new()))
            .unwrap();
        engine.start().unwrap();
        engine.stop();
        engine.start().unwrap();
        assert!(engine.is_running());
        assert_eq!(engine.current_index(), 2);
        assert_eq!(engine.device_queue().unwrap().outstanding(), 2);
    }

    #[test]
    fn test_start_twice_is_noop() {
        let device = ManualDevice::new();
        let (opened, _) = device.counters();
        let mut engine = RealtimeAudioEngine::new(small_config(), Box::new(device)).unwrap();
        engine.start().unwrap();
        engine.start().unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig::default().buffer_count(1);
        assert!(RealtimeAudioEngine::new(config, Box::new(ManualDevice::new())).is_err());
    }

    #[test]
    fn test_stop_while_device_thread_runs() {
        let mut engine = RealtimeAudioEngine::new(small_config(), Box::new(PacedDevice::new()))
            .unwrap();
        engine.start().unwrap();
        engine.control().set_target_point(-0.5, 0.0);
        std::thread::sleep(Duration::from_millis(30));

        let queue = engine.device_queue().unwrap();
        engine.stop();
        let submitted = queue.submitted_total();
        let stats = engine.stats();
        std::thread::sleep(Duration::from_millis(10));

        assert!(stats.callbacks > 0);
        assert_eq!(stats.submit_errors, 0);
        assert_eq!(queue.submitted_total(), submitted);
        assert_eq!(engine.stats(), stats);
    }
}
