//! Audio device integration using rodio
//!
//! rodio pulls samples from a [`Source`] on its own output thread. The source
//! below drains the engine's [`DeviceQueue`] in small batches; every buffer it
//! finishes triggers the engine's completion callback on that thread.

use super::{AudioFormat, DeviceQueue, OutputDevice};
use crate::{FractalSoundError, Result};
use rodio::{OutputStream, Sink, Source};
use std::sync::Arc;
use std::time::Duration;

/// Samples pulled from the queue per lock
const BATCH_SAMPLES: usize = 512;

/// Audio source that plays the device queue
struct QueueSource {
    queue: Arc<DeviceQueue>,
    sample_rate: u32,
    channels: u16,
    /// Internal buffer for batch reading
    batch: Vec<i16>,
    batch_pos: usize,
}

impl QueueSource {
    fn new(queue: Arc<DeviceQueue>, format: AudioFormat) -> Self {
        QueueSource {
            queue,
            sample_rate: format.sample_rate,
            channels: format.channels,
            batch: vec![0; BATCH_SAMPLES],
            batch_pos: BATCH_SAMPLES,
        }
    }
}

impl Source for QueueSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for QueueSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.batch_pos >= self.batch.len() {
            if self.queue.is_closed() {
                return None;
            }
            // Underrun leaves silence in the batch
            self.queue.read_into(&mut self.batch);
            self.batch_pos = 0;
        }

        let sample = self.batch[self.batch_pos];
        self.batch_pos += 1;
        Some(sample)
    }
}

/// Playback through the system's default output device
#[derive(Default)]
pub struct RodioDevice {
    output: Option<(OutputStream, Sink)>,
}

impl RodioDevice {
    /// Create an unopened device
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputDevice for RodioDevice {
    fn name(&self) -> &str {
        "rodio"
    }

    fn open(&mut self, format: AudioFormat, queue: Arc<DeviceQueue>) -> Result<()> {
        let (stream, stream_handle) = OutputStream::try_default().map_err(|e| {
            FractalSoundError::DeviceUnavailable(format!("Failed to create audio stream: {e}"))
        })?;

        let sink = Sink::try_new(&stream_handle).map_err(|e| {
            FractalSoundError::DeviceUnavailable(format!("Failed to create audio sink: {e}"))
        })?;

        sink.append(QueueSource::new(queue, format));
        self.output = Some((stream, sink));
        Ok(())
    }

    fn close(&mut self) {
        if let Some((_stream, sink)) = self.output.take() {
            sink.stop();
        }
    }
}

impl Drop for RodioDevice {
    fn drop(&mut self) {
        self.close();
    }
}
