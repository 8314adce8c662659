//! Real-time audio output
//!
//! A fixed pool of pre-allocated buffers is cycled through the output device:
//! whenever the device finishes playing a buffer it calls back into the engine,
//! which submits the next pending buffer and regenerates the one that was just
//! vacated. Nothing on this path allocates after start-up.

pub mod device;
pub mod engine;
pub mod pool;
#[cfg(feature = "streaming")]
pub mod rodio_device;

pub use device::{DeviceQueue, ManualDevice, OutputDevice, PacedDevice};
pub use engine::{EngineStats, RealtimeAudioEngine};
pub use pool::{BufferPool, BufferSlot};
#[cfg(feature = "streaming")]
pub use rodio_device::RodioDevice;

/// Output channels (interleaved stereo)
pub const CHANNELS: u16 = 2;

/// Bits per sample (signed 16-bit PCM)
pub const BITS_PER_SAMPLE: u16 = 16;

/// PCM format handed to the output device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Signed 16-bit little-endian stereo at `sample_rate`
    pub fn stereo_i16(sample_rate: u32) -> Self {
        AudioFormat {
            sample_rate,
            channels: CHANNELS,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }

    /// Bytes per frame (all channels)
    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }

    /// Bytes consumed per second of playback
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Playback duration of `samples` interleaved samples
    pub fn duration_of(&self, samples: usize) -> std::time::Duration {
        let frames = samples as f64 / self.channels.max(1) as f64;
        std::time::Duration::from_secs_f64(frames / self.sample_rate.max(1) as f64)
    }
}
