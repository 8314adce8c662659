//! Engine configuration
//!
//! All tunables of the synthesizer and the buffer pool live in one
//! serde-serialisable struct so they can be loaded from a JSON file. Missing
//! fields fall back to the defaults below.

use crate::streaming::AudioFormat;
use crate::{FractalSoundError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default output sample rate (48 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Highest iteration rate in Hz; one map step never spans fewer frames than
/// `sample_rate / DEFAULT_MAX_FREQUENCY`
pub const DEFAULT_MAX_FREQUENCY: u32 = 4_000;

/// Number of buffers in the pool
pub const DEFAULT_BUFFER_COUNT: usize = 5;

/// Interleaved samples per buffer (2048 stereo frames)
pub const DEFAULT_BUFFER_SAMPLES: usize = 4096;

/// Buffers submitted at start-up to cover device look-ahead
pub const DEFAULT_PRIMED_BUFFERS: usize = 2;

/// Squared orbit radius beyond which an orbit counts as escaped
pub const DEFAULT_ESCAPE_RADIUS_SQ: f64 = 1000.0;

/// Amplitude an orbit starts with after a reset
pub const DEFAULT_START_VOLUME: f64 = 8000.0;

/// Per-step volume factor when sustain is off
pub const DEFAULT_VOLUME_DECAY: f64 = 0.9992;

/// Per-step weight of the running mean in mean-relative mode
pub const DEFAULT_MEAN_DECAY: f64 = 0.99;

/// Squared magnitude above which a delta vector is rescaled
pub const DEFAULT_DELTA_CEILING: f64 = 2.0;

/// Output sample clamp
pub const DEFAULT_SAMPLE_LIMIT: f64 = 32_000.0;

/// Frame rate of the UI that draws the orbit trace
pub const DEFAULT_TARGET_FPS: u32 = 60;

/// Configuration for the orbit synthesizer and the real-time engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Maximum iteration frequency in Hz
    pub max_frequency: u32,
    /// Number of buffers in the pool
    pub buffer_count: usize,
    /// Interleaved stereo samples per buffer
    pub buffer_samples: usize,
    /// Buffers submitted immediately by `start()`
    pub primed_buffers: usize,
    /// Squared escape radius
    pub escape_radius_sq: f64,
    /// Volume after a reset
    pub start_volume: f64,
    /// Per-step volume decay factor (sustain off)
    pub volume_decay: f64,
    /// Running-mean decay factor
    pub mean_decay: f64,
    /// Squared magnitude ceiling of delta vectors
    pub delta_ceiling: f64,
    /// Absolute sample clamp
    pub sample_limit: f64,
    /// UI frame rate used by the orbit trace
    pub target_fps: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_frequency: DEFAULT_MAX_FREQUENCY,
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_samples: DEFAULT_BUFFER_SAMPLES,
            primed_buffers: DEFAULT_PRIMED_BUFFERS,
            escape_radius_sq: DEFAULT_ESCAPE_RADIUS_SQ,
            start_volume: DEFAULT_START_VOLUME,
            volume_decay: DEFAULT_VOLUME_DECAY,
            mean_decay: DEFAULT_MEAN_DECAY,
            delta_ceiling: DEFAULT_DELTA_CEILING,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            target_fps: DEFAULT_TARGET_FPS,
        }
    }
}

impl EngineConfig {
    /// Set the output sample rate
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the maximum iteration frequency
    pub fn max_frequency(mut self, max_frequency: u32) -> Self {
        self.max_frequency = max_frequency;
        self
    }

    /// Set the number of pool buffers
    pub fn buffer_count(mut self, buffer_count: usize) -> Self {
        self.buffer_count = buffer_count;
        self
    }

    /// Set the interleaved sample count per buffer
    pub fn buffer_samples(mut self, buffer_samples: usize) -> Self {
        self.buffer_samples = buffer_samples;
        self
    }

    /// Set the number of buffers primed at start-up
    pub fn primed_buffers(mut self, primed_buffers: usize) -> Self {
        self.primed_buffers = primed_buffers;
        self
    }

    /// Set the squared escape radius
    pub fn escape_radius_sq(mut self, escape_radius_sq: f64) -> Self {
        self.escape_radius_sq = escape_radius_sq;
        self
    }

    /// Parse a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check that the configuration describes a usable engine
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(FractalSoundError::ConfigError(
                "sample_rate must be greater than 0".into(),
            ));
        }
        if self.max_frequency == 0 {
            return Err(FractalSoundError::ConfigError(
                "max_frequency must be greater than 0".into(),
            ));
        }
        if self.buffer_count < 2 {
            return Err(FractalSoundError::ConfigError(format!(
                "buffer_count must be at least 2, got {}",
                self.buffer_count
            )));
        }
        if self.buffer_samples == 0 || self.buffer_samples % 2 != 0 {
            return Err(FractalSoundError::ConfigError(format!(
                "buffer_samples must be a non-zero multiple of 2, got {}",
                self.buffer_samples
            )));
        }
        if self.primed_buffers == 0 || self.primed_buffers >= self.buffer_count {
            return Err(FractalSoundError::ConfigError(format!(
                "primed_buffers must be in 1..{}, got {}",
                self.buffer_count, self.primed_buffers
            )));
        }
        if !(self.escape_radius_sq > 0.0) {
            return Err(FractalSoundError::ConfigError(
                "escape_radius_sq must be positive".into(),
            ));
        }
        if !(self.start_volume.is_finite() && self.start_volume >= 0.0) {
            return Err(FractalSoundError::ConfigError(format!(
                "start_volume must be finite and non-negative, got {}",
                self.start_volume
            )));
        }
        if !(0.0..=1.0).contains(&self.volume_decay) || !(0.0..=1.0).contains(&self.mean_decay) {
            return Err(FractalSoundError::ConfigError(
                "volume_decay and mean_decay must be within 0.0..=1.0".into(),
            ));
        }
        if !(self.delta_ceiling > 0.0) {
            return Err(FractalSoundError::ConfigError(
                "delta_ceiling must be positive".into(),
            ));
        }
        if !(self.sample_limit > 0.0 && self.sample_limit <= i16::MAX as f64) {
            return Err(FractalSoundError::ConfigError(format!(
                "sample_limit must be within 0..={}",
                i16::MAX
            )));
        }
        if self.target_fps == 0 {
            return Err(FractalSoundError::ConfigError(
                "target_fps must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Audio frames spent on each map iteration
    pub fn steps_per_iteration(&self) -> u32 {
        (self.sample_rate / self.max_frequency.max(1)).max(1)
    }

    /// Stereo frames per buffer
    pub fn frames_per_buffer(&self) -> usize {
        self.buffer_samples / 2
    }

    /// Output format handed to the device
    pub fn format(&self) -> AudioFormat {
        AudioFormat::stereo_i16(self.sample_rate)
    }

    /// Playback duration of one buffer in milliseconds
    pub fn buffer_duration_ms(&self) -> f32 {
        (self.frames_per_buffer() as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Device look-ahead latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        self.buffer_duration_ms() * self.primed_buffers as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.steps_per_iteration(), 12);
        assert_eq!(config.frames_per_buffer(), 2048);
    }

    #[test]
    fn test_latency() {
        let config = EngineConfig::default();
        // 2048 frames @ 48 kHz ≈ 42.7 ms per buffer, two primed
        let latency = config.latency_ms();
        assert!(latency > 85.0 && latency < 86.0, "latency {latency}");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "sample_rate": 44100 }"#).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.buffer_count, DEFAULT_BUFFER_COUNT);
        assert_eq!(config.steps_per_iteration(), 11);
    }

    #[test]
    fn test_rejects_odd_buffer() {
        let err = EngineConfig::default().buffer_samples(4095).validate();
        assert!(matches!(err, Err(FractalSoundError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_priming_whole_pool() {
        let err = EngineConfig::default()
            .buffer_count(2)
            .primed_buffers(2)
            .validate();
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_unusable_start_volume() {
        for volume in [f64::NAN, f64::INFINITY, -1.0] {
            let config = EngineConfig {
                start_volume: volume,
                ..EngineConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(FractalSoundError::ConfigError(_))),
                "start_volume {volume} accepted"
            );
        }
        // JSON cannot spell NaN, but a huge literal overflows to infinity
        let err = EngineConfig::from_json_str(r#"{ "start_volume": 1e400 }"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_bad_json_is_reported() {
        let err = EngineConfig::from_json_str("{ sample_rate: }");
        assert!(matches!(err, Err(FractalSoundError::Json(_))));
    }

    #[test]
    fn test_high_max_frequency_still_steps() {
        let config = EngineConfig::default().max_frequency(96_000);
        assert_eq!(config.steps_per_iteration(), 1);
    }
}
