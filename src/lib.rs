//! Fractal Sound
//!
//! Turns the orbit of an iterated map into an audible stereo waveform in real
//! time. A hardware audio callback asks the synthesizer for the next buffer; the
//! synthesizer advances the selected map, derives a direction signal from
//! successive orbit points and writes interpolated 16-bit PCM samples.
//!
//! # Features
//! - Eight iterated maps (Mandelbrot, Burning Ship, Feather, SFX, Hénon,
//!   Duffing, Ikeda, Chirikov)
//! - Escape detection with automatic pause of diverging orbits
//! - Normalized and mean-relative direction signals
//! - Cosine interpolation between iteration steps
//! - Sustain mode or exponential volume decay
//! - Fixed pool of pre-allocated buffers submitted to the output device in
//!   strict FIFO order from the device callback
//! - Orbit trace helper for drawing the orbit overlay
//!
//! # Crate feature flags
//! - `streaming` (opt-in): Real-time audio output through `rodio`
//!
//! # Quick start
//! ## Synthesizer only
//! ```
//! use std::sync::Arc;
//! use fractal_sound::{EngineConfig, MapKind, OrbitSynthesizer, SynthControl};
//!
//! let config = EngineConfig::default();
//! let control = Arc::new(SynthControl::new());
//! let mut synth = OrbitSynthesizer::new(&config, Arc::clone(&control));
//!
//! control.set_map(MapKind::Mandelbrot, None);
//! control.set_target_point(-0.5, 0.0);
//!
//! let mut chunk = vec![0i16; config.buffer_samples];
//! let live = synth.fill_chunk(&mut chunk);
//! assert!(live);
//! ```
//!
//! ## Real-time engine
//! ```no_run
//! use fractal_sound::{EngineConfig, PacedDevice, RealtimeAudioEngine};
//!
//! let mut engine = RealtimeAudioEngine::new(EngineConfig::default(), Box::new(PacedDevice::new()))
//!     .unwrap();
//! engine.start().unwrap();
//! engine.control().select_map(4).unwrap();
//! engine.control().set_target_point(0.3, 0.2);
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! engine.stop();
//! ```

#![warn(missing_docs)]

pub mod config; // Engine configuration
pub mod maps; // Iterated maps
pub mod streaming; // Buffer pool, device contract and engine
pub mod synth; // Orbit synthesizer
pub mod trace; // Orbit trace overlay

/// Error types for orbit synthesis and audio output
#[derive(thiserror::Error, Debug)]
pub enum FractalSoundError {
    /// The audio output device could not be opened
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A pool buffer could not be prepared for the device
    #[error("Failed to prepare buffer {slot}: {reason}")]
    BufferPreparation {
        /// Index of the buffer slot in the pool
        slot: usize,
        /// Driver diagnostic text
        reason: String,
    },

    /// Writing a buffer to the device failed
    #[error("Buffer submission failed: {0}")]
    Submit(String),

    /// The device already holds the maximum number of buffers
    #[error("Device queue full ({capacity} buffers outstanding)")]
    QueueFull {
        /// Number of buffers the device accepts at once
        capacity: usize,
    },

    /// The device was closed
    #[error("Audio device closed")]
    DeviceClosed,

    /// Map index outside of the fixed map table
    #[error("Invalid map index {0} (expected 0-7)")]
    InvalidMapIndex(usize),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for FractalSoundError {
    /// Converts a String into `FractalSoundError::Other`.
    ///
    /// Prefer the specific variants (`DeviceUnavailable`, `ConfigError`, ...) where
    /// the failure kind is known; this conversion exists for driver messages that
    /// have no better home.
    fn from(msg: String) -> Self {
        FractalSoundError::Other(msg)
    }
}

impl From<&str> for FractalSoundError {
    /// Converts a string slice into `FractalSoundError::Other`.
    fn from(msg: &str) -> Self {
        FractalSoundError::Other(msg.to_string())
    }
}

/// Result type for synthesis and audio output operations
pub type Result<T> = std::result::Result<T, FractalSoundError>;

// Public API exports
pub use config::EngineConfig;
pub use maps::{DeltaMode, MapKind, Point};
pub use streaming::{
    AudioFormat, BufferPool, DeviceQueue, EngineStats, ManualDevice, OutputDevice, PacedDevice,
    RealtimeAudioEngine,
};
pub use synth::{OrbitSettings, OrbitState, OrbitStatus, OrbitSynthesizer, SynthControl};
pub use trace::OrbitTrace;

#[cfg(feature = "streaming")]
pub use streaming::RodioDevice;
