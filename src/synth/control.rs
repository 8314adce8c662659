//! Shared control block between the UI thread and the audio callback
//!
//! The seed point, parameter point, map selection and the `reset` / `paused`
//! flags are the only orbit fields written by the control thread and read by the
//! audio thread. They live behind a single `parking_lot::Mutex` that is only ever
//! held for field copies, so neither side waits on map iteration or buffer work.

use crate::maps::{MapKind, Point};
use crate::{FractalSoundError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Versioned orbit selection supplied by the UI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitSettings {
    /// Incremented on every change
    pub revision: u64,
    /// Selected map
    pub map: MapKind,
    /// Seed point of the orbit
    pub seed: Point,
    /// External (Julia) parameter; `None` uses the seed as parameter
    pub parameter: Option<Point>,
    /// When set, volume does not decay over time
    pub sustain: bool,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            revision: 0,
            map: MapKind::Mandelbrot,
            seed: Point::ZERO,
            parameter: None,
            sustain: true,
        }
    }
}

impl OrbitSettings {
    /// Parameter point actually used for iteration
    pub fn effective_parameter(&self) -> Point {
        self.parameter.unwrap_or(self.seed)
    }
}

/// Orbit progress published by the audio thread after every chunk
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrbitStatus {
    /// Latest orbit point
    pub point: Point,
    /// Orbit point before `point`
    pub previous: Point,
    /// Orbit is paused or has escaped
    pub paused: bool,
    /// Current amplitude envelope
    pub volume: f64,
    /// Settings revision the audio thread is playing
    pub revision: u64,
}

/// Flags consumed by the audio thread at the start of a chunk
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkControl {
    /// Settings to reinitialise from, when a reset was pending
    pub reset: Option<OrbitSettings>,
    pub paused: bool,
    pub sustain: bool,
    /// Settings revision in force for this chunk
    pub revision: u64,
}

#[derive(Debug)]
struct ControlBlock {
    settings: OrbitSettings,
    reset: bool,
    paused: bool,
    status: OrbitStatus,
}

/// Cross-thread control surface of the orbit synthesizer
#[derive(Debug)]
pub struct SynthControl {
    inner: Mutex<ControlBlock>,
}

impl Default for SynthControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthControl {
    /// Create a control block with a reset pending for the default settings
    pub fn new() -> Self {
        Self::with_settings(OrbitSettings::default())
    }

    /// Create a control block for the given settings.
    ///
    /// The orbit starts paused; nothing plays until a target point is set.
    pub fn with_settings(settings: OrbitSettings) -> Self {
        SynthControl {
            inner: Mutex::new(ControlBlock {
                settings,
                reset: true,
                paused: true,
                status: OrbitStatus {
                    point: settings.seed,
                    previous: settings.seed,
                    paused: true,
                    volume: 0.0,
                    revision: settings.revision,
                },
            }),
        }
    }

    /// Record a new seed point and request a reset; clears the pause.
    pub fn set_target_point(&self, x: f64, y: f64) {
        let mut block = self.inner.lock();
        block.settings.seed = Point::new(x, y);
        block.settings.revision += 1;
        block.reset = true;
        block.paused = false;
    }

    /// Select a map together with its parameter point. Pauses the orbit and
    /// requests a reset.
    pub fn set_map(&self, map: MapKind, parameter: Option<Point>) {
        let mut block = self.inner.lock();
        block.settings.map = map;
        block.settings.parameter = parameter;
        block.settings.revision += 1;
        block.reset = true;
        block.paused = true;
    }

    /// Select a map by table index, dropping any external parameter point
    pub fn select_map(&self, index: usize) -> Result<MapKind> {
        let map = MapKind::from_index(index).ok_or(FractalSoundError::InvalidMapIndex(index))?;
        self.set_map(map, None);
        Ok(map)
    }

    /// Use an external (Julia) parameter point
    pub fn set_parameter_point(&self, x: f64, y: f64) {
        self.update_parameter(Some(Point::new(x, y)));
    }

    /// Go back to using the seed as parameter
    pub fn clear_parameter_point(&self) {
        self.update_parameter(None);
    }

    fn update_parameter(&self, parameter: Option<Point>) {
        let mut block = self.inner.lock();
        block.settings.parameter = parameter;
        block.settings.revision += 1;
        block.reset = true;
        block.paused = true;
    }

    /// Silence the orbit until a new seed is set
    pub fn pause(&self) {
        self.inner.lock().paused = true;
    }

    /// Enable or disable sustain mode
    pub fn set_sustain(&self, sustain: bool) {
        let mut block = self.inner.lock();
        if block.settings.sustain != sustain {
            block.settings.sustain = sustain;
            block.settings.revision += 1;
        }
    }

    /// Flip sustain mode, returning the new value
    pub fn toggle_sustain(&self) -> bool {
        let mut block = self.inner.lock();
        block.settings.sustain = !block.settings.sustain;
        block.settings.revision += 1;
        block.settings.sustain
    }

    /// Snapshot of the current selection
    pub fn settings(&self) -> OrbitSettings {
        self.inner.lock().settings
    }

    /// Latest orbit progress, for the orbit overlay
    pub fn status(&self) -> OrbitStatus {
        let block = self.inner.lock();
        OrbitStatus {
            paused: block.paused,
            ..block.status
        }
    }

    /// Whether the orbit is paused or has escaped
    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Whether a reset is waiting for the next chunk
    pub fn reset_pending(&self) -> bool {
        self.inner.lock().reset
    }

    /// Consume the pending reset and read the flags for one chunk
    pub(crate) fn begin_chunk(&self) -> ChunkControl {
        let mut block = self.inner.lock();
        let reset = if block.reset {
            block.reset = false;
            Some(block.settings)
        } else {
            None
        };
        ChunkControl {
            reset,
            paused: block.paused,
            sustain: block.settings.sustain,
            revision: block.settings.revision,
        }
    }

    /// Pause after an escape, unless the UI already moved on to a newer orbit.
    ///
    /// A pending reset means a new seed or map arrived after this chunk started;
    /// that orbit wins. Returns whether the pause was applied.
    pub(crate) fn mark_escaped(&self) -> bool {
        let mut block = self.inner.lock();
        if block.reset {
            return false;
        }
        block.paused = true;
        true
    }

    pub(crate) fn publish(&self, status: OrbitStatus) {
        self.inner.lock().status = status;
    }
}
