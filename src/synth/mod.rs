//! Orbit synthesizer
//!
//! Advances the selected iterated map at a fixed sub-audio rate and turns each
//! pair of consecutive orbit points into a stereo direction signal. Between map
//! steps the signal is cosine-interpolated so the iteration rate does not show
//! up as audible stepping.
//!
//! The synthesizer itself is owned by the audio callback thread. Everything the
//! UI may change lives in [`SynthControl`], which is shared through an `Arc`.

mod control;

pub use control::{OrbitSettings, OrbitStatus, SynthControl};

use crate::config::EngineConfig;
use crate::maps::{DeltaMode, MapKind, Point};
use std::f64::consts::PI;
use std::sync::Arc;

/// Guards the normalisation against zero-length vectors
pub const NORMALIZE_EPSILON: f64 = 1e-12;

/// Orbit state advanced by the audio thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitState {
    /// Map being iterated
    pub map: MapKind,
    /// Signal derivation for `map`
    pub mode: DeltaMode,
    /// Current orbit point
    pub point: Point,
    /// Orbit point before `point`
    pub previous: Point,
    /// Fixed parameter of this orbit
    pub parameter: Point,
    /// Running mean of the orbit (mean-relative mode)
    pub mean: Point,
    /// Amplitude envelope
    pub volume: f64,
    /// Signal target of the current step (reached at `t = 1`)
    pub delta: Point,
    /// Signal origin of the current step (at `t = 0`)
    pub previous_delta: Point,
}

impl OrbitState {
    fn seeded(settings: &OrbitSettings, volume: f64) -> Self {
        let seed = settings.seed;
        OrbitState {
            map: settings.map,
            mode: settings.map.delta_mode(),
            point: seed,
            previous: seed,
            parameter: settings.effective_parameter(),
            mean: seed,
            volume,
            delta: Point::ZERO,
            previous_delta: Point::ZERO,
        }
    }
}

/// Smoothed interpolation parameter: 0 at `t = 0`, 1 at `t = 1`
#[inline]
pub fn cosine_blend(t: f64) -> f64 {
    0.5 - 0.5 * (t * PI).cos()
}

/// Rescale `d` to unit length
#[inline]
pub fn normalize_delta(d: Point) -> Point {
    d.scale(1.0 / (NORMALIZE_EPSILON + d.norm_sqr()).sqrt())
}

/// Shrink `d` when its squared magnitude exceeds `ceiling`
#[inline]
pub fn clamp_delta(d: Point, ceiling: f64) -> Point {
    let m = d.norm_sqr();
    if m > ceiling {
        d.scale(ceiling / m)
    } else {
        d
    }
}

/// Convert a scaled signal value to a clamped 16-bit sample
#[inline]
pub fn to_sample(value: f64, limit: f64) -> i16 {
    value.clamp(-limit, limit) as i16
}

/// Real-time orbit-to-audio synthesizer
pub struct OrbitSynthesizer {
    control: Arc<SynthControl>,
    config: EngineConfig,
    steps: u64,
    state: OrbitState,
    /// Frames generated since the last reset
    audio_time: u64,
    revision: u64,
}

impl OrbitSynthesizer {
    /// Create a synthesizer reading its orbit selection from `control`
    pub fn new(config: &EngineConfig, control: Arc<SynthControl>) -> Self {
        let settings = control.settings();
        OrbitSynthesizer {
            state: OrbitState::seeded(&settings, config.start_volume),
            steps: config.steps_per_iteration() as u64,
            config: *config,
            control,
            audio_time: 0,
            revision: settings.revision,
        }
    }

    /// Shared control handle for the UI thread
    pub fn control(&self) -> &Arc<SynthControl> {
        &self.control
    }

    /// Current orbit state
    pub fn state(&self) -> &OrbitState {
        &self.state
    }

    /// Current amplitude envelope
    pub fn volume(&self) -> f64 {
        self.state.volume
    }

    /// Whether the orbit is paused or has escaped
    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    /// Audio frames spent on each map step
    pub fn steps_per_iteration(&self) -> u64 {
        self.steps
    }

    /// Frames generated since the orbit was last reset
    pub fn frames_generated(&self) -> u64 {
        self.audio_time
    }

    /// Fill one interleaved stereo chunk.
    ///
    /// Returns `true` when the chunk holds new audio. Silence (paused orbit), an
    /// escape inside the chunk, or a reset requested while generating all return
    /// `false`.
    pub fn fill_chunk(&mut self, out: &mut [i16]) -> bool {
        out.fill(0);

        let chunk = self.control.begin_chunk();
        if let Some(settings) = chunk.reset {
            self.reset(&settings);
        }
        // Sustain changes bump the revision without a reset
        self.revision = chunk.revision;

        if chunk.paused {
            self.publish(true);
            return false;
        }

        let limit = self.config.sample_limit;
        for frame in out.chunks_exact_mut(2) {
            let j = self.audio_time % self.steps;
            if j == 0 && !self.advance(chunk.sustain) {
                let applied = self.control.mark_escaped();
                log::debug!(
                    "orbit escaped at ({:.4}, {:.4}) after {} frames{}",
                    self.state.point.x,
                    self.state.point.y,
                    self.audio_time,
                    if applied { "" } else { " (superseded)" }
                );
                self.publish(true);
                return false;
            }

            let t = cosine_blend(j as f64 / self.steps as f64);
            let w = self.state.previous_delta.lerp(self.state.delta, t);
            frame[0] = to_sample(w.x * self.state.volume, limit);
            frame[1] = to_sample(w.y * self.state.volume, limit);
            self.audio_time += 1;
        }

        self.publish(false);
        !self.control.reset_pending()
    }

    fn reset(&mut self, settings: &OrbitSettings) {
        log::debug!(
            "orbit reset: {} seed ({:.4}, {:.4}) revision {}",
            settings.map,
            settings.seed.x,
            settings.seed.y,
            settings.revision
        );
        self.state = OrbitState::seeded(settings, self.config.start_volume);
        self.audio_time = 0;
    }

    /// Apply the map once and derive the signal endpoints for the new step.
    /// Returns `false` when the orbit escaped.
    fn advance(&mut self, sustain: bool) -> bool {
        let cfg = &self.config;
        let st = &mut self.state;

        st.previous = st.point;
        st.point = st.map.step(st.point, st.parameter);
        if st.point.escaped(cfg.escape_radius_sq) {
            return false;
        }

        let (delta, previous_delta) = match st.mode {
            DeltaMode::Normalized => {
                let d = st.point - st.parameter;
                let dp = st.previous - st.parameter;
                if d == Point::ZERO {
                    (d, dp)
                } else {
                    (normalize_delta(d), normalize_delta(dp))
                }
            }
            DeltaMode::MeanRelative => (st.point - st.mean, st.previous - st.mean),
        };

        st.mean = st.mean.scale(cfg.mean_decay) + st.point.scale(1.0 - cfg.mean_decay);

        st.delta = clamp_delta(delta, cfg.delta_ceiling);
        st.previous_delta = clamp_delta(previous_delta, cfg.delta_ceiling);

        if !sustain {
            st.volume *= cfg.volume_decay;
        }
        true
    }

    fn publish(&self, paused: bool) {
        self.control.publish(OrbitStatus {
            point: self.state.point,
            previous: self.state.previous,
            paused,
            volume: self.state.volume,
            revision: self.revision,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DEFAULT_DECAY: f64 = crate::config::DEFAULT_VOLUME_DECAY;

    fn synth_for(map: MapKind, seed: (f64, f64), sustain: bool) -> OrbitSynthesizer {
        let control = Arc::new(SynthControl::new());
        control.set_map(map, None);
        control.set_sustain(sustain);
        control.set_target_point(seed.0, seed.1);
        OrbitSynthesizer::new(&EngineConfig::default(), control)
    }

    #[test]
    fn test_cosine_blend_endpoints() {
        assert_relative_eq!(cosine_blend(0.0), 0.0);
        assert_relative_eq!(cosine_blend(1.0), 1.0);
        assert_relative_eq!(cosine_blend(0.5), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_cosine_blend_is_monotonic() {
        let mut last = cosine_blend(0.0);
        for i in 1..=100 {
            let v = cosine_blend(i as f64 / 100.0);
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn test_normalize_delta_unit_length() {
        let d = normalize_delta(Point::new(3.0, 4.0));
        assert_relative_eq!(d.norm_sqr(), 1.0, epsilon = 1e-9);
        assert_eq!(normalize_delta(Point::ZERO), Point::ZERO);
    }

    #[test]
    fn test_clamp_delta() {
        let small = Point::new(0.5, 0.5);
        assert_eq!(clamp_delta(small, 2.0), small);

        let big = clamp_delta(Point::new(4.0, 0.0), 2.0);
        // m = 16, scaled by 2/16
        assert_relative_eq!(big.x, 0.5);
        assert!(big.norm_sqr() <= 2.0);
    }

    #[test]
    fn test_to_sample_clamps() {
        assert_eq!(to_sample(1e9, 32000.0), 32000);
        assert_eq!(to_sample(-1e9, 32000.0), -32000);
        assert_eq!(to_sample(123.9, 32000.0), 123);
    }

    #[test]
    fn test_paused_chunk_is_silent() {
        let control = Arc::new(SynthControl::new());
        let mut synth = OrbitSynthesizer::new(&EngineConfig::default(), Arc::clone(&control));
        let mut chunk = vec![7i16; 64];
        assert!(!synth.fill_chunk(&mut chunk));
        assert!(chunk.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_step_boundaries_connect_in_normalized_mode() {
        // c = 0.5i lies inside the main cardioid
        let mut synth = synth_for(MapKind::Mandelbrot, (0.0, 0.5), true);
        let steps = synth.steps_per_iteration() as usize;
        let mut chunk = vec![0i16; steps * 2];

        let mut last_target = None;
        for _ in 0..50 {
            assert!(synth.fill_chunk(&mut chunk));
            let st = *synth.state();
            if let Some(target) = last_target {
                // The new step starts where the previous one was heading
                assert_eq!(st.previous_delta, target);
            }
            last_target = Some(st.delta);
        }
    }

    #[test]
    fn test_step_boundaries_nearly_connect_in_mean_relative_mode() {
        let control = Arc::new(SynthControl::new());
        control.set_map(MapKind::Henon, Some(Point::new(1.4, 0.3)));
        control.set_target_point(0.1, 0.1);
        let mut synth = OrbitSynthesizer::new(&EngineConfig::default(), control);
        let steps = synth.steps_per_iteration() as usize;
        let mut chunk = vec![0i16; steps * 2];

        let mut last_target: Option<Point> = None;
        let mut widest = 0.0f64;
        for _ in 0..500 {
            assert!(synth.fill_chunk(&mut chunk));
            let st = *synth.state();
            if let Some(target) = last_target {
                // The mean moved by 1% of the displacement in between
                let gap = (st.previous_delta - target).norm_sqr().sqrt();
                let reach = target.norm_sqr().sqrt();
                assert!(gap <= 0.0105 * reach + 1e-12, "gap {gap} for delta {reach}");
                widest = widest.max(gap);
            }
            last_target = Some(st.delta);
        }
        assert!(widest > 0.0);
        assert!(widest < 0.015);
    }

    #[test]
    fn test_volume_decays_geometrically_without_sustain() {
        let mut synth = synth_for(MapKind::Mandelbrot, (-0.5, 0.0), false);
        let steps = synth.steps_per_iteration() as usize;
        let mut chunk = vec![0i16; steps * 2];

        let start = EngineConfig::default().start_volume;
        for n in 1..=200 {
            synth.fill_chunk(&mut chunk);
            let expected = start * DEFAULT_DECAY.powi(n);
            assert_relative_eq!(synth.volume(), expected, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_volume_constant_with_sustain() {
        let mut synth = synth_for(MapKind::Mandelbrot, (-0.5, 0.0), true);
        let mut chunk = vec![0i16; 4096];
        for _ in 0..10 {
            synth.fill_chunk(&mut chunk);
            assert_eq!(synth.volume(), EngineConfig::default().start_volume);
        }
    }

    #[test]
    fn test_mean_relative_tracks_running_mean() {
        let mut synth = synth_for(MapKind::Henon, (0.1, 0.1), true);
        synth.control().set_map(MapKind::Henon, Some(Point::new(1.4, 0.3)));
        synth.control().set_target_point(0.1, 0.1);

        let mut chunk = vec![0i16; 2];
        synth.fill_chunk(&mut chunk);
        let st = synth.state();
        assert_eq!(st.mode, DeltaMode::MeanRelative);
        // First step: mean was the seed, so the delta is the raw displacement
        let expected = st.point - Point::new(0.1, 0.1);
        assert_relative_eq!(st.delta.x, clamp_delta(expected, 2.0).x);
        assert_relative_eq!(st.mean.x, 0.1 * 0.99 + st.point.x * 0.01, epsilon = 1e-15);
    }

    #[test]
    fn test_step_counter_spans_chunks() {
        let mut synth = synth_for(MapKind::Mandelbrot, (-0.5, 0.0), true);
        // 5 frames per chunk with 12 frames per step
        let mut chunk = vec![0i16; 10];
        synth.fill_chunk(&mut chunk);
        let first = synth.state().point;
        synth.fill_chunk(&mut chunk);
        assert_eq!(synth.state().point, first, "no new step before frame 12");
        synth.fill_chunk(&mut chunk);
        assert_ne!(synth.state().point, first);
        assert_eq!(synth.frames_generated(), 15);
    }

    #[test]
    fn test_status_tracks_sustain_revision() {
        let mut synth = synth_for(MapKind::Mandelbrot, (-0.5, 0.0), true);
        let mut chunk = vec![0i16; 48];
        synth.fill_chunk(&mut chunk);

        synth.control().toggle_sustain();
        let settings = synth.control().settings();
        assert!(!synth.control().reset_pending());
        assert_ne!(synth.control().status().revision, settings.revision);

        synth.fill_chunk(&mut chunk);
        assert_eq!(synth.control().status().revision, settings.revision);
    }

    #[test]
    fn test_status_is_published() {
        let mut synth = synth_for(MapKind::Mandelbrot, (-0.5, 0.0), true);
        let mut chunk = vec![0i16; 48];
        synth.fill_chunk(&mut chunk);
        let status = synth.control().status();
        assert_eq!(status.point, synth.state().point);
        assert_eq!(status.previous, synth.state().previous);
        assert!(!status.paused);
    }
}
