//! Orbit trace for drawing the orbit overlay
//!
//! The UI draws a polyline through the first iterates of the orbit it is
//! playing. Each frame the start of the line moves forward by as many map steps
//! as the audio performed during that frame, so the picture follows the sound.

use crate::maps::{MapKind, Point};

/// Map iterates drawn after the start point
pub const TRACE_LENGTH: usize = 200;

/// Map steps the audio performs per UI frame
pub fn iterations_per_frame(max_frequency: u32, target_fps: u32) -> usize {
    (max_frequency / target_fps.max(1)) as usize
}

/// Start point of the orbit overlay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitTrace {
    start: Point,
}

impl OrbitTrace {
    /// Begin a trace at the designated point
    pub fn new(start: Point) -> Self {
        OrbitTrace { start }
    }

    /// Current start point
    pub fn start(&self) -> Point {
        self.start
    }

    /// Restart the trace from `start`
    pub fn restart(&mut self, start: Point) {
        self.start = start;
    }

    /// Polyline vertices: the start point followed by up to [`TRACE_LENGTH`]
    /// iterates. The first escaped iterate is the last vertex.
    pub fn points(&self, map: MapKind, parameter: Point, escape_radius_sq: f64) -> Vec<Point> {
        let mut points = Vec::with_capacity(TRACE_LENGTH + 1);
        points.push(self.start);

        let mut p = self.start;
        for _ in 0..TRACE_LENGTH {
            p = map.step(p, parameter);
            points.push(p);
            if p.escaped(escape_radius_sq) {
                break;
            }
        }
        points
    }

    /// Move the start point forward by up to `iterations` map steps.
    ///
    /// Stops at the last iterate before an escape. Returns the number of steps
    /// actually taken.
    pub fn advance(
        &mut self,
        map: MapKind,
        parameter: Point,
        escape_radius_sq: f64,
        iterations: usize,
    ) -> usize {
        let mut p = self.start;
        for taken in 0..iterations {
            p = map.step(p, parameter);
            if p.escaped(escape_radius_sq) {
                return taken;
            }
            self.start = p;
        }
        iterations
    }
}
