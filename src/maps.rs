//! Iterated maps
//!
//! The fixed table of eight two-dimensional recurrences whose orbits are turned
//! into sound. Each map takes the current point `(x, y)` and the orbit parameter
//! `(cx, cy)` and returns the next point. Maps are pure: they keep no state and
//! never fail, but may diverge to infinity or NaN. Bounding the orbit is the
//! caller's job (see the escape test in [`crate::synth`]).

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A point in the fractal plane
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Real / horizontal component
    pub x: f64,
    /// Imaginary / vertical component
    pub y: f64,
}

impl Point {
    /// Origin of the plane
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    /// Create a new point
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// Squared distance from the origin
    #[inline]
    pub fn norm_sqr(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Scale both components
    #[inline]
    pub fn scale(self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }

    /// Linear blend between `self` (at `t = 0`) and `other` (at `t = 1`)
    #[inline]
    pub fn lerp(self, other: Point, t: f64) -> Point {
        Point::new(
            t * other.x + (1.0 - t) * self.x,
            t * other.y + (1.0 - t) * self.y,
        )
    }

    /// Whether this point lies outside the escape radius.
    ///
    /// NaN compares false against everything, so a NaN orbit is treated as escaped
    /// explicitly.
    #[inline]
    pub fn escaped(self, escape_radius_sq: f64) -> bool {
        let r = self.norm_sqr();
        r > escape_radius_sq || r.is_nan()
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl From<Complex64> for Point {
    fn from(z: Complex64) -> Self {
        Point::new(z.re, z.im)
    }
}

impl From<Point> for Complex64 {
    fn from(p: Point) -> Self {
        Complex64::new(p.x, p.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

/// How the synthesizer derives the stereo signal from orbit points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaMode {
    /// Offset from the orbit parameter, rescaled to unit length.
    /// Pitch follows the direction of motion, not its magnitude.
    Normalized,
    /// Raw offset from a slowly decaying running mean of the orbit.
    /// Amplitude follows the spread of the orbit.
    MeanRelative,
}

/// The fixed set of iterated maps, in table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MapKind {
    /// Quadratic complex map `z² + c`
    #[default]
    Mandelbrot,
    /// `z² + c` with the absolute value of the cross term
    BurningShip,
    /// Cubic rational map `z³ / (1 + (x² + iy²)) + c`
    Feather,
    /// Quartic map `z·|z|² − z·(cx² + icy²)`
    Sfx,
    /// Dissipative Hénon map
    Henon,
    /// Discrete Duffing oscillator
    Duffing,
    /// Ikeda map (optical cavity)
    Ikeda,
    /// Chirikov standard map
    Chirikov,
}

impl MapKind {
    /// All maps, indexed by their table position
    pub const ALL: [MapKind; 8] = [
        MapKind::Mandelbrot,
        MapKind::BurningShip,
        MapKind::Feather,
        MapKind::Sfx,
        MapKind::Henon,
        MapKind::Duffing,
        MapKind::Ikeda,
        MapKind::Chirikov,
    ];

    /// Look a map up by table index (0-7)
    pub fn from_index(index: usize) -> Option<MapKind> {
        Self::ALL.get(index).copied()
    }

    /// Table index of this map
    pub fn index(self) -> usize {
        self as usize
    }

    /// Parse a map from its table index or (case-insensitive) name
    pub fn from_name(value: &str) -> Option<MapKind> {
        if let Ok(index) = value.parse::<usize>() {
            return Self::from_index(index);
        }
        match value.to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "mandelbrot" => Some(MapKind::Mandelbrot),
            "burningship" | "ship" => Some(MapKind::BurningShip),
            "feather" => Some(MapKind::Feather),
            "sfx" => Some(MapKind::Sfx),
            "henon" | "hénon" => Some(MapKind::Henon),
            "duffing" => Some(MapKind::Duffing),
            "ikeda" => Some(MapKind::Ikeda),
            "chirikov" | "standard" => Some(MapKind::Chirikov),
            _ => None,
        }
    }

    /// Human readable name
    pub fn name(self) -> &'static str {
        match self {
            MapKind::Mandelbrot => "Mandelbrot Set",
            MapKind::BurningShip => "Burning Ship",
            MapKind::Feather => "Feather Fractal",
            MapKind::Sfx => "SFX Fractal",
            MapKind::Henon => "Hénon Map",
            MapKind::Duffing => "Duffing Map",
            MapKind::Ikeda => "Ikeda Map",
            MapKind::Chirikov => "Chirikov Map",
        }
    }

    /// Signal derivation used when this map is selected
    pub fn delta_mode(self) -> DeltaMode {
        match self {
            MapKind::Mandelbrot => DeltaMode::Normalized,
            _ => DeltaMode::MeanRelative,
        }
    }

    /// Apply the map once
    #[inline]
    pub fn step(self, p: Point, c: Point) -> Point {
        let Point { x, y } = p;
        match self {
            MapKind::Mandelbrot => {
                let z = Complex64::from(p);
                (z * z + Complex64::from(c)).into()
            }
            MapKind::BurningShip => Point::new(x * x - y * y + c.x, 2.0 * (x * y).abs() + c.y),
            MapKind::Feather => {
                // z³ / (1 + (x² + i·y²)) + c
                let z = Complex64::from(p);
                let w = Complex64::new(1.0, 0.0) + Complex64::new(x * x, y * y);
                (z * z * z / w + Complex64::from(c)).into()
            }
            MapKind::Sfx => {
                let z = Complex64::from(p);
                (z * z.norm_sqr() - z * Complex64::new(c.x * c.x, c.y * c.y)).into()
            }
            MapKind::Henon => Point::new(1.0 - c.x * x * x + y, c.y * x),
            MapKind::Duffing => Point::new(y, -c.y * x + c.x * y - y * y * y),
            MapKind::Ikeda => {
                let t = 0.4 - 6.0 / (1.0 + x * x + y * y);
                let (st, ct) = t.sin_cos();
                Point::new(1.0 + c.x * (x * ct - y * st), c.y * (x * st + y * ct))
            }
            MapKind::Chirikov => {
                let ny = y + c.y * x.sin();
                Point::new(x + c.x * ny, ny)
            }
        }
    }
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
