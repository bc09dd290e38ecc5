//! Placement of sound sources around the listener.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Defines the area around the listener that a sound source can play in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionData {
    /// Horizontal half-extents (x, y) around the listener.
    pub horizontal_range: Vec2,
    /// Vertical offset added after sampling, to keep sounds above or below the listener.
    pub vertical_offset: f32,
    /// Full vertical extent, centred on the listener.
    pub vertical_range: f32,
}

impl Default for DistributionData {
    fn default() -> Self {
        Self {
            horizontal_range: Vec2::new(500.0, 1000.0),
            vertical_offset: 0.0,
            vertical_range: 100.0,
        }
    }
}

impl DistributionData {
    /// Create distribution data with the given horizontal extents.
    #[must_use]
    pub fn new(horizontal_x: f32, horizontal_y: f32) -> Self {
        Self {
            horizontal_range: Vec2::new(horizontal_x.abs(), horizontal_y.abs()),
            ..Self::default()
        }
    }

    /// With vertical range.
    #[must_use]
    pub fn with_vertical_range(mut self, range: f32) -> Self {
        self.vertical_range = range.abs();
        self
    }

    /// With vertical offset.
    #[must_use]
    pub fn with_vertical_offset(mut self, offset: f32) -> Self {
        self.vertical_offset = offset;
        self
    }

    /// Sample a random offset relative to the listener.
    pub fn sample_offset(&self, rng: &mut fastrand::Rng) -> Vec3 {
        let x = symmetric(rng, self.horizontal_range.x);
        let y = symmetric(rng, self.horizontal_range.y);
        let z = symmetric(rng, self.vertical_range * 0.5) + self.vertical_offset;
        Vec3::new(x, y, z)
    }

    /// Sample a world position around the listener.
    pub fn sample_around(&self, listener: Vec3, rng: &mut fastrand::Rng) -> Vec3 {
        listener + self.sample_offset(rng)
    }
}

/// Uniform value in `[-extent, extent]`.
fn symmetric(rng: &mut fastrand::Rng, extent: f32) -> f32 {
    (rng.f32() * 2.0 - 1.0) * extent
}
