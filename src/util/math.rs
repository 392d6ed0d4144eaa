//! Math type re-exports and expansion-specific math utilities.
//!
//! This module re-exports types from `glam` and provides the bounding box
//! type and the [`Lerp`] trait used for time-sample blending.

pub use glam::{DMat4, DVec3, DVec4, Mat4, Vec2, Vec3};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Linear interpolation between two values of the same type.
///
/// `a.interp(&b, blend)` equals `(1 - blend) * a + blend * b`.
pub trait Lerp: Sized {
    fn interp(&self, other: &Self, blend: f64) -> Self;
}

impl Lerp for f32 {
    #[inline]
    fn interp(&self, other: &Self, blend: f64) -> Self {
        let b = blend as f32;
        (1.0 - b) * self + b * other
    }
}

impl Lerp for f64 {
    #[inline]
    fn interp(&self, other: &Self, blend: f64) -> Self {
        (1.0 - blend) * self + blend * other
    }
}

impl Lerp for Vec2 {
    #[inline]
    fn interp(&self, other: &Self, blend: f64) -> Self {
        let b = blend as f32;
        *self * (1.0 - b) + *other * b
    }
}

impl Lerp for Vec3 {
    #[inline]
    fn interp(&self, other: &Self, blend: f64) -> Self {
        let b = blend as f32;
        *self * (1.0 - b) + *other * b
    }
}

impl Lerp for DVec3 {
    #[inline]
    fn interp(&self, other: &Self, blend: f64) -> Self {
        *self * (1.0 - blend) + *other * blend
    }
}

impl Lerp for DMat4 {
    // Component-wise, like the matrix blend of the archive's M44d samples.
    #[inline]
    fn interp(&self, other: &Self, blend: f64) -> Self {
        *self * (1.0 - blend) + *other * blend
    }
}

impl<T: Lerp + Clone> Lerp for Vec<T> {
    /// Element-wise blend. Lengths are expected to match; extra elements
    /// of the longer side are dropped.
    fn interp(&self, other: &Self, blend: f64) -> Self {
        self.iter()
            .zip(other.iter())
            .map(|(a, b)| a.interp(b, blend))
            .collect()
    }
}

/// 3D bounding box with double precision.
#[derive(Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct BBox3d {
    pub min: DVec3,
    pub max: DVec3,
}

impl BBox3d {
    /// Empty bounding box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    /// Create a new bounding box from min and max points.
    #[inline]
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Create a bounding box from a single point.
    #[inline]
    pub fn from_point(p: DVec3) -> Self {
        Self { min: p, max: p }
    }

    /// Bounds of a set of single precision points.
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut b = Self::EMPTY;
        for p in points {
            b.expand_by_point(p.as_dvec3());
        }
        b
    }

    /// Check if this box is empty (has no volume).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand this box to include another box.
    #[inline]
    pub fn expand_by_box(&mut self, other: &Self) {
        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    /// Get the center of the box.
    #[inline]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size (extents) of the box.
    #[inline]
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Axis-aligned bounds of this box after transforming its 8 corners.
    pub fn transformed(&self, m: &DMat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut out = Self::EMPTY;
        for i in 0..8 {
            let corner = DVec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.expand_by_point(m.transform_point3(corner));
        }
        out
    }
}

impl Default for BBox3d {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for BBox3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BBox3d({:?} - {:?})", self.min, self.max)
    }
}

impl Lerp for BBox3d {
    fn interp(&self, other: &Self, blend: f64) -> Self {
        Self {
            min: self.min.interp(&other.min, blend),
            max: self.max.interp(&other.max, blend),
        }
    }
}

/// Chrono type - time value (seconds).
pub type Chrono = f64;
