//! Shapes that are traversed but not assembled (points, curves, NURBS).
//!
//! Only their self bounds are read, for culling and scene bounds.

use serde::{Deserialize, Serialize};

use super::AttributeProperty;
use crate::core::{Property, SampleSource};
use crate::util::BBox3d;

/// Bounds-only shape payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundedSchema {
    #[serde(default)]
    pub self_bounds: Property<BBox3d>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arb_geom_params: Vec<AttributeProperty>,
}

impl BoundedSchema {
    pub fn new(self_bounds: Property<BBox3d>) -> Self {
        Self {
            self_bounds,
            arb_geom_params: Vec::new(),
        }
    }

    pub fn constant(bounds: BBox3d) -> Self {
        Self::new(Property::constant(bounds))
    }

    pub fn num_samples(&self) -> usize {
        self.self_bounds.num_samples()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    #[test]
    fn test_constant_bounds() {
        let b = BoundedSchema::constant(BBox3d::new(DVec3::ZERO, DVec3::ONE));
        assert_eq!(b.num_samples(), 1);
        assert_eq!(b.self_bounds.read_sample(0).unwrap().max, DVec3::ONE);
    }
}
