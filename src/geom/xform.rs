//! Xform (transform) schema.
//!
//! A transform sample is an ordered list of ops plus an `inherits` flag.
//! Matrices are double precision and use glam's column-vector convention,
//! so the world matrix of a child is `parent * local`.

use glam::{DMat4, DVec3, DVec4};
use serde::{Deserialize, Serialize};

use crate::core::{Property, SampleSource};
use crate::util::{Error, Result};

/// Transform operation type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XformOpType {
    Scale,
    Translate,
    RotateX,
    RotateY,
    RotateZ,
    Rotate, // axis + angle
    Matrix,
}

impl XformOpType {
    /// Number of values the op expects.
    pub fn arity(self) -> usize {
        match self {
            Self::Scale | Self::Translate => 3,
            Self::RotateX | Self::RotateY | Self::RotateZ => 1,
            Self::Rotate => 4,
            Self::Matrix => 16,
        }
    }
}

/// A single transform operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct XformOp {
    #[serde(rename = "op")]
    pub op_type: XformOpType,
    pub values: Vec<f64>,
}

impl XformOp {
    pub fn scale(x: f64, y: f64, z: f64) -> Self {
        Self { op_type: XformOpType::Scale, values: vec![x, y, z] }
    }

    pub fn translate(x: f64, y: f64, z: f64) -> Self {
        Self { op_type: XformOpType::Translate, values: vec![x, y, z] }
    }

    /// Rotation around X (degrees).
    pub fn rotate_x(angle: f64) -> Self {
        Self { op_type: XformOpType::RotateX, values: vec![angle] }
    }

    /// Rotation around Y (degrees).
    pub fn rotate_y(angle: f64) -> Self {
        Self { op_type: XformOpType::RotateY, values: vec![angle] }
    }

    /// Rotation around Z (degrees).
    pub fn rotate_z(angle: f64) -> Self {
        Self { op_type: XformOpType::RotateZ, values: vec![angle] }
    }

    /// Row-major 4x4 matrix, as stored in the archive.
    pub fn matrix(m: [f64; 16]) -> Self {
        Self { op_type: XformOpType::Matrix, values: m.to_vec() }
    }

    /// Matrix contribution of this op.
    pub fn to_matrix(&self) -> Result<DMat4> {
        let v = &self.values;
        if v.len() < self.op_type.arity() {
            return Err(Error::invalid(format!(
                "{:?} op expects {} values, got {}",
                self.op_type,
                self.op_type.arity(),
                v.len()
            )));
        }
        let m = match self.op_type {
            XformOpType::Scale => DMat4::from_scale(DVec3::new(v[0], v[1], v[2])),
            XformOpType::Translate => DMat4::from_translation(DVec3::new(v[0], v[1], v[2])),
            XformOpType::RotateX => DMat4::from_rotation_x(v[0].to_radians()),
            XformOpType::RotateY => DMat4::from_rotation_y(v[0].to_radians()),
            XformOpType::RotateZ => DMat4::from_rotation_z(v[0].to_radians()),
            XformOpType::Rotate => {
                let axis = DVec3::new(v[0], v[1], v[2]).normalize_or_zero();
                if axis.length_squared() > 1e-8 {
                    DMat4::from_axis_angle(axis, v[3].to_radians())
                } else {
                    DMat4::IDENTITY
                }
            }
            // Row-major in the archive, glam is column-major.
            XformOpType::Matrix => DMat4::from_cols(
                DVec4::new(v[0], v[4], v[8], v[12]),
                DVec4::new(v[1], v[5], v[9], v[13]),
                DVec4::new(v[2], v[6], v[10], v[14]),
                DVec4::new(v[3], v[7], v[11], v[15]),
            ),
        };
        Ok(m)
    }
}

/// Transform sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct XformSample {
    /// Transform operations in order.
    #[serde(default)]
    pub ops: Vec<XformOp>,
    /// Whether this xform composes with its parent.
    #[serde(default = "default_inherits")]
    pub inherits: bool,
}

fn default_inherits() -> bool {
    true
}

impl Default for XformSample {
    fn default() -> Self {
        Self { ops: Vec::new(), inherits: true }
    }
}

impl XformSample {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Sample made of a single local matrix.
    pub fn from_matrix(m: DMat4, inherits: bool) -> Self {
        // Store row-major like the archive.
        let t = m.transpose().to_cols_array();
        Self { ops: vec![XformOp::matrix(t)], inherits }
    }

    pub fn with_ops(ops: Vec<XformOp>, inherits: bool) -> Self {
        Self { ops, inherits }
    }

    /// Compose all ops into the local matrix.
    pub fn matrix(&self) -> Result<DMat4> {
        // Archive ops left-multiply row vectors; with column vectors the
        // equivalent is right-multiplying in op order.
        self.ops
            .iter()
            .try_fold(DMat4::IDENTITY, |acc, op| Ok(acc * op.to_matrix()?))
    }
}

/// Transform node payload: the sampled local transform.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct XformSchema {
    #[serde(default)]
    pub samples: Property<XformSample>,
}

impl XformSchema {
    pub fn constant(sample: XformSample) -> Self {
        Self { samples: Property::constant(sample) }
    }

    pub fn animated(samples: Property<XformSample>) -> Self {
        Self { samples }
    }

    pub fn num_samples(&self) -> usize {
        self.samples.num_samples()
    }

    pub fn is_constant(&self) -> bool {
        self.samples.is_constant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: DMat4, b: DMat4) -> bool {
        a.abs_diff_eq(b, 1e-9)
    }

    #[test]
    fn test_identity() {
        assert_eq!(XformSample::identity().matrix().unwrap(), DMat4::IDENTITY);
    }

    #[test]
    fn test_op_order() {
        // Translate then scale: the scale applies to the point first.
        let s = XformSample::with_ops(
            vec![XformOp::translate(1.0, 0.0, 0.0), XformOp::scale(2.0, 2.0, 2.0)],
            true,
        );
        let p = s.matrix().unwrap().transform_point3(DVec3::new(1.0, 0.0, 0.0));
        assert!((p - DVec3::new(3.0, 0.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_matrix_round_trip() {
        let m = DMat4::from_translation(DVec3::new(1.0, 2.0, 3.0))
            * DMat4::from_rotation_y(0.5);
        let s = XformSample::from_matrix(m, false);
        assert!(approx(s.matrix().unwrap(), m));
        assert!(!s.inherits);
    }

    #[test]
    fn test_short_op_is_error() {
        let op = XformOp { op_type: XformOpType::Translate, values: vec![1.0] };
        assert!(op.to_matrix().is_err());
    }

    #[test]
    fn test_json_defaults() {
        let s: XformSample = serde_json::from_str(r#"{"ops":[{"op":"rotate_y","values":[90.0]}]}"#).unwrap();
        assert!(s.inherits);
        let p = s.matrix().unwrap().transform_point3(DVec3::X);
        assert!((p - DVec3::new(0.0, 0.0, -1.0)).length() < 1e-9);
    }
}
