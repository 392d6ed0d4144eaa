//! Scope and topology descriptors for geometry samples.

use serde::{Deserialize, Serialize};

/// Scope/extent of data in a geom schema sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryScope {
    /// Constant for entire object.
    #[default]
    Constant,
    /// Per-face.
    Uniform,
    /// Per-point.
    Varying,
    /// Per-point (vertex in the archive sense).
    Vertex,
    /// Per-face-corner.
    FaceVarying,
    /// Missing or unrecognized scope metadata.
    Unknown,
}

impl GeometryScope {
    /// Parse from string (as stored in metadata).
    pub fn parse(s: &str) -> Self {
        match s {
            "con" | "constant" => Self::Constant,
            "uni" | "uniform" => Self::Uniform,
            "var" | "varying" => Self::Varying,
            "vtx" | "vertex" => Self::Vertex,
            "fvr" | "facevarying" => Self::FaceVarying,
            _ => Self::Unknown,
        }
    }

    /// Convert to short string for metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constant => "con",
            Self::Uniform => "uni",
            Self::Varying => "var",
            Self::Vertex => "vtx",
            Self::FaceVarying => "fvr",
            Self::Unknown => "unknown",
        }
    }
}

/// Topology variance hint for geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyVariance {
    /// Completely static (single sample).
    #[default]
    Static,
    /// Topology is constant, only positions change.
    Homogeneous,
    /// Topology can change every sample.
    Heterogeneous,
}

impl TopologyVariance {
    /// True when face connectivity may differ between samples.
    #[inline]
    pub fn is_varying(self) -> bool {
        matches!(self, Self::Heterogeneous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_scope() {
        assert_eq!(GeometryScope::parse("fvr"), GeometryScope::FaceVarying);
        assert_eq!(GeometryScope::parse("bogus"), GeometryScope::Unknown);
        assert_eq!(GeometryScope::Vertex.as_str(), "vtx");
    }

    #[test]
    fn test_topology_variance() {
        assert!(TopologyVariance::Heterogeneous.is_varying());
        assert!(!TopologyVariance::Homogeneous.is_varying());
    }
}
