//! Smooth point normals and per-point tangent frames from UVs.
//!
//! Both walk polygons as triangle fans over output (winding-corrected)
//! corner order.

use glam::{Vec2, Vec3};

/// Determinant below which a UV triangle is considered degenerate.
pub const DEGENERATE_UV_EPS: f32 = 1e-6;

/// Fan triangles of every face as output corner indices `(c0, c1, c2)`.
pub fn fan_triangles(face_counts: &[u32]) -> impl Iterator<Item = [usize; 3]> + '_ {
    face_counts
        .iter()
        .scan(0usize, |start, &n| {
            let s = *start;
            *start += n as usize;
            Some((s, n as usize))
        })
        .flat_map(|(s, n)| (2..n.max(2)).map(move |fv| [s, s + fv - 1, s + fv]))
}

/// Per-point normals accumulated from normalized face normals.
///
/// `ccw` selects `e0 x e1` (counter-clockwise faces) over `e1 x e0`.
pub fn smooth_normals(positions: &[Vec3], face_counts: &[u32], vertex_indices: &[u32], ccw: bool) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];

    for [c0, c1, c2] in fan_triangles(face_counts) {
        let (Some(&v0), Some(&v1), Some(&v2)) =
            (vertex_indices.get(c0), vertex_indices.get(c1), vertex_indices.get(c2))
        else {
            break;
        };
        let (v0, v1, v2) = (v0 as usize, v1 as usize, v2 as usize);
        if v0 >= positions.len() || v1 >= positions.len() || v2 >= positions.len() {
            continue;
        }
        let p0 = positions[v0];
        let e0 = (positions[v1] - p0).normalize_or_zero();
        let e1 = (positions[v2] - p0).normalize_or_zero();
        let n = if ccw { e0.cross(e1) } else { e1.cross(e0) }.normalize_or_zero();
        normals[v0] += n;
        normals[v1] += n;
        normals[v2] += n;
    }

    for n in &mut normals {
        *n = n.normalize_or_zero();
    }
    normals
}

/// Per-point tangents and bitangents.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TangentFrame {
    pub tangents: Vec<Vec3>,
    pub bitangents: Vec<Vec3>,
}

/// Solve each fan triangle's position/UV edge system, accumulate per point
/// and orthonormalize against `normals`.
///
/// `uv_values[uv_indices[c]]` is the UV of output corner `c`. Triangles with
/// a near-zero UV determinant contribute nothing.
pub fn compute_tangents(
    positions: &[Vec3],
    face_counts: &[u32],
    vertex_indices: &[u32],
    uv_values: &[Vec2],
    uv_indices: &[u32],
    normals: &[Vec3],
) -> TangentFrame {
    let n = positions.len();
    let mut t_sum = vec![Vec3::ZERO; n];
    let mut b_sum = vec![Vec3::ZERO; n];

    let point = |c: usize| vertex_indices.get(c).map(|&v| v as usize).filter(|&v| v < n);
    let uv = |c: usize| uv_indices.get(c).and_then(|&i| uv_values.get(i as usize)).copied();

    for [c0, c1, c2] in fan_triangles(face_counts) {
        let (Some(i0), Some(i1), Some(i2)) = (point(c0), point(c1), point(c2)) else {
            continue;
        };
        let (Some(uv0), Some(uv1), Some(uv2)) = (uv(c0), uv(c1), uv(c2)) else {
            continue;
        };

        let e1 = positions[i1] - positions[i0];
        let e2 = positions[i2] - positions[i0];
        let (s1, t1) = (uv1.x - uv0.x, uv1.y - uv0.y);
        let (s2, t2) = (uv2.x - uv0.x, uv2.y - uv0.y);

        let det = s1 * t2 - s2 * t1;
        if det.abs() <= DEGENERATE_UV_EPS {
            continue;
        }
        let r = 1.0 / det;
        let t = r * (t2 * e1 - t1 * e2);
        let b = r * (s1 * e2 - s2 * e1);

        for i in [i0, i1, i2] {
            t_sum[i] += t;
            b_sum[i] += b;
        }
    }

    let mut frame = TangentFrame {
        tangents: Vec::with_capacity(n),
        bitangents: Vec::with_capacity(n),
    };
    for i in 0..n {
        let nrm = normals.get(i).copied().unwrap_or(Vec3::ZERO);
        let t = (t_sum[i] - t_sum[i].dot(nrm) * nrm).normalize_or_zero();
        let b = (b_sum[i] - b_sum[i].dot(nrm) * nrm - b_sum[i].dot(t) * t).normalize_or_zero();
        frame.tangents.push(t);
        frame.bitangents.push(b);
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> (Vec<Vec3>, Vec<u32>, Vec<u32>, Vec<Vec2>) {
        // Two quads in the XY plane, slightly bent along Z.
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.3),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(2.0, 1.0, 0.3),
        ];
        let counts = vec![4, 4];
        let indices = vec![0, 1, 4, 3, 1, 2, 5, 4];
        let uvs = positions.iter().map(|p| Vec2::new(p.x * 0.5, p.y)).collect();
        (positions, counts, indices, uvs)
    }

    #[test]
    fn test_fan_triangles() {
        let tris: Vec<_> = fan_triangles(&[3, 0, 1, 5]).collect();
        assert_eq!(tris, vec![[0, 1, 2], [4, 5, 6], [4, 6, 7], [4, 7, 8]]);
    }

    #[test]
    fn test_smooth_normals_orientation() {
        let (p, counts, idx, _) = grid();
        let ccw = smooth_normals(&p, &counts, &idx, true);
        let cw = smooth_normals(&p, &counts, &idx, false);
        assert!(ccw[0].z > 0.99);
        assert!(cw[0].z < -0.99);
        for n in &ccw {
            assert!((n.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_tangents_orthonormal() {
        let (p, counts, idx, uvs) = grid();
        let normals = smooth_normals(&p, &counts, &idx, true);
        // Per-corner UV indices pointing at the per-point UVs.
        let frame = compute_tangents(&p, &counts, &idx, &uvs, &idx, &normals);

        for i in 0..p.len() {
            let (t, b, n) = (frame.tangents[i], frame.bitangents[i], normals[i]);
            assert!((t.length() - 1.0).abs() < 1e-5);
            assert!((b.length() - 1.0).abs() < 1e-5);
            assert!(t.dot(n).abs() < 1e-5);
            assert!(b.dot(n).abs() < 1e-5);
            assert!(t.dot(b).abs() < 1e-5);
        }
        // U runs along +X.
        assert!(frame.tangents[0].x > 0.9);
        assert!(frame.bitangents[0].y > 0.9);
    }

    #[test]
    fn test_degenerate_uvs_contribute_nothing() {
        let (p, counts, idx, _) = grid();
        let flat = vec![Vec2::ZERO; p.len()];
        let normals = smooth_normals(&p, &counts, &idx, true);
        let frame = compute_tangents(&p, &counts, &idx, &flat, &idx, &normals);
        assert!(frame.tangents.iter().all(|t| *t == Vec3::ZERO));
    }
}
