//! End-to-end expansion scenarios on in-memory scenes.

use std::sync::Arc;

use alembic_expand::expand::{smooth_normals, ExpandRequest, ExpandSettings, Expander};
use alembic_expand::geom::{
    visibility_property, GeomParam, IndexedSample, MeshSchema, PolyMeshSample, XformOp,
    XformSample, XformSchema,
};
use alembic_expand::core::{GeometryScope, Property, TopologyVariance};
use alembic_expand::scene::{SceneBuilder, SceneGraph};
use glam::{Vec2, Vec3};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn quad() -> PolyMeshSample {
    PolyMeshSample::new(
        vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
        vec![4],
        vec![0, 1, 2, 3],
    )
}

fn single_mesh(mesh: MeshSchema) -> Arc<SceneGraph> {
    let mut b = SceneBuilder::new();
    b.transform("/", "geo", XformSchema::default()).unwrap();
    b.mesh("/geo", "shape", mesh).unwrap();
    Arc::new(b.build().unwrap())
}

#[test]
fn test_quad_winding_reversal() {
    init_logging();
    let ex = Expander::new(
        single_mesh(MeshSchema::constant(quad())),
        ExpandSettings::default(),
        ExpandRequest::at(0.0),
    );
    let shape = ex.expand_path("/geo/shape").unwrap();
    let mesh = shape.geometry.mesh().unwrap();
    assert_eq!(mesh.vertex_indices, vec![0, 3, 2, 1]);

    let keep = ExpandSettings { reverse_winding: false, ..Default::default() };
    let ex = Expander::new(single_mesh(MeshSchema::constant(quad())), keep, ExpandRequest::at(0.0));
    let shape = ex.expand_path("/geo/shape").unwrap();
    assert_eq!(shape.geometry.mesh().unwrap().vertex_indices, vec![0, 1, 2, 3]);
}

#[test]
fn test_velocity_motion_blur() {
    init_logging();
    let sample = quad().with_velocities(vec![Vec3::X; 4]);
    let mesh = MeshSchema::constant(sample).with_topology(TopologyVariance::Heterogeneous);
    let ex = Expander::new(
        single_mesh(mesh),
        ExpandSettings::default(),
        ExpandRequest::with_motion_times(0.0, &[0.0, 0.5]),
    );
    let shape = ex.expand_path("/geo/shape").unwrap();
    let mesh = shape.geometry.mesh().unwrap();
    assert_eq!(mesh.motion_keys, 2);
    for (base, moved) in mesh.position_block(0).iter().zip(mesh.position_block(1)) {
        assert_eq!(*moved, *base + Vec3::new(0.5, 0.0, 0.0));
    }
    assert_eq!(mesh.positions_as_f32().len(), 2 * 4 * 3);
}

#[test]
fn test_hidden_transform_prunes_subtree() {
    init_logging();
    let mut b = SceneBuilder::new();
    b.transform("/", "hidden", XformSchema::default()).unwrap();
    b.property("/hidden", visibility_property(false)).unwrap();
    b.transform("/hidden", "inner", XformSchema::default()).unwrap();
    b.property("/hidden/inner", visibility_property(true)).unwrap();
    b.mesh("/hidden/inner", "shape", MeshSchema::constant(quad())).unwrap();
    b.mesh("/", "shown", MeshSchema::constant(quad())).unwrap();
    let scene = Arc::new(b.build().unwrap());

    let ex = Expander::new(Arc::clone(&scene), ExpandSettings::default(), ExpandRequest::at(0.0));
    let paths: Vec<String> = ex.collect_shapes().into_iter().map(|e| e.path).collect();
    assert_eq!(paths, vec!["/shown".to_string()]);
    assert_eq!(ex.count_shapes(), 1);

    let all = ExpandSettings { ignore_visibility: true, ..Default::default() };
    let ex = Expander::new(scene, all, ExpandRequest::at(0.0));
    assert_eq!(ex.count_shapes(), 2);
}

#[test]
fn test_mismatched_uv_samples_dropped() {
    init_logging();
    let values = vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
    let uvs = GeomParam::new(
        GeometryScope::FaceVarying,
        Property::sampled_at(
            vec![0.0, 1.0],
            vec![
                IndexedSample::indexed(values.clone(), vec![0, 1, 2, 3]),
                IndexedSample::indexed(values, vec![0, 1, 2, 3, 0]),
            ],
        ),
    );
    let mesh = MeshSchema::constant(quad()).with_uvs(uvs);
    let ex = Expander::new(single_mesh(mesh), ExpandSettings::default(), ExpandRequest::at(0.3));
    let shape = ex.expand_path("/geo/shape").unwrap();
    let mesh = shape.geometry.mesh().unwrap();
    assert!(mesh.uv_sets.is_empty());
    assert_eq!(mesh.num_faces(), 1);
    assert_eq!(mesh.point_count, 4);
}

#[test]
fn test_matching_uv_samples_blend() {
    init_logging();
    let uvs = GeomParam::new(
        GeometryScope::FaceVarying,
        Property::sampled_at(
            vec![0.0, 1.0],
            vec![
                IndexedSample::new(vec![Vec2::ZERO; 4]),
                IndexedSample::new(vec![Vec2::ONE; 4]),
            ],
        ),
    );
    let mesh = MeshSchema::constant(quad()).with_uvs(uvs);
    let ex = Expander::new(single_mesh(mesh), ExpandSettings::default(), ExpandRequest::at(0.25));
    let shape = ex.expand_path("/geo/shape").unwrap();
    let uv = shape.geometry.mesh().unwrap().uv_set("").unwrap();
    assert_eq!(uv.indices, vec![0, 3, 2, 1]);
    assert!((uv.values[0].x - 0.25).abs() < 1e-6);
}

#[test]
fn test_tangents_unit_and_orthogonal() {
    init_logging();
    let positions = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.2),
        Vec3::new(2.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.1),
        Vec3::new(1.0, 1.0, 0.4),
        Vec3::new(2.0, 1.0, 0.0),
    ];
    let face_indices = vec![0, 1, 4, 3, 1, 2, 5, 4];
    let uv_values: Vec<Vec2> = face_indices
        .iter()
        .map(|&i| {
            let p = positions[i as usize];
            Vec2::new(p.x * 0.5, p.y)
        })
        .collect();
    let sample = PolyMeshSample::new(positions, vec![4, 4], face_indices);
    let mesh = MeshSchema::constant(sample)
        .with_uvs(GeomParam::constant(GeometryScope::FaceVarying, IndexedSample::new(uv_values)));
    let settings = ExpandSettings { compute_tangents_for_uvs: vec!["uv".into()], ..Default::default() };
    let ex = Expander::new(single_mesh(mesh), settings, ExpandRequest::at(0.0));
    let shape = ex.expand_path("/geo/shape").unwrap();
    let mesh = shape.geometry.mesh().unwrap();

    let normals = smooth_normals(
        mesh.position_block(0),
        &mesh.face_counts,
        &mesh.vertex_indices,
        true,
    );
    let (t, b) = mesh.tangent_frame("").unwrap();
    let t = t.as_f32().unwrap();
    let b = b.as_f32().unwrap();
    for (i, n) in normals.iter().enumerate() {
        let t = Vec3::from_slice(&t[i * 3..]);
        let b = Vec3::from_slice(&b[i * 3..]);
        assert!((t.length() - 1.0).abs() < 1e-4, "tangent {i} not unit: {t}");
        assert!((b.length() - 1.0).abs() < 1e-4, "bitangent {i} not unit: {b}");
        assert!(t.dot(*n).abs() < 1e-4);
        assert!(b.dot(*n).abs() < 1e-4);
    }
}

#[test]
fn test_transform_blur_matrices() {
    init_logging();
    let xform = XformSchema::animated(Property::sampled_at(
        vec![0.0, 1.0],
        vec![
            XformSample::with_ops(vec![XformOp::translate(0.0, 0.0, 0.0)], true),
            XformSample::with_ops(vec![XformOp::translate(2.0, 0.0, 0.0)], true),
        ],
    ));
    let mut b = SceneBuilder::new();
    b.transform("/", "geo", xform).unwrap();
    b.mesh("/geo", "shape", MeshSchema::constant(quad())).unwrap();
    let scene = Arc::new(b.build().unwrap());

    let request = ExpandRequest::with_motion_times(0.5, &[0.25, 0.75]);
    let ex = Expander::new(Arc::clone(&scene), ExpandSettings::default(), request.clone());
    let shape = ex.expand_path("/geo/shape").unwrap();
    assert_eq!(shape.entry.world_matrices.len(), 2);
    assert!((shape.entry.world_matrix(0).w_axis.x - 0.5).abs() < 1e-9);
    assert!((shape.entry.world_matrix(1).w_axis.x - 1.5).abs() < 1e-9);
    assert_eq!(ex.time_range(), Some((0.0, 1.0)));

    let settings = ExpandSettings { ignore_transform_blur: true, ..Default::default() };
    let ex = Expander::new(scene, settings, request);
    let shape = ex.expand_path("/geo/shape").unwrap();
    assert_eq!(shape.entry.world_matrices.len(), 1);
    assert!((shape.entry.world_matrix(0).w_axis.x - 1.0).abs() < 1e-9);
}

#[test]
fn test_name_prefix_and_instance_paths() {
    init_logging();
    let mut b = SceneBuilder::new();
    b.transform("/", "geo", XformSchema::default()).unwrap();
    b.mesh("/geo", "shape", MeshSchema::constant(quad())).unwrap();
    b.instance("/", "copy", "/geo").unwrap();
    let scene = Arc::new(b.build().unwrap());

    let settings = ExpandSettings { name_prefix: "ns:".into(), ..Default::default() };
    let ex = Expander::new(Arc::clone(&scene), settings, ExpandRequest::at(0.0));
    let mut names: Vec<String> = ex.collect_shapes().into_iter().map(|e| e.name).collect();
    names.sort();
    assert_eq!(names, vec!["ns:/copy/shape".to_string(), "ns:/geo/shape".to_string()]);

    let settings = ExpandSettings { ignore_instances: true, ..Default::default() };
    let ex = Expander::new(scene, settings, ExpandRequest::at(0.0));
    assert_eq!(ex.count_shapes(), 1);
}
