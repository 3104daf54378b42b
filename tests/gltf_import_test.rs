use car_scene::resources::gltf_scene::ImportedScene;
use cgmath::{InnerSpace, Vector3};

use crate::common::test_utils::{TRIANGLE, car_glb, glb};

mod common;

#[test]
fn keeps_the_node_hierarchy() {
    let scene = ImportedScene::from_slice(&car_glb([0, 2, 1])).unwrap();
    assert_eq!(scene.roots.len(), 1);
    let car = &scene.roots[0];
    assert_eq!(car.name.as_deref(), Some("car"));
    assert!(car.meshes.is_empty());
    assert_eq!(car.children.len(), 1);
    let wheel = &car.children[0];
    assert_eq!(wheel.name.as_deref(), Some("wheel"));
    assert_eq!(wheel.meshes.len(), 2);
    assert_eq!(scene.mesh_count(), 2);
}

#[test]
fn decomposes_node_transforms() {
    let scene = ImportedScene::from_slice(&car_glb([0, 2, 1])).unwrap();
    let car = &scene.roots[0];
    assert_eq!(car.transform.position, Vector3::new(0.0, 1.0, 0.0));

    let wheel = &car.children[0];
    assert_eq!(wheel.transform.scale, Vector3::new(2.0, 2.0, 2.0));
    // A quarter turn about +Y sends +X to -Z
    let turned = wheel.transform.rotation * Vector3::unit_x();
    assert!((turned - Vector3::new(0.0, 0.0, -1.0)).magnitude() < 1e-5);
}

#[test]
fn keeps_index_data_and_generates_missing_indices() {
    let scene = ImportedScene::from_slice(&car_glb([0, 2, 1])).unwrap();
    let wheel = &scene.roots[0].children[0];
    assert_eq!(wheel.meshes[0].indices, vec![0, 2, 1]);
    assert_eq!(wheel.meshes[1].indices, vec![0, 1, 2]);
    let positions: Vec<[f32; 3]> = wheel.meshes[0].vertices.iter().map(|v| v.position).collect();
    assert_eq!(positions, TRIANGLE.to_vec());
}

#[test]
fn fills_in_normals_and_tangents() {
    let scene = ImportedScene::from_slice(&car_glb([0, 1, 2])).unwrap();
    for vertex in &scene.roots[0].children[0].meshes[0].vertices {
        let normal = Vector3::from(vertex.normal);
        let tangent = Vector3::from(vertex.tangent);
        assert!((normal.magnitude() - 1.0).abs() < 1e-4);
        assert!((normal.z.abs() - 1.0).abs() < 1e-4);
        assert!(tangent.x.is_finite() && tangent.y.is_finite() && tangent.z.is_finite());
        assert!(normal.dot(tangent).abs() < 1e-3);
    }
}

#[test]
fn rejects_indices_past_the_vertex_count() {
    let err = ImportedScene::from_slice(&car_glb([0, 1, 5])).unwrap_err();
    assert!(format!("{err:#}").contains("references vertex 5"));
}

#[test]
fn external_buffers_need_the_file_loader() {
    let json = r#"{
  "asset": { "version": "2.0" },
  "buffers": [{ "byteLength": 4, "uri": "car.bin" }]
}"#;
    let err = ImportedScene::from_slice(&glb(json, &[0; 4])).unwrap_err();
    assert!(format!("{err:#}").contains("car.bin"));
}

#[test]
fn documents_without_a_scene_import_empty() {
    let json = r#"{ "asset": { "version": "2.0" } }"#;
    let scene = ImportedScene::from_slice(&glb(json, &[])).unwrap();
    assert!(scene.roots.is_empty());
    assert_eq!(scene.mesh_count(), 0);
}
