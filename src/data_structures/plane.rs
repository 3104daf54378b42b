//! Flat, subdivided rectangle in the XY plane facing +Z.

use crate::{data_structures::model::{MeshData, ModelVertex}, resources::mesh::compute_tangents};

/// Builds a `width` x `height` grid centred on the origin.
///
/// Rows run from +Y down to -Y, so `v` grows downwards like wgpu's texture
/// origin. Both segment counts are at least one.
pub fn plane(width: f32, height: f32, width_segments: u32, height_segments: u32) -> MeshData {
    let grid_x = width_segments.max(1);
    let grid_y = height_segments.max(1);
    let row = grid_x + 1;
    let segment_width = width / grid_x as f32;
    let segment_height = height / grid_y as f32;
    let width_half = width / 2.0;
    let height_half = height / 2.0;

    let mut vertices = Vec::with_capacity((row * (grid_y + 1)) as usize);
    for iy in 0..=grid_y {
        let y = iy as f32 * segment_height - height_half;
        for ix in 0..=grid_x {
            let x = ix as f32 * segment_width - width_half;
            vertices.push(ModelVertex {
                position: [x, -y, 0.0],
                tex_coords: [ix as f32 / grid_x as f32, iy as f32 / grid_y as f32],
                normal: [0.0, 0.0, 1.0],
                ..Default::default()
            });
        }
    }

    let mut indices = Vec::with_capacity((6 * grid_x * grid_y) as usize);
    for iy in 0..grid_y {
        for ix in 0..grid_x {
            let a = ix + row * iy;
            let b = ix + row * (iy + 1);
            let c = (ix + 1) + row * (iy + 1);
            let d = (ix + 1) + row * iy;
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }

    compute_tangents(&mut vertices, &indices);
    MeshData {
        name: "plane".to_string(),
        vertices,
        indices,
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Vector3};

    use super::*;

    #[test]
    fn counts_follow_segments() {
        let mesh = plane(30.0, 30.0, 1, 1);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);

        let mesh = plane(2.0, 1.0, 4, 3);
        assert_eq!(mesh.vertices.len(), 5 * 4);
        assert_eq!(mesh.indices.len(), 6 * 4 * 3);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn bounds_are_centred() {
        let mesh = plane(30.0, 10.0, 3, 2);
        let xs = mesh.vertices.iter().map(|v| v.position[0]);
        let ys = mesh.vertices.iter().map(|v| v.position[1]);
        assert_eq!(xs.clone().fold(f32::MAX, f32::min), -15.0);
        assert_eq!(xs.fold(f32::MIN, f32::max), 15.0);
        assert_eq!(ys.clone().fold(f32::MAX, f32::min), -5.0);
        assert_eq!(ys.fold(f32::MIN, f32::max), 5.0);
        assert!(mesh.vertices.iter().all(|v| v.position[2] == 0.0));
    }

    #[test]
    fn faces_point_along_normal() {
        let mesh = plane(2.0, 2.0, 2, 2);
        assert!(mesh.vertices.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));
        for tri in mesh.indices.chunks(3) {
            let p = |i: u32| Vector3::from(mesh.vertices[i as usize].position);
            let face = (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]));
            assert!(face.z > 0.0, "triangle {tri:?} is wound clockwise");
        }
        let first = &mesh.vertices[0];
        assert_eq!(first.tex_coords, [0.0, 0.0]);
        assert!((Vector3::from(first.tangent) - Vector3::unit_x()).magnitude() < 1e-5);
    }
}
