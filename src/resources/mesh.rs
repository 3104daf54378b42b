use cgmath::{InnerSpace, Vector2, Vector3, Zero};

use crate::data_structures::model::ModelVertex;

/**
 * Normal maps need a tangent frame per vertex. glTF primitives without a TANGENT
 * attribute and generated geometry get theirs computed from positions and uvs.
 *
 * Triangles with degenerate uvs contribute nothing; vertices that end up without a
 * usable tangent get an arbitrary frame orthogonal to their normal.
 */
pub fn compute_tangents(vertices: &mut [ModelVertex], indices: &[u32]) {
    let mut tangents = vec![Vector3::<f32>::zero(); vertices.len()];
    let mut bitangents = vec![Vector3::<f32>::zero(); vertices.len()];
    let mut triangles_included = vec![0u32; vertices.len()];

    for c in indices.chunks_exact(3) {
        let [i0, i1, i2] = [c[0] as usize, c[1] as usize, c[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let (v0, v1, v2) = (vertices[i0], vertices[i1], vertices[i2]);

        let pos0: Vector3<_> = v0.position.into();
        let pos1: Vector3<_> = v1.position.into();
        let pos2: Vector3<_> = v2.position.into();

        let uv0: Vector2<_> = v0.tex_coords.into();
        let uv1: Vector2<_> = v1.tex_coords.into();
        let uv2: Vector2<_> = v2.tex_coords.into();

        let delta_pos1 = pos1 - pos0;
        let delta_pos2 = pos2 - pos0;
        let delta_uv1 = uv1 - uv0;
        let delta_uv2 = uv2 - uv0;

        // Solves
        //     delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
        //     delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
        let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        if det.abs() < f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
        // Flipped so that OpenGL-style (green up) normal maps work with wgpu's
        // top-left texture origin
        let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * -r;

        for i in [i0, i1, i2] {
            tangents[i] += tangent;
            bitangents[i] += bitangent;
            triangles_included[i] += 1;
        }
    }

    for (i, v) in vertices.iter_mut().enumerate() {
        let normal = Vector3::from(v.normal);
        let normal = if normal.magnitude2() > f32::EPSILON {
            normal.normalize()
        } else {
            Vector3::unit_z()
        };
        let n = triangles_included[i];
        let (tangent, bitangent) = if n == 0 {
            (Vector3::zero(), Vector3::zero())
        } else {
            let denom = 1.0 / n as f32;
            (tangents[i] * denom, bitangents[i] * denom)
        };

        // Gram-Schmidt against the normal, keeping the bitangent's handedness
        let tangent = tangent - normal * normal.dot(tangent);
        let (tangent, bitangent) = if tangent.magnitude2() > f32::EPSILON {
            let tangent = tangent.normalize();
            let sign = if normal.cross(tangent).dot(bitangent) < 0.0 {
                -1.0
            } else {
                1.0
            };
            (tangent, normal.cross(tangent) * sign)
        } else {
            orthonormal_frame(normal)
        };
        v.tangent = tangent.into();
        v.bitangent = bitangent.into();
    }
}

/// Area-weighted vertex normals, for primitives that ship without a NORMAL attribute.
pub fn compute_normals(vertices: &mut [ModelVertex], indices: &[u32]) {
    let mut normals = vec![Vector3::<f32>::zero(); vertices.len()];
    for c in indices.chunks_exact(3) {
        let [i0, i1, i2] = [c[0] as usize, c[1] as usize, c[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let pos0 = Vector3::from(vertices[i0].position);
        let face = (Vector3::from(vertices[i1].position) - pos0)
            .cross(Vector3::from(vertices[i2].position) - pos0);
        for i in [i0, i1, i2] {
            normals[i] += face;
        }
    }
    for (v, n) in vertices.iter_mut().zip(normals) {
        v.normal = if n.magnitude2() > f32::EPSILON {
            n.normalize().into()
        } else {
            [0.0, 1.0, 0.0]
        };
    }
}

fn orthonormal_frame(normal: Vector3<f32>) -> (Vector3<f32>, Vector3<f32>) {
    let axis = if normal.x.abs() < 0.9 {
        Vector3::unit_x()
    } else {
        Vector3::unit_y()
    };
    let tangent = (axis - normal * normal.dot(axis)).normalize();
    (tangent, normal.cross(tangent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(position: [f32; 3], tex_coords: [f32; 2]) -> ModelVertex {
        ModelVertex {
            position,
            tex_coords,
            normal: [0.0, 0.0, 1.0],
            ..Default::default()
        }
    }

    fn assert_close(a: [f32; 3], b: [f32; 3]) {
        let d = Vector3::from(a) - Vector3::from(b);
        assert!(d.magnitude() < 1e-5, "{a:?} != {b:?}");
    }

    #[test]
    fn tangent_follows_u_and_bitangent_points_up() {
        // uv origin is the top left corner, as in wgpu
        let mut vertices = vec![
            vertex([0.0, 0.0, 0.0], [0.0, 1.0]),
            vertex([1.0, 0.0, 0.0], [1.0, 1.0]),
            vertex([0.0, 1.0, 0.0], [0.0, 0.0]),
        ];
        compute_tangents(&mut vertices, &[0, 1, 2]);
        for v in &vertices {
            assert_close(v.tangent, [1.0, 0.0, 0.0]);
            assert_close(v.bitangent, [0.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn degenerate_uvs_fall_back_to_orthogonal_frame() {
        let mut vertices = vec![
            vertex([0.0, 0.0, 0.0], [0.5, 0.5]),
            vertex([1.0, 0.0, 0.0], [0.5, 0.5]),
            vertex([0.0, 1.0, 0.0], [0.5, 0.5]),
        ];
        compute_tangents(&mut vertices, &[0, 1, 2]);
        for v in &vertices {
            let t = Vector3::from(v.tangent);
            let b = Vector3::from(v.bitangent);
            let n = Vector3::from(v.normal);
            assert!(t.x.is_finite() && t.y.is_finite() && t.z.is_finite());
            assert!((t.magnitude() - 1.0).abs() < 1e-5);
            assert!(t.dot(n).abs() < 1e-5);
            assert!(b.dot(n).abs() < 1e-5);
        }
    }

    #[test]
    fn normals_follow_winding() {
        let mut vertices = vec![
            vertex([0.0, 0.0, 0.0], [0.0, 0.0]),
            vertex([0.0, 0.0, 1.0], [0.0, 0.0]),
            vertex([1.0, 0.0, 0.0], [0.0, 0.0]),
            vertex([9.0, 9.0, 9.0], [0.0, 0.0]),
        ];
        compute_normals(&mut vertices, &[0, 1, 2]);
        assert_close(vertices[0].normal, [0.0, 1.0, 0.0]);
        assert_close(vertices[2].normal, [0.0, 1.0, 0.0]);
        // Unreferenced vertices still get a unit normal
        assert_close(vertices[3].normal, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn unreferenced_vertices_and_bad_indices_are_tolerated() {
        let mut vertices = vec![
            vertex([0.0, 0.0, 0.0], [0.0, 1.0]),
            vertex([1.0, 0.0, 0.0], [1.0, 1.0]),
            vertex([0.0, 1.0, 0.0], [0.0, 0.0]),
            vertex([5.0, 5.0, 5.0], [0.0, 0.0]),
        ];
        // The second triangle points past the end and the trailing index is incomplete
        compute_tangents(&mut vertices, &[0, 1, 2, 0, 1, 9, 3]);
        assert_close(vertices[0].tangent, [1.0, 0.0, 0.0]);
        let lonely = Vector3::from(vertices[3].tangent);
        assert!((lonely.magnitude() - 1.0).abs() < 1e-5);
    }
}
