//! glTF import.
//!
//! Parsing happens on the CPU into an [`ImportedScene`] first, so it can be
//! tested without a GPU and uploaded later with [`ImportedScene::to_scene_node`].
//! Materials stored in the file are ignored: the showroom assigns its own
//! physical material to every mesh.

use anyhow::{Context as _, bail};
use cgmath::Quaternion;

use crate::{
    data_structures::{
        instance::Instance,
        model::{Material, MeshData, Model, ModelVertex},
        scene_graph::{ContainerNode, ModelNode, SceneNode},
    },
    resources::{LoadProgress, load_binary, load_binary_with_progress, mesh},
};

#[derive(Clone, Debug, Default)]
pub struct ImportedNode {
    pub name: Option<String>,
    pub transform: Instance,
    pub meshes: Vec<MeshData>,
    pub children: Vec<ImportedNode>,
}

impl ImportedNode {
    fn mesh_count(&self) -> usize {
        self.meshes.len() + self.children.iter().map(ImportedNode::mesh_count).sum::<usize>()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ImportedScene {
    pub roots: Vec<ImportedNode>,
}

impl ImportedScene {
    /// Parses a GLB (or a glTF whose buffers are all embedded in the binary chunk).
    pub fn from_slice(bytes: &[u8]) -> anyhow::Result<Self> {
        let gltf = ::gltf::Gltf::from_slice(bytes).context("parse glTF")?;
        let mut buffers = Vec::new();
        for buffer in gltf.buffers() {
            match buffer.source() {
                ::gltf::buffer::Source::Bin => {
                    let blob = gltf.blob.as_deref().context("GLB has no binary chunk")?;
                    buffers.push(blob.to_vec());
                }
                ::gltf::buffer::Source::Uri(uri) => {
                    bail!("buffer {uri} is external, load the file with load_gltf_scene")
                }
            }
        }
        Self::from_document(&gltf.document, &buffers)
    }

    pub fn from_document(document: &::gltf::Document, buffers: &[Vec<u8>]) -> anyhow::Result<Self> {
        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next());
        let roots = match scene {
            Some(scene) => scene
                .nodes()
                .map(|node| import_node(&node, buffers))
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => {
                log::warn!("glTF document contains no scene");
                Vec::new()
            }
        };
        Ok(Self { roots })
    }

    pub fn mesh_count(&self) -> usize {
        self.roots.iter().map(ImportedNode::mesh_count).sum()
    }

    /// Uploads every mesh. All of them share `material`; shadow flags start off.
    pub fn to_scene_node(&self, device: &wgpu::Device, material: &Material) -> Box<dyn SceneNode> {
        let mut root = ContainerNode::new("gltf scene");
        for node in &self.roots {
            root.add_child(to_scene_node(node, device, material));
        }
        Box::new(root)
    }
}

pub fn to_scene_node(
    node: &ImportedNode,
    device: &wgpu::Device,
    material: &Material,
) -> Box<dyn SceneNode> {
    let mut scene_node: Box<dyn SceneNode> = if node.meshes.is_empty() {
        Box::new(ContainerNode::new(node.name.clone().unwrap_or_default()))
    } else {
        let model = Model {
            meshes: node.meshes.iter().map(|mesh| mesh.upload(device)).collect(),
            material: material.clone(),
        };
        Box::new(ModelNode::new(device, model, false, false))
    };
    scene_node.set_local_transform(node.transform.clone());
    for child in &node.children {
        scene_node.add_child(to_scene_node(child, device, material));
    }
    scene_node
}

/// Loads a `.glb` or `.gltf` from the asset root, reporting download progress of the
/// main file. External buffers are resolved relative to the file.
pub async fn load_gltf_scene<F>(file_name: &str, on_progress: F) -> anyhow::Result<ImportedScene>
where
    F: FnMut(LoadProgress),
{
    let bytes = load_binary_with_progress(file_name, on_progress).await?;
    let gltf = ::gltf::Gltf::from_slice(&bytes).with_context(|| format!("parse {file_name}"))?;

    let mut buffers = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            ::gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .with_context(|| format!("{file_name} has no binary chunk"))?;
                buffers.push(blob.to_vec());
            }
            ::gltf::buffer::Source::Uri(uri) => {
                if uri.starts_with("data:") {
                    bail!("{file_name}: data URI buffers are not supported");
                }
                let path = match file_name.rfind('/') {
                    Some(idx) => format!("{}/{}", &file_name[..idx], uri),
                    None => uri.to_string(),
                };
                buffers.push(load_binary(&path).await?);
            }
        }
    }
    ImportedScene::from_document(&gltf.document, &buffers)
        .with_context(|| format!("import {file_name}"))
}

fn import_node(node: &::gltf::Node, buffers: &[Vec<u8>]) -> anyhow::Result<ImportedNode> {
    let (translation, [x, y, z, w], scale) = node.transform().decomposed();
    let transform = Instance {
        position: translation.into(),
        rotation: Quaternion::new(w, x, y, z),
        scale: scale.into(),
    };

    let mut meshes = Vec::new();
    if let Some(mesh) = node.mesh() {
        let name = mesh.name().unwrap_or("unknown_mesh");
        for primitive in mesh.primitives() {
            if primitive.mode() != ::gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Skipping primitive {} of {name}: {:?} is not supported",
                    primitive.index(),
                    primitive.mode()
                );
                continue;
            }
            if let Some(mesh_data) = import_primitive(name, &primitive, buffers)? {
                meshes.push(mesh_data);
            }
        }
    }

    let children = node
        .children()
        .map(|child| import_node(&child, buffers))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(ImportedNode {
        name: node.name().map(str::to_string),
        transform,
        meshes,
        children,
    })
}

fn import_primitive(
    name: &str,
    primitive: &::gltf::Primitive,
    buffers: &[Vec<u8>],
) -> anyhow::Result<Option<MeshData>> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));

    let Some(positions) = reader.read_positions() else {
        log::warn!("Primitive {} of {name} has no positions", primitive.index());
        return Ok(None);
    };
    let mut vertices: Vec<ModelVertex> = positions
        .map(|position| ModelVertex {
            position,
            ..Default::default()
        })
        .collect();

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..vertices.len() as u32).collect(),
    };
    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
        bail!(
            "primitive {} of {name} references vertex {bad} but has only {}",
            primitive.index(),
            vertices.len()
        );
    }

    if let Some(tex_coords) = reader.read_tex_coords(0) {
        for (vertex, uv) in vertices.iter_mut().zip(tex_coords.into_f32()) {
            vertex.tex_coords = uv;
        }
    }

    match reader.read_normals() {
        Some(normals) => {
            for (vertex, normal) in vertices.iter_mut().zip(normals) {
                vertex.normal = normal;
            }
        }
        None => mesh::compute_normals(&mut vertices, &indices),
    }

    match reader.read_tangents() {
        Some(tangents) => {
            for (vertex, tangent) in vertices.iter_mut().zip(tangents) {
                // The fourth component carries the handedness of the bitangent
                let tangent: cgmath::Vector4<f32> = tangent.into();
                let normal: cgmath::Vector3<f32> = vertex.normal.into();
                vertex.tangent = tangent.truncate().into();
                vertex.bitangent = (normal.cross(tangent.truncate()) * tangent.w).into();
            }
        }
        None => mesh::compute_tangents(&mut vertices, &indices),
    }

    Ok(Some(MeshData {
        name: name.to_string(),
        vertices,
        indices,
    }))
}
