//! Render pipelines of the showroom.
//!
//! - `lit`: physically based shading of every mesh, with shadows, fog and tone mapping
//! - `shadow`: depth-only passes that fill one shadow map layer per directional light
//! - `background`: the equirectangular environment drawn behind the scene
//! - `light`: light uniforms, shadow maps and the bind group the other pipelines share

use std::borrow::Cow;

pub mod background;
pub mod light;
pub mod lit;
pub mod shadow;

const COMMON_WGSL: &str = include_str!("common.wgsl");

/// Prepends the structs and helpers shared by all shaders.
pub(crate) fn shader_source(body: &str) -> wgpu::ShaderSource<'static> {
    wgpu::ShaderSource::Wgsl(Cow::Owned(format!("{COMMON_WGSL}\n{body}")))
}

#[derive(Debug)]
pub struct Pipelines {
    pub lit: wgpu::RenderPipeline,
    pub shadow: wgpu::RenderPipeline,
    pub background: wgpu::RenderPipeline,
}

impl Pipelines {
    pub fn new(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        sample_count: u32,
        material_bind_group_layout: &wgpu::BindGroupLayout,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
        light: &light::LightResources,
    ) -> Self {
        Self {
            lit: lit::mk_lit_pipeline(
                device,
                config,
                sample_count,
                material_bind_group_layout,
                camera_bind_group_layout,
                &light.bind_group_layout,
            ),
            shadow: shadow::mk_shadow_pipeline(device, &light.view_bind_group_layout),
            background: background::mk_background_pipeline(
                device,
                config,
                sample_count,
                camera_bind_group_layout,
                &light.bind_group_layout,
            ),
        }
    }
}
