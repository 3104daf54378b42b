use cgmath::{InnerSpace, Matrix4, Point3, Vector3, ortho};
use wgpu::util::DeviceExt;

use crate::{
    camera::OPENGL_TO_WGPU_MATRIX,
    config::{MAX_DIRECTIONAL_LIGHTS, SceneConfig},
    data_structures::texture::Texture,
};

/// Half extent of the orthographic box each directional light renders its shadow map with.
const SHADOW_EXTENT: f32 = 5.0;
const SHADOW_NEAR: f32 = 0.5;
const SHADOW_FAR: f32 = 500.0;

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DirectionalLightRaw {
    /// Unit vector towards the light; `w` is 1 when the light casts shadows.
    direction: [f32; 4],
    /// Linear colour premultiplied by intensity.
    color: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightsUniform {
    ambient: [f32; 4],
    // sRGB, fog is blended in display space; w toggles fog
    fog_color: [f32; 4],
    // fog near, fog far, exposure, number of directional lights
    params: [f32; 4],
    // environment lighting on, environment intensity, 1 / shadow map size, shadows on
    environment: [f32; 4],
    directional: [DirectionalLightRaw; MAX_DIRECTIONAL_LIGHTS],
}

impl LightsUniform {
    pub fn new(config: &SceneConfig) -> Self {
        let ambient = &config.lights.ambient;
        let [ar, ag, ab] = ambient.colour.to_linear();
        let [fr, fg, fb] = config.fog.colour.to_srgb();
        let shadows = config.renderer.shadows;

        let mut directional = [DirectionalLightRaw::default(); MAX_DIRECTIONAL_LIGHTS];
        for (raw, light) in directional.iter_mut().zip(&config.lights.directional) {
            let [r, g, b] = light.colour.to_linear();
            let position = Vector3::from(light.position);
            let direction = if position.magnitude2() > 0.0 {
                position.normalize()
            } else {
                Vector3::unit_y()
            };
            let casts = light.cast_shadow && shadows;
            *raw = DirectionalLightRaw {
                direction: direction.extend(if casts { 1.0 } else { 0.0 }).into(),
                color: [
                    r * light.intensity,
                    g * light.intensity,
                    b * light.intensity,
                    1.0,
                ],
                view_proj: light_view_proj(light.position).into(),
            };
        }

        Self {
            ambient: [
                ar * ambient.intensity,
                ag * ambient.intensity,
                ab * ambient.intensity,
                1.0,
            ],
            fog_color: [fr, fg, fb, if config.fog.enabled { 1.0 } else { 0.0 }],
            params: [
                config.fog.near,
                config.fog.far,
                config.renderer.exposure,
                config.lights.directional.len().min(MAX_DIRECTIONAL_LIGHTS) as f32,
            ],
            environment: [
                0.0,
                config.environment.intensity,
                1.0 / config.renderer.shadow_map_size.max(1) as f32,
                if shadows { 1.0 } else { 0.0 },
            ],
            directional,
        }
    }

    pub fn light_count(&self) -> usize {
        self.params[3] as usize
    }

    pub fn casts_shadow(&self, light: usize) -> bool {
        light < self.light_count() && self.directional[light].direction[3] > 0.5
    }

    pub fn set_environment_lighting(&mut self, enabled: bool) {
        self.environment[0] = if enabled { 1.0 } else { 0.0 };
    }
}

/// Orthographic projection looking from `position` at the origin, in wgpu clip space.
pub fn light_view_proj(position: [f32; 3]) -> Matrix4<f32> {
    let eye = Point3::from(position);
    let direction = Vector3::from(position);
    let up = if direction.magnitude2() > 0.0 && direction.normalize().y.abs() > 0.99 {
        Vector3::unit_z()
    } else {
        Vector3::unit_y()
    };
    let view = Matrix4::look_at_rh(eye, Point3::new(0.0, 0.0, 0.0), up);
    let proj = ortho(
        -SHADOW_EXTENT,
        SHADOW_EXTENT,
        -SHADOW_EXTENT,
        SHADOW_EXTENT,
        SHADOW_NEAR,
        SHADOW_FAR,
    );
    OPENGL_TO_WGPU_MATRIX * proj * view
}

/// Render target and uniform of one shadow map layer.
#[derive(Debug)]
pub struct ShadowView {
    pub target: wgpu::TextureView,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

/**
 * Everything the lit and background pipelines need to light the scene: the light
 * uniform, the shadow map array with its comparison sampler and the environment
 * map. Until an environment is loaded a black 1x1 texture stands in for it.
 */
#[derive(Debug)]
pub struct LightResources {
    pub uniform: LightsUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub view_bind_group_layout: wgpu::BindGroupLayout,
    pub shadow_views: Vec<ShadowView>,
    shadow_map_view: wgpu::TextureView,
    shadow_sampler: wgpu::Sampler,
    environment: Texture,
    environment_sampler: wgpu::Sampler,
}

impl LightResources {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, config: &SceneConfig) -> Self {
        let uniform = LightsUniform::new(config);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Lights Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let shadow_map_size = config.renderer.shadow_map_size.max(1);
        let shadow_map = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shadow Map Texture"),
            size: wgpu::Extent3d {
                width: shadow_map_size,
                height: shadow_map_size,
                depth_or_array_layers: MAX_DIRECTIONAL_LIGHTS as u32,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Texture::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let shadow_map_view = shadow_map.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Shadow Map View"),
            format: Some(Texture::DEPTH_FORMAT),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            aspect: wgpu::TextureAspect::DepthOnly,
            base_mip_level: 0,
            mip_level_count: None,
            base_array_layer: 0,
            array_layer_count: Some(MAX_DIRECTIONAL_LIGHTS as u32),
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let view_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Shadow Light Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
        let shadow_views = config
            .lights
            .directional
            .iter()
            .take(MAX_DIRECTIONAL_LIGHTS)
            .enumerate()
            .map(|(i, light)| {
                let target = shadow_map.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("Shadow Map Layer {i}")),
                    format: Some(Texture::DEPTH_FORMAT),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    aspect: wgpu::TextureAspect::DepthOnly,
                    base_mip_level: 0,
                    mip_level_count: None,
                    base_array_layer: i as u32,
                    array_layer_count: Some(1),
                    ..Default::default()
                });
                let view_proj: [[f32; 4]; 4] = light_view_proj(light.position).into();
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("Shadow Light {i} Buffer")),
                    contents: bytemuck::cast_slice(&[view_proj]),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    layout: &view_bind_group_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                    label: Some(&format!("Shadow Light {i} Bind Group")),
                });
                ShadowView {
                    target,
                    buffer,
                    bind_group,
                }
            })
            .collect();

        let environment = Texture::solid(device, queue, [0, 0, 0, 0], true, "no environment");
        let environment_sampler = environment
            .sampler
            .clone()
            .unwrap_or_else(|| crate::data_structures::texture::create_default_sampler(device));

        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = mk_bind_group(
            device,
            &bind_group_layout,
            &buffer,
            &shadow_map_view,
            &shadow_sampler,
            &environment.view,
            &environment_sampler,
        );

        Self {
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
            view_bind_group_layout,
            shadow_views,
            shadow_map_view,
            shadow_sampler,
            environment,
            environment_sampler,
        }
    }

    /// Indices of the lights that render a shadow map this frame.
    pub fn shadow_casters(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.shadow_views.len()).filter(|&i| self.uniform.casts_shadow(i))
    }

    /// Binds an RGBE equirectangular map. With `as_lighting` it also lights the scene.
    pub fn set_environment(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        environment: Texture,
        as_lighting: bool,
    ) {
        if let Some(sampler) = &environment.sampler {
            self.environment_sampler = sampler.clone();
        }
        self.environment = environment;
        self.bind_group = mk_bind_group(
            device,
            &self.bind_group_layout,
            &self.buffer,
            &self.shadow_map_view,
            &self.shadow_sampler,
            &self.environment.view,
            &self.environment_sampler,
        );
        self.uniform.set_environment_lighting(as_lighting);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2Array,
                    sample_type: wgpu::TextureSampleType::Depth,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some("light_bind_group_layout"),
    })
}

fn mk_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    shadow_map: &wgpu::TextureView,
    shadow_sampler: &wgpu::Sampler,
    environment: &wgpu::TextureView,
    environment_sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(shadow_map),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(shadow_sampler),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(environment),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::Sampler(environment_sampler),
            },
        ],
        label: Some("light_bind_group"),
    })
}

#[cfg(test)]
mod tests {
    use cgmath::{Transform, Vector4};

    use super::*;
    use crate::config::DirectionalConfig;

    #[test]
    fn uniform_is_std140_sized() {
        assert_eq!(std::mem::size_of::<DirectionalLightRaw>(), 96);
        assert_eq!(std::mem::size_of::<LightsUniform>() % 16, 0);
    }

    #[test]
    fn fog_colour_stays_in_srgb() {
        let mut config = SceneConfig::default();
        config.fog.enabled = true;
        config.fog.colour = crate::config::Colour(0x808080);
        let uniform = LightsUniform::new(&config);
        assert!((uniform.fog_color[0] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(uniform.fog_color[3], 1.0);
    }

    #[test]
    fn default_lights_cast_shadows() {
        let uniform = LightsUniform::new(&SceneConfig::default());
        assert_eq!(uniform.light_count(), 2);
        assert!(uniform.casts_shadow(0));
        assert!(uniform.casts_shadow(1));
        assert!(!uniform.casts_shadow(2));
        // White at intensity 10
        assert_eq!(uniform.directional[0].color, [10.0, 10.0, 10.0, 1.0]);
        let d = Vector3::new(
            uniform.directional[0].direction[0],
            uniform.directional[0].direction[1],
            uniform.directional[0].direction[2],
        );
        assert!((d.magnitude() - 1.0).abs() < 1e-5);
        assert!(d.y > 0.0);
    }

    #[test]
    fn disabling_shadows_clears_every_caster() {
        let mut config = SceneConfig::default();
        config.renderer.shadows = false;
        let uniform = LightsUniform::new(&config);
        assert!(!uniform.casts_shadow(0));
        assert_eq!(uniform.environment[3], 0.0);
    }

    #[test]
    fn environment_lighting_starts_off() {
        let mut uniform = LightsUniform::new(&SceneConfig::default());
        assert_eq!(uniform.environment[0], 0.0);
        uniform.set_environment_lighting(true);
        assert_eq!(uniform.environment[0], 1.0);
    }

    #[test]
    fn origin_lands_in_the_middle_of_the_shadow_map() {
        let m = light_view_proj([-1.0, 3.0, 0.5]);
        let clip = m * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert!(clip.x.abs() < 1e-5 && clip.y.abs() < 1e-5);
        assert!(clip.z > 0.0 && clip.z < 1.0);
        // Points nearer to the light have a smaller depth
        let towards_light = m.transform_point(Point3::new(-0.1, 0.3, 0.05));
        assert!(towards_light.z < clip.z);
    }

    #[test]
    fn light_straight_above_has_a_valid_view() {
        let m = light_view_proj([0.0, 1.0, 0.0]);
        let clip = m * Vector4::new(1.0, 0.0, 1.0, 1.0);
        assert!(clip.x.is_finite() && clip.y.is_finite() && clip.z.is_finite());
        assert!(clip.x.abs() <= 1.0 && clip.y.abs() <= 1.0);
    }

    #[test]
    fn extra_lights_are_ignored() {
        let mut config = SceneConfig::default();
        config.lights.directional = vec![DirectionalConfig::default(); MAX_DIRECTIONAL_LIGHTS + 2];
        let uniform = LightsUniform::new(&config);
        assert_eq!(uniform.light_count(), MAX_DIRECTIONAL_LIGHTS);
    }
}
