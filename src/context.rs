use std::{fmt, sync::Arc};

use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    camera::{self, CameraResources, CameraUniform, OrbitControls, Projection},
    config::SceneConfig,
    data_structures::texture,
    pipelines::{Pipelines, light::LightResources},
    resources::texture::material_layout,
};

/// Startup failures of the GPU context.
#[derive(Debug)]
pub enum ContextError {
    /// No adapter could be found, e.g. WebGL is disabled in the browser.
    GraphicsUnavailable,
    Surface(wgpu::CreateSurfaceError),
    Device(wgpu::RequestDeviceError),
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::GraphicsUnavailable => {
                f.write_str("no graphics adapter available (is WebGL2 supported and enabled?)")
            }
            ContextError::Surface(e) => write!(f, "unable to create the render surface: {e}"),
            ContextError::Device(e) => write!(f, "unable to open the graphics device: {e}"),
        }
    }
}

impl ContextError {
    /// On the web both a missing adapter and a canvas that refuses a WebGL2
    /// context mean the browser cannot render the scene.
    pub fn shows_webgl_warning(&self) -> bool {
        matches!(
            self,
            ContextError::GraphicsUnavailable | ContextError::Surface(_)
        )
    }
}

impl std::error::Error for ContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ContextError::GraphicsUnavailable => None,
            ContextError::Surface(e) => Some(e),
            ContextError::Device(e) => Some(e),
        }
    }
}

#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    pub(crate) depth_texture: texture::Texture,
    pub(crate) msaa_target: Option<texture::Texture>,
    pub sample_count: u32,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub camera: CameraResources,
    pub projection: Projection,
    pub light: LightResources,
    pub pipelines: Pipelines,
    pub material_bind_group_layout: wgpu::BindGroupLayout,
    pub clear_colour: wgpu::Color,
    pub show_background: bool,
    pub scene: SceneConfig,
}

impl Context {
    pub async fn new(window: Arc<Window>, scene: &SceneConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();

        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(ContextError::Surface)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| {
                log::error!("{e}");
                ContextError::GraphicsUnavailable
            })?;
        log::info!("Adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL2 caps the limits below the wgpu defaults
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(ContextError::Device)?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Shaders output linear colour and rely on an sRGB surface for encoding.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or(surface_caps.formats.first().copied())
            .ok_or(ContextError::GraphicsUnavailable)?;
        let alpha_mode = if scene.renderer.transparent
            && surface_caps
                .alpha_modes
                .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
        {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else {
            surface_caps.alpha_modes[0]
        };
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let projection = Projection::new(
            config.width,
            config.height,
            cgmath::Deg(scene.camera.fov),
            scene.camera.near,
            scene.camera.far,
        );
        let camera = camera::camera_from_config(&scene.camera);
        let controller = OrbitControls::new(&scene.controls, config.height);

        let mut camera_uniform = CameraUniform::new();
        camera_uniform.update_view_proj(&camera, &projection);

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("camera_bind_group_layout"),
            });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        let camera = CameraResources {
            camera,
            controller,
            uniform: camera_uniform,
            buffer: camera_buffer,
            bind_group: camera_bind_group,
            bind_group_layout: camera_bind_group_layout,
        };

        let sample_count = scene.renderer.sample_count();
        let depth_texture = texture::Texture::create_depth_texture(
            &device,
            [config.width, config.height],
            sample_count,
            "depth_texture",
        );
        let msaa_target = (sample_count > 1)
            .then(|| texture::Texture::create_msaa_target(&device, &config, sample_count));

        let light = LightResources::new(&device, &queue, scene);
        let material_bind_group_layout = material_layout(&device);
        let pipelines = Pipelines::new(
            &device,
            &config,
            sample_count,
            &material_bind_group_layout,
            &camera.bind_group_layout,
            &light,
        );

        Ok(Self {
            window,
            depth_texture,
            msaa_target,
            sample_count,
            surface,
            device,
            queue,
            config,
            camera,
            projection,
            light,
            pipelines,
            material_bind_group_layout,
            clear_colour: scene.background.to_wgpu(),
            show_background: false,
            scene: scene.clone(),
        })
    }

    /// Recreates the size dependent attachments after the surface was reconfigured.
    pub(crate) fn recreate_attachments(&mut self) {
        self.depth_texture = texture::Texture::create_depth_texture(
            &self.device,
            [self.config.width, self.config.height],
            self.sample_count,
            "depth_texture",
        );
        self.msaa_target = (self.sample_count > 1).then(|| {
            texture::Texture::create_msaa_target(&self.device, &self.config, self.sample_count)
        });
    }
}

/// The parts of the [`Context`] asynchronous loaders need. Cloning only bumps
/// reference counts.
#[derive(Debug, Clone)]
pub struct InitContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub material_bind_group_layout: wgpu::BindGroupLayout,
    pub scene: SceneConfig,
}

impl From<&Context> for InitContext {
    fn from(ctx: &Context) -> Self {
        Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            material_bind_group_layout: ctx.material_bind_group_layout.clone(),
            scene: ctx.scene.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_adapter_shows_webgl_warning() {
        assert!(ContextError::GraphicsUnavailable.shows_webgl_warning());
    }

    #[test]
    fn warning_survives_added_context() {
        let err = anyhow::Error::new(ContextError::GraphicsUnavailable).context("App startup");
        let shows = err
            .downcast_ref::<ContextError>()
            .is_some_and(ContextError::shows_webgl_warning);
        assert!(shows);
    }
}
