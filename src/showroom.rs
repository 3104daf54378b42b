//! The car showroom: a rock textured ground plane and a spinning group that
//! receives the car once its glTF has loaded.

use cgmath::{Quaternion, Rad, Rotation3, Vector3};
use instant::Duration;

use crate::{
    config::SceneConfig,
    context::{Context, InitContext},
    data_structures::{
        instance::Instance,
        model::{Material, MaterialTextures, Model},
        plane::plane,
        scene_graph::{ContainerNode, ModelNode, SceneNode},
        texture::Texture,
    },
    flow::{GraphicsFlow, Out},
    render::Render,
    resources::{self, LoadProgress, gltf_scene::{ImportedScene, load_gltf_scene}},
};

/// Results of the asynchronous loads started in [`Showroom::on_init`].
pub enum SceneEvent {
    ModelLoaded(ImportedScene),
    EnvironmentLoaded(Texture),
    /// Already logged where it happened.
    LoadFailed,
}

pub struct Showroom {
    config: SceneConfig,
    model_material: Material,
    plane: ModelNode,
    group: ContainerNode,
}

impl Showroom {
    pub async fn new(ctx: InitContext) -> Self {
        let assets = &ctx.scene.assets;
        let (base_colour, normal, displacement, roughness) = futures::join!(
            resources::load_texture(&assets.base_colour_map, false, &ctx.device, &ctx.queue),
            resources::load_texture(&assets.normal_map, true, &ctx.device, &ctx.queue),
            resources::load_texture(&assets.height_map, true, &ctx.device, &ctx.queue),
            resources::load_texture(&assets.roughness_map, true, &ctx.device, &ctx.queue),
        );
        let textures = MaterialTextures {
            base_colour: or_fallback(base_colour, || {
                Texture::solid(&ctx.device, &ctx.queue, [255; 4], false, "white")
            }),
            normal: or_fallback(normal, || {
                Texture::create_default_normal_map(&ctx.device, &ctx.queue)
            }),
            roughness: or_fallback(roughness, || {
                Texture::solid(&ctx.device, &ctx.queue, [255; 4], true, "full roughness")
            }),
            displacement: or_fallback(displacement, || {
                Texture::solid(&ctx.device, &ctx.queue, [0, 0, 0, 255], true, "flat")
            }),
        };

        let model_material = Material::new(
            &ctx.device,
            "car material",
            &ctx.scene.model.material,
            &textures,
            &ctx.material_bind_group_layout,
        );
        let plane_config = &ctx.scene.plane;
        let plane_material = Material::new(
            &ctx.device,
            "plane material",
            &plane_config.material,
            &textures,
            &ctx.material_bind_group_layout,
        );

        let mesh = plane(
            plane_config.width,
            plane_config.height,
            plane_config.width_segments,
            plane_config.height_segments,
        );
        let model = Model {
            meshes: vec![mesh.upload(&ctx.device)],
            material: plane_material,
        };
        let mut plane = ModelNode::new(&ctx.device, model, false, plane_config.receive_shadow);
        plane.set_local_transform(Instance {
            position: Vector3::new(0.0, plane_config.position_y, 0.0),
            rotation: Quaternion::from_angle_x(Rad(plane_config.rotation_x)),
            ..Default::default()
        });

        Self {
            config: ctx.scene.clone(),
            model_material,
            plane,
            group: ContainerNode::new("car group"),
        }
    }

    fn attach_model(&mut self, ctx: &Context, scene: ImportedScene) {
        let settings = &self.config.model;
        let mut root = scene.to_scene_node(&ctx.device, &self.model_material);
        root.traverse_models(&mut |node| {
            node.cast_shadow = settings.cast_shadow;
            node.receive_shadow = settings.receive_shadow;
        });
        root.set_local_transform_with(&mut |local| {
            local.position.y += settings.offset_y;
            local.scale *= settings.scale;
        });
        log::info!("Model attached with {} meshes", scene.mesh_count());
        self.group.add_child(root);
    }
}

fn or_fallback(texture: anyhow::Result<Texture>, fallback: impl FnOnce() -> Texture) -> Texture {
    texture.unwrap_or_else(|e| {
        log::warn!("Using a neutral texture: {e:#}");
        fallback()
    })
}

/// Remembers the last whole percentage so each one is reported once.
#[derive(Default)]
struct WholePercent(Option<f32>);

impl WholePercent {
    fn advance(&mut self, progress: LoadProgress) -> Option<f32> {
        let percent = progress.percent()?.floor();
        (self.0 != Some(percent)).then(|| {
            self.0 = Some(percent);
            percent
        })
    }
}

/// Logs `{percent}% loaded` whenever the whole percentage changes.
fn progress_logger() -> impl FnMut(LoadProgress) {
    let mut last = WholePercent::default();
    move |progress: LoadProgress| {
        if let Some(percent) = last.advance(progress) {
            log::info!("{percent:.0}% loaded");
        }
    }
}

impl GraphicsFlow<(), SceneEvent> for Showroom {
    fn on_init(&mut self, ctx: &mut Context, _: &mut ()) -> Out<(), SceneEvent> {
        ctx.clear_colour = self.config.background.to_wgpu();

        let environment = {
            let file = self.config.assets.environment.clone();
            let device = ctx.device.clone();
            let queue = ctx.queue.clone();
            async move {
                match resources::load_hdr(&file, &device, &queue).await {
                    Ok(texture) => SceneEvent::EnvironmentLoaded(texture),
                    Err(e) => {
                        log::error!("An error happened: {e:#}");
                        SceneEvent::LoadFailed
                    }
                }
            }
        };
        let model = {
            let file = self.config.assets.model.clone();
            async move {
                match load_gltf_scene(&file, progress_logger()).await {
                    Ok(scene) => SceneEvent::ModelLoaded(scene),
                    Err(e) => {
                        log::error!("An error happened: {e:#}");
                        SceneEvent::LoadFailed
                    }
                }
            }
        };
        Out::FutEvent(vec![Box::new(environment), Box::new(model)])
    }

    fn on_update(&mut self, ctx: &Context, _: &mut (), _: Duration) -> Out<(), SceneEvent> {
        // The spin is per rendered frame, so faster displays spin faster
        let spin = Quaternion::from_angle_y(Rad(self.config.model.spin_per_frame));
        self.group
            .set_local_transform_with(&mut |local| local.rotation = spin * local.rotation);
        self.group.update_world_transform_all();
        self.group.write_to_buffers(&ctx.queue);
        self.plane.update_world_transform_all();
        self.plane.write_to_buffers(&ctx.queue);
        Out::Empty
    }

    fn on_custom_events(
        &mut self,
        ctx: &mut Context,
        _: &mut (),
        event: SceneEvent,
    ) -> Option<SceneEvent> {
        match event {
            SceneEvent::ModelLoaded(scene) => self.attach_model(ctx, scene),
            SceneEvent::EnvironmentLoaded(texture) => {
                let environment = &self.config.environment;
                if environment.as_background || environment.as_lighting {
                    ctx.light
                        .set_environment(&ctx.device, &ctx.queue, texture, environment.as_lighting);
                    ctx.show_background = environment.as_background;
                } else {
                    log::info!("Environment map loaded, neither background nor lighting use it");
                }
            }
            SceneEvent::LoadFailed => {}
        }
        None
    }

    fn on_render(&self) -> Render<'_> {
        Render::Composed(vec![
            (&self.plane as &dyn SceneNode).into(),
            (&self.group as &dyn SceneNode).into(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(loaded: u64, total: Option<u64>) -> LoadProgress {
        LoadProgress { loaded, total }
    }

    #[test]
    fn reports_each_whole_percent_once() {
        let mut last = WholePercent::default();
        let reported: Vec<f32> = [0, 5, 9, 10, 15, 10, 999, 1000]
            .into_iter()
            .filter_map(|loaded| last.advance(progress(loaded, Some(1000))))
            .collect();
        assert_eq!(reported, vec![0.0, 1.0, 99.0, 100.0]);
    }

    #[test]
    fn unknown_length_reports_nothing() {
        let mut last = WholePercent::default();
        assert_eq!(last.advance(progress(512, None)), None);
        assert_eq!(last.advance(progress(512, Some(0))), None);
    }
}
