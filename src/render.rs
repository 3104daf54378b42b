//! Render composition and pass batching.
//!
//! Flows describe what they draw with a [`Render`]. The frame loop flattens all
//! renders into one list for the lit pass and a second list, holding only the
//! shadow casters, that every shadow map pass draws.
//!
//! # Key types
//!
//! - [`Render<'a>`] is the enum a flow returns from `on_render`
//! - [`Instanced<'a>`] is a model together with its instance buffer
//!

use crate::data_structures::{model::Model, scene_graph::SceneNode};

/// Data for instanced object rendering: a model, its instance buffer and shadow flag.
///
/// The instance buffer holds [`crate::data_structures::instance::InstanceRaw`]
/// entries, which also carry the receive-shadow flag.
#[derive(Clone, Copy)]
pub struct Instanced<'a> {
    pub instance: &'a wgpu::Buffer,
    pub model: &'a Model,
    pub amount: usize,
    pub casts_shadow: bool,
}

/// Specifies how a scene object should be rendered.
///
/// # Variants
///
/// - `None` renders nothing
/// - `Default(Instanced)` renders a single instanced object
/// - `Defaults(Vec<Instanced>)` renders a batch of instanced objects
/// - `Composed(Vec<Render>)` recursively renders a composition of renders
///
pub enum Render<'a> {
    None,
    Default(Instanced<'a>),
    Defaults(Vec<Instanced<'a>>),
    Composed(Vec<Render<'a>>),
}

impl<'a> Render<'a> {
    /// Sorts the drawables into the lit pass and, for shadow casters, the shadow passes.
    pub(crate) fn set_pipelines(self, lit: &mut Vec<Instanced<'a>>, shadow: &mut Vec<Instanced<'a>>) {
        match self {
            Render::Default(instanced) => {
                if instanced.casts_shadow {
                    shadow.push(instanced);
                }
                lit.push(instanced);
            }
            Render::Defaults(vec) => {
                shadow.extend(vec.iter().copied().filter(|instanced| instanced.casts_shadow));
                lit.extend(vec);
            }
            Render::Composed(renders) => renders
                .into_iter()
                .for_each(|render| render.set_pipelines(lit, shadow)),
            Render::None => (),
        }
    }
}

impl<'a> From<&'a dyn SceneNode> for Render<'a> {
    fn from(sn: &'a dyn SceneNode) -> Self {
        Render::Defaults(sn.get_render())
    }
}
