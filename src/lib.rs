//! car-scene
//!
//! A cross-platform (native and WASM) showroom that renders a textured glTF
//! car on a rock plane, lit by an ambient and two shadow casting directional
//! lights, with orbit camera controls and distance fog. Every tunable lives in
//! an optional `scene.toml` in the asset root.
//!
//! High-level modules
//! - `camera`: camera, projection, uniforms and orbit controls
//! - `config`: the scene description and its defaults
//! - `context`: central GPU and window context that owns device/queue/pipelines
//! - `data_structures`: meshes, materials, instances, textures and the scene graph
//! - `flow`: flow control and the event loop
//! - `pipelines`: the lit, shadow and background render pipelines and the lights
//! - `resources`: asset loading (textures, HDR panoramas, glTF)
//! - `render`: render composition and pass batching
//! - `showroom`: the scene itself
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod showroom;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

use crate::{
    flow::{FlowConstructor, GraphicsFlow},
    showroom::{SceneEvent, Showroom},
};

/// Scene settings are read from this file in the asset root.
pub const SCENE_CONFIG_FILE: &str = "scene.toml";

/// Opens the showroom and blocks until its window is closed.
pub fn run_showroom() -> anyhow::Result<()> {
    let showroom: FlowConstructor<(), SceneEvent> = Box::new(|ctx| {
        Box::pin(async move {
            Box::new(Showroom::new(ctx).await) as Box<dyn GraphicsFlow<(), SceneEvent>>
        })
    });
    flow::run(SCENE_CONFIG_FILE, vec![showroom])
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), JsValue> {
    run_showroom().map_err(|e| JsValue::from_str(&format!("{e:#}")))
}
