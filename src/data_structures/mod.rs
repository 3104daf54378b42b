//! Scene data structures: models, textures, scene graphs, and instances.
//!
//! - `model` contains mesh and material definitions, GPU resources for 3D models
//! - `texture` contains the GPU texture wrapper and creation utilities
//! - `instance` holds per-node transformation data
//! - `plane` generates the ground plane geometry
//! - `scene_graph` enables hierarchical scene organization

pub mod instance;
pub mod model;
pub mod plane;
pub mod scene_graph;
pub mod texture;
