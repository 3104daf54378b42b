//! Scene configuration.
//!
//! Every tunable of the showroom lives in [`SceneConfig`]. The defaults
//! reproduce the reference scene; a `scene.toml` in the asset root may
//! override any subset of fields.

use anyhow::{Context as _, bail};
use serde::Deserialize;

use crate::resources;

/// The lit pipeline packs at most this many directional lights into its uniform.
pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;

/// A `0xRRGGBB` colour in sRGB space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Colour(pub u32);

impl Colour {
    pub const WHITE: Colour = Colour(0xffffff);

    pub fn to_srgb(self) -> [f32; 3] {
        let r = ((self.0 >> 16) & 0xff) as f32 / 255.0;
        let g = ((self.0 >> 8) & 0xff) as f32 / 255.0;
        let b = (self.0 & 0xff) as f32 / 255.0;
        [r, g, b]
    }

    pub fn to_linear(self) -> [f32; 3] {
        self.to_srgb().map(srgb_to_linear)
    }

    pub fn to_wgpu(self) -> wgpu::Color {
        let [r, g, b] = self.to_linear();
        wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: 1.0,
        }
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub background: Colour,
    pub fog: FogConfig,
    pub camera: CameraConfig,
    pub renderer: RendererConfig,
    pub controls: OrbitConfig,
    pub assets: AssetConfig,
    pub environment: EnvironmentConfig,
    pub model: ModelConfig,
    pub plane: PlaneConfig,
    pub lights: LightingConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            background: Colour(0x111111),
            fog: FogConfig::default(),
            camera: CameraConfig::default(),
            renderer: RendererConfig::default(),
            controls: OrbitConfig::default(),
            assets: AssetConfig::default(),
            environment: EnvironmentConfig::default(),
            model: ModelConfig::default(),
            plane: PlaneConfig::default(),
            lights: LightingConfig::default(),
        }
    }
}

impl SceneConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: SceneConfig = toml::from_str(text).context("parse scene TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `file_name` from the asset root. A missing file yields the defaults.
    pub async fn load(file_name: &str) -> anyhow::Result<Self> {
        match resources::load_string(file_name).await {
            Ok(text) => Self::from_toml(&text).with_context(|| format!("read {file_name}")),
            Err(e) => {
                log::info!("No scene config at {file_name} ({e}), using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fog.enabled && self.fog.near >= self.fog.far {
            bail!(
                "fog near ({}) must be smaller than fog far ({})",
                self.fog.near,
                self.fog.far
            );
        }
        // Negated comparisons so NaN fails too
        if !(self.camera.near > 0.0 && self.camera.near < self.camera.far) {
            bail!(
                "camera clip planes must satisfy 0 < near < far, got {}..{}",
                self.camera.near,
                self.camera.far
            );
        }
        let controls = &self.controls;
        if !(controls.min_distance >= 0.0 && controls.min_distance <= controls.max_distance) {
            bail!(
                "orbit distances must satisfy 0 <= min <= max, got {}..{}",
                controls.min_distance,
                controls.max_distance
            );
        }
        if !(controls.min_polar_angle >= 0.0
            && controls.min_polar_angle <= controls.max_polar_angle
            && controls.max_polar_angle <= std::f32::consts::PI)
        {
            bail!(
                "orbit polar angles must satisfy 0 <= min <= max <= PI, got {}..{}",
                controls.min_polar_angle,
                controls.max_polar_angle
            );
        }
        if !(controls.damping_factor > 0.0 && controls.damping_factor <= 1.0) {
            bail!(
                "orbit damping factor must lie in (0, 1], got {}",
                controls.damping_factor
            );
        }
        if self.lights.directional.len() > MAX_DIRECTIONAL_LIGHTS {
            bail!(
                "{} directional lights configured, at most {} are supported",
                self.lights.directional.len(),
                MAX_DIRECTIONAL_LIGHTS
            );
        }
        if self.plane.width_segments == 0 || self.plane.height_segments == 0 {
            bail!("plane needs at least one segment per side");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FogConfig {
    pub enabled: bool,
    pub colour: Colour,
    pub near: f32,
    pub far: f32,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            colour: Colour(0x111111),
            near: 4.0,
            far: 12.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub look_at: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 75.0,
            near: 0.1,
            far: 1000.0,
            position: [0.0, 0.0, 3.0],
            look_at: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub antialias: bool,
    /// Let the page show through where nothing is drawn (web only in practice).
    pub transparent: bool,
    pub shadows: bool,
    pub shadow_map_size: u32,
    pub exposure: f32,
}

impl RendererConfig {
    pub fn sample_count(&self) -> u32 {
        if self.antialias { 4 } else { 1 }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            antialias: true,
            transparent: true,
            shadows: true,
            shadow_map_size: 1024,
            exposure: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct OrbitConfig {
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Radians, measured from the +Y axis.
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub target: [f32; 3],
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            enable_damping: true,
            damping_factor: 0.05,
            min_distance: 2.0,
            max_distance: 10.0,
            min_polar_angle: 0.0,
            max_polar_angle: std::f32::consts::FRAC_PI_2 - 0.1,
            target: [0.0, 0.0, -0.2],
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
        }
    }
}

/// Asset paths relative to the asset root.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub base_colour_map: String,
    pub normal_map: String,
    pub height_map: String,
    pub roughness_map: String,
    pub environment: String,
    pub model: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            base_colour_map: "textures/rock_diff.jpg".to_string(),
            normal_map: "textures/rock_nor_gl.exr".to_string(),
            height_map: "textures/rock_disp.png".to_string(),
            roughness_map: "textures/rock_rough.exr".to_string(),
            environment: "shanghai_bund_1k.hdr".to_string(),
            model: "3d_model/car.glb".to_string(),
        }
    }
}

/// Where the equirectangular environment map is used once it has loaded.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub as_background: bool,
    pub as_lighting: bool,
    pub intensity: f32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            as_background: false,
            as_lighting: false,
            intensity: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
    pub colour: Colour,
    pub metalness: f32,
    pub roughness: f32,
    pub clearcoat: f32,
    pub displacement_scale: f32,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            colour: Colour::WHITE,
            metalness: 0.0,
            roughness: 1.0,
            clearcoat: 0.0,
            displacement_scale: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub offset_y: f32,
    pub scale: f32,
    /// Rotation of the model group about +Y, in radians per rendered frame.
    pub spin_per_frame: f32,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub material: MaterialConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            offset_y: -0.4,
            scale: 1.0,
            spin_per_frame: 0.01,
            cast_shadow: true,
            receive_shadow: true,
            material: MaterialConfig {
                metalness: 0.9,
                roughness: 0.5,
                ..Default::default()
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaneConfig {
    pub width: f32,
    pub height: f32,
    pub width_segments: u32,
    pub height_segments: u32,
    pub position_y: f32,
    /// Rotation about +X in radians.
    pub rotation_x: f32,
    pub receive_shadow: bool,
    pub material: MaterialConfig,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            width: 30.0,
            height: 30.0,
            width_segments: 1,
            height_segments: 1,
            position_y: -0.5,
            rotation_x: -0.5 * std::f32::consts::PI,
            receive_shadow: true,
            material: MaterialConfig {
                metalness: 0.5,
                roughness: 0.5,
                clearcoat: 0.1,
                displacement_scale: 0.001,
                ..Default::default()
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AmbientConfig {
    pub colour: Colour,
    pub intensity: f32,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            colour: Colour(0x004fff),
            intensity: 8.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DirectionalConfig {
    pub colour: Colour,
    pub intensity: f32,
    /// The light shines from here towards the origin.
    pub position: [f32; 3],
    pub cast_shadow: bool,
}

impl Default for DirectionalConfig {
    fn default() -> Self {
        Self {
            colour: Colour::WHITE,
            intensity: 1.0,
            position: [0.0, 1.0, 0.0],
            cast_shadow: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient: AmbientConfig,
    pub directional: Vec<DirectionalConfig>,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: AmbientConfig::default(),
            directional: vec![
                DirectionalConfig {
                    intensity: 10.0,
                    position: [-1.0, 3.0, 0.5],
                    cast_shadow: true,
                    ..Default::default()
                },
                DirectionalConfig {
                    intensity: 5.0,
                    position: [0.5, 2.5, 1.0],
                    cast_shadow: true,
                    ..Default::default()
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_showroom() {
        let config = SceneConfig::default();
        assert_eq!(config.background, Colour(0x111111));
        assert_eq!(config.camera.fov, 75.0);
        assert_eq!(config.camera.position, [0.0, 0.0, 3.0]);
        assert_eq!(config.controls.target, [0.0, 0.0, -0.2]);
        assert_eq!(config.controls.min_distance, 2.0);
        assert_eq!(config.controls.max_distance, 10.0);
        assert_eq!(config.model.material.metalness, 0.9);
        assert_eq!(config.plane.material.clearcoat, 0.1);
        assert_eq!(config.lights.directional.len(), 2);
        assert!(config.lights.directional.iter().all(|l| l.cast_shadow));
        assert!(!config.environment.as_background);
        assert!(!config.environment.as_lighting);
        config.validate().unwrap();
    }

    #[test]
    fn colour_conversion() {
        assert_eq!(Colour(0xff0000).to_srgb(), [1.0, 0.0, 0.0]);
        let [r, g, b] = Colour(0x808080).to_linear();
        assert!((r - 0.2158).abs() < 1e-3);
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(Colour(0).to_wgpu(), wgpu::Color::BLACK);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = SceneConfig::from_toml(
            r#"
            background = 0x202020

            [model]
            spin_per_frame = 0.0
            "#,
        )
        .unwrap();
        assert_eq!(config.background, Colour(0x202020));
        assert_eq!(config.model.spin_per_frame, 0.0);
        assert_eq!(config.model.offset_y, -0.4);
        assert_eq!(config.fog, FogConfig::default());
    }

    #[test]
    fn rejects_inverted_fog() {
        let err = SceneConfig::from_toml("[fog]\nnear = 12.0\nfar = 4.0\n").unwrap_err();
        assert!(format!("{err:#}").contains("fog near"));
    }

    #[test]
    fn rejects_bad_clip_planes() {
        for toml in [
            "[camera]\nnear = 0.0\n",
            "[camera]\nnear = 5.0\nfar = 5.0\n",
            "[camera]\nnear = nan\n",
        ] {
            let err = SceneConfig::from_toml(toml).unwrap_err();
            assert!(format!("{err:#}").contains("clip planes"), "{toml}");
        }
    }

    #[test]
    fn rejects_inverted_or_nan_distances() {
        let err = SceneConfig::from_toml("[controls]\nmin_distance = 11.0\n").unwrap_err();
        assert!(format!("{err:#}").contains("orbit distances"));

        let mut config = SceneConfig::default();
        config.controls.max_distance = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_polar_angles() {
        let err = SceneConfig::from_toml("[controls]\nmin_polar_angle = 1.0\nmax_polar_angle = 0.5\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("polar angles"));

        let mut config = SceneConfig::default();
        config.controls.max_polar_angle = 4.0;
        assert!(config.validate().is_err());
        config.controls.max_polar_angle = f32::NAN;
        assert!(config.validate().is_err());
        config.controls.max_polar_angle = std::f32::consts::PI;
        config.validate().unwrap();
    }

    #[test]
    fn damping_factor_range() {
        let mut config = SceneConfig::default();
        config.controls.damping_factor = 0.0;
        assert!(config.validate().is_err());
        config.controls.damping_factor = 1.5;
        assert!(config.validate().is_err());
        config.controls.damping_factor = 1.0;
        config.validate().unwrap();
    }

    #[test]
    fn rejects_unsegmented_plane() {
        let err = SceneConfig::from_toml("[plane]\nwidth_segments = 0\n").unwrap_err();
        assert!(format!("{err:#}").contains("segment"));
    }

    #[test]
    fn rejects_too_many_lights() {
        let mut config = SceneConfig::default();
        config.lights.directional = vec![DirectionalConfig::default(); MAX_DIRECTIONAL_LIGHTS + 1];
        assert!(config.validate().is_err());
    }
}
