use car_scene::config::{Colour, SceneConfig};

#[test]
fn shipped_scene_file_matches_the_defaults() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/scene.toml");
    let text = std::fs::read_to_string(path).unwrap();
    let config = SceneConfig::from_toml(&text).unwrap();
    assert_eq!(config, SceneConfig::default());
}

#[test]
fn hex_colours_parse_as_integers() {
    let config = SceneConfig::from_toml("background = 0xff8000\n[fog]\ncolour = 0x000000\n").unwrap();
    assert_eq!(config.background, Colour(0xff8000));
    assert_eq!(config.fog.colour, Colour(0));
}

#[test]
fn environment_can_be_switched_on() {
    let config = SceneConfig::from_toml(
        "[environment]\nas_background = true\nas_lighting = true\nintensity = 0.5\n",
    )
    .unwrap();
    assert!(config.environment.as_background);
    assert!(config.environment.as_lighting);
    assert_eq!(config.environment.intensity, 0.5);
}

#[test]
fn unknown_value_types_are_reported() {
    assert!(SceneConfig::from_toml("[camera]\nfov = \"wide\"\n").is_err());
}

#[tokio::test]
async fn missing_scene_file_falls_back_to_defaults() {
    let config = SceneConfig::load("no/such/scene.toml").await.unwrap();
    assert_eq!(config, SceneConfig::default());
}
