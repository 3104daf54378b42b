use anyhow::Result;
use fs_extra::{copy_items, dir::CopyOptions};
use std::{env, path::PathBuf};

// Native builds fall back to `$OUT_DIR/assets` when neither `$CAR_SCENE_ASSETS`
// nor `./assets` holds a file, so a binary run from elsewhere still finds the scene.
fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=assets");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let assets = manifest_dir.join("assets");
    if !assets.exists() {
        return Ok(());
    }

    let mut options = CopyOptions::new();
    options.overwrite = true;
    copy_items(&[assets], env::var("OUT_DIR")?, &options)?;
    Ok(())
}
