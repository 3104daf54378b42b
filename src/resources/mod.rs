use anyhow::Context as _;

use crate::data_structures::texture::Texture;

/**
 * This module contains all logic for loading models, textures and other files from the
 * asset root.
 *
 * Natively the asset root is `$CAR_SCENE_ASSETS`, then `./assets`, then the copy the build
 * script placed in `OUT_DIR`. In the browser files are fetched relative to the page.
 */
pub mod gltf_scene;
pub mod mesh;
pub mod texture;

/// Environment variable that overrides the native asset root.
pub const ASSET_ROOT_ENV: &str = "CAR_SCENE_ASSETS";

#[cfg(not(target_arch = "wasm32"))]
const CHUNK_SIZE: usize = 64 * 1024;

/// How far a streaming load has come. `total` is unknown when the server sends no length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl LoadProgress {
    pub fn percent(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some(self.loaded as f32 / total as f32 * 100.0),
            _ => None,
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().context("no browser window")?;
    let href = window
        .location()
        .href()
        .map_err(|e| anyhow::anyhow!("unable to read page location: {e:?}"))?;
    let base = reqwest::Url::parse(&href)?.join("assets/")?;
    Ok(base.join(file_name)?)
}

#[cfg(not(target_arch = "wasm32"))]
fn asset_roots() -> Vec<std::path::PathBuf> {
    std::env::var_os(ASSET_ROOT_ENV)
        .map(std::path::PathBuf::from)
        .into_iter()
        .chain([
            std::path::PathBuf::from("./assets"),
            std::path::PathBuf::from(concat!(env!("OUT_DIR"), "/assets")),
        ])
        .collect()
}

/// The first asset root that contains `file_name`, or the preferred root if none does.
#[cfg(not(target_arch = "wasm32"))]
pub fn asset_path(file_name: &str) -> std::path::PathBuf {
    let roots = asset_roots();
    roots
        .iter()
        .map(|root| root.join(file_name))
        .find(|path| path.exists())
        .unwrap_or_else(|| roots[0].join(file_name))
}

pub async fn load_string(file_name: &str) -> anyhow::Result<String> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(file_name)?;
        reqwest::get(url)
            .await?
            .error_for_status()?
            .text()
            .await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = {
        let path = asset_path(file_name);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read {}", path.display()))?
    };

    Ok(txt)
}

pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    load_binary_with_progress(file_name, |_| ()).await
}

/// Like [`load_binary`] but reports progress after every chunk.
///
/// In the browser the body arrives in one piece, so progress is reported when the
/// response headers are in and again once the download completes.
pub async fn load_binary_with_progress<F>(
    file_name: &str,
    mut on_progress: F,
) -> anyhow::Result<Vec<u8>>
where
    F: FnMut(LoadProgress),
{
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        let response = reqwest::get(url).await?.error_for_status()?;
        let total = response.content_length();
        on_progress(LoadProgress { loaded: 0, total });
        let data = response.bytes().await?.to_vec();
        on_progress(LoadProgress {
            loaded: data.len() as u64,
            total,
        });
        data
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        use tokio::io::AsyncReadExt;

        let path = asset_path(file_name);
        let mut file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("open {}", path.display()))?;
        let total = file.metadata().await.ok().map(|m| m.len());
        let mut data = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let read = file
                .read(&mut chunk)
                .await
                .with_context(|| format!("read {}", path.display()))?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
            on_progress(LoadProgress {
                loaded: data.len() as u64,
                total,
            });
        }
        data
    };

    Ok(data)
}

/// Loads an image file as a texture. Colour maps are sampled as sRGB, data maps
/// (normals, roughness, heights) with `linear` set.
pub async fn load_texture(
    file_name: &str,
    linear: bool,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> anyhow::Result<Texture> {
    let data = load_binary(file_name).await?;
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str());
    Texture::from_bytes(device, queue, &data, file_name, extension, linear)
        .with_context(|| format!("decode texture {file_name}"))
}

/// Loads a Radiance `.hdr` panorama as an RGBE-encoded equirectangular map.
pub async fn load_hdr(
    file_name: &str,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> anyhow::Result<Texture> {
    let data = load_binary(file_name).await?;
    Texture::from_hdr_bytes(device, queue, &data, file_name)
        .with_context(|| format!("decode HDR {file_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_needs_a_known_total() {
        let half = LoadProgress {
            loaded: 512,
            total: Some(1024),
        };
        assert_eq!(half.percent(), Some(50.0));
        assert_eq!(LoadProgress::default().percent(), None);
        let empty = LoadProgress {
            loaded: 0,
            total: Some(0),
        };
        assert_eq!(empty.percent(), None);
    }

    #[tokio::test]
    async fn missing_asset_names_the_path() {
        let err = load_binary("definitely/not/here.glb").await.unwrap_err();
        assert!(format!("{err:#}").contains("not/here.glb"));
    }

    #[tokio::test]
    async fn streaming_reports_every_chunk() {
        let dir = std::env::temp_dir().join("car-scene-progress-test");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("blob.bin");
        std::fs::write(&file, vec![7u8; CHUNK_SIZE * 2 + 10]).unwrap();

        let mut reports = Vec::new();
        // Absolute paths replace the asset root when joined
        let data = load_binary_with_progress(file.to_str().unwrap(), |p| reports.push(p))
            .await
            .unwrap();
        assert_eq!(data.len(), CHUNK_SIZE * 2 + 10);
        let last = reports.last().unwrap();
        assert_eq!(last.loaded, data.len() as u64);
        assert_eq!(last.percent(), Some(100.0));
        assert!(reports.windows(2).all(|w| w[0].loaded < w[1].loaded));
    }
}
