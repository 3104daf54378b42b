//! [`Texture`] bundles a GPU texture with its view and sampler. Constructors cover
//! the depth and multisample attachments, neutral 1x1 fallback maps, colour and
//! data maps decoded by `image`, and RGBE-encoded HDR panoramas.

use anyhow::*;
use image::{GenericImageView, ImageFormat, load_from_memory_with_format};

/// Attachments carry no sampler; sampled maps always do.
#[derive(Clone, Debug)]
pub struct Texture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: Option<wgpu::Sampler>,
}

impl Texture {
    /// Used by the scene depth buffer and the shadow maps.
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Depth attachment of the scene pass.
    ///
    /// # Arguments
    ///
    /// * `size` is [width, height] of the texture in pixels
    /// * `sample_count` must match the colour attachment it is used with
    pub fn create_depth_texture(
        device: &wgpu::Device,
        size: [u32; 2],
        sample_count: u32,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[Self::DEPTH_FORMAT],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            sampler: None,
        }
    }

    /// Multisampled colour target that is resolved into the surface every frame.
    pub fn create_msaa_target(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        sample_count: u32,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("msaa colour target"),
            size: wgpu::Extent3d {
                width: config.width.max(1),
                height: config.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: config.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            sampler: None,
        }
    }

    /// A single-colour texture, used where an asset is missing.
    pub fn solid(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        rgba: [u8; 4],
        linear: bool,
        label: &str,
    ) -> Texture {
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba(rgba));
        let format = if linear {
            wgpu::TextureFormat::Rgba8Unorm
        } else {
            wgpu::TextureFormat::Rgba8UnormSrgb
        };
        let sampler = create_default_sampler(device);
        Self::upload_rgba8(device, queue, &img, format, Some(label), sampler)
    }

    /// The blue/purple-ish colour that represents "no deformation" in a normal map.
    pub fn create_default_normal_map(device: &wgpu::Device, queue: &wgpu::Queue) -> Texture {
        Self::solid(device, queue, [127, 127, 255, 255], true, "default normal map")
    }

    /// Decodes an image file held in memory.
    ///
    /// # Arguments
    ///
    /// * `bytes` represent raw image file data (PNG, JPEG, EXR, etc.)
    /// * `format` is an optional file extension hint (e.g., "png"). If None, auto-detect.
    /// * `linear` uploads data maps (normals, roughness, heights) without sRGB decoding
    pub fn from_bytes(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bytes: &[u8],
        label: &str,
        format: Option<&str>,
        linear: bool,
    ) -> Result<Self> {
        let img = match format.and_then(ImageFormat::from_extension) {
            None => image::load_from_memory(bytes)?,
            Some(fmt) => load_from_memory_with_format(bytes, fmt)?,
        };
        Self::from_image(device, queue, &img, Some(label), linear)
    }

    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &image::DynamicImage,
        label: Option<&str>,
        linear: bool,
    ) -> Result<Self> {
        let format = if linear {
            wgpu::TextureFormat::Rgba8Unorm
        } else {
            wgpu::TextureFormat::Rgba8UnormSrgb
        };
        Ok(Self::upload_rgba8(
            device,
            queue,
            &img.to_rgba8(),
            format,
            label,
            create_default_sampler(device),
        ))
    }

    /// Decode a Radiance `.hdr` panorama and upload it RGBE-encoded.
    ///
    /// Eight bits per channel keeps the map filterable on WebGL2; shaders decode
    /// with `rgb * 2^(a * 255 - 128)`. Sampling is nearest because interpolating
    /// shared exponents produces seams.
    pub fn from_hdr_bytes(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bytes: &[u8],
        label: &str,
    ) -> Result<Self> {
        let img = load_from_memory_with_format(bytes, ImageFormat::Hdr)?;
        let (width, height) = img.dimensions();
        let hdr = img.to_rgb32f();
        let mut rgbe = image::RgbaImage::new(width, height);
        for (dst, src) in rgbe.pixels_mut().zip(hdr.pixels()) {
            *dst = image::Rgba(encode_rgbe(src.0));
        }
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("equirect sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Ok(Self::upload_rgba8(
            device,
            queue,
            &rgbe,
            wgpu::TextureFormat::Rgba8Unorm,
            Some(label),
            sampler,
        ))
    }

    fn upload_rgba8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        rgba: &image::RgbaImage,
        format: wgpu::TextureFormat,
        label: Option<&str>,
        sampler: wgpu::Sampler,
    ) -> Self {
        let dimensions = rgba.dimensions();
        let size = wgpu::Extent3d {
            width: dimensions.0,
            height: dimensions.1,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * dimensions.0),
                rows_per_image: Some(dimensions.1),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            sampler: Some(sampler),
        }
    }
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

/// Shared-exponent encoding of a linear HDR colour.
///
/// The mantissas are scaled so the brightest channel lands in `[0.5, 1)` of
/// the exponent's range; `a` stores the exponent biased by 128.
pub fn encode_rgbe(rgb: [f32; 3]) -> [u8; 4] {
    let max = rgb[0].max(rgb[1]).max(rgb[2]);
    if !(max > 1e-32) {
        return [0, 0, 0, 0];
    }
    let exponent = (max.log2().floor() as i32 + 1).clamp(-128, 127);
    let scale = 255.0 / 2f32.powi(exponent);
    let channel = |c: f32| (c.max(0.0) * scale).round().min(255.0) as u8;
    [
        channel(rgb[0]),
        channel(rgb[1]),
        channel(rgb[2]),
        (exponent + 128) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_rgbe(rgbe: [u8; 4]) -> [f32; 3] {
        if rgbe[3] == 0 {
            return [0.0; 3];
        }
        let scale = 2f32.powi(rgbe[3] as i32 - 128) / 255.0;
        [
            rgbe[0] as f32 * scale,
            rgbe[1] as f32 * scale,
            rgbe[2] as f32 * scale,
        ]
    }

    #[test]
    fn rgbe_keeps_bright_and_dim_values() {
        for rgb in [[1.0, 0.5, 0.25], [37.5, 12.0, 3.0], [0.01, 0.02, 0.005]] {
            let decoded = decode_rgbe(encode_rgbe(rgb));
            let max = rgb[0].max(rgb[1]).max(rgb[2]);
            for (a, b) in rgb.iter().zip(decoded) {
                // Error is bounded by half a mantissa step of the brightest channel
                assert!((a - b).abs() <= max / 100.0, "{rgb:?} became {decoded:?}");
            }
            let decoded_max = decoded[0].max(decoded[1]).max(decoded[2]);
            assert!((decoded_max - max).abs() / max < 0.01);
        }
    }

    #[test]
    fn rgbe_black_and_negative_are_zero() {
        assert_eq!(encode_rgbe([0.0, 0.0, 0.0]), [0, 0, 0, 0]);
        assert_eq!(encode_rgbe([-1.0, -2.0, 0.0]), [0, 0, 0, 0]);
    }

    #[test]
    fn rgbe_exponent_is_biased() {
        // 1.0 needs exponent 1 so the mantissa lands at 0.5
        assert_eq!(encode_rgbe([1.0, 1.0, 1.0]), [128, 128, 128, 129]);
    }
}
