//! Format-specific encoding of processed pixels.
//!
//! The encoder is chosen once per file from the output extension:
//! - JPEG: opaque RGB at the configured quality
//! - PNG: best zlib compression with adaptive filtering, quality unused
//! - WebP: the configured quality at method 6, through `cwebp` when installed,
//!   otherwise through libwebp in process
//! - anything else: the `image` crate's defaults for that format

use crate::config::{OptimizationConfig, TargetFormat};
use crate::error::OptimizeError;
use crate::post_process::{run_tool, PostProcessOutcome};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::error::{EncodingError, ImageFormatHint};
use image::{ColorType, DynamicImage, ImageEncoder, ImageError, ImageFormat};
use std::borrow::Cow;
use std::ffi::OsString;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// WebP compression method, 6 = slowest and smallest
const WEBP_METHOD: u8 = 6;

/// Encoder variant for one output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoder {
    Jpeg { quality: u8 },
    Png,
    WebP { quality: u8, cwebp: Option<PathBuf> },
    Passthrough(ImageFormat),
}

impl Encoder {
    /// Pick the encoder for `output_path`, judged by its extension
    pub fn for_output(
        output_path: &Path,
        config: &OptimizationConfig,
        cwebp: Option<&Path>,
    ) -> Result<Self, OptimizeError> {
        let quality = config.quality.clamp(1, 100);

        let encoder = match TargetFormat::of_path(output_path) {
            Some(TargetFormat::Jpeg) => Encoder::Jpeg { quality },
            Some(TargetFormat::Png) => Encoder::Png,
            Some(TargetFormat::WebP) => Encoder::WebP {
                quality,
                cwebp: cwebp.map(Path::to_path_buf),
            },
            None => {
                let format = ImageFormat::from_path(output_path).map_err(|_| {
                    OptimizeError::UnsupportedFormat(output_path.display().to_string())
                })?;
                Encoder::Passthrough(format)
            }
        };
        Ok(encoder)
    }

    /// Encode `image` to bytes; `output_path` only labels errors
    pub fn encode(&self, image: &DynamicImage, output_path: &Path) -> Result<Vec<u8>, OptimizeError> {
        let encode_error = |source: ImageError| OptimizeError::Encode {
            path: output_path.to_path_buf(),
            source,
        };

        match self {
            Encoder::Jpeg { quality } => encode_jpeg(image, *quality).map_err(encode_error),
            Encoder::Png => encode_png(image, CompressionType::Best).map_err(encode_error),
            Encoder::WebP { quality, cwebp } => {
                if let Some(tool) = cwebp {
                    match encode_with_cwebp(tool, image, *quality) {
                        Ok(bytes) => return Ok(bytes),
                        Err(reason) => warn!(
                            "cwebp failed for {}, using libwebp: {}",
                            output_path.display(),
                            reason
                        ),
                    }
                }
                encode_webp(image, *quality).map_err(encode_error)
            }
            Encoder::Passthrough(format) => {
                let mut buf = Vec::new();
                image
                    .write_to(&mut Cursor::new(&mut buf), *format)
                    .map_err(encode_error)?;
                Ok(buf)
            }
        }
    }
}

/// Huffman table optimization is left to jpegoptim during post-processing
fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ColorType::Rgb8.into(),
    )?;
    Ok(buf)
}

fn encode_png(image: &DynamicImage, compression: CompressionType) -> Result<Vec<u8>, ImageError> {
    let image: Cow<DynamicImage> = match image.color() {
        ColorType::L8
        | ColorType::La8
        | ColorType::Rgb8
        | ColorType::Rgba8
        | ColorType::L16
        | ColorType::La16
        | ColorType::Rgb16
        | ColorType::Rgba16 => Cow::Borrowed(image),
        _ => Cow::Owned(to_8bit(image)),
    };

    let mut buf = Vec::new();
    PngEncoder::new_with_quality(&mut buf, compression, FilterType::Adaptive).write_image(
        image.as_bytes(),
        image.width(),
        image.height(),
        image.color().into(),
    )?;
    Ok(buf)
}

/// Lossy WebP through libwebp
fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let image = to_8bit(image);
    let encoder = webp::Encoder::from_image(&image).map_err(webp_error)?;

    let mut config = webp::WebPConfig::new().map_err(|_| webp_error("cannot initialise libwebp settings"))?;
    config.lossless = 0;
    config.quality = f32::from(quality);
    config.method = i32::from(WEBP_METHOD);

    let memory = encoder
        .encode_advanced(&config)
        .map_err(|e| webp_error(format!("libwebp: {:?}", e)))?;
    Ok(memory.to_vec())
}

fn webp_error(reason: impl Into<String>) -> ImageError {
    ImageError::Encoding(EncodingError::new(
        ImageFormatHint::Exact(ImageFormat::WebP),
        reason.into(),
    ))
}

/// Hand the pixels to cwebp through a temporary PNG
fn encode_with_cwebp(tool: &Path, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, String> {
    let png = encode_png(image, CompressionType::Fast).map_err(|e| e.to_string())?;

    let input = tempfile::Builder::new()
        .prefix(".cwebp-in-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| format!("cannot create temporary file: {}", e))?
        .into_temp_path();
    std::fs::write(&input, &png).map_err(|e| format!("cannot write {}: {}", input.display(), e))?;

    let output = tempfile::Builder::new()
        .prefix(".cwebp-out-")
        .suffix(".webp")
        .tempfile()
        .map_err(|e| format!("cannot create temporary file: {}", e))?
        .into_temp_path();

    let args: Vec<OsString> = vec![
        "-quiet".into(),
        "-q".into(),
        quality.to_string().into(),
        "-m".into(),
        WEBP_METHOD.to_string().into(),
        "-metadata".into(),
        "none".into(),
        input.to_path_buf().into(),
        "-o".into(),
        output.to_path_buf().into(),
    ];

    match run_tool("cwebp", tool, &args) {
        PostProcessOutcome::Applied { .. } => {
            let bytes = std::fs::read(&output).map_err(|e| e.to_string())?;
            debug!("cwebp produced {} bytes", bytes.len());
            Ok(bytes)
        }
        other => Err(other.describe()),
    }
}

/// 8-bit RGB or RGBA, keeping alpha only when the image has it
fn to_8bit(image: &DynamicImage) -> DynamicImage {
    match image.color() {
        ColorType::Rgb8 | ColorType::Rgba8 => image.clone(),
        _ if image.color().has_alpha() => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};

    fn config(quality: u8) -> OptimizationConfig {
        OptimizationConfig {
            quality,
            ..Default::default()
        }
    }

    fn translucent() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([200, 10, 10, 128])))
    }

    #[test]
    fn test_selection_by_extension() {
        let cfg = config(80);
        assert_eq!(
            Encoder::for_output(Path::new("a.JPEG"), &cfg, None).unwrap(),
            Encoder::Jpeg { quality: 80 }
        );
        assert_eq!(Encoder::for_output(Path::new("a.png"), &cfg, None).unwrap(), Encoder::Png);
        assert_eq!(
            Encoder::for_output(Path::new("a.webp"), &cfg, Some(Path::new("/bin/cwebp"))).unwrap(),
            Encoder::WebP {
                quality: 80,
                cwebp: Some(PathBuf::from("/bin/cwebp"))
            }
        );
        assert_eq!(
            Encoder::for_output(Path::new("a.gif"), &cfg, None).unwrap(),
            Encoder::Passthrough(ImageFormat::Gif)
        );
        assert!(matches!(
            Encoder::for_output(Path::new("a.unknown"), &cfg, None),
            Err(OptimizeError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(
            Encoder::for_output(Path::new("a.jpg"), &config(0), None).unwrap(),
            Encoder::Jpeg { quality: 1 }
        );
    }

    #[test]
    fn test_jpeg_drops_alpha() {
        let bytes = Encoder::Jpeg { quality: 80 }
            .encode(&translucent(), Path::new("a.jpg"))
            .unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn test_png_keeps_alpha() {
        let bytes = Encoder::Png.encode(&translucent(), Path::new("a.png")).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!(decoded.get_pixel(0, 0), Rgba([200, 10, 10, 128]));
    }

    #[test]
    fn test_webp_without_cwebp_keeps_alpha() {
        let encoder = Encoder::WebP {
            quality: 50,
            cwebp: None,
        };
        let bytes = encoder.encode(&translucent(), Path::new("a.webp")).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::WebP).unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert!(decoded.color().has_alpha());
    }

    #[test]
    fn test_webp_without_cwebp_honours_quality() {
        let detailed = DynamicImage::ImageRgb8(RgbImage::from_fn(256, 256, |x, y| {
            let v = x.wrapping_mul(31) ^ y.wrapping_mul(17) ^ (x * y);
            Rgb([v as u8, (v >> 3) as u8, (x + y) as u8])
        }));
        let encode = |quality| {
            Encoder::WebP { quality, cwebp: None }
                .encode(&detailed, Path::new("a.webp"))
                .unwrap()
        };

        let low = encode(10);
        let high = encode(95);
        assert_ne!(low, high);
        assert!(low.len() < high.len(), "q10={} q95={}", low.len(), high.len());
        assert!(image::load_from_memory_with_format(&low, ImageFormat::WebP).is_ok());
    }

    #[test]
    fn test_webp_falls_back_when_cwebp_is_broken() {
        let encoder = Encoder::WebP {
            quality: 50,
            cwebp: Some(PathBuf::from("/nonexistent/cwebp")),
        };
        let bytes = encoder.encode(&translucent(), Path::new("a.webp")).unwrap();
        assert!(image::load_from_memory_with_format(&bytes, ImageFormat::WebP).is_ok());
    }
}
