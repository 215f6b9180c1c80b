//! Derivative (thumbnail) rendering

use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use userfiles_core::ThumbnailSpec;

const DEFAULT_FORMAT: &str = "jpg";

/// Encoded derivative ready to be stored
#[derive(Debug, Clone)]
pub struct RenderedDerivative {
    pub data: Bytes,
    pub ext: String,
    pub mime: String,
    pub width: u32,
    pub height: u32,
}

/// Renders one derivative of an image
#[async_trait]
pub trait DerivativeRenderer: Send + Sync {
    async fn render(
        &self,
        source: Bytes,
        spec: &ThumbnailSpec,
        source_ext: &str,
    ) -> Result<RenderedDerivative, anyhow::Error>;
}

/// `image`-crate backed renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageThumbnailer;

impl ImageThumbnailer {
    pub fn new() -> Self {
        Self
    }

    /// Output extension: explicit `f`, else the source extension when it is
    /// a supported output, else jpg.
    pub fn output_ext(spec: &ThumbnailSpec, source_ext: &str) -> String {
        let requested = spec.f.as_deref().unwrap_or(source_ext).to_lowercase();
        match requested.as_str() {
            "jpg" | "jpeg" => "jpg".to_string(),
            "png" | "webp" => requested,
            _ => DEFAULT_FORMAT.to_string(),
        }
    }

    pub fn render_sync(
        data: &[u8],
        spec: &ThumbnailSpec,
        source_ext: &str,
    ) -> Result<RenderedDerivative, anyhow::Error> {
        let ext = Self::output_ext(spec, source_ext);
        let img = image::load_from_memory(data)?;

        let resized = if spec.zc {
            fill(img, spec.w, spec.h)
        } else if img.width() <= spec.w && img.height() <= spec.h {
            img
        } else {
            img.resize(spec.w, spec.h, FilterType::Lanczos3)
        };

        let background = spec.bg.as_deref().and_then(parse_hex_color);
        let (width, height) = resized.dimensions();
        let mut buffer = Vec::with_capacity(rgb_buffer_len(width, height));

        let mime = match ext.as_str() {
            "png" | "webp" => {
                let output = match background {
                    Some(bg) => DynamicImage::ImageRgb8(flatten(&resized, bg)),
                    None => DynamicImage::ImageRgba8(resized.to_rgba8()),
                };
                let (format, mime) = if ext == "png" {
                    (ImageFormat::Png, "image/png")
                } else {
                    (ImageFormat::WebP, "image/webp")
                };
                output.write_to(&mut Cursor::new(&mut buffer), format)?;
                mime
            }
            _ => {
                let rgb = flatten(&resized, background.unwrap_or([255, 255, 255]));
                let encoder = JpegEncoder::new_with_quality(&mut buffer, spec.q.clamp(1, 100));
                rgb.write_with_encoder(encoder)?;
                "image/jpeg"
            }
        };

        Ok(RenderedDerivative {
            data: Bytes::from(buffer),
            ext,
            mime: mime.to_string(),
            width,
            height,
        })
    }
}

#[async_trait]
impl DerivativeRenderer for ImageThumbnailer {
    async fn render(
        &self,
        source: Bytes,
        spec: &ThumbnailSpec,
        source_ext: &str,
    ) -> Result<RenderedDerivative, anyhow::Error> {
        let spec = spec.clone();
        let source_ext = source_ext.to_string();
        tokio::task::spawn_blocking(move || Self::render_sync(&source, &spec, &source_ext)).await?
    }
}

/// Cover `w`x`h` and crop the overflow. A source smaller than the box is
/// only cropped to its aspect ratio, never enlarged.
fn fill(img: DynamicImage, w: u32, h: u32) -> DynamicImage {
    let (src_w, src_h) = img.dimensions();
    let scale = f64::min(src_w as f64 / w as f64, src_h as f64 / h as f64);
    if scale >= 1.0 {
        return img.resize_to_fill(w, h, FilterType::Lanczos3);
    }

    let crop_w = ((w as f64 * scale).round() as u32).clamp(1, src_w);
    let crop_h = ((h as f64 * scale).round() as u32).clamp(1, src_h);
    img.crop_imm((src_w - crop_w) / 2, (src_h - crop_h) / 2, crop_w, crop_h)
}

fn rgb_buffer_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Parse `rrggbb` (optionally `#`-prefixed)
fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// Composite onto an opaque background
fn flatten(img: &DynamicImage, bg: [u8; 3]) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        let blend = |c: u8, back: u8| ((c as u32 * alpha + back as u32 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r, bg[0]), blend(g, bg[1]), blend(b, bg[2])]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(w: u32, h: u32, pixel: Rgba<u8>) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, pixel));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn test_output_ext() {
        let mut spec = ThumbnailSpec::new(10, 10);
        assert_eq!(ImageThumbnailer::output_ext(&spec, "png"), "png");
        assert_eq!(ImageThumbnailer::output_ext(&spec, "JPEG"), "jpg");
        assert_eq!(ImageThumbnailer::output_ext(&spec, "gif"), "jpg");
        spec.f = Some("webp".to_string());
        assert_eq!(ImageThumbnailer::output_ext(&spec, "png"), "webp");
    }

    #[test]
    fn test_crop_to_fill() {
        let data = png_bytes(64, 32, Rgba([10, 20, 30, 255]));
        let mut spec = ThumbnailSpec::new(16, 16);
        spec.zc = true;
        let out = ImageThumbnailer::render_sync(&data, &spec, "png").unwrap();
        assert_eq!((out.width, out.height), (16, 16));
        assert_eq!(out.ext, "png");
        assert_eq!(out.mime, "image/png");
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!(decoded.dimensions(), (16, 16));
    }

    #[test]
    fn test_crop_to_fill_never_upscales() {
        let mut spec = ThumbnailSpec::new(16, 16);
        spec.zc = true;

        let small = png_bytes(8, 8, Rgba([10, 20, 30, 255]));
        let out = ImageThumbnailer::render_sync(&small, &spec, "png").unwrap();
        assert_eq!((out.width, out.height), (8, 8));

        // one side short: cropped to the square, not stretched
        let strip = png_bytes(40, 10, Rgba([10, 20, 30, 255]));
        let out = ImageThumbnailer::render_sync(&strip, &spec, "png").unwrap();
        assert_eq!((out.width, out.height), (10, 10));
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!(decoded.dimensions(), (10, 10));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_buffer_len_does_not_wrap() {
        assert_eq!(rgb_buffer_len(70_000, 70_000), 14_700_000_000);
        assert_eq!(rgb_buffer_len(120, 90), 32_400);
    }

    #[test]
    fn test_fit_keeps_aspect_and_never_upscales() {
        let data = png_bytes(64, 32, Rgba([10, 20, 30, 255]));
        let out = ImageThumbnailer::render_sync(&data, &ThumbnailSpec::new(16, 16), "png").unwrap();
        assert_eq!((out.width, out.height), (16, 8));

        let out =
            ImageThumbnailer::render_sync(&data, &ThumbnailSpec::new(640, 480), "png").unwrap();
        assert_eq!((out.width, out.height), (64, 32));
    }

    #[test]
    fn test_jpeg_output_flattens_transparency() {
        let data = png_bytes(8, 8, Rgba([0, 0, 0, 0]));
        let mut spec = ThumbnailSpec::new(8, 8);
        spec.f = Some("jpg".to_string());
        spec.bg = Some("ff0000".to_string());
        let out = ImageThumbnailer::render_sync(&data, &spec, "png").unwrap();
        assert_eq!(out.mime, "image/jpeg");
        assert_eq!(&out.data[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&out.data).unwrap().to_rgb8();
        let Rgb([r, g, b]) = *decoded.get_pixel(4, 4);
        assert!(r > 200 && g < 60 && b < 60);
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FFffff"), Some([255, 255, 255]));
        assert_eq!(parse_hex_color("00ff7f"), Some([0, 255, 127]));
        assert_eq!(parse_hex_color("fff"), None);
        assert_eq!(parse_hex_color("zzzzzz"), None);
    }

    #[tokio::test]
    async fn test_render_rejects_non_image() {
        let result = ImageThumbnailer::new()
            .render(Bytes::from_static(b"not an image"), &ThumbnailSpec::new(8, 8), "txt")
            .await;
        assert!(result.is_err());
    }
}
