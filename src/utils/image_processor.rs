use std::io::{Cursor, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, Rgba, RgbaImage};

use crate::error::AppError;
use crate::models::{FitMode, OutputFormat, ResizeSpec};

pub struct ProcessedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// What the database records about a stored image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageProbe {
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub mime_type: String,
}

pub fn process_image(data: &[u8], spec: &ResizeSpec) -> Result<ProcessedImage, AppError> {
    let img = image::load_from_memory(data)?;
    let resized = resize(&img, spec);
    let data = encode(&resized, spec)?;

    Ok(ProcessedImage {
        data,
        width: resized.width(),
        height: resized.height(),
    })
}

/// Resizes under `spec.fit`. The source is never scaled up: when it is
/// smaller than the target box the result keeps (at most) its resolution.
pub fn resize(img: &DynamicImage, spec: &ResizeSpec) -> DynamicImage {
    let filter = FilterType::Lanczos3;
    let (src_w, src_h) = (img.width(), img.height());
    let (target_w, target_h) = (spec.width.max(1), spec.height.max(1));
    let fits = src_w <= target_w && src_h <= target_h;

    match spec.fit {
        FitMode::Inside => {
            if fits {
                img.clone()
            } else {
                img.resize(target_w, target_h, filter)
            }
        }
        FitMode::Cover => {
            // Shrink the crop box, keeping its aspect ratio, until the source covers it.
            let scale = (src_w as f64 / target_w as f64)
                .min(src_h as f64 / target_h as f64)
                .min(1.0);
            let box_w = ((target_w as f64 * scale).round() as u32).clamp(1, src_w.max(1));
            let box_h = ((target_h as f64 * scale).round() as u32).clamp(1, src_h.max(1));
            img.resize_to_fill(box_w, box_h, filter)
        }
        FitMode::Fill => img.resize_exact(target_w.min(src_w), target_h.min(src_h), filter),
        FitMode::Contain => {
            let inner = if fits {
                img.clone()
            } else {
                img.resize(target_w, target_h, filter)
            };
            let background = match spec.format {
                OutputFormat::Jpeg => Rgba([255, 255, 255, 255]),
                _ => Rgba([0, 0, 0, 0]),
            };
            let mut canvas = RgbaImage::from_pixel(target_w, target_h, background);
            let x = target_w.saturating_sub(inner.width()) / 2;
            let y = target_h.saturating_sub(inner.height()) / 2;
            imageops::overlay(&mut canvas, &inner.to_rgba8(), x as i64, y as i64);
            DynamicImage::ImageRgba8(canvas)
        }
    }
}

fn png_compression(quality: u8) -> CompressionType {
    match quality {
        0..=49 => CompressionType::Best,
        50..=89 => CompressionType::Default,
        _ => CompressionType::Fast,
    }
}

pub fn encode(img: &DynamicImage, spec: &ResizeSpec) -> Result<Vec<u8>, AppError> {
    let mut buffer = Cursor::new(Vec::new());

    match spec.format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, spec.quality.clamp(1, 100));
            img.to_rgb8().write_with_encoder(encoder)?;
        }
        OutputFormat::Webp => {
            let (width, height) = (img.width(), img.height());
            let (pixels, layout) = if img.color().has_alpha() {
                (img.to_rgba8().into_raw(), webp::PixelLayout::Rgba)
            } else {
                (img.to_rgb8().into_raw(), webp::PixelLayout::Rgb)
            };
            let encoded = webp::Encoder::new(&pixels, layout, width, height)
                .encode(f32::from(spec.quality.clamp(1, 100)));
            buffer.write_all(&encoded)?;
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buffer,
                png_compression(spec.quality),
                PngFilter::Adaptive,
            );
            img.to_rgba8().write_with_encoder(encoder)?;
        }
    }

    Ok(buffer.into_inner())
}

pub fn probe(path: &Path) -> Result<ImageProbe, AppError> {
    let size = std::fs::metadata(path)?.len();
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let mime_type = reader
        .format()
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
        .to_string();
    let (width, height) = reader.into_dimensions()?;

    Ok(ImageProbe {
        width,
        height,
        size,
        mime_type,
    })
}

/// File extension matching the sniffed format of `data`.
pub fn sniff_extension(data: &[u8]) -> Option<&'static str> {
    image::guess_format(data)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgb, RgbImage};

    fn sample(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn spec(width: u32, height: u32, fit: FitMode, format: OutputFormat) -> ResizeSpec {
        ResizeSpec {
            width,
            height,
            fit,
            quality: 80,
            format,
        }
    }

    #[test]
    fn inside_keeps_aspect_ratio() {
        let out = resize(&sample(800, 400), &spec(200, 200, FitMode::Inside, OutputFormat::Png));
        assert_eq!(out.dimensions(), (200, 100));
    }

    #[test]
    fn inside_never_enlarges() {
        let out = resize(&sample(50, 40), &spec(200, 200, FitMode::Inside, OutputFormat::Png));
        assert_eq!(out.dimensions(), (50, 40));
    }

    #[test]
    fn cover_fills_the_box() {
        let out = resize(&sample(800, 400), &spec(300, 300, FitMode::Cover, OutputFormat::Webp));
        assert_eq!(out.dimensions(), (300, 300));
    }

    #[test]
    fn cover_shrinks_box_for_small_sources() {
        let out = resize(&sample(150, 400), &spec(300, 300, FitMode::Cover, OutputFormat::Webp));
        assert_eq!(out.dimensions(), (150, 150));
    }

    #[test]
    fn fill_stretches_but_clamps_to_source() {
        let out = resize(&sample(800, 400), &spec(300, 300, FitMode::Fill, OutputFormat::Jpeg));
        assert_eq!(out.dimensions(), (300, 300));
        let small = resize(&sample(100, 400), &spec(300, 300, FitMode::Fill, OutputFormat::Jpeg));
        assert_eq!(small.dimensions(), (100, 300));
    }

    #[test]
    fn contain_pads_to_the_box() {
        let out = resize(&sample(800, 400), &spec(200, 200, FitMode::Contain, OutputFormat::Png));
        assert_eq!(out.dimensions(), (200, 200));
        // Top rows are padding.
        assert_eq!(out.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(out.get_pixel(100, 100)[3], 255);
    }

    #[test]
    fn contain_uses_white_padding_for_jpeg() {
        let out = resize(&sample(100, 50), &spec(200, 200, FitMode::Contain, OutputFormat::Jpeg));
        assert_eq!(out.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn process_image_encodes_requested_format() {
        let mut png = Cursor::new(Vec::new());
        sample(640, 480).write_to(&mut png, ImageFormat::Png).unwrap();
        let bytes = png.into_inner();

        for (format, expected) in [
            (OutputFormat::Webp, ImageFormat::WebP),
            (OutputFormat::Jpeg, ImageFormat::Jpeg),
            (OutputFormat::Png, ImageFormat::Png),
        ] {
            let out = process_image(&bytes, &spec(320, 320, FitMode::Inside, format)).unwrap();
            assert_eq!((out.width, out.height), (320, 240));
            assert_eq!(image::guess_format(&out.data).unwrap(), expected);
        }
    }

    #[test]
    fn webp_follows_template_quality() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(256, 256, |x, y| {
            Rgb([(x * y % 251) as u8, ((x ^ y) % 256) as u8, ((x + 3 * y) % 256) as u8])
        }));
        let mut low = spec(256, 256, FitMode::Inside, OutputFormat::Webp);
        low.quality = 10;
        let mut high = low;
        high.quality = 95;

        let low = encode(&img, &low).unwrap();
        let high = encode(&img, &high).unwrap();
        assert_eq!(image::guess_format(&low).unwrap(), ImageFormat::WebP);
        assert_ne!(low, high);
        assert!(low.len() < high.len());
    }

    #[test]
    fn process_image_rejects_garbage() {
        let err = process_image(b"not an image", &spec(10, 10, FitMode::Inside, OutputFormat::Png));
        assert!(matches!(err, Err(AppError::Image(_))));
    }

    #[test]
    fn probe_reads_dimensions_and_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.png");
        sample(33, 21).save(&path).unwrap();

        let probe = probe(&path).unwrap();
        assert_eq!((probe.width, probe.height), (33, 21));
        assert_eq!(probe.mime_type, "image/png");
        assert!(probe.size > 0);
    }

    #[test]
    fn sniffs_extension() {
        let mut jpeg = Cursor::new(Vec::new());
        sample(4, 4).write_to(&mut jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(sniff_extension(&jpeg.into_inner()), Some("jpg"));
        assert_eq!(sniff_extension(b"nope"), None);
    }
}
