//! Thumbnail synthesis: a small PNG preview of one slide.
//!
//! The thumbnail is a schematic, not a rendering: background colour, light
//! blocks where text sits, solid fills for filled shapes, and scaled copies of
//! embedded raster pictures. The longest side is `max_dim` pixels and the
//! slide's aspect ratio is preserved.

use crate::error::SlideError;
use crate::output::{ShapeDescriptor, ShapeKind};
use crate::pipeline::extract::SlideContent;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

const TEXT_BLOCK_FILL: Rgba<u8> = Rgba([240, 240, 240, 255]);
const TEXT_BLOCK_OUTLINE: Rgba<u8> = Rgba([180, 180, 180, 255]);
const IMAGE_PLACEHOLDER: Rgba<u8> = Rgba([200, 220, 255, 255]);
const BORDER: Rgba<u8> = Rgba([200, 200, 200, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Thumbnail dimensions for a `width_px` × `height_px` slide.
pub fn thumbnail_size(width_px: u32, height_px: u32, max_dim: u32) -> (u32, u32) {
    let (w, h) = (width_px.max(1) as f64, height_px.max(1) as f64);
    let scale = max_dim as f64 / w.max(h);
    let tw = (w * scale).round().max(1.0) as u32;
    let th = (h * scale).round().max(1.0) as u32;
    (tw, th)
}

/// Compose the thumbnail and encode it as PNG.
pub fn synthesize_thumbnail(
    content: &SlideContent,
    width_px: u32,
    height_px: u32,
    max_dim: u32,
) -> Result<Vec<u8>, SlideError> {
    let (tw, th) = thumbnail_size(width_px, height_px, max_dim);
    let background = parse_color(content.background.color_or_white()).unwrap_or(WHITE);
    let mut canvas = RgbaImage::from_pixel(tw, th, background);

    for shape in &content.shapes {
        draw_shape(&mut canvas, shape)?;
    }
    stroke_rect(&mut canvas, 0, 0, tw as i64, th as i64, BORDER);

    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| SlideError::Thumbnail {
            detail: e.to_string(),
        })?;
    debug!(
        "Slide {} thumbnail {}x{} → {} bytes",
        content.slide_number,
        tw,
        th,
        buf.len()
    );
    Ok(buf)
}

fn draw_shape(canvas: &mut RgbaImage, shape: &ShapeDescriptor) -> Result<(), SlideError> {
    let g = shape
        .geometry
        .to_absolute(canvas.width() as f64, canvas.height() as f64);
    let (x, y) = (g.x.round() as i64, g.y.round() as i64);
    let (w, h) = (g.width.round() as i64, g.height.round() as i64);
    if w <= 0 || h <= 0 {
        return Ok(());
    }

    match shape.kind {
        ShapeKind::Text => {
            let fill = shape
                .fill
                .as_deref()
                .and_then(parse_color)
                .unwrap_or(TEXT_BLOCK_FILL);
            fill_rect(canvas, x, y, w, h, fill);
            stroke_rect(canvas, x, y, w, h, TEXT_BLOCK_OUTLINE);
        }
        ShapeKind::Other => {
            if let Some(fill) = shape.fill.as_deref().and_then(parse_color) {
                fill_rect(canvas, x, y, w, h, fill);
            }
        }
        ShapeKind::Image => {
            let decoded = match shape.image {
                Some(ref img) => match raster_format(&img.content_type) {
                    Some(format) => Some(
                        image::load_from_memory_with_format(&img.data, format).map_err(|e| {
                            SlideError::ImageDecode {
                                content_type: img.content_type.clone(),
                                detail: e.to_string(),
                            }
                        })?,
                    ),
                    None => None,
                },
                None => None,
            };
            match decoded {
                Some(picture) => {
                    // Fit inside the box, centred.
                    let scaled = picture
                        .resize(w as u32, h as u32, FilterType::Triangle)
                        .to_rgba8();
                    let ox = x + (w - scaled.width() as i64) / 2;
                    let oy = y + (h - scaled.height() as i64) / 2;
                    imageops::overlay(canvas, &scaled, ox, oy);
                }
                None => fill_rect(canvas, x, y, w, h, IMAGE_PLACEHOLDER),
            }
        }
    }
    Ok(())
}

/// Formats the thumbnail can decode. Vector and metafile pictures get a
/// placeholder block instead.
fn raster_format(content_type: &str) -> Option<ImageFormat> {
    match content_type {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" => Some(ImageFormat::Jpeg),
        "image/gif" => Some(ImageFormat::Gif),
        "image/bmp" => Some(ImageFormat::Bmp),
        _ => None,
    }
}

fn fill_rect(canvas: &mut RgbaImage, x: i64, y: i64, w: i64, h: i64, color: Rgba<u8>) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    let (x0, y0) = (x.clamp(0, cw), y.clamp(0, ch));
    let (x1, y1) = ((x + w).clamp(0, cw), (y + h).clamp(0, ch));
    for py in y0..y1 {
        for px in x0..x1 {
            canvas.put_pixel(px as u32, py as u32, color);
        }
    }
}

fn stroke_rect(canvas: &mut RgbaImage, x: i64, y: i64, w: i64, h: i64, color: Rgba<u8>) {
    fill_rect(canvas, x, y, w, 1, color);
    fill_rect(canvas, x, y + h - 1, w, 1, color);
    fill_rect(canvas, x, y, 1, h, color);
    fill_rect(canvas, x + w - 1, y, 1, h, color);
}

/// `#rrggbb` → opaque pixel.
fn parse_color(hex: &str) -> Option<Rgba<u8>> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]))
}
