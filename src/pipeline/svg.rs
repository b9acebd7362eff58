//! Fallback vector synthesis: extracted shapes → a self-contained SVG.
//!
//! Used for every slide when the engine produced no usable batch. The output
//! reproduces what translators need to see (where text sits, its size,
//! weight and colour, solid fills, embedded pictures) and nothing more:
//! gradients, patterns, effects and vector art are not drawn.
//!
//! The document is always well formed, including for a slide with no shapes
//! (a single background rectangle at the slide's dimensions).

use crate::error::SlideError;
use crate::output::{ShapeDescriptor, ShapeKind};
use crate::pipeline::extract::SlideContent;
use crate::units::{pt_to_px, HorizontalAlign, VerticalAnchor};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// Line advance when the deck does not specify one.
const DEFAULT_LINE_SPACING: f64 = 1.15;

/// Horizontal and vertical padding inside a text box, in pixels.
const TEXT_INSET: f64 = 5.0;

/// Share of the font size above the baseline.
const ASCENT: f64 = 0.8;

const IMAGE_PLACEHOLDER_FILL: &str = "#c8dcff";
const IMAGE_PLACEHOLDER_STROKE: &str = "#96aadc";

type XmlWriter = Writer<Vec<u8>>;

/// Render one slide to an SVG document.
pub fn synthesize_svg(
    content: &SlideContent,
    width_px: u32,
    height_px: u32,
) -> Result<String, SlideError> {
    let mut w = Writer::new(Vec::new());
    write_document(&mut w, content, width_px as f64, height_px as f64).map_err(|e| {
        SlideError::Synthesis {
            detail: e.to_string(),
        }
    })?;
    String::from_utf8(w.into_inner()).map_err(|e| SlideError::Synthesis {
        detail: e.to_string(),
    })
}

fn write_document(
    w: &mut XmlWriter,
    content: &SlideContent,
    width: f64,
    height: f64,
) -> quick_xml::Result<()> {
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    w.write_event(Event::Start(element(
        "svg",
        &[
            ("xmlns", "http://www.w3.org/2000/svg".into()),
            ("xmlns:xlink", "http://www.w3.org/1999/xlink".into()),
            ("version", "1.1".into()),
            ("width", num(width)),
            ("height", num(height)),
            ("viewBox", format!("0 0 {} {}", num(width), num(height))),
        ],
    )))?;

    w.write_event(Event::Empty(element(
        "rect",
        &[
            ("x", "0".into()),
            ("y", "0".into()),
            ("width", num(width)),
            ("height", num(height)),
            ("fill", content.background.color_or_white().to_string()),
        ],
    )))?;

    for shape in &content.shapes {
        write_shape(w, shape, width, height)?;
    }

    w.write_event(Event::End(BytesEnd::new("svg")))?;
    Ok(())
}

fn write_shape(
    w: &mut XmlWriter,
    shape: &ShapeDescriptor,
    slide_w: f64,
    slide_h: f64,
) -> quick_xml::Result<()> {
    let g = shape.geometry.to_absolute(slide_w, slide_h);

    if shape.kind != ShapeKind::Image {
        if let Some(ref fill) = shape.fill {
            w.write_event(Event::Empty(element(
                "rect",
                &[
                    ("x", num(g.x)),
                    ("y", num(g.y)),
                    ("width", num(g.width)),
                    ("height", num(g.height)),
                    ("fill", fill.clone()),
                ],
            )))?;
        }
    }

    match shape.kind {
        ShapeKind::Image => write_image(w, shape, g.x, g.y, g.width, g.height),
        ShapeKind::Text => write_text(w, shape, g.x, g.y, g.width, g.height),
        ShapeKind::Other => Ok(()),
    }
}

fn write_image(
    w: &mut XmlWriter,
    shape: &ShapeDescriptor,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
) -> quick_xml::Result<()> {
    let bounds = [
        ("x", num(x)),
        ("y", num(y)),
        ("width", num(width)),
        ("height", num(height)),
    ];

    match shape.image.as_ref().filter(|img| is_web_image(&img.content_type)) {
        Some(img) => {
            let mut attrs = bounds.to_vec();
            attrs.push(("preserveAspectRatio", "xMidYMid meet".into()));
            attrs.push((
                "xlink:href",
                format!("data:{};base64,{}", img.content_type, STANDARD.encode(&img.data)),
            ));
            w.write_event(Event::Empty(element("image", &attrs)))
        }
        None => {
            let mut attrs = bounds.to_vec();
            attrs.push(("fill", IMAGE_PLACEHOLDER_FILL.into()));
            attrs.push(("stroke", IMAGE_PLACEHOLDER_STROKE.into()));
            w.write_event(Event::Empty(element("rect", &attrs)))
        }
    }
}

fn write_text(
    w: &mut XmlWriter,
    shape: &ShapeDescriptor,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
) -> quick_xml::Result<()> {
    let font_px = pt_to_px(shape.font_size_pt);
    let line_advance = font_px * shape.line_spacing.unwrap_or(DEFAULT_LINE_SPACING);
    let lines: Vec<&str> = shape.text.split('\n').collect();
    let block_height = font_px + line_advance * (lines.len().saturating_sub(1)) as f64;

    let (text_x, anchor) = match shape.align {
        HorizontalAlign::Center => (width / 2.0, "middle"),
        HorizontalAlign::Right => (width - TEXT_INSET, "end"),
        _ => (TEXT_INSET, "start"),
    };
    let first_baseline = match shape.anchor.vertical_band() {
        VerticalAnchor::Middle => (height - block_height) / 2.0 + font_px * ASCENT,
        VerticalAnchor::Bottom => height - TEXT_INSET - block_height + font_px * ASCENT,
        _ => TEXT_INSET + font_px * ASCENT,
    };

    w.write_event(Event::Start(element(
        "g",
        &[
            ("id", shape.id.clone()),
            ("transform", format!("translate({},{})", num(x), num(y))),
        ],
    )))?;
    w.write_event(Event::Start(element(
        "text",
        &[
            ("xml:space", "preserve".into()),
            ("font-family", shape.font_family.clone()),
            ("font-size", num(font_px)),
            ("font-weight", if shape.bold { "bold" } else { "normal" }.into()),
            ("font-style", if shape.italic { "italic" } else { "normal" }.into()),
            ("fill", shape.color.clone()),
            ("text-anchor", anchor.into()),
        ],
    )))?;

    for (i, line) in lines.iter().enumerate() {
        let offset = if i == 0 {
            ("y", num(first_baseline))
        } else {
            ("dy", num(line_advance))
        };
        w.write_event(Event::Start(element("tspan", &[("x", num(text_x)), offset])))?;
        if !line.is_empty() {
            w.write_event(Event::Text(BytesText::new(line)))?;
        }
        w.write_event(Event::End(BytesEnd::new("tspan")))?;
    }

    w.write_event(Event::End(BytesEnd::new("text")))?;
    w.write_event(Event::End(BytesEnd::new("g")))?;
    Ok(())
}

fn element(name: &str, attrs: &[(&str, String)]) -> BytesStart<'static> {
    let mut el = BytesStart::new(name.to_string());
    for (k, v) in attrs {
        el.push_attribute((*k, v.as_str()));
    }
    el
}

/// Image types every SVG viewer can decode from a data URI.
fn is_web_image(content_type: &str) -> bool {
    matches!(
        content_type,
        "image/png" | "image/jpeg" | "image/gif" | "image/bmp" | "image/svg+xml"
    )
}

/// Compact number formatting: at most two decimals, no trailing zeros.
fn num(v: f64) -> String {
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}
