//! Cross-check extracted shape positions against the engine's SVG.
//!
//! Only engine slides are checked; the fallback SVG is drawn from the same
//! descriptors and would agree by construction. Each text shape is matched
//! to the SVG `text` element whose content is closest, the element's anchor
//! is mapped back to slide pixels through the document's `viewBox`, and the
//! distance decides the shape's [`ValidationStatus`]. Validation never fails
//! a slide: anything unreadable leaves every shape `unvalidated` with the
//! reason in its details.

use crate::output::{ShapeDescriptor, ValidationStatus};
use crate::pipeline::xml::{self, Element};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// Largest per-axis distance, in slide pixels, for a `validated` shape.
pub const POSITION_TOLERANCE_PX: f64 = 50.0;

/// Scores below this are not considered a match at all.
const MIN_MATCH_SCORE: u8 = 70;

static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)").unwrap());

/// Mapping from SVG user units back to slide pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SvgFrame {
    offset_x: f64,
    offset_y: f64,
    scale_x: f64,
    scale_y: f64,
}

/// A positioned run of text found in the SVG.
#[derive(Debug, Clone, PartialEq)]
struct SvgText {
    normalized: String,
    x: f64,
    y: f64,
}

/// Validate `shapes` against the SVG file at `svg_path`.
pub fn validate_shapes(
    shapes: &mut [ShapeDescriptor],
    svg_path: &Path,
    slide_width_px: u32,
    slide_height_px: u32,
) {
    match std::fs::read_to_string(svg_path) {
        Ok(document) => validate_against_svg(shapes, &document, slide_width_px, slide_height_px),
        Err(e) => mark_unvalidated(shapes, &format!("SVG unreadable: {e}")),
    }
}

/// Validate `shapes` against an SVG document held in memory.
pub fn validate_against_svg(
    shapes: &mut [ShapeDescriptor],
    document: &str,
    slide_width_px: u32,
    slide_height_px: u32,
) {
    let root = match xml::parse(document) {
        Ok(root) => root,
        Err(e) => return mark_unvalidated(shapes, &format!("SVG is malformed: {e}")),
    };
    let Some(frame) = svg_frame(&root, slide_width_px, slide_height_px) else {
        return mark_unvalidated(shapes, "SVG has no usable dimensions");
    };
    let texts = svg_texts(&root);
    if texts.is_empty() {
        return mark_unvalidated(shapes, "SVG has no text elements");
    }

    let (w, h) = (slide_width_px as f64, slide_height_px as f64);
    for shape in shapes.iter_mut() {
        let wanted = normalize(&shape.text);
        if wanted.is_empty() {
            shape.validation_status = Some(ValidationStatus::Skipped);
            shape.validation_details = Some("No text to validate".into());
            continue;
        }
        let Some((found, score)) = best_match(&wanted, &texts) else {
            shape.validation_status = Some(ValidationStatus::Unvalidated);
            shape.validation_details = Some("No matching SVG text".into());
            continue;
        };

        let expected_x = (found.x - frame.offset_x) / frame.scale_x;
        let expected_y = (found.y - frame.offset_y) / frame.scale_y;
        let dx = (expected_x - shape.geometry.x * w / 100.0).abs();
        let dy = (expected_y - shape.geometry.y * h / 100.0).abs();

        let status = if dx <= POSITION_TOLERANCE_PX && dy <= POSITION_TOLERANCE_PX && score >= 90 {
            ValidationStatus::Validated
        } else if score >= 80 {
            ValidationStatus::Partial
        } else {
            ValidationStatus::Questionable
        };
        shape.validation_status = Some(status);
        shape.validation_details = Some(format!("match {score}%, offset ±{dx:.1},±{dy:.1} px"));
    }

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for shape in shapes.iter() {
        if let Some(status) = shape.validation_status {
            *counts.entry(format!("{status:?}")).or_default() += 1;
        }
    }
    debug!(?counts, "Validated shape positions against engine SVG");
}

fn mark_unvalidated(shapes: &mut [ShapeDescriptor], reason: &str) {
    warn!(reason, "Shape validation skipped");
    for shape in shapes {
        shape.validation_status = Some(ValidationStatus::Unvalidated);
        shape.validation_details = Some(reason.to_string());
    }
}

/// `viewBox` origin and scale, falling back to the numeric `width`/`height`.
fn svg_frame(root: &Element, slide_width_px: u32, slide_height_px: u32) -> Option<SvgFrame> {
    let view_box: Option<Vec<f64>> = root.attr("viewBox").and_then(|v| {
        v.split(|c: char| c.is_whitespace() || c == ',')
            .filter(|p| !p.is_empty())
            .map(|p| p.parse().ok())
            .collect()
    });
    let (offset_x, offset_y, vw, vh) = match view_box.as_deref() {
        Some(&[x, y, w, h]) => (x, y, w, h),
        _ => (0.0, 0.0, 0.0, 0.0),
    };
    let width = if vw > 0.0 { vw } else { leading_number(root.attr("width"))? };
    let height = if vh > 0.0 { vh } else { leading_number(root.attr("height"))? };
    if width <= 0.0 || height <= 0.0 || slide_width_px == 0 || slide_height_px == 0 {
        return None;
    }
    Some(SvgFrame {
        offset_x,
        offset_y,
        scale_x: width / slide_width_px as f64,
        scale_y: height / slide_height_px as f64,
    })
}

fn leading_number(value: Option<&str>) -> Option<f64> {
    LEADING_NUMBER
        .captures(value?)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Every non-empty `text` element with its anchor. The element's own `x`/`y`
/// win; otherwise the first descendant `tspan` that carries both is used.
fn svg_texts(root: &Element) -> Vec<SvgText> {
    let mut elements = Vec::new();
    root.find_all("text", &mut elements);

    elements
        .into_iter()
        .filter_map(|el| {
            let mut raw = String::new();
            collect_text(el, &mut raw);
            let normalized = normalize(&raw);
            if normalized.is_empty() {
                return None;
            }
            let (x, y) = anchor(el).or_else(|| first_positioned_tspan(el)).unwrap_or((0.0, 0.0));
            Some(SvgText { normalized, x, y })
        })
        .collect()
}

fn collect_text(el: &Element, out: &mut String) {
    out.push_str(&el.text);
    for c in &el.children {
        out.push(' ');
        collect_text(c, out);
    }
}

fn anchor(el: &Element) -> Option<(f64, f64)> {
    // `x`/`y` may be per-glyph lists; the first value is the run's start.
    let first = |name: &str| {
        el.attr(name)?
            .split(|c: char| c.is_whitespace() || c == ',')
            .find(|p| !p.is_empty())?
            .parse::<f64>()
            .ok()
    };
    Some((first("x")?, first("y")?))
}

fn first_positioned_tspan(el: &Element) -> Option<(f64, f64)> {
    el.children.iter().find_map(|c| {
        if c.name == "tspan" {
            if let Some(pos) = anchor(c) {
                return Some(pos);
            }
        }
        first_positioned_tspan(c)
    })
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 100 for equal text, 80 when one contains the other, otherwise the
/// percentage of shared words.
fn match_score(a: &str, b: &str) -> u8 {
    if a == b {
        return 100;
    }
    if a.contains(b) || b.contains(a) {
        return 80;
    }
    let left: HashSet<&str> = a.split(' ').collect();
    let right: HashSet<&str> = b.split(' ').collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0;
    }
    (left.intersection(&right).count() * 100 / union) as u8
}

fn best_match<'a>(wanted: &str, texts: &'a [SvgText]) -> Option<(&'a SvgText, u8)> {
    let mut best: Option<(&SvgText, u8)> = None;
    for t in texts {
        let score = match_score(wanted, &t.normalized);
        if score >= MIN_MATCH_SCORE && best.map_or(true, |(_, s)| score > s) {
            best = Some((t, score));
        }
    }
    best
}
