//! Shape extraction: one slide's XML → positioned, styled shape descriptors.
//!
//! Extraction is a pure function of the opened [`Deck`] and a slide number.
//! The orchestrator calls it exactly once per slide and feeds the same
//! [`SlideContent`] to the fallback SVG and thumbnail synthesizers, so the
//! three views of a slide can never disagree about where text sits.
//!
//! ## Rules
//!
//! * Reading order is a shape's 0-indexed position among the slide's
//!   top-level `p:spTree` shapes. Skipped shapes still consume their index,
//!   so the sequence may have gaps.
//! * Shapes without a usable `a:xfrm` are skipped. Placeholders that carry
//!   no transform inherit it from the matching layout placeholder, then the
//!   master.
//! * All runs of a text body are concatenated (paragraphs joined by `\n`)
//!   and their styles collapsed with [`collapse_run_styles`].
//! * Table graphic frames yield an `other` descriptor for the frame plus one
//!   `text` descriptor per non-empty, non-merged cell.

use crate::error::SlideError;
use crate::output::{BackgroundFill, EmbeddedImage, ShapeDescriptor, ShapeKind};
use crate::pipeline::deck::{rels_part_name, Deck, Relationships, Theme};
use crate::pipeline::xml::{self, Element};
use crate::units::{hundredths_to_pt, Geometry, HorizontalAlign, VerticalAnchor};
use tracing::{debug, warn};

pub const DEFAULT_FONT_FAMILY: &str = "Arial";
pub const DEFAULT_FONT_SIZE_PT: f64 = 12.0;
pub const DEFAULT_TEXT_COLOR: &str = "#000000";

/// Everything extracted from one slide.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideContent {
    /// 1-indexed.
    pub slide_number: usize,
    pub background: BackgroundFill,
    /// In reading order.
    pub shapes: Vec<ShapeDescriptor>,
}

/// Style attributes written on one run. Absent attributes stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStyle {
    pub font_family: Option<String>,
    pub font_size_pt: Option<f64>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub color: Option<String>,
}

/// The single style a multi-run text body is reported with.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size_pt: f64,
    pub bold: bool,
    pub italic: bool,
    pub color: String,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size_pt: DEFAULT_FONT_SIZE_PT,
            bold: false,
            italic: false,
            color: DEFAULT_TEXT_COLOR.to_string(),
        }
    }
}

/// Collapse per-run styles into one: the first run wins.
///
/// Attributes the first run leaves unset take the defaults (12pt Arial,
/// black, regular); later runs are never consulted.
pub fn collapse_run_styles(runs: &[RunStyle]) -> TextStyle {
    let defaults = TextStyle::default();
    let Some(first) = runs.first() else {
        return defaults;
    };
    TextStyle {
        font_family: first.font_family.clone().unwrap_or(defaults.font_family),
        font_size_pt: first
            .font_size_pt
            .filter(|s| *s > 0.0)
            .unwrap_or(defaults.font_size_pt),
        bold: first.bold.unwrap_or(defaults.bold),
        italic: first.italic.unwrap_or(defaults.italic),
        color: first.color.clone().unwrap_or(defaults.color),
    }
}

/// Extract the shapes and background of slide `slide_number` (1-indexed).
pub fn extract_slide(deck: &Deck, slide_number: usize) -> Result<SlideContent, SlideError> {
    let part = deck.slide(slide_number).ok_or_else(|| SlideError::Extraction {
        detail: format!(
            "deck has {} slides, no slide {slide_number}",
            deck.slide_count()
        ),
    })?;

    let text = deck
        .part_text(&part.part_name)
        .ok_or_else(|| SlideError::Extraction {
            detail: format!("'{}' is not valid UTF-8", part.part_name),
        })?;
    let root = xml::parse(text).map_err(|e| SlideError::Extraction {
        detail: format!("'{}': {e}", part.part_name),
    })?;

    let rels = match deck.part_text(&rels_part_name(&part.part_name)) {
        Some(rels_xml) => {
            Relationships::parse(rels_xml, &part.part_name).map_err(|e| SlideError::Extraction {
                detail: format!("relationships of '{}': {e}", part.part_name),
            })?
        }
        None => Relationships::default(),
    };

    let layout = related_part(deck, &rels, "slideLayout");
    // The master is related from the layout, not from the slide.
    let master = layout.as_ref().and_then(|(layout_name, _)| {
        let layout_rels =
            Relationships::parse(deck.part_text(&rels_part_name(layout_name))?, layout_name)
                .ok()?;
        related_part(deck, &layout_rels, "slideMaster")
    });

    let extractor = SlideExtractor {
        deck,
        theme: deck.theme(),
        slide_number,
        rels,
        layout: layout.map(|(_, el)| el),
        master: master.map(|(_, el)| el),
    };
    extractor.run(&root)
}

// ── Extractor ────────────────────────────────────────────────────────────

struct SlideExtractor<'a> {
    deck: &'a Deck,
    theme: &'a Theme,
    slide_number: usize,
    rels: Relationships,
    layout: Option<Element>,
    master: Option<Element>,
}

/// Text body contents before they are merged into a descriptor.
struct TextBlock {
    text: String,
    runs: Vec<RunStyle>,
    align: HorizontalAlign,
    anchor: VerticalAnchor,
    line_spacing: LineSpacing,
}

enum LineSpacing {
    Unset,
    /// Multiple of the font size.
    Percent(f64),
    /// Fixed, in points.
    Points(f64),
}

impl<'a> SlideExtractor<'a> {
    fn run(&self, root: &Element) -> Result<SlideContent, SlideError> {
        let background = self.background(root);

        let mut shapes = Vec::new();
        if let Some(tree) = root.path(&["cSld", "spTree"]) {
            let mut order = 0usize;
            for node in &tree.children {
                let Some(shape) = unwrap_alternate_content(node) else {
                    continue;
                };
                self.shape(shape, order, &mut shapes)?;
                order += 1;
            }
        }

        debug!(
            slide = self.slide_number,
            shapes = shapes.len(),
            "Extracted slide shapes"
        );

        Ok(SlideContent {
            slide_number: self.slide_number,
            background,
            shapes,
        })
    }

    /// Slide background, inheriting from layout then master.
    fn background(&self, root: &Element) -> BackgroundFill {
        [Some(root), self.layout.as_ref(), self.master.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|el| {
                let bg = el.path(&["cSld", "bg"])?;
                if let Some(fill) = bg.path(&["bgPr", "solidFill"]) {
                    return self.color_of(fill);
                }
                // bgRef carries its colour as a direct child.
                bg.child("bgRef").and_then(|r| self.color_of(r))
            })
            .map(BackgroundFill::Solid)
            .unwrap_or_default()
    }

    fn shape(
        &self,
        el: &Element,
        order: usize,
        out: &mut Vec<ShapeDescriptor>,
    ) -> Result<(), SlideError> {
        let nv = el.children.iter().find(|c| c.name.starts_with("nv"));
        let id = match nv.and_then(|n| n.child("cNvPr")).and_then(|c| c.attr("id")) {
            Some(native) => format!("slide{}-shape{native}", self.slide_number),
            None => format!("slide{}-order{order}", self.slide_number),
        };
        let ph = nv.and_then(|n| n.path(&["nvPr", "ph"]));
        let ph_type = ph.map(|p| p.attr("type").unwrap_or("obj").to_string());

        let xfrm = own_xfrm(el).or_else(|| ph.and_then(|p| self.inherited_xfrm(p)));
        let Some(geometry) = xfrm.and_then(|x| self.geometry(x)) else {
            debug!(slide = self.slide_number, %id, "Skipping shape without geometry");
            return Ok(());
        };

        let fill = el
            .child("spPr")
            .and_then(|p| p.child("solidFill"))
            .and_then(|f| self.color_of(f));

        let mut desc = blank_descriptor(id, geometry, order, ph_type, fill);

        match el.name.as_str() {
            "pic" => {
                desc.kind = ShapeKind::Image;
                desc.image = self.image(el)?;
            }
            "sp" => {
                if let Some(block) = el.child("txBody").map(|tx| self.text_body(tx)) {
                    if !block.text.trim().is_empty() {
                        apply_text(&mut desc, block);
                    }
                }
            }
            "graphicFrame" => {
                if let Some(frame_xfrm) = xfrm {
                    self.table_cells(el, frame_xfrm, &desc, out);
                }
                // Cells precede the frame so consumers see text first.
                out.push(desc);
                return Ok(());
            }
            _ => {}
        }

        out.push(desc);
        Ok(())
    }

    fn geometry(&self, xfrm: &Element) -> Option<Geometry> {
        let off = xfrm.child("off");
        let ext = xfrm.child("ext")?;
        let (slide_cx, slide_cy) = self.deck.size_emu();
        Geometry::from_emu(
            off.and_then(|o| o.attr_i64("x")).unwrap_or(0),
            off.and_then(|o| o.attr_i64("y")).unwrap_or(0),
            ext.attr_i64("cx")?,
            ext.attr_i64("cy")?,
            slide_cx,
            slide_cy,
        )
    }

    /// Transform of the layout (then master) placeholder matching `ph`.
    fn inherited_xfrm(&self, ph: &Element) -> Option<&Element> {
        let ph_type = ph.attr("type").unwrap_or("obj");
        let ph_idx = ph.attr("idx");

        let layout_match = self.layout.as_ref().and_then(|layout| {
            placeholders(layout).find(|(t, idx, _)| match (ph_idx, idx) {
                (Some(want), Some(have)) => want == *have,
                _ => *t == ph_type,
            })
        });
        if let Some((_, _, Some(xfrm))) = layout_match {
            return Some(xfrm);
        }

        let master_type = match ph_type {
            "ctrTitle" => "title",
            "subTitle" | "obj" => "body",
            other => other,
        };
        self.master.as_ref().and_then(|master| {
            placeholders(master)
                .find(|(t, _, _)| *t == master_type)
                .and_then(|(_, _, xfrm)| xfrm)
        })
    }

    fn text_body(&self, tx: &Element) -> TextBlock {
        let mut lines = Vec::new();
        let mut runs = Vec::new();

        for p in tx.children_named("p") {
            let mut line = String::new();
            for c in &p.children {
                match c.name.as_str() {
                    "r" | "fld" => {
                        let t = c.child("t").map(|t| t.text.as_str()).unwrap_or("");
                        if !t.is_empty() {
                            line.push_str(t);
                            runs.push(self.run_style(c.child("rPr")));
                        }
                    }
                    "br" => line.push('\n'),
                    _ => {}
                }
            }
            lines.push(line);
        }

        let first_ppr = tx.child("p").and_then(|p| p.child("pPr"));
        let body_pr = tx.child("bodyPr");

        let line_spacing = match first_ppr.and_then(|p| p.child("lnSpc")) {
            Some(ln) => {
                if let Some(pct) = ln.child("spcPct").and_then(|s| s.attr_i64("val")) {
                    LineSpacing::Percent(pct as f64 / 100_000.0)
                } else if let Some(pts) = ln.child("spcPts").and_then(|s| s.attr_i64("val")) {
                    LineSpacing::Points(hundredths_to_pt(pts))
                } else {
                    LineSpacing::Unset
                }
            }
            None => LineSpacing::Unset,
        };

        TextBlock {
            text: lines.join("\n"),
            runs,
            align: HorizontalAlign::from_ooxml(first_ppr.and_then(|p| p.attr("algn"))),
            anchor: VerticalAnchor::from_ooxml(
                body_pr.and_then(|b| b.attr("anchor")),
                body_pr.and_then(|b| b.attr_bool("anchorCtr")).unwrap_or(false),
            ),
            line_spacing,
        }
    }

    fn run_style(&self, rpr: Option<&Element>) -> RunStyle {
        let Some(rpr) = rpr else {
            return RunStyle::default();
        };
        RunStyle {
            font_family: rpr
                .child("latin")
                .and_then(|l| l.attr("typeface"))
                .and_then(|t| self.theme.font(t))
                .map(str::to_string),
            font_size_pt: rpr.attr_i64("sz").map(hundredths_to_pt),
            bold: rpr.attr_bool("b"),
            italic: rpr.attr_bool("i"),
            color: rpr.child("solidFill").and_then(|f| self.color_of(f)),
        }
    }

    fn image(&self, pic: &Element) -> Result<Option<EmbeddedImage>, SlideError> {
        let Some(rid) = pic
            .path(&["blipFill", "blip"])
            .and_then(|b| b.ns_attr("embed"))
        else {
            return Ok(None);
        };
        let rel = self.rels.get(rid).ok_or_else(|| SlideError::MissingMedia {
            target: rid.to_string(),
        })?;
        if rel.external {
            return Ok(None);
        }
        let data = self
            .deck
            .part(&rel.target)
            .ok_or_else(|| SlideError::MissingMedia {
                target: rel.target.clone(),
            })?;
        Ok(Some(EmbeddedImage::new(
            content_type_for(&rel.target),
            data.to_vec(),
        )))
    }

    fn table_cells(
        &self,
        frame: &Element,
        frame_xfrm: &Element,
        frame_desc: &ShapeDescriptor,
        out: &mut Vec<ShapeDescriptor>,
    ) {
        let Some(tbl) = frame.path(&["graphic", "graphicData", "tbl"]) else {
            return;
        };
        let cols: Vec<i64> = tbl
            .child("tblGrid")
            .map(|g| {
                g.children_named("gridCol")
                    .map(|c| c.attr_i64("w").unwrap_or(0))
                    .collect()
            })
            .unwrap_or_default();
        let rows: Vec<&Element> = tbl.children_named("tr").collect();
        let heights: Vec<i64> = rows.iter().map(|tr| tr.attr_i64("h").unwrap_or(0)).collect();
        let off = frame_xfrm.child("off");
        let origin_x = off.and_then(|o| o.attr_i64("x")).unwrap_or(0);
        let mut y = off.and_then(|o| o.attr_i64("y")).unwrap_or(0);
        let (slide_cx, slide_cy) = self.deck.size_emu();

        for (r, tr) in rows.iter().enumerate() {
            let mut x = origin_x;
            // One `tc` per grid column; cells covered by a span are
            // `hMerge`/`vMerge` placeholders that still occupy their column.
            for (col, tc) in tr.children_named("tc").enumerate() {
                let merged = tc.attr_bool("hMerge").unwrap_or(false)
                    || tc.attr_bool("vMerge").unwrap_or(false);

                if !merged {
                    let w = span_extent(&cols, col, tc.attr_i64("gridSpan"));
                    let h = span_extent(&heights, r, tc.attr_i64("rowSpan"));
                    let block = tc.child("txBody").map(|tx| self.text_body(tx));
                    let geometry = Geometry::from_emu(x, y, w, h, slide_cx, slide_cy);
                    match (block, geometry) {
                        (Some(block), Some(geometry)) if !block.text.trim().is_empty() => {
                            let fill = tc
                                .path(&["tcPr", "solidFill"])
                                .and_then(|f| self.color_of(f));
                            let mut cell = blank_descriptor(
                                format!("{}-r{}c{}", frame_desc.id, r + 1, col + 1),
                                geometry,
                                frame_desc.reading_order,
                                None,
                                fill,
                            );
                            apply_text(&mut cell, block);
                            out.push(cell);
                        }
                        (Some(block), None) if !block.text.trim().is_empty() => {
                            warn!(
                                slide = self.slide_number,
                                row = r + 1,
                                col = col + 1,
                                "Table cell outside the grid, text dropped"
                            );
                        }
                        _ => {}
                    }
                }

                x = x.saturating_add(cols.get(col).copied().unwrap_or(0));
            }
            y = y.saturating_add(heights[r]);
        }
    }

    /// Resolve the first colour child of a fill element to `#rrggbb`.
    fn color_of(&self, fill: &Element) -> Option<String> {
        for c in &fill.children {
            let base = match c.name.as_str() {
                "srgbClr" => c.attr("val"),
                "schemeClr" => c.attr("val").and_then(|v| self.theme.scheme_color(v)),
                "sysClr" => c.attr("lastClr"),
                "prstClr" => c.attr("val").and_then(preset_color),
                _ => continue,
            };
            let Some(rgb) = base.and_then(parse_hex) else {
                warn!(slide = self.slide_number, element = %c.name, "Unresolvable colour");
                return None;
            };
            return Some(to_hex(apply_luminance(rgb, c)));
        }
        None
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

const SHAPE_ELEMENTS: &[&str] = &["sp", "pic", "grpSp", "graphicFrame", "cxnSp"];

/// The shape element itself, or the fallback branch of `mc:AlternateContent`.
fn unwrap_alternate_content(node: &Element) -> Option<&Element> {
    if SHAPE_ELEMENTS.contains(&node.name.as_str()) {
        return Some(node);
    }
    if node.name != "AlternateContent" {
        return None;
    }
    node.child("Fallback")
        .into_iter()
        .chain(node.children_named("Choice"))
        .flat_map(|branch| branch.children.iter())
        .find(|c| SHAPE_ELEMENTS.contains(&c.name.as_str()))
}

/// Total size of `span` grid tracks starting at `start` (a span below 1 counts as 1).
fn span_extent(tracks: &[i64], start: usize, span: Option<i64>) -> i64 {
    let span = span.unwrap_or(1).clamp(1, tracks.len().max(1) as i64) as usize;
    tracks
        .iter()
        .skip(start)
        .take(span)
        .fold(0i64, |acc, t| acc.saturating_add(*t))
}

fn own_xfrm(el: &Element) -> Option<&Element> {
    match el.name.as_str() {
        "grpSp" => el.path(&["grpSpPr", "xfrm"]),
        "graphicFrame" => el.child("xfrm"),
        _ => el.path(&["spPr", "xfrm"]),
    }
}

/// `(type, idx, xfrm)` of each placeholder in a layout or master.
fn placeholders(root: &Element) -> impl Iterator<Item = (&str, Option<&str>, Option<&Element>)> {
    root.path(&["cSld", "spTree"])
        .into_iter()
        .flat_map(|tree| tree.children.iter())
        .filter_map(|shape| {
            let nv = shape.children.iter().find(|c| c.name.starts_with("nv"))?;
            let ph = nv.path(&["nvPr", "ph"])?;
            Some((
                ph.attr("type").unwrap_or("obj"),
                ph.attr("idx"),
                own_xfrm(shape),
            ))
        })
}

fn related_part(deck: &Deck, rels: &Relationships, kind: &str) -> Option<(String, Element)> {
    let rel = rels.first_of_kind(kind)?;
    let text = deck.part_text(&rel.target)?;
    match xml::parse(text) {
        Ok(el) => Some((rel.target.clone(), el)),
        Err(e) => {
            warn!("Ignoring malformed {} '{}': {}", kind, rel.target, e);
            None
        }
    }
}

fn blank_descriptor(
    id: String,
    geometry: Geometry,
    order: usize,
    placeholder_type: Option<String>,
    fill: Option<String>,
) -> ShapeDescriptor {
    let style = TextStyle::default();
    let is_title = matches!(placeholder_type.as_deref(), Some("title" | "ctrTitle"));
    let is_subtitle = placeholder_type.as_deref() == Some("subTitle");
    ShapeDescriptor {
        id,
        kind: ShapeKind::Other,
        text: String::new(),
        geometry,
        font_family: style.font_family,
        font_size_pt: style.font_size_pt,
        bold: style.bold,
        italic: style.italic,
        color: style.color,
        align: HorizontalAlign::default(),
        anchor: VerticalAnchor::default(),
        line_spacing: None,
        fill,
        reading_order: order,
        placeholder_type,
        is_title,
        is_subtitle,
        text_length: 0,
        word_count: 0,
        translation_priority: if is_title {
            10
        } else if is_subtitle {
            8
        } else {
            5
        },
        image: None,
        validation_status: None,
        validation_details: None,
    }
}

fn apply_text(desc: &mut ShapeDescriptor, block: TextBlock) {
    let style = collapse_run_styles(&block.runs);
    desc.kind = ShapeKind::Text;
    desc.text_length = block.text.chars().count();
    desc.word_count = block.text.split_whitespace().count();
    desc.text = block.text;
    desc.line_spacing = match block.line_spacing {
        LineSpacing::Unset => None,
        LineSpacing::Percent(m) => Some(m),
        LineSpacing::Points(pt) => Some(pt / style.font_size_pt),
    };
    desc.font_family = style.font_family;
    desc.font_size_pt = style.font_size_pt;
    desc.bold = style.bold;
    desc.italic = style.italic;
    desc.color = style.color;
    desc.align = block.align;
    desc.anchor = block.anchor;
}

/// MIME type for a media part, by extension.
pub fn content_type_for(part_name: &str) -> &'static str {
    let ext = part_name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" | "dib" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "emf" => "image/x-emf",
        "wmf" => "image/x-wmf",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

fn preset_color(name: &str) -> Option<&'static str> {
    Some(match name {
        "black" => "000000",
        "white" => "FFFFFF",
        "red" => "FF0000",
        "green" => "008000",
        "blue" => "0000FF",
        "yellow" => "FFFF00",
        "gray" | "grey" => "808080",
        _ => return None,
    })
}

fn parse_hex(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some([byte(0)?, byte(2)?, byte(4)?])
}

fn to_hex([r, g, b]: [u8; 3]) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// Apply `a:lumMod` / `a:lumOff` children (HSL lightness adjustments).
fn apply_luminance(rgb: [u8; 3], color: &Element) -> [u8; 3] {
    let lum_mod = color.child("lumMod").and_then(|m| m.attr_i64("val"));
    let lum_off = color.child("lumOff").and_then(|m| m.attr_i64("val"));
    if lum_mod.is_none() && lum_off.is_none() {
        return rgb;
    }
    let (h, s, l) = rgb_to_hsl(rgb);
    let l = l * lum_mod.map_or(1.0, |v| v as f64 / 100_000.0)
        + lum_off.map_or(0.0, |v| v as f64 / 100_000.0);
    hsl_to_rgb(h, s, l.clamp(0.0, 1.0))
}

fn rgb_to_hsl([r, g, b]: [u8; 3]) -> (f64, f64, f64) {
    let (r, g, b) = (r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if (max - min).abs() < f64::EPSILON {
        return (0.0, 0.0, l);
    }
    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h / 6.0, s, l)
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> [u8; 3] {
    let to_byte = |v: f64| (v * 255.0).round().clamp(0.0, 255.0) as u8;
    if s == 0.0 {
        let v = to_byte(l);
        return [v, v, v];
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let hue = |mut t: f64| {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    [
        to_byte(hue(h + 1.0 / 3.0)),
        to_byte(hue(h)),
        to_byte(hue(h - 1.0 / 3.0)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_wins() {
        let runs = vec![
            RunStyle {
                font_size_pt: Some(24.0),
                bold: Some(true),
                ..Default::default()
            },
            RunStyle {
                font_family: Some("Georgia".into()),
                font_size_pt: Some(10.0),
                italic: Some(true),
                color: Some("#ff0000".into()),
                ..Default::default()
            },
        ];
        let style = collapse_run_styles(&runs);
        assert_eq!(style.font_size_pt, 24.0);
        assert!(style.bold);
        // Unset on the first run: defaults, not the second run's values.
        assert_eq!(style.font_family, "Arial");
        assert!(!style.italic);
        assert_eq!(style.color, "#000000");
    }

    #[test]
    fn span_extent_sums_and_saturates() {
        assert_eq!(span_extent(&[100, 200, 300], 1, Some(2)), 500);
        assert_eq!(span_extent(&[100, 200, 300], 2, None), 300);
        // Spans past the grid stop at its edge; zero spans count as one.
        assert_eq!(span_extent(&[100, 200], 1, Some(5)), 200);
        assert_eq!(span_extent(&[100, 200], 0, Some(0)), 100);
        assert_eq!(span_extent(&[100], 3, None), 0);
        assert_eq!(span_extent(&[i64::MAX, i64::MAX], 0, Some(2)), i64::MAX);
    }

    #[test]
    fn no_runs_means_defaults() {
        assert_eq!(collapse_run_styles(&[]), TextStyle::default());
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("ppt/media/image1.PNG"), "image/png");
        assert_eq!(content_type_for("ppt/media/image2.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("ppt/media/image3.emf"), "image/x-emf");
        assert_eq!(content_type_for("ppt/media/blob"), "application/octet-stream");
    }

    #[test]
    fn hex_round_trip_and_rejects_garbage() {
        assert_eq!(parse_hex("1A2b3C"), Some([0x1a, 0x2b, 0x3c]));
        assert_eq!(to_hex([0x1a, 0x2b, 0x3c]), "#1a2b3c");
        assert_eq!(parse_hex("12345"), None);
        assert_eq!(parse_hex("zzzzzz"), None);
    }

    #[test]
    fn luminance_modifiers() {
        let el = xml::parse(r#"<schemeClr val="bg1"><lumMod val="50000"/></schemeClr>"#).unwrap();
        assert_eq!(apply_luminance([255, 255, 255], &el), [128, 128, 128]);

        let el = xml::parse(
            r#"<srgbClr val="000000"><lumMod val="75000"/><lumOff val="25000"/></srgbClr>"#,
        )
        .unwrap();
        assert_eq!(apply_luminance([0, 0, 0], &el), [64, 64, 64]);

        let plain = xml::parse(r#"<srgbClr val="123456"/>"#).unwrap();
        assert_eq!(apply_luminance([0x12, 0x34, 0x56], &plain), [0x12, 0x34, 0x56]);
    }

    #[test]
    fn hsl_round_trip_for_saturated_colour() {
        let (h, s, l) = rgb_to_hsl([0x44, 0x72, 0xc4]);
        assert_eq!(hsl_to_rgb(h, s, l), [0x44, 0x72, 0xc4]);
    }

    #[test]
    fn alternate_content_uses_fallback() {
        let el = xml::parse(
            r#"<AlternateContent><Choice><sp><x/></sp></Choice><Fallback><pic/></Fallback></AlternateContent>"#,
        )
        .unwrap();
        assert_eq!(unwrap_alternate_content(&el).unwrap().name, "pic");
        let other = xml::parse("<nvGrpSpPr/>").unwrap();
        assert!(unwrap_alternate_content(&other).is_none());
    }
}
