//! Result types produced by a conversion.
//!
//! Everything here serialises with camelCase field names because the result
//! document (`result.json`) is consumed by the translation editor front end.

use crate::units::{Geometry, HorizontalAlign, VerticalAnchor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broad category of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    /// Carries translatable text.
    Text,
    /// A picture (`p:pic`).
    Image,
    /// Anything else with geometry: groups, connectors, tables, empty shapes.
    Other,
}

/// Raster or vector payload of an image shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedImage {
    /// MIME type inferred from the media part's extension.
    pub content_type: String,
    /// Size of the media part.
    pub size_bytes: usize,
    /// Raw bytes, serialised as standard base64. Empty once released.
    #[serde(
        rename = "base64",
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "base64_bytes"
    )]
    pub data: Vec<u8>,
}

impl EmbeddedImage {
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            size_bytes: data.len(),
            data,
        }
    }

    /// Drop the payload, keeping its type and size.
    pub fn release_payload(&mut self) {
        self.data = Vec::new();
    }
}

/// A positioned, styled element of one slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeDescriptor {
    /// Stable id: `slide{n}-shape{native id}`.
    pub id: String,
    pub kind: ShapeKind,
    /// Concatenated text of every run; paragraphs separated by `\n`.
    pub text: String,
    pub geometry: Geometry,
    pub font_family: String,
    pub font_size_pt: f64,
    pub bold: bool,
    pub italic: bool,
    /// `#rrggbb`
    pub color: String,
    pub align: HorizontalAlign,
    pub anchor: VerticalAnchor,
    /// Line spacing as a multiple of the font size, when the deck sets one.
    pub line_spacing: Option<f64>,
    /// Solid shape fill, `#rrggbb`.
    pub fill: Option<String>,
    /// Position in the slide's shape tree, 0-indexed.
    pub reading_order: usize,
    pub placeholder_type: Option<String>,
    pub is_title: bool,
    pub is_subtitle: bool,
    pub text_length: usize,
    pub word_count: usize,
    /// 10 for titles, 8 for subtitles, 5 otherwise.
    pub translation_priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbeddedImage>,
    /// Agreement with the engine's SVG; absent for fallback slides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<ValidationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_details: Option<String>,
}

/// How well a shape's extracted position agrees with the engine's SVG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Text matched closely and the position is within tolerance.
    Validated,
    /// Text matched but the position differs.
    Partial,
    /// A weak text match.
    Questionable,
    /// No usable match, or the SVG could not be read.
    Unvalidated,
    /// The shape has no text to match.
    Skipped,
}

/// A slide's background.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "color", rename_all = "snake_case")]
pub enum BackgroundFill {
    /// Solid colour, `#rrggbb`.
    Solid(String),
    /// No explicit fill; renders white.
    #[default]
    None,
}

impl BackgroundFill {
    /// The colour to paint, white when there is no explicit fill.
    pub fn color_or_white(&self) -> &str {
        match self {
            BackgroundFill::Solid(c) => c,
            BackgroundFill::None => "#ffffff",
        }
    }
}

/// Which renderer produced a slide's vector image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisSource {
    /// Exported by the external engine.
    Engine,
    /// Generated locally from extracted shapes.
    Fallback,
}

/// One converted slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideResult {
    /// 1-indexed.
    pub slide_number: usize,
    pub svg_url: String,
    pub thumbnail_url: String,
    /// Pixels at 96 DPI.
    pub width: u32,
    pub height: u32,
    pub vector_source: SynthesisSource,
    pub background: BackgroundFill,
    pub shapes: Vec<ShapeDescriptor>,
}

/// Timing and path statistics for a converted deck.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckStats {
    pub engine_slides: usize,
    pub fallback_slides: usize,
    pub total_shapes: usize,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
    /// The result was served from the result cache.
    #[serde(default)]
    pub cached: bool,
}

/// The final structured result of one successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckResult {
    pub session_id: String,
    pub job_id: String,
    pub slide_count: usize,
    pub slides: Vec<SlideResult>,
    pub stats: DeckStats,
    pub completed_at: DateTime<Utc>,
}

/// Deck facts available without rendering anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckSummary {
    pub slide_count: usize,
    pub width_px: u32,
    pub height_px: u32,
    pub width_emu: i64,
    pub height_emu: i64,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::GeometryUnit;

    fn sample_shape() -> ShapeDescriptor {
        ShapeDescriptor {
            id: "slide1-shape2".into(),
            kind: ShapeKind::Image,
            text: String::new(),
            geometry: Geometry {
                x: 1.0,
                y: 2.0,
                width: 3.0,
                height: 4.0,
                unit: GeometryUnit::Percentage,
            },
            font_family: "Arial".into(),
            font_size_pt: 12.0,
            bold: false,
            italic: false,
            color: "#000000".into(),
            align: HorizontalAlign::Left,
            anchor: VerticalAnchor::Top,
            line_spacing: None,
            fill: None,
            reading_order: 0,
            placeholder_type: None,
            is_title: false,
            is_subtitle: false,
            text_length: 0,
            word_count: 0,
            translation_priority: 5,
            image: Some(EmbeddedImage::new("image/png", vec![1, 2, 3])),
            validation_status: None,
            validation_details: None,
        }
    }

    #[test]
    fn shape_serialises_camel_case_with_base64_payload() {
        let json = serde_json::to_value(sample_shape()).unwrap();
        assert_eq!(json["fontSizePt"], 12.0);
        assert_eq!(json["readingOrder"], 0);
        assert_eq!(json["kind"], "image");
        assert_eq!(json["geometry"]["unit"], "percentage");
        assert_eq!(json["image"]["base64"], "AQID");
        assert_eq!(json["image"]["contentType"], "image/png");
        assert_eq!(json["image"]["sizeBytes"], 3);
    }

    #[test]
    fn released_payload_is_not_serialised() {
        let mut shape = sample_shape();
        if let Some(image) = shape.image.as_mut() {
            image.release_payload();
        }
        let json = serde_json::to_value(&shape).unwrap();
        assert!(json["image"].get("base64").is_none());
        assert_eq!(json["image"]["sizeBytes"], 3);

        let back: ShapeDescriptor = serde_json::from_value(json).unwrap();
        assert!(back.image.unwrap().data.is_empty());
    }

    #[test]
    fn shape_json_reads_back() {
        let shape = sample_shape();
        let text = serde_json::to_string(&shape).unwrap();
        let back: ShapeDescriptor = serde_json::from_str(&text).unwrap();
        assert_eq!(back, shape);
    }

    #[test]
    fn background_defaults_to_white() {
        assert_eq!(BackgroundFill::None.color_or_white(), "#ffffff");
        assert_eq!(
            BackgroundFill::Solid("#102030".into()).color_or_white(),
            "#102030"
        );
    }

    #[test]
    fn slide_result_uses_editor_field_names() {
        let slide = SlideResult {
            slide_number: 3,
            svg_url: "s".into(),
            thumbnail_url: "t".into(),
            width: 960,
            height: 540,
            vector_source: SynthesisSource::Fallback,
            background: BackgroundFill::None,
            shapes: vec![],
        };
        let json = serde_json::to_value(slide).unwrap();
        assert_eq!(json["slideNumber"], 3);
        assert_eq!(json["svgUrl"], "s");
        assert_eq!(json["thumbnailUrl"], "t");
        assert_eq!(json["vectorSource"], "fallback");
    }
}
