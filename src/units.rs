//! Unit conversion between OOXML measurements and output coordinates.
//!
//! OOXML stores lengths in English Metric Units (EMU) and font sizes in
//! hundredths of a point. Everything downstream of extraction works in
//! percentages of the slide (geometry) or CSS pixels at 96 DPI (rendering).

use serde::{Deserialize, Serialize};

/// EMU in one inch.
pub const EMU_PER_INCH: i64 = 914_400;

/// EMU in one CSS pixel (96 DPI).
pub const EMU_PER_PIXEL: i64 = 9_525;

/// EMU in one typographic point.
pub const EMU_PER_POINT: i64 = 12_700;

/// Default slide size when `p:sldSz` is absent: 10in × 7.5in.
pub const DEFAULT_SLIDE_WIDTH_EMU: i64 = 9_144_000;
pub const DEFAULT_SLIDE_HEIGHT_EMU: i64 = 6_858_000;

/// Convert an EMU length to fractional pixels.
pub fn emu_to_px(emu: i64) -> f64 {
    emu as f64 / EMU_PER_PIXEL as f64
}

/// Convert an EMU length to whole pixels, never below 1.
pub fn emu_to_px_u32(emu: i64) -> u32 {
    emu_to_px(emu).round().clamp(1.0, u32::MAX as f64) as u32
}

/// Convert an EMU length to points.
pub fn emu_to_pt(emu: i64) -> f64 {
    emu as f64 / EMU_PER_POINT as f64
}

/// Convert an OOXML `sz` attribute (hundredths of a point) to points.
pub fn hundredths_to_pt(sz: i64) -> f64 {
    sz as f64 / 100.0
}

/// Convert points to CSS pixels.
pub fn pt_to_px(pt: f64) -> f64 {
    pt * 96.0 / 72.0
}

/// `value` as a percentage of `total`. Returns 0 when `total` is not positive.
pub fn percent_of(value: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    value as f64 / total as f64 * 100.0
}

// ── Geometry ─────────────────────────────────────────────────────────────

/// Unit of a [`Geometry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryUnit {
    /// Percent of slide width (x, width) or height (y, height).
    #[default]
    Percentage,
    /// CSS pixels.
    Absolute,
}

/// A shape's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub unit: GeometryUnit,
}

impl Geometry {
    /// Build percentage geometry from EMU offsets and extents.
    ///
    /// Returns `None` when either extent or either slide dimension is not
    /// positive. Offsets outside the slide are clamped to `[0, 100]`.
    pub fn from_emu(
        off_x: i64,
        off_y: i64,
        cx: i64,
        cy: i64,
        slide_cx: i64,
        slide_cy: i64,
    ) -> Option<Self> {
        if cx <= 0 || cy <= 0 || slide_cx <= 0 || slide_cy <= 0 {
            return None;
        }
        Some(Self {
            x: percent_of(off_x, slide_cx).clamp(0.0, 100.0),
            y: percent_of(off_y, slide_cy).clamp(0.0, 100.0),
            width: percent_of(cx, slide_cx),
            height: percent_of(cy, slide_cy),
            unit: GeometryUnit::Percentage,
        })
    }

    /// Re-express this geometry in pixels of a `width_px` × `height_px` canvas.
    ///
    /// Absolute geometry is returned unchanged.
    pub fn to_absolute(self, width_px: f64, height_px: f64) -> Self {
        match self.unit {
            GeometryUnit::Absolute => self,
            GeometryUnit::Percentage => Self {
                x: self.x / 100.0 * width_px,
                y: self.y / 100.0 * height_px,
                width: self.width / 100.0 * width_px,
                height: self.height / 100.0 * height_px,
                unit: GeometryUnit::Absolute,
            },
        }
    }
}

// ── Alignment ────────────────────────────────────────────────────────────

/// Paragraph alignment (`a:pPr/@algn`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
    Distribute,
    ThaiDistribute,
}

impl HorizontalAlign {
    /// Map an `algn` attribute value; unknown or absent values are left-aligned.
    pub fn from_ooxml(value: Option<&str>) -> Self {
        match value {
            Some("ctr") => Self::Center,
            Some("r") => Self::Right,
            Some("just") | Some("justLow") => Self::Justify,
            Some("dist") => Self::Distribute,
            Some("thaiDist") => Self::ThaiDistribute,
            _ => Self::Left,
        }
    }
}

/// Text-body vertical anchor (`a:bodyPr/@anchor` and `@anchorCtr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAnchor {
    #[default]
    Top,
    Middle,
    Bottom,
    TopCentered,
    MiddleCentered,
    BottomCentered,
}

impl VerticalAnchor {
    /// Map `anchor` plus the `anchorCtr` flag; absent anchors are top.
    pub fn from_ooxml(anchor: Option<&str>, centered: bool) -> Self {
        match (anchor, centered) {
            (Some("ctr"), false) => Self::Middle,
            (Some("ctr"), true) => Self::MiddleCentered,
            (Some("b"), false) => Self::Bottom,
            (Some("b"), true) => Self::BottomCentered,
            (_, true) => Self::TopCentered,
            _ => Self::Top,
        }
    }

    /// Collapse the centred variants onto top / middle / bottom.
    pub fn vertical_band(self) -> Self {
        match self {
            Self::Top | Self::TopCentered => Self::Top,
            Self::Middle | Self::MiddleCentered => Self::Middle,
            Self::Bottom | Self::BottomCentered => Self::Bottom,
        }
    }
}
