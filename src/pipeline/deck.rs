//! Opening a `.pptx` archive: slide order, slide size, parts and theme.
//!
//! The archive is read once per job. Every part under `ppt/` that extraction
//! may need (slides, layouts, masters, relationships, media, theme) is kept
//! in memory so the per-slide work never touches the ZIP again and can run
//! on any blocking-pool thread.

use crate::error::Deck2SvgError;
use crate::output::DeckSummary;
use crate::pipeline::xml::{self, Element, XmlError};
use crate::units::{emu_to_px_u32, DEFAULT_SLIDE_HEIGHT_EMU, DEFAULT_SLIDE_WIDTH_EMU};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";
const FALLBACK_THEME_PART: &str = "ppt/theme/theme1.xml";

/// Upper bound on the uncompressed size of retained parts.
const MAX_EXPANDED_BYTES: u64 = 512 * 1024 * 1024;

/// A slide's location in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlidePart {
    /// 1-indexed position in the presentation's slide list.
    pub number: usize,
    /// e.g. `ppt/slides/slide3.xml`
    pub part_name: String,
}

/// One entry of a `.rels` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    /// Absolute part name for internal targets, the raw URI for external ones.
    pub target: String,
    pub external: bool,
}

/// The relationships of one source part, keyed by `Id`.
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    by_id: HashMap<String, Relationship>,
    order: Vec<String>,
}

impl Relationships {
    /// Parse a `.rels` document belonging to `source_part`.
    pub fn parse(rels_xml: &str, source_part: &str) -> Result<Self, XmlError> {
        let root = xml::parse(rels_xml)?;
        let mut rels = Relationships::default();
        for r in root.children_named("Relationship") {
            let (Some(id), Some(target)) = (r.attr("Id"), r.attr("Target")) else {
                continue;
            };
            let external = r.attr("TargetMode") == Some("External");
            let target = if external {
                target.to_string()
            } else {
                resolve_target(source_part, target)
            };
            rels.order.push(id.to_string());
            rels.by_id.insert(
                id.to_string(),
                Relationship {
                    id: id.to_string(),
                    rel_type: r.attr("Type").unwrap_or_default().to_string(),
                    target,
                    external,
                },
            );
        }
        Ok(rels)
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.by_id.get(id)
    }

    /// First relationship whose type URI ends with `/{kind}`, in document order.
    pub fn first_of_kind(&self, kind: &str) -> Option<&Relationship> {
        self.of_kind(kind).next()
    }

    /// Every relationship whose type URI ends with `/{kind}`, in document order.
    pub fn of_kind<'a, 'k>(&'a self, kind: &'k str) -> impl Iterator<Item = &'a Relationship> + 'k
    where
        'a: 'k,
    {
        self.order
            .iter()
            .filter_map(move |id| self.by_id.get(id))
            .filter(move |r| {
                r.rel_type
                    .rsplit('/')
                    .next()
                    .is_some_and(|last| last == kind)
            })
    }
}

/// Name of the `.rels` part describing `part_name`.
pub fn rels_part_name(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Resolve a relationship target against the directory of its source part.
///
/// `../media/image1.png` from `ppt/slides/slide1.xml` is `ppt/media/image1.png`;
/// targets starting with `/` are already package-absolute.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

// ── Theme ────────────────────────────────────────────────────────────────

/// Colour scheme and font scheme of the deck's theme.
#[derive(Debug, Clone)]
pub struct Theme {
    colors: HashMap<String, String>,
    major_font: Option<String>,
    minor_font: Option<String>,
}

impl Default for Theme {
    /// The stock Office colour scheme.
    fn default() -> Self {
        let colors = [
            ("dk1", "000000"),
            ("lt1", "FFFFFF"),
            ("dk2", "44546A"),
            ("lt2", "E7E6E6"),
            ("accent1", "4472C4"),
            ("accent2", "ED7D31"),
            ("accent3", "A5A5A5"),
            ("accent4", "FFC000"),
            ("accent5", "5B9BD5"),
            ("accent6", "70AD47"),
            ("hlink", "0563C1"),
            ("folHlink", "954F72"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            colors,
            major_font: None,
            minor_font: None,
        }
    }
}

impl Theme {
    /// Parse `a:theme`, keeping defaults for anything it leaves out.
    pub fn parse(theme_xml: &str) -> Result<Self, XmlError> {
        let root = xml::parse(theme_xml)?;
        let mut theme = Theme::default();

        if let Some(scheme) = root.find("clrScheme") {
            for slot in &scheme.children {
                let value = slot
                    .child("srgbClr")
                    .and_then(|c| c.attr("val"))
                    .or_else(|| slot.child("sysClr").and_then(|c| c.attr("lastClr")));
                if let Some(v) = value {
                    theme.colors.insert(slot.name.clone(), v.to_ascii_uppercase());
                }
            }
        }

        if let Some(fonts) = root.find("fontScheme") {
            let latin = |el: Option<&Element>| {
                el.and_then(|f| f.child("latin"))
                    .and_then(|l| l.attr("typeface"))
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
            };
            theme.major_font = latin(fonts.child("majorFont"));
            theme.minor_font = latin(fonts.child("minorFont"));
        }

        Ok(theme)
    }

    /// Resolve a `schemeClr/@val` to `RRGGBB`.
    ///
    /// Slide-level aliases map onto scheme slots: `bg1`→`lt1`, `tx1`→`dk1`,
    /// `bg2`→`lt2`, `tx2`→`dk2`.
    pub fn scheme_color(&self, name: &str) -> Option<&str> {
        let slot = match name {
            "bg1" => "lt1",
            "tx1" => "dk1",
            "bg2" => "lt2",
            "tx2" => "dk2",
            other => other,
        };
        self.colors.get(slot).map(String::as_str)
    }

    /// Resolve theme font references (`+mj-lt`, `+mn-lt`) to a typeface.
    pub fn font<'a>(&'a self, typeface: &'a str) -> Option<&'a str> {
        if typeface.starts_with("+mj") {
            self.major_font.as_deref()
        } else if typeface.starts_with("+mn") {
            self.minor_font.as_deref()
        } else {
            Some(typeface)
        }
    }
}

// ── Deck ─────────────────────────────────────────────────────────────────

/// An opened presentation.
#[derive(Debug, Clone)]
pub struct Deck {
    source: PathBuf,
    width_emu: i64,
    height_emu: i64,
    slides: Vec<SlidePart>,
    parts: HashMap<String, Vec<u8>>,
    theme: Theme,
}

impl Deck {
    /// Open a `.pptx` file.
    ///
    /// Structural problems (not a ZIP, no `presentation.xml`, a listed slide
    /// missing from the archive) are deck errors. Problems inside a slide's
    /// own XML surface later, from extraction of that slide.
    pub fn open(path: &Path) -> Result<Self, Deck2SvgError> {
        let file = File::open(path).map_err(|e| Deck2SvgError::CorruptDeck {
            path: path.to_path_buf(),
            detail: format!("cannot open: {e}"),
        })?;
        Self::from_reader(BufReader::new(file), path)
    }

    /// Open a deck from any seekable reader. `origin` is used in error messages.
    pub fn from_reader<R: Read + Seek>(reader: R, origin: &Path) -> Result<Self, Deck2SvgError> {
        let corrupt = |detail: String| Deck2SvgError::CorruptDeck {
            path: origin.to_path_buf(),
            detail,
        };

        let mut archive =
            ZipArchive::new(reader).map_err(|e| corrupt(format!("not a ZIP archive: {e}")))?;

        let mut parts = HashMap::new();
        let mut expanded: u64 = 0;
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| corrupt(format!("unreadable entry #{i}: {e}")))?;
            if entry.is_dir() || !is_retained_part(entry.name()) {
                continue;
            }
            expanded = expanded.saturating_add(entry.size());
            if expanded > MAX_EXPANDED_BYTES {
                return Err(corrupt(format!(
                    "parts expand beyond {MAX_EXPANDED_BYTES} bytes"
                )));
            }
            let name = entry.name().trim_start_matches('/').to_string();
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| corrupt(format!("cannot read '{name}': {e}")))?;
            parts.insert(name, data);
        }

        let presentation_xml = part_str(&parts, PRESENTATION_PART)
            .ok_or_else(|| corrupt(format!("'{PRESENTATION_PART}' is missing")))?;
        let presentation = xml::parse(presentation_xml)
            .map_err(|e| corrupt(format!("'{PRESENTATION_PART}': {e}")))?;

        let pres_rels = match part_str(&parts, PRESENTATION_RELS) {
            Some(text) => Relationships::parse(text, PRESENTATION_PART)
                .map_err(|e| corrupt(format!("'{PRESENTATION_RELS}': {e}")))?,
            None => return Err(corrupt(format!("'{PRESENTATION_RELS}' is missing"))),
        };

        let (width_emu, height_emu) = presentation
            .child("sldSz")
            .and_then(|sz| Some((sz.attr_i64("cx")?, sz.attr_i64("cy")?)))
            .filter(|(w, h)| *w > 0 && *h > 0)
            .unwrap_or((DEFAULT_SLIDE_WIDTH_EMU, DEFAULT_SLIDE_HEIGHT_EMU));

        let slide_names = slide_order(&presentation, &pres_rels);
        let mut slides = Vec::with_capacity(slide_names.len());
        for (idx, part_name) in slide_names.into_iter().enumerate() {
            if !parts.contains_key(&part_name) {
                return Err(corrupt(format!(
                    "slide {} refers to missing part '{part_name}'",
                    idx + 1
                )));
            }
            slides.push(SlidePart {
                number: idx + 1,
                part_name,
            });
        }

        if slides.is_empty() {
            return Err(Deck2SvgError::EmptyDeck {
                path: origin.to_path_buf(),
            });
        }

        let theme = load_theme(&parts, &pres_rels);

        debug!(
            slides = slides.len(),
            width_emu, height_emu, "Opened deck {}", origin.display()
        );

        Ok(Self {
            source: origin.to_path_buf(),
            width_emu,
            height_emu,
            slides,
            parts,
            theme,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    /// Slide by 1-indexed number.
    pub fn slide(&self, number: usize) -> Option<&SlidePart> {
        number.checked_sub(1).and_then(|i| self.slides.get(i))
    }

    /// Slide size in EMU.
    pub fn size_emu(&self) -> (i64, i64) {
        (self.width_emu, self.height_emu)
    }

    /// Slide size in pixels at 96 DPI.
    pub fn size_px(&self) -> (u32, u32) {
        (emu_to_px_u32(self.width_emu), emu_to_px_u32(self.height_emu))
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    /// Raw bytes of a part, by absolute part name.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    /// A part decoded as UTF-8; `None` when absent or not valid UTF-8.
    pub fn part_text(&self, name: &str) -> Option<&str> {
        part_str(&self.parts, name)
    }

    pub fn summary(&self) -> DeckSummary {
        let (width_px, height_px) = self.size_px();
        DeckSummary {
            slide_count: self.slide_count(),
            width_px,
            height_px,
            width_emu: self.width_emu,
            height_emu: self.height_emu,
        }
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn is_retained_part(name: &str) -> bool {
    let name = name.trim_start_matches('/');
    name.starts_with("ppt/")
        && (name.ends_with(".xml") || name.ends_with(".rels") || name.starts_with("ppt/media/"))
}

fn part_str<'a>(parts: &'a HashMap<String, Vec<u8>>, name: &str) -> Option<&'a str> {
    parts
        .get(name)
        .and_then(|bytes| std::str::from_utf8(strip_bom(bytes)).ok())
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

/// Slide part names in presentation order.
///
/// `p:sldIdLst` is authoritative. Decks without one fall back to the slide
/// relationships ordered by the number in their target name.
fn slide_order(presentation: &Element, rels: &Relationships) -> Vec<String> {
    let listed: Vec<String> = presentation
        .child("sldIdLst")
        .map(|list| {
            list.children_named("sldId")
                .filter_map(|s| s.ns_attr("id"))
                .filter_map(|rid| rels.get(rid))
                .filter(|r| !r.external)
                .map(|r| r.target.clone())
                .collect()
        })
        .unwrap_or_default();
    if !listed.is_empty() {
        return listed;
    }

    let mut by_rel: Vec<(Option<u64>, String)> = rels
        .of_kind("slide")
        .filter(|r| !r.external)
        .map(|r| (trailing_number(&r.target), r.target.clone()))
        .collect();
    by_rel.sort_by(|a, b| match (a.0, b.0) {
        (Some(na), Some(nb)) => na.cmp(&nb),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });
    by_rel.into_iter().map(|(_, name)| name).collect()
}

/// `ppt/slides/slide12.xml` → 12.
fn trailing_number(part_name: &str) -> Option<u64> {
    let stem = part_name.rsplit('/').next()?.split('.').next()?;
    let digits: String = stem
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

fn load_theme(parts: &HashMap<String, Vec<u8>>, pres_rels: &Relationships) -> Theme {
    let theme_part = pres_rels
        .first_of_kind("theme")
        .map(|r| r.target.clone())
        .filter(|t| parts.contains_key(t))
        .unwrap_or_else(|| FALLBACK_THEME_PART.to_string());

    match part_str(parts, &theme_part).map(Theme::parse) {
        Some(Ok(theme)) => theme,
        Some(Err(e)) => {
            warn!("Theme '{}' is malformed, using stock colours: {}", theme_part, e);
            Theme::default()
        }
        None => Theme::default(),
    }
}
