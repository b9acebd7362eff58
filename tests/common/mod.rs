//! Shared helpers: decks built in-process with `zip::ZipWriter`, and a fake
//! `soffice` script for exercising the engine path.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::ZipWriter;

const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// 16:9 at 96 DPI → 1280x720 px.
pub const WIDE_CX: i64 = 12_192_000;
pub const WIDE_CY: i64 = 6_858_000;

struct SlidePlan {
    shapes: Vec<String>,
    /// (rId, relationship kind, target relative to the slide)
    rels: Vec<(String, String, String)>,
    /// Raw `p:bg` element.
    background: Option<String>,
}

/// Builds a minimal but well-formed `.pptx`.
pub struct DeckBuilder {
    cx: i64,
    cy: i64,
    slides: Vec<SlidePlan>,
    media: Vec<(String, Vec<u8>)>,
    parts: Vec<(String, String)>,
}

impl Default for DeckBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeckBuilder {
    pub fn new() -> Self {
        Self {
            cx: WIDE_CX,
            cy: WIDE_CY,
            slides: Vec::new(),
            media: Vec::new(),
            parts: Vec::new(),
        }
    }

    pub fn size(mut self, cx: i64, cy: i64) -> Self {
        self.cx = cx;
        self.cy = cy;
        self
    }

    /// Add a slide whose `spTree` holds `shapes`.
    pub fn slide(mut self, shapes: &[String]) -> Self {
        self.slides.push(SlidePlan {
            shapes: shapes.to_vec(),
            rels: Vec::new(),
            background: None,
        });
        self
    }

    /// Add a slide with a solid background colour (`RRGGBB`).
    pub fn slide_with_background(mut self, rgb: &str, shapes: &[String]) -> Self {
        self.slides.push(SlidePlan {
            shapes: shapes.to_vec(),
            rels: Vec::new(),
            background: Some(format!(
                r#"<p:bg><p:bgPr><a:solidFill><a:srgbClr val="{rgb}"/></a:solidFill></p:bgPr></p:bg>"#
            )),
        });
        self
    }

    /// Add a slide with one picture referencing `ppt/media/{media_name}` as `rId2`.
    /// The media part itself is only present if added with [`Self::media`].
    pub fn slide_with_picture(mut self, media_name: &str) -> Self {
        self.slides.push(SlidePlan {
            shapes: vec![picture(4, "rId2", 914_400, 914_400, 3_657_600, 2_743_200)],
            rels: vec![(
                "rId2".to_string(),
                "image".to_string(),
                format!("../media/{media_name}"),
            )],
            background: None,
        });
        self
    }

    /// Add a slide with a raw `p:bg` element (or none), its shapes and its
    /// relationships as `(rId, kind, target)`, e.g. `("rId1", "slideLayout",
    /// "../slideLayouts/slideLayout1.xml")`.
    pub fn slide_with_parts(
        mut self,
        background: Option<&str>,
        shapes: &[String],
        rels: &[(&str, &str, &str)],
    ) -> Self {
        self.slides.push(SlidePlan {
            shapes: shapes.to_vec(),
            rels: rels
                .iter()
                .map(|(id, kind, target)| (id.to_string(), kind.to_string(), target.to_string()))
                .collect(),
            background: background.map(str::to_string),
        });
        self
    }

    /// Add an arbitrary XML part (theme, layout, master, their rels).
    pub fn part(mut self, name: &str, body: &str) -> Self {
        self.parts.push((name.to_string(), body.to_string()));
        self
    }

    pub fn media(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.media.push((name.to_string(), bytes));
        self
    }

    /// `n` slides each holding one titled text box.
    pub fn with_text_slides(mut self, n: usize) -> Self {
        for i in 1..=n {
            self = self.slide(&[text_box(2, &format!("Slide {i} title"), 457_200, 274_638, 8_229_600, 1_143_000)]);
        }
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = FileOptions::default();
        let mut put = |name: &str, body: &[u8]| {
            zip.start_file(name, opts).unwrap();
            zip.write_all(body).unwrap();
        };

        put("[Content_Types].xml", content_types().as_bytes());

        let mut ids = String::new();
        let mut rels = String::new();
        for i in 1..=self.slides.len() {
            ids.push_str(&format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 255 + i, i + 1));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="{REL_BASE}/slide" Target="slides/slide{}.xml"/>"#,
                i + 1,
                i
            ));
        }
        put(
            "ppt/presentation.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation {NS}><p:sldIdLst>{ids}</p:sldIdLst><p:sldSz cx="{}" cy="{}"/></p:presentation>"#,
                self.cx, self.cy
            )
            .as_bytes(),
        );
        put(
            "ppt/_rels/presentation.xml.rels",
            format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{REL_NS}">{rels}</Relationships>"#)
                .as_bytes(),
        );

        for (i, slide) in self.slides.iter().enumerate() {
            let n = i + 1;
            let bg = slide.background.clone().unwrap_or_default();
            put(
                &format!("ppt/slides/slide{n}.xml"),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld {NS}><p:cSld>{bg}<p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}</p:spTree></p:cSld></p:sld>"#,
                    slide.shapes.concat()
                )
                .as_bytes(),
            );
            if !slide.rels.is_empty() {
                let rels: String = slide
                    .rels
                    .iter()
                    .map(|(id, kind, target)| {
                        format!(r#"<Relationship Id="{id}" Type="{REL_BASE}/{kind}" Target="{target}"/>"#)
                    })
                    .collect();
                put(
                    &format!("ppt/slides/_rels/slide{n}.xml.rels"),
                    format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{REL_NS}">{rels}</Relationships>"#)
                        .as_bytes(),
                );
            }
        }

        for (name, bytes) in &self.media {
            put(&format!("ppt/media/{name}"), bytes);
        }
        for (name, body) in &self.parts {
            put(name, body.as_bytes());
        }

        zip.finish().unwrap().into_inner()
    }

    /// Write the deck to `dir/name` and return its path.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

fn content_types() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="png" ContentType="image/png"/></Types>"#
        .to_string()
}

/// A text box with one run.
pub fn text_box(id: u32, text: &str, x: i64, y: i64, cx: i64, cy: i64) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="TextBox {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm></p:spPr><p:txBody><a:bodyPr/><a:p><a:r><a:rPr lang="en-US" sz="2400" b="1"/><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp>"#
    )
}

/// A part wrapped in an XML declaration with the DrawingML/PresentationML
/// namespaces bound, e.g. `xml_part("p:sldLayout", "<p:cSld>…</p:cSld>")`.
pub fn xml_part(root: &str, inner: &str) -> String {
    format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><{root} {NS}>{inner}</{root}>"#)
}

/// A relationships part.
pub fn rels_part(rels: &[(&str, &str, &str)]) -> String {
    let body: String = rels
        .iter()
        .map(|(id, kind, target)| {
            format!(r#"<Relationship Id="{id}" Type="{REL_BASE}/{kind}" Target="{target}"/>"#)
        })
        .collect();
    format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{REL_NS}">{body}</Relationships>"#)
}

/// A `p:spTree` holding `shapes`.
pub fn sp_tree(shapes: &[String]) -> String {
    format!(
        r#"<p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}</p:spTree></p:cSld>"#,
        shapes.concat()
    )
}

/// A placeholder shape. `xfrm` is `Some((x, y, cx, cy))` for a shape that
/// carries its own transform, `None` for one that inherits it.
pub fn placeholder(id: u32, ph: &str, xfrm: Option<(i64, i64, i64, i64)>, text: &str) -> String {
    let sp_pr = match xfrm {
        Some((x, y, cx, cy)) => format!(
            r#"<p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm></p:spPr>"#
        ),
        None => "<p:spPr/>".to_string(),
    };
    let body = if text.is_empty() {
        String::new()
    } else {
        format!(r#"<p:txBody><a:bodyPr/><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody>"#)
    };
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Placeholder {id}"/><p:cNvSpPr/><p:nvPr>{ph}</p:nvPr></p:nvSpPr>{sp_pr}{body}</p:sp>"#
    )
}

/// A text box whose body is given as raw `a:p` elements.
pub fn text_box_with_paragraphs(id: u32, paragraphs: &str) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="TextBox {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="6096000" cy="3429000"/></a:xfrm></p:spPr><p:txBody><a:bodyPr/>{paragraphs}</p:txBody></p:sp>"#
    )
}

/// A table graphic frame at `(x, y)`. `grid` holds column widths and `rows`
/// holds `(height, cells)` where each cell is raw `a:tc` markup.
pub fn table(id: u32, x: i64, y: i64, grid: &[i64], rows: &[(i64, Vec<String>)]) -> String {
    let cols: String = grid.iter().map(|w| format!(r#"<a:gridCol w="{w}"/>"#)).collect();
    let trs: String = rows
        .iter()
        .map(|(h, cells)| format!(r#"<a:tr h="{h}">{}</a:tr>"#, cells.concat()))
        .collect();
    let cx: i64 = grid.iter().sum();
    let cy: i64 = rows.iter().map(|(h, _)| h).sum();
    format!(
        r#"<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="{id}" name="Table {id}"/><p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr><p:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></p:xfrm><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/table"><a:tbl><a:tblGrid>{cols}</a:tblGrid>{trs}</a:tbl></a:graphicData></a:graphic></p:graphicFrame>"#
    )
}

/// An `a:tc` with `attrs` (e.g. `gridSpan="2"`) and optional text.
pub fn cell(attrs: &str, text: &str) -> String {
    let para = if text.is_empty() {
        "<a:p/>".to_string()
    } else {
        format!("<a:p><a:r><a:t>{text}</a:t></a:r></a:p>")
    };
    format!(r#"<a:tc {attrs}><a:txBody><a:bodyPr/>{para}</a:txBody><a:tcPr/></a:tc>"#)
}

/// A theme part with the given `(slot, RRGGBB)` colours.
pub fn theme(colors: &[(&str, &str)]) -> String {
    let slots: String = colors
        .iter()
        .map(|(slot, rgb)| format!(r#"<a:{slot}><a:srgbClr val="{rgb}"/></a:{slot}>"#))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Test"><a:themeElements><a:clrScheme name="Test">{slots}</a:clrScheme></a:themeElements></a:theme>"#
    )
}

/// A shape with no transform anywhere; extraction skips it.
pub fn shape_without_geometry(id: u32) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Floating {id}"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/></p:sp>"#
    )
}

pub fn picture(id: u32, rid: &str, x: i64, y: i64, cx: i64, cy: i64) -> String {
    format!(
        r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="Picture {id}"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="{rid}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"/></p:spPr></p:pic>"#
    )
}

/// A small solid PNG.
pub fn png(w: u32, h: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(w, h, image::Rgba([0, 128, 255, 255])))
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// A fake `soffice` that writes `count` SVG files into its `--outdir`.
#[cfg(unix)]
pub fn fake_engine(dir: &Path, count: usize) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let script = format!(
        r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--outdir" ]; then out="$2"; fi
  shift
done
i=1
while [ $i -le {count} ]; do
  printf '<svg xmlns="http://www.w3.org/2000/svg" data-page="%s"/>' "$i" > "$out/deck-$i.svg"
  i=$((i + 1))
done
"#
    );
    let path = dir.join("fake-soffice");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A fake `soffice` that never finishes.
#[cfg(unix)]
pub fn hanging_engine(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("hanging-soffice");
    std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
