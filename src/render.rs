//! PDF emission – writes paginated layout items with `printpdf` (v0.8
//! ops-based API).

use std::collections::{BTreeSet, HashMap};
use std::fs;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use printpdf::*;

use crate::assets::ResolvedAssets;
use crate::config::PageConfig;
use crate::fonts::{FontBook, FontKey};
use crate::layout::{ImageSizes, Item, Page};
use crate::markup::{self, Node};

/// Points to millimetres.
const PT_TO_MM: f32 = 0.352778;

/// Image bytes a document uses, with their pixel dimensions.
#[derive(Debug, Default)]
pub struct ImageStore {
    images: HashMap<String, LoadedImage>,
}

#[derive(Debug)]
struct LoadedImage {
    bytes: Vec<u8>,
    px_width: u32,
    px_height: u32,
}

impl ImageStore {
    /// Load every `<img>` source found in `nodes`. Sources come from the
    /// resolved package assets or from base64 data URIs; anything that
    /// cannot be read or decoded is skipped with a warning.
    pub fn load(nodes: &[Node], assets: &ResolvedAssets) -> Self {
        let mut srcs = BTreeSet::new();
        markup::walk(nodes, &mut |element| {
            if element.tag == "img" {
                if let Some(src) = element.attr("src") {
                    srcs.insert(src.to_string());
                }
            }
        });

        let mut store = Self::default();
        for src in srcs {
            let bytes = if src.trim_start().starts_with("data:") {
                parse_data_uri(&src)
            } else if let Some(path) = assets.get(&src) {
                fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))
            } else {
                Err("not a package asset or data URI".to_string())
            };
            let bytes = match bytes {
                Ok(b) => b,
                Err(e) => {
                    log::warn!("Skipping image '{}': {e}", preview(&src));
                    continue;
                }
            };

            // Decode with the `image` crate to obtain pixel dimensions.
            let decoded = match ::image::load_from_memory(&bytes) {
                Ok(img) => img,
                Err(e) => {
                    log::warn!("Skipping image '{}': decode error: {e}", preview(&src));
                    continue;
                }
            };
            store.images.insert(
                src,
                LoadedImage {
                    px_width: decoded.width(),
                    px_height: decoded.height(),
                    bytes,
                },
            );
        }
        store
    }

    pub fn sizes(&self) -> ImageSizes {
        self.images
            .iter()
            .map(|(src, img)| (src.clone(), (img.px_width, img.px_height)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

fn preview(src: &str) -> &str {
    match src.char_indices().nth(60) {
        Some((i, _)) => &src[..i],
        None => src,
    }
}

/// Write `pages` as a PDF document. Text set in a face from `fonts` is
/// embedded; everything else uses the builtin Helvetica family.
pub fn render_pdf(title: &str, page: &PageConfig, pages: &[Page], images: &ImageStore, fonts: &FontBook) -> Vec<u8> {
    let page_height = page.effective_height();
    let page_w = Mm(page.effective_width() * PT_TO_MM);
    let page_h = Mm(page_height * PT_TO_MM);

    let mut doc = PdfDocument::new(title);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();

    let mut font_ids: HashMap<&FontKey, FontId> = HashMap::new();
    for (key, bytes) in fonts.faces() {
        match ParsedFont::from_bytes(bytes, 0, &mut warnings) {
            Some(parsed) => {
                font_ids.insert(key, doc.add_font(&parsed));
            }
            None => log::warn!("Font '{}' cannot be embedded, using builtin fonts", key.family),
        }
    }

    // Register each image once as a reusable XObject.
    let mut xobjects: HashMap<&str, (XObjectId, u32, u32)> = HashMap::new();
    for (src, img) in &images.images {
        match RawImage::decode_from_bytes(&img.bytes, &mut warnings) {
            Ok(raw) => {
                let id = doc.add_image(&raw);
                xobjects.insert(src.as_str(), (id, img.px_width, img.px_height));
            }
            Err(e) => log::warn!("Skipping image '{}': PDF encode error: {e}", preview(src)),
        }
    }

    let resources = Resources {
        xobjects: &xobjects,
        fonts: &font_ids,
    };
    let mut pdf_pages = Vec::with_capacity(pages.len().max(1));
    for layout in pages {
        let mut ops = Vec::new();
        for item in &layout.items {
            render_item(&mut ops, item, page_height, &resources);
        }
        pdf_pages.push(PdfPage::new(page_w, page_h, ops));
    }
    if pdf_pages.is_empty() {
        pdf_pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    doc.with_pages(pdf_pages);
    doc.save(&PdfSaveOptions::default(), &mut Vec::new())
}

/// Document-wide objects items refer to.
struct Resources<'a> {
    xobjects: &'a HashMap<&'a str, (XObjectId, u32, u32)>,
    fonts: &'a HashMap<&'a FontKey, FontId>,
}

fn rgb(c: [f32; 3]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Emit the ops for one item. Layout coordinates grow downwards from the
/// top edge; PDF coordinates grow upwards from the bottom edge.
fn render_item(ops: &mut Vec<Op>, item: &Item, page_height: f32, resources: &Resources<'_>) {
    match item {
        Item::Text {
            x,
            baseline,
            font_size,
            bold,
            italic,
            color,
            face,
            text,
        } => {
            if text.is_empty() {
                return;
            }
            let embedded = face.as_ref().and_then(|key| resources.fonts.get(key));
            ops.push(Op::StartTextSection);
            ops.push(Op::SetTextCursor {
                pos: Point {
                    x: Pt(*x),
                    y: Pt(page_height - baseline),
                },
            });
            ops.push(Op::SetLineHeight {
                lh: Pt(font_size * 1.25),
            });
            ops.push(Op::SetFillColor { col: rgb(*color) });
            match embedded {
                Some(font) => {
                    ops.push(Op::SetFontSize {
                        size: Pt(*font_size),
                        font: font.clone(),
                    });
                    ops.push(Op::WriteText {
                        items: vec![TextItem::Text(text.clone())],
                        font: font.clone(),
                    });
                }
                None => {
                    let font = match (*bold, *italic) {
                        (true, true) => BuiltinFont::HelveticaBoldOblique,
                        (true, false) => BuiltinFont::HelveticaBold,
                        (false, true) => BuiltinFont::HelveticaOblique,
                        (false, false) => BuiltinFont::Helvetica,
                    };
                    ops.push(Op::SetFontSizeBuiltinFont {
                        size: Pt(*font_size),
                        font,
                    });
                    ops.push(Op::WriteTextBuiltinFont {
                        items: vec![TextItem::Text(to_ascii_fallback(text))],
                        font,
                    });
                }
            }
            ops.push(Op::EndTextSection);
        }
        Item::Rule {
            x1,
            x2,
            y,
            thickness,
            color,
        } => {
            let pdf_y = page_height - y;
            ops.push(Op::SetOutlineColor { col: rgb(*color) });
            ops.push(Op::SetOutlineThickness { pt: Pt(*thickness) });
            ops.push(Op::DrawLine {
                line: Line {
                    points: vec![point(*x1, pdf_y), point(*x2, pdf_y)],
                    is_closed: false,
                },
            });
        }
        Item::Frame {
            x,
            y,
            width,
            height,
            fill,
            stroke,
        } => {
            let (x1, x2) = (*x, x + width);
            let (y1, y2) = (page_height - y - height, page_height - y);
            let corners = vec![point(x1, y1), point(x2, y1), point(x2, y2), point(x1, y2)];
            ops.push(Op::SaveGraphicsState);
            if let Some(fill) = fill {
                ops.push(Op::SetFillColor { col: rgb(*fill) });
                ops.push(Op::DrawPolygon {
                    polygon: Polygon {
                        rings: vec![PolygonRing {
                            points: corners.clone(),
                        }],
                        mode: PaintMode::Fill,
                        winding_order: WindingOrder::NonZero,
                    },
                });
            }
            if let Some((color, width)) = stroke {
                ops.push(Op::SetOutlineColor { col: rgb(*color) });
                ops.push(Op::SetOutlineThickness { pt: Pt(*width) });
                ops.push(Op::DrawLine {
                    line: Line {
                        points: corners,
                        is_closed: true,
                    },
                });
            }
            ops.push(Op::RestoreGraphicsState);
        }
        Item::Image {
            x,
            y,
            width,
            height,
            src,
        } => {
            let Some((id, px_width, px_height)) = resources.xobjects.get(src.as_str()) else {
                return;
            };
            // At dpi=72 printpdf renders 1 px = 1 pt, so
            // scale = desired_pt / px_dim.
            let scale = |target: f32, px: u32| if px > 0 { target / px as f32 } else { 1.0 };
            ops.push(Op::UseXobject {
                id: id.clone(),
                transform: XObjectTransform {
                    translate_x: Some(Pt(*x)),
                    translate_y: Some(Pt(page_height - y - height)),
                    dpi: Some(72.0),
                    scale_x: Some(scale(*width, *px_width)),
                    scale_y: Some(scale(*height, *px_height)),
                    rotate: None,
                },
            });
        }
    }
}

/// Builtin fonts only cover ASCII reliably: transliterate common Latin
/// letters and punctuation, and replace anything else with `?`.
fn to_ascii_fallback(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let mapped = match c {
            c if c.is_ascii() => {
                out.push(c);
                continue;
            }
            '\u{00A0}' | '\u{2009}' | '\u{202F}' => " ",
            '\u{2018}' | '\u{2019}' | '\u{201A}' => "'",
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => "\"",
            '\u{2010}'..='\u{2015}' | '\u{2212}' => "-",
            '\u{2026}' => "...",
            '\u{2022}' | '\u{00B7}' => "*",
            '\u{20AC}' => "EUR",
            '\u{00A3}' => "GBP",
            '\u{00A9}' => "(c)",
            '\u{00AE}' => "(R)",
            '\u{2122}' => "TM",
            '\u{00B0}' => "deg",
            '\u{00D7}' => "x",
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "A",
            'è' | 'é' | 'ê' | 'ë' => "e",
            'È' | 'É' | 'Ê' | 'Ë' => "E",
            'ì' | 'í' | 'î' | 'ï' => "i",
            'Ì' | 'Í' | 'Î' | 'Ï' => "I",
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => "O",
            'ù' | 'ú' | 'û' | 'ü' => "u",
            'Ù' | 'Ú' | 'Û' | 'Ü' => "U",
            'ý' | 'ÿ' => "y",
            'Ý' => "Y",
            'ñ' => "n",
            'Ñ' => "N",
            'ç' => "c",
            'Ç' => "C",
            'ß' => "ss",
            'æ' => "ae",
            'Æ' => "AE",
            'œ' => "oe",
            'Œ' => "OE",
            _ => "?",
        };
        out.push_str(mapped);
    }
    out
}

/// Decode a `data:<mime>;base64,<data>` URI.
fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = src
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URI".to_string())?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| "data URI without ',' separator".to_string())?;
    if !header.contains(";base64") {
        return Err("only base64 data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(data.trim())
        .map_err(|e| format!("base64 decode error: {e}"))
}
