//! Font faces declared with `@font-face` and text measurement with
//! `ttf-parser`.
//!
//! Text whose family has no loaded face is set in the builtin Helvetica
//! family and measured with an average-advance heuristic.

use std::collections::HashMap;
use std::fmt;
use std::fs;

use crate::assets::ResolvedAssets;
use crate::css::Stylesheet;

/// Ascender of the builtin fonts as a fraction of the font size.
const BUILTIN_ASCENT: f32 = 0.75;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    /// Lowercased family name.
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
}

impl fmt::Debug for FontData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontData")
            .field("bytes", &self.bytes.len())
            .field("units_per_em", &self.units_per_em)
            .field("ascender", &self.ascender)
            .field("descender", &self.descender)
            .finish()
    }
}

/// The font faces a document loaded.
#[derive(Debug, Default)]
pub struct FontBook {
    fonts: HashMap<FontKey, FontData>,
}

impl FontBook {
    /// Load the TrueType/OpenType source of every `@font-face` in `sheet`
    /// from the resolved assets. Faces without such a source, or whose file
    /// does not parse, are skipped with a log line and fall back to the
    /// builtin fonts.
    pub fn from_stylesheet(sheet: &Stylesheet, assets: &ResolvedAssets) -> Self {
        let mut book = Self::default();
        for face in sheet.font_faces() {
            let source = face
                .sources
                .iter()
                .filter(|s| is_sfnt(s))
                .find_map(|s| assets.get(s).map(|path| (s, path)));
            let Some((source, path)) = source else {
                log::debug!(
                    "No TrueType/OpenType source for font family '{}', using builtin fonts",
                    face.family
                );
                continue;
            };
            let loaded = fs::read(path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))
                .and_then(|bytes| book.load_font(&face.family, face.bold, face.italic, bytes));
            if let Err(e) = loaded {
                log::warn!("Skipping font '{source}': {e}");
            }
        }
        book
    }

    /// Load a TTF/OTF font from bytes.
    pub fn load_font(&mut self, family: &str, bold: bool, italic: bool, bytes: Vec<u8>) -> Result<(), String> {
        let face = ttf_parser::Face::parse(&bytes, 0).map_err(|e| format!("failed to parse font: {e}"))?;
        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            bytes,
        };
        let key = FontKey {
            family: family.to_ascii_lowercase(),
            bold,
            italic,
        };
        log::debug!("Loaded font face {key:?}");
        self.fonts.insert(key, data);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// The loaded face closest to the requested one: the exact variant, then
    /// the same family dropping italic, then bold, then any face of the
    /// family. `None` means builtin fonts.
    pub fn resolve(&self, family: Option<&str>, bold: bool, italic: bool) -> Option<&FontKey> {
        let family = family?;
        let candidates = [(bold, italic), (bold, false), (false, italic), (false, false)];
        candidates
            .iter()
            .find_map(|&(bold, italic)| {
                self.fonts
                    .get_key_value(&FontKey {
                        family: family.to_string(),
                        bold,
                        italic,
                    })
                    .map(|(k, _)| k)
            })
            .or_else(|| self.fonts.keys().find(|k| k.family == family))
    }

    /// Width of `text` in points. Uses glyph advances when `face` is loaded,
    /// otherwise 0.5 × font size per character (bold about 10 % wider).
    pub fn measure(&self, text: &str, font_size: f32, face: Option<&FontKey>, bold: bool) -> f32 {
        let parsed = face
            .and_then(|key| self.fonts.get(key))
            .and_then(|data| ttf_parser::Face::parse(&data.bytes, 0).ok().map(|f| (f, data)));
        let Some((face, data)) = parsed else {
            return heuristic_width(text, font_size, bold);
        };
        let scale = font_size / data.units_per_em;
        text.chars()
            .map(|ch| match face.glyph_index(ch) {
                Some(gid) => face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale,
                None => font_size * 0.5,
            })
            .sum()
    }

    /// Ascender in points.
    pub fn ascent(&self, font_size: f32, face: Option<&FontKey>) -> f32 {
        match face.and_then(|key| self.fonts.get(key)) {
            Some(data) if data.units_per_em > 0.0 => data.ascender * font_size / data.units_per_em,
            _ => font_size * BUILTIN_ASCENT,
        }
    }

    /// Loaded faces with their bytes, for embedding.
    pub fn faces(&self) -> impl Iterator<Item = (&FontKey, &[u8])> {
        self.fonts.iter().map(|(k, d)| (k, d.bytes.as_slice()))
    }
}

pub fn heuristic_width(text: &str, font_size: f32, bold: bool) -> f32 {
    let avg = if bold { 0.55 } else { 0.5 };
    text.chars().count() as f32 * font_size * avg
}

/// Whether a font source can be parsed and embedded (not WOFF/WOFF2/EOT).
fn is_sfnt(source: &str) -> bool {
    let path = source.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
    path.ends_with(".ttf") || path.ends_with(".otf")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(book: &mut FontBook, family: &str, bold: bool, italic: bool) {
        book.fonts.insert(
            FontKey {
                family: family.to_string(),
                bold,
                italic,
            },
            FontData {
                bytes: Vec::new(),
                units_per_em: 1000.0,
                ascender: 800.0,
                descender: -200.0,
            },
        );
    }

    #[test]
    fn heuristic_text_width() {
        let book = FontBook::default();
        // 5 chars × 16 × 0.5 = 40
        assert!((book.measure("Hello", 16.0, None, false) - 40.0).abs() < 0.1);
        assert!(book.measure("Hello", 16.0, None, true) > 40.0);
        assert_eq!(book.ascent(10.0, None), 7.5);
    }

    #[test]
    fn rejects_bytes_that_are_not_a_font() {
        let mut book = FontBook::default();
        assert!(book.load_font("Sen", false, false, b"wOF2 not really".to_vec()).is_err());
        assert!(book.is_empty());
    }

    #[test]
    fn resolves_closest_variant() {
        let mut book = FontBook::default();
        synthetic(&mut book, "sen", false, false);
        synthetic(&mut book, "sen", true, false);

        let bold_italic = book.resolve(Some("sen"), true, true).unwrap();
        assert!(bold_italic.bold && !bold_italic.italic);
        let italic = book.resolve(Some("sen"), false, true).unwrap();
        assert!(!italic.bold);
        assert_eq!(book.resolve(Some("other"), false, false), None);
        assert_eq!(book.resolve(None, false, false), None);

        let key = italic.clone();
        assert_eq!(book.ascent(10.0, Some(&key)), 8.0);
    }

    #[test]
    fn only_sfnt_sources_are_loaded() {
        assert!(is_sfnt("fonts/Sen.ttf"));
        assert!(is_sfnt("fonts/Sen.OTF?v=2"));
        assert!(!is_sfnt("fonts/Sen.woff2"));
        assert!(!is_sfnt("fonts/ttf/readme"));
    }

    #[test]
    fn stylesheet_faces_without_files_are_skipped() {
        let sheet = Stylesheet::parse(
            "@font-face { font-family: Sen; src: url(fonts/Sen.woff2) }
             @font-face { font-family: Sen; src: url(fonts/Sen.ttf); font-weight: bold }",
        )
        .unwrap();
        let book = FontBook::from_stylesheet(&sheet, &ResolvedAssets::default());
        assert!(book.is_empty());
    }
}
