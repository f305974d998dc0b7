//! Asset references in expanded markup and stylesheets, and their resolution
//! against the files a package ships.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::css;
use crate::error::{Error, Result};
use crate::markup::{self, Node};
use crate::package::TemplateDescriptor;

/// Local references mapped to the package files they name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAssets {
    map: BTreeMap<String, PathBuf>,
}

impl ResolvedAssets {
    /// Path for a reference exactly as it was written in the document.
    pub fn get(&self, reference: &str) -> Option<&PathBuf> {
        self.map.get(reference)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PathBuf)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Local references of one document, split by where they were written.
/// Duplicates are kept; resolution deduplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    /// `src`/`href` attributes, inline styles and `<style>` blocks, in
    /// document order. Relative to the package folder.
    pub markup: Vec<String>,
    /// `url()` and `@import` targets of the stylesheet. Relative to the
    /// stylesheet's own folder.
    pub stylesheet: Vec<String>,
}

pub fn collect_references(nodes: &[Node], stylesheet: &str) -> References {
    let mut markup_refs = Vec::new();
    markup::walk(nodes, &mut |element| {
        if let Some(src) = element.attr("src") {
            markup_refs.push(src.to_string());
        }
        if element.tag == "link" {
            if let Some(href) = element.attr("href") {
                markup_refs.push(href.to_string());
            }
        }
        if let Some(style) = element.inline_style() {
            markup_refs.extend(css::url_references(style));
        }
        if element.tag == "style" {
            markup_refs.extend(css::url_references(&element.text_content()));
        }
    });
    References {
        markup: markup_refs,
        stylesheet: css::url_references(stylesheet),
    }
}

/// Whether a reference is left to the converter as-is.
pub fn is_external(reference: &str) -> bool {
    let r = reference.trim();
    if r.is_empty() || r.starts_with('#') || r.starts_with("//") {
        return true;
    }
    let lower = r.to_ascii_lowercase();
    ["data:", "http:", "https:", "mailto:", "tel:", "javascript:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Package-relative, `/`-separated form of a local reference. `None` when
/// the reference climbs out of the package.
pub fn normalize(reference: &str) -> Option<String> {
    let decoded = path_part(reference);
    let mut parts: Vec<&str> = Vec::new();
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// The decoded path of a reference, without scheme, query or fragment.
fn path_part(reference: &str) -> String {
    let mut r = reference.trim();
    if let Some(stripped) = r.strip_prefix("file://") {
        r = stripped;
    }
    let end = r.find(['?', '#']).unwrap_or(r.len());
    percent_decode(&r[..end])
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Resolve every local reference. Markup references name package files.
/// Stylesheet references do too while the package ships its own
/// stylesheet; under the configured default stylesheet they are relative to
/// that stylesheet's folder, like a browser would read them.
pub fn resolve(descriptor: &TemplateDescriptor, references: &References) -> Result<ResolvedAssets> {
    let mut resolved = ResolvedAssets::default();
    let shared_dir = match descriptor.style_relative() {
        Some(_) => None,
        None => descriptor.style_path().parent(),
    };

    let markup = references.markup.iter().map(|r| (r, None));
    let stylesheet = references.stylesheet.iter().map(|r| (r, shared_dir));
    for (reference, dir) in markup.chain(stylesheet) {
        if is_external(reference) || resolved.map.contains_key(reference) {
            continue;
        }
        let path = match dir {
            Some(dir) => beside(dir, reference),
            None => in_package(descriptor, reference),
        };
        match path {
            Some(path) => {
                resolved.map.insert(reference.clone(), path);
            }
            None => {
                return Err(Error::AssetNotFound {
                    template: descriptor.name().to_string(),
                    reference: reference.clone(),
                })
            }
        }
    }
    Ok(resolved)
}

fn in_package(descriptor: &TemplateDescriptor, reference: &str) -> Option<PathBuf> {
    let relative = normalize(reference)?;
    if let Some(path) = descriptor.asset_paths().get(&relative) {
        return Some(path.clone());
    }
    (descriptor.style_relative() == Some(relative.as_str())).then(|| descriptor.style_path().to_path_buf())
}

/// An existing file named by `reference` relative to `dir`. `..` may leave
/// `dir`: the default stylesheet is trusted configuration.
fn beside(dir: &Path, reference: &str) -> Option<PathBuf> {
    let decoded = path_part(reference);
    let relative = decoded.trim_start_matches(['/', '\\']);
    if relative.is_empty() {
        return None;
    }
    let path = dir.join(relative);
    path.is_file().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_from_markup_and_stylesheet() {
        let nodes = markup::parse(
            r#"<link rel="stylesheet" href="extra.css"><img src="img/logo.png">
            <div style="background: url('bg.png')"></div>
            <style>.x { background: url(inline.png) }</style>
            <a href="page.html">not an asset</a>"#,
        )
        .unwrap();
        let refs = collect_references(&nodes, "@import \"base.css\"; .f { src: url(../fonts/a.ttf) }");
        assert_eq!(refs.markup, vec!["extra.css", "img/logo.png", "bg.png", "inline.png"]);
        assert_eq!(refs.stylesheet, vec!["base.css", "../fonts/a.ttf"]);
    }

    #[test]
    fn beside_allows_parent_folders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("css")).unwrap();
        std::fs::create_dir_all(dir.path().join("fonts")).unwrap();
        std::fs::write(dir.path().join("fonts/sen.woff2"), b"font").unwrap();

        let css_dir = dir.path().join("css");
        let found = beside(&css_dir, "../fonts/sen.woff2?v=1").unwrap();
        assert!(found.ends_with("fonts/sen.woff2"));
        assert_eq!(beside(&css_dir, "../fonts/missing.woff2"), None);
        assert_eq!(beside(&css_dir, "../fonts"), None);
    }

    #[test]
    fn external_references_are_skipped() {
        for r in [
            "https://cdn.example.com/a.css",
            "//cdn.example.com/a.png",
            "data:image/png;base64,AAAA",
            "mailto:someone@example.com",
            "#top",
            "",
        ] {
            assert!(is_external(r), "{r}");
        }
        assert!(!is_external("img/logo.png"));
        assert!(!is_external("file:///logo.png"));
    }

    #[test]
    fn normalize_handles_dots_and_queries() {
        assert_eq!(normalize("./img/../img/logo.png?v=2").as_deref(), Some("img/logo.png"));
        assert_eq!(normalize("/fonts/a%20b.ttf#x").as_deref(), Some("fonts/a b.ttf"));
        assert_eq!(normalize("../secret.txt"), None);
        assert_eq!(normalize("a/../../b"), None);
    }

    #[test]
    fn percent_decode_leaves_malformed_sequences() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%41"), "A");
    }
}
