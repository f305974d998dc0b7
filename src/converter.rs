//! The markup-to-PDF conversion seam and its default implementation.

use std::fs;
use std::path::{Path, PathBuf};

use taffy::TaffyError;

use thiserror::Error;

use crate::assets::ResolvedAssets;
use crate::config::PageConfig;
use crate::css::{self, Stylesheet, StylesheetError};
use crate::fonts::FontBook;
use crate::layout;
use crate::markup::{self, MarkupError, Node};
use crate::render::{self, ImageStore};

/// Everything a converter needs to produce one document.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    /// Document title used when the markup has no `<title>`.
    pub title: String,
    /// Fully expanded markup.
    pub markup: String,
    /// The package stylesheet text.
    pub stylesheet: String,
    /// Local references in the markup and stylesheet, already resolved.
    pub assets: ResolvedAssets,
    pub page: PageConfig,
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("markup: {0}")]
    Markup(#[from] MarkupError),
    #[error("stylesheet{}: {source}", origin_suffix(.origin))]
    Stylesheet {
        origin: Option<String>,
        #[source]
        source: StylesheetError,
    },
    #[error("cannot read asset {}: {source}", .path.display())]
    Asset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("layout: {0}")]
    Layout(#[from] TaffyError),
}

fn origin_suffix(origin: &Option<String>) -> String {
    origin
        .as_deref()
        .map(|o| format!(" '{o}'"))
        .unwrap_or_default()
}

impl From<StylesheetError> for ConvertError {
    fn from(source: StylesheetError) -> Self {
        ConvertError::Stylesheet {
            origin: None,
            source,
        }
    }
}

/// Turns expanded markup plus a stylesheet into PDF bytes.
pub trait PdfConverter: Send + Sync {
    fn convert(&self, request: &ConvertRequest) -> Result<Vec<u8>, ConvertError>;
}

/// Built-in converter: markup scanner, CSS subset, flow layout, printpdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowConverter;

impl FlowConverter {
    pub fn new() -> Self {
        Self
    }

    /// Rules in cascade order: `@import`ed sheets, the package stylesheet,
    /// `<link rel="stylesheet">` targets, then `<style>` blocks.
    fn stylesheet(&self, request: &ConvertRequest, nodes: &[Node]) -> Result<Stylesheet, ConvertError> {
        let mut sheet = Stylesheet::default();
        for reference in css::url_references(&request.stylesheet) {
            if !reference.ends_with(".css") {
                continue;
            }
            if let Some(path) = request.assets.get(&reference) {
                sheet.extend(read_sheet(&reference, path)?);
            }
        }
        sheet.extend(Stylesheet::parse(&request.stylesheet)?);

        let mut linked = Vec::new();
        let mut blocks = Vec::new();
        markup::walk(nodes, &mut |element| match element.tag.as_str() {
            "link" if element.attr("rel").is_some_and(|r| r.eq_ignore_ascii_case("stylesheet")) => {
                if let Some(href) = element.attr("href") {
                    linked.push(href.to_string());
                }
            }
            "style" => blocks.push(element.text_content()),
            _ => {}
        });
        for href in linked {
            match request.assets.get(&href) {
                Some(path) => sheet.extend(read_sheet(&href, path)?),
                None => log::debug!("Stylesheet link '{href}' is not a package asset, ignored"),
            }
        }
        for block in blocks {
            sheet.extend(Stylesheet::parse(&block)?);
        }
        Ok(sheet)
    }
}

fn read_sheet(reference: &str, path: &Path) -> Result<Stylesheet, ConvertError> {
    let text = fs::read_to_string(path).map_err(|source| ConvertError::Asset {
        path: path.to_path_buf(),
        source,
    })?;
    Stylesheet::parse(&text).map_err(|source| ConvertError::Stylesheet {
        origin: Some(reference.to_string()),
        source,
    })
}

/// Text of the first `<title>` element, if any.
fn document_title(nodes: &[Node]) -> Option<String> {
    let mut title = None;
    markup::walk(nodes, &mut |element| {
        if title.is_none() && element.tag == "title" {
            let text = element.text_content().trim().to_string();
            if !text.is_empty() {
                title = Some(text);
            }
        }
    });
    title
}

impl PdfConverter for FlowConverter {
    fn convert(&self, request: &ConvertRequest) -> Result<Vec<u8>, ConvertError> {
        let nodes = markup::parse(&request.markup)?;
        let sheet = self.stylesheet(request, &nodes)?;
        let images = ImageStore::load(&nodes, &request.assets);
        let fonts = FontBook::from_stylesheet(&sheet, &request.assets);

        let bands = layout::flow(&nodes, &sheet, &images.sizes(), &fonts, &request.page)?;
        let pages = layout::paginate(bands, &request.page);
        log::debug!(
            "Laid out '{}' on {} page(s) with {} image(s) and {} embedded font(s)",
            request.title,
            pages.len(),
            images.len(),
            fonts.len()
        );

        let title = document_title(&nodes).unwrap_or_else(|| request.title.clone());
        Ok(render::render_pdf(&title, &request.page, &pages, &images, &fonts))
    }
}
