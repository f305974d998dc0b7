//! Layout engine – builds a Taffy flexbox/grid tree from the element tree,
//! then flattens the computed boxes into unbreakable bands and splits those
//! bands across pages.
//!
//! Text is wrapped while the tree is built, against the width its parent is
//! expected to give it, so every text leaf has a fixed size when Taffy runs.
//! A band is one line of text, one image, one rule, or one box that must not
//! split (a table row, a flex row, a list item, a box with a background or
//! border) as long as it fits on a page.

use std::collections::HashMap;

use taffy::prelude::*;
use taffy::TaffyError;

use crate::config::PageConfig;
use crate::css::{self, ComputedStyle, Stylesheet, TextAlign};
use crate::fonts::{FontBook, FontKey};
use crate::markup::{Element, Node};

/// Pixel dimensions of the images the converter could decode, keyed by the
/// `src` attribute as written.
pub type ImageSizes = HashMap<String, (u32, u32)>;

/// Horizontal indent of list items.
const LIST_INDENT: f32 = 16.0;
/// CSS pixels to points.
const PX_TO_PT: f32 = 0.75;
const RULE_COLOR: [f32; 3] = [0.6, 0.6, 0.6];
const ROW_RULE_COLOR: [f32; 3] = [0.75, 0.75, 0.75];

/// Something drawn on a page. Coordinates are points from the top-left
/// corner: relative to the band top while laying out, page-absolute after
/// [`paginate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Text {
        x: f32,
        baseline: f32,
        font_size: f32,
        bold: bool,
        italic: bool,
        color: [f32; 3],
        /// Embedded face, `None` for the builtin fonts.
        face: Option<FontKey>,
        text: String,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        src: String,
    },
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
        thickness: f32,
        color: [f32; 3],
    },
    /// A box background and/or border.
    Frame {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        fill: Option<[f32; 3]>,
        /// Colour and width.
        stroke: Option<([f32; 3], f32)>,
    },
}

impl Item {
    fn shift(&mut self, dy: f32) {
        match self {
            Item::Text { baseline, .. } => *baseline += dy,
            Item::Image { y, .. } | Item::Rule { y, .. } | Item::Frame { y, .. } => *y += dy,
        }
    }
}

/// An unbreakable slice of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    /// Top edge in document space.
    pub y: f32,
    pub height: f32,
    pub items: Vec<Item>,
    /// Start a new page before this band.
    pub break_before: bool,
}

/// One output page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
}

// ---------------------------------------------------------------------------
// Inline text
// ---------------------------------------------------------------------------

/// Font properties shared by a run of words.
#[derive(Debug, Clone, PartialEq)]
struct TextFormat {
    font_size: f32,
    bold: bool,
    italic: bool,
    color: [f32; 3],
    face: Option<FontKey>,
    line_height: f32,
}

enum Piece {
    Word {
        text: String,
        format: TextFormat,
        /// Joins the previous word without a space.
        glued: bool,
    },
    Break,
}

/// Inline content waiting to be wrapped into a text leaf.
#[derive(Default)]
struct Paragraph {
    pieces: Vec<Piece>,
    /// Whether the last inline text ended in whitespace.
    space_pending: bool,
}

impl Paragraph {
    fn text(&mut self, text: &str, format: &TextFormat) {
        if text.is_empty() {
            return;
        }
        let mut glued = !text.starts_with(char::is_whitespace) && !self.space_pending;
        for word in text.split_whitespace() {
            self.pieces.push(Piece::Word {
                text: word.to_string(),
                format: format.clone(),
                glued,
            });
            glued = false;
        }
        self.space_pending = text.ends_with(char::is_whitespace);
    }

    fn line_break(&mut self) {
        self.pieces.push(Piece::Break);
        self.space_pending = false;
    }

    fn has_words(&self) -> bool {
        self.pieces.iter().any(|p| matches!(p, Piece::Word { .. }))
    }
}

struct TextLine {
    /// Offset from the top of the text leaf.
    top: f32,
    height: f32,
    /// Offset from the top of the line.
    baseline: f32,
    width: f32,
    runs: Vec<Run>,
}

struct Run {
    x: f32,
    text: String,
    format: TextFormat,
}

/// A word placed on the line being filled: x, text, format, glued.
type Placed<'p> = (f32, &'p str, &'p TextFormat, bool);

// ---------------------------------------------------------------------------
// Build the Taffy tree
// ---------------------------------------------------------------------------

enum Content {
    Lines(Vec<TextLine>),
    Image { src: String },
    Rule,
}

struct Marker {
    text: String,
    format: TextFormat,
    /// Offset from the item's left edge.
    dx: f32,
}

#[derive(Default)]
struct NodeInfo {
    content: Option<Content>,
    background: Option<[f32; 3]>,
    border: Option<([f32; 3], f32)>,
    /// Rule under the box, as table rows have.
    underline: Option<[f32; 3]>,
    marker: Option<Marker>,
    /// Kept on one page when it fits.
    atomic: bool,
    break_before: bool,
    break_after: bool,
}

impl NodeInfo {
    fn boxed(style: &ComputedStyle) -> Self {
        Self {
            background: style.background,
            border: (style.border_width > 0.0).then_some((style.border_color, style.border_width)),
            break_before: style.page_break_before,
            break_after: style.page_break_after,
            ..Default::default()
        }
    }

    fn keep_whole(&self) -> bool {
        self.atomic || self.marker.is_some() || self.background.is_some() || self.border.is_some()
    }
}

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    sheet: &'a Stylesheet,
    images: &'a ImageSizes,
    fonts: &'a FontBook,
    info: HashMap<NodeId, NodeInfo>,
}

type Built = Result<Option<NodeId>, TaffyError>;

impl<'a> LayoutBuilder<'a> {
    fn new(sheet: &'a Stylesheet, images: &'a ImageSizes, fonts: &'a FontBook) -> Self {
        let mut taffy = TaffyTree::new();
        // Sizes are points, not device pixels: keep them fractional.
        taffy.disable_rounding();
        Self {
            taffy,
            sheet,
            images,
            fonts,
            info: HashMap::new(),
        }
    }

    fn format(&self, style: &ComputedStyle) -> TextFormat {
        TextFormat {
            font_size: style.font_size,
            bold: style.bold,
            italic: style.italic,
            color: style.color,
            face: self
                .fonts
                .resolve(style.font_family.as_deref(), style.bold, style.italic)
                .cloned(),
            line_height: style.line_height,
        }
    }

    /// True when `element` and all of its visible descendants flow inline.
    fn is_inline(&self, element: &Element, style: &ComputedStyle) -> bool {
        style.display == css::Display::Inline
            && element.tag != "img"
            && element.children.iter().all(|child| match child {
                Node::Text(_) => true,
                Node::Element(e) => {
                    let s = self.sheet.style_for(e, style);
                    s.is_hidden() || self.is_inline(e, &s)
                }
            })
    }

    fn inline(&self, element: &Element, style: &ComputedStyle, para: &mut Paragraph) {
        if element.tag == "br" {
            para.line_break();
            return;
        }
        for child in &element.children {
            match child {
                Node::Text(text) => para.text(text, &self.format(style)),
                Node::Element(e) => {
                    let s = self.sheet.style_for(e, style);
                    if !s.is_hidden() {
                        self.inline(e, &s, para);
                    }
                }
            }
        }
    }

    /// Children of a block box: inline runs become text leaves between the
    /// block-level children.
    fn block_children(&mut self, children: &[Node], style: &ComputedStyle, width: f32) -> Result<Vec<NodeId>, TaffyError> {
        let mut nodes = Vec::new();
        let mut para = Paragraph::default();
        for child in children {
            match child {
                Node::Text(text) => para.text(text, &self.format(style)),
                Node::Element(e) => {
                    let s = self.sheet.style_for(e, style);
                    if s.is_hidden() {
                        continue;
                    }
                    if self.is_inline(e, &s) {
                        self.inline(e, &s, &mut para);
                        continue;
                    }
                    nodes.extend(self.paragraph(&mut para, style.align, width)?);
                    nodes.extend(self.element(e, &s, width)?);
                }
            }
        }
        nodes.extend(self.paragraph(&mut para, style.align, width)?);
        Ok(nodes)
    }

    /// Children of a flex or grid container: every element is an item, and
    /// loose text becomes an item of its own.
    fn item_children(&mut self, children: &[Node], style: &ComputedStyle, width: f32) -> Result<Vec<NodeId>, TaffyError> {
        let mut nodes = Vec::new();
        for child in children {
            match child {
                Node::Text(text) => {
                    let mut para = Paragraph::default();
                    para.text(text, &self.format(style));
                    nodes.extend(self.paragraph(&mut para, style.align, width)?);
                }
                Node::Element(e) => {
                    let s = self.sheet.style_for(e, style);
                    if !s.is_hidden() {
                        nodes.extend(self.element(e, &s, width)?);
                    }
                }
            }
        }
        Ok(nodes)
    }

    fn element(&mut self, element: &Element, style: &ComputedStyle, width: f32) -> Built {
        match element.tag.as_str() {
            "br" => Ok(None),
            "img" => self.image(element, style, width),
            "hr" => self.rule(style).map(Some),
            "table" => self.table(element, style, width).map(Some),
            "ul" | "ol" => self.list(element, style, width).map(Some),
            _ => self.container(element, style, width).map(Some),
        }
    }

    fn container(&mut self, element: &Element, style: &ComputedStyle, width: f32) -> Result<NodeId, TaffyError> {
        let inner = inner_width(style, width);
        let visible = element
            .children
            .iter()
            .filter(|c| matches!(c, Node::Element(e) if !self.sheet.style_for(e, style).is_hidden()))
            .count()
            .max(1) as f32;
        // Estimated width of one of `count` items sharing a row.
        let share = |count: f32| ((inner - style.gap * (count - 1.0)) / count).max(1.0);

        let children = match style.display {
            css::Display::Flex if style.flex_direction == css::FlexDirection::Row => {
                self.item_children(&element.children, style, share(visible))?
            }
            css::Display::Flex => self.item_children(&element.children, style, inner)?,
            css::Display::Grid => {
                let columns = style.grid_columns.max(1) as f32;
                self.item_children(&element.children, style, share(columns))?
            }
            _ => self.block_children(&element.children, style, inner)?,
        };

        let node = self.taffy.new_with_children(to_taffy(style), &children)?;
        let mut info = NodeInfo::boxed(style);
        info.atomic = match style.display {
            css::Display::Flex => style.flex_direction == css::FlexDirection::Row,
            css::Display::Grid => true,
            _ => false,
        };
        self.info.insert(node, info);
        Ok(node)
    }

    /// Wrap pending inline content into a fixed-size text leaf.
    fn paragraph(&mut self, para: &mut Paragraph, align: TextAlign, width: f32) -> Built {
        let pending = std::mem::take(para);
        if !pending.has_words() {
            return Ok(None);
        }
        let lines = self.break_lines(&pending.pieces, width, align);
        let height: f32 = lines.iter().map(|l| l.height).sum();
        let text_width = lines.iter().map(|l| l.width).fold(0.0f32, f32::max);
        let leaf_width = match align {
            TextAlign::Left => text_width,
            _ => width.max(text_width),
        };

        let node = self.taffy.new_leaf(Style {
            size: Size {
                width: Dimension::Length(leaf_width),
                height: Dimension::Length(height),
            },
            flex_shrink: 0.0,
            ..Default::default()
        })?;
        self.info.insert(
            node,
            NodeInfo {
                content: Some(Content::Lines(lines)),
                ..Default::default()
            },
        );
        Ok(Some(node))
    }

    fn break_lines(&self, pieces: &[Piece], width: f32, align: TextAlign) -> Vec<TextLine> {
        let mut lines = Vec::new();
        let mut line: Vec<Placed<'_>> = Vec::new();
        let mut x = 0.0f32;
        let mut top = 0.0f32;
        let mut last_format: Option<&TextFormat> = None;

        for piece in pieces {
            match piece {
                Piece::Break => {
                    let done = self.finish_line(&line, x, width, align, top, last_format);
                    top += done.height;
                    lines.push(done);
                    line.clear();
                    x = 0.0;
                }
                Piece::Word { text, format, glued } => {
                    last_format = Some(format);
                    let w = self.fonts.measure(text, format.font_size, format.face.as_ref(), format.bold);
                    let gap = if line.is_empty() || *glued {
                        0.0
                    } else {
                        self.fonts.measure(" ", format.font_size, format.face.as_ref(), false)
                    };
                    if !line.is_empty() && x + gap + w > width {
                        let done = self.finish_line(&line, x, width, align, top, last_format);
                        top += done.height;
                        lines.push(done);
                        line.clear();
                        line.push((0.0, text.as_str(), format, true));
                        x = w;
                    } else {
                        let glued = *glued || line.is_empty();
                        line.push((x + gap, text.as_str(), format, glued));
                        x += gap + w;
                    }
                }
            }
        }
        if !line.is_empty() {
            lines.push(self.finish_line(&line, x, width, align, top, last_format));
        }
        lines
    }

    /// Lay out one line. An empty line (from `<br>`) takes the height of the
    /// last format seen.
    fn finish_line(
        &self,
        line: &[Placed<'_>],
        line_width: f32,
        width: f32,
        align: TextAlign,
        top: f32,
        fallback: Option<&TextFormat>,
    ) -> TextLine {
        let formats: Vec<&TextFormat> = if line.is_empty() {
            fallback.into_iter().collect()
        } else {
            line.iter().map(|&(_, _, f, _)| f).collect()
        };
        let max_size = formats.iter().map(|f| f.font_size).fold(0.0f32, f32::max);
        let max_size = if max_size > 0.0 {
            max_size
        } else {
            ComputedStyle::default().font_size
        };
        let factor = formats.iter().map(|f| f.line_height).fold(0.0f32, f32::max);
        let factor = if factor > 0.0 {
            factor
        } else {
            ComputedStyle::default().line_height
        };
        let height = max_size * factor;
        let ascent = formats
            .iter()
            .map(|f| self.fonts.ascent(f.font_size, f.face.as_ref()))
            .fold(0.0f32, f32::max);
        let ascent = if ascent > 0.0 {
            ascent
        } else {
            self.fonts.ascent(max_size, None)
        };
        let baseline = (height - max_size) / 2.0 + ascent;
        let shift = match align {
            TextAlign::Left => 0.0,
            TextAlign::Center => ((width - line_width) / 2.0).max(0.0),
            TextAlign::Right => (width - line_width).max(0.0),
        };

        // Adjacent words with the same format become one run.
        let mut runs: Vec<Run> = Vec::new();
        for &(x, text, format, glued) in line {
            if let Some(run) = runs.last_mut() {
                if run.format == *format {
                    if !glued {
                        run.text.push(' ');
                    }
                    run.text.push_str(text);
                    continue;
                }
            }
            runs.push(Run {
                x: shift + x,
                text: text.to_string(),
                format: format.clone(),
            });
        }

        TextLine {
            top,
            height,
            baseline,
            width: line_width,
            runs,
        }
    }

    fn image(&mut self, element: &Element, style: &ComputedStyle, width: f32) -> Built {
        let Some(src) = element.attr("src") else {
            return Ok(None);
        };
        let Some(&(px_w, px_h)) = self.images.get(src) else {
            log::warn!("Skipping image '{}': not available", preview(src));
            return Ok(None);
        };
        let attr = |name: &str| {
            element
                .attr(name)
                .and_then(|v| v.trim().trim_end_matches("px").parse::<f32>().ok())
                .map(|v| v * PX_TO_PT)
        };
        let natural_w = px_w as f32 * PX_TO_PT;
        let natural_h = px_h as f32 * PX_TO_PT;
        let aspect = if px_w > 0 { natural_h / natural_w } else { 1.0 };
        let wanted_w = style.width.resolve(width).or_else(|| attr("width"));
        let wanted_h = style.height.resolve(width).or_else(|| attr("height"));
        let (mut w, mut h) = match (wanted_w, wanted_h) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, w * aspect),
            (None, Some(h)) => (if aspect > 0.0 { h / aspect } else { h }, h),
            (None, None) => (natural_w, natural_h),
        };
        if w > width {
            h *= width / w;
            w = width;
        }

        let node = self.taffy.new_leaf(Style {
            size: Size {
                width: Dimension::Length(w),
                height: Dimension::Length(h),
            },
            margin: Rect {
                top: LengthPercentageAuto::Length(style.margin.top),
                right: LengthPercentageAuto::Length(style.margin.right),
                bottom: LengthPercentageAuto::Length(style.margin.bottom.max(4.0)),
                left: LengthPercentageAuto::Length(style.margin.left),
            },
            flex_shrink: 0.0,
            ..Default::default()
        })?;
        let mut info = NodeInfo::boxed(style);
        info.content = Some(Content::Image { src: src.to_string() });
        self.info.insert(node, info);
        Ok(Some(node))
    }

    fn rule(&mut self, style: &ComputedStyle) -> Result<NodeId, TaffyError> {
        let node = self.taffy.new_leaf(Style {
            size: Size {
                width: Dimension::Percent(1.0),
                height: Dimension::Length(12.0),
            },
            margin: margin_rect(style),
            ..Default::default()
        })?;
        self.info.insert(
            node,
            NodeInfo {
                content: Some(Content::Rule),
                break_before: style.page_break_before,
                break_after: style.page_break_after,
                ..Default::default()
            },
        );
        Ok(node)
    }

    fn list(&mut self, list: &Element, style: &ComputedStyle, width: f32) -> Result<NodeId, TaffyError> {
        let inner = inner_width(style, width);
        let ordered = list.tag == "ol";
        let mut number = 0usize;
        let mut children = Vec::new();
        for child in &list.children {
            let Node::Element(item) = child else {
                continue;
            };
            let item_style = self.sheet.style_for(item, style);
            if item_style.is_hidden() {
                continue;
            }
            if item.tag != "li" {
                children.extend(self.element(item, &item_style, inner)?);
                continue;
            }
            number += 1;
            let marker = Marker {
                text: if ordered {
                    format!("{number}.")
                } else {
                    "\u{2022}".to_string()
                },
                format: TextFormat {
                    bold: false,
                    italic: false,
                    ..self.format(&item_style)
                },
                dx: item_style.padding.left + item_style.border_width + 2.0,
            };
            let mut indented = item_style;
            indented.padding.left += LIST_INDENT;
            let node = self.container(item, &indented, inner)?;
            if let Some(info) = self.info.get_mut(&node) {
                info.marker = Some(marker);
            }
            children.push(node);
        }

        let node = self.taffy.new_with_children(to_taffy(style), &children)?;
        self.info.insert(node, NodeInfo::boxed(style));
        Ok(node)
    }

    /// Tables are flex columns of flex rows whose cells share the width
    /// equally.
    fn table(&mut self, table: &Element, style: &ComputedStyle, width: f32) -> Result<NodeId, TaffyError> {
        let mut rows: Vec<(&Element, ComputedStyle)> = Vec::new();
        collect_rows(self.sheet, table, style, &mut rows);
        let columns = rows
            .iter()
            .map(|(row, _)| cells(row).count())
            .max()
            .unwrap_or(0)
            .max(1);
        let column_width = inner_width(style, width) / columns as f32;

        let mut row_nodes = Vec::with_capacity(rows.len());
        for (row, row_style) in &rows {
            let mut cell_nodes = Vec::new();
            for cell in cells(row) {
                let cell_style = self.sheet.style_for(cell, row_style);
                if cell_style.is_hidden() {
                    continue;
                }
                let inner = (column_width - cell_style.padding.horizontal() - 2.0 * cell_style.border_width).max(1.0);
                let content = self.block_children(&cell.children, &cell_style, inner)?;
                let mut ts = to_taffy(&cell_style);
                ts.flex_grow = 1.0;
                ts.flex_shrink = 1.0;
                ts.flex_basis = Dimension::Length(0.0);
                ts.size.width = Dimension::Auto;
                ts.min_size.width = Dimension::Length(0.0);
                let node = self.taffy.new_with_children(ts, &content)?;
                self.info.insert(node, NodeInfo::boxed(&cell_style));
                cell_nodes.push(node);
            }

            let mut ts = to_taffy(row_style);
            ts.flex_direction = taffy::FlexDirection::Row;
            ts.align_items = Some(taffy::AlignItems::Stretch);
            ts.size.width = Dimension::Percent(1.0);
            ts.min_size.width = Dimension::Length(0.0);
            let node = self.taffy.new_with_children(ts, &cell_nodes)?;
            let mut info = NodeInfo::boxed(row_style);
            info.atomic = true;
            info.underline = Some(ROW_RULE_COLOR);
            self.info.insert(node, info);
            row_nodes.push(node);
        }

        let node = self.taffy.new_with_children(to_taffy(style), &row_nodes)?;
        self.info.insert(node, NodeInfo::boxed(style));
        Ok(node)
    }
}

/// Width left for the children of a box given its containing width.
fn inner_width(style: &ComputedStyle, width: f32) -> f32 {
    let outer = style
        .width
        .resolve(width)
        .unwrap_or(width - style.margin.horizontal());
    let outer = match style.max_width.resolve(width) {
        Some(max) => outer.min(max),
        None => outer,
    };
    (outer - style.padding.horizontal() - 2.0 * style.border_width).max(1.0)
}

fn dimension(d: css::Dimension) -> Dimension {
    match d {
        css::Dimension::Auto => Dimension::Auto,
        css::Dimension::Pt(v) => Dimension::Length(v),
        css::Dimension::Percent(p) => Dimension::Percent(p / 100.0),
    }
}

fn margin_rect(s: &ComputedStyle) -> Rect<LengthPercentageAuto> {
    Rect {
        top: LengthPercentageAuto::Length(s.margin.top),
        right: LengthPercentageAuto::Length(s.margin.right),
        bottom: LengthPercentageAuto::Length(s.margin.bottom),
        left: LengthPercentageAuto::Length(s.margin.left),
    }
}

/// Block boxes become flex columns so their children stack vertically.
fn to_taffy(s: &ComputedStyle) -> Style {
    let mut ts = Style::default();
    match s.display {
        css::Display::Flex => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = match s.flex_direction {
                css::FlexDirection::Row => taffy::FlexDirection::Row,
                css::FlexDirection::Column => taffy::FlexDirection::Column,
            };
            ts.flex_wrap = if s.flex_wrap {
                taffy::FlexWrap::Wrap
            } else {
                taffy::FlexWrap::NoWrap
            };
            ts.justify_content = Some(match s.justify_content {
                css::JustifyContent::Start => taffy::JustifyContent::Start,
                css::JustifyContent::End => taffy::JustifyContent::End,
                css::JustifyContent::Center => taffy::JustifyContent::Center,
                css::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
                css::JustifyContent::SpaceAround => taffy::JustifyContent::SpaceAround,
                css::JustifyContent::SpaceEvenly => taffy::JustifyContent::SpaceEvenly,
            });
            ts.align_items = Some(match s.align_items {
                css::AlignItems::Start => taffy::AlignItems::Start,
                css::AlignItems::End => taffy::AlignItems::End,
                css::AlignItems::Center => taffy::AlignItems::Center,
                css::AlignItems::Stretch => taffy::AlignItems::Stretch,
            });
        }
        css::Display::Grid => {
            ts.display = taffy::Display::Grid;
            ts.grid_template_columns = vec![taffy::TrackSizingFunction::from_flex(1.0f32); s.grid_columns.max(1)];
        }
        css::Display::Block | css::Display::Inline | css::Display::None => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Column;
        }
    }
    ts.size = Size {
        width: dimension(s.width),
        height: dimension(s.height),
    };
    ts.max_size.width = dimension(s.max_width);
    ts.margin = margin_rect(s);
    ts.padding = Rect {
        top: LengthPercentage::Length(s.padding.top),
        right: LengthPercentage::Length(s.padding.right),
        bottom: LengthPercentage::Length(s.padding.bottom),
        left: LengthPercentage::Length(s.padding.left),
    };
    ts.border = Rect {
        top: LengthPercentage::Length(s.border_width),
        right: LengthPercentage::Length(s.border_width),
        bottom: LengthPercentage::Length(s.border_width),
        left: LengthPercentage::Length(s.border_width),
    };
    ts.gap = Size {
        width: LengthPercentage::Length(s.gap),
        height: LengthPercentage::Length(s.gap),
    };
    ts.flex_grow = s.flex_grow;
    ts.flex_shrink = s.flex_shrink;
    ts.flex_basis = dimension(s.flex_basis);
    ts
}

fn cells(row: &Element) -> impl Iterator<Item = &Element> {
    row.children.iter().filter_map(|n| match n {
        Node::Element(e) if e.tag == "td" || e.tag == "th" => Some(e),
        _ => None,
    })
}

/// Rows of a table in order, looking through `thead`/`tbody`/`tfoot`.
fn collect_rows<'e>(
    sheet: &Stylesheet,
    parent: &'e Element,
    style: &ComputedStyle,
    rows: &mut Vec<(&'e Element, ComputedStyle)>,
) {
    for child in &parent.children {
        let Node::Element(e) = child else {
            continue;
        };
        let child_style = sheet.style_for(e, style);
        if child_style.is_hidden() {
            continue;
        }
        match e.tag.as_str() {
            "tr" => rows.push((e, child_style)),
            "thead" | "tbody" | "tfoot" => collect_rows(sheet, e, &child_style, rows),
            _ => {}
        }
    }
}

fn preview(src: &str) -> &str {
    match src.char_indices().nth(60) {
        Some((i, _)) => &src[..i],
        None => src,
    }
}

// ---------------------------------------------------------------------------
// Flatten computed boxes into bands
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Bands {
    bands: Vec<Band>,
    pending_break: bool,
}

impl Bands {
    /// Add a band of document-space items, rebased on the band top.
    fn push(&mut self, y: f32, height: f32, mut items: Vec<Item>) {
        for item in &mut items {
            item.shift(-y);
        }
        self.bands.push(Band {
            y,
            height,
            items,
            break_before: std::mem::take(&mut self.pending_break),
        });
    }
}

impl LayoutBuilder<'_> {
    /// Split the subtree at `node` into bands. Boxes that must stay whole and
    /// fit in `limit` become one band; everything else is split at its
    /// children, and text at its lines.
    fn flatten(&self, node: NodeId, ox: f32, oy: f32, limit: f32, out: &mut Bands) -> Result<(), TaffyError> {
        let layout = self.taffy.layout(node)?;
        let (x, y) = (ox + layout.location.x, oy + layout.location.y);
        let height = layout.size.height;
        let info = self.info.get(&node);
        if info.is_some_and(|i| i.break_before) {
            out.pending_break = true;
        }
        let children = self.taffy.children(node)?;
        let keep_whole = info.is_some_and(NodeInfo::keep_whole);

        if let Some(Content::Lines(lines)) = info.and_then(|i| i.content.as_ref()) {
            for line in lines {
                let mut items = Vec::new();
                line_items(line, x, y, &mut items);
                out.push(y + line.top, line.height, items);
            }
        } else if children.is_empty() || (keep_whole && height <= limit) {
            let mut items = Vec::new();
            self.items(node, ox, oy, &mut items)?;
            out.push(y, height, items);
        } else {
            if keep_whole {
                log::debug!("Box of {height:.0}pt is taller than a page and is split");
            }
            if let Some(marker) = info.and_then(|i| i.marker.as_ref()) {
                let baseline = y + self.fonts.ascent(marker.format.font_size, marker.format.face.as_ref());
                out.push(y, 0.0, vec![marker_item(marker, x, baseline)]);
            }
            for child in children {
                self.flatten(child, x, y, limit, out)?;
            }
        }

        if info.is_some_and(|i| i.break_after) {
            out.pending_break = true;
        }
        Ok(())
    }

    /// Every item of the subtree at `node`, in document space.
    fn items(&self, node: NodeId, ox: f32, oy: f32, out: &mut Vec<Item>) -> Result<(), TaffyError> {
        let layout = self.taffy.layout(node)?;
        let (x, y) = (ox + layout.location.x, oy + layout.location.y);
        let (width, height) = (layout.size.width, layout.size.height);
        let info = self.info.get(&node);

        if let Some(info) = info {
            if info.background.is_some() || info.border.is_some() {
                out.push(Item::Frame {
                    x,
                    y,
                    width,
                    height,
                    fill: info.background,
                    stroke: info.border,
                });
            }
            match &info.content {
                Some(Content::Lines(lines)) => {
                    for line in lines {
                        line_items(line, x, y, out);
                    }
                }
                Some(Content::Image { src }) => out.push(Item::Image {
                    x,
                    y,
                    width,
                    height,
                    src: src.clone(),
                }),
                Some(Content::Rule) => out.push(Item::Rule {
                    x1: x,
                    x2: x + width,
                    y: y + height / 2.0,
                    thickness: 0.5,
                    color: RULE_COLOR,
                }),
                None => {}
            }
        }

        let start = out.len();
        for child in self.taffy.children(node)? {
            self.items(child, x, y, out)?;
        }

        if let Some(info) = info {
            if let Some(marker) = &info.marker {
                let baseline = out[start..]
                    .iter()
                    .find_map(|item| match item {
                        Item::Text { baseline, .. } => Some(*baseline),
                        _ => None,
                    })
                    .unwrap_or_else(|| y + self.fonts.ascent(marker.format.font_size, marker.format.face.as_ref()));
                out.push(marker_item(marker, x, baseline));
            }
            if let Some(color) = info.underline {
                out.push(Item::Rule {
                    x1: x,
                    x2: x + width,
                    y: y + height,
                    thickness: 0.5,
                    color,
                });
            }
        }
        Ok(())
    }
}

fn line_items(line: &TextLine, x: f32, y: f32, out: &mut Vec<Item>) {
    for run in &line.runs {
        out.push(Item::Text {
            x: x + run.x,
            baseline: y + line.top + line.baseline,
            font_size: run.format.font_size,
            bold: run.format.bold,
            italic: run.format.italic,
            color: run.format.color,
            face: run.format.face.clone(),
            text: run.text.clone(),
        });
    }
}

fn marker_item(marker: &Marker, x: f32, baseline: f32) -> Item {
    Item::Text {
        x: x + marker.dx,
        baseline,
        font_size: marker.format.font_size,
        bold: marker.format.bold,
        italic: marker.format.italic,
        color: marker.format.color,
        face: marker.format.face.clone(),
        text: marker.text.clone(),
    }
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Lay out `nodes` in the content box of `page`. Bands are ordered by their
/// top edge, which starts at zero; `x` values already include the left
/// margin.
pub fn flow(
    nodes: &[Node],
    sheet: &Stylesheet,
    images: &ImageSizes,
    fonts: &FontBook,
    page: &PageConfig,
) -> Result<Vec<Band>, TaffyError> {
    let width = page.content_width().max(1.0);
    let mut builder = LayoutBuilder::new(sheet, images, fonts);
    let children = builder.block_children(nodes, &ComputedStyle::default(), width)?;
    let root = builder.taffy.new_with_children(
        Style {
            display: taffy::Display::Flex,
            flex_direction: taffy::FlexDirection::Column,
            size: Size {
                width: Dimension::Length(width),
                height: Dimension::Auto,
            },
            ..Default::default()
        },
        &children,
    )?;
    builder.taffy.compute_layout(
        root,
        Size {
            width: AvailableSpace::Definite(width),
            height: AvailableSpace::MaxContent,
        },
    )?;

    let mut out = Bands::default();
    for child in children {
        builder.flatten(child, page.margin, 0.0, page.content_height(), &mut out)?;
    }
    let mut bands = out.bands;
    // Columns of a split flex row or grid interleave by height.
    bands.sort_by(|a, b| a.y.total_cmp(&b.y));
    Ok(bands)
}

/// Assign bands to pages. A band that does not fit in the remaining space,
/// or that asks for a page break, starts a new page; a band taller than a
/// whole page gets a page of its own. There is always at least one page.
pub fn paginate(bands: Vec<Band>, page: &PageConfig) -> Vec<Page> {
    let content_height = page.content_height();
    let mut pages = Vec::new();
    let mut current = Page::default();
    let mut page_start = 0.0f32;
    let mut used = false;

    for band in bands {
        let bottom = band.y - page_start + band.height;
        if used && (band.break_before || bottom > content_height) {
            pages.push(std::mem::take(&mut current));
            page_start = band.y;
        }
        used = true;
        let top = page.margin + (band.y - page_start);
        for mut item in band.items {
            item.shift(top);
            current.items.push(item);
        }
    }
    pages.push(current);
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::heuristic_width;
    use crate::markup;

    fn layout(html: &str, css: &str) -> Vec<Band> {
        let nodes = markup::parse(html).unwrap();
        let sheet = Stylesheet::parse(css).unwrap();
        flow(&nodes, &sheet, &ImageSizes::new(), &FontBook::default(), &PageConfig::default()).unwrap()
    }

    fn item_texts<'i>(items: impl IntoIterator<Item = &'i Item>) -> Vec<String> {
        items
            .into_iter()
            .filter_map(|i| match i {
                Item::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn texts(bands: &[Band]) -> Vec<String> {
        item_texts(bands.iter().flat_map(|b| &b.items))
    }

    fn text_x(bands: &[Band], wanted: &str) -> f32 {
        bands
            .iter()
            .flat_map(|b| &b.items)
            .find_map(|i| match i {
                Item::Text { x, text, .. } if text == wanted => Some(*x),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no text '{wanted}'"))
    }

    #[test]
    fn paragraphs_become_lines() {
        let bands = layout("<h1>Title</h1><p>Hello <b>bold</b>, world</p>", "");
        assert_eq!(texts(&bands), vec!["Title", "Hello", "bold", ", world"]);
        assert_eq!(bands.len(), 2);
        assert!(bands[1].y >= bands[0].y + bands[0].height);
    }

    #[test]
    fn long_text_wraps() {
        let words = "lorem ipsum ".repeat(80);
        let bands = layout(&format!("<p>{words}</p>"), "");
        assert!(bands.len() > 1, "expected wrapping");
        let page = PageConfig::default();
        for band in &bands {
            for item in &band.items {
                if let Item::Text { x, text, font_size, .. } = item {
                    assert!(x + heuristic_width(text, *font_size, false) <= page.margin + page.content_width() + 0.1);
                }
            }
        }
    }

    #[test]
    fn head_and_style_are_not_rendered() {
        let bands = layout(
            "<html><head><title>T</title><style>p { color: red }</style></head><body><p>x</p></body></html>",
            "",
        );
        assert_eq!(texts(&bands), vec!["x"]);
    }

    #[test]
    fn display_none_hides_subtree() {
        let bands = layout(r#"<p class="gone">secret <b>text</b></p><p>shown</p>"#, ".gone { display: none }");
        assert_eq!(texts(&bands), vec!["shown"]);
    }

    #[test]
    fn line_breaks_start_new_lines() {
        let bands = layout("<p>one<br>two</p>", "");
        assert_eq!(texts(&bands), vec!["one", "two"]);
        assert_eq!(bands.len(), 2);
    }

    #[test]
    fn list_items_get_markers() {
        let bands = layout("<ol><li>one</li><li>two</li></ol><ul><li>dot</li></ul>", "");
        assert_eq!(texts(&bands), vec!["one", "1.", "two", "2.", "dot", "\u{2022}"]);
        assert!(text_x(&bands, "1.") < text_x(&bands, "one"));
    }

    #[test]
    fn table_rows_are_single_bands() {
        let bands = layout(
            "<table><thead><tr><th>Item</th><th>Price</th></tr></thead><tbody><tr><td>Tea</td><td>3</td></tr></tbody></table>",
            "",
        );
        assert_eq!(bands.len(), 2);
        assert_eq!(texts(&bands[..1]), vec!["Item", "Price"]);
        assert!(text_x(&bands, "3") > text_x(&bands, "Tea"));
        assert!(bands[1]
            .items
            .iter()
            .any(|i| matches!(i, Item::Rule { color, .. } if *color == ROW_RULE_COLOR)));
    }

    #[test]
    fn flex_rows_place_items_side_by_side() {
        let bands = layout(
            r#"<div class="row"><div>Left</div><div>Right</div></div><p>below</p>"#,
            ".row { display: flex; justify-content: space-between }",
        );
        assert_eq!(bands.len(), 2, "the flex row is one band");
        let page = PageConfig::default();
        assert_eq!(text_x(&bands, "Left"), page.margin);
        assert!(text_x(&bands, "Right") > page.margin + page.content_width() / 2.0);
    }

    #[test]
    fn grid_columns_share_the_width() {
        let bands = layout(
            r#"<div class="grid"><span>a</span><span>b</span><span>c</span></div>"#,
            ".grid { display: grid; grid-template-columns: 1fr 1fr 1fr }",
        );
        let page = PageConfig::default();
        let third = page.content_width() / 3.0;
        assert!((text_x(&bands, "b") - (page.margin + third)).abs() < 0.5);
        assert!((text_x(&bands, "c") - (page.margin + 2.0 * third)).abs() < 0.5);
    }

    #[test]
    fn backgrounds_and_borders_become_frames() {
        let bands = layout(
            r#"<div class="box">boxed</div>"#,
            ".box { background: #eeeeee; border: 1pt solid #333333; padding: 6pt }",
        );
        assert_eq!(bands.len(), 1);
        match &bands[0].items[0] {
            Item::Frame { fill, stroke, height, .. } => {
                assert!(fill.is_some());
                assert_eq!(stroke.map(|(_, w)| w), Some(1.0));
                assert!(*height > 12.0);
            }
            other => panic!("expected frame first, got {other:?}"),
        }
        // Border and padding push the text in.
        assert_eq!(text_x(&bands, "boxed"), PageConfig::default().margin + 7.0);
    }

    #[test]
    fn boxes_taller_than_a_page_are_split() {
        let html = format!(r#"<div class="box">{}</div>"#, "<p>line</p>".repeat(200));
        let bands = layout(&html, ".box { background: #eeeeee }");
        assert!(bands.len() >= 200);
        assert!(!bands
            .iter()
            .flat_map(|b| &b.items)
            .any(|i| matches!(i, Item::Frame { .. })));
    }

    #[test]
    fn page_breaks_are_honoured() {
        let bands = layout(
            r#"<p>first</p><h2 class="chapter">second</h2><p>third</p>"#,
            ".chapter { page-break-before: always }",
        );
        let pages = paginate(bands, &PageConfig::default());
        assert_eq!(pages.len(), 2);
        assert_eq!(item_texts(&pages[0].items), vec!["first"]);
        assert_eq!(item_texts(&pages[1].items), vec!["second", "third"]);
    }

    #[test]
    fn missing_images_are_skipped() {
        let bands = layout(r#"<img src="nope.png"><p>after</p>"#, "");
        assert_eq!(texts(&bands), vec!["after"]);
    }

    #[test]
    fn known_images_keep_aspect_ratio() {
        let nodes = markup::parse(r#"<img src="logo.png" width="100">"#).unwrap();
        let mut images = ImageSizes::new();
        images.insert("logo.png".to_string(), (200, 50));
        let bands = flow(&nodes, &Stylesheet::default(), &images, &FontBook::default(), &PageConfig::default()).unwrap();
        match &bands[0].items[0] {
            Item::Image { width, height, .. } => {
                assert_eq!(*width, 75.0);
                assert_eq!(*height, 18.75);
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn pagination_moves_overflow_to_next_page() {
        let html = "<p>line</p>".repeat(200);
        let bands = layout(&html, "");
        let pages = paginate(bands, &PageConfig::default());
        assert!(pages.len() > 1);
        let page = PageConfig::default();
        for p in &pages {
            for item in &p.items {
                if let Item::Text { baseline, .. } = item {
                    assert!(*baseline >= page.margin);
                    assert!(*baseline <= page.effective_height() - page.margin);
                }
            }
        }
    }

    #[test]
    fn empty_document_has_one_page() {
        assert_eq!(paginate(Vec::new(), &PageConfig::default()).len(), 1);
    }
}
