//! Stylesheet handling for the flow converter.
//!
//! Supports a small subset: rules with universal, type, class and
//! `type.class` selectors, `@font-face` blocks, and the text, box, flex and
//! grid properties [`ComputedStyle`] carries. Other at-rules are skipped.
//! Unknown selectors and properties are ignored; broken syntax (unbalanced
//! braces, unterminated comments, declarations without a colon) is an error
//! because the sheet cannot be applied as written.

use thiserror::Error;

use crate::markup::Element;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StylesheetError {
    #[error("unterminated comment at byte {0}")]
    UnterminatedComment(usize),
    #[error("unbalanced braces at byte {0}")]
    UnbalancedBraces(usize),
    #[error("declaration without ':' in rule '{selector}': '{declaration}'")]
    MissingColon {
        selector: String,
        declaration: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Universal,
    Tag(String),
    Class(String),
    TagClass(String, String),
}

impl Selector {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "*" {
            return Some(Selector::Universal);
        }
        let is_ident = |s: &str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        };
        match text.split_once('.') {
            None if is_ident(text) => Some(Selector::Tag(text.to_ascii_lowercase())),
            Some(("", class)) if is_ident(class) => Some(Selector::Class(class.to_string())),
            Some((tag, class)) if is_ident(tag) && is_ident(class) => Some(Selector::TagClass(
                tag.to_ascii_lowercase(),
                class.to_string(),
            )),
            _ => None,
        }
    }

    fn matches(&self, element: &Element) -> bool {
        match self {
            Selector::Universal => true,
            Selector::Tag(tag) => element.tag == *tag,
            Selector::Class(class) => element.classes().any(|c| c == class),
            Selector::TagClass(tag, class) => {
                element.tag == *tag && element.classes().any(|c| c == class)
            }
        }
    }

    fn has_class(&self) -> bool {
        matches!(self, Selector::Class(_) | Selector::TagClass(..))
    }
}

#[derive(Debug, Clone)]
struct Rule {
    selectors: Vec<Selector>,
    declarations: Vec<(String, String)>,
}

/// One `@font-face` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontFace {
    /// Lowercased family name.
    pub family: String,
    /// `url()` targets of `src`, in preference order.
    pub sources: Vec<String>,
    pub bold: bool,
    pub italic: bool,
}

impl FontFace {
    fn from_declarations(declarations: &[(String, String)]) -> Option<Self> {
        let mut family = None;
        let mut sources = Vec::new();
        let mut bold = false;
        let mut italic = false;
        for (prop, value) in declarations {
            match prop.as_str() {
                "font-family" => family = first_family(value),
                "src" => sources = url_references(value),
                "font-weight" => bold = is_bold(value),
                "font-style" => italic = is_italic(value),
                _ => {}
            }
        }
        let family = family?;
        if sources.is_empty() {
            log::debug!("Ignoring @font-face '{family}' without url() sources");
            return None;
        }
        Some(Self {
            family,
            sources,
            bold,
            italic,
        })
    }
}

/// A parsed stylesheet.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
    font_faces: Vec<FontFace>,
}

impl Stylesheet {
    pub fn parse(text: &str) -> Result<Self, StylesheetError> {
        let text = strip_comments(text)?;
        let mut sheet = Stylesheet::default();
        let mut rest = text.as_str();
        let mut offset = 0usize;

        loop {
            let trimmed = rest.trim_start();
            offset += rest.len() - trimmed.len();
            rest = trimmed;
            if rest.is_empty() {
                break;
            }
            if rest.starts_with('}') {
                return Err(StylesheetError::UnbalancedBraces(offset));
            }
            if rest.starts_with('@') {
                let consumed = skip_at_rule(rest).ok_or(StylesheetError::UnbalancedBraces(offset))?;
                let at_rule = &rest[..consumed];
                if at_rule.get(..10).is_some_and(|k| k.eq_ignore_ascii_case("@font-face")) {
                    if let (Some(open), Some(close)) = (at_rule.find('{'), at_rule.rfind('}')) {
                        let declarations = parse_declarations("@font-face", &at_rule[open + 1..close])?;
                        sheet.font_faces.extend(FontFace::from_declarations(&declarations));
                    }
                }
                offset += consumed;
                rest = &rest[consumed..];
                continue;
            }

            let open = rest
                .find('{')
                .ok_or(StylesheetError::UnbalancedBraces(offset))?;
            let prelude = &rest[..open];
            if prelude.contains('}') {
                return Err(StylesheetError::UnbalancedBraces(offset));
            }
            let body_len = rest[open + 1..]
                .find('}')
                .ok_or(StylesheetError::UnbalancedBraces(offset + open))?;
            let body = &rest[open + 1..open + 1 + body_len];
            if body.contains('{') {
                return Err(StylesheetError::UnbalancedBraces(offset + open));
            }

            let selector_text = prelude.trim();
            let declarations = parse_declarations(selector_text, body)?;

            let mut selectors = Vec::new();
            for part in selector_text.split(',') {
                match Selector::parse(part) {
                    Some(sel) => selectors.push(sel),
                    None => log::debug!("Ignoring unsupported selector '{}'", part.trim()),
                }
            }
            if !selectors.is_empty() {
                sheet.rules.push(Rule {
                    selectors,
                    declarations,
                });
            }

            let consumed = open + 1 + body_len + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }

        Ok(sheet)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.font_faces.is_empty()
    }

    /// Append `other`'s rules and font faces; later rules win over earlier
    /// ones.
    pub fn extend(&mut self, other: Stylesheet) {
        self.rules.extend(other.rules);
        self.font_faces.extend(other.font_faces);
    }

    pub fn font_faces(&self) -> &[FontFace] {
        &self.font_faces
    }

    /// Declarations matching `element`: type and universal rules first,
    /// then class rules, each group in source order.
    fn matching<'s>(&'s self, element: &Element) -> Vec<&'s (String, String)> {
        let mut plain = Vec::new();
        let mut classed = Vec::new();
        for rule in &self.rules {
            let hits: Vec<&Selector> = rule
                .selectors
                .iter()
                .filter(|s| s.matches(element))
                .collect();
            if hits.is_empty() {
                continue;
            }
            let target = if hits.iter().any(|s| s.has_class()) {
                &mut classed
            } else {
                &mut plain
            };
            target.extend(rule.declarations.iter());
        }
        plain.extend(classed);
        plain
    }

    /// Compute the style of `element` given its parent's style.
    pub fn style_for(&self, element: &Element, parent: &ComputedStyle) -> ComputedStyle {
        let mut style = ComputedStyle::inherit(parent, &element.tag);
        for (prop, value) in self.matching(element) {
            style.apply(prop, value, parent.font_size);
        }
        if let Some(inline) = element.inline_style() {
            for decl in inline.split(';') {
                if let Some((prop, value)) = decl.split_once(':') {
                    style.apply(&prop.trim().to_ascii_lowercase(), value.trim(), parent.font_size);
                }
            }
        }
        style
    }
}

fn parse_declarations(selector: &str, body: &str) -> Result<Vec<(String, String)>, StylesheetError> {
    let mut declarations = Vec::new();
    for decl in body.split(';') {
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }
        let Some((prop, value)) = decl.split_once(':') else {
            return Err(StylesheetError::MissingColon {
                selector: selector.to_string(),
                declaration: decl.to_string(),
            });
        };
        declarations.push((prop.trim().to_ascii_lowercase(), value.trim().to_string()));
    }
    Ok(declarations)
}

fn strip_comments(text: &str) -> Result<String, StylesheetError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut offset = 0;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        let end = rest[start + 2..]
            .find("*/")
            .ok_or(StylesheetError::UnterminatedComment(offset + start))?;
        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Length of the at-rule at the start of `text`, block or statement.
fn skip_at_rule(text: &str) -> Option<usize> {
    let semi = text.find(';');
    let open = text.find('{');
    match (semi, open) {
        (Some(s), Some(o)) if s < o => Some(s + 1),
        (Some(s), None) => Some(s + 1),
        (_, Some(o)) => {
            let mut depth = 0usize;
            for (i, c) in text[o..].char_indices() {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(o + i + 1);
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        (None, None) => Some(text.len()),
    }
}

/// `url(...)` targets and `@import` targets in a stylesheet or style
/// attribute, in source order.
pub fn url_references(text: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let mut rest = text;
    while let Some(i) = rest.find("url(") {
        let after = &rest[i + 4..];
        let Some(end) = after.find(')') else {
            break;
        };
        let target = unquote(after[..end].trim());
        if !target.is_empty() {
            refs.push(target.to_string());
        }
        rest = &after[end + 1..];
    }

    let mut rest = text;
    while let Some(i) = rest.find("@import") {
        let after = rest[i + 7..].trim_start();
        if after.starts_with('"') || after.starts_with('\'') {
            let quote = &after[..1];
            if let Some(end) = after[1..].find(quote) {
                refs.push(after[1..1 + end].to_string());
            }
        }
        rest = after;
    }
    refs
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(s)
}

// ---------------------------------------------------------------------------
// Computed style
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Inline,
    Flex,
    Grid,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

/// A box dimension in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Pt(f32),
    /// 0..100
    Percent(f32),
}

impl Dimension {
    /// Resolve against the containing width; `None` when auto.
    pub fn resolve(self, of: f32) -> Option<f32> {
        match self {
            Dimension::Auto => None,
            Dimension::Pt(v) => Some(v),
            Dimension::Percent(p) => Some(of * p / 100.0),
        }
    }
}

/// Four box sides in points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Edges {
    pub fn all(v: f32) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

/// The style properties the layout understands.
///
/// Text properties inherit from the parent; box properties start from the
/// user-agent defaults of the element's tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    // Inherited
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    /// Lowercased first family of `font-family`.
    pub font_family: Option<String>,
    pub color: [f32; 3],
    pub align: TextAlign,
    /// Multiple of the font size.
    pub line_height: f32,

    // Box model
    pub display: Display,
    pub width: Dimension,
    pub height: Dimension,
    pub max_width: Dimension,
    pub margin: Edges,
    pub padding: Edges,
    pub border_width: f32,
    pub border_color: [f32; 3],
    pub background: Option<[f32; 3]>,

    // Flex and grid
    pub flex_direction: FlexDirection,
    pub flex_wrap: bool,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub flex_basis: Dimension,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,
    /// Column count of `grid-template-columns`; every track is `1fr`.
    pub grid_columns: usize,

    // Pagination
    pub page_break_before: bool,
    pub page_break_after: bool,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            font_size: 11.0,
            bold: false,
            italic: false,
            font_family: None,
            color: [0.0, 0.0, 0.0],
            align: TextAlign::Left,
            line_height: 1.25,
            display: Display::Block,
            width: Dimension::Auto,
            height: Dimension::Auto,
            max_width: Dimension::Auto,
            margin: Edges::default(),
            padding: Edges::default(),
            border_width: 0.0,
            border_color: [0.0, 0.0, 0.0],
            background: None,
            flex_direction: FlexDirection::Row,
            flex_wrap: false,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            flex_basis: Dimension::Auto,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            grid_columns: 1,
            page_break_before: false,
            page_break_after: false,
        }
    }
}

fn is_inline_tag(tag: &str) -> bool {
    matches!(
        tag,
        "span"
            | "a"
            | "b"
            | "strong"
            | "em"
            | "i"
            | "u"
            | "small"
            | "code"
            | "sup"
            | "sub"
            | "label"
            | "abbr"
            | "br"
            | "img"
    )
}

impl ComputedStyle {
    pub fn is_hidden(&self) -> bool {
        self.display == Display::None
    }

    /// Inherited properties from `parent` plus the user-agent defaults for
    /// `tag`.
    fn inherit(parent: &ComputedStyle, tag: &str) -> Self {
        let mut s = ComputedStyle {
            font_size: parent.font_size,
            bold: parent.bold,
            italic: parent.italic,
            font_family: parent.font_family.clone(),
            color: parent.color,
            align: parent.align,
            line_height: parent.line_height,
            ..ComputedStyle::default()
        };
        if is_inline_tag(tag) {
            s.display = Display::Inline;
        }
        let base = ComputedStyle::default().font_size;
        match tag {
            "h1" => {
                s.font_size = base * 2.0;
                s.bold = true;
                s.margin.bottom = 10.0;
            }
            "h2" => {
                s.font_size = base * 1.6;
                s.bold = true;
                s.margin.bottom = 8.0;
            }
            "h3" => {
                s.font_size = base * 1.3;
                s.bold = true;
                s.margin.bottom = 6.0;
            }
            "h4" | "h5" | "h6" | "strong" | "b" => s.bold = true,
            "th" => {
                s.bold = true;
                s.padding = Edges::all(4.0);
            }
            "td" => s.padding = Edges::all(4.0),
            "em" | "i" => s.italic = true,
            "p" | "ul" | "ol" | "table" => s.margin.bottom = 6.0,
            "small" => s.font_size = parent.font_size * 0.85,
            "head" | "style" | "script" | "title" | "meta" | "link" => s.display = Display::None,
            _ => {}
        }
        s
    }

    fn apply(&mut self, prop: &str, value: &str, parent_size: f32) {
        let em = self.font_size;
        match prop {
            "font-size" => {
                if let Some(size) = parse_length(value, parent_size) {
                    self.font_size = size;
                }
            }
            "font-weight" => self.bold = is_bold(value),
            "font-style" => self.italic = is_italic(value),
            "font-family" => self.font_family = first_family(value),
            "color" => {
                if let Some(c) = parse_color(value) {
                    self.color = c;
                }
            }
            "text-align" => {
                self.align = match value {
                    "center" => TextAlign::Center,
                    "right" | "end" => TextAlign::Right,
                    _ => TextAlign::Left,
                }
            }
            "line-height" => {
                let value = value.trim();
                if let Ok(factor) = value.parse::<f32>() {
                    self.line_height = factor;
                } else if let Some(length) = parse_length(value, em) {
                    if em > 0.0 {
                        self.line_height = length / em;
                    }
                }
            }
            "display" => {
                self.display = match value {
                    "none" => Display::None,
                    "flex" | "inline-flex" => Display::Flex,
                    "grid" | "inline-grid" => Display::Grid,
                    "inline" => Display::Inline,
                    _ => Display::Block,
                }
            }
            "width" => self.width = parse_dimension(value, em),
            "height" => self.height = parse_dimension(value, em),
            "max-width" => self.max_width = parse_dimension(value, em),
            "margin" => apply_shorthand(&mut self.margin, value, em),
            "padding" => apply_shorthand(&mut self.padding, value, em),
            "margin-top" | "margin-right" | "margin-bottom" | "margin-left" => {
                if let Some(v) = parse_length(value, em) {
                    set_side(&mut self.margin, &prop["margin-".len()..], v);
                }
            }
            "padding-top" | "padding-right" | "padding-bottom" | "padding-left" => {
                if let Some(v) = parse_length(value, em) {
                    set_side(&mut self.padding, &prop["padding-".len()..], v);
                }
            }
            "border-width" => {
                if let Some(v) = parse_length(value, em) {
                    self.border_width = v;
                }
            }
            "border-color" => {
                if let Some(c) = parse_color(value) {
                    self.border_color = c;
                }
            }
            "border" => {
                if value.trim() == "none" {
                    self.border_width = 0.0;
                }
                for token in value.split_whitespace() {
                    if let Some(c) = parse_color(token) {
                        self.border_color = c;
                    } else if let Some(w) = parse_length(token, em) {
                        self.border_width = w;
                    }
                }
            }
            "background" | "background-color" => {
                if value.trim() == "none" || value.trim() == "transparent" {
                    self.background = None;
                } else if let Some(c) = value.split_whitespace().find_map(parse_color) {
                    self.background = Some(c);
                }
            }
            "flex-direction" => {
                self.flex_direction = if value.starts_with("column") {
                    FlexDirection::Column
                } else {
                    FlexDirection::Row
                }
            }
            "flex-wrap" => self.flex_wrap = value == "wrap",
            "flex" => {
                let mut parts = value.split_whitespace();
                if let Some(grow) = parts.next().and_then(|v| v.parse::<f32>().ok()) {
                    self.flex_grow = grow;
                    self.flex_shrink = 1.0;
                    self.flex_basis = Dimension::Pt(0.0);
                }
                if let Some(shrink) = parts.next().and_then(|v| v.parse::<f32>().ok()) {
                    self.flex_shrink = shrink;
                }
                if let Some(basis) = parts.next() {
                    self.flex_basis = parse_dimension(basis, em);
                }
            }
            "flex-grow" => {
                if let Ok(v) = value.trim().parse() {
                    self.flex_grow = v;
                }
            }
            "flex-shrink" => {
                if let Ok(v) = value.trim().parse() {
                    self.flex_shrink = v;
                }
            }
            "flex-basis" => self.flex_basis = parse_dimension(value, em),
            "justify-content" => {
                self.justify_content = match value {
                    "flex-end" | "end" | "right" => JustifyContent::End,
                    "center" => JustifyContent::Center,
                    "space-between" => JustifyContent::SpaceBetween,
                    "space-around" => JustifyContent::SpaceAround,
                    "space-evenly" => JustifyContent::SpaceEvenly,
                    _ => JustifyContent::Start,
                }
            }
            "align-items" => {
                self.align_items = match value {
                    "flex-start" | "start" => AlignItems::Start,
                    "flex-end" | "end" => AlignItems::End,
                    "center" => AlignItems::Center,
                    _ => AlignItems::Stretch,
                }
            }
            "gap" | "column-gap" | "grid-gap" => {
                if let Some(v) = value.split_whitespace().next().and_then(|v| parse_length(v, em)) {
                    self.gap = v;
                }
            }
            "grid-template-columns" => self.grid_columns = count_tracks(value),
            "page-break-before" | "break-before" => {
                self.page_break_before = matches!(value, "always" | "page")
            }
            "page-break-after" | "break-after" => {
                self.page_break_after = matches!(value, "always" | "page")
            }
            other => log::debug!("Ignoring unsupported CSS property '{other}'"),
        }
    }
}

fn is_bold(value: &str) -> bool {
    matches!(value.trim(), "bold" | "bolder" | "600" | "700" | "800" | "900")
}

fn is_italic(value: &str) -> bool {
    matches!(value.trim(), "italic" | "oblique")
}

fn first_family(value: &str) -> Option<String> {
    let first = value.split(',').next()?.trim();
    let name = unquote(first).trim().to_ascii_lowercase();
    (!name.is_empty()).then_some(name)
}

fn set_side(edges: &mut Edges, side: &str, v: f32) {
    match side {
        "top" => edges.top = v,
        "right" => edges.right = v,
        "bottom" => edges.bottom = v,
        "left" => edges.left = v,
        _ => {}
    }
}

/// `margin`/`padding` shorthand with one to four values. `auto` counts as 0.
fn apply_shorthand(edges: &mut Edges, value: &str, em: f32) {
    let values: Vec<f32> = value
        .split_whitespace()
        .map(|v| parse_length(v, em).unwrap_or(0.0))
        .collect();
    *edges = match values.as_slice() {
        [all] => Edges::all(*all),
        [v, h] => Edges {
            top: *v,
            right: *h,
            bottom: *v,
            left: *h,
        },
        [t, h, b] => Edges {
            top: *t,
            right: *h,
            bottom: *b,
            left: *h,
        },
        [t, r, b, l, ..] => Edges {
            top: *t,
            right: *r,
            bottom: *b,
            left: *l,
        },
        [] => *edges,
    };
}

/// Track count of `repeat(3, 1fr)` or `1fr 2fr 1fr`.
fn count_tracks(value: &str) -> usize {
    let value = value.trim();
    if let Some(inner) = value.strip_prefix("repeat(") {
        if let Some(n) = inner.split(',').next().and_then(|n| n.trim().parse::<usize>().ok()) {
            return n.max(1);
        }
    }
    value.split_whitespace().count().max(1)
}

fn parse_dimension(value: &str, em: f32) -> Dimension {
    let value = value.trim();
    if value == "auto" {
        return Dimension::Auto;
    }
    if let Some(p) = value.strip_suffix('%').and_then(|n| n.trim().parse::<f32>().ok()) {
        return Dimension::Percent(p);
    }
    parse_length(value, em).map_or(Dimension::Auto, Dimension::Pt)
}

/// Parse `12pt`, `16px`, `1.5em`, `120%` or a bare number into points.
fn parse_length(value: &str, relative_to: f32) -> Option<f32> {
    let value = value.trim();
    let (number, factor) = if let Some(n) = value.strip_suffix("px") {
        (n, 0.75)
    } else if let Some(n) = value.strip_suffix("pt") {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix("rem") {
        (n, ComputedStyle::default().font_size)
    } else if let Some(n) = value.strip_suffix("em") {
        (n, relative_to)
    } else if let Some(n) = value.strip_suffix("mm") {
        (n, 2.834_646)
    } else if let Some(n) = value.strip_suffix('%') {
        (n, relative_to / 100.0)
    } else {
        (value, 1.0)
    };
    number.trim().parse::<f32>().ok().map(|n| n * factor)
}

/// Parse `#rgb`, `#rrggbb` or a handful of named colours into RGB 0..1.
fn parse_color(value: &str) -> Option<[f32; 3]> {
    let value = value.trim().to_ascii_lowercase();
    let named = match value.as_str() {
        "black" => Some([0.0, 0.0, 0.0]),
        "white" => Some([1.0, 1.0, 1.0]),
        "gray" | "grey" => Some([0.5, 0.5, 0.5]),
        "red" => Some([1.0, 0.0, 0.0]),
        "green" => Some([0.0, 0.5, 0.0]),
        "blue" => Some([0.0, 0.0, 1.0]),
        _ => None,
    };
    if named.is_some() {
        return named;
    }
    let hex = value.strip_prefix('#')?;
    // Byte slicing below needs single-byte characters.
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
    match hex.len() {
        3 => {
            let mut out = [0.0; 3];
            for (i, c) in hex.chars().enumerate() {
                out[i] = channel(&format!("{c}{c}"))?;
            }
            Some(out)
        }
        6 => Some([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        ]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{parse, Node};

    fn element(markup: &str) -> Element {
        match parse(markup).unwrap().into_iter().next() {
            Some(Node::Element(e)) => e,
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn class_rules_override_type_rules() {
        let sheet = Stylesheet::parse(
            "/* base */ .lead { font-size: 14pt } p { font-size: 10pt; color: #336699 }",
        )
        .unwrap();
        let p = element(r#"<p class="lead">x</p>"#);
        let style = sheet.style_for(&p, &ComputedStyle::default());
        assert_eq!(style.font_size, 14.0);
        assert!((style.color[0] - 0.2).abs() < 0.01);
    }

    #[test]
    fn inline_style_wins() {
        let sheet = Stylesheet::parse("h1 { color: red }").unwrap();
        let h1 = element(r#"<h1 style="color: #000; font-size: 20px">T</h1>"#);
        let style = sheet.style_for(&h1, &ComputedStyle::default());
        assert_eq!(style.color, [0.0, 0.0, 0.0]);
        assert_eq!(style.font_size, 15.0);
        assert!(style.bold);
    }

    #[test]
    fn skips_at_rules_and_unsupported_selectors() {
        let sheet = Stylesheet::parse(
            "@import 'fonts.css'; @media print { p { color: red } } div p { color: blue } p { color: green }",
        )
        .unwrap();
        let p = element("<p>x</p>");
        assert_eq!(sheet.style_for(&p, &ComputedStyle::default()).color, [0.0, 0.5, 0.0]);
    }

    #[test]
    fn broken_syntax_is_rejected() {
        assert!(matches!(
            Stylesheet::parse("p { color: red"),
            Err(StylesheetError::UnbalancedBraces(_))
        ));
        assert!(matches!(
            Stylesheet::parse("p { color red }"),
            Err(StylesheetError::MissingColon { .. })
        ));
        assert!(Stylesheet::parse("} p { }").is_err());
        assert!(Stylesheet::parse("/* open").is_err());
    }

    #[test]
    fn finds_url_references() {
        let refs = url_references(
            "@import \"extra.css\"; body { background: url('img/bg.png') } @font-face { src: url(fonts/Sen.ttf) }",
        );
        assert_eq!(refs, vec!["img/bg.png", "fonts/Sen.ttf", "extra.css"]);
    }

    #[test]
    fn non_ascii_colors_are_ignored() {
        // Six bytes, four characters: must not be sliced mid-character.
        assert_eq!(parse_color("#a\u{e9}\u{e9}a"), None);
        assert_eq!(parse_color("#\u{e9}\u{e9}\u{e9}"), None);
        assert_eq!(parse_color("#zzzzzz"), None);
        assert_eq!(parse_color("#FFF"), Some([1.0, 1.0, 1.0]));

        let p = element("<p style=\"color: #a\u{e9}\u{e9}a; background: #\u{e9}\u{e9}\u{e9}\">x</p>");
        let style = Stylesheet::default().style_for(&p, &ComputedStyle::default());
        assert_eq!(style.color, [0.0, 0.0, 0.0]);
        assert_eq!(style.background, None);
    }

    #[test]
    fn box_and_flex_properties() {
        let sheet = Stylesheet::parse(
            ".row { display: flex; gap: 8pt; justify-content: space-between; padding: 4pt 8pt; \
             border: 1pt solid #cccccc; background-color: #eeeeee }
             .cell { flex: 1; width: 50%; margin: 2pt 0 6pt }
             .grid { display: grid; grid-template-columns: repeat(3, 1fr) }
             .break { page-break-before: always }",
        )
        .unwrap();
        let root = ComputedStyle::default();
        let row = sheet.style_for(&element(r#"<div class="row"></div>"#), &root);
        assert_eq!(row.display, Display::Flex);
        assert_eq!(row.flex_direction, FlexDirection::Row);
        assert_eq!(row.gap, 8.0);
        assert_eq!(row.justify_content, JustifyContent::SpaceBetween);
        assert_eq!(row.padding.horizontal(), 16.0);
        assert_eq!(row.border_width, 1.0);
        assert!(row.background.is_some());

        let cell = sheet.style_for(&element(r#"<span class="cell"></span>"#), &row);
        assert_eq!(cell.flex_grow, 1.0);
        assert_eq!(cell.width, Dimension::Percent(50.0));
        assert_eq!(cell.margin.vertical(), 8.0);
        // Box properties are not inherited.
        assert_eq!(cell.background, None);

        let grid = sheet.style_for(&element(r#"<div class="grid"></div>"#), &root);
        assert_eq!((grid.display, grid.grid_columns), (Display::Grid, 3));
        assert!(sheet.style_for(&element(r#"<h2 class="break"></h2>"#), &root).page_break_before);
    }

    #[test]
    fn parses_font_faces() {
        let sheet = Stylesheet::parse(
            "@font-face { font-family: 'Sen'; src: url(fonts/Sen-Bold.woff2) format('woff2'), url(fonts/Sen-Bold.ttf); font-weight: 700 }
             @font-face { font-family: Nameless }
             body { font-family: \"Sen\", sans-serif }",
        )
        .unwrap();
        assert_eq!(
            sheet.font_faces(),
            &[FontFace {
                family: "sen".to_string(),
                sources: vec!["fonts/Sen-Bold.woff2".to_string(), "fonts/Sen-Bold.ttf".to_string()],
                bold: true,
                italic: false,
            }]
        );
        let body = sheet.style_for(&element("<body></body>"), &ComputedStyle::default());
        assert_eq!(body.font_family.as_deref(), Some("sen"));
    }
}
