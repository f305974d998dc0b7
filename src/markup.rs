//! Markup scanner – turns expanded template markup into a small element tree.
//!
//! The scanner is tolerant the way browsers are: stray end tags are ignored,
//! open elements are closed implicitly at end of input, void elements never
//! take children. What it does not accept is input that stops in the middle of
//! a construct (a tag, a comment, or a `<style>`/`<script>` block without its
//! closing tag); that is reported as a [`MarkupError`].

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("unterminated {what} starting at byte {offset}")]
    Unterminated { what: &'static str, offset: usize },
}

/// A node in the element tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with lower-cased tag name, attributes and children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(tag: String) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attr("style")
    }

    /// Concatenated text of all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(&e.children, out),
        }
    }
}

/// Elements that never have content or an end tag.
pub fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}

fn is_raw_text(tag: &str) -> bool {
    matches!(tag, "style" | "script")
}

/// Visit every element in document order.
pub fn walk<'a>(nodes: &'a [Node], visit: &mut dyn FnMut(&'a Element)) {
    for node in nodes {
        if let Node::Element(e) = node {
            visit(e);
            walk(&e.children, visit);
        }
    }
}

/// Parse markup into top-level nodes.
pub fn parse(markup: &str) -> Result<Vec<Node>, MarkupError> {
    Scanner::new(markup).run()
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    /// Open elements; index 0 is a synthetic root.
    stack: Vec<Element>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            stack: vec![Element::new(String::new())],
        }
    }

    fn run(mut self) -> Result<Vec<Node>, MarkupError> {
        while self.pos < self.input.len() {
            let rest = &self.input[self.pos..];
            if rest.starts_with("<!--") {
                self.skip_comment()?;
            } else if rest.starts_with("</") {
                self.end_tag()?;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.skip_declaration()?;
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                self.start_tag()?;
            } else {
                self.text();
            }
        }
        while self.stack.len() > 1 {
            self.close_top();
        }
        let root = self.stack.pop().map(|e| e.children).unwrap_or_default();
        Ok(root)
    }

    fn text(&mut self) {
        let start = self.pos;
        // A lone '<' that does not open a tag is literal text.
        let skip = usize::from(self.input[start..].starts_with('<'));
        let end = self.input[start + skip..]
            .find('<')
            .map_or(self.input.len(), |i| start + skip + i);
        self.pos = end;
        let text = decode_entities(&self.input[start..end]);
        self.append(Node::Text(text));
    }

    fn skip_comment(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        match self.input[start + 4..].find("-->") {
            Some(i) => {
                self.pos = start + 4 + i + 3;
                Ok(())
            }
            None => Err(MarkupError::Unterminated {
                what: "comment",
                offset: start,
            }),
        }
    }

    fn skip_declaration(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        match self.input[start..].find('>') {
            Some(i) => {
                self.pos = start + i + 1;
                Ok(())
            }
            None => Err(MarkupError::Unterminated {
                what: "declaration",
                offset: start,
            }),
        }
    }

    fn end_tag(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        let close = self.input[start..]
            .find('>')
            .ok_or(MarkupError::Unterminated {
                what: "end tag",
                offset: start,
            })?;
        let name = self.input[start + 2..start + close]
            .trim()
            .to_ascii_lowercase();
        self.pos = start + close + 1;

        if let Some(depth) = self.stack.iter().rposition(|e| e.tag == name) {
            if depth > 0 {
                while self.stack.len() > depth {
                    self.close_top();
                }
            }
        }
        Ok(())
    }

    fn start_tag(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        let unterminated = MarkupError::Unterminated {
            what: "tag",
            offset: start,
        };
        self.pos += 1;
        let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        let mut element = Element::new(name.to_ascii_lowercase());

        let self_closing = loop {
            self.skip_whitespace();
            let rest = &self.input[self.pos..];
            if rest.is_empty() {
                return Err(unterminated);
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                break true;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break false;
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }
            let key = self.take_while(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/'));
            if key.is_empty() {
                return Err(unterminated);
            }
            self.skip_whitespace();
            let value = if self.input[self.pos..].starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.attribute_value().ok_or(MarkupError::Unterminated {
                    what: "tag",
                    offset: start,
                })?
            } else {
                String::new()
            };
            element.attributes.insert(key.to_ascii_lowercase(), value);
        };

        if self_closing || is_void(&element.tag) {
            self.append(Node::Element(element));
            return Ok(());
        }

        if is_raw_text(&element.tag) {
            let closing = format!("</{}", element.tag);
            let body_start = self.pos;
            let lower = self.input[body_start..].to_ascii_lowercase();
            let Some(i) = lower.find(&closing) else {
                return Err(MarkupError::Unterminated {
                    what: "raw text block",
                    offset: start,
                });
            };
            let body = &self.input[body_start..body_start + i];
            if !body.is_empty() {
                element.children.push(Node::Text(body.to_string()));
            }
            self.pos = body_start + i;
            self.stack.push(element);
            return self.end_tag();
        }

        self.stack.push(element);
        Ok(())
    }

    fn attribute_value(&mut self) -> Option<String> {
        let rest = &self.input[self.pos..];
        let quote = rest.chars().next()?;
        if quote == '"' || quote == '\'' {
            let end = rest[1..].find(quote)?;
            let raw = &rest[1..1 + end];
            self.pos += end + 2;
            Some(decode_entities(raw))
        } else {
            let raw = self.take_while(|c| !c.is_whitespace() && c != '>');
            Some(decode_entities(raw))
        }
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> &'a str {
        let input: &'a str = self.input;
        let start = self.pos;
        let len = input[start..]
            .char_indices()
            .find(|&(_, c)| !keep(c))
            .map_or(input.len() - start, |(i, _)| i);
        self.pos = start + len;
        &input[start..start + len]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn append(&mut self, node: Node) {
        if let Some(top) = self.stack.last_mut() {
            top.children.push(node);
        }
    }

    fn close_top(&mut self) {
        if let Some(done) = self.stack.pop() {
            self.append(Node::Element(done));
        }
    }
}

/// Decode the entities templates commonly produce (named basics plus
/// numeric references).
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{00A0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
