//! Document arena - element tree, markup parser and serializer.
//!
//! The engine mutates live nodes directly (no virtual-tree diffing), so the
//! document is a plain index arena: nodes are slots addressed by [`NodeId`],
//! with a free pool for reuse. Structure is owned here; contexts keep only
//! non-owning id back-references.
//!
//! Static attributes parsed from markup are kept verbatim (directives read
//! them); presentation written by directives (bound text, dynamic classes,
//! styles, visibility) lives in separate fields so re-processing a node never
//! loses its source attributes.
//!
//! The parser accepts a strict, well-formed subset of HTML: quoted or bare
//! attribute values, self-closing tags, void elements, comments. Anything
//! else is a [`EngineError::Markup`].

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::EngineError;
use crate::types::NodeId;

/// Tags that never have children or close tags.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

// =============================================================================
// Node Types
// =============================================================================

/// A static attribute as written in markup, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

/// Presentation state written by directives, separate from source attrs.
#[derive(Debug, Clone, Default)]
pub struct ElementData {
    pub tag: String,
    pub attrs: Vec<Attr>,
    /// Attributes set by `bind-<attr>`; `None`-valued entries are removed.
    pub bound_attrs: BTreeMap<String, String>,
    /// Class names toggled by `class` / `class-<name>`.
    pub classes: BTreeSet<String>,
    /// Style properties set by `style` / `style-<prop>`.
    pub styles: BTreeMap<String, String>,
    /// Text content written by `bind` (wins over children when serializing).
    pub text: Option<String>,
    /// Raw markup written by `bind-html` (wins over `text`).
    pub html: Option<String>,
    /// Presentation visibility toggled by `show` / `hide`. The element stays
    /// attached; serialization adds `display:none` when hidden.
    pub visible: bool,
    /// Current form value maintained by `model`.
    pub value: Value,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Element(ElementData),
    Text(String),
    /// Placeholder left behind by structural directives (`if`, `each`,
    /// `switch`) marking where materialized clones are inserted.
    Anchor(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

// =============================================================================
// Document
// =============================================================================

pub struct Document {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    root: NodeId,
}

impl Document {
    pub fn new() -> Self {
        let root_node = Node {
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Element(ElementData {
                tag: "#root".to_string(),
                visible: true,
                ..Default::default()
            }),
        };
        Self {
            nodes: vec![Some(root_node)],
            free: Vec::new(),
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Occupied arena slots, attached or detached. Teardown must return
    /// every captured template to the free pool, so this count is stable
    /// across materialize/destroy cycles.
    pub fn live_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(|n| n.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(|n| n.as_mut())
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.node(id).map(|n| &n.kind) {
            Some(NodeKind::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.node_mut(id).map(|n| &mut n.kind) {
            Some(NodeKind::Element(el)) => Some(el),
            _ => None,
        }
    }

    /// Static attribute lookup (exact name).
    pub fn attr(&self, id: NodeId, name: &str) -> Option<String> {
        self.element(id)?
            .attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.clone())
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.element(id)
            .is_some_and(|el| el.attrs.iter().any(|a| a.name == name))
    }

    /// Drop a static attribute; used when structural directives strip their
    /// controlling attribute from materialized clones.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(el) = self.element_mut(id) {
            el.attrs.retain(|a| a.name != name);
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    pub fn create_element(&mut self, tag: &str, attrs: Vec<Attr>) -> NodeId {
        self.alloc(Node {
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Element(ElementData {
                tag: tag.to_string(),
                attrs,
                visible: true,
                ..Default::default()
            }),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(Node {
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Text(text.to_string()),
        })
    }

    pub fn create_anchor(&mut self, label: &str) -> NodeId {
        self.alloc(Node {
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Anchor(label.to_string()),
        })
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
    }

    /// Insert `node` as the next sibling of `reference`.
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        let Some(parent) = self.node(reference).and_then(|n| n.parent) else {
            return;
        };
        self.detach(node);
        if let Some(parent_node) = self.node_mut(parent) {
            let pos = parent_node
                .children
                .iter()
                .position(|c| *c == reference)
                .map(|p| p + 1)
                .unwrap_or(parent_node.children.len());
            parent_node.children.insert(pos, node);
        }
        if let Some(n) = self.node_mut(node) {
            n.parent = Some(parent);
        }
    }

    /// Replace `old` with `new` at the same position. `old` is detached but
    /// not freed (structural directives keep it as a template).
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        let Some(parent) = self.node(old).and_then(|n| n.parent) else {
            return;
        };
        self.detach(new);
        if let Some(parent_node) = self.node_mut(parent) {
            if let Some(pos) = parent_node.children.iter().position(|c| *c == old) {
                parent_node.children[pos] = new;
            } else {
                parent_node.children.push(new);
            }
        }
        if let Some(n) = self.node_mut(new) {
            n.parent = Some(parent);
        }
        if let Some(n) = self.node_mut(old) {
            n.parent = None;
        }
    }

    /// Unlink a node from its parent, keeping its subtree intact.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).and_then(|n| n.parent) else {
            return;
        };
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.retain(|c| *c != id);
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
    }

    /// Detach and free an entire subtree, returning every freed id so the
    /// engine can drop listeners and context mappings for them.
    pub fn remove_subtree(&mut self, id: NodeId) -> Vec<NodeId> {
        self.detach(id);
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current.index()).and_then(|n| n.take()) {
                stack.extend(node.children);
                self.free.push(current.index());
                removed.push(current);
            }
        }
        removed
    }

    /// Deep-copy a subtree. Static attributes are copied; presentation state
    /// (bound text, classes, form value) starts fresh on the clone.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let (kind, children) = match self.node(id) {
            Some(node) => (node.kind.clone(), node.children.clone()),
            None => return self.create_text(""),
        };
        let kind = match kind {
            NodeKind::Element(el) => NodeKind::Element(ElementData {
                tag: el.tag,
                attrs: el.attrs,
                visible: true,
                ..Default::default()
            }),
            other => other,
        };
        let copy = self.alloc(Node {
            parent: None,
            children: Vec::new(),
            kind,
        });
        for child in children {
            let child_copy = self.clone_subtree(child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// Walk from a node up to the document root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.node(id).and_then(|n| n.parent);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.node(parent).and_then(|n| n.parent);
        }
        chain
    }

    /// Depth-first, document-order traversal of a subtree.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(node) = self.node(current) {
                for child in node.children.iter().rev() {
                    stack.push(*child);
                }
            }
        }
        out
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.element(*id).is_some_and(|el| el.tag == tag))
            .collect()
    }

    /// Concatenated text content of a subtree, honoring bound text.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(el) => {
                if let Some(text) = &el.text {
                    out.push_str(text);
                } else {
                    for child in &node.children {
                        self.collect_text(*child, out);
                    }
                }
            }
            NodeKind::Anchor(_) => {}
        }
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    /// Parse markup and append the resulting nodes under `parent`.
    pub fn parse_into(&mut self, parent: NodeId, markup: &str) -> Result<Vec<NodeId>, EngineError> {
        let mut parser = Parser {
            input: markup.as_bytes(),
            pos: 0,
        };
        let children = parser.parse_children(self, None)?;
        for child in &children {
            self.append_child(parent, *child);
        }
        Ok(children)
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize the whole document (children of the synthetic root).
    pub fn html(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.node(self.root) {
            for child in &root.children {
                self.write_node(*child, &mut out);
            }
        }
        out
    }

    /// Serialize one subtree.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(&escape(text)),
            NodeKind::Anchor(_) => {}
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                let mut class_attr: Option<String> = None;
                let mut style_attr: Option<String> = None;
                for attr in &el.attrs {
                    match attr.name.as_str() {
                        "class" => class_attr = Some(attr.value.clone()),
                        "style" => style_attr = Some(attr.value.clone()),
                        _ => {
                            if el.bound_attrs.contains_key(&attr.name) {
                                continue;
                            }
                            write_attr(out, &attr.name, &attr.value);
                        }
                    }
                }
                for (name, value) in &el.bound_attrs {
                    write_attr(out, name, value);
                }
                let classes = merge_classes(class_attr.as_deref(), &el.classes);
                if !classes.is_empty() {
                    write_attr(out, "class", &classes);
                }
                let styles = merge_styles(style_attr.as_deref(), &el.styles, el.visible);
                if !styles.is_empty() {
                    write_attr(out, "style", &styles);
                }
                if VOID_TAGS.contains(&el.tag.as_str()) {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                if let Some(html) = &el.html {
                    out.push_str(html);
                } else if let Some(text) = &el.text {
                    out.push_str(&escape(text));
                } else {
                    for child in &node.children {
                        self.write_node(*child, out);
                    }
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn write_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    if !value.is_empty() {
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }
}

fn merge_classes(static_attr: Option<&str>, dynamic: &BTreeSet<String>) -> String {
    let mut parts: Vec<&str> = static_attr
        .map(|s| s.split_whitespace().collect())
        .unwrap_or_default();
    for class in dynamic {
        if !parts.contains(&class.as_str()) {
            parts.push(class);
        }
    }
    parts.join(" ")
}

fn merge_styles(static_attr: Option<&str>, dynamic: &BTreeMap<String, String>, visible: bool) -> String {
    let mut parts: Vec<String> = static_attr
        .map(|s| {
            s.split(';')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    for (prop, value) in dynamic {
        parts.retain(|p| !p.trim_start().starts_with(&format!("{prop}:")));
        parts.push(format!("{prop}: {value}"));
    }
    if !visible {
        parts.push("display: none".to_string());
    }
    parts.join("; ")
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

fn decode(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: &str) -> EngineError {
        EngineError::Markup {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.input[self.pos..].starts_with(prefix.as_bytes())
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Parse sibling nodes until the close tag of `enclosing` (or EOF at the
    /// top level).
    fn parse_children(
        &mut self,
        doc: &mut Document,
        enclosing: Option<&str>,
    ) -> Result<Vec<NodeId>, EngineError> {
        let mut children = Vec::new();
        loop {
            if self.pos >= self.input.len() {
                if let Some(tag) = enclosing {
                    return Err(self.error(&format!("unexpected end of input inside <{tag}>")));
                }
                return Ok(children);
            }
            if self.starts_with("</") {
                let Some(tag) = enclosing else {
                    return Err(self.error("unmatched close tag"));
                };
                self.expect_close(tag)?;
                return Ok(children);
            }
            if self.starts_with("<!--") {
                self.skip_comment()?;
                continue;
            }
            if self.peek() == Some(b'<') {
                children.push(self.parse_element(doc)?);
            } else {
                let text = self.take_text();
                if !text.trim().is_empty() {
                    children.push(doc.create_text(&decode(&text)));
                }
            }
        }
    }

    fn take_text(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.input.len() && self.input[self.pos] != b'<' {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn skip_comment(&mut self) -> Result<(), EngineError> {
        self.pos += 4;
        while self.pos < self.input.len() {
            if self.starts_with("-->") {
                self.pos += 3;
                return Ok(());
            }
            self.pos += 1;
        }
        Err(self.error("unterminated comment"))
    }

    fn parse_element(&mut self, doc: &mut Document) -> Result<NodeId, EngineError> {
        self.pos += 1; // consume '<'
        let tag = self.take_name()?;
        if tag.is_empty() {
            return Err(self.error("expected tag name"));
        }
        let mut attrs = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    if self.peek() != Some(b'>') {
                        return Err(self.error("expected `>` after `/`"));
                    }
                    self.pos += 1;
                    return Ok(doc.create_element(&tag, attrs));
                }
                Some(_) => attrs.push(self.parse_attr()?),
                None => return Err(self.error("unexpected end of tag")),
            }
        }
        let element = doc.create_element(&tag, attrs);
        if VOID_TAGS.contains(&tag.as_str()) {
            return Ok(element);
        }
        let children = self.parse_children(doc, Some(&tag))?;
        for child in children {
            doc.append_child(element, child);
        }
        Ok(element)
    }

    fn take_name(&mut self) -> Result<String, EngineError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            self.pos += 1;
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    /// Attribute names carry directive syntax (`on:click.debounce(300)`,
    /// `bind-value`), so anything up to whitespace, `=`, `/` or `>` counts.
    fn parse_attr(&mut self) -> Result<Attr, EngineError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| !b.is_ascii_whitespace() && b != b'=' && b != b'>' && b != b'/')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected attribute name"));
        }
        let name = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        self.skip_whitespace();
        if self.peek() != Some(b'=') {
            return Ok(Attr {
                name,
                value: String::new(),
            });
        }
        self.pos += 1;
        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|b| b != quote) {
                    self.pos += 1;
                }
                if self.peek() != Some(quote) {
                    return Err(self.error("unterminated attribute value"));
                }
                let value = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                self.pos += 1;
                value
            }
            Some(_) => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|b| !b.is_ascii_whitespace() && b != b'>' && b != b'/')
                {
                    self.pos += 1;
                }
                String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
            }
            None => return Err(self.error("unexpected end of attribute")),
        };
        Ok(Attr {
            name,
            value: decode(&value),
        })
    }

    fn expect_close(&mut self, tag: &str) -> Result<(), EngineError> {
        self.pos += 2; // consume '</'
        let name = self.take_name()?;
        if name != tag {
            return Err(self.error(&format!("expected </{tag}>, found </{name}>")));
        }
        self.skip_whitespace();
        if self.peek() != Some(b'>') {
            return Err(self.error("expected `>` in close tag"));
        }
        self.pos += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(markup: &str) -> Document {
        let mut doc = Document::new();
        let root = doc.root();
        doc.parse_into(root, markup).expect("parse failed");
        doc
    }

    #[test]
    fn test_parse_roundtrip() {
        let doc = parse(r#"<div state="{count: 0}"><span bind="count">x</span></div>"#);
        assert_eq!(
            doc.html(),
            r#"<div state="{count: 0}"><span bind="count">x</span></div>"#
        );
    }

    #[test]
    fn test_parse_directive_attr_names() {
        let doc = parse(r#"<button on:click.prevent.debounce(300)="count++">Go</button>"#);
        let button = doc.find_by_tag("button")[0];
        assert_eq!(
            doc.attr(button, "on:click.prevent.debounce(300)"),
            Some("count++".to_string())
        );
    }

    #[test]
    fn test_void_and_self_closing() {
        let doc = parse(r#"<input model="name"/><br><img src="x.png">"#);
        assert_eq!(doc.find_by_tag("input").len(), 1);
        assert_eq!(doc.find_by_tag("br").len(), 1);
    }

    #[test]
    fn test_mismatched_close_is_an_error() {
        let mut doc = Document::new();
        let root = doc.root();
        let err = doc.parse_into(root, "<div><span></div>").unwrap_err();
        assert!(matches!(err, EngineError::Markup { .. }));
    }

    #[test]
    fn test_clone_subtree_resets_presentation() {
        let mut doc = parse(r#"<div class="static"><span>hi</span></div>"#);
        let div = doc.find_by_tag("div")[0];
        doc.element_mut(div).unwrap().classes.insert("dynamic".into());
        doc.element_mut(div).unwrap().text = Some("bound".into());

        let copy = doc.clone_subtree(div);
        let el = doc.element(copy).unwrap();
        assert!(el.classes.is_empty());
        assert!(el.text.is_none());
        assert_eq!(doc.text_content(copy), "hi");
    }

    #[test]
    fn test_hidden_element_serializes_display_none() {
        let mut doc = parse("<p>hello</p>");
        let p = doc.find_by_tag("p")[0];
        doc.element_mut(p).unwrap().visible = false;
        assert_eq!(doc.html(), r#"<p style="display: none">hello</p>"#);
    }

    #[test]
    fn test_remove_subtree_frees_and_reuses() {
        let mut doc = parse("<ul><li>a</li><li>b</li></ul>");
        let ul = doc.find_by_tag("ul")[0];
        let removed = doc.remove_subtree(ul);
        assert!(removed.len() >= 3);
        assert_eq!(doc.html(), "");
        // Freed slots are reused.
        let fresh = doc.create_text("x");
        assert!(removed.contains(&fresh));
    }

    #[test]
    fn test_anchor_is_invisible_in_output() {
        let mut doc = parse("<div></div>");
        let div = doc.find_by_tag("div")[0];
        let anchor = doc.create_anchor("if");
        doc.append_child(div, anchor);
        assert_eq!(doc.html(), "<div></div>");
    }
}
