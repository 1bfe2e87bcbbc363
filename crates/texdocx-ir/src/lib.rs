//! Typed view of pandoc's JSON document model.
//!
//! Only the elements the cross-reference filter rewrites get dedicated
//! variants. Everything else is carried as [`Node::Other`], whose payload is
//! lifted recursively so nested elements stay reachable by a traversal.

use indexmap::IndexMap;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid pandoc JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Tags decoded into dedicated [`Node`] variants.
const KNOWN_TAGS: [&str; 9] = [
    "Str", "RawInline", "Span", "Cite", "Image", "Figure", "Table", "Header", "Div",
];

/// A whole pandoc document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "pandoc-api-version", default)]
    pub api_version: Value,
    #[serde(default = "Payload::empty_map")]
    pub meta: Payload,
    #[serde(default)]
    pub blocks: Vec<Node>,
}

impl Document {
    pub fn from_json(input: &str) -> ModelResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_json(&self) -> ModelResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Element attributes: identifier, classes and key/value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "(String, Vec<String>, Vec<(String, String)>)")]
pub struct Attr {
    pub identifier: String,
    pub classes: Vec<String>,
    pub attributes: Vec<(String, String)>,
}

impl Attr {
    pub fn with_id(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Remove every pair with `key`; returns the first removed value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let first = self.get(key).map(str::to_string);
        self.attributes.retain(|(k, _)| k != key);
        first
    }
}

impl From<(String, Vec<String>, Vec<(String, String)>)> for Attr {
    fn from((identifier, classes, attributes): (String, Vec<String>, Vec<(String, String)>)) -> Self {
        Self {
            identifier,
            classes,
            attributes,
        }
    }
}

impl Serialize for Attr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.identifier, &self.classes, &self.attributes).serialize(serializer)
    }
}

/// Figure and table caption: optional short form plus caption blocks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "(Payload, Vec<Node>)")]
pub struct Caption {
    pub short: Payload,
    pub long: Vec<Node>,
}

impl Caption {
    pub fn new(long: Vec<Node>) -> Self {
        Self {
            short: Payload::Leaf(Value::Null),
            long,
        }
    }
}

impl From<(Payload, Vec<Node>)> for Caption {
    fn from((short, long): (Payload, Vec<Node>)) -> Self {
        Self { short, long }
    }
}

impl Serialize for Caption {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.short, &self.long).serialize(serializer)
    }
}

/// The element kinds the filter distinguishes. Any other pandoc element is
/// kept as `Other` with its payload lifted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "NodeWire")]
pub enum Node {
    Str(String),
    RawInline {
        format: String,
        text: String,
    },
    Span {
        attr: Attr,
        content: Vec<Node>,
    },
    Cite {
        citations: Payload,
        content: Vec<Node>,
    },
    Image {
        attr: Attr,
        alt: Vec<Node>,
        url: String,
        title: String,
    },
    Figure {
        attr: Attr,
        caption: Caption,
        content: Vec<Node>,
    },
    /// `body` holds column specs, head, bodies and foot in pandoc's order.
    Table {
        attr: Attr,
        caption: Caption,
        body: Vec<Payload>,
    },
    Header {
        level: u8,
        attr: Attr,
        content: Vec<Node>,
    },
    Div {
        attr: Attr,
        content: Vec<Node>,
    },
    Other {
        tag: String,
        content: Option<Payload>,
    },
}

impl Node {
    pub fn text(s: impl Into<String>) -> Self {
        Node::Str(s.into())
    }

    pub fn other(tag: impl Into<String>) -> Self {
        Node::Other {
            tag: tag.into(),
            content: None,
        }
    }

    pub fn other_with(tag: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Other {
            tag: tag.into(),
            content: Some(Payload::List(
                children.into_iter().map(|n| Payload::Node(Box::new(n))).collect(),
            )),
        }
    }

    /// Pandoc tag name of this element.
    pub fn tag(&self) -> &str {
        match self {
            Node::Str(_) => "Str",
            Node::RawInline { .. } => "RawInline",
            Node::Span { .. } => "Span",
            Node::Cite { .. } => "Cite",
            Node::Image { .. } => "Image",
            Node::Figure { .. } => "Figure",
            Node::Table { .. } => "Table",
            Node::Header { .. } => "Header",
            Node::Div { .. } => "Div",
            Node::Other { tag, .. } => tag,
        }
    }

    /// Identifier of elements that carry attributes.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Node::Span { attr, .. }
            | Node::Image { attr, .. }
            | Node::Figure { attr, .. }
            | Node::Table { attr, .. }
            | Node::Header { attr, .. }
            | Node::Div { attr, .. } => Some(attr.identifier.as_str()),
            Node::Str(_) | Node::RawInline { .. } | Node::Cite { .. } | Node::Other { .. } => None,
        }
    }
}

/// Pandoc's `{"t": .., "c": [..]}` layout of the typed elements.
#[derive(Deserialize)]
#[serde(tag = "t", content = "c")]
enum Element {
    Str(String),
    RawInline(String, String),
    Span(Attr, Vec<Node>),
    Cite(Payload, Vec<Node>),
    Image(Attr, Vec<Node>, (String, String)),
    Figure(Attr, Caption, Vec<Node>),
    Table(Attr, Caption, Payload, Payload, Payload, Payload),
    Header(u8, Attr, Vec<Node>),
    Div(Attr, Vec<Node>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeWire {
    Known(Element),
    Other {
        t: String,
        #[serde(default)]
        c: Option<Payload>,
    },
}

impl TryFrom<NodeWire> for Node {
    type Error = String;

    fn try_from(wire: NodeWire) -> Result<Self, Self::Error> {
        let element = match wire {
            NodeWire::Other { t, .. } if KNOWN_TAGS.contains(&t.as_str()) => {
                return Err(format!("malformed `{}` element", t));
            }
            NodeWire::Other { t, c } => {
                return Ok(Node::Other { tag: t, content: c });
            }
            NodeWire::Known(element) => element,
        };
        Ok(match element {
            Element::Str(text) => Node::Str(text),
            Element::RawInline(format, text) => Node::RawInline { format, text },
            Element::Span(attr, content) => Node::Span { attr, content },
            Element::Cite(citations, content) => Node::Cite { citations, content },
            Element::Image(attr, alt, (url, title)) => Node::Image {
                attr,
                alt,
                url,
                title,
            },
            Element::Figure(attr, caption, content) => Node::Figure {
                attr,
                caption,
                content,
            },
            Element::Table(attr, caption, specs, head, bodies, foot) => Node::Table {
                attr,
                caption,
                body: vec![specs, head, bodies, foot],
            },
            Element::Header(level, attr, content) => Node::Header {
                level,
                attr,
                content,
            },
            Element::Div(attr, content) => Node::Div { attr, content },
        })
    }
}

/// Borrowed counterpart of [`Element`] used when writing.
#[derive(Serialize)]
#[serde(tag = "t", content = "c")]
enum ElementRef<'a> {
    Str(&'a str),
    RawInline(&'a str, &'a str),
    Span(&'a Attr, &'a [Node]),
    Cite(&'a Payload, &'a [Node]),
    Image(&'a Attr, &'a [Node], (&'a str, &'a str)),
    Figure(&'a Attr, &'a Caption, &'a [Node]),
    Table(TableRef<'a>),
    Header(u8, &'a Attr, &'a [Node]),
    Div(&'a Attr, &'a [Node]),
}

/// Table content is flat: attributes, caption, then the body parts.
struct TableRef<'a>(&'a Attr, &'a Caption, &'a [Payload]);

impl Serialize for TableRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2 + self.2.len()))?;
        seq.serialize_element(self.0)?;
        seq.serialize_element(self.1)?;
        for part in self.2 {
            seq.serialize_element(part)?;
        }
        seq.end()
    }
}

#[derive(Serialize)]
struct OtherRef<'a> {
    t: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    c: Option<&'a Payload>,
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let element = match self {
            Node::Other { tag, content } => {
                return OtherRef {
                    t: tag,
                    c: content.as_ref(),
                }
                .serialize(serializer);
            }
            Node::Str(text) => ElementRef::Str(text),
            Node::RawInline { format, text } => ElementRef::RawInline(format, text),
            Node::Span { attr, content } => ElementRef::Span(attr, content),
            Node::Cite { citations, content } => ElementRef::Cite(citations, content),
            Node::Image {
                attr,
                alt,
                url,
                title,
            } => ElementRef::Image(attr, alt, (url.as_str(), title.as_str())),
            Node::Figure {
                attr,
                caption,
                content,
            } => ElementRef::Figure(attr, caption, content),
            Node::Table {
                attr,
                caption,
                body,
            } => ElementRef::Table(TableRef(attr, caption, body)),
            Node::Header {
                level,
                attr,
                content,
            } => ElementRef::Header(*level, attr, content),
            Node::Div { attr, content } => ElementRef::Div(attr, content),
        };
        element.serialize(serializer)
    }
}

/// Arbitrary JSON with pandoc elements lifted into [`Node`]s.
///
/// Variant order matters when reading: arrays are always lists, objects
/// with a `t` tag are elements, other objects are maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    List(Vec<Payload>),
    Node(Box<Node>),
    Map(IndexMap<String, Payload>),
    Leaf(Value),
}

impl Payload {
    fn empty_map() -> Self {
        Payload::Map(IndexMap::new())
    }
}

// =============================================================================
// Traversal
// =============================================================================

/// Rebuild `nodes` bottom-up.
///
/// `visit` sees every element after its children were rebuilt, together with
/// the identifier of the closest enclosing element that has a non-empty one
/// (`""` at the top level). It returns the replacement elements: one to keep
/// or modify, none to drop, several to splice.
pub fn walk_nodes<F>(nodes: Vec<Node>, scope: &str, visit: &mut F) -> Vec<Node>
where
    F: FnMut(Node, &str) -> Vec<Node>,
{
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        out.extend(walk_node(node, scope, visit));
    }
    out
}

/// Walk a single element; see [`walk_nodes`].
pub fn walk_node<F>(node: Node, scope: &str, visit: &mut F) -> Vec<Node>
where
    F: FnMut(Node, &str) -> Vec<Node>,
{
    let inner_scope = match node.identifier() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => scope.to_string(),
    };
    let inner = inner_scope.as_str();
    let rebuilt = match node {
        Node::Str(_) | Node::RawInline { .. } => node,
        Node::Span { attr, content } => Node::Span {
            attr,
            content: walk_nodes(content, inner, visit),
        },
        Node::Cite { citations, content } => Node::Cite {
            citations: walk_payload(citations, inner, visit),
            content: walk_nodes(content, inner, visit),
        },
        Node::Image {
            attr,
            alt,
            url,
            title,
        } => Node::Image {
            attr,
            alt: walk_nodes(alt, inner, visit),
            url,
            title,
        },
        Node::Figure {
            attr,
            caption,
            content,
        } => Node::Figure {
            attr,
            caption: walk_caption(caption, inner, visit),
            content: walk_nodes(content, inner, visit),
        },
        Node::Table {
            attr,
            caption,
            body,
        } => Node::Table {
            attr,
            caption: walk_caption(caption, inner, visit),
            body: body
                .into_iter()
                .map(|p| walk_payload(p, inner, visit))
                .collect(),
        },
        Node::Header {
            level,
            attr,
            content,
        } => Node::Header {
            level,
            attr,
            content: walk_nodes(content, inner, visit),
        },
        Node::Div { attr, content } => Node::Div {
            attr,
            content: walk_nodes(content, inner, visit),
        },
        Node::Other { tag, content } => Node::Other {
            tag,
            content: content.map(|p| walk_payload(p, inner, visit)),
        },
    };
    visit(rebuilt, scope)
}

fn walk_caption<F>(caption: Caption, scope: &str, visit: &mut F) -> Caption
where
    F: FnMut(Node, &str) -> Vec<Node>,
{
    Caption {
        short: walk_payload(caption.short, scope, visit),
        long: walk_nodes(caption.long, scope, visit),
    }
}

/// Walk lifted JSON. Elements inside lists may expand to several items; a
/// lone element slot that expands to anything but one element becomes a list.
pub fn walk_payload<F>(payload: Payload, scope: &str, visit: &mut F) -> Payload
where
    F: FnMut(Node, &str) -> Vec<Node>,
{
    match payload {
        Payload::Node(node) => {
            let mut nodes = walk_node(*node, scope, visit);
            if nodes.len() == 1 {
                Payload::Node(Box::new(nodes.remove(0)))
            } else {
                Payload::List(nodes.into_iter().map(|n| Payload::Node(Box::new(n))).collect())
            }
        }
        Payload::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Payload::Node(node) => out.extend(
                        walk_node(*node, scope, visit)
                            .into_iter()
                            .map(|n| Payload::Node(Box::new(n))),
                    ),
                    other => out.push(walk_payload(other, scope, visit)),
                }
            }
            Payload::List(out)
        }
        Payload::Map(entries) => Payload::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, walk_payload(v, scope, visit)))
                .collect(),
        ),
        leaf @ Payload::Leaf(_) => leaf,
    }
}

/// First text node in `nodes`, depth first.
pub fn first_str_mut(nodes: &mut [Node]) -> Option<&mut String> {
    for node in nodes {
        if let Some(found) = node_first_str_mut(node) {
            return Some(found);
        }
    }
    None
}

fn node_first_str_mut(node: &mut Node) -> Option<&mut String> {
    match node {
        Node::Str(text) => Some(text),
        Node::RawInline { .. } | Node::Table { .. } => None,
        Node::Span { content, .. }
        | Node::Cite { content, .. }
        | Node::Header { content, .. }
        | Node::Div { content, .. } => first_str_mut(content),
        Node::Image { alt, .. } => first_str_mut(alt),
        Node::Figure { caption, .. } => first_str_mut(&mut caption.long),
        Node::Other { content, .. } => content.as_mut().and_then(payload_first_str_mut),
    }
}

fn payload_first_str_mut(payload: &mut Payload) -> Option<&mut String> {
    match payload {
        Payload::Node(node) => node_first_str_mut(node),
        Payload::List(items) => {
            for item in items {
                if let Some(found) = payload_first_str_mut(item) {
                    return Some(found);
                }
            }
            None
        }
        Payload::Map(_) | Payload::Leaf(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use serde_json::json;

    fn decode(value: Value) -> Node {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn unknown_elements_keep_nested_nodes_reachable() {
        let value = json!({"t": "Para", "c": [{"t": "Str", "c": "hi"}, {"t": "Space"}]});
        let node = decode(value.clone());
        match &node {
            Node::Other { tag, content: Some(Payload::List(items)) } => {
                assert_eq!(tag, "Para");
                assert_eq!(items[0], Payload::Node(Box::new(Node::text("hi"))));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(serde_json::to_value(&node).unwrap(), value);
    }

    #[test]
    fn raw_block_pairs_stay_plain_lists() {
        let value = json!({"t": "RawBlock", "c": ["tex", "\\newpage"]});
        let node = decode(value.clone());
        match &node {
            Node::Other { content: Some(Payload::List(items)), .. } => {
                assert_eq!(items[0], Payload::Leaf(json!("tex")));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(serde_json::to_value(&node).unwrap(), value);
    }

    #[test]
    fn image_attributes_are_typed() {
        let value = json!({
            "t": "Image",
            "c": [["fig", [], [["width", "50%"]]], [{"t": "Str", "c": "alt"}], ["a.pdf", ""]]
        });
        let mut node = decode(value);
        if let Node::Image { attr, url, .. } = &mut node {
            assert_eq!(url, "a.pdf");
            assert_eq!(attr.remove("width").as_deref(), Some("50%"));
            assert!(attr.attributes.is_empty());
        } else {
            panic!("expected image");
        }
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"t": "Image", "c": [["fig", [], []], [{"t": "Str", "c": "alt"}], ["a.pdf", ""]]})
        );
    }

    #[test]
    fn table_parts_are_written_flat() {
        let value = json!({
            "t": "Table",
            "c": [
                ["", [], []],
                [null, [{"t": "Plain", "c": [{"t": "Str", "c": "Results"}]}]],
                [[{"t": "AlignDefault"}, {"t": "ColWidthDefault"}]],
                [["", [], []], []],
                [],
                [["", [], []], []]
            ]
        });
        let node = decode(value.clone());
        match &node {
            Node::Table { body, .. } => assert_eq!(body.len(), 4),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(serde_json::to_value(&node).unwrap(), value);
    }

    #[test]
    fn header_level_must_be_small() {
        let value = json!({"t": "Header", "c": [999, ["", [], []], []]});
        let err = serde_json::from_value::<Node>(value).unwrap_err();
        assert!(err.to_string().contains("malformed `Header` element"));
    }

    #[test]
    fn document_meta_keeps_key_order() {
        let input = r#"{"pandoc-api-version":[1,23,1],"meta":{"title":{"t":"MetaInlines","c":[{"t":"Str","c":"T"}]},"abstract":{"t":"MetaBlocks","c":[]}},"blocks":[]}"#;
        let doc = Document::from_json(input).unwrap();
        assert_eq!(doc.to_json().unwrap(), input);
    }

    #[test]
    fn walk_reports_enclosing_identifier() {
        let table = Node::Table {
            attr: Attr::default(),
            caption: Caption::new(Vec::new()),
            body: Vec::new(),
        };
        let doc = vec![Node::Div {
            attr: Attr::with_id("tab:results"),
            content: vec![table],
        }];
        let mut seen = Vec::new();
        walk_nodes(doc, "", &mut |node, scope| {
            seen.push((node.tag().to_string(), scope.to_string()));
            vec![node]
        });
        assert_eq!(
            seen,
            vec![
                ("Table".to_string(), "tab:results".to_string()),
                ("Div".to_string(), "".to_string()),
            ]
        );
    }

    #[test]
    fn walk_splices_multiple_replacements_into_lists() {
        let doc = vec![Node::other_with("Para", vec![Node::text("a")])];
        let out = walk_nodes(doc, "", &mut |node, _| match node {
            Node::Str(s) => vec![Node::text(s.clone()), Node::text(s)],
            other => vec![other],
        });
        match &out[0] {
            Node::Other { content: Some(Payload::List(items)), .. } => assert_eq!(items.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn first_str_searches_depth_first() {
        let mut nodes = vec![Node::other_with(
            "Emph",
            vec![Node::other("Space"), Node::text("(Smith")],
        )];
        assert_eq!(first_str_mut(&mut nodes).map(|s| s.as_str()), Some("(Smith"));
    }
}
