//! Document Tree Nodes
//!
//! Owned node types of the eager document:
//! - [`Node`]: sum type over every kind that can appear as a child
//! - [`Element`] / [`Attr`]: elements with their attribute lists
//! - [`DocumentType`], [`Entity`], [`Notation`]: declarations from the DTD
//!
//! The deferred document reuses [`Attr`] and [`NodeKind`] for its records.

use crate::pipeline::events::{Attribute, AttributeType, QName};
use crate::symbols::Symbol;

/// Type of a document node, shared by both tree representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Document root
    Document,
    DocumentType,
    Element,
    /// Text content
    Text,
    /// CDATA section
    CData,
    Comment,
    ProcessingInstruction,
    EntityReference,
    /// Entity declaration (child of the document type)
    Entity,
    /// Notation declaration (child of the document type)
    Notation,
}

impl NodeKind {
    /// DOM node name for kinds that have a fixed one.
    pub fn fixed_name(self) -> Option<&'static str> {
        match self {
            NodeKind::Document => Some("#document"),
            NodeKind::Text => Some("#text"),
            NodeKind::CData => Some("#cdata-section"),
            NodeKind::Comment => Some("#comment"),
            _ => None,
        }
    }
}

/// An attribute of an element.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: QName,
    pub value: String,
    pub attr_type: AttributeType,
    /// False for values injected from a declared default.
    pub specified: bool,
}

impl Attr {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Attr {
            name,
            value: value.into(),
            attr_type: AttributeType::CData,
            specified: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name.raw
    }

    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    pub fn namespace_uri(&self) -> Option<&str> {
        self.name.uri.as_deref()
    }

    pub fn is_id(&self) -> bool {
        self.attr_type == AttributeType::Id
    }
}

impl From<Attribute> for Attr {
    fn from(a: Attribute) -> Self {
        Attr {
            name: a.name,
            value: a.value,
            attr_type: a.attr_type,
            specified: a.specified,
        }
    }
}

/// An element with its attributes and children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attr>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: QName) -> Self {
        Element {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn tag_name(&self) -> &str {
        &self.name.raw
    }

    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.prefix.as_deref()
    }

    pub fn namespace_uri(&self) -> Option<&str> {
        self.name.uri.as_deref()
    }

    pub fn attributes(&self) -> &[Attr] {
        &self.attributes
    }

    /// Attribute by qualified name.
    pub fn get_attribute_node(&self, name: &str) -> Option<&Attr> {
        self.attributes.iter().find(|a| &*a.name.raw == name)
    }

    /// Attribute value by qualified name.
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.get_attribute_node(name).map(|a| a.value.as_str())
    }

    /// Attribute value by namespace URI and local name.
    pub fn get_attribute_ns(&self, uri: Option<&str>, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.matches(uri, local))
            .map(|a| a.value.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute_node(name).is_some()
    }

    /// Set an attribute, replacing any attribute with the same name.
    pub fn set_attribute(&mut self, name: QName, value: impl Into<String>) {
        let attr = Attr::new(name, value);
        match self.attributes.iter_mut().find(|a| a.name.raw == attr.name.raw) {
            Some(existing) => *existing = attr,
            None => self.attributes.push(attr),
        }
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn append_child(&mut self, node: Node) {
        self.children.push(node);
    }

    /// Element children, skipping text and other node kinds.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Concatenated text of all descendant text and CDATA nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

/// `&name;` placeholder whose children mirror the entity's replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityReference {
    pub name: Symbol,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingInstruction {
    pub target: Symbol,
    pub data: String,
}

/// A declared entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: Symbol,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Notation of an unparsed entity.
    pub notation: Option<Symbol>,
    /// Replacement structure, filled from the first reference.
    pub children: Vec<Node>,
}

impl Entity {
    pub fn is_unparsed(&self) -> bool {
        self.notation.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notation {
    pub name: Symbol,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

/// The `<!DOCTYPE>` of a document and the declarations it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentType {
    pub name: Symbol,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub internal_subset: Option<String>,
    pub entities: Vec<Entity>,
    pub notations: Vec<Notation>,
}

impl DocumentType {
    pub fn new(name: Symbol, public_id: Option<String>, system_id: Option<String>) -> Self {
        DocumentType {
            name,
            public_id,
            system_id,
            internal_subset: None,
            entities: Vec::new(),
            notations: Vec::new(),
        }
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| &*e.name == name)
    }

    pub fn notation(&self, name: &str) -> Option<&Notation> {
        self.notations.iter().find(|n| &*n.name == name)
    }
}

/// A child node of a document, element or entity reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(ProcessingInstruction),
    EntityReference(EntityReference),
    DocumentType(DocumentType),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Element(_) => NodeKind::Element,
            Node::Text(_) => NodeKind::Text,
            Node::CData(_) => NodeKind::CData,
            Node::Comment(_) => NodeKind::Comment,
            Node::ProcessingInstruction(_) => NodeKind::ProcessingInstruction,
            Node::EntityReference(_) => NodeKind::EntityReference,
            Node::DocumentType(_) => NodeKind::DocumentType,
        }
    }

    /// DOM node name.
    pub fn node_name(&self) -> &str {
        match self {
            Node::Element(e) => e.tag_name(),
            Node::ProcessingInstruction(pi) => &pi.target,
            Node::EntityReference(r) => &r.name,
            Node::DocumentType(d) => &d.name,
            other => other.kind().fixed_name().unwrap_or_default(),
        }
    }

    /// DOM node value: character data for text-like nodes.
    pub fn node_value(&self) -> Option<&str> {
        match self {
            Node::Text(s) | Node::CData(s) | Node::Comment(s) => Some(s),
            Node::ProcessingInstruction(pi) => Some(&pi.data),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element(e) => &e.children,
            Node::EntityReference(r) => &r.children,
            _ => &[],
        }
    }

    pub fn text_content(&self) -> String {
        match self {
            Node::Text(s) | Node::CData(s) | Node::Comment(s) => s.clone(),
            Node::ProcessingInstruction(pi) => pi.data.clone(),
            Node::Element(_) | Node::EntityReference(_) => {
                let mut out = String::new();
                collect_text(self.children(), &mut out);
                out
            }
            Node::DocumentType(_) => String::new(),
        }
    }

    /// Copy for insertion into another document.
    ///
    /// Only specified attributes are carried over. A shallow copy of an
    /// element or entity reference has no children. Returns `None` for
    /// document types, which belong to exactly one document.
    pub fn import(&self, deep: bool) -> Option<Node> {
        let children = |nodes: &[Node]| -> Vec<Node> {
            if deep {
                nodes.iter().filter_map(|n| n.import(true)).collect()
            } else {
                Vec::new()
            }
        };
        match self {
            Node::Element(e) => Some(Node::Element(Element {
                name: e.name.clone(),
                attributes: e.attributes.iter().filter(|a| a.specified).cloned().collect(),
                children: children(&e.children),
            })),
            Node::EntityReference(r) => Some(Node::EntityReference(EntityReference {
                name: r.name.clone(),
                children: children(&r.children),
            })),
            Node::DocumentType(_) => None,
            other => Some(other.clone()),
        }
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(s) | Node::CData(s) => out.push_str(s),
            Node::Element(e) => collect_text(&e.children, out),
            Node::EntityReference(r) => collect_text(&r.children, out),
            _ => {}
        }
    }
}
