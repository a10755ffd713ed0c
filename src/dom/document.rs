//! Eager Document
//!
//! An owned tree of [`Node`]s built as events arrive. Elements are found by
//! ID through a table of child-index paths recorded during construction.

use std::collections::HashMap;
use std::sync::Arc;

use super::node::{DocumentType, Element, Node};
use crate::core::chars::XmlVersion;
use crate::error::XmlError;

/// Facts from the XML declaration and the input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInfo {
    pub xml_version: XmlVersion,
    /// Encoding named in the XML declaration.
    pub xml_encoding: Option<String>,
    pub standalone: Option<bool>,
    /// Absolute system identifier of the document entity.
    pub document_uri: Option<Arc<str>>,
}

/// Child-index path from the document to a node.
pub(crate) type NodePath = Vec<usize>;

/// A fully materialized document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub(crate) info: DocumentInfo,
    pub(crate) children: Vec<Node>,
    /// ID value -> path of the owning element; first registration wins.
    ids: HashMap<String, NodePath>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn xml_version(&self) -> XmlVersion {
        self.info.xml_version
    }

    pub fn xml_encoding(&self) -> Option<&str> {
        self.info.xml_encoding.as_deref()
    }

    pub fn xml_standalone(&self) -> Option<bool> {
        self.info.standalone
    }

    pub fn document_uri(&self) -> Option<&str> {
        self.info.document_uri.as_deref()
    }

    /// Top-level nodes: document type, prolog and epilog markup, the root.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn doctype(&self) -> Option<&DocumentType> {
        self.children.iter().find_map(|n| match n {
            Node::DocumentType(d) => Some(d),
            _ => None,
        })
    }

    pub(crate) fn doctype_mut(&mut self) -> Option<&mut DocumentType> {
        self.children.iter_mut().find_map(|n| match n {
            Node::DocumentType(d) => Some(d),
            _ => None,
        })
    }

    /// The root element.
    pub fn document_element(&self) -> Option<&Element> {
        self.children.iter().find_map(Node::as_element)
    }

    pub fn document_element_mut(&mut self) -> Option<&mut Element> {
        self.children.iter_mut().find_map(Node::as_element_mut)
    }

    /// Follow a child-index path from the document.
    pub(crate) fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get(*first)?;
        for &index in rest {
            node = node.children().get(index)?;
        }
        Some(node)
    }

    /// Element whose ID-typed attribute has `id`.
    pub fn get_element_by_id(&self, id: &str) -> Option<&Element> {
        self.ids
            .get(id)
            .and_then(|path| self.node_at(path))
            .and_then(Node::as_element)
    }

    /// Record an ID. Later registrations of the same value are ignored.
    pub(crate) fn register_id(&mut self, id: &str, path: NodePath) {
        self.ids.entry(id.to_string()).or_insert(path);
    }

    /// Rebuild the ID table by walking the tree in document order.
    pub(crate) fn index_ids(&mut self) {
        let mut ids = HashMap::new();
        let mut path = Vec::new();
        index_nodes(&self.children, &mut path, &mut ids);
        self.ids = ids;
    }

    /// Copy a node from another document for use in this one.
    ///
    /// Only specified attributes are copied; defaulted ones stay behind.
    pub fn import_node(&self, node: &Node, deep: bool) -> Result<Node, XmlError> {
        node.import(deep)
            .ok_or_else(|| XmlError::structural("document type nodes cannot be imported"))
    }

    /// Append a top-level node. A document holds at most one element and
    /// one document type.
    pub fn append_child(&mut self, node: Node) -> Result<(), XmlError> {
        match &node {
            Node::Element(_) if self.document_element().is_some() => {
                return Err(XmlError::structural("document already has a root element"))
            }
            Node::DocumentType(_) if self.doctype().is_some() => {
                return Err(XmlError::structural("document already has a document type"))
            }
            Node::Text(_) | Node::CData(_) | Node::EntityReference(_) => {
                return Err(XmlError::structural(format!(
                    "{:?} nodes cannot be children of a document",
                    node.kind()
                )))
            }
            _ => {}
        }
        self.children.push(node);
        Ok(())
    }
}

fn index_nodes(nodes: &[Node], path: &mut NodePath, ids: &mut HashMap<String, NodePath>) {
    for (index, node) in nodes.iter().enumerate() {
        path.push(index);
        if let Node::Element(e) = node {
            for attr in e.attributes.iter().filter(|a| a.is_id()) {
                ids.entry(attr.value.clone()).or_insert_with(|| path.clone());
            }
        }
        index_nodes(node.children(), path, ids);
        path.pop();
    }
}
