//! Deferred Document
//!
//! Arena representation built by the deferred builder:
//! - [`NodeHandle`] (u32) indices into a flat record vector
//! - Parent/child/sibling links stored as handles
//! - Attributes stored contiguously in a side arena
//!
//! Nothing is materialized until asked for. [`DeferredDocument::materialize`]
//! converts one subtree to owned [`Node`]s; [`DeferredDocument::to_document`]
//! converts everything.

use std::collections::HashMap;

use super::document::{Document, DocumentInfo};
use super::node::{
    Attr, DocumentType, Element, Entity, EntityReference, Node, NodeKind, Notation,
    ProcessingInstruction,
};
use crate::grammar::dtd::{EntityDecl, NotationDecl};
use crate::pipeline::events::QName;
use crate::symbols::Symbol;

/// Compact node reference (index into the arena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u32);

impl NodeHandle {
    /// The document node.
    pub const DOCUMENT: NodeHandle = NodeHandle(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifiers carried by document type, entity and notation records.
#[derive(Debug, Clone, Default)]
struct DeclInfo {
    public_id: Option<String>,
    system_id: Option<String>,
    notation: Option<Symbol>,
    internal_subset: Option<String>,
}

/// One slot of the arena.
#[derive(Debug, Clone)]
struct NodeRecord {
    kind: NodeKind,
    /// Element or attribute-style name; target for PIs, entity name for
    /// references and declarations.
    name: Option<QName>,
    /// Character data of text-like nodes.
    value: Option<String>,
    parent: Option<NodeHandle>,
    first_child: Option<NodeHandle>,
    last_child: Option<NodeHandle>,
    prev_sibling: Option<NodeHandle>,
    next_sibling: Option<NodeHandle>,
    /// Start of attributes in the attribute arena (elements)
    attr_start: u32,
    attr_count: u32,
    decl: Option<Box<DeclInfo>>,
}

impl NodeRecord {
    fn new(kind: NodeKind, parent: Option<NodeHandle>) -> Self {
        NodeRecord {
            kind,
            name: None,
            value: None,
            parent,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            attr_start: 0,
            attr_count: 0,
            decl: None,
        }
    }

    fn document() -> Self {
        Self::new(NodeKind::Document, None)
    }

    fn element(name: QName, parent: NodeHandle, attr_start: u32, attr_count: u32) -> Self {
        NodeRecord {
            name: Some(name),
            attr_start,
            attr_count,
            ..Self::new(NodeKind::Element, Some(parent))
        }
    }

    fn character_data(kind: NodeKind, value: String, parent: NodeHandle) -> Self {
        NodeRecord {
            value: Some(value),
            ..Self::new(kind, Some(parent))
        }
    }

    fn named(kind: NodeKind, name: Symbol, parent: NodeHandle) -> Self {
        NodeRecord {
            name: Some(QName::simple(name)),
            ..Self::new(kind, Some(parent))
        }
    }

    fn declaration(kind: NodeKind, name: Symbol, parent: NodeHandle, decl: DeclInfo) -> Self {
        NodeRecord {
            decl: Some(Box::new(decl)),
            ..Self::named(kind, name, parent)
        }
    }
}

/// A document stored as an arena of records.
#[derive(Debug, Clone)]
pub struct DeferredDocument {
    nodes: Vec<NodeRecord>,
    attributes: Vec<Attr>,
    /// ID value -> owning element; first registration wins.
    ids: HashMap<String, NodeHandle>,
    document_element: Option<NodeHandle>,
    doctype: Option<NodeHandle>,
    info: DocumentInfo,
}

impl Default for DeferredDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredDocument {
    pub fn new() -> Self {
        DeferredDocument {
            nodes: vec![NodeRecord::document()],
            attributes: Vec::new(),
            ids: HashMap::new(),
            document_element: None,
            doctype: None,
            info: DocumentInfo::default(),
        }
    }

    // ========================================================================
    // Construction
    // ========================================================================

    pub(crate) fn set_info(&mut self, info: DocumentInfo) {
        self.info = info;
    }

    fn push(&mut self, parent: NodeHandle, record: NodeRecord) -> NodeHandle {
        let handle = NodeHandle(self.nodes.len() as u32);
        self.nodes.push(record);
        self.link_child(parent, handle);
        handle
    }

    /// Link a child node to its parent
    fn link_child(&mut self, parent: NodeHandle, child: NodeHandle) {
        let last = self.nodes[parent.index()].last_child;
        if let Some(last) = last {
            self.nodes[child.index()].prev_sibling = Some(last);
            self.nodes[last.index()].next_sibling = Some(child);
        } else {
            self.nodes[parent.index()].first_child = Some(child);
        }
        self.nodes[parent.index()].last_child = Some(child);
    }

    pub(crate) fn create_element(
        &mut self,
        parent: NodeHandle,
        name: QName,
        attributes: Vec<Attr>,
    ) -> NodeHandle {
        let attr_start = self.attributes.len() as u32;
        let attr_count = attributes.len() as u32;
        self.attributes.extend(attributes);
        let handle = self.push(parent, NodeRecord::element(name, parent, attr_start, attr_count));
        if parent == NodeHandle::DOCUMENT && self.document_element.is_none() {
            self.document_element = Some(handle);
        }
        handle
    }

    /// Append a text, CDATA, comment or processing instruction node.
    pub(crate) fn create_leaf(&mut self, parent: NodeHandle, node: Node) -> Option<NodeHandle> {
        let record = match node {
            Node::Text(s) => NodeRecord::character_data(NodeKind::Text, s, parent),
            Node::CData(s) => NodeRecord::character_data(NodeKind::CData, s, parent),
            Node::Comment(s) => NodeRecord::character_data(NodeKind::Comment, s, parent),
            Node::ProcessingInstruction(pi) => NodeRecord {
                value: Some(pi.data),
                ..NodeRecord::named(NodeKind::ProcessingInstruction, pi.target, parent)
            },
            _ => return None,
        };
        Some(self.push(parent, record))
    }

    pub(crate) fn create_entity_reference(
        &mut self,
        parent: NodeHandle,
        name: Symbol,
    ) -> NodeHandle {
        self.push(parent, NodeRecord::named(NodeKind::EntityReference, name, parent))
    }

    pub(crate) fn create_doctype(
        &mut self,
        name: Symbol,
        public_id: Option<String>,
        system_id: Option<String>,
    ) -> NodeHandle {
        let decl = DeclInfo {
            public_id,
            system_id,
            ..Default::default()
        };
        let handle = self.push(
            NodeHandle::DOCUMENT,
            NodeRecord::declaration(NodeKind::DocumentType, name, NodeHandle::DOCUMENT, decl),
        );
        self.doctype = Some(handle);
        handle
    }

    pub(crate) fn set_internal_subset(&mut self, subset: String) {
        if let Some(decl) = self.doctype.and_then(|d| self.nodes[d.index()].decl.as_mut()) {
            decl.internal_subset = Some(subset);
        }
    }

    /// Record an entity declaration under the document type. The first
    /// declaration of a name is kept.
    pub(crate) fn add_entity(&mut self, decl: &EntityDecl) {
        let Some(doctype) = self.doctype else { return };
        if self.entity_handle(&decl.name).is_some() {
            return;
        }
        let info = DeclInfo {
            public_id: decl.public_id.clone(),
            system_id: decl.system_id.clone(),
            notation: decl.notation.clone(),
            internal_subset: None,
        };
        let record = NodeRecord::declaration(NodeKind::Entity, decl.name.clone(), doctype, info);
        self.push(doctype, record);
    }

    pub(crate) fn add_notation(&mut self, decl: &NotationDecl) {
        let Some(doctype) = self.doctype else { return };
        let exists = self
            .children(doctype)
            .any(|h| self.kind(h) == NodeKind::Notation && self.name(h) == Some(&*decl.name));
        if exists {
            return;
        }
        let info = DeclInfo {
            public_id: decl.public_id.clone(),
            system_id: decl.system_id.clone(),
            ..Default::default()
        };
        let record = NodeRecord::declaration(NodeKind::Notation, decl.name.clone(), doctype, info);
        self.push(doctype, record);
    }

    /// Share a finished reference's children with its entity declaration,
    /// unless the declaration already has children.
    ///
    /// The child records keep the reference as their parent; the entity only
    /// points at the same sibling chain.
    pub(crate) fn link_entity_children(&mut self, reference: NodeHandle) {
        let Some(name) = self.nodes[reference.index()].name.as_ref().map(|n| n.raw.clone()) else {
            return;
        };
        let Some(entity) = self.entity_handle(&name) else { return };
        if self.nodes[entity.index()].first_child.is_some() {
            return;
        }
        let (first, last) = {
            let r = &self.nodes[reference.index()];
            (r.first_child, r.last_child)
        };
        let e = &mut self.nodes[entity.index()];
        e.first_child = first;
        e.last_child = last;
    }

    /// Record an ID. Later registrations of the same value are ignored.
    pub(crate) fn register_id(&mut self, id: &str, element: NodeHandle) {
        self.ids.entry(id.to_string()).or_insert(element);
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn document(&self) -> NodeHandle {
        NodeHandle::DOCUMENT
    }

    pub fn document_element(&self) -> Option<NodeHandle> {
        self.document_element
    }

    pub fn doctype(&self) -> Option<NodeHandle> {
        self.doctype
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn record(&self, handle: NodeHandle) -> Option<&NodeRecord> {
        self.nodes.get(handle.index())
    }

    pub fn kind(&self, handle: NodeHandle) -> NodeKind {
        self.record(handle).map(|r| r.kind).unwrap_or(NodeKind::Document)
    }

    /// Qualified name of an element.
    pub fn qname(&self, handle: NodeHandle) -> Option<&QName> {
        self.record(handle)?.name.as_ref()
    }

    /// DOM node name.
    pub fn name(&self, handle: NodeHandle) -> Option<&str> {
        let record = self.record(handle)?;
        match &record.name {
            Some(name) => Some(&name.raw),
            None => record.kind.fixed_name(),
        }
    }

    /// Character data of text, CDATA, comment and PI nodes.
    pub fn value(&self, handle: NodeHandle) -> Option<&str> {
        self.record(handle)?.value.as_deref()
    }

    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.record(handle)?.parent
    }

    pub fn first_child(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.record(handle)?.first_child
    }

    pub fn last_child(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.record(handle)?.last_child
    }

    pub fn next_sibling(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.record(handle)?.next_sibling
    }

    pub fn prev_sibling(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.record(handle)?.prev_sibling
    }

    /// Iterate over children of a node
    pub fn children(&self, handle: NodeHandle) -> ChildIter<'_> {
        ChildIter {
            doc: self,
            next: self.first_child(handle),
        }
    }

    /// Iterate over all descendants of a node, depth-first
    pub fn descendants(&self, handle: NodeHandle) -> DescendantIter<'_> {
        let mut stack = Vec::new();
        let mut child = self.last_child(handle);
        while let Some(c) = child {
            stack.push(c);
            child = self.prev_sibling(c);
        }
        DescendantIter { doc: self, stack }
    }

    /// Attributes of an element
    pub fn attributes(&self, handle: NodeHandle) -> &[Attr] {
        match self.record(handle) {
            Some(r) if r.kind == NodeKind::Element => {
                let start = r.attr_start as usize;
                &self.attributes[start..start + r.attr_count as usize]
            }
            _ => &[],
        }
    }

    pub fn get_attribute(&self, handle: NodeHandle, name: &str) -> Option<&str> {
        self.attributes(handle)
            .iter()
            .find(|a| &*a.name.raw == name)
            .map(|a| a.value.as_str())
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeHandle> {
        self.ids.get(id).copied()
    }

    /// Concatenated text of the node and its descendants.
    pub fn text_content(&self, handle: NodeHandle) -> String {
        match self.kind(handle) {
            NodeKind::Text
            | NodeKind::CData
            | NodeKind::Comment
            | NodeKind::ProcessingInstruction => {
                self.value(handle).unwrap_or_default().to_string()
            }
            _ => self
                .descendants(handle)
                .filter(|&h| matches!(self.kind(h), NodeKind::Text | NodeKind::CData))
                .filter_map(|h| self.value(h))
                .collect(),
        }
    }

    /// Entity declaration record by name.
    pub fn entity_handle(&self, name: &str) -> Option<NodeHandle> {
        let doctype = self.doctype?;
        self.children(doctype)
            .find(|&h| self.kind(h) == NodeKind::Entity && self.name(h) == Some(name))
    }

    // ========================================================================
    // Materialization
    // ========================================================================

    /// Build the owned subtree rooted at `handle`.
    ///
    /// Returns `None` for the document itself and for entity and notation
    /// declarations, which only exist inside a [`DocumentType`].
    pub fn materialize(&self, handle: NodeHandle) -> Option<Node> {
        let record = self.record(handle)?;
        let value = || record.value.clone().unwrap_or_default();
        let name = || record.name.as_ref().map(|n| n.raw.clone());
        let node = match record.kind {
            NodeKind::Element => Node::Element(Element {
                name: record.name.clone()?,
                attributes: self.attributes(handle).to_vec(),
                children: self.materialize_children(handle),
            }),
            NodeKind::Text => Node::Text(value()),
            NodeKind::CData => Node::CData(value()),
            NodeKind::Comment => Node::Comment(value()),
            NodeKind::ProcessingInstruction => Node::ProcessingInstruction(ProcessingInstruction {
                target: name()?,
                data: value(),
            }),
            NodeKind::EntityReference => Node::EntityReference(EntityReference {
                name: name()?,
                children: self.materialize_children(handle),
            }),
            NodeKind::DocumentType => Node::DocumentType(self.materialize_doctype(handle)?),
            NodeKind::Document | NodeKind::Entity | NodeKind::Notation => return None,
        };
        Some(node)
    }

    fn materialize_children(&self, handle: NodeHandle) -> Vec<Node> {
        self.children(handle).filter_map(|h| self.materialize(h)).collect()
    }

    fn materialize_doctype(&self, handle: NodeHandle) -> Option<DocumentType> {
        let record = self.record(handle)?;
        let decl = record.decl.as_deref().cloned().unwrap_or_default();
        let name = record.name.as_ref()?.raw.clone();
        let mut doctype = DocumentType::new(name, decl.public_id, decl.system_id);
        doctype.internal_subset = decl.internal_subset;
        for child in self.children(handle) {
            match self.kind(child) {
                NodeKind::Entity => doctype.entities.extend(self.materialize_entity(child)),
                NodeKind::Notation => doctype.notations.extend(self.materialize_notation(child)),
                _ => {}
            }
        }
        Some(doctype)
    }

    /// Build an entity declaration with its replacement children.
    pub fn materialize_entity(&self, handle: NodeHandle) -> Option<Entity> {
        let record = self.record(handle).filter(|r| r.kind == NodeKind::Entity)?;
        let decl = record.decl.as_deref().cloned().unwrap_or_default();
        Some(Entity {
            name: record.name.as_ref()?.raw.clone(),
            public_id: decl.public_id,
            system_id: decl.system_id,
            notation: decl.notation,
            children: self.materialize_children(handle),
        })
    }

    fn materialize_notation(&self, handle: NodeHandle) -> Option<Notation> {
        let record = self.record(handle)?;
        let decl = record.decl.as_deref().cloned().unwrap_or_default();
        Some(Notation {
            name: record.name.as_ref()?.raw.clone(),
            public_id: decl.public_id,
            system_id: decl.system_id,
        })
    }

    /// Expand the whole arena into an eager [`Document`].
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        document.info = self.info.clone();
        document.children = self.materialize_children(NodeHandle::DOCUMENT);
        document.index_ids();
        document
    }
}

/// Iterator over child nodes
pub struct ChildIter<'d> {
    doc: &'d DeferredDocument,
    next: Option<NodeHandle>,
}

impl Iterator for ChildIter<'_> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.next_sibling(current);
        Some(current)
    }
}

/// Iterator over descendant nodes (depth-first)
pub struct DescendantIter<'d> {
    doc: &'d DeferredDocument,
    stack: Vec<NodeHandle>,
}

impl Iterator for DescendantIter<'_> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.stack.pop()?;
        let mut child = self.doc.last_child(current);
        while let Some(c) = child {
            self.stack.push(c);
            child = self.doc.prev_sibling(c);
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::events::AttributeType;

    fn qname(s: &str) -> QName {
        QName::simple(Symbol::detached(s))
    }

    fn id_attr(value: &str) -> Attr {
        let mut attr = Attr::new(qname("id"), value);
        attr.attr_type = AttributeType::Id;
        attr
    }

    fn sample() -> DeferredDocument {
        let mut doc = DeferredDocument::new();
        doc.create_doctype(Symbol::detached("root"), None, None);
        doc.add_entity(&EntityDecl::internal(Symbol::detached("e"), "x"));
        let root = doc.create_element(NodeHandle::DOCUMENT, qname("root"), vec![]);
        let a = doc.create_element(root, qname("a"), vec![id_attr("one")]);
        doc.register_id("one", a);
        doc.create_leaf(a, Node::Text("hello".into()));
        let reference = doc.create_entity_reference(root, Symbol::detached("e"));
        doc.create_leaf(reference, Node::Text("x".into()));
        doc.link_entity_children(reference);
        doc.create_leaf(root, Node::Comment("c".into()));
        doc
    }

    #[test]
    fn test_navigation_links() {
        let doc = sample();
        let root = doc.document_element().unwrap();
        let children: Vec<_> = doc.children(root).collect();
        assert_eq!(children.len(), 3);
        assert_eq!(doc.prev_sibling(children[1]), Some(children[0]));
        assert_eq!(doc.next_sibling(children[2]), None);
        assert_eq!(doc.parent(children[0]), Some(root));
        assert_eq!(doc.name(children[0]), Some("a"));
        assert_eq!(doc.kind(children[1]), NodeKind::EntityReference);
        assert_eq!(doc.name(children[2]), Some("#comment"));
        assert_eq!(doc.descendants(root).count(), 5);
    }

    #[test]
    fn test_text_content_and_attributes() {
        let doc = sample();
        let root = doc.document_element().unwrap();
        assert_eq!(doc.text_content(root), "hellox");
        let a = doc.get_element_by_id("one").unwrap();
        assert_eq!(doc.get_attribute(a, "id"), Some("one"));
        assert!(doc.attributes(root).is_empty());
    }

    #[test]
    fn test_entity_shares_reference_children() {
        let doc = sample();
        let entity = doc.entity_handle("e").unwrap();
        let text = doc.first_child(entity).unwrap();
        assert_eq!(doc.value(text), Some("x"));
        assert_eq!(doc.kind(doc.parent(text).unwrap()), NodeKind::EntityReference);
        assert_eq!(doc.materialize_entity(entity).unwrap().children, vec![Node::Text("x".into())]);
    }

    #[test]
    fn test_materialize_subtree_and_whole_document() {
        let doc = sample();
        let a = doc.get_element_by_id("one").unwrap();
        let node = doc.materialize(a).unwrap();
        assert_eq!(node.as_element().unwrap().text_content(), "hello");
        assert!(doc.materialize(NodeHandle::DOCUMENT).is_none());

        let eager = doc.to_document();
        assert_eq!(eager.children().len(), 2);
        assert_eq!(eager.get_element_by_id("one").unwrap().tag_name(), "a");
        let entity = eager.doctype().unwrap().entity("e").unwrap();
        assert_eq!(entity.children, vec![Node::Text("x".into())]);
    }

    #[test]
    fn test_first_entity_and_notation_declaration_kept() {
        let mut doc = sample();
        doc.add_entity(&EntityDecl::internal(Symbol::detached("e"), "other"));
        let notation = NotationDecl {
            name: Symbol::detached("gif"),
            public_id: None,
            system_id: Some("viewer".into()),
        };
        doc.add_notation(&notation);
        doc.add_notation(&notation);
        let doctype = doc.doctype().unwrap();
        assert_eq!(doc.children(doctype).count(), 2);
    }
}
