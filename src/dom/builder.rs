//! Document Builder
//!
//! Terminal pipeline stage. Turns the event stream into a tree:
//! - Adjacent character data is coalesced into one text node
//! - CDATA sections become CDATA nodes or merge into text
//! - Entity references become reference nodes whose first completed
//!   expansion is shared with (deferred) or cloned into (eager) the
//!   entity declaration
//! - ID-typed attributes are registered as their elements start
//!
//! The eager and deferred representations sit behind the private
//! [`TreeSink`] trait so both are driven by the same transitions.

use std::mem;

use super::deferred::{DeferredDocument, NodeHandle};
use super::document::{Document, DocumentInfo, NodePath};
use super::node::{
    Attr, DocumentType, Element, Entity, EntityReference, Node, Notation, ProcessingInstruction,
};
use super::{DocumentFactory, ParsedDocument};
use crate::config::names;
use crate::config::registry::{FeatureRegistry, PropertyValue};
use crate::error::{ConfigError, XmlError};
use crate::grammar::dtd::{EntityDecl, NotationDecl};
use crate::pipeline::events::{DocumentEvent, DtdEvent, QName};
use crate::pipeline::{EventSink, PipelineComponent, PipelineContext};
use crate::symbols::Symbol;

// ============================================================================
// Tree sinks
// ============================================================================

/// Node-creation operations shared by both representations.
trait TreeSink {
    fn start_document(&mut self, info: DocumentInfo);
    fn doctype(&mut self, name: Symbol, public_id: Option<String>, system_id: Option<String>);
    fn entity(&mut self, decl: &EntityDecl);
    fn notation(&mut self, decl: &NotationDecl);
    fn internal_subset(&mut self, subset: String);
    fn start_element(&mut self, name: QName, attributes: Vec<Attr>);
    fn end_element(&mut self);
    /// Append a text, CDATA, comment or PI node at the current position.
    fn leaf(&mut self, node: Node);
    fn start_reference(&mut self, name: Symbol);
    fn end_reference(&mut self);
}

/// An element or entity reference still receiving children.
enum Open {
    Element(Element),
    Reference(EntityReference),
}

impl Open {
    fn children_mut(&mut self) -> &mut Vec<Node> {
        match self {
            Open::Element(e) => &mut e.children,
            Open::Reference(r) => &mut r.children,
        }
    }

    fn into_node(self) -> Node {
        match self {
            Open::Element(e) => Node::Element(e),
            Open::Reference(r) => Node::EntityReference(r),
        }
    }
}

struct EagerTree {
    document: Document,
    open: Vec<Open>,
    /// Index each open node will take in its parent.
    path: NodePath,
}

impl EagerTree {
    fn new() -> Self {
        EagerTree {
            document: Document::new(),
            open: Vec::new(),
            path: Vec::new(),
        }
    }

    fn current_children(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(open) => open.children_mut(),
            None => &mut self.document.children,
        }
    }

    fn close(&mut self) -> Option<Node> {
        let open = self.open.pop()?;
        self.path.pop();
        Some(open.into_node())
    }

    fn finish(mut self) -> Document {
        while let Some(node) = self.close() {
            self.current_children().push(node);
        }
        self.document
    }
}

impl TreeSink for EagerTree {
    fn start_document(&mut self, info: DocumentInfo) {
        self.document.info = info;
    }

    fn doctype(&mut self, name: Symbol, public_id: Option<String>, system_id: Option<String>) {
        let doctype = DocumentType::new(name, public_id, system_id);
        self.document.children.push(Node::DocumentType(doctype));
    }

    fn entity(&mut self, decl: &EntityDecl) {
        let Some(doctype) = self.document.doctype_mut() else { return };
        if doctype.entity(&decl.name).is_none() {
            doctype.entities.push(Entity {
                name: decl.name.clone(),
                public_id: decl.public_id.clone(),
                system_id: decl.system_id.clone(),
                notation: decl.notation.clone(),
                children: Vec::new(),
            });
        }
    }

    fn notation(&mut self, decl: &NotationDecl) {
        let Some(doctype) = self.document.doctype_mut() else { return };
        if doctype.notation(&decl.name).is_none() {
            doctype.notations.push(Notation {
                name: decl.name.clone(),
                public_id: decl.public_id.clone(),
                system_id: decl.system_id.clone(),
            });
        }
    }

    fn internal_subset(&mut self, subset: String) {
        if let Some(doctype) = self.document.doctype_mut() {
            doctype.internal_subset = Some(subset);
        }
    }

    fn start_element(&mut self, name: QName, attributes: Vec<Attr>) {
        let index = self.current_children().len();
        for attr in attributes.iter().filter(|a| a.is_id()) {
            let mut path = self.path.clone();
            path.push(index);
            self.document.register_id(&attr.value, path);
        }
        self.open.push(Open::Element(Element {
            name,
            attributes,
            children: Vec::new(),
        }));
        self.path.push(index);
    }

    fn end_element(&mut self) {
        if let Some(node) = self.close() {
            self.current_children().push(node);
        }
    }

    fn leaf(&mut self, node: Node) {
        self.current_children().push(node);
    }

    fn start_reference(&mut self, name: Symbol) {
        let index = self.current_children().len();
        self.open.push(Open::Reference(EntityReference {
            name,
            children: Vec::new(),
        }));
        self.path.push(index);
    }

    fn end_reference(&mut self) {
        let Some(node) = self.close() else { return };
        if let Node::EntityReference(reference) = &node {
            let entity = self
                .document
                .doctype_mut()
                .and_then(|d| d.entities.iter_mut().find(|e| e.name == reference.name));
            if let Some(entity) = entity {
                if entity.children.is_empty() {
                    entity.children = reference.children.clone();
                }
            }
        }
        self.current_children().push(node);
    }
}

struct DeferredTree {
    document: DeferredDocument,
    open: Vec<NodeHandle>,
}

impl DeferredTree {
    fn new() -> Self {
        DeferredTree {
            document: DeferredDocument::new(),
            open: Vec::new(),
        }
    }

    fn current(&self) -> NodeHandle {
        self.open.last().copied().unwrap_or(NodeHandle::DOCUMENT)
    }
}

impl TreeSink for DeferredTree {
    fn start_document(&mut self, info: DocumentInfo) {
        self.document.set_info(info);
    }

    fn doctype(&mut self, name: Symbol, public_id: Option<String>, system_id: Option<String>) {
        self.document.create_doctype(name, public_id, system_id);
    }

    fn entity(&mut self, decl: &EntityDecl) {
        self.document.add_entity(decl);
    }

    fn notation(&mut self, decl: &NotationDecl) {
        self.document.add_notation(decl);
    }

    fn internal_subset(&mut self, subset: String) {
        self.document.set_internal_subset(subset);
    }

    fn start_element(&mut self, name: QName, attributes: Vec<Attr>) {
        let ids: Vec<String> = attributes
            .iter()
            .filter(|a| a.is_id())
            .map(|a| a.value.clone())
            .collect();
        let handle = self.document.create_element(self.current(), name, attributes);
        for id in &ids {
            self.document.register_id(id, handle);
        }
        self.open.push(handle);
    }

    fn end_element(&mut self) {
        self.open.pop();
    }

    fn leaf(&mut self, node: Node) {
        self.document.create_leaf(self.current(), node);
    }

    fn start_reference(&mut self, name: Symbol) {
        let handle = self.document.create_entity_reference(self.current(), name);
        self.open.push(handle);
    }

    fn end_reference(&mut self) {
        if let Some(reference) = self.open.pop() {
            self.document.link_entity_children(reference);
        }
    }
}

enum Tree {
    Eager(EagerTree),
    Deferred(DeferredTree),
}

impl Tree {
    fn new(factory: DocumentFactory) -> Self {
        match factory {
            DocumentFactory::Eager => Tree::Eager(EagerTree::new()),
            DocumentFactory::Deferred => Tree::Deferred(DeferredTree::new()),
        }
    }

    fn sink(&mut self) -> &mut dyn TreeSink {
        match self {
            Tree::Eager(t) => t,
            Tree::Deferred(t) => t,
        }
    }

    fn finish(self) -> ParsedDocument {
        match self {
            Tree::Eager(t) => ParsedDocument::Eager(t.finish()),
            Tree::Deferred(t) => ParsedDocument::Deferred(t.document),
        }
    }
}

// ============================================================================
// Builder stage
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BuilderOptions {
    factory: DocumentFactory,
    create_entity_ref_nodes: bool,
    include_ignorable_whitespace: bool,
    include_comments: bool,
    create_cdata_nodes: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        BuilderOptions {
            factory: DocumentFactory::Deferred,
            create_entity_ref_nodes: true,
            include_ignorable_whitespace: true,
            include_comments: true,
            create_cdata_nodes: true,
        }
    }
}

const BUILDER_FEATURES: &[&str] = &[
    names::DEFER_NODE_EXPANSION,
    names::CREATE_ENTITY_REF_NODES,
    names::INCLUDE_IGNORABLE_WHITESPACE,
    names::INCLUDE_COMMENTS,
    names::CREATE_CDATA_NODES,
];

const BUILDER_PROPERTIES: &[&str] = &[names::DOCUMENT_FACTORY];

/// Terminal stage that materializes the document.
pub struct DocumentBuilder {
    options: BuilderOptions,
    tree: Tree,
    /// Character data not yet turned into a node.
    text: String,
    /// Content of the open CDATA section when CDATA nodes are created.
    cdata: Option<String>,
    in_cdata: bool,
    /// One entry per open entity: whether a reference node was created.
    entities: Vec<bool>,
    started: bool,
    complete: bool,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        let options = BuilderOptions::default();
        DocumentBuilder {
            options,
            tree: Tree::new(options.factory),
            text: String::new(),
            cdata: None,
            in_cdata: false,
            entities: Vec::new(),
            started: false,
            complete: false,
        }
    }

    pub fn factory(&self) -> DocumentFactory {
        self.options.factory
    }

    /// `EndDocument` has been received.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Take the tree built so far, closing any open elements.
    ///
    /// Returns `None` if nothing has been built since the last reset or take.
    pub fn take_document(&mut self) -> Option<ParsedDocument> {
        if !self.started {
            return None;
        }
        self.flush_text();
        if let Some(cdata) = self.cdata.take() {
            self.tree.sink().leaf(Node::CData(cdata));
        }
        let tree = mem::replace(&mut self.tree, Tree::new(self.options.factory));
        self.started = false;
        self.complete = false;
        self.entities.clear();
        self.in_cdata = false;
        tracing::debug!(factory = %self.options.factory, "document taken from builder");
        Some(tree.finish())
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = mem::take(&mut self.text);
            self.tree.sink().leaf(Node::Text(text));
        }
    }
}

impl PipelineComponent for DocumentBuilder {
    fn name(&self) -> &'static str {
        "document-builder"
    }

    fn recognized_features(&self) -> &'static [&'static str] {
        BUILDER_FEATURES
    }

    fn recognized_properties(&self) -> &'static [&'static str] {
        BUILDER_PROPERTIES
    }

    fn feature_defaults(&self) -> Vec<(&'static str, bool)> {
        BUILDER_FEATURES.iter().map(|name| (*name, true)).collect()
    }

    fn property_defaults(&self) -> Vec<(&'static str, PropertyValue)> {
        vec![(names::DOCUMENT_FACTORY, PropertyValue::DocumentFactory(DocumentFactory::Deferred))]
    }

    fn set_property(
        &mut self,
        name: &str,
        value: Option<&PropertyValue>,
    ) -> Result<(), ConfigError> {
        if name == names::DOCUMENT_FACTORY {
            if let Some(value) = value {
                DocumentFactory::from_property(value)?;
            }
        }
        Ok(())
    }

    fn reset(&mut self, settings: &FeatureRegistry) -> Result<(), XmlError> {
        let factory = match settings.property(names::DOCUMENT_FACTORY) {
            Some(value) => DocumentFactory::from_property(value)?,
            None if settings.feature(names::DEFER_NODE_EXPANSION) => DocumentFactory::Deferred,
            None => DocumentFactory::Eager,
        };
        let options = BuilderOptions {
            factory,
            create_entity_ref_nodes: settings.feature(names::CREATE_ENTITY_REF_NODES),
            include_ignorable_whitespace: settings.feature(names::INCLUDE_IGNORABLE_WHITESPACE),
            include_comments: settings.feature(names::INCLUDE_COMMENTS),
            create_cdata_nodes: settings.feature(names::CREATE_CDATA_NODES),
        };
        *self = DocumentBuilder {
            options,
            tree: Tree::new(factory),
            ..DocumentBuilder::new()
        };
        tracing::debug!(%factory, "document builder reset");
        Ok(())
    }

    fn document_event(
        &mut self,
        event: DocumentEvent,
        _ctx: &mut PipelineContext,
        _out: &mut EventSink,
    ) -> Result<(), XmlError> {
        match event {
            DocumentEvent::StartDocument {
                version,
                encoding,
                standalone,
                system_id,
            } => {
                self.started = true;
                self.tree.sink().start_document(DocumentInfo {
                    xml_version: version,
                    xml_encoding: encoding,
                    standalone,
                    document_uri: system_id,
                });
            }
            DocumentEvent::DoctypeDecl {
                root,
                public_id,
                system_id,
                ..
            } => {
                self.flush_text();
                self.tree.sink().doctype(root, public_id, system_id);
            }
            DocumentEvent::StartElement { name, attributes } => {
                self.flush_text();
                let attributes = attributes.into_iter().map(Attr::from).collect();
                self.tree.sink().start_element(name, attributes);
            }
            DocumentEvent::EndElement { .. } => {
                self.flush_text();
                self.tree.sink().end_element();
            }
            DocumentEvent::Characters(text) => match &mut self.cdata {
                Some(buffer) if self.in_cdata => buffer.push_str(&text),
                _ => self.text.push_str(&text),
            },
            DocumentEvent::IgnorableWhitespace(text) => {
                if self.options.include_ignorable_whitespace {
                    self.text.push_str(&text);
                }
            }
            DocumentEvent::Comment(text) => {
                if self.options.include_comments {
                    self.flush_text();
                    self.tree.sink().leaf(Node::Comment(text));
                }
            }
            DocumentEvent::ProcessingInstruction { target, data } => {
                self.flush_text();
                self.tree
                    .sink()
                    .leaf(Node::ProcessingInstruction(ProcessingInstruction { target, data }));
            }
            DocumentEvent::StartCData => {
                self.in_cdata = true;
                if self.options.create_cdata_nodes {
                    self.flush_text();
                    self.cdata = Some(String::new());
                }
            }
            DocumentEvent::EndCData => {
                self.in_cdata = false;
                if let Some(cdata) = self.cdata.take() {
                    self.tree.sink().leaf(Node::CData(cdata));
                }
            }
            DocumentEvent::StartEntity { name, .. } => {
                // Predefined entities only arrive when the scanner reports them.
                let create = self.options.create_entity_ref_nodes;
                if create {
                    self.flush_text();
                    self.tree.sink().start_reference(name);
                }
                self.entities.push(create);
            }
            DocumentEvent::EndEntity { .. } => {
                if self.entities.pop() == Some(true) {
                    self.flush_text();
                    self.tree.sink().end_reference();
                }
            }
            DocumentEvent::EndDocument => {
                self.flush_text();
                self.complete = true;
            }
        }
        Ok(())
    }

    fn dtd_event(
        &mut self,
        event: DtdEvent,
        _ctx: &mut PipelineContext,
        _out: &mut EventSink,
    ) -> Result<(), XmlError> {
        match event {
            DtdEvent::InternalEntityDecl(decl)
            | DtdEvent::ExternalEntityDecl(decl)
            | DtdEvent::UnparsedEntityDecl(decl)
                if !decl.parameter =>
            {
                self.tree.sink().entity(&decl)
            }
            DtdEvent::NotationDecl(decl) => self.tree.sink().notation(&decl),
            DtdEvent::EndDtd {
                internal_subset: Some(subset),
            } => self.tree.sink().internal_subset(subset),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::events::{Attribute, AttributeType};
    use crate::dom::NodeKind;
    use crate::pipeline::test_support::context;
    use crate::pipeline::Pipeline;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn builder(factory: DocumentFactory, features: &[(&str, bool)]) -> DocumentBuilder {
        let mut registry = FeatureRegistry::new();
        let mut builder = DocumentBuilder::new();
        for (name, state) in builder.feature_defaults() {
            registry.store_feature(name, state);
        }
        for (name, state) in features {
            registry.store_feature(name, *state);
        }
        registry.store_property(names::DOCUMENT_FACTORY, Some(factory.into()));
        builder.reset(&registry).unwrap();
        builder
    }

    fn qname(s: &str) -> QName {
        QName::simple(Symbol::detached(s))
    }

    fn start(name: &str) -> DocumentEvent {
        DocumentEvent::StartElement {
            name: qname(name),
            attributes: Vec::new(),
        }
    }

    fn end(name: &str) -> DocumentEvent {
        DocumentEvent::EndElement { name: qname(name) }
    }

    fn start_entity(name: &str, builtin: bool) -> DocumentEvent {
        DocumentEvent::StartEntity {
            name: Symbol::detached(name),
            public_id: None,
            system_id: None,
            builtin,
        }
    }

    fn end_entity(name: &str) -> DocumentEvent {
        DocumentEvent::EndEntity {
            name: Symbol::detached(name),
        }
    }

    fn document_start() -> DocumentEvent {
        DocumentEvent::StartDocument {
            version: Default::default(),
            encoding: None,
            standalone: None,
            system_id: None,
        }
    }

    fn run(
        builder: &mut DocumentBuilder,
        dtd: Vec<DtdEvent>,
        events: Vec<DocumentEvent>,
    ) -> Document {
        let mut ctx = context();
        {
            let mut pipeline = Pipeline::new();
            pipeline.push(builder);
            pipeline.document(&mut ctx, document_start()).unwrap();
            // Declarations follow the doctype, as the scanner delivers them.
            let mut dtd = dtd.into_iter();
            for event in events {
                let doctype = matches!(event, DocumentEvent::DoctypeDecl { .. });
                pipeline.document(&mut ctx, event).unwrap();
                if doctype {
                    for decl in dtd.by_ref() {
                        pipeline.dtd(&mut ctx, decl).unwrap();
                    }
                }
            }
            for decl in dtd {
                pipeline.dtd(&mut ctx, decl).unwrap();
            }
        }
        builder.take_document().unwrap().into_document()
    }

    fn both(features: &[(&str, bool)], dtd: Vec<DtdEvent>, events: Vec<DocumentEvent>) -> Document {
        let eager = run(
            &mut builder(DocumentFactory::Eager, features),
            dtd.clone(),
            events.clone(),
        );
        let deferred = run(&mut builder(DocumentFactory::Deferred, features), dtd, events);
        assert_eq!(eager, deferred);
        eager
    }

    fn doctype_with_entity() -> (Vec<DocumentEvent>, Vec<DtdEvent>) {
        let doctype = DocumentEvent::DoctypeDecl {
            root: Symbol::detached("root"),
            public_id: None,
            system_id: None,
            has_internal_subset: true,
        };
        let dtd = vec![
            DtdEvent::entity(Arc::new(EntityDecl::internal(Symbol::detached("e"), "text"))),
            DtdEvent::EndDtd {
                internal_subset: Some("<!ENTITY e \"text\">".into()),
            },
        ];
        (vec![doctype], dtd)
    }

    #[test]
    fn test_adjacent_text_coalesced() {
        let doc = both(
            &[(names::CREATE_ENTITY_REF_NODES, false)],
            vec![],
            vec![
                start("r"),
                DocumentEvent::Characters("a".into()),
                DocumentEvent::Characters("b".into()),
                start_entity("amp", true),
                DocumentEvent::Characters("&".into()),
                end_entity("amp"),
                DocumentEvent::IgnorableWhitespace(" ".into()),
                end("r"),
                DocumentEvent::EndDocument,
            ],
        );
        let root = doc.document_element().unwrap();
        assert_eq!(root.children(), &[Node::Text("ab& ".into())]);
    }

    #[test]
    fn test_cdata_nodes_and_merging() {
        let events = vec![
            start("r"),
            DocumentEvent::Characters("a".into()),
            DocumentEvent::StartCData,
            DocumentEvent::Characters("<b>".into()),
            DocumentEvent::EndCData,
            DocumentEvent::Characters("c".into()),
            end("r"),
        ];
        let doc = both(&[], vec![], events.clone());
        assert_eq!(
            doc.document_element().unwrap().children(),
            &[Node::Text("a".into()), Node::CData("<b>".into()), Node::Text("c".into())]
        );

        let merged = both(&[(names::CREATE_CDATA_NODES, false)], vec![], events);
        assert_eq!(merged.document_element().unwrap().children(), &[Node::Text("a<b>c".into())]);
    }

    #[test]
    fn test_comments_and_whitespace_options() {
        let events = vec![
            start("r"),
            DocumentEvent::IgnorableWhitespace("\n".into()),
            DocumentEvent::Comment("note".into()),
            end("r"),
        ];
        let doc = both(&[], vec![], events.clone());
        assert_eq!(doc.document_element().unwrap().children().len(), 2);

        let doc = both(
            &[(names::INCLUDE_COMMENTS, false), (names::INCLUDE_IGNORABLE_WHITESPACE, false)],
            vec![],
            events,
        );
        assert!(doc.document_element().unwrap().children().is_empty());
    }

    #[test]
    fn test_entity_reference_nodes_populate_declaration() {
        let (mut events, dtd) = doctype_with_entity();
        events.extend([
            start("root"),
            start_entity("e", false),
            DocumentEvent::Characters("text".into()),
            end_entity("e"),
            start_entity("e", false),
            DocumentEvent::Characters("text".into()),
            end_entity("e"),
            end("root"),
        ]);
        let doc = both(&[], dtd, events);
        let root = doc.document_element().unwrap();
        let references: Vec<_> = root
            .children()
            .iter()
            .filter(|n| matches!(n, Node::EntityReference(_)))
            .collect();
        assert_eq!(references.len(), 2);
        let doctype = doc.doctype().unwrap();
        assert_eq!(doctype.entity("e").unwrap().children, vec![Node::Text("text".into())]);
        assert_eq!(doctype.internal_subset.as_deref(), Some("<!ENTITY e \"text\">"));
        assert_eq!(root.text_content(), "texttext");
    }

    #[test]
    fn test_reported_builtin_reference_becomes_node() {
        let events = vec![
            start("r"),
            DocumentEvent::Characters("a".into()),
            start_entity("amp", true),
            DocumentEvent::Characters("&".into()),
            end_entity("amp"),
            DocumentEvent::Characters("b".into()),
            end("r"),
        ];
        let doc = both(&[], vec![], events);
        let root = doc.document_element().unwrap();
        let kinds: Vec<_> = root.children().iter().map(Node::kind).collect();
        assert_eq!(kinds, vec![NodeKind::Text, NodeKind::EntityReference, NodeKind::Text]);
        assert_eq!(root.children()[1].node_name(), "amp");
        assert_eq!(root.children()[1].children(), &[Node::Text("&".into())]);
        assert_eq!(root.text_content(), "a&b");
    }

    #[test]
    fn test_entity_text_merges_without_reference_nodes() {
        let (mut events, dtd) = doctype_with_entity();
        events.extend([
            start("root"),
            DocumentEvent::Characters("a".into()),
            start_entity("e", false),
            DocumentEvent::Characters("text".into()),
            end_entity("e"),
            DocumentEvent::Characters("b".into()),
            end("root"),
        ]);
        let doc = both(&[(names::CREATE_ENTITY_REF_NODES, false)], dtd, events);
        assert_eq!(doc.document_element().unwrap().children(), &[Node::Text("atextb".into())]);
        assert!(doc.doctype().unwrap().entity("e").unwrap().children.is_empty());
    }

    #[test]
    fn test_ids_registered_first_wins() {
        let with_id = |name: &str, id: &str, specified: bool| {
            let mut attr = Attribute::new(qname("id"), id);
            attr.attr_type = AttributeType::Id;
            attr.specified = specified;
            DocumentEvent::StartElement {
                name: qname(name),
                attributes: vec![attr],
            }
        };
        let events = vec![
            start("r"),
            with_id("a", "x", true),
            end("a"),
            with_id("b", "x", true),
            end("b"),
            with_id("c", "y", false),
            end("c"),
            end("r"),
        ];
        for factory in [DocumentFactory::Eager, DocumentFactory::Deferred] {
            let mut builder = builder(factory, &[]);
            let mut ctx = context();
            {
                let mut pipeline = Pipeline::new();
                pipeline.push(&mut builder);
                pipeline.document(&mut ctx, document_start()).unwrap();
                for event in events.clone() {
                    pipeline.document(&mut ctx, event).unwrap();
                }
            }
            match builder.take_document().unwrap() {
                ParsedDocument::Eager(doc) => {
                    assert_eq!(doc.get_element_by_id("x").unwrap().tag_name(), "a");
                    let c = doc.get_element_by_id("y").unwrap();
                    assert!(!c.attributes()[0].specified);
                }
                ParsedDocument::Deferred(doc) => {
                    let x = doc.get_element_by_id("x").unwrap();
                    assert_eq!(doc.name(x), Some("a"));
                    assert!(doc.get_element_by_id("y").is_some());
                }
            }
        }
    }

    #[test]
    fn test_partial_document_closes_open_elements() {
        let mut builder = builder(DocumentFactory::Eager, &[]);
        let mut ctx = context();
        {
            let mut pipeline = Pipeline::new();
            pipeline.push(&mut builder);
            let events = [
                document_start(),
                start("r"),
                start("a"),
                DocumentEvent::Characters("t".into()),
            ];
            for event in events {
                pipeline.document(&mut ctx, event).unwrap();
            }
        }
        assert!(!builder.is_complete());
        let doc = builder.take_document().unwrap().into_document();
        let root = doc.document_element().unwrap();
        assert_eq!(root.child_elements().next().unwrap().text_content(), "t");
        assert!(builder.take_document().is_none());
    }

    #[test]
    fn test_reset_picks_factory() {
        let mut registry = FeatureRegistry::new();
        registry.store_feature(names::DEFER_NODE_EXPANSION, false);
        let mut builder = DocumentBuilder::new();
        builder.reset(&registry).unwrap();
        assert_eq!(builder.factory(), DocumentFactory::Eager);

        registry.store_property(names::DOCUMENT_FACTORY, Some("deferred".into()));
        builder.reset(&registry).unwrap();
        assert_eq!(builder.factory(), DocumentFactory::Deferred);

        assert!(builder
            .set_property(names::DOCUMENT_FACTORY, Some(&PropertyValue::Int(3)))
            .is_err());
    }

    proptest! {
        #[test]
        fn prop_consecutive_characters_form_one_node(
            chunks in proptest::collection::vec("[a-z ]{1,8}", 1..6)
        ) {
            let mut events = vec![start("r")];
            events.extend(chunks.iter().map(|c| DocumentEvent::Characters(c.clone())));
            events.push(end("r"));
            let doc = both(&[], vec![], events);
            let expected = vec![Node::Text(chunks.concat())];
            prop_assert_eq!(doc.document_element().unwrap().children(), expected.as_slice());
        }
    }
}
