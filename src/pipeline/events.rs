//! Pipeline Event Contract
//!
//! Two streams flow through the pipeline in document order:
//! - [`DocumentEvent`]: document structure and content
//! - [`DtdEvent`]: declarations from the document type definition
//!
//! Events are owned values; a stage receives each one by value and may pass
//! it on, rewrite it, drop it, or emit extra events.

use std::fmt;
use std::sync::Arc;

use crate::core::chars::XmlVersion;
use crate::grammar::dtd::{AttDef, AttType, ElementDecl, EntityDecl, NotationDecl};
use crate::symbols::Symbol;

/// Qualified name of an element or attribute.
///
/// `uri` is filled in by the namespace binder; without it every name has no
/// namespace and `local == raw`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<Symbol>,
    pub local: Symbol,
    pub raw: Symbol,
    pub uri: Option<Symbol>,
}

impl QName {
    /// An unprefixed name.
    pub fn simple(raw: Symbol) -> Self {
        QName {
            prefix: None,
            local: raw.clone(),
            raw,
            uri: None,
        }
    }

    pub fn new(prefix: Option<Symbol>, local: Symbol, raw: Symbol) -> Self {
        QName {
            prefix,
            local,
            raw,
            uri: None,
        }
    }

    /// Check for `{uri}local`.
    pub fn matches(&self, uri: Option<&str>, local: &str) -> bool {
        self.uri.as_deref() == uri && &*self.local == local
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Declared type of an attribute, as assigned by a validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeType {
    #[default]
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation,
    Enumeration,
}

impl From<&AttType> for AttributeType {
    fn from(t: &AttType) -> Self {
        match t {
            AttType::CData => AttributeType::CData,
            AttType::Id => AttributeType::Id,
            AttType::IdRef => AttributeType::IdRef,
            AttType::IdRefs => AttributeType::IdRefs,
            AttType::Entity => AttributeType::Entity,
            AttType::Entities => AttributeType::Entities,
            AttType::NmToken => AttributeType::NmToken,
            AttType::NmTokens => AttributeType::NmTokens,
            AttType::Notation(_) => AttributeType::Notation,
            AttType::Enumeration(_) => AttributeType::Enumeration,
        }
    }
}

/// One attribute of a start tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: QName,
    /// Normalized value.
    pub value: String,
    pub attr_type: AttributeType,
    /// False when a validator injected the value from a declared default.
    pub specified: bool,
}

impl Attribute {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Attribute {
            name,
            value: value.into(),
            attr_type: AttributeType::CData,
            specified: true,
        }
    }

    /// Namespace declaration (`xmlns` or `xmlns:p`).
    pub fn is_namespace_declaration(&self) -> bool {
        &*self.name.raw == "xmlns" || self.name.prefix.as_deref() == Some("xmlns")
    }
}

/// Document content events.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    StartDocument {
        version: XmlVersion,
        encoding: Option<String>,
        standalone: Option<bool>,
        system_id: Option<Arc<str>>,
    },
    /// `<!DOCTYPE>`; DTD events for its subsets follow.
    DoctypeDecl {
        root: Symbol,
        public_id: Option<String>,
        system_id: Option<String>,
        has_internal_subset: bool,
    },
    StartElement {
        name: QName,
        attributes: Vec<Attribute>,
    },
    EndElement {
        name: QName,
    },
    Characters(String),
    /// Whitespace in element-only content.
    IgnorableWhitespace(String),
    Comment(String),
    ProcessingInstruction {
        target: Symbol,
        data: String,
    },
    StartCData,
    EndCData,
    /// Start of a general entity reference; its expansion follows.
    StartEntity {
        name: Symbol,
        public_id: Option<String>,
        system_id: Option<String>,
        /// One of the five predefined entities.
        builtin: bool,
    },
    EndEntity {
        name: Symbol,
    },
    EndDocument,
}

/// Declaration events from the DTD.
#[derive(Debug, Clone, PartialEq)]
pub enum DtdEvent {
    StartDtd {
        root: Symbol,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    StartExternalSubset {
        system_id: Option<Arc<str>>,
    },
    EndExternalSubset,
    ElementDecl(Arc<ElementDecl>),
    AttributeDecl(Arc<AttDef>),
    InternalEntityDecl(Arc<EntityDecl>),
    ExternalEntityDecl(Arc<EntityDecl>),
    UnparsedEntityDecl(Arc<EntityDecl>),
    NotationDecl(Arc<NotationDecl>),
    Comment(String),
    ProcessingInstruction {
        target: Symbol,
        data: String,
    },
    EndDtd {
        /// Text of the internal subset, if there was one.
        internal_subset: Option<String>,
    },
}

impl DtdEvent {
    /// The declaration event for an entity.
    pub fn entity(decl: Arc<EntityDecl>) -> Self {
        if decl.is_unparsed() {
            DtdEvent::UnparsedEntityDecl(decl)
        } else if decl.is_external() {
            DtdEvent::ExternalEntityDecl(decl)
        } else {
            DtdEvent::InternalEntityDecl(decl)
        }
    }

    /// The entity declaration carried by this event, if any.
    pub fn entity_decl(&self) -> Option<&Arc<EntityDecl>> {
        match self {
            DtdEvent::InternalEntityDecl(d)
            | DtdEvent::ExternalEntityDecl(d)
            | DtdEvent::UnparsedEntityDecl(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_event_kind() {
        let internal = Arc::new(EntityDecl::internal(Symbol::detached("e"), "x"));
        assert!(matches!(DtdEvent::entity(internal), DtdEvent::InternalEntityDecl(_)));

        let mut external = EntityDecl::internal(Symbol::detached("x"), "");
        external.value = None;
        external.system_id = Some("x.ent".into());
        let external = Arc::new(external);
        assert!(matches!(DtdEvent::entity(external.clone()), DtdEvent::ExternalEntityDecl(_)));

        let mut unparsed = (*external).clone();
        unparsed.notation = Some(Symbol::detached("gif"));
        let event = DtdEvent::entity(Arc::new(unparsed));
        assert!(matches!(event, DtdEvent::UnparsedEntityDecl(_)));
        assert!(event.entity_decl().is_some());
    }

    #[test]
    fn test_namespace_declaration_detection() {
        let xmlns = Attribute::new(QName::simple(Symbol::detached("xmlns")), "urn:a");
        let prefixed = Attribute::new(
            QName::new(
                Some(Symbol::detached("xmlns")),
                Symbol::detached("p"),
                Symbol::detached("xmlns:p"),
            ),
            "urn:p",
        );
        let plain = Attribute::new(QName::simple(Symbol::detached("id")), "1");
        assert!(xmlns.is_namespace_declaration());
        assert!(prefixed.is_namespace_declaration());
        assert!(!plain.is_namespace_declaration());
    }
}
