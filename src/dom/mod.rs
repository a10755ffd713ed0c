//! DOM Module
//!
//! Two tree representations filled by the [`DocumentBuilder`]:
//! - Eager: owned [`Document`] of [`Node`] values
//! - Deferred: [`DeferredDocument`] arena of records addressed by [`NodeHandle`]
//!
//! The representation is picked per parse through the document-factory
//! property (or the defer-node-expansion feature).

pub mod builder;
pub mod deferred;
pub mod document;
pub mod node;

pub use builder::DocumentBuilder;
pub use deferred::{DeferredDocument, NodeHandle};
pub use document::{Document, DocumentInfo};
pub use node::{
    Attr, DocumentType, Element, Entity, EntityReference, Node, NodeKind, Notation,
    ProcessingInstruction,
};

use std::fmt;
use std::str::FromStr;

use crate::config::names;
use crate::config::registry::PropertyValue;
use crate::error::ConfigError;

/// Tree builder strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DocumentFactory {
    /// Owned node objects.
    Eager,
    /// Arena of records, materialized on demand.
    #[default]
    Deferred,
}

impl DocumentFactory {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentFactory::Eager => "eager",
            DocumentFactory::Deferred => "deferred",
        }
    }

    pub fn is_deferred(self) -> bool {
        self == DocumentFactory::Deferred
    }

    /// Interpret a document-factory property value.
    pub fn from_property(value: &PropertyValue) -> Result<Self, ConfigError> {
        match value {
            PropertyValue::DocumentFactory(f) => Ok(*f),
            PropertyValue::Str(s) => s.parse(),
            other => Err(ConfigError::not_supported(
                names::DOCUMENT_FACTORY,
                format!("expected a document factory, got {}", other.type_name()),
            )),
        }
    }
}

impl fmt::Display for DocumentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentFactory {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eager" => Ok(DocumentFactory::Eager),
            "deferred" => Ok(DocumentFactory::Deferred),
            other => Err(ConfigError::not_supported(
                names::DOCUMENT_FACTORY,
                format!("unknown document factory \"{}\"", other),
            )),
        }
    }
}

/// The result of a parse, in whichever representation was configured.
#[derive(Debug, Clone)]
pub enum ParsedDocument {
    Eager(Document),
    Deferred(DeferredDocument),
}

impl ParsedDocument {
    pub fn factory(&self) -> DocumentFactory {
        match self {
            ParsedDocument::Eager(_) => DocumentFactory::Eager,
            ParsedDocument::Deferred(_) => DocumentFactory::Deferred,
        }
    }

    pub fn as_eager(&self) -> Option<&Document> {
        match self {
            ParsedDocument::Eager(d) => Some(d),
            ParsedDocument::Deferred(_) => None,
        }
    }

    pub fn as_deferred(&self) -> Option<&DeferredDocument> {
        match self {
            ParsedDocument::Deferred(d) => Some(d),
            ParsedDocument::Eager(_) => None,
        }
    }

    /// The eager tree, fully expanding a deferred document.
    pub fn into_document(self) -> Document {
        match self {
            ParsedDocument::Eager(d) => d,
            ParsedDocument::Deferred(d) => d.to_document(),
        }
    }

    pub fn info(&self) -> &DocumentInfo {
        match self {
            ParsedDocument::Eager(d) => d.info(),
            ParsedDocument::Deferred(d) => d.info(),
        }
    }
}
