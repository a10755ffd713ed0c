//! xmlpipe - streaming XML processing into DOM trees
//!
//! A document flows through a configurable pipeline:
//! scanner, DTD validator, namespace binder, schema validator, and finally
//! the document builder, which produces an eager or a deferred tree.
//!
//! - [`ParserConfiguration`]: pipeline plus the feature/property registry
//! - [`DomParser`]: a configuration guarded for use from many threads
//! - [`ConfigurationRegistry`]: named configuration constructors
//! - [`strategy::parse_all`]: batch parsing over shared caches
//!
//! Symbol tables and grammar pools come in synchronized and shadowed
//! flavors so several parsers can share them.

pub mod config;
pub mod core;
pub mod dom;
pub mod error;
pub mod grammar;
pub mod input;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod strategy;
pub mod symbols;

pub use config::{names, FeatureRegistry, ParserConfiguration, PropertyValue};
pub use dom::{DeferredDocument, Document, DocumentFactory, Node, ParsedDocument};
pub use error::{ConfigError, XmlError};
pub use input::{EntityResolver, InputSource};
pub use parser::{ConfigurationRegistry, DomParser};
pub use report::{Diagnostic, ErrorHandler, Severity};
