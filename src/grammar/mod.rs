//! Grammar Cache
//!
//! Parsed grammars (DTD or XML Schema) keyed by a [`GrammarDescription`],
//! shared between parses through a [`GrammarPool`]:
//! - [`XmlGrammarPool`]: the store itself, optionally LRU-bounded
//! - [`SynchronizedGrammarPool`]: serializes every call on a shared pool
//! - [`ShadowGrammarPool`]: private layer first, shared pool second
//!
//! Misses return `None`; no pool operation fails.

pub mod dtd;
mod pool;
pub mod schema;
mod shadow;
mod synchronized;

pub use dtd::DtdGrammar;
pub use pool::XmlGrammarPool;
pub use schema::SchemaGrammar;
pub use shadow::{ShadowGrammarPool, ShadowWrites};
pub use synchronized::SynchronizedGrammarPool;

use std::fmt;
use std::sync::Arc;

/// Kind of grammar a description refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarType {
    Dtd,
    Schema,
}

impl fmt::Display for GrammarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GrammarType::Dtd => "DTD",
            GrammarType::Schema => "XML Schema",
        })
    }
}

/// Identifies a grammar independently of any one document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GrammarDescription {
    pub grammar_type: Option<GrammarType>,
    /// Root element name from the DOCTYPE (DTD only).
    pub root_element: Option<String>,
    /// Target namespace (schema only); `None` is the no-namespace schema.
    pub target_namespace: Option<String>,
    pub public_id: Option<String>,
    /// System identifier as written in the source.
    pub literal_system_id: Option<String>,
    /// Base the literal identifier is resolved against.
    pub base_system_id: Option<String>,
    /// Absolute system identifier.
    pub expanded_system_id: Option<String>,
}

impl GrammarDescription {
    /// Describe the external subset of a DOCTYPE.
    pub fn dtd(
        root_element: &str,
        public_id: Option<&str>,
        literal_system_id: Option<&str>,
        base_system_id: Option<&str>,
        expanded_system_id: Option<&str>,
    ) -> Self {
        GrammarDescription {
            grammar_type: Some(GrammarType::Dtd),
            root_element: Some(root_element.to_string()),
            target_namespace: None,
            public_id: public_id.map(str::to_string),
            literal_system_id: literal_system_id.map(str::to_string),
            base_system_id: base_system_id.map(str::to_string),
            expanded_system_id: expanded_system_id.map(str::to_string),
        }
    }

    /// Describe a schema by target namespace.
    pub fn schema(target_namespace: Option<&str>) -> Self {
        GrammarDescription {
            grammar_type: Some(GrammarType::Schema),
            target_namespace: target_namespace.map(str::to_string),
            ..Default::default()
        }
    }

    /// Attach the location a schema was loaded from.
    pub fn with_location(mut self, literal: Option<&str>, expanded: Option<&str>) -> Self {
        self.literal_system_id = literal.map(str::to_string);
        self.expanded_system_id = expanded.map(str::to_string);
        self
    }

    /// Cache key: DTDs are identified by where they live, schemas by the
    /// namespace they describe.
    pub fn key(&self) -> GrammarKey {
        match self.grammar_type {
            Some(GrammarType::Schema) => GrammarKey::Schema(self.target_namespace.clone()),
            _ => GrammarKey::Dtd(
                self.expanded_system_id
                    .as_ref()
                    .or(self.literal_system_id.as_ref())
                    .or(self.public_id.as_ref())
                    .or(self.root_element.as_ref())
                    .cloned()
                    .unwrap_or_default(),
            ),
        }
    }
}

/// Identity of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GrammarKey {
    Dtd(String),
    Schema(Option<String>),
}

/// A parsed grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Grammar {
    Dtd(Arc<DtdGrammar>),
    Schema(Arc<SchemaGrammar>),
}

impl Grammar {
    pub fn grammar_type(&self) -> GrammarType {
        match self {
            Grammar::Dtd(_) => GrammarType::Dtd,
            Grammar::Schema(_) => GrammarType::Schema,
        }
    }

    pub fn description(&self) -> &GrammarDescription {
        match self {
            Grammar::Dtd(g) => g.description(),
            Grammar::Schema(g) => g.description(),
        }
    }

    pub fn as_dtd(&self) -> Option<&Arc<DtdGrammar>> {
        match self {
            Grammar::Dtd(g) => Some(g),
            Grammar::Schema(_) => None,
        }
    }

    pub fn as_schema(&self) -> Option<&Arc<SchemaGrammar>> {
        match self {
            Grammar::Schema(g) => Some(g),
            Grammar::Dtd(_) => None,
        }
    }

    /// Check whether two handles point to the same stored grammar.
    pub fn ptr_eq(&self, other: &Grammar) -> bool {
        match (self, other) {
            (Grammar::Dtd(a), Grammar::Dtd(b)) => Arc::ptr_eq(a, b),
            (Grammar::Schema(a), Grammar::Schema(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A store of grammars shared across parses.
///
/// All methods take `&self`; implementations carry their own interior
/// locking so one pool can be handed to parsers on several threads.
pub trait GrammarPool: Send + Sync {
    /// Every grammar of `grammar_type` currently held.
    fn retrieve_initial_grammar_set(&self, grammar_type: GrammarType) -> Vec<Grammar>;

    /// The grammar matching `description`, if cached.
    fn retrieve_grammar(&self, description: &GrammarDescription) -> Option<Grammar>;

    /// Store `grammars`. Ignored while the pool is locked; grammars whose
    /// type differs from `grammar_type` are skipped.
    fn cache_grammars(&self, grammar_type: GrammarType, grammars: &[Grammar]);

    /// Stop accepting new grammars.
    fn lock_pool(&self);

    /// Accept new grammars again.
    fn unlock_pool(&self);

    /// Drop every cached grammar.
    fn clear(&self);

    fn is_locked(&self) -> bool;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn dtd_grammar(system_id: &str) -> Grammar {
        let desc = GrammarDescription::dtd("root", None, Some(system_id), None, Some(system_id));
        Grammar::Dtd(Arc::new(DtdGrammar::new(desc)))
    }

    pub fn schema_grammar(namespace: Option<&str>) -> Grammar {
        Grammar::Schema(Arc::new(SchemaGrammar::new(GrammarDescription::schema(
            namespace,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtd_key_prefers_expanded_system_id() {
        let d = GrammarDescription::dtd(
            "r",
            Some("-//X//EN"),
            Some("a.dtd"),
            None,
            Some("file:///a.dtd"),
        );
        assert_eq!(d.key(), GrammarKey::Dtd("file:///a.dtd".into()));
        let d = GrammarDescription::dtd("r", Some("-//X//EN"), None, None, None);
        assert_eq!(d.key(), GrammarKey::Dtd("-//X//EN".into()));
    }

    #[test]
    fn test_schema_key_is_namespace() {
        let a = GrammarDescription::schema(Some("urn:a")).with_location(Some("a.xsd"), None);
        let b = GrammarDescription::schema(Some("urn:a"));
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), GrammarDescription::schema(None).key());
    }
}
