//! Feature and property identifiers.
//!
//! Interoperable switches use the SAX namespace; extensions use the
//! `xmlpipe.dev` vendor namespace.

pub const SAX_FEATURE_PREFIX: &str = "http://xml.org/sax/features/";
pub const FEATURE_PREFIX: &str = "http://xmlpipe.dev/features/";
pub const PROPERTY_PREFIX: &str = "http://xmlpipe.dev/properties/";

// ============================================================================
// Standard features
// ============================================================================

/// Report validity errors against the DTD (and schema, if enabled).
pub const VALIDATION: &str = "http://xml.org/sax/features/validation";
/// Bind prefixes to namespace URIs.
pub const NAMESPACES: &str = "http://xml.org/sax/features/namespaces";
/// Expand references to external parsed general entities.
pub const EXTERNAL_GENERAL_ENTITIES: &str = "http://xml.org/sax/features/external-general-entities";
/// Expand references to external parameter entities.
pub const EXTERNAL_PARAMETER_ENTITIES: &str =
    "http://xml.org/sax/features/external-parameter-entities";
/// All names are interned. Only `true` is supported.
pub const STRING_INTERNING: &str = "http://xml.org/sax/features/string-interning";
/// XML 1.1 documents are accepted. Read-only.
pub const XML_11: &str = "http://xml.org/sax/features/xml-1.1";

// ============================================================================
// Vendor features
// ============================================================================

pub const SCHEMA_VALIDATION: &str = "http://xmlpipe.dev/features/validation/schema";
/// Validate only when a grammar is found.
pub const DYNAMIC_VALIDATION: &str = "http://xmlpipe.dev/features/validation/dynamic";
pub const WARN_ON_DUPLICATE_ATTDEF: &str =
    "http://xmlpipe.dev/features/validation/warn-on-duplicate-attdef";
pub const LOAD_EXTERNAL_DTD: &str = "http://xmlpipe.dev/features/nonvalidating/load-external-dtd";
/// Report the predefined entities as entity boundaries.
pub const NOTIFY_BUILTIN_REFS: &str = "http://xmlpipe.dev/features/scanner/notify-builtin-refs";
/// Build the arena document instead of the object tree.
pub const DEFER_NODE_EXPANSION: &str = "http://xmlpipe.dev/features/dom/defer-node-expansion";
pub const CREATE_ENTITY_REF_NODES: &str = "http://xmlpipe.dev/features/dom/create-entity-ref-nodes";
pub const INCLUDE_IGNORABLE_WHITESPACE: &str =
    "http://xmlpipe.dev/features/dom/include-ignorable-whitespace";
pub const INCLUDE_COMMENTS: &str = "http://xmlpipe.dev/features/dom/include-comments";
pub const CREATE_CDATA_NODES: &str = "http://xmlpipe.dev/features/dom/create-cdata-nodes";

// ============================================================================
// Vendor properties
// ============================================================================

pub const SYMBOL_TABLE: &str = "http://xmlpipe.dev/properties/internal/symbol-table";
pub const GRAMMAR_POOL: &str = "http://xmlpipe.dev/properties/internal/grammar-pool";
pub const ENTITY_RESOLVER: &str = "http://xmlpipe.dev/properties/internal/entity-resolver";
pub const ERROR_HANDLER: &str = "http://xmlpipe.dev/properties/internal/error-handler";
/// Tree builder strategy, `"eager"` or `"deferred"`.
pub const DOCUMENT_FACTORY: &str = "http://xmlpipe.dev/properties/dom/document-factory";
/// Maximum number of entity expansions per document.
pub const ENTITY_EXPANSION_LIMIT: &str =
    "http://xmlpipe.dev/properties/security/entity-expansion-limit";
/// Space-separated `namespace location` pairs.
pub const SCHEMA_LOCATION: &str = "http://xmlpipe.dev/properties/schema/external-schemaLocation";
pub const NO_NAMESPACE_SCHEMA_LOCATION: &str =
    "http://xmlpipe.dev/properties/schema/external-noNamespaceSchemaLocation";

/// Default for [`ENTITY_EXPANSION_LIMIT`].
pub const DEFAULT_ENTITY_EXPANSION_LIMIT: i64 = 100_000;
