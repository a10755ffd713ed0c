//! Parser Configuration
//!
//! Owns the feature/property registry and the ordered stages of the
//! pipeline:
//! - Baseline switches (validation, namespaces, external entities, ...)
//! - Scanner settings, embedder/validator stages, the document builder
//! - Forwarding of every change to each component so it can veto it
//! - Reset of every component before each parse
//! - Incremental parsing through an open parse session
//!
//! Which stages exist is decided by the constructor ([`standard`],
//! [`schema`], [`non_validating`]); which of them take part in a parse is
//! decided by their own switches at reset.
//!
//! [`standard`]: ParserConfiguration::standard
//! [`schema`]: ParserConfiguration::schema
//! [`non_validating`]: ParserConfiguration::non_validating

pub mod names;
pub mod registry;

pub use registry::{FeatureRegistry, PropertyValue};

use crate::dom::{DocumentBuilder, DocumentFactory, ParsedDocument};
use crate::error::{ConfigError, XmlError};
use crate::input::{load, InputSource, Resolution};
use crate::pipeline::dtd_validator::DtdValidator;
use crate::pipeline::namespaces::NamespaceBinder;
use crate::pipeline::scanner::{DocumentScanner, ScannerSettings};
use crate::pipeline::schema_validator::SchemaValidator;
use crate::pipeline::{Pipeline, PipelineComponent, PipelineContext};
use crate::report::{Diagnostic, ErrorReporter};
use crate::symbols::{SymbolSource, SymbolTable};

const BASELINE_FEATURES: &[&str] = &[
    names::VALIDATION,
    names::NAMESPACES,
    names::EXTERNAL_GENERAL_ENTITIES,
    names::EXTERNAL_PARAMETER_ENTITIES,
    names::STRING_INTERNING,
    names::XML_11,
];

const BASELINE_PROPERTIES: &[&str] = &[
    names::SYMBOL_TABLE,
    names::GRAMMAR_POOL,
    names::ENTITY_RESOLVER,
    names::ERROR_HANDLER,
];

/// Switches that cannot change while a parse is open.
const PARSE_LOCKED: &[&str] = &[names::DOCUMENT_FACTORY, names::DEFER_NODE_EXPANSION];

/// State of one open parse.
struct ParseSession {
    scanner: DocumentScanner,
    ctx: PipelineContext,
}

/// A configured pipeline that parses documents one at a time.
pub struct ParserConfiguration {
    registry: FeatureRegistry,
    scanner: ScannerSettings,
    /// Stages between the scanner and the builder, in delivery order.
    components: Vec<Box<dyn PipelineComponent>>,
    builder: DocumentBuilder,
    session: Option<ParseSession>,
    /// Diagnostics of the last finished parse.
    diagnostics: Vec<Diagnostic>,
}

impl Default for ParserConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserConfiguration {
    /// A configuration with the scanner and builder only.
    pub fn new() -> Self {
        let mut registry = FeatureRegistry::new();
        registry.add_recognized_features(BASELINE_FEATURES);
        registry.add_recognized_properties(BASELINE_PROPERTIES);
        registry.store_feature(names::VALIDATION, false);
        registry.store_feature(names::NAMESPACES, true);
        registry.store_feature(names::EXTERNAL_GENERAL_ENTITIES, true);
        registry.store_feature(names::EXTERNAL_PARAMETER_ENTITIES, true);
        registry.store_feature(names::STRING_INTERNING, true);
        registry.store_feature(names::XML_11, true);
        for name in PARSE_LOCKED {
            registry.lock_during_parse(name);
        }

        let mut config = ParserConfiguration {
            registry,
            scanner: ScannerSettings::new(),
            components: Vec::new(),
            builder: DocumentBuilder::new(),
            session: None,
            diagnostics: Vec::new(),
        };
        register_component(&mut config.registry, &config.scanner);
        register_component(&mut config.registry, &config.builder);
        config
    }

    /// Namespace-aware configuration with DTD processing.
    pub fn standard() -> Self {
        let mut config = Self::new();
        config.push_component(Box::new(DtdValidator::new()));
        config.push_component(Box::new(NamespaceBinder::new()));
        config
    }

    /// [`standard`](Self::standard) plus schema validation, on by default.
    pub fn schema() -> Self {
        let mut config = Self::standard();
        config.push_component(Box::new(SchemaValidator::new()));
        config.registry.store_feature(names::VALIDATION, true);
        config.registry.store_feature(names::SCHEMA_VALIDATION, true);
        config
    }

    /// No validator stages: defaults and attribute types are never applied.
    pub fn non_validating() -> Self {
        let mut config = Self::new();
        config.push_component(Box::new(NamespaceBinder::new()));
        config
    }

    fn push_component(&mut self, component: Box<dyn PipelineComponent>) {
        register_component(&mut self.registry, component.as_ref());
        self.components.push(component);
    }

    /// Names of the attached stages in delivery order, builder last.
    pub fn component_names(&self) -> Vec<&'static str> {
        self.components
            .iter()
            .map(|c| c.name())
            .chain(std::iter::once(self.builder.name()))
            .collect()
    }

    /// Splice a stage into the pipeline at `position` (0 = right after the
    /// scanner). Its recognized names join the registry.
    pub fn insert_component(
        &mut self,
        position: usize,
        component: Box<dyn PipelineComponent>,
    ) -> Result<(), XmlError> {
        if self.session.is_some() {
            return Err(XmlError::AlreadyParsing);
        }
        if position > self.components.len() {
            return Err(XmlError::structural(format!(
                "cannot insert a stage at {} in a pipeline of {} stages",
                position,
                self.components.len()
            )));
        }
        tracing::debug!(component = component.name(), position, "inserting pipeline stage");
        register_component(&mut self.registry, component.as_ref());
        self.components.insert(position, component);
        Ok(())
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn is_parsing(&self) -> bool {
        self.session.is_some()
    }

    fn check_locked(&self, name: &str) -> Result<(), ConfigError> {
        if self.session.is_some() && self.registry.is_parse_locked(name) {
            return Err(ConfigError::ParseInProgress { name: name.to_string() });
        }
        Ok(())
    }

    /// Offer a change to every component; the first veto wins.
    fn forward(
        &mut self,
        mut offer: impl FnMut(&mut dyn PipelineComponent) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        offer(&mut self.scanner)?;
        for component in self.components.iter_mut() {
            offer(component.as_mut())?;
        }
        offer(&mut self.builder)
    }

    // ========================================================================
    // Features and properties
    // ========================================================================

    pub fn set_feature(&mut self, name: &str, state: bool) -> Result<(), ConfigError> {
        self.registry.check_feature(name)?;
        self.check_locked(name)?;
        match name {
            names::STRING_INTERNING if !state => {
                return Err(ConfigError::not_supported(name, "names are always interned"));
            }
            names::XML_11 if state != self.registry.feature(name) => {
                return Err(ConfigError::not_supported(name, "read-only"));
            }
            _ => {}
        }
        self.forward(|c| c.set_feature(name, state))?;
        self.registry.store_feature(name, state);
        if name == names::DEFER_NODE_EXPANSION {
            let factory = if state { DocumentFactory::Deferred } else { DocumentFactory::Eager };
            self.registry.store_property(names::DOCUMENT_FACTORY, Some(factory.into()));
        }
        tracing::trace!(name, state, "feature set");
        Ok(())
    }

    pub fn get_feature(&self, name: &str) -> Result<bool, ConfigError> {
        self.registry.get_feature(name)
    }

    /// Set or (with `None`) clear a property.
    pub fn set_property(
        &mut self,
        name: &str,
        value: Option<PropertyValue>,
    ) -> Result<(), ConfigError> {
        self.registry.check_property(name)?;
        self.check_locked(name)?;
        let value = match value {
            Some(v) => Some(check_property_type(name, v)?),
            None => None,
        };
        self.forward(|c| c.set_property(name, value.as_ref()))?;
        if name == names::DOCUMENT_FACTORY {
            let factory = value
                .as_ref()
                .and_then(PropertyValue::as_document_factory)
                .unwrap_or_default();
            self.registry.store_feature(names::DEFER_NODE_EXPANSION, factory.is_deferred());
        }
        tracing::trace!(name, value = ?value, "property set");
        self.registry.store_property(name, value);
        Ok(())
    }

    pub fn get_property(&self, name: &str) -> Result<Option<PropertyValue>, ConfigError> {
        self.registry.get_property(name).map(|v| v.cloned())
    }

    /// Reset every component from the registry, in attachment order.
    pub fn reset(&mut self) -> Result<(), XmlError> {
        if self.session.is_some() {
            return Err(XmlError::AlreadyParsing);
        }
        let registry = &self.registry;
        self.scanner.reset(registry)?;
        for component in self.components.iter_mut() {
            component.reset(registry)?;
        }
        self.builder.reset(registry)?;
        tracing::debug!(stages = ?self.component_names(), "configuration reset");
        Ok(())
    }

    // ========================================================================
    // Parsing
    // ========================================================================

    fn open_context(&self) -> PipelineContext {
        let symbols: Box<dyn SymbolSource> = match self
            .registry
            .property(names::SYMBOL_TABLE)
            .and_then(PropertyValue::as_symbol_table)
        {
            Some(table) => table.open(),
            None => Box::new(SymbolTable::new()),
        };
        let handler = self
            .registry
            .property(names::ERROR_HANDLER)
            .and_then(PropertyValue::as_error_handler)
            .cloned();
        let pool = self
            .registry
            .property(names::GRAMMAR_POOL)
            .and_then(PropertyValue::as_grammar_pool)
            .cloned();
        let resolver = self
            .registry
            .property(names::ENTITY_RESOLVER)
            .and_then(PropertyValue::as_entity_resolver)
            .cloned();
        PipelineContext::new(symbols, ErrorReporter::new(handler), pool, Resolution::new(resolver))
    }

    /// Reset and open an incremental parse of `source`.
    pub fn set_input_source(&mut self, source: InputSource) -> Result<(), XmlError> {
        if self.session.is_some() {
            return Err(XmlError::AlreadyParsing);
        }
        self.reset()?;
        self.diagnostics.clear();
        let loaded = load(source)?;
        let scanner = DocumentScanner::new(loaded, self.scanner.options());
        self.session = Some(ParseSession {
            scanner,
            ctx: self.open_context(),
        });
        Ok(())
    }

    /// Scan one top-level item. Returns `Ok(false)` once the document is
    /// complete; the session is closed then or on the first error.
    pub fn parse_step(&mut self) -> Result<bool, XmlError> {
        let Some(session) = self.session.as_mut() else {
            return Err(XmlError::structural("no input source is set"));
        };
        let result = {
            let mut pipeline = Pipeline::new();
            for component in self.components.iter_mut() {
                pipeline.push(component.as_mut());
            }
            pipeline.push(&mut self.builder);
            session.scanner.step(&mut pipeline, &mut session.ctx)
        };
        match result {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.close_session();
                Ok(false)
            }
            Err(e) => {
                self.close_session();
                Err(e)
            }
        }
    }

    fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            self.diagnostics = session.ctx.reporter.take_diagnostics();
            tracing::debug!(diagnostics = self.diagnostics.len(), "parse session closed");
        }
    }

    /// Run the open parse to the end and take its document.
    pub fn finish_parse(&mut self) -> Result<ParsedDocument, XmlError> {
        while self.session.is_some() {
            self.parse_step()?;
        }
        if !self.builder.is_complete() {
            return Err(XmlError::structural("no completed parse to finish"));
        }
        self.builder
            .take_document()
            .ok_or_else(|| XmlError::structural("no completed parse to finish"))
    }

    /// Parse a whole document.
    pub fn parse(&mut self, source: InputSource) -> Result<ParsedDocument, XmlError> {
        if self.session.is_some() {
            return Err(XmlError::AlreadyParsing);
        }
        self.set_input_source(source)?;
        self.finish_parse()
    }

    /// The tree built by a parse that stopped early, closed at the point of
    /// failure. `None` while a parse is open or when nothing was built.
    pub fn take_partial_document(&mut self) -> Option<ParsedDocument> {
        if self.session.is_some() {
            return None;
        }
        self.builder.take_document()
    }

    /// Diagnostics of the open parse, or of the last one.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match &self.session {
            Some(session) => session.ctx.reporter.diagnostics(),
            None => &self.diagnostics,
        }
    }
}

fn register_component(registry: &mut FeatureRegistry, component: &dyn PipelineComponent) {
    registry.add_recognized_features(component.recognized_features());
    registry.add_recognized_properties(component.recognized_properties());
    for (name, state) in component.feature_defaults() {
        registry.store_feature_default(name, state);
    }
    for (name, value) in component.property_defaults() {
        registry.store_property_default(name, value);
    }
    tracing::trace!(component = component.name(), "component registered");
}

/// Check the value type of the object-valued baseline properties and
/// normalize the document factory.
fn check_property_type(name: &str, value: PropertyValue) -> Result<PropertyValue, ConfigError> {
    let ok = match name {
        names::SYMBOL_TABLE => value.as_symbol_table().is_some(),
        names::GRAMMAR_POOL => value.as_grammar_pool().is_some(),
        names::ENTITY_RESOLVER => value.as_entity_resolver().is_some(),
        names::ERROR_HANDLER => value.as_error_handler().is_some(),
        names::DOCUMENT_FACTORY => {
            return DocumentFactory::from_property(&value).map(PropertyValue::DocumentFactory);
        }
        _ => true,
    };
    if ok {
        Ok(value)
    } else {
        Err(ConfigError::not_supported(
            name,
            format!("unexpected value type {}", value.type_name()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, Node, NodeKind};
    use crate::grammar::{GrammarPool, XmlGrammarPool};
    use crate::pipeline::{DocumentEvent, EventSink};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn parse_with(config: &mut ParserConfiguration, xml: &str) -> Result<ParsedDocument, XmlError> {
        config.parse(InputSource::from_text(xml))
    }

    fn eager(xml: &str) -> Document {
        let mut config = ParserConfiguration::standard();
        config.set_feature(names::DEFER_NODE_EXPANSION, false).unwrap();
        let parsed = parse_with(&mut config, xml).unwrap();
        assert_eq!(parsed.factory(), DocumentFactory::Eager);
        parsed.into_document()
    }

    fn deferred(xml: &str) -> Document {
        let mut config = ParserConfiguration::standard();
        let parsed = parse_with(&mut config, xml).unwrap();
        assert_eq!(parsed.factory(), DocumentFactory::Deferred);
        parsed.into_document()
    }

    #[test]
    fn test_feature_rejection_kinds() {
        let mut config = ParserConfiguration::standard();
        assert!(matches!(
            config.set_feature("no-such-switch", true),
            Err(ConfigError::NotRecognized { .. })
        ));
        assert!(matches!(
            config.set_feature(names::STRING_INTERNING, false),
            Err(ConfigError::NotSupported { .. })
        ));
        assert!(matches!(
            config.set_feature(names::XML_11, false),
            Err(ConfigError::NotSupported { .. })
        ));
        assert!(matches!(
            config.set_property(names::GRAMMAR_POOL, Some(PropertyValue::Int(1))),
            Err(ConfigError::NotSupported { .. })
        ));
        assert!(matches!(
            config.get_property("urn:unknown"),
            Err(ConfigError::NotRecognized { .. })
        ));
    }

    #[test]
    fn test_baseline_and_component_names_recognized() {
        let config = ParserConfiguration::standard();
        assert_eq!(config.get_feature(names::NAMESPACES), Ok(true));
        assert_eq!(config.get_feature(names::VALIDATION), Ok(false));
        assert_eq!(config.get_feature(names::DYNAMIC_VALIDATION), Ok(false));
        assert_eq!(config.get_feature(names::CREATE_ENTITY_REF_NODES), Ok(true));
        assert!(config.get_property(names::ENTITY_EXPANSION_LIMIT).unwrap().is_some());
        assert_eq!(
            config.component_names(),
            vec!["dtd-validator", "namespace-binder", "document-builder"]
        );

        let schema = ParserConfiguration::schema();
        assert_eq!(schema.get_feature(names::SCHEMA_VALIDATION), Ok(true));
        assert!(ParserConfiguration::non_validating()
            .get_feature(names::DYNAMIC_VALIDATION)
            .is_err());
    }

    #[test]
    fn test_factory_and_defer_feature_linked() {
        let mut config = ParserConfiguration::standard();
        config.set_property(names::DOCUMENT_FACTORY, Some("eager".into())).unwrap();
        assert_eq!(config.get_feature(names::DEFER_NODE_EXPANSION), Ok(false));
        assert_eq!(
            config
                .get_property(names::DOCUMENT_FACTORY)
                .unwrap()
                .and_then(|v| v.as_document_factory()),
            Some(DocumentFactory::Eager)
        );
        config.set_feature(names::DEFER_NODE_EXPANSION, true).unwrap();
        let parsed = parse_with(&mut config, "<r/>").unwrap();
        assert!(parsed.as_deferred().is_some());

        assert!(matches!(
            config.set_property(names::DOCUMENT_FACTORY, Some("org.example.Impl".into())),
            Err(ConfigError::NotSupported { .. })
        ));
    }

    #[test]
    fn test_locked_switches_during_incremental_parse() {
        let mut config = ParserConfiguration::standard();
        config.set_input_source(InputSource::from_text("<r><a/></r>")).unwrap();
        assert!(config.parse_step().unwrap());
        assert!(matches!(
            config.set_feature(names::DEFER_NODE_EXPANSION, false),
            Err(ConfigError::ParseInProgress { .. })
        ));
        assert!(matches!(
            config.set_property(names::DOCUMENT_FACTORY, Some("eager".into())),
            Err(ConfigError::ParseInProgress { .. })
        ));
        assert!(config.set_feature(names::INCLUDE_COMMENTS, false).is_ok());
        assert!(matches!(
            parse_with(&mut config, "<other/>"),
            Err(XmlError::AlreadyParsing)
        ));
        assert!(config.take_partial_document().is_none());

        let doc = config.finish_parse().unwrap().into_document();
        assert_eq!(doc.document_element().unwrap().child_elements().count(), 1);
        assert!(!config.is_parsing());
        assert!(config.set_feature(names::DEFER_NODE_EXPANSION, false).is_ok());
    }

    #[test]
    fn test_parse_step_without_input() {
        let mut config = ParserConfiguration::standard();
        assert!(matches!(config.parse_step(), Err(XmlError::Structural(_))));
        assert!(matches!(config.finish_parse(), Err(XmlError::Structural(_))));
    }

    #[test]
    fn test_entity_reuse_through_pipeline() {
        let xml = "<!DOCTYPE root [<!ENTITY e \"text\">]><root>&e;&e;</root>";
        for doc in [eager(xml), deferred(xml)] {
            let root = doc.document_element().unwrap();
            let references: Vec<_> = root
                .children()
                .iter()
                .filter(|n| n.kind() == NodeKind::EntityReference)
                .collect();
            assert_eq!(references.len(), 2);
            assert_eq!(references[1].children(), &[Node::Text("text".into())]);
            let entity = doc.doctype().unwrap().entity("e").unwrap();
            assert_eq!(entity.children, vec![Node::Text("text".into())]);
        }
    }

    #[test]
    fn test_builtin_references_as_nodes() {
        let xml = "<r>a&amp;b</r>";
        for defer in [false, true] {
            let mut config = ParserConfiguration::standard();
            config.set_feature(names::NOTIFY_BUILTIN_REFS, true).unwrap();
            config.set_feature(names::DEFER_NODE_EXPANSION, defer).unwrap();
            let doc = parse_with(&mut config, xml).unwrap().into_document();
            let root = doc.document_element().unwrap();
            let kinds: Vec<_> = root.children().iter().map(Node::kind).collect();
            assert_eq!(kinds, vec![NodeKind::Text, NodeKind::EntityReference, NodeKind::Text]);
            assert_eq!(root.children()[1].node_name(), "amp");
            assert_eq!(root.text_content(), "a&b");
        }
        let merged = eager(xml);
        assert_eq!(merged.document_element().unwrap().children(), &[Node::Text("a&b".into())]);
    }

    #[test]
    fn test_id_lookup_through_dtd() {
        let xml = "<!DOCTYPE r [<!ATTLIST e id ID #IMPLIED>]>\
                   <r><e id='x' n='1'/><e id='x' n='2'/><e id='y'/></r>";
        let doc = eager(xml);
        assert_eq!(doc.get_element_by_id("x").unwrap().get_attribute("n"), Some("1"));
        assert!(doc.get_element_by_id("y").is_some());

        let mut config = ParserConfiguration::standard();
        let parsed = parse_with(&mut config, xml).unwrap();
        let arena = parsed.as_deferred().unwrap();
        let x = arena.get_element_by_id("x").unwrap();
        assert_eq!(arena.get_attribute(x, "n"), Some("1"));
    }

    #[test]
    fn test_default_attributes_not_specified() {
        let xml = "<!DOCTYPE r [<!ATTLIST r a CDATA 'd' b CDATA #IMPLIED>]><r b='1'/>";
        let doc = eager(xml);
        let root = doc.document_element().unwrap();
        assert_eq!(root.get_attribute("a"), Some("d"));
        assert!(!root.get_attribute_node("a").unwrap().specified);
        assert!(root.get_attribute_node("b").unwrap().specified);

        let imported = doc.import_node(&Node::Element(root.clone()), true).unwrap();
        assert!(imported.as_element().unwrap().get_attribute("a").is_none());

        let plain = ParserConfiguration::non_validating()
            .parse(InputSource::from_text(xml))
            .unwrap()
            .into_document();
        assert!(plain.document_element().unwrap().get_attribute("a").is_none());
    }

    #[test]
    fn test_partial_document_after_fatal_error() {
        let mut config = ParserConfiguration::standard();
        let err = parse_with(&mut config, "<r><a>text</a><b></r>").unwrap_err();
        assert!(matches!(err, XmlError::Fatal(_)));
        assert!(!config.diagnostics().is_empty());
        let partial = config.take_partial_document().unwrap().into_document();
        let root = partial.document_element().unwrap();
        assert_eq!(root.child_elements().next().unwrap().text_content(), "text");
    }

    #[test]
    fn test_validation_errors_recoverable() {
        let mut config = ParserConfiguration::standard();
        config.set_feature(names::VALIDATION, true).unwrap();
        let parsed = parse_with(&mut config, "<!DOCTYPE r [<!ELEMENT r EMPTY>]><r><x/></r>");
        assert!(parsed.is_ok());
        assert!(config.diagnostics().iter().any(|d| d.message.contains("must match")));
    }

    #[test]
    fn test_grammar_pool_shared_between_parses() {
        let pool: Arc<dyn GrammarPool> = Arc::new(XmlGrammarPool::new());
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let resolver: Arc<dyn crate::input::EntityResolver> = Arc::new(
            move |_: Option<&str>,
                  system: Option<&str>,
                  _: Option<&str>|
                  -> Result<Option<InputSource>, XmlError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(
                    InputSource::from_text("<!ELEMENT r EMPTY>")
                        .with_system_id(system.unwrap_or("r.dtd")),
                ))
            },
        );
        for _ in 0..2 {
            let mut config = ParserConfiguration::standard();
            config.set_property(names::GRAMMAR_POOL, Some(pool.clone().into())).unwrap();
            config.set_property(names::ENTITY_RESOLVER, Some(resolver.clone().into())).unwrap();
            config.set_feature(names::VALIDATION, true).unwrap();
            parse_with(&mut config, "<!DOCTYPE r SYSTEM 'http://example.com/r.dtd'><r/>").unwrap();
            assert!(config.diagnostics().is_empty());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    /// Counts elements and drops comments.
    #[derive(Default)]
    struct CommentFilter {
        elements: usize,
    }

    impl PipelineComponent for CommentFilter {
        fn name(&self) -> &'static str {
            "comment-filter"
        }

        fn recognized_features(&self) -> &'static [&'static str] {
            &["urn:test:comment-filter"]
        }

        fn reset(&mut self, _settings: &FeatureRegistry) -> Result<(), XmlError> {
            self.elements = 0;
            Ok(())
        }

        fn document_event(
            &mut self,
            event: DocumentEvent,
            _ctx: &mut PipelineContext,
            out: &mut EventSink,
        ) -> Result<(), XmlError> {
            match event {
                DocumentEvent::Comment(_) => {}
                DocumentEvent::StartElement { .. } => {
                    self.elements += 1;
                    out.document(event);
                }
                other => out.document(other),
            }
            Ok(())
        }
    }

    #[test]
    fn test_insert_component_splices_stage() {
        let mut config = ParserConfiguration::standard();
        config.insert_component(2, Box::new(CommentFilter::default())).unwrap();
        assert_eq!(
            config.component_names(),
            vec!["dtd-validator", "namespace-binder", "comment-filter", "document-builder"]
        );
        assert_eq!(config.get_feature("urn:test:comment-filter"), Ok(false));
        let doc = parse_with(&mut config, "<r><!--x--><a/></r>").unwrap().into_document();
        assert_eq!(doc.document_element().unwrap().children().len(), 1);

        assert!(config.insert_component(9, Box::new(CommentFilter::default())).is_err());
    }

    #[test]
    fn test_document_info_recorded() {
        let doc = eager("<?xml version='1.0' encoding='UTF-8' standalone='yes'?><r/>");
        assert_eq!(doc.xml_encoding(), Some("UTF-8"));
        assert_eq!(doc.xml_standalone(), Some(true));
    }

    fn document_strategy() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            "[a-z ]{1,6}",
            Just("<!--c-->".to_string()),
            Just("<![CDATA[x<y]]>".to_string()),
            Just("&amp;".to_string()),
            Just("&e;".to_string()),
            Just("<?pi data?>".to_string()),
            Just("<i id='k'/>".to_string()),
        ];
        let content = leaf.prop_recursive(3, 24, 4, |inner| {
            (proptest::sample::select(vec!["a", "b", "c"]), proptest::collection::vec(inner, 0..4))
                .prop_map(|(name, children)| format!("<{0}>{1}</{0}>", name, children.concat()))
        });
        proptest::collection::vec(content, 0..5).prop_map(|children| {
            format!(
                "<!DOCTYPE root [<!ENTITY e \"t<b>u</b>\"><!ATTLIST i id ID #IMPLIED>]>\
                 <root>{}</root>",
                children.concat()
            )
        })
    }

    proptest! {
        #[test]
        fn prop_eager_and_deferred_trees_equal(xml in document_strategy()) {
            prop_assert_eq!(eager(&xml), deferred(&xml));
        }
    }
}
