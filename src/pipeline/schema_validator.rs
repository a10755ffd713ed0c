//! Schema Validator
//!
//! Runs after the namespace binder when schema validation is on. For each
//! element namespace it finds a [`SchemaGrammar`]:
//! 1. already in the grammar pool
//! 2. loaded from an `xsi:schemaLocation` / `xsi:noNamespaceSchemaLocation`
//!    hint, or from the external-location properties
//!
//! Loaded grammars are cached back into the pool. Elements are checked
//! against their declaration's attribute uses: required and prohibited
//! attributes, fixed values, defaults (injected unspecified) and `xs:ID`
//! typing. The root must match a global declaration.

use std::collections::HashMap;
use std::sync::Arc;

use super::events::{Attribute, AttributeType, DocumentEvent, QName};
use super::namespaces::{ns, NamespaceBinder};
use super::scanner::{DocumentScanner, ScannerOptions};
use super::{EventSink, Pipeline, PipelineComponent, PipelineContext};
use crate::config::names;
use crate::config::registry::{FeatureRegistry, PropertyValue};
use crate::error::{ConfigError, XmlError};
use crate::grammar::schema::{AttributeUse, ElementDeclaration, Usage};
use crate::grammar::{Grammar, GrammarDescription, GrammarType, SchemaGrammar};

/// Namespace of schema documents.
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

const SCHEMA_FEATURES: &[&str] = &[names::SCHEMA_VALIDATION, names::VALIDATION];
const SCHEMA_PROPERTIES: &[&str] = &[names::SCHEMA_LOCATION, names::NO_NAMESPACE_SCHEMA_LOCATION];

// ============================================================================
// Schema loading
// ============================================================================

enum CollectFrame {
    Schema,
    Element { decl: ElementDeclaration, global: bool },
    Other,
}

/// Terminal stage that turns a bound schema document into a grammar.
#[derive(Default)]
struct SchemaCollector {
    grammar: Option<SchemaGrammar>,
    frames: Vec<CollectFrame>,
    /// Prefix bindings per open element, for resolving `type` values.
    scopes: Vec<Vec<(Option<String>, String)>>,
}

impl SchemaCollector {
    fn resolve_prefix(&self, prefix: Option<&str>) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .flatten()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn is_id_type(&self, value: &str) -> bool {
        let (prefix, local) = match value.split_once(':') {
            Some((p, l)) => (Some(p), l),
            None => (None, value),
        };
        local == "ID" && self.resolve_prefix(prefix) == Some(XSD_NAMESPACE)
    }

    fn attribute_use(&self, attributes: &[Attribute]) -> Option<AttributeUse> {
        let get = |local: &str| {
            attributes
                .iter()
                .find(|a| a.name.uri.is_none() && &*a.name.local == local)
                .map(|a| a.value.clone())
        };
        let mut use_ = AttributeUse::new(get("name")?);
        use_.usage = match get("use").as_deref() {
            Some("required") => Usage::Required,
            Some("prohibited") => Usage::Prohibited,
            _ => Usage::Optional,
        };
        use_.default = get("default");
        use_.fixed = get("fixed");
        use_.is_id = get("type").is_some_and(|t| self.is_id_type(&t));
        Some(use_)
    }

    fn start(&mut self, name: &QName, attributes: &[Attribute]) {
        self.scopes.push(
            attributes
                .iter()
                .filter(|a| a.is_namespace_declaration())
                .map(|a| {
                    let prefix = a.name.prefix.as_ref().map(|_| a.name.local.to_string());
                    (prefix, a.value.clone())
                })
                .collect(),
        );

        if name.uri.as_deref() != Some(XSD_NAMESPACE) {
            self.frames.push(CollectFrame::Other);
            return;
        }
        let named = attributes
            .iter()
            .find(|a| a.name.uri.is_none() && &*a.name.local == "name")
            .map(|a| a.value.clone());
        let frame = match (&*name.local, named) {
            ("schema", _) if self.grammar.is_none() => {
                let target = attributes
                    .iter()
                    .find(|a| a.name.uri.is_none() && &*a.name.local == "targetNamespace")
                    .map(|a| a.value.as_str());
                self.grammar = Some(SchemaGrammar::new(GrammarDescription::schema(target)));
                CollectFrame::Schema
            }
            ("element", Some(element)) => CollectFrame::Element {
                decl: ElementDeclaration::new(element),
                global: matches!(self.frames.last(), Some(CollectFrame::Schema)),
            },
            ("attribute", Some(_)) => {
                let use_ = self.attribute_use(attributes);
                let owner = self.frames.iter_mut().rev().find_map(|f| match f {
                    CollectFrame::Element { decl, .. } => Some(decl),
                    _ => None,
                });
                if let (Some(owner), Some(use_)) = (owner, use_) {
                    owner.attributes.push(use_);
                }
                CollectFrame::Other
            }
            _ => CollectFrame::Other,
        };
        self.frames.push(frame);
    }

    fn end(&mut self) {
        self.scopes.pop();
        if let Some(CollectFrame::Element { decl, global }) = self.frames.pop() {
            if let Some(grammar) = self.grammar.as_mut() {
                if global {
                    grammar.add_global(decl);
                } else {
                    grammar.add_local(decl);
                }
            }
        }
    }
}

impl PipelineComponent for SchemaCollector {
    fn name(&self) -> &'static str {
        "schema-collector"
    }

    fn reset(&mut self, _settings: &FeatureRegistry) -> Result<(), XmlError> {
        *self = SchemaCollector::default();
        Ok(())
    }

    fn document_event(
        &mut self,
        event: DocumentEvent,
        _ctx: &mut PipelineContext,
        _out: &mut EventSink,
    ) -> Result<(), XmlError> {
        match &event {
            DocumentEvent::StartElement { name, attributes } => self.start(name, attributes),
            DocumentEvent::EndElement { .. } => self.end(),
            _ => {}
        }
        Ok(())
    }
}

/// Read and collect the schema document at `location`.
fn load_schema(
    location: &str,
    base: Option<&str>,
    ctx: &mut PipelineContext,
) -> Result<SchemaGrammar, XmlError> {
    let loaded = ctx.resolution.open(None, Some(location), base)?;
    let system_id = loaded.system_id.clone();
    tracing::debug!(location, system_id = ?system_id, "loading schema document");

    let options = ScannerOptions {
        load_external_dtd: false,
        ..Default::default()
    };
    let mut scanner = DocumentScanner::new(loaded, options);
    let mut registry = FeatureRegistry::new();
    registry.store_feature(names::NAMESPACES, true);
    let mut binder = NamespaceBinder::new();
    binder.reset(&registry)?;
    let mut collector = SchemaCollector::default();
    {
        let mut pipeline = Pipeline::new();
        pipeline.push(&mut binder);
        pipeline.push(&mut collector);
        while scanner.step(&mut pipeline, ctx)? {}
    }

    let mut grammar = collector
        .grammar
        .ok_or_else(|| XmlError::structural(format!("\"{}\" is not a schema document", location)))?;
    grammar.set_location(Some(location), system_id.as_deref());
    Ok(grammar)
}

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Default, Clone)]
struct Settings {
    enabled: bool,
    validation: bool,
    schema_location: Option<String>,
    no_namespace_schema_location: Option<String>,
}

/// Schema validation stage.
#[derive(Default)]
pub struct SchemaValidator {
    settings: Settings,
    /// Location hints from `xsi` attributes, first per namespace.
    hints: HashMap<Option<String>, String>,
    /// Grammar lookup result per element namespace.
    grammars: HashMap<Option<String>, Option<Arc<SchemaGrammar>>>,
    seen_root: bool,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_hints(&mut self, attributes: &[Attribute]) {
        for attr in attributes.iter().filter(|a| a.name.uri.as_deref() == Some(ns::XSI)) {
            match &*attr.name.local {
                "schemaLocation" => {
                    let tokens: Vec<&str> = attr.value.split_whitespace().collect();
                    for pair in tokens.chunks_exact(2) {
                        self.hints
                            .entry(Some(pair[0].to_string()))
                            .or_insert_with(|| pair[1].to_string());
                    }
                }
                "noNamespaceSchemaLocation" => {
                    self.hints.entry(None).or_insert_with(|| attr.value.trim().to_string());
                }
                _ => {}
            }
        }
    }

    fn location_for(&self, namespace: Option<&str>) -> Option<String> {
        if let Some(hint) = self.hints.get(&namespace.map(str::to_string)) {
            return Some(hint.clone());
        }
        match namespace {
            None => self.settings.no_namespace_schema_location.clone(),
            Some(namespace) => {
                let pairs = self.settings.schema_location.as_deref()?;
                let tokens: Vec<&str> = pairs.split_whitespace().collect();
                tokens
                    .chunks_exact(2)
                    .find(|pair| pair[0] == namespace)
                    .map(|pair| pair[1].to_string())
            }
        }
    }

    fn load(
        &mut self,
        location: &str,
        ctx: &mut PipelineContext,
    ) -> Result<Option<Arc<SchemaGrammar>>, XmlError> {
        let saved = ctx.location.clone();
        let base = saved.system_id.clone();
        // The schema document's own diagnostics do not belong to this parse.
        let reporter = std::mem::take(&mut ctx.reporter);
        let result = load_schema(location, base.as_deref(), ctx);
        ctx.reporter = reporter;
        ctx.location = saved;
        match result {
            Ok(grammar) => Ok(Some(Arc::new(grammar))),
            Err(e) => {
                ctx.error(format!("schema document \"{}\" could not be loaded: {}", location, e))?;
                Ok(None)
            }
        }
    }

    fn grammar_for(
        &mut self,
        namespace: Option<&str>,
        ctx: &mut PipelineContext,
    ) -> Result<Option<Arc<SchemaGrammar>>, XmlError> {
        let key = namespace.map(str::to_string);
        if let Some(found) = self.grammars.get(&key) {
            return Ok(found.clone());
        }

        let description = GrammarDescription::schema(namespace);
        let mut found = ctx
            .grammar_pool
            .as_ref()
            .and_then(|pool| pool.retrieve_grammar(&description))
            .and_then(|g| g.as_schema().cloned());
        if found.is_some() {
            tracing::debug!(namespace = ?namespace, "schema grammar cache hit");
        } else if let Some(location) = self.location_for(namespace) {
            found = self.load(&location, ctx)?;
            if let Some(grammar) = &found {
                if grammar.target_namespace() != namespace {
                    ctx.error(format!(
                        "schema document \"{}\" has target namespace {:?}, expected {:?}",
                        location,
                        grammar.target_namespace(),
                        namespace
                    ))?;
                    found = None;
                } else if let Some(pool) = &ctx.grammar_pool {
                    pool.cache_grammars(GrammarType::Schema, &[Grammar::Schema(grammar.clone())]);
                }
            }
        }
        self.grammars.insert(key, found.clone());
        Ok(found)
    }

    fn start_element(
        &mut self,
        name: &QName,
        attributes: &mut Vec<Attribute>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let root = !self.seen_root;
        self.seen_root = true;
        self.collect_hints(attributes);
        let validation = self.settings.validation;

        let grammar = self.grammar_for(name.uri.as_deref(), ctx)?;
        let decl = grammar.as_ref().and_then(|g| {
            if root {
                g.global_element(&name.local)
            } else {
                g.element(&name.local)
            }
        });
        let Some(decl) = decl else {
            if root && validation {
                ctx.error(format!("cannot find the declaration of element \"{}\"", name.raw))?;
            }
            return Ok(());
        };

        for attr in attributes.iter_mut() {
            // Qualified attributes (xmlns, xsi, foreign) are not checked.
            if attr.is_namespace_declaration() || attr.name.uri.is_some() {
                continue;
            }
            match decl.attribute(&attr.name.local) {
                Some(use_) if use_.usage == Usage::Prohibited => {
                    if validation {
                        ctx.error(format!(
                            "attribute \"{}\" is prohibited in element \"{}\"",
                            attr.name.raw, name.raw
                        ))?;
                    }
                }
                Some(use_) => {
                    if use_.is_id {
                        attr.attr_type = AttributeType::Id;
                    }
                    if let Some(fixed) = &use_.fixed {
                        if validation && &attr.value != fixed {
                            ctx.error(format!(
                                "attribute \"{}\" of element \"{}\" must have the \
                                 fixed value \"{}\"",
                                attr.name.raw, name.raw, fixed
                            ))?;
                        }
                    }
                }
                None if validation => {
                    ctx.error(format!(
                        "attribute \"{}\" is not allowed to appear in element \"{}\"",
                        attr.name.raw, name.raw
                    ))?;
                }
                None => {}
            }
        }

        for use_ in &decl.attributes {
            let present = attributes
                .iter()
                .any(|a| a.name.uri.is_none() && *a.name.local == *use_.name);
            if present || use_.usage == Usage::Prohibited {
                continue;
            }
            if use_.usage == Usage::Required {
                if validation {
                    ctx.error(format!(
                        "attribute \"{}\" must appear on element \"{}\"",
                        use_.name, name.raw
                    ))?;
                }
            } else if let Some(value) = use_.value_constraint() {
                let mut attr = Attribute::new(QName::simple(ctx.symbols.intern(&use_.name)), value);
                attr.specified = false;
                if use_.is_id {
                    attr.attr_type = AttributeType::Id;
                }
                attributes.push(attr);
            }
        }
        Ok(())
    }
}

fn schema_location_property(
    name: &str,
    value: Option<&PropertyValue>,
) -> Result<Option<String>, ConfigError> {
    match value {
        None => Ok(None),
        Some(PropertyValue::Str(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ConfigError::not_supported(
            name,
            format!("expected a string, got {}", other.type_name()),
        )),
    }
}

impl PipelineComponent for SchemaValidator {
    fn name(&self) -> &'static str {
        "schema-validator"
    }

    fn recognized_features(&self) -> &'static [&'static str] {
        SCHEMA_FEATURES
    }

    fn recognized_properties(&self) -> &'static [&'static str] {
        SCHEMA_PROPERTIES
    }

    fn set_property(
        &mut self,
        name: &str,
        value: Option<&PropertyValue>,
    ) -> Result<(), ConfigError> {
        if SCHEMA_PROPERTIES.contains(&name) {
            schema_location_property(name, value)?;
        }
        Ok(())
    }

    fn reset(&mut self, settings: &FeatureRegistry) -> Result<(), XmlError> {
        let location = |name: &str| schema_location_property(name, settings.property(name));
        *self = SchemaValidator {
            settings: Settings {
                enabled: settings.feature(names::SCHEMA_VALIDATION),
                validation: settings.feature(names::VALIDATION),
                schema_location: location(names::SCHEMA_LOCATION)?,
                no_namespace_schema_location: location(names::NO_NAMESPACE_SCHEMA_LOCATION)?,
            },
            ..Default::default()
        };
        Ok(())
    }

    fn in_pipeline(&self) -> bool {
        self.settings.enabled
    }

    fn document_event(
        &mut self,
        event: DocumentEvent,
        ctx: &mut PipelineContext,
        out: &mut EventSink,
    ) -> Result<(), XmlError> {
        match event {
            DocumentEvent::StartElement { name, mut attributes } => {
                self.start_element(&name, &mut attributes, ctx)?;
                out.document(DocumentEvent::StartElement { name, attributes });
            }
            other => out.document(other),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{GrammarPool, XmlGrammarPool};
    use crate::input::{load, InputSource, Resolution};
    use crate::pipeline::test_support::{context, Recorder};
    use crate::report::Severity;

    const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:t">
  <xs:element name="root">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="item">
          <xs:complexType>
            <xs:attribute name="id" type="xs:ID" use="required"/>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
      <xs:attribute name="version" type="xs:string" fixed="1.0"/>
      <xs:attribute name="lang" default="en"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

    fn resolver() -> Resolution {
        let resolve = |_: Option<&str>,
                       system_id: Option<&str>,
                       _: Option<&str>|
         -> Result<Option<InputSource>, XmlError> {
            Ok(match system_id {
                Some("t.xsd") => {
                    Some(InputSource::from_text(SCHEMA).with_system_id("file:///t.xsd"))
                }
                _ => None,
            })
        };
        Resolution::new(Some(Arc::new(resolve)))
    }

    struct Run {
        recorder: Recorder,
        ctx: PipelineContext,
    }

    fn validate(xml: &str, ctx: PipelineContext) -> Run {
        let mut registry = FeatureRegistry::new();
        registry.store_feature(names::NAMESPACES, true);
        registry.store_feature(names::VALIDATION, true);
        registry.store_feature(names::SCHEMA_VALIDATION, true);
        let mut binder = NamespaceBinder::new();
        binder.reset(&registry).unwrap();
        let mut validator = SchemaValidator::new();
        validator.reset(&registry).unwrap();
        assert!(validator.in_pipeline());

        let source = load(InputSource::from_text(xml)).unwrap();
        let mut scanner = DocumentScanner::new(source, ScannerOptions::default());
        let mut recorder = Recorder::default();
        let mut ctx = ctx;
        {
            let mut pipeline = Pipeline::new();
            pipeline.push(&mut binder);
            pipeline.push(&mut validator);
            pipeline.push(&mut recorder);
            while scanner.step(&mut pipeline, &mut ctx).unwrap() {}
        }
        Run { recorder, ctx }
    }

    fn errors(run: &Run) -> Vec<String> {
        run.ctx
            .reporter
            .diagnostics()
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.message.clone())
            .collect()
    }

    fn start_elements(run: &Run) -> Vec<Vec<Attribute>> {
        run.recorder
            .documents()
            .into_iter()
            .filter_map(|e| match e {
                DocumentEvent::StartElement { attributes, .. } => Some(attributes.clone()),
                _ => None,
            })
            .collect()
    }

    fn hinted(body: &str) -> String {
        format!(
            "<root xmlns='urn:t' xmlns:xsi='http://www.w3.org/2001/XMLSchema-instance' \
             xsi:schemaLocation='urn:t t.xsd'>{}</root>",
            body
        )
    }

    #[test]
    fn test_schema_from_hint_applies_attribute_uses() {
        let mut ctx = context();
        ctx.resolution = resolver();
        let run = validate(&hinted("<item id='a'/><item/>"), ctx);

        let elements = start_elements(&run);
        let root = &elements[0];
        let version = root.iter().find(|a| &*a.name.local == "version").unwrap();
        assert_eq!(version.value, "1.0");
        assert!(!version.specified);
        assert!(root.iter().any(|a| &*a.name.local == "lang" && a.value == "en"));
        assert_eq!(elements[1][0].attr_type, AttributeType::Id);

        let errors = errors(&run);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("\"id\" must appear"));
    }

    #[test]
    fn test_loaded_grammar_is_cached_in_pool() {
        let pool: Arc<dyn GrammarPool> = Arc::new(XmlGrammarPool::new());
        let mut ctx = context();
        ctx.resolution = resolver();
        ctx.grammar_pool = Some(pool.clone());
        validate(&hinted("<item id='a'/>"), ctx);

        let cached = pool.retrieve_grammar(&GrammarDescription::schema(Some("urn:t"))).unwrap();
        let grammar = cached.as_schema().unwrap();
        assert!(grammar.global_element("root").is_some());
        assert!(grammar.global_element("item").is_none());
        assert_eq!(grammar.description().expanded_system_id.as_deref(), Some("file:///t.xsd"));
    }

    #[test]
    fn test_fixed_and_undeclared_attributes() {
        let mut ctx = context();
        ctx.resolution = resolver();
        let xml = "<root xmlns='urn:t' xmlns:xsi='http://www.w3.org/2001/XMLSchema-instance' \
                   xsi:schemaLocation='urn:t t.xsd' version='2.0' extra='x'/>";
        let errors = errors(&validate(xml, ctx));
        assert!(errors.iter().any(|e| e.contains("fixed value \"1.0\"")));
        assert!(errors.iter().any(|e| e.contains("\"extra\" is not allowed")));
    }

    #[test]
    fn test_root_must_be_global() {
        let mut ctx = context();
        ctx.resolution = resolver();
        let xml = "<item xmlns='urn:t' xmlns:xsi='http://www.w3.org/2001/XMLSchema-instance' \
                   xsi:schemaLocation='urn:t t.xsd' id='a'/>";
        let errors = errors(&validate(xml, ctx));
        assert_eq!(errors, vec!["cannot find the declaration of element \"item\"".to_string()]);
    }

    #[test]
    fn test_pre_seeded_pool_grammar() {
        let pool: Arc<dyn GrammarPool> = Arc::new(XmlGrammarPool::new());
        let mut grammar = SchemaGrammar::new(GrammarDescription::schema(None));
        let mut decl = ElementDeclaration::new("r");
        decl.attributes.push(AttributeUse::new("known"));
        grammar.add_global(decl);
        pool.cache_grammars(GrammarType::Schema, &[Grammar::Schema(Arc::new(grammar))]);

        let mut ctx = context();
        ctx.grammar_pool = Some(pool);
        let errors = errors(&validate("<r known='1' other='2'/>", ctx));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("\"other\""));
    }

    #[test]
    fn test_missing_schema_document_is_an_error() {
        let mut ctx = context();
        ctx.resolution = resolver();
        let xml = "<r xmlns:xsi='http://www.w3.org/2001/XMLSchema-instance' \
                   xsi:noNamespaceSchemaLocation='file:///definitely/missing.xsd'/>";
        let errors = errors(&validate(xml, ctx));
        assert!(errors[0].contains("could not be loaded"));
        assert!(errors[1].contains("cannot find the declaration"));
    }

    #[test]
    fn test_location_property_must_be_string() {
        let mut validator = SchemaValidator::new();
        assert!(validator
            .set_property(names::SCHEMA_LOCATION, Some(&PropertyValue::Int(1)))
            .is_err());
        assert!(validator
            .set_property(names::SCHEMA_LOCATION, Some(&PropertyValue::from("urn:a a.xsd")))
            .is_ok());
    }
}
