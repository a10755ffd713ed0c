//! DTD Validator
//!
//! Sits right after the scanner. Whether or not validation is on it:
//! - collects declarations into a [`DtdGrammar`] and caches external subsets
//! - assigns declared attribute types and normalizes non-CDATA values
//! - injects defaulted attributes (marked unspecified)
//! - reports whitespace in element-only content as ignorable
//!
//! With `validation` on it also checks element declarations, content models,
//! attribute values, ID uniqueness and IDREF targets, reporting each problem
//! as a recoverable error.

use std::collections::HashSet;
use std::sync::Arc;

use super::events::{Attribute, AttributeType, DocumentEvent, DtdEvent, QName};
use super::{EventSink, PipelineComponent, PipelineContext};
use crate::config::names;
use crate::config::registry::FeatureRegistry;
use crate::core::chars::{collapse_whitespace, is_all_whitespace, is_name, is_nmtoken};
use crate::error::XmlError;
use crate::grammar::dtd::{AttDef, AttDefault, AttType, ContentSpec, ElementDecl};
use crate::grammar::{DtdGrammar, Grammar, GrammarDescription, GrammarType};
use crate::input::expand_system_id;
use crate::report::Location;
use crate::symbols::Symbol;

const DTD_VALIDATOR_FEATURES: &[&str] = &[
    names::VALIDATION,
    names::DYNAMIC_VALIDATION,
    names::WARN_ON_DUPLICATE_ATTDEF,
    names::SCHEMA_VALIDATION,
    names::NAMESPACES,
];

/// Open element being validated.
struct ElementState {
    decl: Option<Arc<ElementDecl>>,
    children: Vec<Symbol>,
    has_text: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Settings {
    validation: bool,
    dynamic: bool,
    warn_on_duplicate_attdef: bool,
    schema: bool,
    namespaces: bool,
}

/// DTD grammar collection and validation stage.
#[derive(Default)]
pub struct DtdValidator {
    settings: Settings,
    description: Option<GrammarDescription>,
    has_internal_subset: bool,
    /// The external subset is being replayed from the pool.
    cached: bool,
    building: Option<DtdGrammar>,
    external: Option<DtdGrammar>,
    in_external: bool,
    grammar: Option<Arc<DtdGrammar>>,
    doctype_root: Option<Symbol>,
    /// Validity checks are active for this document.
    validating: bool,
    seen_root: bool,
    elements: Vec<ElementState>,
    in_cdata: bool,
    ids: HashSet<String>,
    idrefs: Vec<(String, Location)>,
}

impl DtdValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grammar collected from the current document's DTD.
    pub fn grammar(&self) -> Option<&Arc<DtdGrammar>> {
        self.grammar.as_ref()
    }

    fn doctype(
        &mut self,
        root: &Symbol,
        public_id: Option<&str>,
        system_id: Option<&str>,
        has_internal_subset: bool,
        ctx: &mut PipelineContext,
    ) {
        let base = ctx.location.system_id.clone();
        let expanded = system_id.map(|id| expand_system_id(id, base.as_deref()));
        let description = GrammarDescription::dtd(
            root,
            public_id,
            system_id,
            base.as_deref(),
            expanded.as_deref(),
        );
        self.doctype_root = Some(root.clone());
        self.has_internal_subset = has_internal_subset;

        if system_id.is_some() && !has_internal_subset {
            if let Some(pool) = &ctx.grammar_pool {
                match pool.retrieve_grammar(&description) {
                    Some(Grammar::Dtd(grammar)) => {
                        tracing::debug!(key = ?description.key(), "DTD grammar cache hit");
                        ctx.directives.cached_dtd = Some(grammar);
                        self.cached = true;
                    }
                    _ => tracing::trace!(key = ?description.key(), "DTD grammar cache miss"),
                }
            }
        }
        self.description = Some(description);
    }

    fn declaration(&mut self, event: &DtdEvent, ctx: &mut PipelineContext) -> Result<(), XmlError> {
        let in_external = self.in_external && !self.cached;
        let Some(grammar) = self.building.as_mut() else {
            return Ok(());
        };
        match event {
            DtdEvent::ElementDecl(decl) => {
                if in_external {
                    if let Some(external) = self.external.as_mut() {
                        external.add_element(decl.clone());
                    }
                }
                if !grammar.add_element(decl.clone()) && self.settings.validation {
                    ctx.error(format!(
                        "element type \"{}\" is declared more than once",
                        decl.name
                    ))?;
                }
            }
            DtdEvent::AttributeDecl(def) => {
                if in_external {
                    if let Some(external) = self.external.as_mut() {
                        external.add_attribute(def.clone());
                    }
                }
                if !grammar.add_attribute(def.clone()) && self.settings.warn_on_duplicate_attdef {
                    ctx.warning(format!(
                        "attribute \"{}\" is already defined for element type \"{}\"",
                        def.name, def.element
                    ))?;
                }
            }
            DtdEvent::NotationDecl(decl) => {
                if in_external {
                    if let Some(external) = self.external.as_mut() {
                        external.add_notation(decl.clone());
                    }
                }
                grammar.add_notation(decl.clone());
            }
            other => {
                if let Some(decl) = other.entity_decl() {
                    if in_external {
                        if let Some(external) = self.external.as_mut() {
                            external.add_entity(decl.clone());
                        }
                    }
                    grammar.add_entity(decl.clone());
                }
            }
        }
        Ok(())
    }

    fn end_dtd(&mut self, ctx: &mut PipelineContext) -> Result<(), XmlError> {
        let grammar = Arc::new(
            self.building
                .take()
                .unwrap_or_else(|| DtdGrammar::new(GrammarDescription::default())),
        );

        let skip = self.has_internal_subset || self.cached;
        if let (Some(external), false) = (self.external.take(), skip) {
            if let Some(pool) = &ctx.grammar_pool {
                tracing::debug!(key = ?external.description().key(), "caching DTD grammar");
                pool.cache_grammars(GrammarType::Dtd, &[Grammar::Dtd(Arc::new(external))]);
            }
        }

        if self.settings.validation {
            for notation in grammar.undeclared_notations() {
                ctx.error(format!("notation \"{}\" is referenced but not declared", notation))?;
            }
        }
        self.grammar = Some(grammar);
        Ok(())
    }

    fn attribute_name(&self, raw: &Symbol, ctx: &mut PipelineContext) -> QName {
        if self.settings.namespaces {
            if let Some((prefix, local)) = raw.split_once(':') {
                if !prefix.is_empty() && !local.is_empty() {
                    let prefix = ctx.symbols.intern(prefix);
                    let local = ctx.symbols.intern(local);
                    return QName::new(Some(prefix), local, raw.clone());
                }
            }
        }
        QName::simple(raw.clone())
    }

    fn start_element(
        &mut self,
        name: &QName,
        attributes: &mut Vec<Attribute>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        if !self.seen_root {
            self.seen_root = true;
            self.validating =
                self.settings.validation && (self.grammar.is_some() || !self.settings.dynamic);
            match (&self.grammar, &self.doctype_root) {
                (None, _) if self.validating && !self.settings.schema => {
                    ctx.error("document is invalid: no grammar found")?;
                    self.validating = false;
                }
                (None, _) => self.validating = false,
                (Some(_), Some(root)) if self.validating && root != &name.raw => {
                    ctx.error(format!(
                        "document root element \"{}\" must match DOCTYPE root \"{}\"",
                        name.raw, root
                    ))?;
                }
                _ => {}
            }
        }

        let Some(grammar) = self.grammar.clone() else {
            self.elements.push(ElementState {
                decl: None,
                children: Vec::new(),
                has_text: false,
            });
            return Ok(());
        };

        if let Some(parent) = self.elements.last_mut() {
            parent.children.push(name.raw.clone());
        }
        let decl = grammar.element(&name.raw).cloned();
        if self.validating && decl.is_none() {
            ctx.error(format!("element type \"{}\" must be declared", name.raw))?;
        }

        for attr in attributes.iter_mut() {
            match grammar.attribute(&name.raw, &attr.name.raw) {
                Some(def) => {
                    attr.attr_type = AttributeType::from(&def.att_type);
                    if !def.att_type.is_cdata() {
                        attr.value = collapse_whitespace(&attr.value);
                    }
                    if self.validating {
                        self.check_value(def, &attr.value, &grammar, ctx)?;
                    }
                }
                None if self.validating => {
                    ctx.error(format!(
                        "attribute \"{}\" must be declared for element type \"{}\"",
                        attr.name.raw, name.raw
                    ))?;
                }
                None => {}
            }
        }

        for def in grammar.attributes(&name.raw) {
            if attributes.iter().any(|a| a.name.raw == def.name) {
                continue;
            }
            match def.default.value() {
                Some(value) => {
                    let mut attr = Attribute::new(self.attribute_name(&def.name, ctx), value);
                    attr.attr_type = AttributeType::from(&def.att_type);
                    attr.specified = false;
                    if self.validating {
                        self.check_value(def, value, &grammar, ctx)?;
                    }
                    attributes.push(attr);
                }
                None if self.validating && def.default == AttDefault::Required => {
                    ctx.error(format!(
                        "attribute \"{}\" is required for element type \"{}\"",
                        def.name, name.raw
                    ))?;
                }
                None => {}
            }
        }

        self.elements.push(ElementState {
            decl,
            children: Vec::new(),
            has_text: false,
        });
        Ok(())
    }

    fn check_value(
        &mut self,
        def: &AttDef,
        value: &str,
        grammar: &DtdGrammar,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let invalid = |what: &str| {
            format!(
                "attribute \"{}\" with value \"{}\" must be {}",
                def.name, value, what
            )
        };
        match &def.att_type {
            AttType::CData => {}
            AttType::Id => {
                if !is_name(value) {
                    ctx.error(invalid("a name"))?;
                } else if !self.ids.insert(value.to_string()) {
                    ctx.error(format!("ID \"{}\" is not unique", value))?;
                }
            }
            AttType::IdRef => {
                if is_name(value) {
                    self.idrefs.push((value.to_string(), ctx.location.clone()));
                } else {
                    ctx.error(invalid("a name"))?;
                }
            }
            AttType::IdRefs => {
                if value.is_empty() || !value.split(' ').all(is_name) {
                    ctx.error(invalid("a list of names"))?;
                } else {
                    for token in value.split(' ') {
                        self.idrefs.push((token.to_string(), ctx.location.clone()));
                    }
                }
            }
            AttType::Entity | AttType::Entities => {
                let many = matches!(def.att_type, AttType::Entities);
                let tokens: Vec<&str> = if many { value.split(' ').collect() } else { vec![value] };
                for token in tokens {
                    let unparsed = grammar.entity(token).is_some_and(|e| e.is_unparsed());
                    if !unparsed {
                        ctx.error(format!(
                            "attribute \"{}\" refers to \"{}\", which is not an unparsed entity",
                            def.name, token
                        ))?;
                    }
                }
            }
            AttType::NmToken => {
                if !is_nmtoken(value) {
                    ctx.error(invalid("a name token"))?;
                }
            }
            AttType::NmTokens => {
                if value.is_empty() || !value.split(' ').all(is_nmtoken) {
                    ctx.error(invalid("a list of name tokens"))?;
                }
            }
            AttType::Notation(allowed) | AttType::Enumeration(allowed) => {
                if !allowed.iter().any(|a| &**a == value) {
                    ctx.error(invalid(&format!("one of {}", def.att_type)))?;
                }
            }
        }
        if let AttDefault::Fixed(fixed) = &def.default {
            if fixed != value {
                ctx.error(format!(
                    "attribute \"{}\" has a fixed value of \"{}\"",
                    def.name, fixed
                ))?;
            }
        }
        Ok(())
    }

    fn end_element(&mut self, name: &QName, ctx: &mut PipelineContext) -> Result<(), XmlError> {
        let Some(state) = self.elements.pop() else {
            return Ok(());
        };
        if !self.validating {
            return Ok(());
        }
        let Some(decl) = state.decl else {
            return Ok(());
        };
        let valid = match &decl.content {
            ContentSpec::Empty => state.children.is_empty() && !state.has_text,
            ContentSpec::Children(_) => !state.has_text && decl.content.accepts(&state.children),
            ContentSpec::Mixed(_) | ContentSpec::Any => decl.content.accepts(&state.children),
        };
        if !valid {
            ctx.error(format!(
                "the content of element type \"{}\" must match \"{}\"",
                name.raw, decl.content
            ))?;
        }
        Ok(())
    }

    /// Classify character data against the current element's content model.
    fn characters(&mut self, text: String, out: &mut EventSink) {
        let Some(state) = self.elements.last_mut() else {
            out.document(DocumentEvent::Characters(text));
            return;
        };
        match state.decl.as_ref().map(|d| &d.content) {
            Some(ContentSpec::Children(_)) if !self.in_cdata && is_all_whitespace(&text) => {
                out.document(DocumentEvent::IgnorableWhitespace(text));
                return;
            }
            Some(ContentSpec::Children(_)) | Some(ContentSpec::Empty) => state.has_text = true,
            _ => {}
        }
        out.document(DocumentEvent::Characters(text));
    }

    fn end_document(&mut self, ctx: &mut PipelineContext) -> Result<(), XmlError> {
        if !self.validating {
            return Ok(());
        }
        let saved = ctx.location.clone();
        for (idref, location) in std::mem::take(&mut self.idrefs) {
            if !self.ids.contains(&idref) {
                ctx.location = location;
                ctx.error(format!("IDREF \"{}\" does not match any ID", idref))?;
            }
        }
        ctx.location = saved;
        Ok(())
    }
}

impl PipelineComponent for DtdValidator {
    fn name(&self) -> &'static str {
        "dtd-validator"
    }

    fn recognized_features(&self) -> &'static [&'static str] {
        DTD_VALIDATOR_FEATURES
    }

    fn feature_defaults(&self) -> Vec<(&'static str, bool)> {
        vec![
            (names::DYNAMIC_VALIDATION, false),
            (names::WARN_ON_DUPLICATE_ATTDEF, false),
        ]
    }

    fn reset(&mut self, settings: &FeatureRegistry) -> Result<(), XmlError> {
        *self = DtdValidator {
            settings: Settings {
                validation: settings.feature(names::VALIDATION),
                dynamic: settings.feature(names::DYNAMIC_VALIDATION),
                warn_on_duplicate_attdef: settings.feature(names::WARN_ON_DUPLICATE_ATTDEF),
                schema: settings.feature(names::SCHEMA_VALIDATION),
                namespaces: settings.feature(names::NAMESPACES),
            },
            ..Default::default()
        };
        Ok(())
    }

    fn document_event(
        &mut self,
        event: DocumentEvent,
        ctx: &mut PipelineContext,
        out: &mut EventSink,
    ) -> Result<(), XmlError> {
        match event {
            DocumentEvent::DoctypeDecl {
                ref root,
                ref public_id,
                ref system_id,
                has_internal_subset,
            } => {
                self.doctype(
                    root,
                    public_id.as_deref(),
                    system_id.as_deref(),
                    has_internal_subset,
                    ctx,
                );
                out.document(event);
            }
            DocumentEvent::StartElement { name, mut attributes } => {
                self.start_element(&name, &mut attributes, ctx)?;
                out.document(DocumentEvent::StartElement { name, attributes });
            }
            DocumentEvent::EndElement { ref name } => {
                self.end_element(name, ctx)?;
                out.document(event);
            }
            DocumentEvent::Characters(text) => self.characters(text, out),
            DocumentEvent::StartCData => {
                self.in_cdata = true;
                out.document(event);
            }
            DocumentEvent::EndCData => {
                self.in_cdata = false;
                out.document(event);
            }
            DocumentEvent::EndDocument => {
                self.end_document(ctx)?;
                out.document(event);
            }
            other => out.document(other),
        }
        Ok(())
    }

    fn dtd_event(
        &mut self,
        event: DtdEvent,
        ctx: &mut PipelineContext,
        out: &mut EventSink,
    ) -> Result<(), XmlError> {
        match &event {
            DtdEvent::StartDtd { .. } => {
                let description = self.description.clone().unwrap_or_default();
                self.building = Some(DtdGrammar::new(description));
            }
            DtdEvent::StartExternalSubset { system_id } => {
                self.in_external = true;
                if !self.cached {
                    let mut description = self.description.clone().unwrap_or_default();
                    if description.expanded_system_id.is_none() {
                        description.expanded_system_id = system_id.as_deref().map(str::to_string);
                    }
                    self.external = Some(DtdGrammar::new(description));
                }
            }
            DtdEvent::EndExternalSubset => self.in_external = false,
            DtdEvent::EndDtd { .. } => self.end_dtd(ctx)?,
            DtdEvent::Comment(_) | DtdEvent::ProcessingInstruction { .. } => {}
            _ => self.declaration(&event, ctx)?,
        }
        out.dtd(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{GrammarPool, XmlGrammarPool};
    use crate::input::{load, InputSource, Resolution};
    use crate::pipeline::scanner::{DocumentScanner, ScannerOptions};
    use crate::pipeline::test_support::{context, Recorder};
    use crate::pipeline::Pipeline;
    use crate::report::Severity;

    struct Run {
        recorder: Recorder,
        ctx: PipelineContext,
    }

    fn run_with(xml: &str, validation: bool, ctx: PipelineContext) -> Result<Run, XmlError> {
        let mut registry = FeatureRegistry::new();
        registry.store_feature(names::VALIDATION, validation);
        registry.store_feature(names::NAMESPACES, true);
        let mut validator = DtdValidator::new();
        validator.reset(&registry)?;

        let options = ScannerOptions {
            validation,
            ..Default::default()
        };
        let mut scanner = DocumentScanner::new(load(InputSource::from_text(xml))?, options);
        let mut recorder = Recorder::default();
        let mut ctx = ctx;
        {
            let mut pipeline = Pipeline::new();
            pipeline.push(&mut validator);
            pipeline.push(&mut recorder);
            while scanner.step(&mut pipeline, &mut ctx)? {}
        }
        Ok(Run { recorder, ctx })
    }

    fn run(xml: &str, validation: bool) -> Run {
        run_with(xml, validation, context()).unwrap()
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

    fn root_attributes(run: &Run) -> Vec<Attribute> {
        run.recorder
            .documents()
            .into_iter()
            .find_map(|e| match e {
                DocumentEvent::StartElement { attributes, .. } => Some(attributes.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_defaults_injected_unspecified() {
        let run = run(
            "<!DOCTYPE r [<!ATTLIST r a CDATA 'x' b CDATA #IMPLIED c CDATA #FIXED 'f'>]>\
             <r a='given'/>",
            false,
        );
        let attrs = root_attributes(&run);
        assert_eq!(attrs.len(), 2);
        assert!(attrs[0].specified);
        assert_eq!(&*attrs[1].name.raw, "c");
        assert_eq!(attrs[1].value, "f");
        assert!(!attrs[1].specified);
    }

    #[test]
    fn test_types_assigned_and_normalized() {
        let run = run("<!DOCTYPE r [<!ATTLIST r id ID #IMPLIED>]><r id='  a1  '/>", false);
        let attrs = root_attributes(&run);
        assert_eq!(attrs[0].attr_type, AttributeType::Id);
        assert_eq!(attrs[0].value, "a1");
    }

    #[test]
    fn test_ignorable_whitespace_in_element_content() {
        let run = run("<!DOCTYPE r [<!ELEMENT r (a)*><!ELEMENT a EMPTY>]><r>\n  <a/>\n</r>", false);
        let docs = run.recorder.documents();
        assert!(docs.iter().any(|e| matches!(e, DocumentEvent::IgnorableWhitespace(_))));
        assert!(!docs.iter().any(|e| matches!(e, DocumentEvent::Characters(_))));
    }

    #[test]
    fn test_valid_document_has_no_errors() {
        let xml = "<!DOCTYPE r [\
                   <!ELEMENT r (a, b*)>\
                   <!ELEMENT a (#PCDATA)>\
                   <!ELEMENT b EMPTY>\
                   <!ATTLIST a id ID #REQUIRED>\
                   <!ATTLIST b ref IDREF #IMPLIED kind (x|y) 'x'>\
                   ]><r><a id='one'>text</a><b ref='one'/><b kind='y'/></r>";
        let run = run(xml, true);
        assert!(errors(&run).is_empty(), "{:?}", errors(&run));
    }

    #[test]
    fn test_validity_errors_are_recoverable() {
        let xml = "<!DOCTYPE r [\
                   <!ELEMENT r (a)>\
                   <!ELEMENT a EMPTY>\
                   <!ATTLIST a id ID #REQUIRED k (x|y) #IMPLIED>\
                   ]><r><a k='z'>t</a><undeclared/></r>";
        let run = run(xml, true);
        let errors = errors(&run);
        assert!(errors.iter().any(|e| e.contains("required")));
        assert!(errors.iter().any(|e| e.contains("one of (x|y)")));
        assert!(errors.iter().any(|e| e.contains("must be declared")));
        assert!(errors.iter().any(|e| e.contains("content of element type \"a\"")));
        assert!(errors.iter().any(|e| e.contains("content of element type \"r\"")));
        assert!(matches!(run.recorder.documents().last(), Some(DocumentEvent::EndDocument)));
    }

    #[test]
    fn test_duplicate_id_and_dangling_idref() {
        let xml = "<!DOCTYPE r [\
                   <!ELEMENT r ANY>\
                   <!ATTLIST r id ID #IMPLIED ref IDREF #IMPLIED>\
                   ]><r id='a'><r id='a' ref='missing'/></r>";
        let errors = errors(&run(xml, true));
        assert!(errors.iter().any(|e| e.contains("not unique")));
        assert!(errors.iter().any(|e| e.contains("missing")));
    }

    #[test]
    fn test_no_grammar_error() {
        let errors = errors(&run("<r/>", true));
        assert_eq!(errors, vec!["document is invalid: no grammar found".to_string()]);
    }

    #[test]
    fn test_dynamic_validation_skips_without_grammar() {
        let mut registry = FeatureRegistry::new();
        registry.store_feature(names::VALIDATION, true);
        registry.store_feature(names::DYNAMIC_VALIDATION, true);
        let mut validator = DtdValidator::new();
        validator.reset(&registry).unwrap();
        let mut ctx = context();
        let mut out = EventSink::default();
        let name = QName::simple(Symbol::detached("r"));
        validator
            .document_event(
                DocumentEvent::StartElement {
                    name,
                    attributes: Vec::new(),
                },
                &mut ctx,
                &mut out,
            )
            .unwrap();
        assert!(ctx.reporter.diagnostics().is_empty());
    }

    #[test]
    fn test_duplicate_attdef_warning() {
        let mut registry = FeatureRegistry::new();
        registry.store_feature(names::WARN_ON_DUPLICATE_ATTDEF, true);
        let mut validator = DtdValidator::new();
        validator.reset(&registry).unwrap();
        let mut ctx = context();
        let mut out = EventSink::default();
        let def = Arc::new(AttDef {
            element: Symbol::detached("r"),
            name: Symbol::detached("a"),
            att_type: AttType::CData,
            default: AttDefault::Implied,
        });
        let start = DtdEvent::StartDtd {
            root: Symbol::detached("r"),
            public_id: None,
            system_id: None,
        };
        validator.dtd_event(start, &mut ctx, &mut out).unwrap();
        validator.dtd_event(DtdEvent::AttributeDecl(def.clone()), &mut ctx, &mut out).unwrap();
        validator.dtd_event(DtdEvent::AttributeDecl(def), &mut ctx, &mut out).unwrap();
        assert_eq!(ctx.reporter.diagnostics().len(), 1);
        assert_eq!(ctx.reporter.diagnostics()[0].severity, Severity::Warning);
    }

    #[test]
    fn test_external_subset_cached_and_reused() {
        let reads = Arc::new(parking_lot::Mutex::new(0usize));
        let counter = reads.clone();
        let resolver = move |_: Option<&str>,
                             system_id: Option<&str>,
                             _: Option<&str>|
              -> Result<Option<InputSource>, XmlError> {
            *counter.lock() += 1;
            let dtd = "<!ELEMENT r EMPTY><!ATTLIST r a CDATA 'dflt'><!ENTITY e 'v'>";
            Ok(system_id.map(|id| InputSource::from_text(dtd).with_system_id(id)))
        };
        let pool: Arc<dyn GrammarPool> = Arc::new(XmlGrammarPool::new());
        let xml = "<!DOCTYPE r SYSTEM 'file:///schemas/r.dtd'><r/>";

        for _ in 0..2 {
            let mut ctx = context();
            ctx.grammar_pool = Some(pool.clone());
            ctx.resolution = Resolution::new(Some(Arc::new(resolver.clone())));
            let run = run_with(xml, false, ctx).unwrap();
            let attrs = root_attributes(&run);
            assert_eq!(attrs[0].value, "dflt");
        }
        assert_eq!(*reads.lock(), 1);
        assert_eq!(pool.retrieve_initial_grammar_set(GrammarType::Dtd).len(), 1);
    }

    #[test]
    fn test_internal_subset_bypasses_cache() {
        let pool: Arc<dyn GrammarPool> = Arc::new(XmlGrammarPool::new());
        let mut ctx = context();
        ctx.grammar_pool = Some(pool.clone());
        run_with("<!DOCTYPE r [<!ELEMENT r EMPTY>]><r/>", false, ctx).unwrap();
        assert!(pool.retrieve_initial_grammar_set(GrammarType::Dtd).is_empty());
    }
}
