//! Namespace Binding
//!
//! Stack-based prefix resolution for the event stream. Each start tag opens
//! a scope; its `xmlns` attributes declare bindings that vanish with the
//! matching end tag. Element and attribute names leave this stage with
//! their namespace URI filled in.
//!
//! Misuse of the reserved prefixes, unbound prefixes, malformed qualified
//! names and duplicate expanded attribute names are fatal.

use std::collections::HashSet;

use super::events::{DocumentEvent, QName};
use super::{EventSink, PipelineComponent, PipelineContext};
use crate::config::names;
use crate::config::registry::FeatureRegistry;
use crate::core::chars::{is_ncname, XmlVersion};
use crate::error::XmlError;
use crate::symbols::Symbol;

/// Well-known namespace URIs
pub mod ns {
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
}

/// Namespace binding (prefix -> URI)
#[derive(Debug, Clone)]
struct Binding {
    /// `None` is the default namespace.
    prefix: Option<Symbol>,
    /// `None` undeclares the prefix.
    uri: Option<Symbol>,
    depth: usize,
}

/// Namespace binder stage.
#[derive(Debug, Default)]
pub struct NamespaceBinder {
    enabled: bool,
    version: XmlVersion,
    bindings: Vec<Binding>,
    depth: usize,
    /// Bound names of open elements, for their end tags.
    open: Vec<QName>,
}

impl NamespaceBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current binding of `prefix` (`None` for the default namespace).
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&Symbol> {
        match prefix {
            Some("xml") => None,
            _ => self
                .bindings
                .iter()
                .rev()
                .find(|b| b.prefix.as_deref() == prefix)
                .and_then(|b| b.uri.as_ref()),
        }
    }

    fn push_scope(&mut self) {
        self.depth += 1;
    }

    fn pop_scope(&mut self) {
        while let Some(binding) = self.bindings.last() {
            if binding.depth < self.depth {
                break;
            }
            self.bindings.pop();
        }
        self.depth = self.depth.saturating_sub(1);
    }

    fn declare(&mut self, prefix: Option<Symbol>, uri: Option<Symbol>) {
        self.bindings.push(Binding {
            prefix,
            uri,
            depth: self.depth,
        });
    }

    /// Record the bindings declared by one `xmlns` attribute.
    fn declaration(
        &mut self,
        name: &QName,
        value: &str,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let prefix = match &name.prefix {
            Some(_) => Some(&name.local),
            None => None,
        };
        match prefix.map(|p| p.as_str()) {
            Some("xmlns") => return Err(ctx.fatal("the prefix \"xmlns\" cannot be declared")),
            Some("xml") if value == ns::XML => return Ok(()),
            Some("xml") => {
                let message = format!("the prefix \"xml\" cannot be bound to \"{}\"", value);
                return Err(ctx.fatal(message));
            }
            _ => {}
        }
        if value == ns::XML || value == ns::XMLNS {
            return Err(ctx.fatal(format!(
                "the namespace \"{}\" cannot be bound to \"{}\"",
                value, name.raw
            )));
        }
        let uri = if value.is_empty() {
            if prefix.is_some() && self.version == XmlVersion::V1_0 {
                return Err(ctx.fatal(format!(
                    "the value of \"{}\" must not be empty in XML 1.0",
                    name.raw
                )));
            }
            None
        } else {
            Some(ctx.symbols.intern(value))
        };
        self.declare(prefix.cloned(), uri);
        Ok(())
    }

    /// Resolve a prefixed name against the current bindings.
    fn bind(
        &self,
        name: &mut QName,
        element: bool,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let qualified = is_ncname(name.local.as_str())
            && name.prefix.as_ref().map_or(!name.raw.contains(':'), |p| is_ncname(p.as_str()));
        if !qualified {
            return Err(ctx.fatal(format!("\"{}\" is not a valid qualified name", name.raw)));
        }
        match &name.prefix {
            Some(prefix) if &**prefix == "xml" => {
                name.uri = Some(ctx.symbols.intern(ns::XML));
            }
            Some(prefix) => match self.resolve(Some(prefix.as_str())) {
                Some(uri) => name.uri = Some(uri.clone()),
                None => {
                    let kind = if element { "element" } else { "attribute" };
                    return Err(ctx.fatal(format!(
                        "the prefix \"{}\" for {} \"{}\" is not bound",
                        prefix, kind, name.raw
                    )));
                }
            },
            // Unprefixed attributes are never in a namespace.
            None if element => name.uri = self.resolve(None).cloned(),
            None => name.uri = None,
        }
        Ok(())
    }
}

impl PipelineComponent for NamespaceBinder {
    fn name(&self) -> &'static str {
        "namespace-binder"
    }

    fn recognized_features(&self) -> &'static [&'static str] {
        &[names::NAMESPACES]
    }

    fn reset(&mut self, settings: &FeatureRegistry) -> Result<(), XmlError> {
        *self = NamespaceBinder {
            enabled: settings.feature(names::NAMESPACES),
            ..Default::default()
        };
        Ok(())
    }

    fn in_pipeline(&self) -> bool {
        self.enabled
    }

    fn document_event(
        &mut self,
        event: DocumentEvent,
        ctx: &mut PipelineContext,
        out: &mut EventSink,
    ) -> Result<(), XmlError> {
        match event {
            DocumentEvent::StartDocument { version, .. } => {
                self.version = version;
                out.document(event);
            }
            DocumentEvent::StartElement { mut name, mut attributes } => {
                self.push_scope();
                let xmlns = ctx.symbols.intern(ns::XMLNS);
                for attr in attributes.iter_mut().filter(|a| a.is_namespace_declaration()) {
                    self.declaration(&attr.name, &attr.value, ctx)?;
                    attr.name.uri = Some(xmlns.clone());
                }

                self.bind(&mut name, true, ctx)?;
                let mut seen = HashSet::new();
                for attr in attributes.iter_mut() {
                    if !attr.is_namespace_declaration() {
                        self.bind(&mut attr.name, false, ctx)?;
                    }
                    if let Some(uri) = &attr.name.uri {
                        if !seen.insert((uri.clone(), attr.name.local.clone())) {
                            return Err(ctx.fatal(format!(
                                "attribute \"{}\" duplicates another attribute with \
                                 namespace \"{}\" and local name \"{}\"",
                                attr.name.raw, uri, attr.name.local
                            )));
                        }
                    }
                }

                self.open.push(name.clone());
                out.document(DocumentEvent::StartElement { name, attributes });
            }
            DocumentEvent::EndElement { name } => {
                let bound = match self.open.pop() {
                    Some(open) if open.raw == name.raw => open,
                    _ => name,
                };
                self.pop_scope();
                out.document(DocumentEvent::EndElement { name: bound });
            }
            other => out.document(other),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{load, InputSource};
    use crate::pipeline::events::Attribute;
    use crate::pipeline::scanner::{DocumentScanner, ScannerOptions};
    use crate::pipeline::test_support::{context, Recorder};
    use crate::pipeline::Pipeline;

    fn bind(xml: &str) -> Result<Recorder, XmlError> {
        let mut registry = FeatureRegistry::new();
        registry.store_feature(names::NAMESPACES, true);
        let mut binder = NamespaceBinder::new();
        binder.reset(&registry)?;

        let source = load(InputSource::from_text(xml))?;
        let mut scanner = DocumentScanner::new(source, ScannerOptions::default());
        let mut recorder = Recorder::default();
        let mut ctx = context();
        {
            let mut pipeline = Pipeline::new();
            pipeline.push(&mut binder);
            pipeline.push(&mut recorder);
            while scanner.step(&mut pipeline, &mut ctx)? {}
        }
        Ok(recorder)
    }

    fn elements(recorder: &Recorder) -> Vec<(QName, Vec<Attribute>)> {
        recorder
            .documents()
            .into_iter()
            .filter_map(|e| match e {
                DocumentEvent::StartElement { name, attributes } => {
                    Some((name.clone(), attributes.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn fatal_message(xml: &str) -> String {
        match bind(xml) {
            Err(XmlError::Fatal(d)) => d.message,
            other => panic!("expected fatal error, got {:?}", other.map(|r| r.events.len())),
        }
    }

    #[test]
    fn test_default_and_prefixed_bindings() {
        let xml = "<r xmlns='urn:d' xmlns:p='urn:p'><p:a p:x='1' y='2'/><b/></r>";
        let recorder = bind(xml).unwrap();
        let elements = elements(&recorder);
        assert!(elements[0].0.matches(Some("urn:d"), "r"));
        assert!(elements[1].0.matches(Some("urn:p"), "a"));
        assert!(elements[1].1[0].name.matches(Some("urn:p"), "x"));
        assert!(elements[1].1[1].name.matches(None, "y"));
        assert!(elements[2].0.matches(Some("urn:d"), "b"));
        assert_eq!(elements[0].1[0].name.uri.as_deref(), Some(ns::XMLNS));
    }

    #[test]
    fn test_scopes_end_with_element() {
        let recorder = bind("<r><a xmlns='urn:a'/><b/></r>").unwrap();
        let elements = elements(&recorder);
        assert!(elements[1].0.matches(Some("urn:a"), "a"));
        assert!(elements[2].0.matches(None, "b"));
        let ends: Vec<_> = recorder
            .documents()
            .into_iter()
            .filter_map(|e| match e {
                DocumentEvent::EndElement { name } => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ends[0].uri.as_deref(), Some("urn:a"));
    }

    #[test]
    fn test_default_undeclaration() {
        let recorder = bind("<r xmlns='urn:d'><a xmlns=''/></r>").unwrap();
        assert!(elements(&recorder)[1].0.matches(None, "a"));
    }

    #[test]
    fn test_xml_prefix_is_prebound() {
        let recorder = bind("<r xml:lang='en'/>").unwrap();
        assert!(elements(&recorder)[0].1[0].name.matches(Some(ns::XML), "lang"));
    }

    #[test]
    fn test_namespace_fatal_errors() {
        assert!(fatal_message("<p:r/>").contains("not bound"));
        assert!(fatal_message("<r q:a='1'/>").contains("not bound"));
        assert!(fatal_message("<r xmlns:xmlns='urn:x'/>").contains("\"xmlns\" cannot be declared"));
        assert!(fatal_message("<r xmlns:xml='urn:x'/>").contains("\"xml\" cannot be bound"));
        assert!(fatal_message("<r xmlns:p='http://www.w3.org/2000/xmlns/'/>")
            .contains("cannot be bound"));
        assert!(fatal_message("<r xmlns:p=''/>").contains("must not be empty"));
        assert!(fatal_message("<r xmlns:a='urn:x' xmlns:b='urn:x' a:z='1' b:z='2'/>")
            .contains("duplicates"));
        assert!(fatal_message("<a:b:c xmlns:a='urn:a'/>").contains("not a valid qualified name"));
    }

    #[test]
    fn test_prefix_undeclaration_in_xml_11() {
        let recorder = bind("<?xml version='1.1'?><r xmlns:p='urn:p'><a xmlns:p=''/></r>").unwrap();
        assert_eq!(elements(&recorder).len(), 2);
    }

    #[test]
    fn test_binder_inactive_without_namespaces() {
        let mut binder = NamespaceBinder::new();
        binder.reset(&FeatureRegistry::new()).unwrap();
        assert!(!binder.in_pipeline());
    }
}
