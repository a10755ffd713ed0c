//! Processing Pipeline
//!
//! The scanner pushes events through an ordered list of stages ending in the
//! document builder:
//!
//! ```text
//! scanner -> DTD validator -> namespace binder -> schema validator -> builder
//! ```
//!
//! Stages are [`PipelineComponent`]s. Each receives an event by value and
//! writes whatever it wants passed downstream into an [`EventSink`]; the
//! [`Pipeline`] delivers those to the next stage in order.

pub mod dtd_validator;
pub mod events;
pub mod namespaces;
pub mod scanner;
pub mod schema_validator;

mod dtd_scanner;

pub use events::{Attribute, AttributeType, DocumentEvent, DtdEvent, QName};

use std::sync::Arc;

use crate::config::registry::{FeatureRegistry, PropertyValue};
use crate::error::{ConfigError, XmlError};
use crate::grammar::{DtdGrammar, GrammarPool};
use crate::input::Resolution;
use crate::report::{ErrorReporter, Location};
use crate::symbols::SymbolSource;

/// An event on either stream.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Document(DocumentEvent),
    Dtd(DtdEvent),
}

/// Output buffer of one stage for one input event.
#[derive(Debug, Default)]
pub struct EventSink {
    events: Vec<PipelineEvent>,
}

impl EventSink {
    pub fn document(&mut self, event: DocumentEvent) {
        self.events.push(PipelineEvent::Document(event));
    }

    pub fn dtd(&mut self, event: DtdEvent) {
        self.events.push(PipelineEvent::Dtd(event));
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn take(&mut self) -> Vec<PipelineEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Requests a stage makes of the scanner while a DOCTYPE is processed.
#[derive(Debug, Default)]
pub struct ScannerDirectives {
    /// Replay this grammar instead of reading the external subset.
    pub cached_dtd: Option<Arc<DtdGrammar>>,
}

/// Per-parse state shared by the scanner and every stage.
///
/// Created at reset and dropped when the parse ends; nothing in it outlives
/// the parse except what the embedder passed in (symbol table, pool).
pub struct PipelineContext {
    pub symbols: Box<dyn SymbolSource>,
    pub reporter: ErrorReporter,
    pub grammar_pool: Option<Arc<dyn GrammarPool>>,
    pub resolution: Resolution,
    /// Scanner position of the event being delivered.
    pub location: Location,
    pub directives: ScannerDirectives,
}

impl PipelineContext {
    pub fn new(
        symbols: Box<dyn SymbolSource>,
        reporter: ErrorReporter,
        grammar_pool: Option<Arc<dyn GrammarPool>>,
        resolution: Resolution,
    ) -> Self {
        PipelineContext {
            symbols,
            reporter,
            grammar_pool,
            resolution,
            location: Location::default(),
            directives: ScannerDirectives::default(),
        }
    }

    pub fn warning(&mut self, message: impl Into<String>) -> Result<(), XmlError> {
        self.reporter.warning(message, &self.location)
    }

    /// Report a recoverable error at the current location.
    pub fn error(&mut self, message: impl Into<String>) -> Result<(), XmlError> {
        self.reporter.error(message, &self.location)
    }

    /// Report a fatal error at the current location.
    pub fn fatal(&mut self, message: impl Into<String>) -> XmlError {
        self.reporter.fatal(message, &self.location)
    }
}

/// A configurable stage.
///
/// Components declare the switches they understand; the configuration merges
/// them into its registry when the component is attached. Values are
/// forwarded through `set_feature`/`set_property` so a component can veto
/// them, and read back from the registry at every `reset`.
pub trait PipelineComponent: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn recognized_features(&self) -> &'static [&'static str] {
        &[]
    }

    fn recognized_properties(&self) -> &'static [&'static str] {
        &[]
    }

    /// Initial feature values.
    fn feature_defaults(&self) -> Vec<(&'static str, bool)> {
        Vec::new()
    }

    /// Initial property values.
    fn property_defaults(&self) -> Vec<(&'static str, PropertyValue)> {
        Vec::new()
    }

    /// Veto or react to a feature change.
    fn set_feature(&mut self, _name: &str, _state: bool) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Veto or react to a property change.
    fn set_property(
        &mut self,
        _name: &str,
        _value: Option<&PropertyValue>,
    ) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Re-read settings and drop per-parse state. Called before every parse.
    fn reset(&mut self, settings: &FeatureRegistry) -> Result<(), XmlError>;

    /// Whether this stage takes part in the current parse.
    fn in_pipeline(&self) -> bool {
        true
    }

    fn document_event(
        &mut self,
        event: DocumentEvent,
        _ctx: &mut PipelineContext,
        out: &mut EventSink,
    ) -> Result<(), XmlError> {
        out.document(event);
        Ok(())
    }

    fn dtd_event(
        &mut self,
        event: DtdEvent,
        _ctx: &mut PipelineContext,
        out: &mut EventSink,
    ) -> Result<(), XmlError> {
        out.dtd(event);
        Ok(())
    }
}

/// The active stages of one parse, in delivery order.
pub struct Pipeline<'p> {
    stages: Vec<&'p mut (dyn PipelineComponent + 'static)>,
}

impl<'p> Pipeline<'p> {
    pub fn new() -> Self {
        Pipeline { stages: Vec::new() }
    }

    /// Append a stage if it is active.
    pub fn push(&mut self, stage: &'p mut (dyn PipelineComponent + 'static)) {
        if stage.in_pipeline() {
            self.stages.push(stage);
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn document(
        &mut self,
        ctx: &mut PipelineContext,
        event: DocumentEvent,
    ) -> Result<(), XmlError> {
        self.deliver(0, PipelineEvent::Document(event), ctx)
    }

    pub fn dtd(&mut self, ctx: &mut PipelineContext, event: DtdEvent) -> Result<(), XmlError> {
        self.deliver(0, PipelineEvent::Dtd(event), ctx)
    }

    fn deliver(
        &mut self,
        stage: usize,
        event: PipelineEvent,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let Some(component) = self.stages.get_mut(stage) else {
            return Ok(());
        };
        let mut out = EventSink::default();
        match event {
            PipelineEvent::Document(e) => component.document_event(e, ctx, &mut out)?,
            PipelineEvent::Dtd(e) => component.dtd_event(e, ctx, &mut out)?,
        }
        for next in out.take() {
            self.deliver(stage + 1, next, ctx)?;
        }
        Ok(())
    }
}

impl Default for Pipeline<'_> {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{context, Recorder};
    use super::*;

    /// Doubles every comment.
    struct Doubler;

    impl PipelineComponent for Doubler {
        fn name(&self) -> &'static str {
            "doubler"
        }

        fn reset(&mut self, _settings: &FeatureRegistry) -> Result<(), XmlError> {
            Ok(())
        }

        fn document_event(
            &mut self,
            event: DocumentEvent,
            _ctx: &mut PipelineContext,
            out: &mut EventSink,
        ) -> Result<(), XmlError> {
            if let DocumentEvent::Comment(text) = &event {
                out.document(DocumentEvent::Comment(text.clone()));
            }
            out.document(event);
            Ok(())
        }
    }

    /// Never part of the pipeline.
    struct Inactive;

    impl PipelineComponent for Inactive {
        fn name(&self) -> &'static str {
            "inactive"
        }

        fn reset(&mut self, _settings: &FeatureRegistry) -> Result<(), XmlError> {
            Ok(())
        }

        fn in_pipeline(&self) -> bool {
            false
        }

        fn document_event(
            &mut self,
            _event: DocumentEvent,
            _ctx: &mut PipelineContext,
            _out: &mut EventSink,
        ) -> Result<(), XmlError> {
            Err(XmlError::structural("inactive stage received an event"))
        }
    }

    #[test]
    fn test_events_flow_in_order_through_stages() {
        let mut doubler = Doubler;
        let mut inactive = Inactive;
        let mut recorder = Recorder::default();
        let mut ctx = context();
        {
            let mut pipeline = Pipeline::new();
            pipeline.push(&mut doubler);
            pipeline.push(&mut inactive);
            pipeline.push(&mut recorder);
            assert_eq!(pipeline.stage_names(), vec!["doubler", "recorder"]);
            pipeline.document(&mut ctx, DocumentEvent::Comment("a".into())).unwrap();
            pipeline.document(&mut ctx, DocumentEvent::EndDocument).unwrap();
        }
        assert_eq!(
            recorder.documents(),
            vec![
                &DocumentEvent::Comment("a".into()),
                &DocumentEvent::Comment("a".into()),
                &DocumentEvent::EndDocument,
            ]
        );
    }

    #[test]
    fn test_default_component_passes_through() {
        struct Pass;
        impl PipelineComponent for Pass {
            fn name(&self) -> &'static str {
                "pass"
            }
            fn reset(&mut self, _settings: &FeatureRegistry) -> Result<(), XmlError> {
                Ok(())
            }
        }
        let mut pass = Pass;
        let mut recorder = Recorder::default();
        let mut ctx = context();
        {
            let mut pipeline = Pipeline::new();
            pipeline.push(&mut pass);
            pipeline.push(&mut recorder);
            pipeline.dtd(&mut ctx, DtdEvent::EndExternalSubset).unwrap();
        }
        assert_eq!(recorder.events, vec![PipelineEvent::Dtd(DtdEvent::EndExternalSubset)]);
    }
}
