//! Parser Front End
//!
//! - [`DomParser`]: a configuration behind a lock, shareable across threads;
//!   a second parse while one is running fails instead of waiting
//! - [`ConfigurationRegistry`]: named configuration constructors, built and
//!   owned by the embedder

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::config::{ParserConfiguration, PropertyValue};
use crate::dom::ParsedDocument;
use crate::error::{ConfigError, XmlError};
use crate::input::InputSource;
use crate::report::Diagnostic;

/// DOM parser over one configuration.
pub struct DomParser {
    config: Mutex<ParserConfiguration>,
}

impl Default for DomParser {
    fn default() -> Self {
        Self::new(ParserConfiguration::standard())
    }
}

impl DomParser {
    pub fn new(config: ParserConfiguration) -> Self {
        DomParser {
            config: Mutex::new(config),
        }
    }

    /// Parse `source`. Fails with [`XmlError::AlreadyParsing`] if another
    /// parse holds the configuration.
    pub fn parse(&self, source: InputSource) -> Result<ParsedDocument, XmlError> {
        let mut config = self.config.try_lock().ok_or(XmlError::AlreadyParsing)?;
        config.parse(source)
    }

    pub fn set_feature(&self, name: &str, state: bool) -> Result<(), XmlError> {
        let mut config = self.lock_for(name)?;
        Ok(config.set_feature(name, state)?)
    }

    pub fn get_feature(&self, name: &str) -> Result<bool, XmlError> {
        let config = self.lock_for(name)?;
        Ok(config.get_feature(name)?)
    }

    pub fn set_property(&self, name: &str, value: Option<PropertyValue>) -> Result<(), XmlError> {
        let mut config = self.lock_for(name)?;
        Ok(config.set_property(name, value)?)
    }

    pub fn get_property(&self, name: &str) -> Result<Option<PropertyValue>, XmlError> {
        let config = self.lock_for(name)?;
        Ok(config.get_property(name)?)
    }

    /// Tree left behind by the last parse if it failed.
    pub fn take_partial_document(&self) -> Option<ParsedDocument> {
        self.config.try_lock()?.take_partial_document()
    }

    /// Diagnostics of the last parse.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.config
            .try_lock()
            .map(|c| c.diagnostics().to_vec())
            .unwrap_or_default()
    }

    /// Direct access to the configuration between parses.
    pub fn with_configuration<R>(
        &self,
        f: impl FnOnce(&mut ParserConfiguration) -> R,
    ) -> Result<R, XmlError> {
        let mut config = self.config.try_lock().ok_or(XmlError::AlreadyParsing)?;
        Ok(f(&mut config))
    }

    pub fn into_configuration(self) -> ParserConfiguration {
        self.config.into_inner()
    }

    fn lock_for(&self, name: &str) -> Result<MutexGuard<'_, ParserConfiguration>, XmlError> {
        self.config.try_lock().ok_or_else(|| {
            XmlError::Config(ConfigError::ParseInProgress {
                name: name.to_string(),
            })
        })
    }
}

/// Constructor stored in a [`ConfigurationRegistry`].
pub type ConfigurationFactory = Arc<dyn Fn() -> ParserConfiguration + Send + Sync>;

/// Named configuration constructors.
#[derive(Clone)]
pub struct ConfigurationRegistry {
    factories: BTreeMap<String, ConfigurationFactory>,
}

impl Default for ConfigurationRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ConfigurationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        ConfigurationRegistry {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding `"standard"`, `"schema"` and `"non-validating"`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("standard", ParserConfiguration::standard);
        registry.register("schema", ParserConfiguration::schema);
        registry.register("non-validating", ParserConfiguration::non_validating);
        registry
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> ParserConfiguration + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, name: &str) -> Result<ParserConfiguration, XmlError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| {
                XmlError::structural(format!("no configuration registered as \"{}\"", name))
            })?;
        tracing::debug!(name, "creating parser configuration");
        Ok(factory())
    }

    /// A [`DomParser`] over a new instance of `name`.
    pub fn parser(&self, name: &str) -> Result<DomParser, XmlError> {
        self.create(name).map(DomParser::new)
    }
}

impl fmt::Debug for ConfigurationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}
