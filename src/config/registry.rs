//! Feature/property registry.
//!
//! Tracks which switch names are recognized separately from their values,
//! so "unknown name" and "bad value" stay distinguishable.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::dom::DocumentFactory;
use crate::error::ConfigError;
use crate::grammar::GrammarPool;
use crate::input::EntityResolver;
use crate::report::ErrorHandler;
use crate::symbols::SymbolTableRef;

/// Value of a property.
#[derive(Clone)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Str(String),
    SymbolTable(SymbolTableRef),
    GrammarPool(Arc<dyn GrammarPool>),
    EntityResolver(Arc<dyn EntityResolver>),
    ErrorHandler(Arc<dyn ErrorHandler>),
    DocumentFactory(DocumentFactory),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_symbol_table(&self) -> Option<&SymbolTableRef> {
        match self {
            PropertyValue::SymbolTable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_grammar_pool(&self) -> Option<&Arc<dyn GrammarPool>> {
        match self {
            PropertyValue::GrammarPool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity_resolver(&self) -> Option<&Arc<dyn EntityResolver>> {
        match self {
            PropertyValue::EntityResolver(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_error_handler(&self) -> Option<&Arc<dyn ErrorHandler>> {
        match self {
            PropertyValue::ErrorHandler(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_document_factory(&self) -> Option<DocumentFactory> {
        match self {
            PropertyValue::DocumentFactory(v) => Some(*v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Str(_) => "string",
            PropertyValue::SymbolTable(_) => "symbol table",
            PropertyValue::GrammarPool(_) => "grammar pool",
            PropertyValue::EntityResolver(_) => "entity resolver",
            PropertyValue::ErrorHandler(_) => "error handler",
            PropertyValue::DocumentFactory(_) => "document factory",
        }
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "Bool({})", v),
            PropertyValue::Int(v) => write!(f, "Int({})", v),
            PropertyValue::Str(v) => write!(f, "Str({:?})", v),
            PropertyValue::SymbolTable(v) => write!(f, "SymbolTable({:?})", v),
            PropertyValue::DocumentFactory(v) => write!(f, "DocumentFactory({:?})", v),
            other => write!(f, "{}(..)", other.type_name()),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<DocumentFactory> for PropertyValue {
    fn from(v: DocumentFactory) -> Self {
        PropertyValue::DocumentFactory(v)
    }
}

impl From<SymbolTableRef> for PropertyValue {
    fn from(v: SymbolTableRef) -> Self {
        PropertyValue::SymbolTable(v)
    }
}

impl From<Arc<dyn GrammarPool>> for PropertyValue {
    fn from(v: Arc<dyn GrammarPool>) -> Self {
        PropertyValue::GrammarPool(v)
    }
}

impl From<Arc<dyn EntityResolver>> for PropertyValue {
    fn from(v: Arc<dyn EntityResolver>) -> Self {
        PropertyValue::EntityResolver(v)
    }
}

impl From<Arc<dyn ErrorHandler>> for PropertyValue {
    fn from(v: Arc<dyn ErrorHandler>) -> Self {
        PropertyValue::ErrorHandler(v)
    }
}

/// Recognized names plus current values.
#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    recognized_features: HashSet<String>,
    recognized_properties: HashSet<String>,
    features: HashMap<String, bool>,
    properties: HashMap<String, PropertyValue>,
    /// Names that cannot change while a parse is in progress.
    parse_locked: HashSet<String>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_recognized_features(&mut self, names: &[&str]) {
        self.recognized_features
            .extend(names.iter().map(|n| n.to_string()));
    }

    pub fn add_recognized_properties(&mut self, names: &[&str]) {
        self.recognized_properties
            .extend(names.iter().map(|n| n.to_string()));
    }

    /// Mark `name` as immutable during a parse.
    pub fn lock_during_parse(&mut self, name: &str) {
        self.parse_locked.insert(name.to_string());
    }

    pub fn is_parse_locked(&self, name: &str) -> bool {
        self.parse_locked.contains(name)
    }

    pub fn is_feature_recognized(&self, name: &str) -> bool {
        self.recognized_features.contains(name)
    }

    pub fn is_property_recognized(&self, name: &str) -> bool {
        self.recognized_properties.contains(name)
    }

    pub fn check_feature(&self, name: &str) -> Result<(), ConfigError> {
        if self.is_feature_recognized(name) {
            Ok(())
        } else {
            Err(ConfigError::not_recognized(name))
        }
    }

    pub fn check_property(&self, name: &str) -> Result<(), ConfigError> {
        if self.is_property_recognized(name) {
            Ok(())
        } else {
            Err(ConfigError::not_recognized(name))
        }
    }

    /// Current state of a recognized feature; unset features are off.
    pub fn get_feature(&self, name: &str) -> Result<bool, ConfigError> {
        self.check_feature(name)?;
        Ok(self.feature(name))
    }

    /// Lenient read used by components during reset.
    pub fn feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    pub fn get_property(&self, name: &str) -> Result<Option<&PropertyValue>, ConfigError> {
        self.check_property(name)?;
        Ok(self.properties.get(name))
    }

    /// Lenient read used by components during reset.
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Store a feature value. Callers check recognition first.
    pub fn store_feature(&mut self, name: &str, state: bool) {
        self.features.insert(name.to_string(), state);
    }

    /// Store a feature value unless one is already present.
    pub fn store_feature_default(&mut self, name: &str, state: bool) {
        self.features.entry(name.to_string()).or_insert(state);
    }

    pub fn store_property(&mut self, name: &str, value: Option<PropertyValue>) {
        match value {
            Some(v) => {
                self.properties.insert(name.to_string(), v);
            }
            None => {
                self.properties.remove(name);
            }
        }
    }

    pub fn store_property_default(&mut self, name: &str, value: PropertyValue) {
        self.properties.entry(name.to_string()).or_insert(value);
    }
}
