//! Schema Grammar
//!
//! The subset of an XML Schema the schema validator enforces: element
//! declarations and their attribute uses. Content models are not kept.

use std::collections::HashMap;

use super::GrammarDescription;

/// How an attribute may appear on an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Usage {
    #[default]
    Optional,
    Required,
    Prohibited,
}

/// One `xs:attribute` of an element's type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeUse {
    pub name: String,
    pub usage: Usage,
    pub default: Option<String>,
    pub fixed: Option<String>,
    /// Declared with type `xs:ID`.
    pub is_id: bool,
}

impl AttributeUse {
    pub fn new(name: impl Into<String>) -> Self {
        AttributeUse {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Value injected when the attribute is absent.
    pub fn value_constraint(&self) -> Option<&str> {
        self.fixed.as_deref().or(self.default.as_deref())
    }
}

/// An `xs:element` declaration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementDeclaration {
    pub name: String,
    pub attributes: Vec<AttributeUse>,
}

impl ElementDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        ElementDeclaration {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeUse> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Declarations of one target namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaGrammar {
    description: GrammarDescription,
    /// Top-level declarations; only these may be a document root.
    globals: HashMap<String, ElementDeclaration>,
    /// Declarations nested in complex types, first one per name.
    locals: HashMap<String, ElementDeclaration>,
}

impl SchemaGrammar {
    pub fn new(description: GrammarDescription) -> Self {
        SchemaGrammar {
            description,
            globals: HashMap::new(),
            locals: HashMap::new(),
        }
    }

    pub fn description(&self) -> &GrammarDescription {
        &self.description
    }

    /// Record where the schema document was read from.
    pub fn set_location(&mut self, literal: Option<&str>, expanded: Option<&str>) {
        self.description = self.description.clone().with_location(literal, expanded);
    }

    pub fn target_namespace(&self) -> Option<&str> {
        self.description.target_namespace.as_deref()
    }

    pub fn add_global(&mut self, decl: ElementDeclaration) {
        self.globals.entry(decl.name.clone()).or_insert(decl);
    }

    pub fn add_local(&mut self, decl: ElementDeclaration) {
        self.locals.entry(decl.name.clone()).or_insert(decl);
    }

    pub fn global_element(&self, name: &str) -> Option<&ElementDeclaration> {
        self.globals.get(name)
    }

    /// Any declaration for `name`, global first.
    pub fn element(&self, name: &str) -> Option<&ElementDeclaration> {
        self.globals.get(name).or_else(|| self.locals.get(name))
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }
}
