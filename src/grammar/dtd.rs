//! DTD Grammar
//!
//! Declarations collected from the internal and external subsets:
//! - Element declarations with their content models
//! - Attribute-list declarations (first definition per attribute wins)
//! - General and parameter entities (first declaration wins)
//! - Notations
//!
//! Declarations are also kept in source order so a cached grammar can be
//! replayed to a scanner that never read the subset itself.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use super::GrammarDescription;
use crate::symbols::Symbol;

/// `<!ELEMENT name contentspec>`
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDecl {
    pub name: Symbol,
    pub content: ContentSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentSpec {
    Empty,
    Any,
    /// `(#PCDATA | a | b)*`: text interleaved with the listed elements.
    Mixed(Vec<Symbol>),
    /// Element-only content.
    Children(ContentParticle),
}

impl ContentSpec {
    /// Element-only content: whitespace between children is ignorable.
    pub fn is_element_only(&self) -> bool {
        matches!(self, ContentSpec::Children(_))
    }

    /// Check a sequence of child element names against this model.
    /// Text is checked separately by the caller.
    pub fn accepts(&self, children: &[Symbol]) -> bool {
        match self {
            ContentSpec::Empty => children.is_empty(),
            ContentSpec::Any => true,
            ContentSpec::Mixed(names) => children.iter().all(|c| names.contains(c)),
            ContentSpec::Children(particle) => {
                let start: BTreeSet<usize> = std::iter::once(0).collect();
                particle.advance(children, &start).contains(&children.len())
            }
        }
    }
}

impl fmt::Display for ContentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSpec::Empty => f.write_str("EMPTY"),
            ContentSpec::Any => f.write_str("ANY"),
            ContentSpec::Mixed(names) if names.is_empty() => f.write_str("(#PCDATA)"),
            ContentSpec::Mixed(names) => {
                f.write_str("(#PCDATA")?;
                for n in names {
                    write!(f, "|{}", n)?;
                }
                f.write_str(")*")
            }
            ContentSpec::Children(p) => write!(f, "{}", p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    Once,
    Optional,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    fn suffix(self) -> &'static str {
        match self {
            Occurrence::Once => "",
            Occurrence::Optional => "?",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Particle {
    Name(Symbol),
    Sequence(Vec<ContentParticle>),
    Choice(Vec<ContentParticle>),
}

/// One node of a children content model.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentParticle {
    pub particle: Particle,
    pub occurs: Occurrence,
}

impl ContentParticle {
    pub fn new(particle: Particle, occurs: Occurrence) -> Self {
        ContentParticle { particle, occurs }
    }

    /// Positions in `names` reachable after matching this particle from any
    /// position in `from`.
    fn advance(&self, names: &[Symbol], from: &BTreeSet<usize>) -> BTreeSet<usize> {
        match self.occurs {
            Occurrence::Once => self.advance_once(names, from),
            Occurrence::Optional => {
                let mut out = self.advance_once(names, from);
                out.extend(from.iter().copied());
                out
            }
            Occurrence::ZeroOrMore => self.closure(names, from.clone()),
            Occurrence::OneOrMore => {
                let first = self.advance_once(names, from);
                self.closure(names, first)
            }
        }
    }

    /// Repeat until no new positions appear.
    fn closure(&self, names: &[Symbol], mut reached: BTreeSet<usize>) -> BTreeSet<usize> {
        let mut frontier = reached.clone();
        while !frontier.is_empty() {
            let next = self.advance_once(names, &frontier);
            frontier = next.difference(&reached).copied().collect();
            reached.extend(frontier.iter().copied());
        }
        reached
    }

    fn advance_once(&self, names: &[Symbol], from: &BTreeSet<usize>) -> BTreeSet<usize> {
        match &self.particle {
            Particle::Name(name) => from
                .iter()
                .filter(|&&pos| names.get(pos) == Some(name))
                .map(|pos| pos + 1)
                .collect(),
            Particle::Sequence(items) => items
                .iter()
                .fold(from.clone(), |acc, item| item.advance(names, &acc)),
            Particle::Choice(items) => items
                .iter()
                .flat_map(|item| item.advance(names, from))
                .collect(),
        }
    }
}

impl fmt::Display for ContentParticle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.particle {
            Particle::Name(n) => write!(f, "{}", n)?,
            Particle::Sequence(items) | Particle::Choice(items) => {
                let sep = if matches!(self.particle, Particle::Sequence(_)) { "," } else { "|" };
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")?;
            }
        }
        f.write_str(self.occurs.suffix())
    }
}

/// One attribute definition from an `<!ATTLIST>`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttDef {
    pub element: Symbol,
    pub name: Symbol,
    pub att_type: AttType,
    pub default: AttDefault,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation(Vec<Symbol>),
    Enumeration(Vec<Symbol>),
}

impl AttType {
    pub fn is_cdata(&self) -> bool {
        matches!(self, AttType::CData)
    }
}

impl fmt::Display for AttType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |f: &mut fmt::Formatter<'_>, names: &[Symbol]| -> fmt::Result {
            f.write_str("(")?;
            for (i, n) in names.iter().enumerate() {
                if i > 0 {
                    f.write_str("|")?;
                }
                f.write_str(n)?;
            }
            f.write_str(")")
        };
        match self {
            AttType::CData => f.write_str("CDATA"),
            AttType::Id => f.write_str("ID"),
            AttType::IdRef => f.write_str("IDREF"),
            AttType::IdRefs => f.write_str("IDREFS"),
            AttType::Entity => f.write_str("ENTITY"),
            AttType::Entities => f.write_str("ENTITIES"),
            AttType::NmToken => f.write_str("NMTOKEN"),
            AttType::NmTokens => f.write_str("NMTOKENS"),
            AttType::Notation(names) => {
                f.write_str("NOTATION ")?;
                list(f, names)
            }
            AttType::Enumeration(names) => list(f, names),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttDefault {
    Required,
    Implied,
    Fixed(String),
    Default(String),
}

impl AttDefault {
    /// Value to inject when the attribute is absent.
    pub fn value(&self) -> Option<&str> {
        match self {
            AttDefault::Fixed(v) | AttDefault::Default(v) => Some(v),
            AttDefault::Required | AttDefault::Implied => None,
        }
    }
}

/// `<!ENTITY>` declaration, general or parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDecl {
    pub name: Symbol,
    pub parameter: bool,
    /// Replacement text of an internal entity.
    pub value: Option<String>,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// System identifier of the entity the declaration appeared in.
    pub base_system_id: Option<String>,
    /// NDATA notation of an unparsed entity.
    pub notation: Option<Symbol>,
    /// Declared in the external subset or an external parameter entity.
    pub external_declaration: bool,
}

impl EntityDecl {
    pub fn internal(name: Symbol, value: impl Into<String>) -> Self {
        EntityDecl {
            name,
            parameter: false,
            value: Some(value.into()),
            public_id: None,
            system_id: None,
            base_system_id: None,
            notation: None,
            external_declaration: false,
        }
    }

    pub fn is_external(&self) -> bool {
        self.value.is_none()
    }

    pub fn is_unparsed(&self) -> bool {
        self.notation.is_some()
    }
}

/// `<!NOTATION>` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct NotationDecl {
    pub name: Symbol,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

/// A declaration in source order.
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Element(Arc<ElementDecl>),
    Attribute(Arc<AttDef>),
    Entity(Arc<EntityDecl>),
    Notation(Arc<NotationDecl>),
}

/// Declarations of one DTD.
#[derive(Debug, Clone, PartialEq)]
pub struct DtdGrammar {
    description: GrammarDescription,
    elements: HashMap<Symbol, Arc<ElementDecl>>,
    attlists: HashMap<Symbol, Vec<Arc<AttDef>>>,
    entities: HashMap<Symbol, Arc<EntityDecl>>,
    pe_entities: HashMap<Symbol, Arc<EntityDecl>>,
    notations: HashMap<Symbol, Arc<NotationDecl>>,
    declarations: Vec<Declaration>,
}

impl DtdGrammar {
    pub fn new(description: GrammarDescription) -> Self {
        DtdGrammar {
            description,
            elements: HashMap::new(),
            attlists: HashMap::new(),
            entities: HashMap::new(),
            pe_entities: HashMap::new(),
            notations: HashMap::new(),
            declarations: Vec::new(),
        }
    }

    pub fn description(&self) -> &GrammarDescription {
        &self.description
    }

    /// Add an element declaration. Returns false if the element was already
    /// declared; the first declaration is kept.
    pub fn add_element(&mut self, decl: Arc<ElementDecl>) -> bool {
        if self.elements.contains_key(&decl.name) {
            return false;
        }
        self.elements.insert(decl.name.clone(), decl.clone());
        self.declarations.push(Declaration::Element(decl));
        true
    }

    /// Add an attribute definition. Returns false if the attribute was
    /// already defined for the element; the first definition is kept.
    pub fn add_attribute(&mut self, def: Arc<AttDef>) -> bool {
        let list = self.attlists.entry(def.element.clone()).or_default();
        if list.iter().any(|d| d.name == def.name) {
            return false;
        }
        list.push(def.clone());
        self.declarations.push(Declaration::Attribute(def));
        true
    }

    /// Add an entity declaration. Returns false if already declared.
    pub fn add_entity(&mut self, decl: Arc<EntityDecl>) -> bool {
        let map = if decl.parameter {
            &mut self.pe_entities
        } else {
            &mut self.entities
        };
        if map.contains_key(&decl.name) {
            return false;
        }
        map.insert(decl.name.clone(), decl.clone());
        self.declarations.push(Declaration::Entity(decl));
        true
    }

    /// Add a notation declaration. Returns false if already declared.
    pub fn add_notation(&mut self, decl: Arc<NotationDecl>) -> bool {
        if self.notations.contains_key(&decl.name) {
            return false;
        }
        self.notations.insert(decl.name.clone(), decl.clone());
        self.declarations.push(Declaration::Notation(decl));
        true
    }

    pub fn element(&self, name: &str) -> Option<&Arc<ElementDecl>> {
        self.elements.get(name)
    }

    /// Attribute definitions for `element`, in declaration order.
    pub fn attributes(&self, element: &str) -> &[Arc<AttDef>] {
        self.attlists.get(element).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn attribute(&self, element: &str, name: &str) -> Option<&Arc<AttDef>> {
        self.attributes(element).iter().find(|d| &*d.name == name)
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<EntityDecl>> {
        self.entities.get(name)
    }

    pub fn parameter_entity(&self, name: &str) -> Option<&Arc<EntityDecl>> {
        self.pe_entities.get(name)
    }

    pub fn notation(&self, name: &str) -> Option<&Arc<NotationDecl>> {
        self.notations.get(name)
    }

    /// All declarations in the order they were added.
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn has_elements(&self) -> bool {
        !self.elements.is_empty()
    }

    /// Notation names referenced by NOTATION attributes or unparsed entities
    /// that were never declared.
    pub fn undeclared_notations(&self) -> Vec<Symbol> {
        let mut missing = Vec::new();
        let used = self
            .attlists
            .values()
            .flatten()
            .filter_map(|d| match &d.att_type {
                AttType::Notation(names) => Some(names.iter()),
                _ => None,
            })
            .flatten()
            .chain(self.entities.values().filter_map(|e| e.notation.as_ref()));
        for name in used {
            if !self.notations.contains_key(name) && !missing.contains(name) {
                missing.push(name.clone());
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::detached(s)
    }

    fn name(s: &str, occurs: Occurrence) -> ContentParticle {
        ContentParticle::new(Particle::Name(sym(s)), occurs)
    }

    fn names(list: &[&str]) -> Vec<Symbol> {
        list.iter().map(|s| sym(s)).collect()
    }

    #[test]
    fn test_sequence_model() {
        // (a, b?, c+)
        let model = ContentSpec::Children(ContentParticle::new(
            Particle::Sequence(vec![
                name("a", Occurrence::Once),
                name("b", Occurrence::Optional),
                name("c", Occurrence::OneOrMore),
            ]),
            Occurrence::Once,
        ));
        assert!(model.accepts(&names(&["a", "c"])));
        assert!(model.accepts(&names(&["a", "b", "c", "c"])));
        assert!(!model.accepts(&names(&["a", "b"])));
        assert!(!model.accepts(&names(&["b", "c"])));
        assert_eq!(model.to_string(), "(a,b?,c+)");
    }

    #[test]
    fn test_repeated_choice_model() {
        // (a | b)*
        let model = ContentSpec::Children(ContentParticle::new(
            Particle::Choice(vec![name("a", Occurrence::Once), name("b", Occurrence::Once)]),
            Occurrence::ZeroOrMore,
        ));
        assert!(model.accepts(&[]));
        assert!(model.accepts(&names(&["b", "a", "b"])));
        assert!(!model.accepts(&names(&["a", "c"])));
    }

    #[test]
    fn test_mixed_and_empty() {
        let mixed = ContentSpec::Mixed(names(&["em"]));
        assert!(mixed.accepts(&names(&["em", "em"])));
        assert!(!mixed.accepts(&names(&["b"])));
        assert!(ContentSpec::Empty.accepts(&[]));
        assert!(!ContentSpec::Empty.accepts(&names(&["x"])));
        assert_eq!(mixed.to_string(), "(#PCDATA|em)*");
    }

    #[test]
    fn test_first_declaration_wins() {
        let mut dtd = DtdGrammar::new(GrammarDescription::default());
        assert!(dtd.add_entity(Arc::new(EntityDecl::internal(sym("e"), "one"))));
        assert!(!dtd.add_entity(Arc::new(EntityDecl::internal(sym("e"), "two"))));
        assert_eq!(dtd.entity("e").unwrap().value.as_deref(), Some("one"));

        let def = |default: &str| {
            Arc::new(AttDef {
                element: sym("r"),
                name: sym("a"),
                att_type: AttType::CData,
                default: AttDefault::Default(default.to_string()),
            })
        };
        assert!(dtd.add_attribute(def("x")));
        assert!(!dtd.add_attribute(def("y")));
        assert_eq!(dtd.attribute("r", "a").unwrap().default.value(), Some("x"));
        assert_eq!(dtd.declarations().len(), 2);
    }

    #[test]
    fn test_undeclared_notations() {
        let mut dtd = DtdGrammar::new(GrammarDescription::default());
        let mut unparsed = EntityDecl::internal(sym("pic"), "");
        unparsed.value = None;
        unparsed.system_id = Some("pic.gif".into());
        unparsed.notation = Some(sym("gif"));
        dtd.add_entity(Arc::new(unparsed));
        assert_eq!(dtd.undeclared_notations(), vec![sym("gif")]);
        dtd.add_notation(Arc::new(NotationDecl {
            name: sym("gif"),
            public_id: None,
            system_id: Some("viewer".into()),
        }));
        assert!(dtd.undeclared_notations().is_empty());
    }
}
