//! DTD scanning: the DOCTYPE declaration, internal and external subsets,
//! parameter entities and conditional sections.
//!
//! Declarations are parsed into `grammar::dtd` types and emitted as
//! [`DtdEvent`]s. Entities are also recorded on the scanner so content can
//! reference them. Parameter entity references inside declarations are only
//! legal in external text and are expanded textually there.

use std::borrow::Cow;
use std::sync::Arc;

use super::events::{DocumentEvent, DtdEvent};
use super::scanner::{text_declaration_len, DocumentScanner, Frame, LineTracker};
use super::{Pipeline, PipelineContext};
use crate::core::chars::{collapse_whitespace, is_name_start_char, is_pubid};
use crate::core::scanner::Scanner;
use crate::error::XmlError;
use crate::grammar::dtd::{
    AttDef, AttDefault, AttType, ContentParticle, ContentSpec, Declaration, DtdGrammar, ElementDecl,
    EntityDecl, NotationDecl, Occurrence, Particle,
};
use crate::symbols::{Symbol, SymbolSource};

const PE_IN_INTERNAL_MARKUP: &str =
    "parameter entity references are not allowed within markup declarations in the internal subset";

/// Where the declarations being scanned come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubsetKind {
    /// The internal subset itself; ends at `]`.
    Internal,
    /// Replacement text of an internal parameter entity referenced from the
    /// internal subset.
    InternalEntity,
    External,
}

impl SubsetKind {
    fn is_external(self) -> bool {
        self == SubsetKind::External
    }
}

/// Replacement text of a parameter entity.
struct PeText {
    name: Symbol,
    text: Arc<str>,
    start: usize,
    system_id: Option<Arc<str>>,
    external: bool,
}

type DeclResult<T> = Result<T, String>;

impl DocumentScanner {
    /// Scan a DOCTYPE whose `<!DOCTYPE` has been consumed.
    pub(super) fn scan_doctype(
        &mut self,
        cur: &mut Scanner<'_>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let start = cur.position();
        if !cur.skip_whitespace() {
            return Err(self.fail(ctx, start, "whitespace expected after <!DOCTYPE"));
        }
        let Some(root_raw) = cur.read_name() else {
            return Err(self.fail(ctx, cur.position(), "root element name expected in DOCTYPE"));
        };
        let root = ctx.symbols.intern(root_raw);
        let (public_id, system_id) = if cur.skip_whitespace() {
            match external_id(cur, false) {
                Ok(Some(ids)) => ids,
                Ok(None) => (None, None),
                Err(message) => return Err(self.fail(ctx, start, message)),
            }
        } else {
            (None, None)
        };
        cur.skip_whitespace();
        let has_internal_subset = cur.peek() == Some(b'[');
        self.set_pos(cur.position());

        pipeline.document(
            ctx,
            DocumentEvent::DoctypeDecl {
                root: root.clone(),
                public_id: public_id.clone(),
                system_id: system_id.clone(),
                has_internal_subset,
            },
        )?;
        pipeline.dtd(
            ctx,
            DtdEvent::StartDtd {
                root,
                public_id: public_id.clone(),
                system_id: system_id.clone(),
            },
        )?;

        let cached = ctx.directives.cached_dtd.take().filter(|_| !has_internal_subset);

        let mut internal_subset = None;
        if has_internal_subset {
            let subset_start = cur.position() + 1;
            self.set_pos(subset_start);
            let end = self.top().text.len();
            self.scan_subset(end, SubsetKind::Internal, &mut Vec::new(), pipeline, ctx)?;
            let close = self.top().pos;
            internal_subset = Some(self.top().text[subset_start..close].to_string());
            cur.set_position(close + 1);
        }
        cur.skip_whitespace();
        if !cur.eat(b">") {
            return Err(self.fail(ctx, cur.position(), "DOCTYPE is not terminated"));
        }
        self.set_pos(cur.position());

        match (cached, system_id) {
            (Some(grammar), _) => self.replay_grammar(&grammar, pipeline, ctx)?,
            (None, Some(system_id)) => {
                if self.options.load_external_dtd || self.options.validation {
                    self.scan_external_subset(public_id.as_deref(), &system_id, pipeline, ctx)?;
                } else {
                    tracing::debug!(%system_id, "external subset not loaded");
                    self.dtd_complete = false;
                }
            }
            (None, None) => {}
        }

        pipeline.dtd(ctx, DtdEvent::EndDtd { internal_subset })
    }

    fn scan_external_subset(
        &mut self,
        public_id: Option<&str>,
        system_id: &str,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let base = self.top().system_id.clone();
        let loaded = ctx.resolution.open(public_id, Some(system_id), base.as_deref())?;
        pipeline.dtd(
            ctx,
            DtdEvent::StartExternalSubset {
                system_id: loaded.system_id.clone(),
            },
        )?;

        let depth = self.frames.len();
        self.frames.push(Frame {
            text: loaded.text,
            pos: 0,
            entity: None,
            system_id: loaded.system_id,
            lines: LineTracker::new(),
            depth: 0,
        });
        let result = self.skip_text_declaration(ctx).and_then(|_| {
            let end = self.top().text.len();
            self.scan_subset(end, SubsetKind::External, &mut Vec::new(), pipeline, ctx)
        });
        self.frames.truncate(depth);
        result?;

        pipeline.dtd(ctx, DtdEvent::EndExternalSubset)
    }

    /// Emit a pooled grammar's declarations in place of reading the
    /// external subset.
    fn replay_grammar(
        &mut self,
        grammar: &DtdGrammar,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        tracing::debug!(
            declarations = grammar.declarations().len(),
            "reusing cached external subset"
        );
        let system_id = grammar
            .description()
            .expanded_system_id
            .as_deref()
            .map(Arc::from);
        pipeline.dtd(ctx, DtdEvent::StartExternalSubset { system_id })?;
        for decl in grammar.declarations() {
            let event = match decl {
                Declaration::Element(d) => DtdEvent::ElementDecl(d.clone()),
                Declaration::Attribute(d) => DtdEvent::AttributeDecl(d.clone()),
                Declaration::Notation(d) => DtdEvent::NotationDecl(d.clone()),
                Declaration::Entity(d) => {
                    if !self.register_entity(d.clone()) {
                        continue;
                    }
                    DtdEvent::entity(d.clone())
                }
            };
            pipeline.dtd(ctx, event)?;
        }
        pipeline.dtd(ctx, DtdEvent::EndExternalSubset)
    }

    /// Record an entity; the first declaration of a name wins.
    fn register_entity(&mut self, decl: Arc<EntityDecl>) -> bool {
        let map = if decl.parameter {
            &mut self.pe_entities
        } else {
            &mut self.entities
        };
        if map.contains_key(&decl.name) {
            tracing::trace!(entity = %decl.name, "ignoring redeclared entity");
            return false;
        }
        map.insert(decl.name.clone(), decl);
        true
    }

    // ------------------------------------------------------------------------
    // Subsets
    // ------------------------------------------------------------------------

    /// Scan declarations in the current frame up to `end`.
    fn scan_subset(
        &mut self,
        end: usize,
        kind: SubsetKind,
        pes: &mut Vec<Symbol>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        loop {
            let text = self.top().text.clone();
            let mut cur = Scanner::at(&text[..end], self.top().pos);
            cur.skip_whitespace();
            let start = cur.position();
            self.set_pos(start);

            if cur.is_eof() {
                return match kind {
                    SubsetKind::Internal => Err(self.fail(
                        ctx,
                        start,
                        "internal subset is not terminated",
                    )),
                    _ => Ok(()),
                };
            }
            self.locate(ctx, start);

            if cur.peek() == Some(b']') {
                if kind == SubsetKind::Internal {
                    return Ok(());
                }
                return Err(self.fail(ctx, start, "unexpected ']' in DTD"));
            } else if cur.eat(b"%") {
                self.scan_pe_reference(&mut cur, kind, pes, pipeline, ctx)?;
            } else if cur.eat(b"<!--") {
                let Some(body) = cur.read_until(b"-->") else {
                    return Err(self.fail(ctx, start, "comment is not terminated"));
                };
                if body.contains("--") || body.ends_with('-') {
                    return Err(self.fail(ctx, start, "\"--\" is not allowed inside a comment"));
                }
                self.set_pos(cur.position());
                pipeline.dtd(ctx, DtdEvent::Comment(body.to_string()))?;
            } else if cur.eat(b"<?") {
                let (target, data) = self.read_pi(&mut cur, ctx)?;
                self.set_pos(cur.position());
                pipeline.dtd(ctx, DtdEvent::ProcessingInstruction { target, data })?;
            } else if cur.eat(b"<![") {
                self.scan_conditional(&mut cur, kind, pes, pipeline, ctx)?;
            } else if cur.eat(b"<!") {
                self.scan_markup_decl(&mut cur, kind, pes, pipeline, ctx)?;
            } else {
                return Err(self.fail(ctx, start, "markup declaration expected in DTD"));
            }
        }
    }

    /// `%name;` between declarations: scan the replacement text in place.
    fn scan_pe_reference(
        &mut self,
        cur: &mut Scanner<'_>,
        kind: SubsetKind,
        pes: &mut Vec<Symbol>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let start = cur.position() - 1;
        let Some(name) = cur.read_name() else {
            return Err(self.fail(ctx, start, "parameter entity name expected after '%'"));
        };
        if !cur.eat(b";") {
            return Err(self.fail(ctx, start, format!("reference \"%{}\" must end with ';'", name)));
        }
        self.set_pos(cur.position());

        let Some(pe) = self.parameter_entity_text(name, start, pes, ctx)? else {
            return Ok(());
        };
        let nested = if kind.is_external() || pe.external {
            SubsetKind::External
        } else {
            SubsetKind::InternalEntity
        };

        let depth = self.frames.len();
        let end = pe.text.len();
        self.frames.push(Frame {
            text: pe.text,
            pos: pe.start,
            entity: None,
            system_id: pe.system_id,
            lines: LineTracker::new(),
            depth: 0,
        });
        pes.push(pe.name);
        let result = self.scan_subset(end, nested, pes, pipeline, ctx);
        pes.pop();
        self.frames.truncate(depth);
        result
    }

    /// Look up and load a parameter entity. `None` when it is undeclared or
    /// external and not being read.
    fn parameter_entity_text(
        &mut self,
        name: &str,
        pos: usize,
        pes: &[Symbol],
        ctx: &mut PipelineContext,
    ) -> Result<Option<PeText>, XmlError> {
        let Some(decl) = self.pe_entities.get(name).cloned() else {
            self.dtd_complete = false;
            if self.options.validation {
                self.locate(ctx, pos);
                ctx.error(format!(
                    "parameter entity \"%{};\" was referenced but not declared",
                    name
                ))?;
            }
            return Ok(None);
        };
        if pes.contains(&decl.name) {
            return Err(self.fail(
                ctx,
                pos,
                format!("recursive reference to parameter entity \"%{};\"", name),
            ));
        }
        self.count_expansion(ctx, pos)?;

        if let Some(value) = &decl.value {
            return Ok(Some(PeText {
                name: decl.name.clone(),
                text: Arc::from(value.as_str()),
                start: 0,
                system_id: self.top().system_id.clone(),
                external: false,
            }));
        }
        if !(self.options.external_parameter_entities || self.options.validation) {
            tracing::debug!(entity = %decl.name, "external parameter entity not loaded");
            self.dtd_complete = false;
            return Ok(None);
        }
        let loaded = ctx.resolution.open(
            decl.public_id.as_deref(),
            decl.system_id.as_deref(),
            decl.base_system_id.as_deref(),
        )?;
        let start = match text_declaration_len(&loaded.text) {
            Ok(len) => len,
            Err(message) => return Err(self.fail(ctx, pos, message)),
        };
        Ok(Some(PeText {
            name: decl.name.clone(),
            text: loaded.text,
            start,
            system_id: loaded.system_id,
            external: true,
        }))
    }

    /// `<![ INCLUDE [ ... ]]>` or `<![ IGNORE [ ... ]]>`.
    fn scan_conditional(
        &mut self,
        cur: &mut Scanner<'_>,
        kind: SubsetKind,
        pes: &mut Vec<Symbol>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let start = cur.position() - 3;
        if !kind.is_external() {
            return Err(self.fail(
                ctx,
                start,
                "conditional sections are only allowed in external DTD text",
            ));
        }
        cur.skip_whitespace();
        let keyword: String = if cur.eat(b"%") {
            let Some(name) = cur.read_name().filter(|_| cur.eat(b";")) else {
                return Err(self.fail(
                    ctx,
                    start,
                    "malformed parameter entity reference in conditional section",
                ));
            };
            match self.parameter_entity_text(name, start, pes, ctx)? {
                Some(pe) => pe.text[pe.start..].trim().to_string(),
                None => String::new(),
            }
        } else {
            cur.read_name().unwrap_or_default().to_string()
        };
        cur.skip_whitespace();
        if !cur.eat(b"[") {
            return Err(self.fail(ctx, start, "'[' expected in conditional section"));
        }
        let body_start = cur.position();
        let Some((inner, total)) = conditional_section_len(cur.remaining()) else {
            return Err(self.fail(ctx, start, "conditional section is not terminated"));
        };

        match keyword.as_str() {
            "INCLUDE" => {
                self.set_pos(body_start);
                self.scan_subset(body_start + inner, SubsetKind::External, pes, pipeline, ctx)?;
            }
            "IGNORE" => {}
            other => {
                return Err(self.fail(
                    ctx,
                    start,
                    format!(
                        "conditional section keyword must be INCLUDE or IGNORE, found \"{}\"",
                        other
                    ),
                ))
            }
        }
        self.set_pos(body_start + total);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------------

    fn scan_markup_decl(
        &mut self,
        cur: &mut Scanner<'_>,
        kind: SubsetKind,
        pes: &mut Vec<Symbol>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let start = cur.position() - 2;
        let Some(keyword) = cur.read_name() else {
            return Err(self.fail(ctx, start, "markup declaration expected in DTD"));
        };
        let Some(gt) = cur.find_tag_end_quoted() else {
            return Err(self.fail(
                ctx,
                start,
                format!("<!{} declaration is not terminated", keyword),
            ));
        };
        let raw_body = cur.slice(cur.position(), gt);
        cur.set_position(gt + 1);
        self.set_pos(gt + 1);

        let body: Cow<'_, str> = match find_markup_pe(raw_body) {
            None => Cow::Borrowed(raw_body),
            Some(_) if !kind.is_external() => {
                return Err(self.fail(
                    ctx,
                    start,
                    PE_IN_INTERNAL_MARKUP,
                ))
            }
            Some(_) => Cow::Owned(self.expand_markup_pes(raw_body, start, pes, ctx)?),
        };
        let mut p = Scanner::new(&body);

        match keyword {
            "ELEMENT" => {
                let decl = match element_decl(&mut p, &mut *ctx.symbols) {
                    Ok(d) => d,
                    Err(m) => return Err(self.fail(ctx, start, format!("in <!ELEMENT>: {}", m))),
                };
                pipeline.dtd(ctx, DtdEvent::ElementDecl(Arc::new(decl)))
            }
            "ATTLIST" => {
                let (element, defs) = match attlist_decl(&mut p, &mut *ctx.symbols) {
                    Ok(parsed) => parsed,
                    Err(m) => return Err(self.fail(ctx, start, format!("in <!ATTLIST>: {}", m))),
                };
                for (name, att_type, default) in defs {
                    let default = match default {
                        AttDefault::Fixed(raw) => {
                            AttDefault::Fixed(self.default_value(&raw, &att_type, start, ctx)?)
                        }
                        AttDefault::Default(raw) => {
                            AttDefault::Default(self.default_value(&raw, &att_type, start, ctx)?)
                        }
                        other => other,
                    };
                    let def = AttDef {
                        element: element.clone(),
                        name,
                        att_type,
                        default,
                    };
                    pipeline.dtd(ctx, DtdEvent::AttributeDecl(Arc::new(def)))?;
                }
                Ok(())
            }
            "ENTITY" => {
                let parts = match entity_decl(&mut p) {
                    Ok(parts) => parts,
                    Err(m) => return Err(self.fail(ctx, start, format!("in <!ENTITY>: {}", m))),
                };
                let value = match parts.literal {
                    Some(raw) => Some(self.entity_value(raw, kind, start, pes, ctx)?),
                    None => None,
                };
                let decl = EntityDecl {
                    name: ctx.symbols.intern(parts.name),
                    parameter: parts.parameter,
                    value,
                    public_id: parts.public_id,
                    system_id: parts.system_id,
                    base_system_id: self.top().system_id.as_deref().map(str::to_string),
                    notation: parts.notation.map(|n| ctx.symbols.intern(n)),
                    external_declaration: kind.is_external(),
                };
                let decl = Arc::new(decl);
                if self.register_entity(decl.clone()) {
                    pipeline.dtd(ctx, DtdEvent::entity(decl))?;
                }
                Ok(())
            }
            "NOTATION" => {
                let decl = match notation_decl(&mut p, &mut *ctx.symbols) {
                    Ok(d) => d,
                    Err(m) => return Err(self.fail(ctx, start, format!("in <!NOTATION>: {}", m))),
                };
                pipeline.dtd(ctx, DtdEvent::NotationDecl(Arc::new(decl)))
            }
            other => Err(self.fail(ctx, start, format!("unknown markup declaration <!{}", other))),
        }
    }

    /// Normalize an attribute default the way a specified value would be.
    fn default_value(
        &mut self,
        raw: &str,
        att_type: &AttType,
        pos: usize,
        ctx: &mut PipelineContext,
    ) -> Result<String, XmlError> {
        let value = self.normalize_attribute_value(raw, pos, ctx)?;
        Ok(if att_type.is_cdata() {
            value
        } else {
            collapse_whitespace(&value)
        })
    }

    /// Replacement text of an entity literal: character references and
    /// parameter entities are expanded; general entity references are kept.
    fn entity_value(
        &mut self,
        raw: &str,
        kind: SubsetKind,
        pos: usize,
        pes: &mut Vec<Symbol>,
        ctx: &mut PipelineContext,
    ) -> Result<String, XmlError> {
        if let Some(c) = self.invalid_char(raw) {
            return Err(self.fail(
                ctx,
                pos,
                format!("invalid character U+{:04X} in entity value", c as u32),
            ));
        }
        let mut out = String::with_capacity(raw.len());
        let mut cur = Scanner::new(raw);
        while let Some(c) = cur.next_char() {
            match c {
                '%' => {
                    let Some(name) = cur.read_name().filter(|_| cur.eat(b";")) else {
                        return Err(self.fail(
                            ctx,
                            pos,
                            "malformed parameter entity reference in entity value",
                        ));
                    };
                    if !kind.is_external() {
                        return Err(self.fail(
                            ctx,
                            pos,
                            PE_IN_INTERNAL_MARKUP,
                        ));
                    }
                    let Some(pe) = self.parameter_entity_text(name, pos, pes, ctx)? else {
                        continue;
                    };
                    if pe.external {
                        pes.push(pe.name.clone());
                        let nested = self.entity_value(&pe.text[pe.start..], kind, pos, pes, ctx);
                        pes.pop();
                        out.push_str(&nested?);
                    } else {
                        out.push_str(&pe.text);
                    }
                }
                '&' => {
                    let body = self.read_reference(&mut cur, pos, ctx)?;
                    match body.strip_prefix('#') {
                        Some(digits) => out.push(self.char_reference(digits, ctx, pos)?),
                        None => {
                            out.push('&');
                            out.push_str(body);
                            out.push(';');
                        }
                    }
                }
                c => out.push(c),
            }
        }
        Ok(out)
    }

    /// Expand parameter entity references outside literals.
    fn expand_markup_pes(
        &mut self,
        body: &str,
        pos: usize,
        pes: &mut Vec<Symbol>,
        ctx: &mut PipelineContext,
    ) -> Result<String, XmlError> {
        let mut out = String::with_capacity(body.len());
        let mut quote: Option<char> = None;
        let mut cur = Scanner::new(body);
        while let Some(c) = cur.next_char() {
            match (c, quote) {
                ('"' | '\'', None) => {
                    quote = Some(c);
                    out.push(c);
                }
                (q, Some(open)) if q == open => {
                    quote = None;
                    out.push(c);
                }
                ('%', None) if cur.peek_char().is_some_and(is_name_start_char) => {
                    let Some(name) = cur.read_name().filter(|_| cur.eat(b";")) else {
                        return Err(self.fail(
                            ctx,
                            pos,
                            "malformed parameter entity reference in declaration",
                        ));
                    };
                    if let Some(pe) = self.parameter_entity_text(name, pos, pes, ctx)? {
                        pes.push(pe.name.clone());
                        let inner = self.expand_markup_pes(&pe.text[pe.start..], pos, pes, ctx);
                        pes.pop();
                        out.push(' ');
                        out.push_str(&inner?);
                        out.push(' ');
                    }
                }
                _ => out.push(c),
            }
        }
        Ok(out)
    }
}

// ============================================================================
// Declaration grammar
// ============================================================================

/// Offset of the first `%name` outside a quoted literal.
fn find_markup_pe(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match (c, quote) {
            ('"' | '\'', None) => quote = Some(c),
            (q, Some(open)) if q == open => quote = None,
            ('%', None) if chars.peek().is_some_and(|&(_, n)| is_name_start_char(n)) => {
                return Some(i)
            }
            _ => {}
        }
    }
    None
}

/// Lengths of the body and of the whole remainder of a conditional section
/// starting just after its `[`, accounting for nesting.
fn conditional_section_len(text: &str) -> Option<(usize, usize)> {
    let mut depth = 1usize;
    let mut pos = 0;
    loop {
        let rest = &text[pos..];
        let open = memchr::memmem::find(rest.as_bytes(), b"<![");
        let close = memchr::memmem::find(rest.as_bytes(), b"]]>")?;
        match open {
            Some(o) if o < close => {
                depth += 1;
                pos += o + 3;
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some((pos + close, pos + close + 3));
                }
                pos += close + 3;
            }
        }
    }
}

fn require_space(cur: &mut Scanner<'_>, after: &str) -> DeclResult<()> {
    if cur.skip_whitespace() {
        Ok(())
    } else {
        Err(format!("whitespace required after {}", after))
    }
}

fn name<'s>(cur: &mut Scanner<'s>, what: &str) -> DeclResult<&'s str> {
    cur.read_name().ok_or_else(|| format!("{} expected", what))
}

fn literal<'s>(cur: &mut Scanner<'s>, what: &str) -> DeclResult<&'s str> {
    cur.read_quoted().ok_or_else(|| format!("quoted {} expected", what))
}

fn finish(cur: &mut Scanner<'_>) -> DeclResult<()> {
    cur.skip_whitespace();
    if cur.is_eof() {
        Ok(())
    } else {
        Err(format!("unexpected \"{}\" at end of declaration", cur.remaining().trim()))
    }
}

/// `SYSTEM 'sys'` or `PUBLIC 'pub' 'sys'`. With `public_only`, the system
/// literal after a public identifier is optional (notations).
#[allow(clippy::type_complexity)]
fn external_id(
    cur: &mut Scanner<'_>,
    public_only: bool,
) -> DeclResult<Option<(Option<String>, Option<String>)>> {
    if cur.eat(b"SYSTEM") {
        require_space(cur, "SYSTEM")?;
        let system = literal(cur, "system identifier")?;
        return Ok(Some((None, Some(system.to_string()))));
    }
    if !cur.eat(b"PUBLIC") {
        return Ok(None);
    }
    require_space(cur, "PUBLIC")?;
    let public = literal(cur, "public identifier")?;
    if !is_pubid(public) {
        return Err(format!("invalid character in public identifier \"{}\"", public));
    }
    let public = Some(collapse_whitespace(public));
    let had_space = cur.skip_whitespace();
    match cur.peek() {
        Some(b'"' | b'\'') if had_space => {
            let system = literal(cur, "system identifier")?;
            Ok(Some((public, Some(system.to_string()))))
        }
        Some(b'"' | b'\'') => Err("whitespace required before the system identifier".to_string()),
        _ if public_only => Ok(Some((public, None))),
        _ => Err("system identifier expected after the public identifier".to_string()),
    }
}

fn element_decl(cur: &mut Scanner<'_>, symbols: &mut dyn SymbolSource) -> DeclResult<ElementDecl> {
    require_space(cur, "<!ELEMENT")?;
    let element = name(cur, "element name")?;
    require_space(cur, "the element name")?;
    let content = content_spec(cur, symbols)?;
    finish(cur)?;
    Ok(ElementDecl {
        name: symbols.intern(element),
        content,
    })
}

fn content_spec(cur: &mut Scanner<'_>, symbols: &mut dyn SymbolSource) -> DeclResult<ContentSpec> {
    if cur.eat(b"EMPTY") {
        return Ok(ContentSpec::Empty);
    }
    if cur.eat(b"ANY") {
        return Ok(ContentSpec::Any);
    }
    if !cur.eat(b"(") {
        return Err("content specification expected".to_string());
    }
    cur.skip_whitespace();
    if cur.eat(b"#PCDATA") {
        let mut names: Vec<Symbol> = Vec::new();
        loop {
            cur.skip_whitespace();
            if cur.eat(b")") {
                break;
            }
            if !cur.eat(b"|") {
                return Err("'|' or ')' expected in mixed content".to_string());
            }
            cur.skip_whitespace();
            let n = symbols.intern(name(cur, "element name")?);
            if names.contains(&n) {
                return Err(format!("\"{}\" appears twice in mixed content", n));
            }
            names.push(n);
        }
        if names.is_empty() {
            cur.eat(b"*");
        } else if !cur.eat(b"*") {
            return Err("mixed content with element names must end with \")*\"".to_string());
        }
        return Ok(ContentSpec::Mixed(names));
    }
    Ok(ContentSpec::Children(group(cur, symbols)?))
}

/// Rest of a `(a, b)` or `(a | b)` group after its `(`.
fn group(cur: &mut Scanner<'_>, symbols: &mut dyn SymbolSource) -> DeclResult<ContentParticle> {
    let mut items = vec![particle(cur, symbols)?];
    let mut separator = None;
    loop {
        cur.skip_whitespace();
        if cur.eat(b")") {
            break;
        }
        match cur.peek() {
            Some(sep @ (b',' | b'|')) => {
                if separator.is_some_and(|s| s != sep) {
                    return Err("',' and '|' cannot be mixed in one group".to_string());
                }
                separator = Some(sep);
                cur.advance(1);
                cur.skip_whitespace();
                items.push(particle(cur, symbols)?);
            }
            _ => return Err("',', '|' or ')' expected in content model".to_string()),
        }
    }
    let particle = match separator {
        Some(b'|') => Particle::Choice(items),
        _ => Particle::Sequence(items),
    };
    Ok(ContentParticle::new(particle, occurrence(cur)))
}

fn particle(cur: &mut Scanner<'_>, symbols: &mut dyn SymbolSource) -> DeclResult<ContentParticle> {
    if cur.eat(b"(") {
        cur.skip_whitespace();
        return group(cur, symbols);
    }
    let n = symbols.intern(name(cur, "element name")?);
    Ok(ContentParticle::new(Particle::Name(n), occurrence(cur)))
}

fn occurrence(cur: &mut Scanner<'_>) -> Occurrence {
    let occurs = match cur.peek() {
        Some(b'?') => Occurrence::Optional,
        Some(b'*') => Occurrence::ZeroOrMore,
        Some(b'+') => Occurrence::OneOrMore,
        _ => return Occurrence::Once,
    };
    cur.advance(1);
    occurs
}

/// Attribute definitions with raw (unnormalized) defaults.
#[allow(clippy::type_complexity)]
fn attlist_decl(
    cur: &mut Scanner<'_>,
    symbols: &mut dyn SymbolSource,
) -> DeclResult<(Symbol, Vec<(Symbol, AttType, AttDefault)>)> {
    require_space(cur, "<!ATTLIST")?;
    let element = symbols.intern(name(cur, "element name")?);
    let mut defs = Vec::new();
    loop {
        let had_space = cur.skip_whitespace();
        if cur.is_eof() {
            break;
        }
        if !had_space {
            return Err("whitespace required between attribute definitions".to_string());
        }
        let attr = symbols.intern(name(cur, "attribute name")?);
        require_space(cur, "the attribute name")?;
        let att_type = att_type(cur, symbols)?;
        require_space(cur, "the attribute type")?;
        let default = if cur.eat(b"#REQUIRED") {
            AttDefault::Required
        } else if cur.eat(b"#IMPLIED") {
            AttDefault::Implied
        } else if cur.eat(b"#FIXED") {
            require_space(cur, "#FIXED")?;
            AttDefault::Fixed(literal(cur, "default value")?.to_string())
        } else {
            AttDefault::Default(literal(cur, "default value")?.to_string())
        };
        defs.push((attr, att_type, default));
    }
    Ok((element, defs))
}

fn att_type(cur: &mut Scanner<'_>, symbols: &mut dyn SymbolSource) -> DeclResult<AttType> {
    if cur.peek() == Some(b'(') {
        return Ok(AttType::Enumeration(token_list(cur, symbols, Scanner::read_nmtoken)?));
    }
    Ok(match name(cur, "attribute type")? {
        "CDATA" => AttType::CData,
        "ID" => AttType::Id,
        "IDREF" => AttType::IdRef,
        "IDREFS" => AttType::IdRefs,
        "ENTITY" => AttType::Entity,
        "ENTITIES" => AttType::Entities,
        "NMTOKEN" => AttType::NmToken,
        "NMTOKENS" => AttType::NmTokens,
        "NOTATION" => {
            require_space(cur, "NOTATION")?;
            AttType::Notation(token_list(cur, symbols, Scanner::read_name)?)
        }
        other => return Err(format!("unknown attribute type \"{}\"", other)),
    })
}

/// `( a | b | c )`
fn token_list<'s>(
    cur: &mut Scanner<'s>,
    symbols: &mut dyn SymbolSource,
    read: fn(&mut Scanner<'s>) -> Option<&'s str>,
) -> DeclResult<Vec<Symbol>> {
    if !cur.eat(b"(") {
        return Err("'(' expected".to_string());
    }
    let mut tokens = Vec::new();
    loop {
        cur.skip_whitespace();
        let token = read(cur).ok_or_else(|| "name token expected in enumeration".to_string())?;
        tokens.push(symbols.intern(token));
        cur.skip_whitespace();
        if cur.eat(b")") {
            return Ok(tokens);
        }
        if !cur.eat(b"|") {
            return Err("'|' or ')' expected in enumeration".to_string());
        }
    }
}

/// Parsed `<!ENTITY>` before its literal is processed.
struct EntityParts<'s> {
    name: &'s str,
    parameter: bool,
    literal: Option<&'s str>,
    public_id: Option<String>,
    system_id: Option<String>,
    notation: Option<&'s str>,
}

fn entity_decl<'s>(cur: &mut Scanner<'s>) -> DeclResult<EntityParts<'s>> {
    require_space(cur, "<!ENTITY")?;
    let parameter = cur.eat(b"%");
    if parameter {
        require_space(cur, "'%'")?;
    }
    let entity = name(cur, "entity name")?;
    require_space(cur, "the entity name")?;

    if matches!(cur.peek(), Some(b'"' | b'\'')) {
        let value = literal(cur, "entity value")?;
        finish(cur)?;
        return Ok(EntityParts {
            name: entity,
            parameter,
            literal: Some(value),
            public_id: None,
            system_id: None,
            notation: None,
        });
    }

    let Some((public_id, system_id)) = external_id(cur, false)? else {
        return Err("entity value or external identifier expected".to_string());
    };
    let had_space = cur.skip_whitespace();
    let notation = if had_space && cur.eat(b"NDATA") {
        if parameter {
            return Err("parameter entities cannot be unparsed".to_string());
        }
        require_space(cur, "NDATA")?;
        Some(name(cur, "notation name")?)
    } else {
        None
    };
    finish(cur)?;
    Ok(EntityParts {
        name: entity,
        parameter,
        literal: None,
        public_id,
        system_id,
        notation,
    })
}

fn notation_decl(
    cur: &mut Scanner<'_>,
    symbols: &mut dyn SymbolSource,
) -> DeclResult<NotationDecl> {
    require_space(cur, "<!NOTATION")?;
    let notation = symbols.intern(name(cur, "notation name")?);
    require_space(cur, "the notation name")?;
    let Some((public_id, system_id)) = external_id(cur, true)? else {
        return Err("external or public identifier expected".to_string());
    };
    finish(cur)?;
    Ok(NotationDecl {
        name: notation,
        public_id,
        system_id,
    })
}
