//! Document Scanner
//!
//! Lexes markup and pushes events into the pipeline, one top-level item per
//! [`DocumentScanner::step`]:
//! - XML declaration and the prolog
//! - DOCTYPE with internal and external subsets (see `dtd_scanner`)
//! - Start/end tags with attribute value normalization
//! - Text, CDATA sections, comments, processing instructions
//! - General entity references, expanded inline as nested frames
//!
//! Well-formedness violations are reported as fatal errors and halt the scan.
//! [`ScannerSettings`] is the configurable half: it holds the scanner's
//! switches between parses and hands a snapshot to each new scanner.

use std::collections::HashMap;
use std::sync::Arc;

use memchr::{memchr_iter, memrchr};

use super::events::{Attribute, DocumentEvent, QName};
use super::{Pipeline, PipelineComponent, PipelineContext};
use crate::config::names;
use crate::config::registry::{FeatureRegistry, PropertyValue};
use crate::core::chars::{is_whitespace, XmlVersion};
use crate::core::entities::{builtin_entity, decode_char_ref};
use crate::core::scanner::Scanner;
use crate::error::{ConfigError, XmlError};
use crate::grammar::dtd::EntityDecl;
use crate::input::LoadedSource;
use crate::symbols::Symbol;

// ============================================================================
// Settings
// ============================================================================

/// Scanner switches, fixed for the duration of one parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerOptions {
    pub namespaces: bool,
    pub validation: bool,
    pub external_general_entities: bool,
    pub external_parameter_entities: bool,
    pub load_external_dtd: bool,
    pub notify_builtin_refs: bool,
    pub expansion_limit: u64,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        ScannerOptions {
            namespaces: true,
            validation: false,
            external_general_entities: true,
            external_parameter_entities: true,
            load_external_dtd: true,
            notify_builtin_refs: false,
            expansion_limit: names::DEFAULT_ENTITY_EXPANSION_LIMIT as u64,
        }
    }
}

/// Configuration component for the scanner.
///
/// The scanner is the event source rather than a stage, so this component
/// never joins the pipeline; it only owns the scanner's switches.
#[derive(Debug, Default)]
pub struct ScannerSettings {
    options: ScannerOptions,
}

impl ScannerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> ScannerOptions {
        self.options
    }
}

const SCANNER_FEATURES: &[&str] = &[
    names::NAMESPACES,
    names::VALIDATION,
    names::EXTERNAL_GENERAL_ENTITIES,
    names::EXTERNAL_PARAMETER_ENTITIES,
    names::LOAD_EXTERNAL_DTD,
    names::NOTIFY_BUILTIN_REFS,
];

const SCANNER_PROPERTIES: &[&str] = &[names::ENTITY_EXPANSION_LIMIT];

fn expansion_limit(value: Option<&PropertyValue>) -> Result<u64, ConfigError> {
    match value {
        None => Ok(names::DEFAULT_ENTITY_EXPANSION_LIMIT as u64),
        Some(PropertyValue::Int(n)) if *n >= 0 => Ok(*n as u64),
        Some(other) => Err(ConfigError::not_supported(
            names::ENTITY_EXPANSION_LIMIT,
            format!("expected a non-negative int, got {:?}", other),
        )),
    }
}

impl PipelineComponent for ScannerSettings {
    fn name(&self) -> &'static str {
        "scanner"
    }

    fn recognized_features(&self) -> &'static [&'static str] {
        SCANNER_FEATURES
    }

    fn recognized_properties(&self) -> &'static [&'static str] {
        SCANNER_PROPERTIES
    }

    fn feature_defaults(&self) -> Vec<(&'static str, bool)> {
        vec![
            (names::EXTERNAL_GENERAL_ENTITIES, true),
            (names::EXTERNAL_PARAMETER_ENTITIES, true),
            (names::LOAD_EXTERNAL_DTD, true),
            (names::NOTIFY_BUILTIN_REFS, false),
        ]
    }

    fn property_defaults(&self) -> Vec<(&'static str, PropertyValue)> {
        vec![(
            names::ENTITY_EXPANSION_LIMIT,
            PropertyValue::Int(names::DEFAULT_ENTITY_EXPANSION_LIMIT),
        )]
    }

    fn set_property(
        &mut self,
        name: &str,
        value: Option<&PropertyValue>,
    ) -> Result<(), ConfigError> {
        if name == names::ENTITY_EXPANSION_LIMIT {
            expansion_limit(value)?;
        }
        Ok(())
    }

    fn reset(&mut self, settings: &FeatureRegistry) -> Result<(), XmlError> {
        self.options = ScannerOptions {
            namespaces: settings.feature(names::NAMESPACES),
            validation: settings.feature(names::VALIDATION),
            external_general_entities: settings.feature(names::EXTERNAL_GENERAL_ENTITIES),
            external_parameter_entities: settings.feature(names::EXTERNAL_PARAMETER_ENTITIES),
            load_external_dtd: settings.feature(names::LOAD_EXTERNAL_DTD),
            notify_builtin_refs: settings.feature(names::NOTIFY_BUILTIN_REFS),
            expansion_limit: expansion_limit(settings.property(names::ENTITY_EXPANSION_LIMIT))?,
        };
        Ok(())
    }

    fn in_pipeline(&self) -> bool {
        false
    }
}

// ============================================================================
// Location tracking
// ============================================================================

/// Incremental line/column counter over one text.
#[derive(Debug, Clone, Copy)]
pub(super) struct LineTracker {
    line: u32,
    column: u32,
    scanned: usize,
}

impl LineTracker {
    pub(super) fn new() -> Self {
        LineTracker {
            line: 1,
            column: 1,
            scanned: 0,
        }
    }

    /// Line and column of `pos`. Positions are expected to move forward;
    /// moving back recounts from the start.
    pub(super) fn locate(&mut self, text: &str, pos: usize) -> (u32, u32) {
        let mut pos = pos.min(text.len());
        while !text.is_char_boundary(pos) {
            pos -= 1;
        }
        if pos < self.scanned {
            *self = LineTracker::new();
        }
        let slice = &text[self.scanned..pos];
        match memrchr(b'\n', slice.as_bytes()) {
            Some(last) => {
                self.line += memchr_iter(b'\n', slice.as_bytes()).count() as u32;
                self.column = slice[last + 1..].chars().count() as u32 + 1;
            }
            None => self.column += slice.chars().count() as u32,
        }
        self.scanned = pos;
        (self.line, self.column)
    }
}

// ============================================================================
// Scanner
// ============================================================================

/// One text being scanned: the document or an entity's replacement text.
pub(super) struct Frame {
    pub(super) text: Arc<str>,
    pub(super) pos: usize,
    /// General entity this frame expands.
    pub(super) entity: Option<Symbol>,
    pub(super) system_id: Option<Arc<str>>,
    pub(super) lines: LineTracker,
    /// Open elements when the frame was entered.
    pub(super) depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Start,
    Prolog,
    Content,
    Epilog,
    Finished,
}

/// Scans one document.
pub struct DocumentScanner {
    pub(super) options: ScannerOptions,
    pub(super) version: XmlVersion,
    pub(super) frames: Vec<Frame>,
    state: ScanState,
    elements: Vec<QName>,
    pub(super) entities: HashMap<Symbol, Arc<EntityDecl>>,
    pub(super) pe_entities: HashMap<Symbol, Arc<EntityDecl>>,
    pub(super) expansions: u64,
    pub(super) standalone: Option<bool>,
    pub(super) has_doctype: bool,
    /// Every declaration of the DTD has been read.
    pub(super) dtd_complete: bool,
    document_system_id: Option<Arc<str>>,
}

impl DocumentScanner {
    pub fn new(source: LoadedSource, options: ScannerOptions) -> Self {
        tracing::debug!(
            version = %source.version,
            encoding = source.encoding.name(),
            system_id = ?source.system_id,
            "starting document scan"
        );
        DocumentScanner {
            options,
            version: source.version,
            frames: vec![Frame {
                text: source.text,
                pos: 0,
                entity: None,
                system_id: source.system_id.clone(),
                lines: LineTracker::new(),
                depth: 0,
            }],
            state: ScanState::Start,
            elements: Vec::new(),
            entities: HashMap::new(),
            pe_entities: HashMap::new(),
            expansions: 0,
            standalone: None,
            has_doctype: false,
            dtd_complete: true,
            document_system_id: source.system_id,
        }
    }

    pub fn version(&self) -> XmlVersion {
        self.version
    }

    pub fn is_finished(&self) -> bool {
        self.state == ScanState::Finished
    }

    /// Scan one item. Returns `Ok(false)` once the document is complete.
    pub fn step(
        &mut self,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<bool, XmlError> {
        match self.state {
            ScanState::Finished => return Ok(false),
            ScanState::Start => {
                self.scan_xml_decl(pipeline, ctx)?;
                self.state = ScanState::Prolog;
                return Ok(true);
            }
            _ => {}
        }

        let (text, pos) = {
            let frame = self.top();
            (frame.text.clone(), frame.pos)
        };
        if pos >= text.len() {
            self.end_frame(pipeline, ctx)?;
            return Ok(self.state != ScanState::Finished);
        }

        self.locate(ctx, pos);
        let mut cur = Scanner::at(&text, pos);
        match self.state {
            ScanState::Content => self.scan_content(&mut cur, pipeline, ctx)?,
            _ => self.scan_misc(&mut cur, pipeline, ctx)?,
        }
        Ok(true)
    }

    pub(super) fn top(&self) -> &Frame {
        // The document frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    pub(super) fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub(super) fn set_pos(&mut self, pos: usize) {
        self.top_mut().pos = pos;
    }

    /// Point the context's location at `pos` in the current frame.
    pub(super) fn locate(&mut self, ctx: &mut PipelineContext, pos: usize) {
        let frame = self.top_mut();
        let (line, column) = frame.lines.locate(&frame.text, pos);
        ctx.location.system_id = frame.system_id.clone();
        ctx.location.line = line;
        ctx.location.column = column;
    }

    /// Report a fatal error at `pos` in the current frame.
    pub(super) fn fail(
        &mut self,
        ctx: &mut PipelineContext,
        pos: usize,
        message: impl Into<String>,
    ) -> XmlError {
        self.locate(ctx, pos);
        ctx.fatal(message)
    }

    /// First character not allowed to appear literally.
    pub(super) fn invalid_char(&self, s: &str) -> Option<char> {
        let ascii_fast = s
            .bytes()
            .all(|b| (0x20..0x7f).contains(&b) || matches!(b, b'\t' | b'\n' | b'\r'));
        if ascii_fast {
            return None;
        }
        s.chars().find(|&c| !self.version.is_literal_char(c))
    }

    pub(super) fn count_expansion(
        &mut self,
        ctx: &mut PipelineContext,
        pos: usize,
    ) -> Result<(), XmlError> {
        self.expansions += 1;
        if self.expansions > self.options.expansion_limit {
            return Err(self.fail(
                ctx,
                pos,
                format!(
                    "entity expansion limit of {} exceeded",
                    self.options.expansion_limit
                ),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Prolog
    // ------------------------------------------------------------------------

    fn scan_xml_decl(
        &mut self,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let text = self.top().text.clone();
        let mut cur = Scanner::new(&text);
        let mut encoding = None;

        self.locate(ctx, 0);
        if at_xml_declaration(&cur) {
            cur.advance(5);
            let decl = match pseudo_attributes(&mut cur) {
                Ok(decl) => decl,
                Err(message) => return Err(self.fail(ctx, cur.position(), message)),
            };
            let mut iter = decl.iter().peekable();

            match iter.next() {
                Some((name, value)) if name == "version" => {
                    if XmlVersion::from_declared(value).is_none() {
                        return Err(self.fail(
                            ctx,
                            0,
                            format!("XML version \"{}\" is not supported", value),
                        ));
                    }
                }
                _ => return Err(self.fail(
                    ctx,
                    0,
                    "the version is required in the XML declaration",
                )),
            }
            if let Some((name, value)) = iter.peek() {
                if name == "encoding" {
                    if !is_encoding_name(value) {
                        return Err(self.fail(
                            ctx,
                            0,
                            format!("invalid encoding name \"{}\"", value),
                        ));
                    }
                    encoding = Some(value.clone());
                    iter.next();
                }
            }
            if let Some((name, value)) = iter.peek() {
                if name == "standalone" {
                    self.standalone = match value.as_str() {
                        "yes" => Some(true),
                        "no" => Some(false),
                        _ => {
                            return Err(self.fail(ctx, 0, "standalone must be \"yes\" or \"no\""));
                        }
                    };
                    iter.next();
                }
            }
            if let Some((name, _)) = iter.next() {
                return Err(self.fail(
                    ctx,
                    0,
                    format!("unexpected \"{}\" in the XML declaration", name),
                ));
            }
            self.set_pos(cur.position());
        }

        pipeline.document(
            ctx,
            DocumentEvent::StartDocument {
                version: self.version,
                encoding,
                standalone: self.standalone,
                system_id: self.document_system_id.clone(),
            },
        )
    }

    /// Whitespace, comments, PIs, the DOCTYPE and the root start tag.
    fn scan_misc(
        &mut self,
        cur: &mut Scanner<'_>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        if cur.skip_whitespace() {
            self.set_pos(cur.position());
            return Ok(());
        }
        let start = cur.position();
        if cur.eat(b"<?") {
            self.scan_pi(cur, pipeline, ctx)
        } else if cur.eat(b"<!--") {
            self.scan_comment(cur, pipeline, ctx)
        } else if cur.starts_with(b"<!DOCTYPE") {
            if self.state != ScanState::Prolog || self.has_doctype {
                return Err(self.fail(
                    ctx,
                    start,
                    "DOCTYPE is only allowed once, before the root element",
                ));
            }
            cur.advance(9);
            self.has_doctype = true;
            self.scan_doctype(cur, pipeline, ctx)
        } else if cur.peek() == Some(b'<')
            && cur.peek_at(1).is_some_and(|b| b != b'!' && b != b'/')
        {
            if self.state == ScanState::Epilog {
                return Err(self.fail(ctx, start, "markup after the root element is not allowed"));
            }
            cur.advance(1);
            self.state = ScanState::Content;
            self.scan_start_tag(cur, pipeline, ctx)
        } else if self.state == ScanState::Epilog {
            Err(self.fail(ctx, start, "content is not allowed after the root element"))
        } else {
            Err(self.fail(ctx, start, "content is not allowed in the prolog"))
        }
    }

    // ------------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------------

    fn scan_content(
        &mut self,
        cur: &mut Scanner<'_>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let start = cur.position();
        match cur.peek() {
            Some(b'<') => {
                if cur.eat(b"</") {
                    self.scan_end_tag(cur, pipeline, ctx)
                } else if cur.eat(b"<!--") {
                    self.scan_comment(cur, pipeline, ctx)
                } else if cur.eat(b"<![CDATA[") {
                    self.scan_cdata(cur, pipeline, ctx)
                } else if cur.eat(b"<?") {
                    self.scan_pi(cur, pipeline, ctx)
                } else if cur.starts_with(b"<!") {
                    Err(self.fail(ctx, start, "markup declarations are not allowed in content"))
                } else {
                    cur.advance(1);
                    self.scan_start_tag(cur, pipeline, ctx)
                }
            }
            Some(b'&') => {
                cur.advance(1);
                self.scan_reference(cur, pipeline, ctx)
            }
            _ => {
                let end = cur.find_text_boundary().unwrap_or(cur.remaining().len() + start);
                let text = cur.slice(start, end);
                if let Some(at) = text.find("]]>") {
                    return Err(self.fail(ctx, start + at, "\"]]>\" is not allowed in content"));
                }
                if let Some(c) = self.invalid_char(text) {
                    return Err(self.fail(
                        ctx,
                        start,
                        format!("invalid character U+{:04X} in content", c as u32),
                    ));
                }
                self.set_pos(end);
                pipeline.document(ctx, DocumentEvent::Characters(text.to_string()))
            }
        }
    }

    fn qname(&self, ctx: &mut PipelineContext, raw: &str) -> QName {
        let raw_sym = ctx.symbols.intern(raw);
        if self.options.namespaces {
            if let Some(colon) = raw.find(':') {
                let (prefix, local) = (&raw[..colon], &raw[colon + 1..]);
                if !prefix.is_empty() && !local.is_empty() {
                    let prefix = ctx.symbols.intern(prefix);
                    let local = ctx.symbols.intern(local);
                    return QName::new(Some(prefix), local, raw_sym);
                }
            }
        }
        QName::simple(raw_sym)
    }

    fn scan_start_tag(
        &mut self,
        cur: &mut Scanner<'_>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let Some(raw) = cur.read_name() else {
            return Err(self.fail(ctx, cur.position(), "element name expected after '<'"));
        };
        let name = self.qname(ctx, raw);
        let mut attributes: Vec<Attribute> = Vec::new();

        let empty = loop {
            let had_space = cur.skip_whitespace();
            if cur.eat(b"/>") {
                break true;
            }
            if cur.eat(b">") {
                break false;
            }
            if cur.is_eof() {
                return Err(self.fail(
                    ctx,
                    cur.position(),
                    format!("start tag of \"{}\" is not terminated", raw),
                ));
            }
            if !had_space {
                return Err(self.fail(
                    ctx,
                    cur.position(),
                    format!("whitespace expected in start tag of \"{}\"", raw),
                ));
            }
            let attr_pos = cur.position();
            let Some(attr_raw) = cur.read_name() else {
                return Err(self.fail(
                    ctx,
                    attr_pos,
                    format!("attribute name expected in start tag of \"{}\"", raw),
                ));
            };
            cur.skip_whitespace();
            if !cur.eat(b"=") {
                return Err(self.fail(
                    ctx,
                    cur.position(),
                    format!("'=' expected after attribute \"{}\"", attr_raw),
                ));
            }
            cur.skip_whitespace();
            let Some(raw_value) = cur.read_quoted() else {
                return Err(self.fail(
                    ctx,
                    cur.position(),
                    format!("quoted value expected for attribute \"{}\"", attr_raw),
                ));
            };
            if attributes.iter().any(|a| &*a.name.raw == attr_raw) {
                return Err(self.fail(
                    ctx,
                    attr_pos,
                    format!("attribute \"{}\" specified twice on \"{}\"", attr_raw, raw),
                ));
            }
            let value = self.normalize_attribute_value(raw_value, attr_pos, ctx)?;
            let attr_name = self.qname(ctx, attr_raw);
            attributes.push(Attribute::new(attr_name, value));
        };

        self.set_pos(cur.position());
        pipeline.document(
            ctx,
            DocumentEvent::StartElement {
                name: name.clone(),
                attributes,
            },
        )?;
        if empty {
            pipeline.document(ctx, DocumentEvent::EndElement { name })?;
            if self.elements.is_empty() {
                self.state = ScanState::Epilog;
            }
        } else {
            self.elements.push(name);
        }
        Ok(())
    }

    fn scan_end_tag(
        &mut self,
        cur: &mut Scanner<'_>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let start = cur.position();
        let Some(raw) = cur.read_name() else {
            return Err(self.fail(ctx, start, "element name expected in end tag"));
        };
        cur.skip_whitespace();
        if !cur.eat(b">") {
            return Err(self.fail(
                ctx,
                cur.position(),
                format!("end tag \"{}\" is not terminated", raw),
            ));
        }
        if self.elements.len() <= self.top().depth {
            return Err(self.fail(
                ctx,
                start,
                format!("end tag \"{}\" closes an element opened outside this entity", raw),
            ));
        }
        let Some(open) = self.elements.pop() else {
            return Err(self.fail(ctx, start, format!("unexpected end tag \"{}\"", raw)));
        };
        if &*open.raw != raw {
            return Err(self.fail(
                ctx,
                start,
                format!("end tag \"{}\" does not match start tag \"{}\"", raw, open.raw),
            ));
        }
        self.set_pos(cur.position());
        pipeline.document(ctx, DocumentEvent::EndElement { name: open })?;
        if self.elements.is_empty() {
            self.state = ScanState::Epilog;
        }
        Ok(())
    }

    fn scan_comment(
        &mut self,
        cur: &mut Scanner<'_>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let start = cur.position();
        let Some(body) = cur.read_until(b"-->") else {
            return Err(self.fail(ctx, start, "comment is not terminated"));
        };
        if body.contains("--") || body.ends_with('-') {
            return Err(self.fail(ctx, start, "\"--\" is not allowed inside a comment"));
        }
        if let Some(c) = self.invalid_char(body) {
            return Err(self.fail(
                ctx,
                start,
                format!("invalid character U+{:04X} in comment", c as u32),
            ));
        }
        self.set_pos(cur.position());
        pipeline.document(ctx, DocumentEvent::Comment(body.to_string()))
    }

    /// Target and data of a PI whose `<?` has been consumed.
    pub(super) fn read_pi(
        &mut self,
        cur: &mut Scanner<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(Symbol, String), XmlError> {
        let start = cur.position();
        let Some(target) = cur.read_name() else {
            return Err(self.fail(ctx, start, "processing instruction target expected"));
        };
        if target.eq_ignore_ascii_case("xml") {
            return Err(self.fail(
                ctx,
                start,
                "the XML declaration is only allowed at the start of an entity",
            ));
        }
        let data = if cur.eat(b"?>") {
            ""
        } else {
            if !cur.skip_whitespace() {
                return Err(self.fail(
                    ctx,
                    cur.position(),
                    "whitespace expected after processing instruction target",
                ));
            }
            match cur.read_until(b"?>") {
                Some(d) => d,
                None => return Err(self.fail(
                    ctx,
                    start,
                    "processing instruction is not terminated",
                )),
            }
        };
        if let Some(c) = self.invalid_char(data) {
            return Err(self.fail(
                ctx,
                start,
                format!("invalid character U+{:04X} in processing instruction", c as u32),
            ));
        }
        Ok((ctx.symbols.intern(target), data.to_string()))
    }

    fn scan_pi(
        &mut self,
        cur: &mut Scanner<'_>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let (target, data) = self.read_pi(cur, ctx)?;
        self.set_pos(cur.position());
        pipeline.document(ctx, DocumentEvent::ProcessingInstruction { target, data })
    }

    fn scan_cdata(
        &mut self,
        cur: &mut Scanner<'_>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let start = cur.position();
        let Some(body) = cur.read_until(b"]]>") else {
            return Err(self.fail(ctx, start, "CDATA section is not terminated"));
        };
        if let Some(c) = self.invalid_char(body) {
            return Err(self.fail(
                ctx,
                start,
                format!("invalid character U+{:04X} in CDATA section", c as u32),
            ));
        }
        self.set_pos(cur.position());
        pipeline.document(ctx, DocumentEvent::StartCData)?;
        if !body.is_empty() {
            pipeline.document(ctx, DocumentEvent::Characters(body.to_string()))?;
        }
        pipeline.document(ctx, DocumentEvent::EndCData)
    }

    // ------------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------------

    /// Read `name;` or `#ref;` after an `&`, returning the body. Errors are
    /// reported at `at` in the current frame.
    pub(super) fn read_reference<'t>(
        &mut self,
        cur: &mut Scanner<'t>,
        at: usize,
        ctx: &mut PipelineContext,
    ) -> Result<&'t str, XmlError> {
        let body = if cur.eat(b"#") {
            let digits_start = cur.position();
            while cur.peek().is_some_and(|b| b.is_ascii_alphanumeric()) {
                cur.advance(1);
            }
            cur.slice(digits_start - 1, cur.position())
        } else {
            match cur.read_name() {
                Some(n) => n,
                None => return Err(self.fail(ctx, at, "entity name expected after '&'")),
            }
        };
        if !cur.eat(b";") {
            return Err(self.fail(ctx, at, format!("reference \"&{}\" must end with ';'", body)));
        }
        Ok(body)
    }

    pub(super) fn char_reference(
        &mut self,
        body: &str,
        ctx: &mut PipelineContext,
        pos: usize,
    ) -> Result<char, XmlError> {
        match decode_char_ref(body) {
            Some(c) if self.version.is_referenceable_char(c) => Ok(c),
            _ => Err(self.fail(
                ctx,
                pos,
                format!("character reference \"&#{};\" is not a legal XML character", body),
            )),
        }
    }

    /// An undeclared entity is fatal unless declarations may have been skipped.
    fn undeclared_entity(
        &mut self,
        name: &str,
        ctx: &mut PipelineContext,
        pos: usize,
    ) -> Result<(), XmlError> {
        let message = format!("entity \"{}\" was referenced but not declared", name);
        if !self.has_doctype || self.standalone == Some(true) || self.dtd_complete {
            Err(self.fail(ctx, pos, message))
        } else if self.options.validation {
            self.locate(ctx, pos);
            ctx.error(message)
        } else {
            Ok(())
        }
    }

    fn scan_reference(
        &mut self,
        cur: &mut Scanner<'_>,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let start = cur.position() - 1;
        let body = self.read_reference(cur, start, ctx)?;
        self.set_pos(cur.position());

        if let Some(digits) = body.strip_prefix('#') {
            let c = self.char_reference(digits, ctx, start)?;
            return pipeline.document(ctx, DocumentEvent::Characters(c.to_string()));
        }

        if let Some(c) = builtin_entity(body) {
            if self.options.notify_builtin_refs {
                let name = ctx.symbols.intern(body);
                pipeline.document(
                    ctx,
                    DocumentEvent::StartEntity {
                        name: name.clone(),
                        public_id: None,
                        system_id: None,
                        builtin: true,
                    },
                )?;
                pipeline.document(ctx, DocumentEvent::Characters(c.to_string()))?;
                return pipeline.document(ctx, DocumentEvent::EndEntity { name });
            }
            return pipeline.document(ctx, DocumentEvent::Characters(c.to_string()));
        }

        let Some(decl) = self.entities.get(body).cloned() else {
            return self.undeclared_entity(body, ctx, start);
        };
        if decl.is_unparsed() {
            return Err(self.fail(ctx, start, format!("reference to unparsed entity \"{}\"", body)));
        }
        if self.frames.iter().any(|f| f.entity.as_ref() == Some(&decl.name)) {
            return Err(self.fail(
                ctx,
                start,
                format!("recursive reference to entity \"{}\"", body),
            ));
        }

        let start_event = DocumentEvent::StartEntity {
            name: decl.name.clone(),
            public_id: decl.public_id.clone(),
            system_id: decl.system_id.clone(),
            builtin: false,
        };

        if decl.is_external() && !self.options.external_general_entities {
            tracing::trace!(entity = %decl.name, "skipping external entity");
            pipeline.document(ctx, start_event)?;
            return pipeline.document(ctx, DocumentEvent::EndEntity { name: decl.name.clone() });
        }

        self.count_expansion(ctx, start)?;
        let (text, system_id) = match &decl.value {
            Some(value) => (Arc::from(value.as_str()), self.top().system_id.clone()),
            None => {
                let loaded = ctx.resolution.open(
                    decl.public_id.as_deref(),
                    decl.system_id.as_deref(),
                    decl.base_system_id.as_deref(),
                )?;
                (loaded.text, loaded.system_id)
            }
        };

        pipeline.document(ctx, start_event)?;
        tracing::trace!(entity = %decl.name, "expanding entity");
        let depth = self.elements.len();
        self.frames.push(Frame {
            text,
            pos: 0,
            entity: Some(decl.name.clone()),
            system_id,
            lines: LineTracker::new(),
            depth,
        });
        if decl.is_external() {
            self.skip_text_declaration(ctx)?;
        }
        Ok(())
    }

    /// Step over the text declaration at the start of the current frame.
    pub(super) fn skip_text_declaration(
        &mut self,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        let text = self.top().text.clone();
        match text_declaration_len(&text) {
            Ok(len) => {
                self.set_pos(len);
                Ok(())
            }
            Err(message) => Err(self.fail(ctx, 0, message)),
        }
    }

    fn end_frame(
        &mut self,
        pipeline: &mut Pipeline<'_>,
        ctx: &mut PipelineContext,
    ) -> Result<(), XmlError> {
        if self.frames.len() == 1 {
            let end = self.top().text.len();
            return match self.state {
                ScanState::Prolog => Err(self.fail(ctx, end, "the root element is missing")),
                ScanState::Content => {
                    let open = self.elements.last().map(|q| q.raw.to_string()).unwrap_or_default();
                    Err(self.fail(ctx, end, format!("element \"{}\" is not closed", open)))
                }
                _ => {
                    self.locate(ctx, end);
                    self.state = ScanState::Finished;
                    pipeline.document(ctx, DocumentEvent::EndDocument)
                }
            };
        }

        let end = self.top().text.len();
        if self.elements.len() != self.top().depth {
            return Err(self.fail(ctx, end, "entity replacement text is not well-balanced"));
        }
        let frame = self.frames.pop();
        match frame.and_then(|f| f.entity) {
            Some(name) => pipeline.document(ctx, DocumentEvent::EndEntity { name }),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Attribute values
    // ------------------------------------------------------------------------

    /// Expand references and map whitespace characters to spaces.
    pub(super) fn normalize_attribute_value(
        &mut self,
        raw: &str,
        pos: usize,
        ctx: &mut PipelineContext,
    ) -> Result<String, XmlError> {
        let mut out = String::with_capacity(raw.len());
        let mut open = Vec::new();
        self.normalize_into(raw, pos, ctx, &mut open, &mut out)?;
        Ok(out)
    }

    fn normalize_into(
        &mut self,
        raw: &str,
        pos: usize,
        ctx: &mut PipelineContext,
        open: &mut Vec<Symbol>,
        out: &mut String,
    ) -> Result<(), XmlError> {
        if let Some(c) = self.invalid_char(raw) {
            return Err(self.fail(
                ctx,
                pos,
                format!("invalid character U+{:04X} in attribute value", c as u32),
            ));
        }
        let mut cur = Scanner::new(raw);
        while let Some(c) = cur.next_char() {
            match c {
                '<' => return Err(self.fail(ctx, pos, "'<' is not allowed in attribute values")),
                '&' => {
                    let body = self.read_reference(&mut cur, pos, ctx)?;
                    if let Some(digits) = body.strip_prefix('#') {
                        out.push(self.char_reference(digits, ctx, pos)?);
                    } else if let Some(b) = builtin_entity(body) {
                        out.push(b);
                    } else {
                        self.expand_in_attribute(body, pos, ctx, open, out)?;
                    }
                }
                c if is_whitespace(c) => out.push(' '),
                c => out.push(c),
            }
        }
        Ok(())
    }

    fn expand_in_attribute(
        &mut self,
        name: &str,
        pos: usize,
        ctx: &mut PipelineContext,
        open: &mut Vec<Symbol>,
        out: &mut String,
    ) -> Result<(), XmlError> {
        let Some(decl) = self.entities.get(name).cloned() else {
            return self.undeclared_entity(name, ctx, pos);
        };
        let Some(value) = decl.value.as_deref() else {
            return Err(self.fail(
                ctx,
                pos,
                format!("external entity \"{}\" referenced in an attribute value", name),
            ));
        };
        if open.contains(&decl.name) {
            return Err(self.fail(ctx, pos, format!("recursive reference to entity \"{}\"", name)));
        }
        self.count_expansion(ctx, pos)?;
        open.push(decl.name.clone());
        self.normalize_into(value, pos, ctx, open, out)?;
        open.pop();
        Ok(())
    }
}

/// Read `name="value"` pairs up to `?>`.
fn pseudo_attributes(cur: &mut Scanner<'_>) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    loop {
        let had_space = cur.skip_whitespace();
        if cur.eat(b"?>") {
            return Ok(pairs);
        }
        if !had_space {
            return Err("whitespace expected in the XML declaration".to_string());
        }
        let Some(name) = cur.read_name() else {
            return Err("malformed XML declaration".to_string());
        };
        cur.skip_whitespace();
        if !cur.eat(b"=") {
            return Err(format!("'=' expected after \"{}\"", name));
        }
        cur.skip_whitespace();
        let Some(value) = cur.read_quoted() else {
            return Err(format!("quoted value expected for \"{}\"", name));
        };
        pairs.push((name.to_string(), value.to_string()));
    }
}

/// `<?xml` followed by whitespace, as opposed to a PI named `xml...`.
fn at_xml_declaration(cur: &Scanner<'_>) -> bool {
    cur.starts_with(b"<?xml") && matches!(cur.peek_at(5), Some(b' ' | b'\t' | b'\n' | b'\r'))
}

/// Length of the text declaration opening an external entity, or 0.
pub(super) fn text_declaration_len(text: &str) -> Result<usize, String> {
    let mut cur = Scanner::new(text);
    if !at_xml_declaration(&cur) {
        return Ok(0);
    }
    cur.advance(5);
    let pairs = pseudo_attributes(&mut cur)?;
    let names: Vec<&str> = pairs.iter().map(|(n, _)| n.as_str()).collect();
    match names.as_slice() {
        ["version", "encoding"] | ["encoding"] => Ok(cur.position()),
        _ => Err("malformed text declaration in external entity".to_string()),
    }
}

/// EncName production.
fn is_encoding_name(s: &str) -> bool {
    let mut bytes = s.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}
