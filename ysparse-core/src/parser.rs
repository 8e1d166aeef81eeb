//! Grammar engine: YAML text to structural events.
//!
//! A hand-written recursive-descent scanner over the source bytes. Events
//! are handed to a sink closure as soon as they are recognised; scalars
//! that need filtering are rewritten in place (see [`crate::scalar`]) so
//! every payload is an `(offset, len)` reference into the source buffer.
//!
//! # Supported subset
//!
//! - streams of implicit and explicit (`---` / `...`) documents
//! - block mappings with implicit keys, block sequences (compact forms too)
//! - flow sequences and mappings, including single-pair `[a: b]` entries
//! - plain, single-quoted, double-quoted, literal and folded scalars
//! - anchors, aliases, local / secondary / verbatim tags, comments
//!
//! Directives, explicit `?` keys, container keys and named tag handles are
//! rejected with a [`ParseError`].
//!
//! Line and column of errors come from a [`LineIndex`] built before any
//! byte is rewritten.

use crate::config::ParseOptions;
use crate::error::ParseError;
use crate::event::{Event, Layout, Role, ScalarStyle};
use crate::scalar::{self, BlockLine, Chomp};
use crate::span::{LineIndex, Span};

type PResult<T> = Result<T, ParseError>;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Where a block node appears; decides which inline forms are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Document,
    MapValue,
    SeqEntry,
}

/// What the content at the cursor turns out to be on this line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyShape {
    Key,
    ContainerKey,
    NotKey,
}

/// Pending node properties.
#[derive(Debug, Clone, Copy, Default)]
struct Props {
    tag: Option<Span>,
    anchor: Option<Span>,
}

impl Props {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.anchor.is_none()
    }
}

#[inline]
fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

#[inline]
fn is_flow_indicator(b: u8) -> bool {
    matches!(b, b',' | b'[' | b']' | b'{' | b'}')
}

/// Streaming YAML parser writing events to a sink.
pub struct Parser<'a, F>
where
    F: FnMut(Event),
{
    src: &'a mut [u8],
    scratch: &'a mut Vec<u8>,
    options: &'a ParseOptions,
    lines: LineIndex,
    pos: usize,
    bom: usize,
    depth: usize,
    emit: F,
}

impl<'a, F> Parser<'a, F>
where
    F: FnMut(Event),
{
    pub fn new(
        src: &'a mut [u8],
        options: &'a ParseOptions,
        scratch: &'a mut Vec<u8>,
        emit: F,
    ) -> Self {
        let lines = LineIndex::new(src);
        Self { src, scratch, options, lines, pos: 0, bom: 0, depth: 0, emit }
    }

    /// Parse the whole stream.
    ///
    /// On error some events may already have been emitted; callers must
    /// discard them.
    pub fn parse(mut self) -> PResult<()> {
        self.stream()
    }

    // ========================================================================
    // Cursor helpers
    // ========================================================================

    #[inline]
    fn byte(&self, at: usize) -> Option<u8> {
        self.src.get(at).copied()
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.byte(self.pos)
    }

    #[inline]
    fn eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    #[inline]
    fn break_len(&self, at: usize) -> usize {
        scalar::break_len(self.src, at)
    }

    /// Whitespace, line break or end of input at `at`.
    #[inline]
    fn ws_or_end(&self, at: usize) -> bool {
        match self.byte(at) {
            None => true,
            Some(b) => is_blank(b) || self.break_len(at) > 0,
        }
    }

    #[inline]
    fn push(&mut self, event: Event) {
        (self.emit)(event)
    }

    fn error(&self, at: usize, message: &str) -> ParseError {
        ParseError::new(self.lines.locate(at.min(self.src.len())), message)
            .with_filename(self.options.filename.as_deref())
    }

    fn line_start(&self, at: usize) -> usize {
        match self.lines.line_start(at) {
            0 => self.bom,
            start => start,
        }
    }

    fn at_line_start(&self) -> bool {
        self.line_start(self.pos) == self.pos
    }

    fn column(&self) -> usize {
        self.pos - self.line_start(self.pos)
    }

    fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(b) if is_blank(b)) {
            self.pos += 1;
        }
    }

    /// Skip a comment up to (not including) its line break.
    fn skip_comment(&mut self) {
        while !self.eof() && self.break_len(self.pos) == 0 {
            self.pos += 1;
        }
    }

    /// Nothing but an optional comment remains on this line.
    fn at_line_end(&self) -> bool {
        match self.peek() {
            None | Some(b'#') => true,
            _ => self.break_len(self.pos) > 0,
        }
    }

    fn is_document_marker_at(&self, at: usize) -> bool {
        let marker = match self.src.get(at..at + 3) {
            Some(m) => m,
            None => return false,
        };
        (marker == b"---" || marker == b"...") && self.line_start(at) == at && self.ws_or_end(at + 3)
    }

    fn at_document_marker(&self) -> bool {
        self.is_document_marker_at(self.pos)
    }

    fn at_marker(&self, marker: &[u8; 3]) -> bool {
        self.at_document_marker() && self.src[self.pos..].starts_with(marker)
    }

    fn is_block_entry_at(&self, at: usize) -> bool {
        self.byte(at) == Some(b'-') && self.ws_or_end(at + 1)
    }

    /// `:` acting as a mapping value indicator.
    fn is_value_indicator(&self, at: usize, flow: bool) -> bool {
        self.byte(at) == Some(b':')
            && (self.ws_or_end(at + 1)
                || (flow && self.byte(at + 1).map_or(false, is_flow_indicator)))
    }

    fn enter(&mut self, at: usize) -> PResult<()> {
        self.depth += 1;
        if self.depth > self.options.effective_max_depth() {
            return Err(self.error(at, "maximum nesting depth exceeded"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Finish the current line: blanks, an optional comment, the break.
    fn finish_line(&mut self) -> PResult<()> {
        self.skip_blanks();
        if self.peek() == Some(b'#') {
            self.skip_comment();
        }
        if self.eof() {
            return Ok(());
        }
        match self.break_len(self.pos) {
            0 => Err(self.error(self.pos, "unexpected content after value")),
            n => {
                self.pos += n;
                Ok(())
            }
        }
    }

    /// Move to the start of the next line holding content.
    ///
    /// Leaves the cursor at the line start so indentation can be measured.
    fn skip_to_content_line(&mut self) -> PResult<()> {
        if !self.at_line_start() {
            self.finish_line()?;
        }
        loop {
            let start = self.pos;
            self.skip_blanks();
            match self.peek() {
                None => return Ok(()),
                Some(b'#') => {
                    self.skip_comment();
                    if self.eof() {
                        return Ok(());
                    }
                    self.pos += self.break_len(self.pos);
                }
                _ if self.break_len(self.pos) > 0 => self.pos += self.break_len(self.pos),
                _ => {
                    self.pos = start;
                    return Ok(());
                }
            }
        }
    }

    /// Indentation of the content line starting at the cursor.
    fn indentation(&self) -> PResult<usize> {
        let mut i = self.pos;
        while self.byte(i) == Some(b' ') {
            i += 1;
        }
        if self.byte(i) == Some(b'\t') {
            let mut j = i;
            while matches!(self.byte(j), Some(b) if is_blank(b)) {
                j += 1;
            }
            if !matches!(self.byte(j), None | Some(b'#')) && self.break_len(j) == 0 {
                return Err(self.error(i, "tabs are not allowed in indentation"));
            }
        }
        Ok(i - self.pos)
    }

    /// After inline content: only blanks and a comment may follow.
    fn expect_line_end(&mut self) -> PResult<()> {
        self.skip_blanks();
        if self.at_line_end() {
            return Ok(());
        }
        if self.is_value_indicator(self.pos, false) {
            return Err(self.error(self.pos, "mapping values are not allowed here"));
        }
        Err(self.error(self.pos, "unexpected content after value"))
    }

    // ========================================================================
    // Read-only lookahead
    // ========================================================================

    /// End of a tag, anchor or alias name starting at `from`.
    fn scan_name(&self, from: usize) -> usize {
        let mut i = from;
        while let Some(b) = self.byte(i) {
            if is_blank(b) || is_flow_indicator(b) || self.break_len(i) > 0 {
                break;
            }
            if b == b':' && self.ws_or_end(i + 1) {
                break;
            }
            i += 1;
        }
        i
    }

    /// End of the property starting at `at` (`!` or `&`).
    fn scan_property(&self, at: usize) -> usize {
        if self.byte(at) == Some(b'!') && self.byte(at + 1) == Some(b'<') {
            let mut i = at + 2;
            while let Some(b) = self.byte(i) {
                if b == b'>' {
                    return i + 1;
                }
                if is_blank(b) || self.break_len(i) > 0 {
                    break;
                }
                i += 1;
            }
            return i;
        }
        self.scan_name(at + 1)
    }

    /// Scan one line of plain text from `from`.
    ///
    /// Returns `(content_end, stop)`: the end of the text with trailing
    /// blanks trimmed, and where scanning stopped.
    fn scan_plain_line(&self, from: usize, flow: bool) -> (usize, usize) {
        let mut i = from;
        let mut end = from;
        while let Some(b) = self.byte(i) {
            if self.break_len(i) > 0 || self.is_value_indicator(i, flow) {
                break;
            }
            if flow && is_flow_indicator(b) {
                break;
            }
            if b == b'#' && i > from && is_blank(self.src[i - 1]) {
                break;
            }
            if !is_blank(b) {
                end = i + 1;
            }
            i += 1;
        }
        (end, i)
    }

    /// End (after the closing quote) of a quoted scalar closed on this line.
    fn scan_quoted_line(&self, at: usize, quote: u8) -> Option<usize> {
        let mut i = at + 1;
        loop {
            let b = self.byte(i)?;
            if self.break_len(i) > 0 {
                return None;
            }
            if b == b'\\' && quote == b'"' {
                i += 2;
            } else if b == quote {
                if quote == b'\'' && self.byte(i + 1) == Some(b'\'') {
                    i += 2;
                } else {
                    return Some(i + 1);
                }
            } else {
                i += 1;
            }
        }
    }

    /// End (after the closing bracket) of a flow collection closed on this line.
    fn scan_brackets_line(&self, at: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = at;
        loop {
            let b = self.byte(i)?;
            if self.break_len(i) > 0 {
                return None;
            }
            match b {
                b'[' | b'{' => depth += 1,
                b']' | b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                b'"' | b'\'' => {
                    i = self.scan_quoted_line(i, b)?;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
    }

    /// Decide, without consuming, whether the cursor starts an implicit key.
    fn lookahead_key(&self, flow: bool) -> KeyShape {
        let mut i = self.pos;
        while matches!(self.byte(i), Some(b'!' | b'&')) {
            i = self.scan_property(i);
            while matches!(self.byte(i), Some(b) if is_blank(b)) {
                i += 1;
            }
        }
        let after = match self.byte(i) {
            None | Some(b'#') => return KeyShape::NotKey,
            _ if self.break_len(i) > 0 => return KeyShape::NotKey,
            Some(b':') if self.is_value_indicator(i, flow) => return KeyShape::Key,
            Some(b'-' | b'?') if self.ws_or_end(i + 1) => return KeyShape::NotKey,
            Some(b'|' | b'>') if !flow => return KeyShape::NotKey,
            Some(quote @ (b'"' | b'\'')) => match self.scan_quoted_line(i, quote) {
                Some(end) => {
                    if flow && self.byte(end) == Some(b':') {
                        return KeyShape::Key;
                    }
                    end
                }
                None => return KeyShape::NotKey,
            },
            Some(b'[' | b'{') => {
                return match self.scan_brackets_line(i) {
                    Some(end) => {
                        let mut j = end;
                        while matches!(self.byte(j), Some(b) if is_blank(b)) {
                            j += 1;
                        }
                        if self.is_value_indicator(j, flow) {
                            KeyShape::ContainerKey
                        } else {
                            KeyShape::NotKey
                        }
                    }
                    None => KeyShape::NotKey,
                };
            }
            Some(b'*') => self.scan_name(i + 1),
            _ => self.scan_plain_line(i, flow).1,
        };
        let mut j = after;
        while matches!(self.byte(j), Some(b) if is_blank(b)) {
            j += 1;
        }
        if self.is_value_indicator(j, flow) {
            KeyShape::Key
        } else {
            KeyShape::NotKey
        }
    }

    // ========================================================================
    // Stream and documents
    // ========================================================================

    fn stream(&mut self) -> PResult<()> {
        self.push(Event::begin_stream());
        if self.src.starts_with(BOM) {
            self.bom = BOM.len();
            self.pos = BOM.len();
        }
        loop {
            self.skip_to_content_line()?;
            if self.eof() {
                break;
            }
            if self.peek() == Some(b'%') {
                return Err(self.error(self.pos, "directives are not supported"));
            }
            if self.at_marker(b"...") {
                self.pos += 3;
                self.finish_line()?;
                continue;
            }
            let explicit = self.at_marker(b"---");
            self.push(Event::begin_document(explicit));
            if explicit {
                self.pos += 3;
                self.block_node(-1, Role::Value, Context::Document)?;
            } else {
                self.block_node_on_new_line(-1, Role::Value, Context::Document, Props::default())?;
            }
            self.skip_to_content_line()?;
            if self.at_marker(b"...") {
                self.pos += 3;
                self.finish_line()?;
                self.push(Event::end_document(true));
            } else if self.eof() || self.at_marker(b"---") {
                self.push(Event::end_document(false));
            } else {
                let at = self.pos + self.indentation()?;
                return Err(self.error(at, "expected the end of the document"));
            }
        }
        self.push(Event::end_stream());
        Ok(())
    }

    // ========================================================================
    // Block structure
    // ========================================================================

    fn emit_props(&mut self, props: Props, role: Role) {
        if let Some(tag) = props.tag {
            self.push(Event::tag(role, tag));
        }
        if let Some(anchor) = props.anchor {
            self.push(Event::anchor(role, anchor));
        }
    }

    fn emit_empty(&mut self, role: Role, props: Props) {
        self.emit_props(props, role);
        self.push(Event::scalar(role, ScalarStyle::Plain, Span::empty()));
    }

    /// A node whose indicator (`key:`, `-`, `---`) was just consumed.
    fn block_node(&mut self, parent: isize, role: Role, ctx: Context) -> PResult<()> {
        self.skip_blanks();
        if self.at_line_end() {
            self.skip_to_content_line()?;
            return self.block_node_on_new_line(parent, role, ctx, Props::default());
        }
        match self.lookahead_key(false) {
            KeyShape::Key if ctx == Context::SeqEntry => {
                let column = self.column();
                return self.block_mapping(column, role, Props::default());
            }
            KeyShape::Key => {
                return Err(self.error(self.pos, "mapping values are not allowed here"));
            }
            KeyShape::ContainerKey => {
                return Err(self.error(self.pos, "container keys are not supported"));
            }
            KeyShape::NotKey => {}
        }
        let mut props = Props::default();
        self.read_props(&mut props)?;
        if self.at_line_end() {
            self.skip_to_content_line()?;
            return self.block_node_on_new_line(parent, role, ctx, props);
        }
        if ctx == Context::SeqEntry && self.is_block_entry_at(self.pos) {
            if !props.is_empty() {
                return Err(self.error(self.pos, "properties cannot precede a block sequence entry"));
            }
            let column = self.column();
            return self.block_sequence(column, role, props);
        }
        self.inline_content(parent, role, props)
    }

    /// A node whose content starts on a later line (cursor at a line start).
    fn block_node_on_new_line(
        &mut self,
        parent: isize,
        role: Role,
        ctx: Context,
        mut props: Props,
    ) -> PResult<()> {
        loop {
            if self.eof() || self.at_document_marker() {
                self.emit_empty(role, props);
                return Ok(());
            }
            let indent = self.indentation()?;
            let at = self.pos + indent;
            let same_level_sequence =
                ctx == Context::MapValue && indent as isize == parent && self.is_block_entry_at(at);
            if indent as isize <= parent && !same_level_sequence {
                self.emit_empty(role, props);
                return Ok(());
            }
            self.pos = at;
            if self.is_block_entry_at(at) {
                return self.block_sequence(indent, role, props);
            }
            match self.lookahead_key(false) {
                KeyShape::Key => return self.block_mapping(indent, role, props),
                KeyShape::ContainerKey => {
                    return Err(self.error(self.pos, "container keys are not supported"));
                }
                KeyShape::NotKey => {}
            }
            self.read_props(&mut props)?;
            if self.at_line_end() {
                self.skip_to_content_line()?;
                continue;
            }
            return self.inline_content(parent, role, props);
        }
    }

    /// Scalars, aliases and flow collections on the current line.
    fn inline_content(&mut self, parent: isize, role: Role, props: Props) -> PResult<()> {
        let at = self.pos;
        match self.peek() {
            Some(b'*') => {
                if !props.is_empty() {
                    return Err(self.error(at, "an alias cannot have properties"));
                }
                let span = self.name(b'*')?;
                self.push(Event::alias(role, span));
                self.expect_line_end()
            }
            Some(b'[' | b'{') => {
                self.flow_collection(role, props)?;
                self.expect_line_end()
            }
            Some(b'|' | b'>') => self.block_scalar(parent, role, props),
            Some(b'"' | b'\'') => {
                self.quoted_scalar(role, props)?;
                self.expect_line_end()
            }
            Some(b'-') if self.ws_or_end(at + 1) => {
                Err(self.error(at, "block sequence entries are not allowed here"))
            }
            Some(b'?') if self.ws_or_end(at + 1) => {
                Err(self.error(at, "explicit keys are not supported"))
            }
            Some(b',' | b']' | b'}' | b'@' | b'`' | b'%') => {
                Err(self.error(at, "unexpected character at the start of a scalar"))
            }
            _ => {
                self.plain_scalar(parent, role, props, false)?;
                self.expect_line_end()
            }
        }
    }

    fn block_mapping(&mut self, indent: usize, role: Role, props: Props) -> PResult<()> {
        self.enter(self.pos)?;
        self.emit_props(props, role);
        self.push(Event::begin_mapping(role, Layout::Block));
        loop {
            self.block_key()?;
            self.skip_blanks();
            if !self.is_value_indicator(self.pos, false) {
                return Err(self.error(self.pos, "could not find expected ':'"));
            }
            self.pos += 1;
            self.block_node(indent as isize, Role::Value, Context::MapValue)?;

            self.skip_to_content_line()?;
            if self.eof() || self.at_document_marker() {
                break;
            }
            let next = self.indentation()?;
            if next < indent {
                break;
            }
            if next > indent {
                return Err(self.error(self.pos + next, "bad indentation of a mapping entry"));
            }
            self.pos += next;
            match self.lookahead_key(false) {
                KeyShape::Key => {}
                KeyShape::ContainerKey => {
                    return Err(self.error(self.pos, "container keys are not supported"));
                }
                KeyShape::NotKey => {
                    return Err(self.error(self.pos, "could not find expected ':'"));
                }
            }
        }
        self.push(Event::end_mapping());
        self.leave();
        Ok(())
    }

    fn block_key(&mut self) -> PResult<()> {
        let mut props = Props::default();
        self.read_props(&mut props)?;
        let at = self.pos;
        match self.peek() {
            Some(b':') => self.emit_empty(Role::Key, props),
            Some(b'*') => {
                if !props.is_empty() {
                    return Err(self.error(at, "an alias cannot have properties"));
                }
                let span = self.name(b'*')?;
                self.push(Event::alias(Role::Key, span));
            }
            Some(b'"' | b'\'') => self.quoted_scalar(Role::Key, props)?,
            Some(b'?') if self.ws_or_end(at + 1) => {
                return Err(self.error(at, "explicit keys are not supported"));
            }
            _ => {
                let (end, _) = self.scan_plain_line(at, false);
                if end == at {
                    return Err(self.error(at, "could not find expected ':'"));
                }
                self.emit_props(props, Role::Key);
                self.push(Event::scalar(Role::Key, ScalarStyle::Plain, Span::new(at, end)));
                self.pos = end;
            }
        }
        Ok(())
    }

    fn block_sequence(&mut self, indent: usize, role: Role, props: Props) -> PResult<()> {
        self.enter(self.pos)?;
        self.emit_props(props, role);
        self.push(Event::begin_sequence(role, Layout::Block));
        loop {
            // Cursor on the `-` indicator.
            self.pos += 1;
            self.block_node(indent as isize, Role::Value, Context::SeqEntry)?;

            self.skip_to_content_line()?;
            if self.eof() || self.at_document_marker() {
                break;
            }
            let next = self.indentation()?;
            if next < indent {
                break;
            }
            if next > indent {
                return Err(self.error(self.pos + next, "bad indentation of a sequence entry"));
            }
            if !self.is_block_entry_at(self.pos + next) {
                break;
            }
            self.pos += next;
        }
        self.push(Event::end_sequence());
        self.leave();
        Ok(())
    }

    // ========================================================================
    // Properties and aliases
    // ========================================================================

    fn read_props(&mut self, props: &mut Props) -> PResult<()> {
        loop {
            match self.peek() {
                Some(b'!') => {
                    if props.tag.is_some() {
                        return Err(self.error(self.pos, "a node can have only one tag"));
                    }
                    props.tag = Some(self.tag()?);
                }
                Some(b'&') => {
                    if props.anchor.is_some() {
                        return Err(self.error(self.pos, "a node can have only one anchor"));
                    }
                    props.anchor = Some(self.name(b'&')?);
                }
                _ => return Ok(()),
            }
            self.skip_blanks();
        }
    }

    /// Anchor (`&name`) or alias (`*name`); the payload excludes the sigil.
    fn name(&mut self, sigil: u8) -> PResult<Span> {
        let at = self.pos;
        let end = self.scan_name(at + 1);
        if end == at + 1 {
            let message = if sigil == b'&' { "anchor name is empty" } else { "alias name is empty" };
            return Err(self.error(at, message));
        }
        self.pos = end;
        Ok(Span::new(at + 1, end))
    }

    /// Tag payloads: `!foo` -> `foo`, `!` -> empty, `!!str` -> `!!str`,
    /// `!<tag:x>` -> `tag:x`.
    fn tag(&mut self) -> PResult<Span> {
        let at = self.pos;
        match self.byte(at + 1) {
            Some(b'<') => {
                let end = self.scan_property(at);
                if self.byte(end - 1) != Some(b'>') {
                    return Err(self.error(at, "unterminated verbatim tag"));
                }
                if end == at + 3 {
                    return Err(self.error(at, "verbatim tag is empty"));
                }
                self.pos = end;
                Ok(Span::new(at + 2, end - 1))
            }
            Some(b'!') => {
                let end = self.scan_name(at + 2);
                if end == at + 2 {
                    return Err(self.error(at, "secondary tag has no suffix"));
                }
                self.pos = end;
                Ok(Span::new(at, end))
            }
            _ => {
                let end = self.scan_name(at + 1);
                if self.src[at + 1..end].contains(&b'!') {
                    return Err(self.error(at, "tag handle is not declared"));
                }
                self.pos = end;
                Ok(Span::new(at + 1, end))
            }
        }
    }

    // ========================================================================
    // Scalars
    // ========================================================================

    /// Copy the filtered scratch text into the source.
    ///
    /// The text goes to `primary`; if it does not fit before `raw_end` it
    /// moves to `fallback`, and failing that the scalar is rejected.
    fn commit(&mut self, primary: usize, fallback: usize, raw_end: usize) -> PResult<Span> {
        let len = self.scratch.len();
        let start = if len <= raw_end - primary {
            primary
        } else if len <= raw_end - fallback {
            fallback
        } else {
            return Err(self.error(fallback, "filtered scalar does not fit in its source region"));
        };
        self.src[start..start + len].copy_from_slice(&self.scratch[..]);
        Ok(Span::new(start, start + len))
    }

    fn plain_scalar(&mut self, parent: isize, role: Role, props: Props, flow: bool) -> PResult<()> {
        let start = self.pos;
        let (end, _) = self.scan_plain_line(start, flow);
        if end == start {
            return Err(self.error(start, "unexpected character at the start of a scalar"));
        }
        let mut segments: Vec<(usize, usize, usize)> = Vec::new();
        let mut last = end;
        while let Some(segment) = self.plain_continuation(last, parent, flow) {
            last = segment.2;
            segments.push(segment);
        }
        self.pos = last;
        let span = if segments.is_empty() {
            Span::new(start, end)
        } else {
            self.scratch.clear();
            scalar::fold_plain(self.src, (start, end), &segments, self.scratch);
            self.commit(start, start, last)?
        };
        self.emit_props(props, role);
        self.push(Event::scalar(role, ScalarStyle::Plain, span));
        Ok(())
    }

    /// The next line of a multi-line plain scalar, if any:
    /// `(empty_lines_before, start, end)`.
    fn plain_continuation(&self, from: usize, parent: isize, flow: bool) -> Option<(usize, usize, usize)> {
        let mut i = from;
        while matches!(self.byte(i), Some(b) if is_blank(b)) {
            i += 1;
        }
        if self.break_len(i) == 0 {
            return None;
        }
        i += self.break_len(i);
        let mut empty_lines = 0;
        loop {
            let line_start = i;
            while self.byte(i) == Some(b' ') {
                i += 1;
            }
            let indent = i - line_start;
            while matches!(self.byte(i), Some(b) if is_blank(b)) {
                i += 1;
            }
            self.byte(i)?;
            let len = self.break_len(i);
            if len > 0 {
                empty_lines += 1;
                i += len;
                continue;
            }
            if !flow && indent as isize <= parent {
                return None;
            }
            if self.is_document_marker_at(line_start) || self.byte(i) == Some(b'#') {
                return None;
            }
            let (end, _) = self.scan_plain_line(i, flow);
            if end == i {
                return None;
            }
            return Some((empty_lines, i, end));
        }
    }

    fn quoted_scalar(&mut self, role: Role, props: Props) -> PResult<()> {
        let open = self.pos;
        let quote = self.src[open];
        let start = open + 1;
        let mut i = start;
        let mut simple = true;
        let close = loop {
            let Some(b) = self.byte(i) else {
                let message = if quote == b'"' {
                    "unterminated double-quoted scalar"
                } else {
                    "unterminated single-quoted scalar"
                };
                return Err(self.error(open, message));
            };
            if b == quote {
                if quote == b'\'' && self.byte(i + 1) == Some(b'\'') {
                    simple = false;
                    i += 2;
                    continue;
                }
                break i;
            }
            if b == b'\\' && quote == b'"' {
                simple = false;
                i += 2;
            } else if b == b'\n' {
                simple = false;
                i += 1;
            } else {
                i += 1;
            }
        };
        self.pos = close + 1;

        let style = if quote == b'"' { ScalarStyle::DoubleQuoted } else { ScalarStyle::SingleQuoted };
        let span = if simple {
            Span::new(start, close)
        } else {
            self.scratch.clear();
            if quote == b'"' {
                scalar::filter_double_quoted(self.src, start, close, self.scratch)
                    .map_err(|e| self.error(e.offset, e.message))?;
            } else {
                scalar::filter_single_quoted(self.src, start, close, self.scratch);
            }
            self.commit(start, open, close + 1)?
        };
        self.emit_props(props, role);
        self.push(Event::scalar(role, style, span));
        Ok(())
    }

    fn block_scalar(&mut self, parent: isize, role: Role, props: Props) -> PResult<()> {
        let header = self.pos;
        let folded = self.src[header] == b'>';
        let mut i = header + 1;
        let mut chomp: Option<Chomp> = None;
        let mut explicit: Option<usize> = None;
        loop {
            match self.byte(i) {
                Some(b'+') if chomp.is_none() => chomp = Some(Chomp::Keep),
                Some(b'-') if chomp.is_none() => chomp = Some(Chomp::Strip),
                Some(d @ b'1'..=b'9') if explicit.is_none() => explicit = Some((d - b'0') as usize),
                _ => break,
            }
            i += 1;
        }
        let chomp = chomp.unwrap_or(Chomp::Clip);
        self.pos = i;
        if !self.ws_or_end(i) {
            return Err(self.error(i, "invalid block scalar header"));
        }
        self.skip_blanks();
        if self.peek() == Some(b'#') {
            self.skip_comment();
        }
        let body = if self.eof() {
            self.pos
        } else {
            match self.break_len(self.pos) {
                0 => return Err(self.error(self.pos, "invalid block scalar header")),
                n => self.pos + n,
            }
        };

        let base = parent.max(-1);
        let mut indent = explicit.map(|m| if base < 0 { m } else { base as usize + m });
        let mut lines: Vec<BlockLine> = Vec::new();
        let mut i = body;
        let mut raw_end = body;
        let mut last_break = false;
        while i < self.src.len() && !self.is_document_marker_at(i) {
            let mut j = i;
            while self.byte(j) == Some(b' ') {
                j += 1;
            }
            let spaces = j - i;
            let mut text_end = j;
            while text_end < self.src.len() && self.break_len(text_end) == 0 {
                text_end += 1;
            }
            let blank = self.src[j..text_end].iter().all(|&b| is_blank(b));
            let brk = self.break_len(text_end);
            let next = text_end + brk;

            let content_indent = match indent {
                Some(n) => n,
                None if blank => {
                    lines.push(BlockLine::Empty);
                    i = next;
                    raw_end = next;
                    last_break = brk > 0;
                    continue;
                }
                None => {
                    if spaces as isize <= parent {
                        break;
                    }
                    indent = Some(spaces);
                    spaces
                }
            };
            if spaces >= content_indent {
                let start = i + content_indent;
                let more_indented = matches!(self.byte(start), Some(b) if is_blank(b));
                lines.push(BlockLine::Content { start, end: text_end, more_indented });
            } else if blank {
                lines.push(BlockLine::Empty);
            } else {
                break;
            }
            i = next;
            raw_end = next;
            last_break = brk > 0;
        }
        self.pos = i;

        if let Some(pos) = lines.iter().rposition(|l| matches!(l, BlockLine::Content { .. })) {
            // Only the final content line's break matters for chomping.
            if pos + 1 < lines.len() {
                last_break = true;
            }
        }
        self.scratch.clear();
        scalar::filter_block(self.src, &lines, folded, chomp, last_break, self.scratch);
        let span = self.commit(body.min(raw_end), header, raw_end)?;

        let style = if folded { ScalarStyle::Folded } else { ScalarStyle::Literal };
        self.emit_props(props, role);
        self.push(Event::scalar(role, style, span));
        Ok(())
    }

    // ========================================================================
    // Flow collections
    // ========================================================================

    fn skip_flow_space(&mut self) {
        loop {
            match self.peek() {
                Some(b) if is_blank(b) => self.pos += 1,
                Some(b'#') => self.skip_comment(),
                Some(_) if self.break_len(self.pos) > 0 => self.pos += self.break_len(self.pos),
                _ => return,
            }
        }
    }

    fn check_flow_open(&self, open: usize) -> PResult<()> {
        if self.eof() || self.at_document_marker() {
            let message = if self.src[open] == b'[' {
                "unterminated flow sequence"
            } else {
                "unterminated flow mapping"
            };
            return Err(self.error(open, message));
        }
        Ok(())
    }

    fn read_flow_props(&mut self, props: &mut Props) -> PResult<()> {
        while matches!(self.peek(), Some(b'!' | b'&')) {
            self.read_props(props)?;
            self.skip_flow_space();
        }
        Ok(())
    }

    fn flow_collection(&mut self, role: Role, props: Props) -> PResult<()> {
        if self.peek() == Some(b'[') {
            self.flow_sequence(role, props)
        } else {
            self.flow_mapping(role, props)
        }
    }

    fn flow_sequence(&mut self, role: Role, props: Props) -> PResult<()> {
        let open = self.pos;
        self.enter(open)?;
        self.emit_props(props, role);
        self.push(Event::begin_sequence(role, Layout::Flow));
        self.pos += 1;
        loop {
            self.skip_flow_space();
            self.check_flow_open(open)?;
            if self.peek() == Some(b']') {
                self.pos += 1;
                break;
            }
            match self.lookahead_key(true) {
                KeyShape::Key => self.flow_pair(open)?,
                KeyShape::ContainerKey => {
                    return Err(self.error(self.pos, "container keys are not supported"));
                }
                KeyShape::NotKey => self.flow_node(Role::Value)?,
            }
            self.skip_flow_space();
            self.check_flow_open(open)?;
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error(self.pos, "expected ',' or ']' in flow sequence")),
            }
        }
        self.push(Event::end_sequence());
        self.leave();
        Ok(())
    }

    /// Single-pair mapping inside a flow sequence: `[a: b]`.
    fn flow_pair(&mut self, open: usize) -> PResult<()> {
        self.enter(self.pos)?;
        self.push(Event::begin_mapping(Role::Value, Layout::Flow));
        self.flow_key()?;
        self.skip_flow_space();
        self.check_flow_open(open)?;
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_flow_space();
            self.check_flow_open(open)?;
            if matches!(self.peek(), Some(b',' | b']')) {
                self.emit_empty(Role::Value, Props::default());
            } else {
                self.flow_node(Role::Value)?;
            }
        } else {
            self.emit_empty(Role::Value, Props::default());
        }
        self.push(Event::end_mapping());
        self.leave();
        Ok(())
    }

    fn flow_mapping(&mut self, role: Role, props: Props) -> PResult<()> {
        let open = self.pos;
        self.enter(open)?;
        self.emit_props(props, role);
        self.push(Event::begin_mapping(role, Layout::Flow));
        self.pos += 1;
        loop {
            self.skip_flow_space();
            self.check_flow_open(open)?;
            if self.peek() == Some(b'}') {
                self.pos += 1;
                break;
            }
            self.flow_key()?;
            self.skip_flow_space();
            self.check_flow_open(open)?;
            match self.peek() {
                Some(b':') => {
                    self.pos += 1;
                    self.skip_flow_space();
                    self.check_flow_open(open)?;
                    if matches!(self.peek(), Some(b',' | b'}')) {
                        self.emit_empty(Role::Value, Props::default());
                    } else {
                        self.flow_node(Role::Value)?;
                    }
                }
                Some(b',' | b'}') => self.emit_empty(Role::Value, Props::default()),
                _ => return Err(self.error(self.pos, "expected ':' after a flow mapping key")),
            }
            self.skip_flow_space();
            self.check_flow_open(open)?;
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error(self.pos, "expected ',' or '}' in flow mapping")),
            }
        }
        self.push(Event::end_mapping());
        self.leave();
        Ok(())
    }

    fn flow_key(&mut self) -> PResult<()> {
        let mut props = Props::default();
        self.read_flow_props(&mut props)?;
        let at = self.pos;
        match self.peek() {
            Some(b':') if self.is_value_indicator(at, true) => self.emit_empty(Role::Key, props),
            Some(b'*') => {
                if !props.is_empty() {
                    return Err(self.error(at, "an alias cannot have properties"));
                }
                let span = self.name(b'*')?;
                self.push(Event::alias(Role::Key, span));
            }
            Some(b'"' | b'\'') => self.quoted_scalar(Role::Key, props)?,
            Some(b'[' | b'{') => return Err(self.error(at, "container keys are not supported")),
            Some(b'?') if self.ws_or_end(at + 1) => {
                return Err(self.error(at, "explicit keys are not supported"));
            }
            _ => {
                let (end, _) = self.scan_plain_line(at, true);
                if end == at {
                    return Err(self.error(at, "unexpected character in flow mapping key"));
                }
                self.emit_props(props, Role::Key);
                self.push(Event::scalar(Role::Key, ScalarStyle::Plain, Span::new(at, end)));
                self.pos = end;
            }
        }
        Ok(())
    }

    fn flow_node(&mut self, role: Role) -> PResult<()> {
        let mut props = Props::default();
        self.read_flow_props(&mut props)?;
        let at = self.pos;
        match self.peek() {
            None => Err(self.error(at, "unexpected end of input in flow collection")),
            Some(b'[' | b'{') => self.flow_collection(role, props),
            Some(b'*') => {
                if !props.is_empty() {
                    return Err(self.error(at, "an alias cannot have properties"));
                }
                let span = self.name(b'*')?;
                self.push(Event::alias(role, span));
                Ok(())
            }
            Some(b'"' | b'\'') => self.quoted_scalar(role, props),
            Some(b',' | b']' | b'}') if !props.is_empty() => {
                self.emit_empty(role, props);
                Ok(())
            }
            Some(b',' | b']' | b'}' | b'@' | b'`' | b'%') => {
                Err(self.error(at, "unexpected character in flow collection"))
            }
            Some(b'|' | b'>') => Err(self.error(at, "block scalars are not allowed in flow context")),
            Some(b'-' | b'?') if self.ws_or_end(at + 1) => {
                Err(self.error(at, "block indicators are not allowed in flow context"))
            }
            Some(b':') if self.is_value_indicator(at, true) => {
                Err(self.error(at, "unexpected ':' in flow collection"))
            }
            _ => self.plain_scalar(-1, role, props, true),
        }
    }
}

/// Parse `src` (filtering scalars in place) and collect the events.
pub fn parse_events(
    src: &mut [u8],
    options: &ParseOptions,
    scratch: &mut Vec<u8>,
) -> Result<Vec<Event>, ParseError> {
    let mut events = Vec::new();
    Parser::new(src, options, scratch, |event| events.push(event)).parse()?;
    Ok(events)
}
