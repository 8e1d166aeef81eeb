//! Parser events - the core output of the ysparse grammar engine.
//!
//! A document becomes a flat, ordered sequence of structural events.
//! Structure is represented by begin/end pairs; scalars, aliases and node
//! properties carry a payload reference `(offset, length)` into the
//! (possibly filtered) source buffer instead of owning text.
//!
//! On the wire every event is one flag word. Events whose flags intersect
//! [`flags::HAS_STR`] are followed by two more cells: payload offset and
//! payload length.
//!
//! `a: 1` emits:
//! ```text
//! BSTR
//! BDOC
//! VAL_|BMAP|BLCK
//! KEY_|SCLR|PLAI  0 1
//! VAL_|SCLR|PLAI  3 1
//! EMAP
//! EDOC
//! ESTR
//! ```
//!
//! Only [`Event::flags`] and [`Event::decode`] know about bit positions.

use crate::error::ProtocolError;
use crate::span::Span;

/// Canonical wire layout of event flag words.
///
/// Any change to a bit position must bump [`FORMAT_VERSION`].
pub mod flags {
    /// Version of the bit layout below.
    pub const FORMAT_VERSION: u32 = 1;

    // ========== Structural role ==========
    pub const KEY_: i32 = 1 << 0;
    pub const VAL_: i32 = 1 << 1;

    // ========== Kind ==========
    pub const SCLR: i32 = 1 << 2;
    pub const BSEQ: i32 = 1 << 3;
    pub const ESEQ: i32 = 1 << 4;
    pub const BMAP: i32 = 1 << 5;
    pub const EMAP: i32 = 1 << 6;
    pub const ALIA: i32 = 1 << 7;
    pub const ANCH: i32 = 1 << 8;
    pub const TAG_: i32 = 1 << 9;

    // ========== Scalar style ==========
    pub const PLAI: i32 = 1 << 10;
    pub const SQUO: i32 = 1 << 11;
    pub const DQUO: i32 = 1 << 12;
    pub const LITL: i32 = 1 << 13;
    pub const FOLD: i32 = 1 << 14;

    // ========== Container layout ==========
    pub const FLOW: i32 = 1 << 15;
    pub const BLCK: i32 = 1 << 16;

    // ========== Documents and stream ==========
    pub const BDOC: i32 = 1 << 17;
    pub const EDOC: i32 = 1 << 18;
    pub const BSTR: i32 = 1 << 19;
    pub const ESTR: i32 = 1 << 20;
    pub const EXPL: i32 = 1 << 21;

    /// Events carrying a payload reference.
    pub const HAS_STR: i32 = SCLR | ALIA | ANCH | TAG_;
    /// Every defined bit.
    pub const MASK: i32 = (EXPL << 1) - 1;

    pub(crate) const ROLE: i32 = KEY_ | VAL_;
    pub(crate) const KIND: i32 =
        SCLR | BSEQ | ESEQ | BMAP | EMAP | ALIA | ANCH | TAG_ | BDOC | EDOC | BSTR | ESTR;
    pub(crate) const STYLE: i32 = PLAI | SQUO | DQUO | LITL | FOLD;
    pub(crate) const LAYOUT: i32 = FLOW | BLCK;

    /// Symbolic rendering of a flag word, e.g. `VAL_|SCLR|PLAI`.
    pub fn describe(word: i32) -> String {
        const NAMES: [(i32, &str); 22] = [
            (KEY_, "KEY_"),
            (VAL_, "VAL_"),
            (SCLR, "SCLR"),
            (BSEQ, "BSEQ"),
            (ESEQ, "ESEQ"),
            (BMAP, "BMAP"),
            (EMAP, "EMAP"),
            (ALIA, "ALIA"),
            (ANCH, "ANCH"),
            (TAG_, "TAG_"),
            (PLAI, "PLAI"),
            (SQUO, "SQUO"),
            (DQUO, "DQUO"),
            (LITL, "LITL"),
            (FOLD, "FOLD"),
            (FLOW, "FLOW"),
            (BLCK, "BLCK"),
            (BDOC, "BDOC"),
            (EDOC, "EDOC"),
            (BSTR, "BSTR"),
            (ESTR, "ESTR"),
            (EXPL, "EXPL"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| word & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            "0".to_string()
        } else {
            names.join("|")
        }
    }
}

use flags::*;

/// Whether a node is a mapping key or a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Key,
    Value,
}

/// How a scalar was written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

/// How a container was written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    Block,
    Flow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // ========== Stream / document ==========
    BeginStream,
    EndStream,
    /// `explicit` when the document started with `---`.
    BeginDocument { explicit: bool },
    /// `explicit` when the document ended with `...`.
    EndDocument { explicit: bool },

    // ========== Containers ==========
    BeginMapping(Layout),
    EndMapping,
    BeginSequence(Layout),
    EndSequence,

    // ========== Payload-carrying ==========
    Scalar(ScalarStyle),
    Alias,
    /// Node property, emitted before the node it decorates.
    Anchor,
    /// Node property, emitted before the node (and before any anchor).
    Tag,
}

impl EventKind {
    #[inline]
    pub fn has_payload(&self) -> bool {
        matches!(
            self,
            EventKind::Scalar(_) | EventKind::Alias | EventKind::Anchor | EventKind::Tag
        )
    }
}

/// One structural event.
///
/// Invariant: `payload.is_some() == kind.has_payload()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    pub kind: EventKind,
    pub role: Option<Role>,
    pub payload: Option<Span>,
}

impl Event {
    // ========== Constructors ==========

    #[inline]
    fn bare(kind: EventKind, role: Option<Role>) -> Self {
        Self { kind, role, payload: None }
    }

    #[inline]
    fn with_payload(kind: EventKind, role: Role, span: Span) -> Self {
        Self { kind, role: Some(role), payload: Some(span) }
    }

    pub fn begin_stream() -> Self {
        Self::bare(EventKind::BeginStream, None)
    }

    pub fn end_stream() -> Self {
        Self::bare(EventKind::EndStream, None)
    }

    pub fn begin_document(explicit: bool) -> Self {
        Self::bare(EventKind::BeginDocument { explicit }, None)
    }

    pub fn end_document(explicit: bool) -> Self {
        Self::bare(EventKind::EndDocument { explicit }, None)
    }

    pub fn begin_mapping(role: Role, layout: Layout) -> Self {
        Self::bare(EventKind::BeginMapping(layout), Some(role))
    }

    pub fn end_mapping() -> Self {
        Self::bare(EventKind::EndMapping, None)
    }

    pub fn begin_sequence(role: Role, layout: Layout) -> Self {
        Self::bare(EventKind::BeginSequence(layout), Some(role))
    }

    pub fn end_sequence() -> Self {
        Self::bare(EventKind::EndSequence, None)
    }

    pub fn scalar(role: Role, style: ScalarStyle, span: Span) -> Self {
        Self::with_payload(EventKind::Scalar(style), role, span)
    }

    pub fn alias(role: Role, span: Span) -> Self {
        Self::with_payload(EventKind::Alias, role, span)
    }

    pub fn anchor(role: Role, span: Span) -> Self {
        Self::with_payload(EventKind::Anchor, role, span)
    }

    pub fn tag(role: Role, span: Span) -> Self {
        Self::with_payload(EventKind::Tag, role, span)
    }

    // ========== Queries ==========

    /// Number of wire cells this event occupies (1 or 3).
    #[inline]
    pub fn cell_count(&self) -> usize {
        if self.payload.is_some() {
            3
        } else {
            1
        }
    }

    /// Payload bytes in `src`, `None` for events without payload or with an
    /// out-of-range reference.
    pub fn text<'s>(&self, src: &'s [u8]) -> Option<&'s [u8]> {
        self.payload.and_then(|span| span.slice(src))
    }

    /// Check if this is a structure start event (has matching end).
    pub fn is_structure_start(&self) -> bool {
        matches!(
            self.kind,
            EventKind::BeginStream
                | EventKind::BeginDocument { .. }
                | EventKind::BeginMapping(_)
                | EventKind::BeginSequence(_)
        )
    }

    /// Check if this is a structure end event.
    pub fn is_structure_end(&self) -> bool {
        matches!(
            self.kind,
            EventKind::EndStream
                | EventKind::EndDocument { .. }
                | EventKind::EndMapping
                | EventKind::EndSequence
        )
    }

    /// Check if this is a node property (tag or anchor).
    pub fn is_property(&self) -> bool {
        matches!(self.kind, EventKind::Anchor | EventKind::Tag)
    }

    // ========== Wire format ==========

    /// The flag word for this event.
    pub fn flags(&self) -> i32 {
        let role = match self.role {
            Some(Role::Key) => KEY_,
            Some(Role::Value) => VAL_,
            None => 0,
        };
        let kind = match self.kind {
            EventKind::BeginStream => BSTR,
            EventKind::EndStream => ESTR,
            EventKind::BeginDocument { explicit } => BDOC | if explicit { EXPL } else { 0 },
            EventKind::EndDocument { explicit } => EDOC | if explicit { EXPL } else { 0 },
            EventKind::BeginMapping(layout) => BMAP | layout_bit(layout),
            EventKind::EndMapping => EMAP,
            EventKind::BeginSequence(layout) => BSEQ | layout_bit(layout),
            EventKind::EndSequence => ESEQ,
            EventKind::Scalar(style) => SCLR | style_bit(style),
            EventKind::Alias => ALIA,
            EventKind::Anchor => ANCH,
            EventKind::Tag => TAG_,
        };
        role | kind
    }

    /// Append the wire cells of this event to `out`.
    pub fn encode(&self, out: &mut Vec<i32>) {
        out.push(self.flags());
        if let Some(span) = self.payload {
            out.push(span.start as i32);
            out.push(span.len() as i32);
        }
    }

    /// Write the wire cells into the front of `out`, which must hold at
    /// least [`Event::cell_count`] cells.
    pub fn encode_into(&self, out: &mut [i32]) {
        out[0] = self.flags();
        if let Some(span) = self.payload {
            out[1] = span.start as i32;
            out[2] = span.len() as i32;
        }
    }

    /// Decode the event starting at `cells[index]`.
    ///
    /// Returns the event and the number of cells it occupied.
    pub fn decode(cells: &[i32], index: usize) -> Result<(Event, usize), ProtocolError> {
        let malformed = |reason| ProtocolError::MalformedEvent { index, reason };
        let word = *cells.get(index).ok_or_else(|| malformed("missing flag word"))?;
        if word & !MASK != 0 {
            return Err(malformed("undefined flag bits"));
        }

        let role = match word & ROLE {
            0 => None,
            KEY_ => Some(Role::Key),
            VAL_ => Some(Role::Value),
            _ => return Err(malformed("both key and value role")),
        };
        let explicit = word & EXPL != 0;
        let layout = match word & LAYOUT {
            0 => None,
            FLOW => Some(Layout::Flow),
            BLCK => Some(Layout::Block),
            _ => return Err(malformed("both flow and block layout")),
        };
        let style = match word & STYLE {
            0 => None,
            PLAI => Some(ScalarStyle::Plain),
            SQUO => Some(ScalarStyle::SingleQuoted),
            DQUO => Some(ScalarStyle::DoubleQuoted),
            LITL => Some(ScalarStyle::Literal),
            FOLD => Some(ScalarStyle::Folded),
            _ => return Err(malformed("more than one scalar style")),
        };

        let kind = word & KIND;
        if kind.count_ones() != 1 {
            return Err(malformed("expected exactly one kind bit"));
        }
        if explicit && kind & (BDOC | EDOC) == 0 {
            return Err(malformed("explicit marker outside a document event"));
        }
        if style.is_some() && kind != SCLR {
            return Err(malformed("scalar style on a non-scalar event"));
        }
        if layout.is_some() && kind & (BMAP | BSEQ) == 0 {
            return Err(malformed("layout on a non-container event"));
        }

        let kind = match kind {
            BSTR => EventKind::BeginStream,
            ESTR => EventKind::EndStream,
            BDOC => EventKind::BeginDocument { explicit },
            EDOC => EventKind::EndDocument { explicit },
            BMAP => EventKind::BeginMapping(layout.ok_or_else(|| malformed("mapping without layout"))?),
            EMAP => EventKind::EndMapping,
            BSEQ => EventKind::BeginSequence(layout.ok_or_else(|| malformed("sequence without layout"))?),
            ESEQ => EventKind::EndSequence,
            SCLR => EventKind::Scalar(style.ok_or_else(|| malformed("scalar without style"))?),
            ALIA => EventKind::Alias,
            ANCH => EventKind::Anchor,
            _ => EventKind::Tag,
        };

        let needs_role = matches!(
            kind,
            EventKind::BeginMapping(_)
                | EventKind::BeginSequence(_)
                | EventKind::Scalar(_)
                | EventKind::Alias
                | EventKind::Anchor
                | EventKind::Tag
        );
        if needs_role != role.is_some() {
            return Err(malformed("role bits do not match the event kind"));
        }

        if !kind.has_payload() {
            return Ok((Event { kind, role, payload: None }, 1));
        }
        let (start, len) = match (cells.get(index + 1), cells.get(index + 2)) {
            (Some(&start), Some(&len)) => (start, len),
            _ => return Err(malformed("truncated payload reference")),
        };
        if start < 0 || len < 0 || start.checked_add(len).is_none() {
            return Err(malformed("negative or overflowing payload reference"));
        }
        let span = Span::new(start as usize, (start + len) as usize);
        Ok((Event { kind, role, payload: Some(span) }, 3))
    }
}

#[inline]
fn layout_bit(layout: Layout) -> i32 {
    match layout {
        Layout::Block => BLCK,
        Layout::Flow => FLOW,
    }
}

#[inline]
fn style_bit(style: ScalarStyle) -> i32 {
    match style {
        ScalarStyle::Plain => PLAI,
        ScalarStyle::SingleQuoted => SQUO,
        ScalarStyle::DoubleQuoted => DQUO,
        ScalarStyle::Literal => LITL,
        ScalarStyle::Folded => FOLD,
    }
}

/// Iterator decoding wire cells back into events.
#[derive(Debug, Clone)]
pub struct Decoder<'c> {
    cells: &'c [i32],
    index: usize,
}

impl<'c> Decoder<'c> {
    pub fn new(cells: &'c [i32]) -> Self {
        Self { cells, index: 0 }
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<Event, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.cells.len() {
            return None;
        }
        match Event::decode(self.cells, self.index) {
            Ok((event, used)) => {
                self.index += used;
                Some(Ok(event))
            }
            Err(e) => {
                // Stop after the first malformed cell.
                self.index = self.cells.len();
                Some(Err(e))
            }
        }
    }
}

/// Total wire cells for a slice of events.
pub fn cell_total(events: &[Event]) -> usize {
    events.iter().map(Event::cell_count).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(VAL_ | BMAP | BLCK, 0b1_0000_0000_0010_0010);
        assert_eq!(MASK, (1 << 22) - 1);
        assert_eq!(HAS_STR, SCLR | ALIA | ANCH | TAG_);
        assert_eq!(FORMAT_VERSION, 1);
    }

    #[test]
    fn test_flag_words() {
        assert_eq!(Event::begin_stream().flags(), BSTR);
        assert_eq!(Event::begin_document(true).flags(), BDOC | EXPL);
        assert_eq!(Event::end_document(false).flags(), EDOC);
        assert_eq!(Event::begin_mapping(Role::Value, Layout::Block).flags(), VAL_ | BMAP | BLCK);
        assert_eq!(Event::begin_sequence(Role::Value, Layout::Flow).flags(), VAL_ | BSEQ | FLOW);
        assert_eq!(
            Event::scalar(Role::Key, ScalarStyle::Plain, Span::new(0, 1)).flags(),
            KEY_ | SCLR | PLAI
        );
        assert_eq!(Event::tag(Role::Value, Span::new(5, 18)).flags(), VAL_ | TAG_);
        assert_eq!(Event::end_mapping().flags(), EMAP);
    }

    #[test]
    fn test_payload_cells() {
        let event = Event::scalar(Role::Value, ScalarStyle::Plain, Span::new(5, 10));
        let mut cells = Vec::new();
        event.encode(&mut cells);
        assert_eq!(cells, vec![VAL_ | SCLR | PLAI, 5, 5]);
        assert_eq!(event.cell_count(), 3);
        assert_eq!(Event::end_sequence().cell_count(), 1);
        assert_eq!(event.text(b"say: 2 + 2"), Some(&b"2 + 2"[..]));
    }

    #[test]
    fn test_decode_rejects_malformed_words() {
        assert!(Event::decode(&[1 << 22], 0).is_err());
        assert!(Event::decode(&[BMAP | EMAP], 0).is_err());
        assert!(Event::decode(&[VAL_ | SCLR], 0).is_err());
        assert!(Event::decode(&[VAL_ | SCLR | PLAI, 0], 0).is_err());
        assert!(Event::decode(&[SCLR | PLAI, 0, 1], 0).is_err());
        assert!(Event::decode(&[VAL_ | EMAP], 0).is_err());
        assert!(Event::decode(&[VAL_ | SCLR | PLAI, -1, 1], 0).is_err());
        assert!(Event::decode(&[ESEQ | EXPL], 0).is_err());
    }

    #[test]
    fn test_decoder_walks_mixed_widths() {
        let cells = [BSTR, BDOC, VAL_ | SCLR | PLAI, 0, 3, EDOC, ESTR];
        let events: Vec<Event> = Decoder::new(&cells).collect::<Result<_, _>>().unwrap();
        assert_eq!(events.len(), 5);
        assert_eq!(events[2].payload, Some(Span::new(0, 3)));
        assert_eq!(cell_total(&events), cells.len());
    }

    #[test]
    fn test_describe() {
        assert_eq!(flags::describe(VAL_ | SCLR | PLAI), "VAL_|SCLR|PLAI");
        assert_eq!(flags::describe(BDOC | EXPL), "BDOC|EXPL");
        assert_eq!(flags::describe(0), "0");
    }
}
