//! EDN rendering of event streams.
//!
//! The stream becomes a parenthesized list with one map per event:
//!
//! ```text
//! (
//! {:+ "+MAP"}
//! {:+ "=VAL", := "a"}
//! {:+ "=VAL", :& "x", :! "int", := "1"}
//! {:+ "-MAP"}
//! {:+ "-DOC"}
//! )
//! ```
//!
//! Scalars carry their style as the key of the text (`=` plain, `'` single
//! quoted, `$` double quoted, `|` literal, `>` folded, `:` empty). Anchors
//! and tags are folded into the node they decorate. An explicit `---`
//! announces `+DOC` only after the first document.
//!
//! Text results cross the boundary with the same write-what-fits protocol
//! as event cells, counted in bytes and NUL-terminated.

use std::borrow::Cow;

use crate::error::ProtocolError;
use crate::event::{Event, EventKind, Layout, ScalarStyle};

/// Outcome of writing a NUL-terminated text into a bounded byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextExchange {
    /// Bytes the caller offered.
    pub capacity: usize,
    /// Bytes the complete text needs, terminating NUL included.
    pub required_size: usize,
    /// Bytes written, either all of `required_size` or none.
    pub bytes_written: usize,
}

impl TextExchange {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.required_size <= self.capacity
    }
}

/// Copy `text` and a NUL into `out` if both fit.
///
/// Text is never truncated. A buffer that is too small but not empty gets
/// an empty string, so it never holds stale text.
pub(crate) fn write_text(text: &str, out: &mut [u8]) -> TextExchange {
    let required_size = text.len() + 1;
    let bytes_written = if required_size <= out.len() {
        out[..text.len()].copy_from_slice(text.as_bytes());
        out[text.len()] = 0;
        required_size
    } else {
        if let Some(first) = out.first_mut() {
            *first = 0;
        }
        0
    };
    TextExchange { capacity: out.len(), required_size, bytes_written }
}

/// Tag and anchor waiting for the node they belong to.
#[derive(Default)]
struct Props<'s> {
    anchor: Option<Cow<'s, str>>,
    tag: Option<Cow<'s, str>>,
    verbatim: bool,
}

/// Render `events`, whose payloads point into `src`, as EDN text.
pub fn render(events: &[Event], src: &[u8]) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(src.len() * 4 + 8);
    let mut props = Props::default();
    let mut documents = 0usize;
    let mut cell = 0;

    for event in events {
        let text = || {
            event
                .text(src)
                .map(String::from_utf8_lossy)
                .ok_or(ProtocolError::MalformedEvent { index: cell, reason: "payload outside the source" })
        };
        match event.kind {
            EventKind::BeginStream => out.push_str("(\n"),
            EventKind::EndStream => out.push_str(")\n"),
            EventKind::BeginDocument { explicit } => {
                if explicit && documents > 0 {
                    out.push_str("{:+ \"+DOC\"}\n");
                }
                documents += 1;
            }
            EventKind::EndDocument { .. } => out.push_str("{:+ \"-DOC\"}\n"),
            EventKind::BeginMapping(layout) => open(&mut out, "+MAP", layout, &mut props),
            EventKind::EndMapping => out.push_str("{:+ \"-MAP\"}\n"),
            EventKind::BeginSequence(layout) => open(&mut out, "+SEQ", layout, &mut props),
            EventKind::EndSequence => out.push_str("{:+ \"-SEQ\"}\n"),
            EventKind::Anchor => props.anchor = Some(text()?),
            EventKind::Tag => {
                props.verbatim = event
                    .payload
                    .and_then(|span| (span.start as usize).checked_sub(1))
                    .and_then(|at| src.get(at))
                    == Some(&b'<');
                props.tag = Some(text()?);
            }
            EventKind::Alias => {
                out.push_str("{:+ \"=ALI\" :* \"");
                out.push_str(&text()?);
                out.push_str("\"}\n");
            }
            EventKind::Scalar(style) => {
                let value = text()?;
                let code = match style {
                    ScalarStyle::Plain if value.is_empty() => ':',
                    ScalarStyle::Plain => '=',
                    ScalarStyle::SingleQuoted => '\'',
                    ScalarStyle::DoubleQuoted => '$',
                    ScalarStyle::Literal => '|',
                    ScalarStyle::Folded => '>',
                };
                out.push_str("{:+ \"=VAL\"");
                push_props(&mut out, &mut props);
                out.push_str(", :");
                out.push(code);
                out.push_str(" \"");
                push_escaped(&mut out, &value);
                out.push_str("\"}\n");
            }
        }
        cell += event.cell_count();
    }
    Ok(out)
}

fn open(out: &mut String, name: &str, layout: Layout, props: &mut Props<'_>) {
    out.push_str("{:+ \"");
    out.push_str(name);
    out.push('"');
    push_props(out, props);
    if layout == Layout::Flow {
        out.push_str(", :flow true");
    }
    out.push_str("}\n");
}

fn push_props(out: &mut String, props: &mut Props<'_>) {
    let Props { anchor, tag, verbatim } = std::mem::take(props);
    if let Some(anchor) = anchor {
        out.push_str(", :& \"");
        out.push_str(&anchor);
        out.push('"');
    }
    if let Some(tag) = tag {
        out.push_str(", :! \"");
        push_tag(out, &tag, verbatim);
        out.push('"');
    }
}

/// Local tags lose their `!`; core `!!` tags are written in long form.
fn push_tag(out: &mut String, tag: &str, verbatim: bool) {
    if verbatim {
        out.push('<');
        out.push_str(tag);
        out.push('>');
        return;
    }
    match tag.strip_prefix("!!") {
        Some(suffix) if is_core_tag(suffix) => {
            out.push_str("<tag:yaml.org,2002:");
            out.push_str(suffix);
            out.push('>');
        }
        // `!!foo` without a core meaning keeps one `!`.
        Some(_) => out.push_str(&tag[1..]),
        None => out.push_str(tag),
    }
}

fn is_core_tag(suffix: &str) -> bool {
    matches!(
        suffix,
        "map" | "omap" | "pairs" | "set" | "seq" | "binary" | "bool" | "float" | "int" | "merge"
            | "null" | "str" | "timestamp" | "value" | "yaml"
    )
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}
