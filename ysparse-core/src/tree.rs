//! Composition: event stream to a JSON data tree.
//!
//! The evaluation runtime loads documents as plain data. Events are
//! consumed in order by a recursive composer that resolves scalars with
//! the core schema (see [`crate::value`]), expands aliases by value and
//! applies `<<` merge keys.
//!
//! Alias expansion copies nodes, so nested aliases can grow a short
//! document exponentially. Every expansion is charged the node count of
//! the copied value against a per-document budget.
//!
//! The result of a stream is the value of its *last* document; a stream
//! without documents is `null`.

use ahash::AHashMap;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::error::Error as CrateError;
use crate::event::{Event, EventKind, ScalarStyle};
use crate::value::{CoreTag, Scalar};

const MERGE_KEY: &str = "<<";

/// Why a well-formed event stream could not become data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("unknown alias *{0}")]
    UnknownAlias(String),

    #[error("duplicate mapping key {0:?}")]
    DuplicateKey(String),

    #[error("mapping keys must be scalars")]
    NonScalarKey,

    #[error("{value:?} is not a valid {tag}")]
    TagMismatch { tag: &'static str, value: String },

    #[error("{0:?} cannot be represented as a JSON number")]
    NonFinite(String),

    #[error("merge value must be a mapping or a sequence of mappings")]
    InvalidMerge,

    #[error("scalar text is not valid UTF-8")]
    InvalidUtf8,

    #[error("aliases expand to more than {limit} nodes")]
    AliasBudgetExceeded { limit: usize },

    #[error("malformed event stream: {0}")]
    Malformed(&'static str),
}

impl From<ComposeError> for CrateError {
    fn from(e: ComposeError) -> Self {
        CrateError::Evaluation(e.to_string())
    }
}

/// Compose `events` (payloads referring to `src`) into a data tree.
///
/// Alias expansion may copy at most `max_alias_nodes` nodes per document.
pub fn compose(events: &[Event], src: &[u8], max_alias_nodes: usize) -> Result<Value, ComposeError> {
    Composer {
        events,
        src,
        pos: 0,
        anchors: AHashMap::new(),
        alias_budget: max_alias_nodes,
        max_alias_nodes,
    }
    .stream()
}

/// Node properties collected before a node.
#[derive(Debug, Default)]
struct Props<'s> {
    tag: Option<&'s str>,
    anchor: Option<&'s str>,
}

struct Composer<'e> {
    events: &'e [Event],
    src: &'e [u8],
    pos: usize,
    /// Anchored values with their node counts.
    anchors: AHashMap<&'e str, (Value, usize)>,
    alias_budget: usize,
    max_alias_nodes: usize,
}

impl<'e> Composer<'e> {
    fn next(&mut self) -> Result<Event, ComposeError> {
        let event = *self
            .events
            .get(self.pos)
            .ok_or(ComposeError::Malformed("unexpected end of events"))?;
        self.pos += 1;
        Ok(event)
    }

    fn peek(&self) -> Option<&EventKind> {
        self.events.get(self.pos).map(|e| &e.kind)
    }

    fn text(&self, event: &Event) -> Result<&'e str, ComposeError> {
        let bytes = event
            .text(self.src)
            .ok_or(ComposeError::Malformed("payload outside the source"))?;
        std::str::from_utf8(bytes).map_err(|_| ComposeError::InvalidUtf8)
    }

    fn stream(&mut self) -> Result<Value, ComposeError> {
        if self.next()?.kind != EventKind::BeginStream {
            return Err(ComposeError::Malformed("expected the start of the stream"));
        }
        let mut result = Value::Null;
        loop {
            match self.next()?.kind {
                EventKind::BeginDocument { .. } => {
                    // Anchors do not carry across documents.
                    self.anchors.clear();
                    self.alias_budget = self.max_alias_nodes;
                    result = self.node()?;
                    if !matches!(self.next()?.kind, EventKind::EndDocument { .. }) {
                        return Err(ComposeError::Malformed("expected the end of the document"));
                    }
                }
                EventKind::EndStream => return Ok(result),
                _ => return Err(ComposeError::Malformed("expected a document")),
            }
        }
    }

    fn props(&mut self) -> Result<Props<'e>, ComposeError> {
        let mut props = Props::default();
        loop {
            match self.peek() {
                Some(EventKind::Tag) => {
                    let event = self.next()?;
                    props.tag = Some(self.text(&event)?);
                }
                Some(EventKind::Anchor) => {
                    let event = self.next()?;
                    props.anchor = Some(self.text(&event)?);
                }
                _ => return Ok(props),
            }
        }
    }

    fn node(&mut self) -> Result<Value, ComposeError> {
        let props = self.props()?;
        let event = self.next()?;
        let core = props.tag.and_then(CoreTag::from_tag);
        let value = match event.kind {
            EventKind::Scalar(style) => {
                let text = self.text(&event)?;
                scalar(style, text, props.tag, core)?
            }
            EventKind::Alias => {
                let name = self.text(&event)?;
                let (value, nodes) = self
                    .anchors
                    .get(name)
                    .ok_or_else(|| ComposeError::UnknownAlias(name.to_string()))?;
                self.alias_budget = self
                    .alias_budget
                    .checked_sub(*nodes)
                    .ok_or(ComposeError::AliasBudgetExceeded { limit: self.max_alias_nodes })?;
                value.clone()
            }
            EventKind::BeginSequence(_) => {
                check_collection_tag(core, CoreTag::Seq)?;
                self.sequence()?
            }
            EventKind::BeginMapping(_) => {
                check_collection_tag(core, CoreTag::Map)?;
                self.mapping()?
            }
            _ => return Err(ComposeError::Malformed("expected a node")),
        };
        if let Some(anchor) = props.anchor {
            self.anchors.insert(anchor, (value.clone(), node_count(&value)));
        }
        Ok(value)
    }

    fn sequence(&mut self) -> Result<Value, ComposeError> {
        let mut items = Vec::new();
        while self.peek() != Some(&EventKind::EndSequence) {
            items.push(self.node()?);
        }
        self.pos += 1;
        Ok(Value::Array(items))
    }

    fn mapping(&mut self) -> Result<Value, ComposeError> {
        let mut map = Map::new();
        let mut merges = Vec::new();
        while self.peek() != Some(&EventKind::EndMapping) {
            let merge = self.at_merge_key();
            let key = self.node()?;
            let value = self.node()?;
            if merge {
                merges.push(value);
                continue;
            }
            let key = key_string(key)?;
            if map.contains_key(&key) {
                return Err(ComposeError::DuplicateKey(key));
            }
            map.insert(key, value);
        }
        self.pos += 1;

        // Explicit keys win; among merged mappings the earlier one wins.
        for source in merges {
            let sources = match source {
                Value::Object(object) => vec![object],
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(object) => Ok(object),
                        _ => Err(ComposeError::InvalidMerge),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                _ => return Err(ComposeError::InvalidMerge),
            };
            for object in sources {
                for (key, value) in object {
                    map.entry(key).or_insert(value);
                }
            }
        }
        Ok(Value::Object(map))
    }

    /// An untagged plain `<<` key.
    fn at_merge_key(&self) -> bool {
        match self.events.get(self.pos) {
            Some(event) if event.kind == EventKind::Scalar(ScalarStyle::Plain) => {
                event.text(self.src) == Some(MERGE_KEY.as_bytes())
            }
            _ => false,
        }
    }
}

fn node_count(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(node_count).sum::<usize>(),
        Value::Object(map) => 1 + map.values().map(node_count).sum::<usize>(),
        _ => 1,
    }
}

fn check_collection_tag(core: Option<CoreTag>, expected: CoreTag) -> Result<(), ComposeError> {
    match core {
        Some(tag) if tag != expected => Err(ComposeError::TagMismatch {
            tag: tag.name(),
            value: if expected == CoreTag::Seq { "sequence" } else { "mapping" }.to_string(),
        }),
        _ => Ok(()),
    }
}

fn scalar(
    style: ScalarStyle,
    text: &str,
    tag: Option<&str>,
    core: Option<CoreTag>,
) -> Result<Value, ComposeError> {
    let resolved = match core {
        Some(core) => core.resolve(text).ok_or_else(|| ComposeError::TagMismatch {
            tag: core.name(),
            value: text.to_string(),
        })?,
        // The non-specific `!` tag forces a string.
        None if tag == Some("") => Scalar::Str,
        None if style == ScalarStyle::Plain => Scalar::resolve(text),
        None => Scalar::Str,
    };
    Ok(match resolved {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Bool(b),
        Scalar::Int(i) => Value::from(i),
        Scalar::Float(f) => Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| ComposeError::NonFinite(text.to_string()))?,
        Scalar::Str => Value::String(text.to_string()),
    })
}

/// JSON object keys are strings; scalar keys of other types use their
/// canonical text.
fn key_string(key: Value) -> Result<String, ComposeError> {
    match key {
        Value::String(s) => Ok(s),
        Value::Null => Ok("null".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(_) | Value::Object(_) => Err(ComposeError::NonScalarKey),
    }
}
