//! ysparse core
//!
//! YAML documents as flat, fixed-width event streams written into
//! caller-sized buffers, plus isolated evaluation of documents into data.
//!
//! # Architecture
//!
//! - **event.rs** - Event model and the canonical wire flag layout
//! - **parser.rs** - Grammar engine emitting events, filtering scalars in place
//! - **scalar.rs** - Escape, folding and chomping filters
//! - **buffer.rs** - Bounded buffers, the grow-and-retry exchange, event streams
//! - **context.rs** - `EventParser`, the reusable handle retaining the last result
//! - **isolate.rs** - Runtime and single-use evaluation contexts
//! - **tree.rs** / **value.rs** - Composition of events into JSON data
//! - **envelope.rs** - The `{data|error}` result envelope
//! - **edn.rs** - EDN rendering of event streams
//! - **span.rs** / **error.rs** - Locations and error types
//! - **config.rs** / **trace.rs** - Environment configuration and debug tracing
//!
//! # Example
//!
//! ```
//! use ysparse_core::{flags, EventParser};
//!
//! let mut parser = EventParser::new();
//! let mut src = b"a: 1".to_vec();
//! let mut cells = [0i32; 4];
//!
//! // Too small: the first events are written and the full size reported.
//! let exchange = parser.parse(&mut src, &mut cells).unwrap();
//! assert_eq!(exchange.required_size, 12);
//!
//! let mut cells = vec![0; exchange.required_size];
//! parser.fetch_last_result(&mut cells).unwrap();
//! assert_eq!(&cells[3..6], &[flags::KEY_ | flags::SCLR | flags::PLAI, 0, 1]);
//! ```

pub mod buffer;
pub mod config;
pub mod context;
pub mod edn;
pub mod envelope;
pub mod error;
pub mod event;
pub mod isolate;
pub mod parser;
mod scalar;
pub mod span;
pub mod trace;
pub mod tree;
pub mod value;

use serde::de::DeserializeOwned;

pub use buffer::{BufferExchange, ByteOrder, EventStream, NativeBuffer};
pub use config::{Config, ParseOptions};
pub use context::{EventParser, MAX_SOURCE_LEN};
pub use edn::TextExchange;
pub use envelope::Envelope;
pub use error::{ConfigError, Error, ErrorKind, ParseError, ProtocolError};
pub use event::{flags, Decoder, Event, EventKind, Layout, Role, ScalarStyle};
pub use isolate::{Isolate, IsolateState, Runtime};
pub use span::{LineIndex, Location, Span};
pub use tree::ComposeError;

/// Evaluate `src` in a fresh isolate of the global runtime and return the
/// envelope text.
pub fn evaluate(src: &str) -> Result<String, Error> {
    Runtime::global()?.with_isolate(|isolate| isolate.evaluate(src))
}

/// Evaluate `src` and deserialize the envelope's data into `T`.
///
/// An error envelope becomes [`Error::Evaluation`].
pub fn load<T: DeserializeOwned>(src: &str) -> Result<T, Error> {
    let text = evaluate(src)?;
    let value = Envelope::from_json(&text)?.into_result()?;
    serde_json::from_value(value).map_err(|e| Error::Evaluation(e.to_string()))
}
