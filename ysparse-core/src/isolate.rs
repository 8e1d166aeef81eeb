//! Execution contexts for evaluation.
//!
//! Every evaluation runs in its own [`Isolate`], created from the
//! process-wide [`Runtime`] and torn down afterwards. An isolate is good
//! for exactly one evaluation:
//!
//! ```text
//! create_isolate      evaluate()            tear_down()
//!   ──▶ Created ──▶ Active ──▶ Finished ──▶ TornDown
//!                     │                       ▲
//!                     └─── (panic) ───────────┘ status 1
//! ```
//!
//! Isolates are never pooled or reused.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde_json::Value;
use tracing::{debug, warn};

use crate::buffer::EventStream;
use crate::config::Config;
use crate::context::EventParser;
use crate::envelope::Envelope;
use crate::error::{Error, ProtocolError};
use crate::tree::compose;

/// Teardown status of an isolate whose evaluation never completed.
pub const STATUS_INTERRUPTED: i32 = 1;

static GLOBAL: OnceLock<Runtime> = OnceLock::new();

/// Lifecycle state of an [`Isolate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolateState {
    Created,
    Active,
    Finished,
    TornDown,
}

/// Process-wide evaluation runtime.
///
/// Created once and shared read-only; it is never torn down while the
/// process runs.
#[derive(Debug)]
pub struct Runtime {
    config: Config,
    next_id: AtomicU64,
}

impl Runtime {
    pub fn new(config: Config) -> Self {
        Self { config, next_id: AtomicU64::new(1) }
    }

    /// The shared runtime, configured from the environment on first use.
    ///
    /// Installs the debug tracing subscriber when `YSPARSE_DEBUG` is set.
    pub fn global() -> Result<&'static Runtime, Error> {
        if let Some(runtime) = GLOBAL.get() {
            return Ok(runtime);
        }
        let config = Config::from_env()?;
        if crate::trace::init(&config) {
            debug!("debug tracing enabled");
        }
        Ok(GLOBAL.get_or_init(|| Runtime::new(config)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn create_isolate(&self) -> Isolate {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, "isolate created");
        Isolate {
            id,
            state: IsolateState::Created,
            parser: EventParser::with_options(self.config.parse.clone()),
            initial_capacity: self.config.initial_event_capacity,
            max_alias_nodes: self.config.max_alias_nodes,
        }
    }

    /// Run `f` in a fresh isolate and tear it down on every exit path.
    ///
    /// A panic inside `f` is caught and reported as an error. A failed
    /// teardown takes precedence over the result of `f`.
    pub fn with_isolate<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Isolate) -> Result<T, Error>,
    {
        let mut isolate = self.create_isolate();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&mut isolate)));
        let teardown = isolate.tear_down();
        match (outcome, teardown) {
            (_, Err(e)) => Err(e),
            (Ok(result), Ok(())) => result,
            (Err(_), Ok(())) => Err(Error::Evaluation("evaluation panicked".to_string())),
        }
    }
}

/// A single-use evaluation context.
#[derive(Debug)]
pub struct Isolate {
    id: u64,
    state: IsolateState,
    parser: EventParser,
    initial_capacity: usize,
    max_alias_nodes: usize,
}

impl Isolate {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> IsolateState {
        self.state
    }

    /// Evaluate `source` and return the result envelope text.
    ///
    /// Parse and composition failures are reported inside the envelope.
    /// `Err` is reserved for misuse of the isolate and for protocol
    /// failures of the event buffer exchange.
    pub fn evaluate(&mut self, source: &str) -> Result<String, Error> {
        if self.state != IsolateState::Created {
            return Err(ProtocolError::ContextReused { id: self.id }.into());
        }
        self.state = IsolateState::Active;
        debug!(id = self.id, len = source.len(), "evaluate");

        let loaded = self.load(source);
        self.finish(loaded)
    }

    /// Turn a load result into envelope text and end the evaluation.
    ///
    /// A fatal error still completes the evaluation, so it is returned as
    /// is and not masked by a teardown failure.
    fn finish(&mut self, loaded: Result<Value, Error>) -> Result<String, Error> {
        self.state = IsolateState::Finished;
        let envelope = match loaded {
            Err(e) if e.is_fatal() => {
                debug!(id = self.id, error = %e, "evaluation failed");
                return Err(e);
            }
            result => Envelope::from(result),
        };
        let text = envelope.to_json()?;
        debug!(id = self.id, envelope = %text, "evaluated");
        Ok(text)
    }

    fn load(&mut self, source: &str) -> Result<Value, Error> {
        let mut src = source.as_bytes().to_vec();
        let stream = EventStream::collect(&mut self.parser, &mut src, self.initial_capacity)?;
        let events = stream.events()?;
        Ok(compose(&events, &src, self.max_alias_nodes)?)
    }

    /// Release the isolate.
    ///
    /// Fails with [`ProtocolError::Teardown`] when the status is non-zero,
    /// i.e. an evaluation was started but never completed.
    pub fn tear_down(mut self) -> Result<(), Error> {
        match self.release() {
            0 => Ok(()),
            status => Err(ProtocolError::Teardown { status }.into()),
        }
    }

    fn release(&mut self) -> i32 {
        let status = match self.state {
            IsolateState::Active => STATUS_INTERRUPTED,
            _ => 0,
        };
        self.state = IsolateState::TornDown;
        debug!(id = self.id, status, "isolate torn down");
        status
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        if self.state == IsolateState::TornDown {
            return;
        }
        let status = self.release();
        if status != 0 {
            warn!(id = self.id, status, "isolate dropped with a non-zero teardown status");
        }
    }
}
