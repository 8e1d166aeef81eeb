//! Reusable parser handle holding the retry state.

use std::hash::{BuildHasher, Hasher};

use ahash::RandomState;
use tracing::{debug, trace};

use crate::buffer::{write_events, BufferExchange, NativeBuffer};
use crate::config::ParseOptions;
use crate::edn::{self, write_text, TextExchange};
use crate::error::{ConfigError, Error, ProtocolError};
use crate::event::{cell_total, Event};
use crate::parser::parse_events;

/// Largest source whose offsets fit in a wire cell.
pub const MAX_SOURCE_LEN: usize = i32::MAX as usize;

// Fixed seeds: fingerprints only need to be stable within one parser.
const FINGERPRINT_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// The result of the most recent successful parse.
#[derive(Debug)]
struct LastAttempt {
    events: Vec<Event>,
    required_size: usize,
    /// Address, length and hash of the source *after* in-place filtering.
    addr: usize,
    len: usize,
    fingerprint: u64,
}

/// Parses sources into bounded event buffers and retains the last result.
///
/// The retained result is what makes the retry protocol cheap: after a
/// parse reported a `required_size` larger than the buffer it was given,
/// [`fetch_last_result`](Self::fetch_last_result) re-encodes the same
/// events into a bigger buffer without scanning again. Because the source
/// was filtered in place, scanning it a second time would see different
/// bytes; resubmitting the same buffer, unchanged since it was filtered,
/// is therefore served from the retained result as well. Any other buffer
/// is parsed afresh, even when its bytes equal the filtered source.
///
/// Only the most recent result is kept. Fetching after an intervening
/// parse of another source returns that other source's events.
///
/// [`parse_edn`](Self::parse_edn) renders the same events as EDN text and
/// follows the same protocol in bytes, with
/// [`fetch_last_edn`](Self::fetch_last_edn) as its retry.
#[derive(Debug)]
pub struct EventParser {
    options: ParseOptions,
    scratch: Vec<u8>,
    hasher: RandomState,
    last: Option<LastAttempt>,
    edn: Option<String>,
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EventParser {
    pub fn new() -> Self {
        Self::with_options(ParseOptions::default())
    }

    pub fn with_options(options: ParseOptions) -> Self {
        let [k0, k1, k2, k3] = FINGERPRINT_SEEDS;
        Self {
            options,
            scratch: Vec::new(),
            hasher: RandomState::with_seeds(k0, k1, k2, k3),
            last: None,
            edn: None,
        }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Name reported in subsequent parse errors.
    pub fn set_filename(&mut self, filename: Option<&str>) {
        self.options.filename = filename.map(str::to_owned);
    }

    /// Parse `src` into `out`.
    ///
    /// Writes the longest prefix of complete events that fits and returns
    /// the total number of cells the result needs. Scalars needing
    /// filtering are rewritten inside `src`, and event payloads refer to
    /// the rewritten bytes. On error nothing is retained.
    pub fn parse(&mut self, src: &mut [u8], out: &mut [i32]) -> Result<BufferExchange, Error> {
        trace!(src = %String::from_utf8_lossy(src), "parse input");
        let last = self.attempt(src)?;
        let exchange = write_events(&last.events, out);
        debug!(
            len = src.len(),
            capacity = exchange.capacity,
            required = exchange.required_size,
            events = exchange.events_written,
            "parse"
        );
        Ok(exchange)
    }

    /// Parse into an externally managed buffer.
    ///
    /// The buffer position is set to the required size when the whole
    /// result fit, and left at zero otherwise.
    pub fn parse_native(
        &mut self,
        src: &mut [u8],
        out: &mut NativeBuffer<'_>,
    ) -> Result<BufferExchange, Error> {
        out.set_position(0);
        let exchange = self.parse(src, out.cells_mut())?;
        if exchange.is_complete() {
            out.set_position(exchange.required_size);
        }
        Ok(exchange)
    }

    /// Re-encode the retained result of the last successful parse.
    ///
    /// Fails with [`ProtocolError::NoPreviousAttempt`] if there is none.
    pub fn fetch_last_result(&mut self, out: &mut [i32]) -> Result<BufferExchange, Error> {
        let last = self.last.as_ref().ok_or(ProtocolError::NoPreviousAttempt)?;
        let exchange = write_events(&last.events, out);
        debug_assert_eq!(exchange.required_size, last.required_size);
        trace!(
            capacity = exchange.capacity,
            required = exchange.required_size,
            "fetch last result"
        );
        Ok(exchange)
    }

    /// Parse `src` and write its EDN rendering, NUL-terminated, into `out`.
    ///
    /// Returns the bytes the whole text needs. The text is written only when
    /// it fits; otherwise a non-empty `out` receives an empty string and
    /// the caller retries with [`fetch_last_edn`](Self::fetch_last_edn).
    pub fn parse_edn(&mut self, src: &mut [u8], out: &mut [u8]) -> Result<TextExchange, Error> {
        trace!(src = %String::from_utf8_lossy(src), "parse_edn input");
        self.attempt(src)?;
        let text = match (self.edn.take(), &self.last) {
            (Some(text), _) => text,
            (None, Some(last)) => edn::render(&last.events, src)?,
            (None, None) => return Err(ProtocolError::NoPreviousAttempt.into()),
        };
        let exchange = write_text(&text, out);
        debug!(
            len = src.len(),
            capacity = exchange.capacity,
            required = exchange.required_size,
            "parse_edn"
        );
        self.edn = Some(text);
        Ok(exchange)
    }

    /// Write the EDN text of the last successful [`parse_edn`](Self::parse_edn).
    ///
    /// Fails with [`ProtocolError::NoPreviousAttempt`] if there is none or
    /// another source was parsed since.
    pub fn fetch_last_edn(&self, out: &mut [u8]) -> Result<TextExchange, Error> {
        let text = self.edn.as_deref().ok_or(ProtocolError::NoPreviousAttempt)?;
        let exchange = write_text(text, out);
        trace!(capacity = exchange.capacity, required = exchange.required_size, "fetch last edn");
        Ok(exchange)
    }

    /// EDN text of the last successful [`parse_edn`](Self::parse_edn).
    pub fn last_edn(&self) -> Option<&str> {
        self.edn.as_deref()
    }

    /// Events of the last successful parse.
    pub fn last_events(&self) -> Option<&[Event]> {
        self.last.as_ref().map(|last| last.events.as_slice())
    }

    fn fingerprint(&self, src: &[u8]) -> u64 {
        let mut hasher = self.hasher.build_hasher();
        hasher.write(src);
        hasher.finish()
    }

    fn attempt(&mut self, src: &mut [u8]) -> Result<&LastAttempt, Error> {
        if src.len() > MAX_SOURCE_LEN {
            self.last = None;
            self.edn = None;
            return Err(ConfigError::SourceTooLarge { len: src.len(), max: MAX_SOURCE_LEN }.into());
        }

        let addr = src.as_ptr() as usize;
        let fingerprint = self.fingerprint(src);
        let retained = matches!(
            &self.last,
            Some(last) if last.addr == addr
                && last.len == src.len()
                && last.fingerprint == fingerprint
        );
        if retained {
            trace!(len = src.len(), "source is the retained filtered buffer");
        } else {
            self.last = None;
            self.edn = None;
            let events = parse_events(src, &self.options, &mut self.scratch)?;
            let required_size = cell_total(&events);
            let fingerprint = self.fingerprint(src);
            self.last =
                Some(LastAttempt { events, required_size, addr, len: src.len(), fingerprint });
        }
        self.last.as_ref().ok_or_else(|| ProtocolError::NoPreviousAttempt.into())
    }
}
