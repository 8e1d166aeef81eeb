//! Bounded event buffers and the grow-and-retry protocol.
//!
//! Callers hand in a fixed-size cell buffer. A parse writes the longest
//! prefix of *complete* events that fits and always reports the total
//! number of cells the full result needs. A caller whose buffer was too
//! small resizes to exactly that size and fetches the retained result
//! (see [`EventParser::fetch_last_result`]) instead of parsing again.
//!
//! ```text
//!  caller                         EventParser
//!    │──parse(src, [cap])────────────▶│  scan, filter src in place, retain
//!    │◀──required_size (> cap)────────│
//!    │  resize to required_size       │
//!    │──fetch_last_result([req])─────▶│  re-encode retained events
//!    │◀──required_size────────────────│
//! ```

use tracing::debug;

use crate::context::EventParser;
use crate::error::{ConfigError, Error, ProtocolError};
use crate::event::{Decoder, Event};

/// Outcome of writing a result into a bounded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferExchange {
    /// Cells the caller offered.
    pub capacity: usize,
    /// Cells the complete result needs.
    pub required_size: usize,
    /// Complete events written to the front of the buffer.
    pub events_written: usize,
    /// Cells occupied by those events.
    pub cells_written: usize,
}

impl BufferExchange {
    /// The whole result is in the buffer.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.required_size <= self.capacity
    }
}

/// Write the longest prefix of whole events that fits into `out`.
///
/// An event is never split: a three-cell event that finds only one or two
/// free cells stops the write.
pub(crate) fn write_events(events: &[Event], out: &mut [i32]) -> BufferExchange {
    let mut cells_written = 0;
    let mut events_written = 0;
    let mut required_size = 0;
    let mut full = false;
    for event in events {
        let cells = event.cell_count();
        if !full && cells_written + cells <= out.len() {
            event.encode_into(&mut out[cells_written..]);
            cells_written += cells;
            events_written += 1;
        } else {
            // Later events stay unwritten so the buffer holds a prefix.
            full = true;
        }
        required_size += cells;
    }
    BufferExchange { capacity: out.len(), required_size, events_written, cells_written }
}

// ============================================================================
// Externally managed buffers
// ============================================================================

/// Byte order a foreign buffer declares for its cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the running host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

/// A cell buffer viewed in place over foreign-owned bytes.
///
/// Mirrors a direct byte buffer handed across a runtime boundary: no copy
/// is made, so the bytes must be 4-byte aligned, a whole number of cells
/// and in host byte order.
#[derive(Debug)]
pub struct NativeBuffer<'b> {
    cells: &'b mut [i32],
    position: usize,
}

impl<'b> NativeBuffer<'b> {
    pub fn new(bytes: &'b mut [u8], order: ByteOrder) -> Result<Self, ConfigError> {
        if order != ByteOrder::native() {
            return Err(ConfigError::ByteOrderMismatch);
        }
        let cells = bytemuck::try_cast_slice_mut::<u8, i32>(bytes)
            .map_err(|e| ConfigError::NotZeroCopy { reason: format!("{e:?}") })?;
        Ok(Self { cells, position: 0 })
    }

    /// Capacity in cells.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Cells holding a complete result after the last successful write;
    /// zero when the result did not fit.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn as_cells(&self) -> &[i32] {
        &*self.cells
    }

    #[inline]
    pub(crate) fn cells_mut(&mut self) -> &mut [i32] {
        &mut *self.cells
    }

    #[inline]
    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}

// ============================================================================
// Owned event streams
// ============================================================================

/// A complete event stream in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventStream {
    cells: Vec<i32>,
}

impl EventStream {
    /// Parse `src` with the two-phase protocol, starting from a buffer of
    /// `initial_capacity` cells and growing it once to the announced size.
    pub fn collect(
        parser: &mut EventParser,
        src: &mut [u8],
        initial_capacity: usize,
    ) -> Result<Self, Error> {
        let mut cells = vec![0; initial_capacity];
        let first = parser.parse(src, &mut cells)?;
        if !first.is_complete() {
            debug!(
                capacity = first.capacity,
                required = first.required_size,
                "event buffer too small, fetching retained result"
            );
            cells.resize(first.required_size, 0);
            let second = parser.fetch_last_result(&mut cells)?;
            if second.required_size != first.required_size || !second.is_complete() {
                return Err(ProtocolError::SizeMismatch {
                    expected: first.required_size,
                    actual: second.required_size,
                }
                .into());
            }
        }
        cells.truncate(first.required_size);
        Ok(Self { cells })
    }

    /// Wrap cells received from elsewhere; they are validated on iteration.
    pub fn from_cells(cells: Vec<i32>) -> Self {
        Self { cells }
    }

    #[inline]
    pub fn cells(&self) -> &[i32] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<i32> {
        self.cells
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> Decoder<'_> {
        Decoder::new(&self.cells)
    }

    /// Decode every event, failing on the first malformed one.
    pub fn events(&self) -> Result<Vec<Event>, ProtocolError> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = Result<Event, ProtocolError>;
    type IntoIter = Decoder<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Layout, Role, ScalarStyle};
    use crate::span::Span;

    fn sample() -> Vec<Event> {
        vec![
            Event::begin_stream(),
            Event::begin_document(false),
            Event::begin_mapping(Role::Value, Layout::Block),
            Event::scalar(Role::Key, ScalarStyle::Plain, Span::new(0, 1)),
            Event::scalar(Role::Value, ScalarStyle::Plain, Span::new(3, 4)),
            Event::end_mapping(),
            Event::end_document(false),
            Event::end_stream(),
        ]
    }

    #[test]
    fn test_write_fits() {
        let mut out = [0; 16];
        let exchange = write_events(&sample(), &mut out);
        assert!(exchange.is_complete());
        assert_eq!(exchange.required_size, 12);
        assert_eq!(exchange.cells_written, 12);
        assert_eq!(exchange.events_written, 8);
    }

    #[test]
    fn test_write_never_splits_an_event() {
        // Three cells of structure, then a scalar needing three more.
        let mut out = [0; 5];
        let exchange = write_events(&sample(), &mut out);
        assert!(!exchange.is_complete());
        assert_eq!(exchange.required_size, 12);
        assert_eq!(exchange.events_written, 3);
        assert_eq!(exchange.cells_written, 3);
        assert_eq!(&out[3..], &[0, 0]);
    }

    #[test]
    fn test_write_stays_a_prefix() {
        // After the first scalar is skipped, the one-cell end events that
        // would fit must not be written either.
        let mut out = [0; 4];
        let exchange = write_events(&sample(), &mut out);
        assert_eq!(exchange.events_written, 3);
        assert_eq!(exchange.cells_written, 3);
    }

    #[test]
    fn test_write_zero_capacity() {
        let exchange = write_events(&sample(), &mut []);
        assert_eq!(exchange.required_size, 12);
        assert_eq!(exchange.events_written, 0);
        assert_eq!(exchange.capacity, 0);
    }

    #[test]
    fn test_native_buffer_checks() {
        let foreign = match ByteOrder::native() {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        };
        let mut cells = vec![0i32; 4];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(cells.as_mut_slice());
        assert_eq!(
            NativeBuffer::new(bytes, foreign).unwrap_err(),
            ConfigError::ByteOrderMismatch
        );

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(cells.as_mut_slice());
        let err = NativeBuffer::new(&mut bytes[..15], ByteOrder::native()).unwrap_err();
        assert!(matches!(err, ConfigError::NotZeroCopy { .. }));

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(cells.as_mut_slice());
        let err = NativeBuffer::new(&mut bytes[1..9], ByteOrder::native()).unwrap_err();
        assert!(matches!(err, ConfigError::NotZeroCopy { .. }));

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(cells.as_mut_slice());
        let buffer = NativeBuffer::new(bytes, ByteOrder::native()).unwrap();
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.position(), 0);
    }

    #[test]
    fn test_stream_decodes() {
        let mut cells = Vec::new();
        for event in sample() {
            event.encode(&mut cells);
        }
        let stream = EventStream::from_cells(cells);
        assert_eq!(stream.len(), 12);
        assert_eq!(stream.events().unwrap(), sample());
    }
}
