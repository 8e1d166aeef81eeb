//! Rendering of wire cells for readable comparisons

use crate::common::{ExpectedEvent, TestCase};
use ysparse_core::{flags, EventParser};

/// Parse `input` into a buffer large enough for everything.
///
/// Returns the cells and the source after in-place filtering.
pub fn parse_all(input: &str) -> (Vec<i32>, Vec<u8>) {
    let mut parser = EventParser::new();
    let mut src = input.as_bytes().to_vec();
    let mut cells = vec![0; 8];
    let exchange = parser.parse(&mut src, &mut cells).expect("parse failed");
    cells.resize(exchange.required_size, 0);
    parser.fetch_last_result(&mut cells).expect("fetch failed");
    (cells, src)
}

/// One line per event: `VAL_|SCLR|PLAI 3 1 "1"`.
pub fn render_cells(cells: &[i32], src: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut i = 0;
    while i < cells.len() {
        let word = cells[i];
        if word & flags::HAS_STR != 0 {
            let (start, len) = (cells[i + 1], cells[i + 2]);
            let text = src
                .get(start as usize..(start + len) as usize)
                .map(String::from_utf8_lossy)
                .unwrap_or_else(|| "<out of bounds>".into());
            lines.push(format!("{} {} {} {:?}", flags::describe(word), start, len, text));
            i += 3;
        } else {
            lines.push(flags::describe(word));
            i += 1;
        }
    }
    lines
}

/// The expected events of `case` in the same shape as [`render_cells`].
pub fn render_expected(case: &TestCase) -> Vec<String> {
    case.events
        .iter()
        .map(|event| match event {
            ExpectedEvent::Bare(_) => flags::describe(event.flags()),
            ExpectedEvent::WithPayload(_, start, len, text) => {
                format!("{} {} {} {:?}", flags::describe(event.flags()), start, len, text)
            }
        })
        .collect()
}
