//! Scalar filtering.
//!
//! Quoted, folded and block scalars do not appear verbatim in the source.
//! The grammar engine hands their raw region to the functions here, which
//! write the filtered text into a scratch buffer; the engine then copies it
//! back into the source buffer so payload references stay `(offset, len)`.
//!
//! Filtered text never grows past its raw region except for the `\L` and
//! `\P` escapes (2 source bytes, 3 UTF-8 bytes), which is why the engine
//! has a fallback placement.

use phf::phf_map;

/// Escapes with a fixed replacement, keyed by the byte after `\`.
static ESCAPES: phf::Map<u8, &'static str> = phf_map! {
    b'0' => "\0",
    b'a' => "\u{07}",
    b'b' => "\u{08}",
    b't' => "\t",
    b'\t' => "\t",
    b'n' => "\n",
    b'v' => "\u{0b}",
    b'f' => "\u{0c}",
    b'r' => "\r",
    b'e' => "\u{1b}",
    b' ' => " ",
    b'"' => "\"",
    b'/' => "/",
    b'\\' => "\\",
    b'N' => "\u{85}",
    b'_' => "\u{a0}",
    b'L' => "\u{2028}",
    b'P' => "\u{2029}",
};

/// Where and why filtering failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FilterError {
    pub offset: usize,
    pub message: &'static str,
}

/// Block scalar chomping indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Chomp {
    Strip,
    Clip,
    Keep,
}

/// One line of a block scalar body, with indentation already removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockLine {
    Empty,
    Content {
        start: usize,
        end: usize,
        /// Starts with whitespace after the indentation (never folded).
        more_indented: bool,
    },
}

/// Length of the line break at `i`: 1 for `\n`, 2 for `\r\n`, else 0.
#[inline]
pub(crate) fn break_len(src: &[u8], i: usize) -> usize {
    match src.get(i) {
        Some(b'\n') => 1,
        Some(b'\r') if src.get(i + 1) == Some(&b'\n') => 2,
        _ => 0,
    }
}

#[inline]
fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Fold the line break at `i` and any empty lines after it.
///
/// Returns the index of the first non-blank byte on the next non-empty line.
fn fold_break(src: &[u8], mut i: usize, end: usize, out: &mut Vec<u8>) -> usize {
    i += break_len(src, i);
    let mut empty_lines = 0;
    loop {
        while i < end && is_blank(src[i]) {
            i += 1;
        }
        let len = if i < end { break_len(src, i) } else { 0 };
        if len == 0 {
            break;
        }
        empty_lines += 1;
        i += len;
    }
    if empty_lines == 0 {
        out.push(b' ');
    } else {
        out.extend(std::iter::repeat(b'\n').take(empty_lines));
    }
    i
}

/// Join the lines of a multi-line plain scalar.
///
/// `segments` holds `(empty_lines_before, start, end)` for every line after
/// the first; `first` is the first line's trimmed range.
pub(crate) fn fold_plain(
    src: &[u8],
    first: (usize, usize),
    segments: &[(usize, usize, usize)],
    out: &mut Vec<u8>,
) {
    out.extend_from_slice(&src[first.0..first.1]);
    for &(empty_lines, start, end) in segments {
        if empty_lines == 0 {
            out.push(b' ');
        } else {
            out.extend(std::iter::repeat(b'\n').take(empty_lines));
        }
        out.extend_from_slice(&src[start..end]);
    }
}

/// Filter the body of a single-quoted scalar (`start..end` excludes quotes).
pub(crate) fn filter_single_quoted(src: &[u8], start: usize, end: usize, out: &mut Vec<u8>) {
    let mut keep = out.len();
    let mut i = start;
    while i < end {
        let b = src[i];
        if b == b'\'' {
            // Only doubled quotes survive the scan.
            out.push(b'\'');
            keep = out.len();
            i += 2;
        } else if break_len(src, i) > 0 {
            out.truncate(keep);
            i = fold_break(src, i, end, out);
            keep = out.len();
        } else {
            out.push(b);
            if !is_blank(b) {
                keep = out.len();
            }
            i += 1;
        }
    }
}

/// Filter the body of a double-quoted scalar (`start..end` excludes quotes).
pub(crate) fn filter_double_quoted(
    src: &[u8],
    start: usize,
    end: usize,
    out: &mut Vec<u8>,
) -> Result<(), FilterError> {
    let mut keep = out.len();
    let mut i = start;
    while i < end {
        let b = src[i];
        if b == b'\\' {
            let Some(&escape) = src.get(i + 1).filter(|_| i + 1 < end) else {
                return Err(FilterError { offset: i, message: "unterminated escape sequence" });
            };
            if break_len(src, i + 1) > 0 {
                // Escaped line break: join without a space.
                i += 1 + break_len(src, i + 1);
                while i < end && is_blank(src[i]) {
                    i += 1;
                }
                keep = out.len();
                continue;
            }
            if let Some(text) = ESCAPES.get(&escape) {
                out.extend_from_slice(text.as_bytes());
                i += 2;
            } else {
                let digits = match escape {
                    b'x' => 2,
                    b'u' => 4,
                    b'U' => 8,
                    _ => return Err(FilterError { offset: i, message: "invalid escape sequence" }),
                };
                let hex = src.get(i + 2..i + 2 + digits).filter(|_| i + 2 + digits <= end);
                let ch = hex
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .and_then(char::from_u32)
                    .ok_or(FilterError { offset: i, message: "invalid unicode escape" })?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                i += 2 + digits;
            }
            keep = out.len();
        } else if break_len(src, i) > 0 {
            out.truncate(keep);
            i = fold_break(src, i, end, out);
            keep = out.len();
        } else {
            out.push(b);
            if !is_blank(b) {
                keep = out.len();
            }
            i += 1;
        }
    }
    Ok(())
}

/// Assemble a literal (`|`) or folded (`>`) block scalar.
///
/// `last_break` tells whether the final content line ended with a line
/// break; without one, even clip and keep chomping add no newline.
pub(crate) fn filter_block(
    src: &[u8],
    lines: &[BlockLine],
    folded: bool,
    chomp: Chomp,
    last_break: bool,
    out: &mut Vec<u8>,
) {
    let last_content = lines
        .iter()
        .rposition(|line| matches!(line, BlockLine::Content { .. }));
    let Some(last_content) = last_content else {
        if chomp == Chomp::Keep {
            out.extend(std::iter::repeat(b'\n').take(lines.len()));
        }
        return;
    };
    let trailing = lines.len() - last_content - 1;

    if folded {
        let mut previous: Option<bool> = None;
        let mut empty_lines = 0;
        for line in &lines[..=last_content] {
            match *line {
                BlockLine::Empty => empty_lines += 1,
                BlockLine::Content { start, end, more_indented } => {
                    match previous {
                        None => out.extend(std::iter::repeat(b'\n').take(empty_lines)),
                        Some(prev_more) if !prev_more && !more_indented => {
                            if empty_lines == 0 {
                                out.push(b' ');
                            } else {
                                out.extend(std::iter::repeat(b'\n').take(empty_lines));
                            }
                        }
                        Some(_) => out.extend(std::iter::repeat(b'\n').take(empty_lines + 1)),
                    }
                    out.extend_from_slice(&src[start..end]);
                    previous = Some(more_indented);
                    empty_lines = 0;
                }
            }
        }
    } else {
        for (n, line) in lines[..=last_content].iter().enumerate() {
            match *line {
                BlockLine::Empty => out.push(b'\n'),
                BlockLine::Content { start, end, .. } => {
                    out.extend_from_slice(&src[start..end]);
                    if n < last_content {
                        out.push(b'\n');
                    }
                }
            }
        }
    }

    match chomp {
        Chomp::Strip => {}
        Chomp::Clip => {
            if last_break {
                out.push(b'\n');
            }
        }
        Chomp::Keep => {
            if last_break {
                out.push(b'\n');
            }
            out.extend(std::iter::repeat(b'\n').take(trailing));
        }
    }
}
