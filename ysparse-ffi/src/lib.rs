//! C ABI for ysparse.
//!
//! Mirrors `include/ysparse.h`. Sizes, offsets and cells cross the boundary
//! as `int32_t`; a negative return value means failure, and the details of
//! a failed parser call are available from [`ysparse_last_error`].
//!
//! No panic unwinds into the caller: every entry point runs under
//! `catch_unwind` and reports a caught panic as a failure.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;

use tracing::{debug, error};
use ysparse_core::{
    flags, ByteOrder, ConfigError, Envelope, Error, EventParser, Isolate,
    NativeBuffer, ProtocolError, Runtime,
};

/// Returned by integer entry points on failure.
pub const YSPARSE_ERROR: i32 = -1;

pub const YSPARSE_LITTLE_ENDIAN: i32 = 0;
pub const YSPARSE_BIG_ENDIAN: i32 = 1;

/// A parser handle. Not safe to share between threads without external
/// locking.
pub struct ysparse_parser {
    inner: EventParser,
    last_error: Option<LastError>,
}

/// Owned copy of the last failure, so the message pointer handed to C
/// stays valid until the next call on the same parser.
struct LastError {
    kind: i32,
    offset: i32,
    line: i32,
    column: i32,
    message: CString,
}

impl LastError {
    fn new(err: &Error) -> Self {
        let (offset, line, column) = match err.as_parse() {
            Some(e) => (e.offset() as i32, e.line() as i32, e.column() as i32),
            None => (-1, -1, -1),
        };
        Self { kind: err.kind() as i32, offset, line, column, message: c_string(err.to_string()) }
    }
}

/// Error details as seen by C. Location fields are -1 unless the error is
/// a parse error.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ysparse_error {
    pub kind: i32,
    pub offset: i32,
    pub line: i32,
    pub column: i32,
    pub message: *const c_char,
}

/// An evaluation context handle.
pub struct ysparse_isolate {
    inner: Isolate,
}

impl ysparse_parser {
    fn record(&mut self, result: Result<i32, Error>) -> i32 {
        match result {
            Ok(size) => {
                self.last_error = None;
                size
            }
            Err(e) => {
                debug!(error = %e, "parser call failed");
                self.last_error = Some(LastError::new(&e));
                YSPARSE_ERROR
            }
        }
    }
}

fn guard<T>(entry: &'static str, fallback: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error!(entry, "panic caught at the C boundary");
            fallback
        }
    }
}

/// NUL bytes cannot cross as C strings; they become `?`.
fn c_string(text: String) -> CString {
    CString::new(text).unwrap_or_else(|e| {
        let bytes = e.into_vec().into_iter().map(|b| if b == 0 { b'?' } else { b }).collect::<Vec<_>>();
        CString::new(bytes).unwrap_or_default()
    })
}

fn invalid(name: &'static str, value: impl ToString) -> Error {
    ConfigError::InvalidSetting { name, value: value.to_string() }.into()
}

fn wire_size(required_size: usize) -> Result<i32, Error> {
    i32::try_from(required_size).map_err(|_| invalid("required_size", required_size))
}

unsafe fn raw_slice<'a, T>(ptr: *mut T, len: i32, name: &'static str) -> Result<&'a mut [T], Error> {
    let len = usize::try_from(len).map_err(|_| invalid(name, len))?;
    if len == 0 {
        return Ok(Default::default());
    }
    if ptr.is_null() {
        return Err(invalid(name, "null pointer with a non-zero length"));
    }
    Ok(slice::from_raw_parts_mut(ptr, len))
}

unsafe fn set_filename(parser: &mut EventParser, filename: *const c_char) {
    let name = (!filename.is_null()).then(|| CStr::from_ptr(filename).to_string_lossy());
    parser.set_filename(name.as_deref());
}

// ============================================================================
// Parser
// ============================================================================

/// Create a parser. Returns NULL if the process configuration is invalid.
#[no_mangle]
pub extern "C" fn ysparse_init() -> *mut ysparse_parser {
    guard("ysparse_init", ptr::null_mut(), || match Runtime::global() {
        Ok(runtime) => Box::into_raw(Box::new(ysparse_parser {
            inner: EventParser::with_options(runtime.config().parse.clone()),
            last_error: None,
        })),
        Err(e) => {
            error!(error = %e, "ysparse_init failed");
            ptr::null_mut()
        }
    })
}

/// Destroy a parser.
///
/// # Safety
/// `parser` must be NULL or a handle from [`ysparse_init`] not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn ysparse_destroy(parser: *mut ysparse_parser) {
    guard("ysparse_destroy", (), || {
        if !parser.is_null() {
            drop(Box::from_raw(parser));
        }
    })
}

/// Parse `src` into `evt` and return the number of cells the whole result
/// needs, or -1.
///
/// Scalars are filtered inside `src`. If the result is larger than
/// `evt_len`, grow the buffer and call [`ysparse_retry_get`]. `evt` may be
/// NULL when `evt_len` is 0. `filename` may be NULL.
///
/// # Safety
/// `parser` must be a live handle; `src` and `evt` must be valid for
/// `src_len` bytes and `evt_len` cells; `filename` must be NULL or
/// NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ysparse_parse(
    parser: *mut ysparse_parser,
    filename: *const c_char,
    src: *mut c_char,
    src_len: i32,
    evt: *mut i32,
    evt_len: i32,
) -> i32 {
    guard("ysparse_parse", YSPARSE_ERROR, || {
        let Some(parser) = parser.as_mut() else {
            return YSPARSE_ERROR;
        };
        let result = parse_into(&mut parser.inner, filename, src.cast(), src_len, evt, evt_len);
        parser.record(result)
    })
}

unsafe fn parse_into(
    parser: &mut EventParser,
    filename: *const c_char,
    src: *mut u8,
    src_len: i32,
    evt: *mut i32,
    evt_len: i32,
) -> Result<i32, Error> {
    let src = raw_slice(src, src_len, "src_len")?;
    let out = raw_slice(evt, evt_len, "evt_len")?;
    set_filename(parser, filename);
    let exchange = parser.parse(src, out)?;
    wire_size(exchange.required_size)
}

/// Like [`ysparse_parse`], writing into a caller-managed byte buffer that
/// is reinterpreted in place as cells.
///
/// The buffer must be 4-byte aligned, a whole number of cells long and in
/// the host byte order (`YSPARSE_LITTLE_ENDIAN` or `YSPARSE_BIG_ENDIAN`).
///
/// # Safety
/// As for [`ysparse_parse`], with `evt_bytes` valid for `evt_nbytes` bytes.
#[no_mangle]
pub unsafe extern "C" fn ysparse_parse_buf(
    parser: *mut ysparse_parser,
    filename: *const c_char,
    src: *mut c_char,
    src_len: i32,
    evt_bytes: *mut u8,
    evt_nbytes: i32,
    byte_order: i32,
) -> i32 {
    guard("ysparse_parse_buf", YSPARSE_ERROR, || {
        let Some(parser) = parser.as_mut() else {
            return YSPARSE_ERROR;
        };
        let result = parse_into_bytes(
            &mut parser.inner,
            filename,
            src.cast(),
            src_len,
            evt_bytes,
            evt_nbytes,
            byte_order,
        );
        parser.record(result)
    })
}

unsafe fn parse_into_bytes(
    parser: &mut EventParser,
    filename: *const c_char,
    src: *mut u8,
    src_len: i32,
    evt_bytes: *mut u8,
    evt_nbytes: i32,
    byte_order: i32,
) -> Result<i32, Error> {
    let order = match byte_order {
        YSPARSE_LITTLE_ENDIAN => ByteOrder::Little,
        YSPARSE_BIG_ENDIAN => ByteOrder::Big,
        other => return Err(invalid("byte_order", other)),
    };
    let src = raw_slice(src, src_len, "src_len")?;
    let bytes = raw_slice(evt_bytes, evt_nbytes, "evt_nbytes")?;
    let mut out = NativeBuffer::new(bytes, order)?;
    set_filename(parser, filename);
    let exchange = parser.parse_native(src, &mut out)?;
    wire_size(exchange.required_size)
}

/// Write the retained result of the last successful parse into `evt` and
/// return its size in cells, or -1 if there is none.
///
/// # Safety
/// `parser` must be a live handle and `evt` valid for `evt_len` cells.
#[no_mangle]
pub unsafe extern "C" fn ysparse_retry_get(
    parser: *mut ysparse_parser,
    evt: *mut i32,
    evt_len: i32,
) -> i32 {
    guard("ysparse_retry_get", YSPARSE_ERROR, || {
        let Some(parser) = parser.as_mut() else {
            return YSPARSE_ERROR;
        };
        let result = raw_slice(evt, evt_len, "evt_len")
            .and_then(|out| parser.inner.fetch_last_result(out))
            .and_then(|exchange| wire_size(exchange.required_size));
        parser.record(result)
    })
}

/// Parse `src` and write its EDN rendering into `edn` as a NUL-terminated
/// string. Returns the number of bytes the whole text needs, NUL included,
/// or -1.
///
/// The text is written only when it fits. Otherwise `edn[0]` is set to NUL
/// (when `edn_len` > 0): grow the buffer and call [`ysparse_edn_retry_get`].
///
/// # Safety
/// As for [`ysparse_parse`], with `edn` valid for `edn_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn ysparse_parse_edn(
    parser: *mut ysparse_parser,
    filename: *const c_char,
    src: *mut c_char,
    src_len: i32,
    edn: *mut c_char,
    edn_len: i32,
) -> i32 {
    guard("ysparse_parse_edn", YSPARSE_ERROR, || {
        let Some(parser) = parser.as_mut() else {
            return YSPARSE_ERROR;
        };
        let result = parse_into_edn(&mut parser.inner, filename, src.cast(), src_len, edn.cast(), edn_len);
        parser.record(result)
    })
}

unsafe fn parse_into_edn(
    parser: &mut EventParser,
    filename: *const c_char,
    src: *mut u8,
    src_len: i32,
    edn: *mut u8,
    edn_len: i32,
) -> Result<i32, Error> {
    let src = raw_slice(src, src_len, "src_len")?;
    let out = raw_slice(edn, edn_len, "edn_len")?;
    set_filename(parser, filename);
    let exchange = parser.parse_edn(src, out)?;
    wire_size(exchange.required_size)
}

/// Write the EDN text of the last successful [`ysparse_parse_edn`] into
/// `edn` and return its size in bytes, NUL included, or -1 if there is
/// none.
///
/// # Safety
/// `parser` must be a live handle and `edn` valid for `edn_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn ysparse_edn_retry_get(
    parser: *mut ysparse_parser,
    edn: *mut c_char,
    edn_len: i32,
) -> i32 {
    guard("ysparse_edn_retry_get", YSPARSE_ERROR, || {
        let Some(parser) = parser.as_mut() else {
            return YSPARSE_ERROR;
        };
        let result = raw_slice(edn.cast::<u8>(), edn_len, "edn_len")
            .and_then(|out| parser.inner.fetch_last_edn(out))
            .and_then(|exchange| wire_size(exchange.required_size));
        parser.record(result)
    })
}

/// Copy the details of the last failed call on `parser` into `out`.
///
/// Returns 1 if there was a failure, 0 if the last call succeeded and -1
/// on invalid arguments. The message stays valid until the next call on
/// `parser`.
///
/// # Safety
/// `parser` must be a live handle and `out` writable.
#[no_mangle]
pub unsafe extern "C" fn ysparse_last_error(parser: *const ysparse_parser, out: *mut ysparse_error) -> i32 {
    guard("ysparse_last_error", YSPARSE_ERROR, || {
        let (Some(parser), Some(out)) = (parser.as_ref(), out.as_mut()) else {
            return YSPARSE_ERROR;
        };
        match &parser.last_error {
            Some(last) => {
                *out = ysparse_error {
                    kind: last.kind,
                    offset: last.offset,
                    line: last.line,
                    column: last.column,
                    message: last.message.as_ptr(),
                };
                1
            }
            None => {
                *out = ysparse_error { kind: 0, offset: -1, line: -1, column: -1, message: ptr::null() };
                0
            }
        }
    })
}

// ============================================================================
// Isolates
// ============================================================================

/// Create an evaluation context in `*out`. Returns 0, or -1 on failure.
///
/// # Safety
/// `out` must be writable.
#[no_mangle]
pub unsafe extern "C" fn ysparse_create_isolate(out: *mut *mut ysparse_isolate) -> i32 {
    guard("ysparse_create_isolate", YSPARSE_ERROR, || {
        let Some(out) = out.as_mut() else {
            return YSPARSE_ERROR;
        };
        *out = ptr::null_mut();
        match Runtime::global() {
            Ok(runtime) => {
                *out = Box::into_raw(Box::new(ysparse_isolate { inner: runtime.create_isolate() }));
                0
            }
            Err(e) => {
                error!(error = %e, "ysparse_create_isolate failed");
                YSPARSE_ERROR
            }
        }
    })
}

/// Release an isolate and return its teardown status: 0 on success,
/// non-zero if an evaluation was interrupted, -1 on invalid arguments.
///
/// # Safety
/// `isolate` must be a handle from [`ysparse_create_isolate`] not yet torn
/// down.
#[no_mangle]
pub unsafe extern "C" fn ysparse_tear_down_isolate(isolate: *mut ysparse_isolate) -> i32 {
    guard("ysparse_tear_down_isolate", YSPARSE_ERROR, || {
        if isolate.is_null() {
            return YSPARSE_ERROR;
        }
        let isolate = Box::from_raw(isolate);
        match isolate.inner.tear_down() {
            Ok(()) => 0,
            Err(Error::Protocol(ProtocolError::Teardown { status })) => status,
            Err(e) => {
                error!(error = %e, "teardown failed");
                YSPARSE_ERROR
            }
        }
    })
}

/// Evaluate the NUL-terminated `src` and return the `{data|error}`
/// envelope text, to be freed with [`ysparse_free_string`].
///
/// Returns NULL on invalid arguments and when the isolate was already
/// used.
///
/// # Safety
/// `isolate` must be a live handle and `src` NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ysparse_load_to_json(
    isolate: *mut ysparse_isolate,
    src: *const c_char,
) -> *mut c_char {
    guard("ysparse_load_to_json", ptr::null_mut(), || {
        let Some(isolate) = isolate.as_mut() else {
            return ptr::null_mut();
        };
        if src.is_null() {
            return ptr::null_mut();
        }
        let text = match CStr::from_ptr(src).to_str() {
            Ok(source) => isolate.inner.evaluate(source),
            Err(e) => Envelope::Error(format!("source is not valid UTF-8: {e}"))
                .to_json()
                .map_err(Error::from),
        };
        match text {
            Ok(text) => c_string(text).into_raw(),
            Err(e) => {
                error!(error = %e, "ysparse_load_to_json failed");
                ptr::null_mut()
            }
        }
    })
}

/// Free a string returned by [`ysparse_load_to_json`].
///
/// # Safety
/// `s` must be NULL or a string from this library not yet freed.
#[no_mangle]
pub unsafe extern "C" fn ysparse_free_string(s: *mut c_char) {
    guard("ysparse_free_string", (), || {
        if !s.is_null() {
            drop(CString::from_raw(s));
        }
    })
}

/// Version of the event flag layout in `ysparse.h`.
#[no_mangle]
pub extern "C" fn ysparse_format_version() -> u32 {
    flags::FORMAT_VERSION
}
