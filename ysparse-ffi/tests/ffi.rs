//! The C entry points, called as a C caller would.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use ysparse::*;
use ysparse_core::flags;

struct Parser(*mut ysparse_parser);

impl Parser {
    fn new() -> Self {
        let p = ysparse_init();
        assert!(!p.is_null());
        Parser(p)
    }

    fn parse(&self, src: &mut [u8], evt: &mut [i32]) -> i32 {
        unsafe {
            ysparse_parse(
                self.0,
                ptr::null(),
                src.as_mut_ptr().cast(),
                src.len() as i32,
                evt.as_mut_ptr(),
                evt.len() as i32,
            )
        }
    }

    fn last_error(&self) -> Option<(i32, i32, i32, i32, String)> {
        let mut out = ysparse_error { kind: 0, offset: 0, line: 0, column: 0, message: ptr::null() };
        match unsafe { ysparse_last_error(self.0, &mut out) } {
            0 => None,
            1 => {
                let message = unsafe { CStr::from_ptr(out.message) }.to_string_lossy().into_owned();
                Some((out.kind, out.offset, out.line, out.column, message))
            }
            status => panic!("ysparse_last_error returned {status}"),
        }
    }
}

impl Drop for Parser {
    fn drop(&mut self) {
        unsafe { ysparse_destroy(self.0) }
    }
}

#[test]
fn too_small_then_retry() {
    let parser = Parser::new();
    let mut src = b"a: 1".to_vec();
    let mut evt = vec![0; 4];
    assert_eq!(parser.parse(&mut src, &mut evt), 12);
    assert_eq!(evt[..2], [flags::BSTR, flags::BDOC]);

    let mut evt = vec![0; 12];
    assert_eq!(unsafe { ysparse_retry_get(parser.0, evt.as_mut_ptr(), 12) }, 12);
    assert_eq!(evt[3..6], [flags::KEY_ | flags::SCLR | flags::PLAI, 0, 1]);
    assert_eq!(evt[6..9], [flags::VAL_ | flags::SCLR | flags::PLAI, 3, 1]);
    assert_eq!(evt[11], flags::ESTR);
    assert_eq!(parser.last_error(), None);
}

#[test]
fn null_buffer_of_length_zero() {
    let parser = Parser::new();
    let mut src = b"[x, y]".to_vec();
    let required = unsafe {
        ysparse_parse(parser.0, ptr::null(), src.as_mut_ptr().cast(), 6, ptr::null_mut(), 0)
    };
    assert_eq!(required, 12);
}

#[test]
fn parse_errors_are_reported_with_their_location() {
    let parser = Parser::new();
    let filename = CString::new("app.ys").unwrap();
    let mut src = b"a: b: c".to_vec();
    let status = unsafe {
        ysparse_parse(parser.0, filename.as_ptr(), src.as_mut_ptr().cast(), 7, ptr::null_mut(), 0)
    };
    assert_eq!(status, YSPARSE_ERROR);
    let (kind, offset, line, column, message) = parser.last_error().unwrap();
    assert_eq!((kind, offset, line, column), (2, 3, 1, 4));
    assert_eq!(message, "app.ys:1:4: mapping values are not allowed here (offset 3)");

    // A successful call clears the error.
    assert_eq!(parser.parse(&mut b"a".to_vec(), &mut []), 7);
    assert_eq!(parser.last_error(), None);
}

#[test]
fn invalid_arguments() {
    let parser = Parser::new();
    let mut src = b"a".to_vec();

    let status = unsafe {
        ysparse_parse(parser.0, ptr::null(), src.as_mut_ptr().cast(), -1, ptr::null_mut(), 0)
    };
    assert_eq!(status, YSPARSE_ERROR);
    let (kind, offset, ..) = parser.last_error().unwrap();
    assert_eq!((kind, offset), (1, -1));

    let status = unsafe {
        ysparse_parse(parser.0, ptr::null(), src.as_mut_ptr().cast(), 1, ptr::null_mut(), 8)
    };
    assert_eq!(status, YSPARSE_ERROR);
    assert_eq!(parser.last_error().map(|e| e.0), Some(1));

    assert_eq!(
        unsafe { ysparse_parse(ptr::null_mut(), ptr::null(), ptr::null_mut(), 0, ptr::null_mut(), 0) },
        YSPARSE_ERROR
    );
    assert_eq!(unsafe { ysparse_last_error(parser.0, ptr::null_mut()) }, YSPARSE_ERROR);
}

#[test]
fn retry_before_any_parse() {
    let parser = Parser::new();
    let mut evt = [0; 8];
    assert_eq!(unsafe { ysparse_retry_get(parser.0, evt.as_mut_ptr(), 8) }, YSPARSE_ERROR);
    let (kind, ..) = parser.last_error().unwrap();
    assert_eq!(kind, 4);
}

#[test]
fn byte_buffer_in_host_order() {
    let parser = Parser::new();
    let order = if cfg!(target_endian = "big") { YSPARSE_BIG_ENDIAN } else { YSPARSE_LITTLE_ENDIAN };
    let mut src = b"a: 1".to_vec();
    let mut cells = vec![0i32; 12];
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(cells.as_mut_slice());
    let required = unsafe {
        ysparse_parse_buf(
            parser.0,
            ptr::null(),
            src.as_mut_ptr().cast(),
            4,
            bytes.as_mut_ptr(),
            bytes.len() as i32,
            order,
        )
    };
    assert_eq!(required, 12);
    assert_eq!(cells[0], flags::BSTR);

    let status = unsafe {
        ysparse_parse_buf(parser.0, ptr::null(), src.as_mut_ptr().cast(), 4, ptr::null_mut(), 0, 7)
    };
    assert_eq!(status, YSPARSE_ERROR);
    assert!(parser.last_error().unwrap().4.contains("byte_order"));
}

#[test]
fn edn_too_small_then_retry() {
    let parser = Parser::new();
    let mut src = "𝄞: ✅".as_bytes().to_vec();
    let mut edn = vec![b'x' as c_char; 8];
    let required = unsafe {
        ysparse_parse_edn(
            parser.0,
            ptr::null(),
            src.as_mut_ptr().cast(),
            src.len() as i32,
            edn.as_mut_ptr(),
            edn.len() as i32,
        )
    };
    assert!(required > 8, "{required}");
    assert_eq!(edn[0], 0);

    let mut edn = vec![b'x' as c_char; required as usize];
    assert_eq!(unsafe { ysparse_edn_retry_get(parser.0, edn.as_mut_ptr(), required) }, required);
    let text = unsafe { CStr::from_ptr(edn.as_ptr()) }.to_str().unwrap();
    assert_eq!(text.len() + 1, required as usize);
    assert_eq!(
        text,
        "(\n{:+ \"+MAP\"}\n{:+ \"=VAL\", := \"𝄞\"}\n{:+ \"=VAL\", := \"✅\"}\n\
         {:+ \"-MAP\"}\n{:+ \"-DOC\"}\n)\n"
    );
    assert_eq!(parser.last_error(), None);
}

#[test]
fn edn_errors() {
    let parser = Parser::new();
    let mut edn = [0 as c_char; 4];
    assert_eq!(unsafe { ysparse_edn_retry_get(parser.0, edn.as_mut_ptr(), 4) }, YSPARSE_ERROR);
    assert_eq!(parser.last_error().map(|e| e.0), Some(4));

    let mut src = b": : : :".to_vec();
    let status = unsafe {
        ysparse_parse_edn(parser.0, ptr::null(), src.as_mut_ptr().cast(), 7, ptr::null_mut(), 0)
    };
    assert_eq!(status, YSPARSE_ERROR);
    let (kind, offset, line, column, _) = parser.last_error().unwrap();
    assert_eq!((kind, offset, line, column), (2, 2, 1, 3));

    let status = unsafe {
        ysparse_parse_edn(parser.0, ptr::null(), src.as_mut_ptr().cast(), 7, ptr::null_mut(), 16)
    };
    assert_eq!(status, YSPARSE_ERROR);
    assert_eq!(parser.last_error().map(|e| e.0), Some(1));
}

#[test]
fn isolate_lifecycle() {
    let mut isolate: *mut ysparse_isolate = ptr::null_mut();
    assert_eq!(unsafe { ysparse_create_isolate(&mut isolate) }, 0);
    assert!(!isolate.is_null());

    let src = CString::new("foo: [1, 2]").unwrap();
    let text = unsafe { ysparse_load_to_json(isolate, src.as_ptr()) };
    assert!(!text.is_null());
    assert_eq!(unsafe { CStr::from_ptr(text) }.to_str().unwrap(), r#"{"data":{"foo":[1,2]}}"#);
    unsafe { ysparse_free_string(text) };

    // Isolates are single use.
    assert!(unsafe { ysparse_load_to_json(isolate, src.as_ptr()) }.is_null());
    assert_eq!(unsafe { ysparse_tear_down_isolate(isolate) }, 0);
}

#[test]
fn error_envelope_across_the_boundary() {
    let mut isolate: *mut ysparse_isolate = ptr::null_mut();
    assert_eq!(unsafe { ysparse_create_isolate(&mut isolate) }, 0);
    let src = CString::new("[a, b").unwrap();
    let text = unsafe { ysparse_load_to_json(isolate, src.as_ptr()) };
    let envelope = unsafe { CStr::from_ptr(text) }.to_str().unwrap().to_owned();
    unsafe { ysparse_free_string(text) };
    assert!(envelope.starts_with(r#"{"error":"#), "{envelope}");
    assert!(envelope.contains("unterminated flow sequence"), "{envelope}");
    assert_eq!(unsafe { ysparse_tear_down_isolate(isolate) }, 0);
}

#[test]
fn null_handles() {
    unsafe {
        ysparse_destroy(ptr::null_mut());
        ysparse_free_string(ptr::null_mut());
        assert_eq!(ysparse_create_isolate(ptr::null_mut()), YSPARSE_ERROR);
        assert_eq!(ysparse_tear_down_isolate(ptr::null_mut()), YSPARSE_ERROR);
        assert!(ysparse_load_to_json(ptr::null_mut(), ptr::null()).is_null());
    }
    assert_eq!(ysparse_format_version(), 1);
}
