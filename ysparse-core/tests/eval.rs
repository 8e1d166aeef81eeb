//! Evaluation through the global runtime and the result envelope.

mod common;

use common::Gen;
use pretty_assertions::assert_eq;
use serde::Deserialize;
use serde_json::{json, Value};
use ysparse_core::{evaluate, load, Envelope, Error, Runtime};

#[test]
fn evaluate_returns_a_data_envelope() {
    let text = evaluate("foo: [1, 2]").unwrap();
    assert_eq!(text, r#"{"data":{"foo":[1,2]}}"#);
}

#[test]
fn evaluate_reports_parse_errors_in_the_envelope() {
    let text = evaluate("a: b: c").unwrap();
    let envelope = Envelope::from_json(&text).unwrap();
    assert!(envelope.is_error());
    assert_eq!(
        envelope,
        Envelope::Error("1:4: mapping values are not allowed here (offset 3)".into())
    );
}

#[test]
fn evaluate_reports_composition_errors_in_the_envelope() {
    let text = evaluate("a: 1\na: 2").unwrap();
    let envelope = Envelope::from_json(&text).unwrap();
    match envelope {
        Envelope::Error(message) => assert!(message.contains("duplicate mapping key"), "{message}"),
        other => panic!("expected an error envelope, got {other:?}"),
    }
}

#[test]
fn evaluate_empty_stream_is_null() {
    assert_eq!(evaluate("").unwrap(), r#"{"data":null}"#);
    assert_eq!(evaluate("# only a comment\n").unwrap(), r#"{"data":null}"#);
}

#[test]
fn load_into_typed_data() {
    #[derive(Debug, PartialEq, Deserialize)]
    struct Service {
        name: String,
        port: u16,
        tags: Vec<String>,
        debug: Option<bool>,
    }

    let service: Service = load(
        "name: api\nport: 8080\ntags:\n  - web\n  - 'public'\ndebug: ~\n",
    )
    .unwrap();
    assert_eq!(
        service,
        Service {
            name: "api".into(),
            port: 8080,
            tags: vec!["web".into(), "public".into()],
            debug: None,
        }
    );
}

#[test]
fn load_surfaces_error_envelopes() {
    let err = load::<Value>("[unterminated").unwrap_err();
    match err {
        Error::Evaluation(message) => {
            assert!(message.contains("unterminated flow sequence"), "{message}")
        }
        other => panic!("expected an evaluation error, got {other}"),
    }

    // Data that does not fit the target type is an evaluation error too.
    let err = load::<Vec<u8>>("a: 1").unwrap_err();
    assert!(matches!(err, Error::Evaluation(_)));
}

#[test]
fn global_runtime_is_shared() {
    let a = Runtime::global().unwrap();
    let b = Runtime::global().unwrap();
    assert!(std::ptr::eq(a, b));

    let first = a.create_isolate();
    let second = b.create_isolate();
    assert_ne!(first.id(), second.id());
}

#[test]
fn multi_document_streams_yield_the_last_document() {
    let text = evaluate("--- !yamlscript/v0\nfoo: bar\n---\nanother: doc\n").unwrap();
    assert_eq!(Envelope::from_json(&text).unwrap(), Envelope::Data(json!({"another": "doc"})));
}

#[test]
fn literal_block_keeps_trailing_lines() {
    let value: Value = load("script: |+\n  Q: $(prompt)\n  A: $(answer)\n\n").unwrap();
    assert_eq!(value, json!({"script": "Q: $(prompt)\nA: $(answer)\n\n"}));
}

#[test]
fn generated_documents_evaluate_to_their_data() {
    let mut gen = Gen::from_env_or_random();
    for round in 0..200 {
        let (text, expected) = gen.document();
        let value: Value = load(&text).unwrap_or_else(|e| {
            panic!("seed {} round {round}: {e}\n---\n{text}", gen.seed)
        });
        assert_eq!(value, expected, "seed {} round {round}\n---\n{text}", gen.seed);
    }
}

#[test]
fn generated_documents_are_reproducible() {
    let mut a = Gen::new(42);
    let mut b = Gen::new(42);
    for _ in 0..10 {
        assert_eq!(a.document(), b.document());
    }
}

#[test]
fn nested_aliases_cannot_blow_up_the_result() {
    let mut doc = String::from("a0: &a0 [x, x, x, x, x, x, x, x, x, x]\n");
    for n in 1..=6 {
        let items = vec![format!("*a{}", n - 1); 10].join(", ");
        doc.push_str(&format!("a{n}: &a{n} [{items}]\n"));
    }
    assert!(doc.len() < 512);

    let text = evaluate(&doc).unwrap();
    assert!(text.len() < 200, "{} bytes", text.len());
    match Envelope::from_json(&text).unwrap() {
        Envelope::Error(message) => {
            assert!(message.contains("aliases expand to more than 100000 nodes"), "{message}")
        }
        other => panic!("expected an error envelope, got {other:?}"),
    }
}
