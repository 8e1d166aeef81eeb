//! Fixture loading from YAML files

use serde::Deserialize;
use std::path::Path;

use ysparse_core::flags;

/// A single test case from a fixture file
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub desc: String,
    pub yaml: String,
    pub events: Vec<ExpectedEvent>,
}

/// Expected event - either `[FLAGS]` or `[FLAGS, offset, length, text]`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExpectedEvent {
    Bare((String,)),
    WithPayload(String, i32, i32, String),
}

impl ExpectedEvent {
    pub fn flags(&self) -> i32 {
        match self {
            ExpectedEvent::Bare((names,)) => parse_flags(names),
            ExpectedEvent::WithPayload(names, ..) => parse_flags(names),
        }
    }

    pub fn cell_count(&self) -> usize {
        match self {
            ExpectedEvent::Bare(_) => 1,
            ExpectedEvent::WithPayload(..) => 3,
        }
    }
}

impl TestCase {
    /// Cells the whole expected stream occupies.
    pub fn required_size(&self) -> usize {
        self.events.iter().map(ExpectedEvent::cell_count).sum()
    }
}

/// Parse `KEY_|SCLR|PLAI` into a flag word.
pub fn parse_flags(names: &str) -> i32 {
    names
        .split('|')
        .map(|name| match name.trim() {
            "KEY_" => flags::KEY_,
            "VAL_" => flags::VAL_,
            "SCLR" => flags::SCLR,
            "BSEQ" => flags::BSEQ,
            "ESEQ" => flags::ESEQ,
            "BMAP" => flags::BMAP,
            "EMAP" => flags::EMAP,
            "ALIA" => flags::ALIA,
            "ANCH" => flags::ANCH,
            "TAG_" => flags::TAG_,
            "PLAI" => flags::PLAI,
            "SQUO" => flags::SQUO,
            "DQUO" => flags::DQUO,
            "LITL" => flags::LITL,
            "FOLD" => flags::FOLD,
            "FLOW" => flags::FLOW,
            "BLCK" => flags::BLCK,
            "BDOC" => flags::BDOC,
            "EDOC" => flags::EDOC,
            "BSTR" => flags::BSTR,
            "ESTR" => flags::ESTR,
            "EXPL" => flags::EXPL,
            other => panic!("unknown flag name {other:?}"),
        })
        .fold(0, |word, bit| word | bit)
}

/// Load all test cases from a YAML fixture file
pub fn load_fixtures(path: &Path) -> Vec<TestCase> {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read fixture file {:?}: {}", path, e));
    serde_yaml::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture file {:?}: {}", path, e))
}

/// Load fixtures from the standard fixtures directory
pub fn load_fixtures_by_name(name: &str) -> Vec<TestCase> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(format!("{}.yaml", name));
    load_fixtures(&path)
}
