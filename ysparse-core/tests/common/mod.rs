//! Test infrastructure for ysparse
//!
//! Provides fixture loading, event rendering, and seeded document generation.

#![allow(dead_code, unused_imports)]

mod generators;
mod harness;
mod loader;

pub use generators::Gen;
pub use harness::{parse_all, render_cells, render_expected};
pub use loader::{load_fixtures_by_name, parse_flags, ExpectedEvent, TestCase};
