//! Process and per-parser configuration.
//!
//! Process configuration comes from the environment:
//!
//! | variable                 | meaning                                   | default          |
//! |--------------------------|-------------------------------------------|------------------|
//! | `YSPARSE_DEBUG`          | enable diagnostic tracing on stderr       | off              |
//! | `YSPARSE_LOG`            | `tracing` filter directive when enabled   | `ysparse=debug`  |
//! | `YSPARSE_MAX_DEPTH`      | maximum collection nesting (at most 512)  | 512              |
//! | `YSPARSE_EVENT_CAPACITY` | first event buffer size (cells)           | 256              |
//! | `YSPARSE_MAX_ALIAS_NODES`| nodes that aliases may copy per document  | 100000           |

use crate::error::ConfigError;

pub const DEBUG_VAR: &str = "YSPARSE_DEBUG";
pub const LOG_VAR: &str = "YSPARSE_LOG";
pub const MAX_DEPTH_VAR: &str = "YSPARSE_MAX_DEPTH";
pub const EVENT_CAPACITY_VAR: &str = "YSPARSE_EVENT_CAPACITY";
pub const MAX_ALIAS_NODES_VAR: &str = "YSPARSE_MAX_ALIAS_NODES";

pub const DEFAULT_LOG_FILTER: &str = "ysparse=debug";
pub const DEFAULT_MAX_DEPTH: usize = 512;
/// The parser and composer recurse once per nesting level; deeper limits
/// would let valid input overflow the stack.
pub const MAX_DEPTH_LIMIT: usize = 512;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
pub const DEFAULT_MAX_ALIAS_NODES: usize = 100_000;

/// Options applied to every parse made by one parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Name reported in parse errors.
    pub filename: Option<String>,
    /// Maximum nesting of mappings and sequences, capped at
    /// [`MAX_DEPTH_LIMIT`].
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { filename: None, max_depth: DEFAULT_MAX_DEPTH }
    }
}

impl ParseOptions {
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Values above [`MAX_DEPTH_LIMIT`] are clamped.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(MAX_DEPTH_LIMIT);
        self
    }

    /// The depth limit actually enforced.
    pub fn effective_max_depth(&self) -> usize {
        self.max_depth.min(MAX_DEPTH_LIMIT)
    }
}

/// Process-level configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub debug: bool,
    pub log_filter: String,
    pub parse: ParseOptions,
    pub initial_event_capacity: usize,
    /// Total nodes alias expansion may copy into one document.
    pub max_alias_nodes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            parse: ParseOptions::default(),
            initial_event_capacity: DEFAULT_EVENT_CAPACITY,
            max_alias_nodes: DEFAULT_MAX_ALIAS_NODES,
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(value) = lookup(DEBUG_VAR) {
            config.debug = parse_flag(DEBUG_VAR, &value)?;
        }
        if let Some(value) = lookup(LOG_VAR) {
            if !value.trim().is_empty() {
                config.log_filter = value.trim().to_string();
            }
        }
        if let Some(value) = lookup(MAX_DEPTH_VAR) {
            let depth = parse_count(MAX_DEPTH_VAR, &value)?;
            if depth > MAX_DEPTH_LIMIT {
                return Err(ConfigError::InvalidSetting { name: MAX_DEPTH_VAR, value });
            }
            config.parse.max_depth = depth;
        }
        if let Some(value) = lookup(EVENT_CAPACITY_VAR) {
            config.initial_event_capacity = parse_count(EVENT_CAPACITY_VAR, &value)?;
        }
        if let Some(value) = lookup(MAX_ALIAS_NODES_VAR) {
            config.max_alias_nodes = parse_count(MAX_ALIAS_NODES_VAR, &value)?;
        }
        Ok(config)
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidSetting { name, value: value.to_string() }),
    }
}

fn parse_count(name: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidSetting { name, value: value.to_string() }),
    }
}
