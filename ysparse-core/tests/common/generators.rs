//! Seeded document generators for stochastic tests
//!
//! Every generated document comes with the data it must evaluate to, so
//! no second YAML implementation is needed as an oracle. Print the seed on
//! failure for replay with `YSPARSE_TEST_SEED`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};

const WORDS: &[&str] = &["alpha", "beta", "gamma", "delta", "say", "foo", "bar", "x"];

/// Seeded generator for reproducible stochastic tests
pub struct Gen {
    pub rng: StdRng,
    pub seed: u64,
}

impl Gen {
    /// Create with specific seed (for reproduction)
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Create from environment or random seed
    pub fn from_env_or_random() -> Self {
        let seed = std::env::var("YSPARSE_TEST_SEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(rand::random);
        Self::new(seed)
    }

    /// Geometric distribution: count until rand > alpha
    pub fn geometric(&mut self, alpha: f64) -> usize {
        let mut n = 0;
        while self.rng.gen::<f64>() < alpha {
            n += 1;
        }
        n
    }

    /// Random boolean with probability p
    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.gen::<f64>() < p
    }

    pub fn word(&mut self) -> &'static str {
        WORDS[self.rng.gen_range(0..WORDS.len())]
    }

    /// A block mapping document and the data it evaluates to.
    pub fn document(&mut self) -> (String, Value) {
        let mut out = String::new();
        if self.chance(0.2) {
            out.push_str("# generated\n");
        }
        let value = self.mapping(0, 0, &mut out);
        (out, value)
    }

    fn mapping(&mut self, indent: usize, depth: usize, out: &mut String) -> Value {
        let pad = " ".repeat(indent);
        let mut map = Map::new();
        let entries = 1 + self.geometric(0.6).min(4);
        for i in 0..entries {
            // Suffix keeps keys unique within the mapping.
            let key = format!("{}{}", self.word(), i);
            out.push_str(&pad);
            out.push_str(&key);
            out.push(':');

            let nested = depth < 3 && self.chance(0.35);
            let value = if nested && self.chance(0.5) {
                out.push('\n');
                self.mapping(indent + 2, depth + 1, out)
            } else if nested {
                out.push('\n');
                self.block_sequence(indent + 2, out)
            } else if self.chance(0.15) {
                out.push(' ');
                self.flow_sequence(out)
            } else {
                out.push(' ');
                let value = self.scalar(out);
                out.push('\n');
                value
            };
            if self.chance(0.1) {
                out.push('\n');
            }
            map.insert(key, value);
        }
        Value::Object(map)
    }

    fn block_sequence(&mut self, indent: usize, out: &mut String) -> Value {
        let pad = " ".repeat(indent);
        let items = 1 + self.geometric(0.5).min(4);
        let mut values = Vec::with_capacity(items);
        for _ in 0..items {
            out.push_str(&pad);
            out.push_str("- ");
            values.push(self.scalar(out));
            out.push('\n');
        }
        Value::Array(values)
    }

    fn flow_sequence(&mut self, out: &mut String) -> Value {
        let items = self.geometric(0.6).min(5);
        let mut values = Vec::with_capacity(items);
        out.push('[');
        for i in 0..items {
            if i > 0 {
                out.push_str(", ");
            }
            if self.chance(0.5) {
                let n: i32 = self.rng.gen_range(-999..999);
                out.push_str(&n.to_string());
                values.push(Value::from(n));
            } else {
                let word = self.word();
                out.push_str(word);
                values.push(Value::from(word));
            }
        }
        out.push_str("]\n");
        Value::Array(values)
    }

    /// Write one inline scalar and return its data.
    fn scalar(&mut self, out: &mut String) -> Value {
        match self.rng.gen_range(0..7) {
            0 => {
                let n: i64 = self.rng.gen_range(-100_000..100_000);
                out.push_str(&n.to_string());
                Value::from(n)
            }
            1 => {
                let b = self.chance(0.5);
                out.push_str(if b { "true" } else { "false" });
                Value::Bool(b)
            }
            2 => {
                out.push('~');
                Value::Null
            }
            3 => {
                let word = self.word();
                out.push_str(&format!("'{word}''s'"));
                Value::from(format!("{word}'s"))
            }
            4 => {
                let (a, b) = (self.word(), self.word());
                out.push_str(&format!("\"{a}\\t{b}\""));
                Value::from(format!("{a}\t{b}"))
            }
            5 => {
                let (a, b) = (self.word(), self.word());
                out.push_str(&format!("{a} {b}"));
                Value::from(format!("{a} {b}"))
            }
            _ => {
                let word = self.word();
                out.push_str(word);
                Value::from(word)
            }
        }
    }
}
