//! Scalar resolution with the YAML 1.2 core schema.
//!
//! Only plain scalars are resolved; quoted and block scalars are always
//! strings unless a core tag says otherwise.

use phf::phf_map;

/// Resolved type of a scalar's text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Anything else: the text itself.
    Str,
}

static KEYWORDS: phf::Map<&'static str, Scalar> = phf_map! {
    "" => Scalar::Null,
    "~" => Scalar::Null,
    "null" => Scalar::Null,
    "Null" => Scalar::Null,
    "NULL" => Scalar::Null,
    "true" => Scalar::Bool(true),
    "True" => Scalar::Bool(true),
    "TRUE" => Scalar::Bool(true),
    "false" => Scalar::Bool(false),
    "False" => Scalar::Bool(false),
    "FALSE" => Scalar::Bool(false),
    ".inf" => Scalar::Float(f64::INFINITY),
    ".Inf" => Scalar::Float(f64::INFINITY),
    ".INF" => Scalar::Float(f64::INFINITY),
    "+.inf" => Scalar::Float(f64::INFINITY),
    "+.Inf" => Scalar::Float(f64::INFINITY),
    "+.INF" => Scalar::Float(f64::INFINITY),
    "-.inf" => Scalar::Float(f64::NEG_INFINITY),
    "-.Inf" => Scalar::Float(f64::NEG_INFINITY),
    "-.INF" => Scalar::Float(f64::NEG_INFINITY),
    ".nan" => Scalar::Float(f64::NAN),
    ".NaN" => Scalar::Float(f64::NAN),
    ".NAN" => Scalar::Float(f64::NAN),
};

impl Scalar {
    /// Resolve plain scalar text.
    pub fn resolve(text: &str) -> Scalar {
        if let Some(&keyword) = KEYWORDS.get(text) {
            return keyword;
        }
        Self::try_parse_number(text.as_bytes()).unwrap_or(Scalar::Str)
    }

    fn try_parse_number(bytes: &[u8]) -> Option<Scalar> {
        match bytes {
            [b'0', b'o', digits @ ..] => return Self::try_parse_radix(digits, 8),
            [b'0', b'x', digits @ ..] => return Self::try_parse_radix(digits, 16),
            _ => {}
        }

        let (negative, rest) = match bytes {
            [b'-', rest @ ..] => (true, rest),
            [b'+', rest @ ..] => (false, rest),
            _ => (false, bytes),
        };
        if rest.is_empty() {
            return None;
        }
        if rest.iter().all(u8::is_ascii_digit) {
            return Self::try_parse_decimal(negative, rest)
                .or_else(|| Self::try_parse_float(bytes));
        }
        if Self::is_float_shape(rest) {
            return Self::try_parse_float(bytes);
        }
        None
    }

    fn try_parse_decimal(negative: bool, digits: &[u8]) -> Option<Scalar> {
        let mut result: i64 = 0;
        for &b in digits {
            let digit = (b - b'0') as i64;
            result = if negative {
                result.checked_mul(10)?.checked_sub(digit)?
            } else {
                result.checked_mul(10)?.checked_add(digit)?
            };
        }
        Some(Scalar::Int(result))
    }

    fn try_parse_radix(digits: &[u8], radix: u32) -> Option<Scalar> {
        if digits.is_empty() {
            return None;
        }
        let mut result: i64 = 0;
        for &b in digits {
            let digit = (b as char).to_digit(radix)?;
            result = result.checked_mul(radix as i64)?.checked_add(digit as i64)?;
        }
        Some(Scalar::Int(result))
    }

    /// `( \. [0-9]+ | [0-9]+ ( \. [0-9]* )? ) ( [eE] [-+]? [0-9]+ )?`
    fn is_float_shape(bytes: &[u8]) -> bool {
        let digits = |from: usize| bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count();

        let mut i = digits(0);
        let leading = i;
        if bytes.get(i) == Some(&b'.') {
            i += 1;
            let fraction = digits(i);
            if leading == 0 && fraction == 0 {
                return false;
            }
            i += fraction;
        } else if leading == 0 {
            return false;
        }
        if matches!(bytes.get(i), Some(b'e' | b'E')) {
            i += 1;
            if matches!(bytes.get(i), Some(b'+' | b'-')) {
                i += 1;
            }
            let exponent = digits(i);
            if exponent == 0 {
                return false;
            }
            i += exponent;
        }
        i == bytes.len()
    }

    fn try_parse_float(bytes: &[u8]) -> Option<Scalar> {
        let text = std::str::from_utf8(bytes).ok()?;
        text.parse::<f64>().ok().map(Scalar::Float)
    }
}

/// Tags from the core schema that composition enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreTag {
    Str,
    Int,
    Float,
    Bool,
    Null,
    Seq,
    Map,
}

static CORE_TAGS: phf::Map<&'static str, CoreTag> = phf_map! {
    "!!str" => CoreTag::Str,
    "!!int" => CoreTag::Int,
    "!!float" => CoreTag::Float,
    "!!bool" => CoreTag::Bool,
    "!!null" => CoreTag::Null,
    "!!seq" => CoreTag::Seq,
    "!!map" => CoreTag::Map,
    "tag:yaml.org,2002:str" => CoreTag::Str,
    "tag:yaml.org,2002:int" => CoreTag::Int,
    "tag:yaml.org,2002:float" => CoreTag::Float,
    "tag:yaml.org,2002:bool" => CoreTag::Bool,
    "tag:yaml.org,2002:null" => CoreTag::Null,
    "tag:yaml.org,2002:seq" => CoreTag::Seq,
    "tag:yaml.org,2002:map" => CoreTag::Map,
};

impl CoreTag {
    /// Look up a tag payload as emitted by the parser (`!!int`, or the
    /// verbatim `tag:yaml.org,2002:int`).
    pub fn from_tag(tag: &str) -> Option<CoreTag> {
        CORE_TAGS.get(tag).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            CoreTag::Str => "!!str",
            CoreTag::Int => "!!int",
            CoreTag::Float => "!!float",
            CoreTag::Bool => "!!bool",
            CoreTag::Null => "!!null",
            CoreTag::Seq => "!!seq",
            CoreTag::Map => "!!map",
        }
    }

    /// Resolve `text` as this tag demands; `None` if it does not conform.
    pub fn resolve(self, text: &str) -> Option<Scalar> {
        match (self, Scalar::resolve(text)) {
            (CoreTag::Str, _) => Some(Scalar::Str),
            (CoreTag::Int, int @ Scalar::Int(_)) => Some(int),
            (CoreTag::Float, Scalar::Int(i)) => Some(Scalar::Float(i as f64)),
            (CoreTag::Float, float @ Scalar::Float(_)) => Some(float),
            (CoreTag::Bool, boolean @ Scalar::Bool(_)) => Some(boolean),
            (CoreTag::Null, Scalar::Null) => Some(Scalar::Null),
            _ => None,
        }
    }
}
