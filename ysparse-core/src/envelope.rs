//! The `{data|error}` result envelope.
//!
//! Evaluation results cross the call boundary as one JSON text holding
//! either a `data` member or an `error` member, never both:
//!
//! ```text
//! {"data": {"foo": [1, 2]}}
//! {"error": "1:5: could not find expected ':' (offset 4)"}
//! ```
//!
//! A caller must check `error` first and must not read `data` when an
//! error is present; [`Envelope::into_result`] does exactly that.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ProtocolError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Envelope {
    #[serde(rename = "data")]
    Data(Value),
    #[serde(rename = "error")]
    Error(String),
}

impl Envelope {
    /// Encode as envelope text.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self)
            .map_err(|e| ProtocolError::MalformedEnvelope { reason: e.to_string() })
    }

    /// Decode envelope text.
    ///
    /// Text that is not an object with exactly one of `data` / `error` is a
    /// protocol violation.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text)
            .map_err(|e| ProtocolError::MalformedEnvelope { reason: e.to_string() })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Envelope::Error(_))
    }

    /// The data, or the carried message as [`Error::Evaluation`].
    pub fn into_result(self) -> Result<Value, Error> {
        match self {
            Envelope::Error(message) => Err(Error::Evaluation(message)),
            Envelope::Data(value) => Ok(value),
        }
    }
}

impl From<Result<Value, Error>> for Envelope {
    fn from(result: Result<Value, Error>) -> Self {
        match result {
            Ok(value) => Envelope::Data(value),
            Err(e) => Envelope::Error(e.to_string()),
        }
    }
}
