// src/core/value.rs

//! The dynamically typed flag value and evaluation-reason/detail types
//! exposed by the public variation surface (spec §3, §6).

use serde_json::Value as JsonValue;
use strum_macros::IntoStaticStr;

/// A flag's current value. Represented as `serde_json::Value` rather than a
/// closed Rust enum (see DESIGN.md / SPEC_FULL §3): the wire format is
/// server-defined and open-ended, and the core never interprets the value,
/// it only stores and returns it.
pub type FlagValue = JsonValue;

/// An evaluation reason. Constrained to be a JSON object carrying at least a
/// `"kind"` string field at every construction site in this crate, but kept
/// as an open `serde_json::Value` rather than a closed enum for the same
/// reason as `FlagValue`.
pub type EvaluationReason = JsonValue;

/// The taxonomy of evaluation errors this core itself synthesizes (spec §6,
/// §7). Other reason `kind`s (e.g. server-side rule-match kinds) may appear
/// in a stored reason but are never produced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum ErrorKind {
    #[strum(serialize = "CLIENT_NOT_SPECIFIED")]
    ClientNotSpecified,
    #[strum(serialize = "FLAG_NOT_SPECIFIED")]
    FlagNotSpecified,
    #[strum(serialize = "FLAG_NOT_FOUND")]
    FlagNotFound,
    #[strum(serialize = "WRONG_TYPE")]
    WrongType,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Builds the `{kind: ERROR, errorKind: ...}` reason object spec §6
    /// mandates for every synthesized evaluation error.
    pub fn to_reason(self) -> EvaluationReason {
        serde_json::json!({
            "kind": "ERROR",
            "errorKind": self.as_str(),
        })
    }
}

/// The result of a "detail" variation lookup: the resolved value (or the
/// caller's fallback), the reason it was produced, and the stored variation
/// index (`-1` on any error, per spec §6).
#[derive(Debug, Clone)]
pub struct VariationDetail {
    pub value: FlagValue,
    pub variation_index: i64,
    pub reason: Option<EvaluationReason>,
}

impl VariationDetail {
    pub fn error(fallback: FlagValue, kind: ErrorKind) -> Self {
        Self {
            value: fallback,
            variation_index: -1,
            reason: Some(kind.to_reason()),
        }
    }
}
