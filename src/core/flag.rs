// src/core/flag.rs

//! The flag record (spec §3). Reference counting is realized as `Arc`: the
//! store hands out clones of the `Arc` from `get`, so a reader's handle
//! outlives the store replacing or deleting the entry, with reclamation on
//! the last clone's drop. No manual refcount field is needed.

use crate::core::value::{EvaluationReason, FlagValue};
use serde::Deserialize;

/// A single versioned flag record, as stored by the Flag Store and returned
/// (wrapped in `Arc`) by `FlagStore::get`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagRecord {
    pub key: String,
    pub value: FlagValue,
    pub version: i64,
    pub variation_index: Option<i64>,
    pub reason: Option<EvaluationReason>,
}

impl FlagRecord {
    pub fn new(key: impl Into<String>, value: FlagValue, version: i64) -> Self {
        Self {
            key: key.into(),
            value,
            version,
            variation_index: None,
            reason: None,
        }
    }
}

/// The wire shape of one flag record inside a "put"/"patch"/"delete"
/// payload, matching the attributes the source reads off each map entry in
/// `applypatch`/`LDi_onstreameventput`. `value` is absent on delete payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct FlagRecordPayload {
    #[serde(default)]
    pub value: Option<FlagValue>,
    pub version: i64,
    #[serde(default, rename = "variation")]
    pub variation_index: Option<i64>,
    #[serde(default)]
    pub reason: Option<EvaluationReason>,
}

impl FlagRecordPayload {
    pub fn into_record(self, key: &str) -> FlagRecord {
        FlagRecord {
            key: key.to_string(),
            value: self.value.unwrap_or(FlagValue::Null),
            version: self.version,
            variation_index: self.variation_index,
            reason: self.reason,
        }
    }
}
