// src/core/user.rs

//! The user object addressed for evaluation and events. Private-attribute
//! redaction and attribute-schema validation are explicit external
//! collaborators per spec §1 (out of scope here); this is the minimal shape
//! the core itself needs: a stable key to scope persistence and events by
//! (spec §6's `user_key` in the persistence contract) plus arbitrary custom
//! attributes the core passes through unexamined.

use serde_json::Value as JsonValue;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub key: String,
    pub custom: HashMap<String, JsonValue>,
}

impl User {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            custom: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.custom.insert(name.into(), value);
        self
    }

    /// A stable anonymous placeholder, used before the first `identify`.
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }
}

impl Default for User {
    fn default() -> Self {
        Self::anonymous()
    }
}
