// src/lib.rs

//! `flagcore` is the concurrency and synchronization engine of a client-side
//! feature-flag evaluation library: a long-lived, in-process runtime that
//! keeps a user-scoped map of feature flags synchronized with a remote
//! decisioning service over polling and server-sent-event streaming, exposes
//! synchronous typed lookup of flag values, and emits analytics events back
//! to the service.

pub mod config;
pub mod core;

pub use crate::config::ClientConfig;
pub use crate::core::client::Client;
pub use crate::core::errors::FlagsError;
pub use crate::core::flag::FlagRecord;
pub use crate::core::lifecycle::ClientStatus;
pub use crate::core::registry::ClientRegistry;
pub use crate::core::user::User;
pub use crate::core::value::{ErrorKind, EvaluationReason, FlagValue, VariationDetail};

/// The name of the primary environment's client, matching `LDPrimaryEnvironmentName`
/// in the original SDK.
pub const PRIMARY_ENVIRONMENT_NAME: &str = "default";
