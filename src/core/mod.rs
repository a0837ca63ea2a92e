// src/core/mod.rs

//! The central module containing the core logic and data structures of flagcore:
//! the flag store, the stream parser, the lifecycle controller, the three
//! background workers, the transport/persistence/event-buffer contracts, and
//! the multi-environment registry.

pub mod client;
pub mod errors;
pub mod event_buffer;
pub mod flag;
pub mod lifecycle;
pub mod persistence;
pub mod registry;
pub mod store;
pub mod stream_parser;
pub mod transport;
pub mod user;
pub mod value;
pub mod workers;

pub use errors::FlagsError;
