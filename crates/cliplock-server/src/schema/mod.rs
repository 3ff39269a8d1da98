//! Request/response types for the HTTP API.
//!
//! One sub-module per API domain; all types carry serde derives and use
//! `skip_serializing_if` for fields that only appear in some states.

pub mod config;
pub mod debug;
pub mod lock;
pub mod tool;
