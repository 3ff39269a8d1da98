//! HTTP handlers.
//!
//! Handlers are thin: validate the request shape, call into the engine,
//! render the schema response. No lock or liveness logic lives here.

pub mod config;
pub mod debug;
pub mod health;
pub mod lock;
pub mod tool;
