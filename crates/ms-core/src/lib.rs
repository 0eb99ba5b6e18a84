//! # ms-core
//!
//! Shared foundation for mediascope: the unified error type, the typed
//! metadata model produced by both extraction backends, container-family
//! classification, and runtime configuration.

pub mod config;
pub mod error;
pub mod types;

pub use error::{Error, ParseErrorKind, Result};
pub use types::*;
