//! CLI command implementations.

pub mod cancel;
pub mod common;
pub mod script;
pub mod status;
pub mod submit;
