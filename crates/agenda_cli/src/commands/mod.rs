//! CLI command implementations.

pub mod request;
pub mod serve;
