//! Shared foundation for RepoLens: the conversation data model, the
//! streaming wire protocol, SSE framing, configuration, and errors.

pub mod config;
pub mod error;
pub mod protocol;
pub mod sse;
pub mod types;

pub use error::{RepoLensError, Result};
