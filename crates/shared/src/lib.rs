//! Club Sincrónica Shared Types
//!
//! Data model shared by the real-time core, the notification store and the tooling built on them.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
