//! Core data models for the lobby engine.

mod lobby;
mod metrics;
mod options;
mod source;

pub use lobby::*;
pub use metrics::*;
pub use options::*;
pub use source::*;
