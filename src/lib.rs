//! # Matchroom Lens
//!
//! Lobby observation and statistics aggregation for match-room overlays.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (snapshots, range options, source model, metrics)
//! - **fetch**: Remote data client with caching, retries and envelope unwrapping
//! - **resolve**: Reads the host page into a lobby snapshot
//! - **pipeline**: Gathers player histories into a source model
//! - **calculate**: Reduces a source model to per-team and per-player metrics
//! - **storage**: Persisted key/value backends (memory, JSONL)
//! - **options**: Reactive option store over storage
//! - **overlay**: Feature and component lifecycle on the host document
//! - **lobby**: Per-lobby controller tying the above together
//! - **config**: Configuration loading and validation

pub mod calculate;
pub mod config;
pub mod fetch;
pub mod lobby;
pub mod models;
pub mod notify;
pub mod options;
pub mod overlay;
pub mod pipeline;
pub mod resolve;
pub mod storage;

#[cfg(test)]
mod testing;

pub use models::*;
