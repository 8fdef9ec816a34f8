//! Durable storage for oversized tool results
//!
//! `OutputStore` writes each result once under a fresh id; records are never
//! mutated afterwards. Metadata is kept in a sidecar so it can be queried
//! without reading payloads.

pub mod record;
pub mod storage;

pub use record::{
    truncate_chars, value_type_name, OutputSummary, StoredOutput, StoredOutputMeta,
};
pub use storage::OutputStore;
