//! Data models for one indexing run.
//!
//! `job` holds the parameters handed to the process by the upload pipeline,
//! `metadata` holds the documents the indexer reads from and writes to the
//! bucket. Everything serializes as JSON via `serde`.

pub mod job;
pub mod metadata;
