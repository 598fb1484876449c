//! Remote clients and the indexing workflow built on top of them.

pub mod indexer;
pub mod object_store;
pub mod tracker;
