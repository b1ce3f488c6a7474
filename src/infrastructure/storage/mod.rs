//! Storage adapters.
//!
//! Exposes the embedded sled-backed store that serves chunk similarity
//! search and the append-only metrics log.

pub mod sled_store;

pub use sled_store::SledStore;
