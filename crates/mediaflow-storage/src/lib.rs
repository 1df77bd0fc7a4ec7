//! Storage collaborators for the media pipeline.
//!
//! This crate provides:
//! - The `ObjectStore` seam with a Cloudflare R2 client and an in-memory store
//! - Deterministic derived-artifact keys
//! - The `AssetRecordStore` seam with an HTTP client and an in-memory store

pub mod client;
pub mod error;
pub mod keys;
pub mod records;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{AssetKey, Artifact};
pub use records::{
    AssetRecordStore, AssetRecordUpdate, HttpRecordStore, MemoryRecordStore, RecordsConfig,
};
pub use store::{MemoryStore, ObjectStore, StoredObject};
