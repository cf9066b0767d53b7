//! Backing content storage for depot stores.
//!
//! This crate provides:
//! - The `ObjectStore` accessor trait (open-read, open-write, delete, list)
//! - Backends: local filesystem, in-memory, and read-only HTTP for remote stores
//! - `HashedLayout`, which spreads a hosted store across hash-named directories
//! - `StoreAccessors`, which maps a store definition to its backend

pub mod accessor;
pub mod backends;
pub mod error;
pub mod traits;

pub use accessor::{HostedRoot, StoreAccessors};
pub use backends::{
    filesystem::FilesystemBackend, hashed::HashedLayout, http::HttpBackend, memory::MemoryBackend,
};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectStore, collect_stream};
