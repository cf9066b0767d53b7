//! Storage backend implementations.

pub mod filesystem;
pub mod hashed;
pub mod http;
pub mod memory;
