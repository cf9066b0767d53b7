//! Repository traits.

pub mod stores;

pub use stores::StoreRepo;
