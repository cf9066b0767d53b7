//! Content resolution for depot.
//!
//! This crate provides:
//! - The resolution chain over expanded groups, with per-package-type
//!   strategies (Maven and npm metadata merging)
//! - The content index and change propagation that keeps it fresh
//! - `ContentManager`, the retrieve/store/delete facade
//! - The promotion engine

pub mod error;
pub mod index;
pub mod manager;
pub mod maven;
pub mod npm;
pub mod promotion;
pub mod propagation;
pub mod resolver;
pub mod strategy;
pub mod transfer;

pub use error::{ContentError, ContentResult};
pub use index::{ContentIndex, IndexEntry, IndexLookup};
pub use manager::{ContentManager, normalize_path};
pub use promotion::{PromotionEngine, batch};
pub use propagation::{ChangePropagator, get_diff, get_diverged};
pub use resolver::{Gathered, LookupOutcome, ResolutionChain, StoreLookup};
pub use strategy::{
    IndexingStrategy, MergingRetriever, MetadataMerger, PackageStrategies, PathRetriever,
    StrategyRegistry,
};
pub use transfer::{Transfer, TransferBody};
