//! Core domain types for the depot artifact repository.
//!
//! This crate defines the data model shared by every other crate:
//! - Store keys and store definitions (hosted, remote, group)
//! - Change summaries and the events published on store and promotion changes
//! - Promotion requests and results, for paths and for group membership
//! - Configuration

pub mod config;
pub mod error;
pub mod event;
pub mod hash;
pub mod key;
pub mod promotion;
pub mod store;

pub use error::{Error, Result};
pub use event::{
    BroadcastEventSink, ChangeSummary, DepotEvent, EventSink, GroupPromotionCompletedEvent,
    NoopEventSink, PromotionCompletedEvent, StoreChangeType, StoreUpdatedEvent, TracingEventSink,
};
pub use hash::ContentHash;
pub use key::{GENERIC_PKG_KEY, MAVEN_PKG_KEY, NPM_PKG_KEY, StoreKey, StoreType};
pub use promotion::{
    GroupPromotionRequest, GroupPromotionResult, PromotionPaths, PromotionRequest, PromotionResult,
};
pub use store::{
    ArtifactStore, GroupSettings, HostedSettings, PathStyle, RemoteSettings, StoreKind,
};
