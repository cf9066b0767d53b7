//! Promotion request and result types.

use crate::key::StoreKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Which paths a promotion covers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionPaths {
    /// Every path currently held by the source.
    All,
    /// An explicit list, processed in order.
    Explicit(Vec<String>),
}

/// A request to copy (or move) paths from one store to another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRequest {
    pub source: StoreKey,
    pub target: StoreKey,
    pub paths: PromotionPaths,
    /// Delete each path from the source once it is safely in the target.
    #[serde(default)]
    pub purge_source: bool,
    /// Check everything, write nothing.
    #[serde(default)]
    pub dry_run: bool,
}

impl PromotionRequest {
    pub fn new(source: StoreKey, target: StoreKey, paths: Vec<String>) -> Self {
        Self {
            source,
            target,
            paths: PromotionPaths::Explicit(paths),
            purge_source: false,
            dry_run: false,
        }
    }

    pub fn all(source: StoreKey, target: StoreKey) -> Self {
        Self {
            source,
            target,
            paths: PromotionPaths::All,
            purge_source: false,
            dry_run: false,
        }
    }
}

/// Outcome of a promotion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionResult {
    pub id: Uuid,
    pub request: PromotionRequest,
    /// Paths copied into the target.
    pub completed: Vec<String>,
    /// Paths already present in the target with identical content.
    pub skipped: Vec<String>,
    /// Skipped paths deleted from the source, when purging.
    #[serde(default)]
    pub purged_skipped: Vec<String>,
    /// Paths left unprocessed because the promotion was cancelled.
    pub pending: Vec<String>,
    /// Per-path failures.
    pub errors: BTreeMap<String, String>,
    pub cancelled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

impl PromotionResult {
    /// Start an empty result for `request`.
    pub fn begin(request: PromotionRequest) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            request,
            completed: Vec::new(),
            skipped: Vec::new(),
            purged_skipped: Vec::new(),
            pending: Vec::new(),
            errors: BTreeMap::new(),
            cancelled: false,
            started_at: now,
            finished_at: now,
        }
    }

    /// No per-path errors and not cancelled.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

/// A request to add a store to a group's membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPromotionRequest {
    pub source: StoreKey,
    pub target_group: StoreKey,
    /// Check everything, change nothing.
    #[serde(default)]
    pub dry_run: bool,
}

impl GroupPromotionRequest {
    pub fn new(source: StoreKey, target_group: StoreKey) -> Self {
        Self {
            source,
            target_group,
            dry_run: false,
        }
    }
}

/// Outcome of a group promotion, or of its rollback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPromotionResult {
    pub id: Uuid,
    pub request: GroupPromotionRequest,
    /// The membership changed, or would have for a dry run.
    pub changed: bool,
    /// Why the membership could not be changed.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

impl GroupPromotionResult {
    pub fn begin(request: GroupPromotionRequest) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            request,
            changed: false,
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
