//! Path promotion, copying (or moving) content between stores in batches,
//! and group promotion, adding a store to a group's membership.

use crate::error::{ContentError, ContentResult};
use crate::manager::{ContentManager, normalize_path};
use bytes::Bytes;
use depot_core::config::PromotionConfig;
use depot_core::{
    ArtifactStore, ChangeSummary, ContentHash, DepotEvent, EventSink,
    GroupPromotionCompletedEvent, GroupPromotionRequest, GroupPromotionResult,
    PromotionCompletedEvent, PromotionPaths, PromotionRequest, PromotionResult, StoreKey,
    StoreKind,
};
use depot_storage::ObjectStore;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Split `paths` into consecutive batches of `size`. A size of 0 counts as 1.
pub fn batch<T: Clone>(paths: &[T], size: usize) -> Vec<Vec<T>> {
    paths.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

/// What happened to one path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PathOutcome {
    Completed,
    /// The target already held identical bytes. `purged` when the source
    /// copy was deleted as well.
    Skipped { purged: bool },
}

/// Runs promotion requests. Independent path promotions may run
/// concurrently; group promotions run one at a time.
pub struct PromotionEngine {
    content: Arc<ContentManager>,
    events: Arc<dyn EventSink>,
    batch_size: usize,
    /// Held across each read-modify-write of a group's membership.
    membership: Mutex<()>,
}

impl PromotionEngine {
    pub fn new(
        content: Arc<ContentManager>,
        events: Arc<dyn EventSink>,
        config: &PromotionConfig,
    ) -> Self {
        Self {
            content,
            events,
            batch_size: config.batch_size,
            membership: Mutex::new(()),
        }
    }

    /// Promote without external cancellation.
    pub async fn promote(&self, request: PromotionRequest) -> ContentResult<PromotionResult> {
        self.promote_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Promote, checking `cancel` between batches.
    ///
    /// Request-level problems fail the whole call before any work is done.
    /// Per-path problems are recorded in the result, which is always
    /// published as exactly one completion event.
    pub async fn promote_with_cancel(
        &self,
        request: PromotionRequest,
        cancel: &CancellationToken,
    ) -> ContentResult<PromotionResult> {
        self.validate(&request)?;

        let paths = match &request.paths {
            PromotionPaths::Explicit(paths) => dedup_paths(paths),
            PromotionPaths::All => self.content.list_paths(&request.source).await?,
        };

        let mut result = PromotionResult::begin(request);
        let batches = batch(&paths, self.batch_size);
        tracing::info!(
            promotion_id = %result.id,
            source = %result.request.source,
            target = %result.request.target,
            paths = paths.len(),
            batches = batches.len(),
            dry_run = result.request.dry_run,
            "Starting promotion"
        );

        for (i, chunk) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(promotion_id = %result.id, remaining_batches = batches.len() - i, "Promotion cancelled");
                result.cancelled = true;
                result.pending = batches[i..].iter().flatten().cloned().collect();
                break;
            }

            let outcomes = join_all(
                chunk
                    .iter()
                    .map(|path| self.promote_path(&result.request, path)),
            )
            .await;

            for (path, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(PathOutcome::Completed) => result.completed.push(path.clone()),
                    Ok(PathOutcome::Skipped { purged }) => {
                        result.skipped.push(path.clone());
                        if purged {
                            result.purged_skipped.push(path.clone());
                        }
                    }
                    Err(e) => {
                        tracing::warn!(promotion_id = %result.id, path, error = %e, "Path promotion failed");
                        result.errors.insert(path.clone(), e.to_string());
                    }
                }
            }
        }

        result.finished_at = OffsetDateTime::now_utc();
        self.events
            .publish(DepotEvent::PromotionCompleted(PromotionCompletedEvent {
                result: result.clone(),
            }));
        Ok(result)
    }

    fn validate(&self, request: &PromotionRequest) -> ContentResult<()> {
        if request.source == request.target {
            return Err(ContentError::Validation(
                "source and target must differ".to_string(),
            ));
        }
        let stores = self.content.stores();
        let source = stores.try_get(&request.source).ok_or_else(|| {
            ContentError::Validation(format!("source store {} does not exist", request.source))
        })?;
        let target = stores.try_get(&request.target).ok_or_else(|| {
            ContentError::Validation(format!("target store {} does not exist", request.target))
        })?;
        if !target.is_writable() {
            return Err(ContentError::Validation(format!(
                "target {} must be a writable hosted store",
                request.target
            )));
        }
        if request.purge_source && !source.is_writable() {
            return Err(ContentError::Validation(format!(
                "purging requires a writable hosted source, {} is not",
                request.source
            )));
        }
        if let PromotionPaths::Explicit(paths) = &request.paths {
            for path in paths {
                normalize_path(path)?;
            }
        }
        Ok(())
    }

    async fn promote_path(&self, request: &PromotionRequest, path: &str) -> ContentResult<PathOutcome> {
        let data = self
            .content
            .retrieve(&request.source, path)
            .await
            .map_err(|e| match e {
                ContentError::NotFound(_) => ContentError::NotFound(format!(
                    "{path} is not available in source {}",
                    request.source
                )),
                other => other,
            })?;
        if data.is_directory() {
            return Err(ContentError::Validation(format!("{path} is a directory")));
        }
        let data = data.into_bytes().await?;

        let (_, target) = self.content.writable(&request.target).await?;
        if holds_identical(target.as_ref(), path, &data).await? {
            return self.skip(request, path).await;
        }
        if request.dry_run {
            return Ok(PathOutcome::Completed);
        }

        if !target.put_if_not_exists(path, data.clone()).await? {
            // Lost a race with a concurrent writer: judge what landed.
            if holds_identical(target.as_ref(), path, &data).await? {
                return self.skip(request, path).await;
            }
            return Err(ContentError::Conflict(format!(
                "{path} changed in target {} during promotion",
                request.target
            )));
        }
        self.content.path_stored(&request.target, path);

        if request.purge_source {
            self.purge_source(request, path).await?;
        }
        Ok(PathOutcome::Completed)
    }

    /// The target already holds `path`. When purging, the source copy still
    /// goes, so a move whose purge failed completes on retry.
    async fn skip(&self, request: &PromotionRequest, path: &str) -> ContentResult<PathOutcome> {
        if !request.purge_source || request.dry_run {
            return Ok(PathOutcome::Skipped { purged: false });
        }
        self.purge_source(request, path).await?;
        Ok(PathOutcome::Skipped { purged: true })
    }

    async fn purge_source(&self, request: &PromotionRequest, path: &str) -> ContentResult<()> {
        let (_, source) = self.content.writable(&request.source).await?;
        source.delete(path).await?;
        self.content.path_removed(&request.source, path);
        Ok(())
    }

    /// Undo the completed paths of `result`: delete them from the target,
    /// restoring them to the source first if it was purged. Skipped paths
    /// that were purged are restored to the source and stay in the target,
    /// which held them before the promotion.
    ///
    /// The returned result lists in `completed` and `purged_skipped` only the
    /// paths that could not be rolled back, with the reasons in `errors`.
    pub async fn rollback(&self, result: &PromotionResult) -> ContentResult<PromotionResult> {
        let mut rolled = result.clone();
        rolled.errors.clear();
        if result.request.dry_run {
            rolled.completed.clear();
            rolled.purged_skipped.clear();
            rolled.finished_at = OffsetDateTime::now_utc();
            return Ok(rolled);
        }

        let request = &result.request;
        let (_, target) = self.content.writable(&request.target).await?;
        let source = if request.purge_source {
            Some(self.content.writable(&request.source).await?.1)
        } else {
            None
        };

        let mut remaining = Vec::new();
        for path in &result.completed {
            if let Err(e) = self
                .rollback_path(request, target.as_ref(), source.as_deref(), path, true)
                .await
            {
                tracing::warn!(promotion_id = %result.id, path, error = %e, "Rollback failed");
                rolled.errors.insert(path.clone(), e.to_string());
                remaining.push(path.clone());
            }
        }
        let mut remaining_purged = Vec::new();
        for path in &result.purged_skipped {
            if let Err(e) = self
                .rollback_path(request, target.as_ref(), source.as_deref(), path, false)
                .await
            {
                tracing::warn!(promotion_id = %result.id, path, error = %e, "Source restore failed");
                rolled.errors.insert(path.clone(), e.to_string());
                remaining_purged.push(path.clone());
            }
        }
        let rolled_back = result.completed.len() + result.purged_skipped.len()
            - remaining.len()
            - remaining_purged.len();
        rolled.completed = remaining;
        rolled.purged_skipped = remaining_purged;
        rolled.finished_at = OffsetDateTime::now_utc();

        tracing::info!(
            promotion_id = %result.id,
            rolled_back,
            failed = rolled.errors.len(),
            "Rolled back promotion"
        );
        Ok(rolled)
    }

    async fn rollback_path(
        &self,
        request: &PromotionRequest,
        target: &dyn ObjectStore,
        source: Option<&dyn ObjectStore>,
        path: &str,
        delete_target: bool,
    ) -> ContentResult<()> {
        if let Some(source) = source {
            let data = target.get(path).await?;
            if !source.put_if_not_exists(path, data.clone()).await?
                && !holds_identical(source, path, &data).await?
            {
                return Err(ContentError::Conflict(format!(
                    "{path} in source {} differs from the promoted copy",
                    request.source
                )));
            }
            self.content.path_stored(&request.source, path);
        }
        if delete_target {
            target.delete(path).await?;
            self.content.path_removed(&request.target, path);
        }
        Ok(())
    }

    /// Add `request.source` to the end of the target group's membership.
    ///
    /// A source that is already a member leaves the group untouched. The
    /// change goes through the store data manager, so the content index of
    /// the group and of every group containing it is invalidated before
    /// this returns.
    pub async fn promote_to_group(
        &self,
        request: GroupPromotionRequest,
    ) -> ContentResult<GroupPromotionResult> {
        let _membership = self.membership.lock().await;
        let group = self.validate_group(&request)?;
        let mut result = GroupPromotionResult::begin(request);
        let source = &result.request.source;

        if group.constituents().unwrap_or_default().contains(source) {
            tracing::info!(source = %source, group = %group.key, "Already a group member");
        } else {
            result.changed = true;
            if !result.request.dry_run {
                let summary = format!("Promoting {source} into membership of group {}", group.key);
                let updated = with_members(&group, |members| members.push(source.clone()));
                self.content
                    .stores()
                    .put(updated, ChangeSummary::system(summary))
                    .await?;
            }
        }

        tracing::info!(
            promotion_id = %result.id,
            source = %source,
            group = %group.key,
            changed = result.changed,
            dry_run = result.request.dry_run,
            "Group promotion finished"
        );
        Ok(self.finish_group(result, false))
    }

    /// Remove `result.request.source` from the target group again.
    ///
    /// A source that is no longer a member is reported in `error`.
    pub async fn rollback_group(
        &self,
        result: &GroupPromotionResult,
    ) -> ContentResult<GroupPromotionResult> {
        let _membership = self.membership.lock().await;
        let group = self.validate_group(&result.request)?;
        let mut rolled = GroupPromotionResult::begin(result.request.clone());
        rolled.id = result.id;
        let source = &rolled.request.source;

        if !group.constituents().unwrap_or_default().contains(source) {
            rolled.error = Some(format!("group {} does not contain member {source}", group.key));
        } else {
            rolled.changed = true;
            if !rolled.request.dry_run {
                let summary = format!("Removing {source} from membership of group {}", group.key);
                let updated = with_members(&group, |members| members.retain(|m| m != source));
                self.content
                    .stores()
                    .put(updated, ChangeSummary::system(summary))
                    .await?;
            }
        }
        Ok(self.finish_group(rolled, true))
    }

    fn validate_group(&self, request: &GroupPromotionRequest) -> ContentResult<Arc<ArtifactStore>> {
        if request.source == request.target_group {
            return Err(ContentError::Validation(
                "a group cannot be promoted into itself".to_string(),
            ));
        }
        let stores = self.content.stores();
        if !stores.contains(&request.source) {
            return Err(ContentError::Validation(format!(
                "source store {} does not exist",
                request.source
            )));
        }
        let group = stores.try_get(&request.target_group).ok_or_else(|| {
            ContentError::Validation(format!(
                "target group {} does not exist",
                request.target_group
            ))
        })?;
        if !group.is_group() {
            return Err(ContentError::Validation(format!(
                "target {} is not a group",
                request.target_group
            )));
        }
        if request.source.package_type() != group.key.package_type() {
            return Err(ContentError::Validation(format!(
                "{} and {} have different package types",
                request.source, request.target_group
            )));
        }
        Ok(group)
    }

    fn finish_group(&self, mut result: GroupPromotionResult, rollback: bool) -> GroupPromotionResult {
        result.finished_at = OffsetDateTime::now_utc();
        self.events
            .publish(DepotEvent::GroupPromotionCompleted(GroupPromotionCompletedEvent {
                result: result.clone(),
                rollback,
            }));
        result
    }
}

/// A copy of `group` with its member list edited by `edit`.
fn with_members(group: &ArtifactStore, edit: impl FnOnce(&mut Vec<StoreKey>)) -> ArtifactStore {
    let mut updated = group.clone();
    if let StoreKind::Group(settings) = &mut updated.kind {
        edit(&mut settings.constituents);
    }
    updated
}

fn dedup_paths(paths: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .map(|p| p.trim_start_matches('/').to_string())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// `true` if `store` already holds identical bytes at `path`, a conflict if
/// it holds different bytes, `false` if it holds nothing.
async fn holds_identical(store: &dyn ObjectStore, path: &str, data: &Bytes) -> ContentResult<bool> {
    match store.get(path).await {
        Ok(existing) => {
            if ContentHash::compute(&existing) == ContentHash::compute(data) {
                Ok(true)
            } else {
                Err(ContentError::Conflict(format!(
                    "{path} already exists with different content"
                )))
            }
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}
