//! Index invalidation driven by store and content changes. Every check runs
//! right after the triggering call returns, with no waiting.

mod common;

use bytes::Bytes;
use common::{Harness, SlowBackend, key, test_change, test_content_config};
use depot_content::{ContentError, IndexLookup};
use depot_core::config::{ContentConfig, PromotionConfig};
use depot_core::{ArtifactStore, PathStyle};
use depot_storage::ObjectStore;
use std::time::Duration;

const JAR: &str = "org/foo/1.0/foo-1.0.jar";

#[tokio::test]
async fn test_added_member_takes_precedence_immediately() {
    let h = Harness::new().await;
    let a = h.hosted("maven:hosted:a").await;
    let b = h.hosted("maven:hosted:b").await;
    h.upload(&a, JAR, "a").await;
    h.upload(&b, JAR, "b").await;
    let group = h.group("maven:group:public", &[&a]).await;

    assert_eq!(h.read(&group, JAR).await.unwrap().0, a);
    assert_eq!(h.content.index().lookup(&group, JAR), IndexLookup::Hit(a.clone()));

    h.group("maven:group:public", &[&b, &a]).await;
    assert_eq!(h.content.index().lookup(&group, JAR), IndexLookup::Miss);
    let (origin, body) = h.read(&group, JAR).await.unwrap();
    assert_eq!(origin, b);
    assert_eq!(body, Bytes::from("b"));
}

#[tokio::test]
async fn test_removed_member_stops_serving_immediately() {
    let h = Harness::new().await;
    let a = h.hosted("maven:hosted:a").await;
    let b = h.hosted("maven:hosted:b").await;
    h.upload(&a, JAR, "a").await;
    h.upload(&b, JAR, "b").await;
    let group = h.group("maven:group:public", &[&a, &b]).await;
    assert_eq!(h.read(&group, JAR).await.unwrap().0, a);

    h.group("maven:group:public", &[&b]).await;
    assert_eq!(h.read(&group, JAR).await.unwrap().0, b);
}

#[tokio::test]
async fn test_reorder_invalidates_group() {
    let h = Harness::new().await;
    let a = h.hosted("maven:hosted:a").await;
    let b = h.hosted("maven:hosted:b").await;
    h.upload(&a, JAR, "a").await;
    h.upload(&b, JAR, "b").await;
    let group = h.group("maven:group:public", &[&a, &b]).await;
    assert_eq!(h.read(&group, JAR).await.unwrap().0, a);

    h.group("maven:group:public", &[&b, &a]).await;
    assert_eq!(h.read(&group, JAR).await.unwrap().0, b);
}

#[tokio::test]
async fn test_change_in_nested_group_reaches_outer_group() {
    let h = Harness::new().await;
    let a = h.hosted("maven:hosted:a").await;
    let b = h.hosted("maven:hosted:b").await;
    h.upload(&a, JAR, "a").await;
    h.upload(&b, JAR, "b").await;
    let inner = h.group("maven:group:inner", &[&a]).await;
    let outer = h.group("maven:group:outer", &[&inner]).await;
    assert_eq!(h.read(&outer, JAR).await.unwrap().0, a);

    h.group("maven:group:inner", &[&b, &a]).await;
    assert_eq!(h.read(&outer, JAR).await.unwrap().0, b);
}

#[tokio::test]
async fn test_unrelated_entries_survive_membership_change() {
    let h = Harness::new().await;
    let a = h.hosted("maven:hosted:a").await;
    let b = h.hosted("maven:hosted:b").await;
    let c = h.hosted("maven:hosted:c").await;
    h.upload(&a, JAR, "a").await;
    let group = h.group("maven:group:public", &[&a, &b]).await;
    let other = h.group("maven:group:other", &[&a]).await;
    h.read(&group, JAR).await.unwrap();
    h.read(&other, JAR).await.unwrap();

    // c lands after a, so a keeps precedence in public; other is untouched.
    h.group("maven:group:public", &[&a, &b, &c]).await;
    assert_eq!(h.content.index().lookup(&group, JAR), IndexLookup::Hit(a.clone()));
    assert_eq!(h.content.index().lookup(&other, JAR), IndexLookup::Hit(a.clone()));
}

#[tokio::test]
async fn test_upload_invalidates_containing_groups() {
    let h = Harness::new().await;
    let a = h.hosted("maven:hosted:a").await;
    let b = h.hosted("maven:hosted:b").await;
    h.upload(&b, JAR, "b").await;
    let group = h.group("maven:group:public", &[&a, &b]).await;
    assert_eq!(h.read(&group, JAR).await.unwrap().0, b);

    h.upload(&a, JAR, "a").await;
    let (origin, body) = h.read(&group, JAR).await.unwrap();
    assert_eq!(origin, a);
    assert_eq!(body, Bytes::from("a"));

    assert!(h.content.delete(&a, JAR).await.unwrap());
    assert_eq!(h.read(&group, JAR).await.unwrap().0, b);
    assert!(!h.content.delete(&a, JAR).await.unwrap());
}

#[tokio::test]
async fn test_deleted_store_no_longer_serves_through_groups() {
    let h = Harness::new().await;
    let a = h.hosted("maven:hosted:a").await;
    let b = h.hosted("maven:hosted:b").await;
    h.upload(&a, JAR, "a").await;
    h.upload(&b, JAR, "b").await;
    let group = h.group("maven:group:public", &[&a, &b]).await;
    assert_eq!(h.read(&group, JAR).await.unwrap().0, a);

    assert!(h.stores().delete(&a, test_change()).await.unwrap());
    assert_eq!(h.read(&group, JAR).await.unwrap().0, b);
    assert!(h.read(&a, JAR).await.is_err());
}

#[tokio::test]
async fn test_store_update_invalidates_its_own_entries() {
    let h = Harness::new().await;
    let a = h.hosted("maven:hosted:a").await;
    h.upload(&a, JAR, "a").await;
    h.read(&a, JAR).await.unwrap();
    assert_eq!(h.content.index().lookup(&a, JAR), IndexLookup::Hit(a.clone()));

    let mut updated = ArtifactStore::hosted(a.clone());
    updated.description = Some("now documented".to_string());
    h.put_store(updated).await;
    assert_eq!(h.content.index().lookup(&a, JAR), IndexLookup::Miss);
}

#[tokio::test]
async fn test_missing_paths_are_remembered_until_invalidated() {
    let h = Harness::with_config(
        ContentConfig {
            cache_missing: true,
            ..test_content_config()
        },
        PromotionConfig::default(),
    )
    .await;
    let a = h.hosted("maven:hosted:a").await;
    let group = h.group("maven:group:public", &[&a]).await;

    assert!(h.read(&group, JAR).await.unwrap_err().is_not_found());
    assert_eq!(h.content.index().lookup(&group, JAR), IndexLookup::Missing);

    // Written behind the manager's back: the tombstone still answers.
    let store = h.stores().get(&a).unwrap();
    let backend = h.accessors.accessor(&store).await.unwrap().unwrap();
    backend.put(JAR, Bytes::from("sneaky")).await.unwrap();
    assert!(h.read(&group, JAR).await.unwrap_err().is_not_found());

    // An upload through the manager clears it.
    h.upload(&a, JAR, "a").await;
    assert_eq!(h.read(&group, JAR).await.unwrap().0, a);
}

#[tokio::test]
async fn test_missing_paths_not_remembered_by_default() {
    let h = Harness::new().await;
    let a = h.hosted("maven:hosted:a").await;
    let group = h.group("maven:group:public", &[&a]).await;

    assert!(h.read(&group, JAR).await.is_err());
    assert_eq!(h.content.index().lookup(&group, JAR), IndexLookup::Miss);
}

#[tokio::test]
async fn test_disabled_index_always_resolves() {
    let h = Harness::with_config(
        ContentConfig {
            index_enabled: false,
            ..test_content_config()
        },
        PromotionConfig::default(),
    )
    .await;
    let a = h.hosted("maven:hosted:a").await;
    h.upload(&a, JAR, "a").await;
    let group = h.group("maven:group:public", &[&a]).await;

    h.read(&group, JAR).await.unwrap();
    assert!(h.content.index().is_empty());
    assert_eq!(h.content.index().lookup(&group, JAR), IndexLookup::Miss);
}

#[tokio::test]
async fn test_unknown_member_rejected_without_touching_index() {
    let h = Harness::new().await;
    let a = h.hosted("maven:hosted:a").await;
    h.upload(&a, JAR, "a").await;
    let group = h.group("maven:group:public", &[&a]).await;
    h.read(&group, JAR).await.unwrap();

    let result = h
        .stores()
        .put(
            ArtifactStore::group(group.clone(), [key("maven:hosted:ghost"), a.clone()]),
            test_change(),
        )
        .await;
    assert!(result.is_err());
    assert_eq!(h.content.index().lookup(&group, JAR), IndexLookup::Hit(a));
}

#[tokio::test]
async fn test_resolution_racing_member_removal_leaves_no_entry() {
    let h = Harness::new().await;
    let a = h.hosted("maven:hosted:a").await;
    let slow = SlowBackend::new(Duration::from_millis(150));
    slow.inner.put(JAR, Bytes::from("removed")).await.unwrap();
    let removed = h.remote("maven:remote:removed", slow).await;
    let group = h.group("maven:group:public", &[&a, &removed]).await;

    let (in_flight, _) = tokio::join!(h.read(&group, JAR), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.group("maven:group:public", &[&a]).await;
    });
    // The read started before the removal, so it may still see the member.
    assert_eq!(in_flight.unwrap().0, removed);

    assert_ne!(
        h.content.index().lookup(&group, JAR),
        IndexLookup::Hit(removed.clone())
    );
    assert!(matches!(
        h.read(&group, JAR).await,
        Err(ContentError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_authoritative_index_answers_for_hosted_store() {
    let h = Harness::new().await;
    let a = key("maven:hosted:a");
    let mut store = ArtifactStore::hosted(a.clone());
    store.authoritative_index = true;
    h.put_store(store.clone()).await;
    h.upload(&a, JAR, "a").await;
    assert_eq!(h.read(&a, JAR).await.unwrap().1, Bytes::from("a"));

    // Written behind the manager's back: not in the listing, so not found.
    let sneaky = "org/foo/1.0/foo-1.0-sources.jar";
    let backend = h.accessors.accessor(&store).await.unwrap().unwrap();
    backend.put(sneaky, Bytes::from("sneaky")).await.unwrap();
    assert!(h.read(&a, sneaky).await.unwrap_err().is_not_found());

    // Uploads and deletes through the manager keep the listing current.
    let pom = "org/foo/1.0/foo-1.0.pom";
    h.upload(&a, pom, "pom").await;
    assert_eq!(h.read(&a, pom).await.unwrap().1, Bytes::from("pom"));
    assert!(h.content.delete(&a, JAR).await.unwrap());
    assert!(h.read(&a, JAR).await.unwrap_err().is_not_found());

    // Updating the definition drops the listing; the next read reloads it.
    store.description = Some("reindexed".to_string());
    h.put_store(store).await;
    assert_eq!(h.read(&a, sneaky).await.unwrap().1, Bytes::from("sneaky"));
}

#[tokio::test]
async fn test_hashed_store_serves_requested_paths() {
    let h = Harness::new().await;
    let a = key("maven:hosted:spread");
    let mut store = ArtifactStore::hosted(a.clone());
    store.path_style = PathStyle::Hashed;
    h.put_store(store).await;
    h.upload(&a, JAR, "jar").await;
    h.upload(&a, "org/foo/2.0/foo-2.0.jar", "jar2").await;
    let group = h.group("maven:group:public", &[&a]).await;

    assert_eq!(h.read(&group, JAR).await.unwrap(), (a.clone(), Bytes::from("jar")));
    let (_, names) = h.list(&group, "org/foo/").await.unwrap();
    assert_eq!(names, vec!["1.0/", "2.0/"]);
    assert_eq!(
        h.content.list_paths(&a).await.unwrap(),
        vec![JAR.to_string(), "org/foo/2.0/foo-2.0.jar".to_string()]
    );
}
