//! Label resolution against a per-run cache

mod common;

use common::{create_test_label_info, system_labels, FakeGmailClient, MockGmailClient};
use futures::future::join_all;
use mail_triage::error::TriageError;
use mail_triage::label_resolver::{LabelCache, LabelResolver};
use mail_triage::models::EmailCategory;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_existing_label_is_found_without_creating() {
    let mut client = MockGmailClient::new();
    client.expect_list_labels().times(1).returning(|| {
        let mut labels = system_labels();
        labels.push(create_test_label_info("Label_42", "To Reply"));
        Ok(labels)
    });
    client.expect_create_label().never();

    let resolver = LabelResolver::new(Arc::new(client));
    let cache = LabelCache::new();

    let id = resolver.resolve_label_id(&cache, "to reply").await.unwrap();
    assert_eq!(id, "Label_42");
}

#[tokio::test]
async fn test_missing_label_is_created_once_across_resolutions() {
    let mut client = MockGmailClient::new();
    client
        .expect_list_labels()
        .times(1)
        .returning(|| Ok(system_labels()));
    client
        .expect_create_label()
        .withf(|name| name == "Receipt")
        .times(1)
        .returning(|_| Ok("Label_9".to_string()));

    let resolver = LabelResolver::new(Arc::new(client));
    let cache = LabelCache::new();

    let first = resolver.resolve_label_id(&cache, "Receipt").await.unwrap();
    let second = resolver.resolve_label_id(&cache, "Receipt").await.unwrap();

    assert_eq!(first, "Label_9");
    assert_eq!(second, "Label_9");
    assert!(cache.is_loaded().await);
}

#[tokio::test]
async fn test_concurrent_resolutions_create_label_once() {
    let client = Arc::new(FakeGmailClient::new().with_create_delay(Duration::from_millis(50)));
    let resolver = LabelResolver::new(client.clone());
    let cache = LabelCache::new();

    let ids = join_all((0..8).map(|_| resolver.resolve_label_id(&cache, "Meeting Update"))).await;

    let ids: Vec<String> = ids.into_iter().map(|id| id.unwrap()).collect();
    assert!(ids.iter().all(|id| id == &ids[0]));
    assert_eq!(client.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.list_label_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        client
            .labels()
            .iter()
            .filter(|label| label.name == "Meeting Update")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_concurrent_resolutions_of_different_names() {
    let client = Arc::new(FakeGmailClient::new().with_create_delay(Duration::from_millis(10)));
    let resolver = LabelResolver::new(client.clone());
    let cache = LabelCache::new();

    let names: Vec<&str> = EmailCategory::label_names().collect();
    let futures = names
        .iter()
        .chain(names.iter())
        .map(|name| resolver.resolve_label_id(&cache, name));
    let results = join_all(futures).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(client.create_calls.load(Ordering::SeqCst), names.len());
}

#[tokio::test]
async fn test_failed_create_is_not_cached() {
    let client = Arc::new(FakeGmailClient::new().with_failing_creates(1));
    let resolver = LabelResolver::new(client.clone());
    let cache = LabelCache::new();

    let err = resolver.resolve_label_id(&cache, "FYI").await.unwrap_err();
    assert!(matches!(err, TriageError::LabelError(_)));
    assert!(err.to_string().contains("FYI"));

    let id = resolver.resolve_label_id(&cache, "FYI").await.unwrap();
    assert_eq!(Some(id), client.label_id("FYI"));
    assert_eq!(client.create_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_list_failure_is_a_label_error() {
    let mut client = MockGmailClient::new();
    client
        .expect_list_labels()
        .returning(|| Err(TriageError::NetworkError("connection reset".to_string())));
    client.expect_create_label().never();

    let resolver = LabelResolver::new(Arc::new(client));
    let cache = LabelCache::new();

    let err = resolver.resolve_label_id(&cache, "FYI").await.unwrap_err();
    assert!(matches!(err, TriageError::LabelError(_)));
    assert!(!cache.is_loaded().await);
}

#[tokio::test]
async fn test_owned_label_ids_only_include_managed_names() {
    let client = Arc::new(
        FakeGmailClient::new()
            .with_label("Label_a", "Newsletter")
            .with_label("Label_b", "awaiting reply")
            .with_label("Label_c", "Newsletters"),
    );
    let resolver = LabelResolver::new(client.clone());
    let cache = LabelCache::new();

    let mut owned = resolver.list_owned_label_ids(&cache).await.unwrap();
    owned.sort();
    assert_eq!(owned, vec!["Label_a".to_string(), "Label_b".to_string()]);

    let all = resolver.list_all_labels(&cache).await.unwrap();
    assert_eq!(all.len(), system_labels().len() + 3);
    assert_eq!(client.list_label_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_created_labels_join_the_cache() {
    let client = Arc::new(FakeGmailClient::new());
    let resolver = LabelResolver::new(client.clone());
    let cache = LabelCache::new();

    let id = resolver.resolve_label_id(&cache, "Actioned").await.unwrap();
    let owned = resolver.list_owned_label_ids(&cache).await.unwrap();

    assert_eq!(owned, vec![id]);
    assert_eq!(client.list_label_calls.load(Ordering::SeqCst), 1);
}
