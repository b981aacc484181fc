//! Batch processing: accounting, skip rules, label payloads and dry runs

mod common;

use common::{
    create_labeled_message, create_test_label_info, create_test_message, page, system_labels,
    FakeGmailClient, MockClassifier, MockGmailClient, ScriptedClassifier,
};
use mail_triage::batch::{BatchOptions, BatchProcessor};
use mail_triage::client::INBOX_LABEL;
use mail_triage::error::TriageError;
use mail_triage::label_resolver::LabelCache;
use mail_triage::models::{EmailCategory, Scope};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn options() -> BatchOptions {
    BatchOptions {
        page_size: 25,
        concurrency: 4,
        dry_run: false,
    }
}

#[tokio::test]
async fn test_accounting_with_fetch_and_classification_failures() {
    let messages = vec![
        create_test_message("m1", "boss@example.com", "Can you review this?"),
        create_test_message("m2", "shop@example.com", "Your receipt"),
        create_test_message("m3", "news@example.com", "Weekly digest"),
        create_test_message("m4", "ci@example.com", "Build passed"),
        create_test_message("m5", "cal@example.com", "Invitation: standup"),
        create_test_message("m6", "promo@example.com", "50% off"),
    ];
    let client = Arc::new(
        FakeGmailClient::new()
            .with_page(None, messages, Some("page-2"))
            .with_failing_get("m3")
            .with_failing_get("m6"),
    );
    let classifier = Arc::new(
        ScriptedClassifier::always(EmailCategory::Fyi)
            .answer("m1", EmailCategory::ToReply)
            .answer("m2", EmailCategory::Receipt)
            .fail("m4"),
    );

    let processor = BatchProcessor::new(client.clone(), classifier.clone(), options());
    let result = processor
        .process_batch(Scope::Inbox, None, &LabelCache::new())
        .await
        .unwrap();

    // Two messages could not be fetched and are not counted at all
    assert_eq!(result.total, 4);
    assert_eq!(result.processed, 3);
    assert_eq!(result.errors, 1);
    assert_eq!(result.skipped, 0);
    assert_eq!(result.processed + result.skipped + result.errors, result.total);
    assert_eq!(result.results.len(), result.processed);
    assert_eq!(result.next_page_token.as_deref(), Some("page-2"));

    let categories: Vec<(String, EmailCategory)> = result
        .results
        .iter()
        .map(|c| (c.message.id.clone(), c.category))
        .collect();
    assert_eq!(
        categories,
        vec![
            ("m1".to_string(), EmailCategory::ToReply),
            ("m2".to_string(), EmailCategory::Receipt),
            ("m5".to_string(), EmailCategory::Fyi),
        ]
    );

    assert_eq!(classifier.calls.load(Ordering::SeqCst), 4);
    let mut modified = client.modified_ids();
    modified.sort();
    assert_eq!(modified, vec!["m1", "m2", "m5"]);
}

#[tokio::test]
async fn test_label_is_added_without_touching_other_labels() {
    let mut client = MockGmailClient::new();
    client
        .expect_list_messages()
        .times(1)
        .returning(|_| Ok(page(&["m1"], None)));
    client
        .expect_get_message()
        .returning(|id| Ok(create_test_message(id, "boss@example.com", "Question")));
    client.expect_list_labels().times(1).returning(|| {
        let mut labels = system_labels();
        labels.push(create_test_label_info("Label_7", "To Reply"));
        Ok(labels)
    });
    client.expect_create_label().never();
    client
        .expect_modify_message()
        .withf(|id, change| {
            id == "m1"
                && change.add_label_ids == vec!["Label_7".to_string()]
                && change.remove_label_ids.is_empty()
                && !change.removes(INBOX_LABEL)
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let mut classifier = MockClassifier::new();
    classifier
        .expect_classify()
        .times(1)
        .returning(|_| Ok(EmailCategory::ToReply));

    let processor = BatchProcessor::new(Arc::new(client), Arc::new(classifier), options());
    let result = processor
        .process_batch(Scope::Inbox, None, &LabelCache::new())
        .await
        .unwrap();

    assert_eq!(result.processed, 1);
    assert!(result.next_page_token.is_none());
}

#[tokio::test]
async fn test_list_request_carries_query_cursor_and_page_size() {
    let mut client = MockGmailClient::new();
    client
        .expect_list_messages()
        .withf(|request| {
            request.query.starts_with("-in:spam -in:trash")
                && request.query.contains("-label:\"Awaiting Reply\"")
                && request.page_token.as_deref() == Some("cursor-3")
                && request.max_results == 25
        })
        .times(1)
        .returning(|_| Ok(page(&[], None)));
    client.expect_list_labels().never();

    let mut classifier = MockClassifier::new();
    classifier.expect_classify().never();

    let processor = BatchProcessor::new(Arc::new(client), Arc::new(classifier), options());
    let result = processor
        .process_batch(Scope::All, Some("cursor-3"), &LabelCache::new())
        .await
        .unwrap();

    assert_eq!(result.total, 0);
    assert!(result.results.is_empty());
}

#[tokio::test]
async fn test_messages_with_managed_labels_are_skipped() {
    let client = Arc::new(
        FakeGmailClient::new()
            .with_label("Label_news", "Newsletter")
            .with_page(
                None,
                vec![
                    create_labeled_message("m1", &["Label_news"]),
                    create_labeled_message("m2", &["Label_travel"]),
                ],
                None,
            ),
    );
    let classifier = Arc::new(ScriptedClassifier::always(EmailCategory::Marketing));

    let processor = BatchProcessor::new(client.clone(), classifier.clone(), options());
    let result = processor
        .process_batch(Scope::Inbox, None, &LabelCache::new())
        .await
        .unwrap();

    assert_eq!(result.total, 2);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.processed, 1);
    assert_eq!(result.results[0].message.id, "m2");
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.modified_ids(), vec!["m2"]);
}

#[tokio::test]
async fn test_label_failures_are_counted_per_message() {
    let client = Arc::new(
        FakeGmailClient::new()
            .with_page(
                None,
                vec![
                    create_test_message("m1", "a@example.com", "One"),
                    create_test_message("m2", "b@example.com", "Two"),
                ],
                None,
            )
            .with_failing_modify("m2"),
    );
    let classifier = Arc::new(ScriptedClassifier::always(EmailCategory::Notification));

    let processor = BatchProcessor::new(client.clone(), classifier, options());
    let result = processor
        .process_batch(Scope::Inbox, None, &LabelCache::new())
        .await
        .unwrap();

    assert_eq!(result.total, 2);
    assert_eq!(result.processed, 1);
    assert_eq!(result.errors, 1);
    assert_eq!(client.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_create_failure_fails_only_that_message() {
    let client = Arc::new(
        FakeGmailClient::new()
            .with_page(
                None,
                vec![create_test_message("m1", "a@example.com", "One")],
                None,
            )
            .with_failing_creates(1),
    );
    let classifier = Arc::new(ScriptedClassifier::always(EmailCategory::Comment));

    let processor = BatchProcessor::new(client.clone(), classifier, options());
    let result = processor
        .process_batch(Scope::Inbox, None, &LabelCache::new())
        .await
        .unwrap();

    assert_eq!(result.errors, 1);
    assert_eq!(result.processed, 0);
    assert!(client.modified_ids().is_empty());
}

#[tokio::test]
async fn test_list_failure_fails_the_batch() {
    let mut client = MockGmailClient::new();
    client.expect_list_messages().returning(|_| {
        Err(TriageError::AuthError("token expired".to_string()))
    });
    client.expect_get_message().never();

    let mut classifier = MockClassifier::new();
    classifier.expect_classify().never();

    let processor = BatchProcessor::new(Arc::new(client), Arc::new(classifier), options());
    let err = processor
        .process_batch(Scope::Inbox, None, &LabelCache::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TriageError::AuthError(_)));
}

#[tokio::test]
async fn test_dry_run_classifies_without_labeling() {
    let client = Arc::new(FakeGmailClient::new().with_page(
        None,
        vec![
            create_test_message("m1", "a@example.com", "One"),
            create_test_message("m2", "b@example.com", "Two"),
        ],
        None,
    ));
    let classifier = Arc::new(ScriptedClassifier::always(EmailCategory::Newsletter));

    let processor = BatchProcessor::new(
        client.clone(),
        classifier,
        BatchOptions {
            dry_run: true,
            ..options()
        },
    );
    let result = processor
        .process_batch(Scope::Inbox, None, &LabelCache::new())
        .await
        .unwrap();

    assert_eq!(result.processed, 2);
    assert!(result
        .results
        .iter()
        .all(|c| c.category == EmailCategory::Newsletter));
    assert_eq!(client.create_calls.load(Ordering::SeqCst), 0);
    assert!(client.modified_ids().is_empty());
}

#[tokio::test]
async fn test_cache_is_shared_across_batches() {
    let client = Arc::new(
        FakeGmailClient::new()
            .with_page(
                None,
                vec![create_test_message("m1", "a@example.com", "One")],
                Some("p2"),
            )
            .with_page(
                Some("p2"),
                vec![create_test_message("m2", "b@example.com", "Two")],
                None,
            ),
    );
    let classifier = Arc::new(ScriptedClassifier::always(EmailCategory::Receipt));
    let processor = BatchProcessor::new(client.clone(), classifier, options());
    let cache = LabelCache::new();

    let first = processor.process_batch(Scope::Inbox, None, &cache).await.unwrap();
    let second = processor
        .process_batch(Scope::Inbox, first.next_page_token.as_deref(), &cache)
        .await
        .unwrap();

    assert_eq!(first.processed + second.processed, 2);
    assert!(second.next_page_token.is_none());
    assert_eq!(client.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.list_label_calls.load(Ordering::SeqCst), 1);

    let label_id = client.label_id("Receipt").unwrap();
    for (_, change) in client.modifications.lock().unwrap().iter() {
        assert_eq!(change.add_label_ids, vec![label_id.clone()]);
    }
}
