//! Scenario: Checkpoint Never Passes An Unacknowledged Publish
//!
//! # Invariant under test
//! The checkpoint only moves forward, and only after every publish of a run
//! is acknowledged. A run with one rejected publish leaves it untouched; the
//! next successful run republishes the whole window and advances to the max
//! timestamp seen.

use chrono::Duration;
use serde_json::json;
use ssx_db::CheckpointStore;
use ssx_runtime::ProducerError;
use ssx_schemas::{Classify, ErrorClass};
use ssx_testkit::{raw_record, record, shipment, t0, Pipeline, TEST_JOB};

#[tokio::test]
async fn rejected_publish_aborts_without_advancing() {
    let a = shipment("SHP-A", "ORD-A", "SHIPPED", t0());
    let b = shipment("SHP-B", "ORD-B", "SHIPPED", t0() + Duration::seconds(30));
    let p = Pipeline::new(vec![], vec![record(&a), record(&b)], t0())
        .await
        .unwrap();

    p.queue.reject_shipment("SHP-B");
    let err = p.producer.run(t0()).await.unwrap_err();
    assert!(matches!(err, ProducerError::Unacknowledged { failed: 1, attempted: 2, .. }));
    assert_eq!(err.class(), ErrorClass::TransientNetwork);
    assert!(p.store.load_checkpoint(TEST_JOB).await.unwrap().is_none());

    p.queue.clear_rejections();
    let report = p.producer.run(t0()).await.unwrap();
    assert_eq!(report.published, 2);
    assert_eq!(report.checkpoint_after, b.last_updated);
    assert_eq!(
        p.store.load_checkpoint(TEST_JOB).await.unwrap().unwrap().last_updated,
        b.last_updated
    );
}

#[tokio::test]
async fn checkpoint_is_max_published_timestamp_and_never_decreases() {
    let late = shipment("SHP-L", "ORD-L", "SHIPPED", t0() + Duration::hours(2));
    let early = shipment("SHP-E", "ORD-E", "SHIPPED", t0());
    let p = Pipeline::new(vec![], vec![record(&late), record(&early)], t0())
        .await
        .unwrap();

    let first = p.producer.run(t0()).await.unwrap();
    assert_eq!(first.since, chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);
    assert_eq!(first.checkpoint_after, late.last_updated);

    // An older candidate (e.g. an overlapping run) cannot pull it back.
    let stored = p
        .store
        .advance_checkpoint(TEST_JOB, t0() - Duration::days(1))
        .await
        .unwrap();
    assert_eq!(stored.last_updated, late.last_updated);

    let second = p.producer.run(t0() + Duration::hours(3)).await.unwrap();
    assert_eq!(second.since, late.last_updated);
    assert_eq!(second.published, 1);
    assert_eq!(second.checkpoint_after, late.last_updated);
}

#[tokio::test]
async fn invalid_records_are_skipped_and_do_not_move_the_checkpoint() {
    let good = shipment("SHP-G", "ORD-G", "SHIPPED", t0());
    let records = vec![
        record(&good),
        raw_record(json!({"status": "SHIPPED", "last_updated": "2030-01-01T00:00:00Z"})),
        raw_record(json!({"id": "SHP-X", "last_updated": "garbage"})),
    ];
    let p = Pipeline::new(vec![], records, t0()).await.unwrap();

    let report = p.producer.run(t0()).await.unwrap();
    // The unparsable timestamp never leaves the feed; the id-less record does.
    assert_eq!(report.fetched, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.published, 1);
    assert_eq!(report.checkpoint_after, good.last_updated);
}

#[tokio::test]
async fn feed_failure_aborts_before_any_publish() {
    let s = shipment("SHP-1", "ORD-1", "SHIPPED", t0());
    let p = Pipeline::new(vec![], vec![record(&s)], t0()).await.unwrap();

    p.feed.fail_next(1);
    let err = p.producer.run(t0()).await.unwrap_err();
    assert!(matches!(err, ProducerError::Feed(_)));
    assert!(p.queue.published().is_empty());
    assert!(p.store.load_checkpoint(TEST_JOB).await.unwrap().is_none());
}

#[tokio::test]
async fn empty_feed_is_a_normal_run() {
    let p = Pipeline::new(vec![], vec![], t0()).await.unwrap();
    let report = p.producer.run(t0()).await.unwrap();
    assert_eq!((report.fetched, report.published), (0, 0));
    assert_eq!(report.checkpoint_after, report.checkpoint_before);
}
