//! Dispatch cycles against an on-disk spool and a live HTTP endpoint.

use std::{sync::Arc, time::Duration};

use httpmock::prelude::*;
use mailhook_common::Signal;
use mailhook_delivery::{DispatchProcessor, Recipient, RecipientDirectory, WebhookConfig};
use mailhook_spool::{BackingStore, FileBackingStore, Message, SpooledMessageId};
use serde_json::json;
use tokio::sync::broadcast;

fn file_spool(dir: &tempfile::TempDir) -> Arc<FileBackingStore> {
    let store = FileBackingStore::builder()
        .path(dir.path().join("mails"))
        .build()
        .unwrap();
    store.init().unwrap();
    Arc::new(store)
}

fn processor(
    spool: Arc<dyn BackingStore>,
    recipients: Vec<Recipient>,
    interval_secs: u64,
) -> DispatchProcessor {
    let mut processor = DispatchProcessor::default();
    processor.interval_secs = interval_secs;
    processor.record_delay_secs = 0;
    processor.webhook = WebhookConfig {
        timeout_secs: Some(5),
        ..WebhookConfig::default()
    };
    processor
        .init(spool, Arc::new(RecipientDirectory::new(recipients)))
        .unwrap();
    processor
}

#[tokio::test]
async fn delivered_records_leave_the_spool() {
    let server = MockServer::start_async().await;
    let hook = server
        .mock_async(|when, then| {
            when.method(POST).path("/hooks/ops").json_body(json!({
                "text": "Disk full",
                "username": "mailhook",
                "icon_emoji": ":email:",
            }));
            then.status(200).body("ok");
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let spool = file_spool(&dir);
    let id = spool
        .write(&Message::new(
            "<monitor@example.org>",
            "<ops@x.com>",
            "Subject: Disk full\r\n\r\n/var is at 99%\r\n",
        ))
        .await
        .unwrap();

    let processor = processor(
        spool.clone(),
        vec![Recipient::new("ops@x.com", server.url("/hooks/ops"))],
        5,
    );

    let report = processor.run_once().await.unwrap();
    assert_eq!(report.delivered, 1);
    hook.assert_hits_async(1).await;

    assert!(spool.list().await.unwrap().is_empty());
    assert!(!dir.path().join("mails").join(id.record_filename()).exists());
    // The readable copy is not part of the record's lifecycle
    assert!(dir.path().join("mails").join(id.body_filename()).exists());
}

#[tokio::test]
async fn rejected_records_stay_for_the_next_cycle() {
    let server = MockServer::start_async().await;
    let hook = server
        .mock_async(|when, then| {
            when.method(POST).path("/hooks/down");
            then.status(503).body("maintenance");
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let spool = file_spool(&dir);
    spool
        .write(&Message::new(
            "<monitor@example.org>",
            "<dev@x.com>",
            "Subject: Build failed\r\n\r\n",
        ))
        .await
        .unwrap();

    let processor = processor(
        spool.clone(),
        vec![Recipient::new("dev@x.com", server.url("/hooks/down"))],
        5,
    );

    let report = processor.run_once().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(spool.list().await.unwrap().len(), 1);

    let report = processor.run_once().await.unwrap();
    assert_eq!(report.failed, 1);
    hook.assert_hits_async(2).await;
    assert_eq!(spool.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn corrupt_record_is_skipped_and_kept() {
    let server = MockServer::start_async().await;
    let hook = server
        .mock_async(|when, then| {
            when.method(POST).path("/hooks/ops");
            then.status(200);
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let spool = file_spool(&dir);

    // Sorts ahead of anything written now, so it is handled first
    let corrupt = dir.path().join("mails").join("20000101000000.bin");
    std::fs::write(&corrupt, b"not a record").unwrap();

    spool
        .write(&Message::new(
            "<monitor@example.org>",
            "<ops@x.com>",
            "Subject: Disk full\r\n\r\n",
        ))
        .await
        .unwrap();
    assert_eq!(spool.list().await.unwrap().len(), 2);

    let processor = processor(
        spool.clone(),
        vec![Recipient::new("ops@x.com", server.url("/hooks/ops"))],
        5,
    );

    let report = processor.run_once().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 1);
    hook.assert_hits_async(1).await;

    assert!(corrupt.exists());
    assert_eq!(
        spool.list().await.unwrap(),
        ["20000101000000".parse::<SpooledMessageId>().unwrap()]
    );
}

#[tokio::test]
async fn missing_spool_directory_is_an_empty_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileBackingStore::builder()
        .path(dir.path().join("never-created"))
        .build()
        .unwrap();

    let processor = processor(Arc::new(store), Vec::new(), 5);

    let report = processor.run_once().await.unwrap();
    assert_eq!(report.attempted(), 0);
}

#[tokio::test]
async fn serve_dispatches_on_tick() {
    let server = MockServer::start_async().await;
    let hook = server
        .mock_async(|when, then| {
            when.method(POST).path("/hook");
            then.status(200);
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let spool = file_spool(&dir);
    spool
        .write(&Message::new(
            "<monitor@example.org>",
            "Operations <ops@x.com>",
            "Subject: Backup complete\r\n\r\n",
        ))
        .await
        .unwrap();

    let processor = processor(
        spool.clone(),
        vec![Recipient::new("ops@x.com", server.url("/hook"))],
        1,
    );

    let (tx, rx) = broadcast::channel(4);
    let handle = tokio::spawn(async move { processor.serve(rx).await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !spool.list().await.unwrap().is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "record was never dispatched"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    hook.assert_hits_async(1).await;

    tx.send(Signal::Shutdown).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
