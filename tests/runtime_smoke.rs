use std::time::Duration;

use markstore::{
    config::BatchConfig,
    core::store::RecordStore,
    engine::{BatchEngine, ChunkStatus},
    op::MutationRequest,
    persist::memory::{MemorySink, MemorySnapshotStore},
    runtime::{MarkEvent, RuntimeConfig, RuntimeError, spawn_marks},
    types::Section,
};

fn engine(sink: &MemorySink) -> BatchEngine {
    BatchEngine::new(
        RecordStore::new(),
        Box::new(sink.clone()),
        Box::new(MemorySnapshotStore::new()),
    )
}

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<MarkEvent>) -> MarkEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event timeout")
        .expect("event")
}

#[tokio::test]
async fn runtime_runs_batches_and_emits_ordered_events() {
    let sink = MemorySink::new();
    let handle = spawn_marks(engine(&sink), RuntimeConfig::default());
    let mut events = handle.subscribe();

    let requests: Vec<MutationRequest> = (0..7)
        .map(|i| MutationRequest::set(Section::Mark, format!("60000{i}"), "3"))
        .collect();
    let report = handle.run_batch(requests).await.expect("batch");
    assert!(report.is_clean());
    assert_eq!(report.total_chunks, 2);

    assert_eq!(
        next_event(&mut events).await,
        MarkEvent::BatchStarted { batch: 1, items: 7 }
    );
    assert_eq!(
        next_event(&mut events).await,
        MarkEvent::ChunkCommitted {
            batch: 1,
            chunk: 0,
            version: 1
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        MarkEvent::ChunkCommitted {
            batch: 1,
            chunk: 1,
            version: 2
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        MarkEvent::BatchFinished {
            batch: 1,
            success_rate: 100.0,
            version: 2
        }
    );

    assert_eq!(handle.version().await.expect("version"), 2);
    let view = handle.cache().get("600003").expect("key").expect("view");
    assert_eq!(view.mark.as_deref(), Some("3"));
    assert_eq!(sink.writes(), 2);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn runtime_reports_rollbacks_and_stop_on_failure() {
    let sink = MemorySink::new();
    let handle = spawn_marks(engine(&sink), RuntimeConfig::default());
    let mut events = handle.subscribe();

    let requests = vec![
        MutationRequest::set(Section::Mark, "600000", "3"),
        MutationRequest::set(Section::Mark, "600001", "0"),
        MutationRequest::set(Section::Mark, "600002", "3"),
    ];
    let config = BatchConfig {
        chunk_size: 2,
        continue_on_failure: false,
        ..BatchConfig::default()
    };
    let report = handle
        .run_batch_with(requests, config)
        .await
        .expect("batch");
    assert_eq!(report.chunks[0].status, ChunkStatus::RolledBack);
    assert_eq!(report.chunks[1].status, ChunkStatus::Skipped);

    assert!(matches!(next_event(&mut events).await, MarkEvent::BatchStarted { .. }));
    assert_eq!(
        next_event(&mut events).await,
        MarkEvent::ChunkRolledBack { batch: 1, chunk: 0 }
    );
    assert_eq!(
        next_event(&mut events).await,
        MarkEvent::ChunkSkipped { batch: 1, chunk: 1 }
    );
    assert!(matches!(
        next_event(&mut events).await,
        MarkEvent::BatchFinished { version: 0, .. }
    ));
    assert_eq!(handle.version().await.expect("version"), 0);
    assert_eq!(sink.writes(), 0);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn batch_errors_surface_and_shutdown_closes_the_handle() {
    let sink = MemorySink::new();
    let handle = spawn_marks(engine(&sink), RuntimeConfig::default());

    let bad = BatchConfig {
        chunk_size: 0,
        ..BatchConfig::default()
    };
    let err = handle
        .run_batch_with(vec![MutationRequest::set(Section::Tip, "600000", "x")], bad)
        .await
        .expect_err("invalid config");
    assert!(matches!(err, RuntimeError::Batch(_)), "{err}");

    handle.shutdown().await.expect("shutdown");
    tokio::time::sleep(Duration::from_millis(20)).await;
    let err = handle.run_batch(Vec::new()).await.expect_err("closed");
    assert!(matches!(err, RuntimeError::ChannelClosed), "{err}");
}
