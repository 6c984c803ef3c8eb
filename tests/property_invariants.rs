use proptest::prelude::*;

use markstore::{
    config::BatchConfig,
    core::store::RecordStore,
    engine::{BatchEngine, ChunkStatus, ItemStatus},
    op::{MutationOp, MutationRequest},
    persist::memory::{MemorySink, MemorySnapshotStore},
    types::{Section, StockKey},
};

fn request_strategy() -> impl Strategy<Value = MutationRequest> {
    let code = prop::sample::select(vec!["000001", "600519", "300750", "830799", "999999", "12"]);
    let op = prop_oneof![
        prop::sample::select(vec!["1", "5", "9", "0"])
            .prop_map(|v| (Section::Mark, MutationOp::Set(v.to_string()))),
        prop::sample::select(vec!["note", "a=b", ""])
            .prop_map(|v| (Section::Tip, MutationOp::Set(v.to_string()))),
        prop::sample::select(vec!["白酒", "消费/医药", "a"])
            .prop_map(|v| (Section::Tipword, MutationOp::Set(v.to_string()))),
        prop::sample::select(vec!["白酒", "a"])
            .prop_map(|v| (Section::Tipword, MutationOp::DeleteTokens(vec![v.to_string()]))),
        Just((Section::Tip, MutationOp::DeleteTokens(vec!["note".to_string()]))),
        prop::sample::select(Section::ALL.to_vec()).prop_map(|s| (s, MutationOp::DeleteValue)),
        Just((Section::Mark, MutationOp::DeleteAllForKey)),
    ];
    (code, op).prop_map(|(code, (section, op))| MutationRequest::new(section, code, op))
}

fn seed() -> RecordStore {
    RecordStore::load("[MARK]\n00000001=2\n\n[TIPWORD]\n01600519=白酒/老字号\n").expect("seed")
}

proptest! {
    #[test]
    fn only_committed_chunks_reach_the_store(
        requests in prop::collection::vec(request_strategy(), 0..40),
        chunk_size in 1usize..7,
        threshold in prop::sample::select(vec![0.0, 50.0, 80.0, 100.0]),
    ) {
        let sink = MemorySink::new();
        let mut engine = BatchEngine::new(
            seed(),
            Box::new(sink.clone()),
            Box::new(MemorySnapshotStore::new()),
        );
        let config = BatchConfig {
            chunk_size,
            success_threshold: threshold,
            ..BatchConfig::default()
        };

        let report = engine.run(&requests, &config).expect("batch");

        // Report arithmetic.
        let applied: usize = report.chunks.iter().map(|c| c.applied()).sum();
        prop_assert_eq!(report.total_items, requests.len());
        prop_assert_eq!(report.chunks.iter().map(|c| c.len()).sum::<usize>(), requests.len());
        if requests.is_empty() {
            prop_assert_eq!(report.overall_success_rate, 0.0);
        } else {
            let expected = 100.0 * applied as f64 / requests.len() as f64;
            prop_assert!((report.overall_success_rate - expected).abs() < 1e-9);
        }
        prop_assert_eq!(
            report.committed_chunks + report.rolled_back_chunks + report.failed_chunks + report.skipped_chunks,
            report.total_chunks
        );

        // Replaying the applied items of committed chunks on the seed must
        // reproduce the published store exactly.
        let mut model = seed();
        for chunk in &report.chunks {
            match chunk.status {
                ChunkStatus::Committed => {
                    prop_assert!(chunk.success_rate >= threshold);
                    for item in chunk.items.iter().filter(|i| i.is_applied()) {
                        let req = &requests[item.index];
                        let key = item.key.clone().expect("applied item has a key");
                        model.apply(req.section, &key, &req.op).expect("model apply");
                    }
                }
                ChunkStatus::RolledBack => {
                    prop_assert!(chunk.success_rate < threshold);
                    prop_assert!(chunk.items.iter().all(|i| i.status != ItemStatus::Applied));
                }
                ChunkStatus::Failed | ChunkStatus::Skipped => {
                    prop_assert!(false, "unexpected chunk status {:?}", chunk.status);
                }
            }
        }
        prop_assert_eq!(&*engine.store(), &model);

        if report.committed_chunks > 0 {
            prop_assert_eq!(sink.last_store().expect("parse"), Some(model));
            prop_assert_eq!(engine.version(), report.committed_chunks as u64);
        } else {
            prop_assert_eq!(sink.writes(), 0);
        }

        for item in report.items() {
            if let Some(key) = &item.key {
                prop_assert_eq!(key, &StockKey::resolve(&requests[item.index].code).expect("key"));
            }
        }
    }
}
