use tempfile::TempDir;

use encoding_rs::GBK;
use markstore::{
    config::{BatchConfig, FileEncoding, Settings},
    core::store::RecordStore,
    engine::BatchEngine,
    op::MutationRequest,
    persist::{
        PersistError, SnapshotStore, SnapshotToken, StoreSink,
        file::{AtomicFileSink, decode, load_mark_file},
        sqlite::SqliteSnapshotStore,
    },
    types::{Section, StockKey},
};

fn key(code: &str) -> StockKey {
    StockKey::resolve(code).expect("key")
}

fn sample() -> RecordStore {
    RecordStore::load("[MARK]\n01600519=3\n\n[TIPWORD]\n00000858=白酒/消费\n").expect("sample")
}

#[test]
fn atomic_sink_replaces_file_without_leftovers() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("mark.dat");
    std::fs::write(&path, "[TIP]\n01600519=old\n").expect("seed file");

    let mut sink = AtomicFileSink::new(&path);
    let store = sample();
    sink.persist(&store).expect("persist");

    let bytes = std::fs::read(&path).expect("read");
    assert_eq!(bytes, GBK.encode(&store.serialize()).0.into_owned());
    assert_eq!(sink.load().expect("load"), store);
    let entries = std::fs::read_dir(tmp.path()).expect("dir").count();
    assert_eq!(entries, 1);
}

#[test]
fn missing_mark_file_loads_empty_and_malformed_fails() {
    let tmp = TempDir::new().expect("tmp");
    let store = load_mark_file(tmp.path().join("absent.dat"), FileEncoding::Gbk).expect("load");
    assert!(store.is_empty());

    let bad = tmp.path().join("bad.dat");
    std::fs::write(&bad, "[MARK]\n01600519=x\n").expect("write");
    let err = load_mark_file(&bad, FileEncoding::Gbk).expect_err("malformed");
    assert!(matches!(err, PersistError::Format(ref e) if e.line == 2), "{err}");
}

#[test]
fn gbk_mark_file_with_crlf_loads() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("mark.dat");
    let (tipword, _, unmappable) = GBK.encode("白酒/消费");
    assert!(!unmappable);
    let mut bytes = b"[TIPWORD]\r\n01600519=".to_vec();
    bytes.extend_from_slice(&tipword);
    bytes.extend_from_slice(b"\r\n");
    std::fs::write(&path, &bytes).expect("write");

    let store = load_mark_file(&path, FileEncoding::Gbk).expect("load");
    let tokens = store.get_tokens(&key("600519")).expect("tokens");
    assert_eq!(tokens.tokens(), ["白酒", "消费"]);

    let err = load_mark_file(&path, FileEncoding::Utf8).expect_err("not utf-8");
    assert!(matches!(err, PersistError::Encoding { .. }), "{err}");
}

#[test]
fn utf8_files_still_load_and_utf8_sink_writes_utf8() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("mark.dat");
    std::fs::write(&path, "\u{feff}[TIP]\n01600519=茅台\n").expect("write");
    let store = load_mark_file(&path, FileEncoding::Gbk).expect("load");
    assert_eq!(store.get_text(Section::Tip, &key("600519")), Some("茅台"));

    let mut sink = AtomicFileSink::new(&path).with_encoding(FileEncoding::Utf8);
    sink.persist(&store).expect("persist");
    assert_eq!(std::fs::read_to_string(&path).expect("read"), store.serialize());
}

#[test]
fn gbk_sink_refuses_unmappable_text() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("mark.dat");
    let store = RecordStore::load("[TIP]\n01600519=🚀\n").expect("store");

    let mut sink = AtomicFileSink::new(&path);
    let err = sink.persist(&store).expect_err("emoji is outside GBK");
    assert!(matches!(err, PersistError::Encoding { .. }), "{err}");
    assert!(!path.exists());
}

#[test]
fn sqlite_snapshots_restore_equal_stores() {
    let tmp = TempDir::new().expect("tmp");
    let mut snapshots = SqliteSnapshotStore::open(tmp.path().join("backups.db"), 30).expect("open");

    let store = sample();
    let token = snapshots.save(&store).expect("save");
    let restored = snapshots.restore(token).expect("restore");
    assert_eq!(restored, store);
    assert_eq!(snapshots.latest().expect("latest"), Some(store));

    let err = snapshots.restore(SnapshotToken(9_999)).expect_err("missing");
    assert!(matches!(err, PersistError::MissingSnapshot(9_999)), "{err}");
}

#[test]
fn sqlite_history_keeps_newest_released_rows() {
    let mut snapshots = SqliteSnapshotStore::open_in_memory(3).expect("open");
    let mut store = RecordStore::new();
    for i in 0..5 {
        store
            .apply(
                Section::Mark,
                &key("600519"),
                &markstore::op::MutationOp::Set(format!("{}", i + 1)),
            )
            .expect("apply");
        let token = snapshots.save(&store).expect("save");
        snapshots.discard(token).expect("discard");
    }

    let history = snapshots.history().expect("history");
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|row| row.released));
    assert!(history.windows(2).all(|w| w[0].token > w[1].token));

    let newest = snapshots.restore(history[0].token).expect("restore");
    assert_eq!(newest.get_text(Section::Mark, &key("600519")), Some("5"));
}

#[test]
fn sqlite_history_never_prunes_held_snapshots() {
    let mut snapshots = SqliteSnapshotStore::open_in_memory(1).expect("open");
    let store = sample();
    let tokens: Vec<SnapshotToken> = (0..3)
        .map(|_| snapshots.save(&store).expect("save"))
        .collect();

    assert_eq!(snapshots.history().expect("history").len(), 3);
    for token in tokens {
        assert_eq!(snapshots.restore(token).expect("restore"), store);
    }
}

#[test]
fn engine_opened_from_settings_persists_and_reopens() {
    let tmp = TempDir::new().expect("tmp");
    let toml = format!(
        "[paths]\nmark_file = {:?}\nbackup_db = {:?}\n\n[backup]\nmax_backups = 4\n",
        tmp.path().join("mark.dat"),
        tmp.path().join("backups.db"),
    );
    let settings = Settings::from_toml_str(&toml).expect("settings");

    let mut engine = BatchEngine::open(&settings).expect("open");
    let requests = vec![
        MutationRequest::set(Section::Mark, "600519", "3"),
        MutationRequest::set(Section::Tip, "600519", "watch"),
        MutationRequest::set(Section::Tipword, "000858", "白酒/消费"),
    ];
    let report = engine.run(&requests, &BatchConfig::default()).expect("batch");
    assert!(report.is_clean());
    let committed = engine.store().clone();
    drop(engine);

    let bytes = std::fs::read(&settings.paths.mark_file).expect("read");
    assert!(std::str::from_utf8(&bytes).is_err(), "written as GBK");
    let text = decode(&bytes, FileEncoding::Gbk).expect("decode");
    assert_eq!(
        text,
        "[MARK]\n01600519=3\n\n[TIP]\n01600519=watch\n\n[TIPWORD]\n00000858=白酒/消费\n"
    );

    let reopened = BatchEngine::open(&settings).expect("reopen");
    assert_eq!(*reopened.store(), committed);

    let backups = SqliteSnapshotStore::open(settings.paths.backup_db.as_ref().expect("db"), 4)
        .expect("backups");
    let history = backups.history().expect("history");
    assert_eq!(history.len(), 1);
    assert!(history[0].released);
    assert_eq!(history[0].store_version, 0);
}
