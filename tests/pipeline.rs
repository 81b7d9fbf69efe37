// tests/pipeline.rs
//! End-to-end tests: embedded writes through the hook, queue and persister
//! into a change store.

use mirrorlite::capture::{ChangeQueue, ChangeRecord, HookCapturer, OpKind, WriteObserver};
use mirrorlite::persist::{
    ChangeStore, MemoryChangeStore, Persister, PersisterState, SqlChangeStore,
};
use mirrorlite::pipeline::{
    AppEvent, DispatchOutcome, LifecycleController, LogLevel, MessageEvent,
};
use mirrorlite::utils::config::{EmbeddedConfig, PipelineConfig, ShutdownPolicy, StoreConfig};
use rusqlite::TransactionBehavior;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn pipeline(capacity: usize, shutdown: ShutdownPolicy) -> PipelineConfig {
    PipelineConfig {
        queue_capacity: capacity,
        shutdown,
    }
}

fn embedded(dir: &std::path::Path) -> EmbeddedConfig {
    EmbeddedConfig {
        path: dir.join("app.db"),
        ..Default::default()
    }
}

fn parse(payload: &str) -> Value {
    serde_json::from_str(payload).unwrap()
}

async fn wait_for_changes(store: &dyn ChangeStore, n: usize) -> Vec<Value> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let rows = store.recent_changes(10_000).await.unwrap();
            if rows.len() >= n {
                return rows.iter().map(|r| parse(&r.payload)).collect::<Vec<_>>();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("store did not receive expected changes")
}

fn row_ids(rows: &[Value]) -> Vec<i64> {
    rows.iter().map(|v| v["rowid"].as_i64().unwrap()).collect()
}

#[tokio::test]
async fn capacity_two_keeps_first_two_and_drops_third() {
    let queue = Arc::new(ChangeQueue::new(2));
    let store = Arc::new(MemoryChangeStore::new());

    // consumer not running yet
    let results: Vec<bool> = ["a", "b", "c"]
        .iter()
        .enumerate()
        .map(|(i, table)| {
            queue.try_enqueue(ChangeRecord::capture(OpKind::Insert, "main", table, i as i64))
        })
        .collect();
    assert_eq!(results, vec![true, true, false]);

    let (persister, _state) =
        Persister::new(Arc::clone(&queue), store.clone(), ShutdownPolicy::Discard);
    let cancel = CancellationToken::new();
    let handle = persister.spawn(cancel.clone());

    let rows = wait_for_changes(store.as_ref(), 2).await;
    cancel.cancel();
    let report = handle.await.unwrap();

    let tables: Vec<&str> = rows.iter().map(|v| v["table"].as_str().unwrap()).collect();
    assert_eq!(tables, vec!["a", "b"]);
    assert_eq!(report.persisted, 2);
    assert_eq!(queue.stats().dropped, 1);
}

#[tokio::test]
async fn sequential_writes_reach_sql_store_in_order() {
    let dir = tempdir().unwrap();
    let store = Arc::new(
        SqlChangeStore::connect(&StoreConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap(),
    );

    let controller = LifecycleController::start(
        &pipeline(10, ShutdownPolicy::Discard),
        store.clone(),
        &CancellationToken::new(),
    )
    .unwrap();
    let conn = controller.open_embedded(&embedded(dir.path())).unwrap();

    conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
        .unwrap();
    for name in ["ana", "bia", "caio", "duda", "edu"] {
        conn.execute("INSERT INTO users (name) VALUES (?1)", [name])
            .unwrap();
    }

    let rows = wait_for_changes(store.as_ref(), 5).await;
    let report = controller.stop().await.unwrap();

    assert_eq!(rows.len(), 5);
    assert_eq!(row_ids(&rows), vec![1, 2, 3, 4, 5]);
    for row in &rows {
        assert_eq!(row["op"], 18);
        assert_eq!(row["db"], "main");
        assert_eq!(row["table"], "users");
    }
    assert_eq!(report.persisted, 5);
    assert_eq!(report.persist_failures, 0);
}

#[tokio::test]
async fn stalled_consumer_never_blocks_writers_and_stop_keeps_prefix() {
    let dir = tempdir().unwrap();
    let (store, gate) = MemoryChangeStore::new().gated();
    let store = Arc::new(store);

    let controller = LifecycleController::start(
        &pipeline(4, ShutdownPolicy::Discard),
        store.clone(),
        &CancellationToken::new(),
    )
    .unwrap();
    let conn = controller.open_embedded(&embedded(dir.path())).unwrap();
    conn.execute_batch("CREATE TABLE events (id INTEGER PRIMARY KEY, kind TEXT)")
        .unwrap();

    // first write is taken by the persister and held in the store
    let mut state = controller.persister_state();
    conn.execute("INSERT INTO events (kind) VALUES ('first')", [])
        .unwrap();
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == PersisterState::Processing),
    )
    .await
    .unwrap()
    .unwrap();

    let start = Instant::now();
    for i in 0..9 {
        conn.execute("INSERT INTO events (kind) VALUES (?1)", [format!("k{}", i)])
            .unwrap();
    }
    assert!(start.elapsed() < Duration::from_secs(2));

    let capture = controller.capture_stats();
    assert_eq!(capture.captured, 5);
    assert_eq!(capture.dropped, 5);

    let stopping = tokio::spawn(controller.stop());
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.open();
    let report = stopping.await.unwrap().unwrap();

    let rows: Vec<Value> = store.payloads().iter().map(|p| parse(p)).collect();
    assert_eq!(row_ids(&rows), vec![1]);
    assert_eq!(report.persisted, 1);
    assert_eq!(report.discarded, 4);
}

#[tokio::test]
async fn drain_policy_persists_buffered_records_on_stop() {
    let dir = tempdir().unwrap();
    let (store, gate) = MemoryChangeStore::new().gated();
    let store = Arc::new(store);

    let controller = LifecycleController::start(
        &pipeline(16, ShutdownPolicy::Drain),
        store.clone(),
        &CancellationToken::new(),
    )
    .unwrap();
    let conn = controller.open_embedded(&embedded(dir.path())).unwrap();
    conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v INTEGER)")
        .unwrap();

    let mut state = controller.persister_state();
    for v in 0..3 {
        conn.execute("INSERT INTO t (v) VALUES (?1)", [v]).unwrap();
    }
    conn.execute("UPDATE t SET v = 10 WHERE id = 2", []).unwrap();
    conn.execute("DELETE FROM t WHERE id = 3", []).unwrap();
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == PersisterState::Processing),
    )
    .await
    .unwrap()
    .unwrap();

    let stopping = tokio::spawn(controller.stop());
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.open();
    let report = stopping.await.unwrap().unwrap();

    let rows: Vec<Value> = store.payloads().iter().map(|p| parse(p)).collect();
    let ops: Vec<i64> = rows.iter().map(|v| v["op"].as_i64().unwrap()).collect();
    assert_eq!(ops, vec![18, 18, 18, 23, 9]);
    assert_eq!(row_ids(&rows), vec![1, 2, 3, 2, 3]);
    assert_eq!(report.drained, 4);
    assert_eq!(report.discarded, 0);
}

#[tokio::test]
async fn persist_failure_does_not_stop_later_records() {
    let store = Arc::new(
        MemoryChangeStore::new().failing_when(|payload| payload.contains(r#""table":"poison""#)),
    );
    let controller = LifecycleController::start(
        &pipeline(8, ShutdownPolicy::Discard),
        store.clone(),
        &CancellationToken::new(),
    )
    .unwrap();

    let capturer = controller.capturer();
    capturer.on_write(OpKind::Insert, "main", "ok", 1);
    capturer.on_write(OpKind::Insert, "main", "poison", 2);
    capturer.on_write(OpKind::Insert, "main", "ok", 3);

    let rows = wait_for_changes(store.as_ref(), 2).await;
    let report = controller.stop().await.unwrap();

    assert_eq!(row_ids(&rows), vec![1, 3]);
    assert_eq!(report.persist_failures, 1);
    assert_eq!(store.attempts(), 3);
}

#[tokio::test]
async fn concurrent_connections_keep_per_thread_order() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MemoryChangeStore::new());
    let controller = LifecycleController::start(
        &pipeline(4096, ShutdownPolicy::Discard),
        store.clone(),
        &CancellationToken::new(),
    )
    .unwrap();

    let config = embedded(dir.path());
    {
        let setup = controller.open_embedded(&config).unwrap();
        setup
            .execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, writer INTEGER)")
            .unwrap();
    }

    let capturer: Arc<HookCapturer> = controller.capturer();
    let writers: Vec<_> = (0..4i64)
        .map(|writer| {
            let config = config.clone();
            let capturer = Arc::clone(&capturer);
            std::thread::spawn(move || {
                let mut conn = mirrorlite::capture::open_embedded(&config, capturer).unwrap();
                for seq in 0..50i64 {
                    // IMMEDIATE takes the write lock up front so contention waits on the busy timeout
                    let tx = conn
                        .transaction_with_behavior(TransactionBehavior::Immediate)
                        .unwrap();
                    tx.execute(
                        "INSERT INTO items (id, writer) VALUES (?1, ?2)",
                        [writer * 1000 + seq, writer],
                    )
                    .unwrap();
                    tx.commit().unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let rows = wait_for_changes(store.as_ref(), 200).await;
    controller.stop().await.unwrap();

    let ids = row_ids(&rows);
    for writer in 0..4i64 {
        let seen: Vec<i64> = ids.iter().copied().filter(|id| id / 1000 == writer).collect();
        let expected: Vec<i64> = (0..50).map(|seq| writer * 1000 + seq).collect();
        assert_eq!(seen, expected);
    }
}

#[tokio::test]
async fn message_events_share_the_store() {
    let store = Arc::new(MemoryChangeStore::new());
    let controller = LifecycleController::start(
        &pipeline(8, ShutdownPolicy::Discard),
        store.clone(),
        &CancellationToken::new(),
    )
    .unwrap();

    let dispatcher = controller.event_dispatcher();
    let stored = dispatcher
        .dispatch(&AppEvent::Message(MessageEvent {
            reference: "3EB0A1".to_string(),
            body: "ola".to_string(),
        }))
        .await;
    let logged = dispatcher.log(LogLevel::Info, "Successfully paired").await;
    let ignored = dispatcher.dispatch(&AppEvent::Other).await;

    controller.stop().await.unwrap();

    assert_eq!(stored, DispatchOutcome::Stored);
    assert_eq!(logged, DispatchOutcome::Stored);
    assert_eq!(ignored, DispatchOutcome::Ignored);
    let messages = store.recent_messages(10).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, "ola");
    let logs = store.recent_logs(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(store.payloads().is_empty());
}

#[tokio::test]
async fn rolled_back_transaction_is_not_persisted() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MemoryChangeStore::new());
    let controller = LifecycleController::start(
        &pipeline(8, ShutdownPolicy::Discard),
        store.clone(),
        &CancellationToken::new(),
    )
    .unwrap();
    let mut conn = controller.open_embedded(&embedded(dir.path())).unwrap();
    conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
        .unwrap();

    let tx = conn.transaction().unwrap();
    tx.execute("INSERT INTO t (v) VALUES ('undone')", []).unwrap();
    tx.rollback().unwrap();

    let tx = conn.transaction().unwrap();
    tx.execute("INSERT INTO t (v) VALUES ('kept')", []).unwrap();
    tx.commit().unwrap();

    let rows = wait_for_changes(store.as_ref(), 1).await;
    let report = controller.stop().await.unwrap();

    let in_table: i64 = conn
        .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
        .unwrap();
    assert_eq!(in_table, 1);
    assert_eq!(rows.len(), 1);
    assert_eq!(row_ids(&rows), vec![1]);
    assert_eq!(report.persisted, 1);
}
