//! Integration tests for reconciliation against an in-memory remote.

use proptest::prelude::*;
use replica_core::{ContinuationToken, CoreError, RecordId, RecordStore, StoreConfig};
use replica_sync_engine::{
    ErrorKind, HttpExchange, LoopbackClient, MemoryRemote, MockExchange, Reconciler,
    RemoteErrorKind, SyncConfig, SyncError,
};
use replica_sync_protocol::{ExchangeResponse, StaticSession, WireRecord};
use replica_testkit::prelude::*;
use std::sync::Arc;

fn reconciler(remote: &Arc<MemoryRemote>) -> Reconciler<Arc<MemoryRemote>> {
    Reconciler::new(SyncConfig::default(), Arc::clone(remote))
}

#[test]
fn first_sync_of_empty_remote() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = reconciler(&remote);
    let temp = tempfile::tempdir().unwrap();

    let store = reconciler
        .bootstrap(&TestSession::valid(), &temp.path().join("store"))
        .unwrap();
    assert_eq!(store.len(), 0);
    assert_eq!(store.get_token().unwrap(), Some(ContinuationToken::new("0")));
    assert_eq!(store.stats().unwrap().tokens, 1);

    let mut fresh = RecordStore::open_in_memory();
    let result = reconciler.reconcile(&TestSession::valid(), &mut fresh).unwrap();
    assert!(result.pulled.is_empty());
    assert_eq!(fresh.len(), 0);
    assert_eq!(fresh.stats().unwrap().tokens, 1);
}

#[test]
fn push_new_record() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = reconciler(&remote);
    let mut temp = TempStore::new();
    temp.stage(note("A", "hello"), 1_000).unwrap();

    let result = reconciler.reconcile(&TestSession::valid(), &mut temp).unwrap();

    assert_eq!(result.acknowledged, vec![RecordId::new("A")]);
    let record = temp.get(&"A".into()).unwrap();
    assert!(!record.pending_write);
    assert_eq!(record.pending_since, 0);
    assert_eq!(remote.get(&"A".into()).unwrap().content, b"hello");
}

#[test]
fn pull_remote_update() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = reconciler(&remote);
    let mut temp = TempStore::new();
    temp.upsert(note("B", "old")).unwrap();
    remote.put(WireRecord::from(note("B", "new")));

    let result = reconciler.reconcile(&TestSession::valid(), &mut temp).unwrap();

    assert_eq!(result.pulled.len(), 1);
    let record = temp.get(&"B".into()).unwrap();
    assert_eq!(record.content, b"new");
    assert!(!record.pending_write);
}

#[test]
fn invalid_session_leaves_store_byte_identical() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = reconciler(&remote);
    let mut temp = TempStore::new();
    temp.stage(note("A", "draft"), 5).unwrap();
    temp.set_token(ContinuationToken::new("3")).unwrap();
    let before = temp.log_bytes();

    let err = reconciler
        .reconcile(&TestSession::invalid(), &mut temp)
        .unwrap_err();

    assert!(matches!(err, SyncError::SessionInvalid));
    assert_eq!(temp.log_bytes(), before);
    assert_eq!(remote.exchanges(), 0);
}

#[test]
fn exchange_failure_leaves_store_byte_identical() {
    for kind in [
        RemoteErrorKind::Network,
        RemoteErrorKind::Server,
        RemoteErrorKind::Timeout,
        RemoteErrorKind::Cancelled,
    ] {
        let remote = Arc::new(MemoryRemote::new());
        remote.put(WireRecord::from(note("R", "remote")));
        let reconciler = reconciler(&remote);
        let mut temp = TempStore::new();
        temp.stage(note("A", "draft"), 5).unwrap();
        let before = temp.log_bytes();

        remote.fail_next(kind);
        let err = reconciler.reconcile(&TestSession::valid(), &mut temp).unwrap_err();

        assert_eq!(err.remote_kind(), Some(kind));
        assert_eq!(temp.log_bytes(), before);
        assert_eq!(temp.pending_count(), 1);
        assert!(temp.get(&"R".into()).is_none());
    }
}

#[test]
fn no_op_cycle_only_moves_token() {
    let mock = MockExchange::new();
    mock.respond(ExchangeResponse::empty("t1"))
        .respond(ExchangeResponse::empty("t2"));
    let reconciler = Reconciler::new(SyncConfig::default(), mock);
    let mut store = scenarios::mixed_store(3, 0);
    let records: Vec<_> = store.all().cloned().collect();

    reconciler.reconcile(&TestSession::valid(), &mut store).unwrap();
    reconciler.reconcile(&TestSession::valid(), &mut store).unwrap();

    assert_eq!(store.all().cloned().collect::<Vec<_>>(), records);
    assert_eq!(store.get_token().unwrap(), Some(ContinuationToken::new("t2")));
    let requests = reconciler.exchange().requests();
    assert!(requests[0].cursor.is_none());
    assert_eq!(requests[1].cursor, Some(ContinuationToken::new("t1")));
    assert!(requests.iter().all(|r| r.items.is_empty()));
}

#[test]
fn unacknowledged_record_is_pushed_again_unchanged() {
    let remote = Arc::new(MemoryRemote::new());
    remote.reject("A");
    let mock_reconciler = reconciler(&remote);
    let mut temp = TempStore::new();
    temp.stage(note("A", "draft"), 77).unwrap();
    let staged = temp.get(&"A".into()).cloned().unwrap();

    let first = mock_reconciler.reconcile(&TestSession::valid(), &mut temp).unwrap();
    assert_eq!(first.unacknowledged, vec![RecordId::new("A")]);
    assert_eq!(temp.get(&"A".into()), Some(&staged));

    remote.accept(&"A".into());
    let second = mock_reconciler.reconcile(&TestSession::valid(), &mut temp).unwrap();
    assert_eq!(second.pushed, 1);
    assert_eq!(second.acknowledged, vec![RecordId::new("A")]);
    assert_eq!(remote.get(&"A".into()).unwrap(), WireRecord::from(&staged));
    assert_eq!(temp.pending_count(), 0);
}

#[test]
fn pulled_record_over_pending_edit_is_pushed_next_cycle() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = reconciler(&remote);
    let mut temp = TempStore::new();
    reconciler.reconcile(&TestSession::valid(), &mut temp).unwrap();

    remote.reject("A");
    remote.put(WireRecord::from(note("A", "theirs")));
    temp.stage(note("A", "mine"), 9).unwrap();

    reconciler.reconcile(&TestSession::valid(), &mut temp).unwrap();
    let record = temp.get(&"A".into()).unwrap();
    assert_eq!(record.content, b"theirs");
    assert!(record.pending_write);

    remote.accept(&"A".into());
    let next = reconciler.reconcile(&TestSession::valid(), &mut temp).unwrap();
    assert_eq!(next.acknowledged, vec![RecordId::new("A")]);
    assert_eq!(temp.pending_count(), 0);
}

#[test]
fn bootstrap_is_idempotent() {
    let remote = Arc::new(MemoryRemote::new());
    for id in ["A", "B", "C"] {
        remote.put(WireRecord::from(note(id, "remote")));
    }
    let reconciler = reconciler(&remote);
    let temp = tempfile::tempdir().unwrap();
    let location = temp.path().join("store");

    let first = reconciler.bootstrap(&TestSession::valid(), &location).unwrap();
    let ids: Vec<_> = first.all().map(|r| r.id.clone()).collect();
    drop(first);

    let second = reconciler.bootstrap(&TestSession::valid(), &location).unwrap();
    assert_eq!(second.all().map(|r| r.id.clone()).collect::<Vec<_>>(), ids);
    assert_eq!(second.len(), 3);
    assert_eq!(second.stats().unwrap().tokens, 1);
    assert!(second.all().all(|r| !r.pending_write));
    assert_eq!(reconciler.stats().bootstraps_completed, 2);
}

#[test]
fn bootstrap_keeps_pending_edits_of_existing_store() {
    let remote = Arc::new(MemoryRemote::new());
    remote.put(WireRecord::from(note("A", "remote")));
    let reconciler = reconciler(&remote);
    let temp = TempStore::new();
    let location = temp.path();
    let dir = {
        let mut temp = temp;
        temp.stage(note("A", "local"), 4).unwrap();
        temp.into_dir()
    };

    let store = reconciler.bootstrap(&TestSession::valid(), &location).unwrap();
    let record = store.get(&"A".into()).unwrap();
    assert!(record.pending_write);
    assert_eq!(record.pending_since, 4);
    drop(dir);
}

#[test]
fn bootstrap_argument_checks() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = reconciler(&remote);
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("file");
    std::fs::write(&file, b"x").unwrap();

    let err = reconciler
        .bootstrap(&TestSession::invalid(), std::path::Path::new(""))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionInvalid);

    let err = reconciler
        .bootstrap(&TestSession::valid(), std::path::Path::new(""))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = reconciler.bootstrap(&TestSession::valid(), &file).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(remote.exchanges(), 0);
}

#[test]
fn bootstrap_refuses_a_locked_store() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = reconciler(&remote);
    let temp = TempStore::new();

    let err = reconciler
        .bootstrap(&TestSession::valid(), &temp.path())
        .unwrap_err();
    assert!(matches!(err, SyncError::Store(CoreError::StoreLocked)));
}

#[test]
fn bootstrap_exchange_failure_leaves_empty_store() {
    let remote = Arc::new(MemoryRemote::new());
    remote.put(WireRecord::from(note("A", "remote")));
    remote.fail_next(RemoteErrorKind::Network);
    let reconciler = reconciler(&remote);
    let temp = tempfile::tempdir().unwrap();
    let location = temp.path().join("store");

    let err = reconciler.bootstrap(&TestSession::valid(), &location).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert!(location.is_dir());

    let store = reconciler.bootstrap(&TestSession::valid(), &location).unwrap();
    assert_eq!(store.len(), 1);
}

#[test]
fn store_failure_mid_apply_converges_on_rerun() {
    let remote = Arc::new(MemoryRemote::new());
    remote.put(WireRecord::from(note("C", "remote")));
    remote.put(WireRecord::from(note("D", "remote")));
    let reconciler = reconciler(&remote);
    let (mut store, backend) = observed_store();
    store.stage(note("A", "draft"), 1).unwrap();
    store.stage(note("B", "draft"), 2).unwrap();

    // The first clear succeeds, the second write fails.
    backend.fail_after(1);
    let err = reconciler.reconcile(&TestSession::valid(), &mut store).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);
    assert_eq!(store.pending_count(), 1);
    assert_eq!(store.get_token().unwrap(), None);

    backend.heal();
    reconciler.reconcile(&TestSession::valid(), &mut store).unwrap();

    assert_eq!(store.pending_count(), 0);
    assert_eq!(store.len(), 4);
    assert_eq!(
        store.get_token().unwrap(),
        Some(ContinuationToken::new(remote.counter().to_string()))
    );
    assert!(store.verify().unwrap().is_ok());
}

#[test]
fn one_token_after_many_cycles() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = reconciler(&remote);
    let mut temp = TempStore::new();

    for i in 0..10 {
        temp.stage(note(&format!("n{i}"), "x"), i).unwrap();
        remote.put(WireRecord::from(note(&format!("r{i}"), "y")));
        reconciler.reconcile(&TestSession::valid(), &mut temp).unwrap();
        assert_eq!(temp.stats().unwrap().tokens, 1);
    }

    let temp = temp.reopen();
    assert_eq!(temp.stats().unwrap().tokens, 1);
    assert_eq!(temp.len(), 20);
    assert_eq!(reconciler.stats().cycles_completed, 10);
}

#[test]
fn http_loopback_round_trip() {
    let remote = Arc::new(MemoryRemote::new());
    remote.put(WireRecord::from(note("R", "remote")));
    let config = SyncConfig::new("http://localhost:3000");
    let exchange = HttpExchange::new(&config, LoopbackClient::new(Arc::clone(&remote)));
    let reconciler = Reconciler::new(config, exchange);
    let mut store = RecordStore::open_in_memory();
    store.stage(note("A", "draft"), 1).unwrap();

    let result = reconciler
        .reconcile(&StaticSession::new("secret"), &mut store)
        .unwrap();
    assert_eq!(result.acknowledged, vec![RecordId::new("A")]);
    assert_eq!(result.pulled.len(), 1);
    assert_eq!(remote.len(), 2);

    remote.fail_next(RemoteErrorKind::Server);
    let err = reconciler
        .reconcile(&StaticSession::new("secret"), &mut store)
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Server));
    assert!(reconciler.exchange().last_error().is_some());
}

#[test]
fn reconcile_works_with_unsynced_store_config() {
    let remote = Arc::new(MemoryRemote::new());
    remote.put(WireRecord::from(note("A", "remote")));
    let config = SyncConfig::default().with_store(StoreConfig::new().sync_on_write(false));
    let reconciler = Reconciler::new(config, Arc::clone(&remote));
    let temp = tempfile::tempdir().unwrap();

    let store = reconciler
        .bootstrap(&TestSession::valid(), &temp.path().join("store"))
        .unwrap();
    assert_eq!(store.len(), 1);
}

#[derive(Debug, Clone)]
enum Step {
    LocalEdit(usize, u8),
    RemoteEdit(usize, u8),
    Reject(usize),
    Accept(usize),
    Cycle,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0..5usize, any::<u8>()).prop_map(|(i, b)| Step::LocalEdit(i, b)),
        2 => (0..5usize, any::<u8>()).prop_map(|(i, b)| Step::RemoteEdit(i, b)),
        1 => (0..5usize).prop_map(Step::Reject),
        1 => (0..5usize).prop_map(Step::Accept),
        3 => Just(Step::Cycle),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn cycles_preserve_store_invariants(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let remote = Arc::new(MemoryRemote::new());
        let reconciler = reconciler(&remote);
        let mut store = RecordStore::open_in_memory();
        let id = |i: usize| format!("r{i}");

        for (t, step) in steps.into_iter().enumerate() {
            match step {
                Step::LocalEdit(i, b) => {
                    store.stage(note(&id(i), &b.to_string()), t as u64 + 1).unwrap()
                }
                Step::RemoteEdit(i, b) => {
                    remote.put(WireRecord::from(note(&id(i), &b.to_string())))
                }
                Step::Reject(i) => remote.reject(id(i)),
                Step::Accept(i) => remote.accept(&RecordId::new(id(i))),
                Step::Cycle => {
                    let result = reconciler.reconcile(&TestSession::valid(), &mut store).unwrap();
                    for acked in &result.acknowledged {
                        prop_assert!(!store.get(acked).unwrap().pending_write);
                    }
                    for refused in &result.unacknowledged {
                        prop_assert!(store.get(refused).unwrap().pending_write);
                    }
                }
            }
            for record in store.all() {
                prop_assert!(record.is_consistent());
            }
            prop_assert!(store.stats().unwrap().tokens <= 1);
        }

        for i in 0..5 {
            remote.accept(&RecordId::new(id(i)));
        }
        reconciler.reconcile(&TestSession::valid(), &mut store).unwrap();
        prop_assert_eq!(store.pending_count(), 0);
        prop_assert_eq!(store.stats().unwrap().tokens, 1);
        prop_assert!(store.verify().unwrap().is_ok());
    }
}
