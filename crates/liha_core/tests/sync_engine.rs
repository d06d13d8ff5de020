mod common;

use common::{settle, ScriptedBackend};
use liha_core::{
    ConflictPolicy, ContentItem, MutationOutcome, ObjectInstance, QueryKey, ReadState, SyncConfig,
    SyncEngine, SyncError,
};

fn versions() -> (ObjectInstance, ObjectInstance, ObjectInstance) {
    let v0 = ObjectInstance::new("o1");
    let v1 = v0.insert(ContentItem::new("a", "text", 0, 0)).unwrap();
    let v2 = v1.insert(ContentItem::new("b", "text", 0, 12)).unwrap();
    (v0, v1, v2)
}

async fn loaded_engine(
    config: SyncConfig,
    value: ObjectInstance,
) -> (SyncEngine<ObjectInstance, ScriptedBackend<ObjectInstance>>, ScriptedBackend<ObjectInstance>) {
    let backend = ScriptedBackend::new();
    backend.store("o1", value);
    let engine = SyncEngine::new(backend.clone(), config);
    let key = QueryKey::from("o1");
    let mut changes = engine.subscribe(&key);
    assert!(engine.read(&key).is_pending());
    changes.changed().await.unwrap();
    (engine, backend)
}

#[tokio::test]
async fn failed_persist_restores_pre_mutation_value_and_reports_once() {
    let (v0, v1, _) = versions();
    let (engine, backend) = loaded_engine(SyncConfig::default(), v0.clone()).await;
    let key = QueryKey::from("o1");
    backend.fail_persist();

    let ticket = engine.mutate(&key, v1.clone());
    assert_eq!(engine.peek(&key), ReadState::Ready(v1));

    let outcome = ticket.settled().await;
    assert!(matches!(outcome, MutationOutcome::RolledBack(SyncError::Persist { .. })));
    assert_eq!(engine.peek(&key), ReadState::Ready(v0.clone()));
    assert_eq!(backend.stored("o1"), Some(v0));

    let errors = engine.drain_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].key(), &key);
    assert!(engine.drain_errors().is_empty());
}

#[tokio::test]
async fn fetch_in_flight_during_mutation_never_overwrites_optimistic_value() {
    let (v0, v1, _) = versions();
    let backend = ScriptedBackend::new();
    backend.store("o1", v0);
    let release_fetch = backend.hold_next_fetch();
    let release_persist = backend.hold_persist(false);
    let engine = SyncEngine::new(backend.clone(), SyncConfig::default());
    let key = QueryKey::from("o1");

    assert!(engine.read(&key).is_pending());
    settle().await;

    let ticket = engine.mutate(&key, v1.clone());
    let _ = release_fetch.send(());
    settle().await;
    assert_eq!(engine.peek(&key), ReadState::Ready(v1.clone()));

    // Reads while the mutation is unsettled must not start a new fetch.
    let fetches = backend.fetch_calls();
    assert_eq!(engine.read(&key), ReadState::Ready(v1.clone()));
    settle().await;
    assert_eq!(backend.fetch_calls(), fetches);

    let _ = release_persist.send(());
    assert_eq!(ticket.settled().await, MutationOutcome::Committed);
    assert_eq!(engine.peek(&key), ReadState::Ready(v1));
}

#[tokio::test]
async fn serialized_policy_keeps_later_edit_when_earlier_persist_fails() {
    let (v0, v1, v2) = versions();
    let (engine, backend) = loaded_engine(SyncConfig::default(), v0).await;
    let key = QueryKey::from("o1");
    backend.fail_persist();
    backend.pass_persist();

    let first = engine.mutate(&key, v1);
    let second = engine.mutate(&key, v2.clone());
    assert_eq!(engine.pending_mutations(&key), 2);

    assert!(matches!(first.settled().await, MutationOutcome::Superseded(_)));
    assert_eq!(second.settled().await, MutationOutcome::Committed);
    assert_eq!(engine.peek(&key), ReadState::Ready(v2.clone()));
    assert_eq!(backend.stored("o1"), Some(v2));
    assert_eq!(engine.drain_errors().len(), 1);
}

#[tokio::test]
async fn serialized_policy_reverts_to_last_confirmed_value() {
    let (v0, v1, v2) = versions();
    let (engine, backend) = loaded_engine(SyncConfig::default(), v0).await;
    let key = QueryKey::from("o1");
    backend.pass_persist();
    backend.fail_persist();

    let first = engine.mutate(&key, v1.clone());
    let second = engine.mutate(&key, v2);

    assert_eq!(first.settled().await, MutationOutcome::Committed);
    assert!(matches!(second.settled().await, MutationOutcome::RolledBack(_)));
    assert_eq!(engine.peek(&key), ReadState::Ready(v1));
}

#[tokio::test]
async fn serialized_policy_reverts_to_original_when_every_mutation_fails() {
    let (v0, v1, v2) = versions();
    let (engine, backend) = loaded_engine(SyncConfig::default(), v0.clone()).await;
    let key = QueryKey::from("o1");
    backend.fail_persist();
    backend.fail_persist();

    let first = engine.mutate(&key, v1);
    let second = engine.mutate(&key, v2);

    assert!(matches!(first.settled().await, MutationOutcome::Superseded(_)));
    assert!(matches!(second.settled().await, MutationOutcome::RolledBack(_)));
    assert_eq!(engine.peek(&key), ReadState::Ready(v0));
    assert_eq!(engine.drain_errors().len(), 2);
}

#[tokio::test]
async fn serialized_policy_persists_in_call_order() {
    let (v0, v1, v2) = versions();
    let (engine, backend) = loaded_engine(SyncConfig::default(), v0).await;
    let key = QueryKey::from("o1");
    let release_first = backend.hold_persist(false);

    let first = engine.mutate(&key, v1);
    let second = engine.mutate(&key, v2.clone());
    settle().await;
    assert_eq!(backend.persist_calls(), 1);

    let _ = release_first.send(());
    assert_eq!(first.settled().await, MutationOutcome::Committed);
    assert_eq!(second.settled().await, MutationOutcome::Committed);
    assert_eq!(backend.persist_calls(), 2);
    assert_eq!(backend.stored("o1"), Some(v2));
}

#[tokio::test]
async fn independent_policy_late_failure_clobbers_newer_edit() {
    let (v0, v1, v2) = versions();
    let (engine, backend) = loaded_engine(
        SyncConfig::with_policy(ConflictPolicy::Independent),
        v0.clone(),
    )
    .await;
    let key = QueryKey::from("o1");
    let release_first = backend.hold_persist(true);
    let release_second = backend.hold_persist(false);

    let first = engine.mutate(&key, v1);
    let second = engine.mutate(&key, v2.clone());

    let _ = release_second.send(());
    assert_eq!(second.settled().await, MutationOutcome::Committed);
    assert_eq!(engine.peek(&key), ReadState::Ready(v2));

    let _ = release_first.send(());
    assert!(matches!(first.settled().await, MutationOutcome::RolledBack(_)));
    assert_eq!(engine.peek(&key), ReadState::Ready(v0));
}

#[tokio::test]
async fn settled_key_is_refetched_on_next_read() {
    let (v0, v1, _) = versions();
    let (engine, backend) = loaded_engine(SyncConfig::default(), v0).await;
    let key = QueryKey::from("o1");
    assert_eq!(backend.fetch_calls(), 1);

    engine.mutate(&key, v1.clone()).settled().await;
    let mut changes = engine.subscribe(&key);
    assert_eq!(engine.read(&key), ReadState::Ready(v1.clone()));
    changes.changed().await.unwrap();

    assert_eq!(backend.fetch_calls(), 2);
    assert_eq!(engine.peek(&key), ReadState::Ready(v1));
}

#[tokio::test]
async fn explicit_invalidate_triggers_refetch_of_authoritative_state() {
    let (v0, v1, _) = versions();
    let (engine, backend) = loaded_engine(SyncConfig::default(), v0.clone()).await;
    let key = QueryKey::from("o1");

    assert_eq!(engine.read(&key), ReadState::Ready(v0));
    backend.store("o1", v1.clone());
    engine.invalidate(&key);

    let mut changes = engine.subscribe(&key);
    engine.read(&key);
    changes.changed().await.unwrap();
    assert_eq!(engine.peek(&key), ReadState::Ready(v1));
}

#[tokio::test]
async fn mutation_settles_even_after_shutdown() {
    let (v0, v1, _) = versions();
    let (engine, backend) = loaded_engine(SyncConfig::default(), v0).await;
    let key = QueryKey::from("o1");
    let release = backend.hold_persist(false);

    let ticket = engine.mutate(&key, v1.clone());
    engine.shutdown();
    let _ = release.send(());

    assert_eq!(ticket.settled().await, MutationOutcome::Committed);
    assert_eq!(backend.stored("o1"), Some(v1));
    assert_eq!(engine.peek(&key), ReadState::Pending);
}

#[tokio::test]
async fn mutation_after_shutdown_persists_without_touching_cache() {
    let (v0, v1, _) = versions();
    let (engine, backend) = loaded_engine(SyncConfig::default(), v0).await;
    let key = QueryKey::from("o1");

    engine.shutdown();
    let ticket = engine.mutate(&key, v1.clone());
    assert_eq!(engine.peek(&key), ReadState::Pending);
    assert_eq!(engine.pending_mutations(&key), 0);

    assert_eq!(ticket.settled().await, MutationOutcome::Committed);
    assert_eq!(backend.persist_calls(), 1);
    assert_eq!(backend.stored("o1"), Some(v1));
    assert_eq!(engine.peek(&key), ReadState::Pending);
}

#[tokio::test]
async fn failed_mutation_after_shutdown_reports_without_rollback() {
    let (v0, v1, _) = versions();
    let (engine, backend) = loaded_engine(SyncConfig::default(), v0.clone()).await;
    let key = QueryKey::from("o1");
    backend.fail_persist();

    engine.shutdown();
    let outcome = engine.mutate(&key, v1).settled().await;

    assert!(matches!(outcome, MutationOutcome::RolledBack(SyncError::Persist { .. })));
    assert_eq!(engine.peek(&key), ReadState::Pending);
    assert_eq!(backend.stored("o1"), Some(v0));
    assert_eq!(engine.drain_errors().len(), 1);
}

#[tokio::test]
async fn reads_after_shutdown_never_fetch_or_notify() {
    let (v0, _, _) = versions();
    let (engine, backend) = loaded_engine(SyncConfig::default(), v0).await;
    let key = QueryKey::from("o1");
    let other = QueryKey::from("o2");

    engine.shutdown();
    assert!(engine.read(&key).is_pending());
    assert!(engine.read(&other).is_pending());
    assert!(engine.subscribe(&key).changed().await.is_err());
    settle().await;

    assert_eq!(backend.fetch_calls(), 1);
    assert_eq!(engine.peek(&other), ReadState::Pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn engine_is_usable_from_a_multi_thread_runtime() {
    let (v0, v1, _) = versions();
    let (engine, backend) = loaded_engine(SyncConfig::default(), v0).await;
    let key = QueryKey::from("o1");

    let outcome = engine.mutate(&key, v1.clone()).settled().await;
    assert_eq!(outcome, MutationOutcome::Committed);
    assert_eq!(backend.stored("o1"), Some(v1));
}
