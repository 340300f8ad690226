//! End-to-end election tests against the in-memory store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use wolfelect::config::ElectionConfig;
use wolfelect::election::{
    Candidate, CandidateKey, ElectionOutcome, ElectionState, ElectionStateMachine,
    EXIT_SESSION_EXPIRED,
};
use wolfelect::error::{Error, Result, StoreError};
use wolfelect::store::{CoordinationClient, CreateMode, MemoryStore, SessionId};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    session: SessionId,
    machine: Arc<ElectionStateMachine>,
    leader_calls: Arc<AtomicUsize>,
    handle: JoinHandle<Result<ElectionOutcome>>,
}

async fn start(store: &MemoryStore, name: &str) -> Running {
    let (client, events) = store.connect().await;
    let session = client.session_id();
    let leader_calls = Arc::new(AtomicUsize::new(0));
    let calls = leader_calls.clone();

    let candidate =
        Candidate::with_identity(Arc::new(client), events, &ElectionConfig::default(), name)
            .on_leader(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
    let machine = candidate.state_machine();
    let handle = tokio::spawn(candidate.run());

    Running {
        session,
        machine,
        leader_calls,
        handle,
    }
}

async fn wait_state(machine: &ElectionStateMachine, expected: ElectionState) {
    let mut rx = machine.subscribe();
    tokio::time::timeout(TIMEOUT, rx.wait_for(|s| *s == expected))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", expected))
        .unwrap();
}

fn key(n: u32) -> CandidateKey {
    CandidateKey::new(format!("p_{:010}", n))
}

fn waiting(n: u32) -> ElectionState {
    ElectionState::Waiting {
        predecessor: key(n),
    }
}

#[tokio::test]
async fn test_single_candidate_becomes_leader() {
    let store = MemoryStore::new();
    let a = start(&store, "a").await;

    wait_state(&a.machine, ElectionState::Leader).await;
    assert_eq!(a.machine.candidate_key().await, Some(key(0)));
    assert_eq!(a.leader_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.pending_watches().await, 0);
}

#[tokio::test]
async fn test_successor_takes_over() {
    let store = MemoryStore::new();
    let a = start(&store, "a").await;
    wait_state(&a.machine, ElectionState::Leader).await;

    let b = start(&store, "b").await;
    wait_state(&b.machine, waiting(0)).await;
    assert_eq!(b.leader_calls.load(Ordering::SeqCst), 0);

    store.expire(a.session).await;
    wait_state(&b.machine, ElectionState::Leader).await;
    assert_eq!(b.leader_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.children("/election").await.unwrap(), vec!["p_0000000001"]);

    let outcome = a.handle.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        ElectionOutcome::Expired {
            key: Some(key(0)),
            was_leader: true
        }
    );
}

#[tokio::test]
async fn test_only_immediate_predecessor_is_watched() {
    let store = MemoryStore::new();
    let a = start(&store, "a").await;
    wait_state(&a.machine, ElectionState::Leader).await;
    let b = start(&store, "b").await;
    wait_state(&b.machine, waiting(0)).await;
    let c = start(&store, "c").await;
    wait_state(&c.machine, waiting(1)).await;
    let d = start(&store, "d").await;
    wait_state(&d.machine, waiting(2)).await;

    // N candidates, N-1 watches, each on a distinct node
    assert_eq!(store.pending_watches().await, 3);
    assert_eq!(
        store.watched_paths().await,
        vec![
            "/election/p_0000000000",
            "/election/p_0000000001",
            "/election/p_0000000002"
        ]
    );

    store.expire(a.session).await;
    wait_state(&b.machine, ElectionState::Leader).await;

    // Candidates further down were not woken
    assert_eq!(c.machine.state().await, waiting(1));
    assert_eq!(d.machine.state().await, waiting(2));
    assert_eq!(store.pending_watches().await, 2);
    assert_eq!(c.leader_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_middle_candidate_leaving_rewires_chain() {
    let store = MemoryStore::new();
    let a = start(&store, "a").await;
    wait_state(&a.machine, ElectionState::Leader).await;
    let b = start(&store, "b").await;
    wait_state(&b.machine, waiting(0)).await;
    let c = start(&store, "c").await;
    wait_state(&c.machine, waiting(1)).await;

    store.expire(b.session).await;
    wait_state(&c.machine, waiting(0)).await;
    assert!(a.machine.is_leader().await);
    assert_eq!(c.leader_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_predecessor_gone_during_check_reevaluates() {
    let store = MemoryStore::new();
    let (other, _other_events) = store.connect().await;
    other.create("/election", &[], CreateMode::Persistent).await.unwrap();
    for _ in 0..2 {
        other
            .create("/election/p_", &[], CreateMode::EphemeralSequential)
            .await
            .unwrap();
    }
    store.vanish_on_check("/election/p_0000000001").await;

    let c = start(&store, "c").await;
    wait_state(&c.machine, waiting(0)).await;
    assert_eq!(c.machine.candidate_key().await, Some(key(2)));
    assert_eq!(store.watched_paths().await, vec!["/election/p_0000000000"]);
}

#[tokio::test]
async fn test_expiry_while_waiting_terminates() {
    let store = MemoryStore::new();
    let a = start(&store, "a").await;
    wait_state(&a.machine, ElectionState::Leader).await;
    let b = start(&store, "b").await;
    wait_state(&b.machine, waiting(0)).await;

    store.expire(b.session).await;
    let outcome = b.handle.await.unwrap().unwrap();
    assert_eq!(outcome.exit_code(), EXIT_SESSION_EXPIRED);
    assert_eq!(
        outcome,
        ElectionOutcome::Expired {
            key: Some(key(1)),
            was_leader: false
        }
    );
    assert_eq!(b.machine.state().await, ElectionState::Expired);

    // Nothing was re-registered for the dead session
    assert_eq!(store.children("/election").await.unwrap(), vec!["p_0000000000"]);
    assert_eq!(store.pending_watches().await, 0);
    assert!(a.machine.is_leader().await);
}

#[tokio::test]
async fn test_reconnect_keeps_registration() {
    let store = MemoryStore::new();
    let a = start(&store, "a").await;
    wait_state(&a.machine, ElectionState::Leader).await;
    let b = start(&store, "b").await;
    wait_state(&b.machine, waiting(0)).await;

    store.disconnect(b.session).await;
    store.reconnect(b.session).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Same node, no orphan
    assert_eq!(store.children("/election").await.unwrap().len(), 2);
    assert_eq!(b.machine.candidate_key().await, Some(key(1)));

    // The watch armed before the disconnect still fires
    store.expire(a.session).await;
    wait_state(&b.machine, ElectionState::Leader).await;
    assert_eq!(b.leader_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_leader_reconnect_does_not_reregister() {
    let store = MemoryStore::new();
    let a = start(&store, "a").await;
    wait_state(&a.machine, ElectionState::Leader).await;

    for _ in 0..3 {
        store.disconnect(a.session).await;
        store.reconnect(a.session).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(a.machine.is_leader().await);
    assert_eq!(store.children("/election").await.unwrap(), vec!["p_0000000000"]);
    assert_eq!(a.leader_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_listing_after_registration_is_fatal() {
    let store = MemoryStore::new();
    let a = start(&store, "a").await;
    wait_state(&a.machine, ElectionState::Leader).await;
    let b = start(&store, "b").await;
    wait_state(&b.machine, waiting(0)).await;

    // Someone removes b's node behind its back, then the leader leaves
    store.delete("/election/p_0000000001").await.unwrap();
    store.delete("/election/p_0000000000").await.unwrap();

    let err = b.handle.await.unwrap().unwrap_err();
    assert!(err.is_consistency_violation());
    assert!(matches!(err, Error::EmptyCandidateSet { .. }));
    assert!(!b.machine.is_leader().await);
}

#[tokio::test]
async fn test_lost_create_reply_abandons_session() {
    let store = MemoryStore::new();
    store.lose_create_reply("/election/p_").await;

    let a = start(&store, "a").await;
    let err = a.handle.await.unwrap().unwrap_err();
    assert_eq!(err.store_error(), Some(&StoreError::ConnectionLoss));

    // The node was created but never claimed; it goes away with the session
    assert_eq!(store.children("/election").await.unwrap().len(), 1);
    store.expire(a.session).await;
    assert!(store.children("/election").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_listing_error_is_fatal() {
    let store = MemoryStore::new();
    store.fail_next_list(StoreError::Other("marshalling error".into())).await;

    let a = start(&store, "a").await;
    let err = a.handle.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Store { op: "get_children", .. }));
    assert_eq!(a.machine.state().await, ElectionState::Unregistered);
}
