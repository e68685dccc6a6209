//! Tests for agentlab-store: MemoryStore CRUD, owner scoping, compare-and-set
//! transitions, and snapshot persistence

use agentlab_core::*;
use agentlab_store::{MemoryStore, Store};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

async fn user(store: &MemoryStore, name: &str) -> User {
    store
        .insert_user(
            NewUser { username: name.into(), email: format!("{}@example.com", name) },
            Utc::now(),
        )
        .await
        .unwrap()
}

async fn agent(store: &MemoryStore, owner: UserId) -> AgentConfig {
    store
        .insert_agent(
            owner,
            NewAgent { name: "bot".into(), framework: Framework::OpenAi, config: json!({}) },
            Utc::now(),
        )
        .await
        .unwrap()
}

// ===========================================================================
// Users and tokens
// ===========================================================================

#[tokio::test]
async fn users_get_sequential_ids() {
    let store = MemoryStore::new();
    let a = user(&store, "alice").await;
    let b = user(&store, "bobby").await;
    assert_eq!(a.id, UserId(1));
    assert_eq!(b.id, UserId(2));
    assert_eq!(store.get_user(a.id).await.unwrap().unwrap().username, "alice");
    assert!(store.get_user(UserId(99)).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_username_or_email_conflicts() {
    let store = MemoryStore::new();
    user(&store, "alice").await;
    let dup_name = store
        .insert_user(NewUser { username: "alice".into(), email: "other@example.com".into() }, Utc::now())
        .await;
    assert!(matches!(dup_name, Err(Error::Conflict(_))));
    let dup_email = store
        .insert_user(NewUser { username: "alice2".into(), email: "alice@example.com".into() }, Utc::now())
        .await;
    assert!(matches!(dup_email, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn tokens_issue_and_revoke() {
    let store = MemoryStore::new();
    let u = user(&store, "alice").await;
    store.insert_token(u.id, "s1".into()).await.unwrap();
    store.insert_token(u.id, "s2".into()).await.unwrap();
    assert_eq!(store.token_secrets(u.id).await.unwrap(), vec!["s1", "s2"]);
    assert!(store.revoke_token(u.id, "s1").await.unwrap());
    assert!(!store.revoke_token(u.id, "s1").await.unwrap());
    assert_eq!(store.token_secrets(u.id).await.unwrap(), vec!["s2"]);
    assert!(matches!(
        store.insert_token(UserId(42), "x".into()).await,
        Err(Error::UserNotFound)
    ));
}

// ===========================================================================
// Agent registry
// ===========================================================================

#[tokio::test]
async fn agents_are_owner_scoped() {
    let store = MemoryStore::new();
    let alice = user(&store, "alice").await;
    let bob = user(&store, "bobby").await;
    let a = agent(&store, alice.id).await;

    assert!(store.get_owned_agent(a.id, alice.id).await.unwrap().is_some());
    assert!(store.get_owned_agent(a.id, bob.id).await.unwrap().is_none());
    assert!(store.get_agent(a.id).await.unwrap().is_some());
    assert_eq!(store.list_agents(alice.id).await.unwrap().len(), 1);
    assert!(store.list_agents(bob.id).await.unwrap().is_empty());

    let foreign_update = store
        .update_agent(a.id, bob.id, AgentPatch { name: Some("x".into()), ..Default::default() }, Utc::now())
        .await;
    assert!(matches!(foreign_update, Err(Error::AgentNotFound(_))));
    assert!(matches!(store.delete_agent(a.id, bob.id).await, Err(Error::AgentNotFound(_))));
    assert!(store.get_agent(a.id).await.unwrap().is_some());
}

#[tokio::test]
async fn agent_update_and_delete() {
    let store = MemoryStore::new();
    let alice = user(&store, "alice").await;
    let a = agent(&store, alice.id).await;

    let updated = store
        .update_agent(
            a.id,
            alice.id,
            AgentPatch { config: Some(json!({"model": "gpt-4o"})), ..Default::default() },
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "bot");
    assert_eq!(updated.config["model"], "gpt-4o");
    assert_eq!(store.get_agent(a.id).await.unwrap().unwrap(), updated);

    store.delete_agent(a.id, alice.id).await.unwrap();
    assert!(store.get_agent(a.id).await.unwrap().is_none());
}

// ===========================================================================
// Experiments
// ===========================================================================

#[tokio::test]
async fn insert_experiment_is_pending() {
    let store = MemoryStore::new();
    let exp = store
        .insert_experiment(AgentId(1), UserId(1), json!({"prompt": "Hello"}), Utc::now())
        .await
        .unwrap();
    assert_eq!(exp.id, ExperimentId(1));
    assert_eq!(exp.status, ExperimentStatus::Pending);
    assert!(exp.started_at.is_none() && exp.completed_at.is_none());
    assert_eq!(store.get_experiment(exp.id).await.unwrap().unwrap(), exp);
}

#[tokio::test]
async fn list_experiments_ordered_by_creation_and_owner_scoped() {
    let store = MemoryStore::new();
    let base = Utc::now();
    let late = store
        .insert_experiment(AgentId(1), UserId(1), json!({}), base + Duration::seconds(10))
        .await
        .unwrap();
    let early = store
        .insert_experiment(AgentId(1), UserId(1), json!({}), base)
        .await
        .unwrap();
    store
        .insert_experiment(AgentId(2), UserId(2), json!({}), base)
        .await
        .unwrap();

    let ids: Vec<_> = store
        .list_experiments(UserId(1))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec![early.id, late.id]);
    assert!(store.get_owned_experiment(early.id, UserId(2)).await.unwrap().is_none());
}

#[tokio::test]
async fn claim_is_compare_and_set() {
    let store = MemoryStore::new();
    let exp = store
        .insert_experiment(AgentId(1), UserId(1), json!({}), Utc::now())
        .await
        .unwrap();

    let first = store.claim_experiment(exp.id, Utc::now()).await.unwrap();
    let claimed = first.expect("first claim wins");
    assert_eq!(claimed.status, ExperimentStatus::Running);
    assert!(claimed.started_at.is_some());

    assert!(store.claim_experiment(exp.id, Utc::now()).await.unwrap().is_none());
    assert!(matches!(
        store.claim_experiment(ExperimentId(99), Utc::now()).await,
        Err(Error::ExperimentNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let exp = store
        .insert_experiment(AgentId(1), UserId(1), json!({}), Utc::now())
        .await
        .unwrap();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.claim_experiment(exp.id, Utc::now()).await.unwrap() })
        })
        .collect();

    let mut winners = 0;
    for h in handles {
        if h.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn finish_requires_running() {
    let store = MemoryStore::new();
    let exp = store
        .insert_experiment(AgentId(1), UserId(1), json!({}), Utc::now())
        .await
        .unwrap();

    let early = store
        .finish_experiment(exp.id, Terminal::Completed(json!({"output": "x"})), Utc::now())
        .await;
    assert!(matches!(early, Err(Error::InvalidTransition { .. })));
    assert_eq!(
        store.get_experiment(exp.id).await.unwrap().unwrap().status,
        ExperimentStatus::Pending
    );

    store.claim_experiment(exp.id, Utc::now()).await.unwrap();
    let done = store
        .finish_experiment(exp.id, Terminal::Failed("boom".into()), Utc::now())
        .await
        .unwrap();
    assert_eq!(done.status, ExperimentStatus::Failed);
    assert_eq!(done.error.as_deref(), Some("boom"));

    let again = store
        .finish_experiment(exp.id, Terminal::Completed(json!({})), Utc::now())
        .await;
    assert!(matches!(again, Err(Error::InvalidTransition { .. })));
    let stored = store.get_experiment(exp.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExperimentStatus::Failed);
    assert!(stored.result.is_none());
}

#[tokio::test]
async fn list_by_status() {
    let store = MemoryStore::new();
    let a = store.insert_experiment(AgentId(1), UserId(1), json!({}), Utc::now()).await.unwrap();
    let b = store.insert_experiment(AgentId(1), UserId(2), json!({}), Utc::now()).await.unwrap();
    store.claim_experiment(b.id, Utc::now()).await.unwrap();

    let pending = store.list_experiments_by_status(ExperimentStatus::Pending).await.unwrap();
    let running = store.list_experiments_by_status(ExperimentStatus::Running).await.unwrap();
    assert_eq!(pending.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a.id]);
    assert_eq!(running.iter().map(|e| e.id).collect::<Vec<_>>(), vec![b.id]);
}

#[tokio::test]
async fn find_user_matches_username_or_email() {
    let store = MemoryStore::new();
    let alice = user(&store, "alice").await;
    assert_eq!(store.find_user("alice").await.unwrap().unwrap().id, alice.id);
    assert_eq!(store.find_user("alice@example.com").await.unwrap().unwrap().id, alice.id);
    assert!(store.find_user("mallory").await.unwrap().is_none());
}

#[tokio::test]
async fn password_hash_is_replaced_and_needs_a_user() {
    let store = MemoryStore::new();
    let alice = user(&store, "alice").await;
    assert!(store.password_hash(alice.id).await.unwrap().is_none());

    store.set_password_hash(alice.id, "first".into()).await.unwrap();
    store.set_password_hash(alice.id, "second".into()).await.unwrap();
    assert_eq!(store.password_hash(alice.id).await.unwrap().as_deref(), Some("second"));

    assert!(matches!(
        store.set_password_hash(UserId(99), "x".into()).await,
        Err(Error::UserNotFound)
    ));
}

// ===========================================================================
// Snapshot persistence
// ===========================================================================

#[tokio::test]
async fn snapshot_round_trip_preserves_records_and_sequences() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("agentlab.json");

    let (exp_id, agent_id) = {
        let store = MemoryStore::open(&path).unwrap();
        assert!(store.is_persistent());
        let alice = user(&store, "alice").await;
        store.insert_token(alice.id, "secret".into()).await.unwrap();
        store.set_password_hash(alice.id, "hash".into()).await.unwrap();
        let a = agent(&store, alice.id).await;
        let exp = store
            .insert_experiment(a.id, alice.id, json!({"prompt": "Hello"}), Utc::now())
            .await
            .unwrap();
        store.claim_experiment(exp.id, Utc::now()).await.unwrap();
        (exp.id, a.id)
    };
    assert!(path.exists());

    let reopened = MemoryStore::open(&path).unwrap();
    let exp = reopened.get_experiment(exp_id).await.unwrap().unwrap();
    assert_eq!(exp.status, ExperimentStatus::Running);
    assert_eq!(exp.input_data["prompt"], "Hello");
    assert!(reopened.get_agent(agent_id).await.unwrap().is_some());
    assert_eq!(reopened.token_secrets(UserId(1)).await.unwrap(), vec!["secret"]);
    assert_eq!(reopened.password_hash(UserId(1)).await.unwrap().as_deref(), Some("hash"));

    let next = reopened
        .insert_experiment(agent_id, UserId(1), json!({}), Utc::now())
        .await
        .unwrap();
    assert_eq!(next.id, ExperimentId(exp_id.0 + 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_leave_the_latest_state_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agentlab.json");
    let store = Arc::new(MemoryStore::open(&path).unwrap());
    let alice = user(&store, "alice").await;
    let (agent_id, owner) = (agent(&store, alice.id).await.id, alice.id);

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .insert_experiment(agent_id, owner, json!({"n": i}), Utc::now())
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let reopened = MemoryStore::open(&path).unwrap();
    assert_eq!(reopened.list_experiments(alice.id).await.unwrap().len(), 20);
}

#[test]
fn snapshot_without_credentials_still_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agentlab.json");
    std::fs::write(
        &path,
        r#"{"next_user":1,"next_agent":1,"next_experiment":1,"users":[],"tokens":[],"agents":[],"experiments":[]}"#,
    )
    .unwrap();
    assert!(MemoryStore::open(&path).is_ok());
}

#[test]
fn corrupt_snapshot_is_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agentlab.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(matches!(MemoryStore::open(&path), Err(Error::Storage(_))));
}
