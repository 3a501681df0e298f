//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rolegraph_authz::store::InMemoryQueryExecutor;
use rolegraph_authz::types::Record;
use rolegraph_authz::{
    AuthzError, EngineConfig, InMemoryRoleCache, Pointer, Query, QueryExecutor, RoleEngine,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

/// Route engine logs to the test output; `RUST_LOG=rolegraph_authz=debug` to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn user_ptr(id: &str) -> Value {
    Pointer::new("_User", id).to_value()
}

pub fn role_ptr(id: &str) -> Value {
    Pointer::new("_Role", id).to_value()
}

pub fn space_ptr(id: &str) -> Value {
    Pointer::new("ClassRoom", id).to_value()
}

pub async fn insert_role(
    store: &InMemoryQueryExecutor,
    id: &str,
    name: &str,
    members: &[&str],
    users: &[&str],
) {
    let roles: Vec<Value> = members.iter().map(|m| role_ptr(m)).collect();
    let users: Vec<Value> = users.iter().map(|u| user_ptr(u)).collect();
    store
        .insert("_Role", json!({"objectId": id, "name": name, "roles": roles, "users": users}))
        .await;
}

pub async fn insert_definition(store: &InMemoryQueryExecutor, role: &str, permissions: &[&str]) {
    store
        .insert("UBRoleDefinition", json!({"role": role, "permissions": permissions}))
        .await;
}

pub async fn insert_membership(store: &InMemoryQueryExecutor, user: &str, space: &str, role: &str) {
    store
        .insert(
            "UBClassRoomUser",
            json!({"user": user_ptr(user), "classRoom": space_ptr(space), "role": role}),
        )
        .await;
}

/// Switch the store into custom mode
pub async fn enable_custom_mode(store: &InMemoryQueryExecutor) {
    insert_definition(store, "root", &["all"]).await;
}

/// Legacy organisation: u1 is a TA; TAs are members of staff; staff of everyone
pub async fn legacy_store() -> Arc<InMemoryQueryExecutor> {
    let store = Arc::new(InMemoryQueryExecutor::new());
    insert_role(&store, "r-ta", "ta", &[], &["u1"]).await;
    insert_role(&store, "r-staff", "staff", &["r-ta"], &[]).await;
    insert_role(&store, "r-everyone", "everyone", &["r-staff"], &["u2"]).await;
    store
}

/// Classroom deployment with students and instructors in cr1
pub async fn classroom_store() -> Arc<InMemoryQueryExecutor> {
    let store = Arc::new(InMemoryQueryExecutor::new());
    enable_custom_mode(&store).await;
    insert_definition(&store, "student", &["Post-read", "Comment-create", "Comment-read"]).await;
    insert_definition(
        &store,
        "instructor",
        &["Post-create", "Post-update", "Post-read", "ClassRoom-update"],
    )
    .await;
    insert_definition(&store, "announcer", &["Announcement-create"]).await;

    insert_membership(&store, "alice", "cr1", "student").await;
    insert_membership(&store, "bob", "cr1", "instructor").await;

    store
        .insert("Post", json!({"objectId": "p1", "classRoom": space_ptr("cr1")}))
        .await;
    store
        .insert("Comment", json!({"objectId": "c1", "post": Pointer::new("Post", "p1").to_value()}))
        .await;
    store
}

pub fn engine(store: Arc<InMemoryQueryExecutor>) -> (Arc<RoleEngine>, Arc<InMemoryRoleCache>) {
    engine_over(store)
}

pub fn engine_over(
    executor: Arc<dyn QueryExecutor>,
) -> (Arc<RoleEngine>, Arc<InMemoryRoleCache>) {
    let config = EngineConfig::default();
    let cache = Arc::new(InMemoryRoleCache::new(&config.cache));
    let engine = RoleEngine::new(config, executor, cache.clone()).expect("valid default config");
    (Arc::new(engine), cache)
}

/// Executor that parks chosen queries until the test releases them
///
/// Queries are numbered from 0 in the order they arrive. A parked query has
/// not reached the inner store yet, so `fail_next` set while it waits applies
/// to it once released.
pub struct GatedExecutor {
    inner: Arc<InMemoryQueryExecutor>,
    parked_at: Mutex<HashSet<usize>>,
    seen: AtomicUsize,
    arrived: Notify,
    release: Semaphore,
}

impl GatedExecutor {
    pub fn new(inner: Arc<InMemoryQueryExecutor>) -> Self {
        Self {
            inner,
            parked_at: Mutex::new(HashSet::new()),
            seen: AtomicUsize::new(0),
            arrived: Notify::new(),
            release: Semaphore::new(0),
        }
    }

    /// Park the query with sequence number `index`
    pub fn park(&self, index: usize) {
        self.parked_at.lock().insert(index);
    }

    /// Wait until a parked query has arrived
    pub async fn parked(&self) {
        self.arrived.notified().await;
    }

    /// Let the longest-parked query through
    pub fn release_one(&self) {
        self.release.add_permits(1);
    }

    pub fn query_count(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for GatedExecutor {
    async fn execute(&self, query: &Query) -> rolegraph_authz::Result<Vec<Record>> {
        let index = self.seen.fetch_add(1, Ordering::SeqCst);
        let parked = self.parked_at.lock().remove(&index);
        if parked {
            self.arrived.notify_one();
            self.release
                .acquire()
                .await
                .map_err(|e| AuthzError::Internal(e.to_string()))?
                .forget();
        }
        self.inner.execute(query).await
    }
}
