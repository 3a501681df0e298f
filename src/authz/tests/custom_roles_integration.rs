//! Integration tests for space-scoped custom roles
//!
//! Runs full resolutions through `Principal` against a classroom deployment:
//! mode selection, scoped tokens, create gating and global fallbacks.

mod common;

use common::*;
use rolegraph_authz::store::InMemoryQueryExecutor;
use rolegraph_authz::{ErrorKind, OperationContext, Principal, RoleMode, UserRef};
use serde_json::json;
use std::sync::Arc;

async fn resolve(
    store: Arc<InMemoryQueryExecutor>,
    user: UserRef,
    op: OperationContext,
) -> rolegraph_authz::Result<rolegraph_authz::RoleSet> {
    let (engine, _) = engine(store);
    Principal::for_user(engine, user).resolve_roles(&op).await
}

// ============================================================================
// MODE SELECTION
// ============================================================================

#[tokio::test]
async fn test_sentinel_switches_mode() {
    let store = legacy_store().await;
    insert_definition(&store, "student", &["Post-read"]).await;
    let (engine, _) = engine(store.clone());
    assert_eq!(engine.mode().await.unwrap(), RoleMode::Legacy);

    enable_custom_mode(&store).await;
    assert_eq!(engine.mode().await.unwrap(), RoleMode::Custom);
}

#[tokio::test]
async fn test_legacy_tokens_in_legacy_mode() {
    let store = legacy_store().await;
    insert_definition(&store, "student", &["Post-read"]).await;

    let roles = resolve(store, UserRef::new("u1"), OperationContext::new("Post"))
        .await
        .unwrap();
    assert!(roles.contains("role:ta"));
    assert!(roles.iter().all(|r| !r.contains("-read")));
}

// ============================================================================
// SCOPED TOKENS
// ============================================================================

#[tokio::test]
async fn test_student_reads_post_in_classroom() {
    let store = classroom_store().await;
    let op = OperationContext::new("Post").with_query(json!({"objectId": "p1"}));

    let roles = resolve(store, UserRef::new("alice"), op).await.unwrap();
    assert!(roles.contains("role:Post-cr1-read"));
    assert!(!roles.contains("role:Post-cr1-write"));
}

#[tokio::test]
async fn test_instructor_creates_post_in_classroom() {
    let store = classroom_store().await;
    let op = OperationContext::new("Post").with_data(json!({
        "title": "Week 1",
        "classRoom": space_ptr("cr1"),
    }));

    let roles = resolve(store, UserRef::new("bob"), op).await.unwrap();
    assert!(roles.contains("role:Post-cr1-write"));
    assert!(roles.contains("role:Post-cr1-read"));
}

#[tokio::test]
async fn test_student_cannot_create_post() {
    let store = classroom_store().await;
    let op = OperationContext::new("Post").with_data(json!({
        "title": "Sneaky",
        "classRoom": space_ptr("cr1"),
    }));

    let err = resolve(store, UserRef::new("alice"), op).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationForbidden);
    assert_eq!(err.kind().code(), 119);
}

#[tokio::test]
async fn test_student_comments_through_parent_post() {
    let store = classroom_store().await;
    let op = OperationContext::new("Comment").with_data(json!({
        "text": "Question",
        "post": {"__type": "Pointer", "className": "Post", "objectId": "p1"},
    }));

    let roles = resolve(store, UserRef::new("alice"), op).await.unwrap();
    assert!(roles.contains("role:Comment-cr1-write"));
    assert!(roles.contains("role:Comment-cr1-read"));
}

#[tokio::test]
async fn test_reply_chain_resolves_through_two_parents() {
    let store = classroom_store().await;
    // like on comment c1, whose post p1 lives in cr1
    let op = OperationContext::new("Comment").with_query(json!({"objectId": "c1"}));

    let roles = resolve(store, UserRef::new("alice"), op).await.unwrap();
    assert!(roles.contains("role:Comment-cr1-read"));
}

#[tokio::test]
async fn test_instructor_updates_classroom_with_raw_action() {
    let store = classroom_store().await;
    let op = OperationContext::new("ClassRoom")
        .with_data(json!({"title": "Renamed"}))
        .with_query(json!({"objectId": "cr1"}));

    let roles = resolve(store, UserRef::new("bob"), op).await.unwrap();
    assert!(roles.contains("role:ClassRoom-cr1-update"));
}

#[tokio::test]
async fn test_outsider_has_no_standing() {
    let store = classroom_store().await;
    let op = OperationContext::new("Post").with_query(json!({"objectId": "p1"}));

    let err = resolve(store, UserRef::new("eve"), op).await.unwrap_err();
    assert!(err.is_forbidden());
    assert!(err.to_string().contains("eve"));
    assert!(err.to_string().contains("cr1"));
}

// ============================================================================
// GLOBAL FALLBACK
// ============================================================================

#[tokio::test]
async fn test_global_create_without_space() {
    let store = classroom_store().await;
    let user = UserRef::new("carol").with_user_roles(vec!["announcer".to_string()]);
    let op = OperationContext::new("Announcement").with_data(json!({"body": "Exam moved"}));

    let roles = resolve(store, user, op).await.unwrap();
    assert!(roles.contains("role:Announcement-write"));
}

#[tokio::test]
async fn test_create_without_space_or_global_token_is_forbidden() {
    let store = classroom_store().await;
    let op = OperationContext::new("Announcement").with_data(json!({"body": "Exam moved"}));

    let err = resolve(store, UserRef::new("alice"), op).await.unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn test_unknown_class_read_falls_back_quietly() {
    let store = classroom_store().await;
    let user = UserRef::new("alice").with_user_roles(vec!["student".to_string()]);
    let op = OperationContext::new("Badge").with_query(json!({"objectId": "b1"}));

    let roles = resolve(store, user, op).await.unwrap();
    let expected = ["role:Comment-read", "role:Comment-write", "role:Post-read"];
    assert_eq!(roles.len(), expected.len());
    for token in expected {
        assert!(roles.contains(token), "missing {}", token);
    }
}
