//! # Rolegraph Authorization Engine
//!
//! Resolves the permission tokens an authenticated principal holds for a
//! requested operation, and rejects operations the principal may not perform.
//!
//! ## Features
//!
//! - **Legacy role graph**: transitive role membership with cycle-safe,
//!   breadth-first expansion (one batched query per graph level)
//! - **Space-scoped custom roles**: per-space membership mapped through stored
//!   role definitions, with create-request gating
//! - **Space pointer resolution**: bounded chasing of parent references to the
//!   space an operation's target belongs to
//! - **Mode selection** from stored data (`root` / `["all"]` sentinel)
//! - **Per-principal memoization** with single-flight resolution and a shared
//!   per-user role cache
//!
//! ## Example
//!
//! ```rust
//! use rolegraph_authz::{EngineConfig, OperationContext, Principal, RoleEngine, UserRef};
//! use rolegraph_authz::store::InMemoryQueryExecutor;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryQueryExecutor::new());
//!     store.insert("_Role", json!({
//!         "objectId": "r1",
//!         "name": "moderators",
//!         "users": [{"__type": "Pointer", "className": "_User", "objectId": "u1"}],
//!     })).await;
//!
//!     let engine = Arc::new(RoleEngine::with_config(EngineConfig::default(), store)?);
//!     let principal = Principal::for_user(engine, UserRef::new("u1"));
//!
//!     let roles = principal.resolve_roles(&OperationContext::new("Post")).await?;
//!     assert!(roles.contains("role:moderators"));
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod permission;
pub mod principal;
pub mod roles;
pub mod space;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use cache::{InMemoryRoleCache, RoleCache};
pub use config::{CacheConfig, EngineConfig, SpaceConfig};
pub use engine::RoleEngine;
pub use error::{AuthzError, ErrorKind, Result};
pub use permission::{AccessLevel, Action, PermissionToken};
pub use principal::Principal;
pub use roles::{select_mode, RoleMode};
pub use store::{Query, QueryExecutor};
pub use types::{CustomRoleDefinition, OperationContext, Pointer, RoleSet, SpaceRef, UserRef};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
