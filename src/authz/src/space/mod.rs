//! Space pointer resolution
//!
//! Locates the logical space (e.g. a classroom) an operation's target belongs
//! to by following pointer fields through the data store.
//!
//! # Examples
//!
//! ```no_run
//! use rolegraph_authz::config::SpaceConfig;
//! use rolegraph_authz::space::SpacePointerResolver;
//! use rolegraph_authz::store::InMemoryQueryExecutor;
//! use rolegraph_authz::types::OperationContext;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> rolegraph_authz::Result<()> {
//! let resolver = SpacePointerResolver::new(
//!     Arc::new(InMemoryQueryExecutor::new()),
//!     SpaceConfig::default(),
//! );
//! let op = OperationContext::new("Post").with_data(json!({
//!     "classRoom": {"__type": "Pointer", "className": "ClassRoom", "objectId": "cr1"}
//! }));
//! let space = resolver.resolve(&op).await?;
//! assert_eq!(space.unwrap().object_id, "cr1");
//! # Ok(())
//! # }
//! ```

mod resolver;


pub use resolver::SpacePointerResolver;
