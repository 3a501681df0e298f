//! Legacy role graph resolution
//!
//! A user directly listed in role A also belongs to every role that lists A
//! in its `roles`, transitively. The walk is breadth-first: one query finds
//! the user's direct roles, then one batched query per level finds the roles
//! containing the previous level. Visited ids are excluded both server-side
//! and locally, so cyclic stored graphs terminate and every role is counted
//! once.

use crate::cache::RoleCache;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::permission::legacy_role_token;
use crate::store::{Query, QueryExecutor};
use crate::types::{Pointer, RoleDefinition, RoleSet};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Transitive role membership over the legacy role graph
pub struct LegacyRoleResolver {
    executor: Arc<dyn QueryExecutor>,
    cache: Arc<dyn RoleCache>,
    metrics: Option<Arc<MetricsCollector>>,
    role_class: String,
    user_class: String,
}

impl LegacyRoleResolver {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        cache: Arc<dyn RoleCache>,
        role_class: impl Into<String>,
        user_class: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            cache,
            metrics: None,
            role_class: role_class.into(),
            user_class: user_class.into(),
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<MetricsCollector>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Resolve `role:<name>` tokens for `user_id`
    ///
    /// A role cache entry short-circuits the walk. A failing cache read is
    /// treated as a miss.
    pub async fn resolve(&self, user_id: &str) -> Result<RoleSet> {
        match self.cache.get(user_id).await {
            Ok(Some(roles)) => {
                debug!("Role cache hit for user {}", user_id);
                if let Some(metrics) = &self.metrics {
                    metrics.record_cache_hit().await;
                }
                return Ok(roles.into_iter().collect());
            }
            Ok(None) => {}
            Err(e) => warn!("Role cache read failed for user {}: {}", user_id, e),
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_cache_miss().await;
        }

        let names = self.walk(user_id).await?;
        Ok(names.iter().map(|name| legacy_role_token(name)).collect())
    }

    /// Names of every role `user_id` belongs to, directly or transitively
    pub async fn walk(&self, user_id: &str) -> Result<HashSet<String>> {
        let user = Pointer::new(&self.user_class, user_id).to_value();
        let direct_query = Query::new(&self.role_class).equal_to("users", user);
        let direct = self.fetch_roles(&direct_query).await?;

        let mut names = HashSet::new();
        let mut visited = HashSet::new();
        let mut frontier = Vec::new();
        for role in direct {
            if visited.insert(role.id.clone()) {
                names.insert(role.name);
                frontier.push(role.id);
            }
        }

        let mut depth = 0;
        while !frontier.is_empty() {
            depth += 1;
            debug!(
                "Expanding {} role(s) at depth {} for user {}",
                frontier.len(),
                depth,
                user_id
            );

            let members: Vec<Value> = frontier
                .iter()
                .map(|id| Pointer::new(&self.role_class, id).to_value())
                .collect();
            let seen: Vec<Value> = visited.iter().map(|id| json!(id)).collect();
            let query = Query::new(&self.role_class)
                .contained_in("roles", members)
                .not_contained_in("objectId", seen);

            frontier = Vec::new();
            for role in self.fetch_roles(&query).await? {
                if visited.insert(role.id.clone()) {
                    names.insert(role.name);
                    frontier.push(role.id);
                }
            }
        }

        debug!("User {} belongs to {} role(s)", user_id, names.len());
        Ok(names)
    }

    async fn fetch_roles(&self, query: &Query) -> Result<Vec<RoleDefinition>> {
        let records = self.executor.execute(query).await?;
        Ok(records.iter().filter_map(RoleDefinition::from_record).collect())
    }
}
