//! Role engine
//!
//! Wires the data-store executor, the role cache and the resolvers together.
//! One engine is shared (behind an `Arc`) by every [`Principal`] a host
//! creates; the principal owns memoization, the engine owns the algorithms.
//!
//! # Architecture
//!
//! ```text
//! Principal::resolve_roles
//!     │
//!     ▼
//! RoleEngine::resolve ── fetch custom role definitions ── select_mode
//!     │                                                      │
//!     ├── Legacy ──► LegacyRoleResolver ──► RoleCache / _Role graph walk
//!     │
//!     └── Custom ──► CustomRoleEngine ──► SpacePointerResolver ──► memberships
//! ```
//!
//! [`Principal`]: crate::principal::Principal

use crate::cache::{InMemoryRoleCache, RoleCache};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::roles::{select_mode, CustomRoleEngine, LegacyRoleResolver, RoleMode};
use crate::space::SpacePointerResolver;
use crate::store::{Query, QueryExecutor};
use crate::types::{CustomRoleDefinition, OperationContext, RoleSet, UserRef};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared role resolution services
pub struct RoleEngine {
    config: EngineConfig,
    executor: Arc<dyn QueryExecutor>,
    cache: Arc<dyn RoleCache>,
    legacy: LegacyRoleResolver,
    custom: CustomRoleEngine,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RoleEngine {
    /// Create an engine over the given executor and cache
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the configuration does not validate.
    pub fn new(
        config: EngineConfig,
        executor: Arc<dyn QueryExecutor>,
        cache: Arc<dyn RoleCache>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = config
            .enable_metrics
            .then(|| Arc::new(MetricsCollector::new()));

        let legacy = LegacyRoleResolver::new(
            executor.clone(),
            cache.clone(),
            &config.role_class,
            &config.user_class,
        )
        .with_metrics(metrics.clone());

        let spaces = SpacePointerResolver::new(executor.clone(), config.space.clone());
        let custom = CustomRoleEngine::new(
            executor.clone(),
            spaces,
            &config.membership_class,
            &config.user_class,
        );

        info!(
            "RoleEngine initialized with role_class={}, custom_role_class={}, metrics={}",
            config.role_class, config.custom_role_class, config.enable_metrics
        );

        Ok(Self {
            config,
            executor,
            cache,
            legacy,
            custom,
            metrics,
        })
    }

    /// Engine with an in-process role cache sized by `config.cache`
    pub fn with_config(config: EngineConfig, executor: Arc<dyn QueryExecutor>) -> Result<Self> {
        let cache = Arc::new(InMemoryRoleCache::new(&config.cache));
        Self::new(config, executor, cache)
    }

    /// Load every stored custom role definition
    pub async fn custom_role_definitions(&self) -> Result<Vec<CustomRoleDefinition>> {
        let query = Query::new(&self.config.custom_role_class);
        let records = self.executor.execute(&query).await?;
        Ok(records
            .iter()
            .filter_map(CustomRoleDefinition::from_record)
            .collect())
    }

    /// Current mode, derived from the stored definitions
    pub async fn mode(&self) -> Result<RoleMode> {
        Ok(select_mode(&self.custom_role_definitions().await?))
    }

    /// Resolve tokens for `user` performing `op`, without memoization
    pub async fn resolve(&self, user: &UserRef, op: &OperationContext) -> Result<RoleSet> {
        let definitions = self.custom_role_definitions().await?;
        let mode = select_mode(&definitions);
        debug!(
            "Resolving roles for user {} on {} in {} mode",
            user.object_id, op.class_name, mode
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_mode(mode == RoleMode::Custom).await;
        }

        match mode {
            RoleMode::Legacy => self.legacy.resolve(&user.object_id).await,
            RoleMode::Custom => self.custom.resolve(user, op, &definitions).await,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn RoleCache> {
        &self.cache
    }

    pub fn legacy(&self) -> &LegacyRoleResolver {
        &self.legacy
    }

    pub fn custom(&self) -> &CustomRoleEngine {
        &self.custom
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsCollector>> {
        self.metrics.as_ref()
    }
}
