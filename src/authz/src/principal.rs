//! Per-request principal and role memoization
//!
//! A [`Principal`] is created for one request and dropped with it. It resolves
//! its roles at most once: concurrent callers share the single in-flight
//! resolution, a success is memoized for the rest of the request, and a
//! failure re-arms the principal so a later call can retry.
//!
//! ```text
//! Unresolved ──resolve_roles──► Resolving(shared) ──Ok──► Resolved(tokens)
//!      ▲                              │
//!      └──────────────Err─────────────┘
//! ```
//!
//! Every resolution is tagged with the generation it was started in.
//! `clear_role_cache` bumps the generation, so a resolution that was already
//! running when the cache was cleared can no longer settle the state or write
//! the role cache.

use crate::engine::RoleEngine;
use crate::error::{AuthzError, Result};
use crate::metrics::ResolutionOutcome;
use crate::types::{OperationContext, RoleSet, UserRef};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

type SharedResolution = Shared<BoxFuture<'static, Result<RoleSet>>>;

enum ResolutionState {
    Unresolved,
    Resolving(SharedResolution),
    Resolved(RoleSet),
}

/// Resolution state plus the generation that owns it
struct Slot {
    generation: u64,
    state: ResolutionState,
}

impl Slot {
    fn new() -> Self {
        Self {
            generation: 0,
            state: ResolutionState::Unresolved,
        }
    }
}

/// What `resolve_roles` should do after inspecting the state
enum Step {
    Memoized(RoleSet),
    Await(SharedResolution),
}

/// Authentication context of a single request
pub struct Principal {
    engine: Arc<RoleEngine>,
    is_master: bool,
    is_read_only: bool,
    user: Option<UserRef>,
    installation_id: Option<String>,
    request_id: Uuid,
    slot: Arc<Mutex<Slot>>,
}

impl Principal {
    fn with_flags(
        engine: Arc<RoleEngine>,
        is_master: bool,
        is_read_only: bool,
        user: Option<UserRef>,
    ) -> Self {
        Self {
            engine,
            is_master,
            is_read_only,
            user,
            installation_id: None,
            request_id: Uuid::new_v4(),
            slot: Arc::new(Mutex::new(Slot::new())),
        }
    }

    /// Master-key principal; resolves to no tokens and is trusted upstream
    pub fn master(engine: Arc<RoleEngine>) -> Self {
        Self::with_flags(engine, true, false, None)
    }

    /// Read-only master principal
    pub fn read_only(engine: Arc<RoleEngine>) -> Self {
        Self::with_flags(engine, true, true, None)
    }

    /// Anonymous principal
    pub fn nobody(engine: Arc<RoleEngine>) -> Self {
        Self::with_flags(engine, false, false, None)
    }

    /// Principal for an authenticated user
    pub fn for_user(engine: Arc<RoleEngine>, user: UserRef) -> Self {
        Self::with_flags(engine, false, false, Some(user))
    }

    pub fn with_installation_id(mut self, installation_id: impl Into<String>) -> Self {
        self.installation_id = Some(installation_id.into());
        self
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn is_read_only(&self) -> bool {
        self.is_read_only
    }

    pub fn user(&self) -> Option<&UserRef> {
        self.user.as_ref()
    }

    pub fn installation_id(&self) -> Option<&str> {
        self.installation_id.as_deref()
    }

    /// Identifier used to correlate this principal's log lines
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// True once a resolution has succeeded and its tokens are final
    pub fn is_resolved(&self) -> bool {
        matches!(self.slot.lock().state, ResolutionState::Resolved(_))
    }

    /// Whether this principal may modify the user `user_id`
    pub fn could_update_user_id(&self, user_id: &str) -> bool {
        if self.is_master {
            return true;
        }
        matches!(&self.user, Some(user) if user.object_id == user_id)
    }

    /// Resolve the tokens this principal holds for `op`
    ///
    /// Master principals and principals without a user resolve to the empty
    /// set with no I/O. Otherwise the first call starts a resolution; later
    /// calls either await that same resolution or return its memoized result,
    /// whatever `op` they pass.
    ///
    /// # Errors
    ///
    /// `OperationForbidden` from the custom role engine, or store errors
    /// unchanged. Neither is memoized.
    pub async fn resolve_roles(&self, op: &OperationContext) -> Result<RoleSet> {
        if self.is_master {
            return Ok(RoleSet::new());
        }
        let Some(user) = &self.user else {
            return Ok(RoleSet::new());
        };

        let step = {
            let mut slot = self.slot.lock();
            let current = match &slot.state {
                ResolutionState::Resolved(roles) => Some(Step::Memoized(roles.clone())),
                ResolutionState::Resolving(pending) => Some(Step::Await(pending.clone())),
                ResolutionState::Unresolved => None,
            };
            match current {
                Some(step) => step,
                None => {
                    slot.generation += 1;
                    let pending =
                        self.start_resolution(user.clone(), op.clone(), slot.generation);
                    slot.state = ResolutionState::Resolving(pending.clone());
                    Step::Await(pending)
                }
            }
        };

        match step {
            Step::Memoized(roles) => {
                debug!(
                    "[{}] Roles already resolved for user {}",
                    self.request_id, user.object_id
                );
                if let Some(metrics) = self.engine.metrics() {
                    metrics.record_memo_hit().await;
                }
                Ok(roles)
            }
            Step::Await(pending) => pending.await,
        }
    }

    /// Drop the memoized tokens and the user's role cache entry
    ///
    /// A resolution still in flight is disowned: its result reaches the callers
    /// already awaiting it but is neither memoized nor cached.
    pub async fn clear_role_cache(&self) -> Result<()> {
        {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            slot.state = ResolutionState::Unresolved;
        }
        if let Some(user) = &self.user {
            self.engine.cache().del(&user.object_id).await?;
        }
        Ok(())
    }

    /// Spawn the resolution so it completes and settles the state even if
    /// every caller stops awaiting it
    fn start_resolution(
        &self,
        user: UserRef,
        op: OperationContext,
        generation: u64,
    ) -> SharedResolution {
        let engine = Arc::clone(&self.engine);
        let slot = Arc::clone(&self.slot);
        let request_id = self.request_id;

        let task = tokio::spawn({
            let slot = Arc::clone(&slot);
            async move {
                let started = Instant::now();
                let outcome = engine.resolve(&user, &op).await;
                let user_id = user.object_id.as_str();

                match &outcome {
                    Ok(roles) => {
                        let owned = is_current(&slot, generation);
                        if owned {
                            let listed: Vec<String> = roles.iter().cloned().collect();
                            if let Err(e) = engine.cache().put(user_id, listed).await {
                                warn!(
                                    "[{}] Failed to cache roles for user {}: {}",
                                    request_id, user_id, e
                                );
                            }
                        }

                        let settled =
                            settle(&slot, generation, ResolutionState::Resolved(roles.clone()));
                        if settled {
                            debug!(
                                "[{}] Resolved {} token(s) for user {}",
                                request_id,
                                roles.len(),
                                user_id
                            );
                        } else {
                            debug!(
                                "[{}] Discarding roles for user {} resolved before a cache clear",
                                request_id, user_id
                            );
                            // Cleared while the put was in flight
                            if owned {
                                if let Err(e) = engine.cache().del(user_id).await {
                                    warn!(
                                        "[{}] Failed to drop stale roles for user {}: {}",
                                        request_id, user_id, e
                                    );
                                }
                            }
                        }
                    }
                    Err(e) => {
                        settle(&slot, generation, ResolutionState::Unresolved);
                        debug!(
                            "[{}] Role resolution failed for user {}: {}",
                            request_id, user_id, e
                        );
                    }
                }

                if let Some(metrics) = engine.metrics() {
                    let kind = match &outcome {
                        Ok(_) => ResolutionOutcome::Resolved,
                        Err(e) if e.is_forbidden() => ResolutionOutcome::Forbidden,
                        Err(_) => ResolutionOutcome::Failed,
                    };
                    metrics.record_resolution(kind, started.elapsed()).await;
                }

                outcome
            }
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    settle(&slot, generation, ResolutionState::Unresolved);
                    Err(AuthzError::Internal(format!(
                        "Role resolution task failed: {}",
                        e
                    )))
                }
            }
        }
        .boxed()
        .shared()
    }
}

fn is_current(slot: &Mutex<Slot>, generation: u64) -> bool {
    slot.lock().generation == generation
}

/// Leave `Resolving` if `generation` still owns the slot
///
/// Returns false when the slot was cleared or taken over by a newer
/// resolution, in which case it is left untouched.
fn settle(slot: &Mutex<Slot>, generation: u64, next: ResolutionState) -> bool {
    let mut slot = slot.lock();
    if slot.generation != generation || !matches!(slot.state, ResolutionState::Resolving(_)) {
        return false;
    }
    slot.state = next;
    true
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("request_id", &self.request_id)
            .field("is_master", &self.is_master)
            .field("is_read_only", &self.is_read_only)
            .field("user", &self.user.as_ref().map(|u| &u.object_id))
            .field("installation_id", &self.installation_id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
