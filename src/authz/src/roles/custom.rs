//! Space-scoped custom role resolution
//!
//! A principal's standing in a space comes from membership rows
//! (`user`, space, `role`); the role name is mapped through the stored
//! custom role definitions to the permissions it grants. Permissions on the
//! user's own flat `userRoles` become global, non-space tokens that back the
//! space-scoped ones up when an operation has no space context.

use crate::error::{AuthzError, Result};
use crate::permission::{
    class_access_token, space_access_token, space_action_token, AccessLevel, Action,
};
use crate::space::SpacePointerResolver;
use crate::store::{Query, QueryExecutor};
use crate::types::{
    CustomRoleDefinition, OperationContext, Pointer, RoleSet, SpaceMembership, SpaceRef, UserRef,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Custom role engine
pub struct CustomRoleEngine {
    executor: Arc<dyn QueryExecutor>,
    spaces: SpacePointerResolver,
    membership_class: String,
    user_class: String,
}

impl CustomRoleEngine {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        spaces: SpacePointerResolver,
        membership_class: impl Into<String>,
        user_class: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            spaces,
            membership_class: membership_class.into(),
            user_class: user_class.into(),
        }
    }

    pub fn spaces(&self) -> &SpacePointerResolver {
        &self.spaces
    }

    /// Resolve custom-mode tokens for `user` performing `op`
    ///
    /// # Errors
    ///
    /// - `OperationForbidden` when the user has no membership in the resolved
    ///   space, or when a create request carries no create-capable token
    /// - store errors, unchanged
    pub async fn resolve(
        &self,
        user: &UserRef,
        op: &OperationContext,
        definitions: &[CustomRoleDefinition],
    ) -> Result<RoleSet> {
        let class_name = op.class_name.as_str();
        let applicable: Vec<&CustomRoleDefinition> = definitions
            .iter()
            .filter(|def| def.applies_to(class_name))
            .collect();

        let global = global_tokens(user, definitions);
        let is_create = op.is_create_request();

        let space = if applicable.is_empty() {
            None
        } else {
            self.spaces.resolve(op).await?
        };

        let Some(space) = space else {
            debug!(
                "No space context for {} on {}, using {} global token(s)",
                user.object_id,
                class_name,
                global.len()
            );
            if is_create && !global.contains(&class_access_token(class_name, AccessLevel::Write)) {
                return Err(AuthzError::forbidden(
                    &user.object_id,
                    format_args!("class {}", class_name),
                ));
            }
            return Ok(global);
        };

        let memberships = self.memberships(user, &space).await?;
        if memberships.is_empty() {
            return Err(AuthzError::forbidden(
                &user.object_id,
                format_args!("space {}", space.object_id),
            ));
        }

        let scoped = self.scoped_tokens(class_name, &space, &memberships, &applicable);
        if is_create && !scoped.values().any(|from_create| *from_create) {
            return Err(AuthzError::forbidden(
                &user.object_id,
                format_args!("class {} in space {}", class_name, space.object_id),
            ));
        }

        let mut tokens: RoleSet = scoped.into_keys().collect();
        tokens.extend(global);
        debug!(
            "User {} holds {} token(s) for {} in space {}",
            user.object_id,
            tokens.len(),
            class_name,
            space.object_id
        );
        Ok(tokens)
    }

    async fn memberships(&self, user: &UserRef, space: &SpaceRef) -> Result<Vec<SpaceMembership>> {
        let space_field = &self.spaces.config().space_field;
        let query = Query::new(&self.membership_class)
            .equal_to("user", Pointer::new(&self.user_class, &user.object_id).to_value())
            .equal_to(space_field, space.to_value());

        let records = self.executor.execute(&query).await?;
        Ok(records
            .iter()
            .filter_map(|record| SpaceMembership::from_record(record, space_field))
            .collect())
    }

    /// Scoped tokens keyed by token string, valued by "derived from a create permission"
    fn scoped_tokens(
        &self,
        class_name: &str,
        space: &SpaceRef,
        memberships: &[SpaceMembership],
        applicable: &[&CustomRoleDefinition],
    ) -> BTreeMap<String, bool> {
        let container_class = &self.spaces.config().space_class;
        let mut tokens = BTreeMap::new();

        for membership in memberships {
            let Some(def) = applicable.iter().find(|def| def.role == membership.role) else {
                continue;
            };

            for permission in def.permissions.iter().filter(|p| p.applies_to(class_name)) {
                let token = if &permission.subject == container_class {
                    space_action_token(&permission.subject, &space.object_id, permission.action)
                } else {
                    space_access_token(class_name, &space.object_id, permission.action.access())
                };
                let from_create = permission.action == Action::Create;
                *tokens.entry(token).or_insert(false) |= from_create;
            }
        }

        tokens
    }
}

/// `role:<Class>-<read|write>` for every permission on the user's flat roles
fn global_tokens(user: &UserRef, definitions: &[CustomRoleDefinition]) -> RoleSet {
    definitions
        .iter()
        .filter(|def| user.user_roles.contains(&def.role))
        .flat_map(|def| def.permissions.iter())
        .map(|p| class_access_token(&p.subject, p.action.access()))
        .collect()
}
