//! Core role resolution types
//!
//! Records arrive from the data store as JSON objects; the `from_record`
//! constructors here are the only place their shape is interpreted.

use crate::permission::PermissionToken;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use tracing::warn;

/// A stored object as returned by the data store
pub type Record = Map<String, Value>;

/// Resolved permission tokens; order is irrelevant, uniqueness is required
pub type RoleSet = BTreeSet<String>;

/// Sentinel role name that switches a deployment into custom mode
pub const ROOT_ROLE: &str = "root";

/// Sentinel permission paired with [`ROOT_ROLE`]
pub const ALL_PERMISSION: &str = "all";

/// Reference to another stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pointer {
    pub class_name: String,
    pub object_id: String,
}

impl Pointer {
    pub fn new(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: object_id.into(),
        }
    }

    /// Decode `{"__type": "Pointer", "className": .., "objectId": ..}`
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if let Some(kind) = obj.get("__type") {
            if kind != "Pointer" {
                return None;
            }
        }
        let class_name = obj.get("className")?.as_str()?;
        let object_id = obj.get("objectId")?.as_str()?;
        if class_name.is_empty() || object_id.is_empty() {
            return None;
        }
        Some(Self::new(class_name, object_id))
    }

    /// Encode as a pointer JSON value
    pub fn to_value(&self) -> Value {
        json!({
            "__type": "Pointer",
            "className": self.class_name,
            "objectId": self.object_id,
        })
    }
}

/// The space an operation's target belongs to
pub type SpaceRef = Pointer;

/// Reference to the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub object_id: String,

    /// Flat custom-role assignments carried on the user record
    #[serde(default)]
    pub user_roles: Vec<String>,
}

impl UserRef {
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            user_roles: Vec::new(),
        }
    }

    pub fn with_user_roles(mut self, roles: Vec<String>) -> Self {
        self.user_roles = roles;
        self
    }
}

/// Legacy role node (`_Role`)
///
/// An entry in `roles` means that role is a member of this one, so a user in
/// the child role also belongs to this role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDefinition {
    pub id: String,
    pub name: String,
    pub member_roles: Vec<String>,
    pub direct_users: Vec<String>,
}

impl RoleDefinition {
    pub fn from_record(record: &Record) -> Option<Self> {
        let id = record.get("objectId")?.as_str()?.to_string();
        let name = match record.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                warn!("Role {} has no name, skipping", id);
                return None;
            }
        };

        Some(Self {
            id,
            name,
            member_roles: pointer_ids(record.get("roles")),
            direct_users: pointer_ids(record.get("users")),
        })
    }
}

/// Custom role definition (`UBRoleDefinition`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomRoleDefinition {
    pub role: String,
    pub permissions: Vec<PermissionToken>,
    /// Stored permissions were exactly `["all"]`
    pub grants_all: bool,
}

impl CustomRoleDefinition {
    pub fn new(role: impl Into<String>, permissions: Vec<PermissionToken>) -> Self {
        Self {
            role: role.into(),
            permissions,
            grants_all: false,
        }
    }

    /// The `root`/`["all"]` mode switch
    pub fn root() -> Self {
        Self {
            role: ROOT_ROLE.to_string(),
            permissions: Vec::new(),
            grants_all: true,
        }
    }

    pub fn from_record(record: &Record) -> Option<Self> {
        let role = record.get("role")?.as_str()?.to_string();
        let raw: Vec<&str> = record
            .get("permissions")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let grants_all = raw == [ALL_PERMISSION];
        let permissions = raw
            .iter()
            .filter(|p| **p != ALL_PERMISSION)
            .filter_map(|p| match p.parse::<PermissionToken>() {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!("Skipping permission on role definition '{}': {}", role, e);
                    None
                }
            })
            .collect();

        Some(Self {
            role,
            permissions,
            grants_all,
        })
    }

    pub fn is_root_sentinel(&self) -> bool {
        self.role == ROOT_ROLE && self.grants_all
    }

    /// True when any permission names `class_name`
    pub fn applies_to(&self, class_name: &str) -> bool {
        self.permissions.iter().any(|p| p.applies_to(class_name))
    }
}

/// One (user, space) membership row granting a named role in that space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceMembership {
    pub user_id: String,
    pub space: SpaceRef,
    pub role: String,
}

impl SpaceMembership {
    pub fn from_record(record: &Record, space_field: &str) -> Option<Self> {
        let user = Pointer::from_value(record.get("user")?)?;
        let space = Pointer::from_value(record.get(space_field)?)?;
        let role = record.get("role")?.as_str()?.to_string();
        Some(Self {
            user_id: user.object_id,
            space,
            role,
        })
    }
}

/// Description of the operation whose roles are being resolved
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    /// Target class name
    pub class_name: String,
    /// Object payload being written (or empty)
    pub data: Record,
    /// Query identifying an existing object (e.g. `objectId`)
    pub query: Record,
    /// Where clause of the surrounding REST query
    pub rest_query: Record,
}

impl OperationContext {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = into_record(data);
        self
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = into_record(query);
        self
    }

    pub fn with_rest_query(mut self, rest_query: Value) -> Self {
        self.rest_query = into_record(rest_query);
        self
    }

    /// A brand-new-object write: neither data nor query names an existing object
    pub fn is_create_request(&self) -> bool {
        !has_object_id(&self.data) && !has_object_id(&self.query)
    }
}

fn into_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn has_object_id(record: &Record) -> bool {
    record
        .get("objectId")
        .and_then(Value::as_str)
        .map(|id| !id.is_empty())
        .unwrap_or(false)
}

fn pointer_ids(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| Pointer::from_value(item).map(|p| p.object_id))
                .collect()
        })
        .unwrap_or_default()
}
