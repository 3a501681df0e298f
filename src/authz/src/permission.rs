//! Permission tokens and resolved role token formatting
//!
//! Stored custom-role definitions carry permissions as `"<ClassName>-<action>"`
//! strings. They are parsed once, at the data-store boundary, into a
//! [`PermissionToken`] and never handled as raw strings past that point.

use crate::error::{AuthzError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Prefix carried by every resolved token
pub const ROLE_PREFIX: &str = "role:";

fn class_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid class name regex"))
}

/// Action named by a permission token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Read,
}

impl Action {
    /// Access level this action grants
    pub fn access(&self) -> AccessLevel {
        match self {
            Action::Create | Action::Update => AccessLevel::Write,
            Action::Read => AccessLevel::Read,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Read => "read",
        }
    }
}

impl FromStr for Action {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "read" => Ok(Action::Read),
            other => Err(AuthzError::InvalidInput(format!(
                "Unknown permission action '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collapsed access level used in resolved tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated `"<subject>-<action>"` permission
///
/// # Examples
///
/// ```
/// use rolegraph_authz::permission::{Action, PermissionToken};
///
/// let token: PermissionToken = "Post-create".parse().unwrap();
/// assert_eq!(token.subject, "Post");
/// assert_eq!(token.action, Action::Create);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionToken {
    /// Class name the permission applies to
    pub subject: String,
    /// Granted action
    pub action: Action,
}

impl PermissionToken {
    pub fn new(subject: impl Into<String>, action: Action) -> Self {
        Self {
            subject: subject.into(),
            action,
        }
    }

    /// True when this token names `class_name` exactly
    pub fn applies_to(&self, class_name: &str) -> bool {
        self.subject == class_name
    }
}

impl FromStr for PermissionToken {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        // Class names cannot contain '-', so the last one separates the action.
        let (subject, action) = s.rsplit_once('-').ok_or_else(|| {
            AuthzError::InvalidInput(format!("Permission '{}' is missing an action", s))
        })?;

        if !class_name_regex().is_match(subject) {
            return Err(AuthzError::InvalidInput(format!(
                "Permission '{}' has an invalid class name",
                s
            )));
        }

        Ok(Self {
            subject: subject.to_string(),
            action: action.parse()?,
        })
    }
}

impl fmt::Display for PermissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.subject, self.action)
    }
}

/// `role:<name>` token produced by the legacy role graph
pub fn legacy_role_token(name: &str) -> String {
    format!("{}{}", ROLE_PREFIX, name)
}

/// Global (non-space) token `role:<class>-<read|write>`
pub fn class_access_token(class_name: &str, access: AccessLevel) -> String {
    format!("{}{}-{}", ROLE_PREFIX, class_name, access)
}

/// Space-scoped token `role:<class>-<spaceId>-<read|write>`
pub fn space_access_token(class_name: &str, space_id: &str, access: AccessLevel) -> String {
    format!("{}{}-{}-{}", ROLE_PREFIX, class_name, space_id, access)
}

/// Space-scoped token that keeps the raw action, used for the space container class
pub fn space_action_token(class_name: &str, space_id: &str, action: Action) -> String {
    format!("{}{}-{}-{}", ROLE_PREFIX, class_name, space_id, action)
}
