//! Engine configuration
//!
//! Every field has a default matching the stored schema the engine was built
//! against. `from_env` overlays environment variables on top of those
//! defaults:
//!
//! - `AUTHZ_ROLE_CLASS` - legacy role collection (default: `_Role`)
//! - `AUTHZ_CUSTOM_ROLE_CLASS` - custom role definitions (default: `UBRoleDefinition`)
//! - `AUTHZ_MEMBERSHIP_CLASS` - space memberships (default: `UBClassRoomUser`)
//! - `AUTHZ_SPACE_FIELD` - field holding a space pointer (default: `classRoom`)
//! - `AUTHZ_SPACE_CLASS` - space container class (default: `ClassRoom`)
//! - `AUTHZ_MAX_HOPS` - parent-chase bound (default: 8)
//! - `AUTHZ_CACHE_SIZE` - role cache capacity (default: 10000)
//! - `AUTHZ_CACHE_TTL` - role cache TTL in seconds (default: 300)

use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Legacy role collection
    pub role_class: String,
    /// Custom role definition collection
    pub custom_role_class: String,
    /// Space membership collection
    pub membership_class: String,
    /// User collection, used to build user pointers
    pub user_class: String,
    pub space: SpaceConfig,
    pub cache: CacheConfig,
    pub enable_metrics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            role_class: "_Role".to_string(),
            custom_role_class: "UBRoleDefinition".to_string(),
            membership_class: "UBClassRoomUser".to_string(),
            user_class: "_User".to_string(),
            space: SpaceConfig::default(),
            cache: CacheConfig::default(),
            enable_metrics: true,
        }
    }
}

/// Field names used to locate an operation's space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Field carrying a direct space pointer
    pub space_field: String,
    /// Class of the space container
    pub space_class: String,
    /// Field carrying a pointer to a parent record
    pub parent_field: String,
    /// Generic reference class field
    pub item_type_field: String,
    /// Generic reference id field
    pub item_id_field: String,
    /// Maximum record fetches while chasing parents
    pub max_hops: usize,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            space_field: "classRoom".to_string(),
            space_class: "ClassRoom".to_string(),
            parent_field: "post".to_string(),
            item_type_field: "itemType".to_string(),
            item_id_field: "itemId".to_string(),
            max_hops: 8,
        }
    }
}

/// Role cache sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `AUTHZ_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("AUTHZ_ROLE_CLASS") {
            config.role_class = v;
        }
        if let Some(v) = lookup("AUTHZ_CUSTOM_ROLE_CLASS") {
            config.custom_role_class = v;
        }
        if let Some(v) = lookup("AUTHZ_MEMBERSHIP_CLASS") {
            config.membership_class = v;
        }
        if let Some(v) = lookup("AUTHZ_SPACE_FIELD") {
            config.space.space_field = v;
        }
        if let Some(v) = lookup("AUTHZ_SPACE_CLASS") {
            config.space.space_class = v;
        }
        if let Some(v) = lookup("AUTHZ_MAX_HOPS") {
            config.space.max_hops = parse_number("AUTHZ_MAX_HOPS", &v)?;
        }
        if let Some(v) = lookup("AUTHZ_CACHE_SIZE") {
            config.cache.capacity = parse_number("AUTHZ_CACHE_SIZE", &v)?;
        }
        if let Some(v) = lookup("AUTHZ_CACHE_TTL") {
            config.cache.ttl_secs = parse_number("AUTHZ_CACHE_TTL", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject empty names and a zero hop bound
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("role_class", &self.role_class),
            ("custom_role_class", &self.custom_role_class),
            ("membership_class", &self.membership_class),
            ("user_class", &self.user_class),
            ("space.space_field", &self.space.space_field),
            ("space.space_class", &self.space.space_class),
            ("space.parent_field", &self.space.parent_field),
            ("space.item_type_field", &self.space.item_type_field),
            ("space.item_id_field", &self.space.item_id_field),
        ];
        for (key, value) in names {
            if value.is_empty() {
                return Err(AuthzError::InvalidInput(format!("{} cannot be empty", key)));
            }
        }

        if self.space.max_hops == 0 {
            return Err(AuthzError::InvalidInput(
                "space.max_hops must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| {
            AuthzError::InvalidInput(format!("{} is not a valid number: '{}'", key, value))
        })
}
