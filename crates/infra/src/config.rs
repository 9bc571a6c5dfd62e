//! Runtime security settings.
//!
//! Read once at startup from `KEYSTONE_*` environment variables; anything
//! unset falls back to the defaults below.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use keystone_core::UserId;

pub const DEFAULT_REFRESH_TOKEN_TTL_DAYS: u32 = 7;
pub const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: u32 = 15;
pub const DEFAULT_MAX_UPDATE_RETRIES: u32 = 3;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

pub const MAX_REFRESH_TOKEN_TTL_DAYS: u32 = 3650;
pub const MAX_ACCESS_TOKEN_TTL_MINUTES: u32 = 24 * 60;

pub const ENV_REFRESH_TOKEN_TTL_DAYS: &str = "KEYSTONE_REFRESH_TOKEN_TTL_DAYS";
pub const ENV_ACCESS_TOKEN_TTL_MINUTES: &str = "KEYSTONE_ACCESS_TOKEN_TTL_MINUTES";
pub const ENV_PROTECTED_USER_ID: &str = "KEYSTONE_PROTECTED_USER_ID";
pub const ENV_MAX_UPDATE_RETRIES: &str = "KEYSTONE_MAX_UPDATE_RETRIES";
pub const ENV_BIND_ADDR: &str = "KEYSTONE_BIND_ADDR";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Lifetime of newly issued refresh tokens, 1..=3650 days.
    pub refresh_token_ttl_days: u32,

    /// 1..=1440 minutes.
    pub access_token_ttl_minutes: u32,

    /// The account no actor may delete or deactivate.
    pub protected_user_id: Option<UserId>,

    /// How often a use case reloads and reapplies an account mutation after
    /// losing an optimistic concurrency race.
    pub max_update_retries: u32,

    pub bind_addr: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            refresh_token_ttl_days: DEFAULT_REFRESH_TOKEN_TTL_DAYS,
            access_token_ttl_minutes: DEFAULT_ACCESS_TOKEN_TTL_MINUTES,
            protected_user_id: None,
            max_update_retries: DEFAULT_MAX_UPDATE_RETRIES,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl SecurityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(v) = get(ENV_REFRESH_TOKEN_TTL_DAYS) {
            config.refresh_token_ttl_days = parse_bounded(ENV_REFRESH_TOKEN_TTL_DAYS, v, MAX_REFRESH_TOKEN_TTL_DAYS)?;
        }
        if let Some(v) = get(ENV_ACCESS_TOKEN_TTL_MINUTES) {
            config.access_token_ttl_minutes =
                parse_bounded(ENV_ACCESS_TOKEN_TTL_MINUTES, v, MAX_ACCESS_TOKEN_TTL_MINUTES)?;
        }
        if let Some(v) = get(ENV_MAX_UPDATE_RETRIES) {
            config.max_update_retries = parse_bounded(ENV_MAX_UPDATE_RETRIES, v, u32::MAX)?;
        }
        if let Some(v) = get(ENV_PROTECTED_USER_ID) {
            let id = UserId::from_str(&v).map_err(|_| ConfigError::Invalid {
                key: ENV_PROTECTED_USER_ID,
                value: v.clone(),
            })?;
            config.protected_user_id = Some(id);
        }
        if let Some(v) = get(ENV_BIND_ADDR) {
            config.bind_addr = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make issued credentials unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_bounds(ENV_REFRESH_TOKEN_TTL_DAYS, self.refresh_token_ttl_days, MAX_REFRESH_TOKEN_TTL_DAYS)?;
        check_bounds(ENV_ACCESS_TOKEN_TTL_MINUTES, self.access_token_ttl_minutes, MAX_ACCESS_TOKEN_TTL_MINUTES)?;
        check_bounds(ENV_MAX_UPDATE_RETRIES, self.max_update_retries, u32::MAX)
    }
}

fn check_bounds(key: &'static str, value: u32, max: u32) -> Result<(), ConfigError> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        })
    }
}

fn parse_bounded(key: &'static str, value: String, max: u32) -> Result<u32, ConfigError> {
    match value.parse::<u32>() {
        Ok(n) if (1..=max).contains(&n) => Ok(n),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}
