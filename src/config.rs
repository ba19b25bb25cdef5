//! Ignition configuration.
//!
//! Configuration is built in code, read from `IGNITE_*` environment variables,
//! or (with the `config` feature) parsed from JSON.

use std::env;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::{DiError, DiResult};

/// Process role. Singletons are marked eligible for exactly one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "lowercase"))]
pub enum Role {
    #[default]
    Server,
    Client,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DiError;

    fn from_str(s: &str) -> DiResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Role::Server),
            "client" => Ok(Role::Client),
            other => Err(DiError::misuse(format!("unknown role '{}'", other))),
        }
    }
}

/// Configuration for [`Ignition`](crate::Ignition).
///
/// # Examples
///
/// ```rust
/// use ignite_di::{IgniteConfig, Role};
///
/// let config = IgniteConfig::new(Role::Client)
///     .allow(["game/Camera", "game/Input"])
///     .include_optional("game/DebugOverlay")
///     .max_idle_contexts(4);
///
/// assert_eq!(config.role, Role::Client);
/// assert!(config.is_allowed("game/Camera"));
/// assert!(!config.is_allowed("game/Physics"));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct IgniteConfig {
    /// Role of this process; selects which singletons are ignited.
    pub role: Role,
    /// When set, only listed identifiers (and patched ones) are ignited.
    pub allow_list: Option<Vec<String>>,
    /// Optional singletons to ignite anyway.
    pub include_optional: Vec<String>,
    /// Idle execution contexts kept for reuse by the frame scheduler.
    pub max_idle_contexts: usize,
    /// Maximum construction depth before resolution gives up. Applied by
    /// `Ignition::with_config`; a container passed to `Ignition::new` keeps
    /// its own cap.
    pub max_depth: usize,
}

impl Default for IgniteConfig {
    fn default() -> Self {
        Self {
            role: Role::Server,
            allow_list: None,
            include_optional: Vec::new(),
            max_idle_contexts: 16,
            max_depth: 1024,
        }
    }
}

impl IgniteConfig {
    pub fn new(role: Role) -> Self {
        Self { role, ..Self::default() }
    }

    pub fn allow<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_list
            .get_or_insert_with(Vec::new)
            .extend(identifiers.into_iter().map(Into::into));
        self
    }

    pub fn include_optional(mut self, identifier: impl Into<String>) -> Self {
        self.include_optional.push(identifier.into());
        self
    }

    pub fn max_idle_contexts(mut self, count: usize) -> Self {
        self.max_idle_contexts = count;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Whether `identifier` passes the allow-list (always true without one).
    pub fn is_allowed(&self, identifier: &str) -> bool {
        self.allow_list
            .as_ref()
            .map_or(true, |list| list.iter().any(|id| id == identifier))
    }

    pub fn includes_optional(&self, identifier: &str) -> bool {
        self.include_optional.iter().any(|id| id == identifier)
    }

    /// Reads `IGNITE_ROLE`, `IGNITE_ALLOW`, `IGNITE_INCLUDE_OPTIONAL`,
    /// `IGNITE_MAX_IDLE_CONTEXTS` and `IGNITE_MAX_DEPTH`. Unset variables keep
    /// their defaults; lists are comma-separated.
    pub fn from_env() -> DiResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> DiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(role) = lookup("IGNITE_ROLE") {
            config.role = role.parse()?;
        }
        if let Some(allow) = lookup("IGNITE_ALLOW") {
            config.allow_list = Some(split_list(&allow));
        }
        if let Some(optional) = lookup("IGNITE_INCLUDE_OPTIONAL") {
            config.include_optional = split_list(&optional);
        }
        if let Some(idle) = lookup("IGNITE_MAX_IDLE_CONTEXTS") {
            config.max_idle_contexts = parse_count("IGNITE_MAX_IDLE_CONTEXTS", &idle)?;
        }
        if let Some(depth) = lookup("IGNITE_MAX_DEPTH") {
            config.max_depth = parse_count("IGNITE_MAX_DEPTH", &depth)?;
        }
        Ok(config)
    }

    /// Parses a JSON document; missing fields keep their defaults.
    #[cfg(feature = "config")]
    pub fn from_json_str(json: &str) -> DiResult<Self> {
        serde_json::from_str(json).map_err(|e| DiError::misuse(format!("invalid ignition config: {}", e)))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_count(name: &str, raw: &str) -> DiResult<usize> {
    raw.trim()
        .parse()
        .map_err(|_| DiError::misuse(format!("{} must be a non-negative integer, got '{}'", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_lists_are_split_and_trimmed() {
        let config = IgniteConfig::from_lookup(lookup(&[
            ("IGNITE_ROLE", "Client"),
            ("IGNITE_ALLOW", "game/A, game/B,,"),
            ("IGNITE_MAX_IDLE_CONTEXTS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.allow_list, Some(vec!["game/A".to_string(), "game/B".to_string()]));
        assert_eq!(config.max_idle_contexts, 3);
        assert_eq!(config.max_depth, 1024);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(IgniteConfig::from_lookup(lookup(&[("IGNITE_ROLE", "both")])).is_err());
        assert!(IgniteConfig::from_lookup(lookup(&[("IGNITE_MAX_DEPTH", "-1")])).is_err());
    }

    #[test]
    fn no_allow_list_allows_everything() {
        let config = IgniteConfig::default();
        assert!(config.is_allowed("anything"));
    }

    #[cfg(feature = "config")]
    #[test]
    fn json_fills_defaults() {
        let config = IgniteConfig::from_json_str(r#"{ "role": "client", "allow_list": ["x"] }"#).unwrap();
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.max_idle_contexts, 16);
        assert!(config.is_allowed("x"));
    }
}
