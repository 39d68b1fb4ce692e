//! Repository descriptors as produced by configuration.
//!
//! These are plain data; the engine turns them into live repositories (with a
//! storage provider and HTTP clients) once at startup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    Hosted,
    Proxy,
    Group,
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryKind::Hosted => write!(f, "hosted"),
            RepositoryKind::Proxy => write!(f, "proxy"),
            RepositoryKind::Group => write!(f, "group"),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default = "default_true")]
    pub store_locally: bool,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            store_locally: true,
            connect_timeout_secs: None,
            read_timeout_secs: None,
        }
    }

    pub fn connect_timeout(&self, default_secs: Option<u64>) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .or(default_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn read_timeout(&self, default_secs: Option<u64>) -> Duration {
        Duration::from_secs(
            self.read_timeout_secs
                .or(default_secs)
                .unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RepositoryConfig {
    pub name: String,
    #[serde(default)]
    pub visibility: Visibility,
    pub kind: RepositoryKind,
    /// Upstreams in priority order (proxy repositories only).
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
    /// Member repository names in lookup order (group repositories only).
    #[serde(default)]
    pub members: Vec<String>,
    /// Whether an existing release file may be overwritten.
    #[serde(default = "default_true")]
    pub redeploy: bool,
    /// Whether a proxy repository accepts direct deploys into its cache.
    #[serde(default)]
    pub accept_deploys: bool,
    /// Storage root override; defaults to `<storage path>/<name>`.
    #[serde(default)]
    pub storage_path: Option<String>,
}

impl RepositoryConfig {
    pub fn hosted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            kind: RepositoryKind::Hosted,
            remotes: Vec::new(),
            members: Vec::new(),
            redeploy: true,
            accept_deploys: false,
            storage_path: None,
        }
    }

    pub fn proxy(name: impl Into<String>, remotes: Vec<RemoteConfig>) -> Self {
        Self {
            kind: RepositoryKind::Proxy,
            remotes,
            ..Self::hosted(name)
        }
    }

    pub fn group(name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            kind: RepositoryKind::Group,
            members,
            ..Self::hosted(name)
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Whether this repository owns a storage root.
    pub fn has_storage(&self) -> bool {
        self.kind != RepositoryKind::Group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"[
            {"name": "releases", "kind": "hosted"},
            {"name": "central", "kind": "proxy", "visibility": "private",
             "remotes": [{"base_url": "https://repo1.maven.org/maven2", "read_timeout_secs": 10}]},
            {"name": "public", "kind": "group", "members": ["releases", "central"]}
        ]"#;
        let configs: Vec<RepositoryConfig> = serde_json::from_str(json).unwrap();

        assert_eq!(configs[0], RepositoryConfig::hosted("releases"));
        assert_eq!(configs[1].visibility, Visibility::Private);
        assert!(configs[1].remotes[0].store_locally);
        assert_eq!(
            configs[1].remotes[0].read_timeout(None),
            Duration::from_secs(10)
        );
        assert_eq!(
            configs[1].remotes[0].connect_timeout(Some(2)),
            Duration::from_secs(2)
        );
        assert_eq!(configs[2].members, vec!["releases", "central"]);
        assert!(!configs[2].has_storage());
    }
}
