//! Configuration module
//!
//! Server settings are read from the environment (after loading `.env`).
//! Repository definitions arrive as a JSON array of `RepositoryConfig` in
//! `DEPOT_REPOSITORIES`; without it a public `releases` and `snapshots` pair of
//! hosted repositories is configured.

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MIN_FREE_MB, DEFAULT_PORT, DEFAULT_READ_TIMEOUT_SECS,
    DEFAULT_STORAGE_PATH,
};
use crate::models::{RepositoryConfig, RepositoryKind};

/// One statically configured access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessTokenConfig {
    pub token: String,
    pub can_write: bool,
    /// Repository names the token applies to; empty means every repository.
    pub repositories: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub storage_path: PathBuf,
    pub min_free_bytes: u64,
    pub default_connect_timeout_secs: u64,
    pub default_read_timeout_secs: u64,
    pub repositories: Vec<RepositoryConfig>,
    pub access_tokens: Vec<AccessTokenConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_PORT,
            environment: "development".to_string(),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            min_free_bytes: DEFAULT_MIN_FREE_MB * 1024 * 1024,
            default_connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            default_read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            repositories: default_repositories(),
            access_tokens: Vec::new(),
        }
    }
}

fn default_repositories() -> Vec<RepositoryConfig> {
    vec![
        RepositoryConfig::hosted("releases"),
        RepositoryConfig::hosted("snapshots"),
    ]
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let repositories = match env::var("DEPOT_REPOSITORIES") {
            Ok(json) if !json.trim().is_empty() => serde_json::from_str(&json)
                .map_err(|e| anyhow::anyhow!("DEPOT_REPOSITORIES is not valid JSON: {}", e))?,
            _ => default_repositories(),
        };

        let access_tokens = match env::var("DEPOT_ACCESS_TOKENS") {
            Ok(raw) => parse_access_tokens(&raw)?,
            Err(_) => Vec::new(),
        };

        let min_free_mb = env::var("DEPOT_MIN_FREE_MB")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_MIN_FREE_MB);

        let config = Config {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
            storage_path: env::var("DEPOT_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORAGE_PATH)),
            min_free_bytes: min_free_mb * 1024 * 1024,
            default_connect_timeout_secs: env::var("DEPOT_DEFAULT_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            default_read_timeout_secs: env::var("DEPOT_DEFAULT_READ_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
            repositories,
            access_tokens,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the repository set for problems detectable without building it.
    /// Member resolution and cycle detection happen when the registry is built.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let mut seen = HashSet::new();
        for repository in &self.repositories {
            let name = repository.name.trim();
            if name.is_empty() {
                anyhow::bail!("Repository names must not be empty");
            }
            if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
                anyhow::bail!("Repository name '{}' is not a valid path segment", name);
            }
            if !seen.insert(name.to_string()) {
                anyhow::bail!("Duplicate repository name '{}'", name);
            }
            match repository.kind {
                RepositoryKind::Proxy if repository.remotes.is_empty() => {
                    anyhow::bail!("Proxy repository '{}' has no remotes", name);
                }
                RepositoryKind::Group if repository.members.is_empty() => {
                    anyhow::bail!("Group repository '{}' has no members", name);
                }
                _ => {}
            }
            for remote in &repository.remotes {
                if !(remote.base_url.starts_with("http://")
                    || remote.base_url.starts_with("https://"))
                {
                    anyhow::bail!(
                        "Remote '{}' of repository '{}' must be an http(s) URL",
                        remote.base_url,
                        name
                    );
                }
            }
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        let environment = self.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn repository_root(&self, repository: &RepositoryConfig) -> PathBuf {
        repository
            .storage_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.storage_path.join(&repository.name))
    }
}

/// Parse `token:rw:repo1+repo2,token2:r:*` into token configs.
pub fn parse_access_tokens(raw: &str) -> Result<Vec<AccessTokenConfig>, anyhow::Error> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let token = parts.next().unwrap_or_default().trim();
            let mode = parts.next().unwrap_or("r").trim();
            let scope = parts.next().unwrap_or("*").trim();

            if token.is_empty() {
                anyhow::bail!("Access token entries must start with a token");
            }
            let can_write = match mode {
                "rw" | "w" => true,
                "r" => false,
                other => anyhow::bail!("Unknown access mode '{}' (expected r or rw)", other),
            };
            let repositories = if scope == "*" {
                Vec::new()
            } else {
                scope.split('+').map(|s| s.trim().to_string()).collect()
            };

            Ok(AccessTokenConfig {
                token: token.to_string(),
                can_write,
                repositories,
            })
        })
        .collect()
}
