use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::fetch::{DEFAULT_TIMEOUT_MS, DEFAULT_USER_AGENT};

pub const DEFAULT_DOCUMENT: &str = "index.html";
pub const DEFAULT_NPM_REGISTRY_URL: &str = "https://registry.npmjs.org";
pub const DEFAULT_NPM_DOWNLOADS_URL: &str = "https://api.npmjs.org/downloads/point/last-week";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

const EMBEDDED_CATALOG: &str = include_str!("../config/default-catalog.toml");

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct CatalogConfig {
    #[serde(default)]
    pub directory: DirectorySection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub registries: RegistriesSection,
    #[serde(default)]
    pub packages: Vec<PackageEntry>,
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct DirectorySection {
    pub document: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HttpSection {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_package_delay_ms")]
    pub package_delay_ms: u64,
    #[serde(default = "default_repository_delay_ms")]
    pub repository_delay_ms: u64,
    #[serde(default = "default_authenticated_repository_delay_ms")]
    pub authenticated_repository_delay_ms: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            package_delay_ms: default_package_delay_ms(),
            repository_delay_ms: default_repository_delay_ms(),
            authenticated_repository_delay_ms: default_authenticated_repository_delay_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_package_delay_ms() -> u64 {
    200
}

fn default_repository_delay_ms() -> u64 {
    1_000
}

fn default_authenticated_repository_delay_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RegistriesSection {
    #[serde(default = "default_npm_registry_url")]
    pub npm_registry_url: String,
    #[serde(default = "default_npm_downloads_url")]
    pub npm_downloads_url: String,
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
}

impl Default for RegistriesSection {
    fn default() -> Self {
        Self {
            npm_registry_url: default_npm_registry_url(),
            npm_downloads_url: default_npm_downloads_url(),
            github_api_url: default_github_api_url(),
        }
    }
}

fn default_npm_registry_url() -> String {
    DEFAULT_NPM_REGISTRY_URL.to_string()
}

fn default_npm_downloads_url() -> String {
    DEFAULT_NPM_DOWNLOADS_URL.to_string()
}

fn default_github_api_url() -> String {
    DEFAULT_GITHUB_API_URL.to_string()
}

/// A registry package backing exactly one connector.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PackageEntry {
    pub package: String,
    pub name: String,
}

/// An `owner/repo` reference; a monorepo may back several connectors.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RepositoryEntry {
    pub repo: String,
    pub names: Vec<String>,
}

impl CatalogConfig {
    pub fn embedded() -> Result<Self> {
        toml::from_str(EMBEDDED_CATALOG).context("failed to parse embedded default catalog")
    }

    /// Resolve user agent: env CATALOG_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Some(value) = env_trimmed("CATALOG_USER_AGENT") {
            return value;
        }
        self.directory
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Resolve request timeout: env CATALOG_HTTP_TIMEOUT_MS > config.
    pub fn timeout_ms(&self) -> u64 {
        env_trimmed("CATALOG_HTTP_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(self.http.timeout_ms)
    }

    pub fn document(&self) -> &str {
        self.directory.document.as_deref().unwrap_or(DEFAULT_DOCUMENT)
    }

    pub fn validate(&self) -> Result<()> {
        let mut packages = BTreeSet::new();
        let mut names = BTreeSet::new();
        for entry in &self.packages {
            if entry.package.trim().is_empty() {
                bail!("package identifier cannot be empty");
            }
            if entry.name.trim().is_empty() {
                bail!("connector name for package {} cannot be empty", entry.package);
            }
            if !packages.insert(entry.package.as_str()) {
                bail!("package {} is listed more than once", entry.package);
            }
            if !names.insert(entry.name.as_str()) {
                bail!("connector name {} is mapped to more than one package", entry.name);
            }
        }

        let mut repos = BTreeSet::new();
        for entry in &self.repositories {
            let valid = entry
                .repo
                .split_once('/')
                .is_some_and(|(owner, repo)| {
                    !owner.is_empty() && !repo.is_empty() && !repo.contains('/')
                });
            if !valid {
                bail!("repository reference must be owner/repo: {}", entry.repo);
            }
            if !repos.insert(entry.repo.as_str()) {
                bail!("repository {} is listed more than once", entry.repo);
            }
            if entry.names.is_empty() {
                bail!("repository {} has no connector names", entry.repo);
            }
            if entry.names.iter().any(|name| name.trim().is_empty()) {
                bail!("repository {} has an empty connector name", entry.repo);
            }
        }
        Ok(())
    }
}

/// Load and parse a catalog from a TOML file.
pub fn load_config(config_path: &Path) -> Result<CatalogConfig> {
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: CatalogConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    parsed
        .validate()
        .with_context(|| format!("invalid catalog in {}", config_path.display()))?;
    Ok(parsed)
}

pub fn github_token() -> Option<String> {
    env_trimmed("GITHUB_TOKEN")
}

pub(crate) fn env_trimmed(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
