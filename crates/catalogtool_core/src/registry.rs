use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use log::{debug, warn};
use serde_json::Value;

use crate::config::CatalogConfig;
use crate::fetch::HttpFetcher;
use crate::normalize::{
    DownloadTier, download_tier, parse_timestamp, stars_formatted, year_month,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub version: String,
    pub publish_date: Option<String>,
    pub weekly_downloads: Option<u64>,
    pub download_tier: Option<DownloadTier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRecord {
    pub star_count: u64,
    pub stars_formatted: String,
    pub last_pushed: Option<String>,
}

pub trait PackageRegistry {
    fn lookup_package(&mut self, package: &str) -> Result<PackageRecord>;
}

pub trait RepositoryHost {
    fn lookup_repository(&mut self, repo: &str) -> Result<RepositoryRecord>;
    fn is_authenticated(&self) -> bool;
}

/// Keeps successive lookups at least `delay` apart.
#[derive(Debug, Clone)]
pub struct Throttle {
    delay: Duration,
    last_request_at: Option<Instant>,
}

impl Throttle {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            last_request_at: None,
        }
    }

    pub fn wait(&mut self) {
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                sleep(self.delay - elapsed);
            }
        }
    }

    pub fn mark(&mut self) {
        self.last_request_at = Some(Instant::now());
    }
}

pub struct NpmRegistryClient {
    fetcher: HttpFetcher,
    registry_url: String,
    downloads_url: String,
    throttle: Throttle,
}

impl NpmRegistryClient {
    pub fn from_config(fetcher: HttpFetcher, config: &CatalogConfig) -> Self {
        Self {
            fetcher,
            registry_url: trim_base(&config.registries.npm_registry_url),
            downloads_url: trim_base(&config.registries.npm_downloads_url),
            throttle: Throttle::new(config.http.package_delay_ms),
        }
    }

    fn fetch_package(&self, package: &str) -> Result<PackageRecord> {
        let url = format!("{}/{}/latest", self.registry_url, package);
        let latest = self.fetcher.get(&url, &[])?;
        let version = latest
            .json()
            .and_then(version_from_latest)
            .ok_or_else(|| anyhow!("{url} did not report a version"))?;

        let weekly_downloads = self.weekly_downloads(package);
        let publish_date = self.publish_date(package, &version);
        debug!(
            "{package}: version={version} downloads={weekly_downloads:?} published={publish_date:?}"
        );

        Ok(PackageRecord {
            download_tier: weekly_downloads.map(download_tier),
            version,
            publish_date,
            weekly_downloads,
        })
    }

    fn weekly_downloads(&self, package: &str) -> Option<u64> {
        let url = format!("{}/{}", self.downloads_url, package);
        match self.fetcher.get(&url, &[]) {
            Ok(body) => body.json().and_then(downloads_from_point),
            Err(error) => {
                warn!("{package}: download count unavailable ({error})");
                None
            }
        }
    }

    fn publish_date(&self, package: &str, version: &str) -> Option<String> {
        let url = format!("{}/{}", self.registry_url, package);
        match self.fetcher.get(&url, &[]) {
            Ok(body) => body
                .json()
                .and_then(|document| publish_time_for_version(document, version)),
            Err(error) => {
                warn!("{package}: publish date unavailable ({error})");
                None
            }
        }
    }
}

impl PackageRegistry for NpmRegistryClient {
    fn lookup_package(&mut self, package: &str) -> Result<PackageRecord> {
        self.throttle.wait();
        let result = self.fetch_package(package);
        self.throttle.mark();
        result
    }
}

pub struct GitHubClient {
    fetcher: HttpFetcher,
    api_url: String,
    token: Option<String>,
    throttle: Throttle,
}

impl GitHubClient {
    pub fn from_config(fetcher: HttpFetcher, config: &CatalogConfig, token: Option<String>) -> Self {
        let delay_ms = if token.is_some() {
            config.http.authenticated_repository_delay_ms
        } else {
            config.http.repository_delay_ms
        };
        Self {
            fetcher,
            api_url: trim_base(&config.registries.github_api_url),
            token,
            throttle: Throttle::new(delay_ms),
        }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Accept", "application/vnd.github+json".to_string())];
        if let Some(token) = &self.token {
            headers.push(("Authorization", format!("Bearer {token}")));
        }
        headers
    }
}

impl RepositoryHost for GitHubClient {
    fn lookup_repository(&mut self, repo: &str) -> Result<RepositoryRecord> {
        self.throttle.wait();
        let url = format!("{}/repos/{}", self.api_url, repo);
        let result = self.fetcher.get(&url, &self.headers());
        self.throttle.mark();
        let body = result?;
        body.json()
            .and_then(repository_from_payload)
            .ok_or_else(|| anyhow!("{url} did not report a star count"))
    }

    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

pub fn version_from_latest(payload: &Value) -> Option<String> {
    payload
        .get("version")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .map(ToString::to_string)
}

pub fn downloads_from_point(payload: &Value) -> Option<u64> {
    payload.get("downloads").and_then(Value::as_u64)
}

/// The "latest" endpoint omits publish times, so they come from the full
/// document's `time` map keyed by version.
pub fn publish_time_for_version(document: &Value, version: &str) -> Option<String> {
    document
        .get("time")
        .and_then(|times| times.get(version))
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .map(|stamp| year_month(&stamp))
}

pub fn repository_from_payload(payload: &Value) -> Option<RepositoryRecord> {
    let star_count = payload.get("stargazers_count").and_then(Value::as_u64)?;
    let last_pushed = payload
        .get("pushed_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .map(|stamp| year_month(&stamp));
    Some(RepositoryRecord {
        star_count,
        stars_formatted: stars_formatted(star_count),
        last_pushed,
    })
}

fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
