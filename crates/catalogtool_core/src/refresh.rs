use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::CatalogConfig;
use crate::patch::{Change, patch_document};
use crate::registry::{PackageRecord, PackageRegistry, RepositoryHost, RepositoryRecord};
use crate::runtime::{ResolvedPaths, ensure_document_exists};

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub apply: bool,
    /// Rendered `Current as of` date.
    pub today: String,
}

#[derive(Debug, Clone)]
pub struct SkippedLookup {
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub changes: Vec<Change>,
    pub skipped_lookups: Vec<SkippedLookup>,
    pub applied: bool,
    pub written_bytes: Option<u64>,
}

impl RefreshReport {
    pub fn is_up_to_date(&self) -> bool {
        self.changes.is_empty()
    }
}

/// One lookup per package, strictly sequential. Failures only cost that package.
/// Records keep catalog order, keyed by connector name.
pub fn collect_package_records<R: PackageRegistry>(
    catalog: &CatalogConfig,
    registry: &mut R,
    skipped: &mut Vec<SkippedLookup>,
) -> Vec<(String, PackageRecord)> {
    let mut records = Vec::new();
    for entry in &catalog.packages {
        match registry.lookup_package(&entry.package) {
            Ok(record) => {
                info!("{}: {} v{}", entry.name, entry.package, record.version);
                records.push((entry.name.clone(), record));
            }
            Err(error) => {
                warn!("{}: package lookup failed: {error:#}", entry.package);
                skipped.push(SkippedLookup {
                    target: entry.package.clone(),
                    reason: format!("{error:#}"),
                });
            }
        }
    }
    records
}

/// One lookup per repository; the record is shared by every connector it backs.
pub fn collect_repository_records<H: RepositoryHost>(
    catalog: &CatalogConfig,
    host: &mut H,
    skipped: &mut Vec<SkippedLookup>,
) -> Vec<(String, RepositoryRecord)> {
    if !host.is_authenticated() {
        info!("GITHUB_TOKEN not set; using unauthenticated repository rate limit");
    }
    let mut records = Vec::new();
    for entry in &catalog.repositories {
        match host.lookup_repository(&entry.repo) {
            Ok(record) => {
                info!("{}: {} stars", entry.repo, record.stars_formatted);
                for name in &entry.names {
                    records.push((name.clone(), record.clone()));
                }
            }
            Err(error) => {
                warn!("{}: repository lookup failed: {error:#}", entry.repo);
                skipped.push(SkippedLookup {
                    target: entry.repo.clone(),
                    reason: format!("{error:#}"),
                });
            }
        }
    }
    records
}

pub fn run_refresh<R, H>(
    paths: &ResolvedPaths,
    catalog: &CatalogConfig,
    registry: &mut R,
    host: &mut H,
    options: &RefreshOptions,
) -> Result<RefreshReport>
where
    R: PackageRegistry,
    H: RepositoryHost,
{
    ensure_document_exists(paths)?;
    let document = fs::read_to_string(&paths.document_path)
        .with_context(|| format!("failed to read {}", paths.document_path.display()))?;

    let mut skipped_lookups = Vec::new();
    let packages = collect_package_records(catalog, registry, &mut skipped_lookups);
    let repositories = collect_repository_records(catalog, host, &mut skipped_lookups);

    let outcome = patch_document(&document, &packages, &repositories, &options.today);

    let written_bytes = if options.apply && !outcome.changes.is_empty() {
        Some(write_document(&paths.document_path, &outcome.document)?)
    } else {
        None
    };

    Ok(RefreshReport {
        changes: outcome.changes,
        skipped_lookups,
        applied: written_bytes.is_some(),
        written_bytes,
    })
}

/// Overwrite the document in full; returns the size now on disk.
pub fn write_document(path: &Path, content: &str) -> Result<u64> {
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    let metadata =
        fs::metadata(path).with_context(|| format!("failed to inspect {}", path.display()))?;
    Ok(metadata.len())
}
