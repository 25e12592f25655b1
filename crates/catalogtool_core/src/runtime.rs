use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::{CatalogConfig, load_config};

pub const DEFAULT_CONFIG_FILENAME: &str = "catalog.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Embedded,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Embedded => "embedded",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    /// `None` when the embedded default catalog is in use.
    pub config_path: Option<PathBuf>,
    pub document_path: PathBuf,
    pub config_source: ValueSource,
    pub document_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "config_path={} ({})\ndocument_path={} ({})",
            self.config_path
                .as_deref()
                .map(normalize_for_display)
                .unwrap_or_else(|| "<embedded>".to_string()),
            self.config_source.as_str(),
            normalize_for_display(&self.document_path),
            self.document_source.as_str(),
        )
    }
}

/// Locate the catalog, load it, then locate the document it describes.
pub fn resolve_runtime(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<(ResolvedPaths, CatalogConfig)> {
    resolve_runtime_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_runtime_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<(ResolvedPaths, CatalogConfig)>
where
    F: Fn(&str) -> Option<String>,
{
    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (Some(absolutize(path, &context.cwd)), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env("CATALOG_CONFIG")) {
        (
            Some(absolutize(Path::new(&value), &context.cwd)),
            ValueSource::Env,
        )
    } else {
        let candidate = context.cwd.join(DEFAULT_CONFIG_FILENAME);
        if candidate.exists() {
            (Some(candidate), ValueSource::Default)
        } else {
            (None, ValueSource::Embedded)
        }
    };

    let catalog = match config_path.as_deref() {
        Some(path) => load_config(path)?,
        None => {
            let catalog = CatalogConfig::embedded()?;
            catalog.validate()?;
            catalog
        }
    };

    let (document_path, document_source) =
        if let Some(value) = non_empty(lookup_env("CATALOG_DOCUMENT")) {
            (absolutize(Path::new(&value), &context.cwd), ValueSource::Env)
        } else if let Some(document) = catalog.directory.document.as_deref() {
            let base = config_path
                .as_deref()
                .and_then(Path::parent)
                .unwrap_or(context.cwd.as_path());
            (absolutize(Path::new(document), base), ValueSource::Config)
        } else {
            (
                context.cwd.join(catalog.document()),
                ValueSource::Default,
            )
        };

    Ok((
        ResolvedPaths {
            config_path,
            document_path,
            config_source,
            document_source,
        },
        catalog,
    ))
}

/// The document is the only input that cannot be degraded around.
pub fn ensure_document_exists(paths: &ResolvedPaths) -> Result<()> {
    if !paths.document_path.is_file() {
        bail!(
            "directory document not found: {} (source: {})",
            normalize_for_display(&paths.document_path),
            paths.document_source.as_str()
        );
    }
    Ok(())
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
