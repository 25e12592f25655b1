use std::path::PathBuf;

use anyhow::Result;
use catalogtool_core::config::github_token;
use catalogtool_core::fetch::HttpFetcher;
use catalogtool_core::normalize::today;
use catalogtool_core::refresh::{RefreshOptions, RefreshReport, run_refresh};
use catalogtool_core::registry::{GitHubClient, NpmRegistryClient};
use catalogtool_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, normalize_for_display, resolve_runtime,
};
use clap::Parser;
use log::debug;

#[derive(Debug, Parser)]
#[command(
    name = "catalogtool",
    version,
    about = "Refresh connector versions, stars, download tiers and dates in the directory page"
)]
struct Cli {
    #[arg(long, help = "Write the updated document (default is preview only)")]
    apply: bool,
    #[arg(long, value_name = "PATH", help = "Catalog TOML (default: ./catalog.toml or built-in)")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logger(env_logger::Env::default()).init();

    run(cli)
}

/// `info` unless `RUST_LOG` (or the given env) says otherwise.
fn logger(env: env_logger::Env<'_>) -> env_logger::Builder {
    env_logger::Builder::from_env(env.default_filter_or("info"))
}

fn run(cli: Cli) -> Result<()> {
    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        config: cli.config.clone(),
    };
    let (paths, catalog) = resolve_runtime(&context, &overrides)?;
    debug!("[diagnostics]\n{}", paths.diagnostics());

    let fetcher = HttpFetcher::new(&catalog.user_agent(), catalog.timeout_ms())?;
    let mut registry = NpmRegistryClient::from_config(fetcher.clone(), &catalog);
    let mut host = GitHubClient::from_config(fetcher, &catalog, github_token());

    let report = run_refresh(
        &paths,
        &catalog,
        &mut registry,
        &mut host,
        &RefreshOptions {
            apply: cli.apply,
            today: today(),
        },
    )?;

    print_report(&paths, &report, cli.apply);
    Ok(())
}

fn print_report(paths: &ResolvedPaths, report: &RefreshReport, apply: bool) {
    if !report.skipped_lookups.is_empty() {
        println!("skipped lookups: {}", report.skipped_lookups.len());
        for skipped in &report.skipped_lookups {
            println!("  - {}: {}", skipped.target, skipped.reason);
        }
    }

    if report.is_up_to_date() {
        println!("Directory is up to date");
        return;
    }

    println!("{} change(s):", report.changes.len());
    for change in &report.changes {
        println!("  {change}");
    }

    match report.written_bytes {
        Some(bytes) => println!(
            "Wrote {} ({bytes} bytes)",
            normalize_for_display(&paths.document_path)
        ),
        None if !apply => println!("Preview only; re-run with --apply to write changes"),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use log::LevelFilter;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from(["catalogtool", "--apply", "--config", "site.toml"])
            .expect("parse");
        assert!(cli.apply);
        assert_eq!(cli.config, Some(PathBuf::from("site.toml")));
    }

    #[test]
    fn logger_defaults_to_info_without_filter_env() {
        let env = env_logger::Env::new().filter("CATALOGTOOL_TEST_LOG_UNSET");
        assert_eq!(logger(env).build().filter(), LevelFilter::Info);
    }
}
