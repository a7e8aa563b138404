//! The `scrape` command.

pub mod output;
pub mod progress;

use crate::acquisition::{Fetchers, HostLimiter};
use crate::builders;
use crate::config::Settings;
use crate::error::ConfigError;
use crate::listing::Kind;
use crate::pool::PoolManager;
use crate::recipe::{Recipe, Registry};
use crate::renderer::{ChromiumRenderer, Renderer};
use crate::runner::{RunOptions, RunReport, Runner};
use crate::sink::{write_listings, write_report, OutputFormat};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use output::Styled;
use progress::RunProgress;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run completed, whatever the individual recipe outcomes.
pub const EXIT_OK: u8 = 0;
/// Invalid arguments or configuration.
pub const EXIT_CONFIG: u8 = 2;
/// Nothing succeeded, or `--fail-fast` aborted the run.
pub const EXIT_FAILED: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Now,
    Plan,
    All,
}

#[derive(Debug, Parser)]
#[command(
    name = "scrape",
    version,
    about = "Collect new-home listings from builder websites"
)]
pub struct Args {
    /// Listing kind to collect.
    #[arg(long, value_enum, default_value_t = KindArg::All)]
    pub kind: KindArg,

    /// Only recipes for this community (repeatable).
    #[arg(long = "community", value_name = "NAME")]
    pub communities: Vec<String>,

    /// Only recipes for this builder (repeatable).
    #[arg(long = "builder", value_name = "NAME")]
    pub builders: Vec<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Jsonl)]
    pub format: OutputFormat,

    /// Concurrent static recipes.
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_parallel: u64,

    /// Concurrent rendered recipes.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_parallel_rendered: u64,

    /// Per-recipe timeout in seconds, covering all retries.
    #[arg(long, value_name = "SECONDS", default_value_t = 180, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Retries after a transient fetch failure.
    #[arg(long, default_value_t = 1)]
    pub retries: u32,

    /// Skip recipes that need a headless browser.
    #[arg(long)]
    pub no_rendered: bool,

    /// Write listings here instead of stdout.
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Write the run report (JSON) here.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Abort the run on the first failed or timed-out recipe.
    #[arg(long)]
    pub fail_fast: bool,

    /// Cancel whatever is still running after this many seconds.
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub run_timeout: Option<u64>,

    /// Concurrent requests per host.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..))]
    pub per_host: u64,

    /// List the selected recipes and exit.
    #[arg(long)]
    pub list: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    pub log_json: bool,

    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only warnings and errors; no summary table.
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            max_parallel: self.max_parallel as usize,
            max_parallel_rendered: self.max_parallel_rendered as usize,
            per_recipe_timeout: Duration::from_secs(self.timeout),
            retries: self.retries,
            fail_fast: self.fail_fast,
            rendered_enabled: !self.no_rendered,
            run_timeout: self.run_timeout.map(Duration::from_secs),
            ..RunOptions::default()
        }
    }

    /// Recipes matching the filters. Names that match no registered
    /// recipe are rejected rather than silently ignored.
    pub fn select(&self, registry: &Registry) -> Result<Vec<Recipe>, ConfigError> {
        for community in &self.communities {
            if registry.by_community(community).recipes().is_empty() {
                return Err(ConfigError::InvalidArgument(format!(
                    "unknown community `{community}`"
                )));
            }
        }
        for builder in &self.builders {
            if registry.by_builder(builder).recipes().is_empty() {
                return Err(ConfigError::InvalidArgument(format!(
                    "unknown builder `{builder}`"
                )));
            }
        }

        let mut selection = registry.all();
        match self.kind {
            KindArg::Now => selection = selection.kind(Kind::Now),
            KindArg::Plan => selection = selection.kind(Kind::Plan),
            KindArg::All => {}
        }
        for community in &self.communities {
            selection = selection.community(community);
        }
        for builder in &self.builders {
            selection = selection.builder(builder);
        }
        selection.require()
    }

    /// Progress bar only for an interactive, human-readable session.
    fn show_progress(&self) -> bool {
        !self.quiet && !self.verbose && !self.log_json && output::color_enabled()
    }

    fn log_filter(&self) -> &'static str {
        if self.verbose {
            "homescrape_runtime=debug,scrape=debug"
        } else if self.quiet {
            "homescrape_runtime=warn,scrape=warn"
        } else {
            "homescrape_runtime=info,scrape=info"
        }
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays data.
pub fn init_tracing(args: &Args) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_filter()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if args.log_json {
        builder.json().init();
    } else {
        builder.with_ansi(output::color_enabled()).init();
    }
}

/// Exit status for a finished run.
pub fn exit_code(report: &RunReport) -> u8 {
    if report.failed_fast() || report.nothing_succeeded() {
        EXIT_FAILED
    } else {
        EXIT_OK
    }
}

/// Execute the command. Configuration problems come back as
/// [`ConfigError`] inside the `anyhow` error.
pub async fn run(args: Args) -> Result<u8> {
    let settings = Settings::from_env()?;
    let registry = builders::registry()?;
    let recipes = args.select(&registry)?;

    if args.list {
        let mut stdout = std::io::stdout().lock();
        for recipe in &recipes {
            let d = &recipe.descriptor;
            writeln!(
                stdout,
                "{}\t{}\t{}\t{}",
                d.community,
                d.builder,
                d.kind,
                d.strategy.name()
            )?;
        }
        return Ok(EXIT_OK);
    }

    let options = args.run_options();
    let limiter = Arc::new(HostLimiter::new(args.per_host as usize, 0));
    let mut fetchers = Fetchers::new(settings.http(), limiter);

    let needs_browser = options.rendered_enabled
        && recipes.iter().any(|r| r.descriptor.strategy.is_rendered());
    let mut pool = None;
    if needs_browser {
        match launch_pool(&settings).await {
            Ok(p) => {
                fetchers = fetchers.with_pool(Arc::clone(&p));
                pool = Some(p);
            }
            Err(e) => warn!("browser unavailable, rendered recipes will be skipped: {e:#}"),
        }
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling run");
                cancel.cancel();
            }
        })
    };

    info!(recipes = recipes.len(), "starting run");
    let mut runner = Runner::new(Arc::new(fetchers), options);
    let progress = if args.show_progress() {
        let (progress, tx) = RunProgress::start(recipes.len());
        runner = runner.with_progress(tx);
        Some(progress)
    } else {
        None
    };
    let report = runner.run(recipes, cancel).await;
    drop(runner);
    if let Some(progress) = progress {
        progress.finish().await;
    }
    interrupt.abort();

    if let Some(pool) = pool {
        if let Err(e) = pool.shutdown().await {
            debug!("browser shutdown: {e:#}");
        }
    }

    match &args.out {
        Some(path) => write_listings(args.format, &report.listings, create(path)?)
            .with_context(|| format!("writing listings to {}", path.display()))?,
        None => write_listings(args.format, &report.listings, std::io::stdout().lock())
            .context("writing listings")?,
    }
    if let Some(path) = &args.report {
        write_report(create(path)?, &report)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }
    if !args.quiet {
        output::print_summary(&Styled::new(), &report);
    }

    Ok(exit_code(&report))
}

async fn launch_pool(settings: &Settings) -> Result<Arc<PoolManager>> {
    let renderer = ChromiumRenderer::launch(&settings.chromium()).await?;
    let renderer: Arc<dyn Renderer> = Arc::new(renderer);
    Ok(Arc::new(PoolManager::new(renderer, settings.browser_sessions)))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Descriptor;
    use crate::runner::{AbortReason, RecipeReport, RecipeStatus, Totals};
    use chrono::Utc;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("scrape").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.kind, KindArg::All);
        assert_eq!(args.format, OutputFormat::Jsonl);
        let options = args.run_options();
        assert_eq!(options.max_parallel, 8);
        assert_eq!(options.max_parallel_rendered, 2);
        assert_eq!(options.per_recipe_timeout, Duration::from_secs(180));
        assert_eq!(options.retries, 1);
        assert!(options.rendered_enabled);
        assert_eq!(options.run_timeout, None);
    }

    #[test]
    fn test_flags() {
        let args = parse(&[
            "--kind", "plan", "--community", "Cambridge", "--community", "Elevon",
            "--builder", "Perry Homes", "--format", "csv", "--timeout", "30",
            "--retries", "0", "--no-rendered", "--fail-fast", "--run-timeout", "600",
        ])
        .unwrap();
        assert_eq!(args.kind, KindArg::Plan);
        assert_eq!(args.communities, vec!["Cambridge", "Elevon"]);
        assert_eq!(args.format, OutputFormat::Csv);
        let options = args.run_options();
        assert_eq!(options.per_recipe_timeout, Duration::from_secs(30));
        assert_eq!(options.retries, 0);
        assert!(!options.rendered_enabled);
        assert!(options.fail_fast);
        assert_eq!(options.run_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_usage_errors() {
        assert!(parse(&["--kind", "rental"]).is_err());
        assert!(parse(&["--max-parallel", "0"]).is_err());
        assert!(parse(&["--format", "xml"]).is_err());
        assert!(parse(&["-v", "-q"]).is_err());
        let err = parse(&["--timeout", "abc"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_select() {
        let registry = builders::registry().unwrap();

        let args = parse(&["--kind", "now", "--builder", "perry homes"]).unwrap();
        let recipes = args.select(&registry).unwrap();
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].descriptor.builder, "Perry Homes");

        let args = parse(&["--community", "Atlantis"]).unwrap();
        assert!(matches!(
            args.select(&registry),
            Err(ConfigError::InvalidArgument(_))
        ));

        let args = parse(&["--community", "Elevon", "--builder", "Highland Homes"]).unwrap();
        assert_eq!(args.select(&registry).unwrap_err(), ConfigError::EmptySelection);
    }

    #[test]
    fn test_exit_code() {
        let report = |statuses: &[RecipeStatus], abort: Option<AbortReason>| {
            let recipes: Vec<_> = statuses
                .iter()
                .map(|s| {
                    let mut r = RecipeReport::pending(&Descriptor::new("B", "C", Kind::Now));
                    r.status = *s;
                    r
                })
                .collect();
            RunReport {
                run_id: "r".into(),
                run_started: Utc::now(),
                run_finished: Utc::now(),
                aborted: abort.is_some(),
                abort_reason: abort,
                totals: Totals::from_recipes(&recipes),
                recipes,
                listings: Vec::new(),
            }
        };
        assert_eq!(exit_code(&report(&[RecipeStatus::Succeeded, RecipeStatus::Failed], None)), EXIT_OK);
        assert_eq!(exit_code(&report(&[RecipeStatus::Failed, RecipeStatus::TimedOut], None)), EXIT_FAILED);
        assert_eq!(
            exit_code(&report(&[RecipeStatus::Succeeded, RecipeStatus::Failed], Some(AbortReason::FailFast))),
            EXIT_FAILED
        );
        assert_eq!(
            exit_code(&report(&[RecipeStatus::Succeeded], Some(AbortReason::Interrupted))),
            EXIT_OK
        );
    }
}
