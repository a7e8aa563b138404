//! Recipe scheduler.
//!
//! Every selected recipe runs as its own tokio task. Static and rendered
//! recipes draw from separate permit pools, so slow browser sessions never
//! starve plain HTTP recipes. A recipe's deadline covers all of its
//! attempts; when it fires, the task's future is dropped, which releases
//! the fetcher and any browser session it holds. Results are merged only
//! after each recipe finishes.

pub mod report;

pub use report::{AbortReason, RecipeReport, RecipeStatus, RunReport, Totals};

use crate::acquisition::FetcherSource;
use crate::audit::RecipeLog;
use crate::error::RecipeError;
use crate::listing::{Listing, RawRecord};
use crate::normalize::normalize;
use crate::recipe::Recipe;
use crate::stealth::behavior::jittered_backoff;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Error recorded on recipes that were pending or in flight when the run
/// was cancelled.
pub const CANCELLED: &str = "run cancelled";

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Concurrent static recipes.
    pub max_parallel: usize,
    /// Concurrent rendered recipes.
    pub max_parallel_rendered: usize,
    pub per_recipe_timeout: Duration,
    /// Retries after a transient fetch failure.
    pub retries: u32,
    /// First back-off delay; doubles per retry.
    pub backoff_base: Duration,
    /// Cancel the run on the first failed or timed-out recipe.
    pub fail_fast: bool,
    pub rendered_enabled: bool,
    /// Cancel everything still pending or running after this long.
    pub run_timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            max_parallel_rendered: 2,
            per_recipe_timeout: Duration::from_secs(180),
            retries: 1,
            backoff_base: Duration::from_secs(1),
            fail_fast: false,
            rendered_enabled: true,
            run_timeout: None,
        }
    }
}

pub struct Runner {
    source: Arc<dyn FetcherSource>,
    options: RunOptions,
    progress: Option<mpsc::UnboundedSender<RecipeReport>>,
}

impl Runner {
    pub fn new(source: Arc<dyn FetcherSource>, options: RunOptions) -> Self {
        Self {
            source,
            options,
            progress: None,
        }
    }

    /// Send each recipe's report to `tx` as soon as the recipe finishes.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<RecipeReport>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run `recipes` to completion or until `cancel` fires. Always returns
    /// a report; work finished before a cancellation is kept.
    pub async fn run(&self, recipes: Vec<Recipe>, cancel: CancellationToken) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let run_started = Utc::now();
        let run_cancel = cancel.child_token();
        info!(%run_id, recipes = recipes.len(), "run started");

        let static_pool = Arc::new(Semaphore::new(self.options.max_parallel.max(1)));
        let rendered_pool = Arc::new(Semaphore::new(self.options.max_parallel_rendered.max(1)));

        let mut pending = Vec::with_capacity(recipes.len());
        let mut outcomes: Vec<Option<Outcome>> = Vec::with_capacity(recipes.len());
        let mut tasks = JoinSet::new();

        for (index, recipe) in recipes.into_iter().enumerate() {
            let report = RecipeReport::pending(&recipe.descriptor);
            pending.push(report.clone());

            if let Some(reason) = self.skip_reason(&recipe) {
                info!(recipe = %recipe.descriptor, reason, "skipped");
                let outcome = Outcome::skipped(report, reason, None);
                self.notify(&outcome);
                outcomes.push(Some(outcome));
                continue;
            }
            outcomes.push(None);

            let pool = if recipe.descriptor.strategy.is_rendered() {
                Arc::clone(&rendered_pool)
            } else {
                Arc::clone(&static_pool)
            };
            let job = Job {
                recipe,
                source: Arc::clone(&self.source),
                options: self.options.clone(),
                cancel: run_cancel.clone(),
                pool,
                report,
            };
            tasks.spawn(async move { (index, job.run().await) });
        }

        let run_deadline = self.options.run_timeout.map(|t| Instant::now() + t);
        let mut abort_reason = None;

        loop {
            let joined = tokio::select! {
                joined = tasks.join_next() => Some(joined),
                _ = sleep_until_opt(run_deadline), if !run_cancel.is_cancelled() => None,
            };
            let Some(joined) = joined else {
                warn!("run timeout reached, cancelling remaining recipes");
                abort_reason.get_or_insert(AbortReason::RunTimeout);
                run_cancel.cancel();
                continue;
            };
            let Some(joined) = joined else { break };

            let (index, outcome) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    // Panics are caught per attempt; this is a last resort.
                    warn!("recipe task aborted: {e}");
                    continue;
                }
            };

            let status = outcome.report.status;
            if self.options.fail_fast
                && matches!(status, RecipeStatus::Failed | RecipeStatus::TimedOut)
                && !run_cancel.is_cancelled()
            {
                warn!(
                    builder = %outcome.report.builder,
                    community = %outcome.report.community,
                    "fail-fast: cancelling remaining recipes"
                );
                abort_reason.get_or_insert(AbortReason::FailFast);
                run_cancel.cancel();
            }
            self.notify(&outcome);
            outcomes[index] = Some(outcome);
        }

        if abort_reason.is_none() && cancel.is_cancelled() {
            abort_reason = Some(AbortReason::Interrupted);
        }

        let cancelled = run_cancel.is_cancelled();
        let mut recipe_reports = Vec::with_capacity(outcomes.len());
        let mut listings = Vec::new();
        for (outcome, fallback) in outcomes.into_iter().zip(pending) {
            let outcome = outcome.unwrap_or_else(|| {
                if cancelled {
                    Outcome::skipped(fallback, CANCELLED, Some("cancelled"))
                } else {
                    Outcome::failed(fallback, "recipe task aborted".to_string(), "panic")
                }
            });
            listings.extend(outcome.listings);
            recipe_reports.push(outcome.report);
        }

        let (listings, cross_recipe_duplicates) = merge(listings);
        let mut totals = Totals::from_recipes(&recipe_reports);
        totals.listings = listings.len();
        totals.cross_recipe_duplicates = cross_recipe_duplicates;

        info!(
            %run_id,
            succeeded = totals.succeeded,
            failed = totals.failed,
            timed_out = totals.timed_out,
            skipped = totals.skipped,
            listings = totals.listings,
            "run finished"
        );

        RunReport {
            run_id,
            run_started,
            run_finished: Utc::now(),
            aborted: abort_reason.is_some(),
            abort_reason,
            recipes: recipe_reports,
            totals,
            listings,
        }
    }

    fn notify(&self, outcome: &Outcome) {
        if let Some(tx) = &self.progress {
            // The receiver going away only silences progress.
            let _ = tx.send(outcome.report.clone());
        }
    }

    fn skip_reason(&self, recipe: &Recipe) -> Option<&'static str> {
        if !recipe.descriptor.strategy.is_rendered() {
            None
        } else if !self.options.rendered_enabled {
            Some("rendered recipes disabled")
        } else if !self.source.supports_rendered() {
            Some("no browser available")
        } else {
            None
        }
    }
}

/// Sort by (community, kind, builder, plan_name, address) and drop later
/// listings whose identity another recipe already emitted. Returns the
/// merged table and the number of listings dropped.
pub fn merge(mut listings: Vec<Listing>) -> (Vec<Listing>, usize) {
    listings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    let before = listings.len();
    let mut seen = HashSet::new();
    listings.retain(|l| seen.insert(l.identity_key()));
    let dropped = before - listings.len();
    (listings, dropped)
}

struct Outcome {
    report: RecipeReport,
    listings: Vec<Listing>,
}

impl Outcome {
    fn skipped(mut report: RecipeReport, reason: &str, category: Option<&str>) -> Self {
        report.status = RecipeStatus::Skipped;
        report.error = Some(reason.to_string());
        report.error_category = category.map(str::to_string);
        Self {
            report,
            listings: Vec::new(),
        }
    }

    fn failed(mut report: RecipeReport, error: String, category: &str) -> Self {
        report.status = RecipeStatus::Failed;
        report.error = Some(error);
        report.error_category = Some(category.to_string());
        Self {
            report,
            listings: Vec::new(),
        }
    }
}

enum Ending {
    Collected(Vec<RawRecord>),
    Failed(RecipeError),
    Panicked(String),
    TimedOut,
    Cancelled,
}

struct Job {
    recipe: Recipe,
    source: Arc<dyn FetcherSource>,
    options: RunOptions,
    cancel: CancellationToken,
    pool: Arc<Semaphore>,
    report: RecipeReport,
}

impl Job {
    async fn run(self) -> Outcome {
        let Job {
            recipe,
            source,
            options,
            cancel,
            pool,
            mut report,
        } = self;

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = pool.acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            return Outcome::skipped(report, CANCELLED, Some("cancelled"));
        };

        let descriptor = &recipe.descriptor;
        let log = descriptor.log();
        let timeout = descriptor.timeout.unwrap_or(options.per_recipe_timeout);
        let retries = descriptor.retries.unwrap_or(options.retries);
        let started = Instant::now();
        let deadline = started + timeout;

        report.status = RecipeStatus::Running;
        log.debug(format!("running ({} strategy)", descriptor.strategy.name()));

        let ending = loop {
            report.attempts += 1;
            let attempt =
                AssertUnwindSafe(run_attempt(&recipe, source.as_ref(), &log)).catch_unwind();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = tokio::time::timeout_at(deadline, attempt) => Some(result),
            };
            let Some(result) = result else {
                break Ending::Cancelled;
            };

            let error = match result {
                Err(_) => break Ending::TimedOut,
                Ok(Err(panic)) => break Ending::Panicked(panic_message(panic.as_ref())),
                Ok(Ok(Ok(records))) => break Ending::Collected(records),
                Ok(Ok(Err(error))) => error,
            };

            if report.attempts > retries || !error.is_transient(&descriptor.retry_on_status) {
                break Ending::Failed(error);
            }
            let delay = jittered_backoff(report.attempts, options.backoff_base, timeout);
            let wake = Instant::now() + delay;
            if wake >= deadline {
                log.warn(format!("no time left to retry after: {error}"));
                break Ending::Failed(error);
            }
            log.warn(format!(
                "attempt {} failed, retrying in {}ms: {error}",
                report.attempts,
                delay.as_millis()
            ));

            let slept = tokio::select! {
                _ = tokio::time::sleep_until(wake) => true,
                _ = cancel.cancelled() => false,
            };
            if !slept {
                break Ending::Cancelled;
            }
        };

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        let mut listings = Vec::new();

        match ending {
            Ending::Collected(records) => {
                let output = normalize(descriptor, records);
                report.apply_tally(&output.tally);
                report.status = RecipeStatus::Succeeded;
                log.info(format!(
                    "{} listings from {} records ({} rejected, {} duplicates)",
                    output.tally.emitted,
                    output.tally.raw,
                    output.tally.rejected,
                    output.tally.duplicates
                ));
                listings = output.listings;
            }
            Ending::Failed(error) => {
                log.error(error.to_string());
                report.status = RecipeStatus::Failed;
                report.error = Some(error.to_string());
                report.error_category = Some(error.category().to_string());
            }
            Ending::Panicked(message) => {
                let message = format!("recipe panicked: {message}");
                log.error(message.clone());
                report.status = RecipeStatus::Failed;
                report.error = Some(message);
                report.error_category = Some("panic".to_string());
            }
            Ending::TimedOut => {
                let message = format!("timed out after {}ms", timeout.as_millis());
                log.error(message.clone());
                report.status = RecipeStatus::TimedOut;
                report.error = Some(message);
                report.error_category = Some("timed_out".to_string());
            }
            Ending::Cancelled => {
                log.warn(CANCELLED);
                report.status = RecipeStatus::Skipped;
                report.error = Some(CANCELLED.to_string());
                report.error_category = Some("cancelled".to_string());
            }
        }

        report.log = log.entries();
        Outcome { report, listings }
    }
}

/// One attempt: lease a fetcher, collect, give the fetcher back.
async fn run_attempt(
    recipe: &Recipe,
    source: &dyn FetcherSource,
    log: &RecipeLog,
) -> Result<Vec<RawRecord>, RecipeError> {
    let fetcher = source.acquire(&recipe.descriptor).await?;
    let result = recipe.collect(fetcher.as_ref(), log).await;
    fetcher.release().await;
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{build_listing, Kind};

    fn listing(builder: &str, community: &str, kind: Kind, plan: &str, address: Option<&str>) -> Listing {
        let mut raw = RawRecord::new()
            .with("builder", builder)
            .with("community", community)
            .with("kind", kind.as_str())
            .with("plan_name", plan);
        if let Some(a) = address {
            raw.set("address", a);
        }
        build_listing(&raw).unwrap()
    }

    #[test]
    fn test_merge_sorts_and_dedups() {
        let listings = vec![
            listing("Perry Homes", "Elevon", Kind::Plan, "2450W", None),
            listing("Highland Homes", "Cambridge", Kind::Plan, "Ash", None),
            listing("Highland Homes", "Cambridge", Kind::Now, "Ash", Some("2 B St")),
            listing("Highland Homes", "Cambridge", Kind::Now, "Ash", Some("1 A St")),
            listing("Perry Homes", "Elevon", Kind::Plan, "2450W", None),
        ];
        let (merged, dropped) = merge(listings);
        assert_eq!(dropped, 1);
        let keys: Vec<_> = merged
            .iter()
            .map(|l| (l.community.as_str(), l.kind, l.address.as_deref()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Cambridge", Kind::Now, Some("1 A St")),
                ("Cambridge", Kind::Now, Some("2 B St")),
                ("Cambridge", Kind::Plan, None),
                ("Elevon", Kind::Plan, None),
            ]
        );
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }

    #[test]
    fn test_default_options() {
        let options = RunOptions::default();
        assert_eq!(options.max_parallel, 8);
        assert_eq!(options.max_parallel_rendered, 2);
        assert_eq!(options.per_recipe_timeout, Duration::from_secs(180));
        assert_eq!(options.retries, 1);
        assert!(!options.fail_fast);
    }
}
