//! Run report: per-recipe outcomes, totals and the merged listing table.

use crate::audit::LogEntry;
use crate::listing::{Kind, Listing};
use crate::normalize::Tally;
use crate::recipe::Descriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Skipped,
}

impl RecipeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipeStatus::Pending => "pending",
            RecipeStatus::Running => "running",
            RecipeStatus::Succeeded => "succeeded",
            RecipeStatus::Failed => "failed",
            RecipeStatus::TimedOut => "timed_out",
            RecipeStatus::Skipped => "skipped",
        }
    }

    /// The recipe actually executed (as opposed to being skipped).
    pub fn ran(&self) -> bool {
        matches!(
            self,
            RecipeStatus::Succeeded | RecipeStatus::Failed | RecipeStatus::TimedOut
        )
    }
}

/// Why a run stopped before every recipe finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    Interrupted,
    RunTimeout,
    FailFast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeReport {
    pub builder: String,
    pub community: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_community: Option<String>,
    pub kind: Kind,
    pub strategy: String,
    pub status: RecipeStatus,
    /// Executions of `collect`, including retries.
    pub attempts: u32,
    /// Raw records produced by the successful attempt.
    pub attempted: usize,
    pub emitted: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rejections: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<LogEntry>,
}

impl RecipeReport {
    pub fn pending(descriptor: &Descriptor) -> Self {
        Self {
            builder: descriptor.builder.clone(),
            community: descriptor.community.clone(),
            sub_community: descriptor.sub_community.clone(),
            kind: descriptor.kind,
            strategy: descriptor.strategy.name().to_string(),
            status: RecipeStatus::Pending,
            attempts: 0,
            attempted: 0,
            emitted: 0,
            rejected: 0,
            duplicates: 0,
            elapsed_ms: 0,
            error: None,
            error_category: None,
            rejections: BTreeMap::new(),
            log: Vec::new(),
        }
    }

    pub(crate) fn apply_tally(&mut self, tally: &Tally) {
        self.attempted = tally.raw;
        self.emitted = tally.emitted;
        self.rejected = tally.rejected;
        self.duplicates = tally.duplicates;
        self.rejections = tally.rejections.clone();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub recipes: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
    /// Rows in the merged table.
    pub listings: usize,
    pub rejected: usize,
    pub duplicates: usize,
    /// Listings dropped during the merge because another recipe emitted
    /// the same identity.
    pub cross_recipe_duplicates: usize,
    /// Error category → recipes that ended with it.
    pub errors: BTreeMap<String, usize>,
}

impl Totals {
    pub fn from_recipes(recipes: &[RecipeReport]) -> Self {
        let mut totals = Totals {
            recipes: recipes.len(),
            ..Totals::default()
        };
        for r in recipes {
            match r.status {
                RecipeStatus::Succeeded => totals.succeeded += 1,
                RecipeStatus::Failed => totals.failed += 1,
                RecipeStatus::TimedOut => totals.timed_out += 1,
                RecipeStatus::Skipped | RecipeStatus::Pending | RecipeStatus::Running => {
                    totals.skipped += 1
                }
            }
            totals.rejected += r.rejected;
            totals.duplicates += r.duplicates;
            if let Some(category) = &r.error_category {
                *totals.errors.entry(category.clone()).or_default() += 1;
            }
        }
        totals
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub run_started: DateTime<Utc>,
    pub run_finished: DateTime<Utc>,
    pub aborted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,
    pub recipes: Vec<RecipeReport>,
    pub totals: Totals,
    /// Merged table, written by the sinks rather than with the report.
    #[serde(skip)]
    pub listings: Vec<Listing>,
}

impl RunReport {
    /// At least one recipe ran and none of them succeeded.
    pub fn nothing_succeeded(&self) -> bool {
        let ran = self.recipes.iter().filter(|r| r.status.ran()).count();
        ran > 0 && self.totals.succeeded == 0
    }

    pub fn failed_fast(&self) -> bool {
        self.abort_reason == Some(AbortReason::FailFast)
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.run_finished - self.run_started).num_milliseconds()
    }
}
