//! Live recipe-completion bar shown on stderr during a run.

use crate::runner::{RecipeReport, RecipeStatus};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TEMPLATE: &str = "  {spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} recipes  {msg}";

fn style() -> ProgressStyle {
    ProgressStyle::with_template(TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
        .tick_chars("\u{25b8}\u{25b9}\u{25b8}\u{25b9}\u{25b8}")
}

/// One-line message for the recipe that just finished.
pub fn finished_message(report: &RecipeReport) -> String {
    let name = format!("{} / {} / {}", report.community, report.builder, report.kind);
    match report.status {
        RecipeStatus::Succeeded => format!("{name}: {} listings", report.emitted),
        status => format!("{name}: {}", status.as_str()),
    }
}

/// Progress display fed by the runner's report channel.
pub struct RunProgress {
    bar: ProgressBar,
    task: JoinHandle<()>,
}

impl RunProgress {
    /// Start a bar over `total` recipes. Returns the sender to hand to
    /// [`Runner::with_progress`](crate::runner::Runner::with_progress).
    pub fn start(total: usize) -> (Self, mpsc::UnboundedSender<RecipeReport>) {
        Self::with_target(total, ProgressDrawTarget::stderr())
    }

    fn with_target(
        total: usize,
        target: ProgressDrawTarget,
    ) -> (Self, mpsc::UnboundedSender<RecipeReport>) {
        let bar = ProgressBar::with_draw_target(Some(total as u64), target);
        bar.set_style(style());
        bar.enable_steady_tick(Duration::from_millis(120));

        let (tx, mut rx) = mpsc::unbounded_channel::<RecipeReport>();
        let task = {
            let bar = bar.clone();
            tokio::spawn(async move {
                while let Some(report) = rx.recv().await {
                    bar.set_message(finished_message(&report));
                    bar.inc(1);
                }
            })
        };

        (Self { bar, task }, tx)
    }

    /// Drain outstanding updates and remove the bar from the terminal.
    pub async fn finish(self) {
        // The sender is dropped with the runner, which ends the task.
        let _ = self.task.await;
        self.bar.finish_and_clear();
    }
}
