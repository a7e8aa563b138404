//! Terminal output for the run summary, with colors and status symbols.

use crate::runner::{RecipeReport, RecipeStatus, RunReport};
use std::io::IsTerminal;

/// Check if color output is enabled.
pub fn color_enabled() -> bool {
    // Respect NO_COLOR env (https://no-color.org/)
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stderr().is_terminal()
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Colored string builder.
pub struct Styled {
    use_color: bool,
}

impl Default for Styled {
    fn default() -> Self {
        Self::new()
    }
}

impl Styled {
    pub fn new() -> Self {
        Self {
            use_color: color_enabled(),
        }
    }

    pub fn plain() -> Self {
        Self { use_color: false }
    }

    /// Green checkmark symbol.
    pub fn ok_sym(&self) -> &str {
        if self.use_color {
            "\x1b[32m\u{2713}\x1b[0m"
        } else {
            "OK"
        }
    }

    /// Red X symbol.
    pub fn fail_sym(&self) -> &str {
        if self.use_color {
            "\x1b[31m\u{2717}\x1b[0m"
        } else {
            "!!"
        }
    }

    /// Yellow warning symbol.
    pub fn warn_sym(&self) -> &str {
        if self.use_color {
            "\x1b[33m\u{26a0}\x1b[0m"
        } else {
            "??"
        }
    }

    /// Neutral symbol for skipped recipes.
    pub fn skip_sym(&self) -> &str {
        if self.use_color {
            "\x1b[2m-\x1b[0m"
        } else {
            "--"
        }
    }

    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_color {
            format!("{code}{s}{RESET}")
        } else {
            s.to_string()
        }
    }

    pub fn green(&self, s: &str) -> String {
        self.paint(GREEN, s)
    }

    pub fn red(&self, s: &str) -> String {
        self.paint(RED, s)
    }

    pub fn yellow(&self, s: &str) -> String {
        self.paint(YELLOW, s)
    }

    pub fn dim(&self, s: &str) -> String {
        self.paint(DIM, s)
    }

    pub fn bold(&self, s: &str) -> String {
        self.paint(BOLD, s)
    }

    fn status_sym(&self, status: RecipeStatus) -> &str {
        match status {
            RecipeStatus::Succeeded => self.ok_sym(),
            RecipeStatus::Failed => self.fail_sym(),
            RecipeStatus::TimedOut => self.warn_sym(),
            RecipeStatus::Skipped | RecipeStatus::Pending | RecipeStatus::Running => {
                self.skip_sym()
            }
        }
    }
}

/// Format milliseconds as "850ms", "12.4s" or "3m 05s".
pub fn format_elapsed(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let secs = ms / 1000;
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

fn recipe_line(s: &Styled, r: &RecipeReport, name_width: usize) -> String {
    let name = format!("{} / {} / {}", r.community, r.builder, r.kind);
    let mut line = format!(
        "  {} {name:<name_width$}  {:<9}  {:>4} listings  {:>3} rejected  {:>3} dup  {:>8}",
        s.status_sym(r.status),
        r.status.as_str(),
        r.emitted,
        r.rejected,
        r.duplicates,
        format_elapsed(r.elapsed_ms),
    );
    if let Some(error) = &r.error {
        line.push_str("  ");
        line.push_str(&s.dim(error));
    }
    line
}

/// Per-recipe outcome table plus a totals line.
pub fn render_summary(s: &Styled, report: &RunReport) -> String {
    let name_width = report
        .recipes
        .iter()
        .map(|r| r.community.len() + r.builder.len() + r.kind.as_str().len() + 6)
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    out.push_str(&format!(
        "  {} {}\n\n",
        s.bold("Run"),
        s.dim(&report.run_id)
    ));
    for r in &report.recipes {
        out.push_str(&recipe_line(s, r, name_width));
        out.push('\n');
    }

    let t = &report.totals;
    out.push('\n');
    out.push_str(&format!(
        "  {}: {} succeeded, {} failed, {} timed out, {} skipped; {} listings in {}\n",
        s.bold("Total"),
        s.green(&t.succeeded.to_string()),
        s.red(&t.failed.to_string()),
        s.yellow(&t.timed_out.to_string()),
        t.skipped,
        t.listings,
        format_elapsed(report.elapsed_ms().max(0) as u64),
    ));
    if let Some(reason) = report.abort_reason {
        let reason = serde_json::to_value(reason)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        out.push_str(&format!("  {} run aborted ({reason})\n", s.warn_sym()));
    }
    out
}

pub fn print_summary(s: &Styled, report: &RunReport) {
    eprint!("{}", render_summary(s, report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::Kind;
    use crate::recipe::Descriptor;
    use crate::runner::{AbortReason, Totals};
    use chrono::Utc;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(850), "850ms");
        assert_eq!(format_elapsed(12_400), "12.4s");
        assert_eq!(format_elapsed(185_000), "3m 05s");
    }

    #[test]
    fn test_plain_summary() {
        let mut ok = RecipeReport::pending(&Descriptor::new("Highland Homes", "Cambridge", Kind::Now));
        ok.status = RecipeStatus::Succeeded;
        ok.emitted = 12;
        let mut slow = RecipeReport::pending(&Descriptor::new("Toll Brothers", "Elevon", Kind::Plan));
        slow.status = RecipeStatus::TimedOut;
        slow.error = Some("timed out after 1000ms".into());
        let recipes = vec![ok, slow];
        let now = Utc::now();
        let report = RunReport {
            run_id: "run-1".into(),
            run_started: now,
            run_finished: now,
            aborted: true,
            abort_reason: Some(AbortReason::FailFast),
            totals: Totals::from_recipes(&recipes),
            recipes,
            listings: Vec::new(),
        };

        let text = render_summary(&Styled::plain(), &report);
        assert!(text.contains("OK Cambridge / Highland Homes / now"));
        assert!(text.contains("??"));
        assert!(text.contains("timed out after 1000ms"));
        assert!(text.contains("1 succeeded, 0 failed, 1 timed out, 0 skipped"));
        assert!(text.contains("run aborted (fail_fast)"));
    }
}
