//! Execution engine - terminal front end for the apply orchestrator

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use staging::{
    ApplyState, ApplyStatus, ApplySummary, ConfirmCallback, Ledger, Orchestrator,
    ProgressCallback, ResourceApi, ResourceId,
};

use super::differ::display_diff;

/// Options for one apply run
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Hide progress bars
    pub quiet: bool,
}

/// Progress bars per batch
pub struct BarProgress {
    bar: Option<ProgressBar>,
    hidden: bool,
}

impl BarProgress {
    pub fn new(hidden: bool) -> Self {
        Self { bar: None, hidden }
    }
}

impl ProgressCallback for BarProgress {
    fn on_batch_start(&mut self, label: &str, count: usize) {
        if self.hidden {
            self.bar = Some(ProgressBar::hidden());
            return;
        }

        println!();
        println!("  {} Applying {} {}...", "→".cyan(), count, label);

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("=>-"));
        let bar = ProgressBar::new(count as u64);
        bar.set_style(style);
        self.bar = Some(bar);
    }

    fn on_resource_start(&mut self, id: &ResourceId) {
        if let Some(bar) = &self.bar {
            bar.set_message(id.to_string());
        }
    }

    fn on_resource_complete(&mut self, id: &ResourceId, state: &ApplyState) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{} {}", status_symbol(state.status), id));
            bar.inc(1);
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

fn status_symbol(status: ApplyStatus) -> &'static str {
    match status {
        ApplyStatus::Success => "✓",
        ApplyStatus::Error => "✗",
        ApplyStatus::Idle => "⊘",
        ApplyStatus::Applying => "…",
    }
}

/// Confirmation through a dialoguer prompt
pub struct DialoguerConfirm {
    assume_yes: bool,
    declined: bool,
}

impl DialoguerConfirm {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            declined: false,
        }
    }

    /// Whether the last prompt was answered with no
    pub fn declined(&self) -> bool {
        self.declined
    }
}

impl ConfirmCallback for DialoguerConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }

        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;
        self.declined = !confirmed;
        Ok(confirmed)
    }
}

/// Preview, confirm and apply `pending`
pub fn execute<A: ResourceApi>(
    orchestrator: &mut Orchestrator<A>,
    ledger: &mut Ledger,
    pending: &[ResourceId],
    opts: &ExecuteOptions,
) -> Result<ApplySummary> {
    let active: Vec<ResourceId> = pending
        .iter()
        .filter(|id| ledger.contains(id) && !orchestrator.is_dropped(id))
        .cloned()
        .collect();

    display_diff(ledger, &active);

    if active.is_empty() {
        return Ok(ApplySummary::default());
    }

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(ApplySummary::default());
    }

    let mut progress = BarProgress::new(opts.quiet);
    let mut confirm = DialoguerConfirm::new(opts.yes);
    let summary = orchestrator.execute(ledger, &active, &mut progress, &mut confirm)?;

    if confirm.declined() {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(summary);
    }

    print_summary(&summary);
    Ok(summary)
}

/// Print final summary
pub fn print_summary(summary: &ApplySummary) {
    println!();
    if summary.is_success() {
        println!("  {} Changes applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Changes applied with errors", "⚠".yellow().bold());
    }

    if summary.succeeded > 0 {
        println!("    • {} applied", summary.succeeded);
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }

    for line in failure_lines(summary) {
        println!("      {} {}", "✗".red(), line);
    }
}

/// One line per failed identity with its message
pub fn failure_lines(summary: &ApplySummary) -> Vec<String> {
    summary
        .outcomes
        .iter()
        .filter(|(_, state)| state.status == ApplyStatus::Error)
        .map(|(id, state)| match &state.message {
            Some(message) => format!("{id}: {message}"),
            None => id.to_string(),
        })
        .collect()
}
