use anyhow::{Result, bail};
use colored::Colorize;
use staging::{
    ApplyOptions, ApplyStatus, Ledger, Orchestrator, ResourceApi, ResourceId, Session, SessionEdit,
    SessionStore,
};

use super::load_session;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{ExecuteOptions, display_diff, execute};
use crate::ui;

// ============================================================================
// Diff
// ============================================================================

pub fn diff(_ctx: &Context, store: &dyn SessionStore, name: &str) -> Result<()> {
    let (session, ledger) = load_session(store, name)?;
    ui::header(&format!("Diff: {}", session.name));
    display_diff(&ledger, &ledger.pending());
    Ok(())
}

// ============================================================================
// Apply
// ============================================================================

pub fn apply<A: ResourceApi>(
    ctx: &Context,
    store: &dyn SessionStore,
    api: A,
    args: &ApplyArgs,
) -> Result<()> {
    ui::header(&format!("Applying Session: {}", args.session));

    if args.record && args.dry_run {
        ui::warn("--record has no effect in a dry run");
    }

    let (mut session, mut ledger) = load_session(store, &args.session)?;
    ensure_staged(&ledger, &session, args.only.iter().chain(&args.skip))?;

    let mut pending = ledger.pending();
    if !args.only.is_empty() {
        pending.retain(|id| args.only.contains(id));
    }

    let opts = ApplyOptions {
        jobs: args.jobs.unwrap_or(ctx.config.apply.jobs).max(1),
        prune_applied: ctx.config.apply.prune_applied,
    };
    let mut orchestrator = Orchestrator::new(api, opts);
    for id in &args.skip {
        orchestrator.remove_from_pending(id);
    }

    let exec_opts = ExecuteOptions {
        dry_run: args.dry_run,
        yes: args.yes,
        quiet: ctx.quiet,
    };
    let summary = execute(&mut orchestrator, &mut ledger, &pending, &exec_opts)?;

    if args.record && !summary.outcomes.is_empty() {
        record(store, &mut session, summary.outcomes.clone())?;
    }

    if summary.failed > 0 {
        bail!("{} change(s) failed to apply", summary.failed);
    }
    Ok(())
}

/// Every referenced identity must be part of the session
fn ensure_staged<'a>(
    ledger: &Ledger,
    session: &Session,
    ids: impl IntoIterator<Item = &'a ResourceId>,
) -> Result<()> {
    for id in ids {
        if !ledger.contains(id) {
            bail!("{id} is not part of session '{}'", session.name);
        }
    }
    Ok(())
}

fn record(
    store: &dyn SessionStore,
    session: &mut Session,
    outcomes: Vec<(ResourceId, staging::ApplyState)>,
) -> Result<()> {
    let name = session.name.clone();
    session.apply_edit(SessionEdit::RecordOutcomes(outcomes))?;
    store.update(&name, session)?;
    ui::dim(&format!("Recorded outcomes in session '{name}'"));
    Ok(())
}

// ============================================================================
// Retry
// ============================================================================

pub fn retry<A: ResourceApi>(
    ctx: &Context,
    store: &dyn SessionStore,
    api: A,
    name: &str,
    target: &ResourceId,
    record_outcome: bool,
) -> Result<()> {
    let (mut session, mut ledger) = load_session(store, name)?;
    ensure_staged(&ledger, &session, [target])?;

    let opts = ApplyOptions {
        jobs: 1,
        prune_applied: ctx.config.apply.prune_applied,
    };
    let mut orchestrator = Orchestrator::new(api, opts);

    println!();
    println!("  {} Applying {}...", "→".cyan(), target);
    let state = orchestrator.apply_one(&mut ledger, target)?;
    let message = state.message.clone().unwrap_or_default();

    if record_outcome {
        record(store, &mut session, vec![(target.clone(), state.clone())])?;
    }

    if state.status == ApplyStatus::Success {
        ui::success(&format!("{target} {message}"));
        Ok(())
    } else {
        ui::error(&format!("{target}: {message}"));
        bail!("retry of {target} failed");
    }
}
