use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use staging::{Edit, ResourceId, Session, SessionEdit, SessionStore, StagedResource};

use super::load_session;
use crate::Context;
use crate::cli::SessionsCommand;
use crate::engine::display_diff;
use crate::ui;

pub fn run(ctx: &Context, store: &dyn SessionStore, cmd: SessionsCommand) -> Result<()> {
    match cmd {
        SessionsCommand::List => list(ctx, store),
        SessionsCommand::Show { name } => show(ctx, store, &name),
        SessionsCommand::Delete { name, yes } => delete(ctx, store, &name, yes),
        SessionsCommand::Rename { name, new_name } => rename(ctx, store, &name, &new_name),
        SessionsCommand::Set {
            name,
            target,
            assignments,
        } => set(ctx, store, &name, &target, &assignments),
        SessionsCommand::Remove { name, target } => remove(ctx, store, &name, target),
        SessionsCommand::Describe { name, description } => {
            describe(ctx, store, &name, description)
        }
    }
}

// ============================================================================
// List
// ============================================================================

fn list(_ctx: &Context, store: &dyn SessionStore) -> Result<()> {
    ui::header("Sessions");

    let sessions = store.list()?;
    if sessions.is_empty() {
        ui::info("No saved sessions");
        return Ok(());
    }

    println!(
        "  {:<28} {:<20} {:<14} {:>7}",
        "Name".bold(),
        "Created".bold(),
        "By".bold(),
        "Changes".bold()
    );
    for summary in &sessions {
        let changes = summary
            .metadata
            .as_ref()
            .map_or_else(|| "-".to_string(), |m| m.total_changes.to_string());
        println!(
            "  {:<28} {:<20} {:<14} {:>7}",
            ui::truncate(&summary.name, 28),
            summary.created_at,
            ui::truncate(&summary.created_by, 14),
            changes
        );
        if let Some(description) = &summary.description {
            ui::dim(&format!("  {}", ui::truncate(description, 60)));
        }
    }

    println!();
    ui::kv("Total sessions", &sessions.len().to_string());
    Ok(())
}

// ============================================================================
// Show
// ============================================================================

fn show(_ctx: &Context, store: &dyn SessionStore, name: &str) -> Result<()> {
    let (session, ledger) = load_session(store, name)?;

    ui::header(&format!("Session: {}", session.name));
    ui::kv("Created", &session.summary().created_at);
    if !session.created_by.is_empty() {
        ui::kv("Created by", &session.created_by);
    }
    if !session.template_used.is_empty() {
        ui::kv("Template", &session.template_used);
    }
    if let Some(description) = &session.description {
        ui::kv("Description", description);
    }
    if let Some(metadata) = &session.metadata {
        ui::kv("Clusters", &metadata.clusters_affected.join(", "));
    }

    display_diff(&ledger, &session.ids());

    let status = status_lines(&session);
    if !status.is_empty() {
        println!();
        for line in &status {
            ui::dim(line);
        }
    }

    if session.resource_changes.is_some() {
        ui::dim("Generic resource changes are kept but not shown");
    }
    Ok(())
}

/// Applied and failed markers recorded on the session items
fn status_lines(session: &Session) -> Vec<String> {
    let mut lines = Vec::new();
    for change in &session.changes {
        if let Some(at) = change.applied_at.filter(|_| change.applied) {
            lines.push(format!(
                "✓ {} applied at {}",
                ResourceId::Hpa(change.id()),
                at.format("%Y-%m-%d %H:%M:%S")
            ));
        }
    }
    for change in &session.node_pool_changes {
        let id = ResourceId::NodePool(change.id());
        if let Some(error) = &change.error {
            lines.push(format!("✗ {id} failed: {error}"));
        } else if let Some(at) = change.applied_at.filter(|_| change.applied) {
            lines.push(format!("✓ {id} applied at {}", at.format("%Y-%m-%d %H:%M:%S")));
        }
    }
    lines
}

// ============================================================================
// Delete / Rename / Describe
// ============================================================================

fn delete(_ctx: &Context, store: &dyn SessionStore, name: &str, yes: bool) -> Result<()> {
    if !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Delete session '{name}'?"))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("  {} Aborted", "✗".red());
            return Ok(());
        }
    }

    store
        .delete(name)
        .with_context(|| format!("Could not delete session '{name}'"))?;
    ui::success(&format!("Deleted session '{name}'"));
    Ok(())
}

fn rename(_ctx: &Context, store: &dyn SessionStore, name: &str, new_name: &str) -> Result<()> {
    if name == new_name {
        ui::info("Names are identical, nothing to do");
        return Ok(());
    }

    store
        .rename(name, new_name)
        .with_context(|| format!("Could not rename session '{name}'"))?;
    ui::success(&format!("Renamed '{name}' to '{new_name}'"));
    Ok(())
}

fn describe(
    _ctx: &Context,
    store: &dyn SessionStore,
    name: &str,
    description: Option<String>,
) -> Result<()> {
    let mut session = store.get(name)?;
    let cleared = description.as_deref().is_none_or(str::is_empty);
    session.apply_edit(SessionEdit::SetDescription(description))?;
    store.update(name, &session)?;

    if cleared {
        ui::success(&format!("Cleared description of '{name}'"));
    } else {
        ui::success(&format!("Updated description of '{name}'"));
    }
    Ok(())
}

// ============================================================================
// Item edits
// ============================================================================

fn set(
    _ctx: &Context,
    store: &dyn SessionStore,
    name: &str,
    target: &ResourceId,
    assignments: &[(String, String)],
) -> Result<()> {
    let (mut session, mut ledger) = load_session(store, name)?;

    let edits = assignments
        .iter()
        .map(|(field, value)| Edit::from_assignment(target.kind(), field, value))
        .collect::<Result<Vec<_>, _>>()?;

    if !ledger
        .update(target, edits)
        .with_context(|| format!("Rejected edit to {target}"))?
    {
        bail!("{target} is not part of session '{name}'");
    }

    let edit = match ledger.get(target) {
        Some(StagedResource::Hpa(hpa)) => SessionEdit::SetHpaValues {
            id: hpa.id.clone(),
            values: hpa.current.clone(),
        },
        Some(StagedResource::NodePool(pool)) => SessionEdit::SetNodePoolValues {
            id: pool.id.clone(),
            values: pool.current,
            sequence_order: pool.sequence_order,
        },
        None => bail!("{target} is not part of session '{name}'"),
    };
    session.apply_edit(edit)?;
    store.update(name, &session)?;

    display_diff(&ledger, std::slice::from_ref(target));
    ui::success(&format!("Updated {target} in '{name}'"));
    Ok(())
}

fn remove(_ctx: &Context, store: &dyn SessionStore, name: &str, target: ResourceId) -> Result<()> {
    let mut session = store.get(name)?;
    let label = target.to_string();
    session.apply_edit(SessionEdit::RemoveItem(target))?;
    store.update(name, &session)?;
    ui::success(&format!("Removed {label} from '{name}'"));
    Ok(())
}
