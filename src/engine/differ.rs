//! Change preview rendering

use colored::Colorize;
use staging::{ChangeSet, Ledger, ResourceId, ResourceKind, StagedResource, diff};

/// Display the pending changes of `ids` in a box
pub fn display_diff(ledger: &Ledger, ids: &[ResourceId]) {
    let entries: Vec<&StagedResource> = ids.iter().filter_map(|id| ledger.get(id)).collect();

    if entries.is_empty() {
        println!();
        println!("  {} No changes pending", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Staged Changes".bold()
    );
    println!("│");

    for kind in [ResourceKind::Hpa, ResourceKind::NodePool] {
        let of_kind: Vec<&&StagedResource> = entries.iter().filter(|r| r.kind() == kind).collect();
        if of_kind.is_empty() {
            continue;
        }

        println!("│ {}", section_title(kind).bold());
        for resource in of_kind {
            let changes = diff::compute(resource);
            let mut lines = entry_lines(resource, &changes).into_iter();
            if let Some(title) = lines.next() {
                println!("│   {} {}", "~".yellow(), title);
            }
            for line in lines {
                println!("│       {}", line.dimmed());
            }
        }
        println!("│");
    }

    let hpas = entries.iter().filter(|r| r.kind() == ResourceKind::Hpa).count();
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} HPA, {} node pool)",
        entries.len().to_string().bold(),
        hpas.to_string().cyan(),
        (entries.len() - hpas).to_string().cyan()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn section_title(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Hpa => "HPAs",
        ResourceKind::NodePool => "Node pools",
    }
}

/// Uncolored preview lines: the identity, then one line per changed field
pub fn entry_lines(resource: &StagedResource, changes: &ChangeSet) -> Vec<String> {
    let mut title = resource.id().to_string();
    if let Some(order) = resource.sequence_order() {
        title.push_str(&format!(" [*{order}]"));
    }

    let mut lines = vec![title];
    if changes.is_empty() {
        lines.push("(no field changes)".to_string());
    }
    lines.extend(
        changes
            .iter()
            .map(|c| format!("{}: {} → {}", c.field.label(), c.before, c.after)),
    );
    lines
}
