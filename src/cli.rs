use clap::{Parser, Subcommand};
use clap_complete::Shell;
use staging::ResourceId;

#[derive(Parser)]
#[command(name = "kstage")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Stage, review and apply HPA and node-pool changes", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Scaling API base URL (overrides the config file)
    #[arg(long, env = "KSTAGE_API_URL", global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage saved sessions
    #[command(subcommand)]
    Sessions(SessionsCommand),

    /// Preview the changes held in a session
    Diff {
        /// Session name
        session: String,
    },

    /// Apply the changes held in a session
    Apply(ApplyArgs),

    /// Re-apply one item of a session through the single-item call
    Retry {
        /// Session name
        session: String,

        /// Item to apply (hpa:<cluster>/<namespace>/<name> or nodepool:<cluster>/<name>)
        target: ResourceId,

        /// Write the outcome back into the session
        #[arg(long)]
        record: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Sessions Commands
// ============================================================================

#[derive(Subcommand)]
pub enum SessionsCommand {
    /// List saved sessions
    List,

    /// Show a session and its changes
    Show {
        /// Session name
        name: String,
    },

    /// Delete a session
    Delete {
        /// Session name
        name: String,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Rename a session
    Rename {
        /// Current name
        name: String,

        /// New name
        new_name: String,
    },

    /// Edit values of one item in a session
    Set {
        /// Session name
        name: String,

        /// Item to edit (hpa:<cluster>/<namespace>/<name> or nodepool:<cluster>/<name>)
        target: ResourceId,

        /// Assignments such as max_replicas=8 or autoscaling_enabled=false
        #[arg(required = true, value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,
    },

    /// Remove one item from a session
    Remove {
        /// Session name
        name: String,

        /// Item to remove
        target: ResourceId,
    },

    /// Set or clear the description of a session
    Describe {
        /// Session name
        name: String,

        /// New description; omit to clear
        description: Option<String>,
    },
}

// ============================================================================
// Apply
// ============================================================================

#[derive(Parser)]
pub struct ApplyArgs {
    /// Session name
    pub session: String,

    /// Only apply these items (repeatable)
    #[arg(long, value_name = "TARGET")]
    pub only: Vec<ResourceId>,

    /// Leave these items out (repeatable)
    #[arg(long, value_name = "TARGET")]
    pub skip: Vec<ResourceId>,

    /// Dry run - show what would be done
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Number of parallel jobs for independent items
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Write outcomes back into the session
    #[arg(long)]
    pub record: bool,
}

/// Parse `field=value`; the value may be empty
fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (field, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got '{s}'"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in '{s}'"));
    }
    Ok((field.to_string(), value.trim().to_string()))
}
