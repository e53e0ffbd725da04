// Session management
pub mod sessions;

// Diff, apply and retry
pub mod apply;

use anyhow::{Context as AnyhowContext, Result};
use staging::{Ledger, Session, SessionStore};

/// Fetch a session and load its items into a fresh ledger
pub fn load_session(store: &dyn SessionStore, name: &str) -> Result<(Session, Ledger)> {
    let session = store
        .get(name)
        .with_context(|| format!("Could not load session '{name}'"))?;
    let loaded = staging::from_session(&session)
        .with_context(|| format!("Session '{name}' is malformed"))?;

    let mut ledger = Ledger::new();
    ledger.load(&loaded);
    log::debug!("loaded {} item(s) from session '{name}'", ledger.len());
    Ok((session, ledger))
}
