//! Session storage over HTTP.
//!
//! The server files sessions under folders. Calls addressing one session
//! use the configured folder, or look the session up in the listing to
//! find its folder.

use crate::client::{Client, Config, parse};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use staging::{HpaChange, NodePoolChange, Session, SessionStore, SessionSummary};

/// [`SessionStore`] over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpSessionStore {
    client: Client,
    folder: Option<String>,
}

impl HttpSessionStore {
    #[must_use]
    pub fn new(config: &Config, folder: Option<String>) -> Self {
        Self {
            client: Client::new(config),
            folder: folder.filter(|f| !f.is_empty()),
        }
    }

    /// Create a store with a custom API base (for testing).
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>, folder: Option<String>) -> Self {
        Self {
            client: Client::with_api_base(api_base),
            folder: folder.filter(|f| !f.is_empty()),
        }
    }

    #[must_use]
    pub fn folder(&self) -> Option<&str> {
        self.folder.as_deref()
    }

    fn summaries(&self) -> Result<Vec<SessionSummary>> {
        let url = self.client.url("sessions", &[])?;
        let listing: SessionList = parse(self.client.get(&url, None)?)?;
        log::debug!("listed {} session(s)", listing.count);
        Ok(listing.sessions)
    }

    /// Folder holding `name`
    fn folder_of(&self, name: &str) -> Result<Option<String>> {
        if let Some(folder) = &self.folder {
            return Ok(Some(folder.clone()));
        }
        let summaries = self.summaries()?;
        Ok(find_folder(&summaries, name))
    }

    fn session_url(&self, name: &str) -> Result<String> {
        self.client.url("sessions", &[name])
    }
}

impl SessionStore for HttpSessionStore {
    fn list(&self) -> anyhow::Result<Vec<SessionSummary>> {
        let mut summaries = self.summaries()?;
        if let Some(folder) = &self.folder {
            summaries.retain(|s| s.folder.as_deref() == Some(folder.as_str()));
        }
        Ok(summaries)
    }

    fn get(&self, name: &str) -> anyhow::Result<Session> {
        let url = self.session_url(name)?;
        let folder = self.folder_of(name)?;
        let session: Session = parse(self.client.get(&url, folder.as_deref())?)?;
        Ok(session)
    }

    fn create(&self, session: &Session) -> anyhow::Result<()> {
        let folder = self.folder.as_deref().ok_or_else(|| Error::Remote {
            status: 400,
            code: Some("FOLDER_REQUIRED".to_string()),
            message: "a session folder must be configured to create sessions".to_string(),
        })?;
        let url = self.client.url("sessions", &[])?;
        let reply: SaveReply = parse(self.client.post(&url, &SaveRequest::new(session, folder))?)?;
        log::info!("{} ({})", reply.message, reply.session_name);
        Ok(())
    }

    fn update(&self, name: &str, session: &Session) -> anyhow::Result<()> {
        let url = self.session_url(name)?;
        let folder = self.folder_of(name)?;
        self.client.put(&url, folder.as_deref(), session)?;
        log::info!("updated session {name}");
        Ok(())
    }

    fn delete(&self, name: &str) -> anyhow::Result<()> {
        let url = self.session_url(name)?;
        let folder = self.folder_of(name)?;
        self.client.delete(&url, folder.as_deref())?;
        log::info!("deleted session {name}");
        Ok(())
    }

    fn rename(&self, name: &str, new_name: &str) -> anyhow::Result<()> {
        crate::client::segment(new_name)?;
        let url = format!("{}/rename", self.session_url(name)?);
        let folder = self.folder_of(name)?;
        self.client
            .put(&url, folder.as_deref(), &RenameRequest { new_name })?;
        log::info!("renamed session {name} to {new_name}");
        Ok(())
    }
}

fn find_folder(summaries: &[SessionSummary], name: &str) -> Option<String> {
    summaries
        .iter()
        .find(|s| s.name == name)
        .and_then(|s| s.folder.clone())
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct SessionList {
    #[serde(default)]
    sessions: Vec<SessionSummary>,
    #[serde(default)]
    count: usize,
}

#[derive(Debug, Serialize)]
struct SaveRequest<'a> {
    name: &'a str,
    folder: &'a str,
    description: &'a str,
    template: &'a str,
    changes: &'a [HpaChange],
    node_pool_changes: &'a [NodePoolChange],
}

impl<'a> SaveRequest<'a> {
    fn new(session: &'a Session, folder: &'a str) -> Self {
        Self {
            name: &session.name,
            folder,
            description: session.description.as_deref().unwrap_or_default(),
            template: &session.template_used,
            changes: &session.changes,
            node_pool_changes: &session.node_pool_changes,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SaveReply {
    #[serde(default)]
    message: String,
    #[serde(default)]
    session_name: String,
}

#[derive(Debug, Serialize)]
struct RenameRequest<'a> {
    new_name: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_list_shape() {
        let listing: SessionList = parse(json!({
            "sessions": [{
                "name": "night-downscale",
                "created_at": "2025-10-01 22:00:00",
                "created_by": "ops",
                "template_used": "node-downscale",
                "metadata": {"clusters_affected": ["aks-prd"], "namespaces_count": 0,
                             "hpa_count": 0, "node_pool_count": 2, "resource_count": 0,
                             "total_changes": 2},
                "folder": "Node-Downscale"
            }],
            "count": 1
        }))
        .unwrap();

        assert_eq!(listing.count, 1);
        let summary = &listing.sessions[0];
        assert_eq!(summary.created_at, "2025-10-01 22:00:00");
        assert_eq!(summary.metadata.as_ref().map(|m| m.total_changes), Some(2));
        assert_eq!(
            find_folder(&listing.sessions, "night-downscale").as_deref(),
            Some("Node-Downscale")
        );
        assert_eq!(find_folder(&listing.sessions, "other"), None);
    }

    #[test]
    fn test_save_request_body() {
        let session: Session = serde_json::from_value(json!({
            "name": "s1",
            "created_at": "2025-10-01T12:00:00Z",
            "template_used": "hpa-upscale",
            "changes": [{
                "cluster": "aks", "namespace": "ns", "resource_name": "api",
                "new_values": {"min_replicas": 1, "max_replicas": 4}
            }]
        }))
        .unwrap();

        let body = serde_json::to_value(SaveRequest::new(&session, "HPA-Upscale")).unwrap();
        assert_eq!(body["name"], "s1");
        assert_eq!(body["folder"], "HPA-Upscale");
        assert_eq!(body["description"], "");
        assert_eq!(body["template"], "hpa-upscale");
        assert_eq!(body["changes"][0]["resource_name"], "api");
        assert_eq!(body["node_pool_changes"], json!([]));
    }

    #[test]
    fn test_empty_folder_is_unset() {
        let store = HttpSessionStore::with_api_base("http://api", Some(String::new()));
        assert_eq!(store.folder(), None);
    }

    #[test]
    fn test_create_requires_folder() {
        let store = HttpSessionStore::with_api_base("http://127.0.0.1:9", None);
        let session: Session = serde_json::from_value(json!({
            "name": "s1", "created_at": "2025-10-01T12:00:00Z"
        }))
        .unwrap();
        let err = store.create(&session).unwrap_err();
        assert!(err.to_string().contains("folder"));
    }

    #[test]
    fn test_rename_rejects_unsafe_name() {
        let store = HttpSessionStore::with_api_base("http://127.0.0.1:9", Some("HPA-Upscale".into()));
        let err = store.rename("s1", "../etc").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidSegment(_))
        ));
    }
}
