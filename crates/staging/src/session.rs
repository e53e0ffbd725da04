//! Session codec
//!
//! A session is the persisted form of a pending change set. Exporting keeps
//! only modified ledger entries; loading rebuilds ledger entries that are
//! pending by definition, and fails as a whole on any malformed item.

use crate::ledger::Ledger;
use crate::types::{
    ApplyState, ApplyStatus, HpaId, HpaValues, NodePoolId, NodePoolValues, ResourceId,
    StagedHpa, StagedNodePool, StagedResource, normalize_order,
};
use crate::validate::{ValidationError, validate_hpa, validate_hpa_change, validate_node_pool};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Errors decoding, loading or editing a session
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid session JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{section}[{index}]: missing {field}")]
    MissingField {
        section: &'static str,
        index: usize,
        field: &'static str,
    },

    #[error("{0} appears more than once")]
    Duplicate(ResourceId),

    #[error("{id}: {source}")]
    Invalid {
        id: ResourceId,
        #[source]
        source: ValidationError,
    },

    #[error("{0} is not part of the session")]
    NotFound(ResourceId),
}

// ============================================================================
// Persisted shape
// ============================================================================

/// Aggregate counts stored alongside a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub clusters_affected: Vec<String>,
    #[serde(default)]
    pub namespaces_count: usize,
    #[serde(default)]
    pub hpa_count: usize,
    #[serde(default)]
    pub node_pool_count: usize,
    #[serde(default)]
    pub resource_count: usize,
    #[serde(default)]
    pub total_changes: usize,
}

/// A staged HPA change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpaChange {
    pub cluster: String,
    pub namespace: String,
    #[serde(alias = "hpa_name")]
    pub resource_name: String,
    #[serde(default)]
    pub original_values: Option<HpaValues>,
    #[serde(default)]
    pub new_values: Option<HpaValues>,
    #[serde(default)]
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rollout_triggered: bool,
    #[serde(default)]
    pub daemonset_rollout_triggered: bool,
    #[serde(default)]
    pub statefulset_rollout_triggered: bool,
}

impl HpaChange {
    pub fn id(&self) -> HpaId {
        HpaId::new(&self.cluster, &self.namespace, &self.resource_name)
    }
}

/// Progress of a node pool inside its sequence group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    #[default]
    #[serde(rename = "")]
    Unmarked,
    Pending,
    Executing,
    Completed,
    Failed,
}

impl SequenceStatus {
    fn of(state: Option<&ApplyState>) -> Self {
        match state.map(|s| s.status) {
            None | Some(ApplyStatus::Idle) => Self::Pending,
            Some(ApplyStatus::Applying) => Self::Executing,
            Some(ApplyStatus::Success) => Self::Completed,
            Some(ApplyStatus::Error) => Self::Failed,
        }
    }
}

/// A staged node pool change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolChange {
    pub cluster: String,
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub subscription: String,
    #[serde(alias = "node_pool_name")]
    pub pool_name: String,
    pub original_values: NodePoolValues,
    pub new_values: NodePoolValues,
    #[serde(default)]
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Sequence group; 0 means ungrouped
    #[serde(default)]
    pub sequence_order: u32,
    #[serde(default)]
    pub sequence_status: SequenceStatus,
}

impl NodePoolChange {
    pub fn id(&self) -> NodePoolId {
        NodePoolId::new(&self.cluster, &self.pool_name)
    }
}

/// A persisted pending change set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub template_used: String,
    #[serde(default)]
    pub metadata: Option<SessionMetadata>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub changes: Vec<HpaChange>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub node_pool_changes: Vec<NodePoolChange>,
    /// Generic resource changes, carried through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_changes: Option<serde_json::Value>,
    /// Rollback bookkeeping, carried through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_data: Option<serde_json::Value>,
}

/// Listing entry returned by a session store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub name: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub template_used: String,
    #[serde(default)]
    pub metadata: Option<SessionMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

/// Descriptive fields of a session, independent of its changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub name: String,
    pub created_by: String,
    pub description: Option<String>,
    pub template_used: String,
    /// `None` stamps the export time
    pub created_at: Option<DateTime<Utc>>,
}

impl SessionInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Result of loading a session: its description plus ledger entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSession {
    pub info: SessionInfo,
    pub entries: Vec<StagedResource>,
}

/// An explicit edit to a persisted session
#[derive(Debug, Clone)]
pub enum SessionEdit {
    SetDescription(Option<String>),
    SetHpaValues {
        id: HpaId,
        values: HpaValues,
    },
    SetNodePoolValues {
        id: NodePoolId,
        values: NodePoolValues,
        sequence_order: Option<u32>,
    },
    RemoveItem(ResourceId),
    /// Write apply outcomes back into the matching items
    RecordOutcomes(Vec<(ResourceId, ApplyState)>),
}

// ============================================================================
// Codec
// ============================================================================

impl Session {
    /// Parse a session from JSON
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the whole session
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            name: self.name.clone(),
            created_by: self.created_by.clone(),
            description: self.description.clone(),
            template_used: self.template_used.clone(),
            created_at: Some(self.created_at),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            name: self.name.clone(),
            created_at: self.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            created_by: self.created_by.clone(),
            description: self.description.clone(),
            template_used: self.template_used.clone(),
            metadata: self.metadata.clone(),
            folder: None,
        }
    }

    /// Identities of every item, HPAs first
    pub fn ids(&self) -> Vec<ResourceId> {
        self.changes
            .iter()
            .map(|c| ResourceId::Hpa(c.id()))
            .chain(self.node_pool_changes.iter().map(|c| ResourceId::NodePool(c.id())))
            .collect()
    }

    /// Mutate specific fields, then refresh the metadata
    pub fn apply_edit(&mut self, edit: SessionEdit) -> Result<(), CodecError> {
        match edit {
            SessionEdit::SetDescription(description) => {
                self.description = description.filter(|d| !d.is_empty());
            }
            SessionEdit::SetHpaValues { id, values } => {
                let change = self
                    .changes
                    .iter_mut()
                    .find(|c| c.id() == id)
                    .ok_or_else(|| CodecError::NotFound(id.clone().into()))?;
                let baseline = change.new_values.as_ref().or(change.original_values.as_ref());
                let checked = match baseline {
                    Some(baseline) => validate_hpa_change(baseline, &values),
                    None => validate_hpa(&values),
                };
                checked.map_err(|source| CodecError::Invalid {
                    id: id.into(),
                    source,
                })?;
                change.new_values = Some(values);
                change.applied = false;
                change.applied_at = None;
            }
            SessionEdit::SetNodePoolValues {
                id,
                values,
                sequence_order,
            } => {
                validate_node_pool(&values).map_err(|source| CodecError::Invalid {
                    id: id.clone().into(),
                    source,
                })?;
                let change = self
                    .node_pool_changes
                    .iter_mut()
                    .find(|c| c.id() == id)
                    .ok_or_else(|| CodecError::NotFound(id.into()))?;
                change.new_values = values;
                change.sequence_order = normalize_order(sequence_order).unwrap_or(0);
                change.applied = false;
                change.applied_at = None;
                change.error = None;
            }
            SessionEdit::RemoveItem(id) => {
                let before = self.changes.len() + self.node_pool_changes.len();
                match &id {
                    ResourceId::Hpa(hpa) => self.changes.retain(|c| c.id() != *hpa),
                    ResourceId::NodePool(pool) => {
                        self.node_pool_changes.retain(|c| c.id() != *pool);
                    }
                }
                if before == self.changes.len() + self.node_pool_changes.len() {
                    return Err(CodecError::NotFound(id));
                }
            }
            SessionEdit::RecordOutcomes(outcomes) => {
                for (id, state) in &outcomes {
                    self.record_outcome(id, state);
                }
            }
        }

        self.metadata = Some(self.compute_metadata());
        Ok(())
    }

    fn record_outcome(&mut self, id: &ResourceId, state: &ApplyState) {
        if !state.status.is_terminal() {
            return;
        }
        let applied = state.status == ApplyStatus::Success;
        let applied_at = applied.then(|| state.finished_at.unwrap_or_else(Utc::now));
        match id {
            ResourceId::Hpa(hpa) => {
                if let Some(change) = self.changes.iter_mut().find(|c| c.id() == *hpa) {
                    change.applied = applied;
                    change.applied_at = applied_at;
                    if let Some(values) = change.new_values.as_ref().filter(|_| applied) {
                        change.rollout_triggered = values.perform_rollout;
                        change.daemonset_rollout_triggered = values.perform_daemonset_rollout;
                        change.statefulset_rollout_triggered = values.perform_statefulset_rollout;
                    }
                }
            }
            ResourceId::NodePool(pool) => {
                if let Some(change) = self.node_pool_changes.iter_mut().find(|c| c.id() == *pool) {
                    change.applied = applied;
                    change.applied_at = applied_at;
                    change.error = (state.status == ApplyStatus::Error)
                        .then(|| state.message.clone())
                        .flatten();
                    if change.sequence_order > 0 {
                        change.sequence_status = SequenceStatus::of(Some(state));
                    }
                }
            }
        }
    }

    fn compute_metadata(&self) -> SessionMetadata {
        let clusters: BTreeSet<&str> = self
            .changes
            .iter()
            .map(|c| c.cluster.as_str())
            .chain(self.node_pool_changes.iter().map(|c| c.cluster.as_str()))
            .collect();
        let namespaces: HashSet<(&str, &str)> = self
            .changes
            .iter()
            .map(|c| (c.cluster.as_str(), c.namespace.as_str()))
            .collect();
        let resource_count = self
            .metadata
            .as_ref()
            .map_or(0, |m| m.resource_count);

        SessionMetadata {
            clusters_affected: clusters.into_iter().map(str::to_string).collect(),
            namespaces_count: namespaces.len(),
            hpa_count: self.changes.len(),
            node_pool_count: self.node_pool_changes.len(),
            resource_count,
            total_changes: self.changes.len() + self.node_pool_changes.len() + resource_count,
        }
    }
}

/// Export the modified ledger entries as a session
///
/// `applied` reflects a successful apply state for the entry.
pub fn to_session(ledger: &Ledger, info: &SessionInfo) -> Session {
    let mut session = Session {
        name: info.name.clone(),
        created_at: info.created_at.unwrap_or_else(Utc::now),
        created_by: info.created_by.clone(),
        description: info.description.clone(),
        template_used: info.template_used.clone(),
        metadata: None,
        changes: Vec::new(),
        node_pool_changes: Vec::new(),
        resource_changes: None,
        rollback_data: None,
    };

    for entry in ledger.list().into_iter().filter(|e| e.is_modified) {
        let id = entry.resource.id();
        let state = ledger.apply_state(&id);
        let applied = state.is_some_and(|s| s.status == ApplyStatus::Success);
        let applied_at = state.filter(|_| applied).and_then(|s| s.finished_at);

        match entry.resource {
            StagedResource::Hpa(h) => session.changes.push(HpaChange {
                cluster: h.id.cluster.clone(),
                namespace: h.id.namespace.clone(),
                resource_name: h.id.name.clone(),
                original_values: Some(h.original.clone()),
                new_values: Some(h.current.clone()),
                applied,
                applied_at,
                rollout_triggered: applied && h.current.perform_rollout,
                daemonset_rollout_triggered: applied && h.current.perform_daemonset_rollout,
                statefulset_rollout_triggered: applied && h.current.perform_statefulset_rollout,
            }),
            StagedResource::NodePool(p) => session.node_pool_changes.push(NodePoolChange {
                cluster: p.id.cluster.clone(),
                resource_group: p.resource_group.clone(),
                subscription: p.subscription.clone(),
                pool_name: p.id.name.clone(),
                original_values: p.original,
                new_values: p.current,
                applied,
                applied_at,
                error: state
                    .filter(|s| s.status == ApplyStatus::Error)
                    .and_then(|s| s.message.clone()),
                sequence_order: p.sequence_order.unwrap_or(0),
                sequence_status: if p.sequence_order.is_some() {
                    SequenceStatus::of(state)
                } else {
                    SequenceStatus::Unmarked
                },
            }),
        }
    }

    session.metadata = Some(session.compute_metadata());
    log::debug!(
        "exported {} HPA and {} node pool change(s) to session '{}'",
        session.changes.len(),
        session.node_pool_changes.len(),
        session.name
    );
    session
}

/// Rebuild ledger entries from a session
///
/// Every entry is marked as pending. Any malformed item fails the whole
/// call, so a ledger is never populated from part of a session. An item
/// without a baseline uses its new values as the baseline.
pub fn from_session(session: &Session) -> Result<LoadedSession, CodecError> {
    let mut entries = Vec::with_capacity(session.changes.len() + session.node_pool_changes.len());
    let mut seen = HashSet::new();

    for (index, change) in session.changes.iter().enumerate() {
        require("changes", index, "cluster", &change.cluster)?;
        require("changes", index, "namespace", &change.namespace)?;
        require("changes", index, "resource_name", &change.resource_name)?;
        let current = change
            .new_values
            .clone()
            .ok_or(CodecError::MissingField {
                section: "changes",
                index,
                field: "new_values",
            })?;

        let id = change.id();
        let rid = ResourceId::Hpa(id.clone());
        let original = change.original_values.clone().unwrap_or_else(|| current.clone());
        validate_hpa_change(&original, &current).map_err(|source| CodecError::Invalid {
            id: rid.clone(),
            source,
        })?;
        if !seen.insert(rid.clone()) {
            return Err(CodecError::Duplicate(rid));
        }

        entries.push(StagedResource::Hpa(StagedHpa {
            id,
            original,
            current,
            pinned: true,
        }));
    }

    for (index, change) in session.node_pool_changes.iter().enumerate() {
        require("node_pool_changes", index, "cluster", &change.cluster)?;
        require("node_pool_changes", index, "pool_name", &change.pool_name)?;

        let id = change.id();
        let rid = ResourceId::NodePool(id.clone());
        validate_node_pool(&change.new_values).map_err(|source| CodecError::Invalid {
            id: rid.clone(),
            source,
        })?;
        if !seen.insert(rid.clone()) {
            return Err(CodecError::Duplicate(rid));
        }

        entries.push(StagedResource::NodePool(StagedNodePool {
            id,
            resource_group: change.resource_group.clone(),
            subscription: change.subscription.clone(),
            original: change.original_values,
            current: change.new_values,
            sequence_order: normalize_order(Some(change.sequence_order)),
            pinned: true,
        }));
    }

    log::debug!("loaded {} entries from session '{}'", entries.len(), session.name);

    Ok(LoadedSession {
        info: session.info(),
        entries,
    })
}

fn require(
    section: &'static str,
    index: usize,
    field: &'static str,
    value: &str,
) -> Result<(), CodecError> {
    if value.trim().is_empty() {
        return Err(CodecError::MissingField {
            section,
            index,
            field,
        });
    }
    Ok(())
}

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::types::ResourceKind;
    use crate::edit::{HpaEdit, NodePoolEdit};
    use serde_json::json;

    fn ledger_fixture() -> (Ledger, ResourceId, ResourceId, ResourceId) {
        let mut ledger = Ledger::new();

        let api = StagedHpa::new(
            HpaId::new("aks-prd", "payments", "api"),
            HpaValues {
                min_replicas: Some(2),
                max_replicas: 6,
                target_cpu: Some(70),
                deployment_name: Some("api".into()),
                cpu_request: Some("250m".into()),
                memory_limit: Some(String::new()),
                perform_rollout: true,
                ..Default::default()
            },
        );
        let untouched = StagedHpa::new(
            HpaId::new("aks-prd", "payments", "worker"),
            HpaValues {
                max_replicas: 3,
                ..Default::default()
            },
        );
        let np1 = StagedNodePool::new(
            NodePoolId::new("aks-prd", "np1"),
            "rg-prd",
            "sub-1",
            NodePoolValues {
                node_count: 3,
                min_node_count: 2,
                max_node_count: 5,
                autoscaling_enabled: true,
            },
        )
        .with_sequence_order(2);

        let api_id = ResourceId::Hpa(api.id.clone());
        let worker_id = ResourceId::Hpa(untouched.id.clone());
        let np1_id = ResourceId::NodePool(np1.id.clone());
        ledger.upsert(api);
        ledger.upsert(untouched);
        ledger.upsert(np1);

        ledger
            .update(
                &api_id,
                vec![
                    HpaEdit::MaxReplicas(12).into(),
                    HpaEdit::PerformRollout(false).into(),
                    HpaEdit::MemoryRequest(Some("512Mi".into())).into(),
                ],
            )
            .unwrap();
        ledger
            .update(
                &np1_id,
                vec![
                    NodePoolEdit::AutoscalingEnabled(false).into(),
                    NodePoolEdit::NodeCount(0).into(),
                    NodePoolEdit::MinNodeCount(0).into(),
                    NodePoolEdit::MaxNodeCount(1).into(),
                ],
            )
            .unwrap();

        (ledger, api_id, worker_id, np1_id)
    }

    #[test]
    fn test_to_session_exports_only_modified() {
        let (ledger, _, _, _) = ledger_fixture();
        let session = to_session(&ledger, &SessionInfo::new("downscale"));

        assert_eq!(session.changes.len(), 1);
        assert_eq!(session.changes[0].resource_name, "api");
        assert_eq!(session.node_pool_changes.len(), 1);
        assert_eq!(session.node_pool_changes[0].sequence_order, 2);
        assert_eq!(
            session.node_pool_changes[0].sequence_status,
            SequenceStatus::Pending
        );

        let metadata = session.metadata.unwrap();
        assert_eq!(metadata.clusters_affected, vec!["aks-prd".to_string()]);
        assert_eq!(metadata.namespaces_count, 1);
        assert_eq!(metadata.total_changes, 2);
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let (ledger, api_id, worker_id, np1_id) = ledger_fixture();
        let session = to_session(&ledger, &SessionInfo::new("downscale"));

        // Through JSON, as a store would
        let decoded = Session::from_json(&session.to_json().unwrap()).unwrap();
        let loaded = from_session(&decoded).unwrap();
        let mut restored = Ledger::new();
        restored.load(&loaded);

        for id in [&api_id, &np1_id] {
            match (ledger.get(id).unwrap(), restored.get(id).unwrap()) {
                (StagedResource::Hpa(a), StagedResource::Hpa(b)) => {
                    assert_eq!(a.original, b.original);
                    assert_eq!(a.current, b.current);
                }
                (StagedResource::NodePool(a), StagedResource::NodePool(b)) => {
                    assert_eq!(a.original, b.original);
                    assert_eq!(a.current, b.current);
                    assert_eq!(a.sequence_order, b.sequence_order);
                    assert_eq!(a.resource_group, b.resource_group);
                    assert_eq!(a.subscription, b.subscription);
                }
                _ => panic!("kind changed across the round trip"),
            }
        }
        assert!(restored.get(&worker_id).is_none());
        assert_eq!(loaded.info.name, "downscale");
    }

    /// Values of every staged entry, keyed by identity
    fn snapshot(ledger: &Ledger) -> Vec<(ResourceId, StagedResource)> {
        let mut entries: Vec<_> = ledger
            .list()
            .into_iter()
            .map(|e| {
                let mut resource = e.resource.clone();
                match &mut resource {
                    StagedResource::Hpa(h) => h.pinned = false,
                    StagedResource::NodePool(p) => p.pinned = false,
                }
                (resource.id(), resource)
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn round_trip(ledger: &Ledger) -> Ledger {
        let session = to_session(ledger, &SessionInfo::new("rt"));
        let decoded = Session::from_json(&session.to_json().unwrap()).unwrap();
        let mut restored = Ledger::new();
        restored.load(&from_session(&decoded).unwrap());
        restored
    }

    #[test]
    fn test_round_trip_mixed_shapes() {
        let mut ledger = Ledger::new();
        let bare = StagedHpa::new(
            HpaId::new("aks-dev", "web", "bare"),
            HpaValues {
                max_replicas: 3,
                ..Default::default()
            },
        );
        let solo = StagedNodePool::new(
            NodePoolId::new("aks-dev", "solo"),
            "rg-dev",
            "sub-2",
            NodePoolValues {
                node_count: 2,
                ..Default::default()
            },
        );
        let sized = StagedHpa::new(
            HpaId::new("aks-prd", "payments", "sized"),
            HpaValues {
                min_replicas: Some(2),
                max_replicas: 10,
                cpu_request: Some("250".into()),
                memory_request: Some("1073741824".into()),
                memory_limit: Some("1.5Gi".into()),
                ..Default::default()
            },
        );
        let grouped = StagedNodePool::new(
            NodePoolId::new("aks-prd", "np2"),
            "rg-prd",
            "sub-1",
            NodePoolValues {
                node_count: 4,
                min_node_count: 1,
                max_node_count: 6,
                autoscaling_enabled: true,
            },
        )
        .with_sequence_order(1);

        let ids: Vec<ResourceId> = vec![
            bare.id.clone().into(),
            solo.id.clone().into(),
            sized.id.clone().into(),
            grouped.id.clone().into(),
        ];
        ledger.upsert(bare);
        ledger.upsert(solo);
        ledger.upsert(sized);
        ledger.upsert(grouped);

        ledger.update(&ids[0], vec![HpaEdit::MaxReplicas(4).into()]).unwrap();
        ledger.update(&ids[1], vec![NodePoolEdit::NodeCount(0).into()]).unwrap();
        ledger.update(&ids[2], vec![HpaEdit::MaxReplicas(8).into()]).unwrap();
        ledger
            .update(&ids[3], vec![NodePoolEdit::MaxNodeCount(3).into()])
            .unwrap();

        let restored = round_trip(&ledger);
        assert_eq!(snapshot(&restored), snapshot(&ledger));

        let kind_order = |l: &Ledger, kind: ResourceKind| -> Vec<ResourceId> {
            l.pending().into_iter().filter(|id| id.kind() == kind).collect()
        };
        for kind in [ResourceKind::Hpa, ResourceKind::NodePool] {
            assert_eq!(kind_order(&restored, kind), kind_order(&ledger, kind));
        }

        let StagedResource::NodePool(solo) = restored.get(&ids[1]).unwrap() else {
            panic!("expected node pool");
        };
        assert_eq!(solo.sequence_order, None);
    }

    #[test]
    fn test_loaded_entries_are_pending_even_without_diff() {
        let session: Session = serde_json::from_value(json!({
            "name": "noop",
            "created_at": "2025-10-01T12:00:00Z",
            "changes": [{
                "cluster": "aks", "namespace": "ns", "hpa_name": "api",
                "original_values": {"min_replicas": 1, "max_replicas": 3},
                "new_values": {"min_replicas": 1, "max_replicas": 3}
            }],
            "node_pool_changes": null
        }))
        .unwrap();

        let loaded = from_session(&session).unwrap();
        let mut ledger = Ledger::new();
        ledger.load(&loaded);

        assert_eq!(ledger.change_count().total, 1);
        assert!(diff::compute(&loaded.entries[0]).is_empty());
    }

    #[test]
    fn test_legacy_field_names_accepted() {
        let session: Session = serde_json::from_value(json!({
            "name": "legacy",
            "created_at": "2025-10-01T12:00:00-03:00",
            "created_by": "ops",
            "template_used": "node-downscale",
            "metadata": null,
            "changes": null,
            "node_pool_changes": [{
                "cluster": "aks", "resource_group": "rg", "subscription": "sub",
                "node_pool_name": "np1",
                "original_values": {"node_count": 3, "min_node_count": 2, "max_node_count": 5, "autoscaling_enabled": true},
                "new_values": {"node_count": 0, "min_node_count": 0, "max_node_count": 1, "autoscaling_enabled": false},
                "applied": false, "sequence_order": 0, "sequence_status": ""
            }],
            "resource_changes": [],
            "rollback_data": {"can_rollback": true}
        }))
        .unwrap();

        assert_eq!(session.node_pool_changes[0].pool_name, "np1");
        assert_eq!(session.node_pool_changes[0].sequence_status, SequenceStatus::Unmarked);

        let loaded = from_session(&session).unwrap();
        assert_eq!(loaded.entries[0].sequence_order(), None);

        // Opaque sections survive re-serialization
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["rollback_data"], json!({"can_rollback": true}));
        assert_eq!(value["node_pool_changes"][0]["pool_name"], "np1");
    }

    #[test]
    fn test_from_session_is_atomic() {
        let session: Session = serde_json::from_value(json!({
            "name": "broken",
            "created_at": "2025-10-01T12:00:00Z",
            "changes": [
                {"cluster": "aks", "namespace": "ns", "resource_name": "ok",
                 "new_values": {"max_replicas": 3}},
                {"cluster": "aks", "namespace": "ns", "resource_name": "bad",
                 "new_values": {"min_replicas": 9, "max_replicas": 3}}
            ]
        }))
        .unwrap();

        let err = from_session(&session).unwrap_err();
        assert!(matches!(err, CodecError::Invalid { .. }));
        assert!(err.to_string().contains("hpa:aks/ns/bad"));
    }

    #[test]
    fn test_from_session_checks_only_changed_quantities() {
        let session = |new_request: &str| -> Session {
            serde_json::from_value(json!({
                "name": "q",
                "created_at": "2025-10-01T12:00:00Z",
                "changes": [{
                    "cluster": "aks", "namespace": "ns", "resource_name": "api",
                    "original_values": {"max_replicas": 3, "memory_request": "1.5Gi"},
                    "new_values": {"max_replicas": 5, "memory_request": new_request}
                }]
            }))
            .unwrap()
        };

        assert!(from_session(&session("1.5Gi")).is_ok());
        assert!(matches!(
            from_session(&session("lots")),
            Err(CodecError::Invalid {
                source: ValidationError::Quantity { field: "memory_request", .. },
                ..
            })
        ));
    }

    #[test]
    fn test_from_session_missing_fields_and_duplicates() {
        let missing: Session = serde_json::from_value(json!({
            "name": "s", "created_at": "2025-10-01T12:00:00Z",
            "changes": [{"cluster": "aks", "namespace": "", "resource_name": "x",
                         "new_values": {"max_replicas": 1}}]
        }))
        .unwrap();
        assert!(matches!(
            from_session(&missing),
            Err(CodecError::MissingField { field: "namespace", .. })
        ));

        let no_values: Session = serde_json::from_value(json!({
            "name": "s", "created_at": "2025-10-01T12:00:00Z",
            "changes": [{"cluster": "aks", "namespace": "ns", "resource_name": "x"}]
        }))
        .unwrap();
        assert!(matches!(
            from_session(&no_values),
            Err(CodecError::MissingField { field: "new_values", .. })
        ));

        let pool = json!({
            "cluster": "aks", "pool_name": "np1",
            "original_values": {"node_count": 1, "min_node_count": 1, "max_node_count": 2, "autoscaling_enabled": true},
            "new_values": {"node_count": 1, "min_node_count": 1, "max_node_count": 3, "autoscaling_enabled": true}
        });
        let duplicated: Session = serde_json::from_value(json!({
            "name": "s", "created_at": "2025-10-01T12:00:00Z",
            "node_pool_changes": [pool.clone(), pool]
        }))
        .unwrap();
        assert!(matches!(
            from_session(&duplicated),
            Err(CodecError::Duplicate(ResourceId::NodePool(_)))
        ));
        assert_eq!(
            from_session(&duplicated).unwrap_err().to_string(),
            "nodepool:aks/np1 appears more than once"
        );
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(matches!(
            Session::from_json(r#"{"name": "x", "created_at": "yesterday"}"#),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn test_apply_edit_values_and_removal() {
        let (ledger, api_id, _, np1_id) = ledger_fixture();
        let mut session = to_session(&ledger, &SessionInfo::new("s"));
        let ResourceId::Hpa(hpa) = api_id.clone() else {
            unreachable!()
        };

        let mut values = session.changes[0].new_values.clone().unwrap();
        values.max_replicas = 20;
        session
            .apply_edit(SessionEdit::SetHpaValues {
                id: hpa.clone(),
                values: values.clone(),
            })
            .unwrap();
        assert_eq!(session.changes[0].new_values.as_ref(), Some(&values));

        values.target_cpu = Some(0);
        assert!(matches!(
            session.apply_edit(SessionEdit::SetHpaValues { id: hpa, values }),
            Err(CodecError::Invalid { .. })
        ));

        session.apply_edit(SessionEdit::RemoveItem(np1_id.clone())).unwrap();
        assert!(session.node_pool_changes.is_empty());
        assert_eq!(session.metadata.as_ref().unwrap().node_pool_count, 0);
        assert!(matches!(
            session.apply_edit(SessionEdit::RemoveItem(np1_id)),
            Err(CodecError::NotFound(_))
        ));
    }

    #[test]
    fn test_record_outcomes() {
        let (ledger, api_id, _, np1_id) = ledger_fixture();
        let mut session = to_session(&ledger, &SessionInfo::new("s"));

        let mut ok = ApplyState::idle();
        ok.begin();
        ok.succeed("applied");
        let mut failed = ApplyState::idle();
        failed.begin();
        failed.fail("quota exceeded");

        session
            .apply_edit(SessionEdit::RecordOutcomes(vec![
                (api_id, ok),
                (np1_id, failed),
            ]))
            .unwrap();

        assert!(session.changes[0].applied);
        assert!(session.changes[0].applied_at.is_some());
        let pool = &session.node_pool_changes[0];
        assert!(!pool.applied);
        assert_eq!(pool.error.as_deref(), Some("quota exceeded"));
        assert_eq!(pool.sequence_status, SequenceStatus::Failed);
    }

    #[test]
    fn test_idle_outcomes_keep_recorded_results() {
        let (ledger, api_id, _, np1_id) = ledger_fixture();
        let mut session = to_session(&ledger, &SessionInfo::new("s"));

        let mut ok = ApplyState::idle();
        ok.begin();
        ok.succeed("applied");
        let mut failed = ApplyState::idle();
        failed.begin();
        failed.fail("quota exceeded");
        session
            .apply_edit(SessionEdit::RecordOutcomes(vec![
                (api_id.clone(), ok),
                (np1_id.clone(), failed),
            ]))
            .unwrap();
        let recorded = session.clone();

        // A later run halted before reaching these items
        session
            .apply_edit(SessionEdit::RecordOutcomes(vec![
                (api_id, ApplyState::idle()),
                (np1_id, ApplyState::idle()),
            ]))
            .unwrap();

        assert!(session.changes[0].applied);
        assert_eq!(session.changes[0].applied_at, recorded.changes[0].applied_at);
        assert_eq!(session.node_pool_changes[0], recorded.node_pool_changes[0]);
    }

    #[test]
    fn test_set_hpa_values_keeps_cluster_quantities() {
        let mut session: Session = serde_json::from_value(json!({
            "name": "s",
            "created_at": "2025-10-01T12:00:00Z",
            "changes": [{
                "cluster": "aks", "namespace": "ns", "resource_name": "api",
                "original_values": {"max_replicas": 3, "memory_request": "1.5Gi"},
                "new_values": {"max_replicas": 4, "memory_request": "1.5Gi"}
            }]
        }))
        .unwrap();
        let id = session.changes[0].id();
        let values = HpaValues {
            max_replicas: 6,
            memory_request: Some("1.5Gi".into()),
            ..Default::default()
        };

        session
            .apply_edit(SessionEdit::SetHpaValues {
                id: id.clone(),
                values: values.clone(),
            })
            .unwrap();
        assert_eq!(session.changes[0].new_values.as_ref(), Some(&values));

        let err = session
            .apply_edit(SessionEdit::SetHpaValues {
                id,
                values: HpaValues {
                    memory_limit: Some("1Gi".into()),
                    memory_request: Some("2Gi".into()),
                    ..values
                },
            })
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::Invalid {
                source: ValidationError::RequestExceedsLimit { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_summary_format() {
        let session: Session = serde_json::from_value(json!({
            "name": "s", "created_at": "2025-10-01T12:30:00Z", "description": "night"
        }))
        .unwrap();
        let summary = session.summary();
        assert_eq!(summary.created_at, "2025-10-01 12:30:00");
        assert_eq!(summary.description.as_deref(), Some("night"));
    }
}
