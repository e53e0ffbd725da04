//! Core types for staged resource management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identity
// ============================================================================

/// Identity of an autoscaler (HPA) resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HpaId {
    pub cluster: String,
    pub namespace: String,
    pub name: String,
}

impl HpaId {
    pub fn new(
        cluster: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// Identity of a node pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodePoolId {
    pub cluster: String,
    pub name: String,
}

impl NodePoolId {
    pub fn new(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            name: name.into(),
        }
    }
}

/// Kind of a staged resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Hpa,
    NodePool,
}

impl ResourceKind {
    /// Prefix used in the textual form of an identity
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Hpa => "hpa",
            Self::NodePool => "nodepool",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hpa => "HPA",
            Self::NodePool => "Node pool",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for ResourceKind {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hpa" => Ok(Self::Hpa),
            "nodepool" | "node_pool" | "np" => Ok(Self::NodePool),
            other => Err(ParseIdError::UnknownKind(other.to_string())),
        }
    }
}

/// Typed composite identity of a staged resource
///
/// Textual form is `hpa:<cluster>/<namespace>/<name>` or
/// `nodepool:<cluster>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceId {
    Hpa(HpaId),
    NodePool(NodePoolId),
}

impl ResourceId {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Hpa(_) => ResourceKind::Hpa,
            Self::NodePool(_) => ResourceKind::NodePool,
        }
    }

    pub fn cluster(&self) -> &str {
        match self {
            Self::Hpa(id) => &id.cluster,
            Self::NodePool(id) => &id.cluster,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Hpa(id) => &id.name,
            Self::NodePool(id) => &id.name,
        }
    }
}

impl From<HpaId> for ResourceId {
    fn from(id: HpaId) -> Self {
        Self::Hpa(id)
    }
}

impl From<NodePoolId> for ResourceId {
    fn from(id: NodePoolId) -> Self {
        Self::NodePool(id)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hpa(id) => write!(f, "hpa:{}/{}/{}", id.cluster, id.namespace, id.name),
            Self::NodePool(id) => write!(f, "nodepool:{}/{}", id.cluster, id.name),
        }
    }
}

/// Error parsing a textual resource identity
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseIdError {
    #[error("missing kind prefix in '{0}' (expected hpa: or nodepool:)")]
    MissingKind(String),
    #[error("unknown resource kind '{0}'")]
    UnknownKind(String),
    #[error("expected {expected} path segments for {kind}, got '{input}'")]
    Segments {
        kind: ResourceKind,
        expected: usize,
        input: String,
    },
}

impl FromStr for ResourceId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, path) = s
            .split_once(':')
            .ok_or_else(|| ParseIdError::MissingKind(s.to_string()))?;
        let kind: ResourceKind = kind.parse()?;
        let segments: Vec<&str> = path.split('/').collect();
        let expected = match kind {
            ResourceKind::Hpa => 3,
            ResourceKind::NodePool => 2,
        };

        if segments.len() != expected || segments.iter().any(|s| s.is_empty()) {
            return Err(ParseIdError::Segments {
                kind,
                expected,
                input: s.to_string(),
            });
        }

        Ok(match kind {
            ResourceKind::Hpa => Self::Hpa(HpaId::new(segments[0], segments[1], segments[2])),
            ResourceKind::NodePool => Self::NodePool(NodePoolId::new(segments[0], segments[1])),
        })
    }
}

// ============================================================================
// Values
// ============================================================================

/// Editable attributes of an HPA and its target workload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpaValues {
    #[serde(default)]
    pub min_replicas: Option<i32>,
    pub max_replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cpu: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_memory: Option<i32>,

    #[serde(default)]
    pub perform_rollout: bool,
    #[serde(default)]
    pub perform_daemonset_rollout: bool,
    #[serde(default)]
    pub perform_statefulset_rollout: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
}

/// Scaling attributes of a node pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolValues {
    pub node_count: i32,
    pub min_node_count: i32,
    pub max_node_count: i32,
    pub autoscaling_enabled: bool,
}

// ============================================================================
// Staged resources
// ============================================================================

/// An HPA held in the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedHpa {
    pub id: HpaId,
    pub original: HpaValues,
    pub current: HpaValues,
    /// Set when the entry was loaded from a session
    pub pinned: bool,
}

impl StagedHpa {
    /// Stage an HPA with `original` as both baseline and live values
    pub fn new(id: HpaId, original: HpaValues) -> Self {
        Self {
            id,
            current: original.clone(),
            original,
            pinned: false,
        }
    }
}

/// A node pool held in the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedNodePool {
    pub id: NodePoolId,
    pub resource_group: String,
    pub subscription: String,
    pub original: NodePoolValues,
    pub current: NodePoolValues,
    /// Sequence group; `None` means ungrouped
    pub sequence_order: Option<u32>,
    pub pinned: bool,
}

impl StagedNodePool {
    pub fn new(
        id: NodePoolId,
        resource_group: impl Into<String>,
        subscription: impl Into<String>,
        original: NodePoolValues,
    ) -> Self {
        Self {
            id,
            resource_group: resource_group.into(),
            subscription: subscription.into(),
            current: original,
            original,
            sequence_order: None,
            pinned: false,
        }
    }

    /// Place the pool in a sequence group; zero means ungrouped
    pub fn with_sequence_order(mut self, order: u32) -> Self {
        self.sequence_order = normalize_order(Some(order));
        self
    }

    /// Location used by the single-item apply call
    pub fn target(&self) -> NodePoolTarget {
        NodePoolTarget {
            cluster: self.id.cluster.clone(),
            resource_group: self.resource_group.clone(),
            name: self.id.name.clone(),
        }
    }
}

/// Map an order of zero to "ungrouped"
pub fn normalize_order(order: Option<u32>) -> Option<u32> {
    order.filter(|o| *o > 0)
}

/// A resource held in the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedResource {
    Hpa(StagedHpa),
    NodePool(StagedNodePool),
}

impl StagedResource {
    pub fn id(&self) -> ResourceId {
        match self {
            Self::Hpa(h) => ResourceId::Hpa(h.id.clone()),
            Self::NodePool(p) => ResourceId::NodePool(p.id.clone()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Hpa(_) => ResourceKind::Hpa,
            Self::NodePool(_) => ResourceKind::NodePool,
        }
    }

    pub fn is_pinned(&self) -> bool {
        match self {
            Self::Hpa(h) => h.pinned,
            Self::NodePool(p) => p.pinned,
        }
    }

    /// Sequence group of a node pool; always `None` for HPAs
    pub fn sequence_order(&self) -> Option<u32> {
        match self {
            Self::Hpa(_) => None,
            Self::NodePool(p) => p.sequence_order,
        }
    }
}

impl From<StagedHpa> for StagedResource {
    fn from(h: StagedHpa) -> Self {
        Self::Hpa(h)
    }
}

impl From<StagedNodePool> for StagedResource {
    fn from(p: StagedNodePool) -> Self {
        Self::NodePool(p)
    }
}

/// A ledger entry as returned by [`crate::Ledger::list`]
#[derive(Debug, Clone, Copy)]
pub struct LedgerEntry<'a> {
    pub resource: &'a StagedResource,
    pub is_modified: bool,
}

// ============================================================================
// Remote locations
// ============================================================================

/// Where a node pool lives for the single-item apply call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolTarget {
    pub cluster: String,
    pub resource_group: String,
    pub name: String,
}

/// One member of a sequential node-pool group call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolOperation {
    pub name: String,
    pub autoscaling_enabled: bool,
    pub node_count: i32,
    pub min_node_count: i32,
    pub max_node_count: i32,
    pub order: u32,
}

/// Per-pool outcome inside a group response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupItemResult {
    pub pool_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Overall failure detail of a group response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

/// Response of the sequential node-pool group call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupApplyResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub results: Vec<GroupItemResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GroupError>,
}

impl GroupApplyResponse {
    /// Find the outcome reported for a pool
    pub fn result_for(&self, pool_name: &str) -> Option<&GroupItemResult> {
        self.results.iter().find(|r| r.pool_name == pool_name)
    }
}

// ============================================================================
// Apply state
// ============================================================================

/// Apply status of one identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    #[default]
    Idle,
    Applying,
    Success,
    Error,
}

impl ApplyStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Applying => "applying",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Apply state of one identity
///
/// Transitions are `idle -> applying -> success | error`; a retry moves a
/// terminal state back to `applying`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyState {
    pub status: ApplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the state became terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ApplyState {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Move to `applying`; refused while already applying
    pub fn begin(&mut self) -> bool {
        if self.status == ApplyStatus::Applying {
            return false;
        }
        self.status = ApplyStatus::Applying;
        self.message = None;
        self.finished_at = None;
        true
    }

    /// Finish with success; refused unless applying
    pub fn succeed(&mut self, message: impl Into<String>) -> bool {
        self.finish(ApplyStatus::Success, message.into())
    }

    /// Finish with an error; refused unless applying
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        self.finish(ApplyStatus::Error, message.into())
    }

    fn finish(&mut self, status: ApplyStatus, message: String) -> bool {
        if self.status != ApplyStatus::Applying {
            log::warn!("ignoring {status} transition from {}", self.status);
            return false;
        }
        self.status = status;
        self.message = Some(message);
        self.finished_at = Some(Utc::now());
        true
    }
}
