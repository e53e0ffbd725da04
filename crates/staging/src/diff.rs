//! Diff computation for staged resources
//!
//! Pure functions comparing a baseline against live values. Absent values
//! and empty strings normalize to [`FieldValue::Unset`], and the resulting
//! [`ChangeSet`] is always in a fixed field order.

use crate::types::{HpaValues, NodePoolValues, StagedResource};
use serde::Serialize;
use std::fmt;

/// A tracked field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    MinReplicas,
    MaxReplicas,
    TargetCpu,
    TargetMemory,
    CpuRequest,
    CpuLimit,
    MemoryRequest,
    MemoryLimit,
    PerformRollout,
    PerformDaemonsetRollout,
    PerformStatefulsetRollout,
    AutoscalingEnabled,
    NodeCount,
    /// `min_node_count` and `max_node_count` reported together
    NodeCountBounds,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MinReplicas => "min_replicas",
            Self::MaxReplicas => "max_replicas",
            Self::TargetCpu => "target_cpu",
            Self::TargetMemory => "target_memory",
            Self::CpuRequest => "cpu_request",
            Self::CpuLimit => "cpu_limit",
            Self::MemoryRequest => "memory_request",
            Self::MemoryLimit => "memory_limit",
            Self::PerformRollout => "perform_rollout",
            Self::PerformDaemonsetRollout => "perform_daemonset_rollout",
            Self::PerformStatefulsetRollout => "perform_statefulset_rollout",
            Self::AutoscalingEnabled => "autoscaling_enabled",
            Self::NodeCount => "node_count",
            Self::NodeCountBounds => "node_count_bounds",
        }
    }

    /// Human-readable label for previews
    pub fn label(&self) -> &'static str {
        match self {
            Self::MinReplicas => "Min replicas",
            Self::MaxReplicas => "Max replicas",
            Self::TargetCpu => "CPU target (%)",
            Self::TargetMemory => "Memory target (%)",
            Self::CpuRequest => "CPU request",
            Self::CpuLimit => "CPU limit",
            Self::MemoryRequest => "Memory request",
            Self::MemoryLimit => "Memory limit",
            Self::PerformRollout => "Deployment rollout",
            Self::PerformDaemonsetRollout => "DaemonSet rollout",
            Self::PerformStatefulsetRollout => "StatefulSet rollout",
            Self::AutoscalingEnabled => "Autoscaling",
            Self::NodeCount => "Node count",
            Self::NodeCountBounds => "Min/max nodes",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A normalized field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Unset,
    Int(i64),
    Text(String),
    Bool(bool),
    Range { min: i64, max: i64 },
}

impl FieldValue {
    fn int(value: Option<i32>) -> Self {
        value.map_or(Self::Unset, |v| Self::Int(v.into()))
    }

    fn text(value: Option<&str>) -> Self {
        match value {
            Some(s) if !s.is_empty() => Self::Text(s.to_string()),
            _ => Self::Unset,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("(unset)"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Range { min, max } => write!(f, "{min}-{max}"),
        }
    }
}

/// One changed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: Field,
    pub before: FieldValue,
    pub after: FieldValue,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} → {}", self.field, self.before, self.after)
    }
}

/// Ordered list of changed fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldChange> {
        self.changes.iter()
    }

    pub fn fields(&self) -> Vec<Field> {
        self.changes.iter().map(|c| c.field).collect()
    }

    pub fn get(&self, field: Field) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    fn push(&mut self, field: Field, before: FieldValue, after: FieldValue) {
        // Both sides unset, or equal after normalization
        if before == after {
            return;
        }
        self.changes.push(FieldChange {
            field,
            before,
            after,
        });
    }

    /// Report a rollout trigger only when it flips on
    fn push_trigger(&mut self, field: Field, before: bool, after: bool) {
        if !before && after {
            self.push(field, FieldValue::Bool(false), FieldValue::Bool(true));
        }
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a FieldChange;
    type IntoIter = std::slice::Iter<'a, FieldChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Diff two HPA value sets
pub fn diff_hpa(original: &HpaValues, current: &HpaValues) -> ChangeSet {
    let mut set = ChangeSet::default();

    set.push(
        Field::MinReplicas,
        FieldValue::int(original.min_replicas),
        FieldValue::int(current.min_replicas),
    );
    set.push(
        Field::MaxReplicas,
        FieldValue::int(Some(original.max_replicas)),
        FieldValue::int(Some(current.max_replicas)),
    );
    set.push(
        Field::TargetCpu,
        FieldValue::int(original.target_cpu),
        FieldValue::int(current.target_cpu),
    );
    set.push(
        Field::TargetMemory,
        FieldValue::int(original.target_memory),
        FieldValue::int(current.target_memory),
    );

    let texts = [
        (Field::CpuRequest, &original.cpu_request, &current.cpu_request),
        (Field::CpuLimit, &original.cpu_limit, &current.cpu_limit),
        (Field::MemoryRequest, &original.memory_request, &current.memory_request),
        (Field::MemoryLimit, &original.memory_limit, &current.memory_limit),
    ];
    for (field, before, after) in texts {
        set.push(
            field,
            FieldValue::text(before.as_deref()),
            FieldValue::text(after.as_deref()),
        );
    }

    set.push_trigger(
        Field::PerformRollout,
        original.perform_rollout,
        current.perform_rollout,
    );
    set.push_trigger(
        Field::PerformDaemonsetRollout,
        original.perform_daemonset_rollout,
        current.perform_daemonset_rollout,
    );
    set.push_trigger(
        Field::PerformStatefulsetRollout,
        original.perform_statefulset_rollout,
        current.perform_statefulset_rollout,
    );

    set
}

/// Diff two node pool value sets
///
/// `node_count` is only meaningful for a manually scaled pool, so it is
/// reported only while autoscaling is disabled in `current`. The bounds are
/// reported as one range entry.
pub fn diff_node_pool(original: &NodePoolValues, current: &NodePoolValues) -> ChangeSet {
    let mut set = ChangeSet::default();

    set.push(
        Field::AutoscalingEnabled,
        FieldValue::Bool(original.autoscaling_enabled),
        FieldValue::Bool(current.autoscaling_enabled),
    );

    if !current.autoscaling_enabled {
        set.push(
            Field::NodeCount,
            FieldValue::Int(original.node_count.into()),
            FieldValue::Int(current.node_count.into()),
        );
    }

    set.push(
        Field::NodeCountBounds,
        FieldValue::Range {
            min: original.min_node_count.into(),
            max: original.max_node_count.into(),
        },
        FieldValue::Range {
            min: current.min_node_count.into(),
            max: current.max_node_count.into(),
        },
    );

    set
}

/// Diff a staged resource's baseline against its live values
pub fn compute(resource: &StagedResource) -> ChangeSet {
    match resource {
        StagedResource::Hpa(h) => diff_hpa(&h.original, &h.current),
        StagedResource::NodePool(p) => diff_node_pool(&p.original, &p.current),
    }
}

/// Whether a staged resource counts as a pending change
///
/// Entries loaded from a session are pending by definition.
pub fn is_modified(resource: &StagedResource) -> bool {
    resource.is_pinned() || !compute(resource).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HpaId, NodePoolId, StagedHpa, StagedNodePool};

    fn hpa() -> HpaValues {
        HpaValues {
            min_replicas: Some(2),
            max_replicas: 6,
            target_cpu: Some(70),
            cpu_request: Some("250m".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_values_produce_empty_diff() {
        assert!(diff_hpa(&hpa(), &hpa()).is_empty());
        let np = NodePoolValues {
            node_count: 3,
            min_node_count: 1,
            max_node_count: 4,
            autoscaling_enabled: true,
        };
        assert!(diff_node_pool(&np, &np).is_empty());
    }

    #[test]
    fn test_empty_string_equals_absent() {
        let current = HpaValues {
            memory_limit: Some(String::new()),
            ..hpa()
        };
        assert!(diff_hpa(&hpa(), &current).is_empty());
    }

    #[test]
    fn test_field_order_is_fixed() {
        let current = HpaValues {
            min_replicas: None,
            max_replicas: 8,
            target_cpu: Some(60),
            target_memory: Some(80),
            cpu_request: Some("500m".into()),
            memory_limit: Some("1Gi".into()),
            perform_rollout: true,
            ..hpa()
        };
        assert_eq!(
            diff_hpa(&hpa(), &current).fields(),
            vec![
                Field::MinReplicas,
                Field::MaxReplicas,
                Field::TargetCpu,
                Field::TargetMemory,
                Field::CpuRequest,
                Field::MemoryLimit,
                Field::PerformRollout,
            ]
        );
    }

    #[test]
    fn test_cleared_value_reports_unset() {
        let current = HpaValues {
            cpu_request: None,
            ..hpa()
        };
        let diff = diff_hpa(&hpa(), &current);
        let change = diff.get(Field::CpuRequest).unwrap();
        assert_eq!(change.before, FieldValue::Text("250m".into()));
        assert_eq!(change.after, FieldValue::Unset);
    }

    #[test]
    fn test_rollout_only_on_false_to_true() {
        let on = HpaValues {
            perform_rollout: true,
            perform_daemonset_rollout: true,
            perform_statefulset_rollout: true,
            ..hpa()
        };

        let diff = diff_hpa(&hpa(), &on);
        assert_eq!(diff.len(), 3);
        assert_eq!(
            diff.get(Field::PerformDaemonsetRollout).unwrap().after,
            FieldValue::Bool(true)
        );

        // true -> false is never surfaced
        assert!(diff_hpa(&on, &hpa()).is_empty());
    }

    #[test]
    fn test_node_pool_manual_scaling_example() {
        let original = NodePoolValues {
            node_count: 3,
            autoscaling_enabled: true,
            min_node_count: 2,
            max_node_count: 5,
        };
        let current = NodePoolValues {
            node_count: 0,
            autoscaling_enabled: false,
            min_node_count: 0,
            max_node_count: 1,
        };

        let diff = diff_node_pool(&original, &current);
        assert_eq!(
            diff.fields(),
            vec![
                Field::AutoscalingEnabled,
                Field::NodeCount,
                Field::NodeCountBounds
            ]
        );
        assert_eq!(
            diff.get(Field::NodeCountBounds).unwrap().after,
            FieldValue::Range { min: 0, max: 1 }
        );

        let mut pool = StagedNodePool::new(NodePoolId::new("c", "np1"), "rg", "sub", original);
        pool.current = current;
        assert!(is_modified(&pool.into()));
    }

    #[test]
    fn test_node_count_ignored_while_autoscaling() {
        let original = NodePoolValues {
            node_count: 3,
            min_node_count: 2,
            max_node_count: 5,
            autoscaling_enabled: true,
        };
        let current = NodePoolValues {
            node_count: 4,
            ..original
        };
        assert!(diff_node_pool(&original, &current).is_empty());
    }

    #[test]
    fn test_unpinned_entry_is_modified_exactly_when_diff_is_non_empty() {
        let hpa_cases = [
            (hpa(), hpa(), false),
            (hpa(), HpaValues { max_replicas: 7, ..hpa() }, true),
            (hpa(), HpaValues { target_cpu: None, ..hpa() }, true),
            (hpa(), HpaValues { memory_limit: Some(String::new()), ..hpa() }, false),
            (hpa(), HpaValues { cpu_request: Some("500m".into()), ..hpa() }, true),
            (hpa(), HpaValues { perform_rollout: true, ..hpa() }, true),
            (HpaValues { perform_rollout: true, ..hpa() }, hpa(), false),
            (HpaValues::default(), HpaValues::default(), false),
        ];
        for (original, current, expected) in hpa_cases {
            let mut staged = StagedHpa::new(HpaId::new("c", "ns", "api"), original);
            staged.current = current;
            let resource = StagedResource::from(staged);
            assert_eq!(compute(&resource).is_empty(), !is_modified(&resource));
            assert_eq!(is_modified(&resource), expected, "{resource:?}");
        }

        let autoscaled = NodePoolValues {
            node_count: 3,
            min_node_count: 1,
            max_node_count: 5,
            autoscaling_enabled: true,
        };
        let manual = NodePoolValues {
            autoscaling_enabled: false,
            ..autoscaled
        };
        let pool_cases = [
            (autoscaled, autoscaled, false),
            (autoscaled, NodePoolValues { node_count: 4, ..autoscaled }, false),
            (autoscaled, NodePoolValues { max_node_count: 6, ..autoscaled }, true),
            (autoscaled, manual, true),
            (manual, NodePoolValues { node_count: 0, ..manual }, true),
            (manual, NodePoolValues { min_node_count: 0, ..manual }, true),
            (manual, NodePoolValues { autoscaling_enabled: false, ..manual }, false),
        ];
        for (original, current, expected) in pool_cases {
            let mut staged = StagedNodePool::new(NodePoolId::new("c", "np1"), "rg", "sub", original);
            staged.current = current;
            let resource = StagedResource::from(staged);
            assert_eq!(compute(&resource).is_empty(), !is_modified(&resource));
            assert_eq!(is_modified(&resource), expected, "{resource:?}");
        }
    }

    #[test]
    fn test_pinned_entry_is_modified_without_diff() {
        let mut pool = StagedNodePool::new(
            NodePoolId::new("c", "np1"),
            "rg",
            "sub",
            NodePoolValues::default(),
        );
        assert!(!is_modified(&pool.clone().into()));
        pool.pinned = true;
        assert!(is_modified(&pool.into()));
    }

    #[test]
    fn test_change_display() {
        let current = HpaValues {
            max_replicas: 9,
            ..hpa()
        };
        let diff = diff_hpa(&hpa(), &current);
        assert_eq!(
            diff.iter().next().unwrap().to_string(),
            "max_replicas: 6 → 9"
        );
    }
}
