//! Enumerated edit commands
//!
//! Every mutation the ledger accepts is one of these variants, so the set
//! of valid edits is known statically per resource kind.

use crate::types::{HpaValues, NodePoolValues, ResourceKind, StagedResource, normalize_order};
use crate::validate::{ValidationError, validate_hpa_change, validate_node_pool};

/// A single-field edit to an HPA
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HpaEdit {
    MinReplicas(Option<i32>),
    MaxReplicas(i32),
    TargetCpu(Option<i32>),
    TargetMemory(Option<i32>),
    CpuRequest(Option<String>),
    CpuLimit(Option<String>),
    MemoryRequest(Option<String>),
    MemoryLimit(Option<String>),
    PerformRollout(bool),
    PerformDaemonsetRollout(bool),
    PerformStatefulsetRollout(bool),
}

impl HpaEdit {
    fn apply_to(self, values: &mut HpaValues) {
        match self {
            Self::MinReplicas(v) => values.min_replicas = v,
            Self::MaxReplicas(v) => values.max_replicas = v,
            Self::TargetCpu(v) => values.target_cpu = v,
            Self::TargetMemory(v) => values.target_memory = v,
            Self::CpuRequest(v) => values.cpu_request = v,
            Self::CpuLimit(v) => values.cpu_limit = v,
            Self::MemoryRequest(v) => values.memory_request = v,
            Self::MemoryLimit(v) => values.memory_limit = v,
            Self::PerformRollout(v) => values.perform_rollout = v,
            Self::PerformDaemonsetRollout(v) => values.perform_daemonset_rollout = v,
            Self::PerformStatefulsetRollout(v) => values.perform_statefulset_rollout = v,
        }
    }
}

/// A single-field edit to a node pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodePoolEdit {
    NodeCount(i32),
    MinNodeCount(i32),
    MaxNodeCount(i32),
    AutoscalingEnabled(bool),
    /// Move the pool into a sequence group, or out of it with `None`
    SequenceOrder(Option<u32>),
}

impl NodePoolEdit {
    fn apply_to(self, values: &mut NodePoolValues, order: &mut Option<u32>) {
        match self {
            Self::NodeCount(v) => values.node_count = v,
            Self::MinNodeCount(v) => values.min_node_count = v,
            Self::MaxNodeCount(v) => values.max_node_count = v,
            Self::AutoscalingEnabled(v) => values.autoscaling_enabled = v,
            Self::SequenceOrder(v) => *order = normalize_order(v),
        }
    }
}

/// An edit to any staged resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Hpa(HpaEdit),
    NodePool(NodePoolEdit),
}

impl From<HpaEdit> for Edit {
    fn from(edit: HpaEdit) -> Self {
        Self::Hpa(edit)
    }
}

impl From<NodePoolEdit> for Edit {
    fn from(edit: NodePoolEdit) -> Self {
        Self::NodePool(edit)
    }
}

impl Edit {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Hpa(_) => ResourceKind::Hpa,
            Self::NodePool(_) => ResourceKind::NodePool,
        }
    }

    /// Parse a `field=value` assignment for the given resource kind
    ///
    /// An empty value clears optional fields.
    pub fn from_assignment(kind: ResourceKind, field: &str, value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        let edit = match kind {
            ResourceKind::Hpa => Self::Hpa(match field {
                "min_replicas" => HpaEdit::MinReplicas(parse_opt_int(field, value)?),
                "max_replicas" => HpaEdit::MaxReplicas(parse_int(field, value)?),
                "target_cpu" => HpaEdit::TargetCpu(parse_opt_int(field, value)?),
                "target_memory" => HpaEdit::TargetMemory(parse_opt_int(field, value)?),
                "cpu_request" => HpaEdit::CpuRequest(opt_text(value)),
                "cpu_limit" => HpaEdit::CpuLimit(opt_text(value)),
                "memory_request" => HpaEdit::MemoryRequest(opt_text(value)),
                "memory_limit" => HpaEdit::MemoryLimit(opt_text(value)),
                "perform_rollout" => HpaEdit::PerformRollout(parse_bool(field, value)?),
                "perform_daemonset_rollout" => {
                    HpaEdit::PerformDaemonsetRollout(parse_bool(field, value)?)
                }
                "perform_statefulset_rollout" => {
                    HpaEdit::PerformStatefulsetRollout(parse_bool(field, value)?)
                }
                _ => return Err(unknown(kind, field)),
            }),
            ResourceKind::NodePool => Self::NodePool(match field {
                "node_count" => NodePoolEdit::NodeCount(parse_int(field, value)?),
                "min_node_count" => NodePoolEdit::MinNodeCount(parse_int(field, value)?),
                "max_node_count" => NodePoolEdit::MaxNodeCount(parse_int(field, value)?),
                "autoscaling_enabled" => {
                    NodePoolEdit::AutoscalingEnabled(parse_bool(field, value)?)
                }
                "sequence_order" | "order" => {
                    let order = parse_opt_int(field, value)?;
                    let order = order
                        .map(u32::try_from)
                        .transpose()
                        .map_err(|_| invalid(field, value, "a non-negative integer"))?;
                    NodePoolEdit::SequenceOrder(order)
                }
                _ => return Err(unknown(kind, field)),
            }),
        };
        Ok(edit)
    }
}

/// Apply `edits` to a copy of `resource`, validate, and commit on success
///
/// Either every edit lands or none does.
pub fn apply_edits(resource: &mut StagedResource, edits: Vec<Edit>) -> Result<(), ValidationError> {
    match resource {
        StagedResource::Hpa(hpa) => {
            let mut candidate = hpa.current.clone();
            for edit in edits {
                match edit {
                    Edit::Hpa(e) => e.apply_to(&mut candidate),
                    other => return Err(mismatch(ResourceKind::Hpa, other.kind())),
                }
            }
            validate_hpa_change(&hpa.current, &candidate)?;
            hpa.current = candidate;
        }
        StagedResource::NodePool(pool) => {
            let mut candidate = pool.current;
            let mut order = pool.sequence_order;
            for edit in edits {
                match edit {
                    Edit::NodePool(e) => e.apply_to(&mut candidate, &mut order),
                    other => return Err(mismatch(ResourceKind::NodePool, other.kind())),
                }
            }
            validate_node_pool(&candidate)?;
            pool.current = candidate;
            pool.sequence_order = order;
        }
    }
    Ok(())
}

fn mismatch(expected: ResourceKind, found: ResourceKind) -> ValidationError {
    ValidationError::KindMismatch { expected, found }
}

fn unknown(kind: ResourceKind, field: &str) -> ValidationError {
    ValidationError::UnknownField {
        kind,
        field: field.to_string(),
    }
}

fn invalid(field: &str, value: &str, expected: &'static str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        expected,
    }
}

fn parse_int(field: &str, value: &str) -> Result<i32, ValidationError> {
    value
        .parse()
        .map_err(|_| invalid(field, value, "an integer"))
}

fn parse_opt_int(field: &str, value: &str) -> Result<Option<i32>, ValidationError> {
    if value.is_empty() || value == "null" {
        return Ok(None);
    }
    parse_int(field, value).map(Some)
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(field, value, "a boolean")),
    }
}

fn opt_text(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HpaId, NodePoolId, StagedHpa, StagedNodePool};

    fn staged_hpa() -> StagedResource {
        StagedHpa::new(
            HpaId::new("c", "ns", "api"),
            HpaValues {
                min_replicas: Some(1),
                max_replicas: 5,
                ..Default::default()
            },
        )
        .into()
    }

    fn staged_pool() -> StagedResource {
        StagedNodePool::new(
            NodePoolId::new("c", "np1"),
            "rg",
            "sub",
            NodePoolValues {
                node_count: 3,
                min_node_count: 2,
                max_node_count: 5,
                autoscaling_enabled: true,
            },
        )
        .into()
    }

    #[test]
    fn test_from_assignment_hpa() {
        assert_eq!(
            Edit::from_assignment(ResourceKind::Hpa, "max_replicas", "8"),
            Ok(Edit::Hpa(HpaEdit::MaxReplicas(8)))
        );
        assert_eq!(
            Edit::from_assignment(ResourceKind::Hpa, "cpu_request", ""),
            Ok(Edit::Hpa(HpaEdit::CpuRequest(None)))
        );
        assert_eq!(
            Edit::from_assignment(ResourceKind::Hpa, "perform_rollout", "yes"),
            Ok(Edit::Hpa(HpaEdit::PerformRollout(true)))
        );
    }

    #[test]
    fn test_from_assignment_node_pool() {
        assert_eq!(
            Edit::from_assignment(ResourceKind::NodePool, "order", "2"),
            Ok(Edit::NodePool(NodePoolEdit::SequenceOrder(Some(2))))
        );
        assert!(matches!(
            Edit::from_assignment(ResourceKind::NodePool, "order", "-1"),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_from_assignment_errors() {
        assert!(matches!(
            Edit::from_assignment(ResourceKind::Hpa, "node_count", "3"),
            Err(ValidationError::UnknownField { .. })
        ));
        assert!(matches!(
            Edit::from_assignment(ResourceKind::Hpa, "max_replicas", "many"),
            Err(ValidationError::InvalidValue { .. })
        ));
        assert!(matches!(
            Edit::from_assignment(ResourceKind::NodePool, "autoscaling_enabled", "maybe"),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_apply_edits_commits_all() {
        let mut resource = staged_hpa();
        apply_edits(
            &mut resource,
            vec![
                HpaEdit::MaxReplicas(10).into(),
                HpaEdit::MinReplicas(Some(4)).into(),
            ],
        )
        .unwrap();

        let StagedResource::Hpa(hpa) = resource else {
            panic!("expected hpa");
        };
        assert_eq!(hpa.current.max_replicas, 10);
        assert_eq!(hpa.current.min_replicas, Some(4));
        assert_eq!(hpa.original.max_replicas, 5);
    }

    #[test]
    fn test_apply_edits_rejects_atomically() {
        let mut resource = staged_hpa();
        let before = resource.clone();
        let err = apply_edits(
            &mut resource,
            vec![
                HpaEdit::TargetCpu(Some(50)).into(),
                HpaEdit::MinReplicas(Some(9)).into(),
            ],
        )
        .unwrap_err();

        assert!(matches!(err, ValidationError::MinExceedsMax { .. }));
        assert_eq!(resource, before);
    }

    #[test]
    fn test_apply_edits_ignores_untouched_cluster_quantities() {
        let mut resource: StagedResource = StagedHpa::new(
            HpaId::new("c", "ns", "api"),
            HpaValues {
                min_replicas: Some(1),
                max_replicas: 5,
                memory_request: Some("1073741824".into()),
                memory_limit: Some("1.5Gi".into()),
                ..Default::default()
            },
        )
        .into();

        apply_edits(&mut resource, vec![HpaEdit::MaxReplicas(8).into()]).unwrap();
        let StagedResource::Hpa(hpa) = &resource else {
            panic!("expected hpa");
        };
        assert_eq!(hpa.current.max_replicas, 8);
        assert_eq!(hpa.current.memory_limit.as_deref(), Some("1.5Gi"));

        let err = apply_edits(
            &mut resource,
            vec![HpaEdit::MemoryLimit(Some("lots".into())).into()],
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::Quantity { field: "memory_limit", .. }));

        let err = apply_edits(
            &mut resource,
            vec![HpaEdit::MemoryLimit(Some("512Mi".into())).into()],
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::RequestExceedsLimit { .. }));
    }

    #[test]
    fn test_apply_edits_kind_mismatch() {
        let mut resource = staged_pool();
        let err = apply_edits(&mut resource, vec![HpaEdit::MaxReplicas(3).into()]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::KindMismatch {
                expected: ResourceKind::NodePool,
                found: ResourceKind::Hpa,
            }
        );
    }

    #[test]
    fn test_apply_edits_sequence_order() {
        let mut resource = staged_pool();
        apply_edits(&mut resource, vec![NodePoolEdit::SequenceOrder(Some(1)).into()]).unwrap();
        assert_eq!(resource.sequence_order(), Some(1));

        apply_edits(&mut resource, vec![NodePoolEdit::SequenceOrder(Some(0)).into()]).unwrap();
        assert_eq!(resource.sequence_order(), None);
    }
}
