//! Validation of staged values
//!
//! Validation runs on the candidate produced by an edit, before the edit is
//! committed to the ledger. A rejected edit leaves `current` untouched.

use crate::types::{HpaValues, NodePoolValues, ResourceKind};
use regex::Regex;
use std::sync::LazyLock;

static CPU_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+\.?\d*|\.\d+)m?$").expect("CPU quantity pattern is valid")
});

static MEMORY_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(Mi|Gi|M|G|Ki|K|Ti|T|Pi|P|Ei|E)?$").expect("memory quantity pattern is valid")
});

/// A rejected edit or a malformed staged value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        field: &'static str,
        value: i64,
        min: i64,
    },

    #[error("{min_field} ({min}) cannot be greater than {max_field} ({max})")]
    MinExceedsMax {
        min_field: &'static str,
        max_field: &'static str,
        min: i64,
        max: i64,
    },

    #[error("{field} must be between 1 and 100, got {value}")]
    Percentage { field: &'static str, value: i64 },

    #[error("{field}: invalid quantity '{value}' ({reason})")]
    Quantity {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{request_field} ({request}) cannot be greater than {limit_field} ({limit})")]
    RequestExceedsLimit {
        request_field: &'static str,
        limit_field: &'static str,
        request: String,
        limit: String,
    },

    #[error("cannot apply a {found} edit to a {expected} resource")]
    KindMismatch {
        expected: ResourceKind,
        found: ResourceKind,
    },

    #[error("unknown {kind} field '{field}'")]
    UnknownField { kind: ResourceKind, field: String },

    #[error("{field}: cannot parse '{value}' as {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },
}

/// Validate HPA values
pub fn validate_hpa(values: &HpaValues) -> Result<(), ValidationError> {
    check_hpa(values, None)
}

/// Validate HPA values produced by an edit of `baseline`
///
/// Replica and target rules cover the whole candidate. Resource quantities
/// are only checked where they differ from the baseline, so a value read
/// back from the cluster never blocks an unrelated edit.
pub fn validate_hpa_change(
    baseline: &HpaValues,
    candidate: &HpaValues,
) -> Result<(), ValidationError> {
    check_hpa(candidate, Some(baseline))
}

fn check_hpa(values: &HpaValues, baseline: Option<&HpaValues>) -> Result<(), ValidationError> {
    if let Some(min) = values.min_replicas {
        at_least("min_replicas", min, 0)?;
    }
    at_least("max_replicas", values.max_replicas, 1)?;
    if let Some(min) = values.min_replicas {
        ordered("min_replicas", min, "max_replicas", values.max_replicas)?;
    }

    if let Some(cpu) = values.target_cpu {
        percentage("target_cpu", cpu)?;
    }
    if let Some(memory) = values.target_memory {
        percentage("target_memory", memory)?;
    }

    let cpu_request = edited(values, baseline, |v| v.cpu_request.as_deref());
    let cpu_limit = edited(values, baseline, |v| v.cpu_limit.as_deref());
    let memory_request = edited(values, baseline, |v| v.memory_request.as_deref());
    let memory_limit = edited(values, baseline, |v| v.memory_limit.as_deref());

    cpu_quantity("cpu_request", cpu_request)?;
    cpu_quantity("cpu_limit", cpu_limit)?;
    memory_quantity("memory_request", memory_request)?;
    memory_quantity("memory_limit", memory_limit)?;

    if cpu_request.is_some() || cpu_limit.is_some() {
        within_limit(
            ("cpu_request", values.cpu_request.as_deref()),
            ("cpu_limit", values.cpu_limit.as_deref()),
            parse_cpu_millicores,
        )?;
    }
    if memory_request.is_some() || memory_limit.is_some() {
        within_limit(
            ("memory_request", values.memory_request.as_deref()),
            ("memory_limit", values.memory_limit.as_deref()),
            parse_memory_bytes,
        )?;
    }

    Ok(())
}

/// The quantity to check: set, and changed when there is a baseline
fn edited<'a>(
    values: &'a HpaValues,
    baseline: Option<&HpaValues>,
    pick: fn(&HpaValues) -> Option<&str>,
) -> Option<&'a str> {
    let value = pick(values).filter(|v| !v.is_empty());
    let unchanged = baseline.is_some_and(|b| pick(b).filter(|v| !v.is_empty()) == value);
    if unchanged { None } else { value }
}

/// A request may not exceed its limit; skipped unless both sides parse
fn within_limit<T: PartialOrd>(
    (request_field, request): (&'static str, Option<&str>),
    (limit_field, limit): (&'static str, Option<&str>),
    parse: fn(&str) -> Option<T>,
) -> Result<(), ValidationError> {
    let (Some(request), Some(limit)) = (request, limit) else {
        return Ok(());
    };
    if let (Some(req), Some(lim)) = (parse(request), parse(limit))
        && req > lim
    {
        return Err(ValidationError::RequestExceedsLimit {
            request_field,
            limit_field,
            request: request.to_string(),
            limit: limit.to_string(),
        });
    }
    Ok(())
}

/// Validate node pool values
///
/// Bounds only matter while autoscaling is enabled; a manually scaled pool
/// just needs non-negative counts.
pub fn validate_node_pool(values: &NodePoolValues) -> Result<(), ValidationError> {
    at_least("node_count", values.node_count, 0)?;
    at_least("min_node_count", values.min_node_count, 0)?;
    at_least("max_node_count", values.max_node_count, 0)?;

    if values.autoscaling_enabled {
        at_least("max_node_count", values.max_node_count, 1)?;
        ordered(
            "min_node_count",
            values.min_node_count,
            "max_node_count",
            values.max_node_count,
        )?;
    }

    Ok(())
}

/// Validate a CPU quantity such as `500m` or `1.5`; empty means unset
pub fn cpu_quantity(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(());
    };

    let caps = CPU_QUANTITY.captures(value).ok_or_else(|| ValidationError::Quantity {
        field,
        value: value.to_string(),
        reason: "expected e.g. 500m or 1.5",
    })?;

    let amount: f64 = caps[1].parse().unwrap_or(0.0);
    if amount <= 0.0 {
        return Err(ValidationError::Quantity {
            field,
            value: value.to_string(),
            reason: "must be positive",
        });
    }

    Ok(())
}

/// Validate a memory quantity such as `256Mi` or `1G`; empty means unset
pub fn memory_quantity(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(());
    };

    let caps = MEMORY_QUANTITY
        .captures(value)
        .ok_or_else(|| ValidationError::Quantity {
            field,
            value: value.to_string(),
            reason: "expected e.g. 256Mi or 1Gi",
        })?;

    if caps[1].bytes().all(|b| b == b'0') {
        return Err(ValidationError::Quantity {
            field,
            value: value.to_string(),
            reason: "must be positive",
        });
    }

    Ok(())
}

/// Millicores of a CPU quantity: `500m` is 500, `1.5` is 1500
pub fn parse_cpu_millicores(value: &str) -> Option<f64> {
    let caps = CPU_QUANTITY.captures(value)?;
    let amount: f64 = caps[1].parse().ok()?;
    if value.ends_with('m') {
        Some(amount)
    } else {
        Some(amount * 1000.0)
    }
}

/// Bytes of a memory quantity: binary suffixes step by 1024, decimal ones
/// by 1000, and a bare number is already bytes
pub fn parse_memory_bytes(value: &str) -> Option<u64> {
    let caps = MEMORY_QUANTITY.captures(value)?;
    let amount: u64 = caps[1].parse().ok()?;
    let factor: u64 = match caps.get(2).map_or("", |m| m.as_str()) {
        "" => 1,
        "K" => 1000,
        "M" => 1000_u64.pow(2),
        "G" => 1000_u64.pow(3),
        "T" => 1000_u64.pow(4),
        "P" => 1000_u64.pow(5),
        "E" => 1000_u64.pow(6),
        "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        "Ti" => 1 << 40,
        "Pi" => 1 << 50,
        "Ei" => 1 << 60,
        _ => return None,
    };
    amount.checked_mul(factor)
}

fn at_least(field: &'static str, value: i32, min: i32) -> Result<(), ValidationError> {
    if value < min {
        return Err(ValidationError::BelowMinimum {
            field,
            value: value.into(),
            min: min.into(),
        });
    }
    Ok(())
}

fn ordered(
    min_field: &'static str,
    min: i32,
    max_field: &'static str,
    max: i32,
) -> Result<(), ValidationError> {
    if min > max {
        return Err(ValidationError::MinExceedsMax {
            min_field,
            max_field,
            min: min.into(),
            max: max.into(),
        });
    }
    Ok(())
}

fn percentage(field: &'static str, value: i32) -> Result<(), ValidationError> {
    if !(1..=100).contains(&value) {
        return Err(ValidationError::Percentage {
            field,
            value: value.into(),
        });
    }
    Ok(())
}
