//! Apply calls for HPAs and node pools.

use crate::client::{Client, Config, remote_error};
use crate::error::Error;
use serde::Serialize;
use staging::{
    GroupApplyResponse, HpaId, HpaValues, NodePoolOperation, NodePoolTarget, NodePoolValues,
    ResourceApi,
};

/// [`ResourceApi`] over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpResourceApi {
    client: Client,
}

impl HttpResourceApi {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// Create an API client with a custom base (for testing).
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            client: Client::with_api_base(api_base),
        }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl ResourceApi for HttpResourceApi {
    fn apply_hpa(&self, id: &HpaId, values: &HpaValues) -> anyhow::Result<()> {
        let url = self
            .client
            .url("hpas", &[&id.cluster, &id.namespace, &id.name])?;
        self.client.put(&url, None, &HpaUpdate::new(id, values))?;
        log::info!("applied HPA {}/{}/{}", id.cluster, id.namespace, id.name);
        Ok(())
    }

    fn apply_node_pool(&self, target: &NodePoolTarget, values: &NodePoolValues) -> anyhow::Result<()> {
        let url = self.client.url(
            "nodepools",
            &[&target.cluster, &target.resource_group, &target.name],
        )?;
        self.client.put(&url, None, &NodePoolUpdate::from(values))?;
        log::info!("applied node pool {}/{}", target.cluster, target.name);
        Ok(())
    }

    fn apply_node_pool_group(
        &self,
        cluster: &str,
        operations: &[NodePoolOperation],
    ) -> anyhow::Result<GroupApplyResponse> {
        let url = self.client.url("nodepools/apply-sequential", &[])?;
        let body = GroupRequest {
            cluster,
            node_pools: operations,
        };
        let (status, value) = self.client.post_raw(&url, &body)?;
        let response = group_response(status, value)?;
        log::info!(
            "sequential apply on {cluster}: {} pool(s), success={}",
            operations.len(),
            response.success
        );
        Ok(response)
    }
}

/// Interpret a group call reply.
///
/// A failed group is still a well-formed reply: it carries the per-pool
/// results reached so far, so any body with a `success` flag is returned.
fn group_response(status: u16, value: Option<serde_json::Value>) -> Result<GroupApplyResponse, Error> {
    match value {
        Some(value) if value.get("success").is_some() => Ok(serde_json::from_value(value)?),
        Some(value) => Err(remote_error(status, &value)),
        None => Err(Error::Remote {
            status,
            code: None,
            message: format!("HTTP {status}: empty or non-JSON group response"),
        }),
    }
}

// =============================================================================
// Request bodies
// =============================================================================

#[derive(Debug, Serialize)]
struct HpaUpdate<'a> {
    name: &'a str,
    namespace: &'a str,
    cluster: &'a str,
    min_replicas: Option<i32>,
    max_replicas: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_cpu: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_memory: Option<i32>,
    perform_rollout: bool,
    perform_daemonset_rollout: bool,
    perform_statefulset_rollout: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    deployment_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_cpu_request: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_cpu_limit: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_memory_request: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_memory_limit: Option<&'a str>,
}

impl<'a> HpaUpdate<'a> {
    fn new(id: &'a HpaId, values: &'a HpaValues) -> Self {
        // Empty quantities mean "leave as is"
        let text = |v: &'a Option<String>| v.as_deref().filter(|s| !s.is_empty());
        Self {
            name: &id.name,
            namespace: &id.namespace,
            cluster: &id.cluster,
            min_replicas: values.min_replicas,
            max_replicas: values.max_replicas,
            target_cpu: values.target_cpu,
            target_memory: values.target_memory,
            perform_rollout: values.perform_rollout,
            perform_daemonset_rollout: values.perform_daemonset_rollout,
            perform_statefulset_rollout: values.perform_statefulset_rollout,
            deployment_name: text(&values.deployment_name),
            target_cpu_request: text(&values.cpu_request),
            target_cpu_limit: text(&values.cpu_limit),
            target_memory_request: text(&values.memory_request),
            target_memory_limit: text(&values.memory_limit),
        }
    }
}

#[derive(Debug, Serialize)]
struct NodePoolUpdate {
    node_count: i32,
    min_node_count: i32,
    max_node_count: i32,
    autoscaling_enabled: bool,
}

impl From<&NodePoolValues> for NodePoolUpdate {
    fn from(v: &NodePoolValues) -> Self {
        Self {
            node_count: v.node_count,
            min_node_count: v.min_node_count,
            max_node_count: v.max_node_count,
            autoscaling_enabled: v.autoscaling_enabled,
        }
    }
}

#[derive(Debug, Serialize)]
struct GroupRequest<'a> {
    cluster: &'a str,
    node_pools: &'a [NodePoolOperation],
}
