//! Apply orchestrator - drives staged changes to the remote API
//!
//! Independent items (every HPA and every node pool without a sequence
//! order) are applied one call each, isolated from each other's failures.
//! Node pools with a sequence order are sent group by group, in ascending
//! order, through the group endpoint; a failed group halts the groups after
//! it but never touches independent items.

use crate::api::ResourceApi;
use crate::context::{ConfirmCallback, ProgressCallback};
use crate::ledger::Ledger;
use crate::types::{
    ApplyState, ApplyStatus, GroupApplyResponse, HpaId, HpaValues, NodePoolOperation,
    NodePoolTarget, NodePoolValues, ResourceId, StagedResource,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

const APPLIED: &str = "applied successfully";
const GROUP_FAILED: &str = "sequential apply failed";

/// Options for apply cycles
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Concurrent calls for independent items; 1 issues them one at a time
    pub jobs: usize,
    /// Remove successfully applied entries from the ledger
    pub prune_applied: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            prune_applied: false,
        }
    }
}

/// Errors refusing an orchestrator operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("{count} resource(s) still applying")]
    Busy { count: usize },

    #[error("{0} is not staged")]
    NotStaged(ResourceId),

    #[error("failed to create apply thread pool: {0}")]
    ThreadPool(String),
}

/// Outcome of an apply cycle, folded from the final apply states
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Left idle because an earlier sequence group failed
    pub skipped: usize,
    /// Final state per touched identity, in submission order
    pub outcomes: Vec<(ResourceId, ApplyState)>,
}

impl ApplySummary {
    /// Fold the states of `ids` as they are now
    pub fn from_states(ids: &[ResourceId], states: &HashMap<ResourceId, ApplyState>) -> Self {
        let mut summary = Self::default();
        for id in ids {
            let state = states.get(id).cloned().unwrap_or_default();
            match state.status {
                ApplyStatus::Success => summary.succeeded += 1,
                ApplyStatus::Error => summary.failed += 1,
                ApplyStatus::Idle | ApplyStatus::Applying => summary.skipped += 1,
            }
            summary.outcomes.push((id.clone(), state));
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Work for one independent call
#[derive(Debug, Clone)]
enum Work {
    Hpa {
        id: HpaId,
        values: HpaValues,
    },
    NodePool {
        target: NodePoolTarget,
        values: NodePoolValues,
    },
}

impl Work {
    fn of(resource: &StagedResource) -> Self {
        match resource {
            StagedResource::Hpa(h) => Self::Hpa {
                id: h.id.clone(),
                values: h.current.clone(),
            },
            StagedResource::NodePool(p) => Self::NodePool {
                target: p.target(),
                values: p.current,
            },
        }
    }

    fn run<A: ResourceApi>(&self, api: &A) -> Result<(), String> {
        let result = match self {
            Self::Hpa { id, values } => api.apply_hpa(id, values),
            Self::NodePool { target, values } => api.apply_node_pool(target, values),
        };
        result.map_err(|e| e.to_string())
    }
}

/// Node pools sharing a cluster and a sequence order
#[derive(Debug)]
struct Group {
    cluster: String,
    order: u32,
    first_position: usize,
    members: Vec<(ResourceId, NodePoolOperation)>,
}

/// Drives apply cycles against a [`ResourceApi`]
pub struct Orchestrator<A: ResourceApi> {
    api: A,
    opts: ApplyOptions,
    dropped: HashSet<ResourceId>,
}

impl<A: ResourceApi> Orchestrator<A> {
    pub fn new(api: A, opts: ApplyOptions) -> Self {
        Self {
            api,
            opts,
            dropped: HashSet::new(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Drop an identity from the active apply set
    ///
    /// Its apply state is left as it is, so an already successful apply is
    /// not reverted. Returns `false` if it was already dropped.
    pub fn remove_from_pending(&mut self, id: &ResourceId) -> bool {
        log::debug!("dropping {id} from the apply set");
        self.dropped.insert(id.clone())
    }

    pub fn is_dropped(&self, id: &ResourceId) -> bool {
        self.dropped.contains(id)
    }

    /// Confirm, then apply every pending identity
    ///
    /// A declined confirmation applies nothing and reports every item as
    /// skipped.
    pub fn execute<P, C>(
        &mut self,
        ledger: &mut Ledger,
        pending: &[ResourceId],
        progress: &mut P,
        confirm: &mut C,
    ) -> anyhow::Result<ApplySummary>
    where
        P: ProgressCallback,
        C: ConfirmCallback,
    {
        let active = self.active(ledger, pending);
        if active.is_empty() {
            return Ok(ApplySummary::default());
        }

        if !confirm.confirm(&format!("Apply {} change(s)?", active.len()))? {
            return Ok(ApplySummary {
                skipped: active.len(),
                ..Default::default()
            });
        }

        Ok(self.apply_all(ledger, pending, progress)?)
    }

    /// Apply every pending identity that is staged and not dropped
    pub fn apply_all<P: ProgressCallback>(
        &mut self,
        ledger: &mut Ledger,
        pending: &[ResourceId],
        progress: &mut P,
    ) -> Result<ApplySummary, OrchestratorError> {
        let active = self.active(ledger, pending);
        self.ensure_idle(ledger, &active)?;

        for id in &active {
            ledger.apply_states.insert(id.clone(), ApplyState::idle());
        }

        let (independent, groups) = partition(ledger, &active);

        if !independent.is_empty() {
            progress.on_batch_start("independent", independent.len());
            self.apply_independent(&mut ledger.apply_states, &independent, progress)?;
            progress.on_batch_complete();
        }

        let mut halted = false;
        for group in &groups {
            if halted {
                log::warn!(
                    "skipping sequence group {} on {} after an earlier failure",
                    group.order,
                    group.cluster
                );
                continue;
            }
            progress.on_batch_start(
                &format!("sequence {} on {}", group.order, group.cluster),
                group.members.len(),
            );
            halted = !self.apply_group(&mut ledger.apply_states, group, progress);
            progress.on_batch_complete();
        }

        let summary = ApplySummary::from_states(&active, &ledger.apply_states);
        if self.opts.prune_applied {
            prune_succeeded(ledger, &active);
        }

        log::info!(
            "apply cycle finished: {} succeeded, {} failed, {} skipped",
            summary.succeeded,
            summary.failed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Apply one identity through the single-item API
    ///
    /// Sequence groups are bypassed, which makes this the manual retry path.
    /// A dropped identity is re-admitted.
    pub fn apply_one(
        &mut self,
        ledger: &mut Ledger,
        id: &ResourceId,
    ) -> Result<ApplyState, OrchestratorError> {
        let work = ledger
            .get(id)
            .map(Work::of)
            .ok_or_else(|| OrchestratorError::NotStaged(id.clone()))?;
        self.ensure_idle(ledger, std::slice::from_ref(id))?;
        self.dropped.remove(id);

        let state = ledger.apply_states.entry(id.clone()).or_default();
        state.begin();
        match work.run(&self.api) {
            Ok(()) => state.succeed(APPLIED),
            Err(message) => state.fail(message),
        };
        let state = state.clone();

        if self.opts.prune_applied && state.status == ApplyStatus::Success {
            ledger.remove(id);
        }
        Ok(state)
    }

    /// Close the current cycle
    ///
    /// Refused while anything is applying; otherwise forgets every apply
    /// state and re-admits dropped identities.
    pub fn finish_cycle(&mut self, ledger: &mut Ledger) -> Result<(), OrchestratorError> {
        let applying = ledger
            .apply_states
            .values()
            .filter(|s| s.status == ApplyStatus::Applying)
            .count();
        if applying > 0 {
            return Err(OrchestratorError::Busy { count: applying });
        }

        ledger.apply_states.clear();
        self.dropped.clear();
        Ok(())
    }

    /// Staged, non-dropped identities from `pending`, without duplicates
    fn active(&self, ledger: &Ledger, pending: &[ResourceId]) -> Vec<ResourceId> {
        let mut seen = HashSet::new();
        pending
            .iter()
            .filter(|id| {
                if !ledger.contains(id) {
                    log::warn!("{id} is not staged, skipping");
                    return false;
                }
                !self.dropped.contains(*id) && seen.insert((*id).clone())
            })
            .cloned()
            .collect()
    }

    fn ensure_idle(&self, ledger: &Ledger, ids: &[ResourceId]) -> Result<(), OrchestratorError> {
        let count = ids
            .iter()
            .filter(|id| {
                ledger
                    .apply_state(id)
                    .is_some_and(|s| s.status == ApplyStatus::Applying)
            })
            .count();
        if count > 0 {
            return Err(OrchestratorError::Busy { count });
        }
        Ok(())
    }

    fn apply_independent<P: ProgressCallback>(
        &self,
        states: &mut HashMap<ResourceId, ApplyState>,
        items: &[(ResourceId, Work)],
        progress: &mut P,
    ) -> Result<(), OrchestratorError> {
        if self.opts.jobs <= 1 || items.len() == 1 {
            for (id, work) in items {
                progress.on_resource_start(id);
                let state = states.entry(id.clone()).or_default();
                state.begin();
                match work.run(&self.api) {
                    Ok(()) => state.succeed(APPLIED),
                    Err(message) => {
                        log::warn!("{id}: {message}");
                        state.fail(message)
                    }
                };
                progress.on_resource_complete(id, state);
            }
            return Ok(());
        }

        // The progress callback is not shared across threads; start every
        // item up front and report completions after the batch.
        for (id, _) in items {
            progress.on_resource_start(id);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.opts.jobs)
            .build()
            .map_err(|e| OrchestratorError::ThreadPool(e.to_string()))?;

        {
            let shared = Mutex::new(&mut *states);
            pool.install(|| {
                items.par_iter().for_each(|(id, work)| {
                    with_state(&shared, id, ApplyState::begin);
                    let outcome = work.run(&self.api);
                    with_state(&shared, id, |state| match outcome {
                        Ok(()) => state.succeed(APPLIED),
                        Err(message) => {
                            log::warn!("{id}: {message}");
                            state.fail(message)
                        }
                    });
                });
            });
        }

        for (id, _) in items {
            if let Some(state) = states.get(id) {
                progress.on_resource_complete(id, state);
            }
        }
        Ok(())
    }

    /// Apply one sequence group; returns `false` if later groups must halt
    fn apply_group<P: ProgressCallback>(
        &self,
        states: &mut HashMap<ResourceId, ApplyState>,
        group: &Group,
        progress: &mut P,
    ) -> bool {
        for (id, _) in &group.members {
            progress.on_resource_start(id);
            states.entry(id.clone()).or_default().begin();
        }

        let operations: Vec<NodePoolOperation> =
            group.members.iter().map(|(_, op)| op.clone()).collect();
        let response = self
            .api
            .apply_node_pool_group(&group.cluster, &operations)
            .map_err(|e| e.to_string());

        let succeeded = matches!(&response, Ok(r) if r.success);
        for (id, op) in &group.members {
            let state = states.entry(id.clone()).or_default();
            match &response {
                Ok(r) if r.success => record_member(state, r, &op.name),
                Ok(r) => {
                    state.fail(group_failure_message(r, &op.name));
                }
                Err(message) => {
                    state.fail(message.clone());
                }
            }
            progress.on_resource_complete(id, state);
        }

        if !succeeded {
            log::warn!(
                "sequence group {} on {} failed, halting later groups",
                group.order,
                group.cluster
            );
        }
        succeeded
    }
}

/// Per-pool outcome inside a successful group response
///
/// A pool missing from `results` is covered by the overall success.
fn record_member(state: &mut ApplyState, response: &GroupApplyResponse, pool: &str) {
    match response.result_for(pool) {
        Some(item) if item.success => {
            state.succeed(item.message.clone().unwrap_or_else(|| APPLIED.to_string()));
        }
        Some(item) => {
            let message = item
                .error
                .clone()
                .or_else(|| item.message.clone())
                .unwrap_or_else(|| GROUP_FAILED.to_string());
            state.fail(message);
        }
        None => {
            state.succeed(
                response
                    .message
                    .clone()
                    .unwrap_or_else(|| APPLIED.to_string()),
            );
        }
    }
}

/// Message for a member of a failed group: its own failure, else the overall one
fn group_failure_message(response: &GroupApplyResponse, pool: &str) -> String {
    let own = response
        .result_for(pool)
        .filter(|item| !item.success)
        .and_then(|item| item.error.clone().or_else(|| item.message.clone()));
    own.or_else(|| response.error.as_ref().map(|e| e.message.clone()))
        .unwrap_or_else(|| GROUP_FAILED.to_string())
}

/// Split active identities into independent work and ordered groups
fn partition(ledger: &Ledger, active: &[ResourceId]) -> (Vec<(ResourceId, Work)>, Vec<Group>) {
    let mut independent = Vec::new();
    let mut groups: Vec<Group> = Vec::new();

    let mut ordered: Vec<(usize, &ResourceId)> = active
        .iter()
        .filter_map(|id| ledger.position(id).map(|pos| (pos, id)))
        .collect();
    ordered.sort_by_key(|(pos, _)| *pos);

    for (pos, id) in ordered {
        let Some(resource) = ledger.get(id) else {
            continue;
        };
        match resource {
            StagedResource::NodePool(pool) if pool.sequence_order.is_some() => {
                let order = pool.sequence_order.unwrap_or_default();
                let operation = NodePoolOperation {
                    name: pool.id.name.clone(),
                    autoscaling_enabled: pool.current.autoscaling_enabled,
                    node_count: pool.current.node_count,
                    min_node_count: pool.current.min_node_count,
                    max_node_count: pool.current.max_node_count,
                    order,
                };
                match groups
                    .iter_mut()
                    .find(|g| g.order == order && g.cluster == pool.id.cluster)
                {
                    Some(group) => group.members.push((id.clone(), operation)),
                    None => groups.push(Group {
                        cluster: pool.id.cluster.clone(),
                        order,
                        first_position: pos,
                        members: vec![(id.clone(), operation)],
                    }),
                }
            }
            other => independent.push((id.clone(), Work::of(other))),
        }
    }

    groups.sort_by_key(|g| (g.order, g.first_position));
    (independent, groups)
}

fn prune_succeeded(ledger: &mut Ledger, ids: &[ResourceId]) {
    for id in ids {
        if ledger
            .apply_state(id)
            .is_some_and(|s| s.status == ApplyStatus::Success)
        {
            ledger.remove(id);
        }
    }
}

fn with_state<F>(states: &Mutex<&mut HashMap<ResourceId, ApplyState>>, id: &ResourceId, f: F)
where
    F: FnOnce(&mut ApplyState) -> bool,
{
    let mut locked = match states.lock() {
        Ok(locked) => locked,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(locked.entry(id.clone()).or_default());
}
