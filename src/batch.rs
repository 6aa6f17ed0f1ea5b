//! Batch Orchestrator
//!
//! Coordinates resource-group creation and the concurrent fan-out of
//! provisioning tasks. Concurrency is semaphore-gated: the management API
//! enforces per-hour write quotas and throttles aggressively, so launching
//! all N tasks at once is a correctness hazard, not a tuning knob. The run
//! waits for every task to settle; no task cancels or blocks a sibling.

use crate::error::{ProvisionError, RemoteErrorKind};
use crate::namer;
use crate::provision::{provision_account, ConnectionDescriptor, KeySelection, Outcome, TaskSpec};
use crate::remote::{AccountKind, RemoteClient, SkuName};
use crate::retry::{retry, RetryPolicy};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_CONCURRENCY: usize = 20;

/// Shortest and longest storage account names the service accepts.
const ACCOUNT_NAME_MIN: usize = 3;
const ACCOUNT_NAME_MAX: usize = 24;

/// Immutable description of one batch run.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub resource_group: String,
    pub location: String,
    pub name_prefix: String,
    pub count: usize,
    /// Zero-padding width for the slot suffix; 0 means unpadded.
    pub digit_width: usize,
    pub sku: SkuName,
    pub kind: AccountKind,
    pub max_concurrency: usize,
    pub key_selection: KeySelection,
    /// Optional wall-clock bound on the whole fan-out. Slots that have not
    /// settled when it elapses are recorded as failures, never dropped.
    pub deadline: Option<Duration>,
}

impl BatchRequest {
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.count < 1 {
            return Err(ProvisionError::InvalidRequest(
                "count must be at least 1".to_string(),
            ));
        }
        if self.max_concurrency < 1 {
            return Err(ProvisionError::InvalidRequest(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.name_prefix.is_empty() {
            return Err(ProvisionError::InvalidRequest(
                "name_prefix must not be empty".to_string(),
            ));
        }
        if !self
            .name_prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ProvisionError::InvalidRequest(format!(
                "name_prefix '{}' must be lowercase letters and digits only",
                self.name_prefix
            )));
        }
        let longest = namer::account_name(&self.name_prefix, self.count - 1, self.digit_width);
        if longest.len() < ACCOUNT_NAME_MIN || longest.len() > ACCOUNT_NAME_MAX {
            return Err(ProvisionError::InvalidRequest(format!(
                "generated name '{}' is outside the {ACCOUNT_NAME_MIN}-{ACCOUNT_NAME_MAX} character range",
                longest
            )));
        }
        Ok(())
    }

    /// Artifact key for one slot, e.g. `ConnectionString07` at width 2.
    pub fn slot_key(&self, slot: usize) -> String {
        format!("ConnectionString{}", namer::padded_slot(slot, self.digit_width))
    }

    /// Generated account name for one slot.
    pub fn slot_name(&self, slot: usize) -> String {
        namer::account_name(&self.name_prefix, slot, self.digit_width)
    }
}

/// Batch lifecycle states. `Failed` is reached only from `GroupEnsuring`;
/// individual slot failures still end in `Settled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    GroupEnsuring,
    GroupReady,
    Provisioning,
    Settled,
    Failed,
}

/// One slot that did not produce a connection descriptor.
#[derive(Debug, Clone)]
pub struct SlotFailure {
    pub slot: usize,
    pub account_name: String,
    pub kind: RemoteErrorKind,
    pub message: String,
}

/// Aggregate of one batch run. Written concurrently (behind a lock) while
/// tasks settle, read-only afterwards, consumed once by the serializer.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    connections: BTreeMap<String, ConnectionDescriptor>,
    failures: Vec<SlotFailure>,
    settled: HashSet<usize>,
}

impl BatchOutcome {
    pub fn record_success(&mut self, slot: usize, key: String, descriptor: ConnectionDescriptor) {
        if self.settled.insert(slot) {
            self.connections.insert(key, descriptor);
        }
    }

    pub fn record_failure(&mut self, failure: SlotFailure) {
        if self.settled.insert(failure.slot) {
            self.failures.push(failure);
        }
    }

    pub fn is_settled(&self, slot: usize) -> bool {
        self.settled.contains(&slot)
    }

    /// Successful slots, keyed by artifact key in ascending order.
    pub fn connections(&self) -> &BTreeMap<String, ConnectionDescriptor> {
        &self.connections
    }

    pub fn failures(&self) -> &[SlotFailure] {
        &self.failures
    }

    /// Total settled slots, success or failure.
    pub fn len(&self) -> usize {
        self.settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }
}

/// Runs one batch: ensure the resource group, fan out the provisioning
/// tasks under the concurrency ceiling, settle, hand back the aggregate.
pub struct Orchestrator {
    client: Arc<dyn RemoteClient>,
    policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn RemoteClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Idempotent create-or-update of the batch's resource group. Failure
    /// here is fatal to the whole batch: no tasks are launched without it.
    pub async fn ensure_resource_group(&self, request: &BatchRequest) -> Result<(), ProvisionError> {
        retry(&self.policy, "create_or_update_resource_group", || {
            self.client
                .create_or_update_resource_group(&request.resource_group, &request.location)
        })
        .await
        .map_err(|source| ProvisionError::ResourceGroup {
            name: request.resource_group.clone(),
            source,
        })
    }

    /// Run the batch end to end through its state machine.
    pub async fn run(&self, request: &BatchRequest) -> Result<BatchOutcome, ProvisionError> {
        request.validate()?;
        let mut state = BatchState::Pending;

        state = self.transition(state, BatchState::GroupEnsuring, request);
        if let Err(err) = self.ensure_resource_group(request).await {
            self.transition(state, BatchState::Failed, request);
            error!(resource_group = %request.resource_group, error = %err, "batch aborted");
            return Err(err);
        }
        state = self.transition(state, BatchState::GroupReady, request);

        state = self.transition(state, BatchState::Provisioning, request);
        let outcome = self.run_batch(request).await;
        self.transition(state, BatchState::Settled, request);

        info!(
            successes = outcome.connections().len(),
            failures = outcome.failures().len(),
            "batch settled"
        );
        Ok(outcome)
    }

    fn transition(&self, from: BatchState, to: BatchState, request: &BatchRequest) -> BatchState {
        debug!(?from, ?to, resource_group = %request.resource_group, "batch state change");
        to
    }

    /// Fan out `count` provisioning tasks, at most `max_concurrency` in
    /// flight, and wait for all of them. Every slot settles exactly once.
    pub async fn run_batch(&self, request: &BatchRequest) -> BatchOutcome {
        let outcome = Arc::new(Mutex::new(BatchOutcome::default()));
        let semaphore = Arc::new(Semaphore::new(request.max_concurrency));
        let spec = Arc::new(TaskSpec {
            resource_group: request.resource_group.clone(),
            location: request.location.clone(),
            sku: request.sku,
            kind: request.kind,
            key_selection: request.key_selection.clone(),
        });

        let mut tasks = JoinSet::new();
        for slot in 0..request.count {
            let account_name = request.slot_name(slot);
            let slot_key = request.slot_key(slot);
            let client = Arc::clone(&self.client);
            let policy = self.policy.clone();
            let spec = Arc::clone(&spec);
            let semaphore = Arc::clone(&semaphore);
            let outcome = Arc::clone(&outcome);

            tasks.spawn(async move {
                let permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return, // semaphore closed: the batch is being torn down
                };
                let result =
                    provision_account(client.as_ref(), &policy, &spec, slot, account_name).await;
                drop(permit);

                let mut aggregate = outcome.lock();
                match result.outcome {
                    Outcome::Success(descriptor) => {
                        aggregate.record_success(result.slot, slot_key, descriptor);
                    }
                    Outcome::Failure { kind, message } => {
                        warn!(account = %result.account_name, %kind, "slot failed");
                        aggregate.record_failure(SlotFailure {
                            slot: result.slot,
                            account_name: result.account_name,
                            kind,
                            message,
                        });
                    }
                }
            });
        }

        match request.deadline {
            None => Self::drain(&mut tasks).await,
            Some(deadline) => {
                if tokio::time::timeout(deadline, Self::drain(&mut tasks)).await.is_err() {
                    warn!(?deadline, "batch deadline elapsed, recording unfinished slots");
                    tasks.abort_all();
                    Self::drain(&mut tasks).await;
                    let mut aggregate = outcome.lock();
                    for slot in 0..request.count {
                        if !aggregate.is_settled(slot) {
                            aggregate.record_failure(SlotFailure {
                                slot,
                                account_name: request.slot_name(slot),
                                kind: RemoteErrorKind::Transient,
                                message: format!(
                                    "batch deadline of {deadline:?} elapsed before the task settled"
                                ),
                            });
                        }
                    }
                }
            }
        }

        // All tasks joined; the aggregate is ours alone from here on.
        Arc::try_unwrap(outcome)
            .map(Mutex::into_inner)
            .unwrap_or_else(|shared| shared.lock().clone())
    }

    async fn drain(tasks: &mut JoinSet<()>) {
        while tasks.join_next().await.is_some() {}
    }
}
