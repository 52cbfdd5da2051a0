//! Workflow execution - runs a step graph wave by wave

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::agent::AgentId;
use crate::error::{Result, SwarmError};
use crate::registry::Registry;
use crate::workflow::{AgentSelector, RunContext, StepSpec, StepStatus, WorkflowDefinition};

/// Performs a step's action for one target agent.
///
/// The engine owns scheduling, timeouts and aggregation; what an action means
/// is entirely up to the dispatcher.
#[async_trait]
pub trait StepDispatcher: Send + Sync {
    async fn dispatch(&self, target: &AgentId, step: &StepSpec, context: &RunContext)
        -> Result<Value>;
}

/// One target's failed contribution to a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetFailure {
    pub agent_id: AgentId,
    pub error: String,
}

/// How a single step ended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub succeeded: Vec<AgentId>,
    pub failures: Vec<TargetFailure>,
    pub elapsed_ms: u64,
}

impl StepOutcome {
    fn skipped() -> Self {
        Self {
            status: StepStatus::Skipped,
            succeeded: vec![],
            failures: vec![],
            elapsed_ms: 0,
        }
    }
}

/// Result of running a workflow to completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub workflow: String,
    /// Initial context plus the output of every done step, keyed by step name
    pub context: RunContext,
    pub steps: BTreeMap<String, StepOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// Final status of a step
    pub fn status(&self, step: &str) -> Option<StepStatus> {
        self.steps.get(step).map(|o| o.status)
    }

    /// Output of a done step; absent for skipped or failed steps
    pub fn output(&self, step: &str) -> Option<&Value> {
        self.context.get(step)
    }
}

/// Executes workflow definitions against the registry's agents
pub struct WorkflowEngine {
    registry: Arc<Registry>,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Run every step of `definition` to a terminal status.
    ///
    /// Waves run strictly one after another. Inside a wave, parallel steps are
    /// dispatched together while the remaining steps run one at a time in
    /// declaration order; the wave ends when all of them are terminal.
    #[instrument(skip_all, fields(workflow = %definition.name))]
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        initial: RunContext,
        dispatcher: &dyn StepDispatcher,
    ) -> WorkflowRun {
        let started_at = Utc::now();
        let mut context = initial;
        let mut outcomes: BTreeMap<String, StepOutcome> = BTreeMap::new();

        info!(steps = definition.steps().len(), waves = definition.wave_count(), "Workflow started");

        for wave in definition.waves() {
            let mut parallel = Vec::new();
            let mut sequential = Vec::new();

            for step in wave {
                if !step.condition.evaluate(&context) {
                    debug!(step = %step.name, condition = %step.condition, "Condition false, skipping");
                    outcomes.insert(step.name.clone(), StepOutcome::skipped());
                    continue;
                }
                if step.parallel {
                    parallel.push(step);
                } else {
                    sequential.push(step);
                }
            }

            let snapshot = &context;
            let parallel_run = join_all(
                parallel
                    .iter()
                    .map(|step| self.execute_step(step, snapshot, dispatcher)),
            );
            let sequential_run = async {
                let mut results = Vec::with_capacity(sequential.len());
                for step in &sequential {
                    results.push(self.execute_step(step, snapshot, dispatcher).await);
                }
                results
            };
            let (parallel_results, sequential_results) = tokio::join!(parallel_run, sequential_run);

            for (step, (outcome, output)) in parallel
                .iter()
                .zip(parallel_results)
                .chain(sequential.iter().zip(sequential_results))
            {
                if let Some(output) = output {
                    if let Some(proposer) = output.get("proposer").and_then(Value::as_str) {
                        context.insert("proposer".into(), Value::String(proposer.to_string()));
                    }
                    context.insert(step.name.clone(), output);
                }
                outcomes.insert(step.name.clone(), outcome);
            }
        }

        debug_assert_eq!(outcomes.len(), definition.steps().len());
        info!(
            done = outcomes.values().filter(|o| o.status == StepStatus::Done).count(),
            skipped = outcomes.values().filter(|o| o.status == StepStatus::Skipped).count(),
            failed = outcomes.values().filter(|o| o.status == StepStatus::Failed).count(),
            "Workflow finished"
        );

        WorkflowRun {
            workflow: definition.name.clone(),
            context,
            steps: outcomes,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn resolve_targets(&self, selector: AgentSelector, context: &RunContext) -> Vec<AgentId> {
        match selector {
            AgentSelector::All => self.registry.ids(),
            AgentSelector::MaxBelief => self.registry.max_belief().into_iter().collect(),
            AgentSelector::Proposer => context
                .get("proposer")
                .and_then(Value::as_str)
                .map(AgentId::from)
                .filter(|id| self.registry.contains(id))
                .into_iter()
                .collect(),
        }
    }

    /// Dispatch one step to its targets, each call under the step's deadline
    async fn execute_step(
        &self,
        step: &StepSpec,
        context: &RunContext,
        dispatcher: &dyn StepDispatcher,
    ) -> (StepOutcome, Option<Value>) {
        let start = Instant::now();
        let targets = self.resolve_targets(step.agent_selector, context);
        let deadline = step.timeout_duration();

        debug!(step = %step.name, action = %step.action, targets = targets.len(), "Dispatching step");

        let calls = targets.iter().map(|target| async move {
            let result = match tokio::time::timeout(deadline, dispatcher.dispatch(target, step, context)).await {
                Ok(result) => result,
                Err(_) => Err(SwarmError::Timeout {
                    target: format!("{}@{}", step.name, target),
                    millis: step.timeout_ms,
                }),
            };
            (target.clone(), result)
        });
        let results = join_all(calls).await;

        let mut succeeded = Vec::new();
        let mut failures = Vec::new();
        let mut values = Map::new();
        for (target, result) in results {
            match result {
                Ok(value) => {
                    succeeded.push(target.clone());
                    values.insert(target.to_string(), value);
                }
                Err(e) => {
                    warn!(step = %step.name, agent_id = %target, error = %e, "Step target failed");
                    failures.push(TargetFailure {
                        agent_id: target,
                        error: e.to_string(),
                    });
                }
            }
        }

        let status = if succeeded.is_empty() {
            StepStatus::Failed
        } else {
            StepStatus::Done
        };
        let output = match (status, step.agent_selector) {
            (StepStatus::Failed, _) => None,
            (_, AgentSelector::All) => Some(Value::Object(values)),
            (_, _) => values.into_iter().next().map(|(_, v)| v),
        };

        let outcome = StepOutcome {
            status,
            succeeded,
            failures,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        debug!(step = %step.name, status = ?outcome.status, elapsed_ms = outcome.elapsed_ms, "Step complete");
        (outcome, output)
    }
}
