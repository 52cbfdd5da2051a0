//! Swarm orchestrator - the facade over registry, messaging, consensus and workflows

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::agent::{AgentId, AgentState, RiskLevel};
use crate::capability::{
    Analysis, Analyzer, Ballot, Capabilities, Decision, DecisionRequest, Interpretation,
    Interpreter, RawInput,
};
use crate::config::SwarmConfig;
use crate::consensus::{ConsensusWorkflow, Proposal, ProposalId, Tally};
use crate::engine::{StepDispatcher, WorkflowEngine, WorkflowRun};
use crate::error::{Result, SwarmError};
use crate::protocol::{CommunicationProtocol, MessageType, Recipient};
use crate::registry::Registry;
use crate::workflow::{RunContext, StepSpec, WorkflowDefinition};

/// A symptom report for one village
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
}

/// Result of handing a report to a village agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOutcome {
    pub agent_id: AgentId,
    pub village: String,
    /// The capability's output, unmodified
    pub agent_response: Value,
    pub actions_taken: Vec<String>,
    pub state: AgentState,
    /// Neighbors alerted because the agent's risk became high or critical
    pub alerted: Vec<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<Interpretation>,
}

/// An agent's answer to a neighbor query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub agent_id: AgentId,
    pub response: Value,
    pub actions_taken: Vec<String>,
    pub risk_level: RiskLevel,
    pub belief: f64,
    pub anomaly_detected: bool,
}

/// What the neighbors say when read together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborSummary {
    pub neighbors_with_anomalies: usize,
    /// `None` when no neighbor answered
    pub collective_risk: Option<RiskLevel>,
    pub correlation_detected: bool,
}

impl NeighborSummary {
    fn from_responses<'a>(responses: impl Iterator<Item = &'a QueryResponse>) -> Self {
        let (mut count, mut anomalies, mut score) = (0usize, 0usize, 0u32);
        for response in responses {
            count += 1;
            score += u32::from(response.risk_level.score());
            if response.anomaly_detected {
                anomalies += 1;
            }
        }

        let collective_risk = (count > 0).then(|| {
            let mean = f64::from(score) / count as f64;
            if mean > 3.0 {
                RiskLevel::Critical
            } else if mean > 2.0 {
                RiskLevel::High
            } else if mean > 1.5 {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            }
        });

        Self {
            neighbors_with_anomalies: anomalies,
            collective_risk,
            correlation_detected: count > 0 && anomalies * 2 > count,
        }
    }
}

/// Responses gathered from an agent's neighbors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    pub queries_sent: usize,
    pub responses: BTreeMap<AgentId, QueryResponse>,
    pub failures: BTreeMap<AgentId, String>,
    pub summary: NeighborSummary,
}

/// Outcome of handing an approved proposal to the analytic engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub proposal_id: ProposalId,
    pub proposer: AgentId,
    pub triggered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
}

/// One agent as seen by observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    #[serde(flatten)]
    pub state: AgentState,
    pub neighbor_count: usize,
}

impl From<AgentState> for AgentStatus {
    fn from(state: AgentState) -> Self {
        Self {
            neighbor_count: state.neighbors.len(),
            state,
        }
    }
}

/// Snapshot of the whole swarm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub total_agents: usize,
    pub topology: BTreeMap<AgentId, Vec<AgentId>>,
    pub agents: BTreeMap<AgentId, AgentStatus>,
}

/// The swarm orchestrator
///
/// Built once at startup and shared by reference. Every belief or risk change
/// produced by a capability goes through the registry from here.
pub struct SwarmOrchestrator {
    registry: Arc<Registry>,
    protocol: CommunicationProtocol,
    consensus: ConsensusWorkflow,
    engine: WorkflowEngine,
    workflow: WorkflowDefinition,
    capabilities: Capabilities,
    interpreter: Option<Arc<dyn Interpreter>>,
    analyzer: Option<Arc<dyn Analyzer>>,
    decision_timeout: Duration,
    vote_timeout: Duration,
}

impl SwarmOrchestrator {
    /// Validate the configuration and assemble every component
    pub fn new(config: &SwarmConfig, capabilities: Capabilities) -> Result<Self> {
        let registry = Arc::new(Registry::from_config(config)?);
        let workflow = match &config.workflow.steps {
            Some(steps) => WorkflowDefinition::new("custom", steps.clone())?,
            None => WorkflowDefinition::outbreak_detection()?,
        };

        info!(
            agents = registry.len(),
            workflow = %workflow.name,
            "Swarm orchestrator ready"
        );

        Ok(Self {
            protocol: CommunicationProtocol::new(Arc::clone(&registry), config.protocol.default_ttl),
            consensus: ConsensusWorkflow::new(),
            engine: WorkflowEngine::new(Arc::clone(&registry)),
            registry,
            workflow,
            capabilities,
            interpreter: None,
            analyzer: None,
            decision_timeout: Duration::from_millis(config.decision.timeout_ms),
            vote_timeout: Duration::from_millis(config.consensus.vote_timeout_ms),
        })
    }

    /// Attach the raw-input interpreter used by [`ingest`](Self::ingest)
    pub fn with_interpreter(mut self, interpreter: Arc<dyn Interpreter>) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    /// Attach the analytic engine used by [`escalate`](Self::escalate)
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Get the agent registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get the message router
    pub fn protocol(&self) -> &CommunicationProtocol {
        &self.protocol
    }

    /// Get the proposal store
    pub fn consensus(&self) -> &ConsensusWorkflow {
        &self.consensus
    }

    /// Get the workflow run by [`trigger_workflow`](Self::trigger_workflow)
    pub fn workflow(&self) -> &WorkflowDefinition {
        &self.workflow
    }

    /// Ask `agent_id`'s capability to decide, applying any belief/risk revision.
    ///
    /// Runs inside the agent's turn, so concurrent decisions on one agent each
    /// see the state the previous one left behind.
    async fn decide(
        &self,
        agent_id: &AgentId,
        request: DecisionRequest,
    ) -> Result<(Decision, AgentState)> {
        let agent = self.registry.get(agent_id)?;
        let _turn = agent.begin_turn().await;
        let state = agent.state();
        let decider = self.capabilities.for_agent(agent_id)?;

        let decision = with_deadline(
            agent_id,
            self.decision_timeout,
            decider.decide(&state, &request),
        )
        .await?;

        let state = if decision.belief.is_some() || decision.risk_level.is_some() {
            self.registry
                .revise(agent_id, decision.belief, decision.risk_level)?
        } else {
            state
        };
        Ok((decision, state))
    }

    /// Hand a symptom report to a village agent
    #[instrument(skip(self, report), fields(symptoms = report.symptoms.len()))]
    pub async fn process_report(&self, agent_id: &AgentId, report: Report) -> Result<ReportOutcome> {
        let village = self.registry.get(agent_id)?.name.clone();
        let report_count = self.registry.record_report(agent_id)?;

        let request = DecisionRequest::new(
            "analyze_symptoms",
            json!({
                "symptoms": report.symptoms,
                "metadata": report.metadata,
                "report_count": report_count,
            }),
        );
        let (decision, state) = self.decide(agent_id, request).await?;

        let alerted = if state.risk_level.is_anomalous() {
            self.alert_neighbors(&state)
        } else {
            Vec::new()
        };

        info!(
            agent_id = %agent_id,
            risk = %state.risk_level,
            belief = state.belief,
            actions = decision.actions.len(),
            "Report processed"
        );

        Ok(ReportOutcome {
            agent_id: agent_id.clone(),
            village,
            agent_response: decision.output,
            actions_taken: decision.actions,
            state,
            alerted,
            interpretation: None,
        })
    }

    /// Interpret raw input, then process the normalized symptoms as a report
    #[instrument(skip(self, raw))]
    pub async fn ingest(&self, agent_id: &AgentId, raw: RawInput) -> Result<ReportOutcome> {
        self.registry.get(agent_id)?;
        let interpreter = self
            .interpreter
            .as_ref()
            .ok_or_else(|| SwarmError::CapabilityUnavailable(agent_id.clone()))?;

        let interpretation =
            with_deadline(agent_id, self.decision_timeout, interpreter.interpret(&raw)).await?;
        let report = Report {
            symptoms: interpretation.normalized_symptoms.clone(),
            metadata: json!({ "local_risk_signal": interpretation.local_risk_signal }),
        };

        let mut outcome = self.process_report(agent_id, report).await?;
        outcome.interpretation = Some(interpretation);
        Ok(outcome)
    }

    fn alert_neighbors(&self, state: &AgentState) -> Vec<AgentId> {
        let payload = json!({
            "village": state.name,
            "risk_level": state.risk_level,
            "belief": state.belief,
        });
        state
            .neighbors
            .iter()
            .flat_map(|neighbor| {
                let message = self.protocol.message(
                    MessageType::Alert,
                    &state.id,
                    Recipient::Agent(neighbor.clone()),
                    payload.clone(),
                );
                self.protocol.send(message)
            })
            .collect()
    }

    /// Consult a single agent
    #[instrument(skip(self, context))]
    pub async fn query_agent(
        &self,
        agent_id: &AgentId,
        query_type: &str,
        context: Value,
    ) -> Result<QueryResponse> {
        let (decision, state) = self
            .decide(agent_id, DecisionRequest::new(query_type, context))
            .await?;

        Ok(QueryResponse {
            agent_id: agent_id.clone(),
            response: decision.output,
            actions_taken: decision.actions,
            risk_level: state.risk_level,
            belief: state.belief,
            anomaly_detected: state.risk_level.is_anomalous(),
        })
    }

    /// Consult every neighbor of `agent_id` at once
    ///
    /// Each exchange is posted to the mailboxes as a query and its response.
    #[instrument(skip(self, context))]
    pub async fn query_neighbors(
        &self,
        agent_id: &AgentId,
        query_type: &str,
        context: Value,
    ) -> Result<Consultation> {
        let neighbors = self.registry.neighbors(agent_id)?;

        let calls = neighbors.iter().map(|neighbor| {
            let context = context.clone();
            async move {
                let query = self.protocol.query(
                    agent_id,
                    neighbor,
                    json!({ "query_type": query_type, "context": context }),
                );
                let query_id = query.id();
                self.protocol.send(query);

                let result = self.query_agent(neighbor, query_type, context).await;
                if let Ok(response) = &result {
                    let reply = self.protocol.response(
                        neighbor,
                        agent_id,
                        serde_json::to_value(response)?,
                        query_id,
                    );
                    self.protocol.send(reply);
                }
                Ok::<_, SwarmError>((neighbor.clone(), result))
            }
        });

        let mut responses = BTreeMap::new();
        let mut failures = BTreeMap::new();
        for outcome in join_all(calls).await {
            let (neighbor, result) = outcome?;
            match result {
                Ok(response) => {
                    responses.insert(neighbor, response);
                }
                Err(e) => {
                    warn!(agent_id = %agent_id, neighbor = %neighbor, error = %e, "Neighbor query failed");
                    failures.insert(neighbor, e.to_string());
                }
            }
        }

        let summary = NeighborSummary::from_responses(responses.values());
        debug!(agent_id = %agent_id, ?summary, "Neighbor consultation complete");

        Ok(Consultation {
            queries_sent: neighbors.len(),
            responses,
            failures,
            summary,
        })
    }

    /// Open a proposal and collect every voter's ballot concurrently.
    ///
    /// A voter that errors or misses the vote deadline simply has no vote; once
    /// all calls are back the proposal is closed on the votes recorded.
    #[instrument(skip(self, content))]
    pub async fn run_consensus(
        &self,
        proposer: &AgentId,
        content: Value,
        voters: Vec<AgentId>,
    ) -> Result<Tally> {
        self.registry.get(proposer)?;
        let proposal_id = self.consensus.initiate(proposer, content.clone(), voters)?;
        let proposal = self.consensus.get_status(&proposal_id)?;
        let (proposal, content) = (&proposal, &content);

        let ballots = proposal.eligible_voters.iter().map(|voter| {
            async move {
                let invite = self.protocol.message(
                    MessageType::Proposal,
                    proposer,
                    Recipient::Agent(voter.clone()),
                    json!({ "proposal_id": proposal_id, "content": content }),
                );
                self.protocol.send(invite);

                match self.ballot(voter, proposal).await {
                    Ok(ballot) => {
                        if let Err(e) = self.consensus.try_cast_vote(
                            &proposal_id,
                            voter,
                            ballot.vote,
                            ballot.confidence,
                        ) {
                            warn!(proposal_id = %proposal_id, voter = %voter, error = %e, "Vote refused");
                            return;
                        }
                        let receipt = self.protocol.message(
                            MessageType::Vote,
                            voter,
                            Recipient::Agent(proposer.clone()),
                            json!({
                                "proposal_id": proposal_id,
                                "vote": ballot.vote,
                                "confidence": ballot.confidence,
                            }),
                        );
                        self.protocol.send(receipt);
                    }
                    Err(e) => {
                        warn!(proposal_id = %proposal_id, voter = %voter, error = %e, "No vote from voter");
                    }
                }
            }
        });
        join_all(ballots).await;

        let tally = self.consensus.close(&proposal_id)?.tally();
        info!(
            proposal_id = %proposal_id,
            status = ?tally.status,
            approve = tally.approve,
            total = tally.total_votes,
            non_responders = tally.non_responders.len(),
            "Consensus round complete"
        );
        Ok(tally)
    }

    async fn ballot(&self, voter: &AgentId, proposal: &Proposal) -> Result<Ballot> {
        let state = self.registry.get(voter)?.state();
        let decider = self.capabilities.for_agent(voter)?;
        with_deadline(voter, self.vote_timeout, decider.vote(&state, proposal)).await
    }

    /// Hand an approved proposal to the analytic engine, under the decision deadline
    #[instrument(skip(self, tally), fields(proposal_id = %tally.proposal_id))]
    pub async fn escalate(&self, proposer: &AgentId, tally: &Tally) -> Result<Escalation> {
        if !tally.consensus_reached() {
            return Ok(Escalation {
                proposal_id: tally.proposal_id,
                proposer: proposer.clone(),
                triggered: false,
                analysis: None,
            });
        }

        let analyzer = self
            .analyzer
            .as_ref()
            .ok_or_else(|| SwarmError::CapabilityUnavailable(proposer.clone()))?;
        let snapshot = self.network_status();
        let analysis =
            with_deadline(proposer, self.decision_timeout, analyzer.analyze(&snapshot)).await?;

        let alert = self.protocol.message(
            MessageType::Alert,
            proposer,
            Recipient::Broadcast,
            json!({
                "proposal_id": tally.proposal_id,
                "outbreak_probability": analysis.outbreak_probability,
            }),
        );
        self.protocol.send(alert);

        info!(
            proposer = %proposer,
            outbreak_probability = analysis.outbreak_probability,
            "Escalated to analysis"
        );
        Ok(Escalation {
            proposal_id: tally.proposal_id,
            proposer: proposer.clone(),
            triggered: true,
            analysis: Some(analysis),
        })
    }

    /// Run the configured workflow on behalf of a village
    #[instrument(skip(self))]
    pub async fn trigger_workflow(&self, village_id: &AgentId) -> Result<WorkflowRun> {
        let state = self.registry.get(village_id)?.state();

        let mut context = RunContext::new();
        context.insert("village_id".into(), json!(village_id));
        context.insert("proposer".into(), json!(village_id));
        context.insert("risk_level".into(), json!(state.risk_level));
        context.insert("belief".into(), json!(state.belief));
        context.insert("anomaly_detected".into(), json!(state.risk_level.is_anomalous()));

        Ok(self.engine.run(&self.workflow, context, self).await)
    }

    /// Snapshot of every agent with its neighbor count
    pub fn network_status(&self) -> NetworkStatus {
        let agents: BTreeMap<AgentId, AgentStatus> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|state| (state.id.clone(), AgentStatus::from(state)))
            .collect();

        NetworkStatus {
            total_agents: agents.len(),
            topology: self.registry.topology(),
            agents,
        }
    }

    /// Status of one agent, or `NotFound`
    pub fn get_agent_status(&self, village_id: &AgentId) -> Result<AgentStatus> {
        Ok(self.registry.get(village_id)?.state().into())
    }

    /// The approved-or-not proposal `proposer` raised earlier in this run
    fn proposal_in_context(&self, proposer: &AgentId, context: &RunContext) -> Result<Tally> {
        let proposal_id = context
            .values()
            .filter(|v| v.get("proposer").and_then(Value::as_str) == Some(proposer.as_str()))
            .find_map(|v| v.get("proposal_id").cloned())
            .ok_or_else(|| SwarmError::InvalidProposal(format!("no proposal by {proposer} in run")))?;
        let proposal_id: ProposalId = serde_json::from_value(proposal_id)?;
        Ok(self.consensus.get_status(&proposal_id)?.tally())
    }
}

#[async_trait]
impl StepDispatcher for SwarmOrchestrator {
    async fn dispatch(&self, target: &AgentId, step: &StepSpec, context: &RunContext) -> Result<Value> {
        let run_context = Value::Object(context.clone());

        match step.action.as_str() {
            "query_neighbors" => {
                let consultation = self
                    .query_neighbors(target, "symptom_status", run_context)
                    .await?;
                Ok(serde_json::to_value(consultation)?)
            }
            "propose_consensus" => {
                let (decision, _) = self
                    .decide(target, DecisionRequest::new(step.action.clone(), run_context))
                    .await?;
                let voters = self.registry.neighbors(target)?;
                let tally = self.run_consensus(target, decision.output, voters).await?;
                Ok(json!({
                    "proposer": target,
                    "proposal_id": tally.proposal_id,
                    "consensus_reached": tally.consensus_reached(),
                    "tally": tally,
                }))
            }
            "escalate" => {
                let tally = self.proposal_in_context(target, context)?;
                Ok(serde_json::to_value(self.escalate(target, &tally).await?)?)
            }
            _ => {
                let (decision, _) = self
                    .decide(target, DecisionRequest::new(step.action.clone(), run_context))
                    .await?;
                Ok(serde_json::to_value(decision)?)
            }
        }
    }
}

/// Await a capability call under a deadline, dropping it on expiry
async fn with_deadline<T>(
    target: &AgentId,
    deadline: Duration,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result.map_err(SwarmError::from),
        Err(_) => Err(SwarmError::Timeout {
            target: target.to_string(),
            millis: deadline.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Ballot, Decider};
    use crate::consensus::{Proposal, ProposalStatus, Vote};
    use tokio_test::assert_ok;

    /// Raises risk to high on reports, votes as told
    struct Village {
        vote: Vote,
    }

    #[async_trait]
    impl Decider for Village {
        async fn decide(&self, agent: &AgentState, request: &DecisionRequest) -> anyhow::Result<Decision> {
            Ok(Decision::new(json!({ "seen_by": agent.id, "action": request.action }))
                .with_actions(["analyze_symptoms"])
                .with_assessment(0.8, RiskLevel::High))
        }

        async fn vote(&self, _: &AgentState, _: &Proposal) -> anyhow::Result<Ballot> {
            Ok(Ballot {
                vote: self.vote,
                confidence: 0.9,
            })
        }
    }

    fn orchestrator(vote: Vote) -> SwarmOrchestrator {
        let caps = Capabilities::new().with_fallback(Arc::new(Village { vote }));
        SwarmOrchestrator::new(&SwarmConfig::default(), caps).unwrap()
    }

    #[tokio::test]
    async fn test_orchestrator_creation() {
        let orchestrator = orchestrator(Vote::Approve);
        let status = orchestrator.network_status();
        assert_eq!(status.total_agents, 4);
        assert_eq!(status.agents[&AgentId::from("v3")].neighbor_count, 3);
    }

    #[tokio::test]
    async fn test_process_report_updates_and_alerts() {
        let orchestrator = orchestrator(Vote::Approve);
        let id = AgentId::from("v1");

        let outcome = assert_ok!(
            orchestrator
                .process_report(&id, Report { symptoms: vec!["fever".into()], metadata: Value::Null })
                .await
        );

        assert_eq!(outcome.village, "Dharavi");
        assert_eq!(outcome.actions_taken, vec!["analyze_symptoms".to_string()]);
        assert_eq!(outcome.state.risk_level, RiskLevel::High);
        assert_eq!(outcome.state.report_count, 1);
        assert_eq!(outcome.alerted.len(), 2);
        assert_eq!(orchestrator.protocol().poll(&AgentId::from("v2")).len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_village_is_not_found() {
        let orchestrator = orchestrator(Vote::Approve);
        let result = orchestrator
            .process_report(&AgentId::from("v9"), Report::default())
            .await;
        assert!(matches!(result, Err(SwarmError::NotFound { .. })));
        assert!(orchestrator.get_agent_status(&AgentId::from("v9")).is_err());
    }

    #[tokio::test]
    async fn test_missing_capability() {
        let orchestrator = SwarmOrchestrator::new(&SwarmConfig::default(), Capabilities::new()).unwrap();
        let result = orchestrator
            .query_agent(&AgentId::from("v1"), "symptom_status", Value::Null)
            .await;
        assert!(matches!(result, Err(SwarmError::CapabilityUnavailable(_))));
    }

    #[tokio::test]
    async fn test_run_consensus_posts_messages() {
        let orchestrator = orchestrator(Vote::Approve);
        let proposer = AgentId::from("v3");
        let voters = orchestrator.registry().neighbors(&proposer).unwrap();

        let tally = orchestrator
            .run_consensus(&proposer, json!({ "action": "escalate" }), voters)
            .await
            .unwrap();

        assert_eq!(tally.status, ProposalStatus::Approved);
        assert_eq!(tally.total_votes, 3);
        assert_eq!(orchestrator.protocol().poll(&proposer).len(), 3);
        assert_eq!(orchestrator.protocol().poll(&AgentId::from("v4")).len(), 1);
    }

    #[tokio::test]
    async fn test_escalate_skips_rejected() {
        let orchestrator = orchestrator(Vote::Reject);
        let proposer = AgentId::from("v1");
        let tally = orchestrator
            .run_consensus(&proposer, json!({}), vec![AgentId::from("v2")])
            .await
            .unwrap();

        let escalation = orchestrator.escalate(&proposer, &tally).await.unwrap();
        assert!(!escalation.triggered);
    }

    #[test]
    fn test_neighbor_summary() {
        let response = |risk: RiskLevel| QueryResponse {
            agent_id: AgentId::from("x"),
            response: Value::Null,
            actions_taken: vec![],
            risk_level: risk,
            belief: 0.0,
            anomaly_detected: risk.is_anomalous(),
        };

        let responses = [response(RiskLevel::High), response(RiskLevel::Critical), response(RiskLevel::Low)];
        let summary = NeighborSummary::from_responses(responses.iter());
        assert_eq!(summary.neighbors_with_anomalies, 2);
        assert_eq!(summary.collective_risk, Some(RiskLevel::High));
        assert!(summary.correlation_detected);

        let empty = NeighborSummary::from_responses(std::iter::empty());
        assert_eq!(empty.collective_risk, None);
        assert!(!empty.correlation_detected);
    }
}
