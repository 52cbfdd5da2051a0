//! Injected decision capabilities and external collaborators
//!
//! The coordination layer never reasons about symptoms itself. Each agent is
//! backed by a [`Decider`] handle; raw input interpretation and network-wide
//! analysis are black boxes behind [`Interpreter`] and [`Analyzer`]. All three
//! report failures as `anyhow::Error`, which the swarm wraps as
//! [`SwarmError::Capability`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::{AgentId, AgentState, RiskLevel};
use crate::consensus::{Proposal, Vote};
use crate::error::{Result, SwarmError};
use crate::orchestrator::NetworkStatus;

/// What an agent is being asked to decide on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Action identifier, e.g. `analyze_symptoms` or `neighbor_query`
    pub action: String,
    /// Report, query context or workflow run context
    pub context: Value,
}

impl DecisionRequest {
    pub fn new(action: impl Into<String>, context: Value) -> Self {
        Self {
            action: action.into(),
            context,
        }
    }
}

/// An agent's answer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decision {
    /// Free-form result merged into the caller's output unmodified
    #[serde(default)]
    pub output: Value,
    /// Names of the actions the agent reports having taken
    #[serde(default)]
    pub actions: Vec<String>,
    /// New outbreak belief, if the decision revises it
    #[serde(default)]
    pub belief: Option<f64>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
}

impl Decision {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            ..Default::default()
        }
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_assessment(mut self, belief: f64, risk_level: RiskLevel) -> Self {
        self.belief = Some(belief);
        self.risk_level = Some(risk_level);
        self
    }
}

/// A voter's response to a proposal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    pub vote: Vote,
    pub confidence: f64,
}

/// The reasoning behind a single agent
#[async_trait]
pub trait Decider: Send + Sync {
    /// Decide on a request given the agent's current state
    async fn decide(&self, agent: &AgentState, request: &DecisionRequest)
        -> anyhow::Result<Decision>;

    /// Vote on a proposal
    async fn vote(&self, agent: &AgentState, proposal: &Proposal) -> anyhow::Result<Ballot>;
}

/// Raw field input awaiting interpretation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RawInput {
    Text(String),
    Voice(Vec<u8>),
    Image(Vec<u8>),
}

/// Normalized view of a raw report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Interpretation {
    pub normalized_symptoms: Vec<String>,
    pub local_risk_signal: f64,
    /// Anything else the interpreter returned, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Turns raw voice, image or text input into symptoms
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(&self, raw: &RawInput) -> anyhow::Result<Interpretation>;
}

/// Network-wide outbreak estimate and resource plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    pub outbreak_probability: f64,
    #[serde(default)]
    pub resource_allocation: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The downstream analytic engine
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, snapshot: &NetworkStatus) -> anyhow::Result<Analysis>;
}

/// Decider handles keyed by agent, with an optional fallback
#[derive(Clone, Default)]
pub struct Capabilities {
    fallback: Option<Arc<dyn Decider>>,
    per_agent: HashMap<AgentId, Arc<dyn Decider>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `decider` for every agent without a dedicated one
    pub fn with_fallback(mut self, decider: Arc<dyn Decider>) -> Self {
        self.fallback = Some(decider);
        self
    }

    pub fn with_agent(mut self, id: AgentId, decider: Arc<dyn Decider>) -> Self {
        self.per_agent.insert(id, decider);
        self
    }

    pub fn for_agent(&self, id: &AgentId) -> Result<Arc<dyn Decider>> {
        self.per_agent
            .get(id)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| SwarmError::CapabilityUnavailable(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(Vote);

    #[async_trait]
    impl Decider for Fixed {
        async fn decide(&self, _: &AgentState, request: &DecisionRequest) -> anyhow::Result<Decision> {
            Ok(Decision::new(json!({ "echo": request.action })))
        }

        async fn vote(&self, _: &AgentState, _: &Proposal) -> anyhow::Result<Ballot> {
            Ok(Ballot {
                vote: self.0,
                confidence: 1.0,
            })
        }
    }

    #[test]
    fn test_capability_lookup() {
        let caps = Capabilities::new().with_agent(AgentId::from("v1"), Arc::new(Fixed(Vote::Approve)));

        assert!(caps.for_agent(&AgentId::from("v1")).is_ok());
        assert!(matches!(
            caps.for_agent(&AgentId::from("v2")),
            Err(SwarmError::CapabilityUnavailable(_))
        ));

        let caps = caps.with_fallback(Arc::new(Fixed(Vote::Reject)));
        assert!(caps.for_agent(&AgentId::from("v2")).is_ok());
    }

    #[test]
    fn test_decision_deserializes_partial() {
        let decision: Decision =
            serde_json::from_value(json!({ "output": { "ok": true }, "risk_level": "high" })).unwrap();
        assert_eq!(decision.risk_level, Some(RiskLevel::High));
        assert!(decision.belief.is_none());
        assert!(decision.actions.is_empty());
    }

    #[test]
    fn test_interpretation_keeps_extra_fields() {
        let interp: Interpretation = serde_json::from_value(json!({
            "normalized_symptoms": ["fever"],
            "local_risk_signal": 0.4,
            "language": "mr"
        }))
        .unwrap();
        assert_eq!(interp.extra["language"], "mr");

        let back = serde_json::to_value(&interp).unwrap();
        assert_eq!(back["language"], "mr");
    }
}
