//! Village agent - identity plus mutable belief/risk state

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Village identifier (e.g. `v1`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create an agent ID from any string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Outbreak risk classification of a village
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Normal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// High and critical count as an anomaly for neighbor consultation
    pub fn is_anomalous(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    /// Score used when averaging collective risk. Normal scores like low.
    pub fn score(self) -> u8 {
        match self {
            Self::Normal | Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Geographic position (lat, lon)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl From<[f64; 2]> for Location {
    fn from([lat, lon]: [f64; 2]) -> Self {
        Self { lat, lon }
    }
}

/// Read-only copy of an agent's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    pub name: String,
    pub location: Location,
    pub population: u64,
    /// Confidence in a local outbreak, always within [0, 1]
    pub belief: f64,
    pub risk_level: RiskLevel,
    pub report_count: u64,
    pub neighbors: BTreeSet<AgentId>,
}

/// The mutable part of an agent, guarded as one unit
#[derive(Debug, Clone, Default)]
struct Vitals {
    belief: f64,
    risk_level: RiskLevel,
    report_count: u64,
}

/// A single village agent
///
/// Identity and neighbors are fixed at creation. Belief, risk and report count
/// sit behind one lock. A decision on the agent reads its state, awaits the
/// capability and writes the revision back; [`Agent::begin_turn`] serializes
/// those so two decisions on one agent never overwrite each other.
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub location: Location,
    pub population: u64,
    neighbors: BTreeSet<AgentId>,
    vitals: RwLock<Vitals>,
    turn: tokio::sync::Mutex<()>,
}

impl Agent {
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        location: Location,
        population: u64,
        neighbors: BTreeSet<AgentId>,
    ) -> Self {
        let name = name.into();

        info!(
            agent_id = %id,
            name = %name,
            neighbors = neighbors.len(),
            "Creating village agent"
        );

        Self {
            id,
            name,
            location,
            population,
            neighbors,
            vitals: RwLock::new(Vitals::default()),
            turn: tokio::sync::Mutex::new(()),
        }
    }

    /// Get the current outbreak belief
    pub fn belief(&self) -> f64 {
        self.vitals.read().belief
    }

    /// Get the current risk level
    pub fn risk_level(&self) -> RiskLevel {
        self.vitals.read().risk_level
    }

    /// Get the number of reports received
    pub fn report_count(&self) -> u64 {
        self.vitals.read().report_count
    }

    /// Get the fixed neighbor set
    pub fn neighbors(&self) -> &BTreeSet<AgentId> {
        &self.neighbors
    }

    /// Revise belief and/or risk in one critical section.
    ///
    /// Belief is clamped to [0, 1]; a non-finite belief is ignored.
    pub(crate) fn set_assessment(
        &self,
        belief: Option<f64>,
        risk_level: Option<RiskLevel>,
    ) -> AgentState {
        let mut guard = self.vitals.write();
        match belief {
            Some(b) if b.is_finite() => guard.belief = b.clamp(0.0, 1.0),
            Some(b) => warn!(agent_id = %self.id, belief = b, "Ignoring non-finite belief"),
            None => {}
        }
        if let Some(risk) = risk_level {
            guard.risk_level = risk;
        }
        let vitals = guard.clone();
        drop(guard);

        debug!(
            agent_id = %self.id,
            belief = vitals.belief,
            risk = %vitals.risk_level,
            "Agent assessment updated"
        );
        self.state_with(vitals)
    }

    pub(crate) fn increment_reports(&self) -> u64 {
        let mut guard = self.vitals.write();
        guard.report_count += 1;
        guard.report_count
    }

    /// Wait for exclusive use of this agent's decision path.
    ///
    /// Held from reading the state until the revision is applied.
    pub async fn begin_turn(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    /// Consistent copy of this agent's state
    pub fn state(&self) -> AgentState {
        let vitals = self.vitals.read().clone();
        self.state_with(vitals)
    }

    fn state_with(&self, vitals: Vitals) -> AgentState {
        AgentState {
            id: self.id.clone(),
            name: self.name.clone(),
            location: self.location,
            population: self.population,
            belief: vitals.belief,
            risk_level: vitals.risk_level,
            report_count: vitals.report_count,
            neighbors: self.neighbors.clone(),
        }
    }
}

/// Shared handle to an agent
#[derive(Clone)]
pub struct AgentHandle {
    inner: Arc<Agent>,
}

impl AgentHandle {
    /// Wrap an agent in a shared handle
    pub fn new(agent: Agent) -> Self {
        Self {
            inner: Arc::new(agent),
        }
    }

    /// Get the agent ID
    pub fn id(&self) -> &AgentId {
        &self.inner.id
    }

    /// Get the underlying agent
    pub fn inner(&self) -> &Agent {
        &self.inner
    }
}

impl std::ops::Deref for AgentHandle {
    type Target = Agent;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
