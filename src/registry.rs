//! Agent registry and fixed neighbor topology

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use parking_lot::RwLock;
use tracing::info;

use crate::agent::{Agent, AgentHandle, AgentId, AgentState, Location, RiskLevel};
use crate::config::{validate_topology, SwarmConfig};
use crate::error::{Result, SwarmError};

/// Owns every agent of a run and the adjacency between them.
///
/// Adjacency is fixed at construction. Agents are created once at startup and
/// never removed; belief and risk change only through [`Registry::update`].
pub struct Registry {
    agents: RwLock<HashMap<AgentId, AgentHandle>>,
    adjacency: BTreeMap<AgentId, BTreeSet<AgentId>>,
}

impl Registry {
    /// Build a registry over `topology`.
    ///
    /// Every listed edge must be reciprocated by the neighbor's own entry. An id
    /// that only appears as a neighbor, with no entry of its own, gets the
    /// reverse edges implied.
    pub fn new(topology: BTreeMap<AgentId, Vec<AgentId>>) -> Result<Self> {
        let known: HashSet<&AgentId> = topology
            .iter()
            .flat_map(|(id, ns)| std::iter::once(id).chain(ns.iter()))
            .collect();
        validate_topology(&topology, &known)?;

        let mut adjacency: BTreeMap<AgentId, BTreeSet<AgentId>> = BTreeMap::new();
        for (id, neighbors) in &topology {
            for neighbor in neighbors {
                adjacency.entry(id.clone()).or_default().insert(neighbor.clone());
                adjacency.entry(neighbor.clone()).or_default().insert(id.clone());
            }
            adjacency.entry(id.clone()).or_default();
        }

        Ok(Self {
            agents: RwLock::new(HashMap::new()),
            adjacency,
        })
    }

    /// Build a registry and create every configured village
    pub fn from_config(config: &SwarmConfig) -> Result<Self> {
        config.validate()?;
        let registry = Self::new(config.topology.clone())?;
        for village in &config.villages {
            registry.create(
                village.id.clone(),
                &village.name,
                village.location,
                village.population,
            )?;
        }

        info!(agents = registry.len(), "Registry initialized");
        Ok(registry)
    }

    /// Create an agent. Its neighbors come from the topology.
    pub fn create(
        &self,
        id: AgentId,
        name: &str,
        location: Location,
        population: u64,
    ) -> Result<AgentHandle> {
        let mut agents = self.agents.write();
        if agents.contains_key(&id) {
            return Err(SwarmError::Config(format!("Agent {id} already exists")));
        }

        let neighbors = self.adjacency.get(&id).cloned().unwrap_or_default();
        let handle = AgentHandle::new(Agent::new(id.clone(), name, location, population, neighbors));
        agents.insert(id, handle.clone());
        Ok(handle)
    }

    /// Get an agent by id, or `NotFound`
    pub fn get(&self, id: &AgentId) -> Result<AgentHandle> {
        self.agents
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SwarmError::agent_not_found(id))
    }

    /// Check whether an agent is registered
    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.read().contains_key(id)
    }

    /// Get an agent's neighbor ids, sorted
    pub fn neighbors(&self, id: &AgentId) -> Result<Vec<AgentId>> {
        Ok(self.get(id)?.neighbors().iter().cloned().collect())
    }

    /// All agent ids, sorted
    pub fn ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.agents.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Read-only copy of every agent's state, sorted by id
    pub fn snapshot(&self) -> Vec<AgentState> {
        let agents = self.agents.read();
        let mut states: Vec<AgentState> = agents.values().map(|a| a.state()).collect();
        states.sort_by(|a, b| a.id.cmp(&b.id));
        states
    }

    /// The only way belief and risk change.
    pub fn update(&self, id: &AgentId, belief: f64, risk_level: RiskLevel) -> Result<AgentState> {
        self.revise(id, Some(belief), Some(risk_level))
    }

    /// Partial form of [`update`](Self::update); `None` keeps the current value
    pub fn revise(
        &self,
        id: &AgentId,
        belief: Option<f64>,
        risk_level: Option<RiskLevel>,
    ) -> Result<AgentState> {
        Ok(self.get(id)?.set_assessment(belief, risk_level))
    }

    /// Count one more report against the agent, returning the new total
    pub fn record_report(&self, id: &AgentId) -> Result<u64> {
        Ok(self.get(id)?.increment_reports())
    }

    /// Agent with the highest belief. Ties go to the smallest id.
    pub fn max_belief(&self) -> Option<AgentId> {
        self.snapshot()
            .into_iter()
            .fold(None::<AgentState>, |best, state| match best {
                Some(b) if b.belief >= state.belief => Some(b),
                _ => Some(state),
            })
            .map(|s| s.id)
    }

    /// The symmetric adjacency map
    pub fn topology(&self) -> BTreeMap<AgentId, Vec<AgentId>> {
        self.adjacency
            .iter()
            .map(|(id, ns)| (id.clone(), ns.iter().cloned().collect()))
            .collect()
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    /// Check if no agents are registered
    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(edges: &[(&str, &[&str])]) -> BTreeMap<AgentId, Vec<AgentId>> {
        edges
            .iter()
            .map(|(id, ns)| (AgentId::from(*id), ns.iter().map(|n| AgentId::from(*n)).collect()))
            .collect()
    }

    fn create_test_registry() -> Registry {
        Registry::from_config(&SwarmConfig::default()).unwrap()
    }

    // === Construction Tests ===

    #[test]
    fn test_registry_from_default_config() {
        let registry = create_test_registry();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.ids()[0], AgentId::from("v1"));
    }

    #[test]
    fn test_asymmetric_topology_rejected() {
        let result = Registry::new(topology(&[("a", &["b"]), ("b", &[])]));
        assert!(matches!(result, Err(SwarmError::Config(_))));
    }

    #[test]
    fn test_implied_reverse_edges() {
        let registry = Registry::new(topology(&[("v1", &["v2", "v3"])])).unwrap();
        for id in ["v1", "v2", "v3"] {
            registry
                .create(AgentId::from(id), id, Location::default(), 0)
                .unwrap();
        }

        assert_eq!(
            registry.neighbors(&AgentId::from("v2")).unwrap(),
            vec![AgentId::from("v1")]
        );
        assert_eq!(registry.neighbors(&AgentId::from("v1")).unwrap().len(), 2);
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        let registry = create_test_registry();
        let topology = registry.topology();
        for (id, neighbors) in &topology {
            for neighbor in neighbors {
                assert!(topology[neighbor].contains(id));
            }
        }
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let registry = create_test_registry();
        let result = registry.create(AgentId::from("v1"), "Again", Location::default(), 0);
        assert!(matches!(result, Err(SwarmError::Config(_))));
    }

    // === Lookup Tests ===

    #[test]
    fn test_get_unknown_agent() {
        let registry = create_test_registry();
        assert!(matches!(
            registry.get(&AgentId::from("v9")),
            Err(SwarmError::NotFound { .. })
        ));
        assert!(registry.neighbors(&AgentId::from("v9")).is_err());
    }

    #[test]
    fn test_neighbors() {
        let registry = create_test_registry();
        let neighbors = registry.neighbors(&AgentId::from("v3")).unwrap();
        assert_eq!(neighbors.len(), 3);
        assert!(neighbors.contains(&AgentId::from("v4")));
    }

    // === Update Tests ===

    #[test]
    fn test_update_visible_in_snapshot() {
        let registry = create_test_registry();
        registry
            .update(&AgentId::from("v2"), 0.8, RiskLevel::High)
            .unwrap();

        let snapshot = registry.snapshot();
        let v2 = snapshot.iter().find(|s| s.id.as_str() == "v2").unwrap();
        assert_eq!(v2.belief, 0.8);
        assert_eq!(v2.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_update_unknown_agent() {
        let registry = create_test_registry();
        assert!(registry
            .update(&AgentId::from("nope"), 0.5, RiskLevel::Low)
            .is_err());
    }

    #[test]
    fn test_max_belief() {
        let registry = create_test_registry();
        assert_eq!(registry.max_belief(), Some(AgentId::from("v1")));

        registry.update(&AgentId::from("v3"), 0.6, RiskLevel::Medium).unwrap();
        registry.update(&AgentId::from("v4"), 0.6, RiskLevel::Medium).unwrap();
        assert_eq!(registry.max_belief(), Some(AgentId::from("v3")));
    }

    #[test]
    fn test_concurrent_report_counting() {
        let registry = std::sync::Arc::new(create_test_registry());
        let id = AgentId::from("v1");

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.record_report(&id).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(registry.get(&id).unwrap().report_count(), 800);
    }
}
