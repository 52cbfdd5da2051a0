//! Startup configuration: villages, topology, timeouts, workflow steps

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, Location};
use crate::error::{Result, SwarmError};
use crate::workflow::StepSpec;

/// A village taking part in the swarm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VillageConfig {
    pub id: AgentId,
    pub name: String,
    pub location: Location,
    #[serde(default)]
    pub population: u64,
}

impl VillageConfig {
    pub fn new(id: &str, name: &str, location: [f64; 2], population: u64) -> Self {
        Self {
            id: AgentId::from(id),
            name: name.to_string(),
            location: Location::from(location),
            population,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Hop budget stamped on freshly built messages
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,
}

fn default_ttl() -> u32 {
    3
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            default_ttl: default_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Deadline for each voter's decision call
    #[serde(default = "default_vote_timeout_ms")]
    pub vote_timeout_ms: u64,
}

fn default_vote_timeout_ms() -> u64 {
    5_000
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            vote_timeout_ms: default_vote_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Deadline for report and query calls into an agent's capability
    #[serde(default = "default_decision_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_decision_timeout_ms() -> u64 {
    30_000
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_decision_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Custom step graph; the outbreak-detection graph is used when absent
    #[serde(default)]
    pub steps: Option<Vec<StepSpec>>,
}

/// Top-level swarm configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    pub villages: Vec<VillageConfig>,
    /// Village id -> neighbor ids. Must be symmetric.
    pub topology: BTreeMap<AgentId, Vec<AgentId>>,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        let villages = vec![
            VillageConfig::new("v1", "Dharavi", [19.04, 72.86], 700_000),
            VillageConfig::new("v2", "Kalyan", [19.24, 73.14], 150_000),
            VillageConfig::new("v3", "Thane", [19.22, 72.97], 180_000),
            VillageConfig::new("v4", "Navi Mumbai", [19.03, 73.01], 120_000),
        ];

        let topology = [
            ("v1", vec!["v2", "v3"]),
            ("v2", vec!["v1", "v3"]),
            ("v3", vec!["v1", "v2", "v4"]),
            ("v4", vec!["v3"]),
        ]
        .into_iter()
        .map(|(id, ns)| (AgentId::from(id), ns.into_iter().map(AgentId::from).collect()))
        .collect();

        Self {
            villages,
            topology,
            protocol: ProtocolConfig::default(),
            consensus: ConsensusConfig::default(),
            decision: DecisionConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl SwarmConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject duplicate villages, unknown ids, self-loops and one-way edges.
    ///
    /// A village with no topology entry of its own takes the reverse of every
    /// edge pointing at it.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for village in &self.villages {
            if !ids.insert(&village.id) {
                return Err(SwarmError::Config(format!(
                    "Duplicate village id: {}",
                    village.id
                )));
            }
        }

        validate_topology(&self.topology, &ids)
    }
}

pub(crate) fn validate_topology(
    topology: &BTreeMap<AgentId, Vec<AgentId>>,
    known: &HashSet<&AgentId>,
) -> Result<()> {
    for (id, neighbors) in topology {
        if !known.contains(id) {
            return Err(SwarmError::Config(format!(
                "Topology names unknown village: {id}"
            )));
        }
        for neighbor in neighbors {
            if neighbor == id {
                return Err(SwarmError::Config(format!(
                    "Village {id} lists itself as a neighbor"
                )));
            }
            if !known.contains(neighbor) {
                return Err(SwarmError::Config(format!(
                    "Village {id} lists unknown neighbor {neighbor}"
                )));
            }
            // a neighbor without its own entry has the reverse edge implied
            let reciprocal = topology
                .get(neighbor)
                .map_or(true, |back| back.contains(id));
            if !reciprocal {
                return Err(SwarmError::Config(format!(
                    "Asymmetric topology: {id} -> {neighbor} has no reverse edge"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = SwarmConfig::default();
        assert_eq!(config.villages.len(), 4);
        assert!(config.validate().is_ok());
        assert_eq!(config.protocol.default_ttl, 3);
    }

    #[test]
    fn test_asymmetric_topology_rejected() {
        let mut config = SwarmConfig::default();
        config
            .topology
            .insert(AgentId::from("v4"), vec![AgentId::from("v3"), AgentId::from("v1")]);

        let err = config.validate().unwrap_err();
        assert!(matches!(err, SwarmError::Config(msg) if msg.contains("Asymmetric")));
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut config = SwarmConfig::default();
        config
            .topology
            .insert(AgentId::from("v4"), vec![AgentId::from("v4")]);
        assert!(matches!(config.validate(), Err(SwarmError::Config(_))));
    }

    #[test]
    fn test_duplicate_village_rejected() {
        let mut config = SwarmConfig::default();
        config
            .villages
            .push(VillageConfig::new("v1", "Again", [0.0, 0.0], 1));
        assert!(matches!(config.validate(), Err(SwarmError::Config(_))));
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
            [[villages]]
            id = "a"
            name = "Alpha"
            location = { lat = 1.0, lon = 2.0 }
            population = 10

            [[villages]]
            id = "b"
            name = "Beta"
            location = { lat = 3.0, lon = 4.0 }

            [topology]
            a = ["b"]
            b = ["a"]

            [consensus]
            vote_timeout_ms = 250
        "#;

        let config = SwarmConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.villages.len(), 2);
        assert_eq!(config.villages[1].population, 0);
        assert_eq!(config.consensus.vote_timeout_ms, 250);
        assert_eq!(config.protocol.default_ttl, 3);
        assert_eq!(config.decision.timeout_ms, 30_000);
        assert!(config.workflow.steps.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [[villages]]
            id = "a"
            name = "Alpha"
            location = {{ lat = 1.0, lon = 2.0 }}

            [topology]
            a = []
            "#
        )
        .unwrap();

        let config = SwarmConfig::load(file.path()).unwrap();
        assert_eq!(config.villages[0].name, "Alpha");
    }

    #[test]
    fn test_load_rejects_one_way_edge() {
        let toml_str = r#"
            [[villages]]
            id = "a"
            name = "Alpha"
            location = { lat = 1.0, lon = 2.0 }

            [[villages]]
            id = "b"
            name = "Beta"
            location = { lat = 3.0, lon = 4.0 }

            [topology]
            a = ["b"]
            b = []
        "#;

        assert!(matches!(
            SwarmConfig::from_toml(toml_str),
            Err(SwarmError::Config(_))
        ));
    }
}
