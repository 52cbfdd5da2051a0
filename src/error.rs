//! Swarm error types

use thiserror::Error;

use crate::agent::AgentId;

/// Result alias used throughout the crate
pub type Result<T, E = SwarmError> = std::result::Result<T, E>;

/// Errors that can occur in the swarm coordination layer
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Unknown agent, proposal or workflow id
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Proposal cannot be opened
    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    /// Vote refused
    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    /// Asymmetric topology, cyclic workflow graph, bad settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Per-call or per-step deadline exceeded
    #[error("Timed out after {millis}ms: {target}")]
    Timeout { target: String, millis: u64 },

    /// No decision capability configured for the target
    #[error("No capability configured for agent {0}")]
    CapabilityUnavailable(AgentId),

    /// An external capability reported a failure
    #[error("Capability error: {0}")]
    Capability(#[from] anyhow::Error),

    /// Payload (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwarmError {
    pub fn agent_not_found(id: &AgentId) -> Self {
        Self::NotFound {
            kind: "Agent",
            id: id.to_string(),
        }
    }

    pub fn proposal_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "Proposal",
            id: id.to_string(),
        }
    }

    /// Whether this error aborts a request rather than degrading its result
    pub fn is_request_level(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Config(_) | Self::ConfigParse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = SwarmError::agent_not_found(&AgentId::from("v9"));
        assert_eq!(err.to_string(), "Agent not found: v9");
        assert!(err.is_request_level());
    }

    #[test]
    fn test_timeout_is_partial() {
        let err = SwarmError::Timeout {
            target: "v1".into(),
            millis: 30,
        };
        assert!(!err.is_request_level());
    }
}
