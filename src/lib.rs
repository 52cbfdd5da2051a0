//! # Village Swarm
//!
//! Decentralized outbreak-detection swarm - one agent per village.
//!
//! Each village agent holds its own belief about a local outbreak, talks only
//! to its fixed neighbors, and takes part in 2/3-majority votes before an
//! alert is escalated to network-wide analysis.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         SWARM ORCHESTRATOR                           │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐               │
//! │  │   Workflow   │  │  Consensus   │  │ Communication│               │
//! │  │    Engine    │  │   Workflow   │  │   Protocol   │               │
//! │  └──────────────┘  └──────────────┘  └──────────────┘               │
//! └────────────────────────────┬────────────────────────────────────────┘
//!                              │
//!                     ┌────────┴────────┐
//!                     │    Registry     │
//!                     └────────┬────────┘
//!                              │
//!        ┌──────────┬──────────┼──────────┬──────────┐
//!        ▼          ▼          ▼          ▼          ▼
//!     ┌─────┐    ┌─────┐    ┌─────┐    ┌─────┐    ┌─────┐
//!     │ v1  │────│ v3  │────│ v2  │    │ v4  │────│ ... │
//!     └─────┘    └─────┘    └─────┘    └─────┘    └─────┘
//!                   └───────────────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Agent**: A village with a belief in [0, 1] and a risk level
//! - **Registry**: Every agent plus the fixed, symmetric neighbor topology
//! - **Protocol**: Typed messages routed to per-agent mailboxes
//! - **Consensus**: Proposals settled by a 2/3 approval majority
//! - **Workflow**: A dependency graph of steps, run wave by wave
//! - **Capability**: The injected reasoning behind each agent

pub mod agent;
pub mod capability;
pub mod channel;
pub mod config;
pub mod consensus;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod workflow;

pub use agent::{Agent, AgentHandle, AgentId, AgentState, Location, RiskLevel};
pub use capability::{
    Analysis, Analyzer, Ballot, Capabilities, Decider, Decision, DecisionRequest,
    Interpretation, Interpreter, RawInput,
};
pub use channel::Mailbox;
pub use config::{SwarmConfig, VillageConfig};
pub use consensus::{ConsensusWorkflow, Proposal, ProposalId, ProposalStatus, Tally, Vote};
pub use engine::{StepDispatcher, StepOutcome, WorkflowEngine, WorkflowRun};
pub use error::{Result, SwarmError};
pub use orchestrator::{
    AgentStatus, Consultation, Escalation, NetworkStatus, NeighborSummary, QueryResponse, Report,
    ReportOutcome, SwarmOrchestrator,
};
pub use protocol::{CommunicationProtocol, Message, MessageId, MessageType, Recipient};
pub use registry::Registry;
pub use workflow::{AgentSelector, Condition, RunContext, StepSpec, StepStatus, WorkflowDefinition};
