//! Proposal lifecycle and vote tallying

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::agent::AgentId;
use crate::error::{Result, SwarmError};

/// Unique identifier for a [`Proposal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub Uuid);

impl ProposalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProposalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Approve,
    Reject,
    RequestMoreData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Voting,
    Approved,
    Rejected,
}

impl ProposalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Voting)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub vote: Vote,
    /// Within [0, 1]
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// A proposed action awaiting votes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposer: AgentId,
    pub content: Value,
    pub eligible_voters: BTreeSet<AgentId>,
    pub votes: BTreeMap<AgentId, VoteRecord>,
    pub status: ProposalStatus,
    pub approval_rate: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl Proposal {
    /// Number of recorded votes of one kind
    pub fn count(&self, vote: Vote) -> usize {
        self.votes.values().filter(|r| r.vote == vote).count()
    }

    /// Settle the outcome from the votes recorded so far. Runs at most once.
    fn evaluate(&mut self) {
        if self.status.is_terminal() {
            return;
        }

        let total = self.votes.len();
        let approve = self.count(Vote::Approve);
        let rate = if total == 0 {
            0.0
        } else {
            approve as f64 / total as f64
        };

        // 2/3 majority, boundary inclusive, compared without rounding
        self.status = if total > 0 && 3 * approve >= 2 * total {
            ProposalStatus::Approved
        } else {
            ProposalStatus::Rejected
        };
        self.approval_rate = Some(rate);
        self.evaluated_at = Some(Utc::now());

        info!(
            proposal_id = %self.id,
            status = ?self.status,
            approve,
            total,
            "Proposal evaluated"
        );
    }

    /// Summarize the votes recorded so far
    pub fn tally(&self) -> Tally {
        Tally {
            proposal_id: self.id,
            status: self.status,
            approve: self.count(Vote::Approve),
            reject: self.count(Vote::Reject),
            request_more_data: self.count(Vote::RequestMoreData),
            total_votes: self.votes.len(),
            eligible: self.eligible_voters.len(),
            approval_rate: self.approval_rate.unwrap_or(0.0),
            non_responders: self
                .eligible_voters
                .iter()
                .filter(|v| !self.votes.contains_key(*v))
                .cloned()
                .collect(),
        }
    }
}

/// Summary of a proposal's votes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub proposal_id: ProposalId,
    pub status: ProposalStatus,
    pub approve: usize,
    pub reject: usize,
    pub request_more_data: usize,
    pub total_votes: usize,
    pub eligible: usize,
    pub approval_rate: f64,
    pub non_responders: Vec<AgentId>,
}

impl Tally {
    /// True iff the proposal was approved
    pub fn consensus_reached(&self) -> bool {
        self.status == ProposalStatus::Approved
    }
}

/// Runs proposals through `voting -> approved | rejected`.
///
/// Each proposal has its own lock, so votes on one proposal are serialized
/// while different proposals proceed independently.
#[derive(Default)]
pub struct ConsensusWorkflow {
    proposals: RwLock<HashMap<ProposalId, Arc<Mutex<Proposal>>>>,
}

impl ConsensusWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a proposal for the given voters
    pub fn initiate(
        &self,
        proposer: &AgentId,
        content: Value,
        eligible_voters: impl IntoIterator<Item = AgentId>,
    ) -> Result<ProposalId> {
        let eligible_voters: BTreeSet<AgentId> = eligible_voters.into_iter().collect();
        if eligible_voters.is_empty() {
            return Err(SwarmError::InvalidProposal(
                "eligible voter set is empty".into(),
            ));
        }

        let proposal = Proposal {
            id: ProposalId::new(),
            proposer: proposer.clone(),
            content,
            eligible_voters,
            votes: BTreeMap::new(),
            status: ProposalStatus::Voting,
            approval_rate: None,
            created_at: Utc::now(),
            evaluated_at: None,
        };
        let id = proposal.id;

        info!(
            proposal_id = %id,
            proposer = %proposer,
            voters = proposal.eligible_voters.len(),
            "Proposal initiated"
        );
        self.proposals.write().insert(id, Arc::new(Mutex::new(proposal)));
        Ok(id)
    }

    fn entry(&self, id: &ProposalId) -> Result<Arc<Mutex<Proposal>>> {
        self.proposals
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SwarmError::proposal_not_found(id))
    }

    /// Record a vote, or say why it was refused.
    ///
    /// The first vote from a voter stands; later ones are refused. Recording
    /// the last outstanding vote evaluates the proposal.
    pub fn try_cast_vote(
        &self,
        proposal_id: &ProposalId,
        voter: &AgentId,
        vote: Vote,
        confidence: f64,
    ) -> Result<ProposalStatus> {
        let entry = self.entry(proposal_id)?;
        let mut proposal = entry.lock();

        if !proposal.eligible_voters.contains(voter) {
            return Err(SwarmError::InvalidVote(format!(
                "{voter} is not eligible on {proposal_id}"
            )));
        }
        if proposal.status.is_terminal() {
            return Err(SwarmError::InvalidVote(format!(
                "{proposal_id} is no longer voting"
            )));
        }
        if proposal.votes.contains_key(voter) {
            return Err(SwarmError::InvalidVote(format!(
                "{voter} already voted on {proposal_id}"
            )));
        }

        proposal.votes.insert(
            voter.clone(),
            VoteRecord {
                vote,
                confidence: if confidence.is_finite() {
                    confidence.clamp(0.0, 1.0)
                } else {
                    0.0
                },
                timestamp: Utc::now(),
            },
        );
        debug!(proposal_id = %proposal_id, voter = %voter, ?vote, "Vote recorded");

        if proposal.votes.len() == proposal.eligible_voters.len() {
            proposal.evaluate();
        }
        Ok(proposal.status)
    }

    /// Boolean form of [`try_cast_vote`](Self::try_cast_vote)
    pub fn cast_vote(
        &self,
        proposal_id: &ProposalId,
        voter: &AgentId,
        vote: Vote,
        confidence: f64,
    ) -> bool {
        self.try_cast_vote(proposal_id, voter, vote, confidence)
            .is_ok()
    }

    /// Voting window over: settle on whatever votes arrived.
    pub fn close(&self, proposal_id: &ProposalId) -> Result<Proposal> {
        let entry = self.entry(proposal_id)?;
        let mut proposal = entry.lock();
        proposal.evaluate();
        Ok(proposal.clone())
    }

    /// Snapshot of a proposal, or `NotFound`
    pub fn get_status(&self, proposal_id: &ProposalId) -> Result<Proposal> {
        Ok(self.entry(proposal_id)?.lock().clone())
    }

    /// True iff the proposal exists and was approved
    pub fn is_consensus_reached(&self, proposal_id: &ProposalId) -> bool {
        self.entry(proposal_id)
            .map(|p| p.lock().status == ProposalStatus::Approved)
            .unwrap_or(false)
    }

    /// Number of proposals ever initiated
    pub fn len(&self) -> usize {
        self.proposals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn voters(n: usize) -> Vec<AgentId> {
        (1..=n).map(|i| AgentId::from(format!("v{i}"))).collect()
    }

    fn open(workflow: &ConsensusWorkflow, n: usize) -> ProposalId {
        workflow
            .initiate(&AgentId::from("v1"), json!({ "action": "escalate" }), voters(n))
            .unwrap()
    }

    // === Initiation Tests ===

    #[test]
    fn test_empty_voters_rejected() {
        let workflow = ConsensusWorkflow::new();
        let result = workflow.initiate(&AgentId::from("v1"), json!({}), Vec::new());
        assert!(matches!(result, Err(SwarmError::InvalidProposal(_))));
        assert!(workflow.is_empty());
    }

    #[test]
    fn test_initiate_starts_voting() {
        let workflow = ConsensusWorkflow::new();
        let id = open(&workflow, 3);
        let proposal = workflow.get_status(&id).unwrap();
        assert_eq!(proposal.status, ProposalStatus::Voting);
        assert!(proposal.evaluated_at.is_none());
    }

    // === Threshold Tests ===

    fn run(approvals: usize, n: usize) -> Proposal {
        let workflow = ConsensusWorkflow::new();
        let id = open(&workflow, n);
        for (i, voter) in voters(n).iter().enumerate() {
            let vote = if i < approvals { Vote::Approve } else { Vote::Reject };
            assert!(workflow.cast_vote(&id, voter, vote, 0.9));
        }
        workflow.get_status(&id).unwrap()
    }

    #[test]
    fn test_unanimous_approval() {
        assert_eq!(run(3, 3).status, ProposalStatus::Approved);
    }

    #[test]
    fn test_one_of_three_rejected() {
        let proposal = run(1, 3);
        assert_eq!(proposal.status, ProposalStatus::Rejected);
        assert!(proposal.evaluated_at.is_some());
    }

    #[test]
    fn test_two_of_three_boundary_approved() {
        let proposal = run(2, 3);
        assert_eq!(proposal.status, ProposalStatus::Approved);
        assert!((proposal.approval_rate.unwrap() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_request_more_data_counts_against() {
        let workflow = ConsensusWorkflow::new();
        let id = open(&workflow, 3);
        let v = voters(3);
        workflow.cast_vote(&id, &v[0], Vote::Approve, 1.0);
        workflow.cast_vote(&id, &v[1], Vote::RequestMoreData, 1.0);
        workflow.cast_vote(&id, &v[2], Vote::RequestMoreData, 1.0);

        let tally = workflow.get_status(&id).unwrap().tally();
        assert_eq!(tally.status, ProposalStatus::Rejected);
        assert_eq!(tally.request_more_data, 2);
    }

    // === Vote Refusal Tests ===

    #[test]
    fn test_duplicate_vote_first_wins() {
        let workflow = ConsensusWorkflow::new();
        let id = open(&workflow, 3);
        let voter = AgentId::from("v2");

        assert!(workflow.cast_vote(&id, &voter, Vote::Approve, 0.7));
        assert!(!workflow.cast_vote(&id, &voter, Vote::Reject, 1.0));

        let proposal = workflow.get_status(&id).unwrap();
        assert_eq!(proposal.votes[&voter].vote, Vote::Approve);
        assert_eq!(proposal.votes[&voter].confidence, 0.7);
        assert_eq!(proposal.votes.len(), 1);
    }

    #[test]
    fn test_ineligible_voter_refused() {
        let workflow = ConsensusWorkflow::new();
        let id = open(&workflow, 2);
        let result = workflow.try_cast_vote(&id, &AgentId::from("v9"), Vote::Approve, 1.0);
        assert!(matches!(result, Err(SwarmError::InvalidVote(_))));
    }

    #[test]
    fn test_unknown_proposal_refused() {
        let workflow = ConsensusWorkflow::new();
        let result =
            workflow.try_cast_vote(&ProposalId::new(), &AgentId::from("v1"), Vote::Approve, 1.0);
        assert!(matches!(result, Err(SwarmError::NotFound { .. })));
        assert!(workflow.get_status(&ProposalId::new()).is_err());
    }

    #[test]
    fn test_no_votes_after_evaluation() {
        let workflow = ConsensusWorkflow::new();
        let id = open(&workflow, 1);
        assert!(workflow.cast_vote(&id, &AgentId::from("v1"), Vote::Approve, 1.0));

        let evaluated_at = workflow.get_status(&id).unwrap().evaluated_at;
        assert!(!workflow.cast_vote(&id, &AgentId::from("v1"), Vote::Reject, 1.0));
        assert_eq!(workflow.get_status(&id).unwrap().evaluated_at, evaluated_at);
    }

    // === Close Tests ===

    #[test]
    fn test_close_counts_only_recorded_votes() {
        let workflow = ConsensusWorkflow::new();
        let id = open(&workflow, 4);
        let v = voters(4);
        workflow.cast_vote(&id, &v[0], Vote::Approve, 1.0);
        workflow.cast_vote(&id, &v[1], Vote::Approve, 1.0);

        let proposal = workflow.close(&id).unwrap();
        assert_eq!(proposal.status, ProposalStatus::Approved);

        let tally = proposal.tally();
        assert_eq!(tally.total_votes, 2);
        assert_eq!(tally.non_responders, vec![v[2].clone(), v[3].clone()]);
        assert!(!workflow.cast_vote(&id, &v[2], Vote::Reject, 1.0));
    }

    #[test]
    fn test_close_without_votes_rejects() {
        let workflow = ConsensusWorkflow::new();
        let id = open(&workflow, 2);
        let proposal = workflow.close(&id).unwrap();
        assert_eq!(proposal.status, ProposalStatus::Rejected);
        assert_eq!(proposal.approval_rate, Some(0.0));
    }

    #[test]
    fn test_close_is_idempotent() {
        let workflow = ConsensusWorkflow::new();
        let id = open(&workflow, 1);
        let first = workflow.close(&id).unwrap();
        let second = workflow.close(&id).unwrap();
        assert_eq!(first.evaluated_at, second.evaluated_at);
    }

    // === Concurrency Tests ===

    #[test]
    fn test_concurrent_votes_evaluate_once() {
        let workflow = Arc::new(ConsensusWorkflow::new());
        let n = 16;
        let id = open(&workflow, n);

        let threads: Vec<_> = voters(n)
            .into_iter()
            .flat_map(|voter| {
                // every voter races two ballots; exactly one may land
                [Vote::Approve, Vote::Reject].map(|vote| {
                    let workflow = workflow.clone();
                    let voter = voter.clone();
                    std::thread::spawn(move || workflow.cast_vote(&id, &voter, vote, 1.0))
                })
            })
            .collect();
        let accepted = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|ok| *ok)
            .count();

        let proposal = workflow.get_status(&id).unwrap();
        assert_eq!(accepted, n);
        assert_eq!(proposal.votes.len(), n);
        assert!(proposal.status.is_terminal());
    }
}
