//! Governance engine for Quorum
//!
//! Members submit proposals, vote on them during a fixed window, and once the
//! window closes anyone may finalize the proposal against the configured
//! quorum and approval thresholds. Approved proposals are executed exactly
//! once through an [`ActionExecutor`].
//!
//! Every operation takes an already-authenticated caller [`Identity`]; the
//! engine does not verify credentials.

use async_trait::async_trait;

use quorum_common::Identity;

pub mod error;
pub mod events;
pub mod execution;
pub mod finalization;
pub mod manager;
pub mod membership;
pub mod proposals;
pub mod types;
pub mod voting;

pub use error::{ErrorCategory, ExecutionError, GovernanceError, GovernanceResult};
pub use events::{EventBus, GovernanceEvent};
pub use execution::{ActionExecutor, ExecutionEngine, RegistryExecutor};
pub use finalization::{Finalization, FinalizationEngine, Outcome};
pub use manager::GovernanceManager;
pub use membership::{MembershipOracle, MembershipRegistry};
pub use proposals::{ProposalEntry, ProposalStore, VotingPeriodPolicy};
pub use types::{
    Member, Proposal, ProposalId, ProposalKind, ProposalStatus, VoteChoice, VoteRecord, VoteTally,
};
pub use voting::VotingLedger;

/// A trait for governance operations
#[async_trait]
pub trait Governance: Send + Sync {
    /// Open a new proposal for voting and return its id.
    ///
    /// `voting_period` falls back to the configured default when `None`.
    async fn submit_proposal(
        &self,
        caller: &Identity,
        kind: ProposalKind,
        target: Option<Identity>,
        voting_period: Option<u64>,
    ) -> GovernanceResult<ProposalId>;

    /// Cast a vote on a proposal
    async fn cast_vote(
        &self,
        caller: &Identity,
        id: ProposalId,
        choice: VoteChoice,
    ) -> GovernanceResult<VoteRecord>;

    /// Settle a proposal whose voting window has closed.
    ///
    /// Returns the settled status; calling it again returns the same status.
    async fn finalize(&self, id: ProposalId) -> GovernanceResult<ProposalStatus>;

    /// Apply an approved proposal.
    ///
    /// Returns `Executed`, including when the proposal was already executed.
    async fn execute(&self, caller: &Identity, id: ProposalId) -> GovernanceResult<ProposalStatus>;

    /// Cancel a proposal (only allowed by the proposer or admins)
    async fn cancel_proposal(&self, caller: &Identity, id: ProposalId) -> GovernanceResult<()>;

    /// Get a proposal by ID
    async fn get_proposal(&self, id: ProposalId) -> GovernanceResult<Proposal>;

    /// Get the current tally of a proposal
    async fn get_tally(&self, id: ProposalId) -> GovernanceResult<VoteTally>;

    /// List all proposals, newest first
    async fn list_proposals(&self) -> GovernanceResult<Vec<Proposal>>;

    /// Get votes for a proposal, oldest first
    async fn get_votes(&self, id: ProposalId) -> GovernanceResult<Vec<VoteRecord>>;

    async fn is_member(&self, address: &Identity) -> bool;

    async fn member_count(&self) -> u64;
}
