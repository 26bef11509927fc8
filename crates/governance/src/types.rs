//! Records owned by the governance components

use serde::{Deserialize, Serialize};

use quorum_common::{Identity, Timestamp};

/// Proposal identifier; allocated monotonically and never reused
pub type ProposalId = u64;

/// A registered participant.
///
/// Members are never deleted; removal clears `is_member` so that historical
/// votes stay attributable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub address: Identity,
    pub is_member: bool,
    pub is_admin: bool,
    pub joined_at: Timestamp,
}

/// What an approved proposal does
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalKind {
    /// An application-defined action, applied by the host's executor
    GenericAction { action: String },
    /// Give the target the admin role
    GrantAdmin,
    /// Take the admin role away from the target
    RevokeAdmin,
}

impl ProposalKind {
    /// Whether the kind can only be submitted with a target
    pub fn requires_target(&self) -> bool {
        match self {
            Self::GenericAction { .. } => false,
            Self::GrantAdmin | Self::RevokeAdmin => true,
        }
    }
}

/// Lifecycle state of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Built but not yet opened for voting
    Pending,
    /// Open for voting
    Active,
    /// Voting closed with quorum and approval met
    Approved,
    /// Voting closed without quorum or approval
    Rejected,
    /// The approved effect has been applied
    Executed,
    /// Withdrawn before finalization
    Cancelled,
}

impl ProposalStatus {
    /// Whether `self -> next` is an edge of the lifecycle graph.
    ///
    /// Edges only ever point forward:
    /// `Pending -> Active -> {Approved | Rejected} -> Executed`, with
    /// `Cancelled` reachable from `Pending` and `Active`.
    pub fn can_transition_to(self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Cancelled)
                | (Active, Approved)
                | (Active, Rejected)
                | (Active, Cancelled)
                | (Approved, Executed)
        )
    }

    /// No further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Executed | Self::Cancelled)
    }

    /// Voting is over (successfully or not)
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::Pending | Self::Active)
    }
}

/// A member's choice on a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteChoice {
    For,
    Against,
    Abstain,
}

/// A single write-once vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub proposal_id: ProposalId,
    pub voter: Identity,
    pub choice: VoteChoice,
    pub cast_at: Timestamp,
}

/// Running totals per choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub for_votes: u64,
    pub against_votes: u64,
    pub abstain_votes: u64,
}

impl VoteTally {
    /// All votes cast, abstentions included
    pub fn total(&self) -> u64 {
        self.for_votes + self.against_votes + self.abstain_votes
    }

    /// Count one more vote for `choice`
    pub fn record(&mut self, choice: VoteChoice) {
        match choice {
            VoteChoice::For => self.for_votes += 1,
            VoteChoice::Against => self.against_votes += 1,
            VoteChoice::Abstain => self.abstain_votes += 1,
        }
    }

    /// Rebuild a tally from vote records
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a VoteRecord>,
    {
        let mut tally = Self::default();
        for record in records {
            tally.record(record.choice);
        }
        tally
    }
}

/// A governance proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub kind: ProposalKind,
    pub proposer: Identity,
    pub target: Option<Identity>,
    pub created_at: Timestamp,
    pub voting_deadline: Timestamp,
    pub tally: VoteTally,
    pub status: ProposalStatus,
    pub executed_at: Option<Timestamp>,
}

impl Proposal {
    /// Build a Pending proposal with an empty tally
    pub fn new(
        id: ProposalId,
        kind: ProposalKind,
        proposer: Identity,
        target: Option<Identity>,
        created_at: Timestamp,
        voting_deadline: Timestamp,
    ) -> Self {
        Self {
            id,
            kind,
            proposer,
            target,
            created_at,
            voting_deadline,
            tally: VoteTally::default(),
            status: ProposalStatus::Pending,
            executed_at: None,
        }
    }

    /// Move to `next`, refusing any edge not in the lifecycle graph.
    ///
    /// Returns the previous status.
    pub(crate) fn transition(&mut self, next: ProposalStatus) -> Option<ProposalStatus> {
        if self.status.can_transition_to(next) {
            let previous = self.status;
            self.status = next;
            Some(previous)
        } else {
            None
        }
    }

    /// Whether a vote cast at `now` is still inside the window
    pub fn is_open_for_voting(&self, now: Timestamp) -> bool {
        self.status == ProposalStatus::Active && now < self.voting_deadline
    }
}
