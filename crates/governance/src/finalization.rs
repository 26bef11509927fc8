//! Outcome computation after the voting window closes

use serde::{Deserialize, Serialize};
use tracing::info;

use quorum_common::Timestamp;
use quorum_config::{GovernanceConfig, BPS_DENOMINATOR};

use crate::error::{GovernanceError, GovernanceResult};
use crate::membership::MembershipOracle;
use crate::proposals::ProposalEntry;
use crate::types::{Proposal, ProposalStatus, VoteTally};

/// Result of applying the quorum and approval rules to a tally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub total_votes: u64,
    pub eligible: u64,
    pub quorum_met: bool,
    pub approved: bool,
}

impl Outcome {
    /// The status a proposal with this outcome settles in
    pub fn status(&self) -> ProposalStatus {
        if self.approved {
            ProposalStatus::Approved
        } else {
            ProposalStatus::Rejected
        }
    }
}

/// A proposal that was just settled by this call
#[derive(Debug, Clone)]
pub struct Finalization {
    pub proposal: Proposal,
    pub outcome: Outcome,
    pub finalized_at: Timestamp,
}

/// Applies quorum and approval thresholds, expressed in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizationEngine {
    quorum_bps: u16,
    approval_bps: u16,
}

impl FinalizationEngine {
    pub fn new(quorum_bps: u16, approval_bps: u16) -> Self {
        Self {
            quorum_bps: quorum_bps.min(BPS_DENOMINATOR),
            approval_bps: approval_bps.min(BPS_DENOMINATOR),
        }
    }

    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self::new(config.quorum_bps, config.approval_bps)
    }

    /// Pure outcome of `tally` against `eligible` members.
    ///
    /// Abstentions count toward quorum and toward the approval denominator.
    /// Both comparisons are inclusive, and a proposal with no votes is never
    /// approved.
    pub fn compute_outcome(&self, tally: &VoteTally, eligible: u64) -> Outcome {
        let total = tally.total();
        let denominator = u128::from(BPS_DENOMINATOR);

        let quorum_met =
            u128::from(total) * denominator >= u128::from(eligible) * u128::from(self.quorum_bps);
        let approval_met = u128::from(tally.for_votes) * denominator
            >= u128::from(total) * u128::from(self.approval_bps);

        Outcome {
            total_votes: total,
            eligible,
            quorum_met,
            approved: total > 0 && quorum_met && approval_met,
        }
    }

    /// Settle the proposal held by `entry`.
    ///
    /// Only the first call after the deadline does any work; later calls see
    /// a settled status and get `AlreadyFinalized`.
    pub async fn finalize(
        &self,
        entry: &ProposalEntry,
        membership: &dyn MembershipOracle,
        now: Timestamp,
    ) -> GovernanceResult<Finalization> {
        let mut proposal = entry.lock().await;
        let id = proposal.id;

        if proposal.status != ProposalStatus::Active {
            return Err(GovernanceError::AlreadyFinalized {
                id,
                status: proposal.status,
            });
        }

        if now < proposal.voting_deadline {
            return Err(GovernanceError::VotingStillOpen {
                id,
                deadline: proposal.voting_deadline,
            });
        }

        // Quorum denominator is membership at finalization time, not at creation.
        let eligible = membership.member_count().await;
        let outcome = self.compute_outcome(&proposal.tally, eligible);

        if proposal.transition(outcome.status()).is_none() {
            return Err(GovernanceError::AlreadyFinalized {
                id,
                status: proposal.status,
            });
        }

        info!(
            "Proposal {} finalized as {:?} ({} of {} eligible voted, quorum met: {})",
            id,
            proposal.status,
            outcome.total_votes,
            eligible,
            outcome.quorum_met
        );

        Ok(Finalization {
            proposal: proposal.clone(),
            outcome,
            finalized_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(for_votes: u64, against_votes: u64, abstain_votes: u64) -> VoteTally {
        VoteTally {
            for_votes,
            against_votes,
            abstain_votes,
        }
    }

    #[test]
    fn test_quorum_boundary() {
        let engine = FinalizationEngine::new(5_000, 0);
        assert!(engine.compute_outcome(&tally(5, 0, 0), 10).quorum_met);
        assert!(!engine.compute_outcome(&tally(4, 0, 0), 10).quorum_met);
        assert!(engine.compute_outcome(&tally(1, 2, 2), 10).quorum_met);
    }

    #[test]
    fn test_approval_tie_passes() {
        let engine = FinalizationEngine::new(0, 5_000);
        let outcome = engine.compute_outcome(&tally(5, 5, 0), 10);
        assert!(outcome.approved);
        assert_eq!(outcome.status(), ProposalStatus::Approved);
    }

    #[test]
    fn test_abstentions_dilute_approval() {
        let engine = FinalizationEngine::new(0, 5_000);
        // 4 of 9 votes are For: below half even though For beats Against.
        let outcome = engine.compute_outcome(&tally(4, 2, 3), 10);
        assert!(outcome.quorum_met);
        assert!(!outcome.approved);
    }

    #[test]
    fn test_zero_votes_never_approve() {
        let engine = FinalizationEngine::new(0, 0);
        let outcome = engine.compute_outcome(&tally(0, 0, 0), 5);
        assert!(outcome.quorum_met);
        assert!(!outcome.approved);
        assert_eq!(outcome.status(), ProposalStatus::Rejected);
    }

    #[test]
    fn test_supermajority_scenario() {
        let engine = FinalizationEngine::new(6_600, 5_000);
        let outcome = engine.compute_outcome(&tally(2, 1, 0), 3);
        assert!(outcome.quorum_met);
        assert!(outcome.approved);

        let engine = FinalizationEngine::new(6_600, 7_000);
        assert!(!engine.compute_outcome(&tally(2, 1, 0), 3).approved);
    }

    #[test]
    fn test_large_counts_do_not_overflow() {
        let engine = FinalizationEngine::new(10_000, 10_000);
        let outcome = engine.compute_outcome(&tally(u64::MAX / 2, 0, 0), u64::MAX / 2);
        assert!(outcome.quorum_met);
        assert!(outcome.approved);
    }

    #[test]
    fn test_thresholds_are_clamped() {
        let engine = FinalizationEngine::new(u16::MAX, u16::MAX);
        let outcome = engine.compute_outcome(&tally(3, 0, 0), 3);
        assert!(outcome.approved);
    }
}
