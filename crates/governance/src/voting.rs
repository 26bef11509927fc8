//! Vote ledger
//!
//! Records at most one vote per (proposal, voter). A vote is inserted and
//! counted while the proposal's lock is held, so the cached tally on the
//! proposal always matches the records.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use dashmap::DashMap;
use tracing::debug;

use quorum_common::{Identity, Timestamp};

use crate::error::{GovernanceError, GovernanceResult};
use crate::membership::MembershipOracle;
use crate::proposals::ProposalEntry;
use crate::types::{ProposalId, ProposalStatus, VoteChoice, VoteRecord, VoteTally};

/// Write-once vote records, keyed by proposal then voter
#[derive(Debug, Default)]
pub struct VotingLedger {
    records: DashMap<ProposalId, HashMap<Identity, VoteRecord>>,
}

impl VotingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `voter`'s choice on the proposal held by `entry`.
    ///
    /// Checks run in order: proposal active, window open, voter is a member,
    /// voter has not voted yet.
    pub async fn cast_vote(
        &self,
        entry: &ProposalEntry,
        voter: &Identity,
        choice: VoteChoice,
        membership: &dyn MembershipOracle,
        now: Timestamp,
    ) -> GovernanceResult<VoteRecord> {
        let mut proposal = entry.lock().await;
        let id = proposal.id;

        if proposal.status != ProposalStatus::Active {
            return Err(GovernanceError::ProposalNotActive {
                id,
                status: proposal.status,
            });
        }

        if now >= proposal.voting_deadline {
            return Err(GovernanceError::VotingClosed {
                id,
                deadline: proposal.voting_deadline,
            });
        }

        if !membership.is_current_member(voter).await {
            return Err(GovernanceError::NotAMember(voter.clone()));
        }

        let record = VoteRecord {
            proposal_id: id,
            voter: voter.clone(),
            choice,
            cast_at: now,
        };

        {
            let mut ballots = self.records.entry(id).or_default();
            match ballots.entry(voter.clone()) {
                Entry::Occupied(_) => {
                    return Err(GovernanceError::AlreadyVoted {
                        id,
                        voter: voter.clone(),
                    })
                }
                Entry::Vacant(slot) => {
                    slot.insert(record.clone());
                }
            }
        }
        proposal.tally.record(choice);

        debug!("{} voted {:?} on proposal {}", voter, choice, id);
        Ok(record)
    }

    /// All votes on a proposal, oldest first
    pub fn records(&self, id: ProposalId) -> Vec<VoteRecord> {
        let mut result: Vec<VoteRecord> = self
            .records
            .get(&id)
            .map(|ballots| ballots.values().cloned().collect())
            .unwrap_or_default();
        result.sort_by(|a, b| a.cast_at.cmp(&b.cast_at).then_with(|| a.voter.cmp(&b.voter)));
        result
    }

    /// The vote `voter` cast on proposal `id`, if any
    pub fn vote_of(&self, id: ProposalId, voter: &Identity) -> Option<VoteRecord> {
        self.records
            .get(&id)
            .and_then(|ballots| ballots.get(voter).cloned())
    }

    /// Number of votes recorded for a proposal
    pub fn count(&self, id: ProposalId) -> u64 {
        self.records
            .get(&id)
            .map(|ballots| ballots.len() as u64)
            .unwrap_or(0)
    }

    /// Tally recomputed from the records alone
    pub fn recount(&self, id: ProposalId) -> VoteTally {
        self.records
            .get(&id)
            .map(|ballots| VoteTally::from_records(ballots.values()))
            .unwrap_or_default()
    }

    /// Whether the proposal's cached tally equals a recount of its records
    pub async fn verify(&self, entry: &ProposalEntry) -> bool {
        let proposal = entry.lock().await;
        let recount = self.recount(proposal.id);
        if recount != proposal.tally {
            tracing::error!(
                "Tally mismatch on proposal {}: cached {:?}, recorded {:?}",
                proposal.id,
                proposal.tally,
                recount
            );
            return false;
        }
        true
    }
}
