//! Proposal storage and lifecycle
//!
//! Each proposal lives in its own [`ProposalEntry`]; the entry's mutex is
//! the serialization point for every state change of that proposal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use quorum_common::{Identity, Timestamp};
use quorum_config::GovernanceConfig;

use crate::error::{GovernanceError, GovernanceResult};
use crate::membership::MembershipOracle;
use crate::types::{Proposal, ProposalId, ProposalKind, ProposalStatus};

/// Shared state of one proposal
#[derive(Debug)]
pub struct ProposalEntry {
    proposal: Mutex<Proposal>,
    executing: AtomicBool,
}

impl ProposalEntry {
    pub(crate) fn new(proposal: Proposal) -> Self {
        Self {
            proposal: Mutex::new(proposal),
            executing: AtomicBool::new(false),
        }
    }

    /// Exclusive access to the proposal record
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Proposal> {
        self.proposal.lock().await
    }

    /// Take the right to apply this proposal's effect.
    ///
    /// Returns `None` while another caller holds the claim. The claim owns a
    /// handle to the entry so it can move into a task that outlives the caller.
    pub(crate) fn try_claim_execution(entry: &Arc<Self>) -> Option<ExecutionClaim> {
        entry
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExecutionClaim {
                entry: Arc::clone(entry),
            })
    }
}

/// Held by the one caller currently applying a proposal's effect; released
/// on drop.
#[derive(Debug)]
pub(crate) struct ExecutionClaim {
    entry: Arc<ProposalEntry>,
}

impl ExecutionClaim {
    pub(crate) fn entry(&self) -> &Arc<ProposalEntry> {
        &self.entry
    }
}

impl Drop for ExecutionClaim {
    fn drop(&mut self) {
        self.entry.executing.store(false, Ordering::Release);
    }
}

/// Allowed voting periods, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotingPeriodPolicy {
    pub default: u64,
    pub min: u64,
    pub max: u64,
}

impl VotingPeriodPolicy {
    /// Resolve a requested period against the bounds
    pub fn resolve(&self, requested: Option<u64>) -> GovernanceResult<u64> {
        let period = requested.unwrap_or(self.default);
        if period == 0 || period < self.min || period > self.max {
            return Err(GovernanceError::InvalidDuration {
                requested: period,
                min: self.min,
                max: self.max,
            });
        }
        Ok(period)
    }
}

impl From<&GovernanceConfig> for VotingPeriodPolicy {
    fn from(config: &GovernanceConfig) -> Self {
        Self {
            default: config.default_voting_period,
            min: config.min_voting_period,
            max: config.max_voting_period,
        }
    }
}

/// Creates, stores and cancels proposals; owns id allocation
pub struct ProposalStore {
    proposals: DashMap<ProposalId, Arc<ProposalEntry>>,
    next_id: AtomicU64,
    periods: VotingPeriodPolicy,
}

impl ProposalStore {
    /// Create an empty store; ids start at 1
    pub fn new(periods: VotingPeriodPolicy) -> Self {
        Self {
            proposals: DashMap::new(),
            next_id: AtomicU64::new(1),
            periods,
        }
    }

    /// Hand out the next proposal id
    pub fn allocate_id(&self) -> ProposalId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Validate and open a new proposal for voting
    pub async fn submit(
        &self,
        caller: &Identity,
        kind: ProposalKind,
        target: Option<Identity>,
        voting_period: Option<u64>,
        membership: &dyn MembershipOracle,
        now: Timestamp,
    ) -> GovernanceResult<Proposal> {
        if !membership.is_current_member(caller).await {
            return Err(GovernanceError::NotAMember(caller.clone()));
        }

        check_target(&kind, target.as_ref(), membership).await?;

        let period = self.periods.resolve(voting_period)?;
        let voting_deadline = now.checked_add(period).ok_or(GovernanceError::InvalidDuration {
            requested: period,
            min: self.periods.min,
            max: self.periods.max,
        })?;

        let id = self.allocate_id();
        let mut proposal = Proposal::new(id, kind, caller.clone(), target, now, voting_deadline);
        proposal.transition(ProposalStatus::Active);

        self.proposals
            .insert(id, Arc::new(ProposalEntry::new(proposal.clone())));

        info!(
            "Proposal {} ({:?}) submitted by {}, voting until {}",
            id, proposal.kind, caller, voting_deadline
        );
        Ok(proposal)
    }

    /// The shared entry for `id`
    pub fn entry(&self, id: ProposalId) -> GovernanceResult<Arc<ProposalEntry>> {
        self.proposals
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(GovernanceError::ProposalNotFound(id))
    }

    /// A snapshot of proposal `id`
    pub async fn get(&self, id: ProposalId) -> GovernanceResult<Proposal> {
        let entry = self.entry(id)?;
        let proposal = entry.lock().await;
        Ok(proposal.clone())
    }

    /// Withdraw an Active proposal. Only the proposer or an admin may do so.
    pub async fn cancel(
        &self,
        caller: &Identity,
        id: ProposalId,
        membership: &dyn MembershipOracle,
    ) -> GovernanceResult<Proposal> {
        let entry = self.entry(id)?;
        let mut proposal = entry.lock().await;

        if &proposal.proposer != caller && !membership.is_admin(caller).await {
            return Err(GovernanceError::NotAuthorized(caller.clone()));
        }

        if proposal.status != ProposalStatus::Active
            || proposal.transition(ProposalStatus::Cancelled).is_none()
        {
            return Err(GovernanceError::ProposalNotActive {
                id,
                status: proposal.status,
            });
        }

        info!("Proposal {} cancelled by {}", id, caller);
        Ok(proposal.clone())
    }

    /// Snapshots of all proposals, newest first
    pub async fn list(&self) -> Vec<Proposal> {
        let entries: Vec<Arc<ProposalEntry>> = self
            .proposals
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            result.push(entry.lock().await.clone());
        }
        result.sort_by(|a, b| b.id.cmp(&a.id));
        result
    }

    /// Number of stored proposals
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }
}

async fn check_target(
    kind: &ProposalKind,
    target: Option<&Identity>,
    membership: &dyn MembershipOracle,
) -> GovernanceResult<()> {
    let target = match (kind.requires_target(), target) {
        (_, Some(target)) => target,
        (false, None) => return Ok(()),
        (true, None) => {
            return Err(GovernanceError::InvalidTarget(format!(
                "{:?} requires a target",
                kind
            )))
        }
    };

    match kind {
        ProposalKind::GenericAction { .. } => Ok(()),
        ProposalKind::GrantAdmin => {
            if !membership.is_current_member(target).await {
                return Err(GovernanceError::InvalidTarget(format!(
                    "{} is not a member",
                    target
                )));
            }
            if membership.is_admin(target).await {
                return Err(GovernanceError::InvalidTarget(format!(
                    "{} is already an admin",
                    target
                )));
            }
            Ok(())
        }
        ProposalKind::RevokeAdmin => {
            if !membership.is_admin(target).await {
                return Err(GovernanceError::InvalidTarget(format!(
                    "{} is not an admin",
                    target
                )));
            }
            if membership.admin_count().await <= 1 {
                debug!("Rejecting revocation of last admin {}", target);
                return Err(GovernanceError::InvalidTarget(format!(
                    "{} is the last admin",
                    target
                )));
            }
            Ok(())
        }
    }
}
