//! Governance manager implementation
//!
//! Wires the proposal store, vote ledger, finalization and execution engines
//! together behind the [`Governance`] trait, and publishes an event after
//! every state change it makes.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use quorum_common::{Clock, Identity};
use quorum_config::GovernanceConfig;

use crate::error::{GovernanceError, GovernanceResult};
use crate::events::{EventBus, GovernanceEvent};
use crate::execution::{ActionExecutor, ExecutionEngine, RegistryExecutor};
use crate::finalization::{Finalization, FinalizationEngine};
use crate::membership::{MembershipOracle, MembershipRegistry};
use crate::proposals::{ProposalStore, VotingPeriodPolicy};
use crate::types::{Proposal, ProposalId, ProposalKind, ProposalStatus, VoteChoice, VoteRecord, VoteTally};
use crate::voting::VotingLedger;
use crate::Governance;

/// The main implementation of the Governance trait
pub struct GovernanceManager {
    config: GovernanceConfig,
    clock: Arc<dyn Clock>,
    /// Source of membership facts for eligibility and quorum
    membership: Arc<dyn MembershipOracle>,
    store: ProposalStore,
    ledger: VotingLedger,
    finalizer: FinalizationEngine,
    execution: ExecutionEngine,
    events: EventBus,
}

impl GovernanceManager {
    /// Create a manager backed by `registry`, applying role changes to it
    pub fn new(
        config: GovernanceConfig,
        registry: Arc<MembershipRegistry>,
        clock: Arc<dyn Clock>,
    ) -> GovernanceResult<Self> {
        let executor = Arc::new(RegistryExecutor::new(Arc::clone(&registry)));
        Self::with_collaborators(config, registry, executor, clock)
    }

    /// Create a manager with an external membership source and executor
    pub fn with_collaborators(
        config: GovernanceConfig,
        membership: Arc<dyn MembershipOracle>,
        executor: Arc<dyn ActionExecutor>,
        clock: Arc<dyn Clock>,
    ) -> GovernanceResult<Self> {
        config.validate()?;

        info!(
            "Starting governance manager (quorum {} bps, approval {} bps)",
            config.quorum_bps, config.approval_bps
        );

        let events = EventBus::new(config.event_channel_capacity);

        Ok(Self {
            store: ProposalStore::new(VotingPeriodPolicy::from(&config)),
            ledger: VotingLedger::new(),
            finalizer: FinalizationEngine::from_config(&config),
            execution: ExecutionEngine::new(executor, config.execution_timeout(), events.clone()),
            events,
            config,
            clock,
            membership,
        })
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// Receive every governance event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.events.subscribe()
    }

    /// Finalize `id`, failing with `AlreadyFinalized` if it is settled.
    ///
    /// Exactly one caller ever gets `Ok` for a given proposal, and only that
    /// call publishes `ProposalFinalized`.
    pub async fn try_finalize(&self, id: ProposalId) -> GovernanceResult<Finalization> {
        let entry = self.store.entry(id)?;
        let now = self.clock.now();
        let finalization = self
            .finalizer
            .finalize(&entry, self.membership.as_ref(), now)
            .await?;

        self.events.publish(GovernanceEvent::ProposalFinalized {
            id,
            outcome: finalization.proposal.status,
            tally: finalization.proposal.tally,
            eligible: finalization.outcome.eligible,
            at: finalization.finalized_at,
        });

        Ok(finalization)
    }

    /// Execute `id`, failing with `AlreadyExecuted` if that already happened.
    ///
    /// The execution engine publishes `ProposalExecuted` or `ExecutionFailed`.
    pub async fn try_execute(&self, caller: &Identity, id: ProposalId) -> GovernanceResult<Proposal> {
        let entry = self.store.entry(id)?;
        self.execution
            .execute(entry, caller, Arc::clone(&self.clock))
            .await
    }

    /// Whether the cached tally of `id` matches its vote records
    pub async fn verify_tally(&self, id: ProposalId) -> GovernanceResult<bool> {
        let entry = self.store.entry(id)?;
        Ok(self.ledger.verify(&entry).await)
    }

    /// Finalize every Active proposal whose voting window has closed.
    ///
    /// Returns the proposals settled by this call. Proposals settled
    /// concurrently by someone else are skipped.
    pub async fn process_expired_proposals(&self) -> Vec<(ProposalId, ProposalStatus)> {
        let now = self.clock.now();
        let due: Vec<ProposalId> = self
            .store
            .list()
            .await
            .into_iter()
            .filter(|p| p.status == ProposalStatus::Active && now >= p.voting_deadline)
            .map(|p| p.id)
            .collect();

        if due.is_empty() {
            return Vec::new();
        }
        debug!("Finalizing {} expired proposals", due.len());

        let results = join_all(due.iter().map(|id| self.try_finalize(*id))).await;

        let mut settled = Vec::with_capacity(results.len());
        for (id, result) in due.into_iter().zip(results) {
            match result {
                Ok(finalization) => settled.push((id, finalization.proposal.status)),
                Err(GovernanceError::AlreadyFinalized { .. }) => {
                    debug!("Proposal {} was finalized concurrently", id)
                }
                Err(e) => warn!("Failed to finalize expired proposal {}: {}", id, e),
            }
        }
        settled.sort_by_key(|(id, _)| *id);
        settled
    }
}

#[async_trait]
impl Governance for GovernanceManager {
    async fn submit_proposal(
        &self,
        caller: &Identity,
        kind: ProposalKind,
        target: Option<Identity>,
        voting_period: Option<u64>,
    ) -> GovernanceResult<ProposalId> {
        let now = self.clock.now();
        let proposal = self
            .store
            .submit(caller, kind, target, voting_period, self.membership.as_ref(), now)
            .await?;

        self.events.publish(GovernanceEvent::ProposalSubmitted {
            id: proposal.id,
            proposer: proposal.proposer,
            kind: proposal.kind,
            target: proposal.target,
            voting_deadline: proposal.voting_deadline,
            at: proposal.created_at,
        });

        Ok(proposal.id)
    }

    async fn cast_vote(
        &self,
        caller: &Identity,
        id: ProposalId,
        choice: VoteChoice,
    ) -> GovernanceResult<VoteRecord> {
        let entry = self.store.entry(id)?;
        let now = self.clock.now();
        let record = self
            .ledger
            .cast_vote(&entry, caller, choice, self.membership.as_ref(), now)
            .await?;

        self.events.publish(GovernanceEvent::VoteCast {
            id,
            voter: record.voter.clone(),
            choice: record.choice,
            at: record.cast_at,
        });

        Ok(record)
    }

    async fn finalize(&self, id: ProposalId) -> GovernanceResult<ProposalStatus> {
        match self.try_finalize(id).await {
            Ok(finalization) => Ok(finalization.proposal.status),
            Err(GovernanceError::AlreadyFinalized { status, .. }) => {
                debug!("Proposal {} already finalized as {:?}", id, status);
                Ok(status)
            }
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, caller: &Identity, id: ProposalId) -> GovernanceResult<ProposalStatus> {
        match self.try_execute(caller, id).await {
            Ok(proposal) => Ok(proposal.status),
            Err(GovernanceError::AlreadyExecuted(_)) => {
                debug!("Proposal {} already executed", id);
                Ok(ProposalStatus::Executed)
            }
            Err(e) => Err(e),
        }
    }

    async fn cancel_proposal(&self, caller: &Identity, id: ProposalId) -> GovernanceResult<()> {
        self.store
            .cancel(caller, id, self.membership.as_ref())
            .await?;

        self.events.publish(GovernanceEvent::ProposalCancelled {
            id,
            cancelled_by: caller.clone(),
            at: self.clock.now(),
        });
        Ok(())
    }

    async fn get_proposal(&self, id: ProposalId) -> GovernanceResult<Proposal> {
        self.store.get(id).await
    }

    async fn get_tally(&self, id: ProposalId) -> GovernanceResult<VoteTally> {
        Ok(self.store.get(id).await?.tally)
    }

    async fn list_proposals(&self) -> GovernanceResult<Vec<Proposal>> {
        Ok(self.store.list().await)
    }

    async fn get_votes(&self, id: ProposalId) -> GovernanceResult<Vec<VoteRecord>> {
        self.store.entry(id)?;
        Ok(self.ledger.records(id))
    }

    async fn is_member(&self, address: &Identity) -> bool {
        self.membership.is_current_member(address).await
    }

    async fn member_count(&self) -> u64 {
        self.membership.member_count().await
    }
}
