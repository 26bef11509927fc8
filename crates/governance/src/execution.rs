//! Proposal execution
//!
//! Applies the effect of an approved proposal exactly once. The status only
//! flips to Executed after the effect succeeds; a failed effect leaves the
//! proposal Approved so a later call can retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use quorum_common::{Clock, Identity};

use crate::error::{ExecutionError, GovernanceError, GovernanceResult};
use crate::events::{EventBus, GovernanceEvent};
use crate::membership::MembershipRegistry;
use crate::proposals::{ExecutionClaim, ProposalEntry};
use crate::types::{Proposal, ProposalId, ProposalKind, ProposalStatus};

/// Applies the side effect of an approved proposal
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Apply `kind` to `target`
    async fn apply(&self, kind: &ProposalKind, target: Option<&Identity>) -> Result<(), ExecutionError>;
}

/// Executor that applies role changes to a [`MembershipRegistry`].
///
/// Generic actions have no effect inside the engine; they are logged so the
/// decision is visible to operators.
pub struct RegistryExecutor {
    registry: Arc<MembershipRegistry>,
}

impl RegistryExecutor {
    pub fn new(registry: Arc<MembershipRegistry>) -> Self {
        Self { registry }
    }

    fn require_target<'a>(
        kind: &ProposalKind,
        target: Option<&'a Identity>,
    ) -> Result<&'a Identity, ExecutionError> {
        target.ok_or_else(|| ExecutionError::MissingTarget(kind.clone()))
    }
}

#[async_trait]
impl ActionExecutor for RegistryExecutor {
    async fn apply(&self, kind: &ProposalKind, target: Option<&Identity>) -> Result<(), ExecutionError> {
        match kind {
            ProposalKind::GrantAdmin => {
                let target = Self::require_target(kind, target)?;
                self.registry
                    .grant_admin(target)
                    .await
                    .map_err(|e| ExecutionError::Rejected(e.to_string()))
            }
            ProposalKind::RevokeAdmin => {
                let target = Self::require_target(kind, target)?;
                self.registry
                    .revoke_admin(target)
                    .await
                    .map_err(|e| ExecutionError::Rejected(e.to_string()))
            }
            ProposalKind::GenericAction { action } => {
                info!("Generic action approved: {} (target: {:?})", action, target);
                Ok(())
            }
        }
    }
}

/// Runs the executor for approved proposals, at most once per proposal
pub struct ExecutionEngine {
    executor: Arc<dyn ActionExecutor>,
    timeout: Duration,
    events: EventBus,
}

impl ExecutionEngine {
    pub fn new(executor: Arc<dyn ActionExecutor>, timeout: Duration, events: EventBus) -> Self {
        Self {
            executor,
            timeout,
            events,
        }
    }

    /// Apply the effect of the proposal held by `entry`.
    ///
    /// The effect and the commit to `Executed` run on a task owned by the
    /// engine, so dropping the returned future never separates the two: once
    /// the claim is taken the task runs to completion and publishes the
    /// outcome itself. The proposal lock is not held while the executor runs.
    pub async fn execute(
        &self,
        entry: Arc<ProposalEntry>,
        caller: &Identity,
        clock: Arc<dyn Clock>,
    ) -> GovernanceResult<Proposal> {
        let (id, kind, target, claim) = {
            let proposal = entry.lock().await;
            let id = proposal.id;
            match proposal.status {
                ProposalStatus::Approved => {}
                ProposalStatus::Executed => return Err(GovernanceError::AlreadyExecuted(id)),
                status => return Err(GovernanceError::NotApproved { id, status }),
            }
            let claim = ProposalEntry::try_claim_execution(&entry)
                .ok_or(GovernanceError::ExecutionInProgress(id))?;
            (id, proposal.kind.clone(), proposal.target.clone(), claim)
        };

        debug!("{} is executing proposal {} ({:?})", caller, id, kind);

        let run = ExecutionRun {
            id,
            kind,
            target,
            caller: caller.clone(),
            claim,
            clock,
            executor: Arc::clone(&self.executor),
            timeout: self.timeout,
            events: self.events.clone(),
        };

        match tokio::spawn(run.finish()).await {
            Ok(result) => result,
            Err(e) => {
                error!("Execution task for proposal {} did not complete: {}", id, e);
                Err(GovernanceError::ExecutionFailed {
                    id,
                    source: ExecutionError::Rejected(format!("execution task failed: {}", e)),
                })
            }
        }
    }
}

/// Everything the detached half of an execution needs
struct ExecutionRun {
    id: ProposalId,
    kind: ProposalKind,
    target: Option<Identity>,
    caller: Identity,
    claim: ExecutionClaim,
    clock: Arc<dyn Clock>,
    executor: Arc<dyn ActionExecutor>,
    timeout: Duration,
    events: EventBus,
}

impl ExecutionRun {
    async fn finish(self) -> GovernanceResult<Proposal> {
        let Self {
            id,
            kind,
            target,
            caller,
            claim,
            clock,
            executor,
            timeout,
            events,
        } = self;

        let result = match tokio::time::timeout(timeout, executor.apply(&kind, target.as_ref())).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::TimedOut {
                seconds: timeout.as_secs(),
            }),
        };

        if let Err(source) = result {
            warn!("Execution of proposal {} failed, leaving it approved: {}", id, source);
            events.publish(GovernanceEvent::ExecutionFailed {
                id,
                attempted_by: caller,
                reason: source.to_string(),
                at: clock.now(),
            });
            return Err(GovernanceError::ExecutionFailed { id, source });
        }

        let proposal = {
            let mut proposal = claim.entry().lock().await;
            if proposal.transition(ProposalStatus::Executed).is_none() {
                error!(
                    "Proposal {} left Approved during execution (now {:?})",
                    id, proposal.status
                );
                return Err(GovernanceError::AlreadyExecuted(id));
            }
            proposal.executed_at = Some(clock.now());
            proposal.clone()
        };
        drop(claim);

        info!("Proposal {} executed by {}", id, caller);
        events.publish(GovernanceEvent::ProposalExecuted {
            id,
            executed_by: caller,
            at: proposal.executed_at.unwrap_or_else(|| clock.now()),
        });
        Ok(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    use quorum_common::ManualClock;

    fn id(s: &str) -> Identity {
        Identity::from(s)
    }

    fn registry() -> Arc<MembershipRegistry> {
        let clock = Arc::new(ManualClock::new(0));
        Arc::new(MembershipRegistry::new(vec![id("alice"), id("bob")], clock).unwrap())
    }

    #[tokio::test]
    async fn test_registry_executor_changes_roles() {
        let registry = registry();
        let executor = RegistryExecutor::new(Arc::clone(&registry));

        executor
            .apply(&ProposalKind::RevokeAdmin, Some(&id("bob")))
            .await
            .unwrap();
        assert!(!registry.is_admin(&id("bob")).await);
        assert!(registry.is_member(&id("bob")).await);

        executor
            .apply(&ProposalKind::GrantAdmin, Some(&id("bob")))
            .await
            .unwrap();
        assert!(registry.is_admin(&id("bob")).await);
    }

    #[tokio::test]
    async fn test_registry_executor_reports_failures() {
        let registry = registry();
        let executor = RegistryExecutor::new(registry);

        let err = executor.apply(&ProposalKind::GrantAdmin, None).await.unwrap_err();
        assert_eq!(err, ExecutionError::MissingTarget(ProposalKind::GrantAdmin));

        let err = executor
            .apply(&ProposalKind::GrantAdmin, Some(&id("stranger")))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_generic_action_is_accepted() {
        let executor = RegistryExecutor::new(registry());
        let kind = ProposalKind::GenericAction {
            action: "publish minutes".into(),
        };
        assert!(executor.apply(&kind, None).await.is_ok());
    }

    /// Blocks inside `apply` until released
    struct GatedExecutor {
        calls: AtomicUsize,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ActionExecutor for GatedExecutor {
        async fn apply(&self, _kind: &ProposalKind, _target: Option<&Identity>) -> Result<(), ExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    struct UnsupportedExecutor;

    #[async_trait]
    impl ActionExecutor for UnsupportedExecutor {
        async fn apply(&self, kind: &ProposalKind, _target: Option<&Identity>) -> Result<(), ExecutionError> {
            Err(ExecutionError::Unsupported(format!("{:?}", kind)))
        }
    }

    fn approved_entry() -> Arc<ProposalEntry> {
        let mut proposal = Proposal::new(
            7,
            ProposalKind::GenericAction {
                action: "archive".into(),
            },
            id("alice"),
            None,
            0,
            10,
        );
        proposal.transition(ProposalStatus::Active);
        proposal.transition(ProposalStatus::Approved);
        Arc::new(ProposalEntry::new(proposal))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_caller_still_commits_once() {
        let executor = Arc::new(GatedExecutor {
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            release: Notify::new(),
        });
        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let engine = Arc::new(ExecutionEngine::new(
            executor.clone(),
            Duration::from_secs(5),
            events,
        ));
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(50));
        let entry = approved_entry();

        let caller = {
            let engine = Arc::clone(&engine);
            let entry = Arc::clone(&entry);
            let clock = Arc::clone(&clock);
            tokio::spawn(async move { engine.execute(entry, &id("alice"), clock).await })
        };

        // Hold the proposal lock so the commit after the effect has to wait,
        // then drop the caller while it is parked there.
        executor.started.notified().await;
        let guard = entry.lock().await;
        executor.release.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        caller.abort();
        let _ = caller.await;
        drop(guard);

        let retried = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match engine
                    .execute(Arc::clone(&entry), &id("bob"), Arc::clone(&clock))
                    .await
                {
                    Err(GovernanceError::ExecutionInProgress(_)) => {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    other => break other,
                }
            }
        })
        .await
        .unwrap();

        assert!(matches!(retried, Err(GovernanceError::AlreadyExecuted(7))));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

        let proposal = entry.lock().await.clone();
        assert_eq!(proposal.status, ProposalStatus::Executed);
        assert_eq!(proposal.executed_at, Some(50));

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            GovernanceEvent::ProposalExecuted {
                id: 7,
                executed_by: id("alice"),
                at: 50,
            }
        );
    }

    #[tokio::test]
    async fn test_unsupported_action_leaves_proposal_approved() {
        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let engine = ExecutionEngine::new(Arc::new(UnsupportedExecutor), Duration::from_secs(5), events);
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(20));
        let entry = approved_entry();

        let err = engine
            .execute(Arc::clone(&entry), &id("alice"), clock)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            GovernanceError::ExecutionFailed {
                id: 7,
                source: ExecutionError::Unsupported(_),
            }
        ));
        assert_eq!(entry.lock().await.status, ProposalStatus::Approved);
        assert!(ProposalEntry::try_claim_execution(&entry).is_some());

        match rx.try_recv().unwrap() {
            GovernanceEvent::ExecutionFailed { id: 7, reason, at: 20, .. } => {
                assert!(reason.starts_with("Unsupported action"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
