//! Notifications for external logging and indexing
//!
//! Events are published on a broadcast channel. The core never depends on a
//! subscriber being present.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use quorum_common::{Identity, Timestamp};

use crate::types::{ProposalId, ProposalKind, ProposalStatus, VoteChoice, VoteTally};

/// A state change worth telling the outside world about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GovernanceEvent {
    ProposalSubmitted {
        id: ProposalId,
        proposer: Identity,
        kind: ProposalKind,
        target: Option<Identity>,
        voting_deadline: Timestamp,
        at: Timestamp,
    },
    VoteCast {
        id: ProposalId,
        voter: Identity,
        choice: VoteChoice,
        at: Timestamp,
    },
    ProposalFinalized {
        id: ProposalId,
        outcome: ProposalStatus,
        tally: VoteTally,
        eligible: u64,
        at: Timestamp,
    },
    ProposalExecuted {
        id: ProposalId,
        executed_by: Identity,
        at: Timestamp,
    },
    ProposalCancelled {
        id: ProposalId,
        cancelled_by: Identity,
        at: Timestamp,
    },
    ExecutionFailed {
        id: ProposalId,
        attempted_by: Identity,
        reason: String,
        at: Timestamp,
    },
}

impl GovernanceEvent {
    /// The proposal this event concerns
    pub fn proposal_id(&self) -> ProposalId {
        match self {
            Self::ProposalSubmitted { id, .. }
            | Self::VoteCast { id, .. }
            | Self::ProposalFinalized { id, .. }
            | Self::ProposalExecuted { id, .. }
            | Self::ProposalCancelled { id, .. }
            | Self::ExecutionFailed { id, .. } => *id,
        }
    }

    /// Tagged JSON form for indexers
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Publish-only fan-out of [`GovernanceEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GovernanceEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: GovernanceEvent) {
        info!(proposal = event.proposal_id(), "{:?}", event);
        if self.sender.send(event).is_err() {
            debug!("No subscribers for governance events");
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        bus.publish(GovernanceEvent::ProposalCancelled {
            id: 1,
            cancelled_by: Identity::from("alice"),
            at: 10,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        bus.publish(GovernanceEvent::VoteCast {
            id: 2,
            voter: Identity::from("bob"),
            choice: VoteChoice::For,
            at: 5,
        });
        bus.publish(GovernanceEvent::ProposalExecuted {
            id: 2,
            executed_by: Identity::from("bob"),
            at: 9,
        });

        assert!(matches!(rx.recv().await.unwrap(), GovernanceEvent::VoteCast { id: 2, .. }));
        assert!(matches!(
            rx.recv().await.unwrap(),
            GovernanceEvent::ProposalExecuted { id: 2, .. }
        ));
    }

    #[test]
    fn test_json_is_tagged() {
        let event = GovernanceEvent::ProposalFinalized {
            id: 3,
            outcome: ProposalStatus::Approved,
            tally: VoteTally {
                for_votes: 2,
                against_votes: 1,
                abstain_votes: 0,
            },
            eligible: 3,
            at: 1_000,
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "ProposalFinalized");
        assert_eq!(json["outcome"], "Approved");
        assert_eq!(json["tally"]["for_votes"], 2);
    }
}
