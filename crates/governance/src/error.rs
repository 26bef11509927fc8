//! Error types for governance operations

use thiserror::Error;

use quorum_common::{Identity, Timestamp};
use quorum_config::ConfigError;

use crate::types::{ProposalId, ProposalKind, ProposalStatus};

/// Broad class of a [`GovernanceError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller lacks the membership or role the operation needs
    Authorization,
    /// The referenced proposal does not exist
    NotFound,
    /// The proposal is in the wrong lifecycle state for the operation
    State,
    /// The request itself is malformed or violates a membership rule
    Validation,
    /// The external effect of an approved proposal failed
    Execution,
    /// The engine was constructed with an invalid configuration
    Configuration,
}

/// Failure reported by an [`ActionExecutor`](crate::execution::ActionExecutor)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The proposal kind needs a target and none was recorded
    #[error("Proposal kind {0:?} requires a target")]
    MissingTarget(ProposalKind),

    /// The collaborator refused or failed to apply the effect
    #[error("Action rejected: {0}")]
    Rejected(String),

    /// The collaborator did not finish in time
    #[error("Action timed out after {seconds}s")]
    TimedOut { seconds: u64 },

    /// The collaborator does not know how to apply this kind of action.
    ///
    /// The built-in [`RegistryExecutor`](crate::RegistryExecutor) handles every
    /// kind; host-supplied executors return this for kinds they do not cover.
    #[error("Unsupported action: {0}")]
    Unsupported(String),
}

/// Error types for governance operations
#[derive(Error, Debug)]
pub enum GovernanceError {
    /// Caller is not a current member
    #[error("Not a member: {0}")]
    NotAMember(Identity),

    /// Caller lacks the admin role (or is not the proposer)
    #[error("Not authorized: {0}")]
    NotAuthorized(Identity),

    /// Proposal not found
    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    /// Proposal is not open for voting or cancellation
    #[error("Proposal {id} is not active (status: {status:?})")]
    ProposalNotActive { id: ProposalId, status: ProposalStatus },

    /// Finalization attempted before the deadline
    #[error("Voting on proposal {id} is still open until {deadline}")]
    VotingStillOpen { id: ProposalId, deadline: Timestamp },

    /// Vote attempted at or after the deadline
    #[error("Voting on proposal {id} closed at {deadline}")]
    VotingClosed { id: ProposalId, deadline: Timestamp },

    /// A vote from this voter is already recorded
    #[error("{voter} has already voted on proposal {id}")]
    AlreadyVoted { id: ProposalId, voter: Identity },

    /// The proposal has already left the Active state
    #[error("Proposal {id} is already finalized (status: {status:?})")]
    AlreadyFinalized { id: ProposalId, status: ProposalStatus },

    /// Execution requested for a proposal that was not approved
    #[error("Proposal {id} is not approved (status: {status:?})")]
    NotApproved { id: ProposalId, status: ProposalStatus },

    /// The proposal's effect has already been applied
    #[error("Proposal {0} has already been executed")]
    AlreadyExecuted(ProposalId),

    /// Another caller is currently applying the proposal's effect
    #[error("Proposal {0} is being executed by another caller")]
    ExecutionInProgress(ProposalId),

    /// The target does not satisfy the proposal kind's precondition
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Voting period is zero or outside the configured bounds
    #[error("Invalid voting period {requested}s (allowed: {min}s..={max}s)")]
    InvalidDuration { requested: u64, min: u64, max: u64 },

    /// Address is already a registered member
    #[error("Already a member: {0}")]
    AlreadyMember(Identity),

    /// Target address is not a current member
    #[error("Target is not a member: {0}")]
    NotAMemberTarget(Identity),

    /// Operation would leave the registry without an admin
    #[error("Cannot remove the last admin: {0}")]
    CannotRemoveLastAdmin(Identity),

    /// Registry constructed without any founding admin
    #[error("A membership registry needs at least one founding admin")]
    NoFoundingAdmin,

    /// The ActionExecutor failed; the proposal stays Approved
    #[error("Execution of proposal {id} failed: {source}")]
    ExecutionFailed {
        id: ProposalId,
        #[source]
        source: ExecutionError,
    },

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl GovernanceError {
    /// The taxonomy class of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAMember(_) | Self::NotAuthorized(_) => ErrorCategory::Authorization,
            Self::ProposalNotFound(_) => ErrorCategory::NotFound,
            Self::ProposalNotActive { .. }
            | Self::VotingStillOpen { .. }
            | Self::VotingClosed { .. }
            | Self::AlreadyVoted { .. }
            | Self::AlreadyFinalized { .. }
            | Self::NotApproved { .. }
            | Self::AlreadyExecuted(_)
            | Self::ExecutionInProgress(_) => ErrorCategory::State,
            Self::InvalidTarget(_)
            | Self::InvalidDuration { .. }
            | Self::AlreadyMember(_)
            | Self::NotAMemberTarget(_)
            | Self::CannotRemoveLastAdmin(_)
            | Self::NoFoundingAdmin => ErrorCategory::Validation,
            Self::ExecutionFailed { .. } => ErrorCategory::Execution,
            Self::Config(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether repeating the same call later can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExecutionFailed { .. } | Self::ExecutionInProgress(_) | Self::VotingStillOpen { .. }
        )
    }
}

/// Result type for governance operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_follow_taxonomy() {
        assert_eq!(
            GovernanceError::NotAMember(Identity::from("x")).category(),
            ErrorCategory::Authorization
        );
        assert_eq!(GovernanceError::ProposalNotFound(7).category(), ErrorCategory::NotFound);
        assert_eq!(
            GovernanceError::AlreadyVoted { id: 1, voter: Identity::from("x") }.category(),
            ErrorCategory::State
        );
        assert_eq!(
            GovernanceError::CannotRemoveLastAdmin(Identity::from("x")).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            GovernanceError::ExecutionFailed {
                id: 1,
                source: ExecutionError::Rejected("nope".into()),
            }
            .category(),
            ErrorCategory::Execution
        );
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(GovernanceError::ExecutionInProgress(3).is_retryable());
        assert!(GovernanceError::VotingStillOpen { id: 3, deadline: 10 }.is_retryable());
        assert!(!GovernanceError::AlreadyExecuted(3).is_retryable());
        assert!(!GovernanceError::NotAuthorized(Identity::from("x")).is_retryable());
    }

    #[test]
    fn test_execution_failure_keeps_source() {
        let err = GovernanceError::ExecutionFailed {
            id: 4,
            source: ExecutionError::TimedOut { seconds: 30 },
        };
        assert_eq!(
            err.to_string(),
            "Execution of proposal 4 failed: Action timed out after 30s"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
