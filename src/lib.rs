//! Quorum
//!
//! A membership-gated proposal and voting engine for cooperative
//! governance: members propose, vote within a window, and approved
//! decisions are executed exactly once.
//!
//! A host typically loads its configuration, installs logging at the
//! configured level, and wires a manager to a membership registry:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use quorum::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GovernanceConfig::from_env()?;
//! quorum::common::init_logging(&config.log_level)?;
//!
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//! let registry = Arc::new(MembershipRegistry::new(
//!     vec![Identity::from("founder")],
//!     clock.clone(),
//! )?);
//! let manager = GovernanceManager::new(config, registry, clock)?;
//! # let _ = manager;
//! # Ok(())
//! # }
//! ```

/// Module version information
pub mod version {
    /// The current version of the Quorum library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

pub use quorum_common as common;
pub use quorum_config as config;
pub use quorum_governance as governance;

/// The types most hosts need
pub mod prelude {
    pub use quorum_common::{Clock, Identity, ManualClock, SystemClock, Timestamp};
    pub use quorum_config::GovernanceConfig;
    pub use quorum_governance::{
        ActionExecutor, ExecutionError, Governance, GovernanceError, GovernanceEvent,
        GovernanceManager, GovernanceResult, MembershipOracle, MembershipRegistry, Proposal,
        ProposalId, ProposalKind, ProposalStatus, VoteChoice, VoteRecord, VoteTally,
    };
}
