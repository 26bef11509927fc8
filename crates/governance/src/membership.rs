//! Membership registry
//!
//! The registry is the authoritative set of members and admins. All reads
//! and writes go through one `RwLock`, so a reader observes an add or
//! removal either fully applied or not at all.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use quorum_common::{Clock, Identity};

use crate::error::{GovernanceError, GovernanceResult};
use crate::types::Member;

/// Source of membership facts consulted by the engine.
///
/// [`MembershipRegistry`] implements it; hosts that keep membership
/// elsewhere can supply their own implementation instead.
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    /// Whether `id` is a current member
    async fn is_current_member(&self, id: &Identity) -> bool;

    /// Whether `id` currently holds the admin role
    async fn is_admin(&self, id: &Identity) -> bool;

    /// Number of current members (the quorum denominator)
    async fn member_count(&self) -> u64;

    /// Number of current admins
    async fn admin_count(&self) -> u64;
}

#[derive(Debug, Default)]
struct Roster {
    members: HashMap<Identity, Member>,
    member_count: u64,
    admin_count: u64,
}

impl Roster {
    fn active(&self, id: &Identity) -> Option<&Member> {
        self.members.get(id).filter(|m| m.is_member)
    }

    fn is_admin(&self, id: &Identity) -> bool {
        self.active(id).map(|m| m.is_admin).unwrap_or(false)
    }

    fn require_admin(&self, caller: &Identity) -> GovernanceResult<()> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(GovernanceError::NotAuthorized(caller.clone()))
        }
    }
}

/// Authoritative member and admin set
pub struct MembershipRegistry {
    roster: RwLock<Roster>,
    clock: Arc<dyn Clock>,
}

impl MembershipRegistry {
    /// Create a registry whose founders are all members and admins
    pub fn new<I>(founding_admins: I, clock: Arc<dyn Clock>) -> GovernanceResult<Self>
    where
        I: IntoIterator<Item = Identity>,
    {
        let now = clock.now();
        let mut roster = Roster::default();

        for address in founding_admins {
            let member = Member {
                address: address.clone(),
                is_member: true,
                is_admin: true,
                joined_at: now,
            };
            if roster.members.insert(address, member).is_none() {
                roster.member_count += 1;
                roster.admin_count += 1;
            }
        }

        if roster.admin_count == 0 {
            return Err(GovernanceError::NoFoundingAdmin);
        }

        info!("Membership registry created with {} founding admins", roster.admin_count);

        Ok(Self {
            roster: RwLock::new(roster),
            clock,
        })
    }

    /// Register `address` as a plain member.
    ///
    /// A previously removed address is reactivated with a fresh `joined_at`.
    pub async fn add_member(&self, caller: &Identity, address: Identity) -> GovernanceResult<Member> {
        let mut roster = self.roster.write().await;
        roster.require_admin(caller)?;

        if roster.active(&address).is_some() {
            return Err(GovernanceError::AlreadyMember(address));
        }

        let member = Member {
            address: address.clone(),
            is_member: true,
            is_admin: false,
            joined_at: self.clock.now(),
        };
        roster.members.insert(address.clone(), member.clone());
        roster.member_count += 1;

        info!("{} added member {}", caller, address);
        Ok(member)
    }

    /// Soft-remove `address`, clearing its admin flag as well.
    pub async fn remove_member(&self, caller: &Identity, address: &Identity) -> GovernanceResult<()> {
        let mut roster = self.roster.write().await;
        roster.require_admin(caller)?;

        let was_admin = match roster.active(address) {
            Some(member) => member.is_admin,
            None => return Err(GovernanceError::NotAMemberTarget(address.clone())),
        };

        if was_admin && roster.admin_count <= 1 {
            warn!("Refusing to remove last admin {}", address);
            return Err(GovernanceError::CannotRemoveLastAdmin(address.clone()));
        }

        if let Some(member) = roster.members.get_mut(address) {
            member.is_member = false;
            member.is_admin = false;
        }
        roster.member_count -= 1;
        if was_admin {
            roster.admin_count -= 1;
        }

        info!("{} removed member {} (was admin: {})", caller, address, was_admin);
        Ok(())
    }

    /// Give `address` the admin role; a no-op if it already has it.
    pub(crate) async fn grant_admin(&self, address: &Identity) -> GovernanceResult<()> {
        let mut roster = self.roster.write().await;

        let member = match roster.members.get_mut(address).filter(|m| m.is_member) {
            Some(member) => member,
            None => return Err(GovernanceError::NotAMemberTarget(address.clone())),
        };

        if member.is_admin {
            debug!("{} is already an admin", address);
            return Ok(());
        }

        member.is_admin = true;
        roster.admin_count += 1;
        info!("Granted admin role to {}", address);
        Ok(())
    }

    /// Take the admin role from `address`; a no-op if it does not have it.
    pub(crate) async fn revoke_admin(&self, address: &Identity) -> GovernanceResult<()> {
        let mut roster = self.roster.write().await;

        if !roster.is_admin(address) {
            debug!("{} is not an admin, nothing to revoke", address);
            return Ok(());
        }

        if roster.admin_count <= 1 {
            warn!("Refusing to revoke last admin {}", address);
            return Err(GovernanceError::CannotRemoveLastAdmin(address.clone()));
        }

        if let Some(member) = roster.members.get_mut(address) {
            member.is_admin = false;
        }
        roster.admin_count -= 1;
        info!("Revoked admin role from {}", address);
        Ok(())
    }

    /// Whether `address` is a current member
    pub async fn is_member(&self, address: &Identity) -> bool {
        self.roster.read().await.active(address).is_some()
    }

    /// Whether `address` is a current admin
    pub async fn is_admin(&self, address: &Identity) -> bool {
        self.roster.read().await.is_admin(address)
    }

    /// Number of current members
    pub async fn member_count(&self) -> u64 {
        self.roster.read().await.member_count
    }

    /// Number of current admins
    pub async fn admin_count(&self) -> u64 {
        self.roster.read().await.admin_count
    }

    /// The record for `address`, including soft-removed members
    pub async fn member(&self, address: &Identity) -> Option<Member> {
        self.roster.read().await.members.get(address).cloned()
    }

    /// All current members, ordered by address
    pub async fn members(&self) -> Vec<Member> {
        let roster = self.roster.read().await;
        let mut result: Vec<Member> = roster
            .members
            .values()
            .filter(|m| m.is_member)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.address.cmp(&b.address));
        result
    }
}

#[async_trait]
impl MembershipOracle for MembershipRegistry {
    async fn is_current_member(&self, id: &Identity) -> bool {
        self.is_member(id).await
    }

    async fn is_admin(&self, id: &Identity) -> bool {
        MembershipRegistry::is_admin(self, id).await
    }

    async fn member_count(&self) -> u64 {
        MembershipRegistry::member_count(self).await
    }

    async fn admin_count(&self) -> u64 {
        MembershipRegistry::admin_count(self).await
    }
}
