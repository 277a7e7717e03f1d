//! Capability table: one owner and a set of join-part agents.
//!
//! Ownership moves in two steps (propose, then claim by the new owner) so a
//! typo in the new owner's address cannot strand the ledger.

use std::collections::BTreeSet;

use dataunion_types::Address;

use crate::{LedgerError, Result};

#[derive(Clone, Debug, Default)]
pub struct Roles {
    owner: Address,
    pending_owner: Option<Address>,
    agents: BTreeSet<Address>,
}

impl Roles {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            pending_owner: None,
            agents: BTreeSet::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn pending_owner(&self) -> Option<Address> {
        self.pending_owner
    }

    pub fn is_owner(&self, who: &Address) -> bool {
        self.owner == *who
    }

    pub fn is_agent(&self, who: &Address) -> bool {
        self.agents.contains(who)
    }

    pub fn agent_count(&self) -> u64 {
        self.agents.len() as u64
    }

    pub fn agents(&self) -> impl Iterator<Item = &Address> {
        self.agents.iter()
    }

    pub fn require_owner(&self, caller: &Address) -> Result<()> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(LedgerError::NotOwner { caller: *caller })
        }
    }

    /// Owner or any join-part agent.
    pub fn require_join_controller(&self, caller: &Address) -> Result<()> {
        if self.is_owner(caller) || self.is_agent(caller) {
            Ok(())
        } else {
            Err(LedgerError::NotJoinPartAgent { caller: *caller })
        }
    }

    pub fn add_agent(&mut self, agent: Address) -> Result<()> {
        if agent.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        if !self.agents.insert(agent) {
            return Err(LedgerError::AgentAlreadyExists(agent));
        }
        Ok(())
    }

    pub fn remove_agent(&mut self, agent: &Address) -> Result<()> {
        if !self.agents.remove(agent) {
            return Err(LedgerError::AgentNotFound(*agent));
        }
        Ok(())
    }

    /// Record `new_owner` as pending. Replaces any earlier proposal.
    pub fn propose_owner(&mut self, new_owner: Address) -> Result<()> {
        if new_owner.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        self.pending_owner = Some(new_owner);
        Ok(())
    }

    /// Complete a pending transfer. Returns the previous owner.
    pub fn claim_ownership(&mut self, caller: &Address) -> Result<Address> {
        match self.pending_owner {
            Some(pending) if pending == *caller => {
                let previous = self.owner;
                self.owner = pending;
                self.pending_owner = None;
                Ok(previous)
            }
            _ => Err(LedgerError::NotPendingOwner { caller: *caller }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    #[test]
    fn test_two_step_ownership() {
        let mut roles = Roles::new(addr(1));
        roles.propose_owner(addr(2)).expect("propose");
        assert!(roles.is_owner(&addr(1)), "ownership must not move before claim");

        assert_eq!(
            roles.claim_ownership(&addr(3)),
            Err(LedgerError::NotPendingOwner { caller: addr(3) })
        );

        let previous = roles.claim_ownership(&addr(2)).expect("claim");
        assert_eq!(previous, addr(1));
        assert!(roles.is_owner(&addr(2)));
        assert_eq!(roles.pending_owner(), None);
    }

    #[test]
    fn test_agents() {
        let mut roles = Roles::new(addr(1));
        roles.add_agent(addr(7)).expect("add");
        assert_eq!(roles.add_agent(addr(7)), Err(LedgerError::AgentAlreadyExists(addr(7))));
        assert_eq!(roles.agent_count(), 1);
        assert!(roles.require_join_controller(&addr(7)).is_ok());
        assert!(roles.require_join_controller(&addr(1)).is_ok());
        assert!(roles.require_join_controller(&addr(8)).is_err());
        assert!(roles.require_owner(&addr(7)).is_err());

        roles.remove_agent(&addr(7)).expect("remove");
        assert_eq!(roles.remove_agent(&addr(7)), Err(LedgerError::AgentNotFound(addr(7))));
    }

    #[test]
    fn test_zero_addresses_rejected() {
        let mut roles = Roles::new(addr(1));
        assert_eq!(roles.add_agent(Address::ZERO), Err(LedgerError::InvalidAddress));
        assert_eq!(roles.propose_owner(Address::ZERO), Err(LedgerError::InvalidAddress));
    }
}
