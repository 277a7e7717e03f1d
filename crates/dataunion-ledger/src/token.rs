//! Token collaborator.
//!
//! The ledger never holds balances itself: funds sit in the ledger's
//! account on an external token. [`InMemoryToken`] is the implementation
//! used by the daemon and by tests.

use std::collections::HashMap;

use dataunion_types::{Address, Amount};

/// Errors reported by the token.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("insufficient token balance: {account} holds {available}, needs {required}")]
    InsufficientBalance {
        account: Address,
        required: Amount,
        available: Amount,
    },

    #[error("token balance overflow for {0}")]
    Overflow(Address),

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Minimal fungible-token interface the ledger depends on.
pub trait Token: Send {
    /// Current balance of `account`.
    fn balance_of(&self, account: &Address) -> Amount;

    /// Move `amount` from `from` to `to`.
    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError>;

    /// Move several amounts out of `from`, all or nothing.
    ///
    /// The default checks the combined amount against the sender's
    /// balance up front; implementations that can fail for other reasons
    /// mid-way must override this.
    fn transfer_many(&mut self, from: &Address, transfers: &[(Address, Amount)]) -> Result<(), TokenError> {
        let total = transfers
            .iter()
            .try_fold(0u64, |acc, (_, amount)| acc.checked_add(*amount))
            .ok_or(TokenError::Overflow(*from))?;
        let available = self.balance_of(from);
        if available < total {
            return Err(TokenError::InsufficientBalance {
                account: *from,
                required: total,
                available,
            });
        }
        for (to, amount) in transfers {
            self.transfer(from, to, *amount)?;
        }
        Ok(())
    }
}

/// Hash-map backed token.
#[derive(Clone, Debug, Default)]
pub struct InMemoryToken {
    balances: HashMap<Address, Amount>,
}

impl InMemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token with initial balances.
    pub fn with_balances(balances: impl IntoIterator<Item = (Address, Amount)>) -> Self {
        Self {
            balances: balances.into_iter().collect(),
        }
    }

    /// Create new tokens in `to`'s account. Models a direct transfer into
    /// the ledger that bypasses any payment notification.
    pub fn mint(&mut self, to: &Address, amount: Amount) -> Result<(), TokenError> {
        let balance = self.balances.entry(*to).or_default();
        *balance = balance.checked_add(amount).ok_or(TokenError::Overflow(*to))?;
        Ok(())
    }

    /// Sum of all balances.
    pub fn total_supply(&self) -> u128 {
        self.balances.values().map(|b| *b as u128).sum()
    }
}

impl Token for InMemoryToken {
    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
        self.transfer_many(from, &[(*to, amount)])
    }

    fn transfer_many(&mut self, from: &Address, transfers: &[(Address, Amount)]) -> Result<(), TokenError> {
        let mut total: Amount = 0;
        let mut credits: HashMap<Address, Amount> = HashMap::new();
        for (to, amount) in transfers {
            total = total.checked_add(*amount).ok_or(TokenError::Overflow(*from))?;
            let credit = credits.entry(*to).or_default();
            *credit = credit.checked_add(*amount).ok_or(TokenError::Overflow(*to))?;
        }

        let available = self.balance_of(from);
        if available < total {
            return Err(TokenError::InsufficientBalance {
                account: *from,
                required: total,
                available,
            });
        }

        // Validate every final balance before touching any of them.
        for (to, credit) in &credits {
            let base = if to == from {
                available - total
            } else {
                self.balance_of(to)
            };
            base.checked_add(*credit).ok_or(TokenError::Overflow(*to))?;
        }

        self.balances.insert(*from, available - total);
        for (to, credit) in credits {
            *self.balances.entry(to).or_default() += credit;
        }
        Ok(())
    }
}
