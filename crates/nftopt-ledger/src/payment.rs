/// FUNGIBLE PAYMENT LEDGER
///
/// The payment medium used for premiums and reclaim top-ups. The vault only
/// relies on balance, transfer and allowance semantics; the ledger itself is a
/// trusted, synchronous collaborator. Callers are identified by address, the
/// signing layer is out of scope.
///
/// SAFETY INVARIANTS:
/// 1. A failed call leaves every balance and allowance unchanged
/// 2. Total supply equals the sum of all balances

use crate::address::Address;
use crate::error::LedgerError;
use crate::units::Amount;
use log::debug;
use parking_lot::RwLock;
use std::collections::BTreeMap;

pub trait PaymentLedger: Send + Sync {
    fn balance_of(&self, owner: &Address) -> Amount;

    /// Move `amount` from `from` to `to`, authorized by `from` itself.
    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError>;

    fn approve(&self, owner: &Address, spender: &Address, amount: Amount);

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount;

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming allowance.
    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError>;
}

#[derive(Debug, Default)]
struct Balances {
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<(Address, Address), Amount>,
    total_supply: Amount,
}

impl Balances {
    fn debit_credit(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        let available = self.balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                owner: *from,
                required: amount,
                available,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        self.balances.insert(*from, available - amount);
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }
}

/// In-process fungible ledger.
#[derive(Debug, Default)]
pub struct InMemoryPaymentLedger {
    symbol: String,
    inner: RwLock<Balances>,
}

impl InMemoryPaymentLedger {
    pub fn new(symbol: impl Into<String>) -> Self {
        InMemoryPaymentLedger {
            symbol: symbol.into(),
            inner: RwLock::new(Balances::default()),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn total_supply(&self) -> Amount {
        self.inner.read().total_supply
    }

    /// Create `amount` new units for `to`.
    pub fn mint(&self, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        let supply = inner
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow)?;
        inner.total_supply = supply;
        *inner.balances.entry(*to).or_insert(0) += amount;
        debug!("{} mint {} to {}", self.symbol, amount, to);
        Ok(())
    }

    /// Destroy `amount` units held by `from`.
    pub fn burn(&self, from: &Address, amount: Amount) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        let available = inner.balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                owner: *from,
                required: amount,
                available,
            });
        }
        inner.balances.insert(*from, available - amount);
        inner.total_supply -= amount;
        debug!("{} burn {} from {}", self.symbol, amount, from);
        Ok(())
    }

    /// Holders with a non-zero balance, in address order.
    pub fn holders(&self) -> Vec<(Address, Amount)> {
        self.inner
            .read()
            .balances
            .iter()
            .filter(|(_, balance)| **balance > 0)
            .map(|(addr, balance)| (*addr, *balance))
            .collect()
    }
}

impl PaymentLedger for InMemoryPaymentLedger {
    fn balance_of(&self, owner: &Address) -> Amount {
        self.inner.read().balances.get(owner).copied().unwrap_or(0)
    }

    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.inner.write().debit_credit(from, to, amount)?;
        debug!("{} transfer {} from {} to {}", self.symbol, amount, from, to);
        Ok(())
    }

    fn approve(&self, owner: &Address, spender: &Address, amount: Amount) {
        self.inner.write().allowances.insert((*owner, *spender), amount);
        debug!("{} approve {} for {} by {}", self.symbol, amount, spender, owner);
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.inner
            .read()
            .allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        let approved = if spender == from {
            Amount::MAX
        } else {
            inner.allowances.get(&(*from, *spender)).copied().unwrap_or(0)
        };
        if approved < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: *from,
                spender: *spender,
                required: amount,
                approved,
            });
        }
        inner.debit_credit(from, to, amount)?;
        if spender != from {
            inner.allowances.insert((*from, *spender), approved - amount);
        }
        debug!(
            "{} transfer_from {} from {} to {} by {}",
            self.symbol, amount, from, to, spender
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded() -> (InMemoryPaymentLedger, Address, Address) {
        let ledger = InMemoryPaymentLedger::new("WETH");
        let alice = Address::derive("alice");
        let bob = Address::derive("bob");
        ledger.mint(&alice, 100).unwrap();
        (ledger, alice, bob)
    }

    #[test]
    fn test_transfer() {
        let (ledger, alice, bob) = funded();
        ledger.transfer(&alice, &bob, 40).unwrap();
        assert_eq!(ledger.balance_of(&alice), 60);
        assert_eq!(ledger.balance_of(&bob), 40);
        assert_eq!(ledger.total_supply(), 100);
    }

    #[test]
    fn test_transfer_insufficient_balance_is_noop() {
        let (ledger, alice, bob) = funded();
        let err = ledger.transfer(&alice, &bob, 101).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance { owner: alice, required: 101, available: 100 }
        );
        assert_eq!(ledger.balance_of(&alice), 100);
        assert_eq!(ledger.balance_of(&bob), 0);
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let (ledger, alice, bob) = funded();
        let vault = Address::derive("vault");

        assert!(matches!(
            ledger.transfer_from(&vault, &alice, &vault, 10),
            Err(LedgerError::InsufficientAllowance { approved: 0, .. })
        ));

        ledger.approve(&alice, &vault, 30);
        ledger.transfer_from(&vault, &alice, &bob, 20).unwrap();
        assert_eq!(ledger.allowance(&alice, &vault), 10);
        assert_eq!(ledger.balance_of(&bob), 20);

        assert!(ledger.transfer_from(&vault, &alice, &bob, 11).is_err());
        assert_eq!(ledger.allowance(&alice, &vault), 10);
    }

    #[test]
    fn test_burn() {
        let (ledger, alice, _) = funded();
        ledger.burn(&alice, 30).unwrap();
        assert_eq!(ledger.total_supply(), 70);
        assert!(ledger.burn(&alice, 71).is_err());
        assert_eq!(ledger.holders(), vec![(alice, 70)]);
    }
}
