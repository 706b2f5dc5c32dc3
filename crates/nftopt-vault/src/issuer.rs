/// STRIKE TOKEN ISSUER
///
/// Creates one fungible claim-token instance per (epoch, strike) at bootstrap
/// and mints/burns units for the deposit flow. The vault only sees the
/// `ClaimTokenFactory` capability; `InMemoryClaimTokenIssuer` backs every
/// instance with its own fungible ledger.
///
/// SAFETY INVARIANTS:
/// 1. Creating the same (minter, epoch, strike) with the same metadata
///    returns the existing instance
/// 2. Only an instance with zero supply can be destroyed

use nftopt_ledger::{Address, Amount, InMemoryPaymentLedger, LedgerError, PaymentLedger};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Metadata for a new claim-token instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Vault allowed to mint and burn
    pub minter: Address,
    pub epoch: u64,
    pub strike: Amount,
}

impl ClaimTokenInfo {
    /// Deterministic instance address for (minter, epoch, strike)
    pub fn instance_address(&self) -> Address {
        let mut label = Vec::with_capacity(20 + 8 + 16);
        label.extend_from_slice(self.minter.as_bytes());
        label.extend_from_slice(&self.epoch.to_le_bytes());
        label.extend_from_slice(&self.strike.to_le_bytes());
        Address::derive(label)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IssuerError {
    #[error("Unknown claim token {0}")]
    UnknownToken(Address),
    #[error("Claim token {0} already exists")]
    TokenAlreadyExists(Address),
    #[error("Claim token {0} still has supply")]
    TokenInUse(Address),
    #[error("{caller} is not the minter of claim token {token}")]
    NotMinter { token: Address, caller: Address },
    #[error("Claim token ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub trait ClaimTokenFactory: Send + Sync {
    /// Create a token instance and return its address. Repeating a create
    /// with identical info returns the existing instance.
    fn create(&self, info: ClaimTokenInfo) -> Result<Address, IssuerError>;

    /// Remove an instance that was never minted.
    fn destroy(&self, minter: &Address, token: &Address) -> Result<(), IssuerError>;

    fn mint(&self, minter: &Address, token: &Address, to: &Address, amount: Amount) -> Result<(), IssuerError>;

    fn burn(&self, minter: &Address, token: &Address, from: &Address, amount: Amount) -> Result<(), IssuerError>;

    fn balance_of(&self, token: &Address, owner: &Address) -> Amount;

    fn total_supply(&self, token: &Address) -> Amount;

    fn info(&self, token: &Address) -> Option<ClaimTokenInfo>;
}

#[derive(Debug)]
struct IssuedToken {
    info: ClaimTokenInfo,
    ledger: InMemoryPaymentLedger,
}

#[derive(Debug, Default)]
pub struct InMemoryClaimTokenIssuer {
    tokens: RwLock<BTreeMap<Address, IssuedToken>>,
}

impl InMemoryClaimTokenIssuer {
    pub fn new() -> Self {
        InMemoryClaimTokenIssuer::default()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.read().len()
    }

    fn with_minted<F>(&self, minter: &Address, token: &Address, op: F) -> Result<(), IssuerError>
    where
        F: FnOnce(&InMemoryPaymentLedger) -> Result<(), LedgerError>,
    {
        let tokens = self.tokens.read();
        let issued = tokens.get(token).ok_or(IssuerError::UnknownToken(*token))?;
        if issued.info.minter != *minter {
            return Err(IssuerError::NotMinter { token: *token, caller: *minter });
        }
        op(&issued.ledger)?;
        Ok(())
    }
}

impl ClaimTokenFactory for InMemoryClaimTokenIssuer {
    fn create(&self, info: ClaimTokenInfo) -> Result<Address, IssuerError> {
        let address = info.instance_address();
        let mut tokens = self.tokens.write();
        if let Some(existing) = tokens.get(&address) {
            if existing.info == info {
                debug!(token = %address, "claim token already created");
                return Ok(address);
            }
            return Err(IssuerError::TokenAlreadyExists(address));
        }
        debug!(token = %address, name = %info.name, "claim token created");
        let ledger = InMemoryPaymentLedger::new(info.symbol.clone());
        tokens.insert(address, IssuedToken { info, ledger });
        Ok(address)
    }

    fn destroy(&self, minter: &Address, token: &Address) -> Result<(), IssuerError> {
        let mut tokens = self.tokens.write();
        let issued = tokens.get(token).ok_or(IssuerError::UnknownToken(*token))?;
        if issued.info.minter != *minter {
            return Err(IssuerError::NotMinter { token: *token, caller: *minter });
        }
        if issued.ledger.total_supply() > 0 {
            return Err(IssuerError::TokenInUse(*token));
        }
        tokens.remove(token);
        debug!(token = %token, "claim token destroyed");
        Ok(())
    }

    fn mint(&self, minter: &Address, token: &Address, to: &Address, amount: Amount) -> Result<(), IssuerError> {
        self.with_minted(minter, token, |ledger| ledger.mint(to, amount))
    }

    fn burn(&self, minter: &Address, token: &Address, from: &Address, amount: Amount) -> Result<(), IssuerError> {
        self.with_minted(minter, token, |ledger| ledger.burn(from, amount))
    }

    fn balance_of(&self, token: &Address, owner: &Address) -> Amount {
        self.tokens
            .read()
            .get(token)
            .map(|issued| issued.ledger.balance_of(owner))
            .unwrap_or(0)
    }

    fn total_supply(&self, token: &Address) -> Amount {
        self.tokens
            .read()
            .get(token)
            .map(|issued| issued.ledger.total_supply())
            .unwrap_or(0)
    }

    fn info(&self, token: &Address) -> Option<ClaimTokenInfo> {
        self.tokens.read().get(token).map(|issued| issued.info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(strike: Amount) -> ClaimTokenInfo {
        ClaimTokenInfo {
            name: format!("WOW E1 {}-CALL", strike),
            symbol: "NOSV-WOW-1".into(),
            decimals: 0,
            minter: Address::derive("vault"),
            epoch: 1,
            strike,
        }
    }

    #[test]
    fn test_one_instance_per_epoch_strike() {
        let issuer = InMemoryClaimTokenIssuer::new();
        let a = issuer.create(info(8)).unwrap();
        let b = issuer.create(info(9)).unwrap();
        assert_ne!(a, b);
        assert_eq!(issuer.create(info(8)), Ok(a));
        assert_eq!(issuer.token_count(), 2);
        assert_eq!(issuer.info(&a).unwrap().strike, 8);

        let mut renamed = info(8);
        renamed.name = "other".into();
        assert_eq!(issuer.create(renamed), Err(IssuerError::TokenAlreadyExists(a)));
    }

    #[test]
    fn test_destroy_only_unminted() {
        let issuer = InMemoryClaimTokenIssuer::new();
        let vault = Address::derive("vault");
        let alice = Address::derive("alice");
        let a = issuer.create(info(8)).unwrap();
        let b = issuer.create(info(9)).unwrap();
        issuer.mint(&vault, &b, &alice, 1).unwrap();

        assert_eq!(issuer.destroy(&alice, &a), Err(IssuerError::NotMinter { token: a, caller: alice }));
        assert_eq!(issuer.destroy(&vault, &b), Err(IssuerError::TokenInUse(b)));
        issuer.destroy(&vault, &a).unwrap();
        assert_eq!(issuer.info(&a), None);
        assert_eq!(issuer.destroy(&vault, &a), Err(IssuerError::UnknownToken(a)));
        assert_eq!(issuer.token_count(), 1);
    }

    #[test]
    fn test_only_minter_mints() {
        let issuer = InMemoryClaimTokenIssuer::new();
        let vault = Address::derive("vault");
        let alice = Address::derive("alice");
        let token = issuer.create(info(8)).unwrap();

        issuer.mint(&vault, &token, &alice, 1).unwrap();
        assert_eq!(issuer.balance_of(&token, &alice), 1);
        assert_eq!(issuer.total_supply(&token), 1);

        assert_eq!(
            issuer.mint(&alice, &token, &alice, 1),
            Err(IssuerError::NotMinter { token, caller: alice })
        );

        issuer.burn(&vault, &token, &alice, 1).unwrap();
        assert_eq!(issuer.total_supply(&token), 0);
        assert!(issuer.burn(&vault, &token, &alice, 1).is_err());
    }

    #[test]
    fn test_unknown_token() {
        let issuer = InMemoryClaimTokenIssuer::new();
        let ghost = Address::derive("ghost");
        let vault = Address::derive("vault");
        assert_eq!(issuer.balance_of(&ghost, &vault), 0);
        assert_eq!(
            issuer.mint(&vault, &ghost, &vault, 1),
            Err(IssuerError::UnknownToken(ghost))
        );
    }
}
