/// NON-FUNGIBLE ASSET REGISTRY
///
/// Ownership medium for the collateral NFTs. Mirrors the owner/approval model
/// of a standard NFT contract: one owner per asset, a single approved spender
/// per asset, and blanket operators per owner.
///
/// SAFETY INVARIANTS:
/// 1. Every asset has exactly one owner
/// 2. A transfer clears the per-asset approval
/// 3. `balance_of` equals the number of assets owned

use crate::address::Address;
use crate::error::LedgerError;
use log::debug;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

/// Token id within one registry
pub type AssetId = u64;

pub trait AssetRegistry: Send + Sync {
    /// Address of the registry contract itself
    fn address(&self) -> Address;

    fn owner_of(&self, asset_id: AssetId) -> Option<Address>;

    fn balance_of(&self, owner: &Address) -> u64;

    /// Approve `spender` for one asset. Only the owner or an operator may approve.
    fn approve(&self, caller: &Address, spender: &Address, asset_id: AssetId) -> Result<(), LedgerError>;

    fn get_approved(&self, asset_id: AssetId) -> Option<Address>;

    fn set_approval_for_all(&self, owner: &Address, operator: &Address, approved: bool);

    fn is_approved_for_all(&self, owner: &Address, operator: &Address) -> bool;

    /// Move `asset_id` from `from` to `to` on behalf of `operator`.
    fn safe_transfer_from(
        &self,
        operator: &Address,
        from: &Address,
        to: &Address,
        asset_id: AssetId,
    ) -> Result<(), LedgerError>;

    /// True when `spender` is the owner, the approved address or an operator.
    fn is_approved_or_owner(&self, spender: &Address, asset_id: AssetId) -> bool {
        match self.owner_of(asset_id) {
            Some(owner) => {
                owner == *spender
                    || self.get_approved(asset_id) == Some(*spender)
                    || self.is_approved_for_all(&owner, spender)
            }
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct Ownership {
    owners: BTreeMap<AssetId, Address>,
    approvals: BTreeMap<AssetId, Address>,
    operators: BTreeSet<(Address, Address)>,
    counts: BTreeMap<Address, u64>,
}

/// In-process NFT registry for one collection.
#[derive(Debug)]
pub struct InMemoryAssetRegistry {
    address: Address,
    name: String,
    inner: RwLock<Ownership>,
}

impl InMemoryAssetRegistry {
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        InMemoryAssetRegistry {
            address,
            name: name.into(),
            inner: RwLock::new(Ownership::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a new asset owned by `to`.
    pub fn mint(&self, to: &Address, asset_id: AssetId) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        if inner.owners.contains_key(&asset_id) {
            return Err(LedgerError::AssetAlreadyExists(asset_id));
        }
        inner.owners.insert(asset_id, *to);
        *inner.counts.entry(*to).or_insert(0) += 1;
        debug!("{} mint #{} to {}", self.name, asset_id, to);
        Ok(())
    }

    /// Assets held by `owner`, in id order.
    pub fn assets_of(&self, owner: &Address) -> Vec<AssetId> {
        self.inner
            .read()
            .owners
            .iter()
            .filter(|(_, holder)| *holder == owner)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl AssetRegistry for InMemoryAssetRegistry {
    fn address(&self) -> Address {
        self.address
    }

    fn owner_of(&self, asset_id: AssetId) -> Option<Address> {
        self.inner.read().owners.get(&asset_id).copied()
    }

    fn balance_of(&self, owner: &Address) -> u64 {
        self.inner.read().counts.get(owner).copied().unwrap_or(0)
    }

    fn approve(&self, caller: &Address, spender: &Address, asset_id: AssetId) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        let owner = *inner
            .owners
            .get(&asset_id)
            .ok_or(LedgerError::UnknownAsset(asset_id))?;
        if owner != *caller && !inner.operators.contains(&(owner, *caller)) {
            return Err(LedgerError::NotOwner { asset_id, caller: *caller });
        }
        inner.approvals.insert(asset_id, *spender);
        debug!("{} approve {} for #{}", self.name, spender, asset_id);
        Ok(())
    }

    fn get_approved(&self, asset_id: AssetId) -> Option<Address> {
        self.inner.read().approvals.get(&asset_id).copied()
    }

    fn set_approval_for_all(&self, owner: &Address, operator: &Address, approved: bool) {
        let mut inner = self.inner.write();
        if approved {
            inner.operators.insert((*owner, *operator));
        } else {
            inner.operators.remove(&(*owner, *operator));
        }
    }

    fn is_approved_for_all(&self, owner: &Address, operator: &Address) -> bool {
        self.inner.read().operators.contains(&(*owner, *operator))
    }

    fn safe_transfer_from(
        &self,
        operator: &Address,
        from: &Address,
        to: &Address,
        asset_id: AssetId,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        let owner = *inner
            .owners
            .get(&asset_id)
            .ok_or(LedgerError::UnknownAsset(asset_id))?;
        if owner != *from {
            return Err(LedgerError::NotOwner { asset_id, caller: *from });
        }
        let authorized = *operator == owner
            || inner.approvals.get(&asset_id) == Some(operator)
            || inner.operators.contains(&(owner, *operator));
        if !authorized {
            return Err(LedgerError::NotApproved { asset_id, operator: *operator });
        }

        inner.approvals.remove(&asset_id);
        inner.owners.insert(asset_id, *to);
        if let Some(count) = inner.counts.get_mut(from) {
            *count = count.saturating_sub(1);
        }
        *inner.counts.entry(*to).or_insert(0) += 1;
        debug!("{} transfer #{} from {} to {} by {}", self.name, asset_id, from, to, operator);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (InMemoryAssetRegistry, Address, Address) {
        let registry = InMemoryAssetRegistry::new("World Of Women", Address::derive("wow"));
        let alice = Address::derive("alice");
        let vault = Address::derive("vault");
        registry.mint(&alice, 6025).unwrap();
        (registry, alice, vault)
    }

    #[test]
    fn test_mint_and_owner() {
        let (registry, alice, _) = registry();
        assert_eq!(registry.owner_of(6025), Some(alice));
        assert_eq!(registry.balance_of(&alice), 1);
        let duplicate = registry.mint(&alice, 6025).unwrap_err();
        assert_eq!(duplicate, LedgerError::AssetAlreadyExists(6025));
        assert_eq!(duplicate.to_string(), "Asset 6025 already exists");
    }

    #[test]
    fn test_transfer_requires_approval() {
        let (registry, alice, vault) = registry();
        assert_eq!(
            registry.safe_transfer_from(&vault, &alice, &vault, 6025),
            Err(LedgerError::NotApproved { asset_id: 6025, operator: vault })
        );
        assert!(!registry.is_approved_or_owner(&vault, 6025));

        registry.approve(&alice, &vault, 6025).unwrap();
        assert!(registry.is_approved_or_owner(&vault, 6025));
        registry.safe_transfer_from(&vault, &alice, &vault, 6025).unwrap();

        assert_eq!(registry.owner_of(6025), Some(vault));
        assert_eq!(registry.get_approved(6025), None);
        assert_eq!(registry.balance_of(&alice), 0);
        assert_eq!(registry.balance_of(&vault), 1);
    }

    #[test]
    fn test_only_owner_approves() {
        let (registry, _, vault) = registry();
        let mallory = Address::derive("mallory");
        assert_eq!(
            registry.approve(&mallory, &vault, 6025),
            Err(LedgerError::NotOwner { asset_id: 6025, caller: mallory })
        );
        assert_eq!(registry.approve(&mallory, &vault, 1), Err(LedgerError::UnknownAsset(1)));
    }

    #[test]
    fn test_operator_approval() {
        let (registry, alice, vault) = registry();
        registry.set_approval_for_all(&alice, &vault, true);
        assert!(registry.is_approved_or_owner(&vault, 6025));
        registry.safe_transfer_from(&vault, &alice, &vault, 6025).unwrap();
        assert_eq!(registry.assets_of(&vault), vec![6025]);

        registry.set_approval_for_all(&alice, &vault, false);
        assert!(!registry.is_approved_for_all(&alice, &vault));
    }
}
