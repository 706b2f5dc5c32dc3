/// VAULT STATE
///
/// Everything the vault remembers, owned by a single `Vault` and mutated only
/// through its operations.
///
/// SAFETY INVARIANTS:
/// 1. Epoch ids are sequential from 1; only the latest epoch can be configured
/// 2. An asset has at most one open position, and at most one position per epoch
/// 3. Participant registries are append-only and follow deposit order
/// 4. `owner_index` lists exactly the open positions of each depositor
/// 5. Phases never regress

use crate::clock::Timestamp;
use crate::error::VaultError;
use crate::events::VaultEvent;
use crate::pricing::Moneyness;
use nftopt_ledger::{Address, Amount, AssetId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Lifecycle phase of an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EpochPhase {
    /// Strikes and premiums may change
    Configuring,
    /// Claim tokens exist, no deposit yet
    Bootstrapped,
    /// At least one deposit
    Active,
    /// Settlement price recorded
    Expired,
    /// Every strike settled
    Settled,
}

impl EpochPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpochPhase::Configuring => "Configuring",
            EpochPhase::Bootstrapped => "Bootstrapped",
            EpochPhase::Active => "Active",
            EpochPhase::Expired => "Expired",
            EpochPhase::Settled => "Settled",
        }
    }

    pub fn accepts_deposits(&self) -> bool {
        matches!(self, EpochPhase::Bootstrapped | EpochPhase::Active)
    }

    /// Settlement price is known
    pub fn is_resolved(&self) -> bool {
        matches!(self, EpochPhase::Expired | EpochPhase::Settled)
    }
}

impl fmt::Display for EpochPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claim status of one deposited asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimStatus {
    /// Held in custody until settlement
    Locked,
    /// Out of the money: depositor takes the asset back for free
    ClaimableFree,
    /// In the money: depositor must pay the reclaim amount first
    ClaimableWithPayment { paid: bool },
    /// Returned to the depositor
    Claimed,
    /// Routed to the payout destination
    Released,
}

impl ClaimStatus {
    pub fn is_claimable(&self) -> bool {
        matches!(
            self,
            ClaimStatus::ClaimableFree | ClaimStatus::ClaimableWithPayment { paid: true }
        )
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, ClaimStatus::Claimed | ClaimStatus::Released)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub epoch: u64,
    pub strike: Amount,
    /// Original NFT owner
    pub depositor: Address,
    pub asset_id: AssetId,
    pub claim_token: Address,
    pub premium: Amount,
    pub deposited_at: Timestamp,
    /// Reclaim top-up received for this asset
    pub reclaim_paid: Amount,
    pub status: ClaimStatus,
    pub closed_at: Option<Timestamp>,
}

/// Settlement record of one (epoch, strike)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeSettlement {
    pub outcome: Moneyness,
    pub payout_destination: Address,
    pub settled_at: Timestamp,
    pub reclaim_per_position: Amount,
}

/// Per-(epoch, strike) bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeSlot {
    pub strike: Amount,
    pub claim_token: Address,
    /// Depositors in deposit order (one entry per deposit)
    pub participants: Vec<Address>,
    /// Deposited assets, parallel to `participants`
    pub assets: Vec<AssetId>,
    pub settlement: Option<StrikeSettlement>,
    /// Reclaim top-ups received for this slot
    pub collected_reclaim: Amount,
    /// Part of `collected_reclaim` already sent to the payout destination
    pub forwarded_reclaim: Amount,
}

impl StrikeSlot {
    pub fn new(strike: Amount, claim_token: Address) -> Self {
        StrikeSlot {
            strike,
            claim_token,
            participants: Vec::new(),
            assets: Vec::new(),
            settlement: None,
            collected_reclaim: 0,
            forwarded_reclaim: 0,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settlement.is_some()
    }

    /// Top-ups received but not yet forwarded to the payout destination
    pub fn pending_reclaim(&self) -> Amount {
        self.collected_reclaim.saturating_sub(self.forwarded_reclaim)
    }

    pub fn register(&mut self, depositor: Address, asset_id: AssetId) {
        self.participants.push(depositor);
        self.assets.push(asset_id);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub id: u64,
    pub expiry: Timestamp,
    pub phase: EpochPhase,
    /// Strikes in configuration order
    pub strikes: Vec<Amount>,
    pub premiums: BTreeMap<Amount, Amount>,
    pub slots: BTreeMap<Amount, StrikeSlot>,
    pub settlement_price: Option<Amount>,
    pub expired_at: Option<Timestamp>,
    /// Every asset ever deposited this epoch
    pub deposited_assets: BTreeSet<AssetId>,
}

impl EpochRecord {
    pub fn new(id: u64, expiry: Timestamp) -> Self {
        EpochRecord {
            id,
            expiry,
            phase: EpochPhase::Configuring,
            strikes: Vec::new(),
            premiums: BTreeMap::new(),
            slots: BTreeMap::new(),
            settlement_price: None,
            expired_at: None,
            deposited_assets: BTreeSet::new(),
        }
    }

    pub fn has_strike(&self, strike: Amount) -> bool {
        self.strikes.contains(&strike)
    }

    /// Premium paid per deposit at `strike`, zero when never set
    pub fn premium_for(&self, strike: Amount) -> Amount {
        self.premiums.get(&strike).copied().unwrap_or(0)
    }

    pub fn ensure_strike(&self, strike: Amount) -> Result<(), VaultError> {
        if self.has_strike(strike) {
            Ok(())
        } else {
            Err(VaultError::UnknownStrike { epoch: self.id, strike })
        }
    }

    pub fn slot(&self, strike: Amount) -> Result<&StrikeSlot, VaultError> {
        self.ensure_strike(strike)?;
        self.slots
            .get(&strike)
            .ok_or(VaultError::EpochNotReady { epoch: self.id, phase: self.phase })
    }

    pub fn slot_mut(&mut self, strike: Amount) -> Result<&mut StrikeSlot, VaultError> {
        self.ensure_strike(strike)?;
        let (epoch, phase) = (self.id, self.phase);
        self.slots
            .get_mut(&strike)
            .ok_or(VaultError::EpochNotReady { epoch, phase })
    }

    pub fn all_strikes_settled(&self) -> bool {
        !self.slots.is_empty() && self.slots.values().all(StrikeSlot::is_settled)
    }

    pub fn require_phase(&self, allowed: &[EpochPhase], action: &'static str) -> Result<(), VaultError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(VaultError::EpochState { epoch: self.id, phase: self.phase, action })
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultState {
    /// Latest epoch id, 0 before the first epoch
    pub current_epoch: u64,
    pub epochs: BTreeMap<u64, EpochRecord>,
    /// Positions still holding an asset in custody
    pub open_positions: BTreeMap<AssetId, Position>,
    /// depositor -> assets with an open position
    pub owner_index: BTreeMap<Address, BTreeSet<AssetId>>,
    /// Claimed and released positions, in closing order
    pub closed_positions: Vec<Position>,
    pub events: Vec<VaultEvent>,
}

impl VaultState {
    pub fn epoch(&self, id: u64) -> Result<&EpochRecord, VaultError> {
        self.epochs.get(&id).ok_or(VaultError::UnknownEpoch(id))
    }

    pub fn epoch_mut(&mut self, id: u64) -> Result<&mut EpochRecord, VaultError> {
        self.epochs.get_mut(&id).ok_or(VaultError::UnknownEpoch(id))
    }

    pub fn current(&self) -> Result<&EpochRecord, VaultError> {
        if self.current_epoch == 0 {
            return Err(VaultError::NoEpoch);
        }
        self.epoch(self.current_epoch)
    }

    pub fn current_mut(&mut self) -> Result<&mut EpochRecord, VaultError> {
        if self.current_epoch == 0 {
            return Err(VaultError::NoEpoch);
        }
        let id = self.current_epoch;
        self.epoch_mut(id)
    }

    /// Reclaim top-ups held for a later forward, across every epoch
    pub fn pending_reclaim(&self) -> Amount {
        self.epochs
            .values()
            .flat_map(|record| record.slots.values())
            .fold(0, |total: Amount, slot| total.saturating_add(slot.pending_reclaim()))
    }

    pub fn open_position(&self, asset_id: AssetId) -> Option<&Position> {
        self.open_positions.get(&asset_id)
    }

    /// Open positions of `owner`, in asset id order
    pub fn positions_of<'a>(&'a self, owner: &Address) -> impl Iterator<Item = &'a Position> + 'a {
        self.owner_index
            .get(owner)
            .into_iter()
            .flat_map(|assets| assets.iter())
            .filter_map(move |asset_id| self.open_positions.get(asset_id))
    }

    pub fn insert_position(&mut self, position: Position) {
        self.owner_index
            .entry(position.depositor)
            .or_default()
            .insert(position.asset_id);
        self.open_positions.insert(position.asset_id, position);
    }

    /// Remove an open position and archive it with its final status.
    pub fn close_position(&mut self, asset_id: AssetId, status: ClaimStatus, at: Timestamp) -> Option<Position> {
        let mut position = self.open_positions.remove(&asset_id)?;
        if let Some(assets) = self.owner_index.get_mut(&position.depositor) {
            assets.remove(&asset_id);
            if assets.is_empty() {
                self.owner_index.remove(&position.depositor);
            }
        }
        position.status = status;
        position.closed_at = Some(at);
        self.closed_positions.push(position.clone());
        Some(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(depositor: Address, asset_id: AssetId) -> Position {
        Position {
            epoch: 1,
            strike: 8,
            depositor,
            asset_id,
            claim_token: Address::derive("token"),
            premium: 2,
            deposited_at: 10,
            reclaim_paid: 0,
            status: ClaimStatus::Locked,
            closed_at: None,
        }
    }

    #[test]
    fn test_claim_status() {
        assert!(ClaimStatus::ClaimableFree.is_claimable());
        assert!(ClaimStatus::ClaimableWithPayment { paid: true }.is_claimable());
        assert!(!ClaimStatus::ClaimableWithPayment { paid: false }.is_claimable());
        assert!(!ClaimStatus::Locked.is_claimable());
        assert!(!ClaimStatus::Claimed.is_open());
        assert!(!ClaimStatus::Released.is_open());
    }

    #[test]
    fn test_position_index() {
        let mut state = VaultState::default();
        let alice = Address::derive("alice");
        state.insert_position(position(alice, 1));
        state.insert_position(position(alice, 2));
        assert_eq!(state.positions_of(&alice).count(), 2);

        let closed = state.close_position(1, ClaimStatus::Claimed, 99).unwrap();
        assert_eq!(closed.closed_at, Some(99));
        assert_eq!(state.positions_of(&alice).map(|p| p.asset_id).collect::<Vec<_>>(), vec![2]);

        state.close_position(2, ClaimStatus::Claimed, 100);
        assert!(state.owner_index.is_empty());
        assert_eq!(state.closed_positions.len(), 2);
        assert!(state.close_position(2, ClaimStatus::Claimed, 101).is_none());
    }

    #[test]
    fn test_current_epoch_lookup() {
        let mut state = VaultState::default();
        assert_eq!(state.current().unwrap_err(), VaultError::NoEpoch);
        state.current_epoch = 1;
        state.epochs.insert(1, EpochRecord::new(1, 500));
        assert_eq!(state.current().unwrap().expiry, 500);
        assert_eq!(state.epoch(2).unwrap_err(), VaultError::UnknownEpoch(2));
    }

    #[test]
    fn test_slot_lookup() {
        let mut record = EpochRecord::new(1, 500);
        record.strikes = vec![8, 9];
        assert_eq!(
            record.slot(7).unwrap_err(),
            VaultError::UnknownStrike { epoch: 1, strike: 7 }
        );
        assert_eq!(
            record.slot(8).unwrap_err(),
            VaultError::EpochNotReady { epoch: 1, phase: EpochPhase::Configuring }
        );
        record.slots.insert(8, StrikeSlot::new(8, Address::derive("t8")));
        assert!(record.slot(8).is_ok());
        assert!(!record.all_strikes_settled());
    }

    #[test]
    fn test_pending_reclaim_spans_epochs() {
        let mut state = VaultState::default();
        for id in 1..=2 {
            let mut record = EpochRecord::new(id, 500);
            record.strikes = vec![8];
            let mut slot = StrikeSlot::new(8, Address::derive(format!("t{}", id)));
            slot.collected_reclaim = 3;
            slot.forwarded_reclaim = if id == 1 { 2 } else { 0 };
            record.slots.insert(8, slot);
            state.epochs.insert(id, record);
        }
        assert_eq!(state.pending_reclaim(), 4);
    }
}
