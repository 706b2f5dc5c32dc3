/// CLAIM AND WITHDRAWAL
///
/// After settlement a depositor takes collateral back: for free when the
/// strike finished out of the money, after a reclaim top-up otherwise.
/// Unpaid in-the-money collateral can be released to the payout destination
/// once the reclaim window has closed.
///
/// SAFETY INVARIANTS:
/// 1. Only the depositor can withdraw, and only claimable positions
/// 2. A top-up is charged exactly once per position, never more than required
/// 3. A closed position never reopens

use crate::error::VaultError;
use crate::events::VaultEvent;
use crate::pricing::{classify, reclaim_amount_per_position, Moneyness};
use crate::state::{ClaimStatus, EpochPhase, Position};
use crate::vault::Vault;
use nftopt_ledger::{format_units, Address, Amount, AssetId, LedgerError};
use tracing::{debug, info, warn};

impl Vault {
    /// True when `owner` deposited `asset_id` and may withdraw it now.
    pub fn is_nft_claimable(&self, owner: &Address, asset_id: AssetId) -> bool {
        self.state
            .open_position(asset_id)
            .is_some_and(|position| position.depositor == *owner && position.status.is_claimable())
    }

    /// Top-up `owner` still owes to reclaim every position at `strike` of the
    /// current epoch. Zero before expiry or when out of the money.
    pub fn weth_required_to_reclaim_nft(&self, owner: &Address, strike: Amount) -> Amount {
        self.weth_required_to_reclaim_nft_for_epoch(owner, self.state.current_epoch, strike)
    }

    /// Same as `weth_required_to_reclaim_nft` for any past or current epoch.
    pub fn weth_required_to_reclaim_nft_for_epoch(&self, owner: &Address, epoch: u64, strike: Amount) -> Amount {
        let Ok(record) = self.state.epoch(epoch) else {
            return 0;
        };
        let Some(price) = record.settlement_price else {
            return 0;
        };
        let per_position = reclaim_amount_per_position(self.config.reclaim_policy, strike, price);
        let owed = self.awaiting_reclaim(owner, epoch, strike, per_position).len() as u128;
        per_position.saturating_mul(owed)
    }

    /// Pay the reclaim top-up for `strike` of the current epoch.
    pub fn deposit_weth_for_strike_to_reclaim_nft(
        &mut self,
        caller: &Address,
        strike: Amount,
        amount: Amount,
    ) -> Result<Amount, VaultError> {
        let epoch = self.state.current()?.id;
        self.deposit_weth_for_epoch_strike_to_reclaim_nft(caller, epoch, strike, amount)
    }

    /// Charge `caller` the top-up for all their unpaid positions at
    /// (epoch, strike). Moves exactly the required amount through the
    /// caller's allowance and returns it.
    pub fn deposit_weth_for_epoch_strike_to_reclaim_nft(
        &mut self,
        caller: &Address,
        epoch: u64,
        strike: Amount,
        amount: Amount,
    ) -> Result<Amount, VaultError> {
        let record = self.state.epoch(epoch)?;
        record.require_phase(&[EpochPhase::Expired, EpochPhase::Settled], "pay reclaim")?;
        let slot = record.slot(strike)?;
        let no_position = VaultError::NoReclaimablePosition { epoch, strike, owner: *caller };
        let Some(price) = record.settlement_price else {
            return Err(no_position);
        };
        if classify(strike, price) == Moneyness::OutOfTheMoney {
            return Err(no_position);
        }
        let per_position = reclaim_amount_per_position(self.config.reclaim_policy, strike, price);
        let assets = self.awaiting_reclaim(caller, epoch, strike, per_position);
        if per_position == 0 || assets.is_empty() {
            return Err(no_position);
        }
        let required = per_position.saturating_mul(assets.len() as u128);
        if amount < required {
            return Err(VaultError::InsufficientReclaimPayment { required, offered: amount });
        }
        let forward_to = slot.settlement.as_ref().map(|settlement| settlement.payout_destination);

        self.payments.transfer_from(&self.address, caller, &self.address, required)?;
        if let Some(destination) = forward_to {
            if let Err(err) = self.payments.transfer(&self.address, &destination, required) {
                warn!(epoch, error = %err, "reclaim forwarding failed, refunding");
                if let Err(refund_err) = self.payments.transfer(&self.address, caller, required) {
                    warn!(epoch, caller = %caller, error = %refund_err, "reclaim refund failed");
                }
                return Err(err.into());
            }
        }

        for asset_id in &assets {
            if let Some(position) = self.state.open_positions.get_mut(asset_id) {
                position.reclaim_paid = per_position;
                if let ClaimStatus::ClaimableWithPayment { .. } = position.status {
                    position.status = ClaimStatus::ClaimableWithPayment { paid: true };
                }
            }
        }
        let slot = self.state.epoch_mut(epoch)?.slot_mut(strike)?;
        slot.collected_reclaim += required;
        if forward_to.is_some() {
            slot.forwarded_reclaim += required;
        }

        self.emit(VaultEvent::ReclaimPaid {
            epoch,
            strike,
            depositor: *caller,
            amount: required,
            assets: assets.clone(),
        });
        info!(
            epoch,
            strike = %format_units(strike, self.config.decimals),
            depositor = %caller,
            amount = %format_units(required, self.config.decimals),
            positions = assets.len(),
            "reclaim paid"
        );
        Ok(required)
    }

    /// Return every claimable asset of `caller`. Returns how many moved.
    pub fn withdraw_all_claimable_nfts(&mut self, caller: &Address) -> Result<usize, VaultError> {
        let claimable: Vec<AssetId> = self
            .state
            .positions_of(caller)
            .filter(|position| position.status.is_claimable())
            .map(|position| position.asset_id)
            .collect();
        if claimable.is_empty() {
            return Ok(0);
        }
        self.ensure_custody(&claimable)?;

        let result = self.transfer_out(&claimable, caller);
        let moved = match &result {
            Ok(()) => claimable.as_slice(),
            Err((index, _)) => &claimable[..*index],
        };
        let now = self.now();
        for &asset_id in moved {
            if let Some(position) = self.state.close_position(asset_id, ClaimStatus::Claimed, now) {
                self.emit(VaultEvent::NftWithdrawn {
                    epoch: position.epoch,
                    strike: position.strike,
                    depositor: *caller,
                    asset_id,
                });
                debug!(epoch = position.epoch, asset_id, "nft withdrawn");
            }
        }
        result.map_err(|(_, err)| err)?;

        info!(depositor = %caller, count = claimable.len(), "claimable nfts withdrawn");
        Ok(claimable.len())
    }

    /// Send unpaid in-the-money collateral of a settled slot to its payout
    /// destination once the reclaim window has closed.
    pub fn release_unreclaimed(&mut self, caller: &Address, epoch: u64, strike: Amount) -> Result<usize, VaultError> {
        self.ensure_admin(caller)?;
        let record = self.state.epoch(epoch)?;
        let slot = record.slot(strike)?;
        let settlement = slot.settlement.clone().ok_or(VaultError::EpochState {
            epoch,
            phase: record.phase,
            action: "release unreclaimed collateral",
        })?;
        if settlement.outcome == Moneyness::OutOfTheMoney {
            return Ok(0);
        }
        let now = self.now();
        let closes_at = settlement
            .settled_at
            .saturating_add(self.config.reclaim_window_secs);
        if now < closes_at {
            return Err(VaultError::ReclaimWindowOpen { epoch, strike, closes_at, now });
        }

        let unpaid: Vec<AssetId> = slot
            .assets
            .iter()
            .filter(|asset_id| {
                self.state.open_position(**asset_id).is_some_and(|position| {
                    position.epoch == epoch
                        && position.status == ClaimStatus::ClaimableWithPayment { paid: false }
                })
            })
            .copied()
            .collect();
        if unpaid.is_empty() {
            return Ok(0);
        }
        self.ensure_custody(&unpaid)?;

        let destination = settlement.payout_destination;
        let result = self.transfer_out(&unpaid, &destination);
        let moved = match &result {
            Ok(()) => unpaid.as_slice(),
            Err((index, _)) => &unpaid[..*index],
        };
        for &asset_id in moved {
            if self.state.close_position(asset_id, ClaimStatus::Released, now).is_some() {
                self.emit(VaultEvent::NftReleased {
                    epoch,
                    strike,
                    asset_id,
                    payout_destination: destination,
                });
            }
        }
        result.map_err(|(_, err)| err)?;

        info!(
            epoch,
            strike = %format_units(strike, self.config.decimals),
            count = unpaid.len(),
            destination = %destination,
            "unreclaimed collateral released"
        );
        Ok(unpaid.len())
    }

    /// Open in-the-money positions of `owner` at (epoch, strike) whose top-up
    /// is still outstanding.
    fn awaiting_reclaim(&self, owner: &Address, epoch: u64, strike: Amount, per_position: Amount) -> Vec<AssetId> {
        self.state
            .positions_of(owner)
            .filter(|position| position.epoch == epoch && position.strike == strike)
            .filter(|position| awaits_payment(position, per_position))
            .map(|position| position.asset_id)
            .collect()
    }

    fn ensure_custody(&self, assets: &[AssetId]) -> Result<(), VaultError> {
        for &asset_id in assets {
            if self.assets.owner_of(asset_id) != Some(self.address) {
                return Err(LedgerError::NotOwner { asset_id, caller: self.address }.into());
            }
        }
        Ok(())
    }

    /// Move `assets` out of custody in order. On failure, reports how many
    /// were moved before the error.
    fn transfer_out(&self, assets: &[AssetId], to: &Address) -> Result<(), (usize, VaultError)> {
        for (index, &asset_id) in assets.iter().enumerate() {
            if let Err(err) = self.assets.safe_transfer_from(&self.address, &self.address, to, asset_id) {
                warn!(asset_id, to = %to, moved = index, error = %err, "asset transfer out failed");
                return Err((index, err.into()));
            }
        }
        Ok(())
    }
}

fn awaits_payment(position: &Position, per_position: Amount) -> bool {
    let unpaid_status = matches!(
        position.status,
        ClaimStatus::Locked | ClaimStatus::ClaimableWithPayment { paid: false }
    );
    unpaid_status && position.reclaim_paid < per_position
}

#[cfg(test)]
mod tests {
    use crate::testing::*;
    use crate::*;
    use nftopt_ledger::{Address, AssetRegistry, PaymentLedger};

    /// Alice deposits asset 1 at strike 8 (premium 2); the epoch expires at `price`.
    fn expired(fx: &Fixture, price: u128) -> Vault {
        let mut vault = fx.bootstrapped_vault(&[(e18(8), e18(2))], 100);
        fx.fund_vault(&vault, e18(10));
        fx.mint_and_approve(&vault, &fx.alice, 1);
        vault.deposit_nft_and_mint_option(&fx.alice, 1, e18(8)).unwrap();
        fx.clock.advance(100);
        vault.expire_epoch(&fx.admin, price).unwrap();
        vault
    }

    #[test]
    fn test_otm_claim_is_free() {
        let fx = Fixture::new();
        let mut vault = expired(&fx, e18(7));
        assert!(!vault.is_nft_claimable(&fx.alice, 1));
        assert_eq!(vault.weth_required_to_reclaim_nft(&fx.alice, e18(8)), 0);

        vault.settle(&fx.admin, e18(8), &Address::derive("treasury")).unwrap();
        assert!(vault.is_nft_claimable(&fx.alice, 1));
        assert!(!vault.is_nft_claimable(&Address::derive("bob"), 1));
        assert_eq!(
            vault.deposit_weth_for_strike_to_reclaim_nft(&fx.alice, e18(8), e18(1)),
            Err(VaultError::NoReclaimablePosition { epoch: 1, strike: e18(8), owner: fx.alice })
        );

        assert_eq!(vault.withdraw_all_claimable_nfts(&fx.alice).unwrap(), 1);
        assert_eq!(fx.nft.owner_of(1), Some(fx.alice));
        assert_eq!(vault.withdraw_all_claimable_nfts(&fx.alice).unwrap(), 0);
        assert_eq!(vault.state().closed_positions[0].status, ClaimStatus::Claimed);
    }

    #[test]
    fn test_itm_requires_top_up() {
        let fx = Fixture::new();
        let mut vault = expired(&fx, e18(9));
        let treasury = Address::derive("treasury");
        vault.settle(&fx.admin, e18(8), &treasury).unwrap();

        assert!(!vault.is_nft_claimable(&fx.alice, 1));
        assert_eq!(vault.withdraw_all_claimable_nfts(&fx.alice).unwrap(), 0);
        assert_eq!(vault.weth_required_to_reclaim_nft(&fx.alice, e18(8)), e18(1));

        fx.weth.approve(&fx.alice, &vault.address(), e18(5));
        assert_eq!(
            vault.deposit_weth_for_strike_to_reclaim_nft(&fx.alice, e18(8), e18_frac(5, 1)),
            Err(VaultError::InsufficientReclaimPayment { required: e18(1), offered: e18_frac(5, 1) })
        );
        // overpaying charges only what is owed
        assert_eq!(
            vault.deposit_weth_for_strike_to_reclaim_nft(&fx.alice, e18(8), e18(2)).unwrap(),
            e18(1)
        );
        assert_eq!(fx.weth.balance_of(&fx.alice), e18(1));
        assert_eq!(fx.weth.balance_of(&treasury), e18(1));
        assert_eq!(vault.weth_required_to_reclaim_nft(&fx.alice, e18(8)), 0);
        assert!(vault.is_nft_claimable(&fx.alice, 1));

        assert_eq!(vault.withdraw_all_claimable_nfts(&fx.alice).unwrap(), 1);
        assert_eq!(fx.nft.owner_of(1), Some(fx.alice));
    }

    #[test]
    fn test_top_up_before_settlement_is_forwarded_at_settlement() {
        let fx = Fixture::new();
        let mut vault = expired(&fx, e18(9));
        let treasury = Address::derive("treasury");
        fx.weth.approve(&fx.alice, &vault.address(), e18(1));
        vault.deposit_weth_for_strike_to_reclaim_nft(&fx.alice, e18(8), e18(1)).unwrap();
        assert_eq!(vault.liquidity(), e18(9));
        assert_eq!(vault.free_liquidity(), e18(8));

        vault.settle(&fx.admin, e18(8), &treasury).unwrap();
        assert_eq!(fx.weth.balance_of(&treasury), e18(1));
        assert_eq!(vault.liquidity(), e18(8));
        assert_eq!(vault.free_liquidity(), e18(8));
        assert_eq!(
            vault.state().open_position(1).unwrap().status,
            ClaimStatus::ClaimableWithPayment { paid: true }
        );
        assert!(vault.is_nft_claimable(&fx.alice, 1));
    }

    #[test]
    fn test_top_up_without_allowance_fails_cleanly() {
        let fx = Fixture::new();
        let mut vault = expired(&fx, e18(9));
        vault.settle(&fx.admin, e18(8), &Address::derive("treasury")).unwrap();
        let before = vault.state().clone();
        assert!(matches!(
            vault.deposit_weth_for_strike_to_reclaim_nft(&fx.alice, e18(8), e18(1)),
            Err(VaultError::Ledger(_))
        ));
        assert_eq!(vault.state(), &before);
    }

    #[test]
    fn test_release_after_window() {
        let fx = Fixture::new();
        let mut vault = expired(&fx, e18(9));
        let treasury = Address::derive("treasury");
        assert!(matches!(
            vault.release_unreclaimed(&fx.admin, 1, e18(8)),
            Err(VaultError::EpochState { .. })
        ));
        vault.settle(&fx.admin, e18(8), &treasury).unwrap();
        let settled_at = fx.clock.now();

        assert_eq!(
            vault.release_unreclaimed(&fx.admin, 1, e18(8)),
            Err(VaultError::ReclaimWindowOpen {
                epoch: 1,
                strike: e18(8),
                closes_at: settled_at + DEFAULT_RECLAIM_WINDOW_SECS,
                now: settled_at
            })
        );
        fx.clock.advance(DEFAULT_RECLAIM_WINDOW_SECS);
        let mallory = Address::derive("mallory");
        assert_eq!(
            vault.release_unreclaimed(&mallory, 1, e18(8)),
            Err(VaultError::NotAdmin { caller: mallory })
        );
        assert_eq!(vault.release_unreclaimed(&fx.admin, 1, e18(8)).unwrap(), 1);
        assert_eq!(fx.nft.owner_of(1), Some(treasury));
        assert_eq!(vault.state().closed_positions[0].status, ClaimStatus::Released);
        assert_eq!(vault.release_unreclaimed(&fx.admin, 1, e18(8)).unwrap(), 0);
        assert!(vault.state().positions_of(&fx.alice).next().is_none());
    }
}
