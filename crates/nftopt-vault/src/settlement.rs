/// SETTLEMENT ENGINE
///
/// Resolves each (epoch, strike) slot once the epoch has expired. Out of the
/// money positions become claimable for free; in the money positions need a
/// reclaim top-up, and top-ups already collected go to the payout
/// destination.
///
/// SAFETY INVARIANTS:
/// 1. Settlement only after expiry, once per (epoch, strike)
/// 2. Positions are visited in registration order
/// 3. Collected top-ups are forwarded exactly once

use crate::error::VaultError;
use crate::events::VaultEvent;
use crate::pricing::{classify, reclaim_amount_per_position, Moneyness};
use crate::state::{ClaimStatus, EpochPhase, StrikeSettlement};
use crate::vault::Vault;
use nftopt_ledger::{format_units, Address, Amount};
use tracing::{debug, info};

impl Vault {
    /// Settle `strike` of the current epoch.
    pub fn settle(&mut self, caller: &Address, strike: Amount, payout_destination: &Address) -> Result<Moneyness, VaultError> {
        let epoch = self.state.current()?.id;
        self.settle_epoch_strike(caller, epoch, strike, payout_destination)
    }

    pub fn settle_epoch_strike(
        &mut self,
        caller: &Address,
        epoch: u64,
        strike: Amount,
        payout_destination: &Address,
    ) -> Result<Moneyness, VaultError> {
        self.ensure_admin(caller)?;
        let record = self.state.epoch(epoch)?;
        record.ensure_strike(strike)?;
        if record.slots.get(&strike).is_some_and(|slot| slot.is_settled()) {
            return Err(VaultError::AlreadySettled { epoch, strike });
        }
        record.require_phase(&[EpochPhase::Expired], "settle")?;
        let price = record.settlement_price.ok_or(VaultError::EpochState {
            epoch,
            phase: record.phase,
            action: "settle without a settlement price",
        })?;
        let slot = record.slot(strike)?;

        let outcome = classify(strike, price);
        let per_position = reclaim_amount_per_position(self.config.reclaim_policy, strike, price);
        let pending = match outcome {
            Moneyness::InTheMoney => slot.collected_reclaim.saturating_sub(slot.forwarded_reclaim),
            Moneyness::OutOfTheMoney => 0,
        };
        let assets = slot.assets.clone();

        if pending > 0 {
            self.payments.transfer(&self.address, payout_destination, pending)?;
        }

        let now = self.now();
        let mut settled_positions = 0;
        for asset_id in &assets {
            let Some(position) = self.state.open_positions.get_mut(asset_id) else {
                continue;
            };
            if position.epoch != epoch || position.status != ClaimStatus::Locked {
                continue;
            }
            position.status = match outcome {
                Moneyness::OutOfTheMoney => ClaimStatus::ClaimableFree,
                Moneyness::InTheMoney => ClaimStatus::ClaimableWithPayment {
                    paid: position.reclaim_paid >= per_position,
                },
            };
            settled_positions += 1;
            debug!(epoch, asset_id, status = ?position.status, "position settled");
        }

        let record = self.state.epoch_mut(epoch)?;
        let slot = record.slot_mut(strike)?;
        slot.forwarded_reclaim += pending;
        slot.settlement = Some(StrikeSettlement {
            outcome,
            payout_destination: *payout_destination,
            settled_at: now,
            reclaim_per_position: per_position,
        });
        if record.all_strikes_settled() {
            record.phase = EpochPhase::Settled;
        }
        let phase = record.phase;

        self.emit(VaultEvent::StrikeSettled {
            epoch,
            strike,
            outcome,
            positions: settled_positions,
            payout_destination: *payout_destination,
            forwarded: pending,
        });
        info!(
            epoch,
            strike = %format_units(strike, self.config.decimals),
            price = %format_units(price, self.config.decimals),
            %outcome,
            positions = settled_positions,
            %phase,
            "strike settled"
        );
        Ok(outcome)
    }

    /// Settlement record of (epoch, strike), if settled
    pub fn strike_settlement(&self, epoch: u64, strike: Amount) -> Option<&StrikeSettlement> {
        self.state.epochs.get(&epoch)?.slots.get(&strike)?.settlement.as_ref()
    }
}
