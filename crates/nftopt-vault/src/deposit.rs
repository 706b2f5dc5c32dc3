/// DEPOSIT AND MINT
///
/// An NFT holder locks one asset at one strike of the current epoch, receives
/// one claim-token unit and is paid the strike's premium from the vault.
///
/// SAFETY INVARIANTS:
/// 1. Deposits only while the epoch is Bootstrapped or Active and before expiry
/// 2. Every precondition (ownership, approval, liquidity) is checked before
///    the first transfer
/// 3. A failed mint or premium payment undoes the transfers already made
/// 4. An asset enters an epoch at most once

use crate::error::{TransferDenial, VaultError};
use crate::events::VaultEvent;
use crate::state::{ClaimStatus, EpochPhase, Position};
use crate::vault::Vault;
use nftopt_ledger::{format_units, Address, Amount, AssetId};
use tracing::{info, warn};

/// Claim-token units minted per deposited asset
pub const CLAIM_UNITS_PER_DEPOSIT: Amount = 1;

/// What a deposit will do once its preconditions hold
struct DepositPlan {
    epoch: u64,
    strike: Amount,
    claim_token: Address,
    premium: Amount,
}

impl Vault {
    /// Lock `asset_id` at `strike` and pay the premium. Returns the claim token.
    pub fn deposit_nft_and_mint_option(
        &mut self,
        caller: &Address,
        asset_id: AssetId,
        strike: Amount,
    ) -> Result<Address, VaultError> {
        let plan = self.plan_deposit(caller, asset_id, strike)?;

        self.assets.safe_transfer_from(&self.address, caller, &self.address, asset_id)?;

        if let Err(err) = self
            .tokens
            .mint(&self.address, &plan.claim_token, caller, CLAIM_UNITS_PER_DEPOSIT)
        {
            warn!(asset_id, error = %err, "claim token mint failed, returning asset");
            self.return_asset(caller, asset_id);
            return Err(err.into());
        }

        if plan.premium > 0 {
            if let Err(err) = self.payments.transfer(&self.address, caller, plan.premium) {
                warn!(asset_id, error = %err, "premium payment failed, unwinding deposit");
                if let Err(burn_err) = self.tokens.burn(
                    &self.address,
                    &plan.claim_token,
                    caller,
                    CLAIM_UNITS_PER_DEPOSIT,
                ) {
                    warn!(asset_id, error = %burn_err, "claim token burn failed during unwind");
                }
                self.return_asset(caller, asset_id);
                return Err(err.into());
            }
        }

        let now = self.now();
        let record = self.state.epoch_mut(plan.epoch)?;
        record.slot_mut(plan.strike)?.register(*caller, asset_id);
        record.deposited_assets.insert(asset_id);
        if record.phase == EpochPhase::Bootstrapped {
            record.phase = EpochPhase::Active;
        }
        self.state.insert_position(Position {
            epoch: plan.epoch,
            strike: plan.strike,
            depositor: *caller,
            asset_id,
            claim_token: plan.claim_token,
            premium: plan.premium,
            deposited_at: now,
            reclaim_paid: 0,
            status: ClaimStatus::Locked,
            closed_at: None,
        });
        self.emit(VaultEvent::NftDeposited {
            epoch: plan.epoch,
            strike: plan.strike,
            depositor: *caller,
            asset_id,
            claim_token: plan.claim_token,
            premium: plan.premium,
        });
        info!(
            epoch = plan.epoch,
            strike = %format_units(plan.strike, self.config.decimals),
            depositor = %caller,
            asset_id,
            premium = %format_units(plan.premium, self.config.decimals),
            "nft deposited"
        );
        Ok(plan.claim_token)
    }

    fn plan_deposit(&self, caller: &Address, asset_id: AssetId, strike: Amount) -> Result<DepositPlan, VaultError> {
        let record = self.state.current()?;
        let epoch = record.id;
        match record.phase {
            EpochPhase::Configuring => {
                return Err(VaultError::EpochNotReady { epoch, phase: record.phase });
            }
            phase if !phase.accepts_deposits() => {
                return Err(VaultError::EpochState { epoch, phase, action: "deposit" });
            }
            _ => {}
        }
        if self.now() >= record.expiry {
            return Err(VaultError::EpochState {
                epoch,
                phase: record.phase,
                action: "deposit after expiry",
            });
        }
        let claim_token = record.slot(strike)?.claim_token;
        if record.deposited_assets.contains(&asset_id) {
            return Err(VaultError::DuplicateDeposit { epoch, asset_id });
        }

        let denial = match self.assets.owner_of(asset_id) {
            None => Some(TransferDenial::UnknownAsset),
            Some(owner) if owner != *caller => Some(TransferDenial::NotOwner),
            Some(_) if !self.assets.is_approved_or_owner(&self.address, asset_id) => {
                Some(TransferDenial::NotApproved)
            }
            Some(_) => None,
        };
        if let Some(reason) = denial {
            return Err(VaultError::UnauthorizedTransfer { asset_id, caller: *caller, reason });
        }

        let premium = record.premium_for(strike);
        let available = self.free_liquidity();
        if premium > available {
            return Err(VaultError::InsufficientVaultLiquidity { required: premium, available });
        }

        Ok(DepositPlan { epoch, strike, claim_token, premium })
    }

    /// Send a just-received asset back to `owner`.
    fn return_asset(&self, owner: &Address, asset_id: AssetId) {
        if let Err(err) = self.assets.safe_transfer_from(&self.address, &self.address, owner, asset_id) {
            warn!(asset_id, owner = %owner, error = %err, "failed to return asset");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::*;
    use crate::*;
    use nftopt_ledger::{Address, AssetRegistry, PaymentLedger};

    #[test]
    fn test_deposit_pays_premium_and_mints() {
        let fx = Fixture::new();
        let mut vault = fx.bootstrapped_vault(&[(e18(8), e18(2))], 1000);
        fx.fund_vault(&vault, e18(10));
        fx.mint_and_approve(&vault, &fx.alice, 6025);

        let token = vault.deposit_nft_and_mint_option(&fx.alice, 6025, e18(8)).unwrap();
        assert_eq!(fx.nft.owner_of(6025), Some(vault.address()));
        assert_eq!(fx.issuer.balance_of(&token, &fx.alice), 1);
        assert_eq!(fx.weth.balance_of(&fx.alice), e18(2));
        assert_eq!(vault.liquidity(), e18(8));
        assert_eq!(vault.epoch_phase(1), Some(EpochPhase::Active));
        assert_eq!(vault.users_for_that_epoch_strike(1, e18(8), 0), Some(fx.alice));
        assert_eq!(vault.users_for_that_epoch_strike(1, e18(8), 1), None);

        let position = vault.state().open_position(6025).unwrap();
        assert_eq!(position.status, ClaimStatus::Locked);
        assert_eq!(position.premium, e18(2));
    }

    #[test]
    fn test_zero_premium_needs_no_liquidity() {
        let fx = Fixture::new();
        let mut vault = fx.bootstrapped_vault(&[(e18(8), 0)], 1000);
        fx.mint_and_approve(&vault, &fx.alice, 1);
        vault.deposit_nft_and_mint_option(&fx.alice, 1, e18(8)).unwrap();
        assert_eq!(fx.weth.balance_of(&fx.alice), 0);
    }

    #[test]
    fn test_deposit_unauthorized() {
        let fx = Fixture::new();
        let mut vault = fx.bootstrapped_vault(&[(e18(8), e18(2))], 1000);
        fx.fund_vault(&vault, e18(10));
        fx.nft.mint(&fx.alice, 7).unwrap();

        assert_eq!(
            vault.deposit_nft_and_mint_option(&fx.alice, 7, e18(8)),
            Err(VaultError::UnauthorizedTransfer {
                asset_id: 7,
                caller: fx.alice,
                reason: TransferDenial::NotApproved
            })
        );
        let bob = Address::derive("bob");
        assert_eq!(
            vault.deposit_nft_and_mint_option(&bob, 7, e18(8)),
            Err(VaultError::UnauthorizedTransfer {
                asset_id: 7,
                caller: bob,
                reason: TransferDenial::NotOwner
            })
        );
        assert!(matches!(
            vault.deposit_nft_and_mint_option(&fx.alice, 99, e18(8)),
            Err(VaultError::UnauthorizedTransfer { reason: TransferDenial::UnknownAsset, .. })
        ));
        assert_eq!(fx.nft.owner_of(7), Some(fx.alice));
        assert!(vault.state().open_positions.is_empty());
    }

    #[test]
    fn test_operator_approval_is_enough() {
        let fx = Fixture::new();
        let mut vault = fx.bootstrapped_vault(&[(e18(8), 0)], 1000);
        fx.nft.mint(&fx.alice, 3).unwrap();
        fx.nft.set_approval_for_all(&fx.alice, &vault.address(), true);
        vault.deposit_nft_and_mint_option(&fx.alice, 3, e18(8)).unwrap();
        assert_eq!(fx.nft.owner_of(3), Some(vault.address()));
    }

    #[test]
    fn test_deposit_phase_and_strike_checks() {
        let fx = Fixture::new();
        let mut vault = fx.vault();
        assert_eq!(vault.deposit_nft_and_mint_option(&fx.alice, 1, e18(8)), Err(VaultError::NoEpoch));

        vault.start_new_epoch_with_expiry(&fx.admin, fx.clock.now() + 100).unwrap();
        vault.set_strikes(&fx.admin, &[e18(8)]).unwrap();
        fx.mint_and_approve(&vault, &fx.alice, 1);
        assert_eq!(
            vault.deposit_nft_and_mint_option(&fx.alice, 1, e18(8)),
            Err(VaultError::EpochNotReady { epoch: 1, phase: EpochPhase::Configuring })
        );

        vault.bootstrap(&fx.admin).unwrap();
        assert_eq!(
            vault.deposit_nft_and_mint_option(&fx.alice, 1, e18(9)),
            Err(VaultError::UnknownStrike { epoch: 1, strike: e18(9) })
        );

        fx.clock.advance(100);
        assert!(matches!(
            vault.deposit_nft_and_mint_option(&fx.alice, 1, e18(8)),
            Err(VaultError::EpochState { epoch: 1, .. })
        ));
    }

    #[test]
    fn test_liquidity_failure_leaves_everything_untouched() {
        let fx = Fixture::new();
        let mut vault = fx.bootstrapped_vault(&[(e18(8), e18(2))], 1000);
        fx.fund_vault(&vault, e18(1));
        fx.mint_and_approve(&vault, &fx.alice, 6025);
        let before = vault.state().clone();

        assert_eq!(
            vault.deposit_nft_and_mint_option(&fx.alice, 6025, e18(8)),
            Err(VaultError::InsufficientVaultLiquidity { required: e18(2), available: e18(1) })
        );
        assert_eq!(vault.state(), &before);
        assert_eq!(fx.nft.owner_of(6025), Some(fx.alice));
        assert_eq!(fx.weth.balance_of(&fx.alice), 0);
        assert_eq!(vault.liquidity(), e18(1));
        let token = vault.epoch_strike_tokens(1, e18(8)).unwrap();
        assert_eq!(fx.issuer.total_supply(&token), 0);
    }
}
