/// EPOCH ENGINE
///
/// Epoch lifecycle: Configuring -> Bootstrapped -> Active -> Expired -> Settled.
///
/// SAFETY INVARIANTS:
/// 1. A new epoch starts only once the previous one has a settlement price
/// 2. Strikes and premiums are frozen by bootstrap
/// 3. Bootstrap and expiry happen exactly once per epoch
/// 5. A failed bootstrap destroys the claim tokens it created
/// 4. Expiry needs `now >= expiry` on the shared clock

use crate::clock::Timestamp;
use crate::error::VaultError;
use crate::events::VaultEvent;
use crate::issuer::ClaimTokenInfo;
use crate::state::{EpochPhase, EpochRecord, StrikeSlot};
use crate::vault::Vault;
use nftopt_ledger::{format_units, Address, Amount};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Claim tokens are whole units: one per deposited asset
pub const CLAIM_TOKEN_DECIMALS: u8 = 0;

impl Vault {
    pub fn start_new_epoch_with_expiry(&mut self, caller: &Address, expiry: Timestamp) -> Result<u64, VaultError> {
        self.ensure_admin(caller)?;
        let now = self.now();
        if expiry <= now {
            return Err(VaultError::ExpiryNotInFuture { expiry, now });
        }
        if let Ok(previous) = self.state.current() {
            if !previous.phase.is_resolved() {
                return Err(VaultError::EpochState {
                    epoch: previous.id,
                    phase: previous.phase,
                    action: "start a new epoch",
                });
            }
        }

        let epoch = self.state.current_epoch + 1;
        self.state.epochs.insert(epoch, EpochRecord::new(epoch, expiry));
        self.state.current_epoch = epoch;
        self.emit(VaultEvent::EpochStarted { epoch, expiry });
        info!(vault = %self.address, epoch, expiry, "epoch started");
        Ok(epoch)
    }

    pub fn set_strikes(&mut self, caller: &Address, strikes: &[Amount]) -> Result<(), VaultError> {
        self.ensure_admin(caller)?;
        let record = self.state.current()?;
        record.require_phase(&[EpochPhase::Configuring], "set strikes")?;
        if strikes.is_empty() {
            return Err(VaultError::EmptyStrikeSet);
        }
        let mut seen = BTreeSet::new();
        for &strike in strikes {
            if strike == 0 {
                return Err(VaultError::InvalidStrike { strike });
            }
            if !seen.insert(strike) {
                return Err(VaultError::DuplicateStrike { strike });
            }
        }

        let record = self.state.current_mut()?;
        record.strikes = strikes.to_vec();
        record.premiums.retain(|strike, _| seen.contains(strike));
        let epoch = record.id;
        self.emit(VaultEvent::StrikesSet { epoch, strikes: strikes.to_vec() });
        info!(epoch, count = strikes.len(), "strikes set");
        Ok(())
    }

    pub fn set_premiums_for_strikes(
        &mut self,
        caller: &Address,
        strikes: &[Amount],
        premiums: &[Amount],
    ) -> Result<(), VaultError> {
        self.ensure_admin(caller)?;
        let record = self.state.current()?;
        record.require_phase(&[EpochPhase::Configuring], "set premiums")?;
        if strikes.len() != premiums.len() {
            return Err(VaultError::LengthMismatch {
                strikes: strikes.len(),
                premiums: premiums.len(),
            });
        }
        for &strike in strikes {
            record.ensure_strike(strike)?;
        }

        let record = self.state.current_mut()?;
        for (&strike, &premium) in strikes.iter().zip(premiums) {
            record.premiums.insert(strike, premium);
        }
        let epoch = record.id;
        self.emit(VaultEvent::PremiumsSet {
            epoch,
            strikes: strikes.to_vec(),
            premiums: premiums.to_vec(),
        });
        info!(epoch, count = strikes.len(), "premiums set");
        Ok(())
    }

    /// Create one claim token per configured strike and open deposits.
    pub fn bootstrap(&mut self, caller: &Address) -> Result<Vec<(Amount, Address)>, VaultError> {
        self.ensure_admin(caller)?;
        let record = self.state.current()?;
        if record.phase != EpochPhase::Configuring {
            return Err(VaultError::AlreadyBootstrapped { epoch: record.id });
        }
        if record.strikes.is_empty() {
            return Err(VaultError::EmptyStrikeSet);
        }
        let epoch = record.id;
        let strikes = record.strikes.clone();

        let mut created = Vec::with_capacity(strikes.len());
        for &strike in &strikes {
            let token_info = self.claim_token_info(epoch, strike);
            match self.tokens.create(token_info) {
                Ok(token) => created.push((strike, token)),
                Err(err) => {
                    warn!(epoch, created = created.len(), error = %err, "bootstrap failed, destroying claim tokens");
                    self.destroy_claim_tokens(&created);
                    return Err(err.into());
                }
            }
        }

        let record = self.state.current_mut()?;
        record.slots = created
            .iter()
            .map(|&(strike, token)| (strike, StrikeSlot::new(strike, token)))
            .collect::<BTreeMap<_, _>>();
        record.phase = EpochPhase::Bootstrapped;
        self.emit(VaultEvent::Bootstrapped { epoch, claim_tokens: created.clone() });
        info!(vault = %self.address, epoch, tokens = created.len(), "epoch bootstrapped");
        Ok(created)
    }

    /// Record the injected settlement price once the expiry has passed.
    pub fn expire_epoch(&mut self, caller: &Address, settlement_price: Amount) -> Result<(), VaultError> {
        self.ensure_admin(caller)?;
        let now = self.now();
        let record = self.state.current()?;
        let epoch = record.id;
        if record.phase.is_resolved() {
            return Err(VaultError::AlreadyExpired { epoch });
        }
        record.require_phase(&[EpochPhase::Bootstrapped, EpochPhase::Active], "expire")?;
        if settlement_price == 0 {
            return Err(VaultError::InvalidSettlementPrice { price: settlement_price });
        }
        if now < record.expiry {
            return Err(VaultError::NotYetExpirable { epoch, now, expiry: record.expiry });
        }

        let record = self.state.current_mut()?;
        record.settlement_price = Some(settlement_price);
        record.expired_at = Some(now);
        record.phase = EpochPhase::Expired;
        self.emit(VaultEvent::EpochExpired { epoch, settlement_price });
        info!(
            epoch,
            settlement_price = %format_units(settlement_price, self.config.decimals),
            "epoch expired"
        );
        Ok(())
    }

    pub fn current_epoch(&self) -> u64 {
        self.state.current_epoch
    }

    pub fn epoch_phase(&self, epoch: u64) -> Option<EpochPhase> {
        self.state.epochs.get(&epoch).map(|record| record.phase)
    }

    pub fn epoch_expiry(&self, epoch: u64) -> Option<Timestamp> {
        self.state.epochs.get(&epoch).map(|record| record.expiry)
    }

    pub fn epoch_strikes(&self, epoch: u64) -> Vec<Amount> {
        self.state
            .epochs
            .get(&epoch)
            .map(|record| record.strikes.clone())
            .unwrap_or_default()
    }

    /// Premium configured for `strike`, `None` if the strike is not listed
    pub fn epoch_strikes_to_premium(&self, epoch: u64, strike: Amount) -> Option<Amount> {
        let record = self.state.epochs.get(&epoch)?;
        record.has_strike(strike).then(|| record.premium_for(strike))
    }

    pub fn epoch_strike_tokens(&self, epoch: u64, strike: Amount) -> Option<Address> {
        self.state
            .epochs
            .get(&epoch)?
            .slots
            .get(&strike)
            .map(|slot| slot.claim_token)
    }

    pub fn epoch_settlement_price(&self, epoch: u64) -> Option<Amount> {
        self.state.epochs.get(&epoch)?.settlement_price
    }

    /// Depositor registered at `index` for (epoch, strike)
    pub fn users_for_that_epoch_strike(&self, epoch: u64, strike: Amount, index: usize) -> Option<Address> {
        self.state
            .epochs
            .get(&epoch)?
            .slots
            .get(&strike)?
            .participants
            .get(index)
            .copied()
    }

    pub fn participant_count(&self, epoch: u64, strike: Amount) -> usize {
        self.state
            .epochs
            .get(&epoch)
            .and_then(|record| record.slots.get(&strike))
            .map_or(0, |slot| slot.participants.len())
    }

    /// Name of the current epoch's claim token for `strike`
    pub fn epoch_tokens_name(&self, strike: Amount) -> Result<String, VaultError> {
        let epoch = self.state.current()?.id;
        Ok(self.token_name(epoch, strike))
    }

    fn destroy_claim_tokens(&self, created: &[(Amount, Address)]) {
        for (strike, token) in created {
            if let Err(err) = self.tokens.destroy(&self.address, token) {
                warn!(token = %token, strike = %strike, error = %err, "failed to destroy claim token");
            }
        }
    }

    fn token_name(&self, epoch: u64, strike: Amount) -> String {
        format!(
            "{} E{} {}-CALL",
            self.asset_class,
            epoch,
            format_units(strike, self.config.decimals)
        )
    }

    fn token_symbol(&self, epoch: u64, strike: Amount) -> String {
        let initials: String = self
            .asset_class
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        format!(
            "{}-{}-E{}-{}",
            self.config.token_symbol_prefix,
            initials,
            epoch,
            format_units(strike, self.config.decimals)
        )
    }

    fn claim_token_info(&self, epoch: u64, strike: Amount) -> ClaimTokenInfo {
        ClaimTokenInfo {
            name: self.token_name(epoch, strike),
            symbol: self.token_symbol(epoch, strike),
            decimals: CLAIM_TOKEN_DECIMALS,
            minter: self.address,
            epoch,
            strike,
        }
    }
}
