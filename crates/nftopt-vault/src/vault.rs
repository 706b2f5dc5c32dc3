/// NFT OPTION SELLERS VAULT
///
/// One vault per (asset class, asset registry). The vault owns its
/// `VaultState` exclusively and reaches the outside world only through the
/// collaborator handles it was built with. Operations live in the `epoch`,
/// `deposit`, `settlement` and `claim` modules as `impl Vault` blocks.
///
/// Every operation validates all of its preconditions before the first
/// external call, and mutates `VaultState` only after every external call
/// has succeeded. A failed operation leaves the state untouched.

use crate::clock::{Clock, Timestamp};
use crate::config::VaultConfig;
use crate::error::VaultError;
use crate::events::VaultEvent;
use crate::issuer::ClaimTokenFactory;
use crate::state::VaultState;
use nftopt_ledger::{Address, AssetRegistry, PaymentLedger};
use std::fmt;
use std::sync::Arc;

/// External services a vault talks to
#[derive(Clone)]
pub struct Collaborators {
    pub payments: Arc<dyn PaymentLedger>,
    pub assets: Arc<dyn AssetRegistry>,
    pub tokens: Arc<dyn ClaimTokenFactory>,
    pub clock: Arc<dyn Clock>,
}

pub struct Vault {
    pub(crate) address: Address,
    pub(crate) asset_class: String,
    pub(crate) admin: Address,
    pub(crate) config: VaultConfig,
    pub(crate) payments: Arc<dyn PaymentLedger>,
    pub(crate) assets: Arc<dyn AssetRegistry>,
    pub(crate) tokens: Arc<dyn ClaimTokenFactory>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) state: VaultState,
}

impl Vault {
    pub fn new(
        asset_class: impl Into<String>,
        admin: Address,
        config: VaultConfig,
        collaborators: Collaborators,
    ) -> Result<Self, VaultError> {
        let asset_class = asset_class.into();
        if asset_class.trim().is_empty() {
            return Err(VaultError::InvalidConfig("asset class name must not be empty".to_string()));
        }
        config.validate()?;

        let address = Self::derive_address(&asset_class, &collaborators.assets.address());
        Ok(Vault {
            address,
            asset_class,
            admin,
            config,
            payments: collaborators.payments,
            assets: collaborators.assets,
            tokens: collaborators.tokens,
            clock: collaborators.clock,
            state: VaultState::default(),
        })
    }

    /// Deterministic vault address for (asset class, registry)
    pub fn derive_address(asset_class: &str, registry: &Address) -> Address {
        Address::derive(format!("nft-option-sellers-vault:{}:{}", asset_class, registry))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn asset_class(&self) -> &str {
        &self.asset_class
    }

    /// Address of the underlying asset registry
    pub fn nft(&self) -> Address {
        self.assets.address()
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn events(&self) -> &[VaultEvent] {
        &self.state.events
    }

    pub fn payment_ledger(&self) -> &Arc<dyn PaymentLedger> {
        &self.payments
    }

    pub fn asset_registry(&self) -> &Arc<dyn AssetRegistry> {
        &self.assets
    }

    pub fn claim_tokens(&self) -> &Arc<dyn ClaimTokenFactory> {
        &self.tokens
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Payment-ledger balance of the vault
    pub fn liquidity(&self) -> nftopt_ledger::Amount {
        self.payments.balance_of(&self.address)
    }

    /// Balance available for premiums. Reclaim top-ups awaiting their
    /// forward to a payout destination are excluded.
    pub fn free_liquidity(&self) -> nftopt_ledger::Amount {
        self.liquidity().saturating_sub(self.state.pending_reclaim())
    }

    pub(crate) fn ensure_admin(&self, caller: &Address) -> Result<(), VaultError> {
        if *caller == self.admin {
            Ok(())
        } else {
            Err(VaultError::NotAdmin { caller: *caller })
        }
    }

    pub(crate) fn emit(&mut self, event: VaultEvent) {
        self.state.events.push(event);
    }
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("address", &self.address)
            .field("asset_class", &self.asset_class)
            .field("nft", &self.assets.address())
            .field("admin", &self.admin)
            .field("current_epoch", &self.state.current_epoch)
            .finish()
    }
}
