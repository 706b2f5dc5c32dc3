use crate::{Collaborators, InMemoryClaimTokenIssuer, ManualClock, Vault, VaultConfig};
use nftopt_ledger::{Address, Amount, AssetId, AssetRegistry, InMemoryAssetRegistry, InMemoryPaymentLedger};
use std::sync::Arc;

pub const E18: Amount = 1_000_000_000_000_000_000;

pub fn e18(whole: u128) -> Amount {
    whole * E18
}

/// `value / 10^shift` in 18-decimal units
pub fn e18_frac(value: u128, shift: u32) -> Amount {
    value * E18 / 10u128.pow(shift)
}

pub struct Fixture {
    pub admin: Address,
    pub alice: Address,
    pub clock: ManualClock,
    pub weth: Arc<InMemoryPaymentLedger>,
    pub nft: Arc<InMemoryAssetRegistry>,
    pub issuer: Arc<InMemoryClaimTokenIssuer>,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            admin: Address::derive("admin"),
            alice: Address::derive("alice"),
            clock: ManualClock::new(1_700_000_000),
            weth: Arc::new(InMemoryPaymentLedger::new("WETH")),
            nft: Arc::new(InMemoryAssetRegistry::new("World Of Women", Address::derive("wow"))),
            issuer: Arc::new(InMemoryClaimTokenIssuer::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            payments: self.weth.clone(),
            assets: self.nft.clone(),
            tokens: self.issuer.clone(),
            clock: Arc::new(self.clock.clone()),
        }
    }

    pub fn vault(&self) -> Vault {
        Vault::new("World Of Women", self.admin, VaultConfig::default(), self.collaborators())
            .expect("valid vault")
    }

    /// Vault with epoch 1 bootstrapped at `(strike, premium)` pairs, expiring
    /// `ttl` seconds from now.
    pub fn bootstrapped_vault(&self, strikes: &[(Amount, Amount)], ttl: u64) -> Vault {
        use crate::Clock;
        let mut vault = self.vault();
        let (strike_list, premiums): (Vec<_>, Vec<_>) = strikes.iter().copied().unzip();
        vault
            .start_new_epoch_with_expiry(&self.admin, self.clock.now() + ttl)
            .unwrap();
        vault.set_strikes(&self.admin, &strike_list).unwrap();
        vault
            .set_premiums_for_strikes(&self.admin, &strike_list, &premiums)
            .unwrap();
        vault.bootstrap(&self.admin).unwrap();
        vault
    }

    pub fn fund_vault(&self, vault: &Vault, amount: Amount) {
        self.weth.mint(&vault.address(), amount).unwrap();
    }

    pub fn mint_and_approve(&self, vault: &Vault, owner: &Address, asset_id: AssetId) {
        self.nft.mint(owner, asset_id).unwrap();
        self.nft.approve(owner, &vault.address(), asset_id).unwrap();
    }
}
