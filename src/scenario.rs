/// SCENARIO RUNNER
///
/// Drives one vault epoch end to end against the in-memory ledgers: deploy,
/// configure, bootstrap, deposit, expire, settle, reclaim, withdraw and
/// optionally release. Scenarios are TOML files loaded through `config`, with
/// `NFTOPT__*` environment overrides layered on top.

use config::{Config, Environment, File, FileFormat};
use nftopt_ledger::{
    format_units, parse_units, Address, Amount, AssetId, AssetRegistry, InMemoryAssetRegistry, InMemoryPaymentLedger,
    LedgerError, PaymentLedger, UnitsError, DEFAULT_DECIMALS,
};
use nftopt_vault::{
    InMemoryClaimTokenIssuer, ManualClock, Moneyness, ReclaimPolicy, VaultConfig, VaultError, VaultEvent, VaultFactory,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub const ENV_PREFIX: &str = "NFTOPT";

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Scenario config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid amount for {field}: {source}")]
    Amount {
        field: String,
        #[source]
        source: UnitsError,
    },
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Factory lost track of vault {0}")]
    MissingVault(Address),
}

/// Vault parameters overridable per scenario
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultSettings {
    pub decimals: Option<u8>,
    pub reclaim_window_secs: Option<u64>,
    /// Flat reclaim amount per asset; intrinsic value when absent
    pub fixed_reclaim: Option<String>,
    pub token_symbol_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpochPlan {
    pub duration_secs: u64,
    pub strikes: Vec<String>,
    #[serde(default)]
    pub premiums: Vec<String>,
    pub settlement_price: String,
    pub payout_destination: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositPlan {
    pub holder: String,
    pub asset_id: AssetId,
    pub strike: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReclaimPlan {
    pub holder: String,
    pub strike: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub asset_class: String,
    #[serde(default = "default_admin")]
    pub admin: String,
    #[serde(default = "default_start_time")]
    pub start_time: u64,
    /// Payment balance minted to the vault for premiums
    #[serde(default = "default_funding")]
    pub funding: String,
    #[serde(default)]
    pub vault: VaultSettings,
    pub epoch: EpochPlan,
    #[serde(default)]
    pub deposits: Vec<DepositPlan>,
    #[serde(default)]
    pub reclaims: Vec<ReclaimPlan>,
    /// Release unpaid in-the-money collateral once the reclaim window closes
    #[serde(default)]
    pub release_unreclaimed: bool,
}

fn default_admin() -> String {
    "admin".to_string()
}

fn default_start_time() -> u64 {
    1_650_000_000
}

fn default_funding() -> String {
    "0".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct StrikeReport {
    pub strike: String,
    pub premium: String,
    pub claim_token: Address,
    pub token_name: String,
    pub outcome: Moneyness,
    pub deposits: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HolderReport {
    pub label: String,
    pub address: Address,
    pub payment_balance: String,
    pub assets: Vec<AssetId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub vault: Address,
    pub asset_class: String,
    pub epoch: u64,
    pub settlement_price: String,
    pub strikes: Vec<StrikeReport>,
    pub holders: Vec<HolderReport>,
    pub payout_destination: HolderReport,
    pub vault_liquidity: String,
    pub withdrawn: usize,
    pub released: usize,
    pub events: Vec<VaultEvent>,
}

impl Scenario {
    /// Load a scenario file, then apply `NFTOPT__*` overrides.
    pub fn load(path: &str) -> Result<Self, ScenarioError> {
        let scenario = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(scenario)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ScenarioError> {
        let scenario = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(scenario)
    }

    pub fn decimals(&self) -> u8 {
        self.vault.decimals.unwrap_or(DEFAULT_DECIMALS)
    }

    pub fn vault_config(&self) -> Result<VaultConfig, ScenarioError> {
        let mut config = VaultConfig {
            decimals: self.decimals(),
            ..VaultConfig::default()
        };
        if let Some(window) = self.vault.reclaim_window_secs {
            config.reclaim_window_secs = window;
        }
        if let Some(fixed) = &self.vault.fixed_reclaim {
            config.reclaim_policy = ReclaimPolicy::Fixed {
                amount: self.amount("vault.fixed_reclaim", fixed)?,
            };
        }
        if let Some(prefix) = &self.vault.token_symbol_prefix {
            config.token_symbol_prefix = prefix.clone();
        }
        Ok(config)
    }

    fn amount(&self, field: &str, value: &str) -> Result<Amount, ScenarioError> {
        parse_units(value, self.decimals()).map_err(|source| ScenarioError::Amount {
            field: field.to_string(),
            source,
        })
    }

    fn amounts(&self, field: &str, values: &[String]) -> Result<Vec<Amount>, ScenarioError> {
        values.iter().map(|value| self.amount(field, value)).collect()
    }
}

/// Named account, or a literal `0x` address.
pub fn account(label: &str) -> Address {
    label.parse().unwrap_or_else(|_| Address::derive(label))
}

pub fn run(scenario: &Scenario) -> Result<ScenarioReport, ScenarioError> {
    let config = scenario.vault_config()?;
    let decimals = config.decimals;
    let window = config.reclaim_window_secs;
    let strikes = scenario.amounts("epoch.strikes", &scenario.epoch.strikes)?;
    let premiums = scenario.amounts("epoch.premiums", &scenario.epoch.premiums)?;
    let settlement_price = scenario.amount("epoch.settlement_price", &scenario.epoch.settlement_price)?;
    let funding = scenario.amount("funding", &scenario.funding)?;

    let clock = ManualClock::new(scenario.start_time);
    let payments = Arc::new(InMemoryPaymentLedger::new("WETH"));
    let issuer = Arc::new(InMemoryClaimTokenIssuer::new());
    let registry = Arc::new(InMemoryAssetRegistry::new(
        scenario.asset_class.clone(),
        Address::derive(format!("registry:{}", scenario.asset_class)),
    ));
    let admin = account(&scenario.admin);
    let payout = account(&scenario.epoch.payout_destination);

    let mut factory = VaultFactory::new(payments.clone(), issuer.clone(), Arc::new(clock.clone()), config);
    let vault_address = factory.deploy_vault(&admin, &scenario.asset_class, registry.clone())?;
    let handle = factory
        .vault(&vault_address)
        .ok_or(ScenarioError::MissingVault(vault_address))?;
    let mut vault = handle.lock();

    let expiry = scenario.start_time + scenario.epoch.duration_secs;
    let epoch = vault.start_new_epoch_with_expiry(&admin, expiry)?;
    vault.set_strikes(&admin, &strikes)?;
    if !premiums.is_empty() {
        vault.set_premiums_for_strikes(&admin, &strikes, &premiums)?;
    }
    vault.bootstrap(&admin)?;
    payments.mint(&vault_address, funding)?;

    let mut depositors = BTreeSet::new();
    for deposit in &scenario.deposits {
        let holder = account(&deposit.holder);
        let strike = scenario.amount("deposits.strike", &deposit.strike)?;
        registry.mint(&holder, deposit.asset_id)?;
        registry.approve(&holder, &vault_address, deposit.asset_id)?;
        vault.deposit_nft_and_mint_option(&holder, deposit.asset_id, strike)?;
        depositors.insert(deposit.holder.clone());
    }

    clock.set(expiry);
    vault.expire_epoch(&admin, settlement_price)?;
    let mut outcomes = Vec::with_capacity(strikes.len());
    for &strike in &strikes {
        outcomes.push(vault.settle(&admin, strike, &payout)?);
    }

    for reclaim in &scenario.reclaims {
        let holder = account(&reclaim.holder);
        let strike = scenario.amount("reclaims.strike", &reclaim.strike)?;
        let required = vault.weth_required_to_reclaim_nft(&holder, strike);
        if required == 0 {
            continue;
        }
        payments.mint(&holder, required)?;
        payments.approve(&holder, &vault_address, required);
        vault.deposit_weth_for_strike_to_reclaim_nft(&holder, strike, required)?;
    }

    let mut withdrawn = 0;
    for label in &depositors {
        withdrawn += vault.withdraw_all_claimable_nfts(&account(label))?;
    }

    let mut released = 0;
    if scenario.release_unreclaimed {
        clock.advance(window);
        for &strike in &strikes {
            released += vault.release_unreclaimed(&admin, epoch, strike)?;
        }
    }

    let strike_reports = strikes
        .iter()
        .zip(&outcomes)
        .map(|(&strike, &outcome)| StrikeReport {
            strike: format_units(strike, decimals),
            premium: format_units(vault.epoch_strikes_to_premium(epoch, strike).unwrap_or(0), decimals),
            claim_token: vault.epoch_strike_tokens(epoch, strike).unwrap_or_default(),
            token_name: vault.epoch_tokens_name(strike).unwrap_or_default(),
            outcome,
            deposits: vault.participant_count(epoch, strike),
        })
        .collect();
    let holder_report = |label: &str| {
        let address = account(label);
        HolderReport {
            label: label.to_string(),
            address,
            payment_balance: format_units(payments.balance_of(&address), decimals),
            assets: registry.assets_of(&address),
        }
    };
    let holders = depositors.iter().map(|label| holder_report(label)).collect();

    info!(vault = %vault_address, epoch, withdrawn, released, "scenario complete");
    Ok(ScenarioReport {
        vault: vault_address,
        asset_class: scenario.asset_class.clone(),
        epoch,
        settlement_price: format_units(settlement_price, decimals),
        strikes: strike_reports,
        holders,
        payout_destination: holder_report(&scenario.epoch.payout_destination),
        vault_liquidity: format_units(vault.liquidity(), decimals),
        withdrawn,
        released,
        events: vault.events().to_vec(),
    })
}
