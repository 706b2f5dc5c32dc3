/// VAULT FACTORY
///
/// Deploys at most one vault per (asset class, asset registry) and keeps a
/// handle to every vault it created. All vaults of a factory share the
/// payment ledger, claim-token issuer and clock.

use crate::clock::Clock;
use crate::config::VaultConfig;
use crate::error::VaultError;
use crate::issuer::ClaimTokenFactory;
use crate::vault::{Collaborators, Vault};
use nftopt_ledger::{Address, AssetRegistry, PaymentLedger};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub struct VaultFactory {
    payments: Arc<dyn PaymentLedger>,
    tokens: Arc<dyn ClaimTokenFactory>,
    clock: Arc<dyn Clock>,
    config: VaultConfig,
    /// (asset class, registry) -> vault address
    deployed: BTreeMap<(String, Address), Address>,
    vaults: BTreeMap<Address, Arc<Mutex<Vault>>>,
}

impl VaultFactory {
    pub fn new(
        payments: Arc<dyn PaymentLedger>,
        tokens: Arc<dyn ClaimTokenFactory>,
        clock: Arc<dyn Clock>,
        config: VaultConfig,
    ) -> Self {
        VaultFactory {
            payments,
            tokens,
            clock,
            config,
            deployed: BTreeMap::new(),
            vaults: BTreeMap::new(),
        }
    }

    /// Deploy a vault for `asset_class` over `registry`. `caller` becomes its admin.
    pub fn deploy_vault(
        &mut self,
        caller: &Address,
        asset_class: &str,
        registry: Arc<dyn AssetRegistry>,
    ) -> Result<Address, VaultError> {
        let key = (asset_class.to_string(), registry.address());
        if let Some(existing) = self.deployed.get(&key) {
            return Err(VaultError::VaultAlreadyDeployed {
                asset_class: key.0,
                registry: key.1,
                vault: *existing,
            });
        }

        let vault = Vault::new(
            asset_class,
            *caller,
            self.config.clone(),
            Collaborators {
                payments: self.payments.clone(),
                assets: registry,
                tokens: self.tokens.clone(),
                clock: self.clock.clone(),
            },
        )?;
        let address = vault.address();
        info!(vault = %address, asset_class, registry = %key.1, admin = %caller, "vault deployed");
        self.deployed.insert(key, address);
        self.vaults.insert(address, Arc::new(Mutex::new(vault)));
        Ok(address)
    }

    pub fn get_vault_from_params(&self, asset_class: &str, registry: &Address) -> Option<Address> {
        self.deployed.get(&(asset_class.to_string(), *registry)).copied()
    }

    pub fn vault(&self, address: &Address) -> Option<Arc<Mutex<Vault>>> {
        self.vaults.get(address).cloned()
    }

    pub fn vault_count(&self) -> usize {
        self.vaults.len()
    }
}
