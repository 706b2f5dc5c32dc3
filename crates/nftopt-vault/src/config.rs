/// VAULT CONFIGURATION
///
/// Parameters fixed at vault deployment. Everything epoch-specific (expiry,
/// strikes, premiums, settlement price) is set through the epoch engine.

use crate::error::VaultError;
use crate::pricing::ReclaimPolicy;
use nftopt_ledger::units::{DEFAULT_DECIMALS, MAX_DECIMALS};
use serde::{Deserialize, Serialize};

/// One day, the default grace period before unpaid in-the-money collateral
/// can be released to the payout destination
pub const DEFAULT_RECLAIM_WINDOW_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Fixed-point decimals of prices, premiums and payments
    pub decimals: u8,
    /// How much an in-the-money depositor pays to reclaim one asset
    pub reclaim_policy: ReclaimPolicy,
    /// Seconds after settlement during which unpaid depositors may still top up
    pub reclaim_window_secs: u64,
    /// Prefix of claim-token symbols
    pub token_symbol_prefix: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        VaultConfig {
            decimals: DEFAULT_DECIMALS,
            reclaim_policy: ReclaimPolicy::IntrinsicValue,
            reclaim_window_secs: DEFAULT_RECLAIM_WINDOW_SECS,
            token_symbol_prefix: "NOSV".to_string(),
        }
    }
}

impl VaultConfig {
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.decimals > MAX_DECIMALS {
            return Err(VaultError::InvalidConfig(format!(
                "decimals {} exceeds {}",
                self.decimals, MAX_DECIMALS
            )));
        }
        if self.token_symbol_prefix.trim().is_empty() {
            return Err(VaultError::InvalidConfig(
                "token_symbol_prefix must not be empty".to_string(),
            ));
        }
        if let ReclaimPolicy::Fixed { amount } = self.reclaim_policy {
            if amount == 0 {
                return Err(VaultError::InvalidConfig(
                    "fixed reclaim amount must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = VaultConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.decimals, 18);
        assert_eq!(config.reclaim_policy, ReclaimPolicy::IntrinsicValue);
    }

    #[test]
    fn test_invalid_configs() {
        let config = VaultConfig { decimals: 39, ..VaultConfig::default() };
        assert!(matches!(config.validate(), Err(VaultError::InvalidConfig(_))));

        let config = VaultConfig {
            reclaim_policy: ReclaimPolicy::Fixed { amount: 0 },
            ..VaultConfig::default()
        };
        assert!(matches!(config.validate(), Err(VaultError::InvalidConfig(_))));

        let config = VaultConfig { token_symbol_prefix: " ".into(), ..VaultConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: VaultConfig = serde_json::from_str(r#"{"reclaim_window_secs": 0}"#).unwrap();
        assert_eq!(config.reclaim_window_secs, 0);
        assert_eq!(config.decimals, 18);
    }
}
