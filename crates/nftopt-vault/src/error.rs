use crate::issuer::IssuerError;
use crate::state::EpochPhase;
use nftopt_ledger::{Address, Amount, AssetId, LedgerError};
use thiserror::Error;

/// Why a deposit's asset transfer was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDenial {
    /// Caller is not the registered owner
    NotOwner,
    /// Vault has no approval for the asset
    NotApproved,
    /// Asset does not exist in the registry
    UnknownAsset,
}

impl std::fmt::Display for TransferDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferDenial::NotOwner => f.write_str("caller does not own the asset"),
            TransferDenial::NotApproved => f.write_str("vault is not approved for the asset"),
            TransferDenial::UnknownAsset => f.write_str("asset does not exist"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VaultError {
    #[error("Epoch {epoch} is {phase}, cannot {action}")]
    EpochState {
        epoch: u64,
        phase: EpochPhase,
        action: &'static str,
    },
    #[error("No epoch has been started")]
    NoEpoch,
    #[error("Unknown epoch {0}")]
    UnknownEpoch(u64),
    #[error("Strike {strike} is not configured for epoch {epoch}")]
    UnknownStrike { epoch: u64, strike: Amount },
    #[error("Epoch {epoch} is already bootstrapped")]
    AlreadyBootstrapped { epoch: u64 },
    #[error("Epoch {epoch} cannot expire before {expiry} (now {now})")]
    NotYetExpirable { epoch: u64, now: u64, expiry: u64 },
    #[error("Epoch {epoch} already expired")]
    AlreadyExpired { epoch: u64 },
    #[error("Strike {strike} of epoch {epoch} already settled")]
    AlreadySettled { epoch: u64, strike: Amount },
    #[error("Transfer of asset {asset_id} by {caller} refused: {reason}")]
    UnauthorizedTransfer {
        asset_id: AssetId,
        caller: Address,
        reason: TransferDenial,
    },
    #[error("Vault liquidity {available} cannot cover premium {required}")]
    InsufficientVaultLiquidity { required: Amount, available: Amount },
    #[error("Reclaim payment {offered} below required {required}")]
    InsufficientReclaimPayment { required: Amount, offered: Amount },
    #[error("Epoch {epoch} is {phase}, deposits open after bootstrap")]
    EpochNotReady { epoch: u64, phase: EpochPhase },
    #[error("Expiry {expiry} is not after now ({now})")]
    ExpiryNotInFuture { expiry: u64, now: u64 },
    #[error("Strike set is empty")]
    EmptyStrikeSet,
    #[error("Strike {strike} must be strictly positive")]
    InvalidStrike { strike: Amount },
    #[error("Strike {strike} listed more than once")]
    DuplicateStrike { strike: Amount },
    #[error("{strikes} strikes but {premiums} premiums")]
    LengthMismatch { strikes: usize, premiums: usize },
    #[error("Settlement price {price} must be strictly positive")]
    InvalidSettlementPrice { price: Amount },
    #[error("Asset {asset_id} already deposited in epoch {epoch}")]
    DuplicateDeposit { epoch: u64, asset_id: AssetId },
    #[error("{owner} has no position awaiting reclaim payment at strike {strike} of epoch {epoch}")]
    NoReclaimablePosition {
        epoch: u64,
        strike: Amount,
        owner: Address,
    },
    #[error("Reclaim window for strike {strike} of epoch {epoch} closes at {closes_at} (now {now})")]
    ReclaimWindowOpen {
        epoch: u64,
        strike: Amount,
        closes_at: u64,
        now: u64,
    },
    #[error("{caller} is not the vault admin")]
    NotAdmin { caller: Address },
    #[error("Vault for {asset_class} at {registry} already deployed at {vault}")]
    VaultAlreadyDeployed {
        asset_class: String,
        registry: Address,
        vault: Address,
    },
    #[error("Invalid vault config: {0}")]
    InvalidConfig(String),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Issuer error: {0}")]
    Issuer(#[from] IssuerError),
}
