use crate::address::Address;
use crate::registry::AssetId;
use crate::units::Amount;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient balance for {owner}: required {required}, available {available}")]
    InsufficientBalance {
        owner: Address,
        required: Amount,
        available: Amount,
    },
    #[error("Insufficient allowance from {owner} to {spender}: required {required}, approved {approved}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        required: Amount,
        approved: Amount,
    },
    #[error("Unknown asset {0}")]
    UnknownAsset(AssetId),
    #[error("Asset {0} already exists")]
    AssetAlreadyExists(AssetId),
    #[error("{caller} does not own asset {asset_id}")]
    NotOwner { asset_id: AssetId, caller: Address },
    #[error("{operator} is not approved to move asset {asset_id}")]
    NotApproved { asset_id: AssetId, operator: Address },
    #[error("Supply overflow")]
    SupplyOverflow,
}
