/// LEDGER ADAPTERS
///
/// External collaborators of the NFT option sellers vault:
/// - a fungible payment ledger (premiums, reclaim top-ups)
/// - a non-fungible asset registry (collateral custody)
///
/// Both are consumed through traits so the vault can run against the
/// in-process implementations shipped here or against any other backend.

pub mod address;
pub mod error;
pub mod payment;
pub mod registry;
pub mod units;

pub use address::{Address, AddressParseError};
pub use error::LedgerError;
pub use payment::{InMemoryPaymentLedger, PaymentLedger};
pub use registry::{AssetId, AssetRegistry, InMemoryAssetRegistry};
pub use units::{format_units, parse_units, units, Amount, UnitsError, DEFAULT_DECIMALS};
