/// NFT OPTION SELLERS VAULT
///
/// NFT holders sell covered calls against their assets: an asset deposited at
/// a strike earns an immediate premium and a claim token. At expiry each strike
/// settles against an injected price. Out of the money the asset comes back for
/// free; in the money the depositor pays a reclaim top-up or, after the reclaim
/// window, the asset goes to the payout destination.

pub mod claim;
pub mod clock;
pub mod config;
pub mod deposit;
pub mod epoch;
pub mod error;
pub mod events;
pub mod factory;
pub mod issuer;
pub mod pricing;
pub mod settlement;
pub mod state;
pub mod vault;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::{VaultConfig, DEFAULT_RECLAIM_WINDOW_SECS};
pub use deposit::CLAIM_UNITS_PER_DEPOSIT;
pub use epoch::CLAIM_TOKEN_DECIMALS;
pub use error::{TransferDenial, VaultError};
pub use events::VaultEvent;
pub use factory::VaultFactory;
pub use issuer::{ClaimTokenFactory, ClaimTokenInfo, InMemoryClaimTokenIssuer, IssuerError};
pub use pricing::{classify, reclaim_amount_per_position, Moneyness, ReclaimPolicy};
pub use state::{ClaimStatus, EpochPhase, EpochRecord, Position, StrikeSettlement, StrikeSlot, VaultState};
pub use vault::{Collaborators, Vault};
