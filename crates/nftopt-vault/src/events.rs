/// VAULT EVENTS
///
/// Audit log of committed operations. Each successful vault operation appends
/// its events after the state change lands; failed operations append nothing.
///
/// SAFETY INVARIANTS:
/// 1. Events are appended in execution order and never rewritten
/// 2. Every event names the epoch it belongs to
/// 3. Serialized events carry their kind in an `event` tag

use crate::clock::Timestamp;
use crate::pricing::Moneyness;
use nftopt_ledger::{Address, Amount, AssetId};
use serde::{Deserialize, Serialize};

/// Committed state transitions, appended in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VaultEvent {
    EpochStarted {
        epoch: u64,
        expiry: Timestamp,
    },
    StrikesSet {
        epoch: u64,
        strikes: Vec<Amount>,
    },
    PremiumsSet {
        epoch: u64,
        strikes: Vec<Amount>,
        premiums: Vec<Amount>,
    },
    Bootstrapped {
        epoch: u64,
        claim_tokens: Vec<(Amount, Address)>,
    },
    NftDeposited {
        epoch: u64,
        strike: Amount,
        depositor: Address,
        asset_id: AssetId,
        claim_token: Address,
        premium: Amount,
    },
    EpochExpired {
        epoch: u64,
        settlement_price: Amount,
    },
    StrikeSettled {
        epoch: u64,
        strike: Amount,
        outcome: Moneyness,
        positions: usize,
        payout_destination: Address,
        forwarded: Amount,
    },
    ReclaimPaid {
        epoch: u64,
        strike: Amount,
        depositor: Address,
        amount: Amount,
        assets: Vec<AssetId>,
    },
    NftWithdrawn {
        epoch: u64,
        strike: Amount,
        depositor: Address,
        asset_id: AssetId,
    },
    NftReleased {
        epoch: u64,
        strike: Amount,
        asset_id: AssetId,
        payout_destination: Address,
    },
}

impl VaultEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            VaultEvent::EpochStarted { epoch, .. }
            | VaultEvent::StrikesSet { epoch, .. }
            | VaultEvent::PremiumsSet { epoch, .. }
            | VaultEvent::Bootstrapped { epoch, .. }
            | VaultEvent::NftDeposited { epoch, .. }
            | VaultEvent::EpochExpired { epoch, .. }
            | VaultEvent::StrikeSettled { epoch, .. }
            | VaultEvent::ReclaimPaid { epoch, .. }
            | VaultEvent::NftWithdrawn { epoch, .. }
            | VaultEvent::NftReleased { epoch, .. } => *epoch,
        }
    }
}
