/// SETTLEMENT PRICING
///
/// The settlement price is injected by the admin; this module only compares
/// it with a strike and prices the reclaim top-up. Kept free of vault state so
/// each function can be tested on its own.

use nftopt_ledger::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one strike at settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Moneyness {
    /// Settlement price below the strike: the option expires worthless
    OutOfTheMoney,
    /// Settlement price at or above the strike: the option is exercised
    InTheMoney,
}

impl Moneyness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Moneyness::OutOfTheMoney => "OTM",
            Moneyness::InTheMoney => "ITM",
        }
    }
}

impl fmt::Display for Moneyness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much an in-the-money depositor pays to take back one asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReclaimPolicy {
    /// `settlement_price - strike`
    IntrinsicValue,
    /// A flat amount per asset
    Fixed { amount: Amount },
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        ReclaimPolicy::IntrinsicValue
    }
}

pub fn classify(strike: Amount, settlement_price: Amount) -> Moneyness {
    if settlement_price < strike {
        Moneyness::OutOfTheMoney
    } else {
        Moneyness::InTheMoney
    }
}

/// Payment required to reclaim one asset deposited at `strike`.
///
/// Zero whenever the strike finished out of the money.
pub fn reclaim_amount_per_position(policy: ReclaimPolicy, strike: Amount, settlement_price: Amount) -> Amount {
    match classify(strike, settlement_price) {
        Moneyness::OutOfTheMoney => 0,
        Moneyness::InTheMoney => match policy {
            ReclaimPolicy::IntrinsicValue => settlement_price - strike,
            ReclaimPolicy::Fixed { amount } => amount,
        },
    }
}
