/// FIXED-POINT UNITS
///
/// All monetary and price values are `u128` integers scaled by a number of
/// decimal places (18 for the WETH-style payment asset). These helpers move
/// between human decimal strings and scaled integers without touching floats.

use thiserror::Error;

/// Scaled fixed-point quantity
pub type Amount = u128;

/// Decimals used by the payment asset and by strike/settlement prices
pub const DEFAULT_DECIMALS: u8 = 18;

/// Largest decimals value whose scale fits in a u128
pub const MAX_DECIMALS: u8 = 38;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UnitsError {
    #[error("Empty amount")]
    Empty,
    #[error("Invalid amount: {0}")]
    Invalid(String),
    #[error("Amount {value} has more than {decimals} fractional digits")]
    TooPrecise { value: String, decimals: u8 },
    #[error("Amount {0} overflows u128")]
    Overflow(String),
    #[error("Decimals {0} exceeds maximum of 38")]
    DecimalsOutOfRange(u8),
}

/// `10^decimals`
pub fn scale(decimals: u8) -> Result<Amount, UnitsError> {
    if decimals > MAX_DECIMALS {
        return Err(UnitsError::DecimalsOutOfRange(decimals));
    }
    Ok(10u128.pow(decimals as u32))
}

/// Whole units to scaled amount: `units(8, 18) == 8 * 10^18`
pub fn units(whole: u128, decimals: u8) -> Result<Amount, UnitsError> {
    whole
        .checked_mul(scale(decimals)?)
        .ok_or_else(|| UnitsError::Overflow(whole.to_string()))
}

/// Parse a decimal string such as `"7.5"` into a scaled amount.
pub fn parse_units(value: &str, decimals: u8) -> Result<Amount, UnitsError> {
    let value = value.trim().replace('_', "");
    if value.is_empty() {
        return Err(UnitsError::Empty);
    }

    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value.as_str(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(UnitsError::Invalid(value.clone()));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(UnitsError::Invalid(value.clone()));
    }

    let frac = frac.trim_end_matches('0');
    if frac.len() > decimals as usize {
        return Err(UnitsError::TooPrecise { value: value.clone(), decimals });
    }

    let overflow = || UnitsError::Overflow(value.clone());
    let whole_part: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };
    let mut scaled = whole_part.checked_mul(scale(decimals)?).ok_or_else(overflow)?;

    if !frac.is_empty() {
        let frac_digits: u128 = frac.parse().map_err(|_| overflow())?;
        let frac_scale = scale(decimals - frac.len() as u8)?;
        scaled = scaled
            .checked_add(frac_digits.checked_mul(frac_scale).ok_or_else(overflow)?)
            .ok_or_else(overflow)?;
    }

    Ok(scaled)
}

/// Render a scaled amount as a decimal string, trimming trailing zeros.
pub fn format_units(amount: Amount, decimals: u8) -> String {
    let Ok(unit) = scale(decimals) else {
        return amount.to_string();
    };
    let whole = amount / unit;
    let frac = amount % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
