// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Exact money arithmetic shared by the ledger and the settlement engine.
//!
//! Chain amounts are `U256` wei (18 decimals). Ledger amounts are
//! `rust_decimal::Decimal` in the quote currency. No binary floating point
//! is involved anywhere on the path from oracle price to ledger balance.
//!
//! Both conversion directions truncate toward zero: a sweep never credits
//! more than the transferred value is worth and a payout never sends more
//! than the debited amount buys.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimals of the chain-native asset (wei per whole unit = 10^18).
pub const NATIVE_DECIMALS: u32 = 18;

/// Number of decimal places kept on ledger (quote currency) amounts.
pub const QUOTE_SCALE: u32 = 8;

const WEI_PER_NATIVE: u64 = 1_000_000_000_000_000_000;

/// Quote-currency units per whole chain-native unit.
///
/// Valid only for the operation that fetched it; never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeRate(Decimal);

impl ExchangeRate {
    /// Build a rate, rejecting zero and negative prices.
    pub fn new(rate: Decimal) -> Result<Self, MoneyError> {
        if rate <= Decimal::ZERO {
            return Err(MoneyError::NonPositiveRate(rate));
        }
        Ok(Self(rate))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl std::fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("exchange rate must be positive, got {0}")]
    NonPositiveRate(Decimal),

    #[error("amount must not be negative, got {0}")]
    Negative(Decimal),

    #[error("amount out of range: {0}")]
    Overflow(String),
}

/// Unscaled integer and scale of a non-negative decimal.
fn unscaled(value: Decimal) -> Result<(U256, u32), MoneyError> {
    let mantissa =
        u128::try_from(value.mantissa()).map_err(|_| MoneyError::Negative(value))?;
    Ok((U256::from(mantissa), value.scale()))
}

fn pow10(exp: u32) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Value of `wei` in the quote currency, truncated to [`QUOTE_SCALE`].
///
/// Computed as one integer division, so nothing is rounded before the
/// final truncation.
pub fn chain_to_quote(wei: U256, rate: ExchangeRate) -> Result<Decimal, MoneyError> {
    let (rate_units, rate_scale) = unscaled(rate.value())?;
    let numerator = wei
        .checked_mul(rate_units)
        .and_then(|n| n.checked_mul(pow10(QUOTE_SCALE)))
        .ok_or_else(|| MoneyError::Overflow(format!("{wei} wei at {rate}")))?;
    let units = numerator / pow10(NATIVE_DECIMALS + rate_scale);

    let units =
        i128::try_from(units).map_err(|_| MoneyError::Overflow(format!("{wei} wei at {rate}")))?;
    Decimal::try_from_i128_with_scale(units, QUOTE_SCALE)
        .map(|value| value.normalize())
        .map_err(|_| MoneyError::Overflow(format!("{wei} wei at {rate}")))
}

/// Wei bought by `amount` of quote currency, truncated to whole wei.
pub fn quote_to_chain(amount: Decimal, rate: ExchangeRate) -> Result<U256, MoneyError> {
    let (amount_units, amount_scale) = unscaled(amount)?;
    let (rate_units, rate_scale) = unscaled(rate.value())?;
    let numerator = amount_units
        .checked_mul(pow10(NATIVE_DECIMALS + rate_scale))
        .ok_or_else(|| MoneyError::Overflow(format!("{amount} / {rate}")))?;
    let denominator = rate_units * pow10(amount_scale);
    Ok(numerator / denominator)
}

/// Format wei as a human-readable native amount (e.g. `0.999`).
pub fn format_wei(amount: U256) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(WEI_PER_NATIVE);
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let decimal_str = format!(
            "{:0>width$}",
            remainder.to_string(),
            width = NATIVE_DECIMALS as usize
        );
        format!("{}.{}", whole, decimal_str.trim_end_matches('0'))
    }
}
