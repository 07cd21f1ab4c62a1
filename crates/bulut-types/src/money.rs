//! Currencies and exact minor-unit amounts.
//!
//! Amounts never pass through floating point. Decimal text is parsed
//! digit by digit into a count of the currency's minor units.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::{Result, TypesError};

/// Supported settlement currencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Usdc,
    Arc,
    Btc,
    Eth,
}

impl Currency {
    /// Number of decimal places in one major unit.
    pub fn precision(self) -> u32 {
        match self {
            Self::Usd | Self::Eur | Self::Gbp => 2,
            Self::Usdc | Self::Arc => 6,
            Self::Btc => 8,
            Self::Eth => 18,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Usdc => "USDC",
            Self::Arc => "ARC",
            Self::Btc => "BTC",
            Self::Eth => "ETH",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "USDC" => Ok(Self::Usdc),
            "ARC" => Ok(Self::Arc),
            "BTC" => Ok(Self::Btc),
            "ETH" => Ok(Self::Eth),
            _ => Err(TypesError::UnsupportedCurrency(s.to_string())),
        }
    }
}

/// A non-negative amount in minor units of some currency.
///
/// Serialized as a decimal string of minor units so 128-bit values survive
/// JSON consumers that only have doubles.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr,
)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn minor_units(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Parse decimal major-unit text (e.g. `"50.00"`) for `currency`.
    ///
    /// # Errors
    ///
    /// [`TypesError::InvalidAmount`] if the text is not a plain non-negative
    /// decimal, has more fractional digits than the currency allows, or
    /// overflows.
    pub fn from_decimal(text: &str, currency: Currency) -> Result<Self> {
        let invalid = || TypesError::InvalidAmount(text.to_string());
        let trimmed = text.trim();
        let (whole, frac) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed, ""),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if trimmed.ends_with('.') {
            return Err(invalid());
        }
        let precision = currency.precision();
        if frac.len() > precision as usize {
            return Err(invalid());
        }

        let scale = 10u128.checked_pow(precision).ok_or_else(invalid)?;
        let whole_units: u128 = whole.parse().map_err(|_| invalid())?;
        let mut frac_units: u128 = 0;
        if !frac.is_empty() {
            frac_units = frac.parse().map_err(|_| invalid())?;
            let pad = 10u128
                .checked_pow(precision - frac.len() as u32)
                .ok_or_else(invalid)?;
            frac_units = frac_units.checked_mul(pad).ok_or_else(invalid)?;
        }
        whole_units
            .checked_mul(scale)
            .and_then(|v| v.checked_add(frac_units))
            .map(Self)
            .ok_or_else(invalid)
    }

    /// Render as decimal major units with the currency's full precision.
    pub fn to_decimal(self, currency: Currency) -> String {
        let precision = currency.precision();
        if precision == 0 {
            return self.0.to_string();
        }
        let scale = 10u128.pow(precision);
        format!(
            "{}.{:0width$}",
            self.0 / scale,
            self.0 % scale,
            width = precision as usize
        )
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u128>()
            .map(Self)
            .map_err(|_| TypesError::InvalidAmount(s.to_string()))
    }
}
