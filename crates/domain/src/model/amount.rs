use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Atomic units per whole coin.
pub const ATOMIC_UNITS_PER_COIN: u64 = 100_000_000;

/// Decimal digits kept when rendering amounts for display.
pub const DISPLAY_DECIMALS: u32 = 4;

/// Non-negative amount in atomic units. Serialized as a decimal string so
/// values past the 2^53 float boundary survive JSON round trips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_atomic(value: u64) -> Self {
        Self(value)
    }

    pub const fn atomic(self) -> u64 {
        self.0
    }

    /// Renders the amount in whole coins with four decimals, e.g. `1.5000`.
    pub fn to_display(self) -> String {
        format_coins(u128::from(self.0))
    }
}

/// Formats an atomic total as whole coins rounded half-up to
/// `DISPLAY_DECIMALS` places using integer arithmetic only.
pub fn format_coins(atomic: u128) -> String {
    let step = 10u128.pow(8 - DISPLAY_DECIMALS);
    let scaled = (atomic + step / 2) / step;
    let unit = 10u128.pow(DISPLAY_DECIMALS);
    format!(
        "{}.{:0width$}",
        scaled / unit,
        scaled % unit,
        width = DISPLAY_DECIMALS as usize
    )
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("amount must be a non-negative integer of atomic units: `{0}`")]
pub struct AmountParseError(pub String);

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| AmountParseError(s.to_string()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal string or unsigned integer of atomic units")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Amount, E> {
                Ok(Amount(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Amount, E> {
                u64::try_from(value)
                    .map(Amount)
                    .map_err(|_| E::custom(AmountParseError(value.to_string())))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Amount, E> {
                value.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_four_decimals() {
        assert_eq!(Amount::from_atomic(150_000_000).to_display(), "1.5000");
        assert_eq!(Amount::from_atomic(0).to_display(), "0.0000");
        assert_eq!(Amount::from_atomic(12_345).to_display(), "0.0001");
        assert_eq!(Amount::from_atomic(4_999).to_display(), "0.0000");
        assert_eq!(Amount::from_atomic(199_995_000).to_display(), "2.0000");
    }

    #[test]
    fn deserializes_strings_and_numbers() {
        let from_str: Amount = serde_json::from_str("\"9007199254740993\"").unwrap();
        assert_eq!(from_str.atomic(), 9_007_199_254_740_993);
        let from_num: Amount = serde_json::from_str("42").unwrap();
        assert_eq!(from_num, Amount::from_atomic(42));
        assert!(serde_json::from_str::<Amount>("-1").is_err());
        assert!(serde_json::from_str::<Amount>("\"1.5\"").is_err());
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Amount::from_atomic(u64::MAX)).unwrap();
        assert_eq!(json, "\"18446744073709551615\"");
    }
}
