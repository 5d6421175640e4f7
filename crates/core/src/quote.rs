//! Latest-quote snapshot types.

use crate::FixedPoint;
use serde::{Deserialize, Serialize};

/// Direction of a price change relative to the previous close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeSign {
    Up,
    Down,
    Flat,
}

impl ChangeSign {
    /// Derive the sign from a raw change value.
    pub fn from_change(change: f64) -> Self {
        if change > 0.0 {
            ChangeSign::Up
        } else if change < 0.0 {
            ChangeSign::Down
        } else {
            ChangeSign::Flat
        }
    }
}

/// Latest price/change snapshot for a symbol.
///
/// Replaced wholesale on each inbound message; no history is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Current price.
    pub price: FixedPoint,
    /// Magnitude of the change versus previous close.
    pub change_amount: FixedPoint,
    /// Direction of the change.
    pub change_sign: ChangeSign,
}

impl Quote {
    /// Build a quote from a price and a signed change amount.
    /// The sign is folded into `change_sign`; `change_amount` keeps the magnitude.
    pub fn from_price_and_change(price: FixedPoint, change: f64) -> Self {
        Self {
            price,
            change_amount: FixedPoint::from_f64(change.abs()),
            change_sign: ChangeSign::from_change(change),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_change_sign_from_change() {
        assert_eq!(ChangeSign::from_change(500.0), ChangeSign::Up);
        assert_eq!(ChangeSign::from_change(-0.5), ChangeSign::Down);
        assert_eq!(ChangeSign::from_change(0.0), ChangeSign::Flat);
    }

    #[test]
    fn test_change_sign_serde_uppercase() {
        assert_eq!(serde_json::to_string(&ChangeSign::Up).unwrap(), "\"UP\"");
        let parsed: ChangeSign = serde_json::from_str("\"DOWN\"").unwrap();
        assert_eq!(parsed, ChangeSign::Down);
    }

    #[test]
    fn test_quote_from_price_and_change() {
        let quote = Quote::from_price_and_change(FixedPoint::from_f64(70000.0), 500.0);
        assert_eq!(quote.price.to_f64(), 70000.0);
        assert_eq!(quote.change_amount.to_f64(), 500.0);
        assert_eq!(quote.change_sign, ChangeSign::Up);

        let falling = Quote::from_price_and_change(FixedPoint::from_f64(69500.0), -500.0);
        assert_eq!(falling.change_amount.to_f64(), 500.0);
        assert_eq!(falling.change_sign, ChangeSign::Down);

        let flat = Quote::from_price_and_change(FixedPoint::from_f64(70000.0), 0.0);
        assert_eq!(flat.change_amount, FixedPoint::ZERO);
        assert_eq!(flat.change_sign, ChangeSign::Flat);
    }
}
