use std::collections::HashMap;

use tracing::warn;

use crate::error::CurrencyError;

/// Converts decimal amounts to integer minor units (cents, pence, ...)
/// using an ISO-4217 code → minor unit count table.
#[derive(Debug, Clone, Default)]
pub struct CurrencyConverter {
    minor_units: HashMap<String, u32>,
}

impl CurrencyConverter {
    /// Table format: `{"USD": 2, "JPY": 0, "KWD": 3}`. Codes are stored
    /// upper-cased.
    pub fn from_json(json: &str) -> Result<Self, CurrencyError> {
        let table: HashMap<String, u32> =
            serde_json::from_str(json).map_err(|e| CurrencyError::InvalidTable(e.to_string()))?;
        Ok(Self {
            minor_units: table
                .into_iter()
                .map(|(code, units)| (code.to_uppercase(), units))
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.minor_units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minor_units.is_empty()
    }

    /// `amount * 10^minor_units`, truncated toward zero.
    pub fn convert(&self, code: &str, amount: f64) -> Result<i64, CurrencyError> {
        if code.is_empty() {
            return Err(CurrencyError::EmptyCode);
        }
        let units = self
            .minor_units
            .get(&code.to_uppercase())
            .ok_or_else(|| CurrencyError::UnknownCode(code.to_string()))?;
        Ok((amount * 10f64.powi(*units as i32)) as i64)
    }

    /// Lenient form of [`convert`](Self::convert): logs and returns 0 when
    /// the code is unknown.
    pub fn convert_or_zero(&self, code: &str, amount: f64) -> i64 {
        match self.convert(code, amount) {
            Ok(minor) => minor,
            Err(e) => {
                warn!("No currency conversion performed, returning 0: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> CurrencyConverter {
        CurrencyConverter::from_json(r#"{"USD": 2, "jpy": 0, "KWD": 3}"#).unwrap()
    }

    #[test]
    fn scales_by_minor_units() {
        let c = converter();
        assert_eq!(c.convert("USD", 12.5), Ok(1250));
        assert_eq!(c.convert("usd", 0.25), Ok(25));
        assert_eq!(c.convert("JPY", 300.0), Ok(300));
        assert_eq!(c.convert("KWD", 1.5), Ok(1500));
    }

    #[test]
    fn unknown_and_empty_codes_are_errors() {
        let c = converter();
        assert_eq!(c.convert("", 1.0), Err(CurrencyError::EmptyCode));
        assert_eq!(c.convert("XXX", 1.0), Err(CurrencyError::UnknownCode("XXX".into())));
        assert_eq!(c.convert_or_zero("XXX", 1.0), 0);
    }

    #[test]
    fn bad_table_is_reported() {
        assert!(matches!(
            CurrencyConverter::from_json("[1, 2]"),
            Err(CurrencyError::InvalidTable(_))
        ));
    }
}
