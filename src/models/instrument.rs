use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

/// Ticker of the cash instrument all trade prices are quoted in.
pub const QUOTE_TICKER: &str = "RUB";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Instrument {
    pub id: i64,
    pub ticker: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstrumentResponse {
    pub name: String,
    pub ticker: String,
}

impl From<Instrument> for InstrumentResponse {
    fn from(instrument: Instrument) -> Self {
        Self {
            name: instrument.name,
            ticker: instrument.ticker,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInstrumentRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(custom = "validate_ticker")]
    pub ticker: String,
}

/// Tickers are 2..=10 uppercase ASCII letters.
pub fn validate_ticker(ticker: &str) -> Result<(), ValidationError> {
    let len_ok = (2..=10).contains(&ticker.len());
    if len_ok && ticker.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::new("ticker"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_validation() {
        assert!(validate_ticker("RUB").is_ok());
        assert!(validate_ticker("BTC").is_ok());
        assert!(validate_ticker("MEMECOINXY").is_ok());

        assert!(validate_ticker("B").is_err());
        assert!(validate_ticker("TOOLONGTICKER").is_err());
        assert!(validate_ticker("btc").is_err());
        assert!(validate_ticker("BTC1").is_err());
        assert!(validate_ticker("").is_err());
    }
}
