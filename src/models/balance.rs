use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::instrument::validate_ticker;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub id: i64,
    pub user_id: Uuid,
}

/// A wallet's holding of one instrument. `reserved` is the slice of `amount`
/// currently backing live orders; `reserved <= amount` always.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Balance {
    pub id: i64,
    pub wallet_id: i64,
    pub instrument_id: i64,
    pub amount: i64,
    pub reserved: i64,
}

impl Balance {
    /// Units not earmarked by any resting order.
    pub fn available(&self) -> i64 {
        self.amount - self.reserved
    }
}

/// Body of the admin deposit and withdraw endpoints.
#[derive(Debug, Deserialize, Validate)]
pub struct BalanceChangeRequest {
    pub user_id: Uuid,
    #[validate(custom = "validate_ticker")]
    pub ticker: String,
    #[validate(range(min = 1))]
    pub amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_excludes_reserved() {
        let balance = Balance {
            id: 1,
            wallet_id: 1,
            instrument_id: 1,
            amount: 100,
            reserved: 30,
        };
        assert_eq!(balance.available(), 70);
    }

    #[test]
    fn test_balance_change_request_rejects_zero_amount() {
        let req = BalanceChangeRequest {
            user_id: Uuid::new_v4(),
            ticker: "RUB".to_string(),
            amount: 0,
        };
        assert!(req.validate().is_err());
    }
}
