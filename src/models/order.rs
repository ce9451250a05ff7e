use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_direction", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyExecuted,
    Executed,
    Cancelled,
}

impl OrderStatus {
    /// An open order still rests on the book and encumbers funds.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyExecuted)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::PartiallyExecuted => write!(f, "PARTIALLY_EXECUTED"),
            OrderStatus::Executed => write!(f, "EXECUTED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub instrument_id: i64,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub direction: Direction,
    pub qty: i64,
    pub price: i64,
    pub filled: i64,
    pub timestamp: DateTime<Utc>,
}

impl Order {
    pub fn remaining(&self) -> i64 {
        self.qty - self.filled
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LimitOrderBody {
    pub direction: Direction,
    pub ticker: String,
    #[validate(range(min = 1))]
    pub qty: i64,
    #[validate(range(min = 1))]
    pub price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct MarketOrderBody {
    pub direction: Direction,
    pub ticker: String,
    #[validate(range(min = 1))]
    pub qty: i64,
}

/// Inbound order payload. The two variants differ only by the presence of
/// `price`: a body carrying one is a LIMIT order, a body without is MARKET.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreateOrderRequest {
    Limit(LimitOrderBody),
    Market(MarketOrderBody),
}

impl CreateOrderRequest {
    pub fn ticker(&self) -> &str {
        match self {
            CreateOrderRequest::Limit(body) => &body.ticker,
            CreateOrderRequest::Market(body) => &body.ticker,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            CreateOrderRequest::Limit(body) => body.direction,
            CreateOrderRequest::Market(body) => body.direction,
        }
    }

    pub fn qty(&self) -> i64 {
        match self {
            CreateOrderRequest::Limit(body) => body.qty,
            CreateOrderRequest::Market(body) => body.qty,
        }
    }

    /// LIMIT price; MARKET orders have none and are persisted with price 0.
    pub fn limit_price(&self) -> Option<i64> {
        match self {
            CreateOrderRequest::Limit(body) => Some(body.price),
            CreateOrderRequest::Market(_) => None,
        }
    }

    pub fn order_type(&self) -> OrderType {
        match self {
            CreateOrderRequest::Limit(_) => OrderType::Limit,
            CreateOrderRequest::Market(_) => OrderType::Market,
        }
    }
}

impl Validate for CreateOrderRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            CreateOrderRequest::Limit(body) => body.validate(),
            CreateOrderRequest::Market(body) => body.validate(),
        }
    }
}

/// Pre-trade encumbrance of a limit order: BUY parks `qty * price` of the
/// cash instrument, SELL parks `qty` of the traded instrument.
pub fn limit_encumbrance(direction: Direction, qty: i64, price: i64) -> Result<i64, ValidationError> {
    match direction {
        Direction::Buy => qty.checked_mul(price).ok_or_else(|| ValidationError::new("overflow")),
        Direction::Sell => Ok(qty),
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LimitOrderView {
    pub id: Uuid,
    pub status: OrderStatus,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub body: LimitOrderBody,
    pub filled: i64,
}

#[derive(Debug, Serialize)]
pub struct MarketOrderView {
    pub id: Uuid,
    pub status: OrderStatus,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub body: MarketOrderBody,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OrderView {
    Limit(LimitOrderView),
    Market(MarketOrderView),
}

impl OrderView {
    pub fn from_order(order: &Order, ticker: &str) -> Self {
        match order.order_type {
            OrderType::Limit => OrderView::Limit(LimitOrderView {
                id: order.id,
                status: order.status,
                user_id: order.user_id,
                timestamp: order.timestamp,
                body: LimitOrderBody {
                    direction: order.direction,
                    ticker: ticker.to_string(),
                    qty: order.qty,
                    price: order.price,
                },
                filled: order.filled,
            }),
            OrderType::Market => OrderView::Market(MarketOrderView {
                id: order.id,
                status: order.status,
                user_id: order.user_id,
                timestamp: order.timestamp,
                body: MarketOrderBody {
                    direction: order.direction,
                    ticker: ticker.to_string(),
                    qty: order.qty,
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_with_price_parses_as_limit() {
        let req: CreateOrderRequest = serde_json::from_str(
            r#"{"direction": "BUY", "ticker": "BTC", "qty": 3, "price": 100}"#,
        )
        .unwrap();

        assert_eq!(req.order_type(), OrderType::Limit);
        assert_eq!(req.limit_price(), Some(100));
        assert_eq!(req.qty(), 3);
        assert_eq!(req.direction(), Direction::Buy);
    }

    #[test]
    fn test_body_without_price_parses_as_market() {
        let req: CreateOrderRequest =
            serde_json::from_str(r#"{"direction": "SELL", "ticker": "BTC", "qty": 2}"#).unwrap();

        assert_eq!(req.order_type(), OrderType::Market);
        assert_eq!(req.limit_price(), None);
        assert_eq!(req.direction(), Direction::Sell);
    }

    #[test]
    fn test_zero_qty_fails_validation() {
        let req: CreateOrderRequest =
            serde_json::from_str(r#"{"direction": "BUY", "ticker": "BTC", "qty": 0, "price": 10}"#)
                .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_zero_price_fails_validation() {
        let req: CreateOrderRequest =
            serde_json::from_str(r#"{"direction": "BUY", "ticker": "BTC", "qty": 1, "price": 0}"#)
                .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_limit_encumbrance() {
        assert_eq!(limit_encumbrance(Direction::Buy, 3, 100).unwrap(), 300);
        assert_eq!(limit_encumbrance(Direction::Sell, 3, 100).unwrap(), 3);
        assert!(limit_encumbrance(Direction::Buy, i64::MAX, 2).is_err());
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&OrderStatus::PartiallyExecuted).unwrap();
        assert_eq!(json, r#""PARTIALLY_EXECUTED""#);
    }

    #[test]
    fn test_limit_view_carries_filled_and_price() {
        let order = Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            instrument_id: 1,
            order_type: OrderType::Limit,
            status: OrderStatus::PartiallyExecuted,
            direction: Direction::Buy,
            qty: 5,
            price: 40,
            filled: 2,
            timestamp: Utc::now(),
        };

        let view = OrderView::from_order(&order, "BTC");
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["filled"], 2);
        assert_eq!(json["body"]["price"], 40);
        assert_eq!(json["body"]["ticker"], "BTC");
    }

    #[test]
    fn test_market_view_has_no_price() {
        let order = Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            instrument_id: 1,
            order_type: OrderType::Market,
            status: OrderStatus::Executed,
            direction: Direction::Sell,
            qty: 5,
            price: 0,
            filled: 5,
            timestamp: Utc::now(),
        };

        let view = OrderView::from_order(&order, "BTC");
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("filled").is_none());
        assert!(json["body"].get("price").is_none());
    }
}
