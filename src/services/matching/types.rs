//! Shared types of the matching pipeline.

use serde::Serialize;
use uuid::Uuid;

use crate::models::Order;

/// Volatile projection of a resting limit order. The orders table is the
/// source of truth; entries are rebuilt from it on startup.
#[derive(Debug, Clone)]
pub struct BookEntry {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub price: i64,
    pub qty: i64,
    pub filled: i64,
    /// Enqueue instant in epoch milliseconds; FIFO key within a price level.
    pub enqueued_at: i64,
}

impl BookEntry {
    pub fn remaining(&self) -> i64 {
        self.qty - self.filled
    }

    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id,
            price: order.price,
            qty: order.qty,
            filled: order.filled,
            enqueued_at: order.timestamp.timestamp_millis(),
        }
    }
}

/// Aggregated remaining quantity at one price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceLevel {
    pub price: i64,
    pub qty: i64,
}

/// Depth view of one book: bids best-first (descending price), asks
/// best-first (ascending price).
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderBookSnapshot {
    pub bid_levels: Vec<PriceLevel>,
    pub ask_levels: Vec<PriceLevel>,
}
