//! Per-instrument order book.
//!
//! Each side is a price-keyed `BTreeMap` of FIFO queues, plus an order-id
//! index for O(1) removal. Ordering is price-time: bids are consumed from the
//! highest price down, asks from the lowest up; within a level, earlier
//! enqueue wins. The book is a matching aid only and is never durable.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

use super::types::{BookEntry, OrderBookSnapshot, PriceLevel};
use crate::models::Direction;

pub struct InstrumentBook {
    ticker: String,

    /// Bids keyed by price; best bid is the last key.
    bids: RwLock<BTreeMap<i64, VecDeque<BookEntry>>>,

    /// Asks keyed by price; best ask is the first key.
    asks: RwLock<BTreeMap<i64, VecDeque<BookEntry>>>,

    /// order_id -> (side, price) for cancellation and fill updates.
    index: DashMap<Uuid, (Direction, i64)>,
}

impl InstrumentBook {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            bids: RwLock::new(BTreeMap::new()),
            asks: RwLock::new(BTreeMap::new()),
            index: DashMap::new(),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    fn side(&self, direction: Direction) -> &RwLock<BTreeMap<i64, VecDeque<BookEntry>>> {
        match direction {
            Direction::Buy => &self.bids,
            Direction::Sell => &self.asks,
        }
    }

    pub fn insert(&self, direction: Direction, entry: BookEntry) {
        let price = entry.price;
        let order_id = entry.order_id;

        let mut side = self.side(direction).write();
        side.entry(price).or_insert_with(VecDeque::new).push_back(entry);

        self.index.insert(order_id, (direction, price));
    }

    pub fn remove(&self, order_id: Uuid) -> Option<BookEntry> {
        let (direction, price) = self.index.remove(&order_id)?.1;

        let mut side = self.side(direction).write();
        let queue = side.get_mut(&price)?;
        let pos = queue.iter().position(|e| e.order_id == order_id)?;
        let entry = queue.remove(pos);
        if queue.is_empty() {
            side.remove(&price);
        }
        entry
    }

    /// Applies a fill to a resting entry, dropping it once fully executed.
    /// Returns the remaining quantity after the fill.
    pub fn apply_fill(&self, order_id: Uuid, fill_qty: i64) -> Option<i64> {
        let (direction, price) = *self.index.get(&order_id)?.value();

        let mut side = self.side(direction).write();
        let queue = side.get_mut(&price)?;
        let pos = queue.iter().position(|e| e.order_id == order_id)?;

        let remaining = {
            let entry = &mut queue[pos];
            entry.filled += fill_qty;
            entry.remaining()
        };

        if remaining <= 0 {
            queue.remove(pos);
            if queue.is_empty() {
                side.remove(&price);
            }
            self.index.remove(&order_id);
        }

        Some(remaining)
    }

    /// Best resting price on a side: highest bid, lowest ask.
    pub fn best_price(&self, direction: Direction) -> Option<i64> {
        let side = self.side(direction).read();
        match direction {
            Direction::Buy => side.keys().next_back().copied(),
            Direction::Sell => side.keys().next().copied(),
        }
    }

    /// Resting orders a taker qualifies against, best price first, FIFO
    /// within a level. A BUY taker scans asks priced at or below its limit;
    /// a SELL taker scans bids at or above. `None` matches the whole side.
    pub fn matches_for(&self, taker_direction: Direction, limit_price: Option<i64>) -> Vec<BookEntry> {
        let mut out = Vec::new();

        match taker_direction {
            Direction::Buy => {
                let asks = self.asks.read();
                for (price, queue) in asks.iter() {
                    if limit_price.is_some_and(|limit| *price > limit) {
                        break;
                    }
                    out.extend(queue.iter().cloned());
                }
            }
            Direction::Sell => {
                let bids = self.bids.read();
                for (price, queue) in bids.iter().rev() {
                    if limit_price.is_some_and(|limit| *price < limit) {
                        break;
                    }
                    out.extend(queue.iter().cloned());
                }
            }
        }

        out
    }

    /// Dry-run of a market buy: total cash needed to lift `qty` units off the
    /// asks, or `None` when the book cannot cover it.
    pub fn market_buy_cost(&self, qty: i64) -> Option<i64> {
        let mut remaining = qty;
        let mut total_cost: i64 = 0;

        for maker in self.matches_for(Direction::Buy, None) {
            if remaining <= 0 {
                break;
            }
            let fill = remaining.min(maker.remaining());
            total_cost = total_cost.checked_add(fill.checked_mul(maker.price)?)?;
            remaining -= fill;
        }

        (remaining == 0).then_some(total_cost)
    }

    /// Aggregated depth, top `limit` levels per side.
    pub fn snapshot(&self, limit: usize) -> OrderBookSnapshot {
        let mut bid_levels = Vec::new();
        let mut ask_levels = Vec::new();

        {
            let bids = self.bids.read();
            for (price, queue) in bids.iter().rev().take(limit) {
                let qty: i64 = queue.iter().map(BookEntry::remaining).sum();
                bid_levels.push(PriceLevel { price: *price, qty });
            }
        }

        {
            let asks = self.asks.read();
            for (price, queue) in asks.iter().take(limit) {
                let qty: i64 = queue.iter().map(BookEntry::remaining).sum();
                ask_levels.push(PriceLevel { price: *price, qty });
            }
        }

        OrderBookSnapshot {
            bid_levels,
            ask_levels,
        }
    }

    /// Drops every entry belonging to `user_id`; used when a user is deleted.
    pub fn remove_user_orders(&self, user_id: Uuid) -> usize {
        let ids: Vec<Uuid> = self
            .index
            .iter()
            .map(|kv| *kv.key())
            .collect();

        let mut removed = 0;
        for order_id in ids {
            let owner = {
                let (direction, price) = match self.index.get(&order_id) {
                    Some(kv) => *kv.value(),
                    None => continue,
                };
                let side = self.side(direction).read();
                side.get(&price)
                    .and_then(|q| q.iter().find(|e| e.order_id == order_id))
                    .map(|e| e.user_id)
            };
            if owner == Some(user_id) && self.remove(order_id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn order_count(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(price: i64, qty: i64, at: i64) -> BookEntry {
        BookEntry {
            order_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            price,
            qty,
            filled: 0,
            enqueued_at: at,
        }
    }

    #[test]
    fn test_insert_and_remove() {
        let book = InstrumentBook::new("BTC");
        let e = entry(100, 1, 1);
        let id = e.order_id;

        book.insert(Direction::Buy, e);
        assert_eq!(book.order_count(), 1);

        let removed = book.remove(id);
        assert!(removed.is_some());
        assert_eq!(book.order_count(), 0);
        assert_eq!(book.best_price(Direction::Buy), None);
    }

    #[test]
    fn test_best_price_per_side() {
        let book = InstrumentBook::new("BTC");
        book.insert(Direction::Buy, entry(100, 1, 1));
        book.insert(Direction::Buy, entry(101, 1, 2));
        book.insert(Direction::Sell, entry(102, 1, 3));
        book.insert(Direction::Sell, entry(103, 1, 4));

        assert_eq!(book.best_price(Direction::Buy), Some(101));
        assert_eq!(book.best_price(Direction::Sell), Some(102));
    }

    #[test]
    fn test_buy_taker_scans_asks_cheapest_first() {
        let book = InstrumentBook::new("BTC");
        book.insert(Direction::Sell, entry(60, 1, 1));
        book.insert(Direction::Sell, entry(50, 1, 2));
        book.insert(Direction::Sell, entry(55, 1, 3));

        let makers = book.matches_for(Direction::Buy, Some(55));
        let prices: Vec<i64> = makers.iter().map(|m| m.price).collect();
        assert_eq!(prices, vec![50, 55]);
    }

    #[test]
    fn test_sell_taker_scans_bids_highest_first() {
        let book = InstrumentBook::new("BTC");
        book.insert(Direction::Buy, entry(40, 1, 1));
        book.insert(Direction::Buy, entry(50, 1, 2));
        book.insert(Direction::Buy, entry(45, 1, 3));

        let makers = book.matches_for(Direction::Sell, Some(45));
        let prices: Vec<i64> = makers.iter().map(|m| m.price).collect();
        assert_eq!(prices, vec![50, 45]);
    }

    #[test]
    fn test_fifo_within_price_level() {
        let book = InstrumentBook::new("BTC");
        let first = entry(50, 1, 1);
        let second = entry(50, 1, 2);
        let first_id = first.order_id;
        let second_id = second.order_id;

        book.insert(Direction::Sell, first);
        book.insert(Direction::Sell, second);

        let makers = book.matches_for(Direction::Buy, None);
        assert_eq!(makers[0].order_id, first_id);
        assert_eq!(makers[1].order_id, second_id);
    }

    #[test]
    fn test_market_scan_ignores_price_bound() {
        let book = InstrumentBook::new("BTC");
        book.insert(Direction::Sell, entry(50, 1, 1));
        book.insert(Direction::Sell, entry(500, 1, 2));

        assert_eq!(book.matches_for(Direction::Buy, None).len(), 2);
        assert_eq!(book.matches_for(Direction::Buy, Some(100)).len(), 1);
    }

    #[test]
    fn test_apply_fill_partial_then_full() {
        let book = InstrumentBook::new("BTC");
        let e = entry(50, 3, 1);
        let id = e.order_id;
        book.insert(Direction::Sell, e);

        assert_eq!(book.apply_fill(id, 2), Some(1));
        assert_eq!(book.order_count(), 1);

        assert_eq!(book.apply_fill(id, 1), Some(0));
        assert_eq!(book.order_count(), 0);
        assert_eq!(book.best_price(Direction::Sell), None);
    }

    #[test]
    fn test_market_buy_cost_walks_ascending() {
        let book = InstrumentBook::new("BTC");
        book.insert(Direction::Sell, entry(50, 1, 1));
        book.insert(Direction::Sell, entry(60, 1, 2));

        assert_eq!(book.market_buy_cost(1), Some(50));
        assert_eq!(book.market_buy_cost(2), Some(110));
        assert_eq!(book.market_buy_cost(3), None);
    }

    #[test]
    fn test_market_buy_cost_skips_filled_portion() {
        let book = InstrumentBook::new("BTC");
        let mut e = entry(50, 5, 1);
        e.filled = 4;
        book.insert(Direction::Sell, e);

        assert_eq!(book.market_buy_cost(1), Some(50));
        assert_eq!(book.market_buy_cost(2), None);
    }

    #[test]
    fn test_snapshot_aggregates_levels() {
        let book = InstrumentBook::new("BTC");
        book.insert(Direction::Buy, entry(100, 1, 1));
        book.insert(Direction::Buy, entry(100, 2, 2));
        book.insert(Direction::Buy, entry(99, 4, 3));
        book.insert(Direction::Sell, entry(102, 5, 4));

        let snap = book.snapshot(10);
        assert_eq!(
            snap.bid_levels,
            vec![
                PriceLevel { price: 100, qty: 3 },
                PriceLevel { price: 99, qty: 4 }
            ]
        );
        assert_eq!(snap.ask_levels, vec![PriceLevel { price: 102, qty: 5 }]);
    }

    #[test]
    fn test_snapshot_depth_limit() {
        let book = InstrumentBook::new("BTC");
        for (i, price) in [100, 99, 98, 97].iter().enumerate() {
            book.insert(Direction::Buy, entry(*price, 1, i as i64));
        }

        let snap = book.snapshot(2);
        let prices: Vec<i64> = snap.bid_levels.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![100, 99]);
    }

    #[test]
    fn test_remove_user_orders() {
        let book = InstrumentBook::new("BTC");
        let user = Uuid::new_v4();
        let mut mine = entry(50, 1, 1);
        mine.user_id = user;
        let theirs = entry(51, 1, 2);

        book.insert(Direction::Sell, mine);
        book.insert(Direction::Sell, theirs);

        assert_eq!(book.remove_user_orders(user), 1);
        assert_eq!(book.order_count(), 1);
        assert_eq!(book.best_price(Direction::Sell), Some(51));
    }
}
