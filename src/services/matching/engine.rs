//! Matching engine: admission, the match loop, settlement, and cancellation.
//!
//! Placements on one instrument are serialised by a per-ticker
//! `tokio::sync::Mutex` held from admission until after commit; independent
//! instruments match in parallel. A placement runs inside a single database
//! transaction. Book mutations are buffered during the loop and applied only
//! once the transaction has committed, so an aborted placement leaves the
//! in-memory book exactly as it found it.

use dashmap::DashMap;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::book::InstrumentBook;
use super::types::{BookEntry, OrderBookSnapshot};
use crate::models::{
    limit_encumbrance, CreateOrderRequest, Direction, Instrument, Order, OrderStatus, OrderType,
    Wallet, QUOTE_TICKER,
};
use crate::services::ledger::LedgerError;
use crate::services::{instruments, ledger, wallets};
use crate::utils::response::ApiError;

pub struct MatchingEngine {
    pool: PgPool,
    books: DashMap<String, Arc<InstrumentBook>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// What the match loop produced: the taker's unfilled remainder and the fills
/// to replay onto the book after commit.
struct MatchOutcome {
    remaining: i64,
    maker_fills: Vec<(Uuid, i64)>,
}

impl MatchingEngine {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            books: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    fn book(&self, ticker: &str) -> Arc<InstrumentBook> {
        self.books
            .entry(ticker.to_string())
            .or_insert_with(|| Arc::new(InstrumentBook::new(ticker)))
            .clone()
    }

    fn lock_for(&self, ticker: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(ticker.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquires the per-instrument serialisation lock. Placement, cancel, and
    /// lifecycle operations that touch a ticker's book all go through this.
    pub async fn lock_ticker(&self, ticker: &str) -> OwnedMutexGuard<()> {
        self.lock_for(ticker).lock_owned().await
    }

    /// Rebuilds every book from resting limit orders. Rows arrive in
    /// (timestamp, id) order, so FIFO within a price level is reproduced.
    pub async fn recover_from_db(&self) -> Result<usize, sqlx::Error> {
        let rows = ledger::open_limit_orders(&self.pool).await?;
        let count = rows.len();

        for row in rows {
            self.book(&row.ticker)
                .insert(row.order.direction, BookEntry::from_order(&row.order));
        }

        Ok(count)
    }

    // ========================================================================
    // Placement
    // ========================================================================

    pub async fn place_order(
        &self,
        user_id: Uuid,
        req: &CreateOrderRequest,
    ) -> Result<Uuid, ApiError> {
        let ticker = req.ticker().to_string();
        let _serialised = self.lock_ticker(&ticker).await;
        let book = self.book(&ticker);

        let mut tx = self.pool.begin().await.map_err(ApiError::from)?;

        let instrument = instruments::by_ticker(&mut *tx, &ticker)
            .await?
            .ok_or(ApiError::NotFound("Instrument"))?;
        let quote = instruments::by_ticker(&mut *tx, QUOTE_TICKER)
            .await?
            .ok_or_else(|| {
                ApiError::Internal(anyhow::anyhow!("quote instrument {QUOTE_TICKER} not configured"))
            })?;
        let wallet = wallets::by_user_id(&mut *tx, user_id)
            .await?
            .ok_or(ApiError::NotFound("Wallet"))?;

        self.admit(&mut tx, req, &book, &wallet, &instrument, &quote)
            .await?;

        let order = ledger::insert_order(
            &mut *tx,
            user_id,
            instrument.id,
            req.order_type(),
            req.direction(),
            req.qty(),
            req.limit_price().unwrap_or(0),
        )
        .await?;

        let outcome = self
            .match_taker(&mut tx, &book, &order, &wallet, &instrument, &quote)
            .await?;

        // A market order fills completely or the whole placement unwinds.
        if order.order_type == OrderType::Market && outcome.remaining > 0 {
            tx.rollback().await.map_err(ApiError::from)?;
            return Err(ApiError::InsufficientLiquidity);
        }

        tx.commit().await.map_err(ApiError::from)?;

        for (maker_id, fill) in &outcome.maker_fills {
            book.apply_fill(*maker_id, *fill);
        }
        if order.order_type == OrderType::Limit && outcome.remaining > 0 {
            book.insert(
                order.direction,
                BookEntry {
                    order_id: order.id,
                    user_id,
                    price: order.price,
                    qty: order.qty,
                    filled: order.qty - outcome.remaining,
                    enqueued_at: order.timestamp.timestamp_millis(),
                },
            );
        }

        tracing::debug!(
            %ticker,
            order_id = %order.id,
            fills = outcome.maker_fills.len(),
            remaining = outcome.remaining,
            "order placed"
        );

        Ok(order.id)
    }

    /// Admission: validate funding and park the encumbrance (limit orders),
    /// or prove feasibility without reserving (market orders).
    async fn admit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        req: &CreateOrderRequest,
        book: &InstrumentBook,
        wallet: &Wallet,
        instrument: &Instrument,
        quote: &Instrument,
    ) -> Result<(), ApiError> {
        match req {
            CreateOrderRequest::Limit(body) => {
                let required = limit_encumbrance(body.direction, body.qty, body.price)
                    .map_err(|_| ApiError::Validation("Order value out of range".to_string()))?;
                let (reserve_on, refusal) = match body.direction {
                    Direction::Buy => (quote.id, "Insufficient RUB quantity"),
                    Direction::Sell => (instrument.id, "Insufficient instrument quantity"),
                };

                match ledger::reserve(&mut **tx, wallet.id, reserve_on, required).await {
                    Ok(()) => Ok(()),
                    Err(LedgerError::InsufficientFunds | LedgerError::BalanceMissing) => {
                        Err(ApiError::InsufficientFunds(refusal.to_string()))
                    }
                    Err(err) => Err(err.into()),
                }
            }
            CreateOrderRequest::Market(body) => match body.direction {
                Direction::Buy => {
                    let total_cost = book
                        .market_buy_cost(body.qty)
                        .ok_or(ApiError::InsufficientLiquidity)?;
                    let balance =
                        ledger::balance_for_update(&mut **tx, wallet.id, quote.id).await?;
                    if balance.map_or(true, |b| b.available() < total_cost) {
                        return Err(ApiError::InsufficientFunds(
                            "Insufficient RUB quantity".to_string(),
                        ));
                    }
                    Ok(())
                }
                Direction::Sell => {
                    let balance =
                        ledger::balance_for_update(&mut **tx, wallet.id, instrument.id).await?;
                    if balance.map_or(true, |b| b.available() < body.qty) {
                        return Err(ApiError::InsufficientFunds(
                            "Insufficient instrument quantity".to_string(),
                        ));
                    }
                    Ok(())
                }
            },
        }
    }

    // ========================================================================
    // Matching loop
    // ========================================================================

    async fn match_taker(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        book: &InstrumentBook,
        taker: &Order,
        taker_wallet: &Wallet,
        instrument: &Instrument,
        quote: &Instrument,
    ) -> Result<MatchOutcome, ApiError> {
        let limit_price = (taker.order_type == OrderType::Limit).then_some(taker.price);
        let makers = book.matches_for(taker.direction, limit_price);

        let mut remaining = taker.qty;
        let mut maker_fills = Vec::new();

        for maker in makers {
            if remaining == 0 {
                break;
            }
            let fill = remaining.min(maker.remaining());
            if fill <= 0 {
                continue;
            }

            self.settle_fill(tx, taker, taker_wallet, &maker, fill, instrument, quote)
                .await?;

            remaining -= fill;
            maker_fills.push((maker.order_id, fill));
        }

        Ok(MatchOutcome {
            remaining,
            maker_fills,
        })
    }

    /// Settles one fill. A limit taker never trades through either limit:
    /// the lower of the two quotes wins, so a buy taker lifts the ask at the
    /// ask's price and a resting bid pays no more than the incoming ask. A
    /// market taker has no reference price and settles at the maker's quote.
    #[allow(clippy::too_many_arguments)]
    async fn settle_fill(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        taker: &Order,
        taker_wallet: &Wallet,
        maker: &BookEntry,
        fill: i64,
        instrument: &Instrument,
        quote: &Instrument,
    ) -> Result<(), ApiError> {
        let trade_price = match taker.order_type {
            OrderType::Limit => maker.price.min(taker.price),
            OrderType::Market => maker.price,
        };

        let maker_wallet = wallets::by_user_id(&mut **tx, maker.user_id).await?.ok_or_else(|| {
            ApiError::Internal(anyhow::anyhow!("wallet missing for maker {}", maker.user_id))
        })?;

        // Maker encumbrance comes off at the maker's own price, so reserved
        // stays equal to the sum of live-order encumbrances.
        match taker.direction {
            // Taker buys, so the maker is a resting SELL holding instrument.
            Direction::Buy => {
                ledger::release(&mut **tx, maker_wallet.id, instrument.id, fill).await?;
            }
            // Taker sells, so the maker is a resting BUY holding cash.
            Direction::Sell => {
                ledger::release(&mut **tx, maker_wallet.id, quote.id, fill * maker.price).await?;
            }
        }

        // Limit takers release at their own limit price; the gap to the trade
        // price stays in their unreserved balance. Market takers never parked
        // anything.
        if taker.order_type == OrderType::Limit {
            match taker.direction {
                Direction::Buy => {
                    ledger::release(&mut **tx, taker_wallet.id, quote.id, fill * taker.price).await?;
                }
                Direction::Sell => {
                    ledger::release(&mut **tx, taker_wallet.id, instrument.id, fill).await?;
                }
            }
        }

        let (buyer_wallet_id, seller_wallet_id) = match taker.direction {
            Direction::Buy => (taker_wallet.id, maker_wallet.id),
            Direction::Sell => (maker_wallet.id, taker_wallet.id),
        };

        ledger::transfer(&mut **tx, seller_wallet_id, buyer_wallet_id, instrument.id, fill).await?;
        ledger::transfer(
            &mut **tx,
            buyer_wallet_id,
            seller_wallet_id,
            quote.id,
            fill * trade_price,
        )
        .await?;

        ledger::insert_trade(&mut **tx, instrument.id, seller_wallet_id, fill, trade_price).await?;

        ledger::apply_fill(&mut **tx, maker.order_id, fill).await?;
        ledger::apply_fill(&mut **tx, taker.id, fill).await?;

        tracing::debug!(
            ticker = %instrument.ticker,
            price = trade_price,
            qty = fill,
            maker = %maker.order_id,
            taker = %taker.id,
            "fill settled"
        );

        Ok(())
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    pub async fn cancel_order(&self, user_id: Uuid, order_id: Uuid) -> Result<(), ApiError> {
        // Resolve the ticker first so the right serialisation lock is taken;
        // an order's instrument never changes.
        let ticker = sqlx::query_scalar::<_, String>(
            "SELECT i.ticker FROM orders o JOIN instruments i ON i.id = o.instrument_id
             WHERE o.id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::NotFound("Order"))?;

        let _serialised = self.lock_ticker(&ticker).await;

        let mut tx = self.pool.begin().await.map_err(ApiError::from)?;

        let order = ledger::order_for_update(&mut *tx, order_id)
            .await?
            .ok_or(ApiError::NotFound("Order"))?;

        if order.order_type == OrderType::Market {
            return Err(ApiError::InvalidOrderState("Can't cancel market order"));
        }
        if order.user_id != user_id {
            return Err(ApiError::AccessDenied("Can't cancel other user's order"));
        }
        if !order.status.is_open() {
            return Err(ApiError::InvalidOrderState(
                "Can't cancel executed or cancelled order",
            ));
        }

        let wallet = wallets::by_user_id(&mut *tx, user_id)
            .await?
            .ok_or(ApiError::NotFound("Wallet"))?;
        let remaining = order.remaining();

        match order.direction {
            Direction::Buy => {
                let quote = instruments::by_ticker(&mut *tx, QUOTE_TICKER)
                    .await?
                    .ok_or_else(|| {
                        ApiError::Internal(anyhow::anyhow!(
                            "quote instrument {QUOTE_TICKER} not configured"
                        ))
                    })?;
                ledger::release(&mut *tx, wallet.id, quote.id, remaining * order.price).await?;
            }
            Direction::Sell => {
                ledger::release(&mut *tx, wallet.id, order.instrument_id, remaining).await?;
            }
        }

        ledger::set_order_status(&mut *tx, order_id, OrderStatus::Cancelled).await?;

        tx.commit().await.map_err(ApiError::from)?;

        if let Some(book) = self.books.get(&ticker) {
            book.remove(order_id);
        }

        tracing::debug!(%ticker, %order_id, released = remaining, "order cancelled");

        Ok(())
    }

    // ========================================================================
    // Projections & lifecycle
    // ========================================================================

    /// Aggregated depth for one ticker; an unknown ticker has an empty book.
    pub fn snapshot(&self, ticker: &str, depth: usize) -> OrderBookSnapshot {
        self.books
            .get(ticker)
            .map(|book| book.snapshot(depth))
            .unwrap_or_default()
    }

    /// Drops a ticker's book entirely. Callers must hold the ticker lock.
    pub fn remove_book(&self, ticker: &str) {
        self.books.remove(ticker);
    }

    /// Removes every resting entry of a deleted user across all books.
    pub async fn purge_user(&self, user_id: Uuid) -> usize {
        let tickers: Vec<String> = self.books.iter().map(|e| e.key().clone()).collect();

        let mut removed = 0;
        for ticker in tickers {
            let _serialised = self.lock_ticker(&ticker).await;
            if let Some(book) = self.books.get(&ticker) {
                removed += book.remove_user_orders(user_id);
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_engine() -> MatchingEngine {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        MatchingEngine::new(pool)
    }

    #[tokio::test]
    async fn test_snapshot_of_unknown_ticker_is_empty() {
        let engine = lazy_engine();
        let snap = engine.snapshot("BTC", 10);
        assert!(snap.bid_levels.is_empty());
        assert!(snap.ask_levels.is_empty());
    }

    #[tokio::test]
    async fn test_lock_is_shared_per_ticker() {
        let engine = lazy_engine();
        let a = engine.lock_for("BTC");
        let b = engine.lock_for("BTC");
        let c = engine.lock_for("ETH");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
