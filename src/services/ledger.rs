//! Transactional ledger operations: balances with reservation accounting,
//! order rows, and the immutable trade log.
//!
//! Every function takes a `&mut PgConnection` so callers decide the
//! transaction boundary; the matching engine runs a whole placement through
//! one transaction. Balance reads that precede writes use `FOR UPDATE` so
//! concurrent writers of the same `(wallet, instrument)` row serialise.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{Balance, Direction, Order, OrderStatus, OrderType};
use crate::utils::response::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// No balance row for the (wallet, instrument) pair.
    #[error("Balance not found")]
    BalanceMissing,

    /// The operation would push `reserved` above `amount`.
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// A release exceeded `reserved`. This can only happen if reservation
    /// accounting is broken somewhere, so it is never a client error.
    #[error("Insufficient reserved funds")]
    InsufficientReserved,

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds => {
                ApiError::InsufficientFunds("Insufficient funds".to_string())
            }
            LedgerError::BalanceMissing
            | LedgerError::InsufficientReserved
            | LedgerError::Db(_) => ApiError::Internal(err.into()),
        }
    }
}

// ============================================================================
// Balances
// ============================================================================

/// Row-locking read; blocks concurrent writers of the same row until the
/// enclosing transaction commits.
pub async fn balance_for_update(
    conn: &mut PgConnection,
    wallet_id: i64,
    instrument_id: i64,
) -> Result<Option<Balance>, sqlx::Error> {
    sqlx::query_as::<_, Balance>(
        "SELECT id, wallet_id, instrument_id, amount, reserved
         FROM balances
         WHERE wallet_id = $1 AND instrument_id = $2
         FOR UPDATE",
    )
    .bind(wallet_id)
    .bind(instrument_id)
    .fetch_optional(conn)
    .await
}

/// Earmarks `amount` units against live orders. Only unreserved units can be
/// earmarked.
pub async fn reserve(
    conn: &mut PgConnection,
    wallet_id: i64,
    instrument_id: i64,
    amount: i64,
) -> Result<(), LedgerError> {
    let balance = balance_for_update(conn, wallet_id, instrument_id)
        .await?
        .ok_or(LedgerError::BalanceMissing)?;

    if balance.available() < amount {
        return Err(LedgerError::InsufficientFunds);
    }

    sqlx::query("UPDATE balances SET reserved = reserved + $1 WHERE id = $2")
        .bind(amount)
        .bind(balance.id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Returns earmarked units to the unreserved pool.
pub async fn release(
    conn: &mut PgConnection,
    wallet_id: i64,
    instrument_id: i64,
    amount: i64,
) -> Result<(), LedgerError> {
    let balance = balance_for_update(conn, wallet_id, instrument_id)
        .await?
        .ok_or(LedgerError::BalanceMissing)?;

    if balance.reserved < amount {
        return Err(LedgerError::InsufficientReserved);
    }

    sqlx::query("UPDATE balances SET reserved = reserved - $1 WHERE id = $2")
        .bind(amount)
        .bind(balance.id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Moves unreserved units between wallets, creating the destination balance
/// row on demand.
pub async fn transfer(
    conn: &mut PgConnection,
    from_wallet_id: i64,
    to_wallet_id: i64,
    instrument_id: i64,
    amount: i64,
) -> Result<(), LedgerError> {
    let from = balance_for_update(conn, from_wallet_id, instrument_id)
        .await?
        .ok_or(LedgerError::BalanceMissing)?;

    if from.available() < amount {
        return Err(LedgerError::InsufficientFunds);
    }

    sqlx::query(
        "INSERT INTO balances (wallet_id, instrument_id, amount, reserved)
         VALUES ($1, $2, 0, 0)
         ON CONFLICT (wallet_id, instrument_id) DO NOTHING",
    )
    .bind(to_wallet_id)
    .bind(instrument_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE balances SET amount = amount - $1 WHERE id = $2")
        .bind(amount)
        .bind(from.id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "UPDATE balances SET amount = amount + $1
         WHERE wallet_id = $2 AND instrument_id = $3",
    )
    .bind(amount)
    .bind(to_wallet_id)
    .bind(instrument_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Admin credit; creates the balance row on demand.
pub async fn deposit(
    conn: &mut PgConnection,
    wallet_id: i64,
    instrument_id: i64,
    amount: i64,
) -> Result<(), LedgerError> {
    sqlx::query(
        "INSERT INTO balances (wallet_id, instrument_id, amount, reserved)
         VALUES ($1, $2, $3, 0)
         ON CONFLICT (wallet_id, instrument_id)
         DO UPDATE SET amount = balances.amount + EXCLUDED.amount",
    )
    .bind(wallet_id)
    .bind(instrument_id)
    .bind(amount)
    .execute(conn)
    .await?;

    Ok(())
}

/// Admin debit of unreserved units. Reserved units back live orders and are
/// not withdrawable.
pub async fn withdraw(
    conn: &mut PgConnection,
    wallet_id: i64,
    instrument_id: i64,
    amount: i64,
) -> Result<(), LedgerError> {
    let balance = balance_for_update(conn, wallet_id, instrument_id)
        .await?
        .ok_or(LedgerError::BalanceMissing)?;

    if balance.available() < amount {
        return Err(LedgerError::InsufficientFunds);
    }

    sqlx::query("UPDATE balances SET amount = amount - $1 WHERE id = $2")
        .bind(amount)
        .bind(balance.id)
        .execute(conn)
        .await?;

    Ok(())
}

// ============================================================================
// Orders
// ============================================================================

pub async fn insert_order(
    conn: &mut PgConnection,
    user_id: Uuid,
    instrument_id: i64,
    order_type: OrderType,
    direction: Direction,
    qty: i64,
    price: i64,
) -> Result<Order, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        "INSERT INTO orders (user_id, instrument_id, order_type, status, direction, qty, price, filled)
         VALUES ($1, $2, $3, 'NEW', $4, $5, $6, 0)
         RETURNING id, user_id, instrument_id, order_type, status, direction, qty, price, filled, timestamp",
    )
    .bind(user_id)
    .bind(instrument_id)
    .bind(order_type)
    .bind(direction)
    .bind(qty)
    .bind(price)
    .fetch_one(conn)
    .await
}

pub async fn order_for_update(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        "SELECT id, user_id, instrument_id, order_type, status, direction, qty, price, filled, timestamp
         FROM orders WHERE id = $1
         FOR UPDATE",
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await
}

/// Advances `filled` and derives the new status in one statement; full fills
/// become EXECUTED, anything in between PARTIALLY_EXECUTED.
pub async fn apply_fill(
    conn: &mut PgConnection,
    order_id: Uuid,
    fill_qty: i64,
) -> Result<OrderStatus, sqlx::Error> {
    sqlx::query_scalar::<_, OrderStatus>(
        "UPDATE orders
         SET filled = filled + $2,
             status = CASE WHEN filled + $2 >= qty
                           THEN 'EXECUTED'::order_status
                           ELSE 'PARTIALLY_EXECUTED'::order_status
                      END
         WHERE id = $1
         RETURNING status",
    )
    .bind(order_id)
    .bind(fill_qty)
    .fetch_one(conn)
    .await
}

pub async fn set_order_status(
    conn: &mut PgConnection,
    order_id: Uuid,
    status: OrderStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
        .bind(order_id)
        .bind(status)
        .execute(conn)
        .await?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
pub struct OpenOrderRow {
    #[sqlx(flatten)]
    pub order: Order,
    pub ticker: String,
}

/// All resting limit orders, in the book's total order: price priority is
/// reapplied on insert, so rows come back (timestamp, id)-sorted for FIFO.
pub async fn open_limit_orders(pool: &PgPool) -> Result<Vec<OpenOrderRow>, sqlx::Error> {
    sqlx::query_as::<_, OpenOrderRow>(
        "SELECT o.id, o.user_id, o.instrument_id, o.order_type, o.status, o.direction,
                o.qty, o.price, o.filled, o.timestamp, i.ticker
         FROM orders o
         JOIN instruments i ON i.id = o.instrument_id
         WHERE o.status IN ('NEW', 'PARTIALLY_EXECUTED') AND o.order_type = 'LIMIT'
         ORDER BY o.timestamp, o.id",
    )
    .fetch_all(pool)
    .await
}

/// Open BUY limit orders on one instrument, used to unwind RUB reservations
/// when the instrument is deleted.
pub async fn open_buy_orders_for_instrument(
    conn: &mut PgConnection,
    instrument_id: i64,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        "SELECT id, user_id, instrument_id, order_type, status, direction, qty, price, filled, timestamp
         FROM orders
         WHERE instrument_id = $1
           AND direction = 'BUY'
           AND status IN ('NEW', 'PARTIALLY_EXECUTED')
         FOR UPDATE",
    )
    .bind(instrument_id)
    .fetch_all(conn)
    .await
}

// ============================================================================
// Trades
// ============================================================================

pub async fn insert_trade(
    conn: &mut PgConnection,
    instrument_id: i64,
    seller_wallet_id: i64,
    amount: i64,
    price: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO transactions (instrument_id, wallet_id, amount, price)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(instrument_id)
    .bind(seller_wallet_id)
    .bind(amount)
    .bind(price)
    .execute(conn)
    .await?;

    Ok(())
}
