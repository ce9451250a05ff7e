//! Order matching with price-time priority.
//!
//! ```text
//! API handler
//!   └→ MatchingEngine           (per-ticker serialisation + placement tx)
//!        ├→ InstrumentBook      (in-memory price-time book, one per ticker)
//!        └→ ledger              (reservations, transfers, orders, trades)
//! ```
//!
//! The ledger is the source of truth; each book is a rebuildable projection
//! of the resting limit orders and is only consulted and mutated under its
//! ticker's lock.

mod book;
mod engine;
mod types;

pub use book::InstrumentBook;
pub use engine::MatchingEngine;
pub use types::{BookEntry, OrderBookSnapshot, PriceLevel};
