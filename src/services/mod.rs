pub mod instruments;
pub mod ledger;
pub mod matching;
pub mod trades;
pub mod users;
pub mod wallets;
