pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Database;
use crate::services::matching::MatchingEngine;

pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub engine: Arc<MatchingEngine>,
}
