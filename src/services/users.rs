//! User registration, API-key lookup, and deletion.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::auth::api_key::generate_api_key;
use crate::models::User;
use crate::services::wallets;
use crate::utils::response::ApiError;

pub async fn find_by_api_key(pool: &PgPool, api_key: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, name, role, api_key, created_at FROM users WHERE api_key = $1",
    )
    .bind(api_key)
    .fetch_optional(pool)
    .await
}

pub async fn by_id(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, name, role, api_key, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

/// Creates the user and their wallet atomically; role is always USER.
pub async fn register(pool: &PgPool, name: &str) -> Result<User, ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::from)?;

    let api_key = generate_api_key();
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (name, role, api_key) VALUES ($1, 'USER', $2)
         RETURNING id, name, role, api_key, created_at",
    )
    .bind(name)
    .bind(&api_key)
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::Conflict("API key collision, retry registration".to_string())
        }
        _ => ApiError::from(err),
    })?;

    wallets::create_for_user(&mut *tx, user.id).await?;

    tx.commit().await.map_err(ApiError::from)?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok(user)
}

/// Deletes the user; wallet, balances, and orders go with them via cascades.
/// The caller purges the user's resting book entries afterwards.
pub async fn delete_by_id(pool: &PgPool, user_id: Uuid) -> Result<User, ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::from)?;

    let user = by_id(&mut *tx, user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::from)?;

    tx.commit().await.map_err(ApiError::from)?;

    tracing::info!(%user_id, "user deleted");
    Ok(user)
}
