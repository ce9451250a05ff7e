use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Handle over the connection pool; the single shared durable resource.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    let migrations = [include_str!("../../migrations/001_init.sql")];

    for migration in migrations {
        sqlx::raw_sql(migration).execute(pool).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}
