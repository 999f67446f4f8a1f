use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connection acquire timeout for the dispatcher's pool.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the pool backing the notification store.
///
/// Dispatch tasks run concurrently, one per event, and each holds a
/// connection only for the duration of a single query.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Notification store pool ready");
    Ok(pool)
}
