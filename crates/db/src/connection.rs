use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    // Every pooled connection to `sqlite::memory:` is its own database, so the
    // single connection must never be recycled.
    let private_memory = is_private_memory_url(database_url);
    let max_connections = if private_memory { 1 } else { max_connections.max(1) };
    let mut options = SqlitePoolOptions::new().max_connections(max_connections);
    if private_memory {
        options = options.idle_timeout(None).max_lifetime(None);
    }

    options
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

fn is_private_memory_url(database_url: &str) -> bool {
    let url = database_url.trim();
    (url == ":memory:" || url.starts_with("sqlite::memory:")) && !url.contains("cache=shared")
}

#[cfg(test)]
mod tests {
    use super::is_private_memory_url;

    #[test]
    fn private_memory_urls_are_detected() {
        assert!(is_private_memory_url("sqlite::memory:"));
        assert!(!is_private_memory_url("sqlite::memory:?cache=shared"));
        assert!(!is_private_memory_url("sqlite://procura.db"));
    }
}
