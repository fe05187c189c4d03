use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use procura_db::DbPool;
use serde::Serialize;

const CAPABILITY_TABLES: [&str; 3] = ["object_blob", "kv_item", "log_event"];

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub status: &'static str,
    pub detail: String,
}

impl Probe {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: "ready", detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: "degraded", detail: detail.into() }
    }

    fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: Probe,
    pub stores: Probe,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let database = probe_database(&state.db_pool).await;
    let stores = if database.is_ready() {
        probe_stores(&state.db_pool).await
    } else {
        Probe::degraded("skipped: database unreachable")
    };
    let ready = database.is_ready() && stores.is_ready();

    let report = HealthReport {
        status: if ready { "ready" } else { "degraded" },
        database,
        stores,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(report))
}

async fn probe_database(pool: &DbPool) -> Probe {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => Probe::ready("database query succeeded"),
        Err(error) => Probe::degraded(format!("database query failed: {error}")),
    }
}

async fn probe_stores(pool: &DbPool) -> Probe {
    let present = sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN (?1, ?2, ?3)",
    )
    .bind(CAPABILITY_TABLES[0])
    .bind(CAPABILITY_TABLES[1])
    .bind(CAPABILITY_TABLES[2])
    .fetch_all(pool)
    .await;

    match present {
        Ok(names) => {
            let missing = CAPABILITY_TABLES
                .iter()
                .filter(|table| !names.iter().any(|name| name == *table))
                .copied()
                .collect::<Vec<_>>();
            if missing.is_empty() {
                Probe::ready("object, key-value and log stores migrated")
            } else {
                Probe::degraded(format!("missing store tables: {}", missing.join(", ")))
            }
        }
        Err(error) => Probe::degraded(format!("store lookup failed: {error}")),
    }
}
