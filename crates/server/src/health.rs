use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use kopi_db::DbPool;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub indexed_chunks: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub detail: String,
}

impl HealthCheck {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: "ready".to_string(), detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: "degraded".to_string(), detail: detail.into() }
    }

    fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub knowledge_index: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/", get(health)).route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let knowledge_index = if state.indexed_chunks > 0 {
        HealthCheck::ready(format!("{} passages indexed", state.indexed_chunks))
    } else {
        HealthCheck::degraded("knowledge index is empty")
    };
    let ready = database.is_ready() && knowledge_index.is_ready();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" }.to_string(),
        service: HealthCheck::ready("kopi-server runtime initialized"),
        database,
        knowledge_index,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM outlets").fetch_one(pool).await {
        Ok(count) => HealthCheck::ready(format!("{count} outlets available")),
        Err(error) => HealthCheck::degraded(format!("database query failed: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use kopi_db::{connect_with_settings, migrations};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_returns_ready_when_database_and_index_are_available() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool.clone(), indexed_chunks: 12 })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.detail, "0 outlets available");
        assert_eq!(payload.knowledge_index.detail, "12 passages indexed");

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool, indexed_chunks: 12 })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn health_is_degraded_without_indexed_passages() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool, indexed_chunks: 0 })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.knowledge_index.status, "degraded");
    }
}
