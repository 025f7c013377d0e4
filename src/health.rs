use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::time::Duration;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
    pub cache: String,
    pub timestamp: String,
}

/// GET /health — liveness plus reachability of the store and the session
/// cache. Degraded dependencies still answer 200; orchestrators decide what
/// to do with the detail.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let database = match crate::db::check_connection(&state.db).await {
        Ok(()) => "ok",
        Err(_) => "unreachable",
    };

    let cache = match tokio::time::timeout(
        Duration::from_secs(1),
        state.redis.get_async_connection(),
    )
    .await
    {
        Ok(Ok(mut conn)) => {
            match redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
            {
                Ok(_) => "ok",
                Err(_) => "unreachable",
            }
        }
        _ => "unreachable",
    };

    let status = if database == "ok" && cache == "ok" {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthStatus {
        status: status.to_string(),
        database: database.to_string(),
        cache: cache.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
