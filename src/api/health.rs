//! Liveness and readiness probes.

use actix_web::{HttpResponse, get, web};
use sea_orm::ConnectionTrait;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::DbPool;

/// Liveness probe body: the process is up and serving.
#[derive(Serialize, ToSchema)]
pub struct ServiceHealth {
    service: &'static str,
    version: &'static str,
    status: &'static str,
}

/// Readiness probe body: liveness plus a database round trip.
#[derive(Serialize, ToSchema)]
pub struct ReadinessStatus {
    status: &'static str,
    database: &'static str,
}

/// Liveness probe. Identifies the service and build without touching
/// any backing state.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Process is up", body = ServiceHealth)
    )
)]
#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ServiceHealth {
        service: "todo-api",
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
    })
}

/// Readiness probe.
///
/// Answers 200 only when a round trip to PostgreSQL succeeds, so load
/// balancers stop routing here before the pool is usable.
#[utoipa::path(
    get,
    path = "/api/v1/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Database reachable", body = ReadinessStatus),
        (status = 503, description = "Database unreachable")
    )
)]
#[get("/ready")]
pub async fn ready(pool: web::Data<DbPool>) -> HttpResponse {
    let ping =
        sea_orm::Statement::from_string(sea_orm::DatabaseBackend::Postgres, "SELECT 1".to_owned());

    match pool.connection().query_one_raw(ping).await {
        Ok(_) => HttpResponse::Ok().json(ReadinessStatus {
            status: "ready",
            database: "connected",
        }),
        Err(_) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "NOT_READY",
            "message": "Database connection failed"
        })),
    }
}

/// Configure health routes.
pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(ready);
}
