use actix_web::{HttpResponse, get, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{app_state::AppState, database};

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service and database are up", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health(app_state: web::Data<AppState>) -> HttpResponse {
    match database::ping(&app_state.db).await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            status: "ok",
            database: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
        Err(err) => {
            log::error!("Health check failed: {:#}", err);
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                status: "degraded",
                database: "unreachable",
                version: env!("CARGO_PKG_VERSION"),
            })
        }
    }
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health);
}
