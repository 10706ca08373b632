pub mod auth;
pub mod bookings;
pub mod context;
pub mod dashboard;
pub mod docs;
pub mod health;
pub mod helpers;
pub mod locations;
pub mod middleware;
pub mod resources;
pub mod services;
pub mod transactions;
pub mod users;
pub mod validation;

use actix_web::web;

use crate::errors::AppError;

/// JSON and query extractor errors answered with the uniform error body.
pub fn extractor_config(max_body_bytes: usize) -> (web::JsonConfig, web::QueryConfig, web::PathConfig) {
    let json = web::JsonConfig::default()
        .limit(max_body_bytes)
        .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into());
    let query = web::QueryConfig::default()
        .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into());
    let path = web::PathConfig::default()
        .error_handler(|err, _req| AppError::NotFound(err.to_string()).into());
    (json, query, path)
}

/// Mounts every `/api` route group.
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(health::init_routes)
            .configure(auth::init_routes)
            .configure(users::init_routes)
            .configure(locations::init_routes)
            .configure(services::init_routes)
            .configure(bookings::init_routes)
            .configure(transactions::init_routes)
            .configure(dashboard::init_routes),
    );
}
