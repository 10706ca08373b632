use actix_cors::Cors;
use actix_files::Files;
use actix_web::{
    App, HttpServer,
    middleware::{Logger, NormalizePath, TrailingSlash},
    web,
};
use std::{io, path::Path};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use carwash::{
    api::{self, docs::ApiDoc, middleware::RequestTracing},
    app_state::AppState,
    config::Config,
    database,
    services::{auth::AuthService, queue::QueueService},
};

fn build_cors(config: &Config) -> Cors {
    let origins = config.allowed_origins();
    if origins.is_empty() {
        return Cors::default();
    }

    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env()
        .map_err(|e| io::Error::other(format!("Failed to load configuration: {}", e)))?;
    let timezone = config
        .get_timezone()
        .map_err(|e| io::Error::other(format!("Invalid timezone: {}", e)))?;
    let db = database::connect().await?;

    let state = AppState {
        db,
        auth: AuthService::new(config.effective_token_ttl_hours()),
        queue: QueueService::new(timezone),
        config: config.clone(),
    };
    let state = web::Data::new(state);

    let host = config.host.clone();
    let port = config.port;
    let static_dir = config
        .static_dir
        .clone()
        .filter(|dir| Path::new(dir).is_dir());

    log::info!("Starting server at http://{}:{}", host, port);
    log::info!("Swagger UI available at http://{}:{}/swagger-ui/", host, port);
    log::info!("Bookings are grouped by day in {}", timezone.name());
    if let Some(dir) = &static_dir {
        log::info!("Serving front-end from {}", dir);
    }

    let openapi = ApiDoc::openapi();
    let server_config = config.clone();

    HttpServer::new(move || {
        let (json_config, query_config, path_config) =
            api::extractor_config(server_config.effective_max_body_bytes());

        let app = App::new()
            .wrap(NormalizePath::new(TrailingSlash::MergeOnly))
            .wrap(build_cors(&server_config))
            .wrap(RequestTracing)
            .wrap(Logger::default())
            .app_data(state.clone())
            .app_data(json_config)
            .app_data(query_config)
            .app_data(path_config)
            .configure(api::init_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            );

        match &static_dir {
            Some(dir) => app.service(Files::new("/", dir).index_file("index.html")),
            None => app,
        }
    })
    .workers(config.effective_workers())
    .bind((host, port))?
    .run()
    .await
}
