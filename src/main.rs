use std::{io, sync::Arc};

use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use storefront_api::{
    auth::{AuthMiddleware, TokenKeys},
    config::{AppConfig, MongoConfig},
    generation::GenerationClient,
    handlers::admins::seed_super_admin,
    routes,
};
use tracing::{info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{self, EnvFilter};

fn startup_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logging
    let mut filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    for directive in ["actix_web=info", "storefront_api=debug"] {
        filter = filter.add_directive(directive.parse().map_err(|e| startup_error(directive, e))?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting storefront API server");

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let mongo_config = MongoConfig::init(&config)
        .await
        .map_err(|e| startup_error("Failed to initialize MongoDB", e))?;
    info!("MongoDB connection established");
    mongo_config.ensure_indexes().await;

    match &config.seed_admin {
        Some(seed) => seed_super_admin(&mongo_config, seed)
            .await
            .map_err(|e| startup_error("Failed to seed admin", e))?,
        None => warn!("SEED_ADMIN_EMAIL/SEED_ADMIN_PASSWORD not set, no admin will be seeded"),
    }

    let generator = GenerationClient::new(&config.generation)
        .map_err(|e| startup_error("Failed to build generation client", e))?;
    if config.generation.api_key.is_empty() {
        warn!("GENERATION_API_KEY not set, custom model generation is disabled");
    }

    let keys = Arc::new(TokenKeys::new(&config.jwt));
    let keys_data = web::Data::from(keys.clone());
    let db_data = web::Data::new(mongo_config);
    let generator_data = web::Data::new(generator);
    let cors_origins = config.cors_origins.clone();

    info!("Listening on {}", config.bind_addr);
    HttpServer::new(move || {
        let cors = cors_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .wrap(AuthMiddleware::new(keys.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .app_data(db_data.clone())
            .app_data(keys_data.clone())
            .app_data(generator_data.clone())
            .configure(routes::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
