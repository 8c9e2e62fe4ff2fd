use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use std::net::TcpListener;
use stories_server::config::CorsConfig;
use stories_server::{configure, AppState, Settings};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn build_cors(config: &CorsConfig) -> Cors {
    if !config.enabled {
        // CORS disabled - use most restrictive settings
        return Cors::default();
    }

    let cors = if config.allow_any_origin {
        Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .expose_any_header()
            .supports_credentials()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allowed_headers(vec!["Authorization", "Content-Type"])
            .supports_credentials()
    };

    cors.max_age(config.max_age as usize)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Settings::new().context("failed to load configuration")?;
    info!("Configuration loaded for {} environment", config.environment);
    if config.environment != "development" && config.auth.secret_key == "development_secret" {
        warn!("Signing tokens with the built-in development secret; set APP_AUTH__SECRET_KEY");
    }

    let state = AppState::new(config.clone())
        .await
        .context("failed to initialize application state")?;
    let data = web::Data::new(state.clone());

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&address).with_context(|| format!("failed to bind {}", address))?;
    info!("Starting server at http://{}", address);

    let cors_config = config.cors.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(data.access_gate())
            .wrap(build_cors(&cors_config))
            .configure(configure)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .context("server terminated with an error")?;

    info!("Server stopped, closing database connections");
    state.shutdown().await?;

    Ok(())
}
