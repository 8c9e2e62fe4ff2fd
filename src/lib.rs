pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod stories;
pub mod users;

use std::sync::Arc;
use std::time::Duration;
use actix_web::{web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AccessGate, CredentialCodec, CurrentUser, PublicPaths, SessionResolver};
pub use db::{AccountStore, DbOperations, StoryStore, User};
use media::MediaUploader;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp, plus connection
/// pool figures when the server runs against PostgreSQL.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let mut body = serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    });
    if let Some(db) = &state.db {
        body["database"] = serde_json::json!(db.pool_status());
    }
    HttpResponse::Ok().json(body)
}

pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "Welcome to the Stories API"
    }))
}

/// Registers every route. The access gate is applied separately with
/// [`AppState::access_gate`].
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(error::extractor_errors)
        .route("/", web::get().to(root))
        .route("/health", web::get().to(health_check))
        .service(
            web::scope("/api/v1")
                .service(
                    web::scope("/auth")
                        .route("/register", web::post().to(auth::handlers::register))
                        .route("/login", web::post().to(auth::handlers::login))
                        .route("/session", web::get().to(auth::handlers::session))
                        .route("/check-session", web::get().to(auth::handlers::check_session)),
                )
                .service(web::scope("/users").configure(users::routes))
                .service(web::scope("/stories").configure(stories::routes))
                .service(web::scope("/media").configure(media::routes)),
        );
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub accounts: Arc<dyn AccountStore>,
    pub stories: Arc<dyn StoryStore>,
    pub codec: Arc<CredentialCodec>,
    pub public_paths: Arc<PublicPaths>,
    pub media: Option<Arc<MediaUploader>>,
    db: Option<DbOperations>,
}

impl AppState {
    /// Connects to PostgreSQL, applies migrations and builds the shared state.
    pub async fn new(config: Settings) -> Result<Self> {
        let db = DbOperations::new_with_options(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(config.database.acquire_timeout_secs),
        )
        .await?;
        db.migrate().await?;

        let store = Arc::new(db.clone());
        let mut state = Self::with_stores(config, store.clone(), store)?;
        state.db = Some(db);
        Ok(state)
    }

    /// Builds the state around already constructed stores.
    pub fn with_stores(
        config: Settings,
        accounts: Arc<dyn AccountStore>,
        stories: Arc<dyn StoryStore>,
    ) -> Result<Self> {
        let codec = Arc::new(CredentialCodec::from_config(&config.auth)?);
        let public_paths = Arc::new(PublicPaths::new(config.auth.public_paths.as_slice())?);
        let media = config.media.clone().map(|m| Arc::new(MediaUploader::new(m)));

        Ok(Self {
            config: Arc::new(config),
            accounts,
            stories,
            codec,
            public_paths,
            media,
            db: None,
        })
    }

    pub fn access_gate(&self) -> AccessGate {
        let resolver = SessionResolver::new(self.codec.clone(), self.accounts.clone());
        AccessGate::new(self.public_paths.clone(), Arc::new(resolver))
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(db) = &self.db {
            db.close().await;
        }
        Ok(())
    }
}
