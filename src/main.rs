// =============================================================================
// CITAPP SERVICE - Main Entry Point
// =============================================================================
// Backend of the CITAPP inventory console.
//
// WHAT THIS SERVICE DOES:
// - Manages products, categories, locations and user accounts
// - Signs users in (email/password, Google for administrators)
// - Records physical stock counts and emails administrators on discrepancies
// - Groups counts into reports and exports reports and QR labels as PDF
// - Exposes Prometheus metrics and caches product lookups in Redis
// =============================================================================

mod auth;
mod cache;
mod codes;
mod config;
mod db;
mod email;
mod error;
mod handlers;
mod metrics;
mod models;
mod oauth;
mod pdf;
mod qr;
mod reports;
mod validation;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::TokenService;
use crate::cache::Cache;
use crate::config::Config;
use crate::db::Database;
use crate::email::EmailClient;
use crate::metrics::setup_metrics;
use crate::oauth::GoogleOAuth;

const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

// -----------------------------------------------------------------------------
// APPLICATION STATE
// -----------------------------------------------------------------------------
// Shared by every handler through `State<Arc<AppState>>`.
pub struct AppState {
    /// PostgreSQL pool
    pub db: Database,

    /// Product cache, session denylist and OAuth state
    pub cache: Cache,

    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    pub config: Config,
    pub tokens: TokenService,
    pub email: EmailClient,

    /// `None` when Google sign-in is not configured
    pub google: Option<GoogleOAuth>,

    /// Outbound client for QR image downloads
    pub http: reqwest::Client,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -------------------------------------------------------------------------
    // STEP 1: Load environment variables
    // -------------------------------------------------------------------------
    dotenvy::dotenv().ok();

    // -------------------------------------------------------------------------
    // STEP 2: Initialize logging/tracing
    // -------------------------------------------------------------------------
    // RUST_LOG controls levels, e.g. RUST_LOG=info,citapp_service=debug
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,citapp_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting CITAPP service...");

    // -------------------------------------------------------------------------
    // STEP 3: Load configuration
    // -------------------------------------------------------------------------
    let config = Config::from_env()?;
    info!(
        port = config.port,
        email_enabled = config.email.is_some(),
        google_enabled = config.google.is_some(),
        "Configuration loaded"
    );

    // -------------------------------------------------------------------------
    // STEP 4: Set up Prometheus metrics
    // -------------------------------------------------------------------------
    let metrics_handle = setup_metrics()?;
    info!("Prometheus metrics initialized");

    // -------------------------------------------------------------------------
    // STEP 5: Connect to PostgreSQL and migrate
    // -------------------------------------------------------------------------
    let db = Database::connect(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    db.run_migrations().await?;
    info!("Database migrations completed");

    if let Some(admin) = &config.bootstrap_admin {
        if db.ensure_bootstrap_admin(&admin.email, &admin.name).await? {
            info!(email = %admin.email, "Bootstrap administrator created");
        }
    }

    // -------------------------------------------------------------------------
    // STEP 6: Connect to Redis
    // -------------------------------------------------------------------------
    let cache = Cache::connect(&config.redis_url).await?;
    info!("Connected to Redis");

    // -------------------------------------------------------------------------
    // STEP 7: Outbound integrations
    // -------------------------------------------------------------------------
    let http = reqwest::Client::builder().timeout(OUTBOUND_TIMEOUT).build()?;

    let email = EmailClient::new(http.clone(), config.email.clone());
    if !email.is_enabled() {
        tracing::warn!("EmailJS is not configured; discrepancy and recovery emails are disabled");
    }

    let google = config
        .google
        .as_ref()
        .map(|google| GoogleOAuth::new(http.clone(), google, &config.public_base_url));

    let tokens = TokenService::new(&config.jwt_secret, config.jwt_ttl_minutes);
    let port = config.port;

    // -------------------------------------------------------------------------
    // STEP 8: Create application state
    // -------------------------------------------------------------------------
    let state = Arc::new(AppState {
        db,
        cache,
        metrics_handle,
        config,
        tokens,
        email,
        google,
        http,
    });

    // -------------------------------------------------------------------------
    // STEP 9: Define routes
    // -------------------------------------------------------------------------
    let app = router(state);

    // -------------------------------------------------------------------------
    // STEP 10: Start the HTTP server
    // -------------------------------------------------------------------------
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(address = %addr, "CITAPP service is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("CITAPP service stopped");
    Ok(())
}

/// Public routes, session routes and admin routes under `/api/v1`, plus the
/// health checks and the metrics endpoint at the root.
fn router(state: Arc<AppState>) -> Router {
    // ----- Public: sign-in, recovery and the employee count flow -----
    let public = Router::new()
        .route("/auth/sign-in", post(handlers::auth::sign_in))
        .route("/auth/google", get(handlers::auth::google_authorize))
        .route("/auth/callback", get(handlers::auth::google_callback))
        .route("/auth/recovery", post(handlers::auth::request_recovery))
        .route("/auth/recovery/reset", post(handlers::auth::reset_password))
        .route("/employee/products", get(handlers::employee::list_products))
        .route("/employee/products/:id", get(handlers::employee::get_product))
        .route(
            "/employee/products/:id/verifications",
            post(handlers::employee::submit_verification),
        )
        .route("/employee/scan", post(handlers::employee::scan_product));

    // ----- Any signed-in user -----
    let session = Router::new()
        .route("/auth/session", get(handlers::auth::current_session))
        .route("/auth/sign-out", post(handlers::auth::sign_out))
        .route("/profile", get(handlers::users::profile))
        .route("/profile/password", post(handlers::users::change_password))
        .route_layer(from_fn_with_state(state.clone(), auth::require_session));

    // ----- Active administrators -----
    let admin = Router::new()
        .route("/dashboard", get(handlers::reports::dashboard))
        .route(
            "/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route("/products/scan", post(handlers::products::scan_product))
        .route(
            "/products/:id",
            get(handlers::products::get_product)
                .put(handlers::products::update_product)
                .delete(handlers::products::delete_product),
        )
        .route("/products/:id/qr", post(handlers::products::generate_qr))
        .route("/products/:id/label.pdf", get(handlers::products::label_pdf))
        .route(
            "/products/:id/verifications",
            get(handlers::products::product_verifications),
        )
        .route(
            "/categories",
            get(handlers::catalog::list_categories).post(handlers::catalog::create_category),
        )
        .route("/categories/:id", delete(handlers::catalog::delete_category))
        .route(
            "/locations",
            get(handlers::catalog::list_locations).post(handlers::catalog::create_location),
        )
        .route("/locations/:id", delete(handlers::catalog::delete_location))
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route("/users/admins/active", get(handlers::users::active_admins))
        .route(
            "/users/:id",
            get(handlers::users::get_user).put(handlers::users::update_user),
        )
        .route("/users/:id/activate", post(handlers::users::activate_user))
        .route("/users/:id/deactivate", post(handlers::users::deactivate_user))
        .route("/reports", get(handlers::reports::list_reports))
        .route("/reports/:id", get(handlers::reports::get_report))
        .route("/reports/:id/pdf", get(handlers::reports::report_pdf))
        .route_layer(from_fn_with_state(state.clone(), auth::require_admin));

    Router::new()
        // ----- Health, readiness, metrics -----
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/api/v1", public.merge(session).merge(admin))
        // Request counters and latency, labelled by matched route
        .route_layer(from_fn(metrics::track_http))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
