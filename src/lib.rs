pub mod analytics;
pub mod auth;
pub mod config;
pub mod dao;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod geo;
pub mod model;
pub mod render;
pub mod routes;
pub mod utils;

use auth::{auth, CurrentUser, TokenKeys};
use axum::http::{header, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use config::Config;
use geo::Geolocator;
use render::QrImageStore;
use routes::{
    analytics_overview, create_qr, delete_qr, get_qr, health, list_qr, login, qr_analytics, redirect, signup,
    time_series, update_qr,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub geolocator: Arc<Geolocator>,
    pub images: Arc<QrImageStore>,
    pub tokens: Arc<TokenKeys>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Result<Self, reqwest::Error> {
        let geolocator = Geolocator::new(&config.geolocation)?;
        let images = QrImageStore::new(config.qr_images_dir.clone(), &config.base_url);
        let tokens = TokenKeys::new(&config.jwt_secret);
        Ok(Self {
            pool,
            config: Arc::new(config),
            geolocator: Arc::new(geolocator),
            images: Arc::new(images),
            tokens: Arc::new(tokens),
        })
    }

    pub fn owner(&self, user: &CurrentUser) -> Option<i64> {
        self.config.owner_scoping.then_some(user.id)
    }
}

pub fn create_router(state: AppState) -> Router {
    let images = ServeDir::new(state.images.directory());
    Router::new()
        .route("/api/qr", post(create_qr).get(list_qr))
        .route("/api/qr/:id", get(get_qr).put(update_qr).delete(delete_qr))
        .route("/api/analytics/overview", get(analytics_overview))
        .route("/api/analytics/qr/:id", get(qr_analytics))
        .route("/api/analytics/timeseries", get(time_series))
        .route_layer(from_fn_with_state(state.clone(), auth))
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/r/:code", get(redirect))
        .route("/health", get(health))
        .nest_service("/data/qr_images", images)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.frontend_url)),
        )
        .with_state(state)
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = [frontend_url, "http://localhost:3000", "http://localhost:3001"]
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(origin.trim_end_matches('/')).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
