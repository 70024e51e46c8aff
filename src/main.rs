use axum::serve;
use dotenvy::dotenv;
use qr_tracker::config::Config;
use qr_tracker::{create_router, db, AppState};
use sqlx::SqlitePool;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_TRACING_LEVEL: &str = "qr_tracker=debug,tower_http=info";
const DATABASE_MAX_CONNECTIONS: u32 = 20;

#[tokio::main]
async fn main() {
    _ = dotenv();
    configure_tracing();
    let config = Config::from_env().expect("Invalid configuration");
    let db_connection_pool = create_db_connection_pool(&config).await;
    let listener = create_listener(&config.server_address).await;
    let state = AppState::new(db_connection_pool, config).expect("Creating application state failed");
    if !state.geolocator.is_configured() {
        tracing::info!("Geolocation api key not set, scans are recorded without location");
    }
    let router = create_router(state);
    serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server failed to start");
}

fn configure_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or(DEFAULT_TRACING_LEVEL.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn create_db_connection_pool(config: &Config) -> SqlitePool {
    if let Some(parent) = database_directory(&config.database_url) {
        std::fs::create_dir_all(parent).expect("Creating database directory failed");
    }
    let db_connection_pool = db::create_pool(&config.database_url, DATABASE_MAX_CONNECTIONS)
        .await
        .expect("Creating database connection pool failed");
    db::migrate(&db_connection_pool)
        .await
        .expect("Running database migrations failed");
    if let Some(admin) = &config.admin {
        db::seed_admin(&db_connection_pool, admin)
            .await
            .expect("Seeding admin account failed");
    }
    db_connection_pool
}

fn database_directory(database_url: &str) -> Option<std::path::PathBuf> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?
        .split('?')
        .next()?;
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    std::path::Path::new(path)
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(|parent| parent.to_path_buf())
}

async fn create_listener(server_address: &str) -> TcpListener {
    let listener = TcpListener::bind(&server_address)
        .await
        .expect("Creating tcp listener failed");
    tracing::info!("Listening on address: {}", server_address);
    listener
}
