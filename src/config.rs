use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/qr_tracker.db";
const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_QR_IMAGES_DIR: &str = "./data/qr_images";
const DEFAULT_GEOLOCATION_URL: &str = "https://api.ipgeolocation.io/ipgeo";
const DEFAULT_GEOLOCATION_TIMEOUT_MS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is required")]
    Missing(&'static str),
    #[error("Environment variable {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct GeolocationConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_address: String,
    pub base_url: String,
    pub frontend_url: String,
    pub jwt_secret: String,
    pub qr_images_dir: PathBuf,
    /// When false, codes are created ownerless and visible to every authenticated caller.
    pub owner_scoping: bool,
    pub tag_manager_id: Option<String>,
    pub geolocation: GeolocationConfig,
    pub admin: Option<AdminAccount>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let admin = match (get_optional_env("ADMIN_USERNAME"), get_optional_env("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminAccount { username, password }),
            _ => None,
        };
        Ok(Self {
            database_url: get_env_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            server_address: get_env_or("SERVER_ADDRESS", DEFAULT_SERVER_ADDRESS),
            base_url: get_env_or("BASE_URL", DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            frontend_url: get_env_or("FRONTEND_URL", DEFAULT_FRONTEND_URL),
            jwt_secret: get_env("JWT_SECRET")?,
            qr_images_dir: PathBuf::from(get_env_or("QR_IMAGES_DIR", DEFAULT_QR_IMAGES_DIR)),
            owner_scoping: parse_env("OWNER_SCOPING", true)?,
            tag_manager_id: get_optional_env("GTM_ID"),
            geolocation: GeolocationConfig {
                api_key: get_optional_env("IPGEOLOCATION_API_KEY"),
                endpoint: get_env_or("GEOLOCATION_URL", DEFAULT_GEOLOCATION_URL),
                timeout: Duration::from_millis(parse_env(
                    "GEOLOCATION_TIMEOUT_MS",
                    DEFAULT_GEOLOCATION_TIMEOUT_MS,
                )?),
            },
            admin,
        })
    }

    pub fn with_defaults(database_url: &str, jwt_secret: &str, qr_images_dir: PathBuf) -> Self {
        Self {
            database_url: database_url.to_string(),
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            jwt_secret: jwt_secret.to_string(),
            qr_images_dir,
            owner_scoping: true,
            tag_manager_id: None,
            geolocation: GeolocationConfig {
                api_key: None,
                endpoint: DEFAULT_GEOLOCATION_URL.to_string(),
                timeout: Duration::from_millis(DEFAULT_GEOLOCATION_TIMEOUT_MS),
            },
            admin: None,
        }
    }
}

pub fn get_env(name: &'static str) -> Result<String, ConfigError> {
    get_optional_env(name).ok_or(ConfigError::Missing(name))
}

fn get_optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn get_env_or(name: &str, default: &str) -> String {
    get_optional_env(name).unwrap_or_else(|| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match get_optional_env(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
