use crate::error::ApiError;
use crate::utils::parse_url;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const DEFAULT_BACKGROUND_COLOR: &str = "#FFFFFF";
pub const DEFAULT_FOREGROUND_COLOR: &str = "#000000";
pub const DEFAULT_SIZE: u32 = 256;
pub const MAX_SIZE: u32 = 2048;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct QrCode {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub target_url: String,
    pub background_color: String,
    pub foreground_color: String,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_scans: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct RedirectTarget {
    pub id: i64,
    pub code: String,
    pub target_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QrCodeSpecification {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub target_url: String,
    pub background_color: Option<String>,
    pub foreground_color: Option<String>,
    pub size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrStyle {
    pub background_color: String,
    pub foreground_color: String,
    pub size: u32,
}

/// A validated create/update request. Style fields stay optional so an update
/// can keep stored values; creation fills them with defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidQrCode {
    pub title: String,
    pub target_url: String,
    pub background_color: Option<String>,
    pub foreground_color: Option<String>,
    pub size: Option<u32>,
}

impl QrCodeSpecification {
    pub fn validate(self) -> Result<ValidQrCode, ApiError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::Validation("Title is required".into()));
        }
        if self.target_url.trim().is_empty() {
            return Err(ApiError::Validation("Target url is required".into()));
        }
        let target_url = parse_url(&self.target_url)?;
        let background_color = validate_color(self.background_color)?;
        let foreground_color = validate_color(self.foreground_color)?;
        let size = match self.size {
            None | Some(0) => None,
            Some(size) if size <= MAX_SIZE => Some(size),
            Some(_) => {
                return Err(ApiError::Validation(format!(
                    "Size must be between 1 and {MAX_SIZE}"
                )))
            }
        };
        Ok(ValidQrCode {
            title,
            target_url,
            background_color,
            foreground_color,
            size,
        })
    }
}

impl ValidQrCode {
    pub fn style_or_default(&self) -> QrStyle {
        QrStyle {
            background_color: self
                .background_color
                .clone()
                .unwrap_or_else(|| DEFAULT_BACKGROUND_COLOR.to_string()),
            foreground_color: self
                .foreground_color
                .clone()
                .unwrap_or_else(|| DEFAULT_FOREGROUND_COLOR.to_string()),
            size: self.size.unwrap_or(DEFAULT_SIZE),
        }
    }

    pub fn changes_style(&self) -> bool {
        self.background_color.is_some() || self.foreground_color.is_some() || self.size.is_some()
    }
}

impl QrCode {
    pub fn style(&self) -> QrStyle {
        QrStyle {
            background_color: self.background_color.clone(),
            foreground_color: self.foreground_color.clone(),
            size: u32::try_from(self.size).unwrap_or(DEFAULT_SIZE),
        }
    }
}

fn validate_color(color: Option<String>) -> Result<Option<String>, ApiError> {
    match color.map(|color| color.trim().to_string()) {
        None => Ok(None),
        Some(color) if color.is_empty() => Ok(None),
        Some(color) if parse_hex_color(&color).is_some() => Ok(Some(color.to_uppercase())),
        Some(color) => Err(ApiError::Validation(format!(
            "Invalid color {color}, expected #RRGGBB"
        ))),
    }
}

pub fn parse_hex_color(color: &str) -> Option<[u8; 3]> {
    let digits = color.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    hex::decode(digits).ok()?.try_into().ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Scan {
    pub id: i64,
    pub qr_code_id: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub browser: Option<String>,
    pub device_type: Option<String>,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalyticsOverview {
    pub total_qr_codes: i64,
    pub total_scans: i64,
    pub scans_today: i64,
    pub scans_this_week: i64,
    pub scans_this_month: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct TimeSeriesPoint {
    pub date: String,
    pub scans: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrAnalytics {
    pub qr_code: QrCode,
    pub total_scans: i64,
    pub recent_scans: Vec<Scan>,
    pub time_series: Vec<TimeSeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub password_hash: String,
}

impl UserCredentials {
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            role: self.role,
            created_at: self.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Serialize)]
pub struct SignupResponse {
    pub user: User,
}

#[derive(Deserialize)]
pub struct TimeSeriesParams {
    pub days: Option<u32>,
}
