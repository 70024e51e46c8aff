use crate::analytics::{self, DEFAULT_SERIES_DAYS, MAX_SERIES_DAYS};
use crate::auth::{hash_password, verify_password, CurrentUser};
use crate::dao;
use crate::error::{internal_error, is_unique_violation, ApiError};
use crate::fingerprint::Fingerprint;
use crate::model::{
    AnalyticsOverview, Credentials, LoginResponse, QrAnalytics, QrCode, QrCodeSpecification, RedirectTarget,
    SignupResponse, TimeSeriesParams, TimeSeriesPoint, ValidQrCode,
};
use crate::utils::{generate_code, with_timeout};
use crate::AppState;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::header::{CACHE_CONTROL, LOCATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::json;
use std::net::SocketAddr;
use tokio::task::spawn_blocking;

const CACHE_CONTROL_HEADER_VALUE: &str = "no-store";
const DEFAULT_TIMEOUT: u64 = 300;
const CODE_GENERATION_ATTEMPTS: usize = 5;
const MAX_USERNAME_LENGTH: usize = 64;
const QR_CODE: &str = "QR code";

pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let Json(credentials) = payload?;
    let username = credentials.username.trim();
    if username.is_empty() || credentials.password.is_empty() {
        return Err(ApiError::Validation("Username and password are required".into()));
    }
    if username.len() > MAX_USERNAME_LENGTH {
        return Err(ApiError::Validation("Username is too long".into()));
    }
    let password = credentials.password;
    let password_hash = spawn_blocking(move || hash_password(&password))
        .await
        .map_err(internal_error)?
        .map_err(internal_error)?;
    match dao::insert_user(&state.pool, username, &password_hash).await {
        Ok(user) => Ok((StatusCode::CREATED, Json(SignupResponse { user }))),
        Err(err) if is_unique_violation(&err) => Err(ApiError::Conflict("Username is already taken")),
        Err(err) => Err(internal_error(err)),
    }
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(credentials) = payload?;
    let invalid = || ApiError::Unauthorized("Invalid credentials");
    let stored = dao::get_credentials(&state.pool, credentials.username.trim())
        .await?
        .ok_or_else(invalid)?;
    let password = credentials.password;
    let password_hash = stored.password_hash.clone();
    let verified = spawn_blocking(move || verify_password(&password, &password_hash))
        .await
        .map_err(internal_error)?;
    if !verified {
        return Err(invalid());
    }
    let user = stored.into_user();
    let token = state.tokens.issue(&user).map_err(internal_error)?;
    Ok(Json(LoginResponse { token, user }))
}

pub async fn create_qr(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    payload: Result<Json<QrCodeSpecification>, JsonRejection>,
) -> Result<Json<QrCode>, ApiError> {
    let Json(specification) = payload?;
    let qr_code = specification.validate()?;
    let saved = save_with_unique_code(&state, state.owner(&user), &qr_code, generate_code).await?;
    if let Err(err) = state.images.render(&saved.code, &saved.style()).await {
        tracing::error!("Rendering image for code {} failed: {}", saved.code, err);
        if let Err(err) = dao::delete_by_code(&state.pool, &saved.code).await {
            tracing::error!("Removing unrendered code {} failed: {}", saved.code, err);
        }
        return Err(ApiError::Internal);
    }
    tracing::info!("User {} created QR code {}", user.username, saved.code);
    Ok(Json(saved))
}

/// Inserts under a fresh code from `next_code`, drawing again on a unique violation.
async fn save_with_unique_code<E: std::fmt::Display>(
    state: &AppState,
    owner: Option<i64>,
    qr_code: &ValidQrCode,
    mut next_code: impl FnMut() -> Result<String, E>,
) -> Result<QrCode, ApiError> {
    for _ in 1..=CODE_GENERATION_ATTEMPTS {
        let code = next_code().map_err(internal_error)?;
        match with_timeout(DEFAULT_TIMEOUT, dao::save(&state.pool, &code, owner, qr_code)).await? {
            Ok(saved) => return Ok(saved),
            Err(err) if is_unique_violation(&err) => {
                tracing::warn!("Generated code {} already exists, regenerating", code);
            }
            Err(err) => return Err(internal_error(err)),
        }
    }
    tracing::error!("Could not persist new QR code. Exhausted all retries of generating a unique code");
    Err(ApiError::Internal)
}

pub async fn list_qr(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<QrCode>>, ApiError> {
    let qr_codes = with_timeout(DEFAULT_TIMEOUT, dao::list(&state.pool, state.owner(&user))).await??;
    Ok(Json(qr_codes))
}

pub async fn get_qr(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<QrCode>, ApiError> {
    let Path(id) = id?;
    with_timeout(DEFAULT_TIMEOUT, dao::get_by_id(&state.pool, id, state.owner(&user)))
        .await??
        .map(Json)
        .ok_or(ApiError::NotFound(QR_CODE))
}

pub async fn update_qr(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<QrCodeSpecification>, JsonRejection>,
) -> Result<Json<QrCode>, ApiError> {
    let Path(id) = id?;
    let Json(specification) = payload?;
    let qr_code = specification.validate()?;
    let owner = state.owner(&user);
    let updated = with_timeout(DEFAULT_TIMEOUT, dao::update(&state.pool, id, owner, &qr_code)).await??;
    if !updated {
        return Err(ApiError::NotFound(QR_CODE));
    }
    let saved = dao::get_by_id(&state.pool, id, owner)
        .await?
        .ok_or(ApiError::NotFound(QR_CODE))?;
    if qr_code.changes_style() {
        if let Err(err) = state.images.render(&saved.code, &saved.style()).await {
            tracing::warn!("Re-rendering image for code {} failed: {}", saved.code, err);
        }
    }
    Ok(Json(saved))
}

pub async fn delete_qr(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Path(id) = id?;
    let code = with_timeout(DEFAULT_TIMEOUT, dao::delete(&state.pool, id, state.owner(&user)))
        .await??
        .ok_or(ApiError::NotFound(QR_CODE))?;
    state.images.remove(&code).await;
    tracing::info!("User {} deleted QR code {}", user.username, code);
    Ok(Json(json!({ "message": "QR code deleted successfully" })))
}

pub async fn analytics_overview(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Json<AnalyticsOverview> {
    Json(analytics::overview(&state.pool, state.owner(&user)).await)
}

pub async fn qr_analytics(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<QrAnalytics>, ApiError> {
    let Path(id) = id?;
    analytics::qr_analytics(&state.pool, id, state.owner(&user))
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound(QR_CODE))
}

pub async fn time_series(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    params: Result<Query<TimeSeriesParams>, QueryRejection>,
) -> Result<Json<Vec<TimeSeriesPoint>>, ApiError> {
    let Query(params) = params?;
    let days = params.days.unwrap_or(DEFAULT_SERIES_DAYS);
    if !(1..=MAX_SERIES_DAYS).contains(&days) {
        return Err(ApiError::Validation(format!(
            "days must be between 1 and {MAX_SERIES_DAYS}"
        )));
    }
    let series = analytics::time_series(&state.pool, state.owner(&user), days).await?;
    Ok(Json(series))
}

pub async fn redirect(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let target = with_timeout(DEFAULT_TIMEOUT, dao::get_redirect_target(&state.pool, &code))
        .await??
        .ok_or(ApiError::NotFound(QR_CODE))?;

    let fingerprint = Fingerprint::resolve(&headers, Some(peer), &state.geolocator).await;
    let saved_scan = with_timeout(
        DEFAULT_TIMEOUT,
        dao::record_scan(&state.pool, target.id, &fingerprint),
    )
    .await;

    match saved_scan {
        Err(_) => tracing::error!("Recording scan of code {} timed out", target.code),
        Ok(Err(err)) => tracing::error!("Recording scan of code {} failed: {}", target.code, err),
        _ => tracing::debug!("Scan of code {} recorded", target.code),
    }

    match &state.config.tag_manager_id {
        Some(tag_manager_id) => Ok(Html(tag_manager_page(tag_manager_id, &target, &fingerprint)).into_response()),
        None => Ok((
            StatusCode::FOUND,
            [
                (LOCATION, target.target_url),
                (CACHE_CONTROL, CACHE_CONTROL_HEADER_VALUE.to_string()),
            ],
        )
            .into_response()),
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// JSON string literal that is also safe inside an inline `<script>`.
fn js_string(value: &str) -> String {
    serde_json::Value::from(value)
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
}

fn html_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Page that reports the scan to the tag manager, then redirects client-side.
fn tag_manager_page(tag_manager_id: &str, target: &RedirectTarget, fingerprint: &Fingerprint) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <script>(function(w,d,s,l,i){{w[l]=w[l]||[];w[l].push({{'gtm.start':
    new Date().getTime(),event:'gtm.js'}});var f=d.getElementsByTagName(s)[0],
    j=d.createElement(s),dl=l!='dataLayer'?'&l='+l:'';j.async=true;j.src=
    'https://www.googletagmanager.com/gtm.js?id='+i+dl;f.parentNode.insertBefore(j,f);
    }})(window,document,'script','dataLayer',{gtm_id});</script>
    <script>
        window.dataLayer = window.dataLayer || [];
        window.dataLayer.push({{
            'event': 'qr_code_scan',
            'qr_code_id': {qr_code_id},
            'qr_code': {qr_code},
            'target_url': {target_url},
            'device_type': {device_type},
            'browser': {browser}
        }});
        setTimeout(function() {{
            window.location.href = {target_url};
        }}, 100);
    </script>
</head>
<body>
    <noscript><iframe src="https://www.googletagmanager.com/ns.html?id={gtm_attribute}"
    height="0" width="0" style="display:none;visibility:hidden"></iframe></noscript>
    <p>Redirecting...</p>
</body>
</html>"#,
        gtm_id = js_string(tag_manager_id),
        gtm_attribute = html_attribute(tag_manager_id),
        qr_code_id = js_string(&target.id.to_string()),
        qr_code = js_string(&target.code),
        target_url = js_string(&target.target_url),
        device_type = js_string(fingerprint.device_type.as_str()),
        browser = js_string(fingerprint.browser.as_str()),
    )
}
