use crate::fingerprint::Fingerprint;
use crate::model::{QrCode, RedirectTarget, Scan, TimeSeriesPoint, User, UserCredentials, ValidQrCode};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Error, SqlitePool};

pub async fn save(
    db_connection_pool: &SqlitePool,
    code: &str,
    owner: Option<i64>,
    qr_code: &ValidQrCode,
) -> Result<QrCode, Error> {
    let style = qr_code.style_or_default();
    let now = Utc::now();
    sqlx::query_as(
        r#"
              insert into qr_codes(code, user_id, title, target_url, background_color, foreground_color, size, created_at, updated_at)
              values ($1, $2, $3, $4, $5, $6, $7, $8, $8)
              returning id, code, title, target_url, background_color, foreground_color, size, logo_path,
                        created_at, updated_at, 0 as total_scans
            "#,
    )
    .bind(code)
    .bind(owner)
    .bind(&qr_code.title)
    .bind(&qr_code.target_url)
    .bind(&style.background_color)
    .bind(&style.foreground_color)
    .bind(i64::from(style.size))
    .bind(now)
    .fetch_one(db_connection_pool)
    .await
}

pub async fn get_by_id(
    db_connection_pool: &SqlitePool,
    id: i64,
    owner: Option<i64>,
) -> Result<Option<QrCode>, Error> {
    sqlx::query_as(
        r#"
              select q.id, q.code, q.title, q.target_url, q.background_color, q.foreground_color, q.size, q.logo_path,
                     q.created_at, q.updated_at,
                     (select count(*) from qr_scans s where s.qr_code_id = q.id) as total_scans
              from qr_codes q
              where q.id = $1 and ($2 is null or q.user_id = $2)
            "#,
    )
    .bind(id)
    .bind(owner)
    .fetch_optional(db_connection_pool)
    .await
}

pub async fn list(db_connection_pool: &SqlitePool, owner: Option<i64>) -> Result<Vec<QrCode>, Error> {
    sqlx::query_as(
        r#"
              select q.id, q.code, q.title, q.target_url, q.background_color, q.foreground_color, q.size, q.logo_path,
                     q.created_at, q.updated_at,
                     (select count(*) from qr_scans s where s.qr_code_id = q.id) as total_scans
              from qr_codes q
              where ($1 is null or q.user_id = $1)
              order by q.created_at desc, q.id desc
            "#,
    )
    .bind(owner)
    .fetch_all(db_connection_pool)
    .await
}

pub async fn get_redirect_target(
    db_connection_pool: &SqlitePool,
    code: &str,
) -> Result<Option<RedirectTarget>, Error> {
    sqlx::query_as("select id, code, target_url from qr_codes where code = $1")
        .bind(code)
        .fetch_optional(db_connection_pool)
        .await
}

/// Title, url and any provided style attribute; `code` is never touched.
/// Returns false when no row matched the id and owner.
pub async fn update(
    db_connection_pool: &SqlitePool,
    id: i64,
    owner: Option<i64>,
    qr_code: &ValidQrCode,
) -> Result<bool, Error> {
    let result = sqlx::query(
        r#"
              update qr_codes
              set title = $1,
                  target_url = $2,
                  background_color = coalesce($3, background_color),
                  foreground_color = coalesce($4, foreground_color),
                  size = coalesce($5, size),
                  updated_at = $6
              where id = $7 and ($8 is null or user_id = $8)
            "#,
    )
    .bind(&qr_code.title)
    .bind(&qr_code.target_url)
    .bind(&qr_code.background_color)
    .bind(&qr_code.foreground_color)
    .bind(qr_code.size.map(i64::from))
    .bind(Utc::now())
    .bind(id)
    .bind(owner)
    .execute(db_connection_pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes the code and, through the foreign key, its scans. Returns the deleted code.
pub async fn delete(
    db_connection_pool: &SqlitePool,
    id: i64,
    owner: Option<i64>,
) -> Result<Option<String>, Error> {
    sqlx::query_scalar("delete from qr_codes where id = $1 and ($2 is null or user_id = $2) returning code")
        .bind(id)
        .bind(owner)
        .fetch_optional(db_connection_pool)
        .await
}

pub async fn delete_by_code(db_connection_pool: &SqlitePool, code: &str) -> Result<(), Error> {
    sqlx::query("delete from qr_codes where code = $1")
        .bind(code)
        .execute(db_connection_pool)
        .await
        .map(|_| ())
}

pub async fn insert_scan(
    db_connection_pool: &SqlitePool,
    qr_code_id: i64,
    fingerprint: &Fingerprint,
    scanned_at: DateTime<Utc>,
) -> Result<(), Error> {
    sqlx::query(
        r#"
              insert into qr_scans(qr_code_id, ip_address, user_agent, country, city, browser, device_type, scanned_at)
              values ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
    )
    .bind(qr_code_id)
    .bind(&fingerprint.ip_address)
    .bind(&fingerprint.user_agent)
    .bind(&fingerprint.location.country)
    .bind(&fingerprint.location.city)
    .bind(fingerprint.browser.as_str())
    .bind(fingerprint.device_type.as_str())
    .bind(scanned_at)
    .execute(db_connection_pool)
    .await
    .map(|_| ())
}

pub async fn record_scan(
    db_connection_pool: &SqlitePool,
    qr_code_id: i64,
    fingerprint: &Fingerprint,
) -> Result<(), Error> {
    insert_scan(db_connection_pool, qr_code_id, fingerprint, Utc::now()).await
}

pub async fn count_qr_codes(db_connection_pool: &SqlitePool, owner: Option<i64>) -> Result<i64, Error> {
    sqlx::query_scalar("select count(*) from qr_codes where ($1 is null or user_id = $1)")
        .bind(owner)
        .fetch_one(db_connection_pool)
        .await
}

/// Scans whose calendar date (UTC) lies in `[from, to]`; a missing bound is open.
pub async fn count_scans(
    db_connection_pool: &SqlitePool,
    owner: Option<i64>,
    qr_code_id: Option<i64>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<i64, Error> {
    sqlx::query_scalar(
        r#"
              select count(*)
              from qr_scans s
              join qr_codes q on q.id = s.qr_code_id
              where ($1 is null or q.user_id = $1)
                and ($2 is null or s.qr_code_id = $2)
                and ($3 is null or date(s.scanned_at) >= $3)
                and ($4 is null or date(s.scanned_at) <= $4)
            "#,
    )
    .bind(owner)
    .bind(qr_code_id)
    .bind(from)
    .bind(to)
    .fetch_one(db_connection_pool)
    .await
}

pub async fn recent_scans(
    db_connection_pool: &SqlitePool,
    qr_code_id: i64,
    owner: Option<i64>,
    limit: i64,
) -> Result<Vec<Scan>, Error> {
    sqlx::query_as(
        r#"
              select s.id, s.qr_code_id, s.ip_address, s.user_agent, s.country, s.city, s.browser, s.device_type, s.scanned_at
              from qr_scans s
              join qr_codes q on q.id = s.qr_code_id
              where s.qr_code_id = $1 and ($2 is null or q.user_id = $2)
              order by s.scanned_at desc, s.id desc
              limit $3
            "#,
    )
    .bind(qr_code_id)
    .bind(owner)
    .bind(limit)
    .fetch_all(db_connection_pool)
    .await
}

/// Scan counts per calendar day from `from` onwards, ascending. Days without scans are absent.
pub async fn daily_scans(
    db_connection_pool: &SqlitePool,
    owner: Option<i64>,
    qr_code_id: Option<i64>,
    from: NaiveDate,
) -> Result<Vec<TimeSeriesPoint>, Error> {
    sqlx::query_as(
        r#"
              select date(s.scanned_at) as date, count(*) as scans
              from qr_scans s
              join qr_codes q on q.id = s.qr_code_id
              where date(s.scanned_at) >= $1
                and ($2 is null or q.user_id = $2)
                and ($3 is null or s.qr_code_id = $3)
              group by date(s.scanned_at)
              order by date
            "#,
    )
    .bind(from)
    .bind(owner)
    .bind(qr_code_id)
    .fetch_all(db_connection_pool)
    .await
}

pub async fn insert_user(
    db_connection_pool: &SqlitePool,
    username: &str,
    password_hash: &str,
) -> Result<User, Error> {
    sqlx::query_as(
        r#"
              insert into users(username, password_hash, created_at) values ($1, $2, $3)
              returning id, username, role, created_at
            "#,
    )
    .bind(username)
    .bind(password_hash)
    .bind(Utc::now())
    .fetch_one(db_connection_pool)
    .await
}

/// Conditional insert; returns whether a row was created.
pub async fn insert_admin_if_absent(
    db_connection_pool: &SqlitePool,
    username: &str,
    password_hash: &str,
) -> Result<bool, Error> {
    let result = sqlx::query(
        r#"
              insert into users(username, password_hash, role, created_at) values ($1, $2, 'admin', $3)
              on conflict (username) do nothing
            "#,
    )
    .bind(username)
    .bind(password_hash)
    .bind(Utc::now())
    .execute(db_connection_pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_credentials(
    db_connection_pool: &SqlitePool,
    username: &str,
) -> Result<Option<UserCredentials>, Error> {
    sqlx::query_as("select id, username, role, created_at, password_hash from users where username = $1")
        .bind(username)
        .fetch_optional(db_connection_pool)
        .await
}
