use crate::dao;
use crate::model::{AnalyticsOverview, QrAnalytics, TimeSeriesPoint};
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use sqlx::{Error, SqlitePool};

pub const RECENT_SCANS_LIMIT: i64 = 10;
pub const DEFAULT_SERIES_DAYS: u32 = 30;
pub const MAX_SERIES_DAYS: u32 = 366;
const WEEK_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windows {
    pub today: NaiveDate,
    pub week_start: NaiveDate,
    pub month_start: NaiveDate,
}

impl Windows {
    pub fn at(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        Self {
            today,
            week_start: days_before(today, WEEK_DAYS),
            month_start: today.with_day(1).unwrap_or(today),
        }
    }
}

pub fn series_start(today: NaiveDate, days: u32) -> NaiveDate {
    days_before(today, u64::from(days))
}

fn days_before(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

fn or_zero(result: Result<i64, Error>, field: &str) -> i64 {
    result.unwrap_or_else(|err| {
        tracing::error!("Computing {} failed: {}", field, err);
        0
    })
}

pub async fn overview(db_connection_pool: &SqlitePool, owner: Option<i64>) -> AnalyticsOverview {
    overview_at(db_connection_pool, owner, Utc::now()).await
}

pub async fn overview_at(
    db_connection_pool: &SqlitePool,
    owner: Option<i64>,
    now: DateTime<Utc>,
) -> AnalyticsOverview {
    let windows = Windows::at(now);
    let (total_qr_codes, total_scans, scans_today, scans_this_week, scans_this_month) = tokio::join!(
        dao::count_qr_codes(db_connection_pool, owner),
        dao::count_scans(db_connection_pool, owner, None, None, None),
        dao::count_scans(db_connection_pool, owner, None, Some(windows.today), Some(windows.today)),
        dao::count_scans(db_connection_pool, owner, None, Some(windows.week_start), None),
        dao::count_scans(db_connection_pool, owner, None, Some(windows.month_start), None),
    );
    AnalyticsOverview {
        total_qr_codes: or_zero(total_qr_codes, "total QR codes"),
        total_scans: or_zero(total_scans, "total scans"),
        scans_today: or_zero(scans_today, "scans today"),
        scans_this_week: or_zero(scans_this_week, "scans this week"),
        scans_this_month: or_zero(scans_this_month, "scans this month"),
    }
}

/// `None` when the code does not exist or belongs to someone else.
pub async fn qr_analytics(
    db_connection_pool: &SqlitePool,
    id: i64,
    owner: Option<i64>,
) -> Result<Option<QrAnalytics>, Error> {
    qr_analytics_at(db_connection_pool, id, owner, Utc::now()).await
}

pub async fn qr_analytics_at(
    db_connection_pool: &SqlitePool,
    id: i64,
    owner: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Option<QrAnalytics>, Error> {
    let Some(qr_code) = dao::get_by_id(db_connection_pool, id, owner).await? else {
        return Ok(None);
    };
    let from = series_start(now.date_naive(), DEFAULT_SERIES_DAYS);
    let total_scans = dao::count_scans(db_connection_pool, owner, Some(id), None, None).await?;
    let recent_scans = dao::recent_scans(db_connection_pool, id, owner, RECENT_SCANS_LIMIT).await?;
    let time_series = dao::daily_scans(db_connection_pool, owner, Some(id), from).await?;
    Ok(Some(QrAnalytics {
        qr_code,
        total_scans,
        recent_scans,
        time_series,
    }))
}

pub async fn time_series(
    db_connection_pool: &SqlitePool,
    owner: Option<i64>,
    days: u32,
) -> Result<Vec<TimeSeriesPoint>, Error> {
    time_series_at(db_connection_pool, owner, days, Utc::now()).await
}

pub async fn time_series_at(
    db_connection_pool: &SqlitePool,
    owner: Option<i64>,
    days: u32,
    now: DateTime<Utc>,
) -> Result<Vec<TimeSeriesPoint>, Error> {
    let from = series_start(now.date_naive(), days);
    dao::daily_scans(db_connection_pool, owner, None, from).await
}
