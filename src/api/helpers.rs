use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    database::models::{bookings, locations, services, users},
    errors::AppError,
};

/// `?page=&perPage=` query parameters.
#[derive(Deserialize, IntoParams, Clone, Copy, Debug, Default)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page index
    pub page: Option<u64>,
    /// items per page, at most 100
    pub per_page: Option<u64>,
}

impl PageQuery {
    /// Clamps to sane values and returns a 0-based page index and page size.
    pub fn normalize(self) -> (u64, u64) {
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        (page - 1, per_page)
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, page_index: u64, per_page: u64, total: u64) -> Self {
        Self {
            data,
            page: page_index + 1,
            per_page,
            total,
            total_pages: total.div_ceil(per_page.max(1)),
        }
    }
}

pub async fn find_booking(db: &DatabaseConnection, id: i64) -> Result<bookings::Model, AppError> {
    bookings::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", id)))
}

pub async fn find_location(db: &DatabaseConnection, id: i64) -> Result<locations::Model, AppError> {
    locations::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Location {} not found", id)))
}

pub async fn find_service(db: &DatabaseConnection, id: i64) -> Result<services::Model, AppError> {
    services::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Service {} not found", id)))
}

pub async fn find_user(db: &DatabaseConnection, id: i64) -> Result<users::Model, AppError> {
    users::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
}

/// Parses `YYYY-MM-DD` as a local date; `None` means today.
pub fn parse_local_date(raw: Option<&str>, tz: Tz) -> Result<NaiveDate, AppError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| AppError::InvalidInput("date must be formatted as YYYY-MM-DD".to_string())),
        None => Ok(Utc::now().with_timezone(&tz).date_naive()),
    }
}

/// Noon of a local date in UTC; a safe anchor for day-based lookups.
pub fn local_noon(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let noon = date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN));
    tz.from_local_datetime(&noon)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&noon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_to_defaults() {
        assert_eq!(PageQuery::default().normalize(), (0, 20));
        assert_eq!(
            PageQuery { page: Some(0), per_page: Some(0) }.normalize(),
            (0, 1)
        );
        assert_eq!(
            PageQuery { page: Some(5), per_page: Some(1000) }.normalize(),
            (4, 100)
        );
    }

    #[test]
    fn paginated_counts_pages() {
        let page = Paginated::new(vec![1, 2, 3], 0, 3, 7);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 3);
        let empty: Paginated<i32> = Paginated::new(vec![], 0, 20, 0);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn parses_local_dates() {
        let tz = chrono_tz::Europe::Berlin;
        assert_eq!(
            parse_local_date(Some("2026-05-01"), tz).unwrap(),
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
        );
        assert!(parse_local_date(Some("01.05.2026"), tz).is_err());
        assert!(parse_local_date(None, tz).is_ok());
    }

    #[test]
    fn local_noon_is_converted_to_utc() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let noon = local_noon(date, chrono_tz::Europe::Berlin);
        assert_eq!(noon, Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap());
    }
}
