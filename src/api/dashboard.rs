use actix_web::{HttpRequest, HttpResponse, get, web};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{
        context::resolve_staff_context,
        helpers::{local_noon, parse_local_date},
    },
    app_state::AppState,
    database::{
        models::{bookings, transactions},
        types::{BookingStatus, TransactionStatus},
    },
    errors::AppError,
    services::queue::local_day_bounds,
};

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DashboardQuery {
    /// Local date `YYYY-MM-DD`, defaults to today.
    pub date: Option<String>,
    pub location_id: Option<i64>,
}

#[derive(Serialize, ToSchema, Default, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub total: u64,
}

impl StatusCounts {
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a str>) -> Self {
        let mut counts = StatusCounts::default();
        for raw in statuses {
            counts.total += 1;
            match raw.parse::<BookingStatus>() {
                Ok(BookingStatus::Pending) => counts.pending += 1,
                Ok(BookingStatus::InProgress) => counts.in_progress += 1,
                Ok(BookingStatus::Completed) => counts.completed += 1,
                Ok(BookingStatus::Cancelled) => counts.cancelled += 1,
                Err(err) => log::warn!("Dashboard skipped a booking: {}", err),
            }
        }
        counts
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    pub location_id: Option<i64>,
    pub bookings: StatusCounts,
    pub queue_length: u64,
    /// Payments taken on the day, including ones refunded since.
    pub revenue_cents: i64,
    /// Refunds issued on the day, whenever the payment was taken.
    pub refunded_cents: i64,
    pub net_cents: i64,
}

/// Money taken and refunded within `[start, end)`. A payment counts on the
/// day it was recorded, its refund on the day the refund was issued.
pub fn revenue<'a>(
    txs: impl IntoIterator<Item = &'a transactions::Model>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> (i64, i64) {
    let within = |at: DateTime<Utc>| at >= start && at < end;
    txs.into_iter().fold((0, 0), |(taken, refunded), tx| {
        let taken = if within(tx.created_at) {
            taken + tx.amount_cents
        } else {
            taken
        };
        let refunded = match (tx.status.parse::<TransactionStatus>(), tx.updated_at) {
            (Ok(TransactionStatus::Refunded), Some(at)) if within(at) => refunded + tx.amount_cents,
            _ => refunded,
        };
        (taken, refunded)
    })
}

#[utoipa::path(
    get,
    path = "/api/dashboard",
    tag = "Dashboard",
    params(DashboardQuery),
    responses(
        (status = 200, description = "Daily summary of bookings and takings", body = DashboardSummary),
        (status = 400, description = "Invalid date"),
        (status = 403, description = "Staff role required")
    )
)]
#[get("")]
pub async fn get_dashboard(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<DashboardQuery>,
) -> Result<HttpResponse, AppError> {
    resolve_staff_context(&req, &app_state).await?;
    let tz = app_state.queue.timezone();
    let date = parse_local_date(query.date.as_deref(), tz)?;
    let (start, end) = local_day_bounds(local_noon(date, tz), tz);

    let mut day_bookings = bookings::Entity::find()
        .filter(bookings::Column::ScheduledAt.gte(start))
        .filter(bookings::Column::ScheduledAt.lt(end));
    if let Some(location_id) = query.location_id {
        day_bookings = day_bookings.filter(bookings::Column::LocationId.eq(location_id));
    }
    let day_bookings = day_bookings.all(&app_state.db).await?;
    let counts = StatusCounts::tally(day_bookings.iter().map(|b| b.status.as_str()));

    let day_transactions = transactions::Entity::find()
        .filter(
            Condition::any()
                .add(
                    Condition::all()
                        .add(transactions::Column::CreatedAt.gte(start))
                        .add(transactions::Column::CreatedAt.lt(end)),
                )
                .add(
                    Condition::all()
                        .add(transactions::Column::Status.eq(TransactionStatus::Refunded.as_str()))
                        .add(transactions::Column::UpdatedAt.gte(start))
                        .add(transactions::Column::UpdatedAt.lt(end)),
                ),
        )
        .find_also_related(bookings::Entity)
        .all(&app_state.db)
        .await?;
    let (revenue_cents, refunded_cents) = revenue(
        day_transactions
            .iter()
            .filter(|(_, booking)| match query.location_id {
                Some(location_id) => booking.as_ref().is_some_and(|b| b.location_id == location_id),
                None => true,
            })
            .map(|(tx, _)| tx),
        start,
        end,
    );

    Ok(HttpResponse::Ok().json(DashboardSummary {
        date,
        location_id: query.location_id,
        queue_length: counts.pending + counts.in_progress,
        bookings: counts,
        revenue_cents,
        refunded_cents,
        net_cents: revenue_cents - refunded_cents,
    }))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/dashboard").service(get_dashboard));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 10, hour, 0, 0).unwrap()
    }

    fn tx(
        amount_cents: i64,
        status: &str,
        created_at: DateTime<Utc>,
        updated_at: Option<DateTime<Utc>>,
    ) -> transactions::Model {
        transactions::Model {
            id: amount_cents,
            booking_id: 1,
            amount_cents,
            method: "cash".to_string(),
            status: status.to_string(),
            reference: None,
            recorded_by: 1,
            created_at,
            updated_at,
        }
    }

    #[test]
    fn tallies_statuses() {
        let counts = StatusCounts::tally(["pending", "pending", "in_progress", "completed", "bogus"]);
        assert_eq!(
            counts,
            StatusCounts {
                pending: 2,
                in_progress: 1,
                completed: 1,
                cancelled: 0,
                total: 5,
            }
        );
    }

    #[test]
    fn sums_revenue_and_refunds() {
        let (start, end) = (day(0), day(0) + chrono::Duration::days(1));
        let txs = vec![
            tx(1500, "paid", day(9), None),
            tx(900, "paid", day(11), None),
            tx(700, "refunded", day(12), Some(day(15))),
        ];
        assert_eq!(revenue(&txs, start, end), (3100, 700));
        assert_eq!(revenue(&[], start, end), (0, 0));
    }

    #[test]
    fn refunds_count_on_the_day_they_are_issued() {
        let (start, end) = (day(0), day(0) + chrono::Duration::days(1));
        let yesterday = day(10) - chrono::Duration::days(1);
        let tomorrow = day(10) + chrono::Duration::days(1);

        // paid yesterday, refunded today
        let old_payment = tx(2000, "refunded", yesterday, Some(day(10)));
        // paid today, refunded tomorrow
        let later_refund = tx(800, "refunded", day(9), Some(tomorrow));

        assert_eq!(revenue([&old_payment], start, end), (0, 2000));
        assert_eq!(revenue([&later_refund], start, end), (800, 0));
    }
}
