//! Booking queue and estimated finish times.
//!
//! Active bookings (pending or in progress) at a location are sequenced by
//! scheduled time; a booking is expected to finish once everything ahead of it
//! plus its own wash is done. The estimate is a plain sum and takes no lock, so
//! two bookings created at the same moment can both see the same queue.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, sea_query::Expr,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    database::{
        models::{bookings, services},
        types::BookingStatus,
    },
    errors::AppError,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueEntry {
    pub booking_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: BookingStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueuedBooking {
    pub position: usize,
    pub booking_id: i64,
    pub status: BookingStatus,
    #[schema(value_type = String, format = DateTime)]
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub minutes_ahead: i64,
    #[schema(value_type = String, format = DateTime)]
    pub estimated_finish_at: DateTime<Utc>,
}

fn queue_order(a: &QueueEntry, b: &QueueEntry) -> std::cmp::Ordering {
    a.scheduled_at
        .cmp(&b.scheduled_at)
        .then(a.booking_id.cmp(&b.booking_id))
}

/// Active entries scheduled at or before `at`, in queue order.
pub fn queued_ahead(entries: &[QueueEntry], at: DateTime<Utc>) -> Vec<&QueueEntry> {
    let mut ahead: Vec<&QueueEntry> = entries
        .iter()
        .filter(|entry| entry.status.is_active() && entry.scheduled_at <= at)
        .collect();
    ahead.sort_by(|a, b| queue_order(a, b));
    ahead
}

pub fn minutes_ahead(ahead: &[&QueueEntry]) -> i64 {
    ahead.iter().map(|entry| entry.duration_minutes.max(0)).sum()
}

pub fn estimate_finish(
    at: DateTime<Utc>,
    own_duration_minutes: i64,
    ahead: &[&QueueEntry],
) -> DateTime<Utc> {
    at + Duration::minutes(minutes_ahead(ahead) + own_duration_minutes.max(0))
}

/// Positions and estimates for every active entry, each one estimated
/// against the entries queued before it.
pub fn build_queue(entries: &[QueueEntry]) -> Vec<QueuedBooking> {
    let mut active: Vec<&QueueEntry> = entries
        .iter()
        .filter(|entry| entry.status.is_active())
        .collect();
    active.sort_by(|a, b| queue_order(a, b));

    active
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let ahead = &active[..index];
            QueuedBooking {
                position: index + 1,
                booking_id: entry.booking_id,
                status: entry.status,
                scheduled_at: entry.scheduled_at,
                duration_minutes: entry.duration_minutes,
                minutes_ahead: minutes_ahead(ahead),
                estimated_finish_at: estimate_finish(
                    entry.scheduled_at,
                    entry.duration_minutes,
                    ahead,
                ),
            }
        })
        .collect()
}

/// UTC bounds of the local calendar day containing `at`.
pub fn local_day_bounds(at: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let date = at.with_timezone(&tz).date_naive();
    let start_of = |day: chrono::NaiveDate| {
        tz.from_local_datetime(&day.and_time(NaiveTime::MIN))
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    };

    let start = start_of(date).unwrap_or(at - Duration::hours(24));
    let end = date
        .succ_opt()
        .and_then(start_of)
        .unwrap_or(start + Duration::hours(24));
    (start, end)
}

#[derive(Clone)]
pub struct QueueService {
    timezone: Tz,
}

impl QueueService {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Active bookings at the location on the local day of `day_of`.
    pub async fn load_entries(
        &self,
        db: &DatabaseConnection,
        location_id: i64,
        day_of: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, AppError> {
        let (start, end) = local_day_bounds(day_of, self.timezone);

        let rows = bookings::Entity::find()
            .filter(bookings::Column::LocationId.eq(location_id))
            .filter(bookings::Column::Status.is_in(BookingStatus::active_values()))
            .filter(bookings::Column::ScheduledAt.gte(start))
            .filter(bookings::Column::ScheduledAt.lt(end))
            .order_by_asc(bookings::Column::ScheduledAt)
            .order_by_asc(bookings::Column::Id)
            .find_also_related(services::Entity)
            .all(db)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (booking, service) in rows {
            let status = match booking.status.parse::<BookingStatus>() {
                Ok(status) => status,
                Err(err) => {
                    log::warn!("Skipping booking {} in queue: {}", booking.id, err);
                    continue;
                }
            };
            entries.push(QueueEntry {
                booking_id: booking.id,
                scheduled_at: booking.scheduled_at,
                duration_minutes: service.map(|s| i64::from(s.duration_minutes)).unwrap_or(0),
                status,
            });
        }
        Ok(entries)
    }

    /// Expected finish for a booking not yet stored.
    pub async fn estimate_for_new_booking(
        &self,
        db: &DatabaseConnection,
        location_id: i64,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Result<(DateTime<Utc>, usize), AppError> {
        let entries = self.load_entries(db, location_id, scheduled_at).await?;
        let ahead = queued_ahead(&entries, scheduled_at);
        let finish = estimate_finish(scheduled_at, duration_minutes, &ahead);
        Ok((finish, ahead.len() + 1))
    }

    pub async fn location_queue(
        &self,
        db: &DatabaseConnection,
        location_id: i64,
        day_of: DateTime<Utc>,
    ) -> Result<Vec<QueuedBooking>, AppError> {
        let entries = self.load_entries(db, location_id, day_of).await?;
        Ok(build_queue(&entries))
    }

    /// Rewrites `estimated_finish_at` of the location's queue after a booking
    /// joined it, left it or changed state. Returns the queue as stored.
    pub async fn refresh_estimates(
        &self,
        db: &DatabaseConnection,
        location_id: i64,
        day_of: DateTime<Utc>,
    ) -> Result<Vec<QueuedBooking>, AppError> {
        let queue = self.location_queue(db, location_id, day_of).await?;
        for item in &queue {
            bookings::Entity::update_many()
                .col_expr(
                    bookings::Column::EstimatedFinishAt,
                    Expr::value(item.estimated_finish_at),
                )
                .filter(bookings::Column::Id.eq(item.booking_id))
                .exec(db)
                .await?;
        }
        log::debug!(
            "Refreshed {} queue estimates for location {}",
            queue.len(),
            location_id
        );
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, minute, 0).unwrap()
    }

    fn entry(id: i64, scheduled_at: DateTime<Utc>, minutes: i64, status: BookingStatus) -> QueueEntry {
        QueueEntry {
            booking_id: id,
            scheduled_at,
            duration_minutes: minutes,
            status,
        }
    }

    #[test]
    fn empty_queue_finishes_after_own_wash() {
        let finish = estimate_finish(at(9, 0), 30, &[]);
        assert_eq!(finish, at(9, 30));
    }

    #[test]
    fn sums_durations_of_active_bookings_ahead() {
        let entries = vec![
            entry(1, at(8, 0), 20, BookingStatus::InProgress),
            entry(2, at(8, 30), 45, BookingStatus::Pending),
            entry(3, at(8, 45), 15, BookingStatus::Completed),
            entry(4, at(8, 50), 60, BookingStatus::Cancelled),
            entry(5, at(10, 0), 30, BookingStatus::Pending),
        ];

        let ahead = queued_ahead(&entries, at(9, 0));
        let ids: Vec<i64> = ahead.iter().map(|e| e.booking_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(estimate_finish(at(9, 0), 30, &ahead), at(10, 35));
    }

    #[test]
    fn bookings_at_the_same_time_are_ahead() {
        let entries = vec![entry(7, at(9, 0), 25, BookingStatus::Pending)];
        let ahead = queued_ahead(&entries, at(9, 0));
        assert_eq!(ahead.len(), 1);
    }

    #[test]
    fn builds_queue_in_schedule_order() {
        let entries = vec![
            entry(3, at(9, 30), 15, BookingStatus::Pending),
            entry(1, at(9, 0), 30, BookingStatus::InProgress),
            entry(2, at(9, 0), 20, BookingStatus::Pending),
            entry(4, at(9, 10), 10, BookingStatus::Completed),
        ];

        let queue = build_queue(&entries);
        let ids: Vec<i64> = queue.iter().map(|q| q.booking_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        assert_eq!(queue[0].position, 1);
        assert_eq!(queue[0].minutes_ahead, 0);
        assert_eq!(queue[0].estimated_finish_at, at(9, 30));

        assert_eq!(queue[1].minutes_ahead, 30);
        assert_eq!(queue[1].estimated_finish_at, at(9, 50));

        assert_eq!(queue[2].position, 3);
        assert_eq!(queue[2].minutes_ahead, 50);
        assert_eq!(queue[2].estimated_finish_at, at(10, 35));
    }

    #[test]
    fn negative_durations_count_as_zero() {
        let entries = vec![entry(1, at(8, 0), -15, BookingStatus::Pending)];
        let ahead = queued_ahead(&entries, at(9, 0));
        assert_eq!(estimate_finish(at(9, 0), 10, &ahead), at(9, 10));
    }

    fn booking_row(id: i64, scheduled_at: DateTime<Utc>, status: &str) -> bookings::Model {
        bookings::Model {
            id,
            user_id: 1,
            service_id: 1,
            location_id: 1,
            scheduled_at,
            status: status.to_string(),
            payment_status: "unpaid".to_string(),
            vehicle_plate: format!("B-CW {}", id),
            vehicle_type: None,
            notes: None,
            estimated_finish_at: None,
            started_at: None,
            completed_at: None,
            created_at: scheduled_at,
            updated_at: None,
        }
    }

    fn service_row(id: i64, duration_minutes: i32) -> services::Model {
        services::Model {
            id,
            name: format!("Wash {}", id),
            description: None,
            price_cents: 1500,
            duration_minutes,
            is_active: true,
            created_at: at(0, 0),
            updated_at: None,
        }
    }

    #[actix_web::test]
    async fn loads_entries_with_service_durations() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                (booking_row(1, at(9, 0), "in_progress"), service_row(1, 30)),
                (booking_row(2, at(9, 15), "on_hold"), service_row(1, 30)),
                (booking_row(3, at(9, 30), "pending"), service_row(2, 45)),
            ]])
            .into_connection();

        let entries = QueueService::new(chrono_tz::UTC)
            .load_entries(&db, 1, at(12, 0))
            .await
            .unwrap();

        let loaded: Vec<(i64, i64)> = entries
            .iter()
            .map(|e| (e.booking_id, e.duration_minutes))
            .collect();
        assert_eq!(loaded, vec![(1, 30), (3, 45)]);
        assert_eq!(entries[0].status, BookingStatus::InProgress);
        assert_eq!(db.into_transaction_log().len(), 1);
    }

    #[actix_web::test]
    async fn estimates_a_new_booking_behind_the_stored_queue() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                (booking_row(1, at(8, 0), "in_progress"), service_row(1, 20)),
                (booking_row(2, at(8, 30), "pending"), service_row(2, 45)),
                (booking_row(3, at(11, 0), "pending"), service_row(1, 20)),
            ]])
            .into_connection();

        let (finish, position) = QueueService::new(chrono_tz::UTC)
            .estimate_for_new_booking(&db, 1, at(9, 0), 30)
            .await
            .unwrap();

        assert_eq!(finish, at(10, 35));
        assert_eq!(position, 3);
    }

    #[actix_web::test]
    async fn refresh_rewrites_every_estimate_of_the_day() {
        // booking 1 was stored first for 10:00 with an empty queue (finish 10:30),
        // booking 2 then took the 09:00 slot ahead of it
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                (booking_row(2, at(9, 0), "pending"), service_row(2, 20)),
                (booking_row(1, at(10, 0), "pending"), service_row(1, 30)),
            ]])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
            ])
            .into_connection();

        let queue = QueueService::new(chrono_tz::UTC)
            .refresh_estimates(&db, 1, at(9, 0))
            .await
            .unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].booking_id, 2);
        assert_eq!(queue[0].estimated_finish_at, at(9, 20));
        assert_eq!(queue[1].booking_id, 1);
        assert_eq!(queue[1].estimated_finish_at, at(10, 50));

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 3);
        assert!(format!("{:?}", log[2]).contains("estimated_finish_at"));
    }

    #[test]
    fn day_bounds_follow_local_midnight() {
        // 23:30 UTC on the 14th is already the 15th in Berlin (UTC+1 in March)
        let late = Utc.with_ymd_and_hms(2026, 3, 14, 23, 30, 0).unwrap();
        let (start, end) = local_day_bounds(late, chrono_tz::Europe::Berlin);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 14, 23, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 15, 23, 0, 0).unwrap());
    }

    #[test]
    fn day_bounds_span_dst_change() {
        // Europe/Berlin switches to summer time on 2026-03-29, a 23 hour day
        let noon = Utc.with_ymd_and_hms(2026, 3, 29, 12, 0, 0).unwrap();
        let (start, end) = local_day_bounds(noon, chrono_tz::Europe::Berlin);
        assert_eq!(end - start, Duration::hours(23));
    }
}
