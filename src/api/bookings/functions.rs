use std::collections::HashMap;

use actix_web::web;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};

use crate::{
    api::{
        context::AuthContext,
        resources::{BookingResource, LocationResource, ServiceResource},
        validation,
    },
    app_state::AppState,
    database::{
        models::{bookings, locations, services, wash_statuses},
        types::BookingStatus,
    },
    errors::AppError,
    services::queue::QueuedBooking,
};

/// Walk-ins may be entered a little after their actual arrival.
const PAST_GRACE_MINUTES: i64 = 5;
const MAX_DAYS_AHEAD: i64 = 90;

/// `opens == closes` is a round-the-clock location, `closes < opens` wraps
/// past midnight.
pub fn is_within_opening_hours(time: NaiveTime, opens: NaiveTime, closes: NaiveTime) -> bool {
    if opens == closes {
        true
    } else if opens < closes {
        time >= opens && time < closes
    } else {
        time >= opens || time < closes
    }
}

pub fn check_schedule(
    scheduled_at: DateTime<Utc>,
    now: DateTime<Utc>,
    location: &locations::Model,
    tz: Tz,
) -> Result<(), AppError> {
    if scheduled_at < now - Duration::minutes(PAST_GRACE_MINUTES) {
        return Err(AppError::InvalidInput(
            "scheduledAt cannot be in the past".to_string(),
        ));
    }
    if scheduled_at > now + Duration::days(MAX_DAYS_AHEAD) {
        return Err(AppError::InvalidInput(format!(
            "Bookings can be made at most {} days ahead",
            MAX_DAYS_AHEAD
        )));
    }

    let (opens, closes) = match (
        validation::parse_hhmm(&location.opens_at),
        validation::parse_hhmm(&location.closes_at),
    ) {
        (Some(opens), Some(closes)) => (opens, closes),
        _ => {
            log::error!("Location {} has malformed opening hours", location.id);
            return Err(AppError::Internal);
        }
    };

    let local = scheduled_at.with_timezone(&tz).time();
    if !is_within_opening_hours(local, opens, closes) {
        return Err(AppError::InvalidInput(format!(
            "{} is open from {} to {}",
            location.name, location.opens_at, location.closes_at
        )));
    }
    Ok(())
}

/// Parses the stored status and checks the requested move is allowed.
pub fn plan_transition(current: &str, next: BookingStatus) -> Result<BookingStatus, AppError> {
    let current = current.parse::<BookingStatus>().map_err(|err| {
        log::error!("Booking has an unreadable status: {}", err);
        AppError::Internal
    })?;
    if !current.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "Cannot move booking from {} to {}",
            current, next
        )));
    }
    Ok(current)
}

pub fn ensure_can_view(ctx: &AuthContext, booking: &bookings::Model) -> Result<(), AppError> {
    if ctx.can_view_booking(booking) {
        Ok(())
    } else {
        // do not reveal other customers' bookings
        Err(AppError::NotFound(format!("Booking {} not found", booking.id)))
    }
}

pub async fn record_wash_status(
    db: &DatabaseConnection,
    booking_id: i64,
    status: BookingStatus,
    note: Option<String>,
    changed_by: i64,
) -> Result<wash_statuses::Model, AppError> {
    let entry = wash_statuses::ActiveModel {
        booking_id: Set(booking_id),
        status: Set(status.to_string()),
        note: Set(note),
        changed_by: Set(changed_by),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(entry)
}

/// Moves a booking to `next`, stamps timestamps, appends the history row and
/// re-estimates the rest of the location's queue.
pub async fn apply_status_change(
    app_state: &web::Data<AppState>,
    booking: bookings::Model,
    next: BookingStatus,
    note: Option<String>,
    actor: &AuthContext,
) -> Result<bookings::Model, AppError> {
    let previous = plan_transition(&booking.status, next)?;
    let now = Utc::now();

    let mut active = booking.into_active_model();
    active.status = Set(next.to_string());
    match next {
        BookingStatus::InProgress => active.started_at = Set(Some(now)),
        BookingStatus::Completed => active.completed_at = Set(Some(now)),
        _ => {}
    }
    active.updated_at = Set(Some(now));
    let updated = active.update(&app_state.db).await?;

    record_wash_status(&app_state.db, updated.id, next, note, actor.user_id()).await?;
    log::info!(
        "Booking {} moved from {} to {} by user {}",
        updated.id,
        previous,
        next,
        actor.user_id()
    );

    refresh_queue(app_state, updated.location_id, updated.scheduled_at).await;
    Ok(updated)
}

/// Re-estimates the location's queue for the day of `day_of`. A failure only
/// leaves stale estimates behind, so it is logged and yields an empty queue.
pub async fn refresh_queue(
    app_state: &web::Data<AppState>,
    location_id: i64,
    day_of: DateTime<Utc>,
) -> Vec<QueuedBooking> {
    match app_state
        .queue
        .refresh_estimates(&app_state.db, location_id, day_of)
        .await
    {
        Ok(queue) => queue,
        Err(err) => {
            log::warn!(
                "Could not refresh queue estimates for location {}: {}",
                location_id,
                err
            );
            Vec::new()
        }
    }
}

/// Appends the initial `pending` history row of a stored booking and
/// re-estimates the queue it joined; bookings scheduled after it now have
/// one more wash ahead of them.
pub async fn enqueue_booking(
    app_state: &web::Data<AppState>,
    booking: &bookings::Model,
    created_by: i64,
) -> Result<Vec<QueuedBooking>, AppError> {
    record_wash_status(
        &app_state.db,
        booking.id,
        BookingStatus::Pending,
        None,
        created_by,
    )
    .await?;
    Ok(refresh_queue(app_state, booking.location_id, booking.scheduled_at).await)
}

/// Customers may only withdraw bookings that have not started; staff may
/// cancel anything not yet finished.
pub fn check_cancellable(current: &str, by_staff: bool) -> Result<(), AppError> {
    let current = plan_transition(current, BookingStatus::Cancelled)?;
    if !by_staff && current != BookingStatus::Pending {
        return Err(AppError::Forbidden(
            "Only pending bookings can be cancelled, please ask the staff".to_string(),
        ));
    }
    Ok(())
}

pub fn to_resource(
    booking: &bookings::Model,
    service: Option<&services::Model>,
    location: Option<&locations::Model>,
) -> BookingResource {
    BookingResource {
        id: booking.id,
        user_id: booking.user_id,
        status: booking.status.clone(),
        payment_status: booking.payment_status.clone(),
        scheduled_at: booking.scheduled_at,
        estimated_finish_at: booking.estimated_finish_at,
        started_at: booking.started_at,
        completed_at: booking.completed_at,
        vehicle_plate: booking.vehicle_plate.clone(),
        vehicle_type: booking.vehicle_type.clone(),
        notes: booking.notes.clone(),
        service: service.map(ServiceResource::from),
        location: location.map(LocationResource::from),
        created_at: booking.created_at,
    }
}

/// Builds resources for a page of bookings with two batched lookups.
pub async fn load_booking_resources(
    db: &DatabaseConnection,
    rows: &[bookings::Model],
) -> Result<Vec<BookingResource>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut service_ids: Vec<i64> = rows.iter().map(|b| b.service_id).collect();
    service_ids.sort_unstable();
    service_ids.dedup();
    let mut location_ids: Vec<i64> = rows.iter().map(|b| b.location_id).collect();
    location_ids.sort_unstable();
    location_ids.dedup();

    let services_by_id: HashMap<i64, services::Model> = services::Entity::find()
        .filter(services::Column::Id.is_in(service_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();
    let locations_by_id: HashMap<i64, locations::Model> = locations::Entity::find()
        .filter(locations::Column::Id.is_in(location_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|l| (l.id, l))
        .collect();

    Ok(rows
        .iter()
        .map(|booking| {
            to_resource(
                booking,
                services_by_id.get(&booking.service_id),
                locations_by_id.get(&booking.location_id),
            )
        })
        .collect())
}

pub async fn load_booking_resource(
    db: &DatabaseConnection,
    booking: &bookings::Model,
) -> Result<BookingResource, AppError> {
    let mut resources = load_booking_resources(db, std::slice::from_ref(booking)).await?;
    resources.pop().ok_or(AppError::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::context::{context_from_user, tests::user_with_role},
        config::test_config,
        services::{auth::AuthService, queue::QueueService},
    };
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn location(opens: &str, closes: &str) -> locations::Model {
        locations::Model {
            id: 1,
            name: "Harbour".to_string(),
            address: "Pier 4".to_string(),
            phone: None,
            opens_at: opens.to_string(),
            closes_at: closes.to_string(),
            bays: 2,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn opening_hours_same_day() {
        assert!(is_within_opening_hours(hm(8, 0), hm(8, 0), hm(20, 0)));
        assert!(is_within_opening_hours(hm(19, 59), hm(8, 0), hm(20, 0)));
        assert!(!is_within_opening_hours(hm(20, 0), hm(8, 0), hm(20, 0)));
        assert!(!is_within_opening_hours(hm(7, 59), hm(8, 0), hm(20, 0)));
    }

    #[test]
    fn opening_hours_past_midnight_and_all_day() {
        assert!(is_within_opening_hours(hm(23, 30), hm(18, 0), hm(2, 0)));
        assert!(is_within_opening_hours(hm(1, 0), hm(18, 0), hm(2, 0)));
        assert!(!is_within_opening_hours(hm(12, 0), hm(18, 0), hm(2, 0)));
        assert!(is_within_opening_hours(hm(3, 0), hm(0, 0), hm(0, 0)));
    }

    #[test]
    fn schedule_respects_local_hours() {
        let tz = chrono_tz::Europe::Berlin;
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 6, 0, 0).unwrap();
        let loc = location("08:00", "20:00");

        // 07:00 UTC is 09:00 in Berlin summer time
        let ok = Utc.with_ymd_and_hms(2026, 6, 1, 7, 0, 0).unwrap();
        assert!(check_schedule(ok, now, &loc, tz).is_ok());

        // 18:30 UTC is 20:30 local, after closing
        let late = Utc.with_ymd_and_hms(2026, 6, 1, 18, 30, 0).unwrap();
        assert!(check_schedule(late, now, &loc, tz).is_err());
    }

    #[test]
    fn schedule_rejects_past_and_far_future() {
        let tz = chrono_tz::UTC;
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let loc = location("00:00", "00:00");

        assert!(check_schedule(now - Duration::minutes(3), now, &loc, tz).is_ok());
        assert!(check_schedule(now - Duration::hours(1), now, &loc, tz).is_err());
        assert!(check_schedule(now + Duration::days(91), now, &loc, tz).is_err());
    }

    #[test]
    fn transition_plan() {
        assert_eq!(
            plan_transition("pending", BookingStatus::InProgress).unwrap(),
            BookingStatus::Pending
        );
        assert!(matches!(
            plan_transition("completed", BookingStatus::Cancelled),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            plan_transition("garbage", BookingStatus::Completed),
            Err(AppError::Internal)
        ));
    }

    #[test]
    fn resource_embeds_service_and_location() {
        let now = Utc::now();
        let booking = bookings::Model {
            id: 10,
            user_id: 3,
            service_id: 4,
            location_id: 1,
            scheduled_at: now,
            status: "pending".to_string(),
            payment_status: "unpaid".to_string(),
            vehicle_plate: "B-XY 12".to_string(),
            vehicle_type: None,
            notes: None,
            estimated_finish_at: Some(now + Duration::minutes(30)),
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: None,
        };
        let service = services::Model {
            id: 4,
            name: "Basic".to_string(),
            description: None,
            price_cents: 900,
            duration_minutes: 30,
            is_active: true,
            created_at: now,
            updated_at: None,
        };
        let loc = location("08:00", "20:00");

        let resource = to_resource(&booking, Some(&service), Some(&loc));
        assert_eq!(resource.service.as_ref().map(|s| s.price.as_str()), Some("9.00"));
        assert_eq!(resource.location.as_ref().map(|l| l.id), Some(1));
        assert_eq!(resource.estimated_finish_at, booking.estimated_finish_at);
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, hour, minute, 0).unwrap()
    }

    fn booking_at(id: i64, scheduled_at: DateTime<Utc>, status: &str) -> bookings::Model {
        bookings::Model {
            id,
            user_id: 3,
            service_id: id,
            location_id: 1,
            scheduled_at,
            status: status.to_string(),
            payment_status: "unpaid".to_string(),
            vehicle_plate: format!("M-CW {}", id),
            vehicle_type: None,
            notes: None,
            estimated_finish_at: None,
            started_at: None,
            completed_at: None,
            created_at: scheduled_at,
            updated_at: None,
        }
    }

    fn service_of(id: i64, duration_minutes: i32) -> services::Model {
        services::Model {
            id,
            name: format!("Wash {}", id),
            description: None,
            price_cents: 1200,
            duration_minutes,
            is_active: true,
            created_at: at(0, 0),
            updated_at: None,
        }
    }

    fn history_row(booking_id: i64, status: &str) -> wash_statuses::Model {
        wash_statuses::Model {
            id: 1,
            booking_id,
            status: status.to_string(),
            note: None,
            changed_by: 7,
            created_at: at(8, 0),
        }
    }

    fn updated() -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }
    }

    fn state_with(db: DatabaseConnection) -> web::Data<AppState> {
        web::Data::new(AppState {
            db,
            config: test_config(),
            auth: AuthService::with_password_cost(1, 4),
            queue: QueueService::new(chrono_tz::UTC),
        })
    }

    fn staff() -> AuthContext {
        context_from_user(user_with_role(7, "staff"), 1).unwrap()
    }

    #[test]
    fn customers_cancel_only_pending_bookings() {
        assert!(check_cancellable("pending", false).is_ok());
        assert!(matches!(
            check_cancellable("in_progress", false),
            Err(AppError::Forbidden(_))
        ));
        assert!(check_cancellable("in_progress", true).is_ok());
    }

    #[test]
    fn finished_bookings_cannot_be_cancelled_by_anyone() {
        for by_staff in [false, true] {
            assert!(matches!(
                check_cancellable("completed", by_staff),
                Err(AppError::Conflict(_))
            ));
            assert!(matches!(
                check_cancellable("cancelled", by_staff),
                Err(AppError::Conflict(_))
            ));
        }
    }

    #[actix_web::test]
    async fn new_booking_pushes_back_later_estimates() {
        // booking 1 holds 10:00 with a stored finish of 10:30; booking 2 is
        // then made for 09:00 and lands ahead of it
        let earlier = booking_at(2, at(9, 0), "pending");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![history_row(2, "pending")]])
            .append_query_results([vec![
                (earlier.clone(), service_of(2, 20)),
                (booking_at(1, at(10, 0), "pending"), service_of(1, 30)),
            ]])
            .append_exec_results([updated(), updated()])
            .into_connection();
        let state = state_with(db);

        let queue = enqueue_booking(&state, &earlier, 7).await.unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue[1].booking_id, 1);
        assert_eq!(queue[1].estimated_finish_at, at(10, 50));

        let log = std::sync::Arc::into_inner(state.into_inner()).unwrap().db.into_transaction_log();
        assert_eq!(log.len(), 4);
        assert!(format!("{:?}", log[0]).contains("wash_statuses"));
        assert!(format!("{:?}", log[3]).contains("estimated_finish_at"));
    }

    #[actix_web::test]
    async fn cancelling_records_history_and_refreshes_the_queue() {
        let booking = booking_at(5, at(9, 0), "pending");
        let mut cancelled = booking.clone();
        cancelled.status = "cancelled".to_string();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![cancelled]])
            .append_query_results([vec![history_row(5, "cancelled")]])
            .append_query_results([vec![(booking_at(6, at(9, 30), "pending"), service_of(6, 25))]])
            .append_exec_results([updated()])
            .into_connection();
        let state = state_with(db);

        let result = apply_status_change(
            &state,
            booking,
            BookingStatus::Cancelled,
            Some("no show".to_string()),
            &staff(),
        )
        .await
        .unwrap();
        assert_eq!(result.status, "cancelled");

        let log = std::sync::Arc::into_inner(state.into_inner()).unwrap().db.into_transaction_log();
        assert_eq!(log.len(), 4);
        let statements: Vec<String> = log.iter().map(|t| format!("{:?}", t)).collect();
        assert!(statements[0].contains("UPDATE") && statements[0].contains("cancelled"));
        assert!(statements[1].contains("wash_statuses") && statements[1].contains("no show"));
        assert!(statements[3].contains("estimated_finish_at"));
    }

    #[actix_web::test]
    async fn starting_a_wash_stamps_started_at() {
        let booking = booking_at(8, at(9, 0), "pending");
        let mut started = booking.clone();
        started.status = "in_progress".to_string();
        started.started_at = Some(at(9, 2));

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![started]])
            .append_query_results([vec![history_row(8, "in_progress")]])
            .append_query_results([Vec::<(bookings::Model, services::Model)>::new()])
            .into_connection();
        let state = state_with(db);

        let result = apply_status_change(&state, booking, BookingStatus::InProgress, None, &staff())
            .await
            .unwrap();
        assert!(result.started_at.is_some());

        let log = std::sync::Arc::into_inner(state.into_inner()).unwrap().db.into_transaction_log();
        assert_eq!(log.len(), 3);
        assert!(format!("{:?}", log[0]).contains("started_at"));
    }

    #[actix_web::test]
    async fn rejected_transition_touches_nothing() {
        let state = state_with(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let done = booking_at(9, at(9, 0), "completed");

        let result = apply_status_change(&state, done, BookingStatus::Cancelled, None, &staff()).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(std::sync::Arc::into_inner(state.into_inner()).unwrap().db.into_transaction_log().is_empty());
    }
}
