use actix_web::{HttpRequest, HttpResponse, get, patch, post, web};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use crate::{
    api::{
        context::{ensure_staff_access, resolve_auth_context, resolve_staff_context},
        helpers::{
            PageQuery, Paginated, find_booking, find_location, find_service, find_user,
            local_noon, parse_local_date,
        },
        resources::{BookingResource, WashStatusResource},
        validation,
    },
    app_state::AppState,
    database::{
        models::{bookings, wash_statuses},
        types::{BookingStatus, PaymentStatus, UserRole},
    },
    errors::AppError,
    services::queue::local_day_bounds,
};

use super::{
    functions::{
        apply_status_change, check_cancellable, check_schedule, enqueue_booking,
        ensure_can_view, load_booking_resource, load_booking_resources,
    },
    structures::{
        BookingCreatedResponse, BookingListQuery, CancelBookingDto, CreateBookingDto,
        UpdateBookingStatusDto,
    },
};

#[utoipa::path(
    post,
    path = "/api/bookings",
    tag = "Bookings",
    request_body = CreateBookingDto,
    responses(
        (status = 201, description = "Booking created with its estimated finish time", body = BookingCreatedResponse),
        (status = 400, description = "Invalid input, inactive service/location or outside opening hours"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Service, location or customer not found")
    )
)]
#[post("")]
pub async fn create_booking(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateBookingDto>,
) -> Result<HttpResponse, AppError> {
    let ctx = resolve_auth_context(&req, &app_state).await?;
    let dto = body.into_inner();

    let customer_id = match dto.user_id {
        Some(user_id) if user_id != ctx.user_id() => {
            ensure_staff_access(&ctx)?;
            let customer = find_user(&app_state.db, user_id).await?;
            if customer.role != UserRole::Customer.as_str() {
                return Err(AppError::InvalidInput(
                    "Bookings can only be made for customers".to_string(),
                ));
            }
            customer.id
        }
        _ => ctx.user_id(),
    };

    let service = find_service(&app_state.db, dto.service_id).await?;
    if !service.is_active {
        return Err(AppError::InvalidInput(format!(
            "Service {} is not available",
            service.name
        )));
    }
    let location = find_location(&app_state.db, dto.location_id).await?;
    if !location.is_active {
        return Err(AppError::InvalidInput(format!(
            "Location {} is not accepting bookings",
            location.name
        )));
    }

    let vehicle_plate = validation::normalize_plate(&dto.vehicle_plate)
        .ok_or_else(|| AppError::InvalidInput("vehiclePlate is invalid".to_string()))?;
    let vehicle_type = validation::optional_text("vehicleType", dto.vehicle_type.as_deref(), 50)?;
    let notes = validation::optional_text("notes", dto.notes.as_deref(), 1000)?;

    let now = Utc::now();
    let scheduled_at = dto.scheduled_at.unwrap_or(now);
    check_schedule(scheduled_at, now, &location, app_state.queue.timezone())?;

    let (estimated_finish_at, queue_position) = app_state
        .queue
        .estimate_for_new_booking(
            &app_state.db,
            location.id,
            scheduled_at,
            i64::from(service.duration_minutes),
        )
        .await?;

    let booking = bookings::ActiveModel {
        user_id: Set(customer_id),
        service_id: Set(service.id),
        location_id: Set(location.id),
        scheduled_at: Set(scheduled_at),
        status: Set(BookingStatus::Pending.to_string()),
        payment_status: Set(PaymentStatus::Unpaid.to_string()),
        vehicle_plate: Set(vehicle_plate),
        vehicle_type: Set(vehicle_type),
        notes: Set(notes),
        estimated_finish_at: Set(Some(estimated_finish_at)),
        started_at: Set(None),
        completed_at: Set(None),
        created_at: Set(now),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(&app_state.db)
    .await?;

    enqueue_booking(&app_state, &booking, ctx.user_id()).await?;

    log::info!(
        "Booking {} created for user {} at location {} (position {}, finish ~{})",
        booking.id,
        customer_id,
        location.id,
        queue_position,
        estimated_finish_at
    );

    let resource = load_booking_resource(&app_state.db, &booking).await?;
    Ok(HttpResponse::Created().json(BookingCreatedResponse {
        booking: resource,
        queue_position,
    }))
}

#[utoipa::path(
    get,
    path = "/api/bookings",
    tag = "Bookings",
    params(BookingListQuery, PageQuery),
    responses(
        (status = 200, description = "Bookings ordered by scheduled time; customers only see their own", body = Paginated<BookingResource>),
        (status = 400, description = "Invalid filter"),
        (status = 401, description = "Not authenticated")
    )
)]
#[get("")]
pub async fn get_bookings(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    filter: web::Query<BookingListQuery>,
    page: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let ctx = resolve_auth_context(&req, &app_state).await?;
    let filter = filter.into_inner();
    let (page_index, per_page) = page.into_inner().normalize();

    let mut query = bookings::Entity::find();
    if !ctx.is_staff() {
        query = query.filter(bookings::Column::UserId.eq(ctx.user_id()));
    }
    if let Some(status) = filter.status {
        query = query.filter(bookings::Column::Status.eq(status.as_str()));
    }
    if let Some(location_id) = filter.location_id {
        query = query.filter(bookings::Column::LocationId.eq(location_id));
    }
    if filter.date.is_some() {
        let tz = app_state.queue.timezone();
        let date = parse_local_date(filter.date.as_deref(), tz)?;
        let (start, end) = local_day_bounds(local_noon(date, tz), tz);
        query = query
            .filter(bookings::Column::ScheduledAt.gte(start))
            .filter(bookings::Column::ScheduledAt.lt(end));
    }
    // staff work through the day in order, customers see their latest first
    query = if ctx.is_staff() {
        query.order_by_asc(bookings::Column::ScheduledAt)
    } else {
        query.order_by_desc(bookings::Column::ScheduledAt)
    };
    query = query.order_by_asc(bookings::Column::Id);

    let paginator = query.paginate(&app_state.db, per_page);
    let total = paginator.num_items().await?;
    let rows = paginator.fetch_page(page_index).await?;
    let data = load_booking_resources(&app_state.db, &rows).await?;

    Ok(HttpResponse::Ok().json(Paginated::new(data, page_index, per_page, total)))
}

#[utoipa::path(
    get,
    path = "/api/bookings/{id}",
    tag = "Bookings",
    params(("id" = i64, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking found", body = BookingResource),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Booking not found")
    )
)]
#[get("/{id}")]
pub async fn get_booking(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let ctx = resolve_auth_context(&req, &app_state).await?;
    let booking = find_booking(&app_state.db, path.into_inner()).await?;
    ensure_can_view(&ctx, &booking)?;

    let resource = load_booking_resource(&app_state.db, &booking).await?;
    Ok(HttpResponse::Ok().json(resource))
}

#[utoipa::path(
    get,
    path = "/api/bookings/{id}/history",
    tag = "Bookings",
    params(("id" = i64, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Wash status history, oldest first", body = [WashStatusResource]),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Booking not found")
    )
)]
#[get("/{id}/history")]
pub async fn get_booking_history(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let ctx = resolve_auth_context(&req, &app_state).await?;
    let booking = find_booking(&app_state.db, path.into_inner()).await?;
    ensure_can_view(&ctx, &booking)?;

    let history = wash_statuses::Entity::find()
        .filter(wash_statuses::Column::BookingId.eq(booking.id))
        .order_by_asc(wash_statuses::Column::CreatedAt)
        .order_by_asc(wash_statuses::Column::Id)
        .all(&app_state.db)
        .await?;
    let data: Vec<WashStatusResource> = history.iter().map(WashStatusResource::from).collect();
    Ok(HttpResponse::Ok().json(data))
}

#[utoipa::path(
    post,
    path = "/api/bookings/{id}/cancel",
    tag = "Bookings",
    params(("id" = i64, Path, description = "Booking ID")),
    request_body = CancelBookingDto,
    responses(
        (status = 200, description = "Booking cancelled", body = BookingResource),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Only pending bookings can be cancelled by customers"),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Booking already finished or cancelled")
    )
)]
#[post("/{id}/cancel")]
pub async fn cancel_booking(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: Option<web::Json<CancelBookingDto>>,
) -> Result<HttpResponse, AppError> {
    let ctx = resolve_auth_context(&req, &app_state).await?;
    let booking = find_booking(&app_state.db, path.into_inner()).await?;
    ensure_can_view(&ctx, &booking)?;

    check_cancellable(&booking.status, ctx.is_staff())?;

    let dto = body.map(|b| b.into_inner()).unwrap_or_default();
    let reason = validation::optional_text("reason", dto.reason.as_deref(), 500)?;
    let updated =
        apply_status_change(&app_state, booking, BookingStatus::Cancelled, reason, &ctx).await?;

    let resource = load_booking_resource(&app_state.db, &updated).await?;
    Ok(HttpResponse::Ok().json(resource))
}

#[utoipa::path(
    patch,
    path = "/api/bookings/{id}/status",
    tag = "Bookings",
    params(("id" = i64, Path, description = "Booking ID")),
    request_body = UpdateBookingStatusDto,
    responses(
        (status = 200, description = "Wash progress updated", body = BookingResource),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Staff role required"),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Transition not allowed")
    )
)]
#[patch("/{id}/status")]
pub async fn update_booking_status(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdateBookingStatusDto>,
) -> Result<HttpResponse, AppError> {
    let ctx = resolve_staff_context(&req, &app_state).await?;
    let booking = find_booking(&app_state.db, path.into_inner()).await?;
    let dto = body.into_inner();
    let note = validation::optional_text("note", dto.note.as_deref(), 500)?;

    let updated = apply_status_change(&app_state, booking, dto.status, note, &ctx).await?;
    let resource = load_booking_resource(&app_state.db, &updated).await?;
    Ok(HttpResponse::Ok().json(resource))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/bookings")
            .service(create_booking)
            .service(get_bookings)
            .service(get_booking)
            .service(get_booking_history)
            .service(cancel_booking)
            .service(update_booking_status),
    );
}
