use actix_web::{HttpRequest, HttpResponse, delete, get, post, put, web};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{
        context::{resolve_admin_context, resolve_optional_context},
        helpers::{find_location, find_service, local_noon, parse_local_date},
        resources::LocationResource,
        validation,
    },
    app_state::AppState,
    database::models::{bookings, locations},
    errors::AppError,
    services::queue::QueuedBooking,
};

#[derive(Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LocationDto {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    /// `HH:MM`, local time
    pub opens_at: String,
    /// `HH:MM`, local time; equal to `opensAt` means open around the clock
    pub closes_at: String,
    pub bays: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct LocationListQuery {
    /// Include deactivated locations (staff only).
    pub include_inactive: Option<bool>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QueueQuery {
    /// Local date `YYYY-MM-DD`, defaults to today.
    pub date: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct EstimateQuery {
    pub service_id: i64,
    /// RFC 3339 timestamp, defaults to now.
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueResponse {
    pub location_id: i64,
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    pub timezone: String,
    pub queue: Vec<QueuedBooking>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EstimateResponse {
    pub location_id: i64,
    pub service_id: i64,
    #[schema(value_type = String, format = DateTime)]
    pub scheduled_at: DateTime<Utc>,
    pub position: usize,
    #[schema(value_type = String, format = DateTime)]
    pub estimated_finish_at: DateTime<Utc>,
}

struct ValidLocation {
    name: String,
    address: String,
    phone: Option<String>,
    opens_at: String,
    closes_at: String,
    bays: i32,
}

fn validate_location(dto: &LocationDto) -> Result<ValidLocation, AppError> {
    let opens = validation::parse_hhmm(dto.opens_at.trim())
        .ok_or_else(|| AppError::InvalidInput("opensAt must be HH:MM".to_string()))?;
    let closes = validation::parse_hhmm(dto.closes_at.trim())
        .ok_or_else(|| AppError::InvalidInput("closesAt must be HH:MM".to_string()))?;
    let bays = dto.bays.unwrap_or(1);
    if !(1..=50).contains(&bays) {
        return Err(AppError::InvalidInput("bays must be between 1 and 50".to_string()));
    }

    Ok(ValidLocation {
        name: validation::require_text("name", &dto.name, 120)?,
        address: validation::require_text("address", &dto.address, 255)?,
        phone: validation::optional_phone(dto.phone.as_deref())?,
        opens_at: opens.format("%H:%M").to_string(),
        closes_at: closes.format("%H:%M").to_string(),
        bays,
    })
}

#[utoipa::path(
    get,
    path = "/api/locations",
    tag = "Locations",
    params(LocationListQuery),
    responses(
        (status = 200, description = "Locations ordered by name", body = [LocationResource])
    )
)]
#[get("")]
pub async fn get_locations(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LocationListQuery>,
) -> Result<HttpResponse, AppError> {
    let include_inactive = if query.include_inactive.unwrap_or(false) {
        resolve_optional_context(&req, &app_state)
            .await?
            .is_some_and(|ctx| ctx.is_staff())
    } else {
        false
    };

    let mut select = locations::Entity::find().order_by_asc(locations::Column::Name);
    if !include_inactive {
        select = select.filter(locations::Column::IsActive.eq(true));
    }
    let rows = select.all(&app_state.db).await?;
    let data: Vec<LocationResource> = rows.iter().map(LocationResource::from).collect();
    Ok(HttpResponse::Ok().json(data))
}

#[utoipa::path(
    get,
    path = "/api/locations/{id}",
    tag = "Locations",
    params(("id" = i64, Path, description = "Location ID")),
    responses(
        (status = 200, description = "Location found", body = LocationResource),
        (status = 404, description = "Location not found")
    )
)]
#[get("/{id}")]
pub async fn get_location(
    app_state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let location = find_location(&app_state.db, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(LocationResource::from(&location)))
}

#[utoipa::path(
    post,
    path = "/api/locations",
    tag = "Locations",
    request_body = LocationDto,
    responses(
        (status = 201, description = "Location created", body = LocationResource),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin role required")
    )
)]
#[post("")]
pub async fn create_location(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<LocationDto>,
) -> Result<HttpResponse, AppError> {
    resolve_admin_context(&req, &app_state).await?;
    let dto = body.into_inner();
    let valid = validate_location(&dto)?;

    let created = locations::ActiveModel {
        name: Set(valid.name),
        address: Set(valid.address),
        phone: Set(valid.phone),
        opens_at: Set(valid.opens_at),
        closes_at: Set(valid.closes_at),
        bays: Set(valid.bays),
        is_active: Set(dto.is_active.unwrap_or(true)),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(&app_state.db)
    .await?;

    log::info!("Created location {} ({})", created.id, created.name);
    Ok(HttpResponse::Created().json(LocationResource::from(&created)))
}

#[utoipa::path(
    put,
    path = "/api/locations/{id}",
    tag = "Locations",
    params(("id" = i64, Path, description = "Location ID")),
    request_body = LocationDto,
    responses(
        (status = 200, description = "Location updated", body = LocationResource),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Location not found")
    )
)]
#[put("/{id}")]
pub async fn update_location(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<LocationDto>,
) -> Result<HttpResponse, AppError> {
    resolve_admin_context(&req, &app_state).await?;
    let location = find_location(&app_state.db, path.into_inner()).await?;
    let dto = body.into_inner();
    let valid = validate_location(&dto)?;

    let mut active = location.into_active_model();
    active.name = Set(valid.name);
    active.address = Set(valid.address);
    active.phone = Set(valid.phone);
    active.opens_at = Set(valid.opens_at);
    active.closes_at = Set(valid.closes_at);
    active.bays = Set(valid.bays);
    if let Some(is_active) = dto.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Some(Utc::now()));

    let updated = active.update(&app_state.db).await?;
    Ok(HttpResponse::Ok().json(LocationResource::from(&updated)))
}

#[utoipa::path(
    delete,
    path = "/api/locations/{id}",
    tag = "Locations",
    params(("id" = i64, Path, description = "Location ID")),
    responses(
        (status = 204, description = "Location deleted"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Location not found"),
        (status = 409, description = "Location has bookings, deactivate it instead")
    )
)]
#[delete("/{id}")]
pub async fn delete_location(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    resolve_admin_context(&req, &app_state).await?;
    let location = find_location(&app_state.db, path.into_inner()).await?;

    let booking_count = bookings::Entity::find()
        .filter(bookings::Column::LocationId.eq(location.id))
        .count(&app_state.db)
        .await?;
    if booking_count > 0 {
        return Err(AppError::Conflict(format!(
            "Location {} has {} bookings, deactivate it instead",
            location.id, booking_count
        )));
    }

    location.into_active_model().delete(&app_state.db).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/locations/{id}/queue",
    tag = "Locations",
    params(("id" = i64, Path, description = "Location ID"), QueueQuery),
    responses(
        (status = 200, description = "Active bookings with estimated finish times", body = QueueResponse),
        (status = 400, description = "Invalid date"),
        (status = 404, description = "Location not found")
    )
)]
#[get("/{id}/queue")]
pub async fn get_queue(
    app_state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<QueueQuery>,
) -> Result<HttpResponse, AppError> {
    let location = find_location(&app_state.db, path.into_inner()).await?;
    let tz = app_state.queue.timezone();
    let date = parse_local_date(query.date.as_deref(), tz)?;

    let queue = app_state
        .queue
        .location_queue(&app_state.db, location.id, local_noon(date, tz))
        .await?;

    Ok(HttpResponse::Ok().json(QueueResponse {
        location_id: location.id,
        date,
        timezone: tz.name().to_string(),
        queue,
    }))
}

#[utoipa::path(
    get,
    path = "/api/locations/{id}/estimate",
    tag = "Locations",
    params(("id" = i64, Path, description = "Location ID"), EstimateQuery),
    responses(
        (status = 200, description = "Estimated finish for a prospective booking", body = EstimateResponse),
        (status = 400, description = "Location or service inactive"),
        (status = 404, description = "Location or service not found")
    )
)]
#[get("/{id}/estimate")]
pub async fn get_estimate(
    app_state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<EstimateQuery>,
) -> Result<HttpResponse, AppError> {
    let location = find_location(&app_state.db, path.into_inner()).await?;
    let service = find_service(&app_state.db, query.service_id).await?;
    if !location.is_active || !service.is_active {
        return Err(AppError::InvalidInput(
            "Location and service must both be active".to_string(),
        ));
    }

    let scheduled_at = query.scheduled_at.unwrap_or_else(Utc::now);
    let (estimated_finish_at, position) = app_state
        .queue
        .estimate_for_new_booking(
            &app_state.db,
            location.id,
            scheduled_at,
            i64::from(service.duration_minutes),
        )
        .await?;

    Ok(HttpResponse::Ok().json(EstimateResponse {
        location_id: location.id,
        service_id: service.id,
        scheduled_at,
        position,
        estimated_finish_at,
    }))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/locations")
            .service(get_locations)
            .service(create_location)
            .service(get_queue)
            .service(get_estimate)
            .service(get_location)
            .service(update_location)
            .service(delete_location),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(opens: &str, closes: &str, bays: Option<i32>) -> LocationDto {
        LocationDto {
            name: " Downtown ".to_string(),
            address: "1 Main St".to_string(),
            phone: None,
            opens_at: opens.to_string(),
            closes_at: closes.to_string(),
            bays,
            is_active: None,
        }
    }

    #[test]
    fn validates_location_input() {
        let valid = validate_location(&dto("07:00", "21:30", None)).unwrap();
        assert_eq!(valid.name, "Downtown");
        assert_eq!(valid.bays, 1);
        assert_eq!(valid.closes_at, "21:30");

        assert!(validate_location(&dto("7am", "21:30", None)).is_err());
        assert!(validate_location(&dto("07:00", "21:30", Some(0))).is_err());
    }
}
