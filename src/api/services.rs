use actix_web::{HttpRequest, HttpResponse, delete, get, post, put, web};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{
        context::{resolve_admin_context, resolve_optional_context},
        helpers::find_service,
        resources::ServiceResource,
        validation,
    },
    app_state::AppState,
    database::models::{bookings, services},
    errors::AppError,
};

const MAX_DURATION_MINUTES: i32 = 600;

#[derive(Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDto {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub duration_minutes: i32,
    pub is_active: Option<bool>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ServiceListQuery {
    /// Include deactivated services (staff only).
    pub include_inactive: Option<bool>,
}

fn validate_service(dto: &ServiceDto) -> Result<(String, Option<String>), AppError> {
    if dto.price_cents < 0 {
        return Err(AppError::InvalidInput("priceCents cannot be negative".to_string()));
    }
    if !(1..=MAX_DURATION_MINUTES).contains(&dto.duration_minutes) {
        return Err(AppError::InvalidInput(format!(
            "durationMinutes must be between 1 and {}",
            MAX_DURATION_MINUTES
        )));
    }
    Ok((
        validation::require_text("name", &dto.name, 120)?,
        validation::optional_text("description", dto.description.as_deref(), 2000)?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/services",
    tag = "Services",
    params(ServiceListQuery),
    responses(
        (status = 200, description = "Wash services ordered by price", body = [ServiceResource])
    )
)]
#[get("")]
pub async fn get_services(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<ServiceListQuery>,
) -> Result<HttpResponse, AppError> {
    let include_inactive = if query.include_inactive.unwrap_or(false) {
        resolve_optional_context(&req, &app_state)
            .await?
            .is_some_and(|ctx| ctx.is_staff())
    } else {
        false
    };

    let mut select = services::Entity::find()
        .order_by_asc(services::Column::PriceCents)
        .order_by_asc(services::Column::Id);
    if !include_inactive {
        select = select.filter(services::Column::IsActive.eq(true));
    }
    let rows = select.all(&app_state.db).await?;
    let data: Vec<ServiceResource> = rows.iter().map(ServiceResource::from).collect();
    Ok(HttpResponse::Ok().json(data))
}

#[utoipa::path(
    get,
    path = "/api/services/{id}",
    tag = "Services",
    params(("id" = i64, Path, description = "Service ID")),
    responses(
        (status = 200, description = "Service found", body = ServiceResource),
        (status = 404, description = "Service not found")
    )
)]
#[get("/{id}")]
pub async fn get_service(
    app_state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let service = find_service(&app_state.db, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ServiceResource::from(&service)))
}

#[utoipa::path(
    post,
    path = "/api/services",
    tag = "Services",
    request_body = ServiceDto,
    responses(
        (status = 201, description = "Service created", body = ServiceResource),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin role required")
    )
)]
#[post("")]
pub async fn create_service(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ServiceDto>,
) -> Result<HttpResponse, AppError> {
    resolve_admin_context(&req, &app_state).await?;
    let dto = body.into_inner();
    let (name, description) = validate_service(&dto)?;

    let created = services::ActiveModel {
        name: Set(name),
        description: Set(description),
        price_cents: Set(dto.price_cents),
        duration_minutes: Set(dto.duration_minutes),
        is_active: Set(dto.is_active.unwrap_or(true)),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(&app_state.db)
    .await?;

    log::info!("Created service {} ({})", created.id, created.name);
    Ok(HttpResponse::Created().json(ServiceResource::from(&created)))
}

#[utoipa::path(
    put,
    path = "/api/services/{id}",
    tag = "Services",
    params(("id" = i64, Path, description = "Service ID")),
    request_body = ServiceDto,
    responses(
        (status = 200, description = "Service updated", body = ServiceResource),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Service not found")
    )
)]
#[put("/{id}")]
pub async fn update_service(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<ServiceDto>,
) -> Result<HttpResponse, AppError> {
    resolve_admin_context(&req, &app_state).await?;
    let service = find_service(&app_state.db, path.into_inner()).await?;
    let dto = body.into_inner();
    let (name, description) = validate_service(&dto)?;

    let mut active = service.into_active_model();
    active.name = Set(name);
    active.description = Set(description);
    active.price_cents = Set(dto.price_cents);
    active.duration_minutes = Set(dto.duration_minutes);
    if let Some(is_active) = dto.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Some(Utc::now()));

    let updated = active.update(&app_state.db).await?;
    Ok(HttpResponse::Ok().json(ServiceResource::from(&updated)))
}

#[utoipa::path(
    post,
    path = "/api/services/{id}/toggle",
    tag = "Services",
    params(("id" = i64, Path, description = "Service ID")),
    responses(
        (status = 200, description = "Active flag flipped", body = ServiceResource),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Service not found")
    )
)]
#[post("/{id}/toggle")]
pub async fn toggle_service(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    resolve_admin_context(&req, &app_state).await?;
    let service = find_service(&app_state.db, path.into_inner()).await?;
    let now_active = !service.is_active;

    let mut active = service.into_active_model();
    active.is_active = Set(now_active);
    active.updated_at = Set(Some(Utc::now()));
    let updated = active.update(&app_state.db).await?;

    log::info!("Service {} is now {}", updated.id, if now_active { "active" } else { "inactive" });
    Ok(HttpResponse::Ok().json(ServiceResource::from(&updated)))
}

#[utoipa::path(
    delete,
    path = "/api/services/{id}",
    tag = "Services",
    params(("id" = i64, Path, description = "Service ID")),
    responses(
        (status = 204, description = "Service deleted"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Service not found"),
        (status = 409, description = "Service has bookings, deactivate it instead")
    )
)]
#[delete("/{id}")]
pub async fn delete_service(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    resolve_admin_context(&req, &app_state).await?;
    let service = find_service(&app_state.db, path.into_inner()).await?;

    let booking_count = bookings::Entity::find()
        .filter(bookings::Column::ServiceId.eq(service.id))
        .count(&app_state.db)
        .await?;
    if booking_count > 0 {
        return Err(AppError::Conflict(format!(
            "Service {} has {} bookings, deactivate it instead",
            service.id, booking_count
        )));
    }

    service.into_active_model().delete(&app_state.db).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/services")
            .service(get_services)
            .service(create_service)
            .service(get_service)
            .service(update_service)
            .service(toggle_service)
            .service(delete_service),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(price_cents: i64, duration_minutes: i32) -> ServiceDto {
        ServiceDto {
            name: "Express".to_string(),
            description: Some("   ".to_string()),
            price_cents,
            duration_minutes,
            is_active: None,
        }
    }

    #[test]
    fn validates_price_and_duration() {
        let (name, description) = validate_service(&dto(1500, 20)).unwrap();
        assert_eq!(name, "Express");
        assert_eq!(description, None);

        assert!(validate_service(&dto(-1, 20)).is_err());
        assert!(validate_service(&dto(1500, 0)).is_err());
        assert!(validate_service(&dto(1500, MAX_DURATION_MINUTES + 1)).is_err());
    }
}
