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
        context::resolve_admin_context,
        helpers::{PageQuery, Paginated, find_location, find_user},
        resources::UserResource,
        validation,
    },
    app_state::AppState,
    database::{
        models::{bookings, users},
        types::UserRole,
    },
    errors::AppError,
    services::auth::normalize_email,
};

#[derive(Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserDto {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub location_id: Option<i64>,
}

#[derive(Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserDto {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<UserRole>,
    pub location_id: Option<i64>,
    pub password: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    /// Restrict to one role.
    pub role: Option<UserRole>,
}

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    params(UserListQuery, PageQuery),
    responses(
        (status = 200, description = "Users, newest first", body = Paginated<UserResource>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Admin role required")
    )
)]
#[get("")]
pub async fn get_users(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    filter: web::Query<UserListQuery>,
    page: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    resolve_admin_context(&req, &app_state).await?;
    let (page_index, per_page) = page.into_inner().normalize();

    let mut query = users::Entity::find().order_by_desc(users::Column::Id);
    if let Some(role) = filter.role {
        query = query.filter(users::Column::Role.eq(role.as_str()));
    }

    let paginator = query.paginate(&app_state.db, per_page);
    let total = paginator.num_items().await?;
    let rows = paginator.fetch_page(page_index).await?;
    let data = rows.iter().map(UserResource::from).collect();

    Ok(HttpResponse::Ok().json(Paginated::new(data, page_index, per_page, total)))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = UserResource),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found")
    )
)]
#[get("/{id}")]
pub async fn get_user(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    resolve_admin_context(&req, &app_state).await?;
    let user = find_user(&app_state.db, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserResource::from(&user)))
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    request_body = CreateUserDto,
    responses(
        (status = 201, description = "User created", body = UserResource),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin role required"),
        (status = 409, description = "Email already registered")
    )
)]
#[post("")]
pub async fn create_user(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateUserDto>,
) -> Result<HttpResponse, AppError> {
    let admin = resolve_admin_context(&req, &app_state).await?;
    let dto = body.into_inner();

    let name = validation::require_text("name", &dto.name, 120)?;
    let email = normalize_email(&dto.email);
    if !validation::validate_email(&email) {
        return Err(AppError::InvalidInput("Invalid email address".to_string()));
    }
    validation::validate_password(&dto.password)?;
    let phone = validation::optional_phone(dto.phone.as_deref())?;
    if let Some(location_id) = dto.location_id {
        find_location(&app_state.db, location_id).await?;
    }

    let existing = users::Entity::find()
        .filter(users::Column::Email.eq(email.clone()))
        .one(&app_state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(format!("User with email {} already exists", email)));
    }

    let password_hash = app_state.auth.hash_password(&dto.password).await?;
    let created = users::ActiveModel {
        name: Set(name),
        email: Set(email),
        phone: Set(phone),
        password_hash: Set(password_hash),
        role: Set(dto.role.to_string()),
        location_id: Set(dto.location_id),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(&app_state.db)
    .await?;

    log::info!(
        "Admin {} created user {} with role {}",
        admin.user_id(),
        created.id,
        created.role
    );
    Ok(HttpResponse::Created().json(UserResource::from(&created)))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateUserDto,
    responses(
        (status = 200, description = "User updated", body = UserResource),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found")
    )
)]
#[put("/{id}")]
pub async fn update_user(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdateUserDto>,
) -> Result<HttpResponse, AppError> {
    let admin = resolve_admin_context(&req, &app_state).await?;
    let user = find_user(&app_state.db, path.into_inner()).await?;
    let dto = body.into_inner();

    if user.id == admin.user_id() && dto.role.is_some_and(|role| role != UserRole::Admin) {
        return Err(AppError::InvalidInput(
            "Admins cannot remove their own admin role".to_string(),
        ));
    }

    let user_id = user.id;
    let mut active = user.into_active_model();
    if let Some(name) = dto.name.as_deref() {
        active.name = Set(validation::require_text("name", name, 120)?);
    }
    if dto.phone.is_some() {
        active.phone = Set(validation::optional_phone(dto.phone.as_deref())?);
    }
    if let Some(role) = dto.role {
        active.role = Set(role.to_string());
    }
    if let Some(location_id) = dto.location_id {
        find_location(&app_state.db, location_id).await?;
        active.location_id = Set(Some(location_id));
    }
    let password_changed = dto.password.is_some();
    if let Some(password) = dto.password.as_deref() {
        validation::validate_password(password)?;
        active.password_hash = Set(app_state.auth.hash_password(password).await?);
    }
    active.updated_at = Set(Some(Utc::now()));

    let updated = active.update(&app_state.db).await?;
    if password_changed {
        let revoked = app_state
            .auth
            .revoke_all_for_user(&app_state.db, user_id)
            .await?;
        log::info!("Password reset for user {} revoked {} tokens", user_id, revoked);
    }

    Ok(HttpResponse::Ok().json(UserResource::from(&updated)))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Cannot delete yourself"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found"),
        (status = 409, description = "User still has bookings")
    )
)]
#[delete("/{id}")]
pub async fn delete_user(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let admin = resolve_admin_context(&req, &app_state).await?;
    let user = find_user(&app_state.db, path.into_inner()).await?;

    if user.id == admin.user_id() {
        return Err(AppError::InvalidInput("Admins cannot delete themselves".to_string()));
    }

    let booking_count = bookings::Entity::find()
        .filter(bookings::Column::UserId.eq(user.id))
        .count(&app_state.db)
        .await?;
    if booking_count > 0 {
        return Err(AppError::Conflict(format!(
            "User {} has {} bookings and cannot be deleted",
            user.id, booking_count
        )));
    }

    app_state.auth.revoke_all_for_user(&app_state.db, user.id).await?;
    let user_id = user.id;
    user.into_active_model().delete(&app_state.db).await?;
    log::info!("Admin {} deleted user {}", admin.user_id(), user_id);

    Ok(HttpResponse::NoContent().finish())
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .service(get_users)
            .service(get_user)
            .service(create_user)
            .service(update_user)
            .service(delete_user),
    );
}
