use actix_web::{
    HttpRequest, HttpResponse,
    cookie::{Cookie, SameSite, time::Duration as CookieDuration},
    get, post, put, web,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    api::{
        context::{AUTH_COOKIE, resolve_auth_context},
        resources::UserResource,
        validation,
    },
    app_state::AppState,
    database::{models::users, types::UserRole},
    errors::AppError,
    services::auth::{IssuedToken, normalize_email},
};

#[derive(Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDto {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoginDto {
    pub email: String,
    pub password: String,
    /// Label stored with the issued token.
    pub device_name: Option<String>,
}

#[derive(Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileDto {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserResource,
    pub token: String,
    #[schema(value_type = String, format = DateTime)]
    pub expires_at: chrono::DateTime<Utc>,
}

fn auth_cookie(issued: &IssuedToken) -> Cookie<'static> {
    let max_age = (issued.token.expires_at - Utc::now()).num_seconds().max(0);
    Cookie::build(AUTH_COOKIE, issued.plain_text.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(max_age))
        .finish()
}

fn auth_response(user: &users::Model, issued: &IssuedToken) -> AuthResponse {
    AuthResponse {
        user: UserResource::from(user),
        token: issued.plain_text.clone(),
        expires_at: issued.token.expires_at,
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterDto,
    responses(
        (status = 201, description = "Customer account created", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
#[post("/register")]
pub async fn register(
    app_state: web::Data<AppState>,
    body: web::Json<RegisterDto>,
) -> Result<HttpResponse, AppError> {
    let dto = body.into_inner();
    let name = validation::require_text("name", &dto.name, 120)?;
    let email = normalize_email(&dto.email);
    if !validation::validate_email(&email) {
        return Err(AppError::InvalidInput("Invalid email address".to_string()));
    }
    validation::validate_password(&dto.password)?;
    let phone = validation::optional_phone(dto.phone.as_deref())?;

    let existing = users::Entity::find()
        .filter(users::Column::Email.eq(email.clone()))
        .one(&app_state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(format!("Email {} is already registered", email)));
    }

    let password_hash = app_state.auth.hash_password(&dto.password).await?;
    let user = users::ActiveModel {
        name: Set(name),
        email: Set(email),
        phone: Set(phone),
        password_hash: Set(password_hash),
        role: Set(UserRole::Customer.to_string()),
        location_id: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(&app_state.db)
    .await?;

    let issued = app_state.auth.issue_token(&app_state.db, user.id, "registration").await?;
    log::info!("Registered customer {}", user.id);

    Ok(HttpResponse::Created()
        .cookie(auth_cookie(&issued))
        .json(auth_response(&user, &issued)))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginDto,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
#[post("/login")]
pub async fn login(
    app_state: web::Data<AppState>,
    body: web::Json<LoginDto>,
) -> Result<HttpResponse, AppError> {
    let dto = body.into_inner();
    let device = dto
        .device_name
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("web")
        .chars()
        .take(100)
        .collect::<String>();

    let (user, issued) = app_state
        .auth
        .login(&app_state.db, &dto.email, &dto.password, &device)
        .await?;

    Ok(HttpResponse::Ok()
        .cookie(auth_cookie(&issued))
        .json(auth_response(&user, &issued)))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    responses(
        (status = 204, description = "Token revoked"),
        (status = 401, description = "Not authenticated")
    )
)]
#[post("/logout")]
pub async fn logout(
    app_state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let ctx = resolve_auth_context(&req, &app_state).await?;
    app_state.auth.revoke(&app_state.db, ctx.token_id).await?;

    let mut removal = Cookie::build(AUTH_COOKIE, "").path("/").finish();
    removal.make_removal();
    Ok(HttpResponse::NoContent().cookie(removal).finish())
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = UserResource),
        (status = 401, description = "Not authenticated")
    )
)]
#[get("/me")]
pub async fn me(
    app_state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let ctx = resolve_auth_context(&req, &app_state).await?;
    Ok(HttpResponse::Ok().json(UserResource::from(&ctx.user)))
}

#[utoipa::path(
    put,
    path = "/api/auth/me",
    tag = "Auth",
    request_body = UpdateProfileDto,
    responses(
        (status = 200, description = "Profile updated", body = UserResource),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Not authenticated or wrong current password")
    )
)]
#[put("/me")]
pub async fn update_profile(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<UpdateProfileDto>,
) -> Result<HttpResponse, AppError> {
    let ctx = resolve_auth_context(&req, &app_state).await?;
    let dto = body.into_inner();
    let mut active = ctx.user.clone().into_active_model();

    if let Some(name) = dto.name.as_deref() {
        active.name = Set(validation::require_text("name", name, 120)?);
    }
    if dto.phone.is_some() {
        active.phone = Set(validation::optional_phone(dto.phone.as_deref())?);
    }
    if let Some(new_password) = dto.new_password.as_deref() {
        let current = dto.current_password.as_deref().ok_or_else(|| {
            AppError::InvalidInput("currentPassword is required to change the password".to_string())
        })?;
        if !app_state
            .auth
            .verify_password(current, &ctx.user.password_hash)
            .await?
        {
            return Err(AppError::Unauthorized("Current password is incorrect".to_string()));
        }
        validation::validate_password(new_password)?;
        active.password_hash = Set(app_state.auth.hash_password(new_password).await?);
    }
    active.updated_at = Set(Some(Utc::now()));

    let updated = active.update(&app_state.db).await?;
    Ok(HttpResponse::Ok().json(UserResource::from(&updated)))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(register)
            .service(login)
            .service(logout)
            .service(me)
            .service(update_profile),
    );
}
