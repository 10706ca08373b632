use actix_web::{HttpRequest, http::header, web};

use crate::{
    app_state::AppState,
    database::{
        models::{bookings, users},
        types::UserRole,
    },
    errors::AppError,
};

pub const AUTH_COOKIE: &str = "auth_token";

/// The authenticated caller of a request.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user: users::Model,
    pub role: UserRole,
    pub token_id: i64,
}

impl AuthContext {
    pub fn user_id(&self) -> i64 {
        self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn owns(&self, booking: &bookings::Model) -> bool {
        booking.user_id == self.user.id
    }

    pub fn can_view_booking(&self, booking: &bookings::Model) -> bool {
        self.is_staff() || self.owns(booking)
    }
}

/// Token from `Authorization: Bearer ...`, falling back to the auth cookie.
pub fn extract_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let (scheme, token) = value.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim().to_string())
        })
        .filter(|token| !token.is_empty());

    from_header.or_else(|| {
        req.cookie(AUTH_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
    })
}

pub fn context_from_user(user: users::Model, token_id: i64) -> Result<AuthContext, AppError> {
    let role = user.role.parse::<UserRole>().map_err(|err| {
        log::warn!("User {} has an unusable role: {}", user.id, err);
        AppError::Forbidden("Account role is not recognised".to_string())
    })?;
    Ok(AuthContext {
        user,
        role,
        token_id,
    })
}

pub async fn resolve_auth_context(
    req: &HttpRequest,
    app_state: &web::Data<AppState>,
) -> Result<AuthContext, AppError> {
    let token = extract_token(req)
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
    let (user, api_token) = app_state.auth.authenticate(&app_state.db, &token).await?;
    context_from_user(user, api_token.id)
}

/// Like [`resolve_auth_context`] but anonymous callers are allowed.
pub async fn resolve_optional_context(
    req: &HttpRequest,
    app_state: &web::Data<AppState>,
) -> Result<Option<AuthContext>, AppError> {
    if extract_token(req).is_none() {
        return Ok(None);
    }
    resolve_auth_context(req, app_state).await.map(Some)
}

pub fn ensure_staff_access(ctx: &AuthContext) -> Result<(), AppError> {
    if ctx.is_staff() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Staff role required".to_string()))
    }
}

pub fn ensure_admin_access(ctx: &AuthContext) -> Result<(), AppError> {
    if ctx.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin role required".to_string()))
    }
}

pub async fn resolve_staff_context(
    req: &HttpRequest,
    app_state: &web::Data<AppState>,
) -> Result<AuthContext, AppError> {
    let ctx = resolve_auth_context(req, app_state).await?;
    ensure_staff_access(&ctx)?;
    Ok(ctx)
}

pub async fn resolve_admin_context(
    req: &HttpRequest,
    app_state: &web::Data<AppState>,
) -> Result<AuthContext, AppError> {
    let ctx = resolve_auth_context(req, app_state).await?;
    ensure_admin_access(&ctx)?;
    Ok(ctx)
}
