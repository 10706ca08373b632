use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};

use crate::{
    database::models::{api_tokens, users},
    errors::AppError,
};

const TOKEN_SECRET_LEN: usize = 40;
// token secrets are random, a low cost factor is enough
const TOKEN_HASH_COST: u32 = 4;

/// A freshly issued token; `plain_text` is shown to the client exactly once.
pub struct IssuedToken {
    pub plain_text: String,
    pub token: api_tokens::Model,
}

#[derive(Clone)]
pub struct AuthService {
    token_ttl: Duration,
    password_cost: u32,
}

impl Default for AuthService {
    fn default() -> Self {
        Self::new(24 * 7)
    }
}

impl AuthService {
    pub fn new(token_ttl_hours: i64) -> Self {
        Self::with_password_cost(token_ttl_hours, bcrypt::DEFAULT_COST)
    }

    pub fn with_password_cost(token_ttl_hours: i64, password_cost: u32) -> Self {
        Self {
            token_ttl: Duration::hours(token_ttl_hours),
            password_cost,
        }
    }

    pub async fn hash_password(&self, password: &str) -> Result<String, AppError> {
        hash_blocking(password.to_string(), self.password_cost).await
    }

    pub async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| {
                log::error!("bcrypt verify task failed: {}", e);
                AppError::Internal
            })?
            .map_err(AppError::from)
    }

    /// Checks credentials and issues a new token for the user.
    pub async fn login(
        &self,
        db: &DatabaseConnection,
        email: &str,
        password: &str,
        device_name: &str,
    ) -> Result<(users::Model, IssuedToken), AppError> {
        let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

        let user = users::Entity::find()
            .filter(users::Column::Email.eq(normalize_email(email)))
            .one(db)
            .await?
            .ok_or_else(invalid)?;

        if !self.verify_password(password, &user.password_hash).await? {
            log::info!("Failed login attempt for user {}", user.id);
            return Err(invalid());
        }

        let issued = self.issue_token(db, user.id, device_name).await?;
        log::info!("User {} logged in (token {})", user.id, issued.token.id);
        Ok((user, issued))
    }

    pub async fn issue_token(
        &self,
        db: &DatabaseConnection,
        user_id: i64,
        name: &str,
    ) -> Result<IssuedToken, AppError> {
        let secret = generate_secret();
        let token_hash = hash_blocking(secret.clone(), TOKEN_HASH_COST).await?;
        let now = Utc::now();

        let token = api_tokens::ActiveModel {
            user_id: Set(user_id),
            name: Set(name.to_string()),
            token_hash: Set(token_hash),
            created_at: Set(now),
            last_used_at: Set(None),
            expires_at: Set(now + self.token_ttl),
            ..Default::default()
        }
        .insert(db)
        .await?;

        Ok(IssuedToken {
            plain_text: format!("{}|{}", token.id, secret),
            token,
        })
    }

    /// Resolves a `{id}|{secret}` token to its user.
    pub async fn authenticate(
        &self,
        db: &DatabaseConnection,
        raw_token: &str,
    ) -> Result<(users::Model, api_tokens::Model), AppError> {
        let (token_id, secret) = split_token(raw_token)
            .ok_or_else(|| AppError::Unauthorized("Malformed token".to_string()))?;

        let (token, user) = api_tokens::Entity::find_by_id(token_id)
            .find_also_related(users::Entity)
            .one(db)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Unknown token".to_string()))?;
        let user = user.ok_or_else(|| AppError::Unauthorized("Unknown token".to_string()))?;

        if token.expires_at <= Utc::now() {
            return Err(AppError::Unauthorized("Token expired".to_string()));
        }

        let secret = secret.to_string();
        let hash = token.token_hash.clone();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(secret, &hash))
            .await
            .map_err(|_| AppError::Internal)??;
        if !matches {
            return Err(AppError::Unauthorized("Unknown token".to_string()));
        }

        let mut active = token.clone().into_active_model();
        active.last_used_at = Set(Some(Utc::now()));
        if let Err(err) = active.update(db).await {
            log::warn!("Could not stamp last use of token {}: {}", token.id, err);
        }

        Ok((user, token))
    }

    pub async fn revoke(&self, db: &DatabaseConnection, token_id: i64) -> Result<(), AppError> {
        api_tokens::Entity::delete_by_id(token_id).exec(db).await?;
        Ok(())
    }

    pub async fn revoke_all_for_user(
        &self,
        db: &DatabaseConnection,
        user_id: i64,
    ) -> Result<u64, AppError> {
        let result = api_tokens::Entity::delete_many()
            .filter(api_tokens::Column::UserId.eq(user_id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}

async fn hash_blocking(value: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(value, cost))
        .await
        .map_err(|e| {
            log::error!("bcrypt hash task failed: {}", e);
            AppError::Internal
        })?
        .map_err(AppError::from)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub fn generate_secret() -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(TOKEN_SECRET_LEN)
        .collect()
}

pub fn split_token(raw: &str) -> Option<(i64, &str)> {
    let (id, secret) = raw.trim().split_once('|')?;
    let id = id.parse::<i64>().ok().filter(|id| *id > 0)?;
    if secret.len() != TOKEN_SECRET_LEN || !secret.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some((id, secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_alphanumeric_and_unique() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), TOKEN_SECRET_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn splits_well_formed_tokens() {
        let secret = generate_secret();
        let raw = format!("42|{}", secret);
        assert_eq!(split_token(&raw), Some((42, secret.as_str())));
    }

    #[test]
    fn rejects_malformed_tokens() {
        let secret = generate_secret();
        assert_eq!(split_token(&secret), None);
        assert_eq!(split_token(&format!("abc|{}", secret)), None);
        assert_eq!(split_token(&format!("0|{}", secret)), None);
        assert_eq!(split_token("5|short"), None);
        assert_eq!(split_token(&format!("5|{}!", &secret[1..])), None);
    }

    #[test]
    fn normalizes_emails() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM "), "jane.doe@example.com");
    }

    #[actix_web::test]
    async fn hashes_and_verifies_passwords() {
        let auth = AuthService::with_password_cost(1, 4);
        let hash = auth.hash_password("hunter22").await.unwrap();
        assert_ne!(hash, "hunter22");
        assert!(auth.verify_password("hunter22", &hash).await.unwrap());
        assert!(!auth.verify_password("hunter23", &hash).await.unwrap());
    }
}
