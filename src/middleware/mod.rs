use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::JwtConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Account, Actor, Role};
use crate::AppState;

/// Claims выдаваемого токена. `sub` - id субъекта роли (client id, user id или admin id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    fn actor(&self) -> Option<Actor> {
        let account_id = self.sub.parse().ok()?;
        Some(Actor { role: self.role, account_id })
    }
}

pub fn issue_token(config: &JwtConfig, account: &Account) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: account.subject_id.to_string(),
        role: account.role,
        exp: (now + Duration::hours(config.expires_in_hours)).timestamp(),
        iat: now.timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(config.secret.as_bytes()))
        .map_err(|e| AppError::Internal(format!("encode token: {}", e)))
}

pub fn verify_token(config: &JwtConfig, token: &str) -> AppResult<Actor> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        AppError::Unauthorized
    })?;
    data.claims.actor().ok_or(AppError::Unauthorized)
}

/// Проверка email/пароля: используется и логином, и Basic auth.
pub async fn check_credentials(state: &AppState, email: &str, password: &str) -> AppResult<Account> {
    let account = state
        .accounts
        .find_account_by_email(email.trim())
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !account.verify_password(password) {
        return Err(AppError::Unauthorized);
    }
    Ok(account)
}

async fn authenticate(state: &AppState, auth_header: &str) -> AppResult<Actor> {
    if let Some(token) = auth_header.strip_prefix("Bearer ") {
        return verify_token(&state.config.jwt, token.trim());
    }

    // Basic auth: base64(email:password)
    let encoded = auth_header.strip_prefix("Basic ").ok_or(AppError::Unauthorized)?;
    let decoded = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| AppError::Unauthorized)?;
    let credentials = String::from_utf8(decoded).map_err(|_| AppError::Unauthorized)?;
    let (email, password) = credentials.split_once(':').ok_or(AppError::Unauthorized)?;

    Ok(check_credentials(state, email, password).await?.actor())
}

fn auth_header(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

// Обязательная аутентификация
impl FromRequestParts<Arc<AppState>> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = auth_header(parts).ok_or(AppError::Unauthorized)?;
        authenticate(state, header).await
    }
}

/// Аутентификация по желанию: без заголовка - аноним, с битым заголовком - 401.
#[derive(Debug, Clone, Copy)]
pub struct MaybeActor(pub Option<Actor>);

impl FromRequestParts<Arc<AppState>> for MaybeActor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        match auth_header(parts) {
            None => Ok(MaybeActor(None)),
            Some(header) => authenticate(state, header).await.map(|actor| MaybeActor(Some(actor))),
        }
    }
}
