use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use super::jwt::TokenError;
use crate::{db::StoreError, error::AppError, state::AppState};

/// The identity resolved for one request. Handlers that take this argument
/// only run once the bearer token has been verified and its user found.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub email: String,
}

/// Why a request was turned away. Logged, never shown to the client.
#[derive(Debug, thiserror::Error)]
pub enum RejectReason {
    #[error("missing Authorization header")]
    NoToken,
    #[error("Authorization header is not a bearer token")]
    BadScheme,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("user {0} no longer exists")]
    UserMissing(i32),
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, RejectReason> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(RejectReason::NoToken)?;
    let token = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .ok_or(RejectReason::BadScheme)?
        .trim();
    if token.is_empty() {
        return Err(RejectReason::NoToken);
    }
    Ok(token)
}

/// Runs the whole gate: header, signature, expiry, then the user lookup.
pub async fn resolve(
    headers: &HeaderMap,
    state: &AppState,
) -> Result<Result<AuthUser, RejectReason>, StoreError> {
    let token = match bearer_token(headers) {
        Ok(t) => t,
        Err(r) => return Ok(Err(r)),
    };
    let user_id = match state.keys.verify(token) {
        Ok(id) => id,
        Err(e) => return Ok(Err(e.into())),
    };
    Ok(match state.store.find_by_id(user_id).await? {
        Some(user) => Ok(AuthUser {
            id: user.id,
            email: user.email,
        }),
        None => Err(RejectReason::UserMissing(user_id)),
    })
}

/// Gate for handlers that must inspect the body before the session.
/// Rejections are logged and counted; the reason stays server-side.
pub async fn authorize(headers: &HeaderMap, state: &AppState) -> Result<AuthUser, AppError> {
    match resolve(headers, state).await? {
        Ok(user) => Ok(user),
        Err(reason) => {
            warn!(reason = %reason, "request rejected by auth gate");
            state.metrics.auth_event("token_rejected");
            Err(AppError::Unauthorized)
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authorize(&parts.headers, state).await
    }
}
