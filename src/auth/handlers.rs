use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{CheckAuthResponse, LoginRequest, LoginResponse, MessageResponse, RegisterRequest},
        extractors::AuthUser,
        services::{authenticate, register_user},
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/check_auth", get(check_auth))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let Json(payload) = payload?;
    register_user(state.store.as_ref(), payload.email, payload.password).await?;
    state.metrics.auth_event("register");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Registration successful".into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(payload) = payload?;
    let user = match authenticate(state.store.as_ref(), payload.email, payload.password).await {
        Ok(u) => u,
        Err(e) => {
            if matches!(e, AppError::InvalidCredentials) {
                state.metrics.auth_event("login_failed");
            }
            return Err(e);
        }
    };

    let token = state.keys.issue(user.id)?;
    state.metrics.auth_event("login_ok");
    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        email: user.email,
    }))
}

#[instrument(skip_all, fields(user_id = user.id))]
pub async fn check_auth(user: AuthUser) -> Json<CheckAuthResponse> {
    Json(CheckAuthResponse {
        authenticated: true,
        user_id: user.id,
        email: user.email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_response_shape() {
        let response = LoginResponse {
            token: "t".into(),
            user_id: 3,
            email: "test@example.com".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["user_id"], 3);
        assert_eq!(json["email"], "test@example.com");
        assert_eq!(json["token"], "t");
    }
}
