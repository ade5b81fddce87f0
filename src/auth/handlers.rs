use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        State,
    },
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{LoginForm, PublicUser, RegisterRequest, TokenResponse},
        errors::AuthError,
        extractors::BearerToken,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublicUser>), AuthError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "malformed register body");
        AuthError::Validation(e.body_text())
    })?;

    let user = state.auth.register(&payload.email, &payload.password).await?;
    Ok((StatusCode::CREATED, Json(PublicUser::from(user))))
}

#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Json<TokenResponse>, AuthError> {
    let Form(form) = form.map_err(|e| {
        warn!(error = %e, "malformed login form");
        AuthError::Validation(e.body_text())
    })?;

    // Blank fields count as missing, same as an absent key.
    if form.username.is_empty() || form.password.is_empty() {
        return Err(AuthError::Validation(
            "username and password are required".into(),
        ));
    }

    if let Some(grant_type) = form.grant_type.as_deref() {
        if grant_type != "password" {
            return Err(AuthError::Validation(
                "grant_type must be \"password\"".into(),
            ));
        }
    }

    let token = state.auth.login(&form.username, &form.password).await?;
    Ok(Json(TokenResponse::bearer(token)))
}

#[instrument(skip(state, token))]
pub async fn get_me(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state.auth.resolve_current_user(&token).await?;
    Ok(Json(PublicUser::from(user)))
}
