//! Public signup and registration handlers

use crate::api::{MessageResponse, SuccessResponse};
use crate::domain::{CompleteRegistrationInput, JoinRequest, RegistrationQuery, SignupRequest};
use crate::error::Result;
use crate::state::HasServices;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use validator::Validate;

const CHECK_EMAIL: &str = "Check your email to finish signing up.";

/// Start a registration through a multi-use link
pub async fn join<S: HasServices>(
    State(state): State<S>,
    Path(key): Path<String>,
    Json(request): Json<JoinRequest>,
) -> Result<impl IntoResponse> {
    request.validate()?;
    state
        .registration_service()
        .join_via_multiuse(&request.realm, &key, &request.email)
        .await?;
    Ok(Json(MessageResponse::new(CHECK_EMAIL)))
}

pub async fn signup<S: HasServices>(
    State(state): State<S>,
    Json(request): Json<SignupRequest>,
) -> Result<impl IntoResponse> {
    request.validate()?;
    state
        .registration_service()
        .request_signup(&request.realm, &request.email)
        .await?;
    Ok(Json(MessageResponse::new(CHECK_EMAIL)))
}

/// Show who a registration key is for without consuming it
pub async fn preview<S: HasServices>(
    State(state): State<S>,
    Path(key): Path<String>,
    Query(query): Query<RegistrationQuery>,
) -> Result<impl IntoResponse> {
    let preview = state
        .registration_service()
        .preview(&query.realm, &key)
        .await?;
    Ok(Json(SuccessResponse::new(preview)))
}

pub async fn complete<S: HasServices>(
    State(state): State<S>,
    Json(input): Json<CompleteRegistrationInput>,
) -> Result<impl IntoResponse> {
    let user = state.registration_service().complete(input).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(user))))
}
