//! Invitation API handlers

use crate::api::{load_actor, MessageResponse, SuccessResponse};
use crate::domain::{CreateMultiuseInput, InviteId, InviteUsersInput, MultiuseInviteId};
use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::state::HasServices;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

/// Invite a batch of addresses to the actor's realm
pub async fn invite<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Json(input): Json<InviteUsersInput>,
) -> Result<impl IntoResponse> {
    let actor = load_actor(&state, &auth).await?;
    let response = state.invitation_service().invite(&actor, input).await?;
    Ok(Json(SuccessResponse::new(response)))
}

/// Open invitations the actor may see
pub async fn list<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
) -> Result<impl IntoResponse> {
    let actor = load_actor(&state, &auth).await?;
    let invites = state.invitation_service().list_open(&actor).await?;
    Ok(Json(SuccessResponse::new(invites)))
}

pub async fn revoke<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = load_actor(&state, &auth).await?;
    state
        .invitation_service()
        .revoke_invite(&actor, InviteId::from(id))
        .await?;
    Ok(Json(MessageResponse::new("Invitation revoked")))
}

pub async fn resend<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = load_actor(&state, &auth).await?;
    state
        .invitation_service()
        .resend_invite(&actor, InviteId::from(id))
        .await?;
    Ok(Json(MessageResponse::new("Invitation resent")))
}

/// Create a reusable invitation link
pub async fn create_multiuse<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Json(input): Json<CreateMultiuseInput>,
) -> Result<impl IntoResponse> {
    let actor = load_actor(&state, &auth).await?;
    let link = state
        .invitation_service()
        .create_multiuse_link(&actor, input)
        .await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(link))))
}

pub async fn revoke_multiuse<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = load_actor(&state, &auth).await?;
    state
        .invitation_service()
        .revoke_multiuse(&actor, MultiuseInviteId::from(id))
        .await?;
    Ok(Json(MessageResponse::new("Invitation link revoked")))
}
