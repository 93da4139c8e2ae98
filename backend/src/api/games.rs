//! Game discovery, matchmaking and invitation endpoints.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::{
    check_page, parse_json_body, referenced_games_response, require_user, require_verified,
    SessionParams, PER_PAGE,
};
use crate::error::{ApiError, ApiResult};
use crate::hub::HubCommand;
use crate::matchmaker::validate_profile;
use crate::models::{unix_now, TimeControl};
use crate::state::AppState;
use shared::{IncludedGame, Mode, NotificationCode};

#[derive(Deserialize)]
pub struct AuthPageParams {
    session_id: Option<i64>,
    session_token: Option<String>,
    #[serde(default)]
    page: i64,
}

impl AuthPageParams {
    fn session(&self) -> SessionParams {
        SessionParams {
            session_id: self.session_id,
            session_token: self.session_token.clone(),
        }
    }
}

pub async fn list_invites(
    State(state): State<AppState>,
    Query(params): Query<AuthPageParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let (_, user) = require_user(&state.store, &params.session()).await?;
    let (games, total) = state
        .store
        .invites_for(user.id, PER_PAGE, params.page * PER_PAGE)
        .await?;
    let pages = check_page(total, params.page)?;
    Ok(Json(
        referenced_games_response(&state.store, &games, pages).await?,
    ))
}

pub async fn list_searches(
    State(state): State<AppState>,
    Query(params): Query<AuthPageParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let (_, user) = require_user(&state.store, &params.session()).await?;
    let (games, total) = state
        .store
        .searches_for(user.id, PER_PAGE, params.page * PER_PAGE)
        .await?;
    let pages = check_page(total, params.page)?;
    Ok(Json(
        referenced_games_response(&state.store, &games, pages).await?,
    ))
}

pub async fn list_ongoing(
    State(state): State<AppState>,
    Query(params): Query<AuthPageParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let (_, user) = require_user(&state.store, &params.session()).await?;
    let (games, total) = state
        .store
        .ongoing_for(user.id, PER_PAGE, params.page * PER_PAGE)
        .await?;
    let pages = check_page(total, params.page)?;
    Ok(Json(
        referenced_games_response(&state.store, &games, pages).await?,
    ))
}

#[derive(Deserialize)]
pub struct CompletedParams {
    account: Option<i64>,
    #[serde(default)]
    page: i64,
}

pub async fn list_completed(
    State(state): State<AppState>,
    Query(params): Query<CompletedParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let account = params.account.ok_or(ApiError::ValueRequired)?;
    // The account must exist even if it has no games.
    state
        .store
        .user_by_id(account)
        .await?
        .ok_or(ApiError::AccountNotFound)?;
    let (games, total) = state
        .store
        .completed_for(account, PER_PAGE, params.page * PER_PAGE)
        .await?;
    let pages = check_page(total, params.page)?;
    Ok(Json(
        referenced_games_response(&state.store, &games, pages).await?,
    ))
}

#[derive(Deserialize)]
pub struct CommonCompletedParams {
    session_id: Option<i64>,
    session_token: Option<String>,
    account: Option<i64>,
    #[serde(default)]
    page: i64,
}

pub async fn list_common_completed(
    State(state): State<AppState>,
    Query(params): Query<CommonCompletedParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let session = SessionParams {
        session_id: params.session_id,
        session_token: params.session_token.clone(),
    };
    let (_, user) = require_user(&state.store, &session).await?;
    let account = params.account.ok_or(ApiError::ValueRequired)?;
    let (games, total) = state
        .store
        .common_completed(user.id, account, PER_PAGE, params.page * PER_PAGE)
        .await?;
    let pages = check_page(total, params.page)?;
    Ok(Json(
        referenced_games_response(&state.store, &games, pages).await?,
    ))
}

/// `GET /games/<id>` — the "included" flavour with embedded users.
pub async fn get_game(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
) -> ApiResult<Json<IncludedGame>> {
    let game = state
        .store
        .game(game_id)
        .await?
        .ok_or(ApiError::GameNotFound)?;
    let ids: Vec<i64> = [Some(game.host_id), game.away_id, game.invited_id]
        .into_iter()
        .flatten()
        .collect();
    let users: HashMap<i64, shared::WireUser> = state
        .store
        .users_by_ids(&ids)
        .await?
        .into_iter()
        .map(|user| (user.id, user.to_wire(true)))
        .collect();
    Ok(Json(game.to_wire(|id| users.get(&id).cloned())))
}

#[derive(Deserialize)]
pub struct FindPayload {
    session_id: Option<i64>,
    session_token: Option<String>,
    main_thinking_time: Option<i64>,
    fixed_extra_time: Option<i64>,
    time_increment_per_turn: Option<i64>,
    mode: Option<u8>,
}

impl FindPayload {
    fn profile(&self) -> ApiResult<TimeControl> {
        let profile = TimeControl {
            main_thinking_time: self.main_thinking_time.ok_or(ApiError::ValueRequired)?,
            fixed_extra_time: self.fixed_extra_time.ok_or(ApiError::ValueRequired)?,
            time_increment_per_turn: self
                .time_increment_per_turn
                .ok_or(ApiError::ValueRequired)?,
            mode: Mode::try_from(self.mode.ok_or(ApiError::ValueRequired)?)
                .map_err(|_| ApiError::InvalidEnumValue)?,
        };
        validate_profile(&profile)?;
        Ok(profile)
    }
}

pub async fn find_game(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<serde_json::Value>> {
    let payload: FindPayload = state.envelope.decrypt_json(&body)?;
    let session = SessionParams {
        session_id: payload.session_id,
        session_token: payload.session_token.clone(),
    };
    let (_, user) = require_user(&state.store, &session).await?;
    require_verified(&user)?;
    let profile = payload.profile()?;

    let outcome = state.matchmaker.find(&user, profile, unix_now()).await?;
    if outcome.started {
        state
            .notifier
            .send(
                outcome.game.host_id,
                NotificationCode::MatchFound,
                Some(outcome.game.id),
            )
            .await?;
        // If the host is already sitting on the hub, tell both sides.
        if let Some(hub) = state.hubs.existing(outcome.game.id).await {
            let _ = hub.send(HubCommand::GameStarted).await;
        }
    }
    Ok(Json(json!({ "game_id": outcome.game.id })))
}

#[derive(Deserialize)]
pub struct InvitePayload {
    session_id: Option<i64>,
    session_token: Option<String>,
    invitee: Option<String>,
    main_thinking_time: Option<i64>,
    fixed_extra_time: Option<i64>,
    time_increment_per_turn: Option<i64>,
    mode: Option<u8>,
}

pub async fn send_invitation(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let payload: InvitePayload = state.envelope.decrypt_json(&body)?;
    let session = SessionParams {
        session_id: payload.session_id,
        session_token: payload.session_token.clone(),
    };
    let (_, user) = require_user(&state.store, &session).await?;
    require_verified(&user)?;

    let profile = FindPayload {
        session_id: None,
        session_token: None,
        main_thinking_time: payload.main_thinking_time,
        fixed_extra_time: payload.fixed_extra_time,
        time_increment_per_turn: payload.time_increment_per_turn,
        mode: payload.mode,
    }
    .profile()?;
    let invitee_name = payload.invitee.ok_or(ApiError::ValueRequired)?;
    let invitee = state
        .store
        .user_by_username(&invitee_name)
        .await?
        .ok_or(ApiError::AccountNotFound)?;

    let game = state
        .matchmaker
        .send_invitation(&user, &invitee, profile, unix_now())
        .await?;
    state
        .notifier
        .send(invitee.id, NotificationCode::InviteReceived, Some(game.id))
        .await?;
    Ok(Json(json!({ "game_id": game.id })))
}

#[derive(Deserialize)]
pub struct AcceptPayload {
    session_id: Option<i64>,
    session_token: Option<String>,
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let payload: AcceptPayload = parse_json_body(&body)?;
    let session = SessionParams {
        session_id: payload.session_id,
        session_token: payload.session_token,
    };
    let (_, user) = require_user(&state.store, &session).await?;
    require_verified(&user)?;

    let game = state
        .matchmaker
        .accept_invitation(user.id, game_id, unix_now())
        .await?;
    state
        .notifier
        .send(game.host_id, NotificationCode::InviteAccepted, Some(game.id))
        .await?;
    if let Some(hub) = state.hubs.existing(game.id).await {
        let _ = hub.send(HubCommand::GameStarted).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn decline_invitation(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
    Query(params): Query<SessionParams>,
) -> ApiResult<StatusCode> {
    let (_, user) = require_user(&state.store, &params).await?;
    let game = state
        .matchmaker
        .decline_invitation(user.id, game_id)
        .await?;
    // Kick the waiting host off the hub, if they were connected.
    if let Some(hub) = state.hubs.existing(game.id).await {
        let _ = hub.send(HubCommand::InviteDeclined).await;
    }
    // The game row is gone, so the notification carries no game link.
    state
        .notifier
        .send(game.host_id, NotificationCode::InviteDeclined, None)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
