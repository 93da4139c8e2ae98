//! The HTTP surface.
//!
//! Thin by design: handlers authenticate, validate and convert, then call
//! into the matchmaker, stores and notifier. Authenticated requests carry
//! `session_id` + `session_token` (query parameters on GET/DELETE, body
//! fields on POST/PATCH); encrypted endpoints take an RSA envelope body.

mod accounts;
mod games;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::db::Store;
use crate::error::{ApiError, ApiResult};
use crate::models::{Game, Session, User};
use crate::state::AppState;
use crate::{auth, ws};

pub const PER_PAGE: i64 = 100;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rsa_key", get(rsa_key))
        .route("/accounts/login", post(accounts::login))
        .route("/accounts/logout", get(accounts::logout))
        .route("/accounts/create", post(accounts::create_account))
        .route(
            "/accounts/resend_verification_email",
            get(accounts::resend_verification_email),
        )
        .route("/accounts/verify_email", get(accounts::verify_email))
        .route(
            "/accounts/me",
            get(accounts::get_own_account)
                .patch(accounts::update_account)
                .delete(accounts::delete_account),
        )
        .route("/accounts/account", get(accounts::get_account_by_id))
        .route("/accounts/accounts", get(accounts::list_accounts))
        .route("/users/:username", get(accounts::get_account_by_username))
        .route(
            "/accounts/notifications",
            get(accounts::list_notifications),
        )
        .route(
            "/accounts/notifications/unread_count",
            get(accounts::unread_notification_count),
        )
        .route(
            "/accounts/notifications/ack",
            post(accounts::acknowledge_notification),
        )
        .route("/media/avatar/:name", get(accounts::get_avatar))
        .route("/games/invites", get(games::list_invites))
        .route("/games/searches", get(games::list_searches))
        .route("/games/ongoing", get(games::list_ongoing))
        .route("/games/completed", get(games::list_completed))
        .route("/games/common_completed", get(games::list_common_completed))
        .route("/games/find", post(games::find_game))
        .route("/games/send_invitation", post(games::send_invitation))
        .route(
            "/games/invites/:game",
            post(games::accept_invitation).delete(games::decline_invitation),
        )
        .route("/games/:game", get(games::get_game))
        .route("/socket", get(ws::socket_handler))
        .fallback(unknown_url)
        .with_state(state)
}

async fn rsa_key(State(state): State<AppState>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; charset=utf-8")],
        state.envelope.public_key_pem().to_string(),
    )
}

async fn unknown_url() -> ApiError {
    ApiError::UnknownUrl
}

/// Session credentials as they appear in query strings and JSON bodies.
#[derive(Debug, Default, Deserialize)]
pub struct SessionParams {
    pub session_id: Option<i64>,
    pub session_token: Option<String>,
}

/// Authenticate a request, requiring both halves of the session key.
pub async fn require_user(store: &Store, params: &SessionParams) -> ApiResult<(Session, User)> {
    match (params.session_id, params.session_token.as_deref()) {
        (Some(id), Some(token)) => auth::validate_session_key(store, id, token).await,
        (None, None) => Err(ApiError::AuthenticationRequired),
        _ => Err(ApiError::IncompleteSessionKey),
    }
}

pub fn require_verified(user: &User) -> ApiResult<()> {
    if user.email_verified() {
        Ok(())
    } else {
        Err(ApiError::EmailVerificationRequired)
    }
}

/// Page-count arithmetic shared by every [P] endpoint: page size 100,
/// 0-indexed, out-of-range pages rejected (page 0 of an empty set is
/// allowed).
pub fn page_count(total: i64) -> i64 {
    (total + PER_PAGE - 1) / PER_PAGE
}

pub fn check_page(total: i64, page: i64) -> ApiResult<i64> {
    let pages = page_count(total);
    if page < 0 || (pages > 0 && page >= pages) {
        return Err(ApiError::PageOutOfRange);
    }
    Ok(pages)
}

/// Parse an unencrypted JSON body with taxonomy errors rather than the
/// framework's.
pub fn parse_json_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    if serde_json::from_slice::<serde_json::Value>(body).is_err() {
        return Err(ApiError::InvalidJson);
    }
    serde_json::from_slice(body).map_err(|_| ApiError::WrongParameters)
}

/// Build the "referenced" games response: games with user ids, plus a
/// parallel `users` array naming each referenced user exactly once.
pub async fn referenced_games_response(
    store: &Store,
    games: &[Game],
    pages: i64,
) -> ApiResult<serde_json::Value> {
    let mut ids: Vec<i64> = Vec::new();
    for game in games {
        for id in [Some(game.host_id), game.away_id, game.invited_id]
            .into_iter()
            .flatten()
        {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    let users = store.users_by_ids(&ids).await?;
    let games: Vec<shared::ReferencedGame> =
        games.iter().map(|game| game.to_wire(Some)).collect();
    Ok(serde_json::json!({
        "games": games,
        "users": users.iter().map(|user| user.to_wire(true)).collect::<Vec<_>>(),
        "pages": pages,
    }))
}
