//! Account, session, notification and media endpoints.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::prelude::*;
use serde::Deserialize;
use serde_json::json;

use super::{check_page, parse_json_body, require_user, SessionParams, PER_PAGE};
use crate::auth;
use crate::error::{ApiError, ApiResult};
use crate::models::{unix_now, User};
use crate::state::AppState;
use shared::{NotificationCode, Winner};

const MAX_AVATAR_BYTES: usize = 1 << 20;

fn validate_username(username: &str) -> ApiResult<()> {
    if username.is_empty() {
        return Err(ApiError::UsernameMissing);
    }
    if username.len() > 32 || username.chars().any(char::is_control) {
        return Err(ApiError::UsernameInvalid);
    }
    Ok(())
}

async fn validate_password(state: &AppState, password: &str) -> ApiResult<()> {
    if password.len() < 10 {
        return Err(ApiError::PasswordTooShort);
    }
    if password.len() > 32 {
        return Err(ApiError::PasswordTooLong);
    }
    let unique: std::collections::HashSet<char> = password.chars().collect();
    if unique.len() < 6 {
        return Err(ApiError::PasswordTooFewUnique);
    }
    if state.hibp.is_breached(password).await? {
        return Err(ApiError::PasswordBreached);
    }
    Ok(())
}

fn validate_email(email: &str) -> ApiResult<()> {
    if email.len() > 255 {
        return Err(ApiError::EmailTooLong);
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::EmailInvalid),
    }
}

/// Sniff the image format from magic bytes; only the four supported
/// formats pass.
fn detect_image(data: &[u8]) -> ApiResult<&'static str> {
    if data.len() > MAX_AVATAR_BYTES {
        return Err(ApiError::ImageTooLarge);
    }
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Ok("png")
    } else if data.starts_with(b"\xff\xd8\xff") {
        Ok("jpeg")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Ok("gif")
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Ok("webp")
    } else {
        Err(ApiError::BadImageFormat)
    }
}

#[derive(Deserialize)]
pub struct LoginPayload {
    username: Option<String>,
    password: Option<String>,
    /// 32 client-generated bytes, base64.
    token: Option<String>,
}

pub async fn login(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<serde_json::Value>> {
    let payload: LoginPayload = state.envelope.decrypt_json(&body)?;
    let username = payload.username.ok_or(ApiError::ValueRequired)?;
    let password = payload.password.ok_or(ApiError::ValueRequired)?;
    let token = BASE64_STANDARD
        .decode(payload.token.ok_or(ApiError::ValueRequired)?)
        .map_err(|_| ApiError::InvalidBase64)?;

    let user = state
        .store
        .user_by_username(&username)
        .await?
        .ok_or(ApiError::AccountNotFound)?;
    if !auth::verify_password(&password, &user.password_hash) {
        return Err(ApiError::WrongCredentials);
    }
    let session = auth::create_session(
        &state.store,
        user.id,
        &token,
        state.config.session_max_age_days,
    )
    .await?;
    tracing::info!(user_id = user.id, session_id = session.id, "login");
    Ok(Json(json!({ "session_id": session.id })))
}

pub async fn logout(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
) -> ApiResult<StatusCode> {
    let (session, _user) = require_user(&state.store, &params).await?;
    state.store.delete_session(session.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct CreatePayload {
    username: Option<String>,
    password: Option<String>,
    email: Option<String>,
}

pub async fn create_account(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let payload: CreatePayload = state.envelope.decrypt_json(&body)?;
    let username = payload.username.ok_or(ApiError::ValueRequired)?;
    let password = payload.password.ok_or(ApiError::ValueRequired)?;
    let email = payload.email.ok_or(ApiError::ValueRequired)?;

    validate_username(&username)?;
    validate_password(&state, &password).await?;
    validate_email(&email)?;

    let token = auth::generate_verification_token();
    let password_hash = auth::hash_password(&password)?;
    let user_id = state
        .store
        .create_user(&username, &password_hash, &email, &token, unix_now())
        .await?;
    state.mailer.send_verification(&email, &token);
    state
        .notifier
        .send(user_id, NotificationCode::AccountsWelcome, None)
        .await?;
    tracing::info!(user_id, %username, "account created");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resend_verification_email(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
) -> ApiResult<StatusCode> {
    let (_, user) = require_user(&state.store, &params).await?;
    let token = user
        .email_verify_token
        .as_deref()
        .ok_or(ApiError::AlreadyVerified)?;
    state.mailer.send_verification(&user.email, token);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct VerifyParams {
    username: Option<String>,
    token: Option<String>,
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> ApiResult<StatusCode> {
    let username = params.username.ok_or(ApiError::ValueRequired)?;
    let token = params.token.ok_or(ApiError::ValueRequired)?;
    let user = state
        .store
        .user_by_username(&username)
        .await?
        .ok_or(ApiError::AccountNotFound)?;
    match user.email_verify_token.as_deref() {
        Some(expected) if expected == token => {
            state.store.mark_email_verified(user.id).await?;
            Ok(StatusCode::NO_CONTENT)
        }
        _ => Err(ApiError::WrongVerificationToken),
    }
}

#[derive(Deserialize)]
pub struct UpdatePayload {
    session_id: Option<i64>,
    session_token: Option<String>,
    password: Option<String>,
    email: Option<String>,
    /// Base64 image data, at most 1 MiB decoded.
    avatar: Option<String>,
}

pub async fn update_account(State(state): State<AppState>, body: Bytes) -> ApiResult<StatusCode> {
    let payload: UpdatePayload = state.envelope.decrypt_json(&body)?;
    let params = SessionParams {
        session_id: payload.session_id,
        session_token: payload.session_token,
    };
    let (_, user) = require_user(&state.store, &params).await?;

    if let Some(password) = &payload.password {
        validate_password(&state, password).await?;
        let hash = auth::hash_password(password)?;
        // Note: this also signs out every session, including this one.
        state.store.update_password(user.id, &hash).await?;
    }
    if let Some(email) = &payload.email {
        validate_email(email)?;
        let token = auth::generate_verification_token();
        state.store.update_email(user.id, email, &token).await?;
        state.mailer.send_verification(email, &token);
    }
    if let Some(avatar_b64) = &payload.avatar {
        let data = BASE64_STANDARD
            .decode(avatar_b64)
            .map_err(|_| ApiError::InvalidBase64)?;
        let extension = detect_image(&data)?;
        state.store.set_avatar(user.id, &data, extension).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_account(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
) -> ApiResult<StatusCode> {
    let (_, user) = require_user(&state.store, &params).await?;
    let now = unix_now();

    // Open searches drop out of the pending index, then out of the store.
    let (searches, _) = state.store.searches_for(user.id, -1, 0).await?;
    for game in &searches {
        state.matchmaker.forget(game.time_control(), game.id).await;
    }
    state.store.delete_pending_games_for(user.id).await?;

    // Started games are forfeited to the opponent.
    let (ongoing, _) = state.store.ongoing_for(user.id, -1, 0).await?;
    for mut game in ongoing {
        game.winner = match game.side_of(user.id) {
            Some(chess_rules::Side::Host) => Winner::Away,
            _ => Winner::Host,
        };
        game.conclusion = shared::Conclusion::Resignation;
        game.ended_at = Some(now);
        state.store.save_game(&game).await?;
    }

    state.store.delete_sessions_for_user(user.id).await?;
    state.store.delete_user(user.id).await?;
    tracing::info!(user_id = user.id, "account deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_own_account(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
) -> ApiResult<Json<shared::WireUser>> {
    let (_, user) = require_user(&state.store, &params).await?;
    Ok(Json(user.to_wire(false)))
}

#[derive(Deserialize)]
pub struct IdParam {
    id: Option<i64>,
}

pub async fn get_account_by_id(
    State(state): State<AppState>,
    Query(params): Query<IdParam>,
) -> ApiResult<Json<shared::WireUser>> {
    let id = params.id.ok_or(ApiError::ValueRequired)?;
    let user = state
        .store
        .user_by_id(id)
        .await?
        .ok_or(ApiError::AccountNotFound)?;
    Ok(Json(user.to_wire(true)))
}

pub async fn get_account_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<shared::WireUser>> {
    let user = state
        .store
        .user_by_username(&username)
        .await?
        .ok_or(ApiError::AccountNotFound)?;
    Ok(Json(user.to_wire(true)))
}

#[derive(Deserialize)]
pub struct PageParams {
    #[serde(default)]
    page: i64,
}

pub async fn list_accounts(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let total = state.store.count_users().await?;
    let pages = check_page(total, params.page)?;
    let users = state
        .store
        .users_by_elo(PER_PAGE, params.page * PER_PAGE)
        .await?;
    Ok(Json(json!({
        "users": users.iter().map(|user: &User| user.to_wire(true)).collect::<Vec<_>>(),
        "pages": pages,
    })))
}

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

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(params): Query<AuthPageParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let (_, user) = require_user(&state.store, &params.session()).await?;
    let (notifications, total) = state
        .store
        .notifications_for(user.id, PER_PAGE, params.page * PER_PAGE)
        .await?;
    let pages = check_page(total, params.page)?;
    let unread = state.notifier.unread_count(user.id).await?;
    let wire: ApiResult<Vec<shared::WireNotification>> = notifications
        .iter()
        .map(|notification| notification.to_wire())
        .collect();
    Ok(Json(json!({
        "notifications": wire?,
        "unread_count": unread,
        "pages": pages,
    })))
}

pub async fn unread_notification_count(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let (_, user) = require_user(&state.store, &params).await?;
    let count = state.notifier.unread_count(user.id).await?;
    Ok(Json(json!({ "count": count })))
}

#[derive(Deserialize)]
pub struct AckPayload {
    session_id: Option<i64>,
    session_token: Option<String>,
    notification: Option<i64>,
}

pub async fn acknowledge_notification(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let payload: AckPayload = parse_json_body(&body)?;
    let params = SessionParams {
        session_id: payload.session_id,
        session_token: payload.session_token,
    };
    let (_, user) = require_user(&state.store, &params).await?;
    let notification_id = payload.notification.ok_or(ApiError::ValueRequired)?;
    state.notifier.ack(user.id, notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Serve `/media/avatar/<user>-<number>.<ext>`.
pub async fn get_avatar(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let (user_id, avatar_number, extension) =
        parse_avatar_name(&name).ok_or(ApiError::MediaNotFound)?;
    let data = state
        .store
        .avatar(user_id, avatar_number, extension)
        .await?
        .ok_or(ApiError::MediaNotFound)?;
    let content_type = format!("image/{extension}");
    Ok((
        [
            ("content-type", content_type),
            // Avatar names are versioned, so they can be cached hard.
            ("cache-control", "public, max-age=31536000".to_string()),
        ],
        data,
    )
        .into_response())
}

fn parse_avatar_name(name: &str) -> Option<(i64, i64, &'static str)> {
    let (stem, extension) = name.rsplit_once('.')?;
    let extension = match extension {
        "gif" => "gif",
        "jpeg" => "jpeg",
        "png" => "png",
        "webp" => "webp",
        _ => return None,
    };
    let (user, number) = stem.split_once('-')?;
    Some((user.parse().ok()?, number.parse().ok()?, extension))
}
