//! The request error taxonomy.
//!
//! Every client-visible failure is a 4-digit code grouped by family: 1000
//! accounts, 2000 games, 3000 malformed requests, 4000 internal, 5000
//! media. Codes ending in 0 are sub-group labels and never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("account not found")]
    AccountNotFound,
    #[error("username must be at most 32 printable characters")]
    UsernameInvalid,
    #[error("a username is required")]
    UsernameMissing,
    #[error("that username is taken")]
    UsernameTaken,
    #[error("password must be at least 10 characters")]
    PasswordTooShort,
    #[error("password must be at most 32 characters")]
    PasswordTooLong,
    #[error("password must contain at least 6 unique characters")]
    PasswordTooFewUnique,
    #[error("password found in a known data breach")]
    PasswordBreached,
    #[error("email address is not valid")]
    EmailInvalid,
    #[error("email address must be at most 255 characters")]
    EmailTooLong,
    #[error("that email address is in use")]
    EmailTaken,
    #[error("email address is already verified")]
    AlreadyVerified,
    #[error("incorrect verification token")]
    WrongVerificationToken,
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("incorrect username or password")]
    WrongCredentials,
    #[error("session id and session token must be given together")]
    IncompleteSessionKey,
    #[error("session not found")]
    SessionNotFound,
    #[error("session has expired")]
    SessionExpired,
    #[error("incorrect session token")]
    WrongSessionToken,
    #[error("a verified email address is required")]
    EmailVerificationRequired,
    #[error("session token must be 32 bytes")]
    BadSessionTokenLength,
    #[error("notification not found")]
    NotificationNotFound,
    #[error("game not found")]
    GameNotFound,
    #[error("you have not been invited to this game")]
    NotInvited,
    #[error("you cannot invite yourself")]
    CannotInviteSelf,
    #[error("you are not a participant in this game")]
    NotAParticipant,
    #[error("this game has already ended")]
    GameAlreadyEnded,
    #[error("game is not in progress")]
    NotInProgress,
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("that move is not allowed")]
    InvalidMove,
    #[error("the player on move has not run out of time")]
    NotTimedOut,
    #[error("that is not a reason to claim a draw")]
    NotADrawReason,
    #[error("that draw claim is not currently available")]
    DrawNotAvailable,
    #[error("a required value is missing")]
    ValueRequired,
    #[error("incorrect parameters for this endpoint")]
    WrongParameters,
    #[error("could not decrypt request body")]
    BadEncryptedData,
    #[error("expected an integer")]
    InvalidInteger,
    #[error("expected base 64 encoded data")]
    InvalidBase64,
    #[error("could not parse JSON body")]
    InvalidJson,
    #[error("unknown enum value")]
    InvalidEnumValue,
    #[error("image format not supported")]
    BadImageFormat,
    #[error("image must be at most 1 MiB")]
    ImageTooLarge,
    #[error("durations must not be negative")]
    NegativeDuration,
    #[error("page out of range")]
    PageOutOfRange,
    #[error("unknown URL")]
    UnknownUrl,
    #[error("missing Authorization header")]
    MissingAuthHeader,
    #[error("Authorization header must use the SessionKey scheme")]
    BadAuthHeaderType,
    #[error("Authorization header key must be <id>|<token>")]
    BadAuthHeaderFormat,
    #[error("missing or malformed Game-ID header")]
    BadGameIdHeader,
    #[error("internal server error")]
    Internal(String),
    #[error("socket is not associated with a session")]
    SocketSessionNotKnown,
    #[error("media not found")]
    MediaNotFound,
}

impl ApiError {
    /// The wire code for this error.
    pub fn code(&self) -> u16 {
        match self {
            ApiError::AccountNotFound => 1001,
            ApiError::UsernameInvalid => 1111,
            ApiError::UsernameMissing => 1112,
            ApiError::UsernameTaken => 1113,
            ApiError::PasswordTooShort => 1121,
            ApiError::PasswordTooLong => 1122,
            ApiError::PasswordTooFewUnique => 1123,
            ApiError::PasswordBreached => 1124,
            ApiError::EmailInvalid => 1131,
            ApiError::EmailTooLong => 1132,
            ApiError::EmailTaken => 1133,
            ApiError::AlreadyVerified => 1201,
            ApiError::WrongVerificationToken => 1202,
            ApiError::AuthenticationRequired => 1301,
            ApiError::WrongCredentials => 1302,
            ApiError::IncompleteSessionKey => 1303,
            ApiError::SessionNotFound => 1304,
            ApiError::SessionExpired => 1305,
            ApiError::WrongSessionToken => 1306,
            ApiError::EmailVerificationRequired => 1307,
            ApiError::BadSessionTokenLength => 1308,
            ApiError::NotificationNotFound => 1401,
            ApiError::GameNotFound => 2001,
            ApiError::NotInvited => 2111,
            ApiError::CannotInviteSelf => 2121,
            ApiError::NotAParticipant => 2201,
            ApiError::GameAlreadyEnded => 2202,
            ApiError::NotInProgress => 2311,
            ApiError::NotYourTurn => 2312,
            ApiError::InvalidMove => 2313,
            ApiError::NotTimedOut => 2314,
            ApiError::NotADrawReason => 2321,
            ApiError::DrawNotAvailable => 2322,
            ApiError::ValueRequired => 3101,
            ApiError::WrongParameters => 3102,
            ApiError::BadEncryptedData => 3103,
            ApiError::InvalidInteger => 3111,
            ApiError::InvalidBase64 => 3112,
            ApiError::InvalidJson => 3113,
            ApiError::InvalidEnumValue => 3114,
            ApiError::BadImageFormat => 3115,
            ApiError::ImageTooLarge => 3116,
            ApiError::NegativeDuration => 3117,
            ApiError::PageOutOfRange => 3201,
            ApiError::UnknownUrl => 3301,
            ApiError::MissingAuthHeader => 3411,
            ApiError::BadAuthHeaderType => 3412,
            ApiError::BadAuthHeaderFormat => 3413,
            ApiError::BadGameIdHeader => 3421,
            ApiError::Internal(_) => 4001,
            ApiError::SocketSessionNotKnown => 4101,
            ApiError::MediaNotFound => 5001,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownUrl => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// The message shown to clients. Internal detail never leaks.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> ApiError {
        ApiError::Internal(format!("database error: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(%detail, "internal error");
        }
        let body = serde_json::json!({
            "error": self.code(),
            "message": self.public_message(),
        });
        (self.status(), Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
