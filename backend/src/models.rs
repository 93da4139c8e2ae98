//! Domain models and their database row forms.

use std::collections::BTreeMap;

use chess_rules::{Piece, PieceKind, Position, Side};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::{side_code, side_from_code, Conclusion, Mode, WireGame, WireUser, Winner};

use crate::error::ApiError;

/// Current time as whole Unix seconds, the clock granularity everywhere.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    /// Pending verification token; `None` means the email is verified.
    pub email_verify_token: Option<String>,
    pub elo: i64,
    pub avatar_number: i64,
    pub avatar_extension: Option<String>,
    pub created_at: i64,
}

impl User {
    pub fn email_verified(&self) -> bool {
        self.email_verify_token.is_none()
    }

    /// File name the current avatar is served under, if one is set.
    pub fn avatar_name(&self) -> Option<String> {
        self.avatar_extension
            .as_ref()
            .map(|ext| format!("{}-{}.{}", self.id, self.avatar_number, ext))
    }

    pub fn to_wire(&self, hide_email: bool) -> WireUser {
        WireUser {
            id: self.id,
            username: self.username.clone(),
            elo: self.elo,
            avatar_url: self
                .avatar_name()
                .map(|name| format!("/media/avatar/{name}")),
            created_at: self.created_at,
            email: if hide_email {
                None
            } else {
                Some(self.email.clone())
            },
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Session {
    pub fn expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// The time-control profile used by the matchmaker for pairing. Two
/// profiles match only if every field is equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeControl {
    pub main_thinking_time: i64,
    pub fixed_extra_time: i64,
    pub time_increment_per_turn: i64,
    pub mode: Mode,
}

#[derive(Debug, Clone)]
pub struct Game {
    pub id: i64,
    pub mode: Mode,
    pub host_id: i64,
    pub away_id: Option<i64>,
    pub invited_id: Option<i64>,
    pub current_turn: Side,
    /// 0-indexed; the host moves on even turns.
    pub turn_number: i32,
    pub main_thinking_time: i64,
    pub fixed_extra_time: i64,
    pub time_increment_per_turn: i64,
    pub host_time: i64,
    pub away_time: i64,
    pub host_offering_draw: bool,
    pub away_offering_draw: bool,
    /// Standing claimable draw for the player on move, refreshed per move.
    pub other_valid_draw_claim: Option<Conclusion>,
    /// Half-moves since the last pawn move or capture.
    pub halfmove_clock: i32,
    pub winner: Winner,
    pub conclusion: Conclusion,
    pub position: Position,
    /// Fingerprint of every position reached, oldest first; index 0 is the
    /// initial position.
    pub position_history: Vec<u128>,
    pub opened_at: i64,
    pub started_at: Option<i64>,
    pub last_turn: Option<i64>,
    pub ended_at: Option<i64>,
}

impl Game {
    pub fn is_started(&self) -> bool {
        self.away_id.is_some() && self.started_at.is_some()
    }

    pub fn in_progress(&self) -> bool {
        self.is_started() && self.ended_at.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Which side a user plays, if they are a participant.
    pub fn side_of(&self, user_id: i64) -> Option<Side> {
        if self.host_id == user_id {
            Some(Side::Host)
        } else if self.away_id == Some(user_id) {
            Some(Side::Away)
        } else {
            None
        }
    }

    pub fn user_of(&self, side: Side) -> Option<i64> {
        match side {
            Side::Host => Some(self.host_id),
            Side::Away => self.away_id,
        }
    }

    pub fn time_of(&self, side: Side) -> i64 {
        match side {
            Side::Host => self.host_time,
            Side::Away => self.away_time,
        }
    }

    pub fn set_time(&mut self, side: Side, remaining: i64) {
        match side {
            Side::Host => self.host_time = remaining,
            Side::Away => self.away_time = remaining,
        }
    }

    pub fn offering_draw(&self, side: Side) -> bool {
        match side {
            Side::Host => self.host_offering_draw,
            Side::Away => self.away_offering_draw,
        }
    }

    pub fn set_offering_draw(&mut self, side: Side, offering: bool) {
        match side {
            Side::Host => self.host_offering_draw = offering,
            Side::Away => self.away_offering_draw = offering,
        }
    }

    pub fn time_control(&self) -> TimeControl {
        TimeControl {
            main_thinking_time: self.main_thinking_time,
            fixed_extra_time: self.fixed_extra_time,
            time_increment_per_turn: self.time_increment_per_turn,
            mode: self.mode,
        }
    }

    /// Wire form with participants rendered by `render` (user id for the
    /// referenced flavour, embedded user for the included flavour).
    pub fn to_wire<U>(&self, render: impl Fn(i64) -> Option<U>) -> WireGame<U> {
        WireGame {
            id: self.id,
            mode: self.mode,
            host: render(self.host_id),
            away: self.away_id.and_then(&render),
            invited: self.invited_id.and_then(&render),
            current_turn: side_code(self.current_turn),
            turn_number: self.turn_number,
            main_thinking_time: self.main_thinking_time,
            fixed_extra_time: self.fixed_extra_time,
            time_increment_per_turn: self.time_increment_per_turn,
            host_time: self.host_time,
            away_time: self.away_time,
            host_offering_draw: self.host_offering_draw,
            away_offering_draw: self.away_offering_draw,
            winner: self.winner,
            conclusion_type: self.conclusion,
            opened_at: self.opened_at,
            started_at: self.started_at,
            last_turn: self.last_turn,
            ended_at: self.ended_at,
        }
    }
}

/// Raw games row; positions and history are JSON text columns.
#[derive(Debug, sqlx::FromRow)]
pub struct GameRow {
    pub id: i64,
    pub mode: i64,
    pub host_id: i64,
    pub away_id: Option<i64>,
    pub invited_id: Option<i64>,
    pub current_turn: i64,
    pub turn_number: i64,
    pub main_thinking_time: i64,
    pub fixed_extra_time: i64,
    pub time_increment_per_turn: i64,
    pub host_time: i64,
    pub away_time: i64,
    pub host_offering_draw: bool,
    pub away_offering_draw: bool,
    pub other_valid_draw_claim: Option<i64>,
    pub halfmove_clock: i64,
    pub winner: i64,
    pub conclusion_type: i64,
    pub board_state: String,
    pub position_history: String,
    pub opened_at: i64,
    pub started_at: Option<i64>,
    pub last_turn: Option<i64>,
    pub ended_at: Option<i64>,
}

impl TryFrom<GameRow> for Game {
    type Error = ApiError;

    fn try_from(row: GameRow) -> Result<Game, ApiError> {
        let corrupt = |what: &str| ApiError::Internal(format!("corrupt game row: {what}"));
        Ok(Game {
            id: row.id,
            mode: Mode::try_from(row.mode as u8).map_err(|_| corrupt("mode"))?,
            host_id: row.host_id,
            away_id: row.away_id,
            invited_id: row.invited_id,
            current_turn: side_from_code(row.current_turn as u8)
                .ok_or_else(|| corrupt("current_turn"))?,
            turn_number: row.turn_number as i32,
            main_thinking_time: row.main_thinking_time,
            fixed_extra_time: row.fixed_extra_time,
            time_increment_per_turn: row.time_increment_per_turn,
            host_time: row.host_time,
            away_time: row.away_time,
            host_offering_draw: row.host_offering_draw,
            away_offering_draw: row.away_offering_draw,
            other_valid_draw_claim: row
                .other_valid_draw_claim
                .map(|value| Conclusion::try_from(value as u8))
                .transpose()
                .map_err(|_| corrupt("other_valid_draw_claim"))?,
            halfmove_clock: row.halfmove_clock as i32,
            winner: Winner::try_from(row.winner as u8).map_err(|_| corrupt("winner"))?,
            conclusion: Conclusion::try_from(row.conclusion_type as u8)
                .map_err(|_| corrupt("conclusion_type"))?,
            position: decode_position(&row.board_state)?,
            position_history: decode_history(&row.position_history)?,
            opened_at: row.opened_at,
            started_at: row.started_at,
            last_turn: row.last_turn,
            ended_at: row.ended_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub sent_at: i64,
    pub type_code: String,
    pub game_id: Option<i64>,
    pub read: bool,
}

impl Notification {
    pub fn to_wire(&self) -> Result<shared::WireNotification, ApiError> {
        let type_code = shared::NotificationCode::from_str(&self.type_code)
            .ok_or_else(|| ApiError::Internal(format!("unknown type code {}", self.type_code)))?;
        Ok(shared::WireNotification {
            id: self.id,
            sent_at: self.sent_at,
            type_code,
            game_id: self.game_id,
            read: self.read,
        })
    }
}

/// Persisted form of a [`Position`]: the sparse board map plus the state
/// the board alone cannot carry.
#[derive(Serialize, Deserialize)]
struct PositionRecord {
    board: BTreeMap<String, (u8, u8)>,
    castling: [bool; 4],
    en_passant: Option<(i8, i8)>,
}

pub fn encode_position(position: &Position) -> String {
    let record = PositionRecord {
        board: shared::board_to_wire(position),
        castling: [
            position.castling.host_kingside,
            position.castling.host_queenside,
            position.castling.away_kingside,
            position.castling.away_queenside,
        ],
        en_passant: position.en_passant,
    };
    serde_json::to_string(&record).expect("position record serialises")
}

pub fn decode_position(raw: &str) -> Result<Position, ApiError> {
    let corrupt = |what: String| ApiError::Internal(format!("corrupt board state: {what}"));
    let record: PositionRecord =
        serde_json::from_str(raw).map_err(|err| corrupt(err.to_string()))?;
    let mut position = Position::empty();
    for (square, (kind_code, side)) in record.board {
        let (rank, file) = square
            .split_once(',')
            .and_then(|(rank, file)| Some((rank.parse::<i8>().ok()?, file.parse::<i8>().ok()?)))
            .filter(|&(rank, file)| chess_rules::types::on_board(rank, file))
            .ok_or_else(|| corrupt(format!("square {square}")))?;
        let kind = PieceKind::from_code(kind_code)
            .ok_or_else(|| corrupt(format!("piece kind {kind_code}")))?;
        let side = side_from_code(side).ok_or_else(|| corrupt(format!("side {side}")))?;
        position.set(rank, file, Some(Piece::new(kind, side)));
    }
    position.castling.host_kingside = record.castling[0];
    position.castling.host_queenside = record.castling[1];
    position.castling.away_kingside = record.castling[2];
    position.castling.away_queenside = record.castling[3];
    position.en_passant = record.en_passant;
    Ok(position)
}

pub fn encode_history(history: &[u128]) -> String {
    let hex: Vec<String> = history.iter().map(|fp| format!("{fp:032x}")).collect();
    serde_json::to_string(&hex).expect("history serialises")
}

pub fn decode_history(raw: &str) -> Result<Vec<u128>, ApiError> {
    let hex: Vec<String> = serde_json::from_str(raw)
        .map_err(|err| ApiError::Internal(format!("corrupt position history: {err}")))?;
    hex.iter()
        .map(|entry| {
            u128::from_str_radix(entry, 16)
                .map_err(|err| ApiError::Internal(format!("corrupt fingerprint: {err}")))
        })
        .collect()
}
