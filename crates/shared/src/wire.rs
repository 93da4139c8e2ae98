//! JSON wire representations.

use std::collections::BTreeMap;

use chess_rules::{Move, PieceKind, Position, Side};
use serde::{Deserialize, Serialize};

/// Game mode. Only chess is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Mode {
    Chess,
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> u8 {
        match mode {
            Mode::Chess => 1,
        }
    }
}

impl TryFrom<u8> for Mode {
    type Error = String;

    fn try_from(value: u8) -> Result<Mode, String> {
        match value {
            1 => Ok(Mode::Chess),
            other => Err(format!("unknown game mode {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Winner {
    GameNotComplete,
    Host,
    Away,
    Draw,
}

impl From<Winner> for u8 {
    fn from(winner: Winner) -> u8 {
        match winner {
            Winner::GameNotComplete => 1,
            Winner::Host => 2,
            Winner::Away => 3,
            Winner::Draw => 4,
        }
    }
}

impl TryFrom<u8> for Winner {
    type Error = String;

    fn try_from(value: u8) -> Result<Winner, String> {
        match value {
            1 => Ok(Winner::GameNotComplete),
            2 => Ok(Winner::Host),
            3 => Ok(Winner::Away),
            4 => Ok(Winner::Draw),
            other => Err(format!("unknown winner value {other}")),
        }
    }
}

/// How a game finished. `GameNotComplete` doubles as "no conclusion yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Conclusion {
    GameNotComplete,
    Checkmate,
    Resignation,
    OutOfTime,
    Stalemate,
    ThreefoldRepetition,
    FiftyMoveRule,
    AgreedDraw,
}

impl From<Conclusion> for u8 {
    fn from(conclusion: Conclusion) -> u8 {
        match conclusion {
            Conclusion::GameNotComplete => 1,
            Conclusion::Checkmate => 2,
            Conclusion::Resignation => 3,
            Conclusion::OutOfTime => 4,
            Conclusion::Stalemate => 5,
            Conclusion::ThreefoldRepetition => 6,
            Conclusion::FiftyMoveRule => 7,
            Conclusion::AgreedDraw => 8,
        }
    }
}

impl TryFrom<u8> for Conclusion {
    type Error = String;

    fn try_from(value: u8) -> Result<Conclusion, String> {
        match value {
            1 => Ok(Conclusion::GameNotComplete),
            2 => Ok(Conclusion::Checkmate),
            3 => Ok(Conclusion::Resignation),
            4 => Ok(Conclusion::OutOfTime),
            5 => Ok(Conclusion::Stalemate),
            6 => Ok(Conclusion::ThreefoldRepetition),
            7 => Ok(Conclusion::FiftyMoveRule),
            8 => Ok(Conclusion::AgreedDraw),
            other => Err(format!("unknown conclusion value {other}")),
        }
    }
}

/// Why the server is closing a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum DisconnectReason {
    InviteDeclined,
    NewConnectionSameAccount,
    GameOver,
}

impl From<DisconnectReason> for u8 {
    fn from(reason: DisconnectReason) -> u8 {
        match reason {
            DisconnectReason::InviteDeclined => 1,
            DisconnectReason::NewConnectionSameAccount => 2,
            DisconnectReason::GameOver => 3,
        }
    }
}

impl TryFrom<u8> for DisconnectReason {
    type Error = String;

    fn try_from(value: u8) -> Result<DisconnectReason, String> {
        match value {
            1 => Ok(DisconnectReason::InviteDeclined),
            2 => Ok(DisconnectReason::NewConnectionSameAccount),
            3 => Ok(DisconnectReason::GameOver),
            other => Err(format!("unknown disconnect reason {other}")),
        }
    }
}

/// The closed set of notification type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationCode {
    #[serde(rename = "accounts.welcome")]
    AccountsWelcome,
    #[serde(rename = "matchmaking.invite_received")]
    InviteReceived,
    #[serde(rename = "matchmaking.invite_declined")]
    InviteDeclined,
    #[serde(rename = "matchmaking.invite_accepted")]
    InviteAccepted,
    #[serde(rename = "matchmaking.match_found")]
    MatchFound,
    #[serde(rename = "games.ongoing.turn")]
    OngoingTurn,
    #[serde(rename = "games.ongoing.draw_offer")]
    OngoingDrawOffer,
    #[serde(rename = "games.win.checkmate")]
    WinCheckmate,
    #[serde(rename = "games.win.resign")]
    WinResign,
    #[serde(rename = "games.win.time")]
    WinTime,
    #[serde(rename = "games.loss.checkmate")]
    LossCheckmate,
    #[serde(rename = "games.loss.resign")]
    LossResign,
    #[serde(rename = "games.loss.time")]
    LossTime,
    #[serde(rename = "games.draw.stalemate")]
    DrawStalemate,
    #[serde(rename = "games.draw.threefold_repetition")]
    DrawThreefoldRepetition,
    #[serde(rename = "games.draw.fifty_move_rule")]
    DrawFiftyMoveRule,
    #[serde(rename = "games.draw.agreed")]
    DrawAgreed,
}

impl NotificationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationCode::AccountsWelcome => "accounts.welcome",
            NotificationCode::InviteReceived => "matchmaking.invite_received",
            NotificationCode::InviteDeclined => "matchmaking.invite_declined",
            NotificationCode::InviteAccepted => "matchmaking.invite_accepted",
            NotificationCode::MatchFound => "matchmaking.match_found",
            NotificationCode::OngoingTurn => "games.ongoing.turn",
            NotificationCode::OngoingDrawOffer => "games.ongoing.draw_offer",
            NotificationCode::WinCheckmate => "games.win.checkmate",
            NotificationCode::WinResign => "games.win.resign",
            NotificationCode::WinTime => "games.win.time",
            NotificationCode::LossCheckmate => "games.loss.checkmate",
            NotificationCode::LossResign => "games.loss.resign",
            NotificationCode::LossTime => "games.loss.time",
            NotificationCode::DrawStalemate => "games.draw.stalemate",
            NotificationCode::DrawThreefoldRepetition => "games.draw.threefold_repetition",
            NotificationCode::DrawFiftyMoveRule => "games.draw.fifty_move_rule",
            NotificationCode::DrawAgreed => "games.draw.agreed",
        }
    }

    pub fn from_str(code: &str) -> Option<NotificationCode> {
        Some(match code {
            "accounts.welcome" => NotificationCode::AccountsWelcome,
            "matchmaking.invite_received" => NotificationCode::InviteReceived,
            "matchmaking.invite_declined" => NotificationCode::InviteDeclined,
            "matchmaking.invite_accepted" => NotificationCode::InviteAccepted,
            "matchmaking.match_found" => NotificationCode::MatchFound,
            "games.ongoing.turn" => NotificationCode::OngoingTurn,
            "games.ongoing.draw_offer" => NotificationCode::OngoingDrawOffer,
            "games.win.checkmate" => NotificationCode::WinCheckmate,
            "games.win.resign" => NotificationCode::WinResign,
            "games.win.time" => NotificationCode::WinTime,
            "games.loss.checkmate" => NotificationCode::LossCheckmate,
            "games.loss.resign" => NotificationCode::LossResign,
            "games.loss.time" => NotificationCode::LossTime,
            "games.draw.stalemate" => NotificationCode::DrawStalemate,
            "games.draw.threefold_repetition" => NotificationCode::DrawThreefoldRepetition,
            "games.draw.fifty_move_rule" => NotificationCode::DrawFiftyMoveRule,
            "games.draw.agreed" => NotificationCode::DrawAgreed,
            _ => return None,
        })
    }
}

/// Wire value for a board side (host = 1, away = 2).
pub fn side_code(side: Side) -> u8 {
    match side {
        Side::Host => 1,
        Side::Away => 2,
    }
}

pub fn side_from_code(code: u8) -> Option<Side> {
    match code {
        1 => Some(Side::Host),
        2 => Some(Side::Away),
        _ => None,
    }
}

/// A move in coordinate form as it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMove {
    pub start_rank: i8,
    pub start_file: i8,
    pub end_rank: i8,
    pub end_file: i8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<u8>,
}

impl WireMove {
    pub fn to_move(self) -> Option<Move> {
        let promotion = match self.promotion {
            None => None,
            Some(code) => Some(PieceKind::from_code(code)?),
        };
        Some(Move {
            start_rank: self.start_rank,
            start_file: self.start_file,
            end_rank: self.end_rank,
            end_file: self.end_file,
            promotion,
        })
    }
}

impl From<Move> for WireMove {
    fn from(mv: Move) -> WireMove {
        WireMove {
            start_rank: mv.start_rank,
            start_file: mv.start_file,
            end_rank: mv.end_rank,
            end_file: mv.end_file,
            promotion: mv.promotion.map(PieceKind::code),
        }
    }
}

/// Board as a sparse `"rank,file" -> [piece, side]` map; empty squares are
/// omitted. A BTreeMap keeps the encoding stable for tests and logs.
pub fn board_to_wire(position: &Position) -> BTreeMap<String, (u8, u8)> {
    position
        .pieces()
        .map(|(rank, file, piece)| {
            (
                format!("{rank},{file}"),
                (piece.kind.code(), side_code(piece.side)),
            )
        })
        .collect()
}

/// Displayable state of an ongoing game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateWire {
    pub board: BTreeMap<String, (u8, u8)>,
    pub host_time: i64,
    pub away_time: i64,
    pub last_turn: i64,
    pub current_turn: u8,
    pub turn_number: i32,
}

/// Moves available to the player on turn, plus any standing draw claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedMovesWire {
    pub moves: Vec<WireMove>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_claim: Option<Conclusion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUser {
    pub id: i64,
    pub username: String,
    pub elo: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A game on the wire.
///
/// `U` is how participants appear: `i64` for the "referenced" flavour
/// (ids, with a parallel `users` array elsewhere in the response) or
/// [`WireUser`] for the "included" flavour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireGame<U> {
    pub id: i64,
    pub mode: Mode,
    pub host: Option<U>,
    pub away: Option<U>,
    pub invited: Option<U>,
    pub current_turn: u8,
    pub turn_number: i32,
    pub main_thinking_time: i64,
    pub fixed_extra_time: i64,
    pub time_increment_per_turn: i64,
    pub host_time: i64,
    pub away_time: i64,
    pub host_offering_draw: bool,
    pub away_offering_draw: bool,
    pub winner: Winner,
    pub conclusion_type: Conclusion,
    pub opened_at: i64,
    pub started_at: Option<i64>,
    pub last_turn: Option<i64>,
    pub ended_at: Option<i64>,
}

pub type ReferencedGame = WireGame<i64>;
pub type IncludedGame = WireGame<WireUser>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireNotification {
    pub id: i64,
    pub sent_at: i64,
    pub type_code: NotificationCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<i64>,
    pub read: bool,
}
