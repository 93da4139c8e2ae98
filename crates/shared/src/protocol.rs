//! Socket protocol events.
//!
//! Both directions are tagged JSON objects: `{"event": ..., "data": ...}`.
//! Client events map one-to-one onto engine commands; server events are
//! what the hub fans out.

use serde::{Deserialize, Serialize};

use crate::wire::{
    AllowedMovesWire, Conclusion, DisconnectReason, GameStateWire, WireMove, WireNotification,
};

/// Events a connected client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Request the full displayable game state.
    GameState,
    /// Request the list of allowed moves; only valid on your turn.
    AllowedMoves,
    /// Make a move.
    Move { r#move: WireMove },
    /// Offer the opponent a draw.
    OfferDraw,
    /// Claim a draw (agreed, threefold repetition, fifty-move rule).
    ClaimDraw { reason: Conclusion },
    /// Resign the game.
    Resign,
    /// Assert that the player on move has run out of time.
    Timeout,
}

/// Events the server pushes down a socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The server is about to close this socket.
    GameDisconnect { reason: DisconnectReason },
    /// Both players are present and the game has begun.
    GameStart,
    /// The game is over; final state and the conclusion reason.
    GameEnd {
        game_state: GameStateWire,
        reason: Conclusion,
    },
    /// The opponent has offered a draw.
    DrawOffer,
    /// The opponent moved; includes the new state and your allowed moves.
    Move {
        r#move: WireMove,
        game_state: GameStateWire,
        allowed_moves: AllowedMovesWire,
    },
    GameState(GameStateWire),
    AllowedMoves(AllowedMovesWire),
    /// A notification delivered live while a socket is open.
    Notification(WireNotification),
    /// A client event was rejected; carries the 4-digit error code.
    BadRequest { error: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::NotificationCode;
    use std::collections::BTreeMap;

    #[test]
    fn client_move_round_trips() {
        let event = ClientEvent::Move {
            r#move: WireMove {
                start_rank: 1,
                start_file: 4,
                end_rank: 3,
                end_file: 4,
                promotion: None,
            },
        };
        let json = serde_json::to_string(&event).expect("serialise");
        let decoded: ClientEvent = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(decoded, event);
    }

    #[test]
    fn client_events_are_tagged_by_name() {
        let json = serde_json::to_value(ClientEvent::Resign).expect("serialise");
        assert_eq!(json["event"], "resign");

        let json = serde_json::to_value(ClientEvent::ClaimDraw {
            reason: Conclusion::AgreedDraw,
        })
        .expect("serialise");
        assert_eq!(json["event"], "claim_draw");
        assert_eq!(json["data"]["reason"], 8);
    }

    #[test]
    fn claim_draw_reason_travels_as_integer() {
        let decoded: ClientEvent =
            serde_json::from_str(r#"{"event":"claim_draw","data":{"reason":6}}"#)
                .expect("deserialise");
        assert_eq!(
            decoded,
            ClientEvent::ClaimDraw {
                reason: Conclusion::ThreefoldRepetition
            }
        );
    }

    #[test]
    fn unknown_conclusion_value_is_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"event":"claim_draw","data":{"reason":9}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn game_end_round_trips() {
        let event = ServerEvent::GameEnd {
            game_state: GameStateWire {
                board: BTreeMap::new(),
                host_time: 55,
                away_time: 60,
                last_turn: 1_700_000_000,
                current_turn: 2,
                turn_number: 7,
            },
            reason: Conclusion::Checkmate,
        };
        let json = serde_json::to_string(&event).expect("serialise");
        let decoded: ServerEvent = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(decoded, event);
    }

    #[test]
    fn notification_event_uses_string_type_codes() {
        let event = ServerEvent::Notification(WireNotification {
            id: 3,
            sent_at: 1_700_000_000,
            type_code: NotificationCode::MatchFound,
            game_id: Some(12),
            read: false,
        });
        let json = serde_json::to_value(&event).expect("serialise");
        assert_eq!(json["data"]["type_code"], "matchmaking.match_found");
    }

    #[test]
    fn disconnect_reason_travels_as_integer() {
        let json = serde_json::to_value(ServerEvent::GameDisconnect {
            reason: DisconnectReason::GameOver,
        })
        .expect("serialise");
        assert_eq!(json["data"]["reason"], 3);
    }
}
