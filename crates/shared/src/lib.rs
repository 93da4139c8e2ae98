//! Wire protocol shared between the HTTP API and the socket layer.
//!
//! Everything here is serialisation shape, not behaviour: event enums for
//! the socket protocol and the JSON forms of users, games, boards and
//! notifications. Enums travel as integers, timestamps as whole Unix
//! seconds, and boards as a sparse `"rank,file"` map.

pub mod protocol;
pub mod wire;

pub use protocol::{ClientEvent, ServerEvent};
pub use wire::{
    board_to_wire, side_code, side_from_code, AllowedMovesWire, Conclusion, DisconnectReason,
    GameStateWire, IncludedGame, Mode, NotificationCode, ReferencedGame, WireGame, WireMove,
    WireNotification, WireUser, Winner,
};
