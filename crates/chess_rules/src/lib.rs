//! Pure chess rules.
//!
//! Everything in this crate is a function of an immutable [`Position`]:
//! legal move generation, move application, check and terminal detection,
//! and a stable 128-bit position fingerprint used for repetition claims.
//! Clocks, turn ownership and game records live in the server, not here.

pub mod board;
pub mod error;
pub mod fingerprint;
pub mod move_gen;
pub mod types;

pub use board::Position;
pub use error::RulesError;
pub use fingerprint::fingerprint;
pub use move_gen::{is_check, legal_moves, terminal};
pub use types::{CastlingRights, Move, Piece, PieceKind, Side, Terminal};

/// A move is irreversible if it advances a pawn or captures.
///
/// Irreversible moves reset the halfmove clock used by the fifty-move rule.
pub fn is_reversible(position: &Position, mv: Move) -> bool {
    if let Some(piece) = position.piece_at(mv.start_rank, mv.start_file) {
        if piece.kind == PieceKind::Pawn {
            return false;
        }
    }
    position.piece_at(mv.end_rank, mv.end_file).is_none()
}

/// Validate that `mv` is legal for `side`, then apply it.
pub fn apply_checked(position: &Position, side: Side, mv: Move) -> Result<Position, RulesError> {
    for (rank, file) in [
        (mv.start_rank, mv.start_file),
        (mv.end_rank, mv.end_file),
    ] {
        if !types::on_board(rank, file) {
            return Err(RulesError::OffBoard { rank, file });
        }
    }
    match position.piece_at(mv.start_rank, mv.start_file) {
        None => Err(RulesError::EmptySquare {
            rank: mv.start_rank,
            file: mv.start_file,
        }),
        Some(piece) if piece.side != side => Err(RulesError::IllegalMove(mv)),
        Some(_) if !legal_moves(position, side).contains(&mv) => Err(RulesError::IllegalMove(mv)),
        Some(_) => Ok(position.apply(mv)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_apply_rejects_what_generation_never_offers() {
        let position = Position::initial();
        assert_eq!(
            apply_checked(&position, Side::Host, Move::new(3, 3, 4, 3)),
            Err(RulesError::EmptySquare { rank: 3, file: 3 })
        );
        assert_eq!(
            apply_checked(&position, Side::Host, Move::new(6, 4, 4, 4)),
            Err(RulesError::IllegalMove(Move::new(6, 4, 4, 4)))
        );
        assert_eq!(
            apply_checked(&position, Side::Host, Move::new(1, 4, 8, 4)),
            Err(RulesError::OffBoard { rank: 8, file: 4 })
        );
        assert!(apply_checked(&position, Side::Host, Move::new(1, 4, 3, 4)).is_ok());
    }

    #[test]
    fn reversibility_tracks_pawn_moves_and_captures() {
        let position = Position::initial();
        assert!(!is_reversible(&position, Move::new(1, 4, 3, 4)), "pawn push");
        assert!(is_reversible(&position, Move::new(0, 1, 2, 2)), "knight hop");
    }
}
