//! Legal move generation and game-over detection.
//!
//! Generation is pseudo-legal per piece (one module per piece family),
//! filtered by applying each candidate and rejecting any that leaves the
//! mover's own king attacked.

mod attack;
mod king;
mod knight;
mod pawn;
mod sliding;

use crate::board::Position;
use crate::types::{Move, PieceKind, Side, Terminal};

pub(crate) use attack::square_attacked;

/// All legal moves for `side` in `position`.
pub fn legal_moves(position: &Position, side: Side) -> Vec<Move> {
    let mut pseudo = Vec::with_capacity(64);
    for (rank, file, piece) in position.pieces() {
        if piece.side != side {
            continue;
        }
        match piece.kind {
            PieceKind::Pawn => pawn::moves(position, rank, file, side, &mut pseudo),
            PieceKind::Knight => knight::moves(position, rank, file, side, &mut pseudo),
            PieceKind::Rook => {
                sliding::moves(position, rank, file, side, sliding::ROOK_DIRECTIONS, &mut pseudo)
            }
            PieceKind::Bishop => sliding::moves(
                position,
                rank,
                file,
                side,
                sliding::BISHOP_DIRECTIONS,
                &mut pseudo,
            ),
            PieceKind::Queen => sliding::moves(
                position,
                rank,
                file,
                side,
                sliding::QUEEN_DIRECTIONS,
                &mut pseudo,
            ),
            PieceKind::King => king::moves(position, rank, file, side, &mut pseudo),
        }
    }
    pseudo
        .into_iter()
        .filter(|&mv| !is_check(&position.apply(mv), side))
        .collect()
}

/// Whether `side`'s king is currently attacked.
pub fn is_check(position: &Position, side: Side) -> bool {
    match position.king_square(side) {
        Some((rank, file)) => square_attacked(position, rank, file, side.opponent()),
        None => false,
    }
}

/// Game-over detection for the side to move: `Some(Checkmate)` or
/// `Some(Stalemate)` when they have no legal move, `None` otherwise.
///
/// Repetition and the fifty-move rule are claims, not terminal states, and
/// are tracked by the caller.
pub fn terminal(position: &Position, side_to_move: Side) -> Option<Terminal> {
    if !legal_moves(position, side_to_move).is_empty() {
        return None;
    }
    if is_check(position, side_to_move) {
        Some(Terminal::Checkmate)
    } else {
        Some(Terminal::Stalemate)
    }
}
