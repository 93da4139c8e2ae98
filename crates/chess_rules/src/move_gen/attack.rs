//! Square attack detection.
//!
//! Works backwards from the target square instead of generating every
//! enemy move, so check tests stay cheap inside the legality filter.

use crate::board::Position;
use crate::types::{on_board, PieceKind, Side};

const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (-1, 2),
    (-2, 1),
    (1, -2),
    (2, -1),
    (-1, -2),
    (-2, -1),
];

const ROOK_RAYS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const BISHOP_RAYS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

/// Whether any piece of `by` attacks the square `(rank, file)`.
pub(crate) fn square_attacked(position: &Position, rank: i8, file: i8, by: Side) -> bool {
    // Pawns attack diagonally forwards, so look one rank backwards.
    let pawn_rank = rank - by.forwards();
    for pawn_file in [file - 1, file + 1] {
        if on_board(pawn_rank, pawn_file) {
            if let Some(piece) = position.piece_at(pawn_rank, pawn_file) {
                if piece.side == by && piece.kind == PieceKind::Pawn {
                    return true;
                }
            }
        }
    }

    for (dr, df) in KNIGHT_OFFSETS {
        let (r, f) = (rank + dr, file + df);
        if on_board(r, f) {
            if let Some(piece) = position.piece_at(r, f) {
                if piece.side == by && piece.kind == PieceKind::Knight {
                    return true;
                }
            }
        }
    }

    for dr in -1..=1 {
        for df in -1..=1 {
            if dr == 0 && df == 0 {
                continue;
            }
            let (r, f) = (rank + dr, file + df);
            if on_board(r, f) {
                if let Some(piece) = position.piece_at(r, f) {
                    if piece.side == by && piece.kind == PieceKind::King {
                        return true;
                    }
                }
            }
        }
    }

    ray_attack(position, rank, file, by, &ROOK_RAYS, PieceKind::Rook)
        || ray_attack(position, rank, file, by, &BISHOP_RAYS, PieceKind::Bishop)
}

fn ray_attack(
    position: &Position,
    rank: i8,
    file: i8,
    by: Side,
    rays: &[(i8, i8)],
    slider: PieceKind,
) -> bool {
    for &(dr, df) in rays {
        let (mut r, mut f) = (rank + dr, file + df);
        while on_board(r, f) {
            if let Some(piece) = position.piece_at(r, f) {
                if piece.side == by && (piece.kind == slider || piece.kind == PieceKind::Queen) {
                    return true;
                }
                break;
            }
            r += dr;
            f += df;
        }
    }
    false
}
