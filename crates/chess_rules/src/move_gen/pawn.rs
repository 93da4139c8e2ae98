//! Pawn move generation: pushes, double pushes, captures, en passant and
//! mandatory promotion on the last rank.

use crate::board::Position;
use crate::types::{on_board, Move, PieceKind, Side};

const PROMOTIONS: [PieceKind; 4] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
];

pub(super) fn moves(position: &Position, rank: i8, file: i8, side: Side, out: &mut Vec<Move>) {
    let forwards = side.forwards();
    let start_rank = match side {
        Side::Host => 1,
        Side::Away => 6,
    };

    // Single push.
    let ahead = rank + forwards;
    if on_board(ahead, file) && position.piece_at(ahead, file).is_none() {
        push(out, rank, file, ahead, file, side);

        // Double push from the starting rank.
        let two_ahead = rank + 2 * forwards;
        if rank == start_rank && position.piece_at(two_ahead, file).is_none() {
            out.push(Move::new(rank, file, two_ahead, file));
        }
    }

    // Captures, including en passant onto the exposed square.
    for capture_file in [file - 1, file + 1] {
        if !on_board(ahead, capture_file) {
            continue;
        }
        let takes_enemy = position
            .piece_at(ahead, capture_file)
            .is_some_and(|victim| victim.side != side);
        let takes_en_passant = position.en_passant == Some((ahead, capture_file));
        if takes_enemy || takes_en_passant {
            push(out, rank, file, ahead, capture_file, side);
        }
    }
}

fn push(out: &mut Vec<Move>, rank: i8, file: i8, end_rank: i8, end_file: i8, side: Side) {
    if end_rank == side.promotion_rank() {
        for kind in PROMOTIONS {
            out.push(Move::promoting(rank, file, end_rank, end_file, kind));
        }
    } else {
        out.push(Move::new(rank, file, end_rank, end_file));
    }
}
