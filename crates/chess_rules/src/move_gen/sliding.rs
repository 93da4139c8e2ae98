//! Sliding piece move generation, shared by rooks, bishops and queens.

use crate::board::Position;
use crate::types::{on_board, Move, Side};

pub(super) const ROOK_DIRECTIONS: &[(i8, i8)] = &[(1, 0), (-1, 0), (0, 1), (0, -1)];
pub(super) const BISHOP_DIRECTIONS: &[(i8, i8)] = &[(1, 1), (1, -1), (-1, 1), (-1, -1)];
pub(super) const QUEEN_DIRECTIONS: &[(i8, i8)] = &[
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

pub(super) fn moves(
    position: &Position,
    rank: i8,
    file: i8,
    side: Side,
    directions: &[(i8, i8)],
    out: &mut Vec<Move>,
) {
    for &(dr, df) in directions {
        let (mut r, mut f) = (rank + dr, file + df);
        while on_board(r, f) {
            match position.piece_at(r, f) {
                None => out.push(Move::new(rank, file, r, f)),
                Some(victim) => {
                    if victim.side != side {
                        out.push(Move::new(rank, file, r, f));
                    }
                    break;
                }
            }
            r += dr;
            f += df;
        }
    }
}
