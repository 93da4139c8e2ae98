//! Knight move generation.

use crate::board::Position;
use crate::types::{on_board, Move, Side};

const OFFSETS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (-1, 2),
    (-2, 1),
    (1, -2),
    (2, -1),
    (-1, -2),
    (-2, -1),
];

pub(super) fn moves(position: &Position, rank: i8, file: i8, side: Side, out: &mut Vec<Move>) {
    for (dr, df) in OFFSETS {
        let (r, f) = (rank + dr, file + df);
        if !on_board(r, f) {
            continue;
        }
        match position.piece_at(r, f) {
            Some(victim) if victim.side == side => {}
            _ => out.push(Move::new(rank, file, r, f)),
        }
    }
}
