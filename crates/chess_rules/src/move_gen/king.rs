//! King move generation, including castling.
//!
//! Castling is expressed as a two-file king move; the rook leg is applied
//! by [`Position::apply`]. Landing on an attacked square is rejected by the
//! common legality filter, so only the "from" and "through" squares are
//! checked here.

use super::attack::square_attacked;
use crate::board::Position;
use crate::types::{on_board, Move, Side};

pub(super) fn moves(position: &Position, rank: i8, file: i8, side: Side, out: &mut Vec<Move>) {
    for dr in -1..=1 {
        for df in -1..=1 {
            if dr == 0 && df == 0 {
                continue;
            }
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

    // Castling only ever starts from the home square.
    if (rank, file) != (side.home_rank(), 4) {
        return;
    }
    let enemy = side.opponent();
    if position.castling.kingside(side)
        && clear(position, rank, &[5, 6])
        && !square_attacked(position, rank, 4, enemy)
        && !square_attacked(position, rank, 5, enemy)
    {
        out.push(Move::new(rank, 4, rank, 6));
    }
    if position.castling.queenside(side)
        && clear(position, rank, &[1, 2, 3])
        && !square_attacked(position, rank, 4, enemy)
        && !square_attacked(position, rank, 3, enemy)
    {
        out.push(Move::new(rank, 4, rank, 2));
    }
}

fn clear(position: &Position, rank: i8, files: &[i8]) -> bool {
    files.iter().all(|&file| position.piece_at(rank, file).is_none())
}
