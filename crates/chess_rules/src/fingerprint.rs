//! Position fingerprinting for repetition detection.
//!
//! Zobrist-style hashing: every feature of a position (a piece on a square,
//! the side to move, each castling right, the en passant target) maps to a
//! fixed random-looking key, and the fingerprint is the XOR of the keys of
//! the features present. Equivalent positions therefore produce equal
//! fingerprints regardless of the move order that reached them. Two
//! independent 64-bit streams are combined into an opaque 128-bit value.

use crate::board::Position;
use crate::types::Side;

/// splitmix64 finaliser. Good avalanche behaviour, no tables to carry.
#[inline]
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[inline]
fn key(feature: u64, stream: u64) -> u64 {
    mix(feature ^ stream.wrapping_mul(0xd6e8_feb8_6659_fd93))
}

// Feature numbering: squares occupy 0..1023 (piece kind, side, square),
// then side-to-move, castling rights and the en passant square.
const FEATURE_SIDE_TO_MOVE: u64 = 1024;
const FEATURE_CASTLING: u64 = 1025; // ..=1028
const FEATURE_EN_PASSANT: u64 = 1029; // ..=1092

fn piece_feature(kind_code: u8, side: Side, rank: i8, file: i8) -> u64 {
    let side_bit = match side {
        Side::Host => 0u64,
        Side::Away => 1u64,
    };
    ((kind_code as u64 - 1) * 2 + side_bit) * 64 + (rank as u64 * 8 + file as u64)
}

/// A stable 128-bit fingerprint of the position with `side_to_move` to play.
pub fn fingerprint(position: &Position, side_to_move: Side) -> u128 {
    let mut low = 0u64;
    let mut high = 0u64;
    let mut fold = |feature: u64| {
        low ^= key(feature, 1);
        high ^= key(feature, 2);
    };

    for (rank, file, piece) in position.pieces() {
        fold(piece_feature(piece.kind.code(), piece.side, rank, file));
    }
    if side_to_move == Side::Away {
        fold(FEATURE_SIDE_TO_MOVE);
    }
    let rights = [
        position.castling.host_kingside,
        position.castling.host_queenside,
        position.castling.away_kingside,
        position.castling.away_queenside,
    ];
    for (offset, present) in rights.into_iter().enumerate() {
        if present {
            fold(FEATURE_CASTLING + offset as u64);
        }
    }
    if let Some((rank, file)) = position.en_passant {
        fold(FEATURE_EN_PASSANT + rank as u64 * 8 + file as u64);
    }

    ((high as u128) << 64) | low as u128
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Move;

    #[test]
    fn equal_positions_hash_equal() {
        let a = Position::initial();
        let b = Position::initial();
        assert_eq!(fingerprint(&a, Side::Host), fingerprint(&b, Side::Host));
    }

    #[test]
    fn side_to_move_is_part_of_the_fingerprint() {
        let position = Position::initial();
        assert_ne!(
            fingerprint(&position, Side::Host),
            fingerprint(&position, Side::Away)
        );
    }

    #[test]
    fn knight_shuffle_returns_to_the_same_fingerprint() {
        let position = Position::initial();
        let start = fingerprint(&position, Side::Host);
        let shuffled = position
            .apply(Move::new(0, 1, 2, 2)) // Nb1 c3
            .apply(Move::new(7, 1, 5, 2)) // Nb8 c6
            .apply(Move::new(2, 2, 0, 1)) // back
            .apply(Move::new(5, 2, 7, 1)); // back
        assert_eq!(fingerprint(&shuffled, Side::Host), start);
    }

    #[test]
    fn lost_castling_rights_change_the_fingerprint() {
        let position = Position::initial();
        let mut stripped = position.clone();
        stripped.castling.host_kingside = false;
        assert_ne!(
            fingerprint(&position, Side::Host),
            fingerprint(&stripped, Side::Host)
        );
    }

    #[test]
    fn en_passant_target_changes_the_fingerprint() {
        let position = Position::initial();
        let mut with_target = position.clone();
        with_target.en_passant = Some((2, 4));
        assert_ne!(
            fingerprint(&position, Side::Host),
            fingerprint(&with_target, Side::Host)
        );
    }
}
