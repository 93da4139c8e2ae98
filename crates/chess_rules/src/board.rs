//! The board position and move application.

use crate::types::{CastlingRights, Move, Piece, PieceKind, Side};

/// A complete position: piece placement plus the state that raw placement
/// cannot express — castling rights and the en passant target square.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    squares: [[Option<Piece>; 8]; 8],
    pub castling: CastlingRights,
    /// Square a pawn may capture onto en passant, set for exactly one ply
    /// after a double pawn push.
    pub en_passant: Option<(i8, i8)>,
}

impl Position {
    /// The standard starting position.
    pub fn initial() -> Position {
        let mut squares = [[None; 8]; 8];
        let back_row = [
            PieceKind::Rook,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Queen,
            PieceKind::King,
            PieceKind::Bishop,
            PieceKind::Knight,
            PieceKind::Rook,
        ];
        for (file, &kind) in back_row.iter().enumerate() {
            squares[0][file] = Some(Piece::new(kind, Side::Host));
            squares[7][file] = Some(Piece::new(kind, Side::Away));
        }
        for file in 0..8 {
            squares[1][file] = Some(Piece::new(PieceKind::Pawn, Side::Host));
            squares[6][file] = Some(Piece::new(PieceKind::Pawn, Side::Away));
        }
        Position {
            squares,
            castling: CastlingRights::all(),
            en_passant: None,
        }
    }

    /// An empty board with no castling rights. Used by tests to set up
    /// specific arrangements.
    pub fn empty() -> Position {
        Position {
            squares: [[None; 8]; 8],
            castling: CastlingRights {
                host_kingside: false,
                host_queenside: false,
                away_kingside: false,
                away_queenside: false,
            },
            en_passant: None,
        }
    }

    #[inline]
    pub fn piece_at(&self, rank: i8, file: i8) -> Option<Piece> {
        self.squares[rank as usize][file as usize]
    }

    pub fn set(&mut self, rank: i8, file: i8, piece: Option<Piece>) {
        self.squares[rank as usize][file as usize] = piece;
    }

    /// Locate the king of a side. Positions handled by this crate always
    /// have exactly one king per side.
    pub fn king_square(&self, side: Side) -> Option<(i8, i8)> {
        for rank in 0..8 {
            for file in 0..8 {
                if let Some(piece) = self.squares[rank][file] {
                    if piece.kind == PieceKind::King && piece.side == side {
                        return Some((rank as i8, file as i8));
                    }
                }
            }
        }
        None
    }

    /// Iterate over all occupied squares as `(rank, file, piece)`.
    pub fn pieces(&self) -> impl Iterator<Item = (i8, i8, Piece)> + '_ {
        self.squares.iter().enumerate().flat_map(|(rank, row)| {
            row.iter().enumerate().filter_map(move |(file, square)| {
                square.map(|piece| (rank as i8, file as i8, piece))
            })
        })
    }

    /// Apply a move, returning the resulting position.
    ///
    /// The move must come from [`crate::legal_moves`]; this function applies
    /// it mechanically (including the rook leg of castling and en passant
    /// removal) without re-validating.
    pub fn apply(&self, mv: Move) -> Position {
        let mut next = self.clone();
        let piece = self
            .piece_at(mv.start_rank, mv.start_file)
            .expect("apply called with empty start square");
        let side = piece.side;

        next.set(mv.start_rank, mv.start_file, None);

        // En passant: the captured pawn is behind the landing square.
        if piece.kind == PieceKind::Pawn
            && self.en_passant == Some((mv.end_rank, mv.end_file))
            && self.piece_at(mv.end_rank, mv.end_file).is_none()
            && mv.start_file != mv.end_file
        {
            next.set(mv.end_rank - side.forwards(), mv.end_file, None);
        }

        let placed = match mv.promotion {
            Some(kind) => Piece::new(kind, side),
            None => piece,
        };
        next.set(mv.end_rank, mv.end_file, Some(placed));

        // Castling: the king moves two files and brings the rook across.
        if piece.kind == PieceKind::King && (mv.end_file - mv.start_file).abs() == 2 {
            let (rook_from, rook_to) = if mv.end_file == 6 { (7, 5) } else { (0, 3) };
            let rook = next.piece_at(mv.start_rank, rook_from);
            next.set(mv.start_rank, rook_from, None);
            next.set(mv.start_rank, rook_to, rook);
        }

        next.update_castling_rights(&mv, piece);

        // A double pawn push exposes the skipped square for one ply.
        next.en_passant = if piece.kind == PieceKind::Pawn
            && (mv.end_rank - mv.start_rank).abs() == 2
        {
            Some((mv.start_rank + side.forwards(), mv.start_file))
        } else {
            None
        };

        next
    }

    fn update_castling_rights(&mut self, mv: &Move, piece: Piece) {
        let side = piece.side;
        match piece.kind {
            PieceKind::King => self.castling.revoke_all(side),
            PieceKind::Rook => {
                if mv.start_rank == side.home_rank() {
                    if mv.start_file == 0 {
                        self.castling.revoke_queenside(side);
                    } else if mv.start_file == 7 {
                        self.castling.revoke_kingside(side);
                    }
                }
            }
            _ => {}
        }
        // Capturing a rook on its home square removes the opposing right.
        let enemy = side.opponent();
        if mv.end_rank == enemy.home_rank() {
            if mv.end_file == 0 {
                self.castling.revoke_queenside(enemy);
            } else if mv.end_file == 7 {
                self.castling.revoke_kingside(enemy);
            }
        }
    }
}
