//! Core types shared by the rules functions.

/// One of the two players. Host pieces start on ranks 0–1 and move up the
/// board; away pieces start on ranks 6–7 and move down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Host,
    Away,
}

impl Side {
    /// The other side.
    pub fn opponent(self) -> Side {
        match self {
            Side::Host => Side::Away,
            Side::Away => Side::Host,
        }
    }

    /// Rank direction that is "forwards" for this side.
    #[inline]
    pub fn forwards(self) -> i8 {
        match self {
            Side::Host => 1,
            Side::Away => -1,
        }
    }

    /// Rank a pawn of this side promotes on.
    #[inline]
    pub fn promotion_rank(self) -> i8 {
        match self {
            Side::Host => 7,
            Side::Away => 0,
        }
    }

    /// Rank this side's back row starts on.
    #[inline]
    pub fn home_rank(self) -> i8 {
        match self {
            Side::Host => 0,
            Side::Away => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    Pawn,
    Rook,
    Knight,
    Bishop,
    Queen,
    King,
}

impl PieceKind {
    /// Stable wire code for this piece kind.
    pub fn code(self) -> u8 {
        match self {
            PieceKind::Pawn => 1,
            PieceKind::Rook => 2,
            PieceKind::Knight => 3,
            PieceKind::Bishop => 4,
            PieceKind::Queen => 5,
            PieceKind::King => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<PieceKind> {
        match code {
            1 => Some(PieceKind::Pawn),
            2 => Some(PieceKind::Rook),
            3 => Some(PieceKind::Knight),
            4 => Some(PieceKind::Bishop),
            5 => Some(PieceKind::Queen),
            6 => Some(PieceKind::King),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    pub side: Side,
}

impl Piece {
    pub fn new(kind: PieceKind, side: Side) -> Piece {
        Piece { kind, side }
    }
}

/// A move in coordinate form. Ranks and files are 0–7; `promotion` must be
/// present exactly when a pawn reaches its promotion rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub start_rank: i8,
    pub start_file: i8,
    pub end_rank: i8,
    pub end_file: i8,
    pub promotion: Option<PieceKind>,
}

impl Move {
    pub fn new(start_rank: i8, start_file: i8, end_rank: i8, end_file: i8) -> Move {
        Move {
            start_rank,
            start_file,
            end_rank,
            end_file,
            promotion: None,
        }
    }

    pub fn promoting(
        start_rank: i8,
        start_file: i8,
        end_rank: i8,
        end_file: i8,
        promotion: PieceKind,
    ) -> Move {
        Move {
            start_rank,
            start_file,
            end_rank,
            end_file,
            promotion: Some(promotion),
        }
    }
}

/// Which castling moves are still available to each side.
///
/// Rights are lost when the king or the relevant rook moves, or when the
/// rook is captured on its home square.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastlingRights {
    pub host_kingside: bool,
    pub host_queenside: bool,
    pub away_kingside: bool,
    pub away_queenside: bool,
}

impl CastlingRights {
    pub fn all() -> CastlingRights {
        CastlingRights {
            host_kingside: true,
            host_queenside: true,
            away_kingside: true,
            away_queenside: true,
        }
    }

    pub fn kingside(&self, side: Side) -> bool {
        match side {
            Side::Host => self.host_kingside,
            Side::Away => self.away_kingside,
        }
    }

    pub fn queenside(&self, side: Side) -> bool {
        match side {
            Side::Host => self.host_queenside,
            Side::Away => self.away_queenside,
        }
    }

    pub(crate) fn revoke_all(&mut self, side: Side) {
        match side {
            Side::Host => {
                self.host_kingside = false;
                self.host_queenside = false;
            }
            Side::Away => {
                self.away_kingside = false;
                self.away_queenside = false;
            }
        }
    }

    pub(crate) fn revoke_kingside(&mut self, side: Side) {
        match side {
            Side::Host => self.host_kingside = false,
            Side::Away => self.away_kingside = false,
        }
    }

    pub(crate) fn revoke_queenside(&mut self, side: Side) {
        match side {
            Side::Host => self.host_queenside = false,
            Side::Away => self.away_queenside = false,
        }
    }
}

/// Outcome of [`crate::terminal`] when the side to move has no legal moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Checkmate,
    Stalemate,
}

/// Check if rank and file are on the board.
#[inline]
pub fn on_board(rank: i8, file: i8) -> bool {
    (0..8).contains(&rank) && (0..8).contains(&file)
}
