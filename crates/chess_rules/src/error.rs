//! Error type for rules-level move rejection.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RulesError {
    #[error("no piece on {rank},{file}")]
    EmptySquare { rank: i8, file: i8 },

    #[error("move {0:?} is not legal in this position")]
    IllegalMove(crate::Move),

    #[error("square {rank},{file} is off the board")]
    OffBoard { rank: i8, file: i8 },
}
