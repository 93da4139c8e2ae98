//! The clock accountant.
//!
//! Fischer timing with the fixed extra time baked into the starting
//! allowance: each player begins with `main + fixed_extra` seconds, pays
//! the wall-clock cost of each of their turns, and earns the increment
//! back after every accepted move. Clocks only tick for the side to move,
//! and the granularity is whole seconds. A player has lost on time exactly
//! when their remaining time goes below zero — an exact-boundary move is
//! still accepted.

/// Starting allowance for one player.
pub fn initial_allowance(main_thinking_time: i64, fixed_extra_time: i64) -> i64 {
    main_thinking_time + fixed_extra_time
}

/// Remaining time after `elapsed` seconds of thinking. May go negative;
/// negative means the player flagged before acting.
pub fn deduct(remaining: i64, elapsed: i64) -> i64 {
    remaining - elapsed
}

/// Credit the per-turn increment after an accepted move.
pub fn credit_increment(remaining: i64, increment: i64) -> i64 {
    remaining + increment
}

/// Whether a remaining-time value means the player has lost on time.
pub fn flagged(remaining: i64) -> bool {
    remaining < 0
}
