//! Elo rating settlement.
//!
//! Standard pairwise Elo: the expected score uses the transformed rating
//! `10^(elo/400)`, and each player's new rating is
//! `round(old + K * (actual - expected))`. Resignations and timeouts count
//! as full losses.

use shared::Winner;

fn transformed(elo: i64) -> f64 {
    10f64.powf(elo as f64 / 400.0)
}

fn host_score(winner: Winner) -> f64 {
    match winner {
        Winner::Host => 1.0,
        Winner::Away => 0.0,
        _ => 0.5,
    }
}

/// New `(host, away)` ratings after a decided game.
pub fn settle(host_elo: i64, away_elo: i64, winner: Winner, k_factor: f64) -> (i64, i64) {
    let host_transformed = transformed(host_elo);
    let away_transformed = transformed(away_elo);
    let total = host_transformed + away_transformed;
    let host_expected = host_transformed / total;
    let away_expected = away_transformed / total;
    let host_actual = host_score(winner);
    let away_actual = 1.0 - host_actual;
    let host_updated = (host_elo as f64 + k_factor * (host_actual - host_expected)).round();
    let away_updated = (away_elo as f64 + k_factor * (away_actual - away_expected)).round();
    (host_updated as i64, away_updated as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_split_sixteen_points() {
        let (host, away) = settle(1000, 1000, Winner::Host, 32.0);
        assert_eq!(host, 1016);
        assert_eq!(away, 984);
    }

    #[test]
    fn a_draw_between_equals_changes_nothing() {
        let (host, away) = settle(1200, 1200, Winner::Draw, 32.0);
        assert_eq!(host, 1200);
        assert_eq!(away, 1200);
    }

    #[test]
    fn the_underdog_gains_more() {
        let (host, away) = settle(1000, 1400, Winner::Host, 32.0);
        assert!(host - 1000 > 16, "upset win should pay over half of K");
        assert!(away < 1400);
    }

    #[test]
    fn deltas_are_equal_and_opposite_within_rounding() {
        for (a, b, winner) in [
            (1000, 1000, Winner::Host),
            (1234, 987, Winner::Away),
            (1500, 1499, Winner::Draw),
            (800, 2200, Winner::Host),
        ] {
            let (new_a, new_b) = settle(a, b, winner, 32.0);
            let drift = (new_a - a) + (new_b - b);
            assert!(drift.abs() <= 1, "drift {drift} for {a} vs {b}");
        }
    }
}
