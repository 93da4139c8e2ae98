//! The per-game state machine.
//!
//! One engine owns one game. Commands either advance the state and return
//! the events to fan out, or fail with a taxonomy error for the caller's
//! acknowledgement. The engine does no I/O: wall time comes in with each
//! command, and persistence and delivery belong to the hub, which also
//! guarantees commands on one game are processed strictly in arrival
//! order.

use chess_rules::{apply_checked, fingerprint, is_reversible, terminal, Move, Side, Terminal};
use shared::{Conclusion, Winner};

use crate::clock;
use crate::error::{ApiError, ApiResult};
use crate::models::Game;

/// What a command changed, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Moved { by: Side, mv: Move },
    DrawOffered { by: Side },
    Ended { winner: Winner, conclusion: Conclusion },
}

pub struct Engine {
    pub game: Game,
}

fn winner_of(side: Side) -> Winner {
    match side {
        Side::Host => Winner::Host,
        Side::Away => Winner::Away,
    }
}

impl Engine {
    pub fn new(game: Game) -> Engine {
        Engine { game }
    }

    fn ensure_in_progress(&self) -> ApiResult<()> {
        if self.game.in_progress() {
            Ok(())
        } else {
            Err(ApiError::NotInProgress)
        }
    }

    /// Basis for the side-to-move countdown.
    fn last_turn(&self) -> i64 {
        self.game
            .last_turn
            .or(self.game.started_at)
            .unwrap_or(self.game.opened_at)
    }

    /// Remaining time of the side to move as of `now`. Negative means
    /// they have flagged.
    fn remaining_at(&self, now: i64) -> i64 {
        let elapsed = now - self.last_turn();
        clock::deduct(self.game.time_of(self.game.current_turn), elapsed)
    }

    /// If the side to move has flagged, end the game out-of-time and
    /// return the events; otherwise `None`.
    ///
    /// The end instant is pinned to the moment the clock ran out, not the
    /// time the flag was noticed.
    fn check_flag(&mut self, now: i64) -> Option<Vec<EngineEvent>> {
        if !clock::flagged(self.remaining_at(now)) {
            return None;
        }
        let loser = self.game.current_turn;
        let exhausted_at = self.last_turn() + self.game.time_of(loser);
        self.game.set_time(loser, 0);
        Some(vec![self.end(
            winner_of(loser.opponent()),
            Conclusion::OutOfTime,
            exhausted_at,
        )])
    }

    fn end(&mut self, winner: Winner, conclusion: Conclusion, at: i64) -> EngineEvent {
        self.game.winner = winner;
        self.game.conclusion = conclusion;
        self.game.ended_at = Some(at);
        EngineEvent::Ended { winner, conclusion }
    }

    /// Apply a move for `side` at wall time `now`.
    pub fn make_move(&mut self, side: Side, mv: Move, now: i64) -> ApiResult<Vec<EngineEvent>> {
        self.ensure_in_progress()?;
        if side != self.game.current_turn {
            return Err(ApiError::NotYourTurn);
        }
        if let Some(events) = self.check_flag(now) {
            return Ok(events);
        }
        let next_position =
            apply_checked(&self.game.position, side, mv).map_err(|_| ApiError::InvalidMove)?;

        let reversible = is_reversible(&self.game.position, mv);
        let remaining = self.remaining_at(now);

        self.game.position = next_position;
        let next_side = side.opponent();
        let fp = fingerprint(&self.game.position, next_side);
        self.game.position_history.push(fp);
        self.game.halfmove_clock = if reversible {
            self.game.halfmove_clock + 1
        } else {
            0
        };
        self.game.set_time(
            side,
            clock::credit_increment(remaining, self.game.time_increment_per_turn),
        );
        // Any move rescinds a pending offer from either side.
        self.game.host_offering_draw = false;
        self.game.away_offering_draw = false;
        self.game.turn_number += 1;
        self.game.current_turn = next_side;
        self.game.last_turn = Some(now);
        self.refresh_draw_claim(fp);

        let mut events = vec![EngineEvent::Moved { by: side, mv }];
        match terminal(&self.game.position, next_side) {
            Some(Terminal::Checkmate) => {
                events.push(self.end(winner_of(side), Conclusion::Checkmate, now));
            }
            Some(Terminal::Stalemate) => {
                events.push(self.end(Winner::Draw, Conclusion::Stalemate, now));
            }
            None => {}
        }
        Ok(events)
    }

    /// Record whether the new player on move has a standing draw claim.
    fn refresh_draw_claim(&mut self, current: u128) {
        let occurrences = self
            .game
            .position_history
            .iter()
            .filter(|&&fp| fp == current)
            .count();
        self.game.other_valid_draw_claim = if occurrences >= 3 {
            Some(Conclusion::ThreefoldRepetition)
        } else if self.game.halfmove_clock >= 100 {
            Some(Conclusion::FiftyMoveRule)
        } else {
            None
        };
    }

    pub fn offer_draw(&mut self, side: Side) -> ApiResult<Vec<EngineEvent>> {
        self.ensure_in_progress()?;
        if self.game.offering_draw(side) {
            return Err(ApiError::DrawNotAvailable);
        }
        self.game.set_offering_draw(side, true);
        Ok(vec![EngineEvent::DrawOffered { by: side }])
    }

    pub fn claim_draw(
        &mut self,
        side: Side,
        reason: Conclusion,
        now: i64,
    ) -> ApiResult<Vec<EngineEvent>> {
        self.ensure_in_progress()?;
        if !matches!(
            reason,
            Conclusion::AgreedDraw | Conclusion::ThreefoldRepetition | Conclusion::FiftyMoveRule
        ) {
            return Err(ApiError::NotADrawReason);
        }
        if let Some(events) = self.check_flag(now) {
            return Ok(events);
        }
        match reason {
            Conclusion::AgreedDraw => {
                if !self.game.offering_draw(side.opponent()) {
                    return Err(ApiError::DrawNotAvailable);
                }
            }
            Conclusion::ThreefoldRepetition => {
                let current = self
                    .game
                    .position_history
                    .last()
                    .copied()
                    .unwrap_or_else(|| {
                        fingerprint(&self.game.position, self.game.current_turn)
                    });
                let occurrences = self
                    .game
                    .position_history
                    .iter()
                    .filter(|&&fp| fp == current)
                    .count();
                if occurrences < 3 {
                    return Err(ApiError::DrawNotAvailable);
                }
            }
            Conclusion::FiftyMoveRule => {
                if self.game.halfmove_clock < 100 {
                    return Err(ApiError::DrawNotAvailable);
                }
            }
            _ => unreachable!("reason validated above"),
        }
        Ok(vec![self.end(Winner::Draw, reason, now)])
    }

    pub fn resign(&mut self, side: Side, now: i64) -> ApiResult<Vec<EngineEvent>> {
        self.ensure_in_progress()?;
        Ok(vec![self.end(
            winner_of(side.opponent()),
            Conclusion::Resignation,
            now,
        )])
    }

    /// A timeout assertion: from a client `timeout` event or the sweep.
    pub fn assert_timeout(&mut self, now: i64) -> ApiResult<Vec<EngineEvent>> {
        self.ensure_in_progress()?;
        self.check_flag(now).ok_or(ApiError::NotTimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_rules::Position;
    use shared::Mode;

    const HOST: i64 = 1;
    const AWAY: i64 = 2;

    /// A started game at t=0 with the given time control.
    fn started_game(main: i64, fixed: i64, increment: i64) -> Game {
        let position = Position::initial();
        let history = vec![fingerprint(&position, Side::Host)];
        Game {
            id: 1,
            mode: Mode::Chess,
            host_id: HOST,
            away_id: Some(AWAY),
            invited_id: None,
            current_turn: Side::Host,
            turn_number: 0,
            main_thinking_time: main,
            fixed_extra_time: fixed,
            time_increment_per_turn: increment,
            host_time: clock::initial_allowance(main, fixed),
            away_time: clock::initial_allowance(main, fixed),
            host_offering_draw: false,
            away_offering_draw: false,
            other_valid_draw_claim: None,
            halfmove_clock: 0,
            winner: Winner::GameNotComplete,
            conclusion: Conclusion::GameNotComplete,
            position,
            position_history: history,
            opened_at: 0,
            started_at: Some(0),
            last_turn: Some(0),
            ended_at: None,
        }
    }

    fn mv(start_rank: i8, start_file: i8, end_rank: i8, end_file: i8) -> Move {
        Move::new(start_rank, start_file, end_rank, end_file)
    }

    #[test]
    fn moves_are_rejected_before_the_game_starts() {
        let mut game = started_game(300, 0, 0);
        game.away_id = None;
        game.started_at = None;
        let mut engine = Engine::new(game);
        let err = engine.make_move(Side::Host, mv(1, 4, 3, 4), 1).unwrap_err();
        assert_eq!(err.code(), 2311);
    }

    #[test]
    fn only_the_player_on_move_may_move() {
        let mut engine = Engine::new(started_game(300, 0, 0));
        let err = engine.make_move(Side::Away, mv(6, 4, 4, 4), 1).unwrap_err();
        assert_eq!(err.code(), 2312);
    }

    #[test]
    fn illegal_moves_are_rejected() {
        let mut engine = Engine::new(started_game(300, 0, 0));
        let err = engine.make_move(Side::Host, mv(0, 0, 4, 4), 1).unwrap_err();
        assert_eq!(err.code(), 2313);
    }

    #[test]
    fn a_move_charges_the_mover_and_credits_the_increment() {
        let mut engine = Engine::new(started_game(300, 0, 5));
        let events = engine.make_move(Side::Host, mv(1, 4, 3, 4), 10).expect("move");
        assert_eq!(
            events,
            vec![EngineEvent::Moved {
                by: Side::Host,
                mv: mv(1, 4, 3, 4)
            }]
        );
        assert_eq!(engine.game.host_time, 300 - 10 + 5);
        assert_eq!(engine.game.away_time, 300, "idle clock is frozen");
        assert_eq!(engine.game.turn_number, 1);
        assert_eq!(engine.game.current_turn, Side::Away);
        assert_eq!(engine.game.last_turn, Some(10));
    }

    #[test]
    fn an_exact_boundary_move_is_accepted() {
        let mut engine = Engine::new(started_game(60, 0, 0));
        let events = engine.make_move(Side::Host, mv(1, 4, 3, 4), 60).expect("move");
        assert_eq!(events.len(), 1);
        assert_eq!(engine.game.host_time, 0);
        assert!(engine.game.in_progress());
    }

    #[test]
    fn a_late_move_ends_the_game_out_of_time() {
        let mut engine = Engine::new(started_game(60, 0, 0));
        let events = engine.make_move(Side::Host, mv(1, 4, 3, 4), 61).expect("command");
        assert_eq!(
            events,
            vec![EngineEvent::Ended {
                winner: Winner::Away,
                conclusion: Conclusion::OutOfTime
            }]
        );
        // The end instant is the exhaustion moment, not the command time.
        assert_eq!(engine.game.ended_at, Some(60));
        assert_eq!(engine.game.turn_number, 0, "the move was not applied");
    }

    #[test]
    fn scholars_mate_ends_with_checkmate_for_the_host() {
        let mut engine = Engine::new(started_game(600, 0, 0));
        let line = [
            (Side::Host, mv(1, 4, 3, 4)),
            (Side::Away, mv(6, 4, 4, 4)),
            (Side::Host, mv(0, 5, 3, 2)),
            (Side::Away, mv(7, 1, 5, 2)),
            (Side::Host, mv(0, 3, 4, 7)),
            (Side::Away, mv(7, 6, 5, 5)),
        ];
        let mut now = 0;
        for (side, m) in line {
            now += 1;
            let events = engine.make_move(side, m, now).expect("move");
            assert_eq!(events.len(), 1);
        }
        let events = engine
            .make_move(Side::Host, mv(4, 7, 6, 5), now + 1)
            .expect("mating move");
        assert_eq!(
            events,
            vec![
                EngineEvent::Moved {
                    by: Side::Host,
                    mv: mv(4, 7, 6, 5)
                },
                EngineEvent::Ended {
                    winner: Winner::Host,
                    conclusion: Conclusion::Checkmate
                },
            ]
        );
        assert!(engine.game.is_finished());
        // The game is immutable now: every further command fails.
        let err = engine.make_move(Side::Away, mv(6, 0, 5, 0), now + 2).unwrap_err();
        assert_eq!(err.code(), 2311);
        assert_eq!(engine.resign(Side::Away, now + 2).unwrap_err().code(), 2311);
    }

    #[test]
    fn a_move_rescinds_pending_draw_offers() {
        let mut engine = Engine::new(started_game(300, 0, 0));
        engine.offer_draw(Side::Host).expect("offer");
        assert!(engine.game.host_offering_draw);
        engine.make_move(Side::Host, mv(1, 4, 3, 4), 1).expect("move");
        assert!(!engine.game.host_offering_draw);
        assert!(!engine.game.away_offering_draw);
    }

    #[test]
    fn repeated_draw_offers_are_rejected() {
        let mut engine = Engine::new(started_game(300, 0, 0));
        engine.offer_draw(Side::Host).expect("offer");
        assert_eq!(engine.offer_draw(Side::Host).unwrap_err().code(), 2322);
    }

    #[test]
    fn agreed_draw_requires_a_standing_offer() {
        let mut engine = Engine::new(started_game(300, 0, 0));
        let err = engine
            .claim_draw(Side::Away, Conclusion::AgreedDraw, 1)
            .unwrap_err();
        assert_eq!(err.code(), 2322);

        engine.offer_draw(Side::Host).expect("offer");
        let events = engine
            .claim_draw(Side::Away, Conclusion::AgreedDraw, 2)
            .expect("claim");
        assert_eq!(
            events,
            vec![EngineEvent::Ended {
                winner: Winner::Draw,
                conclusion: Conclusion::AgreedDraw
            }]
        );
    }

    #[test]
    fn checkmate_is_not_a_draw_reason() {
        let mut engine = Engine::new(started_game(300, 0, 0));
        let err = engine
            .claim_draw(Side::Host, Conclusion::Checkmate, 1)
            .unwrap_err();
        assert_eq!(err.code(), 2321);
    }

    #[test]
    fn threefold_repetition_claim_needs_three_occurrences() {
        let mut engine = Engine::new(started_game(600, 0, 0));
        // Shuffle both knights out and back; each full cycle repeats the
        // starting arrangement with host to move.
        let cycle = [
            (Side::Host, mv(0, 1, 2, 2)),
            (Side::Away, mv(7, 1, 5, 2)),
            (Side::Host, mv(2, 2, 0, 1)),
            (Side::Away, mv(5, 2, 7, 1)),
        ];
        let mut now = 0;

        for (side, m) in cycle {
            now += 1;
            engine.make_move(side, m, now).expect("move");
        }
        // Two occurrences so far: not claimable yet.
        let err = engine
            .claim_draw(Side::Host, Conclusion::ThreefoldRepetition, now + 1)
            .unwrap_err();
        assert_eq!(err.code(), 2322);

        for (side, m) in cycle {
            now += 1;
            engine.make_move(side, m, now).expect("move");
        }
        assert_eq!(
            engine.game.other_valid_draw_claim,
            Some(Conclusion::ThreefoldRepetition)
        );
        let events = engine
            .claim_draw(Side::Host, Conclusion::ThreefoldRepetition, now + 1)
            .expect("claim");
        assert_eq!(
            events,
            vec![EngineEvent::Ended {
                winner: Winner::Draw,
                conclusion: Conclusion::ThreefoldRepetition
            }]
        );
    }

    #[test]
    fn fifty_move_rule_needs_a_hundred_halfmoves() {
        let mut engine = Engine::new(started_game(300, 0, 0));
        let err = engine
            .claim_draw(Side::Host, Conclusion::FiftyMoveRule, 1)
            .unwrap_err();
        assert_eq!(err.code(), 2322);

        engine.game.halfmove_clock = 100;
        let events = engine
            .claim_draw(Side::Host, Conclusion::FiftyMoveRule, 2)
            .expect("claim");
        assert_eq!(
            events,
            vec![EngineEvent::Ended {
                winner: Winner::Draw,
                conclusion: Conclusion::FiftyMoveRule
            }]
        );
    }

    #[test]
    fn pawn_moves_and_captures_reset_the_halfmove_clock() {
        let mut engine = Engine::new(started_game(600, 0, 0));
        engine.make_move(Side::Host, mv(0, 1, 2, 2), 1).expect("knight");
        assert_eq!(engine.game.halfmove_clock, 1);
        engine.make_move(Side::Away, mv(6, 4, 4, 4), 2).expect("pawn");
        assert_eq!(engine.game.halfmove_clock, 0);
    }

    #[test]
    fn resignation_hands_the_win_to_the_opponent() {
        let mut engine = Engine::new(started_game(300, 0, 0));
        let events = engine.resign(Side::Host, 5).expect("resign");
        assert_eq!(
            events,
            vec![EngineEvent::Ended {
                winner: Winner::Away,
                conclusion: Conclusion::Resignation
            }]
        );
        assert_eq!(engine.game.ended_at, Some(5));
    }

    #[test]
    fn timeout_assertion_respects_the_boundary() {
        let mut engine = Engine::new(started_game(60, 0, 0));
        assert_eq!(engine.assert_timeout(60).unwrap_err().code(), 2314);

        let events = engine.assert_timeout(61).expect("timed out");
        assert_eq!(
            events,
            vec![EngineEvent::Ended {
                winner: Winner::Away,
                conclusion: Conclusion::OutOfTime
            }]
        );
        assert_eq!(engine.game.ended_at, Some(60));
    }

    #[test]
    fn turn_number_is_strictly_monotonic() {
        let mut engine = Engine::new(started_game(600, 0, 2));
        let line = [
            (Side::Host, mv(1, 4, 3, 4)),
            (Side::Away, mv(6, 4, 4, 4)),
            (Side::Host, mv(0, 6, 2, 5)),
            (Side::Away, mv(7, 6, 5, 5)),
        ];
        let mut previous = engine.game.turn_number;
        for (i, (side, m)) in line.into_iter().enumerate() {
            engine.make_move(side, m, i as i64 + 1).expect("move");
            assert!(engine.game.turn_number > previous);
            previous = engine.game.turn_number;
        }
    }
}
