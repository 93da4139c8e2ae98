//! Matchmaking: find-or-join pairing and invitation flows.
//!
//! The pending index maps an exact time-control profile to the single
//! open "find" game awaiting a second player. All pairing runs under the
//! index lock, so two simultaneous finders of the same profile bind
//! exactly once: one joins the pending game, the other creates the next
//! one. The store stays the source of truth across restarts; the index
//! is primed from it at startup.

use std::collections::HashMap;

use chess_rules::{fingerprint, Position, Side};
use shared::{Conclusion, Winner};
use tokio::sync::Mutex;

use crate::clock;
use crate::db::Store;
use crate::error::{ApiError, ApiResult};
use crate::models::{Game, TimeControl, User};

pub struct Matchmaker {
    store: Store,
    pending: Mutex<HashMap<TimeControl, i64>>,
}

pub struct FindOutcome {
    pub game: Game,
    /// True when the caller was paired into an existing search and the
    /// game has started.
    pub started: bool,
}

impl Matchmaker {
    /// Build the matchmaker, priming the pending index from open searches
    /// left over from a previous run.
    pub async fn load(store: Store) -> ApiResult<Matchmaker> {
        let mut pending = HashMap::new();
        for game in store.searching_games().await? {
            pending.insert(game.time_control(), game.id);
        }
        tracing::info!(searches = pending.len(), "matchmaker primed");
        Ok(Matchmaker {
            store,
            pending: Mutex::new(pending),
        })
    }

    /// Find a game matching the profile, or open a new search.
    pub async fn find(&self, user: &User, profile: TimeControl, now: i64) -> ApiResult<FindOutcome> {
        let mut pending = self.pending.lock().await;
        if let Some(&game_id) = pending.get(&profile) {
            match self.store.game(game_id).await? {
                Some(game) if game.host_id == user.id => {
                    // Idempotent re-find: the caller already owns the search.
                    return Ok(FindOutcome {
                        game,
                        started: false,
                    });
                }
                Some(mut game)
                    if !game.is_started() && !game.is_finished() && game.invited_id.is_none() =>
                {
                    pending.remove(&profile);
                    game.away_id = Some(user.id);
                    game.started_at = Some(now);
                    game.last_turn = Some(now);
                    self.store.save_game(&game).await?;
                    return Ok(FindOutcome {
                        game,
                        started: true,
                    });
                }
                _ => {
                    // The indexed game is gone or no longer pending.
                    pending.remove(&profile);
                }
            }
        }
        let game = self
            .store
            .insert_game(open_game(user.id, None, profile, now))
            .await?;
        pending.insert(profile, game.id);
        Ok(FindOutcome {
            game,
            started: false,
        })
    }

    /// Create a game only the named invitee may join.
    pub async fn send_invitation(
        &self,
        inviter: &User,
        invitee: &User,
        profile: TimeControl,
        now: i64,
    ) -> ApiResult<Game> {
        if inviter.id == invitee.id {
            return Err(ApiError::CannotInviteSelf);
        }
        self.store
            .insert_game(open_game(inviter.id, Some(invitee.id), profile, now))
            .await
    }

    pub async fn accept_invitation(&self, user_id: i64, game_id: i64, now: i64) -> ApiResult<Game> {
        let mut game = self
            .store
            .game(game_id)
            .await?
            .ok_or(ApiError::GameNotFound)?;
        if game.invited_id != Some(user_id) {
            return Err(ApiError::NotInvited);
        }
        game.invited_id = None;
        game.away_id = Some(user_id);
        game.started_at = Some(now);
        game.last_turn = Some(now);
        self.store.save_game(&game).await?;
        Ok(game)
    }

    /// Decline an invitation, removing the game. Returns the removed game
    /// so the caller can notify the host.
    pub async fn decline_invitation(&self, user_id: i64, game_id: i64) -> ApiResult<Game> {
        let game = self
            .store
            .game(game_id)
            .await?
            .ok_or(ApiError::GameNotFound)?;
        if game.invited_id != Some(user_id) {
            return Err(ApiError::NotInvited);
        }
        self.store.delete_game(game_id).await?;
        Ok(game)
    }

    /// Drop a search from the index (e.g. when its host deletes their
    /// account).
    pub async fn forget(&self, profile: TimeControl, game_id: i64) {
        let mut pending = self.pending.lock().await;
        if pending.get(&profile) == Some(&game_id) {
            pending.remove(&profile);
        }
    }

    #[cfg(test)]
    async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// A fresh game row in its opening state.
fn open_game(host_id: i64, invited_id: Option<i64>, profile: TimeControl, now: i64) -> Game {
    let position = Position::initial();
    let allowance = clock::initial_allowance(
        profile.main_thinking_time,
        profile.fixed_extra_time,
    );
    let history = vec![fingerprint(&position, Side::Host)];
    Game {
        id: 0,
        mode: profile.mode,
        host_id,
        away_id: None,
        invited_id,
        current_turn: Side::Host,
        turn_number: 0,
        main_thinking_time: profile.main_thinking_time,
        fixed_extra_time: profile.fixed_extra_time,
        time_increment_per_turn: profile.time_increment_per_turn,
        host_time: allowance,
        away_time: allowance,
        host_offering_draw: false,
        away_offering_draw: false,
        other_valid_draw_claim: None,
        halfmove_clock: 0,
        winner: Winner::GameNotComplete,
        conclusion: Conclusion::GameNotComplete,
        position,
        position_history: history,
        opened_at: now,
        started_at: None,
        last_turn: None,
        ended_at: None,
    }
}

/// Profile fields must be non-negative whole seconds.
pub fn validate_profile(profile: &TimeControl) -> ApiResult<()> {
    if profile.main_thinking_time < 0
        || profile.fixed_extra_time < 0
        || profile.time_increment_per_turn < 0
    {
        return Err(ApiError::NegativeDuration);
    }
    Ok(())
}
