//! Per-game hubs and socket fan-out.
//!
//! Each live game has one hub task owning its engine. Every command —
//! socket events, REST-triggered starts, sweep timeouts — goes through
//! the hub's channel and is processed strictly in arrival order, which is
//! what makes the engine's state machine reasoning sequential: a move
//! arriving after the sweep's timeout assertion simply finds the game
//! finished. Fan-out is per-socket ordered; a failed send to one socket
//! never rolls state back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chess_rules::{legal_moves, Side};
use shared::{
    board_to_wire, side_code, AllowedMovesWire, ClientEvent, DisconnectReason, GameStateWire,
    ServerEvent, WireMove,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::elo;
use crate::engine::{Engine, EngineEvent};
use crate::error::{ApiError, ApiResult};
use crate::models::{unix_now, Game};
use crate::notifications::{result_codes, Notifier};
use crate::db::Store;

/// All live sockets per user, across every hub. The notification queue
/// uses this to deliver live; hubs keep their own per-game socket map.
pub struct SocketIndex {
    next_id: AtomicU64,
    inner: StdMutex<HashMap<i64, Vec<(u64, mpsc::UnboundedSender<ServerEvent>)>>>,
}

impl Default for SocketIndex {
    fn default() -> Self {
        SocketIndex::new()
    }
}

impl SocketIndex {
    pub fn new() -> SocketIndex {
        SocketIndex {
            next_id: AtomicU64::new(1),
            inner: StdMutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Vec<(u64, mpsc::UnboundedSender<ServerEvent>)>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, user_id: i64, tx: mpsc::UnboundedSender<ServerEvent>) -> u64 {
        let socket_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().entry(user_id).or_default().push((socket_id, tx));
        socket_id
    }

    pub fn unregister(&self, user_id: i64, socket_id: u64) {
        let mut inner = self.lock();
        if let Some(sockets) = inner.get_mut(&user_id) {
            sockets.retain(|(id, _)| *id != socket_id);
            if sockets.is_empty() {
                inner.remove(&user_id);
            }
        }
    }

    /// Deliver an event to every open socket of a user. Returns whether at
    /// least one socket accepted it.
    pub fn deliver(&self, user_id: i64, event: &ServerEvent) -> bool {
        let mut inner = self.lock();
        let Some(sockets) = inner.get_mut(&user_id) else {
            return false;
        };
        sockets.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        let delivered = !sockets.is_empty();
        if !delivered {
            inner.remove(&user_id);
        }
        delivered
    }
}

/// Commands a hub processes, one at a time.
#[derive(Debug)]
pub enum HubCommand {
    /// A socket joined the game.
    Connect {
        user_id: i64,
        socket: mpsc::UnboundedSender<ServerEvent>,
    },
    /// A client event from a connected socket.
    Event { user_id: i64, event: ClientEvent },
    /// The second player arrived (via find or invitation accept).
    GameStarted,
    /// The invitee declined; disconnect the waiting host and stop.
    InviteDeclined,
    /// The background sweep believes the side to move has flagged.
    SweepTimeout { now: i64 },
}

/// Dependencies every hub task needs.
#[derive(Clone)]
pub struct HubContext {
    pub store: Store,
    pub notifier: Arc<Notifier>,
    pub elo_k: f64,
}

pub struct HubRegistry {
    context: HubContext,
    hubs: Mutex<HashMap<i64, mpsc::Sender<HubCommand>>>,
}

impl HubRegistry {
    pub fn new(context: HubContext) -> HubRegistry {
        HubRegistry {
            context,
            hubs: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.context.store
    }

    /// The hub for a live game, spawning it on first use. Fails if the
    /// game does not exist or has already finished.
    pub async fn hub(&self, game_id: i64) -> ApiResult<mpsc::Sender<HubCommand>> {
        let mut hubs = self.hubs.lock().await;
        if let Some(tx) = hubs.get(&game_id) {
            if !tx.is_closed() {
                return Ok(tx.clone());
            }
        }
        let game = self
            .context
            .store
            .game(game_id)
            .await?
            .ok_or(ApiError::GameNotFound)?;
        if game.is_finished() {
            return Err(ApiError::GameAlreadyEnded);
        }
        let (tx, rx) = mpsc::channel(64);
        let hub = Hub {
            engine: Engine::new(game),
            sockets: HashMap::new(),
            ctx: self.context.clone(),
            finished: false,
        };
        tokio::spawn(hub.run(rx));
        hubs.insert(game_id, tx.clone());
        Ok(tx)
    }

    /// The hub for a game only if one is already running.
    pub async fn existing(&self, game_id: i64) -> Option<mpsc::Sender<HubCommand>> {
        let hubs = self.hubs.lock().await;
        hubs.get(&game_id).filter(|tx| !tx.is_closed()).cloned()
    }
}

/// Displayable state of a game for the wire.
pub fn game_state_wire(game: &Game) -> GameStateWire {
    GameStateWire {
        board: board_to_wire(&game.position),
        host_time: game.host_time,
        away_time: game.away_time,
        last_turn: game.last_turn.or(game.started_at).unwrap_or(game.opened_at),
        current_turn: side_code(game.current_turn),
        turn_number: game.turn_number,
    }
}

/// Allowed moves for the player on move, with any standing draw claim.
pub fn allowed_moves_wire(game: &Game) -> AllowedMovesWire {
    AllowedMovesWire {
        moves: legal_moves(&game.position, game.current_turn)
            .into_iter()
            .map(WireMove::from)
            .collect(),
        draw_claim: game.other_valid_draw_claim,
    }
}

struct Hub {
    engine: Engine,
    /// One socket per user on this game; a second connect displaces the
    /// first.
    sockets: HashMap<i64, mpsc::UnboundedSender<ServerEvent>>,
    ctx: HubContext,
    finished: bool,
}

impl Hub {
    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>) {
        let game_id = self.engine.game.id;
        tracing::debug!(game_id, "hub started");
        while let Some(command) = rx.recv().await {
            match command {
                HubCommand::Connect { user_id, socket } => self.connect(user_id, socket),
                HubCommand::Event { user_id, event } => self.handle_event(user_id, event).await,
                HubCommand::GameStarted => self.game_started().await,
                HubCommand::InviteDeclined => {
                    self.broadcast(ServerEvent::GameDisconnect {
                        reason: DisconnectReason::InviteDeclined,
                    });
                    self.finished = true;
                }
                HubCommand::SweepTimeout { now } => self.sweep_timeout(now).await,
            }
            if self.finished {
                break;
            }
        }
        tracing::debug!(game_id, "hub stopped");
    }

    fn connect(&mut self, user_id: i64, socket: mpsc::UnboundedSender<ServerEvent>) {
        if self.engine.game.side_of(user_id).is_none() {
            // Membership was validated at upgrade time; this can only be a
            // stale connect racing account deletion.
            tracing::warn!(user_id, game_id = self.engine.game.id, "non-participant connect");
            return;
        }
        if let Some(old) = self.sockets.insert(user_id, socket) {
            let _ = old.send(ServerEvent::GameDisconnect {
                reason: DisconnectReason::NewConnectionSameAccount,
            });
        }
        if self.engine.game.is_started() {
            self.send_to_user(
                user_id,
                ServerEvent::GameState(game_state_wire(&self.engine.game)),
            );
            let your_turn = self.engine.game.in_progress()
                && self.engine.game.side_of(user_id) == Some(self.engine.game.current_turn);
            if your_turn {
                self.send_to_user(
                    user_id,
                    ServerEvent::AllowedMoves(allowed_moves_wire(&self.engine.game)),
                );
            }
        }
    }

    async fn handle_event(&mut self, user_id: i64, event: ClientEvent) {
        let Some(side) = self.engine.game.side_of(user_id) else {
            self.send_error(user_id, &ApiError::SocketSessionNotKnown);
            return;
        };
        let now = unix_now();
        let result = match event {
            ClientEvent::GameState => {
                if self.engine.game.in_progress() {
                    self.send_to_user(
                        user_id,
                        ServerEvent::GameState(game_state_wire(&self.engine.game)),
                    );
                    Ok(())
                } else {
                    Err(ApiError::NotInProgress)
                }
            }
            ClientEvent::AllowedMoves => {
                if !self.engine.game.in_progress() {
                    Err(ApiError::NotInProgress)
                } else if side != self.engine.game.current_turn {
                    Err(ApiError::NotYourTurn)
                } else {
                    self.send_to_user(
                        user_id,
                        ServerEvent::AllowedMoves(allowed_moves_wire(&self.engine.game)),
                    );
                    Ok(())
                }
            }
            ClientEvent::Move { r#move } => match r#move.to_move() {
                Some(mv) => self.run_command(|engine| engine.make_move(side, mv, now)).await,
                None => Err(ApiError::InvalidEnumValue),
            },
            ClientEvent::OfferDraw => self.run_command(|engine| engine.offer_draw(side)).await,
            ClientEvent::ClaimDraw { reason } => {
                self.run_command(|engine| engine.claim_draw(side, reason, now))
                    .await
            }
            ClientEvent::Resign => self.run_command(|engine| engine.resign(side, now)).await,
            ClientEvent::Timeout => self.run_command(|engine| engine.assert_timeout(now)).await,
        };
        if let Err(err) = result {
            self.send_error(user_id, &err);
        }
    }

    async fn run_command(
        &mut self,
        command: impl FnOnce(&mut Engine) -> ApiResult<Vec<EngineEvent>>,
    ) -> ApiResult<()> {
        let events = command(&mut self.engine)?;
        self.apply_events(events).await;
        Ok(())
    }

    /// Persist the post-command state and fan the events out.
    async fn apply_events(&mut self, events: Vec<EngineEvent>) {
        if let Err(err) = self.ctx.store.save_game(&self.engine.game).await {
            // The in-memory machine is the ground truth while the hub is
            // alive; clients resync via game_state after a crash.
            tracing::error!(game_id = self.engine.game.id, %err, "game persist failed");
        }
        let ended = events
            .iter()
            .any(|event| matches!(event, EngineEvent::Ended { .. }));
        for event in events {
            match event {
                EngineEvent::Moved { by, mv } => {
                    if ended {
                        // The final position travels inside game_end.
                        continue;
                    }
                    let state = game_state_wire(&self.engine.game);
                    let allowed = allowed_moves_wire(&self.engine.game);
                    let game_id = self.engine.game.id;
                    let opponent = by.opponent();
                    let opponent_id = self.engine.game.user_of(opponent);
                    self.send_to_side(by, ServerEvent::GameState(state.clone()));
                    let delivered = self.send_to_side(
                        opponent,
                        ServerEvent::Move {
                            r#move: WireMove::from(mv),
                            game_state: state,
                            allowed_moves: allowed,
                        },
                    );
                    if !delivered {
                        if let Some(opponent_id) = opponent_id {
                            let _ = self
                                .ctx
                                .notifier
                                .send(
                                    opponent_id,
                                    shared::NotificationCode::OngoingTurn,
                                    Some(game_id),
                                )
                                .await;
                        }
                    }
                }
                EngineEvent::DrawOffered { by } => {
                    let opponent = by.opponent();
                    self.send_to_side(opponent, ServerEvent::DrawOffer);
                    if let Some(opponent_id) = self.engine.game.user_of(opponent) {
                        let _ = self
                            .ctx
                            .notifier
                            .send(
                                opponent_id,
                                shared::NotificationCode::OngoingDrawOffer,
                                Some(self.engine.game.id),
                            )
                            .await;
                    }
                }
                EngineEvent::Ended { winner, conclusion } => {
                    self.finish(winner, conclusion).await;
                }
            }
        }
    }

    /// End-of-game side effects: rating settlement, result notifications,
    /// final fan-out, socket teardown.
    async fn finish(&mut self, winner: shared::Winner, conclusion: shared::Conclusion) {
        let game = &self.engine.game;
        let game_id = game.id;
        tracing::info!(game_id, ?winner, ?conclusion, "game finished");

        if let Some(away_id) = game.away_id {
            match (
                self.ctx.store.user_by_id(game.host_id).await,
                self.ctx.store.user_by_id(away_id).await,
            ) {
                (Ok(Some(host)), Ok(Some(away))) => {
                    let (host_elo, away_elo) =
                        elo::settle(host.elo, away.elo, winner, self.ctx.elo_k);
                    let _ = self.ctx.store.update_elo(host.id, host_elo).await;
                    let _ = self.ctx.store.update_elo(away.id, away_elo).await;
                }
                _ => tracing::error!(game_id, "could not load players for rating settlement"),
            }
        }

        for (side, code) in result_codes(winner, conclusion) {
            if let Some(user_id) = self.engine.game.user_of(side) {
                if let Err(err) = self.ctx.notifier.send(user_id, code, Some(game_id)).await {
                    tracing::warn!(game_id, user_id, %err, "result notification failed");
                }
            }
        }

        let state = game_state_wire(&self.engine.game);
        self.broadcast(ServerEvent::GameEnd {
            game_state: state,
            reason: conclusion,
        });
        self.broadcast(ServerEvent::GameDisconnect {
            reason: DisconnectReason::GameOver,
        });
        self.sockets.clear();
        self.finished = true;
    }

    async fn game_started(&mut self) {
        // The matchmaker mutated the row; pick up the fresh state.
        match self.ctx.store.game(self.engine.game.id).await {
            Ok(Some(game)) => self.engine = Engine::new(game),
            Ok(None) => {
                tracing::warn!(game_id = self.engine.game.id, "started game vanished");
                self.finished = true;
                return;
            }
            Err(err) => {
                tracing::error!(game_id = self.engine.game.id, %err, "game reload failed");
                return;
            }
        }
        self.broadcast(ServerEvent::GameStart);
    }

    async fn sweep_timeout(&mut self, now: i64) {
        match self.engine.assert_timeout(now) {
            Ok(events) => self.apply_events(events).await,
            // The clock was fed (a move landed before this command) or the
            // game already ended; either way there is nothing to do.
            Err(_) => {}
        }
    }

    fn send_to_user(&mut self, user_id: i64, event: ServerEvent) -> bool {
        match self.sockets.get(&user_id) {
            Some(tx) => {
                if tx.send(event).is_ok() {
                    true
                } else {
                    self.sockets.remove(&user_id);
                    false
                }
            }
            None => false,
        }
    }

    fn send_to_side(&mut self, side: Side, event: ServerEvent) -> bool {
        match self.engine.game.user_of(side) {
            Some(user_id) => self.send_to_user(user_id, event),
            None => false,
        }
    }

    fn send_error(&mut self, user_id: i64, err: &ApiError) {
        self.send_to_user(
            user_id,
            ServerEvent::BadRequest {
                error: err.code(),
                message: err.public_message(),
            },
        );
    }

    fn broadcast(&mut self, event: ServerEvent) {
        let user_ids: Vec<i64> = self.sockets.keys().copied().collect();
        for user_id in user_ids {
            self.send_to_user(user_id, event.clone());
        }
    }
}

/// Walk all started games on a timer and post a timeout assertion for any
/// whose side to move has exhausted their clock. This is what stops a
/// silent client from winning by hiding from a flagged opponent.
pub fn spawn_sweep(registry: Arc<HubRegistry>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = unix_now();
            let games = match registry.store().live_games().await {
                Ok(games) => games,
                Err(err) => {
                    tracing::error!(%err, "sweep query failed");
                    continue;
                }
            };
            for game in games {
                let basis = game.last_turn.or(game.started_at).unwrap_or(game.opened_at);
                let remaining = game.time_of(game.current_turn) - (now - basis);
                if remaining >= 0 {
                    continue;
                }
                match registry.hub(game.id).await {
                    Ok(tx) => {
                        let _ = tx.send(HubCommand::SweepTimeout { now }).await;
                    }
                    Err(err) => {
                        tracing::debug!(game_id = game.id, %err, "sweep skipped game");
                    }
                }
            }
        }
    })
}
