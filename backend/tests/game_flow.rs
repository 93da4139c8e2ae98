//! End-to-end play through the hub: sockets are plain channels here, so
//! these tests exercise command serialisation, fan-out routing, rating
//! settlement and result notifications without a real WebSocket.

mod common;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use backend::hub::{spawn_sweep, HubCommand};
use backend::models::{unix_now, TimeControl};
use backend::state::AppState;
use shared::{ClientEvent, Conclusion, DisconnectReason, Mode, ServerEvent, WireMove, Winner};

use common::*;

fn profile(main: i64) -> TimeControl {
    TimeControl {
        main_thinking_time: main,
        fixed_extra_time: 0,
        time_increment_per_turn: 0,
        mode: Mode::Chess,
    }
}

fn wire_move(start_rank: i8, start_file: i8, end_rank: i8, end_file: i8) -> WireMove {
    WireMove {
        start_rank,
        start_file,
        end_rank,
        end_file,
        promotion: None,
    }
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("socket channel closed")
}

/// Create two verified users and a started game between them, returning
/// `(game_id, host_id, away_id)`.
async fn started_game(state: &AppState, main: i64) -> (i64, i64, i64) {
    let app = router(state);
    let host_id = register_verified(&app, state, "host").await;
    let away_id = register_verified(&app, state, "away").await;
    let host = state
        .store
        .user_by_id(host_id)
        .await
        .expect("query")
        .expect("host");
    let away = state
        .store
        .user_by_id(away_id)
        .await
        .expect("query")
        .expect("away");
    let now = unix_now();
    let outcome = state
        .matchmaker
        .find(&host, profile(main), now)
        .await
        .expect("host find");
    assert!(!outcome.started);
    let outcome = state
        .matchmaker
        .find(&away, profile(main), now)
        .await
        .expect("away find");
    assert!(outcome.started);
    (outcome.game.id, host_id, away_id)
}

/// Connect a user to a game's hub, returning the event receiver.
async fn connect(
    state: &AppState,
    game_id: i64,
    user_id: i64,
) -> mpsc::UnboundedReceiver<ServerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    state.sockets.register(user_id, tx.clone());
    let hub = state.hubs.hub(game_id).await.expect("hub");
    hub.send(HubCommand::Connect {
        user_id,
        socket: tx,
    })
    .await
    .expect("connect");
    rx
}

async fn send_event(state: &AppState, game_id: i64, user_id: i64, event: ClientEvent) {
    let hub = state.hubs.hub(game_id).await.expect("hub");
    hub.send(HubCommand::Event { user_id, event })
        .await
        .expect("send event");
}

#[tokio::test]
async fn connecting_to_a_started_game_sends_state_and_moves() {
    let state = test_state().await;
    let (game_id, host_id, _) = started_game(&state, 600).await;

    let mut host_rx = connect(&state, game_id, host_id).await;
    match recv(&mut host_rx).await {
        ServerEvent::GameState(game_state) => {
            assert_eq!(game_state.turn_number, 0);
            assert_eq!(game_state.current_turn, 1);
            assert_eq!(game_state.board.len(), 32);
        }
        other => panic!("expected game_state, got {other:?}"),
    }
    // It is the host's turn, so allowed moves follow immediately.
    match recv(&mut host_rx).await {
        ServerEvent::AllowedMoves(allowed) => assert_eq!(allowed.moves.len(), 20),
        other => panic!("expected allowed_moves, got {other:?}"),
    }
}

#[tokio::test]
async fn a_second_connection_displaces_the_first() {
    let state = test_state().await;
    let (game_id, host_id, _) = started_game(&state, 600).await;

    let mut first = connect(&state, game_id, host_id).await;
    recv(&mut first).await; // game_state
    recv(&mut first).await; // allowed_moves

    let mut second = connect(&state, game_id, host_id).await;
    match recv(&mut first).await {
        ServerEvent::GameDisconnect { reason } => {
            assert_eq!(reason, DisconnectReason::NewConnectionSameAccount)
        }
        other => panic!("expected game_disconnect, got {other:?}"),
    }
    // The replacement socket works normally.
    match recv(&mut second).await {
        ServerEvent::GameState(_) => {}
        other => panic!("expected game_state, got {other:?}"),
    }
}

#[tokio::test]
async fn moves_fan_out_to_the_opponent_with_allowed_moves() {
    let state = test_state().await;
    let (game_id, host_id, away_id) = started_game(&state, 600).await;

    let mut host_rx = connect(&state, game_id, host_id).await;
    recv(&mut host_rx).await;
    recv(&mut host_rx).await;
    let mut away_rx = connect(&state, game_id, away_id).await;
    recv(&mut away_rx).await; // game_state (not their turn, no allowed_moves)

    send_event(
        &state,
        game_id,
        host_id,
        ClientEvent::Move {
            r#move: wire_move(1, 4, 3, 4),
        },
    )
    .await;

    // Mover gets a state acknowledgement.
    match recv(&mut host_rx).await {
        ServerEvent::GameState(game_state) => {
            assert_eq!(game_state.turn_number, 1);
            assert_eq!(game_state.current_turn, 2);
        }
        other => panic!("expected game_state ack, got {other:?}"),
    }
    // Opponent gets the move with their options attached.
    match recv(&mut away_rx).await {
        ServerEvent::Move {
            r#move,
            game_state,
            allowed_moves,
        } => {
            assert_eq!(r#move, wire_move(1, 4, 3, 4));
            assert_eq!(game_state.turn_number, 1);
            assert_eq!(allowed_moves.moves.len(), 20);
        }
        other => panic!("expected move event, got {other:?}"),
    }
}

#[tokio::test]
async fn engine_errors_come_back_as_bad_request_events() {
    let state = test_state().await;
    let (game_id, _host_id, away_id) = started_game(&state, 600).await;
    let mut away_rx = connect(&state, game_id, away_id).await;
    recv(&mut away_rx).await; // game_state

    // Away tries to move out of turn.
    send_event(
        &state,
        game_id,
        away_id,
        ClientEvent::Move {
            r#move: wire_move(6, 4, 4, 4),
        },
    )
    .await;
    match recv(&mut away_rx).await {
        ServerEvent::BadRequest { error, .. } => assert_eq!(error, 2312),
        other => panic!("expected bad_request, got {other:?}"),
    }

    // Premature timeout claim.
    send_event(&state, game_id, away_id, ClientEvent::Timeout).await;
    match recv(&mut away_rx).await {
        ServerEvent::BadRequest { error, .. } => assert_eq!(error, 2314),
        other => panic!("expected bad_request, got {other:?}"),
    }
}

#[tokio::test]
async fn scholars_mate_over_the_hub_settles_ratings_and_notifies() {
    let state = test_state().await;
    let (game_id, host_id, away_id) = started_game(&state, 600).await;

    let mut host_rx = connect(&state, game_id, host_id).await;
    recv(&mut host_rx).await;
    recv(&mut host_rx).await;
    let mut away_rx = connect(&state, game_id, away_id).await;
    recv(&mut away_rx).await;

    let line: [(i64, WireMove); 7] = [
        (host_id, wire_move(1, 4, 3, 4)),
        (away_id, wire_move(6, 4, 4, 4)),
        (host_id, wire_move(0, 5, 3, 2)),
        (away_id, wire_move(7, 1, 5, 2)),
        (host_id, wire_move(0, 3, 4, 7)),
        (away_id, wire_move(7, 6, 5, 5)),
        (host_id, wire_move(4, 7, 6, 5)),
    ];
    for (user_id, mv) in line {
        send_event(&state, game_id, user_id, ClientEvent::Move { r#move: mv }).await;
    }

    // Drain until game_end on both sockets; both then get disconnected.
    let mut saw_end = (false, false);
    for (rx, flag) in [(&mut host_rx, 0usize), (&mut away_rx, 1usize)] {
        loop {
            match recv(rx).await {
                ServerEvent::GameEnd { game_state, reason } => {
                    assert_eq!(reason, Conclusion::Checkmate);
                    assert!(game_state.board.len() < 33);
                    if flag == 0 {
                        saw_end.0 = true;
                    } else {
                        saw_end.1 = true;
                    }
                }
                ServerEvent::GameDisconnect { reason } => {
                    assert_eq!(reason, DisconnectReason::GameOver);
                    break;
                }
                _ => {}
            }
        }
    }
    assert!(saw_end.0 && saw_end.1, "both sockets saw game_end");

    let game = state
        .store
        .game(game_id)
        .await
        .expect("query")
        .expect("exists");
    assert!(game.is_finished());
    assert_eq!(game.winner, Winner::Host);
    assert_eq!(game.conclusion, Conclusion::Checkmate);

    // Elo moved 16 points each way (equal ratings, K=32).
    let host = state.store.user_by_id(host_id).await.expect("q").expect("host");
    let away = state.store.user_by_id(away_id).await.expect("q").expect("away");
    assert_eq!(host.elo, 1016);
    assert_eq!(away.elo, 984);

    // One result notification each.
    let (host_notes, _) = state
        .store
        .notifications_for(host_id, 100, 0)
        .await
        .expect("notes");
    assert!(host_notes.iter().any(|n| n.type_code == "games.win.checkmate"));
    let (away_notes, _) = state
        .store
        .notifications_for(away_id, 100, 0)
        .await
        .expect("notes");
    assert!(away_notes.iter().any(|n| n.type_code == "games.loss.checkmate"));
}

#[tokio::test]
async fn agreed_draw_flows_through_offer_and_claim() {
    let state = test_state().await;
    let (game_id, host_id, away_id) = started_game(&state, 600).await;

    let mut host_rx = connect(&state, game_id, host_id).await;
    recv(&mut host_rx).await;
    recv(&mut host_rx).await;
    let mut away_rx = connect(&state, game_id, away_id).await;
    recv(&mut away_rx).await;

    send_event(&state, game_id, host_id, ClientEvent::OfferDraw).await;
    match recv(&mut away_rx).await {
        ServerEvent::DrawOffer => {}
        other => panic!("expected draw_offer, got {other:?}"),
    }
    // The offer also lands in the opponent's notification queue.
    match recv(&mut away_rx).await {
        ServerEvent::Notification(notification) => {
            assert_eq!(
                notification.type_code,
                shared::NotificationCode::OngoingDrawOffer
            );
        }
        other => panic!("expected notification, got {other:?}"),
    }

    send_event(
        &state,
        game_id,
        away_id,
        ClientEvent::ClaimDraw {
            reason: Conclusion::AgreedDraw,
        },
    )
    .await;
    // The result notification may land on the socket before game_end.
    loop {
        match recv(&mut away_rx).await {
            ServerEvent::GameEnd { reason, .. } => {
                assert_eq!(reason, Conclusion::AgreedDraw);
                break;
            }
            ServerEvent::Notification(_) => {}
            other => panic!("expected game_end, got {other:?}"),
        }
    }

    let game = state
        .store
        .game(game_id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(game.winner, Winner::Draw);
    let (notes, _) = state
        .store
        .notifications_for(host_id, 100, 0)
        .await
        .expect("notes");
    assert!(notes.iter().any(|n| n.type_code == "games.draw.agreed"));
}

#[tokio::test]
async fn premature_agreed_claim_is_rejected() {
    let state = test_state().await;
    let (game_id, _, away_id) = started_game(&state, 600).await;
    let mut away_rx = connect(&state, game_id, away_id).await;
    recv(&mut away_rx).await;

    send_event(
        &state,
        game_id,
        away_id,
        ClientEvent::ClaimDraw {
            reason: Conclusion::AgreedDraw,
        },
    )
    .await;
    match recv(&mut away_rx).await {
        ServerEvent::BadRequest { error, .. } => assert_eq!(error, 2322),
        other => panic!("expected bad_request, got {other:?}"),
    }
}

#[tokio::test]
async fn the_sweep_times_out_a_silent_player() {
    let state = test_state().await;
    let (game_id, host_id, away_id) = started_game(&state, 1).await;

    let mut away_rx = connect(&state, game_id, away_id).await;
    recv(&mut away_rx).await; // game_state

    // Nobody moves; the host's one-second clock drains.
    spawn_sweep(state.hubs.clone(), Duration::from_millis(200));

    let mut finished = None;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let game = state
            .store
            .game(game_id)
            .await
            .expect("query")
            .expect("exists");
        if game.is_finished() {
            finished = Some(game);
            break;
        }
    }
    let game = finished.expect("the sweep should have ended the game");
    assert_eq!(game.winner, Winner::Away);
    assert_eq!(game.conclusion, Conclusion::OutOfTime);
    // The end instant is pinned to clock exhaustion.
    assert_eq!(game.ended_at, game.started_at.map(|s| s + 1));

    let (notes, _) = state
        .store
        .notifications_for(host_id, 100, 0)
        .await
        .expect("notes");
    assert!(notes.iter().any(|n| n.type_code == "games.loss.time"));
    let (notes, _) = state
        .store
        .notifications_for(away_id, 100, 0)
        .await
        .expect("notes");
    assert!(notes.iter().any(|n| n.type_code == "games.win.time"));
}

#[tokio::test]
async fn declined_invitation_disconnects_the_waiting_host() {
    let state = test_state().await;
    let app = router(&state);
    let host_id = register_verified(&app, &state, "host").await;
    let guest_id = register_verified(&app, &state, "guest").await;
    let host = state
        .store
        .user_by_id(host_id)
        .await
        .expect("q")
        .expect("host");
    let guest = state
        .store
        .user_by_id(guest_id)
        .await
        .expect("q")
        .expect("guest");

    let game = state
        .matchmaker
        .send_invitation(&host, &guest, profile(600), unix_now())
        .await
        .expect("invite");

    // The host waits on the hub; no emissions before the game starts.
    let mut host_rx = connect(&state, game.id, host_id).await;

    let removed = state
        .matchmaker
        .decline_invitation(guest_id, game.id)
        .await
        .expect("decline");
    let hub = state.hubs.existing(removed.id).await.expect("hub running");
    hub.send(HubCommand::InviteDeclined).await.expect("command");

    match recv(&mut host_rx).await {
        ServerEvent::GameDisconnect { reason } => {
            assert_eq!(reason, DisconnectReason::InviteDeclined)
        }
        other => panic!("expected game_disconnect, got {other:?}"),
    }
    assert!(state.store.game(game.id).await.expect("query").is_none());
}
