//! Matchmaking and game endpoint tests.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::*;

fn blitz_body(session_id: i64) -> serde_json::Value {
    json!({
        "session_id": session_id,
        "session_token": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, TOKEN),
        "main_thinking_time": 600,
        "fixed_extra_time": 0,
        "time_increment_per_turn": 5,
        "mode": 1,
    })
}

#[tokio::test]
async fn find_pairs_two_waiting_users() {
    let state = test_state().await;
    let app = router(&state);
    let host_id = register_verified(&app, &state, "host").await;
    let joiner_id = register_verified(&app, &state, "joiner").await;
    let (host_session, _) = login(&app, &state, "host").await;
    let (joiner_session, _) = login(&app, &state, "joiner").await;

    let (status, body) =
        send_encrypted(&app, &state, "/games/find", blitz_body(host_session)).await;
    assert_eq!(status, StatusCode::OK, "find failed: {body}");
    let game_id = body["game_id"].as_i64().expect("game id");

    // Same profile, second caller: joins the same game.
    let (_, body) = send_encrypted(&app, &state, "/games/find", blitz_body(joiner_session)).await;
    assert_eq!(body["game_id"].as_i64(), Some(game_id));

    let game = state
        .store
        .game(game_id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(game.host_id, host_id);
    assert_eq!(game.away_id, Some(joiner_id));
    assert!(game.is_started());

    // The host is told a match was found.
    let (notifications, _) = state
        .store
        .notifications_for(host_id, 100, 0)
        .await
        .expect("notifications");
    assert!(notifications
        .iter()
        .any(|n| n.type_code == "matchmaking.match_found" && n.game_id == Some(game_id)));
}

#[tokio::test]
async fn find_requires_a_verified_email() {
    let state = test_state().await;
    let app = router(&state);
    register_verified(&app, &state, "other").await;

    // Create an unverified account directly through the endpoint.
    let (status, _) = send_encrypted(
        &app,
        &state,
        "/accounts/create",
        json!({
            "username": "unverified",
            "password": "correct horse battery",
            "email": "unverified@example.com",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (session, _) = login(&app, &state, "unverified").await;

    let (status, body) = send_encrypted(&app, &state, "/games/find", blitz_body(session)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], 1307);
}

#[tokio::test]
async fn find_rejects_malformed_time_controls() {
    let state = test_state().await;
    let app = router(&state);
    register_verified(&app, &state, "host").await;
    let (session, _) = login(&app, &state, "host").await;

    let mut body = blitz_body(session);
    body["main_thinking_time"] = json!(-5);
    let (_, response) = send_encrypted(&app, &state, "/games/find", body).await;
    assert_eq!(response["error"], 3117);

    let mut body = blitz_body(session);
    body["mode"] = json!(9);
    let (_, response) = send_encrypted(&app, &state, "/games/find", body).await;
    assert_eq!(response["error"], 3114);

    let mut body = blitz_body(session);
    body.as_object_mut().expect("object").remove("mode");
    let (_, response) = send_encrypted(&app, &state, "/games/find", body).await;
    assert_eq!(response["error"], 3101);
}

#[tokio::test]
async fn invitation_flow_accept() {
    let state = test_state().await;
    let app = router(&state);
    let host_id = register_verified(&app, &state, "host").await;
    let guest_id = register_verified(&app, &state, "guest").await;
    let (host_session, _) = login(&app, &state, "host").await;
    let (guest_session, guest_token) = login(&app, &state, "guest").await;

    let mut body = blitz_body(host_session);
    body["invitee"] = json!("guest");
    let (status, response) =
        send_encrypted(&app, &state, "/games/send_invitation", body).await;
    assert_eq!(status, StatusCode::OK, "invite failed: {response}");
    let game_id = response["game_id"].as_i64().expect("game id");

    // The invitee sees it in their invites list.
    let (_, list) = send_get(
        &app,
        &format!("/games/invites?{}", session_query(guest_session, &guest_token)),
    )
    .await;
    let games = list["games"].as_array().expect("games");
    assert_eq!(games.len(), 1);
    assert_eq!(games[0]["id"].as_i64(), Some(game_id));
    assert_eq!(games[0]["invited"].as_i64(), Some(guest_id));
    // Referenced users arrive in the parallel array.
    let users = list["users"].as_array().expect("users");
    assert!(users.iter().any(|u| u["id"].as_i64() == Some(host_id)));

    let (status, _) = send_json(
        &app,
        "POST",
        &format!("/games/invites/{game_id}"),
        json!({
            "session_id": guest_session,
            "session_token": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, TOKEN),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let game = state
        .store
        .game(game_id)
        .await
        .expect("query")
        .expect("exists");
    assert!(game.is_started());
    assert_eq!(game.invited_id, None);
    assert_eq!(game.away_id, Some(guest_id));

    let (notifications, _) = state
        .store
        .notifications_for(host_id, 100, 0)
        .await
        .expect("notifications");
    assert!(notifications
        .iter()
        .any(|n| n.type_code == "matchmaking.invite_accepted"));
}

#[tokio::test]
async fn invitation_flow_decline_removes_the_game() {
    let state = test_state().await;
    let app = router(&state);
    let host_id = register_verified(&app, &state, "host").await;
    register_verified(&app, &state, "guest").await;
    let (host_session, _) = login(&app, &state, "host").await;
    let (guest_session, guest_token) = login(&app, &state, "guest").await;

    let mut body = blitz_body(host_session);
    body["invitee"] = json!("guest");
    let (_, response) = send_encrypted(&app, &state, "/games/send_invitation", body).await;
    let game_id = response["game_id"].as_i64().expect("game id");

    let (status, _) = send_delete(
        &app,
        &format!(
            "/games/invites/{game_id}?{}",
            session_query(guest_session, &guest_token)
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The row is gone; a lookup now 404s at the taxonomy level.
    let (status, body) = send_get(&app, &format!("/games/{game_id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], 2001);

    let (notifications, _) = state
        .store
        .notifications_for(host_id, 100, 0)
        .await
        .expect("notifications");
    assert!(notifications
        .iter()
        .any(|n| n.type_code == "matchmaking.invite_declined"));
}

#[tokio::test]
async fn self_invitations_are_rejected() {
    let state = test_state().await;
    let app = router(&state);
    register_verified(&app, &state, "host").await;
    let (session, _) = login(&app, &state, "host").await;

    let mut body = blitz_body(session);
    body["invitee"] = json!("host");
    let (_, response) = send_encrypted(&app, &state, "/games/send_invitation", body).await;
    assert_eq!(response["error"], 2121);
}

#[tokio::test]
async fn included_game_embeds_its_users() {
    let state = test_state().await;
    let app = router(&state);
    register_verified(&app, &state, "host").await;
    register_verified(&app, &state, "joiner").await;
    let (host_session, _) = login(&app, &state, "host").await;
    let (joiner_session, _) = login(&app, &state, "joiner").await;

    let (_, body) = send_encrypted(&app, &state, "/games/find", blitz_body(host_session)).await;
    let game_id = body["game_id"].as_i64().expect("game id");
    send_encrypted(&app, &state, "/games/find", blitz_body(joiner_session)).await;

    let (status, body) = send_get(&app, &format!("/games/{game_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["host"]["username"], "host");
    assert_eq!(body["away"]["username"], "joiner");
    assert_eq!(body["mode"], 1);
    assert_eq!(body["winner"], 1, "not complete yet");
}
