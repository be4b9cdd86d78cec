#[allow(dead_code)]
mod common;

use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use pong_core::net::messages::{ClientMessage, ForfeitMsg, ServerMessage};

use pong_server::archive::{IDEMPOTENCY_HEADER, SIGNATURE_HEADER, sign_payload};
use pong_server::config::{ArchiveConfig, ServerConfig, TournamentConfig};

use common::{
    TestServer, poll_json, test_config, ws_connect, ws_read_server_msg, ws_read_until,
    ws_send_client_msg,
};

fn quick_rounds(allowed_sizes: Vec<u32>) -> ServerConfig {
    ServerConfig {
        tournament: TournamentConfig {
            ready_timeout_secs: 1,
            allowed_sizes,
        },
        ..test_config()
    }
}

async fn create(server: &TestServer, name: &str, size: u32, user: &str) -> u64 {
    let resp = server
        .post(
            "/api/v1/tournaments",
            json!({ "name": name, "size": size, "user": user }),
        )
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    body["tournament_id"].as_u64().unwrap()
}

async fn join(server: &TestServer, tid: u64, user: &str) -> bool {
    let resp = server
        .post(&format!("/api/v1/tournaments/{tid}/join"), json!({ "user": user }))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    body["started"].as_bool().unwrap()
}

async fn ready(server: &TestServer, match_id: u64, user: &str) -> Value {
    let resp = server
        .post(&format!("/api/v1/matches/{match_id}/ready"), json!({ "user": user }))
        .await;
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

fn slot_player(m: &Value, slot: usize) -> String {
    m["slots"][slot]["player"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn four_player_bracket_runs_to_a_champion() {
    let server = TestServer::from_config(quick_rounds(vec![4, 8])).await;

    let tid = create(&server, "Spring Open", 4, "p1").await;
    assert!(!join(&server, tid, "p2").await);
    assert!(!join(&server, tid, "p3").await);
    assert!(join(&server, tid, "p4").await);

    let view: Value = server
        .get(&format!("/api/v1/tournaments/{tid}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(view["tournament"]["status"], "in_progress");
    let rounds = view["rounds"].as_array().unwrap();
    assert_eq!(rounds.len(), 2);
    assert_eq!(rounds[0]["status"], "scheduled");
    assert_eq!(rounds[1]["status"], "created");
    assert_eq!(rounds[1]["matches"][0]["slots"][0]["player"], Value::Null);

    let first = rounds[0]["matches"][0].clone();
    let second = rounds[0]["matches"][1].clone();
    let first_id = first["id"].as_u64().unwrap();
    let (a, b) = (slot_player(&first, 0), slot_player(&first, 1));

    let mut a_notify =
        ws_connect(&format!("{}&tournament={tid}", server.notify_url(&a))).await;
    let mut b_notify = ws_connect(&server.notify_url(&b)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Nobody in the second match readies up, so the deadline resolves it
    // without a winner.
    assert!(ready(&server, first_id, &a).await["session_id"].is_null());
    let session_id = ready(&server, first_id, &b).await["session_id"]
        .as_u64()
        .expect("both ready starts the match");

    match ws_read_until(&mut a_notify, |m| matches!(m, ServerMessage::MatchStart(_))).await {
        ServerMessage::MatchStart(start) => {
            assert_eq!(start.match_id, first_id);
            assert_eq!(start.session_id, session_id);
        },
        _ => unreachable!(),
    }

    let mut a_game = ws_connect(&server.game_url(session_id, &a)).await;
    ws_read_server_msg(&mut a_game).await;
    let mut b_game = ws_connect(&server.game_url(session_id, &b)).await;
    ws_read_server_msg(&mut b_game).await;
    ws_send_client_msg(&mut b_game, &ClientMessage::Forfeit(ForfeitMsg {})).await;
    ws_read_until(&mut a_game, |m| matches!(m, ServerMessage::WinnerMessage(_))).await;

    ws_read_until(&mut b_notify, |m| matches!(m, ServerMessage::LeaveMatch(_))).await;

    let view_path = format!("/api/v1/tournaments/{tid}");
    let view = poll_json(&server, &view_path, |v| {
        v["rounds"][1]["status"] == "scheduled"
    })
    .await;
    assert_eq!(view["rounds"][0]["status"], "completed");
    assert_eq!(view["rounds"][0]["matches"][0]["winner"], a.as_str());
    assert_eq!(view["rounds"][0]["matches"][1]["id"], second["id"]);
    assert!(view["rounds"][0]["matches"][1]["winner"].is_null());

    let final_match = &view["rounds"][1]["matches"][0];
    assert_eq!(final_match["slots"][0]["player"], a.as_str());
    assert!(final_match["slots"][1]["player"].is_null());

    // A lone ready finalist wins by walkover at the deadline.
    let final_id = final_match["id"].as_u64().unwrap();
    assert!(ready(&server, final_id, &a).await["session_id"].is_null());

    let view = poll_json(&server, &view_path, |v| {
        v["tournament"]["status"] == "completed"
    })
    .await;
    assert_eq!(view["tournament"]["winner"], a.as_str());

    let champion_notice = ws_read_until(&mut a_notify, |m| {
        matches!(m, ServerMessage::TournamentMessage(t) if t.text.contains("is the champion"))
    })
    .await;
    assert!(matches!(champion_notice, ServerMessage::TournamentMessage(_)));

    // Everyone is free to enter another tournament.
    let next = create(&server, "Rematch", 4, &a).await;
    assert_ne!(next, tid);
}

#[tokio::test]
async fn ready_is_rejected_for_outsiders() {
    let server = TestServer::from_config(quick_rounds(vec![4])).await;

    let tid = create(&server, "Closed Doors", 4, "p1").await;
    for user in ["p2", "p3", "p4"] {
        join(&server, tid, user).await;
    }
    let view: Value = server
        .get(&format!("/api/v1/tournaments/{tid}"))
        .await
        .json()
        .await
        .unwrap();
    let match_id = view["rounds"][0]["matches"][0]["id"].as_u64().unwrap();

    let resp = server
        .post(&format!("/api/v1/matches/{match_id}/ready"), json!({ "user": "eve" }))
        .await;
    assert_eq!(resp.status(), 400);

    let resp = server
        .post(&format!("/api/v1/tournaments/{tid}/join"), json!({ "user": "eve" }))
        .await;
    assert_eq!(resp.status(), 409);
}

type Received = (HeaderMap, Bytes);

async fn start_receiver() -> (String, mpsc::UnboundedReceiver<Received>) {
    let (tx, rx) = mpsc::unbounded_channel::<Received>();
    let app = Router::new()
        .route(
            "/results",
            post(
                |State(tx): State<mpsc::UnboundedSender<Received>>,
                 headers: HeaderMap,
                 body: Bytes| async move {
                    let _ = tx.send((headers, body));
                    "ok"
                },
            ),
        )
        .with_state(tx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/results"), rx)
}

#[tokio::test]
async fn completed_tournament_is_archived_with_a_signature() {
    let (url, mut received) = start_receiver().await;
    let config = ServerConfig {
        archive: ArchiveConfig {
            webhook_url: Some(url),
            secret: Some("s3cret".to_string()),
            timeout_secs: 5,
        },
        ..quick_rounds(vec![2])
    };
    let server = TestServer::from_config(config).await;

    let tid = create(&server, "Duel", 2, "ada").await;
    assert!(join(&server, tid, "bob").await);
    let view: Value = server
        .get(&format!("/api/v1/tournaments/{tid}"))
        .await
        .json()
        .await
        .unwrap();
    let match_id = view["rounds"][0]["matches"][0]["id"].as_u64().unwrap();
    ready(&server, match_id, "ada").await;

    let (headers, body) = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .expect("archive webhook was not called")
        .unwrap();

    let signature = headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap();
    assert_eq!(signature, sign_payload("s3cret", &body));
    assert!(headers.get(IDEMPOTENCY_HEADER).is_some());

    let result: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(result["tournament_id"], tid);
    assert_eq!(result["name"], "Duel");
    assert_eq!(result["champion"], "ada");
    assert_eq!(result["matches"].as_array().unwrap().len(), 1);
    assert_eq!(result["matches"][0]["winner"], "ada");
}
