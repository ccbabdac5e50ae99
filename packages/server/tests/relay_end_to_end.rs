//! End-to-end tests for the room relay.
//!
//! Each test binds an in-process relay to port 0 and talks to it over real
//! WebSocket connections.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use guildrelay_server::{
    bootstrap::build_relay,
    config::ServerConfig,
    domain::{Identity, IdentityId, RoomId},
    infrastructure::repository::InMemoryMessageStore,
};
use guildrelay_shared::{
    credential::subprotocol_header,
    protocol::{ClientFrame, GuildMessage, ServerFrame},
    time::SystemClock,
};
use serde_json::json;
use tokio::{net::TcpListener, time::timeout};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        http::{
            HeaderValue, StatusCode,
            header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL},
        },
    },
};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct TestRelay {
    addr: SocketAddr,
    store: Arc<InMemoryMessageStore>,
}

impl TestRelay {
    /// alice, bob: room 42 / carol: room 7
    async fn start(extra_args: &[&str]) -> Self {
        let mut args = vec!["guildrelay-server"];
        args.extend_from_slice(extra_args);
        let config = ServerConfig::try_parse_from(args).unwrap();
        let relay = build_relay(&config, Arc::new(SystemClock)).await.unwrap();

        for (token, id, room) in [
            ("token-alice", "uuid-alice", 42),
            ("token-bob", "uuid-bob", 42),
            ("token-carol", "uuid-carol", 7),
        ] {
            let identity_id = IdentityId::new(id.to_string()).unwrap();
            relay
                .directory
                .insert(token, Identity::new(identity_id.clone(), id))
                .await;
            relay
                .memberships
                .grant(identity_id, RoomId::new(room).unwrap())
                .await;
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = relay.store.clone();
        tokio::spawn(relay.server.serve(listener));

        Self { addr, store }
    }

    fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Connect with the credential in `Sec-WebSocket-Protocol`
    async fn connect(&self, room: &str, token: &str) -> Result<Socket, tungstenite::Error> {
        let mut request = format!("ws://{}/rooms/{}/stream", self.addr, room)
            .into_client_request()
            .unwrap();
        request.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_str(&subprotocol_header(token)).unwrap(),
        );
        let (socket, response) = connect_async(request).await?;
        assert_eq!(
            response.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "bearer-b64"
        );
        Ok(socket)
    }

    /// Connect with `Authorization: Bearer`
    async fn connect_with_header(&self, room: &str, token: &str) -> Result<Socket, tungstenite::Error> {
        let mut request = format!("ws://{}/rooms/{}/stream", self.addr, room)
            .into_client_request()
            .unwrap();
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        let (socket, _) = connect_async(request).await?;
        Ok(socket)
    }

    async fn live_connections(&self, room: i64) -> u64 {
        let body: serde_json::Value = reqwest::get(self.http(&format!("/debug/rooms/{room}")))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["live_connections"].as_u64().unwrap()
    }

    /// Registration happens after the 101 response, so poll until it lands
    async fn wait_for_connections(&self, room: i64, expected: u64) {
        for _ in 0..100 {
            if self.live_connections(room).await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("room {room} never reached {expected} live connections");
    }
}

fn rejected_status(result: Result<Socket, tungstenite::Error>) -> StatusCode {
    match result {
        Err(tungstenite::Error::Http(response)) => response.status(),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("connection was upgraded"),
    }
}

async fn send_frame(socket: &mut Socket, frame: &ClientFrame) {
    let text = serde_json::to_string(frame).unwrap();
    socket.send(Message::Text(text.into())).await.unwrap();
}

async fn next_guild_message(socket: &mut Socket) -> GuildMessage {
    loop {
        let message = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message
            && let ServerFrame::GuildMessage(frame) = serde_json::from_str(text.as_str()).unwrap()
        {
            return frame;
        }
    }
}

async fn assert_silent(socket: &mut Socket) {
    let result = timeout(Duration::from_millis(300), socket.next()).await;
    assert!(result.is_err(), "unexpected frame: {:?}", result);
}

#[tokio::test]
async fn test_message_reaches_every_socket_in_room_only() {
    // テスト項目: A の送信が A と B に届き、別ルームの C には届かない
    // given (前提条件):
    let relay = TestRelay::start(&[]).await;
    let mut alice = relay.connect("42", "token-alice").await.unwrap();
    let mut bob = relay.connect_with_header("42", "token-bob").await.unwrap();
    let mut carol = relay.connect("7", "token-carol").await.unwrap();
    relay.wait_for_connections(42, 2).await;
    relay.wait_for_connections(7, 1).await;

    // when (操作):
    send_frame(&mut alice, &ClientFrame::message(42, "hi")).await;

    // then (期待する結果):
    let to_alice = next_guild_message(&mut alice).await;
    let to_bob = next_guild_message(&mut bob).await;
    assert_eq!(to_alice, to_bob);
    assert_eq!(to_alice.guild_id, 42);
    assert_eq!(to_alice.sender, "uuid-alice");
    assert_eq!(to_alice.message, "hi");
    assert_eq!(to_alice.server, "Web");
    assert!(to_alice.id.is_some());
    assert_silent(&mut carol).await;
}

#[tokio::test]
async fn test_rejected_credentials_never_upgrade() {
    // テスト項目: 認証・認可に失敗した接続は upgrade されない
    // given (前提条件):
    let relay = TestRelay::start(&[]).await;

    // when (操作):
    let forbidden = relay.connect("7", "token-alice").await;
    let unknown = relay.connect("42", "token-nobody").await;
    let invalid_room = relay.connect("abc", "token-alice").await;
    let no_credential = connect_async(format!("ws://{}/rooms/42/stream", relay.addr)).await;

    // then (期待する結果):
    assert_eq!(rejected_status(forbidden), StatusCode::FORBIDDEN);
    assert_eq!(rejected_status(unknown), StatusCode::UNAUTHORIZED);
    assert_eq!(rejected_status(invalid_room), StatusCode::BAD_REQUEST);
    assert_eq!(
        rejected_status(no_credential.map(|(socket, _)| socket)),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(relay.live_connections(7).await, 0);
}

#[tokio::test]
async fn test_room_mismatch_is_neither_stored_nor_broadcast() {
    // テスト項目: ルーム ID が一致しないフレームは保存も配信もされず、接続は維持される
    // given (前提条件):
    let relay = TestRelay::start(&[]).await;
    let mut alice = relay.connect("42", "token-alice").await.unwrap();
    relay.wait_for_connections(42, 1).await;

    // when (操作):
    send_frame(&mut alice, &ClientFrame::message(7, "wrong room")).await;
    alice
        .send(Message::Text("garbage".to_string().into()))
        .await
        .unwrap();
    send_frame(&mut alice, &ClientFrame::message(42, "right room")).await;

    // then (期待する結果):
    let received = next_guild_message(&mut alice).await;
    assert_eq!(received.message, "right room");
    assert_eq!(relay.store.count(RoomId::new(42).unwrap()).await, 1);
    assert_eq!(relay.store.count(RoomId::new(7).unwrap()).await, 0);
}

#[tokio::test]
async fn test_closed_socket_leaves_live_set() {
    // テスト項目: 切断したソケットはルームの接続数から外れる
    // given (前提条件):
    let relay = TestRelay::start(&[]).await;
    let alice = relay.connect("42", "token-alice").await.unwrap();
    let _bob = relay.connect("42", "token-bob").await.unwrap();
    relay.wait_for_connections(42, 2).await;

    // when (操作):
    drop(alice);

    // then (期待する結果):
    relay.wait_for_connections(42, 1).await;
}

#[tokio::test]
async fn test_internal_broadcast_injection() {
    // テスト項目: 内部ブロードキャストはトークンを検証し、ルームの接続に配信される
    // given (前提条件):
    let relay = TestRelay::start(&["--internal-token", "internal-secret"]).await;
    let mut bob = relay.connect("42", "token-bob").await.unwrap();
    relay.wait_for_connections(42, 1).await;
    let client = reqwest::Client::new();
    let payload = json!({
        "messages": [
            {
                "type": "guild_message",
                "id": 900,
                "guild_id": 42,
                "server": "Lobby",
                "sender": "uuid-import",
                "message": "imported",
                "transliterated_message": null,
                "timestamp": 1_700_000_000_000i64
            },
            { "guild_id": "not a room" }
        ]
    });

    // when (操作):
    let wrong_token = client
        .post(relay.http("/internal/broadcast"))
        .bearer_auth("nope")
        .json(&payload)
        .send()
        .await
        .unwrap();
    let malformed = client
        .post(relay.http("/internal/broadcast"))
        .bearer_auth("internal-secret")
        .body("{\"messages\": 3}")
        .send()
        .await
        .unwrap();
    let accepted = client
        .post(relay.http("/internal/broadcast"))
        .bearer_auth("internal-secret")
        .json(&payload)
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(wrong_token.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(malformed.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(accepted.status(), reqwest::StatusCode::OK);
    let summary: serde_json::Value = accepted.json().await.unwrap();
    assert_eq!(summary, json!({ "delivered": 1, "skipped": 1 }));
    let injected = next_guild_message(&mut bob).await;
    assert_eq!(injected.id, Some(900));
    assert_eq!(injected.server, "Lobby");
}

#[tokio::test]
async fn test_internal_broadcast_disabled_without_token() {
    // テスト項目: 内部トークン未設定ではブロードキャスト注入が拒否され、配信もされない
    // given (前提条件):
    let relay = TestRelay::start(&[]).await;
    let mut bob = relay.connect("42", "token-bob").await.unwrap();
    relay.wait_for_connections(42, 1).await;
    let client = reqwest::Client::new();
    let payload = json!({
        "messages": [{
            "type": "guild_message",
            "id": 1,
            "guild_id": 42,
            "server": "Web",
            "sender": "uuid-alice",
            "message": "forged",
            "transliterated_message": null,
            "timestamp": 1_700_000_000_000i64
        }]
    });

    // when (操作):
    let anonymous = client
        .post(relay.http("/internal/broadcast"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    let guessed = client
        .post(relay.http("/internal/broadcast"))
        .bearer_auth("")
        .json(&payload)
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(anonymous.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(guessed.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_history_page_after_live_messages() {
    // テスト項目: 送信したメッセージが履歴ページに古い順で含まれる
    // given (前提条件):
    let relay = TestRelay::start(&["--history-page-size", "2"]).await;
    let mut alice = relay.connect("42", "token-alice").await.unwrap();
    relay.wait_for_connections(42, 1).await;
    for body in ["one", "two", "three"] {
        send_frame(&mut alice, &ClientFrame::message(42, body)).await;
        next_guild_message(&mut alice).await;
    }
    let client = reqwest::Client::new();

    // when (操作):
    let newest: serde_json::Value = client
        .get(relay.http("/rooms/42/messages"))
        .bearer_auth("token-bob")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let before_id = newest["messages"][0]["id"].as_i64().unwrap();
    let older: serde_json::Value = client
        .get(relay.http(&format!("/rooms/42/messages?before_id={before_id}")))
        .bearer_auth("token-bob")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let anonymous = client
        .get(relay.http("/rooms/42/messages"))
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    let bodies = |page: &serde_json::Value| -> Vec<String> {
        page["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["message"].as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(bodies(&newest), vec!["two", "three"]);
    assert_eq!(bodies(&older), vec!["one"]);
    assert_eq!(anonymous.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_check() {
    // テスト項目: ヘルスチェックが ok を返す
    // given (前提条件):
    let relay = TestRelay::start(&[]).await;

    // when (操作):
    let body: serde_json::Value = reqwest::get(relay.http("/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(body, json!({ "status": "ok" }));
}
