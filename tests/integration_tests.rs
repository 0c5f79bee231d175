//! Integration tests for the game server and client
//!
//! These tests run a real reactor on a loopback port and talk to it through
//! the async client or raw sockets.

use client::GameClient;
use serde_json::{json, Value};
use server::{spawn_server_with_game, GameState, ServerConfig, ServerHandle};
use shared::{
    encode_json, Content, Direction, FrameParser, Position, Reply, ServerEvent, ServerMessage,
};
use std::io::{Read, Write};
use std::net::TcpStream as StdStream;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

fn start_server() -> ServerHandle {
    let config = ServerConfig {
        poll_timeout: Duration::from_millis(10),
        ..ServerConfig::ephemeral()
    };
    let game = GameState::with_treasure(10, Position::new(5, 5)).unwrap();
    spawn_server_with_game(config, game).expect("failed to start server")
}

async fn connect(server: &ServerHandle) -> GameClient<TcpStream> {
    GameClient::connect(server.addr()).await.unwrap()
}

async fn recv(client: &mut GameClient<TcpStream>) -> ServerMessage {
    timeout(TIMEOUT, client.next_message())
        .await
        .expect("timed out waiting for server")
        .expect("read failed")
        .expect("server closed the connection")
}

/// Joins and consumes the join broadcast.
async fn join(server: &ServerHandle, name: &str) -> GameClient<TcpStream> {
    let mut client = connect(server).await;
    client.join(name).await.unwrap();
    match recv(&mut client).await {
        ServerMessage::Event(ServerEvent::PlayerJoined { player_name, .. }) => {
            assert_eq!(player_name, name)
        }
        other => panic!("expected join broadcast, got {other:?}"),
    }
    client
}

fn raw_connect(server: &ServerHandle) -> StdStream {
    let stream = StdStream::connect(server.addr()).unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    stream.set_nodelay(true).unwrap();
    stream
}

/// Reads one frame from a blocking socket; `None` on end of stream.
fn raw_read(stream: &mut StdStream, parser: &mut FrameParser) -> Option<Value> {
    let mut buf = [0u8; 4096];
    loop {
        if let Some(frame) = parser.next_frame().unwrap() {
            return match frame.content {
                Content::Json(value) => Some(value),
                Content::Binary(_) => panic!("unexpected binary frame"),
            };
        }
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            return None;
        }
        parser.extend(&buf[..n]);
    }
}

/// GAMEPLAY OVER THE WIRE
mod gameplay_tests {
    use super::*;

    /// Moving north from the top-left corner wraps to the bottom row, and
    /// every connection sees the resulting state.
    #[tokio::test]
    async fn move_north_wraps_and_broadcasts() {
        let server = start_server();
        let mut alice = join(&server, "alice").await;
        let mut bob = join(&server, "bob").await;
        match recv(&mut alice).await {
            ServerMessage::Event(ServerEvent::PlayerJoined {
                player_name,
                clients,
                ..
            }) => {
                assert_eq!(player_name, "bob");
                assert_eq!(clients, vec!["alice".to_string(), "bob".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }

        alice.move_player(Direction::N).await.unwrap();

        for client in [&mut alice, &mut bob] {
            match recv(client).await {
                ServerMessage::Event(ServerEvent::StateUpdate { state, .. }) => {
                    assert_eq!(state.players["alice"].position, Position::new(0, 9));
                    assert_eq!(state.turn, 1);
                }
                other => panic!("expected state update, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn fifth_player_is_rejected() {
        let server = start_server();
        let mut players = Vec::new();
        for name in ["p1", "p2", "p3", "p4"] {
            players.push(join(&server, name).await);
        }

        let mut late = connect(&server).await;
        late.join("p5").await.unwrap();
        assert_eq!(
            recv(&mut late).await,
            ServerMessage::Reply(Reply::error("Game is full"))
        );

        let snapshot = server.handle().snapshot().unwrap();
        assert_eq!(snapshot.players.len(), 4);
        assert!(!snapshot.players.contains_key("p5"));
    }

    #[tokio::test]
    async fn chat_reaches_everyone() {
        let server = start_server();
        let mut alice = join(&server, "alice").await;
        let mut bob = join(&server, "bob").await;
        recv(&mut alice).await;

        bob.chat("good luck").await.unwrap();

        let expected = ServerMessage::Event(ServerEvent::Chat {
            player_name: "bob".into(),
            message: "good luck".into(),
        });
        assert_eq!(recv(&mut alice).await, expected);
        assert_eq!(recv(&mut bob).await, expected);
    }

    #[tokio::test]
    async fn disconnect_announces_departure() {
        let server = start_server();
        let mut alice = join(&server, "alice").await;
        let bob = join(&server, "bob").await;
        recv(&mut alice).await;

        drop(bob);

        match recv(&mut alice).await {
            ServerMessage::Event(ServerEvent::PlayerLeft {
                player_name,
                clients,
                ..
            }) => {
                assert_eq!(player_name, "bob");
                assert_eq!(clients, vec!["alice".to_string()]);
            }
            other => panic!("expected departure, got {other:?}"),
        }
    }

    /// A peer that resets its socket is treated like any other departure.
    #[tokio::test]
    async fn reset_connection_announces_departure() {
        let server = start_server();
        let mut alice = join(&server, "alice").await;

        let mut bob = raw_connect(&server);
        bob.write_all(&encode_json(&json!({"action": "join", "player_name": "bob"})).unwrap())
            .unwrap();
        match recv(&mut alice).await {
            ServerMessage::Event(ServerEvent::PlayerJoined { player_name, .. }) => {
                assert_eq!(player_name, "bob")
            }
            other => panic!("expected join broadcast, got {other:?}"),
        }

        // Closing with the join broadcast still unread makes the kernel send RST.
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(bob);

        match recv(&mut alice).await {
            ServerMessage::Event(ServerEvent::PlayerLeft {
                player_name,
                clients,
                ..
            }) => {
                assert_eq!(player_name, "bob");
                assert_eq!(clients, vec!["alice".to_string()]);
            }
            other => panic!("expected departure, got {other:?}"),
        }

        alice.request_state().await.unwrap();
        match recv(&mut alice).await {
            ServerMessage::Reply(Reply::State { result }) => {
                assert_eq!(
                    result.players.keys().cloned().collect::<Vec<_>>(),
                    vec!["alice".to_string()]
                );
            }
            other => panic!("expected state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn replay_resets_the_round() {
        let server = start_server();
        let mut alice = join(&server, "alice").await;
        alice.move_player(Direction::SE).await.unwrap();
        recv(&mut alice).await;

        alice.replay().await.unwrap();
        match recv(&mut alice).await {
            ServerMessage::Event(ServerEvent::StateUpdate { event, state }) => {
                assert_eq!(event, "Game reset");
                assert_eq!(state.turn, 0);
                assert_eq!(state.players["alice"].position, Position::new(0, 0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn control_channel_actions_are_broadcast() {
        let server = start_server();
        let mut alice = join(&server, "alice").await;

        let handle = server.handle().clone();
        let reply = tokio::task::spawn_blocking(move || {
            handle.execute(
                None,
                shared::Action::Chat {
                    player_name: "server".into(),
                    message: "welcome".into(),
                },
            )
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(reply, None);
        match recv(&mut alice).await {
            ServerMessage::Event(ServerEvent::Chat { message, .. }) => {
                assert_eq!(message, "welcome")
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

/// FRAMING AND CONNECTION HANDLING
mod protocol_tests {
    use super::*;

    /// Two requests delivered in one segment get two replies, in order.
    #[test]
    fn coalesced_requests_get_ordered_replies() {
        let server = start_server();
        let mut stream = raw_connect(&server);
        let mut parser = FrameParser::new();

        let mut bytes = encode_json(&json!({"action": "get_state"})).unwrap();
        bytes.extend(encode_json(&json!({"action": "dance"})).unwrap());
        bytes.extend(encode_json(&json!({"action": "get_state"})).unwrap());
        stream.write_all(&bytes).unwrap();

        let first = raw_read(&mut stream, &mut parser).unwrap();
        let second = raw_read(&mut stream, &mut parser).unwrap();
        let third = raw_read(&mut stream, &mut parser).unwrap();
        assert_eq!(first["result"]["grid_size"], 10);
        assert_eq!(second, json!({"error": "Unknown action"}));
        assert_eq!(third["result"]["turn"], 0);
    }

    /// A burst whose replies exceed the outbound limit is answered in full
    /// while the client keeps reading.
    #[test]
    fn pipelined_burst_is_answered_in_full() {
        let server = start_server();
        let mut reader = raw_connect(&server);
        let mut writer = reader.try_clone().unwrap();
        let mut parser = FrameParser::new();

        let requests = 10_000;
        let frame = encode_json(&json!({"action": "get_state"})).unwrap();
        let batch: Vec<u8> = frame.iter().copied().cycle().take(frame.len() * requests).collect();
        let sender = std::thread::spawn(move || writer.write_all(&batch));

        let mut replies = 0;
        while replies < requests {
            match raw_read(&mut reader, &mut parser) {
                Some(reply) => {
                    assert!(reply.get("result").is_some(), "unexpected reply {reply}");
                    replies += 1;
                }
                None => panic!("server closed after {replies} replies"),
            }
        }

        sender.join().unwrap().unwrap();
        assert_eq!(replies, requests);
        assert_eq!(server.handle().snapshot().unwrap().turn, 0);
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let server = start_server();
        let mut stream = raw_connect(&server);
        let mut parser = FrameParser::new();

        let bytes = encode_json(&json!({"action": "get_state"})).unwrap();
        for byte in &bytes {
            stream.write_all(&[*byte]).unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }

        let reply = raw_read(&mut stream, &mut parser).unwrap();
        assert!(reply.get("result").is_some());
    }

    #[test]
    fn unknown_action_keeps_connection_open() {
        let server = start_server();
        let mut stream = raw_connect(&server);
        let mut parser = FrameParser::new();

        stream
            .write_all(&encode_json(&json!({"action": "teleport", "player_name": "x"})).unwrap())
            .unwrap();
        assert_eq!(
            raw_read(&mut stream, &mut parser).unwrap(),
            json!({"error": "Unknown action"})
        );

        stream
            .write_all(&encode_json(&json!({"action": "get_state"})).unwrap())
            .unwrap();
        assert!(raw_read(&mut stream, &mut parser).unwrap().get("result").is_some());
    }

    #[test]
    fn malformed_header_closes_only_that_connection() {
        let server = start_server();
        let mut good = raw_connect(&server);
        let mut bad = raw_connect(&server);
        let mut good_parser = FrameParser::new();
        let mut bad_parser = FrameParser::new();

        let header = br#"{"content-length": 2}"#;
        let mut bytes = (header.len() as u16).to_be_bytes().to_vec();
        bytes.extend_from_slice(header);
        bytes.extend_from_slice(b"{}");
        bad.write_all(&bytes).unwrap();

        let error = raw_read(&mut bad, &mut bad_parser).unwrap();
        assert!(error["error"].as_str().unwrap().contains("header"));
        assert_eq!(raw_read(&mut bad, &mut bad_parser), None);

        good.write_all(&encode_json(&json!({"action": "get_state"})).unwrap())
            .unwrap();
        assert!(raw_read(&mut good, &mut good_parser)
            .unwrap()
            .get("result")
            .is_some());
    }
}
