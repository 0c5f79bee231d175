//! Application message schema carried inside frames
//!
//! Client requests are JSON objects tagged by `"action"`. The server decodes
//! them exactly once into [`Action`]; an unrecognized tag becomes
//! [`Action::Unknown`] and a recognized tag with missing or ill-typed fields
//! becomes [`Action::Malformed`], so protocol extensions never fail decoding.
//!
//! Server messages are either direct replies (`{"result": ...}` or
//! `{"error": ...}`) or broadcast events tagged by `"action"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::Content;
use crate::types::{Direction, GameSnapshot};

/// Error text for an action tag the server does not know.
pub const UNKNOWN_ACTION_ERROR: &str = "Unknown action";

const KNOWN_ACTIONS: [&str; 7] = [
    "join", "leave", "move", "attack", "chat", "get_state", "replay",
];

/// A request as sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    Join {
        player_name: String,
    },
    Leave {
        player_name: String,
    },
    Move {
        player_name: String,
        direction: Direction,
    },
    Attack {
        player_name: String,
        target: String,
    },
    Chat {
        player_name: String,
        message: String,
    },
    GetState,
    Replay,
}

impl Request {
    pub fn to_content(&self) -> Value {
        // Serializing a derive-only enum of strings cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A decoded request payload as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Join { player_name: String },
    Leave { player_name: String },
    Move { player_name: String, direction: Direction },
    Attack { player_name: String, target: String },
    Chat { player_name: String, message: String },
    GetState,
    Replay,
    /// Unrecognized tag; the raw payload is kept for logging.
    Unknown(Value),
    /// Recognized tag whose fields did not validate.
    Malformed { action: String, reason: String },
}

impl Action {
    pub fn from_value(value: &Value) -> Self {
        let Some(tag) = value.get("action").and_then(Value::as_str) else {
            return Action::Unknown(value.clone());
        };
        if !KNOWN_ACTIONS.contains(&tag) {
            return Action::Unknown(value.clone());
        }

        match serde_json::from_value::<Request>(value.clone()) {
            Ok(request) => request.into(),
            Err(e) => Action::Malformed {
                action: tag.to_string(),
                reason: e.to_string(),
            },
        }
    }

    pub fn from_content(content: &Content) -> Self {
        match content {
            Content::Json(value) => Self::from_value(value),
            Content::Binary(_) => Action::Unknown(Value::Null),
        }
    }

    /// The tag this action was decoded from, for logging.
    pub fn name(&self) -> &str {
        match self {
            Action::Join { .. } => "join",
            Action::Leave { .. } => "leave",
            Action::Move { .. } => "move",
            Action::Attack { .. } => "attack",
            Action::Chat { .. } => "chat",
            Action::GetState => "get_state",
            Action::Replay => "replay",
            Action::Unknown(_) => "unknown",
            Action::Malformed { action, .. } => action,
        }
    }
}

impl From<Request> for Action {
    fn from(request: Request) -> Self {
        match request {
            Request::Join { player_name } => Action::Join { player_name },
            Request::Leave { player_name } => Action::Leave { player_name },
            Request::Move {
                player_name,
                direction,
            } => Action::Move {
                player_name,
                direction,
            },
            Request::Attack {
                player_name,
                target,
            } => Action::Attack {
                player_name,
                target,
            },
            Request::Chat {
                player_name,
                message,
            } => Action::Chat {
                player_name,
                message,
            },
            Request::GetState => Action::GetState,
            Request::Replay => Action::Replay,
        }
    }
}

/// Broadcast notifications fanned out to every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerEvent {
    PlayerJoined {
        player_name: String,
        clients: Vec<String>,
        state: GameSnapshot,
    },
    PlayerLeft {
        player_name: String,
        clients: Vec<String>,
        state: GameSnapshot,
    },
    StateUpdate {
        event: String,
        state: GameSnapshot,
    },
    Chat {
        player_name: String,
        message: String,
    },
    Heartbeat {
        turn: u64,
        players: usize,
    },
}

/// Direct responses sent only to the requesting connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    State { result: GameSnapshot },
    Error { error: String },
}

impl Reply {
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            error: message.into(),
        }
    }
}

/// Anything a client may receive.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Event(ServerEvent),
    Reply(Reply),
    Unrecognized(Value),
}

impl ServerMessage {
    pub fn from_value(value: Value) -> Self {
        if value.get("action").is_some() {
            if let Ok(event) = serde_json::from_value(value.clone()) {
                return ServerMessage::Event(event);
            }
        } else if let Ok(reply) = serde_json::from_value(value.clone()) {
            return ServerMessage::Reply(reply);
        }
        ServerMessage::Unrecognized(value)
    }

    pub fn from_content(content: Content) -> Self {
        match content {
            Content::Json(value) => Self::from_value(value),
            Content::Binary(bytes) => ServerMessage::Unrecognized(Value::from(bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn empty_snapshot() -> GameSnapshot {
        GameSnapshot {
            grid_size: 10,
            players: BTreeMap::new(),
            treasure: Position::new(4, 4),
            turn: 0,
            game_over: false,
            winner: None,
        }
    }

    #[test]
    fn test_decode_known_actions() {
        assert_eq!(
            Action::from_value(&json!({"action": "join", "player_name": "P1"})),
            Action::Join {
                player_name: "P1".into()
            }
        );
        assert_eq!(
            Action::from_value(&json!({"action": "move", "player_name": "P1", "direction": "NE"})),
            Action::Move {
                player_name: "P1".into(),
                direction: Direction::NE
            }
        );
        assert_eq!(
            Action::from_value(&json!({"action": "attack", "player_name": "P1", "target": "P2"})),
            Action::Attack {
                player_name: "P1".into(),
                target: "P2".into()
            }
        );
        assert_eq!(
            Action::from_value(&json!({"action": "get_state"})),
            Action::GetState
        );
        assert_eq!(Action::from_value(&json!({"action": "replay"})), Action::Replay);
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        assert_eq!(
            Action::from_value(&json!({"action": "get_state", "value": "ignored"})),
            Action::GetState
        );
    }

    #[test]
    fn test_unknown_action() {
        let raw = json!({"action": "dance", "player_name": "P1"});
        assert_eq!(Action::from_value(&raw), Action::Unknown(raw.clone()));

        let untagged = json!({"player_name": "P1"});
        assert_eq!(Action::from_value(&untagged), Action::Unknown(untagged.clone()));

        assert_eq!(Action::from_value(&json!("join")), Action::Unknown(json!("join")));
    }

    #[test]
    fn test_malformed_known_action() {
        match Action::from_value(&json!({"action": "move", "player_name": "P1"})) {
            Action::Malformed { action, reason } => {
                assert_eq!(action, "move");
                assert!(reason.contains("direction"));
            }
            other => panic!("expected malformed, got {other:?}"),
        }

        assert!(matches!(
            Action::from_value(&json!({"action": "move", "player_name": "P1", "direction": "UP"})),
            Action::Malformed { .. }
        ));
    }

    #[test]
    fn test_binary_content_is_unknown() {
        assert_eq!(
            Action::from_content(&Content::Binary(vec![1, 2])),
            Action::Unknown(Value::Null)
        );
    }

    #[test]
    fn test_request_wire_shape() {
        let request = Request::Move {
            player_name: "P1".into(),
            direction: Direction::N,
        };
        assert_eq!(
            request.to_content(),
            json!({"action": "move", "player_name": "P1", "direction": "N"})
        );
        assert_eq!(Request::GetState.to_content(), json!({"action": "get_state"}));
    }

    #[test]
    fn test_request_and_action_agree() {
        let requests = vec![
            Request::Join {
                player_name: "a".into(),
            },
            Request::Leave {
                player_name: "a".into(),
            },
            Request::Chat {
                player_name: "a".into(),
                message: "hi there".into(),
            },
            Request::Replay,
        ];
        for request in requests {
            let decoded = Action::from_value(&request.to_content());
            assert_eq!(decoded, Action::from(request));
        }
    }

    #[test]
    fn test_server_message_classification() {
        let event = ServerEvent::Chat {
            player_name: "P1".into(),
            message: "gg".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["action"], "chat");
        assert_eq!(ServerMessage::from_value(value), ServerMessage::Event(event));

        let error = serde_json::to_value(Reply::error(UNKNOWN_ACTION_ERROR)).unwrap();
        assert_eq!(error, json!({"error": "Unknown action"}));
        assert_eq!(
            ServerMessage::from_value(error),
            ServerMessage::Reply(Reply::error(UNKNOWN_ACTION_ERROR))
        );

        let state = Reply::State {
            result: empty_snapshot(),
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(ServerMessage::from_value(value), ServerMessage::Reply(state));

        let odd = json!({"something": "else"});
        assert_eq!(
            ServerMessage::from_value(odd.clone()),
            ServerMessage::Unrecognized(odd)
        );
    }

    #[test]
    fn test_state_update_shape() {
        let event = ServerEvent::StateUpdate {
            event: "P1 moved N".into(),
            state: empty_snapshot(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["action"], "state_update");
        assert_eq!(value["state"]["treasure"], json!([4, 4]));
        assert_eq!(value["state"]["winner"], Value::Null);
    }
}
