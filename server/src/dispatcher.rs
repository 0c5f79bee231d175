//! Maps decoded actions onto the game state
//!
//! Dispatch is a pure function of the game state, the identity bound to the
//! requesting connection, and the action. It never touches sockets: the
//! result describes the direct reply, the broadcasts to fan out and the
//! change to the connection's identity, and the reactor applies them.
//!
//! Every accepted action produces exactly one response class: a direct reply
//! (state or error) or one or more broadcasts.

use log::{debug, info};
use shared::{Action, Reply, ServerEvent, UNKNOWN_ACTION_ERROR};

use crate::game::GameState;

/// Who issued an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller<'a> {
    /// A client connection and the player it is bound to, if any.
    Peer(Option<&'a str>),
    /// The reactor's control channel, which may act for any player.
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
    Keep,
    Bind(String),
}

/// What the reactor must do after an action has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub reply: Option<Reply>,
    pub broadcasts: Vec<ServerEvent>,
    pub identity: IdentityChange,
    /// Players removed from the game; any connection bound to one is unbound.
    pub departed: Vec<String>,
}

impl Dispatch {
    fn reply(reply: Reply) -> Self {
        Self {
            reply: Some(reply),
            broadcasts: Vec::new(),
            identity: IdentityChange::Keep,
            departed: Vec::new(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self::reply(Reply::error(message))
    }

    fn broadcast(event: ServerEvent) -> Self {
        Self {
            reply: None,
            broadcasts: vec![event],
            identity: IdentityChange::Keep,
            departed: Vec::new(),
        }
    }

    fn with_identity(mut self, identity: IdentityChange) -> Self {
        self.identity = identity;
        self
    }

    fn with_departure(mut self, player_name: &str) -> Self {
        self.departed.push(player_name.to_string());
        self
    }
}

/// Applies `action` on behalf of `caller`.
pub fn dispatch(game: &mut GameState, caller: Caller<'_>, action: Action) -> Dispatch {
    match action {
        Action::Join { player_name } => join(game, caller, player_name),
        Action::Leave { player_name } => {
            if let Err(e) = authorize(caller, &player_name) {
                return e;
            }
            match depart(game, &player_name) {
                Some(event) => Dispatch::broadcast(event).with_departure(&player_name),
                None => Dispatch::error(format!("Player {player_name} is not in the game")),
            }
        }
        Action::Move {
            player_name,
            direction,
        } => {
            if let Err(e) = authorize(caller, &player_name) {
                return e;
            }
            match game.move_player(&player_name, direction) {
                Ok(outcome) => {
                    let event = if outcome.found_treasure {
                        format!(
                            "{player_name} moved {direction} to {} and found the treasure",
                            outcome.position
                        )
                    } else {
                        format!("{player_name} moved {direction} to {}", outcome.position)
                    };
                    state_update(game, event)
                }
                Err(e) => Dispatch::error(e.to_string()),
            }
        }
        Action::Attack {
            player_name,
            target,
        } => {
            if let Err(e) = authorize(caller, &player_name) {
                return e;
            }
            match game.attack(&player_name, &target) {
                Ok(outcome) => {
                    let mut event = if outcome.eliminated {
                        format!("{player_name} eliminated {target}")
                    } else {
                        format!(
                            "{player_name} attacked {target}, {} health left",
                            outcome.remaining_health
                        )
                    };
                    if let Some(winner) = &outcome.winner {
                        event.push_str(&format!("; {winner} wins"));
                    }
                    let update = state_update(game, event);
                    if outcome.eliminated {
                        update.with_departure(&target)
                    } else {
                        update
                    }
                }
                Err(e) => Dispatch::error(e.to_string()),
            }
        }
        Action::Chat {
            player_name,
            message,
        } => {
            if let Err(e) = authorize(caller, &player_name) {
                return e;
            }
            Dispatch::broadcast(ServerEvent::Chat {
                player_name,
                message,
            })
        }
        Action::GetState => Dispatch::reply(Reply::State {
            result: game.snapshot(),
        }),
        Action::Replay => {
            game.reset();
            state_update(game, "Game reset".to_string())
        }
        Action::Malformed { action, reason } => {
            debug!("Rejected malformed {} request: {}", action, reason);
            Dispatch::error(format!("Invalid {action} request: {reason}"))
        }
        Action::Unknown(raw) => {
            debug!("Rejected unknown action: {}", raw);
            Dispatch::error(UNKNOWN_ACTION_ERROR)
        }
    }
}

/// Removes a departing player and builds the roster broadcast.
///
/// Returns `None` when the player was not in the game, e.g. after being
/// eliminated.
pub fn depart(game: &mut GameState, player_name: &str) -> Option<ServerEvent> {
    if !game.leave(player_name) {
        return None;
    }
    Some(ServerEvent::PlayerLeft {
        player_name: player_name.to_string(),
        clients: game.player_names(),
        state: game.snapshot(),
    })
}

fn join(game: &mut GameState, caller: Caller<'_>, player_name: String) -> Dispatch {
    if let Caller::Peer(Some(current)) = caller {
        if game.contains(current) {
            return Dispatch::error(format!("Already joined as {current}"));
        }
    }
    match game.join(&player_name) {
        Ok(spawn) => {
            info!("{} joined at {}", player_name, spawn);
            Dispatch::broadcast(ServerEvent::PlayerJoined {
                player_name: player_name.clone(),
                clients: game.player_names(),
                state: game.snapshot(),
            })
            .with_identity(IdentityChange::Bind(player_name))
        }
        Err(e) => Dispatch::error(e.to_string()),
    }
}

/// Actions naming a player are only accepted from the connection bound to it.
fn authorize(caller: Caller<'_>, player_name: &str) -> Result<(), Dispatch> {
    match caller {
        Caller::Operator => Ok(()),
        Caller::Peer(Some(bound)) if bound == player_name => Ok(()),
        Caller::Peer(Some(bound)) => Err(Dispatch::error(format!(
            "Connection is bound to {bound}, not {player_name}"
        ))),
        Caller::Peer(None) => Err(Dispatch::error("Join the game first")),
    }
}

fn state_update(game: &GameState, event: String) -> Dispatch {
    Dispatch::broadcast(ServerEvent::StateUpdate {
        event,
        state: game.snapshot(),
    })
}
