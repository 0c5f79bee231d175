//! Text rendering of the board and server messages

use shared::{GameSnapshot, Position, Reply, ServerEvent, ServerMessage};
use std::fmt::Write;

const EMPTY: char = '.';
const TREASURE: char = '$';

/// Draws the board with `y = 0` as the top row.
///
/// Players are shown by the first letter of their name, the treasure as `$`.
pub fn render_board(snapshot: &GameSnapshot) -> String {
    let mut out = String::new();
    for y in 0..snapshot.grid_size {
        let row: Vec<String> = (0..snapshot.grid_size)
            .map(|x| cell(snapshot, Position::new(x, y)).to_string())
            .collect();
        out.push_str(&row.join(" "));
        out.push('\n');
    }
    out
}

fn cell(snapshot: &GameSnapshot, position: Position) -> char {
    match snapshot.player_at(position) {
        Some(name) => name
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('?'),
        None if position == snapshot.treasure => TREASURE,
        None => EMPTY,
    }
}

/// One line per player, then turn and outcome.
pub fn render_summary(snapshot: &GameSnapshot, me: Option<&str>) -> String {
    let mut out = String::new();
    for (name, player) in &snapshot.players {
        let marker = if Some(name.as_str()) == me { " (you)" } else { "" };
        let _ = writeln!(
            out,
            "{name}{marker}: health {} at {}",
            player.health, player.position
        );
    }
    let _ = write!(out, "Turn {}", snapshot.turn);
    match (&snapshot.winner, snapshot.game_over) {
        (Some(winner), _) => {
            let _ = write!(out, ", game over, {winner} wins");
        }
        (None, true) => out.push_str(", game over"),
        (None, false) => {}
    }
    out
}

pub fn render_state(snapshot: &GameSnapshot, me: Option<&str>) -> String {
    format!("{}{}", render_board(snapshot), render_summary(snapshot, me))
}

/// Human-readable form of anything the server sent.
pub fn render_message(message: &ServerMessage, me: Option<&str>) -> String {
    match message {
        ServerMessage::Event(ServerEvent::PlayerJoined {
            player_name,
            clients,
            state,
        }) => format!(
            "{player_name} joined. Players: {}\n{}",
            clients.join(", "),
            render_state(state, me)
        ),
        ServerMessage::Event(ServerEvent::PlayerLeft {
            player_name,
            clients,
            state,
        }) => format!(
            "{player_name} left. Players: {}\n{}",
            clients.join(", "),
            render_state(state, me)
        ),
        ServerMessage::Event(ServerEvent::StateUpdate { event, state }) => {
            format!("{event}\n{}", render_state(state, me))
        }
        ServerMessage::Event(ServerEvent::Chat {
            player_name,
            message,
        }) => format!("[{player_name}] {message}"),
        ServerMessage::Event(ServerEvent::Heartbeat { turn, players }) => {
            format!("(server alive: turn {turn}, {players} players)")
        }
        ServerMessage::Reply(Reply::State { result }) => render_state(result, me),
        ServerMessage::Reply(Reply::Error { error }) => format!("Error: {error}"),
        ServerMessage::Unrecognized(value) => format!("Unrecognized message: {value}"),
    }
}
