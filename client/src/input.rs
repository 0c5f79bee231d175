//! Parsing of interactive commands typed on stdin

use shared::Direction;
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  move <N|S|E|W|NE|NW|SE|SW>  move one cell, wrapping at the edges
  attack <player>             hit another player for one health
  chat <message>              send a message to everyone
  state                       show the current board
  replay                      start a new round
  leave                       leave the game
  quit                        leave and exit
  help                        show this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    Attack(String),
    Chat(String),
    State,
    Replay,
    Leave,
    Quit,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}, type help for a list")]
    Unknown(String),
    #[error("{command} needs {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("{0}")]
    InvalidDirection(String),
}

/// Parses one input line. Command words are case-insensitive; chat text is
/// kept as typed.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(CommandError::Empty);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "move" | "m" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "move",
                    expected: "a direction",
                });
            }
            rest.parse::<Direction>()
                .map(Command::Move)
                .map_err(|e| CommandError::InvalidDirection(e.to_string()))
        }
        "attack" | "a" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "attack",
                    expected: "a target",
                });
            }
            Ok(Command::Attack(rest.to_string()))
        }
        "chat" | "say" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "chat",
                    expected: "a message",
                });
            }
            Ok(Command::Chat(rest.to_string()))
        }
        "state" | "s" => Ok(Command::State),
        "replay" => Ok(Command::Replay),
        "leave" => Ok(Command::Leave),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        "help" | "?" => Ok(Command::Help),
        _ => Err(CommandError::Unknown(word.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move() {
        assert_eq!(parse_command("move N"), Ok(Command::Move(Direction::N)));
        assert_eq!(parse_command("  MOVE se "), Ok(Command::Move(Direction::SE)));
        assert_eq!(parse_command("m w"), Ok(Command::Move(Direction::W)));
        assert!(matches!(
            parse_command("move up"),
            Err(CommandError::InvalidDirection(_))
        ));
        assert!(matches!(
            parse_command("move"),
            Err(CommandError::MissingArgument { command: "move", .. })
        ));
    }

    #[test]
    fn test_parse_chat_keeps_text() {
        assert_eq!(
            parse_command("chat Hello  There!"),
            Ok(Command::Chat("Hello  There!".into()))
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("attack P2"), Ok(Command::Attack("P2".into())));
        assert_eq!(parse_command("state"), Ok(Command::State));
        assert_eq!(parse_command("replay"), Ok(Command::Replay));
        assert_eq!(parse_command("leave"), Ok(Command::Leave));
        assert_eq!(parse_command("quit"), Ok(Command::Quit));
        assert_eq!(parse_command("help"), Ok(Command::Help));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_command("   "), Err(CommandError::Empty));
        assert_eq!(
            parse_command("dance now"),
            Err(CommandError::Unknown("dance".into()))
        );
    }
}
