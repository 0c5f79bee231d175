//! Authoritative game state: players on a wrapping grid hunting for treasure

use log::info;
use rand::Rng;
use shared::{Direction, GameSnapshot, PlayerSnapshot, Position, MAX_PLAYERS, STARTING_HEALTH};
use std::collections::BTreeMap;
use thiserror::Error;

/// Rule rejections. The display text is sent to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Player name must not be empty")]
    EmptyName,
    #[error("Player name {0} is already taken")]
    NameTaken(String),
    #[error("Game is full")]
    GameFull,
    #[error("Player {0} is not in the game")]
    UnknownPlayer(String),
    #[error("Player {0} does not exist")]
    UnknownTarget(String),
    #[error("Players cannot attack themselves")]
    SelfAttack,
    #[error("Game is over")]
    GameOver,
    #[error("Grid must be at least 3x3, got {0}")]
    GridTooSmall(u32),
}

/// Smallest board with four distinct spawn corners and a free cell between them.
pub const MIN_GRID_SIZE: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub position: Position,
    pub health: u32,
    pub spawn: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub position: Position,
    pub found_treasure: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackOutcome {
    pub remaining_health: u32,
    pub eliminated: bool,
    pub winner: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GameState {
    pub grid_size: u32,
    pub players: BTreeMap<String, Player>,
    pub treasure: Position,
    pub turn: u64,
    pub game_over: bool,
    pub winner: Option<String>,
}

impl GameState {
    pub fn new(grid_size: u32) -> Result<Self, GameError> {
        let mut state = Self::with_treasure(grid_size, Position::new(0, 0))?;
        state.treasure = state.random_free_cell();
        Ok(state)
    }

    /// Board with a fixed treasure location.
    pub fn with_treasure(grid_size: u32, treasure: Position) -> Result<Self, GameError> {
        if grid_size < MIN_GRID_SIZE {
            return Err(GameError::GridTooSmall(grid_size));
        }
        Ok(Self {
            grid_size,
            players: BTreeMap::new(),
            treasure,
            turn: 0,
            game_over: false,
            winner: None,
        })
    }

    fn corners(&self) -> [Position; 4] {
        let far = self.grid_size - 1;
        [
            Position::new(0, 0),
            Position::new(0, far),
            Position::new(far, 0),
            Position::new(far, far),
        ]
    }

    /// Random cell that is not a spawn corner and holds no player.
    fn random_free_cell(&self) -> Position {
        let corners = self.corners();
        let mut rng = rand::thread_rng();
        loop {
            let candidate = Position::new(
                rng.gen_range(0..self.grid_size),
                rng.gen_range(0..self.grid_size),
            );
            let occupied = self.players.values().any(|p| p.position == candidate);
            if !corners.contains(&candidate) && !occupied {
                return candidate;
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.players.contains_key(name)
    }

    pub fn player_names(&self) -> Vec<String> {
        self.players.keys().cloned().collect()
    }

    pub fn join(&mut self, name: &str) -> Result<Position, GameError> {
        if name.trim().is_empty() {
            return Err(GameError::EmptyName);
        }
        if self.players.contains_key(name) {
            return Err(GameError::NameTaken(name.to_string()));
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::GameFull);
        }

        let spawn = self
            .corners()
            .into_iter()
            .find(|corner| self.players.values().all(|p| p.spawn != *corner))
            .ok_or(GameError::GameFull)?;

        self.players.insert(
            name.to_string(),
            Player {
                position: spawn,
                health: STARTING_HEALTH,
                spawn,
            },
        );
        info!("Added player {} at {}", name, spawn);
        Ok(spawn)
    }

    pub fn leave(&mut self, name: &str) -> bool {
        let removed = self.players.remove(name).is_some();
        if removed {
            info!("Removed player {}", name);
        }
        removed
    }

    pub fn move_player(&mut self, name: &str, direction: Direction) -> Result<MoveOutcome, GameError> {
        if self.game_over {
            return Err(GameError::GameOver);
        }
        let grid_size = self.grid_size;
        let player = self
            .players
            .get_mut(name)
            .ok_or_else(|| GameError::UnknownPlayer(name.to_string()))?;

        player.position = player.position.step(direction, grid_size);
        let position = player.position;
        self.turn += 1;

        let found_treasure = position == self.treasure;
        if found_treasure {
            self.game_over = true;
            self.winner = Some(name.to_string());
            info!("{} found the treasure at {}", name, position);
        }

        Ok(MoveOutcome {
            position,
            found_treasure,
        })
    }

    pub fn attack(&mut self, attacker: &str, target: &str) -> Result<AttackOutcome, GameError> {
        if self.game_over {
            return Err(GameError::GameOver);
        }
        if !self.players.contains_key(attacker) {
            return Err(GameError::UnknownPlayer(attacker.to_string()));
        }
        if attacker == target {
            return Err(GameError::SelfAttack);
        }
        let victim = self
            .players
            .get_mut(target)
            .ok_or_else(|| GameError::UnknownTarget(target.to_string()))?;

        victim.health = victim.health.saturating_sub(1);
        let remaining_health = victim.health;
        self.turn += 1;

        let eliminated = remaining_health == 0;
        if eliminated {
            self.players.remove(target);
            info!("{} eliminated {}", attacker, target);
        }

        if eliminated && self.players.len() == 1 {
            self.game_over = true;
            self.winner = Some(attacker.to_string());
        }

        Ok(AttackOutcome {
            remaining_health,
            eliminated,
            winner: self.winner.clone(),
        })
    }

    /// Starts a new round with the remaining players.
    pub fn reset(&mut self) {
        for player in self.players.values_mut() {
            player.position = player.spawn;
            player.health = STARTING_HEALTH;
        }
        self.turn = 0;
        self.game_over = false;
        self.winner = None;
        self.treasure = self.random_free_cell();
        info!("Game reset with {} players", self.players.len());
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            grid_size: self.grid_size,
            players: self
                .players
                .iter()
                .map(|(name, p)| {
                    (
                        name.clone(),
                        PlayerSnapshot {
                            position: p.position,
                            health: p.health,
                        },
                    )
                })
                .collect(),
            treasure: self.treasure,
            turn: self.turn,
            game_over: self.game_over,
            winner: self.winner.clone(),
        }
    }
}
