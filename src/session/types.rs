//! Game lifecycle data structures and the request/response payloads the
//! session coordinator speaks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GameError;
use crate::rules::{Board, GoMove, Position, Stone, TerritoryMap};

pub type GameId = Uuid;
pub type SessionId = Uuid;
pub type MatchId = Uuid;

/// Who controls a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerKind {
    Human,
    Ai,
}

/// Lifecycle of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    Playing,
    Finished,
}

/// Opponent requested at game creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpponentKind {
    /// Leave the game open for a second human to join.
    Human,
    /// Attach the computer opponent immediately.
    Ai { level: u8 },
}

/// A seated player. The session id is the credential the player presents
/// on every mutating call; it never appears in views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub user_id: String,
    pub name: String,
    pub color: Stone,
    pub kind: PlayerKind,
    pub session_id: SessionId,
    /// AI strength knob recorded at creation; the single-ply evaluator
    /// currently plays the same at every level.
    pub ai_level: Option<u8>,
    /// Whether this player currently wants to see the game chat.
    pub chat_visible: bool,
}

/// One line of game chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user_id: String,
    pub from: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Terminal result of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEnd {
    Scored {
        black: f64,
        white: f64,
        winner: Option<Stone>,
    },
    Resignation {
        winner: Stone,
    },
}

impl GameEnd {
    pub fn winner(&self) -> Option<Stone> {
        match self {
            GameEnd::Scored { winner, .. } => *winner,
            GameEnd::Resignation { winner } => Some(*winner),
        }
    }
}

/// Ranked bookkeeping carried by games created through matchmaking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedInfo {
    pub match_id: MatchId,
    pub black_pre: i32,
    pub white_pre: i32,
    pub black_post: Option<i32>,
    pub white_post: Option<i32>,
    /// One-shot guard: flips false to true exactly once, when ratings are
    /// applied at game end.
    pub processed: bool,
}

/// Full authoritative state of one game. Owned exclusively by the session
/// coordinator; everyone else sees [`GameView`] clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub id: GameId,
    pub name: String,
    pub is_public: bool,
    pub status: GameStatus,
    pub komi: f64,
    pub position: Position,
    pub players: Vec<Player>,
    pub watchers: Vec<String>,
    pub chat: Vec<ChatMessage>,
    pub end: Option<GameEnd>,
    pub territory: Option<TerritoryMap>,
    pub ranked: Option<RankedInfo>,
    pub created_at: DateTime<Utc>,
}

impl GameState {
    pub fn is_ranked(&self) -> bool {
        self.ranked.is_some()
    }

    pub fn player(&self, user_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    pub fn player_mut(&mut self, user_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.user_id == user_id)
    }

    pub fn player_by_color(&self, color: Stone) -> Option<&Player> {
        self.players.iter().find(|p| p.color == color)
    }

    /// Check the caller's seat and credential.
    pub fn authorize(&self, user_id: &str, session_id: SessionId) -> Result<&Player, GameError> {
        let player = self.player(user_id).ok_or(GameError::NotAPlayer)?;
        if player.session_id != session_id {
            return Err(GameError::InvalidSession);
        }
        Ok(player)
    }

    /// Reject unless the game is in progress.
    pub fn ensure_playing(&self) -> Result<(), GameError> {
        match self.status {
            GameStatus::Playing => Ok(()),
            GameStatus::Waiting => Err(GameError::NotStarted),
            GameStatus::Finished => Err(GameError::GameFinished),
        }
    }

    /// Snapshot for a particular viewer. Chat is withheld from a player
    /// who has toggled it off; session credentials never leave the state.
    pub fn view_for(&self, viewer: Option<&str>) -> GameView {
        let chat_hidden = viewer
            .and_then(|id| self.player(id))
            .is_some_and(|p| !p.chat_visible);
        GameView {
            id: self.id,
            name: self.name.clone(),
            is_public: self.is_public,
            status: self.status,
            size: self.position.board.size(),
            board: self.position.board.clone(),
            to_move: self.position.to_move,
            turn: self.position.turn,
            last_action: self.position.last_action,
            players: self
                .players
                .iter()
                .map(|p| PlayerView {
                    user_id: p.user_id.clone(),
                    name: p.name.clone(),
                    color: p.color,
                    kind: p.kind,
                    captures: self.position.captures(p.color),
                })
                .collect(),
            watchers: self.watchers.clone(),
            chat: if chat_hidden {
                Vec::new()
            } else {
                self.chat.clone()
            },
            end: self.end.clone(),
            territory: self.territory.clone(),
            ranked: self.ranked.clone(),
            komi: self.komi,
            created_at: self.created_at,
        }
    }

    /// One-line listing entry.
    pub fn summary(&self) -> GameSummary {
        GameSummary {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            size: self.position.board.size(),
            is_public: self.is_public,
            is_ranked: self.is_ranked(),
            players: self.players.iter().map(|p| p.name.clone()).collect(),
            created_at: self.created_at,
        }
    }
}

/// A player as exposed to other clients: no credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub user_id: String,
    pub name: String,
    pub color: Stone,
    pub kind: PlayerKind,
    pub captures: u32,
}

/// Read-only snapshot of a game, safe to hand to any caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameView {
    pub id: GameId,
    pub name: String,
    pub is_public: bool,
    pub status: GameStatus,
    pub size: usize,
    pub board: Board,
    pub to_move: Stone,
    pub turn: u32,
    pub last_action: Option<GoMove>,
    pub players: Vec<PlayerView>,
    pub watchers: Vec<String>,
    pub chat: Vec<ChatMessage>,
    pub end: Option<GameEnd>,
    pub territory: Option<TerritoryMap>,
    pub ranked: Option<RankedInfo>,
    pub komi: f64,
    pub created_at: DateTime<Utc>,
}

impl GameView {
    pub fn player(&self, user_id: &str) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.user_id == user_id)
    }
}

/// Listing entry for the lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub id: GameId,
    pub name: String,
    pub status: GameStatus,
    pub size: usize,
    pub is_public: bool,
    pub is_ranked: bool,
    pub players: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a casual game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub user_id: String,
    pub display_name: String,
    pub game_name: String,
    pub is_public: bool,
    pub size: usize,
    pub opponent: OpponentKind,
}

/// A created casual game plus the creator's credential.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedGame {
    pub game: GameView,
    pub session_id: SessionId,
}

/// A joined game plus the joiner's credential.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedGame {
    pub game: GameView,
    pub session_id: SessionId,
}

/// Parameters for materializing an accepted match as a live ranked game.
/// `black_user` is the participant who queued first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRankedGameRequest {
    pub match_id: MatchId,
    pub black_user: String,
    pub black_name: String,
    pub white_user: String,
    pub white_name: String,
    pub size: usize,
}

/// Credential for one side of a ranked game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCredential {
    pub user_id: String,
    pub session_id: SessionId,
    pub color: Stone,
}

/// Everything both sides need to start playing a ranked game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedGameCreated {
    pub game_id: GameId,
    pub match_id: MatchId,
    pub black: PlayerCredential,
    pub white: PlayerCredential,
}

impl RankedGameCreated {
    /// The credential belonging to `user_id`, if they are one of the sides.
    pub fn credential_for(&self, user_id: &str) -> Option<&PlayerCredential> {
        [&self.black, &self.white]
            .into_iter()
            .find(|c| c.user_id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_game() -> GameState {
        GameState {
            id: Uuid::new_v4(),
            name: "test".into(),
            is_public: true,
            status: GameStatus::Playing,
            komi: 7.5,
            position: Position::new(9),
            players: vec![
                Player {
                    user_id: "alice".into(),
                    name: "Alice".into(),
                    color: Stone::Black,
                    kind: PlayerKind::Human,
                    session_id: Uuid::new_v4(),
                    ai_level: None,
                    chat_visible: true,
                },
                Player {
                    user_id: "bob".into(),
                    name: "Bob".into(),
                    color: Stone::White,
                    kind: PlayerKind::Human,
                    session_id: Uuid::new_v4(),
                    ai_level: None,
                    chat_visible: false,
                },
            ],
            watchers: Vec::new(),
            chat: vec![ChatMessage {
                user_id: "alice".into(),
                from: "Alice".into(),
                text: "hi".into(),
                at: Utc::now(),
            }],
            end: None,
            territory: None,
            ranked: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_authorize_checks_seat_and_credential() {
        let game = sample_game();
        let alice = game.player("alice").unwrap().clone();

        assert!(game.authorize("alice", alice.session_id).is_ok());
        assert_eq!(
            game.authorize("carol", alice.session_id).unwrap_err(),
            GameError::NotAPlayer
        );
        assert_eq!(
            game.authorize("alice", Uuid::new_v4()).unwrap_err(),
            GameError::InvalidSession
        );
    }

    #[test]
    fn test_view_never_contains_credentials() {
        let game = sample_game();
        let json = serde_json::to_string(&game.view_for(Some("alice"))).unwrap();
        for player in &game.players {
            assert!(!json.contains(&player.session_id.to_string()));
        }
    }

    #[test]
    fn test_view_respects_chat_visibility() {
        let game = sample_game();
        assert_eq!(game.view_for(Some("alice")).chat.len(), 1);
        assert!(game.view_for(Some("bob")).chat.is_empty());
        // Watchers and unknown viewers see chat.
        assert_eq!(game.view_for(None).chat.len(), 1);
    }

    #[test]
    fn test_ensure_playing_guards() {
        let mut game = sample_game();
        assert!(game.ensure_playing().is_ok());
        game.status = GameStatus::Waiting;
        assert_eq!(game.ensure_playing().unwrap_err(), GameError::NotStarted);
        game.status = GameStatus::Finished;
        assert_eq!(game.ensure_playing().unwrap_err(), GameError::GameFinished);
    }

    #[test]
    fn test_credential_lookup() {
        let created = RankedGameCreated {
            game_id: Uuid::new_v4(),
            match_id: Uuid::new_v4(),
            black: PlayerCredential {
                user_id: "alice".into(),
                session_id: Uuid::new_v4(),
                color: Stone::Black,
            },
            white: PlayerCredential {
                user_id: "bob".into(),
                session_id: Uuid::new_v4(),
                color: Stone::White,
            },
        };
        assert_eq!(created.credential_for("alice").unwrap().color, Stone::Black);
        assert_eq!(created.credential_for("bob").unwrap().color, Stone::White);
        assert!(created.credential_for("carol").is_none());
    }
}
