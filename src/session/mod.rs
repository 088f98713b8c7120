//! Game session coordination: the single authoritative owner of all
//! in-flight games.

pub mod coordinator;
pub mod types;

pub use coordinator::SessionHandle;
pub use types::{
    ChatMessage, CreateGameRequest, CreateRankedGameRequest, CreatedGame, GameEnd, GameId,
    GameState, GameStatus, GameSummary, GameView, JoinedGame, MatchId, OpponentKind, Player,
    PlayerCredential, PlayerKind, PlayerView, RankedGameCreated, RankedInfo, SessionId,
};
