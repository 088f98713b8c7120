//! The game session coordinator: one task owning every in-flight game.
//!
//! Operations arrive over an mpsc channel and are handled to completion,
//! one at a time, before the next is taken - this serialization is what
//! makes concurrent moves on the same game safe without locks. After each
//! successful mutation the whole game map is snapshotted to the store; a
//! crash between mutation and write can lose the latest action, which is
//! an accepted gap, not a silent one.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::types::{
    ChatMessage, CreateGameRequest, CreateRankedGameRequest, CreatedGame, GameEnd, GameId,
    GameState, GameStatus, GameSummary, GameView, JoinedGame, OpponentKind, Player,
    PlayerCredential, PlayerKind, RankedGameCreated, RankedInfo, SessionId,
};
use crate::ai;
use crate::config::ServiceConfig;
use crate::error::GameError;
use crate::rating::{self, GameOutcome, RankedGameRecord};
use crate::rules::{self, Board, GoMove, Position, Stone};
use crate::store::{load_snapshot, save_snapshot, RatingStore, SnapshotStore};

/// Snapshot key for the whole game map.
pub const GAMES_SNAPSHOT_KEY: &str = "games";

enum Command {
    CreateGame {
        req: CreateGameRequest,
        reply: oneshot::Sender<Result<CreatedGame, GameError>>,
    },
    CreateRankedGame {
        req: CreateRankedGameRequest,
        reply: oneshot::Sender<Result<RankedGameCreated, GameError>>,
    },
    JoinGame {
        game_id: GameId,
        user_id: String,
        display_name: String,
        reply: oneshot::Sender<Result<JoinedGame, GameError>>,
    },
    WatchGame {
        game_id: GameId,
        user_id: String,
        reply: oneshot::Sender<Result<GameView, GameError>>,
    },
    MakeMove {
        game_id: GameId,
        user_id: String,
        session_id: SessionId,
        row: usize,
        col: usize,
        reply: oneshot::Sender<Result<GameView, GameError>>,
    },
    PassTurn {
        game_id: GameId,
        user_id: String,
        session_id: SessionId,
        reply: oneshot::Sender<Result<GameView, GameError>>,
    },
    ResignGame {
        game_id: GameId,
        user_id: String,
        session_id: SessionId,
        reply: oneshot::Sender<Result<GameView, GameError>>,
    },
    AddChatMessage {
        game_id: GameId,
        user_id: String,
        session_id: SessionId,
        text: String,
        reply: oneshot::Sender<Result<GameView, GameError>>,
    },
    ToggleChatVisibility {
        game_id: GameId,
        user_id: String,
        session_id: SessionId,
        reply: oneshot::Sender<Result<GameView, GameError>>,
    },
    ListGames {
        reply: oneshot::Sender<Vec<GameSummary>>,
    },
    GetUserGames {
        user_id: String,
        reply: oneshot::Sender<Vec<GameSummary>>,
    },
    GetGame {
        game_id: GameId,
        viewer: Option<String>,
        reply: oneshot::Sender<Result<GameView, GameError>>,
    },
}

/// Cloneable handle for talking to the session coordinator.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

macro_rules! request {
    ($self:expr, $variant:ident { $($field:ident: $value:expr),* $(,)? }) => {{
        let (reply, rx) = oneshot::channel();
        $self
            .tx
            .send(Command::$variant { $($field: $value,)* reply })
            .await
            .map_err(|_| GameError::CoordinatorClosed)?;
        rx.await.map_err(|_| GameError::CoordinatorClosed)?
    }};
}

impl SessionHandle {
    /// Restore state from the snapshot store and start the coordinator
    /// task.
    pub fn spawn(
        store: Arc<dyn SnapshotStore>,
        ratings: Arc<dyn RatingStore>,
        config: ServiceConfig,
    ) -> Self {
        let games = match load_snapshot::<HashMap<GameId, GameState>>(&*store, GAMES_SNAPSHOT_KEY)
        {
            Ok(Some(games)) => {
                tracing::info!(count = games.len(), "restored games from snapshot");
                games
            }
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::error!(error = %e, "failed to restore game snapshot, starting empty");
                HashMap::new()
            }
        };

        let (tx, rx) = mpsc::channel(64);
        let coordinator = SessionCoordinator {
            games,
            store,
            ratings,
            config,
            rx,
        };
        tokio::spawn(coordinator.run());
        Self { tx }
    }

    pub async fn create_game(&self, req: CreateGameRequest) -> Result<CreatedGame, GameError> {
        request!(self, CreateGame { req: req })
    }

    pub async fn create_ranked_game(
        &self,
        req: CreateRankedGameRequest,
    ) -> Result<RankedGameCreated, GameError> {
        request!(self, CreateRankedGame { req: req })
    }

    pub async fn join_game(
        &self,
        game_id: GameId,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<JoinedGame, GameError> {
        request!(self, JoinGame {
            game_id: game_id,
            user_id: user_id.into(),
            display_name: display_name.into(),
        })
    }

    pub async fn watch_game(
        &self,
        game_id: GameId,
        user_id: impl Into<String>,
    ) -> Result<GameView, GameError> {
        request!(self, WatchGame { game_id: game_id, user_id: user_id.into() })
    }

    pub async fn make_move(
        &self,
        game_id: GameId,
        user_id: impl Into<String>,
        session_id: SessionId,
        row: usize,
        col: usize,
    ) -> Result<GameView, GameError> {
        request!(self, MakeMove {
            game_id: game_id,
            user_id: user_id.into(),
            session_id: session_id,
            row: row,
            col: col,
        })
    }

    pub async fn pass_turn(
        &self,
        game_id: GameId,
        user_id: impl Into<String>,
        session_id: SessionId,
    ) -> Result<GameView, GameError> {
        request!(self, PassTurn {
            game_id: game_id,
            user_id: user_id.into(),
            session_id: session_id,
        })
    }

    pub async fn resign_game(
        &self,
        game_id: GameId,
        user_id: impl Into<String>,
        session_id: SessionId,
    ) -> Result<GameView, GameError> {
        request!(self, ResignGame {
            game_id: game_id,
            user_id: user_id.into(),
            session_id: session_id,
        })
    }

    pub async fn add_chat_message(
        &self,
        game_id: GameId,
        user_id: impl Into<String>,
        session_id: SessionId,
        text: impl Into<String>,
    ) -> Result<GameView, GameError> {
        request!(self, AddChatMessage {
            game_id: game_id,
            user_id: user_id.into(),
            session_id: session_id,
            text: text.into(),
        })
    }

    pub async fn toggle_chat_visibility(
        &self,
        game_id: GameId,
        user_id: impl Into<String>,
        session_id: SessionId,
    ) -> Result<GameView, GameError> {
        request!(self, ToggleChatVisibility {
            game_id: game_id,
            user_id: user_id.into(),
            session_id: session_id,
        })
    }

    pub async fn list_games(&self) -> Result<Vec<GameSummary>, GameError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ListGames { reply })
            .await
            .map_err(|_| GameError::CoordinatorClosed)?;
        rx.await.map_err(|_| GameError::CoordinatorClosed)
    }

    pub async fn get_user_games(
        &self,
        user_id: impl Into<String>,
    ) -> Result<Vec<GameSummary>, GameError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::GetUserGames {
                user_id: user_id.into(),
                reply,
            })
            .await
            .map_err(|_| GameError::CoordinatorClosed)?;
        rx.await.map_err(|_| GameError::CoordinatorClosed)
    }

    pub async fn get_game(
        &self,
        game_id: GameId,
        viewer: Option<String>,
    ) -> Result<GameView, GameError> {
        request!(self, GetGame { game_id: game_id, viewer: viewer })
    }
}

struct SessionCoordinator {
    games: HashMap<GameId, GameState>,
    store: Arc<dyn SnapshotStore>,
    ratings: Arc<dyn RatingStore>,
    config: ServiceConfig,
    rx: mpsc::Receiver<Command>,
}

impl SessionCoordinator {
    async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            self.handle(cmd);
        }
        tracing::info!("session coordinator stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::CreateGame { req, reply } => {
                let _ = reply.send(self.create_game(req));
            }
            Command::CreateRankedGame { req, reply } => {
                let _ = reply.send(self.create_ranked_game(req));
            }
            Command::JoinGame {
                game_id,
                user_id,
                display_name,
                reply,
            } => {
                let _ = reply.send(self.join_game(game_id, user_id, display_name));
            }
            Command::WatchGame {
                game_id,
                user_id,
                reply,
            } => {
                let _ = reply.send(self.watch_game(game_id, user_id));
            }
            Command::MakeMove {
                game_id,
                user_id,
                session_id,
                row,
                col,
                reply,
            } => {
                let _ = reply.send(self.make_move(game_id, &user_id, session_id, row, col));
            }
            Command::PassTurn {
                game_id,
                user_id,
                session_id,
                reply,
            } => {
                let _ = reply.send(self.pass_turn(game_id, &user_id, session_id));
            }
            Command::ResignGame {
                game_id,
                user_id,
                session_id,
                reply,
            } => {
                let _ = reply.send(self.resign_game(game_id, &user_id, session_id));
            }
            Command::AddChatMessage {
                game_id,
                user_id,
                session_id,
                text,
                reply,
            } => {
                let _ = reply.send(self.add_chat_message(game_id, &user_id, session_id, text));
            }
            Command::ToggleChatVisibility {
                game_id,
                user_id,
                session_id,
                reply,
            } => {
                let _ = reply.send(self.toggle_chat_visibility(game_id, &user_id, session_id));
            }
            Command::ListGames { reply } => {
                let mut listing: Vec<GameSummary> = self
                    .games
                    .values()
                    .filter(|g| g.is_public && g.status != GameStatus::Finished)
                    .map(GameState::summary)
                    .collect();
                listing.sort_by_key(|s| s.created_at);
                let _ = reply.send(listing);
            }
            Command::GetUserGames { user_id, reply } => {
                let mut listing: Vec<GameSummary> = self
                    .games
                    .values()
                    .filter(|g| g.player(&user_id).is_some())
                    .map(GameState::summary)
                    .collect();
                listing.sort_by_key(|s| s.created_at);
                let _ = reply.send(listing);
            }
            Command::GetGame {
                game_id,
                viewer,
                reply,
            } => {
                let result = self
                    .games
                    .get(&game_id)
                    .map(|g| g.view_for(viewer.as_deref()))
                    .ok_or(GameError::GameNotFound);
                let _ = reply.send(result);
            }
        }
    }

    fn create_game(&mut self, req: CreateGameRequest) -> Result<CreatedGame, GameError> {
        if !Board::is_supported_size(req.size) {
            return Err(GameError::BadBoardSize(req.size));
        }

        let game_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let creator = Player {
            user_id: req.user_id.clone(),
            name: req.display_name,
            color: Stone::Black,
            kind: PlayerKind::Human,
            session_id,
            ai_level: None,
            chat_visible: true,
        };

        let mut game = GameState {
            id: game_id,
            name: req.game_name,
            is_public: req.is_public,
            status: GameStatus::Waiting,
            komi: self.config.komi,
            position: Position::new(req.size),
            players: vec![creator],
            watchers: Vec::new(),
            chat: Vec::new(),
            end: None,
            territory: None,
            ranked: None,
            created_at: Utc::now(),
        };

        if let OpponentKind::Ai { level } = req.opponent {
            game.players.push(Player {
                user_id: format!("ai-{game_id}"),
                name: "Computer".to_string(),
                color: Stone::White,
                kind: PlayerKind::Ai,
                session_id: Uuid::new_v4(),
                ai_level: Some(level),
                chat_visible: true,
            });
            game.status = GameStatus::Playing;
        }

        tracing::info!(game = %game_id, user = %req.user_id, size = req.size, "game created");
        let view = game.view_for(Some(&req.user_id));
        self.games.insert(game_id, game);
        self.persist();

        Ok(CreatedGame {
            game: view,
            session_id,
        })
    }

    fn create_ranked_game(
        &mut self,
        req: CreateRankedGameRequest,
    ) -> Result<RankedGameCreated, GameError> {
        if !Board::is_supported_size(req.size) {
            return Err(GameError::BadBoardSize(req.size));
        }

        let black_pre = self.stored_rating(&req.black_user);
        let white_pre = self.stored_rating(&req.white_user);

        let game_id = Uuid::new_v4();
        let black = PlayerCredential {
            user_id: req.black_user.clone(),
            session_id: Uuid::new_v4(),
            color: Stone::Black,
        };
        let white = PlayerCredential {
            user_id: req.white_user.clone(),
            session_id: Uuid::new_v4(),
            color: Stone::White,
        };

        let game = GameState {
            id: game_id,
            name: format!("Ranked: {} vs {}", req.black_name, req.white_name),
            is_public: false,
            status: GameStatus::Playing,
            komi: self.config.komi,
            position: Position::new(req.size),
            players: vec![
                Player {
                    user_id: req.black_user,
                    name: req.black_name,
                    color: Stone::Black,
                    kind: PlayerKind::Human,
                    session_id: black.session_id,
                    ai_level: None,
                    chat_visible: true,
                },
                Player {
                    user_id: req.white_user,
                    name: req.white_name,
                    color: Stone::White,
                    kind: PlayerKind::Human,
                    session_id: white.session_id,
                    ai_level: None,
                    chat_visible: true,
                },
            ],
            watchers: Vec::new(),
            chat: Vec::new(),
            end: None,
            territory: None,
            ranked: Some(RankedInfo {
                match_id: req.match_id,
                black_pre,
                white_pre,
                black_post: None,
                white_post: None,
                processed: false,
            }),
            created_at: Utc::now(),
        };

        tracing::info!(
            game = %game_id,
            match_id = %req.match_id,
            black_pre,
            white_pre,
            "ranked game created"
        );
        self.games.insert(game_id, game);
        self.persist();

        Ok(RankedGameCreated {
            game_id,
            match_id: req.match_id,
            black,
            white,
        })
    }

    fn join_game(
        &mut self,
        game_id: GameId,
        user_id: String,
        display_name: String,
    ) -> Result<JoinedGame, GameError> {
        let game = self.games.get_mut(&game_id).ok_or(GameError::GameNotFound)?;
        if game.player(&user_id).is_some() {
            return Err(GameError::AlreadyJoined);
        }
        if game.status != GameStatus::Waiting {
            return Err(GameError::NotJoinable);
        }

        let session_id = Uuid::new_v4();
        game.players.push(Player {
            user_id: user_id.clone(),
            name: display_name,
            color: Stone::White,
            kind: PlayerKind::Human,
            session_id,
            ai_level: None,
            chat_visible: true,
        });
        game.status = GameStatus::Playing;

        tracing::info!(game = %game_id, user = %user_id, "second player joined");
        let view = game.view_for(Some(&user_id));
        self.persist();

        Ok(JoinedGame {
            game: view,
            session_id,
        })
    }

    fn watch_game(&mut self, game_id: GameId, user_id: String) -> Result<GameView, GameError> {
        let game = self.games.get_mut(&game_id).ok_or(GameError::GameNotFound)?;
        let is_watcher = game.watchers.iter().any(|w| *w == user_id);
        if game.player(&user_id).is_none() && !is_watcher {
            game.watchers.push(user_id.clone());
            let view = game.view_for(Some(&user_id));
            self.persist();
            return Ok(view);
        }
        Ok(game.view_for(Some(&user_id)))
    }

    fn make_move(
        &mut self,
        game_id: GameId,
        user_id: &str,
        session_id: SessionId,
        row: usize,
        col: usize,
    ) -> Result<GameView, GameError> {
        let game = self.games.get_mut(&game_id).ok_or(GameError::GameNotFound)?;
        let color = game.authorize(user_id, session_id)?.color;
        game.ensure_playing()?;
        if game.position.to_move != color {
            return Err(GameError::NotYourTurn);
        }

        rules::apply_move(&mut game.position, row, col)?;
        Self::drive_ai(game);
        Self::settle_ranked(&*self.ratings, game);

        let view = game.view_for(Some(user_id));
        self.persist();
        Ok(view)
    }

    fn pass_turn(
        &mut self,
        game_id: GameId,
        user_id: &str,
        session_id: SessionId,
    ) -> Result<GameView, GameError> {
        let game = self.games.get_mut(&game_id).ok_or(GameError::GameNotFound)?;
        let color = game.authorize(user_id, session_id)?.color;
        game.ensure_playing()?;
        if game.position.to_move != color {
            return Err(GameError::NotYourTurn);
        }

        if rules::apply_pass(&mut game.position) {
            Self::finish_scored(game);
        } else {
            Self::drive_ai(game);
        }
        Self::settle_ranked(&*self.ratings, game);

        let view = game.view_for(Some(user_id));
        self.persist();
        Ok(view)
    }

    fn resign_game(
        &mut self,
        game_id: GameId,
        user_id: &str,
        session_id: SessionId,
    ) -> Result<GameView, GameError> {
        let game = self.games.get_mut(&game_id).ok_or(GameError::GameNotFound)?;
        let color = game.authorize(user_id, session_id)?.color;
        game.ensure_playing()?;

        game.status = GameStatus::Finished;
        game.end = Some(GameEnd::Resignation {
            winner: color.opponent(),
        });
        tracing::info!(game = %game_id, user = %user_id, "resignation");
        Self::settle_ranked(&*self.ratings, game);

        let view = game.view_for(Some(user_id));
        self.persist();
        Ok(view)
    }

    fn add_chat_message(
        &mut self,
        game_id: GameId,
        user_id: &str,
        session_id: SessionId,
        text: String,
    ) -> Result<GameView, GameError> {
        let game = self.games.get_mut(&game_id).ok_or(GameError::GameNotFound)?;
        let player = game.authorize(user_id, session_id)?;
        if text.trim().is_empty() {
            return Err(GameError::EmptyChatMessage);
        }

        let message = ChatMessage {
            user_id: player.user_id.clone(),
            from: player.name.clone(),
            text,
            at: Utc::now(),
        };
        game.chat.push(message);

        let view = game.view_for(Some(user_id));
        self.persist();
        Ok(view)
    }

    fn toggle_chat_visibility(
        &mut self,
        game_id: GameId,
        user_id: &str,
        session_id: SessionId,
    ) -> Result<GameView, GameError> {
        let game = self.games.get_mut(&game_id).ok_or(GameError::GameNotFound)?;
        game.authorize(user_id, session_id)?;
        if let Some(player) = game.player_mut(user_id) {
            player.chat_visible = !player.chat_visible;
        }

        let view = game.view_for(Some(user_id));
        self.persist();
        Ok(view)
    }

    /// While it is the computer's turn in a live game, compute and apply
    /// its reply before returning to the caller.
    fn drive_ai(game: &mut GameState) {
        while game.status == GameStatus::Playing {
            let to_move = game.position.to_move;
            let is_ai = game
                .player_by_color(to_move)
                .is_some_and(|p| p.kind == PlayerKind::Ai);
            if !is_ai {
                break;
            }

            let chosen = ai::choose_move(
                &game.position.board,
                to_move,
                game.position.history.last(),
            );
            match chosen {
                GoMove::Place(row, col) => {
                    if rules::apply_move(&mut game.position, row, col).is_err() {
                        // The evaluator only proposes legal moves; fall
                        // back to passing if that ever stops holding.
                        if rules::apply_pass(&mut game.position) {
                            Self::finish_scored(game);
                        }
                    }
                }
                GoMove::Pass => {
                    if rules::apply_pass(&mut game.position) {
                        Self::finish_scored(game);
                    }
                }
            }
        }
    }

    /// Score the board and close the game out. Runs once: the status flip
    /// to `Finished` keeps every later mutating call away.
    fn finish_scored(game: &mut GameState) {
        let score = rules::score_game(&game.position.board, game.komi);
        game.status = GameStatus::Finished;
        game.end = Some(GameEnd::Scored {
            black: score.black,
            white: score.white,
            winner: score.winner(),
        });
        game.territory = Some(score.territory);
        tracing::info!(game = %game.id, "game finished by double pass");
    }

    /// Apply ratings for a finished ranked game, exactly once. New ratings
    /// are computed from the pre-game values recorded at creation, so the
    /// two sides are order-independent.
    fn settle_ranked(ratings: &dyn RatingStore, game: &mut GameState) {
        if game.status != GameStatus::Finished {
            return;
        }
        let Some(ranked) = game.ranked.as_mut() else {
            return;
        };
        if ranked.processed {
            return;
        }
        ranked.processed = true;

        let winner = game.end.as_ref().and_then(GameEnd::winner);
        let black_outcome = match winner {
            Some(Stone::Black) => GameOutcome::Win,
            Some(Stone::White) => GameOutcome::Loss,
            None => GameOutcome::Draw,
        };
        let white_outcome = black_outcome.reversed();
        let finished_at = Utc::now();

        let black_user = game
            .players
            .iter()
            .find(|p| p.color == Stone::Black)
            .map(|p| p.user_id.clone())
            .unwrap_or_default();
        let white_user = game
            .players
            .iter()
            .find(|p| p.color == Stone::White)
            .map(|p| p.user_id.clone())
            .unwrap_or_default();

        let mut black_row = match ratings.rating(&black_user) {
            Ok(row) => row,
            Err(e) => {
                tracing::error!(error = %e, user = %black_user, "rating read failed");
                crate::rating::PlayerRating::new(black_user.as_str())
            }
        };
        let mut white_row = match ratings.rating(&white_user) {
            Ok(row) => row,
            Err(e) => {
                tracing::error!(error = %e, user = %white_user, "rating read failed");
                crate::rating::PlayerRating::new(white_user.as_str())
            }
        };

        // Re-anchor to the pre-game snapshot before folding the result in.
        black_row.rating = ranked.black_pre;
        white_row.rating = ranked.white_pre;
        rating::apply_outcome(&mut black_row, ranked.white_pre, black_outcome, finished_at);
        rating::apply_outcome(&mut white_row, ranked.black_pre, white_outcome, finished_at);

        ranked.black_post = Some(black_row.rating);
        ranked.white_post = Some(white_row.rating);

        let record = RankedGameRecord {
            game_id: game.id,
            match_id: ranked.match_id,
            black_user: black_user.clone(),
            white_user: white_user.clone(),
            black_pre: ranked.black_pre,
            white_pre: ranked.white_pre,
            black_post: black_row.rating,
            white_post: white_row.rating,
            winner,
            finished_at,
        };

        for result in [
            ratings.put_rating(&black_row),
            ratings.put_rating(&white_row),
            ratings.append_history(&record),
        ] {
            if let Err(e) = result {
                tracing::error!(game = %game.id, error = %e, "ranked persistence failed");
            }
        }

        tracing::info!(
            game = %game.id,
            black = %black_user,
            black_post = black_row.rating,
            white = %white_user,
            white_post = white_row.rating,
            "ranked ratings applied"
        );
    }

    /// Write-after-mutate snapshot of the whole game map. Failures are
    /// loud but do not roll back the in-memory mutation.
    fn persist(&self) {
        if let Err(e) = save_snapshot(&*self.store, GAMES_SNAPSHOT_KEY, &self.games) {
            tracing::error!(error = %e, "game snapshot write failed");
        }
    }

    fn stored_rating(&self, user_id: &str) -> i32 {
        match self.ratings.rating(user_id) {
            Ok(row) => row.rating,
            Err(e) => {
                tracing::error!(error = %e, user = %user_id, "rating read failed");
                crate::constants::INITIAL_RATING
            }
        }
    }
}
