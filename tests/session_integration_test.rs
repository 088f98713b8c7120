//! Integration tests for the game session coordinator: lifecycle flows,
//! authorization, AI games, ranked settlement, and restart recovery.

use std::sync::Arc;

use uuid::Uuid;

use goban::config::ServiceConfig;
use goban::error::GameError;
use goban::rules::{RuleError, Stone};
use goban::session::{
    CreateGameRequest, CreateRankedGameRequest, GameEnd, GameStatus, OpponentKind, PlayerKind,
    SessionHandle,
};
use goban::store::{
    MemorySnapshotStore, RatingStore, SnapshotRatingStore, SnapshotStore,
};

type Ratings = SnapshotRatingStore<MemorySnapshotStore>;

fn stores() -> (Arc<dyn SnapshotStore>, Arc<Ratings>) {
    (
        Arc::new(MemorySnapshotStore::new()),
        Arc::new(SnapshotRatingStore::new(MemorySnapshotStore::new())),
    )
}

fn spawn_session() -> (SessionHandle, Arc<dyn SnapshotStore>, Arc<Ratings>) {
    let (store, ratings) = stores();
    let session = SessionHandle::spawn(store.clone(), ratings.clone(), ServiceConfig::default());
    (session, store, ratings)
}

fn casual_request(user: &str, opponent: OpponentKind) -> CreateGameRequest {
    CreateGameRequest {
        user_id: user.into(),
        display_name: user.into(),
        game_name: format!("{user}'s game"),
        is_public: true,
        size: 9,
        opponent,
    }
}

fn seed_rating(ratings: &Ratings, user: &str, value: i32) {
    let mut row = ratings.rating(user).unwrap();
    row.rating = value;
    ratings.put_rating(&row).unwrap();
}

#[tokio::test]
async fn test_create_and_join_flow() {
    let (session, _, _) = spawn_session();

    let created = session
        .create_game(casual_request("alice", OpponentKind::Human))
        .await
        .unwrap();
    assert_eq!(created.game.status, GameStatus::Waiting);
    assert_eq!(created.game.players.len(), 1);
    assert_eq!(created.game.players[0].color, Stone::Black);

    let joined = session
        .join_game(created.game.id, "bob", "Bob")
        .await
        .unwrap();
    assert_eq!(joined.game.status, GameStatus::Playing);
    assert_eq!(joined.game.player("bob").unwrap().color, Stone::White);

    // The game is full now.
    assert_eq!(
        session.join_game(created.game.id, "carol", "Carol").await,
        Err(GameError::NotJoinable)
    );
    // Rejoining under the same user is also rejected.
    assert_eq!(
        session.join_game(created.game.id, "bob", "Bob").await,
        Err(GameError::AlreadyJoined)
    );
}

#[tokio::test]
async fn test_unknown_game_and_bad_size() {
    let (session, _, _) = spawn_session();

    assert_eq!(
        session.join_game(Uuid::new_v4(), "bob", "Bob").await,
        Err(GameError::GameNotFound)
    );

    let mut request = casual_request("alice", OpponentKind::Human);
    request.size = 11;
    assert_eq!(
        session.create_game(request).await.unwrap_err(),
        GameError::BadBoardSize(11)
    );
}

#[tokio::test]
async fn test_turn_and_credential_checks() {
    let (session, _, _) = spawn_session();

    let created = session
        .create_game(casual_request("alice", OpponentKind::Human))
        .await
        .unwrap();
    let game_id = created.game.id;
    let alice_sid = created.session_id;

    // Moving before the second player arrives is rejected.
    assert_eq!(
        session.make_move(game_id, "alice", alice_sid, 2, 2).await,
        Err(GameError::NotStarted)
    );

    let joined = session.join_game(game_id, "bob", "Bob").await.unwrap();
    let bob_sid = joined.session_id;

    // White cannot move first.
    assert_eq!(
        session.make_move(game_id, "bob", bob_sid, 2, 2).await,
        Err(GameError::NotYourTurn)
    );
    // A wrong credential is rejected even on the right turn.
    assert_eq!(
        session.make_move(game_id, "alice", Uuid::new_v4(), 2, 2).await,
        Err(GameError::InvalidSession)
    );
    // Outsiders are not players.
    assert_eq!(
        session.make_move(game_id, "carol", alice_sid, 2, 2).await,
        Err(GameError::NotAPlayer)
    );

    // The legitimate move goes through and flips the turn.
    let view = session
        .make_move(game_id, "alice", alice_sid, 2, 2)
        .await
        .unwrap();
    assert_eq!(view.to_move, Stone::White);
    assert_eq!(view.board.get(2, 2), Some(Stone::Black));

    // Rule violations surface with their reason and change nothing.
    let err = session
        .make_move(game_id, "bob", bob_sid, 2, 2)
        .await
        .unwrap_err();
    assert_eq!(err, GameError::Rule(RuleError::Occupied(2, 2)));
}

#[tokio::test]
async fn test_ai_game_replies_synchronously() {
    let (session, _, _) = spawn_session();

    let created = session
        .create_game(casual_request("alice", OpponentKind::Ai { level: 1 }))
        .await
        .unwrap();
    // No waiting phase for AI games.
    assert_eq!(created.game.status, GameStatus::Playing);
    let ai_seat = created
        .game
        .players
        .iter()
        .find(|p| p.kind == PlayerKind::Ai)
        .unwrap();
    assert_eq!(ai_seat.color, Stone::White);

    let view = session
        .make_move(created.game.id, "alice", created.session_id, 4, 4)
        .await
        .unwrap();
    // The AI answered inside the same call: it is black's turn again and
    // there are two stones on the board.
    assert_eq!(view.to_move, Stone::Black);
    assert_eq!(view.board.stone_count(), 2);
    assert_eq!(view.turn, 2);
}

#[tokio::test]
async fn test_double_pass_scores_and_freezes_the_game() {
    let (session, _, _) = spawn_session();

    let created = session
        .create_game(casual_request("alice", OpponentKind::Human))
        .await
        .unwrap();
    let game_id = created.game.id;
    let alice_sid = created.session_id;
    let bob_sid = session
        .join_game(game_id, "bob", "Bob")
        .await
        .unwrap()
        .session_id;

    session
        .make_move(game_id, "alice", alice_sid, 4, 4)
        .await
        .unwrap();
    let view = session.pass_turn(game_id, "bob", bob_sid).await.unwrap();
    assert_eq!(view.status, GameStatus::Playing);

    let view = session.pass_turn(game_id, "alice", alice_sid).await.unwrap();
    assert_eq!(view.status, GameStatus::Finished);
    let Some(GameEnd::Scored { black, white, winner }) = view.end else {
        panic!("expected a scored end");
    };
    // Black's lone stone owns the whole board; komi is not enough.
    assert_eq!(black, 81.0);
    assert_eq!(white, 7.5);
    assert_eq!(winner, Some(Stone::Black));
    assert!(view.territory.is_some());

    // Every further mutation is rejected and changes nothing.
    assert_eq!(
        session.make_move(game_id, "bob", bob_sid, 0, 0).await,
        Err(GameError::GameFinished)
    );
    assert_eq!(
        session.pass_turn(game_id, "bob", bob_sid).await,
        Err(GameError::GameFinished)
    );
    assert_eq!(
        session.resign_game(game_id, "bob", bob_sid).await,
        Err(GameError::GameFinished)
    );
}

#[tokio::test]
async fn test_resignation_finishes_immediately() {
    let (session, _, _) = spawn_session();

    let created = session
        .create_game(casual_request("alice", OpponentKind::Human))
        .await
        .unwrap();
    let game_id = created.game.id;
    let bob_sid = session
        .join_game(game_id, "bob", "Bob")
        .await
        .unwrap()
        .session_id;

    let view = session.resign_game(game_id, "bob", bob_sid).await.unwrap();
    assert_eq!(view.status, GameStatus::Finished);
    assert_eq!(
        view.end,
        Some(GameEnd::Resignation {
            winner: Stone::Black
        })
    );
}

#[tokio::test]
async fn test_ranked_game_settles_ratings_exactly_once() {
    let (session, _, ratings) = spawn_session();
    seed_rating(&ratings, "alice", 1200);
    seed_rating(&ratings, "bob", 1400);

    let match_id = Uuid::new_v4();
    let created = session
        .create_ranked_game(CreateRankedGameRequest {
            match_id,
            black_user: "alice".into(),
            black_name: "Alice".into(),
            white_user: "bob".into(),
            white_name: "Bob".into(),
            size: 9,
        })
        .await
        .unwrap();
    assert_eq!(created.black.user_id, "alice");
    assert_eq!(created.white.user_id, "bob");

    // The underdog wins by resignation.
    let view = session
        .resign_game(created.game_id, "bob", created.white.session_id)
        .await
        .unwrap();
    assert_eq!(view.status, GameStatus::Finished);

    let ranked = view.ranked.unwrap();
    assert!(ranked.processed);
    assert_eq!(ranked.black_pre, 1200);
    assert_eq!(ranked.white_pre, 1400);
    assert_eq!(ranked.black_post, Some(1224));
    assert_eq!(ranked.white_post, Some(1376));

    let alice = ratings.rating("alice").unwrap();
    assert_eq!(alice.rating, 1224);
    assert_eq!(alice.wins, 1);
    assert_eq!(alice.streak, 1);
    assert_eq!(alice.peak, 1224);
    assert_eq!(alice.total_games, 1);
    assert!(alice.last_game_at.is_some());

    let bob = ratings.rating("bob").unwrap();
    assert_eq!(bob.rating, 1376);
    assert_eq!(bob.losses, 1);
    assert_eq!(bob.streak, 0);

    let history = ratings.history_for("alice").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].match_id, match_id);
    assert_eq!(history[0].winner, Some(Stone::Black));

    // A second terminal call cannot re-apply ratings.
    assert_eq!(
        session
            .resign_game(created.game_id, "alice", created.black.session_id)
            .await,
        Err(GameError::GameFinished)
    );
    assert_eq!(ratings.rating("alice").unwrap().rating, 1224);
    assert_eq!(ratings.history_for("alice").unwrap().len(), 1);
}

#[tokio::test]
async fn test_casual_games_do_not_touch_ratings() {
    let (session, _, ratings) = spawn_session();

    let created = session
        .create_game(casual_request("alice", OpponentKind::Human))
        .await
        .unwrap();
    let bob_sid = session
        .join_game(created.game.id, "bob", "Bob")
        .await
        .unwrap()
        .session_id;
    session
        .resign_game(created.game.id, "bob", bob_sid)
        .await
        .unwrap();

    assert_eq!(ratings.rating("alice").unwrap().total_games, 0);
    assert!(ratings.history_for("alice").unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_and_visibility_toggle() {
    let (session, _, _) = spawn_session();

    let created = session
        .create_game(casual_request("alice", OpponentKind::Human))
        .await
        .unwrap();
    let game_id = created.game.id;
    let alice_sid = created.session_id;
    let bob_sid = session
        .join_game(game_id, "bob", "Bob")
        .await
        .unwrap()
        .session_id;

    let view = session
        .add_chat_message(game_id, "alice", alice_sid, "good luck!")
        .await
        .unwrap();
    assert_eq!(view.chat.len(), 1);
    assert_eq!(view.chat[0].from, "alice");
    assert_eq!(view.chat[0].text, "good luck!");

    assert_eq!(
        session
            .add_chat_message(game_id, "alice", alice_sid, "   ")
            .await,
        Err(GameError::EmptyChatMessage)
    );

    // Bob mutes chat: his views omit it, alice still sees it.
    let view = session
        .toggle_chat_visibility(game_id, "bob", bob_sid)
        .await
        .unwrap();
    assert!(view.chat.is_empty());
    let alice_view = session
        .get_game(game_id, Some("alice".into()))
        .await
        .unwrap();
    assert_eq!(alice_view.chat.len(), 1);

    // Toggling again restores it.
    let view = session
        .toggle_chat_visibility(game_id, "bob", bob_sid)
        .await
        .unwrap();
    assert_eq!(view.chat.len(), 1);
}

#[tokio::test]
async fn test_watchers_and_listings() {
    let (session, _, _) = spawn_session();

    let public = session
        .create_game(casual_request("alice", OpponentKind::Human))
        .await
        .unwrap();
    let mut private_request = casual_request("bob", OpponentKind::Human);
    private_request.is_public = false;
    let private = session.create_game(private_request).await.unwrap();

    let listing = session.list_games().await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].id, public.game.id);

    let view = session.watch_game(public.game.id, "carol").await.unwrap();
    assert_eq!(view.watchers, vec!["carol".to_string()]);

    let alice_games = session.get_user_games("alice").await.unwrap();
    assert_eq!(alice_games.len(), 1);
    let bob_games = session.get_user_games("bob").await.unwrap();
    assert_eq!(bob_games.len(), 1);
    assert_eq!(bob_games[0].id, private.game.id);
    assert!(session.get_user_games("carol").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_restart_recovers_games_from_snapshot() {
    let (session, store, ratings) = spawn_session();

    let created = session
        .create_game(casual_request("alice", OpponentKind::Ai { level: 1 }))
        .await
        .unwrap();
    let view = session
        .make_move(created.game.id, "alice", created.session_id, 4, 4)
        .await
        .unwrap();
    assert_eq!(view.board.stone_count(), 2);

    // A fresh coordinator over the same store serves the same game, and
    // the credential still works.
    let revived = SessionHandle::spawn(store, ratings, ServiceConfig::default());
    let restored = revived
        .get_game(created.game.id, Some("alice".into()))
        .await
        .unwrap();
    assert_eq!(restored.board.stone_count(), 2);
    assert_eq!(restored.status, GameStatus::Playing);

    let after_move = revived
        .make_move(created.game.id, "alice", created.session_id, 2, 2)
        .await
        .unwrap();
    assert_eq!(after_move.board.stone_count(), 4);
}
