//! Local exhibition run: plays a full AI-vs-AI game on a 9x9 board, then
//! walks two synthetic users through a ranked matchmaking round trip.
//!
//! Run with: `cargo run --bin simulate`

use std::sync::Arc;

use rand::Rng;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use goban::ai;
use goban::config::ServiceConfig;
use goban::matchmaking::{AcceptOutcome, JoinOutcome, MatchmakingHandle, MatchmakingStatus};
use goban::rules::{Board, GoMove, Stone};
use goban::session::{
    CreateGameRequest, GameEnd, GameStatus, GameView, OpponentKind, SessionHandle,
};
use goban::store::{
    MemorySnapshotStore, OpenIdentity, RatingStore, SnapshotRatingStore, SnapshotStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("goban=info".parse()?))
        .init();

    let store: Arc<dyn SnapshotStore> = Arc::new(MemorySnapshotStore::new());
    let ratings = Arc::new(SnapshotRatingStore::new(MemorySnapshotStore::new()));
    let config = ServiceConfig::default();
    let session = SessionHandle::spawn(store.clone(), ratings.clone(), config.clone());

    exhibition_game(&session).await?;
    matchmaking_round_trip(&session, store, ratings).await?;

    Ok(())
}

/// Create an AI game and drive the black seat with the same evaluator the
/// white seat uses, until the game scores itself or a move cap is hit.
async fn exhibition_game(session: &SessionHandle) -> anyhow::Result<()> {
    let created = session
        .create_game(CreateGameRequest {
            user_id: "demo".into(),
            display_name: "Demo".into(),
            game_name: "AI exhibition".into(),
            is_public: true,
            size: 9,
            opponent: OpponentKind::Ai { level: 1 },
        })
        .await?;
    let game_id = created.game.id;
    let credential = created.session_id;
    let mut view = created.game;

    let mut actions = 0;
    while view.status == GameStatus::Playing && actions < 300 {
        view = match ai::choose_move(&view.board, Stone::Black, None) {
            GoMove::Place(row, col) => {
                match session.make_move(game_id, "demo", credential, row, col).await {
                    Ok(view) => view,
                    // The view carries no ko history, so the evaluator can
                    // occasionally propose the forbidden recapture; pass.
                    Err(_) => session.pass_turn(game_id, "demo", credential).await?,
                }
            }
            GoMove::Pass => session.pass_turn(game_id, "demo", credential).await?,
        };
        actions += 1;
    }

    println!("Exhibition game after {} black actions:", actions);
    println!("{}", render(&view.board));
    describe_result(&view);
    Ok(())
}

/// Seed two users with nearby ratings, queue them, and accept the offer
/// from both sides.
async fn matchmaking_round_trip(
    session: &SessionHandle,
    store: Arc<dyn SnapshotStore>,
    ratings: Arc<SnapshotRatingStore<MemorySnapshotStore>>,
) -> anyhow::Result<()> {
    let mut rng = rand::thread_rng();
    for user in ["alice", "bob"] {
        let mut row = ratings.rating(user)?;
        row.rating = rng.gen_range(1150..=1250);
        ratings.put_rating(&row)?;
        println!("{} enters the queue at rating {}", user, row.rating);
    }

    let matchmaking = MatchmakingHandle::spawn(
        session.clone(),
        store,
        ratings,
        Arc::new(OpenIdentity),
        ServiceConfig::default().matchmaking,
    );

    matchmaking.join("alice").await?;
    let offer = match matchmaking.join("bob").await? {
        JoinOutcome::Offered(offer) => offer,
        JoinOutcome::Queued { .. } => anyhow::bail!("expected an immediate offer"),
    };
    println!(
        "bob is offered a match against {} ({})",
        offer.opponent_name, offer.opponent_rating
    );

    matchmaking.accept(offer.match_id, "bob").await?;
    let created = match matchmaking.accept(offer.match_id, "alice").await? {
        AcceptOutcome::Ready(created) => created,
        AcceptOutcome::WaitingForOpponent => anyhow::bail!("expected the game to start"),
    };
    println!(
        "ranked game {} started: {} as black, {} as white",
        created.game_id, created.black.user_id, created.white.user_id
    );

    // The side that accepted first picks its credentials up by polling.
    match matchmaking.status("bob").await? {
        MatchmakingStatus::Ready(ready) => {
            println!("bob picked up game {} from status poll", ready.game_id);
        }
        other => anyhow::bail!("expected a ready match for bob, got {:?}", other),
    }

    Ok(())
}

fn render(board: &Board) -> String {
    let mut out = String::new();
    for row in 0..board.size() {
        for col in 0..board.size() {
            out.push(match board.get(row, col) {
                Some(Stone::Black) => 'X',
                Some(Stone::White) => 'O',
                None => '.',
            });
            out.push(' ');
        }
        out.push('\n');
    }
    out
}

fn describe_result(view: &GameView) {
    match &view.end {
        Some(GameEnd::Scored {
            black,
            white,
            winner,
        }) => {
            let winner = match winner {
                Some(Stone::Black) => "black wins",
                Some(Stone::White) => "white wins",
                None => "draw",
            };
            println!("final score: black {} - white {} ({})", black, white, winner);
        }
        Some(GameEnd::Resignation { winner }) => {
            println!("won by resignation: {}", winner);
        }
        None => println!("game still in progress at the move cap"),
    }
}
