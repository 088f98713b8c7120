//! The matchmaking coordinator: one task owning the open queue, every
//! pending offer, and the timers that drive range expansion and expiry.
//!
//! Timers are deadline entries in a heap owned by the actor; the run loop
//! sleeps until the earliest one and fires whatever is due. A fired
//! deadline whose subject has since left the queue (or whose queue epoch
//! is stale) is ignored, so nothing ever acts on removed state.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use uuid::Uuid;

use super::types::{
    AcceptOutcome, JoinOutcome, MatchOffer, MatchmakingSnapshot, MatchmakingStatus, QueueEntry,
};
use crate::config::MatchmakingConfig;
use crate::error::MatchmakingError;
use crate::session::{CreateRankedGameRequest, MatchId, RankedGameCreated, SessionHandle};
use crate::store::{load_snapshot, save_snapshot, IdentityProvider, RatingStore, SnapshotStore};

/// Snapshot key for queue and offer state.
pub const MATCHMAKING_SNAPSHOT_KEY: &str = "matchmaking";

enum Command {
    Join {
        user_id: String,
        reply: oneshot::Sender<Result<JoinOutcome, MatchmakingError>>,
    },
    Leave {
        user_id: String,
        reply: oneshot::Sender<Result<(), MatchmakingError>>,
    },
    Status {
        user_id: String,
        reply: oneshot::Sender<Result<MatchmakingStatus, MatchmakingError>>,
    },
    Accept {
        match_id: MatchId,
        user_id: String,
        reply: oneshot::Sender<Result<AcceptOutcome, MatchmakingError>>,
    },
    Reject {
        match_id: MatchId,
        user_id: String,
        reply: oneshot::Sender<Result<(), MatchmakingError>>,
    },
}

/// What a due timer wants done. Every task re-validates its subject when
/// it fires; stale tasks are dropped silently.
enum TimerTask {
    ExpandRange { user_id: String, epoch: u64 },
    Evict { user_id: String, epoch: u64 },
    ExpireOffer { match_id: MatchId },
}

struct TimerEntry {
    at: Instant,
    seq: u64,
    task: TimerTask,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

/// Cloneable handle for talking to the matchmaking coordinator.
#[derive(Clone)]
pub struct MatchmakingHandle {
    tx: mpsc::Sender<Command>,
}

macro_rules! request {
    ($self:expr, $variant:ident { $($field:ident: $value:expr),* $(,)? }) => {{
        let (reply, rx) = oneshot::channel();
        $self
            .tx
            .send(Command::$variant { $($field: $value,)* reply })
            .await
            .map_err(|_| MatchmakingError::CoordinatorClosed)?;
        rx.await.map_err(|_| MatchmakingError::CoordinatorClosed)?
    }};
}

impl MatchmakingHandle {
    /// Restore queue state from the snapshot store, reschedule its timers,
    /// and start the coordinator task.
    pub fn spawn(
        session: SessionHandle,
        store: Arc<dyn SnapshotStore>,
        ratings: Arc<dyn RatingStore>,
        identity: Arc<dyn IdentityProvider>,
        config: MatchmakingConfig,
    ) -> Self {
        let snapshot =
            match load_snapshot::<MatchmakingSnapshot>(&*store, MATCHMAKING_SNAPSHOT_KEY) {
                Ok(Some(snapshot)) => {
                    tracing::info!(
                        queued = snapshot.queue.len(),
                        offers = snapshot.offers.len(),
                        "restored matchmaking state from snapshot"
                    );
                    snapshot
                }
                Ok(None) => MatchmakingSnapshot::default(),
                Err(e) => {
                    tracing::error!(error = %e, "failed to restore matchmaking snapshot, starting empty");
                    MatchmakingSnapshot::default()
                }
            };

        let (tx, rx) = mpsc::channel(64);
        let mut coordinator = MatchmakingCoordinator {
            queue: Vec::new(),
            offers: HashMap::new(),
            ready: snapshot.ready.iter().cloned().collect(),
            timers: BinaryHeap::new(),
            timer_seq: 0,
            epoch_counter: 0,
            session,
            store,
            ratings,
            identity,
            config,
            rx,
        };
        coordinator.restore(snapshot);
        tokio::spawn(coordinator.run());
        Self { tx }
    }

    /// Enter the ranked queue; may return an immediate offer.
    pub async fn join(&self, user_id: impl Into<String>) -> Result<JoinOutcome, MatchmakingError> {
        request!(self, Join { user_id: user_id.into() })
    }

    /// Leave the queue. Only possible while still queued, not once matched.
    pub async fn leave(&self, user_id: impl Into<String>) -> Result<(), MatchmakingError> {
        request!(self, Leave { user_id: user_id.into() })
    }

    /// Current queue or offer state for a user.
    pub async fn status(
        &self,
        user_id: impl Into<String>,
    ) -> Result<MatchmakingStatus, MatchmakingError> {
        request!(self, Status { user_id: user_id.into() })
    }

    /// Accept a pending offer. Idempotent per user.
    pub async fn accept(
        &self,
        match_id: MatchId,
        user_id: impl Into<String>,
    ) -> Result<AcceptOutcome, MatchmakingError> {
        request!(self, Accept { match_id: match_id, user_id: user_id.into() })
    }

    /// Decline a pending offer, discarding it.
    pub async fn reject(
        &self,
        match_id: MatchId,
        user_id: impl Into<String>,
    ) -> Result<(), MatchmakingError> {
        request!(self, Reject { match_id: match_id, user_id: user_id.into() })
    }
}

struct MatchmakingCoordinator {
    /// Open queue in join order; join-order rank is the reported position.
    queue: Vec<QueueEntry>,
    offers: HashMap<MatchId, MatchOffer>,
    /// Completed matches awaiting pickup by the participant who did not
    /// make the final accept call; consumed by their next status poll.
    ready: HashMap<String, RankedGameCreated>,
    timers: BinaryHeap<Reverse<TimerEntry>>,
    timer_seq: u64,
    epoch_counter: u64,
    session: SessionHandle,
    store: Arc<dyn SnapshotStore>,
    ratings: Arc<dyn RatingStore>,
    identity: Arc<dyn IdentityProvider>,
    config: MatchmakingConfig,
    rx: mpsc::Receiver<Command>,
}

impl MatchmakingCoordinator {
    /// Re-adopt a restored snapshot: bump epochs past anything persisted
    /// and reschedule every timer the restored state implies.
    fn restore(&mut self, snapshot: MatchmakingSnapshot) {
        self.epoch_counter = snapshot
            .queue
            .iter()
            .map(|e| e.epoch)
            .max()
            .map_or(0, |max| max + 1);

        for mut entry in snapshot.queue {
            entry.epoch = self.next_epoch();
            self.schedule_entry_timers(&entry);
            self.queue.push(entry);
        }
        for offer in snapshot.offers {
            let remaining = (offer.expires_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            self.schedule(remaining, TimerTask::ExpireOffer { match_id: offer.id });
            self.offers.insert(offer.id, offer);
        }
    }

    async fn run(mut self) {
        loop {
            let next_deadline = self
                .timers
                .peek()
                .map(|Reverse(t)| t.at)
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));
            // Due timers run before commands so a poll arriving at the
            // same instant observes their effects.
            tokio::select! {
                biased;
                _ = sleep_until(next_deadline) => self.fire_due_timers(),
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
            }
        }
        tracing::info!("matchmaking coordinator stopped");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Join { user_id, reply } => {
                let _ = reply.send(self.join(user_id));
            }
            Command::Leave { user_id, reply } => {
                let _ = reply.send(self.leave(&user_id));
            }
            Command::Status { user_id, reply } => {
                let _ = reply.send(self.status(&user_id));
            }
            Command::Accept {
                match_id,
                user_id,
                reply,
            } => {
                let _ = reply.send(self.accept(match_id, user_id).await);
            }
            Command::Reject {
                match_id,
                user_id,
                reply,
            } => {
                let _ = reply.send(self.reject(match_id, &user_id));
            }
        }
    }

    fn join(&mut self, user_id: String) -> Result<JoinOutcome, MatchmakingError> {
        if self.queue.iter().any(|e| e.user_id == user_id) {
            return Err(MatchmakingError::AlreadyQueued);
        }
        if self.offers.values().any(|o| o.involves(&user_id)) {
            return Err(MatchmakingError::OfferPending);
        }
        if !self.identity.ranked_eligible(&user_id) {
            return Err(MatchmakingError::NotEligible);
        }

        let entry = QueueEntry {
            display_name: self.identity.display_name(&user_id),
            rating: self.stored_rating(&user_id),
            user_id,
            joined_at: Utc::now(),
            range: self.config.initial_range,
            epoch: self.next_epoch(),
        };

        let outcome = if let Some(idx) = best_candidate(&self.queue, &entry) {
            let other = self.queue.remove(idx);
            let match_id = self.open_offer(entry.clone(), other);
            JoinOutcome::Offered(self.offers[&match_id].view_for(&entry.user_id))
        } else {
            tracing::info!(user = %entry.user_id, rating = entry.rating, "queued for ranked play");
            self.schedule_entry_timers(&entry);
            self.queue.push(entry);
            JoinOutcome::Queued {
                position: self.queue.len(),
                queue_size: self.queue.len(),
                range: self.config.initial_range,
            }
        };

        self.persist();
        Ok(outcome)
    }

    fn leave(&mut self, user_id: &str) -> Result<(), MatchmakingError> {
        if let Some(idx) = self.queue.iter().position(|e| e.user_id == user_id) {
            self.queue.remove(idx);
            tracing::info!(user = %user_id, "left the queue");
            self.persist();
            return Ok(());
        }
        if self.offers.values().any(|o| o.involves(user_id)) {
            return Err(MatchmakingError::OfferPending);
        }
        Err(MatchmakingError::NotQueued)
    }

    fn status(&mut self, user_id: &str) -> Result<MatchmakingStatus, MatchmakingError> {
        if let Some(ready) = self.ready.remove(user_id) {
            self.persist();
            return Ok(MatchmakingStatus::Ready(ready));
        }
        if let Some(offer) = self.offers.values().find(|o| o.involves(user_id)) {
            return Ok(MatchmakingStatus::Offered(offer.view_for(user_id)));
        }
        if let Some((idx, entry)) = self
            .queue
            .iter()
            .enumerate()
            .find(|(_, e)| e.user_id == user_id)
        {
            return Ok(MatchmakingStatus::Queued {
                position: idx + 1,
                queue_size: self.queue.len(),
                waited_secs: (Utc::now() - entry.joined_at).num_seconds(),
                range: entry.range,
            });
        }
        Err(MatchmakingError::NotQueued)
    }

    async fn accept(
        &mut self,
        match_id: MatchId,
        user_id: String,
    ) -> Result<AcceptOutcome, MatchmakingError> {
        // Repeat accept after the game already started: hand the ready
        // payload back instead of erroring.
        if let Some(ready) = self.ready.remove(&user_id) {
            if ready.match_id == match_id {
                self.persist();
                return Ok(AcceptOutcome::Ready(ready));
            }
            self.ready.insert(user_id.clone(), ready);
        }

        let offer = self
            .offers
            .get_mut(&match_id)
            .ok_or(MatchmakingError::OfferNotFound)?;
        if !offer.involves(&user_id) {
            return Err(MatchmakingError::NotInOffer);
        }
        if !offer.accepted.insert(user_id.clone()) {
            // Repeat acceptance by the same user is a no-op.
            return Ok(AcceptOutcome::WaitingForOpponent);
        }
        if !offer.both_accepted() {
            self.persist();
            return Ok(AcceptOutcome::WaitingForOpponent);
        }

        // Both sides are in: materialize the ranked game.
        let offer = match self.offers.remove(&match_id) {
            Some(offer) => offer,
            None => return Err(MatchmakingError::OfferNotFound),
        };
        let [a, b] = offer.entries;
        let (black, white) = if a.joined_at <= b.joined_at {
            (a, b)
        } else {
            (b, a)
        };

        let request = CreateRankedGameRequest {
            match_id,
            black_user: black.user_id.clone(),
            black_name: black.display_name.clone(),
            white_user: white.user_id.clone(),
            white_name: white.display_name.clone(),
            size: self.config.ranked_board_size,
        };

        match self.session.create_ranked_game(request).await {
            Ok(created) => {
                let opponent = if black.user_id == user_id {
                    white.user_id.clone()
                } else {
                    black.user_id.clone()
                };
                self.ready.insert(opponent, created.clone());
                tracing::info!(
                    match_id = %match_id,
                    game = %created.game_id,
                    black = %black.user_id,
                    white = %white.user_id,
                    "ranked game started"
                );
                self.persist();
                Ok(AcceptOutcome::Ready(created))
            }
            Err(e) => {
                tracing::error!(match_id = %match_id, error = %e, "ranked game creation failed");
                self.requeue(black);
                self.requeue(white);
                self.persist();
                Err(MatchmakingError::GameCreation(e.to_string()))
            }
        }
    }

    fn reject(&mut self, match_id: MatchId, user_id: &str) -> Result<(), MatchmakingError> {
        let involved = self
            .offers
            .get(&match_id)
            .ok_or(MatchmakingError::OfferNotFound)?
            .involves(user_id);
        if !involved {
            return Err(MatchmakingError::NotInOffer);
        }

        let offer = match self.offers.remove(&match_id) {
            Some(offer) => offer,
            None => return Err(MatchmakingError::OfferNotFound),
        };
        tracing::info!(match_id = %match_id, user = %user_id, "match offer rejected");
        // The decliner is dropped; the other side goes back to the queue.
        for entry in offer.entries {
            if entry.user_id != user_id {
                self.requeue(entry);
            }
        }
        self.persist();
        Ok(())
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        loop {
            match self.timers.peek() {
                Some(Reverse(entry)) if entry.at <= now => {}
                _ => break,
            }
            let Some(Reverse(entry)) = self.timers.pop() else {
                break;
            };
            match entry.task {
                TimerTask::ExpandRange { user_id, epoch } => self.expand_range(&user_id, epoch),
                TimerTask::Evict { user_id, epoch } => self.evict(&user_id, epoch),
                TimerTask::ExpireOffer { match_id } => self.expire_offer(match_id),
            }
        }
    }

    /// Widen a queued entry's search window and rescan. Stale epochs mean
    /// the entry left the queue since this timer was scheduled.
    fn expand_range(&mut self, user_id: &str, epoch: u64) {
        let Some(idx) = self
            .queue
            .iter()
            .position(|e| e.user_id == user_id && e.epoch == epoch)
        else {
            return;
        };

        let mut entry = self.queue.remove(idx);
        entry.range = (entry.range + self.config.range_step).min(self.config.max_range);
        tracing::debug!(user = %user_id, range = entry.range, "search range widened");

        if let Some(partner_idx) = best_candidate(&self.queue, &entry) {
            let other = self.queue.remove(partner_idx);
            self.open_offer(entry, other);
        } else {
            self.schedule(
                Duration::from_secs(self.config.expand_interval_secs),
                TimerTask::ExpandRange {
                    user_id: entry.user_id.clone(),
                    epoch: entry.epoch,
                },
            );
            // Back where it was, so join-order positions hold.
            self.queue.insert(idx, entry);
        }
        self.persist();
    }

    /// Drop an entry that has waited out the full eviction window.
    fn evict(&mut self, user_id: &str, epoch: u64) {
        let Some(idx) = self
            .queue
            .iter()
            .position(|e| e.user_id == user_id && e.epoch == epoch)
        else {
            return;
        };
        self.queue.remove(idx);
        tracing::info!(user = %user_id, "evicted from queue after waiting unmatched");
        self.persist();
    }

    /// Discard an offer nobody completed in time. Participants who had
    /// accepted go back to the queue; the rest are dropped.
    fn expire_offer(&mut self, match_id: MatchId) {
        let Some(offer) = self.offers.remove(&match_id) else {
            return;
        };
        tracing::info!(match_id = %match_id, "match offer expired");
        let MatchOffer {
            entries, accepted, ..
        } = offer;
        for entry in entries {
            if accepted.contains(&entry.user_id) {
                self.requeue(entry);
            }
        }
        self.persist();
    }

    /// Put a participant back into the open queue after their offer fell
    /// through: original join time, current (never narrower) range, fresh
    /// timers, and an immediate rescan.
    fn requeue(&mut self, mut entry: QueueEntry) {
        entry.epoch = self.next_epoch();

        if let Some(partner_idx) = best_candidate(&self.queue, &entry) {
            let other = self.queue.remove(partner_idx);
            self.open_offer(entry, other);
            return;
        }

        tracing::info!(user = %entry.user_id, "returned to queue");
        self.schedule_entry_timers(&entry);
        // Keep the queue in join order for fair positions.
        let insert_at = self
            .queue
            .iter()
            .position(|e| e.joined_at > entry.joined_at)
            .unwrap_or(self.queue.len());
        self.queue.insert(insert_at, entry);
    }

    /// Open an offer between two entries just removed from the queue, with
    /// its expiry timer. Returns the offer id.
    fn open_offer(&mut self, a: QueueEntry, b: QueueEntry) -> MatchId {
        let id = Uuid::new_v4();
        let now = Utc::now();
        tracing::info!(
            match_id = %id,
            a = %a.user_id,
            b = %b.user_id,
            gap = a.rating_gap(&b),
            "match offer created"
        );
        let offer = MatchOffer {
            id,
            entries: [a, b],
            created_at: now,
            expires_at: now + chrono::Duration::seconds(self.config.offer_ttl_secs as i64),
            accepted: Default::default(),
        };
        self.schedule(
            Duration::from_secs(self.config.offer_ttl_secs),
            TimerTask::ExpireOffer { match_id: id },
        );
        self.offers.insert(id, offer);
        id
    }

    fn schedule_entry_timers(&mut self, entry: &QueueEntry) {
        self.schedule(
            Duration::from_secs(self.config.expand_interval_secs),
            TimerTask::ExpandRange {
                user_id: entry.user_id.clone(),
                epoch: entry.epoch,
            },
        );
        self.schedule(
            Duration::from_secs(self.config.eviction_secs),
            TimerTask::Evict {
                user_id: entry.user_id.clone(),
                epoch: entry.epoch,
            },
        );
    }

    fn schedule(&mut self, delay: Duration, task: TimerTask) {
        self.timer_seq += 1;
        self.timers.push(Reverse(TimerEntry {
            at: Instant::now() + delay,
            seq: self.timer_seq,
            task,
        }));
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch_counter += 1;
        self.epoch_counter
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

    /// Write-after-mutate snapshot of queue, offers, and ready payloads.
    fn persist(&self) {
        let snapshot = MatchmakingSnapshot {
            queue: self.queue.clone(),
            offers: self.offers.values().cloned().collect(),
            ready: self
                .ready
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        if let Err(e) = save_snapshot(&*self.store, MATCHMAKING_SNAPSHOT_KEY, &snapshot) {
            tracing::error!(error = %e, "matchmaking snapshot write failed");
        }
    }
}

/// The open-queue candidate minimizing the rating difference to `entry`,
/// subject to both players' current ranges. Earlier joiners win ties.
fn best_candidate(queue: &[QueueEntry], entry: &QueueEntry) -> Option<usize> {
    let mut best: Option<(usize, i32)> = None;
    for (idx, other) in queue.iter().enumerate() {
        if other.user_id == entry.user_id || !entry.compatible_with(other) {
            continue;
        }
        let gap = entry.rating_gap(other);
        let better = match best {
            Some((_, best_gap)) => gap < best_gap,
            None => true,
        };
        if better {
            best = Some((idx, gap));
        }
    }
    best.map(|(idx, _)| idx)
}
