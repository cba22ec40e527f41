#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use striketag_core::game::{GameId, GameState};
use striketag_core::player::{PlayerId, PlayerState};
use striketag_core::rules::GameRules;
use striketag_core::tag::TagAttempt;
use striketag_core::test_helpers::make_active_game;

use striketag_engine::collab::{MulticastReport, Notification, NotificationRelay};
use striketag_engine::store::{GameStore, MemoryStore, NudgeWindow, StoreError, Versioned};

pub const STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// Relay that records every dispatch for assertions.
#[derive(Default)]
pub struct CapturingRelay {
    pub multicasts: Mutex<Vec<(Vec<String>, Notification)>>,
    pub directs: Mutex<Vec<(String, Notification)>>,
}

impl NotificationRelay for CapturingRelay {
    async fn send(&self, token: &str, note: &Notification) -> Result<(), String> {
        self.directs
            .lock()
            .await
            .push((token.to_string(), note.clone()));
        Ok(())
    }

    async fn send_multicast(&self, tokens: &[String], note: &Notification) -> MulticastReport {
        self.multicasts
            .lock()
            .await
            .push((tokens.to_vec(), note.clone()));
        MulticastReport {
            delivered: tokens.len(),
            failed: 0,
        }
    }
}

/// Store wrapper that fails the first `load_player` for one player with a
/// transient error, then behaves normally.
pub struct FailOnceStore {
    pub inner: Arc<MemoryStore>,
    pub fail_player: PlayerId,
    tripped: AtomicBool,
}

impl FailOnceStore {
    pub fn new(inner: Arc<MemoryStore>, fail_player: &str) -> Self {
        Self {
            inner,
            fail_player: fail_player.to_string(),
            tripped: AtomicBool::new(false),
        }
    }
}

impl GameStore for FailOnceStore {
    fn create_game(&self, game: GameState) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.inner.create_game(game)
    }

    fn load_game(
        &self,
        game_id: &GameId,
    ) -> impl Future<Output = Result<GameState, StoreError>> + Send {
        self.inner.load_game(game_id)
    }

    async fn load_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
    ) -> Result<Versioned<PlayerState>, StoreError> {
        if *player_id == self.fail_player && !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Transient("injected outage".to_string()));
        }
        self.inner.load_player(game_id, player_id).await
    }

    fn put_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        player: PlayerState,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.inner.put_player(game_id, player_id, player)
    }

    fn compare_and_swap_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        expected_version: u64,
        updated: PlayerState,
    ) -> impl Future<Output = Result<Versioned<PlayerState>, StoreError>> + Send {
        self.inner
            .compare_and_swap_player(game_id, player_id, expected_version, updated)
    }

    fn set_nudge(
        &self,
        game_id: &GameId,
        window: NudgeWindow,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.inner.set_nudge(game_id, window)
    }

    fn take_nudge(
        &self,
        game_id: &GameId,
    ) -> impl Future<Output = Result<Option<NudgeWindow>, StoreError>> + Send {
        self.inner.take_nudge(game_id)
    }

    fn mark_started(
        &self,
        game_id: &GameId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.inner.mark_started(game_id, at)
    }

    fn mark_completed(
        &self,
        game_id: &GameId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.inner.mark_completed(game_id, at)
    }

    fn active_games(&self) -> impl Future<Output = Result<Vec<GameState>, StoreError>> + Send {
        self.inner.active_games()
    }

    fn append_attempt(
        &self,
        attempt: TagAttempt,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.inner.append_attempt(attempt)
    }
}

/// Store wrapper that simulates an interactive elimination racing the
/// enforcer: the first `load_player` for the marked player returns a
/// snapshot, then a concurrent writer commits a strike behind its back, so
/// the caller's compare-and-swap must lose.
pub struct RacingStore {
    pub inner: Arc<MemoryStore>,
    pub race_player: PlayerId,
    tripped: AtomicBool,
}

impl RacingStore {
    pub fn new(inner: Arc<MemoryStore>, race_player: &str) -> Self {
        Self {
            inner,
            race_player: race_player.to_string(),
            tripped: AtomicBool::new(false),
        }
    }
}

impl GameStore for RacingStore {
    fn create_game(&self, game: GameState) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.inner.create_game(game)
    }

    fn load_game(
        &self,
        game_id: &GameId,
    ) -> impl Future<Output = Result<GameState, StoreError>> + Send {
        self.inner.load_game(game_id)
    }

    async fn load_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
    ) -> Result<Versioned<PlayerState>, StoreError> {
        let rec = self.inner.load_player(game_id, player_id).await?;
        if *player_id == self.race_player && !self.tripped.swap(true, Ordering::SeqCst) {
            // The racing writer commits between our read and our CAS.
            let mut racer = rec.value.clone();
            racer
                .apply_strike()
                .expect("racing strike applies to a live player");
            self.inner
                .compare_and_swap_player(game_id, player_id, rec.version, racer)
                .await?;
        }
        Ok(rec)
    }

    fn put_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        player: PlayerState,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.inner.put_player(game_id, player_id, player)
    }

    fn compare_and_swap_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        expected_version: u64,
        updated: PlayerState,
    ) -> impl Future<Output = Result<Versioned<PlayerState>, StoreError>> + Send {
        self.inner
            .compare_and_swap_player(game_id, player_id, expected_version, updated)
    }

    fn set_nudge(
        &self,
        game_id: &GameId,
        window: NudgeWindow,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.inner.set_nudge(game_id, window)
    }

    fn take_nudge(
        &self,
        game_id: &GameId,
    ) -> impl Future<Output = Result<Option<NudgeWindow>, StoreError>> + Send {
        self.inner.take_nudge(game_id)
    }

    fn mark_started(
        &self,
        game_id: &GameId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.inner.mark_started(game_id, at)
    }

    fn mark_completed(
        &self,
        game_id: &GameId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.inner.mark_completed(game_id, at)
    }

    fn active_games(&self) -> impl Future<Output = Result<Vec<GameState>, StoreError>> + Send {
        self.inner.active_games()
    }

    fn append_attempt(
        &self,
        attempt: TagAttempt,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        self.inner.append_attempt(attempt)
    }
}

/// Seed the store with an active `n`-player game (`p1..pn`, each with a
/// home base and push token). Returns the seeded state.
pub async fn seed_active_game(store: &MemoryStore, n: usize) -> GameState {
    let game = make_active_game(n, &GameRules::default());
    store.create_game(game.clone()).await.expect("seed game");
    game
}
