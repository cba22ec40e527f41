use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use striketag_core::game::{GameId, GameState, GameStatus};
use striketag_core::player::{PlayerId, PlayerState};
use striketag_core::tag::TagAttempt;

/// A record plus the version observed when it was read. Compare-and-swap
/// commits only against an unchanged version.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Store failures. `Conflict` means a compare-and-swap lost to a racing
/// writer; `Transient` covers timeouts and unavailability and is never a
/// commit.
#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    Conflict,
    Transient(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Conflict => write!(f, "record changed since read"),
            Self::Transient(m) => write!(f, "transient failure: {m}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The pending enforcement window on a game. Both timestamps live and die
/// together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NudgeWindow {
    pub issued_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
}

/// The shared mutable store. Per-player compare-and-swap is the only
/// serialization point between interactive tags and the enforcement sweep;
/// game-level writes are unconditional by design.
pub trait GameStore: Send + Sync {
    fn create_game(
        &self,
        game: GameState,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn load_game(
        &self,
        game_id: &GameId,
    ) -> impl Future<Output = Result<GameState, StoreError>> + Send;

    fn load_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
    ) -> impl Future<Output = Result<Versioned<PlayerState>, StoreError>> + Send;

    /// Unconditional insert-or-replace; used to seed a record at join time.
    fn put_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        player: PlayerState,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Commit `updated` only if the record still carries `expected_version`.
    fn compare_and_swap_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        expected_version: u64,
        updated: PlayerState,
    ) -> impl Future<Output = Result<Versioned<PlayerState>, StoreError>> + Send;

    /// Set both nudge fields together. Rejected while a window is pending.
    fn set_nudge(
        &self,
        game_id: &GameId,
        window: NudgeWindow,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically read and clear the pending nudge window. The single
    /// writer that gets `Some` owns the enforcement cycle; everyone else
    /// sees `None`.
    fn take_nudge(
        &self,
        game_id: &GameId,
    ) -> impl Future<Output = Result<Option<NudgeWindow>, StoreError>> + Send;

    fn mark_started(
        &self,
        game_id: &GameId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// One-way completion stamp; a completed game is never reopened.
    fn mark_completed(
        &self,
        game_id: &GameId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn active_games(&self) -> impl Future<Output = Result<Vec<GameState>, StoreError>> + Send;

    fn append_attempt(
        &self,
        attempt: TagAttempt,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<T: GameStore + ?Sized> GameStore for std::sync::Arc<T> {
    fn create_game(&self, game: GameState) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).create_game(game)
    }

    fn load_game(
        &self,
        game_id: &GameId,
    ) -> impl Future<Output = Result<GameState, StoreError>> + Send {
        (**self).load_game(game_id)
    }

    fn load_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
    ) -> impl Future<Output = Result<Versioned<PlayerState>, StoreError>> + Send {
        (**self).load_player(game_id, player_id)
    }

    fn put_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        player: PlayerState,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).put_player(game_id, player_id, player)
    }

    fn compare_and_swap_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        expected_version: u64,
        updated: PlayerState,
    ) -> impl Future<Output = Result<Versioned<PlayerState>, StoreError>> + Send {
        (**self).compare_and_swap_player(game_id, player_id, expected_version, updated)
    }

    fn set_nudge(
        &self,
        game_id: &GameId,
        window: NudgeWindow,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).set_nudge(game_id, window)
    }

    fn take_nudge(
        &self,
        game_id: &GameId,
    ) -> impl Future<Output = Result<Option<NudgeWindow>, StoreError>> + Send {
        (**self).take_nudge(game_id)
    }

    fn mark_started(
        &self,
        game_id: &GameId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).mark_started(game_id, at)
    }

    fn mark_completed(
        &self,
        game_id: &GameId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).mark_completed(game_id, at)
    }

    fn active_games(&self) -> impl Future<Output = Result<Vec<GameState>, StoreError>> + Send {
        (**self).active_games()
    }

    fn append_attempt(
        &self,
        attempt: TagAttempt,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).append_attempt(attempt)
    }
}

/// Run a store call under a deadline. Timeouts surface as transient
/// failures, never as commits.
pub async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Transient(format!(
            "store call exceeded {}ms",
            limit.as_millis()
        ))),
    }
}

struct GameCell {
    game: GameState,
    /// Per-player optimistic-concurrency counters.
    player_versions: HashMap<PlayerId, u64>,
}

#[derive(Default)]
struct Inner {
    games: HashMap<GameId, GameCell>,
    attempts: HashMap<GameId, Vec<TagAttempt>>,
}

/// In-memory reference store. One mutex guards the whole map, but the
/// versioning contract is the same one a remote document store provides.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded attempts for a game, oldest first.
    pub async fn attempts(&self, game_id: &GameId) -> Vec<TagAttempt> {
        let inner = self.inner.lock().await;
        inner.attempts.get(game_id).cloned().unwrap_or_default()
    }
}

impl GameStore for MemoryStore {
    async fn create_game(&self, game: GameState) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.games.contains_key(&game.id) {
            return Err(StoreError::Conflict);
        }
        let player_versions = game.players.keys().map(|id| (id.clone(), 1)).collect();
        inner.games.insert(
            game.id.clone(),
            GameCell {
                game,
                player_versions,
            },
        );
        Ok(())
    }

    async fn load_game(&self, game_id: &GameId) -> Result<GameState, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .games
            .get(game_id)
            .map(|cell| cell.game.clone())
            .ok_or_else(|| StoreError::NotFound(format!("game {game_id}")))
    }

    async fn load_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
    ) -> Result<Versioned<PlayerState>, StoreError> {
        let inner = self.inner.lock().await;
        let cell = inner
            .games
            .get(game_id)
            .ok_or_else(|| StoreError::NotFound(format!("game {game_id}")))?;
        let player = cell
            .game
            .players
            .get(player_id)
            .ok_or_else(|| StoreError::NotFound(format!("player {player_id}")))?;
        let version = cell.player_versions.get(player_id).copied().unwrap_or(1);
        Ok(Versioned {
            value: player.clone(),
            version,
        })
    }

    async fn put_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        player: PlayerState,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let cell = inner
            .games
            .get_mut(game_id)
            .ok_or_else(|| StoreError::NotFound(format!("game {game_id}")))?;
        cell.game.players.insert(player_id.clone(), player);
        *cell.player_versions.entry(player_id.clone()).or_insert(0) += 1;
        Ok(())
    }

    async fn compare_and_swap_player(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        expected_version: u64,
        updated: PlayerState,
    ) -> Result<Versioned<PlayerState>, StoreError> {
        let mut inner = self.inner.lock().await;
        let cell = inner
            .games
            .get_mut(game_id)
            .ok_or_else(|| StoreError::NotFound(format!("game {game_id}")))?;
        if !cell.game.players.contains_key(player_id) {
            return Err(StoreError::NotFound(format!("player {player_id}")));
        }
        let version = cell.player_versions.get(player_id).copied().unwrap_or(1);
        if version != expected_version {
            return Err(StoreError::Conflict);
        }
        cell.game.players.insert(player_id.clone(), updated.clone());
        let new_version = version + 1;
        cell.player_versions.insert(player_id.clone(), new_version);
        Ok(Versioned {
            value: updated,
            version: new_version,
        })
    }

    async fn set_nudge(&self, game_id: &GameId, window: NudgeWindow) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let cell = inner
            .games
            .get_mut(game_id)
            .ok_or_else(|| StoreError::NotFound(format!("game {game_id}")))?;
        if cell.game.nudge_pending() {
            return Err(StoreError::Conflict);
        }
        cell.game.nudge_issued_at = Some(window.issued_at);
        cell.game.nudge_deadline_at = Some(window.deadline_at);
        Ok(())
    }

    async fn take_nudge(&self, game_id: &GameId) -> Result<Option<NudgeWindow>, StoreError> {
        let mut inner = self.inner.lock().await;
        let cell = inner
            .games
            .get_mut(game_id)
            .ok_or_else(|| StoreError::NotFound(format!("game {game_id}")))?;
        match (
            cell.game.nudge_issued_at.take(),
            cell.game.nudge_deadline_at.take(),
        ) {
            (Some(issued_at), Some(deadline_at)) => Ok(Some(NudgeWindow {
                issued_at,
                deadline_at,
            })),
            _ => Ok(None),
        }
    }

    async fn mark_started(&self, game_id: &GameId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let cell = inner
            .games
            .get_mut(game_id)
            .ok_or_else(|| StoreError::NotFound(format!("game {game_id}")))?;
        if cell.game.status == GameStatus::Waiting {
            cell.game.status = GameStatus::Active;
            cell.game.started_at = Some(at);
        }
        Ok(())
    }

    async fn mark_completed(&self, game_id: &GameId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let cell = inner
            .games
            .get_mut(game_id)
            .ok_or_else(|| StoreError::NotFound(format!("game {game_id}")))?;
        if cell.game.status != GameStatus::Completed {
            cell.game.status = GameStatus::Completed;
            cell.game.ended_at = Some(at);
        }
        Ok(())
    }

    async fn active_games(&self) -> Result<Vec<GameState>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .games
            .values()
            .filter(|cell| cell.game.status == GameStatus::Active)
            .map(|cell| cell.game.clone())
            .collect())
    }

    async fn append_attempt(&self, attempt: TagAttempt) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .attempts
            .entry(attempt.game_id.clone())
            .or_default()
            .push(attempt);
        Ok(())
    }
}
