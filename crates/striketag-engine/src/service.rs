use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use striketag_core::game::{GameId, GameState, GameStatus};
use striketag_core::geo::Coordinate;
use striketag_core::player::{PlayerId, PlayerState};
use striketag_core::rules::GameRules;
use striketag_core::tag::{self, ResolveContext, TagAttempt, TagKind, TagResult};
use striketag_core::zone::SafeZone;

use crate::collab::Directory;
use crate::error::EngineError;
use crate::store::{GameStore, NudgeWindow, with_timeout};

/// A tag attempt as submitted by the presentation layer. The target's
/// present coordinate comes from the caller; the resolver never looks it up.
#[derive(Debug, Clone)]
pub struct TagRequest {
    pub game_id: GameId,
    pub from_player_id: PlayerId,
    pub target_player_id: PlayerId,
    pub guessed_location: Coordinate,
    pub target_actual_location: Coordinate,
    pub kind: TagKind,
}

/// Usable counts per item kind, after the read-time daily reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowanceReport {
    pub basic_tags: u32,
    pub wide_radius_tags: u32,
    pub radar_pings: u32,
    pub tripwires: u32,
}

/// The facade the presentation layer talks to. Owns no state; every
/// mutation goes through the store's per-player compare-and-swap.
pub struct GameService<S, D> {
    store: S,
    directory: D,
    rules: GameRules,
    store_timeout: Duration,
}

impl<S: GameStore, D: Directory> GameService<S, D> {
    pub fn new(store: S, directory: D, rules: GameRules, store_timeout: Duration) -> Self {
        Self {
            store,
            directory,
            rules,
            store_timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a game in the waiting state with a fresh registration code.
    pub async fn create_game(&self, title: &str) -> Result<GameState, EngineError> {
        if title.trim().is_empty() {
            return Err(EngineError::Validation("title must not be empty".into()));
        }
        let game = GameState::new(Uuid::new_v4().to_string(), title);
        with_timeout(self.store_timeout, self.store.create_game(game.clone())).await?;
        tracing::info!(game = %game.id, code = %game.registration_code, "game created");
        Ok(game)
    }

    /// Add a player to a waiting game.
    pub async fn join_game(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        push_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if player_id.is_empty() {
            return Err(EngineError::Validation("player id must not be empty".into()));
        }
        let game = with_timeout(self.store_timeout, self.store.load_game(game_id)).await?;
        if game.status != GameStatus::Waiting {
            return Err(EngineError::Validation(
                "players can only join while the game is waiting".into(),
            ));
        }
        if game.players.contains_key(player_id) {
            return Err(EngineError::Validation(format!(
                "player {player_id} already joined"
            )));
        }
        let mut player = PlayerState::new(&self.rules, now.date_naive());
        player.push_token = push_token;
        with_timeout(
            self.store_timeout,
            self.store.put_player(game_id, player_id, player),
        )
        .await?;
        Ok(())
    }

    /// Set a player's home base. Allowed once.
    pub async fn set_home_base(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        location: Coordinate,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        validate_coordinate(location)?;
        let rec = with_timeout(
            self.store_timeout,
            self.store.load_player(game_id, player_id),
        )
        .await?;
        if rec.value.home_base.is_some() {
            return Err(EngineError::Validation("home base is already set".into()));
        }
        let mut updated = rec.value.clone();
        updated.home_base = Some(location);
        updated
            .safe_zones
            .push(SafeZone::home_base(location, now, &self.rules));
        with_timeout(
            self.store_timeout,
            self.store
                .compare_and_swap_player(game_id, player_id, rec.version, updated),
        )
        .await?;
        Ok(())
    }

    /// Move a waiting game to active once every player has a home base.
    pub async fn start_game(
        &self,
        game_id: &GameId,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let game = with_timeout(self.store_timeout, self.store.load_game(game_id)).await?;
        if game.status != GameStatus::Waiting {
            return Err(EngineError::Validation("game has already started".into()));
        }
        if !game.all_players_ready() {
            return Err(EngineError::Validation(
                "every player must set a home base first".into(),
            ));
        }
        with_timeout(self.store_timeout, self.store.mark_started(game_id, now)).await?;
        tracing::info!(game = %game_id, players = game.players.len(), "game started");
        Ok(())
    }

    /// Open an enforcement window: players must check in before the
    /// deadline or lose a strike. One window at a time.
    pub async fn issue_nudge(
        &self,
        game_id: &GameId,
        issued_at: DateTime<Utc>,
        deadline_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if deadline_at <= issued_at {
            return Err(EngineError::Validation(
                "deadline must come after the nudge".into(),
            ));
        }
        let game = with_timeout(self.store_timeout, self.store.load_game(game_id)).await?;
        if game.status != GameStatus::Active {
            return Err(EngineError::Validation("game is not active".into()));
        }
        if game.nudge_pending() {
            return Err(EngineError::Validation(
                "a nudge is already pending for this game".into(),
            ));
        }
        with_timeout(
            self.store_timeout,
            self.store.set_nudge(
                game_id,
                NudgeWindow {
                    issued_at,
                    deadline_at,
                },
            ),
        )
        .await?;
        tracing::info!(game = %game_id, %deadline_at, "nudge issued");
        Ok(())
    }

    /// Resolve a tag attempt and commit its side effects.
    ///
    /// Single-shot: a lost compare-and-swap comes back as `Conflict` and the
    /// caller decides whether to submit a fresh attempt against a new read.
    pub async fn resolve_tag(
        &self,
        req: TagRequest,
        now: DateTime<Utc>,
    ) -> Result<TagResult, EngineError> {
        validate_request(&req)?;

        let game = with_timeout(self.store_timeout, self.store.load_game(&req.game_id)).await?;
        if game.status != GameStatus::Active {
            return Err(EngineError::Validation("game is not active".into()));
        }

        let attacker_rec = with_timeout(
            self.store_timeout,
            self.store.load_player(&req.game_id, &req.from_player_id),
        )
        .await?;
        let target_rec = with_timeout(
            self.store_timeout,
            self.store.load_player(&req.game_id, &req.target_player_id),
        )
        .await?;

        let tagger_name = self.directory.display_name(&req.from_player_id).await;
        let target_name = self.directory.display_name(&req.target_player_id).await;

        let mut attempt = TagAttempt::new(
            req.game_id.clone(),
            req.from_player_id.clone(),
            req.target_player_id.clone(),
            req.guessed_location,
            req.kind,
            now,
        );

        let mut attacker = attacker_rec.value.clone();
        let mut target = target_rec.value.clone();
        let resolution = tag::resolve(
            &attempt,
            &mut attacker,
            &mut target,
            &ResolveContext {
                target_actual_location: req.target_actual_location,
                tagger_name: &tagger_name,
                target_name: &target_name,
                now,
                rules: &self.rules,
            },
        )?;

        // Commit what changed, attacker first. Each record is its own
        // compare-and-swap; a loss means a racing writer got there and the
        // caller retries against a fresh read.
        if attacker != attacker_rec.value {
            with_timeout(
                self.store_timeout,
                self.store.compare_and_swap_player(
                    &req.game_id,
                    &req.from_player_id,
                    attacker_rec.version,
                    attacker,
                ),
            )
            .await?;
        }
        if target != target_rec.value {
            with_timeout(
                self.store_timeout,
                self.store.compare_and_swap_player(
                    &req.game_id,
                    &req.target_player_id,
                    target_rec.version,
                    target,
                ),
            )
            .await?;
        }

        attempt.record_result(resolution.result.clone());
        with_timeout(self.store_timeout, self.store.append_attempt(attempt)).await?;

        if resolution.target_eliminated {
            self.reevaluate_game(&req.game_id, now).await;
        }

        Ok(resolution.result)
    }

    /// Usable counts per item kind, with the daily reset applied at read
    /// time (nothing is written).
    pub async fn current_allowance(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        now: DateTime<Utc>,
    ) -> Result<AllowanceReport, EngineError> {
        let rec = with_timeout(
            self.store_timeout,
            self.store.load_player(game_id, player_id),
        )
        .await?;
        let mut view = rec.value;
        view.reset_daily_allowance_if_needed(now.date_naive(), self.rules.daily_tag_limit);
        Ok(AllowanceReport {
            basic_tags: view.tags_remaining_today + view.inventory.extra_tags,
            wide_radius_tags: view.inventory.wide_radius_tags,
            radar_pings: view.inventory.radar_pings,
            tripwires: view.inventory.tripwires,
        })
    }

    pub async fn game_status(&self, game_id: &GameId) -> Result<GameStatus, EngineError> {
        let game = with_timeout(self.store_timeout, self.store.load_game(game_id)).await?;
        Ok(game.status)
    }

    /// Re-check the completion condition after an elimination. Failures are
    /// logged; the committed strike stands either way.
    async fn reevaluate_game(&self, game_id: &GameId, now: DateTime<Utc>) {
        match with_timeout(self.store_timeout, self.store.load_game(game_id)).await {
            Ok(mut game) => {
                if game.reevaluate(now) {
                    if let Err(e) = with_timeout(
                        self.store_timeout,
                        self.store.mark_completed(game_id, now),
                    )
                    .await
                    {
                        tracing::warn!(game = %game_id, error = %e, "failed to stamp completion");
                    } else {
                        tracing::info!(game = %game_id, "game completed");
                    }
                }
            },
            Err(e) => {
                tracing::warn!(game = %game_id, error = %e, "lifecycle re-check failed");
            },
        }
    }
}

fn validate_coordinate(c: Coordinate) -> Result<(), EngineError> {
    if !c.lat.is_finite() || !c.lon.is_finite() {
        return Err(EngineError::Validation("coordinate is not finite".into()));
    }
    if c.lat.abs() > 90.0 || c.lon.abs() > 180.0 {
        return Err(EngineError::Validation("coordinate out of range".into()));
    }
    Ok(())
}

fn validate_request(req: &TagRequest) -> Result<(), EngineError> {
    if req.game_id.is_empty() || req.from_player_id.is_empty() || req.target_player_id.is_empty() {
        return Err(EngineError::Validation("missing id field".into()));
    }
    if req.from_player_id == req.target_player_id {
        return Err(EngineError::Validation("players cannot tag themselves".into()));
    }
    validate_coordinate(req.guessed_location)?;
    validate_coordinate(req.target_actual_location)?;
    Ok(())
}
