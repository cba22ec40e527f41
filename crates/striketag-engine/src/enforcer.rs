use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use striketag_core::game::GameState;
use striketag_core::player::{PlayerId, StrikeOutcome};

use crate::collab::{Directory, Notification, NotificationRelay, Presence};
use crate::store::{GameStore, NudgeWindow, StoreError, with_timeout};

/// Counters from one enforcement cycle, for logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleStats {
    pub games_processed: usize,
    pub strikes_applied: usize,
    pub eliminations: usize,
    pub conflicts_lost: usize,
    pub transient_failures: usize,
}

/// The scheduled job that penalizes players who missed a check-in deadline.
///
/// Correctness rests on two store primitives: `take_nudge` consumes the
/// pending window exactly once across concurrent cycles, and each strike is
/// a single-shot compare-and-swap against that player's record. A crash
/// after the window is consumed under-penalizes (a fresh nudge is required);
/// it can never double-penalize.
pub struct DeadlineEnforcer<S, P, R, D> {
    store: S,
    presence: P,
    relay: R,
    directory: D,
    store_timeout: Duration,
}

impl<S, P, R, D> DeadlineEnforcer<S, P, R, D>
where
    S: GameStore,
    P: Presence,
    R: NotificationRelay,
    D: Directory,
{
    pub fn new(store: S, presence: P, relay: R, directory: D, store_timeout: Duration) -> Self {
        Self {
            store,
            presence,
            relay,
            directory,
            store_timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one enforcement pass over every active game whose deadline has
    /// passed. Transient failures skip the affected player or game; the
    /// rest of the cycle continues.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleStats {
        let mut stats = CycleStats::default();

        let games = match with_timeout(self.store_timeout, self.store.active_games()).await {
            Ok(games) => games,
            Err(e) => {
                tracing::warn!(error = %e, "could not scan active games, skipping cycle");
                stats.transient_failures += 1;
                return stats;
            },
        };

        for game in games {
            let due = matches!(game.nudge_deadline_at, Some(deadline) if now >= deadline);
            if !due {
                continue;
            }

            // Consume the window before touching any player. Whichever
            // cycle gets it owns this deadline; everyone else backs off.
            let window = match with_timeout(self.store_timeout, self.store.take_nudge(&game.id))
                .await
            {
                Ok(Some(window)) => window,
                Ok(None) => {
                    tracing::debug!(game = %game.id, "nudge already consumed by another cycle");
                    continue;
                },
                Err(e) => {
                    tracing::warn!(game = %game.id, error = %e, "could not consume nudge");
                    stats.transient_failures += 1;
                    continue;
                },
            };

            stats.games_processed += 1;
            self.enforce_game(&game, window, now, &mut stats).await;
        }

        stats
    }

    async fn enforce_game(
        &self,
        game: &GameState,
        window: NudgeWindow,
        now: DateTime<Utc>,
        stats: &mut CycleStats,
    ) {
        tracing::info!(game = %game.id, issued_at = %window.issued_at, "enforcing deadline");

        for (player_id, snapshot) in &game.players {
            if !snapshot.is_active || snapshot.strikes == 0 {
                continue;
            }

            // Checked in since the nudge: exempt.
            if let Some(seen) = self.presence.last_seen(player_id).await
                && seen >= window.issued_at
            {
                tracing::debug!(game = %game.id, player = %player_id, "checked in, exempt");
                continue;
            }

            let outcome = match self.apply_penalty(game, player_id, stats).await {
                Some(outcome) => outcome,
                None => continue,
            };

            stats.strikes_applied += 1;
            self.notify_penalty(game, player_id, outcome).await;

            if outcome == StrikeOutcome::Eliminated {
                stats.eliminations += 1;
                if self.reevaluate_game(&game.id, now).await {
                    // Already-decided penalties stand, but no further
                    // life-count processing in a completed game.
                    break;
                }
            }
        }
    }

    /// Single-shot strike via compare-and-swap. A lost race or a player
    /// eliminated since the scan means someone else handled it: no retry.
    async fn apply_penalty(
        &self,
        game: &GameState,
        player_id: &PlayerId,
        stats: &mut CycleStats,
    ) -> Option<StrikeOutcome> {
        let rec = match with_timeout(
            self.store_timeout,
            self.store.load_player(&game.id, player_id),
        )
        .await
        {
            Ok(rec) => rec,
            Err(e) => {
                tracing::warn!(game = %game.id, player = %player_id, error = %e, "read failed");
                stats.transient_failures += 1;
                return None;
            },
        };

        // Re-verify on the fresh read; the scan snapshot may be stale.
        if !rec.value.is_active || rec.value.strikes == 0 {
            tracing::debug!(game = %game.id, player = %player_id, "eliminated since scan");
            return None;
        }

        let mut updated = rec.value.clone();
        let outcome = match updated.apply_strike() {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(game = %game.id, player = %player_id, error = %e,
                    "strike rejected, record not committed");
                return None;
            },
        };

        match with_timeout(
            self.store_timeout,
            self.store
                .compare_and_swap_player(&game.id, player_id, rec.version, updated),
        )
        .await
        {
            Ok(_) => Some(outcome),
            Err(StoreError::Conflict) => {
                tracing::debug!(game = %game.id, player = %player_id,
                    "lost the race, treating as handled");
                stats.conflicts_lost += 1;
                None
            },
            Err(e) => {
                tracing::warn!(game = %game.id, player = %player_id, error = %e, "commit failed");
                stats.transient_failures += 1;
                None
            },
        }
    }

    /// One notification batch per committed penalty. Dispatch failures are
    /// logged and never roll back the strike.
    async fn notify_penalty(
        &self,
        game: &GameState,
        penalized: &PlayerId,
        outcome: StrikeOutcome,
    ) {
        let name = self.directory.display_name(penalized).await;
        let others: Vec<String> = game
            .players
            .iter()
            .filter(|(id, _)| *id != penalized)
            .filter_map(|(_, p)| p.push_token.clone())
            .collect();

        match outcome {
            StrikeOutcome::Eliminated => {
                let note = Notification::new(
                    "Player eliminated",
                    &format!("{name} missed the check-in deadline and is out of the game."),
                )
                .with_data("outcome", "eliminated")
                .with_data("player", penalized);
                let report = self.relay.send_multicast(&others, &note).await;
                if report.failed > 0 {
                    tracing::warn!(game = %game.id, failed = report.failed,
                        "some elimination notifications failed");
                }
            },
            StrikeOutcome::Struck { remaining } => {
                let note = Notification::new(
                    "Strike applied",
                    &format!("{name} lost a life for missing the check-in deadline."),
                )
                .with_data("outcome", "struck")
                .with_data("player", penalized);
                let report = self.relay.send_multicast(&others, &note).await;
                if report.failed > 0 {
                    tracing::warn!(game = %game.id, failed = report.failed,
                        "some strike notifications failed");
                }

                if let Some(token) = game
                    .players
                    .get(penalized)
                    .and_then(|p| p.push_token.as_deref())
                {
                    let direct = Notification::new(
                        "You lost a life",
                        &format!("You missed the check-in deadline. {remaining} left."),
                    )
                    .with_data("outcome", "struck");
                    if let Err(e) = self.relay.send(token, &direct).await {
                        tracing::warn!(game = %game.id, player = %penalized, error = %e,
                            "direct notification failed");
                    }
                }
            },
        }
    }

    /// True if the game just completed.
    async fn reevaluate_game(&self, game_id: &str, now: DateTime<Utc>) -> bool {
        let game_id = game_id.to_string();
        match with_timeout(self.store_timeout, self.store.load_game(&game_id)).await {
            Ok(mut game) => {
                if game.reevaluate(now) {
                    match with_timeout(
                        self.store_timeout,
                        self.store.mark_completed(&game_id, now),
                    )
                    .await
                    {
                        Ok(()) => {
                            tracing::info!(game = %game_id, "game completed");
                            return true;
                        },
                        Err(e) => {
                            tracing::warn!(game = %game_id, error = %e,
                                "failed to stamp completion");
                        },
                    }
                }
                false
            },
            Err(e) => {
                tracing::warn!(game = %game_id, error = %e, "lifecycle re-check failed");
                false
            },
        }
    }
}

/// Run enforcement cycles on a fixed interval until a stop signal arrives.
pub fn spawn_enforcer<S, P, R, D>(
    enforcer: DeadlineEnforcer<S, P, R, D>,
    interval: Duration,
) -> (JoinHandle<()>, mpsc::Sender<()>)
where
    S: GameStore + 'static,
    P: Presence + 'static,
    R: NotificationRelay + 'static,
    D: Directory + 'static,
{
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = enforcer.run_cycle(Utc::now()).await;
                    if stats.games_processed > 0 {
                        tracing::info!(
                            games = stats.games_processed,
                            strikes = stats.strikes_applied,
                            eliminations = stats.eliminations,
                            conflicts = stats.conflicts_lost,
                            transient = stats.transient_failures,
                            "enforcement cycle finished"
                        );
                    }
                },
                _ = stop_rx.recv() => {
                    tracing::info!("deadline enforcer stopping");
                    break;
                },
            }
        }
    });
    (handle, stop_tx)
}
