mod common;

use std::sync::Arc;

use chrono::Duration;

use striketag_core::game::GameStatus;
use striketag_core::geo::Coordinate;
use striketag_core::rules::GameRules;
use striketag_core::tag::{BlockReason, TagKind, TagResult};
use striketag_core::test_helpers::{open_field, test_now};
use striketag_core::zone::{ZoneKind, next_midnight_utc};

use striketag_engine::collab::{InProcessPresence, StaticDirectory};
use striketag_engine::enforcer::DeadlineEnforcer;
use striketag_engine::error::EngineError;
use striketag_engine::service::{GameService, TagRequest};
use striketag_engine::store::{GameStore, MemoryStore};

use common::{CapturingRelay, STORE_TIMEOUT, seed_active_game};

fn request(
    game_id: &str,
    from: &str,
    target: &str,
    guess: Coordinate,
    actual: Coordinate,
) -> TagRequest {
    TagRequest {
        game_id: game_id.to_string(),
        from_player_id: from.to_string(),
        target_player_id: target.to_string(),
        guessed_location: guess,
        target_actual_location: actual,
        kind: TagKind::Basic,
    }
}

fn service_over(store: Arc<MemoryStore>) -> GameService<Arc<MemoryStore>, StaticDirectory> {
    GameService::new(
        store,
        StaticDirectory::new().with_name("p1", "Alice").with_name("p2", "Bob"),
        GameRules::default(),
        STORE_TIMEOUT,
    )
}

async fn set_strikes(store: &MemoryStore, game_id: &str, player_id: &str, strikes: u32) {
    let game_id = game_id.to_string();
    let player_id = player_id.to_string();
    let rec = store.load_player(&game_id, &player_id).await.unwrap();
    let mut p = rec.value.clone();
    p.strikes = strikes;
    store
        .compare_and_swap_player(&game_id, &player_id, rec.version, p)
        .await
        .unwrap();
}

#[tokio::test]
async fn hit_commits_strike_zone_attempt_and_allowance() {
    let store = Arc::new(MemoryStore::new());
    let game = seed_active_game(&store, 2).await;
    let svc = service_over(Arc::clone(&store));

    let spot = open_field();
    let result = svc
        .resolve_tag(request(&game.id, "p1", "p2", spot, spot), test_now())
        .await
        .unwrap();

    match result {
        TagResult::Hit {
            actual_location,
            distance_m,
            target_name,
        } => {
            assert_eq!(actual_location, spot);
            assert!(distance_m < 1e-6);
            assert_eq!(target_name, "Bob");
        },
        other => panic!("expected hit, got {other:?}"),
    }

    let p2 = store
        .load_player(&game.id, &"p2".to_string())
        .await
        .unwrap();
    assert_eq!(p2.value.strikes, 2);
    assert!(p2.value.is_active);
    let zone = p2.value.safe_zones.last().unwrap();
    assert_eq!(zone.kind, ZoneKind::HitTag);
    assert_eq!(zone.location, spot);
    assert!(zone.expires_at.is_none());

    let allowance = svc
        .current_allowance(&game.id, &"p1".to_string(), test_now())
        .await
        .unwrap();
    assert_eq!(allowance.basic_tags, 2);

    let attempts = store.attempts(&game.id).await;
    assert_eq!(attempts.len(), 1);
    assert!(matches!(attempts[0].result, Some(TagResult::Hit { .. })));
}

#[tokio::test]
async fn miss_leaves_zone_at_guess_until_midnight() {
    let store = Arc::new(MemoryStore::new());
    let game = seed_active_game(&store, 2).await;
    let svc = service_over(Arc::clone(&store));

    let actual = open_field();
    let guess = Coordinate::new(45.05, -80.0);
    let result = svc
        .resolve_tag(request(&game.id, "p1", "p2", guess, actual), test_now())
        .await
        .unwrap();
    assert!(matches!(result, TagResult::Miss { distance_m } if distance_m > 80.0));

    let p2 = store
        .load_player(&game.id, &"p2".to_string())
        .await
        .unwrap();
    assert_eq!(p2.value.strikes, 3);
    let zone = p2.value.safe_zones.last().unwrap();
    assert_eq!(zone.kind, ZoneKind::MissedTag);
    assert_eq!(zone.location, guess);
    assert_eq!(zone.expires_at, Some(next_midnight_utc(test_now())));
    assert_eq!(zone.tagger_id.as_deref(), Some("p1"));
}

#[tokio::test]
async fn exhausted_daily_allowance_blocks_the_fourth_attempt() {
    let store = Arc::new(MemoryStore::new());
    let game = seed_active_game(&store, 2).await;
    let svc = service_over(Arc::clone(&store));

    let actual = open_field();
    for i in 0..3 {
        let guess = Coordinate::new(46.0 + i as f64 * 0.1, -80.0);
        let result = svc
            .resolve_tag(request(&game.id, "p1", "p2", guess, actual), test_now())
            .await
            .unwrap();
        assert!(matches!(result, TagResult::Miss { .. }));
    }

    let result = svc
        .resolve_tag(
            request(&game.id, "p1", "p2", Coordinate::new(47.0, -80.0), actual),
            test_now(),
        )
        .await
        .unwrap();
    assert_eq!(
        result,
        TagResult::Blocked {
            reason: BlockReason::OutOfTags
        }
    );

    let allowance = svc
        .current_allowance(&game.id, &"p1".to_string(), test_now())
        .await
        .unwrap();
    assert_eq!(allowance.basic_tags, 0);

    // Blocked attempts are recorded too.
    let attempts = store.attempts(&game.id).await;
    assert_eq!(attempts.len(), 4);
}

#[tokio::test]
async fn allowance_resets_on_the_next_calendar_day() {
    let store = Arc::new(MemoryStore::new());
    let game = seed_active_game(&store, 2).await;
    let svc = service_over(Arc::clone(&store));

    let actual = open_field();
    svc.resolve_tag(
        request(&game.id, "p1", "p2", Coordinate::new(46.0, -80.0), actual),
        test_now(),
    )
    .await
    .unwrap();

    let today = svc
        .current_allowance(&game.id, &"p1".to_string(), test_now())
        .await
        .unwrap();
    assert_eq!(today.basic_tags, 2);

    let tomorrow = svc
        .current_allowance(&game.id, &"p1".to_string(), test_now() + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(tomorrow.basic_tags, 3, "read-time view of the daily reset");
}

#[tokio::test]
async fn concurrent_final_strikes_eliminate_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let game = seed_active_game(&store, 3).await;
    set_strikes(&store, &game.id, "p2", 1).await;
    let svc = service_over(Arc::clone(&store));

    let spot = open_field();
    let (a, b) = tokio::join!(
        svc.resolve_tag(request(&game.id, "p1", "p2", spot, spot), test_now()),
        svc.resolve_tag(request(&game.id, "p3", "p2", spot, spot), test_now()),
    );

    // Exactly one attacker lands the final strike. The other either loses
    // the compare-and-swap or sees the target already eliminated on a
    // fresh read.
    let hits = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Ok(TagResult::Hit { .. })))
        .count();
    assert_eq!(hits, 1);
    for r in [&a, &b] {
        match r {
            Ok(TagResult::Hit { .. }) => {},
            Ok(TagResult::Blocked {
                reason: BlockReason::TargetEliminated,
            }) => {},
            Err(EngineError::Conflict(_)) => {},
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    let p2 = store
        .load_player(&game.id, &"p2".to_string())
        .await
        .unwrap();
    assert_eq!(p2.value.strikes, 0);
    assert!(!p2.value.is_active);

    let hits_recorded = store
        .attempts(&game.id)
        .await
        .iter()
        .filter(|a| matches!(a.result, Some(TagResult::Hit { .. })))
        .count();
    assert_eq!(hits_recorded, 1);
}

#[tokio::test]
async fn hit_on_last_opponent_completes_the_game() {
    let store = Arc::new(MemoryStore::new());
    let game = seed_active_game(&store, 2).await;
    set_strikes(&store, &game.id, "p2", 1).await;
    let svc = service_over(Arc::clone(&store));

    let spot = open_field();
    let result = svc
        .resolve_tag(request(&game.id, "p1", "p2", spot, spot), test_now())
        .await
        .unwrap();
    assert!(matches!(result, TagResult::Hit { .. }));

    let reloaded = store.load_game(&game.id).await.unwrap();
    assert_eq!(reloaded.status, GameStatus::Completed);
    assert!(reloaded.ended_at.is_some());

    // Completed games accept no further attempts.
    let err = svc
        .resolve_tag(request(&game.id, "p2", "p1", spot, spot), test_now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn tag_elimination_leaves_nothing_for_the_enforcer() {
    let store = Arc::new(MemoryStore::new());
    let game = seed_active_game(&store, 3).await;
    set_strikes(&store, &game.id, "p2", 1).await;
    let svc = service_over(Arc::clone(&store));

    // A nudge is pending when the tag eliminates p2.
    let issued = test_now();
    let deadline = issued + Duration::hours(6);
    svc.issue_nudge(&game.id, issued, deadline).await.unwrap();

    let spot = open_field();
    let result = svc
        .resolve_tag(request(&game.id, "p1", "p2", spot, spot), test_now())
        .await
        .unwrap();
    assert!(matches!(result, TagResult::Hit { .. }));

    // Everyone still alive checks in; the eliminated player cannot.
    let presence = Arc::new(InProcessPresence::new());
    presence
        .record_seen(&"p1".to_string(), issued + Duration::hours(1))
        .await;
    presence
        .record_seen(&"p3".to_string(), issued + Duration::hours(1))
        .await;

    let relay = Arc::new(CapturingRelay::default());
    let enforcer = DeadlineEnforcer::new(
        Arc::clone(&store),
        presence,
        Arc::clone(&relay),
        StaticDirectory::new(),
        STORE_TIMEOUT,
    );
    let stats = enforcer.run_cycle(deadline + Duration::minutes(1)).await;

    assert_eq!(stats.games_processed, 1);
    assert_eq!(stats.strikes_applied, 0, "eliminated players are skipped");
    let p2 = store
        .load_player(&game.id, &"p2".to_string())
        .await
        .unwrap();
    assert_eq!(p2.value.strikes, 0, "no penalty after elimination");
    assert!(relay.multicasts.lock().await.is_empty());
}
