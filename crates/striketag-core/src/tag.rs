use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::game::GameId;
use crate::geo::{Coordinate, distance_meters};
use crate::player::{PlayerId, PlayerState, StrikeOutcome};
use crate::rules::GameRules;
use crate::zone::{self, SafeZone};

/// Tag kinds, which fix the search radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Basic,
    WideRadius,
}

/// Why a tag attempt was blocked. Ordering here mirrors the evaluation
/// precedence: the first applicable reason wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    TargetEliminated,
    OutOfTags,
    HomeBase,
    SafeZone,
}

/// Outcome of a resolved tag attempt. Internally tagged so the discriminant
/// and only the variant's own fields round-trip through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TagResult {
    Hit {
        actual_location: Coordinate,
        distance_m: f64,
        target_name: String,
    },
    Miss {
        distance_m: f64,
    },
    Blocked {
        reason: BlockReason,
    },
}

/// One tag attempt. `result` is written exactly once at resolution and is
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagAttempt {
    pub id: Uuid,
    pub game_id: GameId,
    pub from_player_id: PlayerId,
    pub target_player_id: PlayerId,
    pub guessed_location: Coordinate,
    pub timestamp: DateTime<Utc>,
    pub kind: TagKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TagResult>,
}

impl TagAttempt {
    pub fn new(
        game_id: GameId,
        from_player_id: PlayerId,
        target_player_id: PlayerId,
        guessed_location: Coordinate,
        kind: TagKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id,
            from_player_id,
            target_player_id,
            guessed_location,
            timestamp,
            kind,
            result: None,
        }
    }

    /// Set the result once. Returns false (and leaves the attempt untouched)
    /// if a result was already recorded.
    pub fn record_result(&mut self, result: TagResult) -> bool {
        if self.result.is_some() {
            return false;
        }
        self.result = Some(result);
        true
    }
}

/// Caller-supplied facts the resolver cannot know on its own.
#[derive(Debug, Clone)]
pub struct ResolveContext<'a> {
    /// The target's present coordinate (home-base and safe-zone protection
    /// are evaluated against this, never against the guess).
    pub target_actual_location: Coordinate,
    pub tagger_name: &'a str,
    pub target_name: &'a str,
    pub now: DateTime<Utc>,
    pub rules: &'a GameRules,
}

/// A resolved attempt plus the side effect the caller must act on.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub result: TagResult,
    pub target_eliminated: bool,
}

fn blocked(reason: BlockReason) -> Resolution {
    Resolution {
        result: TagResult::Blocked { reason },
        target_eliminated: false,
    }
}

/// Decide the outcome of a tag attempt, mutating the attacker's allowance
/// and the target's strikes/zones in place. The caller commits both records
/// (or neither) together with the result.
///
/// Precedence is fixed: eliminated target, out of tags, home base, safe
/// zone, then hit/miss by distance. Blocks for the first two reasons cost
/// nothing; home-base and safe-zone blocks still spend the consumed tag.
pub fn resolve(
    attempt: &TagAttempt,
    attacker: &mut PlayerState,
    target: &mut PlayerState,
    ctx: &ResolveContext<'_>,
) -> Result<Resolution, LedgerError> {
    if !target.is_active {
        return Ok(blocked(BlockReason::TargetEliminated));
    }

    attacker.reset_daily_allowance_if_needed(ctx.now.date_naive(), ctx.rules.daily_tag_limit);
    match attacker.consume_tag(attempt.kind) {
        Ok(()) => {},
        Err(LedgerError::OutOfTags) => return Ok(blocked(BlockReason::OutOfTags)),
        Err(e) => return Err(e),
    }

    if let Some(base) = target.home_base
        && distance_meters(ctx.target_actual_location, base) <= ctx.rules.home_base_radius_m
    {
        return Ok(blocked(BlockReason::HomeBase));
    }

    if zone::is_protected(
        ctx.target_actual_location,
        &target.safe_zones,
        ctx.now,
        ctx.rules,
    ) {
        return Ok(blocked(BlockReason::SafeZone));
    }

    let distance_m = distance_meters(attempt.guessed_location, ctx.target_actual_location);
    if distance_m <= ctx.rules.search_radius(attempt.kind) {
        target.safe_zones.push(SafeZone::hit_tag(
            ctx.target_actual_location,
            ctx.tagger_name,
            ctx.target_name,
            ctx.now,
            ctx.rules,
        ));
        let outcome = target.apply_strike()?;
        tracing::debug!(
            attempt = %attempt.id,
            target = %attempt.target_player_id,
            distance_m,
            eliminated = matches!(outcome, StrikeOutcome::Eliminated),
            "tag hit"
        );
        Ok(Resolution {
            result: TagResult::Hit {
                actual_location: ctx.target_actual_location,
                distance_m,
                target_name: ctx.target_name.to_string(),
            },
            target_eliminated: matches!(outcome, StrikeOutcome::Eliminated),
        })
    } else {
        // Leave a miss-zone at the guess so the target is safe there until
        // midnight; a repeat probe of the same spot by the same attacker
        // does not stack a duplicate.
        if !zone::has_matching_miss_zone(
            &target.safe_zones,
            &attempt.from_player_id,
            attempt.guessed_location,
            ctx.now,
        ) {
            target.safe_zones.push(SafeZone::missed_tag(
                attempt.guessed_location,
                &attempt.from_player_id,
                ctx.tagger_name,
                ctx.now,
                ctx.rules,
            ));
        }
        Ok(Resolution {
            result: TagResult::Miss { distance_m },
            target_eliminated: false,
        })
    }
}
