use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::{Coordinate, distance_meters};
use crate::rules::GameRules;

/// What created a safe zone, which also determines its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    /// Set once at game start; never expires within a game.
    HomeBase,
    /// Left behind by a missed tag; expires at the next midnight.
    MissedTag,
    /// Left behind by a hit; permanent for the game's duration.
    HitTag,
}

/// A geofenced area that blocks hits against a player inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeZone {
    pub id: Uuid,
    pub location: Coordinate,
    pub created_at: DateTime<Utc>,
    pub kind: ZoneKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Absent on records written before the radius was stored; read through
    /// `effective_radius`, never directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagger_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagger_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

impl SafeZone {
    /// A player's home base, created when they pick their base location.
    pub fn home_base(location: Coordinate, now: DateTime<Utc>, rules: &GameRules) -> Self {
        Self {
            id: Uuid::new_v4(),
            location,
            created_at: now,
            kind: ZoneKind::HomeBase,
            expires_at: None,
            radius: Some(rules.home_base_radius_m),
            tagger_id: None,
            tagger_name: None,
            target_name: None,
        }
    }

    /// Temporary zone at a guessed location after a miss. Keyed by the
    /// attacker's identity so repeat probes of the same spot are detectable.
    pub fn missed_tag(
        location: Coordinate,
        tagger_id: &str,
        tagger_name: &str,
        now: DateTime<Utc>,
        rules: &GameRules,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            location,
            created_at: now,
            kind: ZoneKind::MissedTag,
            expires_at: Some(next_midnight_utc(now)),
            radius: Some(rules.default_zone_radius_m),
            tagger_id: Some(tagger_id.to_string()),
            tagger_name: Some(tagger_name.to_string()),
            target_name: None,
        }
    }

    /// Permanent zone at the target's actual location after a hit, labeled
    /// for the map with both display names.
    pub fn hit_tag(
        location: Coordinate,
        tagger_name: &str,
        target_name: &str,
        now: DateTime<Utc>,
        rules: &GameRules,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            location,
            created_at: now,
            kind: ZoneKind::HitTag,
            expires_at: None,
            radius: Some(rules.default_zone_radius_m),
            tagger_id: None,
            tagger_name: Some(tagger_name.to_string()),
            target_name: Some(target_name.to_string()),
        }
    }

    /// Stored radius, or the configured default for legacy records.
    pub fn effective_radius(&self, rules: &GameRules) -> f64 {
        self.radius.unwrap_or(rules.default_zone_radius_m)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }
}

/// The midnight boundary after `now`, in UTC.
pub fn next_midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .succ_opt()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or(now)
}

/// True iff `location` lies within any non-expired zone. Expired temporaries
/// are masked without being removed; physical removal is `sweep_expired`.
pub fn is_protected(
    location: Coordinate,
    zones: &[SafeZone],
    now: DateTime<Utc>,
    rules: &GameRules,
) -> bool {
    zones
        .iter()
        .filter(|z| !z.is_expired(now))
        .any(|z| distance_meters(location, z.location) <= z.effective_radius(rules))
}

/// Drop temporary zones whose expiry has passed. Zones without an expiry
/// (home bases, hit zones) are untouched. Idempotent.
pub fn sweep_expired(zones: &mut Vec<SafeZone>, now: DateTime<Utc>) {
    zones.retain(|z| !z.is_expired(now));
}

/// Rounds a coordinate to ~11 m grid cells for duplicate-probe detection.
fn rounded_key(c: Coordinate) -> (i64, i64) {
    ((c.lat * 1e4).round() as i64, (c.lon * 1e4).round() as i64)
}

/// True iff `tagger_id` already left a live miss-zone at (roughly) `guess`.
pub fn has_matching_miss_zone(
    zones: &[SafeZone],
    tagger_id: &str,
    guess: Coordinate,
    now: DateTime<Utc>,
) -> bool {
    zones.iter().any(|z| {
        z.kind == ZoneKind::MissedTag
            && !z.is_expired(now)
            && z.tagger_id.as_deref() == Some(tagger_id)
            && rounded_key(z.location) == rounded_key(guess)
    })
}
