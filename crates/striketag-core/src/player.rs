use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::geo::Coordinate;
use crate::rules::GameRules;
use crate::tag::TagKind;
use crate::zone::SafeZone;

pub type PlayerId = String;

/// Purchasable consumables. Counts only ever grow on purchase and shrink on
/// consumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub extra_tags: u32,
    pub wide_radius_tags: u32,
    pub radar_pings: u32,
    pub tripwires: u32,
}

/// Inventory item kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    ExtraTag,
    WideRadiusTag,
    RadarPing,
    Tripwire,
}

impl Inventory {
    pub fn count(&self, item: ItemKind) -> u32 {
        match item {
            ItemKind::ExtraTag => self.extra_tags,
            ItemKind::WideRadiusTag => self.wide_radius_tags,
            ItemKind::RadarPing => self.radar_pings,
            ItemKind::Tripwire => self.tripwires,
        }
    }

    pub fn grant(&mut self, item: ItemKind, n: u32) {
        let slot = self.slot_mut(item);
        *slot = slot.saturating_add(n);
    }

    /// Decrement one unit; false if the slot is already empty.
    pub fn consume(&mut self, item: ItemKind) -> bool {
        let slot = self.slot_mut(item);
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    fn slot_mut(&mut self, item: ItemKind) -> &mut u32 {
        match item {
            ItemKind::ExtraTag => &mut self.extra_tags,
            ItemKind::WideRadiusTag => &mut self.wide_radius_tags,
            ItemKind::RadarPing => &mut self.radar_pings,
            ItemKind::Tripwire => &mut self.tripwires,
        }
    }
}

/// Result of a committed strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrikeOutcome {
    Struck { remaining: u32 },
    Eliminated,
}

/// One player's mutable state within a game.
///
/// Invariant after every mutation: `is_active == (strikes > 0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub strikes: u32,
    pub tags_remaining_today: u32,
    pub last_tag_reset_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_base: Option<Coordinate>,
    #[serde(default)]
    pub safe_zones: Vec<SafeZone>,
    pub is_active: bool,
    #[serde(default)]
    pub inventory: Inventory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
}

impl PlayerState {
    pub fn new(rules: &GameRules, today: NaiveDate) -> Self {
        Self {
            strikes: rules.starting_strikes,
            tags_remaining_today: rules.daily_tag_limit,
            last_tag_reset_date: today,
            home_base: None,
            safe_zones: Vec::new(),
            is_active: true,
            inventory: Inventory::default(),
            push_token: None,
        }
    }

    /// Calendar-day reset of the daily allowance. The reset is absolute
    /// (never additive) and idempotent within the same day.
    pub fn reset_daily_allowance_if_needed(&mut self, today: NaiveDate, daily_limit: u32) {
        if self.last_tag_reset_date < today {
            self.tags_remaining_today = daily_limit;
            self.last_tag_reset_date = today;
        }
    }

    /// Consume one tag of the given kind. Basic tags draw from the daily
    /// allowance first, then from purchased extras; wide-radius tags draw
    /// only from inventory.
    pub fn consume_tag(&mut self, kind: TagKind) -> Result<(), LedgerError> {
        match kind {
            TagKind::Basic => {
                if self.tags_remaining_today > 0 {
                    self.tags_remaining_today -= 1;
                    Ok(())
                } else if self.inventory.consume(ItemKind::ExtraTag) {
                    Ok(())
                } else {
                    Err(LedgerError::OutOfTags)
                }
            },
            TagKind::WideRadius => {
                if self.inventory.consume(ItemKind::WideRadiusTag) {
                    Ok(())
                } else {
                    Err(LedgerError::OutOfTags)
                }
            },
        }
    }

    /// Remove one strike, flipping `is_active` exactly when zero is reached.
    ///
    /// An already-inactive player is never decremented. A record whose
    /// active flag disagrees with its strike count is corrupt upstream state;
    /// the mutation is rejected rather than repaired by guessing.
    pub fn apply_strike(&mut self) -> Result<StrikeOutcome, LedgerError> {
        self.check_invariant()?;
        if !self.is_active {
            return Err(LedgerError::AlreadyEliminated);
        }
        self.strikes -= 1;
        self.is_active = self.strikes > 0;
        if self.is_active {
            Ok(StrikeOutcome::Struck {
                remaining: self.strikes,
            })
        } else {
            Ok(StrikeOutcome::Eliminated)
        }
    }

    /// An item is usable iff the player is alive and has at least one.
    pub fn is_available(&self, item: ItemKind) -> bool {
        self.is_active && self.inventory.count(item) > 0
    }

    fn check_invariant(&self) -> Result<(), LedgerError> {
        if self.is_active != (self.strikes > 0) {
            return Err(LedgerError::InvariantViolation(format!(
                "is_active={} but strikes={}",
                self.is_active, self.strikes
            )));
        }
        Ok(())
    }
}
