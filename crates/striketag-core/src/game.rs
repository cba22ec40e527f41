use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::player::{PlayerId, PlayerState};

pub type GameId = String;

/// Game lifecycle status. Completed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    Active,
    Completed,
}

/// One game and everything it owns. Nothing here is shared across games;
/// the external store is the only durable copy between process runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub id: GameId,
    pub title: String,
    pub registration_code: String,
    pub players: HashMap<PlayerId, PlayerState>,
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Present only while an enforcement cycle is pending. Cleared together
    /// with `nudge_deadline_at` so a cycle is consumed exactly once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudge_issued_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudge_deadline_at: Option<DateTime<Utc>>,
}

/// Characters used in registration codes. 0/O and 1/I are left out.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

/// Generate a short code players type to join a game.
pub fn generate_registration_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

impl GameState {
    pub fn new(id: GameId, title: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            registration_code: generate_registration_code(),
            players: HashMap::new(),
            status: GameStatus::Waiting,
            started_at: None,
            ended_at: None,
            nudge_issued_at: None,
            nudge_deadline_at: None,
        }
    }

    pub fn active_player_count(&self) -> usize {
        self.players.values().filter(|p| p.is_active).count()
    }

    /// The waiting → active transition is allowed once every joined player
    /// has picked a home base. Triggering it is the host's call, not ours.
    pub fn all_players_ready(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.home_base.is_some())
    }

    /// Complete an active game once at most one player remains. One-way:
    /// a completed game never reopens. Returns true if the status changed.
    pub fn reevaluate(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == GameStatus::Active && self.active_player_count() <= 1 {
            self.status = GameStatus::Completed;
            self.ended_at = Some(now);
            return true;
        }
        false
    }

    /// A nudge is pending iff both fields are set.
    pub fn nudge_pending(&self) -> bool {
        self.nudge_issued_at.is_some() && self.nudge_deadline_at.is_some()
    }
}
