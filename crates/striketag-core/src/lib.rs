pub mod error;
pub mod game;
pub mod geo;
pub mod player;
pub mod rules;
pub mod tag;
pub mod zone;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    use crate::game::{GameState, GameStatus};
    use crate::geo::Coordinate;
    use crate::player::PlayerState;
    use crate::rules::GameRules;
    use crate::zone::SafeZone;

    /// Fixed wall-clock instant used across tests.
    pub fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    pub fn test_date() -> NaiveDate {
        test_now().date_naive()
    }

    /// A fresh player with a home base `i` blocks north of a shared origin
    /// and a predictable push token.
    pub fn make_player(i: usize, rules: &GameRules) -> PlayerState {
        let mut p = PlayerState::new(rules, test_date());
        let base = Coordinate::new(40.0 + i as f64 * 0.1, -74.0);
        p.home_base = Some(base);
        p.safe_zones
            .push(SafeZone::home_base(base, test_now(), rules));
        p.push_token = Some(format!("token-p{}", i + 1));
        p
    }

    /// An active game with players `p1..pn`, each with a home base.
    pub fn make_active_game(n: usize, rules: &GameRules) -> GameState {
        let mut game = GameState::new("g1".to_string(), "Test Game");
        for i in 0..n {
            game.players
                .insert(format!("p{}", i + 1), make_player(i, rules));
        }
        game.status = GameStatus::Active;
        game.started_at = Some(test_now());
        game
    }

    /// A spot far from every home base created by `make_player`.
    pub fn open_field() -> Coordinate {
        Coordinate::new(45.0, -80.0)
    }
}
