use serde::Deserialize;

use crate::tag::TagKind;

/// Tunable game constants. Deserialized from the `[rules]` section of the
/// host config; every field has a default so a bare config still plays.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameRules {
    /// Lives each player starts with.
    pub starting_strikes: u32,
    /// Basic tags granted at each midnight reset (absolute, not additive).
    pub daily_tag_limit: u32,
    /// Search radius for a basic tag, meters.
    pub basic_radius_m: f64,
    /// Search radius for a wide-radius tag, meters.
    pub wide_radius_m: f64,
    /// Protection radius around a player's home base, meters.
    pub home_base_radius_m: f64,
    /// Radius assumed for zone records that predate the stored radius field.
    pub default_zone_radius_m: f64,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            starting_strikes: 3,
            daily_tag_limit: 3,
            basic_radius_m: 80.0,
            wide_radius_m: 300.0,
            home_base_radius_m: 60.0,
            default_zone_radius_m: 30.0,
        }
    }
}

impl GameRules {
    /// Fixed search radius for a tag kind.
    pub fn search_radius(&self, kind: TagKind) -> f64 {
        match kind {
            TagKind::Basic => self.basic_radius_m,
            TagKind::WideRadius => self.wide_radius_m,
        }
    }
}
