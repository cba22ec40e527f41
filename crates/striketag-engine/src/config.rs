use serde::Deserialize;

use striketag_core::rules::GameRules;

/// Host configuration, loaded from `striketag.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between deadline-enforcement cycles.
    pub enforce_interval_secs: u64,
    /// Upper bound on any single store call.
    pub store_timeout_ms: u64,
    pub rules: GameRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enforce_interval_secs: 1800,
            store_timeout_ms: 5000,
            rules: GameRules::default(),
        }
    }
}

impl EngineConfig {
    /// Validate configuration, exiting on values that cannot work.
    pub fn validate(&self) {
        if self.enforce_interval_secs == 0 {
            tracing::error!("enforce_interval_secs must be > 0");
            std::process::exit(1);
        }
        if self.store_timeout_ms == 0 {
            tracing::error!("store_timeout_ms must be > 0");
            std::process::exit(1);
        }
        if self.rules.starting_strikes == 0 {
            tracing::error!("rules.starting_strikes must be > 0");
            std::process::exit(1);
        }
        if self.rules.basic_radius_m <= 0.0 || self.rules.wide_radius_m <= 0.0 {
            tracing::error!("rules search radii must be > 0");
            std::process::exit(1);
        }
        if self.rules.wide_radius_m < self.rules.basic_radius_m {
            tracing::warn!(
                basic = self.rules.basic_radius_m,
                wide = self.rules.wide_radius_m,
                "wide radius is smaller than basic radius"
            );
        }
    }

    /// Load config from `striketag.toml` if present, then apply env
    /// overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("striketag.toml") {
            Ok(content) => match toml::from_str::<EngineConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from striketag.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse striketag.toml: {e}, using defaults");
                    EngineConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No striketag.toml found, using defaults");
                EngineConfig::default()
            },
        };

        if let Ok(val) = std::env::var("STRIKETAG_ENFORCE_INTERVAL_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.enforce_interval_secs = n;
        }
        if let Ok(val) = std::env::var("STRIKETAG_STORE_TIMEOUT_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.store_timeout_ms = n;
        }
        if let Ok(val) = std::env::var("STRIKETAG_DAILY_TAG_LIMIT")
            && let Ok(n) = val.parse::<u32>()
        {
            config.rules.daily_tag_limit = n;
        }

        config
    }
}
