// src/config.rs - Engine tunables, resolved once by the caller

use log::debug;
use std::env;

const DEFAULT_MAX_INSTANT_MATCHES: usize = 3;
const DEFAULT_LOOKAHEAD_DAYS: i64 = 21;
const DEFAULT_DAILY_CONTACT_LIMIT: i64 = 3;
const DEFAULT_PERFECT_TOTAL_SCORE: f64 = 120.0;

/// Configuration for one orchestration run. Constructed once by the caller
/// and passed in explicitly; the engine holds no global state.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Upper bound on match rows created per orchestration run.
    pub max_instant_matches: usize,
    /// Availability look-ahead horizon in days.
    pub lookahead_days: i64,
    /// Max distinct therapists a patient may contact per rolling 24h.
    pub daily_contact_limit: i64,
    /// Total-score threshold above which a candidate counts as perfect
    /// despite a soft mismatch.
    pub perfect_total_score: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_instant_matches: DEFAULT_MAX_INSTANT_MATCHES,
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            daily_contact_limit: DEFAULT_DAILY_CONTACT_LIMIT,
            perfect_total_score: DEFAULT_PERFECT_TOTAL_SCORE,
        }
    }
}

impl MatchingConfig {
    /// Create configuration from environment variables, falling back to the
    /// compiled defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            max_instant_matches: env_parse("MATCHING_MAX_INSTANT_MATCHES")
                .unwrap_or(defaults.max_instant_matches),
            lookahead_days: env_parse("MATCHING_LOOKAHEAD_DAYS")
                .unwrap_or(defaults.lookahead_days),
            daily_contact_limit: env_parse("MATCHING_DAILY_CONTACT_LIMIT")
                .unwrap_or(defaults.daily_contact_limit),
            perfect_total_score: env_parse("MATCHING_PERFECT_TOTAL_SCORE")
                .unwrap_or(defaults.perfect_total_score),
        };
        debug!("Matching config: {:?}", config);
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}
