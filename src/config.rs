//! Arena Configuration
//!
//! Timing and gameplay knobs for rooms, lobbies and tournaments. Every value
//! has a default; `from_env` overrides from `ARENA_*` variables.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::game::bot::BotPolicy;

/// Arena-wide settings.
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Simulation rate per room (Hz).
    pub tick_rate: u32,
    /// First countdown value; counts down to 0.
    pub countdown_from: u32,
    /// Time between countdown values.
    pub countdown_step: Duration,
    /// Delay between a lobby filling and its room starting.
    pub lobby_grace: Duration,
    /// Target score when a request does not specify one.
    pub default_target_score: u32,
    /// Largest accepted target score.
    pub max_target_score: u32,
    /// How long a tournament waits for players before bot backfill.
    pub fill_window: Duration,
    /// Pause between tournament rounds.
    pub round_cooldown: Duration,
    /// Watchdog for bot-vs-bot bracket matches.
    pub bot_match_ceiling: Duration,
    /// Watchdog for bracket matches with a human, absent a configured duration.
    pub human_match_ceiling: Duration,
    /// How long a completed tournament stays viewable before eviction.
    pub tournament_retention: Duration,
    /// Bot controller parameters.
    pub bot: BotPolicy,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            countdown_from: 3,
            countdown_step: Duration::from_secs(1),
            lobby_grace: Duration::from_millis(1500),
            default_target_score: 5,
            max_target_score: 21,
            fill_window: Duration::from_secs(120),
            round_cooldown: Duration::from_secs(5),
            bot_match_ceiling: Duration::from_secs(45),
            human_match_ceiling: Duration::from_secs(300),
            tournament_retention: Duration::from_secs(600),
            bot: BotPolicy::default(),
        }
    }
}

impl ArenaConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick_rate: env_or("ARENA_TICK_RATE", defaults.tick_rate).max(1),
            countdown_from: env_or("ARENA_COUNTDOWN_FROM", defaults.countdown_from),
            countdown_step: env_millis("ARENA_COUNTDOWN_STEP_MS", defaults.countdown_step),
            lobby_grace: env_millis("ARENA_LOBBY_GRACE_MS", defaults.lobby_grace),
            default_target_score: env_or("ARENA_DEFAULT_TARGET_SCORE", defaults.default_target_score).max(1),
            max_target_score: env_or("ARENA_MAX_TARGET_SCORE", defaults.max_target_score).max(1),
            fill_window: env_secs("ARENA_FILL_WINDOW_SECS", defaults.fill_window),
            round_cooldown: env_millis("ARENA_ROUND_COOLDOWN_MS", defaults.round_cooldown),
            bot_match_ceiling: env_secs("ARENA_BOT_MATCH_CEILING_SECS", defaults.bot_match_ceiling),
            human_match_ceiling: env_secs("ARENA_HUMAN_MATCH_CEILING_SECS", defaults.human_match_ceiling),
            tournament_retention: env_secs("ARENA_TOURNAMENT_RETENTION_SECS", defaults.tournament_retention),
            bot: BotPolicy {
                reaction_error: env_or("ARENA_BOT_REACTION_ERROR", defaults.bot.reaction_error),
                interval: env_millis("ARENA_BOT_INTERVAL_MS", defaults.bot.interval),
            },
        }
    }

    /// Simulation tick period.
    pub fn tick_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tick_rate.max(1) as u64)
    }

    /// Clamp a requested target score, applying the default when absent.
    pub fn target_score(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_target_score)
            .clamp(1, self.max_target_score)
    }
}

/// Read and parse an environment variable, falling back to `default` when
/// it is absent or unparsable.
pub fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Unparsable config value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_millis(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_or(key, default.as_millis() as u64))
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or(key, default.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArenaConfig::default();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.countdown_from, 3);
        assert_eq!(config.lobby_grace, Duration::from_millis(1500));
        assert_eq!(config.fill_window, Duration::from_secs(120));
        assert_eq!(config.tournament_retention, Duration::from_secs(600));
        assert_eq!(config.bot.interval, Duration::from_millis(120));
    }

    #[test]
    fn test_tick_period() {
        let config = ArenaConfig::default();
        assert_eq!(config.tick_period(), Duration::from_micros(16_666));
    }

    #[test]
    fn test_target_score_clamped() {
        let config = ArenaConfig::default();
        assert_eq!(config.target_score(None), 5);
        assert_eq!(config.target_score(Some(0)), 1);
        assert_eq!(config.target_score(Some(3)), 3);
        assert_eq!(config.target_score(Some(500)), 21);
    }

    #[test]
    fn test_env_or_falls_back() {
        std::env::set_var("ARENA_TEST_ONLY_GARBAGE", "not-a-number");
        assert_eq!(env_or("ARENA_TEST_ONLY_GARBAGE", 7u32), 7);
        std::env::set_var("ARENA_TEST_ONLY_VALUE", " 12 ");
        assert_eq!(env_or("ARENA_TEST_ONLY_VALUE", 7u32), 12);
        assert_eq!(env_or("ARENA_TEST_ONLY_ABSENT", 7u32), 7);
    }
}
