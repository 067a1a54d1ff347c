//! Match Settings
//!
//! Customization chosen by players when creating a lobby or challenge.
//! Client input arrives as loosely-typed optional fields; it is parsed into
//! [`MatchSettings`], where every field is an enumerated value with an
//! explicit default. Unknown values are coerced to the default.

use serde::{Serialize, Deserialize};
use tracing::warn;

use crate::game::state::{BALL_SPEED_FAST, BALL_SPEED_NORMAL, BALL_SPEED_SLOW};

// =============================================================================
// SETTING TIERS
// =============================================================================

/// Base ball speed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BallSpeed {
    /// Slow serve speed.
    Slow,
    /// Standard serve speed.
    #[default]
    Normal,
    /// Fast serve speed.
    Fast,
}

impl BallSpeed {
    /// Serve speed in pixels per tick.
    pub fn base_speed(self) -> f32 {
        match self {
            BallSpeed::Slow => BALL_SPEED_SLOW,
            BallSpeed::Normal => BALL_SPEED_NORMAL,
            BallSpeed::Fast => BALL_SPEED_FAST,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "slow" => Some(BallSpeed::Slow),
            "normal" | "medium" => Some(BallSpeed::Normal),
            "fast" => Some(BallSpeed::Fast),
            _ => None,
        }
    }
}

/// Ball size tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BallSize {
    /// Small ball.
    Small,
    /// Standard ball.
    #[default]
    Normal,
    /// Large ball.
    Large,
}

impl BallSize {
    /// Ball radius in pixels.
    pub fn radius(self) -> f32 {
        match self {
            BallSize::Small => 6.0,
            BallSize::Normal => 9.0,
            BallSize::Large => 13.0,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "small" => Some(BallSize::Small),
            "normal" | "medium" => Some(BallSize::Normal),
            "large" | "big" => Some(BallSize::Large),
            _ => None,
        }
    }
}

/// Cosmetic arena theme, echoed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArenaTheme {
    /// Black and white.
    #[default]
    Classic,
    /// Glowing lines.
    Neon,
    /// CRT look.
    Retro,
    /// Green field.
    Forest,
}

impl ArenaTheme {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "classic" | "default" => Some(ArenaTheme::Classic),
            "neon" => Some(ArenaTheme::Neon),
            "retro" => Some(ArenaTheme::Retro),
            "forest" => Some(ArenaTheme::Forest),
            _ => None,
        }
    }
}

/// Power-up frequency, echoed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerUpFrequency {
    /// No power-ups.
    #[default]
    Off,
    /// Occasional power-ups.
    Rare,
    /// Regular power-ups.
    Normal,
    /// Many power-ups.
    Frequent,
}

impl PowerUpFrequency {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Some(PowerUpFrequency::Off),
            "rare" | "low" => Some(PowerUpFrequency::Rare),
            "normal" | "medium" => Some(PowerUpFrequency::Normal),
            "frequent" | "high" => Some(PowerUpFrequency::Frequent),
            _ => None,
        }
    }
}

// =============================================================================
// VALIDATED SETTINGS
// =============================================================================

/// Validated match settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSettings {
    /// Serve speed tier.
    pub ball_speed: BallSpeed,
    /// Ball size tier.
    pub ball_size: BallSize,
    /// Arena theme.
    pub theme: ArenaTheme,
    /// Speed up the ball on every paddle hit.
    pub accelerate_on_hit: bool,
    /// Allow paddles to dash.
    pub dash_enabled: bool,
    /// Power-up frequency.
    pub power_ups: PowerUpFrequency,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            ball_speed: BallSpeed::default(),
            ball_size: BallSize::default(),
            theme: ArenaTheme::default(),
            accelerate_on_hit: Self::DEFAULT_ACCELERATE,
            dash_enabled: false,
            power_ups: PowerUpFrequency::default(),
        }
    }
}

/// Raw, partial settings as sent by clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsInput {
    /// Ball speed tier name.
    #[serde(default)]
    pub ball_speed: Option<String>,
    /// Ball size tier name.
    #[serde(default)]
    pub ball_size: Option<String>,
    /// Theme name.
    #[serde(default)]
    pub theme: Option<String>,
    /// Accelerate-on-hit flag.
    #[serde(default, alias = "accelBall")]
    pub accelerate_on_hit: Option<bool>,
    /// Dash flag.
    #[serde(default)]
    pub dash_enabled: Option<bool>,
    /// Power-up frequency name.
    #[serde(default)]
    pub power_ups: Option<String>,
}

impl MatchSettings {
    /// Default for `accelerate_on_hit` when the client omits it.
    pub const DEFAULT_ACCELERATE: bool = true;

    /// Build validated settings from partial client input.
    ///
    /// Missing fields take the default; unrecognized values are coerced to
    /// the default and logged.
    pub fn from_input(input: &SettingsInput) -> Self {
        Self {
            ball_speed: coerce("ball_speed", input.ball_speed.as_deref(), BallSpeed::parse),
            ball_size: coerce("ball_size", input.ball_size.as_deref(), BallSize::parse),
            theme: coerce("theme", input.theme.as_deref(), ArenaTheme::parse),
            accelerate_on_hit: input.accelerate_on_hit.unwrap_or(Self::DEFAULT_ACCELERATE),
            dash_enabled: input.dash_enabled.unwrap_or(false),
            power_ups: coerce("power_ups", input.power_ups.as_deref(), PowerUpFrequency::parse),
        }
    }
}

fn coerce<T: Default>(field: &str, raw: Option<&str>, parse: fn(&str) -> Option<T>) -> T {
    match raw {
        None => T::default(),
        Some(value) => parse(value).unwrap_or_else(|| {
            warn!(field, value, "Unknown setting value, using default");
            T::default()
        }),
    }
}
