//! Bots configuration as carried in hub `user_data` and supervisor requests.
//!
//! The producing side is loosely typed (booleans arrive as strings, counts as
//! floats), so normalisation happens exactly once, here, and the rest of the
//! code sees a plain struct.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hard ceiling on bots per room, regardless of configuration.
pub const MAX_BOTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mobility {
    Low,
    #[default]
    Medium,
    High,
}

impl Mobility {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Walk speed in metres per second.
    #[must_use]
    pub fn speed_mps(self) -> f32 {
        match self {
            Self::Low => 0.45,
            Self::Medium => 0.75,
            Self::High => 1.05,
        }
    }

    /// Half-open idle dwell range in milliseconds.
    #[must_use]
    pub fn idle_range_ms(self) -> (i64, i64) {
        match self {
            Self::Low => (8_000, 22_000),
            Self::Medium => (4_500, 14_000),
            Self::High => (2_500, 8_000),
        }
    }

    /// Idle delay applied to a freshly spawned bot.
    pub fn initial_idle_ms(self, rng: &mut impl Rng) -> i64 {
        match self {
            Self::Low => 2_000 + rng.gen_range(0..3_000),
            Self::Medium => 1_200 + rng.gen_range(0..1_300),
            Self::High => 800 + rng.gen_range(0..1_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BotsConfig {
    pub enabled: bool,
    pub count: u32,
    pub mobility: Mobility,
    pub chat_enabled: bool,
}

impl BotsConfig {
    /// Normalise a loose `bots` JSON object. Missing or malformed fields take
    /// their defaults; `count` is clamped to `[0, max_count]`.
    #[must_use]
    pub fn normalize(v: &Value, max_count: u32) -> Self {
        Self {
            enabled: truthy(v.get("enabled")),
            count: int_field(v.get("count")).clamp(0, i64::from(max_count)) as u32,
            mobility: v
                .get("mobility")
                .and_then(Value::as_str)
                .and_then(Mobility::parse)
                .unwrap_or_default(),
            chat_enabled: truthy(v.get("chat_enabled")),
        }
    }

    /// True when this config asks for at least one bot.
    #[must_use]
    pub fn wants_bots(&self) -> bool {
        self.enabled && self.count > 0
    }
}

fn truthy(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

fn int_field(v: Option<&Value>) -> i64 {
    match v {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}
