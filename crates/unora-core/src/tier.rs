//! Subscription tier policy.
//!
//! Maps a subscription tier to its limits (connection slots, refresh
//! cooldown, nudge quota, free streak recoveries, reveal schedule) and
//! exposes the pure predicates the engine and request layer gate on.
//! The table is loaded once at startup and injected; nothing here mutates.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Plus,
    Pro,
}

impl Tier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Plus => "plus",
            Self::Pro => "pro",
        }
    }

    /// Parse a stored tier name, treating anything unrecognised as `free`.
    pub fn parse_or_free(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "plus" => Ok(Self::Plus),
            "pro" => Ok(Self::Pro),
            other => Err(Error::UnknownTier(other.to_string())),
        }
    }
}

/// Limits granted by a single tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Concurrent active connections allowed.
    pub connection_slots: i64,
    /// Minimum time between discovery refreshes (seconds).
    pub refresh_cooldown_secs: i64,
    /// Nudges a user may send per UTC day.
    pub nudges_per_day: i64,
    /// Streak recoveries that cost no credits.
    pub free_recoveries: i64,
    /// Reveals earned through streak milestones.
    pub earned_reveals: i64,
    /// Additional reveals that can be bought early.
    pub purchasable_reveals: i64,
    /// Streak days on which earned reveals unlock.
    pub reveal_days: Vec<i64>,
}

const HOUR: i64 = 60 * 60;

fn default_limits() -> HashMap<Tier, TierLimits> {
    HashMap::from([
        (
            Tier::Free,
            TierLimits {
                connection_slots: 1,
                refresh_cooldown_secs: 24 * HOUR,
                nudges_per_day: 1,
                free_recoveries: 0,
                earned_reveals: 2,
                purchasable_reveals: 3,
                reveal_days: vec![5, 12],
            },
        ),
        (
            Tier::Plus,
            TierLimits {
                connection_slots: 2,
                refresh_cooldown_secs: 12 * HOUR,
                nudges_per_day: 3,
                free_recoveries: 1,
                earned_reveals: 3,
                purchasable_reveals: 2,
                reveal_days: vec![4, 8, 12],
            },
        ),
        (
            Tier::Pro,
            TierLimits {
                connection_slots: 4,
                refresh_cooldown_secs: 6 * HOUR,
                nudges_per_day: 4,
                free_recoveries: 2,
                earned_reveals: 4,
                purchasable_reveals: 1,
                reveal_days: vec![3, 6, 9, 12],
            },
        ),
    ])
}

/// Immutable tier table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierPolicy {
    limits: HashMap<Tier, TierLimits>,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            limits: default_limits(),
        }
    }
}

impl TierPolicy {
    /// Build a policy from the defaults with per-tier overrides applied.
    pub fn with_overrides(overrides: HashMap<Tier, TierLimits>) -> Self {
        let mut policy = Self::default();
        policy.limits.extend(overrides);
        policy
    }

    /// Limits for a tier. A tier missing from the table gets the `free` limits.
    pub fn limits(&self, tier: Tier) -> &TierLimits {
        self.limits
            .get(&tier)
            .or_else(|| self.limits.get(&Tier::Free))
            .unwrap_or_else(|| fallback_free())
    }

    /// Whether a discovery refresh is allowed now.
    pub fn can_refresh(&self, tier: Tier, last_refresh_at: Option<i64>, now: i64) -> bool {
        last_refresh_at.is_none_or(|last| now - last >= self.limits(tier).refresh_cooldown_secs)
    }

    /// When the next refresh becomes available.
    pub fn refresh_available_at(&self, tier: Tier, last_refresh_at: i64) -> i64 {
        last_refresh_at + self.limits(tier).refresh_cooldown_secs
    }

    /// Whether another connection fits in the tier's slots.
    pub fn can_connect(&self, tier: Tier, active_connections: i64) -> bool {
        active_connections < self.limits(tier).connection_slots
    }

    /// Whether the active connection count has reached the slot capacity.
    pub fn at_capacity(&self, tier: Tier, active_connections: i64) -> bool {
        !self.can_connect(tier, active_connections)
    }

    pub fn has_free_recovery(&self, tier: Tier, recoveries_used: i64) -> bool {
        recoveries_used < self.limits(tier).free_recoveries
    }

    pub fn can_send_nudge(&self, tier: Tier, nudges_sent_today: i64) -> bool {
        nudges_sent_today < self.limits(tier).nudges_per_day
    }
}

fn fallback_free() -> &'static TierLimits {
    static FREE: std::sync::OnceLock<TierLimits> = std::sync::OnceLock::new();
    FREE.get_or_init(|| TierLimits {
        connection_slots: 1,
        refresh_cooldown_secs: 24 * HOUR,
        nudges_per_day: 1,
        free_recoveries: 0,
        earned_reveals: 2,
        purchasable_reveals: 3,
        reveal_days: vec![5, 12],
    })
}
