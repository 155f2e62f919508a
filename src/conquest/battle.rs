//! Battle state for contested territories
//!
//! A battle opens when attack pressure contests a territory and closes when
//! conquest progress crosses the conquest threshold (attacker wins) or
//! falls back under the recovery threshold (defender holds). At most one
//! battle is open per territory at a time.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::types::{BattleId, TeamId, TerritoryId};

/// An open battle between an attacker and the current controller
#[derive(Debug, Clone, Serialize)]
pub struct Battle {
    pub id: BattleId,
    pub territory: TerritoryId,
    pub attacker: TeamId,
    /// None when the territory was neutral at contest time
    pub defender: Option<TeamId>,
    pub attacker_strength: f64,
    pub defender_strength: f64,
    pub opened_at: DateTime<Utc>,
}

impl Battle {
    /// Conquest progress: the attacker's share of total strength, 0..=100
    pub fn progress(&self) -> f64 {
        let total = self.attacker_strength + self.defender_strength;
        if total <= 0.0 {
            0.0
        } else {
            ((self.attacker_strength / total) * 100.0).min(100.0)
        }
    }
}

/// How a battle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleResolution {
    /// Attacker crossed the conquest threshold and took the territory
    Conquered,
    /// Defender pushed progress back under the recovery threshold
    Held,
    /// Both sides at zero strength; the territory reverts to neutral
    Collapsed,
}

/// A closed battle kept for the record
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedBattle {
    pub battle: Battle,
    pub resolution: BattleResolution,
    pub resolved_at: DateTime<Utc>,
}
