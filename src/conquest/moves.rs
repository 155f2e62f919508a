//! Tactical moves - the immutable record of every action taken
//!
//! One record per move, never mutated. `was_critical` marks moves that
//! alone swung conquest progress past the significance threshold;
//! `turned_tide` marks the move that closed a battle as a conquest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{ActivityId, MoveId, TeamId, TerritoryId, UserId};

/// The three continuous-update actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveKind {
    Attack,
    Defend,
    Reinforce,
}

/// Immutable log entry for one tactical move
#[derive(Debug, Clone, Serialize)]
pub struct TacticalMove {
    pub id: MoveId,
    pub user: UserId,
    pub team: TeamId,
    pub activity: ActivityId,
    pub kind: MoveKind,
    pub from_territory: Option<TerritoryId>,
    pub to_territory: TerritoryId,
    pub units: u32,
    pub km: f64,
    pub was_critical: bool,
    pub turned_tide: bool,
    pub executed_at: DateTime<Utc>,
}

/// Immutable record of a completed conquest
#[derive(Debug, Clone, Serialize)]
pub struct ConquestHistoryEntry {
    pub territory: TerritoryId,
    pub previous: Option<TeamId>,
    pub new: TeamId,
    pub conquered_at: DateTime<Utc>,
}
