//! Territories - geographic aggregates of many zones
//!
//! Created during world setup and effectively static afterwards; only the
//! attached control runtime moves. Classification and connectivity feed
//! both strategic value and the defense calculation.

use chrono::{DateTime, Utc};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};

use crate::core::config::EngineConfig;
use crate::core::types::{Coordinate, TeamId, TerritoryId};

/// Granularity of a territory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerritoryKind {
    City,
    Region,
    Country,
    Global,
}

/// Special classification affecting defense and strategic value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerritoryClass {
    Ordinary,
    Capital,
    Fortress,
    StrategicPoint,
}

impl TerritoryClass {
    /// Defense multiplier applied on top of the garrison's own bonus
    pub fn defense_factor(&self) -> f64 {
        match self {
            Self::Ordinary => 1.0,
            Self::Capital => 1.25,
            Self::Fortress => 1.5,
            Self::StrategicPoint => 1.15,
        }
    }

    /// Flat contribution to strategic value
    pub fn strategic_bonus(&self) -> i64 {
        match self {
            Self::Ordinary => 0,
            Self::Capital => 20,
            Self::Fortress => 15,
            Self::StrategicPoint => 10,
        }
    }
}

/// Lifecycle of territory control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerritoryState {
    Neutral,
    Contested,
    Controlled,
}

/// A named aggregate of grid cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Territory {
    pub id: TerritoryId,
    pub name: String,
    pub kind: TerritoryKind,
    pub class: TerritoryClass,
    pub center: Coordinate,
    pub parent: Option<TerritoryId>,
    /// Adjacent territories, for the chain defense bonus
    pub connected: Vec<TerritoryId>,
    pub production_rate: f64,
    /// Member cells at the grid resolution
    pub cells: Vec<CellIndex>,
}

impl Territory {
    /// Strategic worth used by rankings and the conquest AI hints
    pub fn strategic_value(&self) -> i64 {
        10 + self.class.strategic_bonus()
            + 2 * self.connected.len() as i64
            + (self.production_rate * 5.0) as i64
    }
}

/// Mutable control state attached to a territory
#[derive(Debug, Clone, Serialize)]
pub struct TerritoryControl {
    pub controller: Option<TeamId>,
    pub units: u32,
    pub defense_bonus: f64,
    pub under_attack: bool,
    pub controlled_since: Option<DateTime<Utc>>,
    pub state: TerritoryState,
}

impl TerritoryControl {
    pub fn neutral(base_defense_bonus: f64) -> Self {
        Self {
            controller: None,
            units: 0,
            defense_bonus: base_defense_bonus,
            under_attack: false,
            controlled_since: None,
            state: TerritoryState::Neutral,
        }
    }

    pub fn held_by(team: TeamId, units: u32, base_defense_bonus: f64, since: DateTime<Utc>) -> Self {
        Self {
            controller: Some(team),
            units,
            defense_bonus: base_defense_bonus,
            under_attack: false,
            controlled_since: Some(since),
            state: TerritoryState::Controlled,
        }
    }

    /// Full days the current controller has held the territory
    pub fn days_controlled(&self, now: DateTime<Utc>) -> i64 {
        self.controlled_since
            .map(|since| (now - since).num_days().max(0))
            .unwrap_or(0)
    }

    /// Garrison strength an attacker actually has to overcome
    ///
    /// Units scaled by the garrison bonus, the territory classification,
    /// and one increment per connected friendly territory.
    pub fn effective_defense(&self, territory: &Territory, config: &EngineConfig) -> f64 {
        let connection_factor =
            1.0 + config.connection_defense_bonus * territory.connected.len() as f64;
        self.units as f64 * self.defense_bonus * territory.class.defense_factor() * connection_factor
    }
}
