//! Per-cell zone state
//!
//! One `ZoneState` exists for every grid cell ever touched by an activity.
//! Zones are created lazily and never deleted; the contribution log is
//! append-only and doubles as the audit record, with the rolling control
//! window computed as a view over it at recalculation time.

use chrono::{DateTime, Utc};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};

use crate::core::types::{ActivityId, Coordinate, TeamId, TerritoryId, UserId};

/// One recorded share of an activity inside a zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneContribution {
    pub activity: ActivityId,
    pub user: UserId,
    pub team: Option<TeamId>,
    pub distance_km: f64,
    pub points: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Mutable state of a single grid cell
///
/// Owned exclusively by the `ZoneLedger`; everything else sees snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneState {
    pub cell: CellIndex,
    pub center: Coordinate,

    // Geographic containment, assigned during world setup
    pub city: Option<TerritoryId>,
    pub region: Option<TerritoryId>,
    pub country: Option<TerritoryId>,

    /// Point-of-interest zones earn more than 1.0
    pub bonus_multiplier: f64,

    // Lifetime totals, bumped unconditionally on every contribution
    pub total_km: f64,
    pub total_activities: u64,

    // Control, derived only by recalculation
    pub controlled_by_team: Option<TeamId>,
    pub controlled_by_user: Option<UserId>,
    pub control_percentage: f64,

    pub(crate) contributions: Vec<ZoneContribution>,
}

impl ZoneState {
    pub fn new(cell: CellIndex, center: Coordinate) -> Self {
        Self {
            cell,
            center,
            city: None,
            region: None,
            country: None,
            bonus_multiplier: 1.0,
            total_km: 0.0,
            total_activities: 0,
            controlled_by_team: None,
            controlled_by_user: None,
            control_percentage: 0.0,
            contributions: Vec::new(),
        }
    }

    /// Full contribution history, oldest first
    pub fn contributions(&self) -> &[ZoneContribution] {
        &self.contributions
    }

    pub fn snapshot(&self) -> ZoneSnapshot {
        ZoneSnapshot {
            cell: self.cell,
            center: self.center,
            city: self.city,
            region: self.region,
            country: self.country,
            bonus_multiplier: self.bonus_multiplier,
            total_km: self.total_km,
            total_activities: self.total_activities,
            controlled_by_team: self.controlled_by_team,
            controlled_by_user: self.controlled_by_user,
            control_percentage: self.control_percentage,
        }
    }
}

/// Plain-data copy of a zone, safe to hand out of the ledger
#[derive(Debug, Clone, Serialize)]
pub struct ZoneSnapshot {
    pub cell: CellIndex,
    pub center: Coordinate,
    pub city: Option<TerritoryId>,
    pub region: Option<TerritoryId>,
    pub country: Option<TerritoryId>,
    pub bonus_multiplier: f64,
    pub total_km: f64,
    pub total_activities: u64,
    pub controlled_by_team: Option<TeamId>,
    pub controlled_by_user: Option<UserId>,
    pub control_percentage: f64,
}

/// Append-only log entry for a control transition
///
/// Written exactly once per transition; reaffirmations of the current
/// controller produce nothing.
#[derive(Debug, Clone, Serialize)]
pub struct ControlChangeRecord {
    pub cell: CellIndex,
    pub previous: Option<TeamId>,
    pub new: TeamId,
    pub changed_at: DateTime<Utc>,
}
