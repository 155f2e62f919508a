//! Distance allocation engine
//!
//! Splits one activity's distance across the cells it touched and feeds
//! each share to the zone ledger. The km split is exact (equal parts by
//! cell count); all multipliers apply to points only. Each cell is its own
//! transaction: there is no cross-zone atomicity, and replaying the same
//! activity reproduces the same allocation.

use std::sync::Arc;

use ahash::AHashSet;
use h3o::CellIndex;
use rayon::prelude::*;
use serde::Serialize;

use crate::allocation::activity::Activity;
use crate::core::config::EngineConfig;
use crate::core::error::Result;
use crate::core::types::{ActivityId, TeamId, UserId};
use crate::spatial::SpatialIndex;
use crate::zone::{ContributionInput, ZoneLedger};

/// What one cell received from an activity
#[derive(Debug, Clone, Serialize)]
pub struct ZoneAllocation {
    pub cell: CellIndex,
    pub distance_km: f64,
    pub points: i64,
    pub control_changed: bool,
    pub controlled_by_team: Option<TeamId>,
    pub controlled_by_user: Option<UserId>,
}

/// Outcome of allocating one activity
#[derive(Debug, Clone, Serialize)]
pub struct AllocationReport {
    pub activity: ActivityId,
    /// Whole-activity points, earned even when no zone is touched
    pub base_points: i64,
    /// One entry per affected cell, mirroring resolution order
    pub affected_zones: Vec<ZoneAllocation>,
}

/// Resolves an activity to cells and distributes its distance
pub struct AllocationEngine {
    config: Arc<EngineConfig>,
    spatial: Arc<SpatialIndex>,
    ledger: Arc<ZoneLedger>,
}

impl AllocationEngine {
    pub fn new(
        config: Arc<EngineConfig>,
        spatial: Arc<SpatialIndex>,
        ledger: Arc<ZoneLedger>,
    ) -> Self {
        Self {
            config,
            spatial,
            ledger,
        }
    }

    /// Allocate one activity across the zones it touched.
    ///
    /// Cell resolution precedence: assigned cells (gym), decoded route,
    /// start coordinate, nothing. Per-cell transactions run independently
    /// and in parallel; the report mirrors the resolved cell order.
    pub fn allocate(&self, activity: &Activity) -> Result<AllocationReport> {
        activity.validate(&self.config)?;

        let cells = self.resolve_cells(activity)?;
        let base_points =
            self.scale_points(activity, activity.distance_km * self.config.points_per_km);

        if cells.is_empty() {
            tracing::debug!(activity = ?activity.id, "activity touched no zones");
            return Ok(AllocationReport {
                activity: activity.id,
                base_points,
                affected_zones: Vec::new(),
            });
        }

        let share = activity.distance_km / cells.len() as f64;
        let affected_zones = cells
            .par_iter()
            .map(|&cell| self.allocate_cell(activity, cell, share))
            .collect::<Result<Vec<ZoneAllocation>>>()?;

        tracing::debug!(
            activity = ?activity.id,
            cells = affected_zones.len(),
            km_per_cell = share,
            "activity allocated"
        );

        Ok(AllocationReport {
            activity: activity.id,
            base_points,
            affected_zones,
        })
    }

    fn allocate_cell(
        &self,
        activity: &Activity,
        cell: CellIndex,
        share: f64,
    ) -> Result<ZoneAllocation> {
        // Bonus multiplier is read before the contribution so POI zones
        // score correctly on their first ever touch.
        let zone = self.ledger.ensure_zone(cell)?;
        let points = self.scale_points(
            activity,
            share * self.config.points_per_km * zone.bonus_multiplier,
        );

        let outcome = self.ledger.record_contribution(
            cell,
            ContributionInput {
                activity: activity.id,
                user: activity.user,
                team: activity.team,
                distance_km: share,
                points,
                recorded_at: activity.recorded_at,
            },
        )?;

        Ok(ZoneAllocation {
            cell,
            distance_km: share,
            points,
            control_changed: outcome.control_changed,
            controlled_by_team: outcome.zone.controlled_by_team,
            controlled_by_user: outcome.zone.controlled_by_user,
        })
    }

    fn scale_points(&self, activity: &Activity, base: f64) -> i64 {
        let mut points = base;
        if activity.team.is_some() {
            points *= self.config.team_bonus;
        }
        if activity.is_gym {
            points *= self.config.gym_multiplier;
        }
        points as i64
    }

    /// Resolve which cells an activity touches, in deterministic order.
    fn resolve_cells(&self, activity: &Activity) -> Result<Vec<CellIndex>> {
        if activity.is_gym {
            let mut seen = AHashSet::new();
            let mut cells = Vec::new();
            for raw in &activity.assigned_cells {
                let cell = self.spatial.parse_cell(raw)?;
                if seen.insert(cell) {
                    cells.push(cell);
                }
            }
            return Ok(cells);
        }

        if let Some(route) = &activity.route {
            return self.spatial.decode_path(route);
        }

        if let Some(start) = activity.start {
            return Ok(vec![self.spatial.coordinate_to_cell(start.lat, start.lng)?]);
        }

        Ok(Vec::new())
    }
}
