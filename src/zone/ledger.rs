//! Zone control ledger
//!
//! Maintains, per cell, a time-windowed view of who is moving through it
//! and derives a controller from that window. Each zone sits behind its own
//! mutex: contention on one cell never serializes writers to another, and
//! every `record_contribution` call is one transaction scoped to one zone.

use std::cmp::Reverse;
use std::sync::{Arc, Mutex, RwLock};

use ahash::AHashMap;
use chrono::{DateTime, Duration, Utc};
use h3o::CellIndex;
use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, Result};
use crate::core::lock::lock_with_retry;
use crate::core::types::{ActivityId, TeamId, TerritoryId, UserId};
use crate::spatial::SpatialIndex;
use crate::zone::state::{ControlChangeRecord, ZoneContribution, ZoneSnapshot, ZoneState};

/// One allocation share arriving at a zone
#[derive(Debug, Clone)]
pub struct ContributionInput {
    pub activity: ActivityId,
    pub user: UserId,
    pub team: Option<TeamId>,
    pub distance_km: f64,
    pub points: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Result of recording a contribution (or replaying a recalculation)
#[derive(Debug, Clone)]
pub struct ContributionOutcome {
    pub zone: ZoneSnapshot,
    pub control_changed: bool,
}

/// How the cells of some area split between controllers
#[derive(Debug, Clone, Serialize)]
pub struct ControllerShare {
    pub controller: Option<TeamId>,
    pub cells: usize,
    pub percentage: f64,
}

/// Ledger of all zones ever touched
pub struct ZoneLedger {
    config: Arc<EngineConfig>,
    spatial: Arc<SpatialIndex>,
    zones: RwLock<AHashMap<CellIndex, Arc<Mutex<ZoneState>>>>,
    history: Mutex<Vec<ControlChangeRecord>>,
}

impl ZoneLedger {
    pub fn new(config: Arc<EngineConfig>, spatial: Arc<SpatialIndex>) -> Self {
        Self {
            config,
            spatial,
            zones: RwLock::new(AHashMap::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Record one contribution and synchronously recalculate control.
    ///
    /// Lifetime totals always move; the control decision only changes when
    /// the windowed distribution says so. Returns the updated zone and
    /// whether its controller transitioned.
    pub fn record_contribution(
        &self,
        cell: CellIndex,
        input: ContributionInput,
    ) -> Result<ContributionOutcome> {
        if !input.distance_km.is_finite() || input.distance_km <= 0.0 {
            return Err(EngineError::Validation(format!(
                "contribution distance ({}) must be positive",
                input.distance_km
            )));
        }

        let now = Utc::now();
        let entry = self.entry(cell);
        let mut zone = lock_with_retry(&entry, self.config.lock_retry_attempts, "zone")?;

        zone.total_km += input.distance_km;
        zone.total_activities += 1;
        zone.contributions.push(ZoneContribution {
            activity: input.activity,
            user: input.user,
            team: input.team,
            distance_km: input.distance_km,
            points: input.points,
            recorded_at: input.recorded_at,
        });

        let previous = zone.controlled_by_team;
        recalculate_at(&mut zone, &self.config, now);
        let control_changed = zone.controlled_by_team != previous;
        let new_controller = zone.controlled_by_team;
        let snapshot = zone.snapshot();
        drop(zone);

        if control_changed {
            if let Some(new_team) = new_controller {
                tracing::info!(
                    cell = %cell,
                    previous = ?previous,
                    new = ?new_team,
                    "zone control changed"
                );
                self.append_history(ControlChangeRecord {
                    cell,
                    previous,
                    new: new_team,
                    changed_at: now,
                })?;
            }
        } else {
            tracing::debug!(cell = %cell, "zone recalculated, control unchanged");
        }

        Ok(ContributionOutcome {
            zone: snapshot,
            control_changed,
        })
    }

    /// Replay the control recalculation with no new contribution.
    ///
    /// Safe to repeat after crash recovery: the window is recomputed from
    /// the contribution log, so identical inputs give identical outputs.
    pub fn recalculate(&self, cell: CellIndex) -> Result<ContributionOutcome> {
        let now = Utc::now();
        let entry = self.entry(cell);
        let mut zone = lock_with_retry(&entry, self.config.lock_retry_attempts, "zone")?;

        let previous = zone.controlled_by_team;
        recalculate_at(&mut zone, &self.config, now);
        let control_changed = zone.controlled_by_team != previous;
        let new_controller = zone.controlled_by_team;
        let snapshot = zone.snapshot();
        drop(zone);

        if control_changed {
            if let Some(new_team) = new_controller {
                self.append_history(ControlChangeRecord {
                    cell,
                    previous,
                    new: new_team,
                    changed_at: now,
                })?;
            }
        }

        Ok(ContributionOutcome {
            zone: snapshot,
            control_changed,
        })
    }

    /// Snapshot of the zone for a cell, creating it lazily.
    ///
    /// The allocation engine reads the bonus multiplier through this before
    /// computing points.
    pub fn ensure_zone(&self, cell: CellIndex) -> Result<ZoneSnapshot> {
        let entry = self.entry(cell);
        let zone = lock_with_retry(&entry, self.config.lock_retry_attempts, "zone")?;
        Ok(zone.snapshot())
    }

    /// Snapshot of an existing zone, if the cell was ever touched
    pub fn zone(&self, cell: CellIndex) -> Result<Option<ZoneSnapshot>> {
        let entry = {
            let zones = self.zones.read().unwrap_or_else(|e| e.into_inner());
            zones.get(&cell).cloned()
        };
        match entry {
            Some(entry) => {
                let zone = lock_with_retry(&entry, self.config.lock_retry_attempts, "zone")?;
                Ok(Some(zone.snapshot()))
            }
            None => Ok(None),
        }
    }

    /// Mark a cell as a point-of-interest zone with a points bonus
    pub fn set_bonus_multiplier(&self, cell: CellIndex, multiplier: f64) -> Result<()> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(EngineError::Validation(format!(
                "bonus multiplier ({multiplier}) must be positive"
            )));
        }
        let entry = self.entry(cell);
        let mut zone = lock_with_retry(&entry, self.config.lock_retry_attempts, "zone")?;
        zone.bonus_multiplier = multiplier;
        Ok(())
    }

    /// Attach geographic containment references to a cell
    pub fn set_containment(
        &self,
        cell: CellIndex,
        city: Option<TerritoryId>,
        region: Option<TerritoryId>,
        country: Option<TerritoryId>,
    ) -> Result<()> {
        let entry = self.entry(cell);
        let mut zone = lock_with_retry(&entry, self.config.lock_retry_attempts, "zone")?;
        zone.city = city;
        zone.region = region;
        zone.country = country;
        Ok(())
    }

    /// Zones currently held by a team
    pub fn zones_controlled_by_team(&self, team: TeamId) -> Result<Vec<ZoneSnapshot>> {
        self.collect_zones(|zone| zone.controlled_by_team == Some(team))
    }

    /// Zones currently attributed to a user as top contributor
    pub fn zones_controlled_by_user(&self, user: UserId) -> Result<Vec<ZoneSnapshot>> {
        self.collect_zones(|zone| zone.controlled_by_user == Some(user))
    }

    /// Existing zones within a radius of a point
    pub fn zones_in_area(
        &self,
        center_lat: f64,
        center_lng: f64,
        radius_km: f64,
    ) -> Result<Vec<ZoneSnapshot>> {
        let cells = self
            .spatial
            .cells_in_radius(center_lat, center_lng, radius_km)?;
        let mut found = Vec::new();
        for cell in cells {
            if let Some(snapshot) = self.zone(cell)? {
                found.push(snapshot);
            }
        }
        Ok(found)
    }

    /// Control transitions, newest first, optionally for a single cell
    pub fn control_history(
        &self,
        cell: Option<CellIndex>,
        limit: usize,
    ) -> Result<Vec<ControlChangeRecord>> {
        let history = lock_with_retry(&self.history, self.config.lock_retry_attempts, "history")?;
        Ok(history
            .iter()
            .rev()
            .filter(|record| cell.map_or(true, |c| record.cell == c))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Per-controller cell counts over a set of cells (untouched cells are
    /// skipped; neutral zones report under `None`).
    pub fn controller_distribution(&self, cells: &[CellIndex]) -> Result<Vec<ControllerShare>> {
        let mut counts: AHashMap<Option<TeamId>, usize> = AHashMap::new();
        let mut total = 0usize;
        for &cell in cells {
            if let Some(snapshot) = self.zone(cell)? {
                *counts.entry(snapshot.controlled_by_team).or_insert(0) += 1;
                total += 1;
            }
        }

        let mut shares: Vec<ControllerShare> = counts
            .into_iter()
            .map(|(controller, cells)| ControllerShare {
                controller,
                cells,
                percentage: if total > 0 {
                    ((cells as f64 / total as f64) * 10_000.0).round() / 100.0
                } else {
                    0.0
                },
            })
            .collect();
        shares.sort_by_key(|share| (Reverse(share.cells), share.controller));
        Ok(shares)
    }

    /// Number of zones ever touched
    pub fn zone_count(&self) -> usize {
        self.zones.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn append_history(&self, record: ControlChangeRecord) -> Result<()> {
        let mut history =
            lock_with_retry(&self.history, self.config.lock_retry_attempts, "history")?;
        history.push(record);
        Ok(())
    }

    fn entry(&self, cell: CellIndex) -> Arc<Mutex<ZoneState>> {
        {
            let zones = self.zones.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = zones.get(&cell) {
                return Arc::clone(entry);
            }
        }

        // Geometry is computed before taking the write lock; the lock is
        // held only for the map insertion.
        let center = self.spatial.cell_center(cell);
        let mut zones = self.zones.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            zones
                .entry(cell)
                .or_insert_with(|| Arc::new(Mutex::new(ZoneState::new(cell, center)))),
        )
    }

    fn collect_zones<F>(&self, keep: F) -> Result<Vec<ZoneSnapshot>>
    where
        F: Fn(&ZoneSnapshot) -> bool,
    {
        let entries: Vec<Arc<Mutex<ZoneState>>> = {
            let zones = self.zones.read().unwrap_or_else(|e| e.into_inner());
            zones.values().cloned().collect()
        };

        let mut found = Vec::new();
        for entry in entries {
            let zone = lock_with_retry(&entry, self.config.lock_retry_attempts, "zone")?;
            let snapshot = zone.snapshot();
            if keep(&snapshot) {
                found.push(snapshot);
            }
        }
        Ok(found)
    }
}

/// Derive the controller from the contribution window ending at `now`.
///
/// The effective strength of the incumbent is boosted by the defense
/// multiplier during candidate selection, so a challenger must beat the
/// boosted figure, not just the raw one. Ties resolve to the smallest team
/// id. A decision commits only above the control threshold with at least
/// the minimum raw distance; otherwise the zone is left exactly as it was.
///
/// Idempotent: rerunning with the same window leaves the zone unchanged.
fn recalculate_at(zone: &mut ZoneState, config: &EngineConfig, now: DateTime<Utc>) {
    let cutoff = now - Duration::days(config.control_window_days);

    let mut team_km: AHashMap<TeamId, f64> = AHashMap::new();
    let mut member_km: AHashMap<(TeamId, UserId), f64> = AHashMap::new();
    for contribution in zone
        .contributions
        .iter()
        .filter(|c| c.recorded_at >= cutoff)
    {
        if let Some(team) = contribution.team {
            *team_km.entry(team).or_insert(0.0) += contribution.distance_km;
            *member_km.entry((team, contribution.user)).or_insert(0.0) +=
                contribution.distance_km;
        }
    }

    let total: f64 = team_km.values().sum();
    if total <= 0.0 {
        return;
    }

    let incumbent = zone.controlled_by_team;
    let Some((candidate, raw_km, effective_km)) = team_km
        .iter()
        .map(|(&team, &km)| {
            let effective = if Some(team) == incumbent {
                km * config.defense_multiplier
            } else {
                km
            };
            (team, km, effective)
        })
        .max_by_key(|&(team, _, effective)| (OrderedFloat(effective), Reverse(team)))
    else {
        return;
    };

    let percentage = ((effective_km / total) * 100.0).min(100.0);
    if percentage >= config.control_threshold_pct && raw_km >= config.min_control_km {
        zone.controlled_by_team = Some(candidate);
        zone.control_percentage = (percentage * 100.0).round() / 100.0;
        zone.controlled_by_user = member_km
            .iter()
            .filter(|((team, _), _)| *team == candidate)
            .max_by_key(|((_, user), km)| (OrderedFloat(**km), Reverse(*user)))
            .map(|((_, user), _)| *user);
    }
}
