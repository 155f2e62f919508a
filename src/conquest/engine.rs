//! Territorial conquest state machine
//!
//! Sits above the zone ledger: territories aggregate many zones, and
//! control of them shifts through continuous attack/defend/reinforce moves
//! rather than turns. Each territory's control, open battle, and pending
//! attack pressure live behind one mutex, so a tactical move is a single
//! transaction scoped to one territory (two for reinforcements, locked in
//! id order).

use std::sync::{Arc, Mutex, RwLock};

use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::conquest::battle::{Battle, BattleResolution, ResolvedBattle};
use crate::conquest::directory::PlayerDirectory;
use crate::conquest::moves::{ConquestHistoryEntry, MoveKind, TacticalMove};
use crate::conquest::territory::{Territory, TerritoryControl, TerritoryKind, TerritoryState};
use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, Result};
use crate::core::lock::lock_with_retry;
use crate::core::types::{ActivityId, BattleId, MoveId, TeamId, TerritoryId, UserId};
use crate::zone::{ControllerShare, ZoneLedger};

/// Units recommended when shoring up a disputed border
const SUGGESTED_BORDER_UNITS: u32 = 10;

/// Units recommended when a held territory is about to fall
const SUGGESTED_DEFENSE_UNITS: u32 = 15;

/// Battle progress past which a threat is ranked critical
const CRITICAL_PROGRESS_PCT: f64 = 50.0;

/// Preview recommendation bands
const PREVIEW_GO_PCT: f64 = 60.0;
const PREVIEW_RISKY_PCT: f64 = 40.0;

/// Qualitative attack outlook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recommendation {
    Go,
    Risky,
    Avoid,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Go => write!(f, "GO!"),
            Self::Risky => write!(f, "RISKY"),
            Self::Avoid => write!(f, "AVOID"),
        }
    }
}

/// Read-only view of an open battle
#[derive(Debug, Clone, Serialize)]
pub struct BattleView {
    pub id: BattleId,
    pub territory: TerritoryId,
    pub territory_name: String,
    pub attacker: TeamId,
    pub defender: Option<TeamId>,
    pub attacker_strength: f64,
    pub defender_strength: f64,
    pub progress: f64,
    pub opened_at: DateTime<Utc>,
}

/// Read-only view of a territory's control runtime
#[derive(Debug, Clone, Serialize)]
pub struct ControlView {
    pub controller: Option<TeamId>,
    pub units: u32,
    pub defense_bonus: f64,
    pub under_attack: bool,
    pub days_controlled: i64,
    pub state: TerritoryState,
}

/// One row of the strategic map
#[derive(Debug, Clone, Serialize)]
pub struct TerritorySummary {
    pub id: TerritoryId,
    pub name: String,
    pub kind: TerritoryKind,
    pub controller: Option<TeamId>,
    pub units: u32,
    pub under_attack: bool,
    pub days_controlled: i64,
    pub battle_progress: Option<f64>,
    pub strategic_value: i64,
}

/// Everything a map client needs about one territory
#[derive(Debug, Clone, Serialize)]
pub struct TerritoryDetail {
    pub territory: Territory,
    pub control: ControlView,
    pub battle: Option<BattleView>,
    pub cell_distribution: Vec<ControllerShare>,
    pub strategic_value: i64,
}

/// Dry-run of an attack, using the live battle constants
#[derive(Debug, Clone, Serialize)]
pub struct AttackPreview {
    pub territory: TerritoryId,
    pub territory_name: String,
    pub defender_units: u32,
    pub attack_units: u32,
    pub success_probability: f64,
    pub estimated_cells_conquered: usize,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    DefendBorder,
    DefendTerritory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SuggestionPriority {
    High,
    Critical,
}

/// One ranked strategic hint
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub priority: SuggestionPriority,
    pub territory: TerritoryId,
    pub reason: String,
    pub recommended_units: u32,
}

/// A user's footprint on the conquest map
#[derive(Debug, Clone, Serialize)]
pub struct UserImpact {
    pub total_moves: usize,
    pub critical_moves: usize,
    pub conquests_participated: usize,
    pub territories_impacted: usize,
    pub total_units_deployed: u64,
    pub total_km_allocated: f64,
    pub average_units_per_move: f64,
}

/// Result handed back for one executed move
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub record: TacticalMove,
    pub territory_state: TerritoryState,
    pub battle: Option<BattleView>,
    pub conquered: bool,
}

struct TerritoryRuntime {
    control: TerritoryControl,
    battle: Option<Battle>,
    /// Accumulated attack units per team, waiting to contest
    attack_pressure: AHashMap<TeamId, u32>,
}

struct TerritoryEntry {
    territory: Territory,
    runtime: Mutex<TerritoryRuntime>,
}

struct StepOutcome {
    state: TerritoryState,
    battle: Option<BattleView>,
    conquered: bool,
    progress_delta: f64,
}

/// The conquest engine
pub struct ConquestEngine {
    config: Arc<EngineConfig>,
    ledger: Arc<ZoneLedger>,
    directory: Arc<dyn PlayerDirectory>,
    territories: RwLock<AHashMap<TerritoryId, Arc<TerritoryEntry>>>,
    moves: Mutex<Vec<TacticalMove>>,
    conquests: Mutex<Vec<ConquestHistoryEntry>>,
    resolved_battles: Mutex<Vec<ResolvedBattle>>,
}

impl ConquestEngine {
    pub fn new(
        config: Arc<EngineConfig>,
        ledger: Arc<ZoneLedger>,
        directory: Arc<dyn PlayerDirectory>,
    ) -> Self {
        Self {
            config,
            ledger,
            directory,
            territories: RwLock::new(AHashMap::new()),
            moves: Mutex::new(Vec::new()),
            conquests: Mutex::new(Vec::new()),
            resolved_battles: Mutex::new(Vec::new()),
        }
    }

    /// Add a neutral territory during world setup
    pub fn register_territory(&self, territory: Territory) -> Result<()> {
        let control = TerritoryControl::neutral(self.config.base_defense_bonus);
        self.insert(territory, control)
    }

    /// Add a territory already garrisoned by a team
    pub fn register_controlled_territory(
        &self,
        territory: Territory,
        team: TeamId,
        units: u32,
    ) -> Result<()> {
        let control =
            TerritoryControl::held_by(team, units, self.config.base_defense_bonus, Utc::now());
        self.insert(territory, control)
    }

    /// Execute one tactical move backed by a slice of an activity.
    ///
    /// Validation happens before any lock is taken; the move itself is one
    /// transaction on the destination territory (plus the source, for
    /// reinforcements). Every accepted move lands in the immutable log.
    pub fn execute_move(
        &self,
        user: UserId,
        activity: ActivityId,
        kind: MoveKind,
        from: Option<TerritoryId>,
        to: TerritoryId,
        units: u32,
        km: f64,
    ) -> Result<MoveOutcome> {
        if units == 0 {
            return Err(EngineError::Validation("units must be positive".into()));
        }
        if !km.is_finite() || km <= 0.0 {
            return Err(EngineError::Validation(format!(
                "km ({km}) must be positive"
            )));
        }

        let owner = self
            .directory
            .activity_owner(activity)
            .ok_or(EngineError::ActivityNotFound(activity))?;
        if owner != user {
            // Someone else's activity is as good as no activity
            return Err(EngineError::ActivityNotFound(activity));
        }
        let team = self
            .directory
            .team_of(user)
            .ok_or_else(|| EngineError::Validation("mover does not belong to a team".into()))?;

        let now = Utc::now();
        let step = match kind {
            MoveKind::Attack => self.execute_attack(team, to, units, now)?,
            MoveKind::Defend => self.execute_defend(team, to, units, now)?,
            MoveKind::Reinforce => self.execute_reinforce(team, from, to, units)?,
        };

        let record = TacticalMove {
            id: MoveId::new(),
            user,
            team,
            activity,
            kind,
            from_territory: from,
            to_territory: to,
            units,
            km,
            was_critical: step.progress_delta.abs() > self.config.significant_move_pct,
            turned_tide: step.conquered,
            executed_at: now,
        };

        {
            let mut moves =
                lock_with_retry(&self.moves, self.config.lock_retry_attempts, "moves")?;
            moves.push(record.clone());
        }

        Ok(MoveOutcome {
            record,
            territory_state: step.state,
            battle: step.battle,
            conquered: step.conquered,
        })
    }

    /// Dry-run an attack without mutating anything.
    ///
    /// Uses the same strength formula and constants as `execute_move`, so
    /// the preview is predictive rather than illustrative.
    pub fn preview_attack(&self, territory: TerritoryId, units: u32) -> Result<AttackPreview> {
        if units == 0 {
            return Err(EngineError::Validation("units must be positive".into()));
        }
        let entry = self.entry(territory)?;

        let (defense, defender_units, controller) = {
            let runtime = lock_with_retry(
                &entry.runtime,
                self.config.lock_retry_attempts,
                "territory",
            )?;
            (
                runtime.control.effective_defense(&entry.territory, &self.config),
                runtime.control.units,
                runtime.control.controller,
            )
        };

        let success = if defense <= 0.0 {
            100.0
        } else {
            ((units as f64 / defense) * 100.0).min(100.0)
        };

        let distribution = self.ledger.controller_distribution(&entry.territory.cells)?;
        let controller_cells = distribution
            .iter()
            .find(|share| share.controller == controller)
            .map(|share| share.cells)
            .unwrap_or(0);
        let estimated_cells_conquered = ((controller_cells as f64) * success / 100.0) as usize;

        let recommendation = if success > PREVIEW_GO_PCT {
            Recommendation::Go
        } else if success >= PREVIEW_RISKY_PCT {
            Recommendation::Risky
        } else {
            Recommendation::Avoid
        };

        Ok(AttackPreview {
            territory,
            territory_name: entry.territory.name.clone(),
            defender_units,
            attack_units: units,
            success_probability: (success * 100.0).round() / 100.0,
            estimated_cells_conquered,
            recommendation,
        })
    }

    /// Ranked hints for where a user's next km matter most.
    ///
    /// Pure read-side aggregation: critical threats are held territories
    /// past the critical battle progress, high-priority ones are disputed
    /// borders of the user's team.
    pub fn strategic_suggestions(&self, user: UserId) -> Result<Vec<Suggestion>> {
        let Some(team) = self.directory.team_of(user) else {
            return Ok(Vec::new());
        };

        let by_id: AHashMap<TerritoryId, Arc<TerritoryEntry>> = {
            let territories = self.territories.read().unwrap_or_else(|e| e.into_inner());
            territories.clone()
        };

        let mut suggestions = Vec::new();
        let mut seen: AHashSet<(SuggestionKind, TerritoryId)> = AHashSet::new();

        for entry in by_id.values() {
            let (held, threatened) = {
                let runtime = lock_with_retry(
                    &entry.runtime,
                    self.config.lock_retry_attempts,
                    "territory",
                )?;
                (
                    runtime.control.controller == Some(team),
                    runtime
                        .battle
                        .as_ref()
                        .map(|battle| battle.progress() > CRITICAL_PROGRESS_PCT)
                        .unwrap_or(false),
                )
            };
            if !held {
                continue;
            }

            if threatened && seen.insert((SuggestionKind::DefendTerritory, entry.territory.id)) {
                suggestions.push(Suggestion {
                    kind: SuggestionKind::DefendTerritory,
                    priority: SuggestionPriority::Critical,
                    territory: entry.territory.id,
                    reason: format!("{} is about to fall", entry.territory.name),
                    recommended_units: SUGGESTED_DEFENSE_UNITS,
                });
            }

            for neighbor_id in &entry.territory.connected {
                let Some(neighbor) = by_id.get(neighbor_id) else {
                    continue;
                };
                let disputed_border = {
                    let runtime = lock_with_retry(
                        &neighbor.runtime,
                        self.config.lock_retry_attempts,
                        "territory",
                    )?;
                    runtime.control.controller == Some(team)
                        && (runtime.control.under_attack
                            || runtime.control.state == TerritoryState::Contested)
                };
                if disputed_border && seen.insert((SuggestionKind::DefendBorder, *neighbor_id)) {
                    suggestions.push(Suggestion {
                        kind: SuggestionKind::DefendBorder,
                        priority: SuggestionPriority::High,
                        territory: *neighbor_id,
                        reason: format!("border with {} in dispute", neighbor.territory.name),
                        recommended_units: SUGGESTED_BORDER_UNITS,
                    });
                }
            }
        }

        suggestions.sort_by_key(|suggestion| match suggestion.priority {
            SuggestionPriority::Critical => 0,
            SuggestionPriority::High => 1,
        });
        Ok(suggestions)
    }

    /// Full read model for one territory
    pub fn territory_detail(&self, id: TerritoryId) -> Result<TerritoryDetail> {
        let entry = self.entry(id)?;
        let now = Utc::now();

        let (control, battle) = {
            let runtime = lock_with_retry(
                &entry.runtime,
                self.config.lock_retry_attempts,
                "territory",
            )?;
            (
                control_view(&runtime.control, now),
                runtime
                    .battle
                    .as_ref()
                    .map(|battle| battle_view(&entry.territory.name, battle)),
            )
        };

        let cell_distribution = self.ledger.controller_distribution(&entry.territory.cells)?;

        Ok(TerritoryDetail {
            territory: entry.territory.clone(),
            control,
            battle,
            cell_distribution,
            strategic_value: entry.territory.strategic_value(),
        })
    }

    /// Map rows for all territories at one granularity, sorted by name
    pub fn world_map(&self, kind: TerritoryKind) -> Result<Vec<TerritorySummary>> {
        let now = Utc::now();
        let entries: Vec<Arc<TerritoryEntry>> = {
            let territories = self.territories.read().unwrap_or_else(|e| e.into_inner());
            territories.values().cloned().collect()
        };

        let mut rows = Vec::new();
        for entry in entries {
            if entry.territory.kind != kind {
                continue;
            }
            let runtime = lock_with_retry(
                &entry.runtime,
                self.config.lock_retry_attempts,
                "territory",
            )?;
            rows.push(TerritorySummary {
                id: entry.territory.id,
                name: entry.territory.name.clone(),
                kind: entry.territory.kind,
                controller: runtime.control.controller,
                units: runtime.control.units,
                under_attack: runtime.control.under_attack,
                days_controlled: runtime.control.days_controlled(now),
                battle_progress: runtime.battle.as_ref().map(|battle| battle.progress()),
                strategic_value: entry.territory.strategic_value(),
            });
        }
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    /// Open battles, newest first
    pub fn active_battles(&self, limit: usize) -> Result<Vec<BattleView>> {
        let entries: Vec<Arc<TerritoryEntry>> = {
            let territories = self.territories.read().unwrap_or_else(|e| e.into_inner());
            territories.values().cloned().collect()
        };

        let mut battles = Vec::new();
        for entry in entries {
            let runtime = lock_with_retry(
                &entry.runtime,
                self.config.lock_retry_attempts,
                "territory",
            )?;
            if let Some(battle) = &runtime.battle {
                battles.push(battle_view(&entry.territory.name, battle));
            }
        }
        battles.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        battles.truncate(limit);
        Ok(battles)
    }

    /// Conquest feed, newest first, optionally for one territory
    pub fn conquest_history(
        &self,
        territory: Option<TerritoryId>,
        limit: usize,
    ) -> Result<Vec<ConquestHistoryEntry>> {
        let conquests =
            lock_with_retry(&self.conquests, self.config.lock_retry_attempts, "conquests")?;
        Ok(conquests
            .iter()
            .rev()
            .filter(|entry| territory.map_or(true, |t| entry.territory == t))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Battles that have already closed, newest first
    pub fn resolved_battles(&self, limit: usize) -> Result<Vec<ResolvedBattle>> {
        let resolved = lock_with_retry(
            &self.resolved_battles,
            self.config.lock_retry_attempts,
            "battles",
        )?;
        Ok(resolved.iter().rev().take(limit).cloned().collect())
    }

    /// Summary of a user's moves across the map
    pub fn user_impact(&self, user: UserId) -> Result<UserImpact> {
        let moves = lock_with_retry(&self.moves, self.config.lock_retry_attempts, "moves")?;
        let mine: Vec<&TacticalMove> = moves.iter().filter(|m| m.user == user).collect();

        let territories: AHashSet<TerritoryId> =
            mine.iter().map(|m| m.to_territory).collect();
        let total_units: u64 = mine.iter().map(|m| m.units as u64).sum();
        let total_km: f64 = mine.iter().map(|m| m.km).sum();

        Ok(UserImpact {
            total_moves: mine.len(),
            critical_moves: mine.iter().filter(|m| m.was_critical).count(),
            conquests_participated: mine.iter().filter(|m| m.turned_tide).count(),
            territories_impacted: territories.len(),
            total_units_deployed: total_units,
            total_km_allocated: total_km,
            average_units_per_move: if mine.is_empty() {
                0.0
            } else {
                total_units as f64 / mine.len() as f64
            },
        })
    }

    fn execute_attack(
        &self,
        team: TeamId,
        to: TerritoryId,
        units: u32,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome> {
        let entry = self.entry(to)?;
        let mut guard =
            lock_with_retry(&entry.runtime, self.config.lock_retry_attempts, "territory")?;
        let runtime = &mut *guard;

        if runtime.control.controller == Some(team) {
            return Err(EngineError::Validation(format!(
                "team already controls '{}'",
                entry.territory.name
            )));
        }

        let progress_before = runtime
            .battle
            .as_ref()
            .map(|battle| battle.progress())
            .unwrap_or(0.0);

        let joins_open_battle = runtime
            .battle
            .as_ref()
            .map(|battle| battle.attacker == team)
            .unwrap_or(false);

        if joins_open_battle {
            if let Some(battle) = runtime.battle.as_mut() {
                battle.attacker_strength += units as f64;
            }
        } else if runtime.battle.is_some() {
            // A third team cannot join the open battle; its pressure
            // waits for the territory to settle.
            *runtime.attack_pressure.entry(team).or_insert(0) += units;
        } else {
            let pressure = {
                let massed = runtime.attack_pressure.entry(team).or_insert(0);
                *massed += units;
                *massed
            };
            let defense = runtime
                .control
                .effective_defense(&entry.territory, &self.config);
            if (pressure as f64) > self.config.contest_ratio * defense {
                tracing::info!(
                    territory = %entry.territory.name,
                    attacker = ?team,
                    defender = ?runtime.control.controller,
                    attacker_strength = pressure,
                    defender_strength = defense,
                    "battle opened"
                );
                runtime.battle = Some(Battle {
                    id: BattleId::new(),
                    territory: to,
                    attacker: team,
                    defender: runtime.control.controller,
                    attacker_strength: pressure as f64,
                    defender_strength: defense,
                    opened_at: now,
                });
                runtime.control.state = TerritoryState::Contested;
                runtime.control.under_attack = true;
            }
        }

        let conquered = runtime
            .battle
            .as_ref()
            .map(|battle| {
                battle.attacker == team
                    && battle.progress() >= self.config.conquest_threshold_pct
            })
            .unwrap_or(false);
        if conquered {
            self.resolve_conquest(&entry, runtime, now)?;
        }

        let progress_after = if conquered {
            100.0
        } else {
            runtime
                .battle
                .as_ref()
                .map(|battle| battle.progress())
                .unwrap_or(progress_before)
        };

        Ok(StepOutcome {
            state: runtime.control.state,
            battle: runtime
                .battle
                .as_ref()
                .map(|battle| battle_view(&entry.territory.name, battle)),
            conquered,
            progress_delta: progress_after - progress_before,
        })
    }

    fn execute_defend(
        &self,
        team: TeamId,
        to: TerritoryId,
        units: u32,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome> {
        let entry = self.entry(to)?;
        let mut guard =
            lock_with_retry(&entry.runtime, self.config.lock_retry_attempts, "territory")?;
        let runtime = &mut *guard;

        let holds_territory = runtime.control.controller == Some(team);
        let holds_battle_line = runtime
            .battle
            .as_ref()
            .map(|battle| battle.defender == Some(team))
            .unwrap_or(false);
        if !holds_territory && !holds_battle_line {
            return Err(EngineError::Validation(format!(
                "team does not hold '{}'",
                entry.territory.name
            )));
        }

        let progress_before = runtime
            .battle
            .as_ref()
            .map(|battle| battle.progress())
            .unwrap_or(0.0);

        runtime.control.units = runtime.control.units.saturating_add(units);

        let mut progress_after = progress_before;
        let mut resolution = None;
        if let Some(battle) = &mut runtime.battle {
            battle.defender_strength += units as f64;
            progress_after = battle.progress();
            if progress_after < self.config.recovery_threshold_pct {
                resolution = Some(
                    if battle.attacker_strength <= 0.0 && battle.defender_strength <= 0.0 {
                        BattleResolution::Collapsed
                    } else {
                        BattleResolution::Held
                    },
                );
            }
        }
        if let Some(resolution) = resolution {
            self.resolve_recovery(&entry, runtime, resolution, now)?;
        }

        Ok(StepOutcome {
            state: runtime.control.state,
            battle: runtime
                .battle
                .as_ref()
                .map(|battle| battle_view(&entry.territory.name, battle)),
            conquered: false,
            progress_delta: progress_after - progress_before,
        })
    }

    fn execute_reinforce(
        &self,
        team: TeamId,
        from: Option<TerritoryId>,
        to: TerritoryId,
        units: u32,
    ) -> Result<StepOutcome> {
        let from_id = from.ok_or_else(|| {
            EngineError::Validation("reinforce requires a source territory".into())
        })?;
        if from_id == to {
            return Err(EngineError::Validation(
                "source and destination are the same territory".into(),
            ));
        }

        let source = self.entry(from_id)?;
        let destination = self.entry(to)?;

        // Lock in id order so concurrent transfers cannot deadlock
        let (mut source_guard, mut destination_guard) = if from_id < to {
            let s =
                lock_with_retry(&source.runtime, self.config.lock_retry_attempts, "territory")?;
            let d = lock_with_retry(
                &destination.runtime,
                self.config.lock_retry_attempts,
                "territory",
            )?;
            (s, d)
        } else {
            let d = lock_with_retry(
                &destination.runtime,
                self.config.lock_retry_attempts,
                "territory",
            )?;
            let s =
                lock_with_retry(&source.runtime, self.config.lock_retry_attempts, "territory")?;
            (s, d)
        };

        if source_guard.control.controller != Some(team) {
            return Err(EngineError::Validation(format!(
                "team does not control source '{}'",
                source.territory.name
            )));
        }
        if destination_guard.control.controller != Some(team) {
            return Err(EngineError::Validation(format!(
                "team does not control destination '{}'",
                destination.territory.name
            )));
        }
        if source_guard.control.units < units {
            return Err(EngineError::Validation(format!(
                "source garrison holds {} units, cannot move {}",
                source_guard.control.units, units
            )));
        }

        source_guard.control.units -= units;
        destination_guard.control.units += units;
        tracing::debug!(
            from = %source.territory.name,
            to = %destination.territory.name,
            units,
            "garrison reinforced"
        );

        Ok(StepOutcome {
            state: destination_guard.control.state,
            battle: destination_guard
                .battle
                .as_ref()
                .map(|battle| battle_view(&destination.territory.name, battle)),
            conquered: false,
            progress_delta: 0.0,
        })
    }

    /// Close the open battle as a conquest: controller flips, the surviving
    /// attacker strength becomes the new garrison, and one history entry is
    /// appended.
    fn resolve_conquest(
        &self,
        entry: &TerritoryEntry,
        runtime: &mut TerritoryRuntime,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(battle) = runtime.battle.take() else {
            return Ok(());
        };
        let previous = runtime.control.controller;
        let attacker = battle.attacker;

        runtime.control.controller = Some(attacker);
        runtime.control.units = battle.attacker_strength.round() as u32;
        runtime.control.defense_bonus = self.config.base_defense_bonus;
        runtime.control.under_attack = false;
        runtime.control.controlled_since = Some(now);
        runtime.control.state = TerritoryState::Controlled;
        runtime.attack_pressure.clear();

        tracing::info!(
            territory = %entry.territory.name,
            previous = ?previous,
            new = ?attacker,
            "territory conquered"
        );

        {
            let mut conquests =
                lock_with_retry(&self.conquests, self.config.lock_retry_attempts, "conquests")?;
            conquests.push(ConquestHistoryEntry {
                territory: entry.territory.id,
                previous,
                new: attacker,
                conquered_at: now,
            });
        }
        {
            let mut resolved = lock_with_retry(
                &self.resolved_battles,
                self.config.lock_retry_attempts,
                "battles",
            )?;
            resolved.push(ResolvedBattle {
                battle,
                resolution: BattleResolution::Conquered,
                resolved_at: now,
            });
        }
        Ok(())
    }

    /// Close the open battle in the defender's favor (or collapse a
    /// zero-strength battle back to neutral).
    fn resolve_recovery(
        &self,
        entry: &TerritoryEntry,
        runtime: &mut TerritoryRuntime,
        resolution: BattleResolution,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(battle) = runtime.battle.take() else {
            return Ok(());
        };

        match resolution {
            BattleResolution::Collapsed => {
                runtime.control = TerritoryControl::neutral(self.config.base_defense_bonus);
            }
            _ => {
                runtime.control.state = TerritoryState::Controlled;
                runtime.control.under_attack = false;
            }
        }
        // The attacker's massed pressure was spent in the failed battle
        runtime.attack_pressure.remove(&battle.attacker);

        tracing::info!(
            territory = %entry.territory.name,
            attacker = ?battle.attacker,
            resolution = ?resolution,
            "battle repelled"
        );

        let mut resolved = lock_with_retry(
            &self.resolved_battles,
            self.config.lock_retry_attempts,
            "battles",
        )?;
        resolved.push(ResolvedBattle {
            battle,
            resolution,
            resolved_at: now,
        });
        Ok(())
    }

    fn insert(&self, territory: Territory, control: TerritoryControl) -> Result<()> {
        let mut territories = self.territories.write().unwrap_or_else(|e| e.into_inner());
        if territories.contains_key(&territory.id) {
            return Err(EngineError::Validation(format!(
                "territory '{}' already registered",
                territory.name
            )));
        }
        territories.insert(
            territory.id,
            Arc::new(TerritoryEntry {
                runtime: Mutex::new(TerritoryRuntime {
                    control,
                    battle: None,
                    attack_pressure: AHashMap::new(),
                }),
                territory,
            }),
        );
        Ok(())
    }

    fn entry(&self, id: TerritoryId) -> Result<Arc<TerritoryEntry>> {
        let territories = self.territories.read().unwrap_or_else(|e| e.into_inner());
        territories
            .get(&id)
            .cloned()
            .ok_or(EngineError::TerritoryNotFound(id))
    }
}

fn battle_view(territory_name: &str, battle: &Battle) -> BattleView {
    BattleView {
        id: battle.id,
        territory: battle.territory,
        territory_name: territory_name.to_string(),
        attacker: battle.attacker,
        defender: battle.defender,
        attacker_strength: battle.attacker_strength,
        defender_strength: battle.defender_strength,
        progress: battle.progress(),
        opened_at: battle.opened_at,
    }
}

fn control_view(control: &TerritoryControl, now: DateTime<Utc>) -> ControlView {
    ControlView {
        controller: control.controller,
        units: control.units,
        defense_bonus: control.defense_bonus,
        under_attack: control.under_attack,
        days_controlled: control.days_controlled(now),
        state: control.state,
    }
}
