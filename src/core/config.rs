//! Engine configuration with documented constants
//!
//! All game-balance numbers are collected here with explanations of their
//! purpose and how they interact with each other. They are tuning knobs,
//! not correctness constants: every component receives this struct by
//! injection and never reads process-wide state.

use serde::Deserialize;

use crate::core::error::{EngineError, Result};

/// Configuration for the zone control and conquest engines
///
/// The defaults reproduce the original game balance. Changing them shifts
/// pacing (how fast zones flip, how long battles last), not correctness.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === SPATIAL SYSTEM ===
    /// H3 grid resolution for zone cells
    ///
    /// 8 = ~0.7 km2 (small neighborhoods)
    /// 9 = ~0.1 km2 (city blocks) - the tuned default
    /// 10 = ~0.015 km2 (very granular)
    pub resolution: u8,

    // === ZONE CONTROL ===
    /// Days of contribution history considered when recalculating control
    ///
    /// Older contributions stay on record for audit but stop counting
    /// toward control, so inactive teams lose their grip over time.
    pub control_window_days: i64,

    /// Minimum control percentage required to hold a zone
    ///
    /// A team must own at least this share of the windowed distance
    /// before any control decision is committed.
    pub control_threshold_pct: f64,

    /// Minimum raw km inside the window before a zone can be claimed
    ///
    /// Prevents a single short activity from flipping an empty zone.
    pub min_control_km: f64,

    /// Incumbency bonus applied to the current controller's distance
    ///
    /// At 1.2 a challenger needs 20% more distance than the incumbent
    /// to take the zone. Must be > 1.0.
    pub defense_multiplier: f64,

    // === SCORING ===
    /// Base points earned per km
    pub points_per_km: f64,

    /// Multiplier for contributors who belong to a team (> 1.0)
    pub team_bonus: f64,

    /// Penalty multiplier for non-GPS ("gym") activities (< 1.0)
    ///
    /// Gym distance still splits across its assigned zones in full;
    /// the penalty applies to points only.
    pub gym_multiplier: f64,

    /// Upper bound on a single activity's distance in km
    ///
    /// Submissions above this are rejected at ingestion.
    pub max_activity_km: f64,

    // === CONQUEST ===
    /// Attack pressure needed to contest a territory, as a fraction of
    /// the defender's effective strength
    ///
    /// At 0.5 an attacker must mass half the effective defense before a
    /// battle opens; below that, pressure accumulates silently.
    pub contest_ratio: f64,

    /// Conquest progress (attacker share of total strength, in percent)
    /// at which a battle resolves in the attacker's favor
    ///
    /// Must be above 50 so a conquest always requires clear superiority.
    pub conquest_threshold_pct: f64,

    /// Conquest progress below which a battle collapses back to the
    /// defender
    ///
    /// Must be below conquest_threshold_pct.
    pub recovery_threshold_pct: f64,

    /// Baseline defense bonus granted to any controlled territory
    pub base_defense_bonus: f64,

    /// Additional defense per connected friendly territory
    ///
    /// At 0.02, a territory with 5 connections defends 10% stronger.
    pub connection_defense_bonus: f64,

    /// Progress swing (percentage points) above which a single move is
    /// flagged as critical
    pub significant_move_pct: f64,

    // === CONCURRENCY ===
    /// Bounded attempts when acquiring a per-entity lock
    ///
    /// Contention past this budget surfaces as a transient conflict
    /// error instead of blocking indefinitely.
    pub lock_retry_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Spatial
            resolution: 9,

            // Zone control
            control_window_days: 30,
            control_threshold_pct: 50.0,
            min_control_km: 5.0,
            defense_multiplier: 1.2,

            // Scoring
            points_per_km: 10.0,
            team_bonus: 1.1,
            gym_multiplier: 0.8,
            max_activity_km: 500.0,

            // Conquest
            contest_ratio: 0.5,
            conquest_threshold_pct: 66.7,
            recovery_threshold_pct: 25.0,
            base_defense_bonus: 1.2,
            connection_defense_bonus: 0.02,
            significant_move_pct: 10.0,

            // Concurrency
            lock_retry_attempts: 256,
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML override and validate it
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.resolution > 15 {
            return Err(EngineError::Config(format!(
                "resolution ({}) must be an H3 resolution in 0..=15",
                self.resolution
            )));
        }

        if self.control_window_days <= 0 {
            return Err(EngineError::Config(
                "control_window_days must be positive".into(),
            ));
        }

        if !(0.0..=100.0).contains(&self.control_threshold_pct)
            || self.control_threshold_pct == 0.0
        {
            return Err(EngineError::Config(format!(
                "control_threshold_pct ({}) must be in (0, 100]",
                self.control_threshold_pct
            )));
        }

        if self.min_control_km <= 0.0 {
            return Err(EngineError::Config("min_control_km must be positive".into()));
        }

        if self.defense_multiplier <= 1.0 {
            return Err(EngineError::Config(format!(
                "defense_multiplier ({}) must exceed 1.0 or incumbency means nothing",
                self.defense_multiplier
            )));
        }

        if self.points_per_km <= 0.0 || self.max_activity_km <= 0.0 {
            return Err(EngineError::Config(
                "points_per_km and max_activity_km must be positive".into(),
            ));
        }

        if self.team_bonus <= 1.0 {
            return Err(EngineError::Config(format!(
                "team_bonus ({}) must exceed 1.0",
                self.team_bonus
            )));
        }

        if self.gym_multiplier <= 0.0 || self.gym_multiplier >= 1.0 {
            return Err(EngineError::Config(format!(
                "gym_multiplier ({}) must be in (0, 1)",
                self.gym_multiplier
            )));
        }

        if self.contest_ratio <= 0.0 {
            return Err(EngineError::Config("contest_ratio must be positive".into()));
        }

        if !(50.0..=100.0).contains(&self.conquest_threshold_pct)
            || self.conquest_threshold_pct == 50.0
        {
            return Err(EngineError::Config(format!(
                "conquest_threshold_pct ({}) must be in (50, 100]",
                self.conquest_threshold_pct
            )));
        }

        if self.recovery_threshold_pct < 0.0
            || self.recovery_threshold_pct >= self.conquest_threshold_pct
        {
            return Err(EngineError::Config(format!(
                "recovery_threshold_pct ({}) must be below conquest_threshold_pct ({})",
                self.recovery_threshold_pct, self.conquest_threshold_pct
            )));
        }

        if self.base_defense_bonus <= 0.0 || self.connection_defense_bonus < 0.0 {
            return Err(EngineError::Config(
                "defense bonus values must be positive".into(),
            ));
        }

        if self.significant_move_pct <= 0.0 {
            return Err(EngineError::Config(
                "significant_move_pct must be positive".into(),
            ));
        }

        if self.lock_retry_attempts == 0 {
            return Err(EngineError::Config(
                "lock_retry_attempts must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_battle_thresholds() {
        let config = EngineConfig {
            recovery_threshold_pct: 80.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_weak_defense_multiplier() {
        let config = EngineConfig {
            defense_multiplier: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_resolution() {
        let config = EngineConfig {
            resolution: 16,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_override_merges_with_defaults() {
        let config = EngineConfig::from_toml_str(
            "resolution = 8\nmin_control_km = 3.5\n",
        )
        .unwrap();
        assert_eq!(config.resolution, 8);
        assert_eq!(config.min_control_km, 3.5);
        // Untouched fields keep their defaults
        assert_eq!(config.control_window_days, 30);
    }

    #[test]
    fn test_toml_override_is_validated() {
        assert!(EngineConfig::from_toml_str("gym_multiplier = 1.5\n").is_err());
    }
}
