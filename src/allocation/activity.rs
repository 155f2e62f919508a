//! Activity ingestion record
//!
//! The shape every collaborator submits: who moved, how far, and where,
//! as either a GPS route, a bare start point, or (for gym sessions) an
//! explicit list of assigned zones. Validation happens once, here, before
//! anything is allocated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, Result};
use crate::core::types::{ActivityId, Coordinate, TeamId, UserId};

/// Kind of movement behind an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Run,
    Ride,
    Walk,
    Hike,
    Swim,
    Workout,
    Other,
}

/// A submitted distance activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub user: UserId,
    pub team: Option<TeamId>,
    pub kind: ActivityKind,
    pub distance_km: f64,

    /// Encoded route for GPS-tracked activities
    pub route: Option<String>,

    /// Start point fallback when no route was recorded
    pub start: Option<Coordinate>,

    /// Raw cell indexes for gym activities, validated at ingestion
    #[serde(default)]
    pub assigned_cells: Vec<String>,

    /// Non-GPS activity whose zones were assigned manually
    #[serde(default)]
    pub is_gym: bool,

    pub recorded_at: DateTime<Utc>,
}

impl Activity {
    /// Check the submission against the ingestion contract.
    pub fn validate(&self, config: &EngineConfig) -> Result<()> {
        if !self.distance_km.is_finite() || self.distance_km <= 0.0 {
            return Err(EngineError::Validation(format!(
                "distance_km ({}) must be positive",
                self.distance_km
            )));
        }
        if self.distance_km > config.max_activity_km {
            return Err(EngineError::Validation(format!(
                "distance_km ({}) exceeds the {} km ceiling",
                self.distance_km, config.max_activity_km
            )));
        }

        if self.is_gym && self.assigned_cells.is_empty() {
            return Err(EngineError::Validation(
                "gym activities must name their assigned zones".into(),
            ));
        }
        if !self.is_gym && !self.assigned_cells.is_empty() {
            return Err(EngineError::Validation(
                "only gym activities may assign zones explicitly".into(),
            ));
        }

        if let Some(start) = self.start {
            if !start.is_in_range() {
                return Err(EngineError::InvalidCoordinate {
                    lat: start.lat,
                    lng: start.lng,
                });
            }
        }

        Ok(())
    }
}
