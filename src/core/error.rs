use thiserror::Error;

use crate::core::types::{ActivityId, BattleId, TerritoryId};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Activity not found: {0:?}")]
    ActivityNotFound(ActivityId),

    #[error("Territory not found: {0:?}")]
    TerritoryNotFound(TerritoryId),

    #[error("Battle not found: {0:?}")]
    BattleNotFound(BattleId),

    #[error("Malformed route encoding at byte {position}: {reason}")]
    Decode { position: usize, reason: String },

    #[error("Cannot allocate {allocated} km from a {total} km activity")]
    OverAllocation { allocated: f64, total: f64 },

    #[error("Contention on {entity}: lock retries exhausted")]
    Conflict { entity: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
