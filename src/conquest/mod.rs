pub mod battle;
pub mod directory;
pub mod engine;
pub mod moves;
pub mod territory;

pub use battle::{Battle, BattleResolution, ResolvedBattle};
pub use directory::{InMemoryDirectory, PlayerDirectory};
pub use engine::{
    AttackPreview, BattleView, ConquestEngine, ControlView, MoveOutcome, Recommendation,
    Suggestion, SuggestionKind, SuggestionPriority, TerritoryDetail, TerritorySummary, UserImpact,
};
pub use moves::{ConquestHistoryEntry, MoveKind, TacticalMove};
pub use territory::{Territory, TerritoryClass, TerritoryControl, TerritoryKind, TerritoryState};
