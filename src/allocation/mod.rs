pub mod activity;
pub mod competition;
pub mod engine;

pub use activity::{Activity, ActivityKind};
pub use competition::{
    allocate_competitions, CompetitionAllocation, CompetitionRef, CompetitionReport,
    CompetitionRequest,
};
pub use engine::{AllocationEngine, AllocationReport, ZoneAllocation};
