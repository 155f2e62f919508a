pub mod ledger;
pub mod state;

pub use ledger::{ContributionInput, ContributionOutcome, ControllerShare, ZoneLedger};
pub use state::{ControlChangeRecord, ZoneContribution, ZoneSnapshot, ZoneState};
