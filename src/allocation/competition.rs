//! Competition distance splitting
//!
//! The side path of allocation: a user divides one activity's km between
//! named competitions ("2 km for the city league, 3 km for the club cup").
//! Pure bookkeeping over caller-supplied competition records; zone state
//! is never involved, and nothing is committed if validation fails.

use serde::{Deserialize, Serialize};

use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, Result};
use crate::core::types::CompetitionId;

/// Caller-supplied view of a competition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionRef {
    pub id: CompetitionId,
    pub name: String,
    pub active: bool,
}

/// One requested slice of an activity's distance
#[derive(Debug, Clone)]
pub struct CompetitionRequest {
    pub competition: CompetitionRef,
    pub km: f64,
    /// Share of the activity; derived from km when not supplied
    pub percentage: Option<f64>,
}

/// One granted slice
#[derive(Debug, Clone, Serialize)]
pub struct CompetitionAllocation {
    pub competition: CompetitionId,
    pub name: String,
    pub km: f64,
    pub points: i64,
    pub percentage: f64,
}

/// Outcome of a competition split
#[derive(Debug, Clone, Serialize)]
pub struct CompetitionReport {
    pub total_allocated: f64,
    pub remaining_km: f64,
    pub entries: Vec<CompetitionAllocation>,
}

/// Split `total_km` of one activity across competitions.
///
/// The whole request set is validated before anything is granted: a single
/// bad entry or an over-allocated sum rejects the call with no partial
/// effects. Inactive competitions are skipped, not errors; their km still
/// counts as allocated (the user chose to spend it).
pub fn allocate_competitions(
    config: &EngineConfig,
    total_km: f64,
    requests: &[CompetitionRequest],
) -> Result<CompetitionReport> {
    if !total_km.is_finite() || total_km <= 0.0 {
        return Err(EngineError::Validation(format!(
            "activity total ({total_km} km) must be positive"
        )));
    }

    for request in requests {
        if !request.km.is_finite() || request.km <= 0.0 {
            return Err(EngineError::Validation(format!(
                "allocation for '{}' ({} km) must be positive",
                request.competition.name, request.km
            )));
        }
    }

    let total_allocated: f64 = requests.iter().map(|r| r.km).sum();
    if total_allocated > total_km + 1e-9 {
        return Err(EngineError::OverAllocation {
            allocated: total_allocated,
            total: total_km,
        });
    }

    let entries = requests
        .iter()
        .filter(|request| request.competition.active)
        .map(|request| {
            let percentage = request
                .percentage
                .unwrap_or((request.km / total_km) * 100.0);
            CompetitionAllocation {
                competition: request.competition.id,
                name: request.competition.name.clone(),
                km: request.km,
                points: (request.km * config.points_per_km) as i64,
                percentage: (percentage * 100.0).round() / 100.0,
            }
        })
        .collect();

    Ok(CompetitionReport {
        total_allocated,
        remaining_km: total_km - total_allocated,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn competition(name: &str, active: bool) -> CompetitionRef {
        CompetitionRef {
            id: CompetitionId::new(),
            name: name.to_string(),
            active,
        }
    }

    fn request(name: &str, km: f64) -> CompetitionRequest {
        CompetitionRequest {
            competition: competition(name, true),
            km,
            percentage: None,
        }
    }

    #[test]
    fn test_split_across_two_competitions() {
        let report = allocate_competitions(
            &EngineConfig::default(),
            5.0,
            &[request("Barcelona", 2.0), request("Badalona", 3.0)],
        )
        .unwrap();

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.total_allocated, 5.0);
        assert_eq!(report.remaining_km, 0.0);
        assert_eq!(report.entries[0].points, 20);
        assert_eq!(report.entries[0].percentage, 40.0);
        assert_eq!(report.entries[1].points, 30);
        assert_eq!(report.entries[1].percentage, 60.0);
    }

    #[test]
    fn test_over_allocation_is_rejected_whole() {
        let err = allocate_competitions(
            &EngineConfig::default(),
            5.0,
            &[request("Barcelona", 4.0), request("Badalona", 2.0)],
        )
        .unwrap_err();

        match err {
            EngineError::OverAllocation { allocated, total } => {
                assert_eq!(allocated, 6.0);
                assert_eq!(total, 5.0);
            }
            other => panic!("expected over-allocation, got {other:?}"),
        }
    }

    #[test]
    fn test_partial_allocation_reports_remainder() {
        let report =
            allocate_competitions(&EngineConfig::default(), 10.0, &[request("City League", 4.0)])
                .unwrap();

        assert_eq!(report.total_allocated, 4.0);
        assert_eq!(report.remaining_km, 6.0);
    }

    #[test]
    fn test_inactive_competition_is_skipped() {
        let closed = CompetitionRequest {
            competition: competition("Finished Cup", false),
            km: 2.0,
            percentage: None,
        };
        let report = allocate_competitions(
            &EngineConfig::default(),
            5.0,
            &[closed, request("City League", 3.0)],
        )
        .unwrap();

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].name, "City League");
        // Spent km counts even when its competition is closed
        assert_eq!(report.total_allocated, 5.0);
    }

    #[test]
    fn test_explicit_percentage_wins_over_derived() {
        let explicit = CompetitionRequest {
            competition: competition("City League", true),
            km: 2.5,
            percentage: Some(25.0),
        };
        let report =
            allocate_competitions(&EngineConfig::default(), 10.0, &[explicit]).unwrap();

        assert_eq!(report.entries[0].percentage, 25.0);
    }

    #[test]
    fn test_zero_km_entry_is_rejected() {
        let err = allocate_competitions(
            &EngineConfig::default(),
            5.0,
            &[request("City League", 0.0)],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
