//! Hexterra - Entry Point
//!
//! Replays an activity feed (a JSON array of activities) through the
//! allocation engine and prints the affected zones and every control
//! transition, so a feed export can be inspected end to end.
//!
//! Usage: hexterra <activities.json> [config.toml]

use std::sync::Arc;

use hexterra::allocation::{Activity, AllocationEngine, AllocationReport};
use hexterra::core::config::EngineConfig;
use hexterra::core::error::Result;
use hexterra::spatial::SpatialIndex;
use hexterra::zone::ZoneLedger;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("hexterra=info")
        .init();

    let mut args = std::env::args().skip(1);
    let Some(feed_path) = args.next() else {
        eprintln!("Usage: hexterra <activities.json> [config.toml]");
        std::process::exit(2);
    };

    let config = match args.next() {
        Some(path) => EngineConfig::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    config.validate()?;

    let config = Arc::new(config);
    let spatial = Arc::new(SpatialIndex::new(&config)?);
    let ledger = Arc::new(ZoneLedger::new(Arc::clone(&config), Arc::clone(&spatial)));
    let engine = AllocationEngine::new(Arc::clone(&config), spatial, Arc::clone(&ledger));

    tracing::info!(feed = %feed_path, "replaying activity feed");

    let raw = std::fs::read_to_string(&feed_path)?;
    let activities: Vec<Activity> = serde_json::from_str(&raw)?;

    println!("=== HEXTERRA FEED REPLAY ===");
    println!("{} activities from {}", activities.len(), feed_path);
    println!();

    let mut rejected = 0usize;
    for activity in &activities {
        match engine.allocate(activity) {
            Ok(report) => print_report(activity, &report),
            Err(err) => {
                rejected += 1;
                println!("REJECTED {:?}: {}", activity.id, err);
            }
        }
    }

    println!();
    println!("=== SUMMARY ===");
    println!("Zones touched:     {}", ledger.zone_count());
    println!("Rejected feeds:    {}", rejected);

    let transitions = ledger.control_history(None, usize::MAX)?;
    println!("Control changes:   {}", transitions.len());
    for record in transitions.iter().rev() {
        match record.previous {
            Some(previous) => println!(
                "  {}  {:?} -> {:?}",
                record.cell, previous, record.new
            ),
            None => println!("  {}  neutral -> {:?}", record.cell, record.new),
        }
    }

    Ok(())
}

fn print_report(activity: &Activity, report: &AllocationReport) {
    println!(
        "{:?}  {:.1} km -> {} zone(s), {} base points",
        activity.id,
        activity.distance_km,
        report.affected_zones.len(),
        report.base_points
    );
    for zone in &report.affected_zones {
        let control = match zone.controlled_by_team {
            Some(team) if zone.control_changed => format!("CONTROL -> {team:?}"),
            Some(team) => format!("held by {team:?}"),
            None => "neutral".to_string(),
        };
        println!(
            "    {}  {:.2} km  {} pts  [{}]",
            zone.cell, zone.distance_km, zone.points, control
        );
    }
}
