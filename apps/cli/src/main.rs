#![deny(warnings)]

//! Headless trainer CLI: loads the catalogs, plays a scenario on the virtual
//! clock, and prints the panels a browser view would render.

use anyhow::{anyhow, Result};
use data_loader::{load_catalogs, load_config};
use facility::{FacilityMap, InfoCard, Layer, Point2};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;
use trainer_core::{Alarm, DecisionPoint, Severity};
use trainer_runtime::{init_engine, EngineObserver, Outcome, Phase, TagStore};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    data: Option<PathBuf>,
    scenario: Option<String>,
    choose: Option<String>,
    advance_ms: Option<u64>,
    area: Option<String>,
    click: Option<Point2>,
    search: Option<String>,
    hide: Vec<Layer>,
    json: bool,
}

fn parse_point(s: &str) -> Option<Point2> {
    let (x, y) = s.split_once(',')?;
    Some(Point2::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Layer names match the view's toggle ids.
fn parse_layer(s: &str) -> Option<Layer> {
    match s {
        "z0" => Some(Layer::Zone0),
        "z1" => Some(Layer::Zone1),
        "z2" => Some(Layer::Zone2),
        "eq" => Some(Layer::Equipment),
        _ => None,
    }
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next().map(PathBuf::from),
            "--data" => args.data = it.next().map(PathBuf::from),
            "--scenario" => args.scenario = it.next(),
            "--choose" => args.choose = it.next(),
            "--advance" => args.advance_ms = it.next().and_then(|s| s.parse().ok()),
            "--area" => args.area = it.next(),
            "--click" => args.click = it.next().as_deref().and_then(parse_point),
            "--search" => args.search = it.next(),
            "--hide" => {
                if let Some(layer) = it.next().as_deref().and_then(parse_layer) {
                    args.hide.push(layer);
                }
            }
            "--json" => args.json = true,
            other => warn!(arg = other, "ignoring unknown argument"),
        }
    }
    args
}

/// Text rendering of engine callbacks.
struct ConsolePanel;

impl EngineObserver for ConsolePanel {
    fn on_tags_changed(&mut self, tags: &TagStore) {
        println!("-- Tags");
        for r in tags.readings() {
            println!("  {:<12} {:<36} {}", r.tag.as_str(), r.name, r.display);
        }
    }

    fn on_alarms_changed(&mut self, alarms: &[Alarm]) {
        println!("-- Alarms");
        if alarms.is_empty() {
            println!("  No active alarms.");
        }
        for a in alarms {
            let marker = if a.severity == Severity::High { "!!" } else { "  " };
            println!("{marker}{:<12} [{}] {}", a.code, a.severity, a.text);
        }
    }

    fn on_phase_changed(&mut self, _phase: Phase, status: &str) {
        println!("== {status}");
    }

    fn on_decision_ready(&mut self, decision: &DecisionPoint) {
        println!("-- Decision: {}", decision.question);
        println!("   Choose the safest and most technically correct action.");
        for o in &decision.options {
            println!("   {}) {}", o.id, o.text);
        }
    }

    fn on_choice_scored(&mut self, outcome: &Outcome) {
        println!("-- {}: {}", outcome.verdict, outcome.impact);
    }

    fn on_resolved(&mut self, outcome: &Outcome) {
        if !outcome.recovery_checklist.is_empty() {
            println!("-- Recovery Checklist");
            for (i, step) in outcome.recovery_checklist.iter().enumerate() {
                println!("   {}. {step}", i + 1);
            }
        }
        if let Some(caution) = &outcome.caution {
            println!("-- Caution: {caution}");
        }
        println!(
            "-- Score: {}/{}",
            outcome.score.correct, outcome.score.answered
        );
    }

    fn on_error(&mut self, message: &str) {
        println!("-- Scenario Error");
        println!("   {message}");
    }
}

fn print_map_queries(map: &FacilityMap, args: &Args) {
    if let Some(area) = &args.area {
        let info = map.area_info(area);
        println!("-- {}\n   {}", info.title, info.body);
    }
    if let Some(p) = args.click {
        match map.hit_test(p) {
            Some(item) => print!("-- Info\n{}", InfoCard::for_item(item)),
            None => println!("-- Nothing at ({}, {})", p.x, p.y),
        }
    }
    if let Some(q) = &args.search {
        println!("-- Equipment matching {q:?}");
        for e in map.search_equipment(q) {
            println!(
                "   {:<8} {} ({})",
                e.id,
                e.name,
                e.category.as_deref().unwrap_or("-")
            );
        }
    }
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("assets/config/trainer.yaml"));
    let config = load_config(&config_path)?;
    let data_dir = args.data.clone().unwrap_or_else(|| config.data_dir.clone());
    info!(config = %config_path.display(), data = %data_dir.display(), "starting trainer CLI");

    let catalogs = match load_catalogs(&data_dir, &config.features) {
        Ok(c) => c,
        Err(e) => {
            println!("== Load Error");
            println!("{}", e.operator_message());
            return Err(e.into());
        }
    };

    let mut map = catalogs.facility_map(&config.map)?;
    for layer in &args.hide {
        map.set_layer_visible(*layer, false);
    }
    print_map_queries(&map, &args);

    let mut engine = init_engine(&catalogs.tags, catalogs.scenarios, config.tag_policy)?;
    engine.add_observer(Box::new(ConsolePanel));
    ConsolePanel.on_tags_changed(engine.tags());

    let scenario = args
        .scenario
        .clone()
        .unwrap_or_else(|| config.default_scenario.clone());
    engine.start(&scenario)?;

    let fired = match args.advance_ms {
        Some(ms) => engine.tick(ms)?,
        None => engine.advance_to_end()?,
    };
    info!(fired, now_ms = engine.now_ms(), "timeline advanced");

    let outcome = match &args.choose {
        Some(option) => Some(engine.choose(option)?),
        None => None,
    };

    if args.json {
        let run = engine
            .run()
            .ok_or_else(|| anyhow!("no scenario run to report"))?;
        let summary = serde_json::json!({
            "scenario": run.scenario.id,
            "status": engine.status_label(),
            "elapsedMs": engine.now_ms().saturating_sub(run.started_at_ms),
            "tags": engine.tags().readings(),
            "alarms": engine.alarms().list(),
            "choices": run.choices,
            "outcome": outcome,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
