#![deny(warnings)]

//! Headless Bevy HUD: engine callbacks feed an inbox resource, systems fold
//! them into the HUD state and apply map layer toggles to spawned map items.

use anyhow::Result;
use bevy_ecs::prelude::*;
use data_loader::{load_catalogs, load_config};
use facility::{to_world, FacilityMap, Layer, LayerVisibility};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trainer_core::{Alarm, DecisionPoint};
use trainer_runtime::{init_engine, EngineObserver, Outcome, Phase, TagReading, TagStore};

/// Virtual milliseconds advanced per HUD frame.
const FRAME_MS: u64 = 250;

#[derive(Clone, Debug)]
enum HudEvent {
    Tags(Vec<TagReading>),
    Alarms(Vec<Alarm>),
    Status(String),
    Decision(DecisionPoint),
    Scored(Outcome),
    Resolved(Outcome),
    Error(String),
}

/// Events queued by the engine observer, drained once per frame.
#[derive(Resource, Clone, Default)]
struct HudInbox(Arc<Mutex<Vec<HudEvent>>>);

impl HudInbox {
    /// Lock the queue; a panic elsewhere while holding it leaves the events intact.
    fn queue(&self) -> MutexGuard<'_, Vec<HudEvent>> {
        self.0.lock().unwrap_or_else(|poisoned| {
            warn!("hud inbox lock poisoned, recovering queued events");
            PoisonError::into_inner(poisoned)
        })
    }

    fn take(&self) -> Vec<HudEvent> {
        std::mem::take(&mut *self.queue())
    }
}

struct InboxObserver(HudInbox);

impl InboxObserver {
    fn push(&self, event: HudEvent) {
        self.0.queue().push(event);
    }
}

impl EngineObserver for InboxObserver {
    fn on_tags_changed(&mut self, tags: &TagStore) {
        self.push(HudEvent::Tags(tags.readings()));
    }

    fn on_alarms_changed(&mut self, alarms: &[Alarm]) {
        self.push(HudEvent::Alarms(alarms.to_vec()));
    }

    fn on_phase_changed(&mut self, _phase: Phase, status: &str) {
        self.push(HudEvent::Status(status.to_string()));
    }

    fn on_decision_ready(&mut self, decision: &DecisionPoint) {
        self.push(HudEvent::Decision(decision.clone()));
    }

    fn on_choice_scored(&mut self, outcome: &Outcome) {
        self.push(HudEvent::Scored(outcome.clone()));
    }

    fn on_resolved(&mut self, outcome: &Outcome) {
        self.push(HudEvent::Resolved(outcome.clone()));
    }

    fn on_error(&mut self, message: &str) {
        self.push(HudEvent::Error(message.to_string()));
    }
}

#[derive(Resource, Default)]
struct HudState {
    status: String,
    tags: Vec<TagReading>,
    alarms: Vec<Alarm>,
    decision: Option<DecisionPoint>,
    feedback: Option<String>,
    checklist: Vec<String>,
    error: Option<String>,
    frames: u32,
}

#[derive(Resource, Default)]
struct MapLayers(LayerVisibility);

#[derive(Component)]
struct MapItemId(String);

#[derive(Component, Clone, Copy)]
struct OnLayer(Layer);

#[derive(Component)]
struct GroundPos {
    x: f64,
    z: f64,
}

#[derive(Component)]
struct Visible(bool);

fn drain_inbox_system(inbox: Res<HudInbox>, mut state: ResMut<HudState>) {
    state.frames = state.frames.saturating_add(1);
    for event in inbox.take() {
        match event {
            HudEvent::Tags(tags) => state.tags = tags,
            HudEvent::Alarms(alarms) => state.alarms = alarms,
            HudEvent::Status(s) => state.status = s,
            HudEvent::Decision(d) => {
                state.decision = Some(d);
                state.feedback = None;
                state.checklist.clear();
                state.error = None;
            }
            HudEvent::Scored(o) => state.feedback = Some(format!("{}: {}", o.verdict, o.impact)),
            HudEvent::Resolved(o) => {
                state.decision = None;
                state.checklist = o.recovery_checklist;
                if let Some(caution) = o.caution {
                    state.checklist.push(caution);
                }
            }
            HudEvent::Error(e) => state.error = Some(e),
        }
    }
}

fn apply_layer_visibility_system(
    layers: Res<MapLayers>,
    mut items: Query<(&OnLayer, &mut Visible)>,
) {
    if !layers.is_changed() {
        return;
    }
    for (layer, mut visible) in items.iter_mut() {
        visible.0 = layers.0.is_visible(layer.0);
    }
}

fn spawn_map_items(world: &mut World, map: &FacilityMap, world_size: f64) {
    for zone in map.zones() {
        let (x, z) = zone
            .centroid()
            .map(|p| to_world(p, world_size))
            .unwrap_or_default();
        world.spawn((
            MapItemId(zone.id.clone()),
            OnLayer(zone.class().layer()),
            GroundPos { x, z },
            Visible(true),
        ));
    }
    for eq in map.equipment() {
        let (x, z) = to_world(eq.pos2d, world_size);
        world.spawn((
            MapItemId(eq.id.clone()),
            OnLayer(Layer::Equipment),
            GroundPos { x, z },
            Visible(true),
        ));
    }
}

fn build_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((drain_inbox_system, apply_layer_visibility_system));
    schedule
}

fn print_hud(world: &World) {
    let s = world.resource::<HudState>();
    println!("hud: frame={} status={}", s.frames, s.status);
    for t in &s.tags {
        println!("  {:<12} {}", t.tag.as_str(), t.display);
    }
    for a in &s.alarms {
        println!("  [{}] {} {}", a.severity, a.code, a.text);
    }
    if let Some(d) = &s.decision {
        println!("  ? {}", d.question);
    }
    if let Some(f) = &s.feedback {
        println!("  > {f}");
    }
    for step in &s.checklist {
        println!("  - {step}");
    }
    if let Some(e) = &s.error {
        println!("  ! {e}");
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut argv = std::env::args().skip(1);
    let config_path = argv
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("assets/config/trainer.yaml"));
    let choice = argv.next();

    let config = load_config(&config_path)?;
    let catalogs = load_catalogs(&config.data_dir, &config.features)?;
    let map = catalogs.facility_map(&config.map)?;

    let inbox = HudInbox::default();
    let mut engine = init_engine(&catalogs.tags, catalogs.scenarios, config.tag_policy)?;
    engine.add_observer(Box::new(InboxObserver(inbox.clone())));

    let mut world = World::new();
    world.insert_resource(HudState::default());
    world.insert_resource(MapLayers::default());
    world.insert_resource(inbox);
    spawn_map_items(&mut world, &map, config.map.world_size);
    let mut schedule = build_schedule();

    engine.start(&config.default_scenario)?;
    schedule.run(&mut world);
    while engine.pending_firings() > 0 {
        engine.tick(FRAME_MS)?;
        schedule.run(&mut world);
    }
    print_hud(&world);

    if let Some(option) = choice {
        match engine.choose(&option) {
            Ok(outcome) => info!(option = %option, correct = outcome.is_correct, "choice submitted"),
            Err(e) => warn!(error = %e, "choice rejected"),
        }
        schedule.run(&mut world);
        print_hud(&world);
    }

    let mut visible = world.query::<(&MapItemId, &GroundPos, &Visible)>();
    for (id, pos, v) in visible.iter(&world) {
        if v.0 {
            println!("map: {:<10} ({:.1}, {:.1})", id.0, pos.x, pos.z);
        }
    }
    Ok(())
}
