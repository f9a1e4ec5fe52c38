use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use zone_encounter_server::constants::TICK_MS;
use zone_encounter_server::engine::InstanceEngine;
use zone_encounter_server::server_utils::init_tracing;
use zone_encounter_server::types::{EncounterState, EntityId, InstanceEvent, Team};
use zone_encounter_server::world::ActorCommand;
use zone_encounter_server::zones::black_temple::{
    ILLIDARI_COUNCIL, NPC_COUNCIL_VOICE, NPC_GATHIOS, NPC_ILLIDARI_COUNCIL, NPC_MALANDE,
    NPC_VERAS, NPC_ZEREVOR,
};
use zone_encounter_server::zones::razorfen_downs::{
    BOSS_TUTEN_KASH, DATA_GONG_WAVES, GO_GONG, NPC_TOMB_FIEND, NPC_TOMB_REAVER, NPC_TUTEN_KASH,
};
use zone_encounter_server::zones::shadowfang_keep::{
    ACTION_SPAWN_CRAZED, DATA_ASHBURY, DATA_CROWN, DATA_GODFREY, DATA_VALDEN,
    NPC_APOTHECARY_HUMMEL,
};
use zone_encounter_server::zones::ZoneRegistry;

const SCENARIO_NAMES: [&str; 5] = [
    "council-cascade",
    "council-refusal",
    "save-reload",
    "gong-waves",
    "crown-event",
];
const COUNCIL_MEMBER_HEALTH: i64 = 1_500_000;
/// Ticks a scenario may run before it is reported as stuck.
const TICK_SAFETY_LIMIT: u64 = 20 * 60 * 20;

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs scripted zone scenarios headlessly")]
struct Cli {
    /// One of the built-in scenario names, or `all`.
    #[arg(long, default_value = "all")]
    scenario: String,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u64,
    zone: String,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "finalSave")]
    final_save: String,
    #[serde(rename = "eventCounts")]
    event_counts: BTreeMap<String, usize>,
    #[serde(rename = "commandCount")]
    command_count: usize,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    scenarios: Vec<ScenarioResultLine>,
}

/// Bookkeeping shared by every scenario: drains the engine after each call
/// and records what it saw.
struct ScenarioRun {
    name: &'static str,
    seed: u64,
    engine: InstanceEngine,
    event_counts: BTreeMap<String, usize>,
    commands: Vec<ActorCommand>,
    anomalies: Vec<String>,
    anomaly_records: Vec<AnomalyRecord>,
    anomaly_seen: HashSet<String>,
}

impl ScenarioRun {
    fn new(name: &'static str, zone: &str, seed: u64) -> Result<Self, String> {
        let engine = InstanceEngine::from_registry(&ZoneRegistry::with_builtin_zones(), zone, 1, seed)
            .map_err(|error| error.to_string())?;
        Ok(Self {
            name,
            seed,
            engine,
            event_counts: BTreeMap::new(),
            commands: Vec::new(),
            anomalies: Vec::new(),
            anomaly_records: Vec::new(),
            anomaly_seen: HashSet::new(),
        })
    }

    fn step(&mut self) {
        self.engine.step(TICK_MS);
        self.drain();
    }

    fn run_for(&mut self, ms: u64) {
        for _ in 0..ms / TICK_MS {
            self.step();
        }
    }

    fn drain(&mut self) {
        for event in self.engine.drain_events() {
            *self.event_counts.entry(event_kind(&event)).or_insert(0) += 1;
        }
        self.commands.extend(self.engine.drain_commands());
    }

    fn expect(&mut self, condition: bool, message: impl Into<String>) {
        if !condition {
            let message = message.into();
            self.anomaly_records.push(AnomalyRecord {
                tick: self.engine.tick(),
                message: message.clone(),
            });
            if self.anomaly_seen.insert(message.clone()) {
                self.anomalies.push(message);
            }
        }
    }

    fn count_events(&self, kind: &str) -> usize {
        self.event_counts.get(kind).copied().unwrap_or(0)
    }

    fn finish(mut self) -> (ScenarioResultLine, Vec<AnomalyRecord>) {
        self.drain();
        let line = ScenarioResultLine {
            scenario: self.name.to_string(),
            seed: self.seed,
            zone: self.engine.definition().name.to_string(),
            duration_ms: self.engine.tick() * TICK_MS,
            final_save: self.engine.save(),
            event_counts: self.event_counts,
            command_count: self.commands.len(),
            anomalies: self.anomalies,
        };
        (line, self.anomaly_records)
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let seed = cli.seed.unwrap_or_else(now_ms);
    let started_at_ms = now_ms();
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| default_run_id(seed, started_at_ms));

    let names = match resolve_scenarios(&cli.scenario) {
        Ok(names) => names,
        Err(message) => {
            error!(run_id = %run_id, scenario = %cli.scenario, %message, "unknown_scenario");
            std::process::exit(2);
        }
    };

    let mut results = Vec::new();
    let mut anomaly_count = 0usize;
    for (offset, name) in names.into_iter().enumerate() {
        let scenario_seed = seed.wrapping_add(offset as u64);
        info!(run_id = %run_id, scenario = name, seed = scenario_seed, "scenario_started");
        let (line, records) = match run_scenario(name, scenario_seed) {
            Ok(outcome) => outcome,
            Err(message) => {
                error!(run_id = %run_id, scenario = name, %message, "scenario_setup_failed");
                std::process::exit(2);
            }
        };
        for record in &records {
            warn!(run_id = %run_id, scenario = name, tick = record.tick, message = %record.message, "anomaly_detected");
        }
        anomaly_count += records.len();
        info!(
            run_id = %run_id,
            scenario = name,
            duration_ms = line.duration_ms,
            save = %line.final_save,
            anomalies = records.len(),
            "scenario_finished"
        );
        match serde_json::to_string(&line) {
            Ok(text) => println!("{text}"),
            Err(error) => error!(scenario = name, %error, "scenario_result_unserializable"),
        }
        results.push(line);
    }

    let summary = build_run_summary(run_id.clone(), started_at_ms, now_ms(), results, anomaly_count);
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            error!(run_id = %run_id, path = %path.display(), %error, "summary_write_failed");
            std::process::exit(2);
        }
    }
    info!(
        run_id = %run_id,
        scenarios = summary.scenario_count,
        anomalies = summary.anomaly_count,
        "run_finished"
    );

    if summary.anomaly_count > 0 {
        std::process::exit(1);
    }
}

fn resolve_scenarios(raw: &str) -> Result<Vec<&'static str>, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized == "all" {
        return Ok(SCENARIO_NAMES.to_vec());
    }
    SCENARIO_NAMES
        .iter()
        .find(|name| **name == normalized)
        .map(|name| vec![*name])
        .ok_or_else(|| format!("expected one of {} or all", SCENARIO_NAMES.join(", ")))
}

fn run_scenario(name: &'static str, seed: u64) -> Result<(ScenarioResultLine, Vec<AnomalyRecord>), String> {
    let run = match name {
        "council-cascade" => council_cascade(seed)?,
        "council-refusal" => council_refusal(seed)?,
        "save-reload" => save_reload(seed)?,
        "gong-waves" => gong_waves(seed)?,
        "crown-event" => crown_event(seed)?,
        other => return Err(format!("no runner for scenario {other}")),
    };
    Ok(run.finish())
}

fn spawn_council(run: &mut ScenarioRun) -> Vec<EntityId> {
    run.engine.spawn_creature(NPC_ILLIDARI_COUNCIL, 1, 0.0);
    run.engine.spawn_creature(NPC_COUNCIL_VOICE, 1, 0.0);
    let members = [NPC_GATHIOS, NPC_ZEREVOR, NPC_MALANDE, NPC_VERAS]
        .into_iter()
        .map(|type_id| run.engine.spawn_creature(type_id, COUNCIL_MEMBER_HEALTH, 0.0))
        .collect();
    run.drain();
    members
}

/// A raid hits a rotating council member every tick until the group falls.
fn council_cascade(seed: u64) -> Result<ScenarioRun, String> {
    let mut run = ScenarioRun::new("council-cascade", "black_temple", seed)?;
    run.engine.load(Some("B T 3 3 3 3 3 3 3 0 0"));
    let raid: Vec<EntityId> = (0..5)
        .map(|_| run.engine.add_player(Team::Horde, false))
        .collect();
    let members = spawn_council(&mut run);

    run.engine.engage(members[0], raid[0]);
    run.drain();
    run.expect(
        run.engine.encounter_state(ILLIDARI_COUNCIL) == EncounterState::InProgress,
        "council did not start",
    );

    let mut tick = 0usize;
    while run.engine.encounter_state(ILLIDARI_COUNCIL) == EncounterState::InProgress {
        let target = members[tick % members.len()];
        let attacker = raid[tick % raid.len()];
        run.engine.damage(attacker, target, 12_000);
        run.step();
        tick += 1;
        if run.engine.tick() > TICK_SAFETY_LIMIT {
            run.expect(false, "tick safety limit exceeded");
            break;
        }
    }

    run.expect(
        run.engine.encounter_state(ILLIDARI_COUNCIL) == EncounterState::Done,
        "council did not finish",
    );
    let alive = members
        .iter()
        .filter(|member| run.engine.world().is_alive(**member))
        .count();
    run.expect(alive == 0, format!("{alive} council members survived the cascade"));
    let defeated = run.count_events("member_defeated");
    run.expect(defeated == members.len(), format!("expected 4 member deaths, saw {defeated}"));
    Ok(run)
}

/// Pulling the council with Mother Shahraz alive ejects the raid.
fn council_refusal(seed: u64) -> Result<ScenarioRun, String> {
    let mut run = ScenarioRun::new("council-refusal", "black_temple", seed)?;
    run.engine.load(Some("B T 3 3 3 3 3 3 0 0 0"));
    let player = run.engine.add_player(Team::Alliance, false);
    let members = spawn_council(&mut run);

    run.engine.engage(members[3], player);
    run.run_for(3_000);

    run.expect(
        run.engine.encounter_state(ILLIDARI_COUNCIL) == EncounterState::NotStarted,
        "council started without its prerequisites",
    );
    let ejected = run
        .commands
        .iter()
        .any(|command| matches!(command, ActorCommand::EjectParticipants { .. }));
    run.expect(ejected, "refused pull did not eject participants");
    run.expect(run.count_events("engage_refused") == 1, "expected one refusal event");

    let gm = run.engine.add_player(Team::Alliance, true);
    run.engine.engage(members[0], gm);
    run.drain();
    run.expect(
        run.engine.encounter_state(ILLIDARI_COUNCIL) == EncounterState::InProgress,
        "privileged pull was refused",
    );
    Ok(run)
}

/// A half-cleared keep written out and read back by a fresh instance.
fn save_reload(seed: u64) -> Result<ScenarioRun, String> {
    let mut run = ScenarioRun::new("save-reload", "shadowfang_keep", seed)?;
    run.engine.add_player(Team::Horde, false);
    for encounter in [DATA_ASHBURY, DATA_VALDEN] {
        run.engine.set_boss_state(encounter, EncounterState::Done);
    }
    run.engine.set_boss_state(DATA_GODFREY, EncounterState::InProgress);
    run.run_for(1_000);

    let blob = run.engine.save();
    run.expect(blob == "S K 3 0 0 3 1", format!("unexpected save blob {blob}"));

    let mut restored = InstanceEngine::from_registry(&ZoneRegistry::with_builtin_zones(), "shadowfang_keep", 2, seed)
        .map_err(|error| error.to_string())?;
    restored.load(Some(&blob));
    let expected = [
        EncounterState::Done,
        EncounterState::NotStarted,
        EncounterState::NotStarted,
        EncounterState::Done,
        EncounterState::NotStarted,
    ];
    for (encounter, state) in expected.into_iter().enumerate() {
        let actual = restored.encounter_state(encounter as u32);
        run.expect(actual == state, format!("encounter {encounter} restored as {actual:?}"));
    }

    restored.load(Some("D M 3 3"));
    run.expect(
        restored.encounter_state(DATA_ASHBURY) == EncounterState::Done,
        "foreign blob overwrote restored state",
    );
    Ok(run)
}

/// Rings the Razorfen gong through every wave and kills Tuten'kash.
fn gong_waves(seed: u64) -> Result<ScenarioRun, String> {
    let mut run = ScenarioRun::new("gong-waves", "razorfen_downs", seed)?;
    let player = run.engine.add_player(Team::Horde, false);
    run.engine.spawn_gate_object(GO_GONG);
    for wave in 1..=16 {
        run.engine.set_data(DATA_GONG_WAVES, wave);
        run.run_for(500);
    }

    let summoned = |type_id| {
        run.engine
            .world()
            .actors()
            .filter(|actor| actor.type_id == type_id)
            .count()
    };
    let (fiends, reavers) = (summoned(NPC_TOMB_FIEND), summoned(NPC_TOMB_REAVER));
    let boss = run
        .engine
        .world()
        .actors()
        .find(|actor| actor.type_id == NPC_TUTEN_KASH)
        .map(|actor| actor.id);
    run.expect(fiends == 8, format!("expected 8 tomb fiends, saw {fiends}"));
    run.expect(reavers == 4, format!("expected 4 tomb reavers, saw {reavers}"));

    match boss {
        Some(boss) => {
            run.engine.damage(player, boss, i64::MAX / 2);
            run.engine.set_boss_state(BOSS_TUTEN_KASH, EncounterState::Done);
            run.drain();
            let save_requested = run.engine.take_save_request();
            run.expect(save_requested, "defeat did not request a save");
        }
        None => run.expect(false, "Tuten'kash was not summoned"),
    }
    let blob = run.engine.save();
    run.expect(blob == "T C 3 16", format!("unexpected save blob {blob}"));
    Ok(run)
}

/// One minute of the crown event with Hummel calling in crazed apothecaries.
fn crown_event(seed: u64) -> Result<ScenarioRun, String> {
    let mut run = ScenarioRun::new("crown-event", "shadowfang_keep", seed)?;
    run.engine.add_player(Team::Alliance, false);
    run.engine.spawn_creature(NPC_APOTHECARY_HUMMEL, 100, 0.0);
    run.engine
        .set_data(DATA_CROWN, i64::from(EncounterState::NotStarted.as_raw()));
    run.engine
        .set_data(DATA_CROWN, i64::from(EncounterState::InProgress.as_raw()));
    run.run_for(60_000);

    let spawns = run
        .commands
        .iter()
        .filter(|command| {
            matches!(
                command,
                ActorCommand::DoAction {
                    action: ACTION_SPAWN_CRAZED,
                    ..
                }
            )
        })
        .count();
    run.expect((10..=27).contains(&spawns), format!("{spawns} crazed spawns in one minute"));

    run.engine
        .set_data(DATA_CROWN, i64::from(EncounterState::Done.as_raw()));
    let before = run.commands.len();
    run.run_for(10_000);
    run.expect(run.commands.len() == before, "crazed spawns continued after the event");
    Ok(run)
}

fn event_kind(event: &InstanceEvent) -> String {
    serde_json::to_value(event)
        .ok()
        .and_then(|value| value.get("type").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn default_run_id(seed: u64, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    run_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    anomaly_count: usize,
) -> RunSummary {
    RunSummary {
        run_id,
        started_at_ms,
        finished_at_ms,
        scenario_count: scenarios.len(),
        anomaly_count,
        scenarios,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_run_id_contains_seed_and_timestamp() {
        assert_eq!(default_run_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn scenario_names_resolve() {
        assert_eq!(resolve_scenarios("all").expect("all").len(), SCENARIO_NAMES.len());
        assert_eq!(resolve_scenarios(" Gong-Waves ").expect("known"), vec!["gong-waves"]);
        assert!(resolve_scenarios("onyxia").is_err());
    }

    #[test]
    fn every_scenario_runs_clean() {
        for name in SCENARIO_NAMES {
            let (line, records) = run_scenario(name, 7).expect("scenario runs");
            assert!(records.is_empty(), "{name}: {:?}", line.anomalies);
        }
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let target = std::env::temp_dir()
            .join(format!("zone-sim-missing-{}", now_ms()))
            .join("summary.json");
        let summary = build_run_summary("sim-1-1".to_string(), 1, 2, Vec::new(), 0);
        assert!(write_summary(&target, &summary).is_err());
    }
}
