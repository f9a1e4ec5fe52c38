use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use zone_encounter_server::constants::TICK_MS;
use zone_encounter_server::engine::{EngineError, InstanceEngine};
use zone_encounter_server::realm_list::{resolve_rows, JsonFileRealmSource, Realm, RealmList, RealmSource};
use zone_encounter_server::save_store::SaveStore;
use zone_encounter_server::server_utils::{
    init_tracing, normalize_save_every_ticks, normalize_zone_name, parse_instance_id,
    parse_zone_list,
};
use zone_encounter_server::types::InstanceSnapshot;
use zone_encounter_server::zones::ZoneRegistry;

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Debug, Parser)]
#[command(name = "server", about = "Hosts zone instances and steps them at a fixed tick rate")]
struct ServerArgs {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,
    #[arg(long, env = "SAVE_DB_PATH", default_value = ".data/instances.json")]
    save_db_path: PathBuf,
    /// JSON array of realm rows; the realm list stays empty without it.
    #[arg(long, env = "REALMLIST_PATH")]
    realmlist_path: Option<PathBuf>,
    /// Zero loads the realm list once and never polls again.
    #[arg(long, env = "REALM_UPDATE_INTERVAL_SECS", default_value_t = 20)]
    realm_update_interval_secs: u64,
    #[arg(long, env = "SAVE_EVERY_TICKS", default_value_t = 200)]
    save_every_ticks: u64,
    /// Comma separated zones to open at startup when no saved instance exists.
    #[arg(long, env = "ZONES", default_value = "")]
    zones: String,
}

#[derive(Debug, Error)]
enum CreateInstanceError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("instance {0} is already running")]
    AlreadyRunning(u64),
}

impl CreateInstanceError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Engine(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyRunning(_) => StatusCode::CONFLICT,
        }
    }
}

struct ServerState {
    registry: ZoneRegistry,
    instances: BTreeMap<u64, InstanceEngine>,
    save_store: SaveStore,
    realms: RealmList,
    save_every_ticks: u64,
    ticks: u64,
}

impl ServerState {
    fn new(registry: ZoneRegistry, save_store: SaveStore, save_every_ticks: u64) -> Self {
        Self {
            registry,
            instances: BTreeMap::new(),
            save_store,
            realms: RealmList::new(),
            save_every_ticks: normalize_save_every_ticks(save_every_ticks),
            ticks: 0,
        }
    }

    fn next_instance_id(&self) -> u64 {
        let live = self.instances.keys().next_back().map_or(1, |last| last + 1);
        live.max(self.save_store.next_instance_id())
    }

    fn create_instance(
        &mut self,
        zone: &str,
        instance_id: Option<u64>,
        seed: Option<u64>,
    ) -> Result<u64, CreateInstanceError> {
        let instance_id = instance_id.unwrap_or_else(|| self.next_instance_id());
        if self.instances.contains_key(&instance_id) {
            return Err(CreateInstanceError::AlreadyRunning(instance_id));
        }
        let seed = seed.unwrap_or_else(rand::random::<u64>);
        let mut engine = InstanceEngine::from_registry(&self.registry, zone, instance_id, seed)?;
        let blob = self
            .save_store
            .blob_for(instance_id, engine.definition().name)
            .map(str::to_owned);
        engine.load(blob.as_deref());
        info!(
            instance_id,
            zone = engine.definition().name,
            restored = blob.is_some(),
            "instance_opened"
        );
        self.instances.insert(instance_id, engine);
        Ok(instance_id)
    }

    fn restore_saved_instances(&mut self) {
        let saved: Vec<(u64, String)> = self
            .save_store
            .entries()
            .map(|(id, stored)| (id, stored.zone.clone()))
            .collect();
        for (instance_id, zone) in saved {
            if let Err(error) = self.create_instance(&zone, Some(instance_id), None) {
                warn!(instance_id, zone = %zone, %error, "instance_restore_failed");
            }
        }
    }

    fn persist_all(&mut self) {
        let ServerState {
            instances,
            save_store,
            ..
        } = self;
        for (instance_id, engine) in instances.iter() {
            persist(save_store, *instance_id, engine);
        }
    }
}

fn persist(save_store: &mut SaveStore, instance_id: u64, engine: &InstanceEngine) {
    let blob = engine.save();
    match save_store.put(instance_id, engine.definition().name, &blob) {
        Ok(()) => debug!(instance_id, blob = %blob, "instance_saved"),
        Err(error) => warn!(instance_id, %error, "instance_save_failed"),
    }
}

#[derive(Debug, Deserialize)]
struct CreateInstanceRequest {
    zone: String,
    #[serde(rename = "instanceId")]
    instance_id: Option<u64>,
    seed: Option<u64>,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = ServerArgs::parse();

    let mut state = ServerState::new(
        ZoneRegistry::with_builtin_zones(),
        SaveStore::new(args.save_db_path.clone()),
        args.save_every_ticks,
    );
    state.restore_saved_instances();
    for zone in parse_zone_list(&args.zones) {
        let already_open = state
            .instances
            .values()
            .any(|engine| engine.definition().name == zone);
        if already_open {
            continue;
        }
        if let Err(error) = state.create_instance(&zone, None, None) {
            warn!(zone = %zone, %error, "startup_zone_skipped");
        }
    }

    let state = Arc::new(Mutex::new(state));
    start_tick_loop(state.clone());
    if let Some(path) = args.realmlist_path.clone() {
        start_realm_refresh_loop(
            state.clone(),
            JsonFileRealmSource::new(path),
            args.realm_update_interval_secs,
        );
    }

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/instances", get(list_instances).post(create_instance))
        .route("/api/instances/{id}", get(get_instance).delete(close_instance))
        .route("/api/instances/{id}/save", get(get_instance_save))
        .route("/api/realms", get(list_realms))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let bind_addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    info!(port = args.port, "server_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server runtime failed");

    state.lock().await.persist_all();
    info!("server_stopped");
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "shutdown_signal_unavailable");
        std::future::pending::<()>().await;
    }
}

async fn healthz(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(json!({ "ok": true, "instances": guard.instances.len() }))
}

async fn list_instances(State(state): State<SharedState>) -> Json<Vec<InstanceSnapshot>> {
    let mut guard = state.lock().await;
    Json(
        guard
            .instances
            .values_mut()
            .map(|engine| engine.build_snapshot(false))
            .collect(),
    )
}

async fn create_instance(
    State(state): State<SharedState>,
    Json(request): Json<CreateInstanceRequest>,
) -> Response {
    let zone = normalize_zone_name(&request.zone);
    let mut guard = state.lock().await;
    match guard.create_instance(&zone, request.instance_id, request.seed) {
        Ok(instance_id) => match guard.instances.get_mut(&instance_id) {
            Some(engine) => (StatusCode::CREATED, Json(engine.build_snapshot(false))).into_response(),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        },
        Err(error) => (error.status(), Json(json!({ "error": error.to_string() }))).into_response(),
    }
}

async fn get_instance(State(state): State<SharedState>, Path(raw_id): Path<String>) -> Response {
    let Some(instance_id) = parse_instance_id(&raw_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mut guard = state.lock().await;
    match guard.instances.get_mut(&instance_id) {
        Some(engine) => Json(engine.build_snapshot(false)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_instance_save(State(state): State<SharedState>, Path(raw_id): Path<String>) -> Response {
    let Some(instance_id) = parse_instance_id(&raw_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let guard = state.lock().await;
    match guard.instances.get(&instance_id) {
        Some(engine) => Json(json!({
            "instanceId": instance_id,
            "zone": engine.definition().name,
            "blob": engine.save(),
        }))
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn close_instance(State(state): State<SharedState>, Path(raw_id): Path<String>) -> Response {
    let Some(instance_id) = parse_instance_id(&raw_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mut guard = state.lock().await;
    let Some(engine) = guard.instances.remove(&instance_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    persist(&mut guard.save_store, instance_id, &engine);
    info!(instance_id, zone = engine.definition().name, "instance_closed");
    StatusCode::NO_CONTENT.into_response()
}

async fn list_realms(State(state): State<SharedState>) -> Json<Vec<Realm>> {
    let guard = state.lock().await;
    Json(guard.realms.realms().cloned().collect())
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_instances(&mut guard);
        }
    });
}

fn tick_instances(state: &mut ServerState) {
    state.ticks += 1;
    let periodic = state.ticks % state.save_every_ticks == 0;
    let ServerState {
        instances,
        save_store,
        ..
    } = state;
    for (instance_id, engine) in instances.iter_mut() {
        engine.step(TICK_MS);
        let commands = engine.drain_commands();
        if !commands.is_empty() {
            debug!(instance_id = *instance_id, commands = commands.len(), "instance_commands");
        }
        for event in engine.drain_events() {
            debug!(instance_id = *instance_id, event = ?event, "instance_event");
        }
        if engine.take_save_request() || periodic {
            persist(save_store, *instance_id, engine);
        }
    }
}

fn start_realm_refresh_loop(state: SharedState, source: JsonFileRealmSource, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            refresh_realms(&state, &source).await;
            if interval_secs == 0 {
                break;
            }
        }
    });
}

async fn refresh_realms(state: &SharedState, source: &JsonFileRealmSource) {
    info!(path = %source.path().display(), "realm_list_updating");
    let rows = match source.load_rows() {
        Ok(rows) => rows,
        Err(error) => {
            warn!(%error, "realm_list_load_failed");
            return;
        }
    };
    let resolved = resolve_rows(rows).await;
    let mut guard = state.lock().await;
    let diff = guard.realms.apply_resolved(resolved);
    debug!(
        added = diff.added.len(),
        updated = diff.updated.len(),
        removed = diff.removed.len(),
        "realm_list_updated"
    );
}
