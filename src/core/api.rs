//! HTTP + WebSocket API for Brick Hospital
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /levels - Level presets and picker choices
//! - POST /session/new - Create and start a session
//! - GET /session/{id} - Current snapshot
//! - POST /session/{id}/tap - Tap a category
//! - POST /session/{id}/confirm - Confirm a locked slot
//! - POST /session/{id}/end - End the game and return the report
//! - GET /session/{id}/summary - Report of an ended session
//! - GET /session/{id}/device - micro:bit adapter status
//! - POST /session/{id}/rescan - Restart the micro:bit adapter
//! - WS /ws/{id} - Live updates
//!
//! Ended sessions stay readable for a grace period, then are evicted.

use axum::{
    extract::{Path, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::account::LocalStore;
use crate::config::CategorySet;
use crate::core::{GameSession, SessionHandle, SessionRunner};
use crate::device::DeviceAdapter;
use crate::types::{
    difficulty_stars, Category, CategoryPolicy, DeviceStatus, EventOutcome, GameRecord, InputMode, Level,
    MissAttribution, OutcomeCode, Phase, SequenceEnd, SessionConfig, SessionEvent, SessionReport,
    SessionSnapshot, SessionUpdate, GUEST_USER_ID, INTERVAL_CHOICES, PRACTICE_MINUTE_CHOICES,
};
use crate::TICK_PERIOD_MS;

/// How long an ended session stays readable
pub const SESSION_EVICTION_GRACE_SECS: u64 = 600;

/// Builds a fresh adapter for sessions that ask for the micro:bit
pub type DeviceFactory = Arc<dyn Fn() -> DeviceAdapter + Send + Sync>;

/// A session owned by the server
#[derive(Debug)]
pub struct SessionEntry {
    pub handle: SessionHandle,
    pub config: SessionConfig,
    pub level: Option<Level>,
    pub user_id: String,
}

/// App state
pub struct AppState {
    pub sessions: RwLock<HashMap<String, SessionEntry>>,
    /// Parameters for requests that leave fields out
    pub defaults: SessionConfig,
    pub tick_period: Duration,
    /// Finished games are appended here when set
    pub store: Option<LocalStore>,
    /// Time an ended session stays in `sessions`
    pub eviction_grace: Duration,
    device_factory: Option<DeviceFactory>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("defaults", &self.defaults)
            .field("tick_period", &self.tick_period)
            .field("store", &self.store)
            .field("eviction_grace", &self.eviction_grace)
            .field("device", &self.device_factory.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(defaults: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            defaults,
            tick_period: Duration::from_millis(TICK_PERIOD_MS),
            store: None,
            eviction_grace: Duration::from_secs(SESSION_EVICTION_GRACE_SECS),
            device_factory: None,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn with_eviction_grace(mut self, grace: Duration) -> Self {
        self.eviction_grace = grace;
        self
    }

    /// Let sessions request the micro:bit (`"microbit": true`)
    pub fn with_device_factory(mut self, factory: DeviceFactory) -> Self {
        self.device_factory = Some(factory);
        self
    }

    /// Clone of a session's handle; the map lock is released on return
    async fn handle(&self, id: &str) -> Result<SessionHandle, ApiError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| not_found(id))
    }

    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    pub fn with_store(mut self, store: LocalStore) -> Self {
        self.store = Some(store);
        self
    }
}

/// Create new session request; every field falls back to the server defaults
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewSessionRequest {
    /// `L1`..`L3` (or `1`..`3`): a fixed-length round
    pub level: Option<String>,
    pub practice_minutes: Option<u32>,
    pub practice_seconds: Option<u32>,
    pub interval_seconds: Option<u32>,
    pub slot_count: Option<usize>,
    pub policy: Option<CategoryPolicy>,
    pub categories: Option<CategorySet>,
    pub sequence_end: Option<SequenceEnd>,
    pub miss_attribution: Option<MissAttribution>,
    pub input_mode: Option<InputMode>,
    pub seed: Option<u64>,
    pub user_id: Option<String>,
    /// Feed colours from the micro:bit
    pub microbit: Option<bool>,
}

/// Create new session response
#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub websocket_url: String,
    pub config: SessionConfig,
    pub snapshot: SessionSnapshot,
}

/// Tap request
#[derive(Debug, Deserialize)]
pub struct TapRequest {
    pub category: String,
}

/// Outcome of one player input
#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub code: String,
    pub outcome: OutcomeCode,
    pub description: String,
    pub snapshot: SessionSnapshot,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
}

#[derive(Debug, Serialize)]
pub struct LevelInfo {
    pub id: u32,
    pub title: String,
    pub time_limit_secs: u32,
    pub target_count: usize,
    pub interval_seconds: u32,
}

#[derive(Debug, Serialize)]
pub struct IntervalChoice {
    pub seconds: u32,
    pub stars: u8,
}

#[derive(Debug, Serialize)]
pub struct LevelsResponse {
    pub levels: Vec<LevelInfo>,
    pub practice_minute_choices: Vec<u32>,
    pub interval_choices: Vec<IntervalChoice>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

fn not_found(id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("no session {}", id))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/levels", get(levels))
        .route("/session/new", post(create_session))
        .route("/session/:id", get(get_session))
        .route("/session/:id/tap", post(tap))
        .route("/session/:id/confirm", post(confirm))
        .route("/session/:id/end", post(end_session))
        .route("/session/:id/summary", get(get_summary))
        .route("/session/:id/device", get(get_device))
        .route("/session/:id/rescan", post(rescan_device))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await;
    let active = sessions
        .values()
        .filter(|s| s.handle.snapshot().phase == Phase::Running)
        .count();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: active,
    })
}

async fn levels() -> Json<LevelsResponse> {
    let levels = Level::ALL
        .iter()
        .map(|level| {
            let preset = level.preset();
            let config = preset.session_config(CategoryPolicy::Sequence);
            LevelInfo {
                id: preset.id,
                title: preset.title,
                time_limit_secs: preset.time_limit_secs,
                target_count: preset.target_count,
                interval_seconds: config.interval_seconds,
            }
        })
        .collect();

    Json(LevelsResponse {
        levels,
        practice_minute_choices: PRACTICE_MINUTE_CHOICES.to_vec(),
        interval_choices: INTERVAL_CHOICES
            .iter()
            .map(|&seconds| IntervalChoice {
                seconds,
                stars: difficulty_stars(seconds),
            })
            .collect(),
    })
}

/// Overlay a request on the server defaults
pub fn build_session_config(
    defaults: &SessionConfig,
    req: &NewSessionRequest,
) -> Result<(SessionConfig, Option<Level>), String> {
    let policy = req.policy.unwrap_or(defaults.policy);
    let (mut config, level) = match &req.level {
        Some(raw) => {
            let level: Level = raw.parse()?;
            let config = SessionConfig {
                categories: defaults.categories.clone(),
                miss_attribution: defaults.miss_attribution,
                input_mode: defaults.input_mode,
                seed: defaults.seed,
                ..level.preset().session_config(policy)
            };
            (config, Some(level))
        }
        None => (SessionConfig { policy, ..defaults.clone() }, None),
    };

    if let Some(minutes) = req.practice_minutes {
        config.practice_seconds = minutes.saturating_mul(60);
    }
    if let Some(seconds) = req.practice_seconds {
        config.practice_seconds = seconds;
    }
    if let Some(interval) = req.interval_seconds {
        config.interval_seconds = interval;
    }
    if let Some(slots) = req.slot_count {
        config.slot_count = slots;
    }
    if let Some(set) = req.categories {
        config.categories = set.categories();
    }
    if let Some(end) = req.sequence_end {
        config.sequence_end = end;
    }
    if let Some(attribution) = req.miss_attribution {
        config.miss_attribution = attribution;
    }
    if let Some(mode) = req.input_mode {
        config.input_mode = mode;
    }
    if req.seed.is_some() {
        config.seed = req.seed;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok((config, level))
}

/// Create and start a session
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSessionRequest>,
) -> ApiResult<NewSessionResponse> {
    let (config, level) = build_session_config(&state.defaults, &req)
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e))?;
    let session = GameSession::new(config.clone())
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let mut runner = SessionRunner::new(session).with_tick_period(state.tick_period);
    if req.microbit.unwrap_or(false) {
        let factory = state
            .device_factory
            .as_ref()
            .ok_or_else(|| api_error(StatusCode::UNPROCESSABLE_ENTITY, "no micro:bit input on this server"))?;
        runner = runner.with_device(factory());
    }
    let handle = runner.spawn();
    let session_id = generate_session_id(&state.next_id);
    let user_id = req.user_id.clone().unwrap_or_else(|| GUEST_USER_ID.to_string());

    info!(session = %session_id, user = %user_id, "session created");
    let snapshot = handle.started().await;
    state.sessions.write().await.insert(session_id.clone(), SessionEntry {
        handle: handle.clone(),
        config: config.clone(),
        level,
        user_id: user_id.clone(),
    });
    spawn_session_reaper(&state, session_id.clone(), &handle, user_id, level);

    Ok(Json(NewSessionResponse {
        websocket_url: format!("/ws/{}", session_id),
        session_id,
        config,
        snapshot,
    }))
}

/// Once the session ends: append its game record, wait out the grace
/// period, then drop it from the map
fn spawn_session_reaper(
    state: &Arc<AppState>,
    session_id: String,
    handle: &SessionHandle,
    user_id: String,
    level: Option<Level>,
) {
    let state: Weak<AppState> = Arc::downgrade(state);
    let store = state.upgrade().and_then(|s| s.store.clone());
    let mut reports = handle.reports();
    tokio::spawn(async move {
        let report = match reports.wait_for(|r| r.is_some()).await {
            Ok(report) => report.clone(),
            Err(_) => None,
        };
        if let (Some(report), Some(store)) = (report, store) {
            let record = GameRecord::from_report(&report, &user_id, level);
            let written = tokio::task::spawn_blocking(move || store.append_record(record)).await;
            match written {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("could not store game record: {}", e),
                Err(e) => warn!("game record writer failed: {}", e),
            }
        }

        let Some(grace) = state.upgrade().map(|s| s.eviction_grace) else {
            return;
        };
        tokio::time::sleep(grace).await;
        if let Some(state) = state.upgrade() {
            state.sessions.write().await.remove(&session_id);
            info!(session = %session_id, "ended session evicted");
        }
    });
}

/// Get session snapshot
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    let handle = state.handle(&id).await?;
    Ok(Json(handle.snapshot()))
}

async fn apply_event(state: &AppState, id: &str, event: SessionEvent) -> ApiResult<EventResponse> {
    let handle = state.handle(id).await?;
    let outcome: EventOutcome = handle
        .send(event)
        .await
        .ok_or_else(|| api_error(StatusCode::GONE, "session task has stopped"))?;

    Ok(Json(EventResponse {
        code: outcome.code.code().to_string(),
        outcome: outcome.code,
        description: outcome.code.description().to_string(),
        snapshot: handle.snapshot(),
    }))
}

/// Tap a category
async fn tap(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<TapRequest>,
) -> ApiResult<EventResponse> {
    let category: Category = req
        .category
        .parse()
        .map_err(|e: crate::types::UnknownCategory| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    apply_event(&state, &id, SessionEvent::Tap(category)).await
}

/// Confirm a locked slot
async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<EventResponse> {
    apply_event(&state, &id, SessionEvent::Confirm).await
}

/// End the game and wait for the report
async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<SessionReport> {
    let handle = state.handle(&id).await?;
    handle.send(SessionEvent::EndGame).await;
    let report = handle
        .report()
        .await
        .ok_or_else(|| api_error(StatusCode::GONE, "session task has stopped"))?;
    Ok(Json(report))
}

/// Report of an ended session
async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<SessionReport> {
    let handle = state.handle(&id).await?;
    let report = handle
        .try_report()
        .ok_or_else(|| api_error(StatusCode::CONFLICT, "session is still running"))?;
    Ok(Json(report))
}

fn no_device(id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("session {} has no micro:bit attached", id))
}

/// micro:bit adapter status
async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DeviceStatus> {
    let handle = state.handle(&id).await?;
    handle.device_status().map(Json).ok_or_else(|| no_device(&id))
}

/// Tear the adapter down and scan again
async fn rescan_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DeviceStatus> {
    let handle = state.handle(&id).await?;
    if handle.device_status().is_none() {
        return Err(no_device(&id));
    }
    if !handle.rescan().await {
        return Err(api_error(StatusCode::GONE, "session has ended"));
    }
    handle.device_status().map(Json).ok_or_else(|| no_device(&id))
}

/// WebSocket handler for live updates
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state.handle(&id).await?;
    if handle.try_report().is_some() {
        return Err(api_error(StatusCode::GONE, "session has ended"));
    }
    let rx = handle.subscribe();

    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    }))
}

/// Forward updates until the session ends or the client leaves
async fn handle_websocket(socket: WebSocket, mut rx: broadcast::Receiver<SessionUpdate>) {
    let (mut sink, mut stream) = socket.split();
    loop {
        let received = tokio::select! {
            received = rx.recv() => received,
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };
        let update = match received {
            Ok(update) => update,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "websocket client lagging");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let ended = update.snapshot.phase == Phase::Ended;
        let json = match serde_json::to_string(&update) {
            Ok(json) => json,
            Err(e) => {
                warn!("could not encode update: {}", e);
                continue;
            }
        };
        if sink.send(Message::Text(json)).await.is_err() || ended {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Generate session ID
fn generate_session_id(counter: &AtomicU64) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    let seq = counter.fetch_add(1, Ordering::Relaxed);
    format!("session_{:x}_{}", nanos, seq)
}

/// Run the API server
pub async fn run_server(addr: SocketAddr, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API listening");
    println!("Brick Hospital API running on {}", addr);
    println!("  GET  /health               - Health check");
    println!("  GET  /levels               - Level presets");
    println!("  POST /session/new          - Create session");
    println!("  GET  /session/:id          - Get snapshot");
    println!("  POST /session/:id/tap      - Tap a category");
    println!("  POST /session/:id/confirm  - Confirm locked slot");
    println!("  POST /session/:id/end      - End game");
    println!("  GET  /session/:id/summary  - Session report");
    println!("  GET  /session/:id/device   - micro:bit status");
    println!("  POST /session/:id/rescan   - Rescan micro:bit");
    println!("  WS   /ws/:id               - Live updates");
    axum::serve(listener, router).await?;
    Ok(())
}
