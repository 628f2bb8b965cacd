//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};

use axum::{
    body::HttpBody,
    extract::{DefaultBodyLimit, Multipart, Path, Request, State},
    http::{header, HeaderMap, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

use crate::api::response::{api_message, api_ok, api_success};
use crate::api::AppState;
use crate::context::url_path;
use crate::device::{LoopMode, TransportAction, VolumeStep};
use crate::error::{WiimError, WiimResult};
use crate::protocol_constants::MEDIA_URL_PREFIX;
use crate::services::{NewPlayer, PlayerGroup, UpsertOutcome};
use crate::utils::list_ipv4_interfaces;

const SERVICE_ID: &str = "wiim-orchestrator";

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddPlayerRequest {
    ip: String,
    name: Option<String>,
    use_https: Option<bool>,
}

#[derive(Deserialize, Default)]
struct ScanBody {
    subnet: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PlayRequest {
    file_url: Option<String>,
    group_id: Option<String>,
}

#[derive(Deserialize)]
struct VolumeRequest {
    volume: i64,
}

#[derive(Deserialize, Default)]
struct ActiveVolumeRequest {
    volume: Option<i64>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct MediaPlayRequest {
    file_url: Option<String>,
}

#[derive(Deserialize)]
struct MuteRequest {
    mute: bool,
}

#[derive(Deserialize)]
struct LoopModeRequest {
    mode: i64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct BeepRequest {
    beep_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupRequest {
    name: String,
    player_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    player_selections: Option<BTreeMap<String, String>>,
    #[serde(default)]
    player_groups: Vec<PlayerGroup>,
    player_volumes: Option<BTreeMap<String, u8>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    let media_dir = state.media.media_dir().to_path_buf();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        // Players
        .route("/api/players", get(list_players).post(add_player))
        .route("/api/players/scan", post(scan_players))
        .route("/api/players/{id}", delete(remove_player))
        .route("/api/players/{id}/activate", post(activate_player))
        .route("/api/players/{id}/status", get(player_status))
        .route("/api/players/{id}/play", post(play))
        .route("/api/players/{id}/pause", post(pause))
        .route("/api/players/{id}/stop", post(stop))
        .route("/api/players/{id}/volume", post(set_volume))
        .route("/api/players/{id}/mute", post(set_mute))
        .route("/api/players/{id}/loopmode", post(set_loop_mode))
        .route("/api/players/{id}/beep", post(beep))
        .route("/api/players/{id}/control/{action}", post(control))
        .route("/api/scanner/progress", get(scan_progress))
        // Active player shortcuts
        .route("/api/status", get(active_status))
        .route("/api/info", get(active_info))
        .route("/api/control/{action}", post(active_control))
        .route("/api/volume/{action}", post(active_volume))
        .route("/api/media/play", post(active_play_media))
        // Groups
        .route("/api/groups", get(list_groups).post(create_group))
        .route("/api/groups/{id}", delete(delete_group))
        .route("/api/groups/{id}/play", post(play_group))
        .route("/api/groups/{id}/stop", post(stop_group))
        .route("/api/groups/{id}/volume", post(set_group_volume))
        .route("/api/playback/play-all", post(play_all))
        // Media
        .route("/api/media", get(list_media))
        .route(
            "/api/media/upload",
            post(upload_media).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/media/{filename}", delete(delete_media))
        .route("/api/playlist/{filename}", get(media_playlist))
        // Config and observability
        .route("/api/config", get(get_settings).post(save_settings))
        .route("/api/config/playback", get(get_playback_config))
        .route("/api/config/sync", post(sync_config))
        .route("/api/config/cleanup", post(cleanup_config))
        .route("/api/stats", get(get_stats))
        .route("/api/stats/reset", post(reset_stats))
        .route("/api/server-info", get(server_info))
        .route("/api/monitors", get(list_monitors))
        .nest_service(MEDIA_URL_PREFIX, ServeDir::new(media_dir))
        .layer(middleware::from_fn_with_state(state.clone(), record_stats))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(tracing::Level::DEBUG)),
        )
        .layer(cors)
        .with_state(state)
}

/// Feeds `/api/stats`. Body sizes are taken from the size hints, which are
/// exact for the JSON bodies this API produces.
async fn record_stats(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.stats.is_enabled() {
        return next.run(request).await;
    }
    let path = request.uri().path().to_string();
    let received = request.body().size_hint().exact().unwrap_or(0);
    let response = next.run(request).await;
    let sent = response.body().size_hint().exact().unwrap_or(0);
    let status = response.status();
    state.stats.record(
        &path,
        received,
        sent,
        status.is_client_error() || status.is_server_error(),
    );
    response
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Parses and validates an address for use as a player.
///
/// Returns the canonical IPv4 string representation on success.
fn parse_player_ip(ip: &str) -> WiimResult<String> {
    let parsed: IpAddr = ip
        .trim()
        .parse()
        .map_err(|_| WiimError::InvalidRequest(format!("invalid IP address: {}", ip)))?;
    let IpAddr::V4(v4) = parsed else {
        return Err(WiimError::InvalidRequest(
            "only IPv4 players are supported".to_string(),
        ));
    };
    if v4.is_unspecified() || v4.is_multicast() || v4.is_broadcast() {
        return Err(WiimError::InvalidRequest(format!(
            "{} is not a unicast address",
            v4
        )));
    }
    Ok(v4.to_string())
}

fn parse_volume(volume: i64) -> WiimResult<u8> {
    u8::try_from(volume)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| WiimError::InvalidRequest("volume must be between 0 and 100".to_string()))
}

fn known_players(state: &AppState) -> HashSet<String> {
    state.registry.ids().into_iter().collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Players
// ─────────────────────────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    api_success(json!({ "status": "ok", "service": SERVICE_ID }))
}

async fn list_players(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.registry.document())
}

async fn add_player(
    State(state): State<AppState>,
    Json(payload): Json<AddPlayerRequest>,
) -> WiimResult<impl IntoResponse> {
    let ip = parse_player_ip(&payload.ip)?;
    let (player, outcome) = state.registry.upsert(NewPlayer {
        ip,
        name: payload.name.filter(|n| !n.trim().is_empty()),
        uuid: None,
        use_https: payload.use_https.unwrap_or(state.config.use_https),
    });
    Ok(api_success(json!({
        "success": true,
        "created": outcome == UpsertOutcome::Created,
        "player": player,
    })))
}

async fn scan_players(
    State(state): State<AppState>,
    body: Option<Json<ScanBody>>,
) -> WiimResult<impl IntoResponse> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let outcome = state.scanner.scan(body.subnet.as_deref()).await?;
    Ok(api_success(outcome))
}

async fn scan_progress(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.scanner.progress())
}

async fn remove_player(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> WiimResult<impl IntoResponse> {
    let player = state.registry.remove(&id)?;
    state.playback.purge_player(&player.id);
    Ok(api_success(json!({ "success": true, "player": player })))
}

async fn activate_player(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> WiimResult<impl IntoResponse> {
    state.registry.set_active(&id)?;
    Ok(api_ok())
}

async fn player_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> WiimResult<impl IntoResponse> {
    let status = state.playback.status(&id).await?;
    Ok(api_success(status))
}

async fn play(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Option<Json<PlayRequest>>,
) -> WiimResult<impl IntoResponse> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let outcome = state
        .playback
        .play(&id, body.file_url.as_deref(), body.group_id.as_deref())
        .await?;
    Ok(api_success(json!({ "success": true, "playback": outcome })))
}

async fn pause(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> WiimResult<impl IntoResponse> {
    state.playback.pause(&id).await?;
    Ok(api_ok())
}

async fn stop(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> WiimResult<impl IntoResponse> {
    state.playback.stop(&id).await?;
    Ok(api_message("Playback stopped; auto-restore disabled for this player"))
}

async fn control(
    Path((id, action)): Path<(String, String)>,
    State(state): State<AppState>,
) -> WiimResult<impl IntoResponse> {
    let action = TransportAction::parse(&action)
        .ok_or_else(|| WiimError::InvalidRequest(format!("unknown action: {}", action)))?;
    state.playback.transport(&id, action).await?;
    Ok(api_ok())
}

async fn set_volume(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<VolumeRequest>,
) -> WiimResult<impl IntoResponse> {
    let volume = parse_volume(payload.volume)?;
    state.playback.set_volume(&id, volume).await?;
    Ok(api_success(json!({ "success": true, "volume": volume })))
}

async fn set_mute(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<MuteRequest>,
) -> WiimResult<impl IntoResponse> {
    state.playback.set_mute(&id, payload.mute).await?;
    Ok(api_ok())
}

async fn set_loop_mode(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<LoopModeRequest>,
) -> WiimResult<impl IntoResponse> {
    let mode = LoopMode::from_code(payload.mode);
    state.playback.set_loop_mode(&id, mode).await?;
    Ok(api_success(json!({ "success": true, "mode": mode.code() })))
}

async fn beep(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Option<Json<BeepRequest>>,
) -> WiimResult<impl IntoResponse> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let url = state.playback.beep(&id, body.beep_url.as_deref()).await?;
    Ok(api_success(json!({ "success": true, "url": url })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Active player
// ─────────────────────────────────────────────────────────────────────────────

async fn active_status(State(state): State<AppState>) -> WiimResult<impl IntoResponse> {
    let id = state.playback.active_player_id()?;
    Ok(api_success(state.playback.status(&id).await?))
}

async fn active_info(State(state): State<AppState>) -> WiimResult<impl IntoResponse> {
    let id = state.playback.active_player_id()?;
    Ok(api_success(state.playback.device_info(&id).await?))
}

async fn active_control(
    Path(action): Path<String>,
    State(state): State<AppState>,
) -> WiimResult<impl IntoResponse> {
    let id = state.playback.active_player_id()?;
    let action = TransportAction::parse(&action)
        .ok_or_else(|| WiimError::InvalidRequest(format!("unknown action: {}", action)))?;
    state.playback.transport(&id, action).await?;
    Ok(api_ok())
}

async fn active_volume(
    Path(action): Path<String>,
    State(state): State<AppState>,
    body: Option<Json<ActiveVolumeRequest>>,
) -> WiimResult<impl IntoResponse> {
    let id = state.playback.active_player_id()?;
    match action.as_str() {
        "set" => {
            let volume = body
                .and_then(|Json(b)| b.volume)
                .ok_or_else(|| WiimError::InvalidRequest("volume is required".to_string()))?;
            let volume = parse_volume(volume)?;
            state.playback.set_volume(&id, volume).await?;
            return Ok(api_success(json!({ "success": true, "volume": volume })).into_response());
        }
        "up" => state.playback.step_volume(&id, VolumeStep::Up).await?,
        "down" => state.playback.step_volume(&id, VolumeStep::Down).await?,
        "mute" => state.playback.set_mute(&id, true).await?,
        "unmute" => state.playback.set_mute(&id, false).await?,
        other => {
            return Err(WiimError::InvalidRequest(format!(
                "unknown volume action: {}",
                other
            )));
        }
    }
    Ok(api_ok().into_response())
}

/// Plays a media URL on the active player with the same bookkeeping as
/// `/api/players/{id}/play`.
async fn active_play_media(
    State(state): State<AppState>,
    body: Option<Json<MediaPlayRequest>>,
) -> WiimResult<impl IntoResponse> {
    let id = state.playback.active_player_id()?;
    let file_url = body
        .and_then(|Json(b)| b.file_url)
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| WiimError::InvalidRequest("fileUrl is required".to_string()))?;
    let outcome = state.playback.play(&id, Some(&file_url), None).await?;
    Ok(api_success(json!({ "success": true, "playback": outcome })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Groups
// ─────────────────────────────────────────────────────────────────────────────

async fn list_groups(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "groups": state.desired.groups() }))
}

async fn create_group(
    State(state): State<AppState>,
    Json(payload): Json<CreateGroupRequest>,
) -> WiimResult<impl IntoResponse> {
    let known = known_players(&state);
    let group = state
        .desired
        .create_group(&payload.name, &payload.player_ids, &known)?;
    Ok(api_success(json!({ "success": true, "group": group })))
}

async fn delete_group(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> WiimResult<impl IntoResponse> {
    let group = state.desired.delete_group(&id)?;
    Ok(api_success(json!({ "success": true, "group": group })))
}

async fn play_group(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> WiimResult<impl IntoResponse> {
    Ok(api_success(state.groups.play_group(&id).await?))
}

async fn stop_group(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> WiimResult<impl IntoResponse> {
    Ok(api_success(state.groups.stop_group(&id).await?))
}

async fn set_group_volume(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<VolumeRequest>,
) -> WiimResult<impl IntoResponse> {
    let volume = parse_volume(payload.volume)?;
    Ok(api_success(state.groups.set_group_volume(&id, volume).await?))
}

async fn play_all(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.groups.play_all().await)
}

// ─────────────────────────────────────────────────────────────────────────────
// Media
// ─────────────────────────────────────────────────────────────────────────────

async fn list_media(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "files": state.media.list() }))
}

async fn upload_media(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> WiimResult<impl IntoResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| WiimError::InvalidRequest(format!("bad upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| WiimError::InvalidRequest(format!("bad upload: {}", e)))?;
        let file = state
            .media
            .store_upload(&original, content_type.as_deref(), &bytes)
            .await?;
        return Ok(api_success(json!({ "success": true, "file": file })));
    }
    Err(WiimError::InvalidRequest(
        "multipart field 'file' is required".to_string(),
    ))
}

async fn delete_media(
    Path(filename): Path<String>,
    State(state): State<AppState>,
) -> WiimResult<impl IntoResponse> {
    state.media.remove(&filename).await?;
    Ok(api_ok())
}

/// Single-file M3U playlist, rooted at the host the client used.
async fn media_playlist(
    Path(filename): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> WiimResult<impl IntoResponse> {
    let base_url = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .map(|host| format!("http://{}", host))
        .unwrap_or_else(|| state.network.url_builder().base_url());
    let body = state.media.playlist(&filename, &base_url).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "audio/x-mpegurl".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}.m3u\"", filename),
            ),
        ],
        body,
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.settings.get())
}

async fn save_settings(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> WiimResult<impl IntoResponse> {
    state.settings.replace(payload)?;
    Ok(api_ok())
}

async fn get_playback_config(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.desired.snapshot())
}

/// Bulk replacement of the desired state from the web UI.
///
/// Selections of manually stopped players are dropped so the UI cannot
/// re-enable auto-restore behind a deliberate stop.
async fn sync_config(
    State(state): State<AppState>,
    Json(payload): Json<SyncRequest>,
) -> WiimResult<impl IntoResponse> {
    let selections = payload.player_selections.ok_or_else(|| {
        WiimError::InvalidRequest("playerSelections is required".to_string())
    })?;

    let mut filtered = 0;
    let selections: BTreeMap<String, String> = selections
        .into_iter()
        .filter(|(id, _)| {
            let stopped = state.runtime.is_manually_stopped(id);
            if stopped {
                log::info!("[Config] {} was manually stopped; not restoring it", id);
                filtered += 1;
            }
            !stopped
        })
        .map(|(id, path)| (id, url_path(&path)))
        .collect();

    let saved = selections.len();
    let groups = payload.player_groups.len();
    state
        .desired
        .replace(selections, payload.player_groups, payload.player_volumes)?;
    log::info!(
        "[Config] Synced {} selections ({} filtered), {} groups",
        saved,
        filtered,
        groups
    );
    Ok(api_success(json!({
        "success": true,
        "saved": saved,
        "filtered": filtered,
        "groups": groups,
    })))
}

async fn cleanup_config(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.desired.cleanup(&known_players(&state));
    api_success(json!({ "success": true, "cleanup": report }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Observability
// ─────────────────────────────────────────────────────────────────────────────

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.stats.snapshot())
}

async fn reset_stats(State(state): State<AppState>) -> impl IntoResponse {
    state.stats.reset();
    api_ok()
}

async fn server_info(State(state): State<AppState>) -> impl IntoResponse {
    let addresses = list_ipv4_interfaces();
    let primary = addresses
        .first()
        .map(|a| a.address)
        .unwrap_or(Ipv4Addr::LOCALHOST);
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default();
    api_success(json!({
        "port": state.network.get_port(),
        "addresses": addresses,
        "primaryAddress": primary.to_string(),
        "advertisedUrl": state.network.url_builder().base_url(),
        "hostname": hostname,
    }))
}

async fn list_monitors(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "monitors": state.runtime.snapshot(),
        "manualStops": state.runtime.manual_stops(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockCall;
    use crate::services::test_support::Harness;

    mod helpers {
        use super::*;

        #[test]
        fn player_ip_must_be_unicast_ipv4() {
            assert_eq!(parse_player_ip(" 192.168.1.20 ").unwrap(), "192.168.1.20");
            assert!(parse_player_ip("192.168.001.20").is_err());
            assert!(parse_player_ip("::1").is_err());
            assert!(parse_player_ip("0.0.0.0").is_err());
            assert!(parse_player_ip("224.0.0.1").is_err());
            assert!(parse_player_ip("wiim.local").is_err());
        }

        #[test]
        fn volume_range_is_enforced() {
            assert_eq!(parse_volume(0).unwrap(), 0);
            assert_eq!(parse_volume(100).unwrap(), 100);
            assert!(parse_volume(101).is_err());
            assert!(parse_volume(-1).is_err());
        }
    }

    mod handlers {
        use super::*;

        fn state(h: &Harness) -> AppState {
            AppState::from(&h.services)
        }

        #[tokio::test]
        async fn sync_drops_manually_stopped_players() {
            let h = Harness::new();
            h.runtime.mark_manual_stop("p2");
            let payload = SyncRequest {
                player_selections: Some(BTreeMap::from([
                    ("p1".to_string(), "http://192.168.1.10:3000/media/a.mp3".to_string()),
                    ("p2".to_string(), "/media/b.mp3".to_string()),
                ])),
                player_groups: Vec::new(),
                player_volumes: Some(BTreeMap::from([("p1".to_string(), 30)])),
            };

            assert!(sync_config(State(state(&h)), Json(payload)).await.is_ok());
            let config = h.desired.snapshot();
            assert_eq!(
                config.player_selections,
                BTreeMap::from([("p1".to_string(), "/media/a.mp3".to_string())])
            );
            assert_eq!(config.player_volumes.get("p1"), Some(&30));
        }

        #[tokio::test]
        async fn sync_requires_selections() {
            let h = Harness::new();
            let payload = SyncRequest {
                player_selections: None,
                player_groups: Vec::new(),
                player_volumes: None,
            };
            assert!(matches!(
                sync_config(State(state(&h)), Json(payload)).await,
                Err(WiimError::InvalidRequest(_))
            ));
        }

        #[tokio::test]
        async fn removing_a_player_purges_its_state() {
            let h = Harness::new();
            let p = h.add_player("10.0.0.2", "Kitchen");
            h.desired.set_selection(&p.id, "/media/a.mp3");
            h.desired.set_volume(&p.id, 40);
            h.runtime.arm(&p.id, &h.url("/media/a.mp3"), None);

            assert!(remove_player(Path(p.id.clone()), State(state(&h)))
                .await
                .is_ok());
            assert!(!h.registry.contains(&p.id));
            assert!(h.desired.selection(&p.id).is_none());
            assert!(h.desired.volume(&p.id).is_none());
            assert!(h.runtime.get(&p.id).is_none());

            assert!(matches!(
                remove_player(Path(p.id.clone()), State(state(&h))).await,
                Err(WiimError::UnknownPlayer(_))
            ));
        }

        #[tokio::test]
        async fn active_shortcuts_need_an_active_player() {
            let h = Harness::new();
            assert!(matches!(
                active_status(State(state(&h))).await,
                Err(WiimError::NoActivePlayer)
            ));
            assert!(matches!(
                active_volume(Path("up".to_string()), State(state(&h)), None).await,
                Err(WiimError::NoActivePlayer)
            ));
            let response = active_info(State(state(&h))).await.into_response();
            assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn active_control_stop_is_a_manual_stop() {
            let h = Harness::new();
            let p = h.add_player("10.0.0.2", "Kitchen");
            h.desired.set_selection(&p.id, "/media/a.mp3");

            assert!(active_control(Path("stop".to_string()), State(state(&h)))
                .await
                .is_ok());
            assert!(h.runtime.is_manually_stopped(&p.id));
            assert!(h.desired.selection(&p.id).is_none());

            assert!(active_control(Path("next".to_string()), State(state(&h)))
                .await
                .is_ok());
            assert_eq!(
                h.mock.count(&p.ip, &MockCall::Transport(TransportAction::Next)),
                1
            );
        }

        #[tokio::test]
        async fn active_volume_actions_reach_the_device() {
            let h = Harness::new();
            let p = h.add_player("10.0.0.2", "Kitchen");

            let set = Some(Json(ActiveVolumeRequest { volume: Some(25) }));
            assert!(active_volume(Path("set".to_string()), State(state(&h)), set)
                .await
                .is_ok());
            assert_eq!(h.desired.volume(&p.id), Some(25));

            for action in ["up", "down", "mute", "unmute"] {
                assert!(active_volume(Path(action.to_string()), State(state(&h)), None)
                    .await
                    .is_ok());
            }
            assert_eq!(h.mock.count(&p.ip, &MockCall::VolumeStep(VolumeStep::Up)), 1);
            assert_eq!(h.mock.count(&p.ip, &MockCall::VolumeStep(VolumeStep::Down)), 1);
            assert_eq!(h.mock.count(&p.ip, &MockCall::Mute(true)), 1);
            assert_eq!(h.mock.count(&p.ip, &MockCall::Mute(false)), 1);

            assert!(matches!(
                active_volume(Path("set".to_string()), State(state(&h)), None).await,
                Err(WiimError::InvalidRequest(_))
            ));
            assert!(matches!(
                active_volume(Path("louder".to_string()), State(state(&h)), None).await,
                Err(WiimError::InvalidRequest(_))
            ));
        }

        #[tokio::test]
        async fn media_play_targets_the_active_player() {
            let h = Harness::new();
            let first = h.add_player("10.0.0.2", "Kitchen");
            let second = h.add_player("10.0.0.3", "Lounge");
            h.registry.set_active(&second.id).unwrap();
            h.add_media("a.mp3");

            assert!(matches!(
                active_play_media(State(state(&h)), None).await,
                Err(WiimError::InvalidRequest(_))
            ));

            let body = Some(Json(MediaPlayRequest {
                file_url: Some(h.url("/media/a.mp3")),
            }));
            assert!(active_play_media(State(state(&h)), body).await.is_ok());
            assert_eq!(h.mock.play_count(&first.ip), 0);
            assert_eq!(h.mock.plays_for(&second.ip), vec![h.url("/media/a.mp3")]);
            assert_eq!(
                h.desired.selection(&second.id).as_deref(),
                Some("/media/a.mp3")
            );
        }

        #[tokio::test]
        async fn playlist_uses_the_request_host() {
            let h = Harness::new();
            h.add_media("loop.mp3");
            let mut headers = HeaderMap::new();
            headers.insert(header::HOST, "wiim-server.lan:3000".parse().unwrap());

            let response = media_playlist(Path("loop.mp3".to_string()), State(state(&h)), headers)
                .await
                .into_response();
            assert_eq!(response.status(), axum::http::StatusCode::OK);
            assert_eq!(
                response.headers().get(header::CONTENT_TYPE).unwrap(),
                "audio/x-mpegurl"
            );
            assert_eq!(
                response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
                "inline; filename=\"loop.mp3.m3u\""
            );
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            assert_eq!(
                std::str::from_utf8(&body).unwrap(),
                "#EXTM3U\n#EXTINF:-1,loop.mp3\nhttp://wiim-server.lan:3000/media/loop.mp3\n"
            );

            let missing =
                media_playlist(Path("gone.mp3".to_string()), State(state(&h)), HeaderMap::new())
                    .await
                    .into_response();
            assert_eq!(missing.status(), axum::http::StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn unknown_control_action_is_rejected() {
            let h = Harness::new();
            let p = h.add_player("10.0.0.2", "Kitchen");
            assert!(matches!(
                control(Path((p.id, "rewind".to_string())), State(state(&h))).await,
                Err(WiimError::InvalidRequest(_))
            ));
        }
    }
}
