//! HTTP API layer.
//!
//! This module contains thin handlers that delegate to services.
//! It provides the router construction and server startup functionality.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::bootstrap::BootstrappedServices;
use crate::context::NetworkContext;
use crate::services::{
    DesiredStateStore, GroupCoordinator, MediaLibrary, PlaybackService, PlayerRegistry,
    RuntimeState, ScanService, ServerStats, SettingsStore,
};
use crate::state::Config;

pub mod http;
pub mod response;

/// How many ports above the preferred one are tried before giving up.
const PORT_FALLBACK_RANGE: u16 = 10;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<PlayerRegistry>,
    pub desired: Arc<DesiredStateStore>,
    pub runtime: Arc<RuntimeState>,
    pub playback: Arc<PlaybackService>,
    pub groups: Arc<GroupCoordinator>,
    pub media: Arc<MediaLibrary>,
    pub settings: Arc<SettingsStore>,
    pub scanner: Arc<ScanService>,
    pub stats: Arc<ServerStats>,
    /// Network configuration (port, advertised IP).
    pub network: NetworkContext,
}

impl From<&BootstrappedServices> for AppState {
    fn from(services: &BootstrappedServices) -> Self {
        Self {
            config: Arc::new(services.config.clone()),
            registry: Arc::clone(&services.registry),
            desired: Arc::clone(&services.desired),
            runtime: Arc::clone(&services.runtime),
            playback: Arc::clone(&services.playback),
            groups: Arc::clone(&services.groups),
            media: Arc::clone(&services.media),
            settings: Arc::clone(&services.settings),
            scanner: Arc::clone(&services.scanner),
            stats: Arc::clone(&services.stats),
            network: services.network.clone(),
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(e) => log::debug!("[Server] Port {} unavailable: {}", port, e),
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the preferred port, or the next free one.
///
/// Serves until `shutdown` resolves.
pub async fn start_server<F>(state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let preferred = state.config.preferred_port;
    let (port, listener) =
        find_available_port(preferred, preferred.saturating_add(PORT_FALLBACK_RANGE)).await?;
    if port != preferred {
        log::warn!(
            "[Server] Port {} is taken, using {} instead",
            preferred,
            port
        );
    }

    // Media URLs handed to devices must carry the real port.
    state.network.set_port(port);

    log::info!(
        "[Server] Listening on http://0.0.0.0:{} (advertised as {})",
        port,
        state.network.url_builder().base_url()
    );
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
