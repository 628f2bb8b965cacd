//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. Runtime state is created here
//! and handed to every service that needs it; nothing is a module-level global.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::context::NetworkContext;
use crate::device::{build_device_http_client, WiimClientImpl, WiimDevice, WiimStatus};
use crate::error::{WiimError, WiimResult};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::{
    DesiredStateStore, GroupCoordinator, MediaLibrary, PlaybackService, PlayerMonitor,
    PlayerRegistry, Reconciler, RuntimeState, ScanService, ServerStats, SettingsStore,
    StartupRecovery,
};
use crate::state::Config;

/// Container for all bootstrapped services.
///
/// Consumed by `AppState` to build the HTTP application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    pub config: Config,
    /// Device client shared by every service.
    pub device: Arc<dyn WiimDevice>,
    pub registry: Arc<PlayerRegistry>,
    pub desired: Arc<DesiredStateStore>,
    /// Monitor states and manual-stop marks.
    pub runtime: Arc<RuntimeState>,
    pub monitor: Arc<PlayerMonitor>,
    pub playback: Arc<PlaybackService>,
    pub groups: Arc<GroupCoordinator>,
    pub reconciler: Arc<Reconciler>,
    pub recovery: Arc<StartupRecovery>,
    pub media: Arc<MediaLibrary>,
    pub settings: Arc<SettingsStore>,
    pub scanner: Arc<ScanService>,
    pub stats: Arc<ServerStats>,
    /// Network configuration (port, advertised IP).
    pub network: NetworkContext,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Root cancellation token; every background loop hangs off it.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Spawns the reconciliation loop and startup recovery (restore, then the
    /// watchdog).
    pub fn start_background_tasks(&self) {
        let reconciler = Arc::clone(&self.reconciler);
        self.spawner.spawn(reconciler.run(self.cancel_token.clone()));

        let recovery = Arc::clone(&self.recovery);
        self.spawner.spawn(recovery.run(self.cancel_token.clone()));

        log::info!("[Bootstrap] Background tasks started");
    }

    /// Initiates graceful shutdown: cancels the reconciler, recovery and every
    /// monitor loop.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.cancel_token.cancel();
        log::info!(
            "[Bootstrap] Shutdown complete ({} monitor(s) cancelled)",
            self.runtime.monitored().len()
        );
    }
}

/// Bootstraps all application services with their dependencies.
///
/// The wiring order follows the dependency order:
///
/// 1. Device HTTP client (shared connection pool, relaxed TLS)
/// 2. Durable stores (registry, desired state, media, settings)
/// 3. Runtime state and the per-player monitor
/// 4. Playback handlers, group coordinator
/// 5. Reconciler and startup recovery
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client
/// cannot be built.
pub fn bootstrap_services(
    config: &Config,
    network: NetworkContext,
) -> WiimResult<BootstrappedServices> {
    config
        .validate()
        .map_err(|e| WiimError::Internal(format!("Invalid configuration: {}", e)))?;

    let http_client = build_device_http_client(config.request_timeout())
        .map_err(|e| WiimError::Internal(format!("Failed to create HTTP client: {}", e)))?;
    let device = Arc::new(WiimClientImpl::new(http_client));

    Ok(assemble(config, network, device, TokioSpawner::current()))
}

/// Wires every service around a concrete device implementation.
pub(crate) fn assemble<D>(
    config: &Config,
    network: NetworkContext,
    device_impl: Arc<D>,
    spawner: TokioSpawner,
) -> BootstrappedServices
where
    D: WiimDevice + 'static,
{
    let cancel_token = CancellationToken::new();
    let stagger = config.stagger();

    let device: Arc<dyn WiimDevice> = Arc::clone(&device_impl) as Arc<dyn WiimDevice>;
    let status_client: Arc<dyn WiimStatus> = device_impl;

    let registry = Arc::new(PlayerRegistry::load(&config.data_dir));
    let desired = Arc::new(DesiredStateStore::load(&config.data_dir));
    let media = Arc::new(MediaLibrary::load(&config.data_dir, config.media_dir.clone()));
    let settings = Arc::new(SettingsStore::load(&config.data_dir));

    let runtime = Arc::new(RuntimeState::new(cancel_token.clone()));
    let monitor = Arc::new(PlayerMonitor::new(
        Arc::clone(&runtime),
        Arc::clone(&registry),
        Arc::clone(&device),
        spawner.clone(),
        config.monitor.clone(),
    ));

    let playback = Arc::new(PlaybackService::new(
        Arc::clone(&registry),
        Arc::clone(&desired),
        Arc::clone(&runtime),
        Arc::clone(&monitor),
        Arc::clone(&media),
        Arc::clone(&device),
        network.clone(),
    ));

    let groups = Arc::new(GroupCoordinator::new(
        Arc::clone(&registry),
        Arc::clone(&desired),
        Arc::clone(&runtime),
        Arc::clone(&playback),
        Arc::clone(&device),
        stagger,
    ));

    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&registry),
        Arc::clone(&runtime),
        Arc::clone(&device),
        config.reconciler.clone(),
        stagger,
    ));

    let recovery = Arc::new(StartupRecovery::new(
        Arc::clone(&registry),
        Arc::clone(&desired),
        Arc::clone(&runtime),
        Arc::clone(&playback),
        Arc::clone(&groups),
        Arc::clone(&device),
        config.recovery.clone(),
        stagger,
    ));

    let scanner = Arc::new(ScanService::new(
        Arc::clone(&registry),
        status_client,
        config.use_https,
        config.scan_concurrency,
    ));
    let stats = Arc::new(ServerStats::new(config.enable_stats));

    BootstrappedServices {
        config: config.clone(),
        device,
        registry,
        desired,
        runtime,
        monitor,
        playback,
        groups,
        reconciler,
        recovery,
        media,
        settings,
        scanner,
        stats,
        network,
        spawner,
        cancel_token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Harness;
    use std::time::Duration;

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = Config {
            request_timeout_ms: 0,
            ..Default::default()
        };
        let result = bootstrap_services(&config, NetworkContext::for_test());
        assert!(matches!(result, Err(WiimError::Internal(_))));
    }

    #[tokio::test]
    async fn bootstrap_builds_real_client() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            media_dir: dir.path().join("media"),
            ..Default::default()
        };
        let services = bootstrap_services(&config, NetworkContext::for_test()).unwrap();
        assert!(services.registry.list().is_empty());
        assert!(!services.cancel_token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_monitors_and_loops() {
        let h = Harness::new();
        let p = h.add_player("10.0.0.2", "Kitchen");
        let token = h.runtime.arm(&p.id, &h.url("/media/a.mp3"), None);
        h.services.start_background_tasks();

        h.services.shutdown();
        assert!(token.is_cancelled());

        // No loop wakes up after shutdown.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(h.mock.calls().is_empty());
    }
}
