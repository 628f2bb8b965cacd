//! Fully wired services around a [`MockDevice`], for scheduler tests.

use std::sync::Arc;

use tempfile::TempDir;

use crate::bootstrap::{assemble, BootstrappedServices};
use crate::context::NetworkContext;
use crate::device::mock::MockDevice;
use crate::runtime::TokioSpawner;
use crate::services::{
    DesiredStateStore, GroupCoordinator, NewPlayer, PlaybackService, Player, PlayerRegistry,
    Reconciler, RuntimeState, StartupRecovery,
};
use crate::state::Config;

pub(crate) struct Harness {
    _dir: TempDir,
    pub services: BootstrappedServices,
    pub mock: Arc<MockDevice>,
    pub registry: Arc<PlayerRegistry>,
    pub desired: Arc<DesiredStateStore>,
    pub runtime: Arc<RuntimeState>,
    pub playback: Arc<PlaybackService>,
    pub groups: Arc<GroupCoordinator>,
    pub reconciler: Arc<Reconciler>,
    pub recovery: Arc<StartupRecovery>,
}

impl Harness {
    /// Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: dir.path().join("data"),
            media_dir: dir.path().join("media"),
            ..Default::default()
        };
        let mock = Arc::new(MockDevice::new());
        let services = assemble(
            &config,
            NetworkContext::for_test(),
            Arc::clone(&mock),
            TokioSpawner::current(),
        );
        Self {
            _dir: dir,
            mock,
            registry: Arc::clone(&services.registry),
            desired: Arc::clone(&services.desired),
            runtime: Arc::clone(&services.runtime),
            playback: Arc::clone(&services.playback),
            groups: Arc::clone(&services.groups),
            reconciler: Arc::clone(&services.reconciler),
            recovery: Arc::clone(&services.recovery),
            services,
        }
    }

    pub fn add_player(&self, ip: &str, name: &str) -> Player {
        self.registry
            .upsert(NewPlayer {
                ip: ip.to_string(),
                name: Some(name.to_string()),
                uuid: None,
                use_https: true,
            })
            .0
    }

    /// Puts a file into the media directory.
    pub fn add_media(&self, filename: &str) {
        let dir = self.services.media.media_dir();
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(filename), b"fake audio").unwrap();
    }

    /// Device-reachable URL for a media path.
    pub fn url(&self, path: &str) -> String {
        self.services.network.media_url(path)
    }
}
