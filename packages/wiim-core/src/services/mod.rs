//! Application services layer.
//!
//! Stores (registry, desired state, media, settings), the runtime state
//! container and the orchestration services that sit between the HTTP API
//! and the device client.

pub mod desired_state;
pub mod group_coordinator;
pub mod media_library;
pub mod playback;
pub mod player_monitor;
pub mod player_registry;
pub mod reconciler;
pub mod recovery;
pub mod runtime_state;
pub mod scanner;
pub mod settings;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support;

pub use desired_state::{CleanupReport, DesiredStateStore, PlaybackConfig, PlayerGroup};
pub use group_coordinator::{
    GroupCommandResult, GroupCoordinator, GroupPlayResult, MemberResult, StartMode,
};
pub use media_library::{MediaFile, MediaLibrary};
pub use playback::{PlayOutcome, PlaybackService};
pub use player_monitor::{MonitorDecision, MonitorStep, PlayerMonitor};
pub use player_registry::{NewPlayer, Player, PlayerRegistry, PlayersDocument, UpsertOutcome};
pub use reconciler::{CycleReport, Reconciler};
pub use recovery::{RestoreReport, StartupRecovery, WatchdogReport};
pub use runtime_state::{MonitorSnapshot, MonitorState, RuntimeState};
pub use scanner::{ScanOutcome, ScanService, ScanSnapshot};
pub use settings::{Settings, SettingsStore};
pub use stats::{ServerStats, StatsSnapshot};
