//! Unified Scheduler (C9, spec §4.9): one tick loop per process polling
//! multiple sources (plugin feeds, experiences) through a shared interface.
//! No teacher analogue exists for a polling tick loop; grounded on spec
//! §4.9 directly, reusing the round-robin/dyn-safe-local-trait conventions
//! established in `ragcore-worker`.

pub mod experience;
pub mod history;
pub mod plugin_feed;
pub mod scheduler;
pub mod source;

pub use experience::{ActiveUsersProvider, ExperienceRepository, ExperienceRunRepository, ExperienceSource};
pub use history::{TickHistory, TickRecord};
pub use plugin_feed::{PluginExecutionRepository, PluginFeedRepository, PluginFeedSource};
pub use scheduler::SchedulerRuntime;
pub use source::{Source, TickCounters};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Queue(#[from] ragcore_infra::QueueError),
    #[error("repository operation failed: {0}")]
    Repository(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
