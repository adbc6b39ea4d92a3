pub mod entry;
pub mod orchestrator;
pub mod queue;

pub use entry::CachedAdEntry;
pub use orchestrator::{CacheEvent, CacheOrchestrator, OrchestratorSettings, OrchestratorState};
pub use queue::AdCacheQueue;
