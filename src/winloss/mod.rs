pub mod notifier;
pub mod resolver;
pub mod store;

pub use notifier::WinLossNotifier;
pub use resolver::{FieldResolver, PayloadContext};
pub use store::{FileEventStore, MemoryEventStore, PendingEventStore, PendingWinLossEvent};
