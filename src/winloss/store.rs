use crate::error::StoreError;
use crate::utils::now_millis;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A win/loss notification waiting for (re)delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWinLossEvent {
    pub key: String,
    pub auction_id: String,
    pub bid_id: String,
    pub is_win: bool,
    pub endpoint: String,
    pub app_key: String,
    pub payload: Map<String, Value>,
    pub created_at: u64,
    #[serde(default)]
    pub attempts: u32,
}

impl PendingWinLossEvent {
    pub fn new(
        auction_id: &str,
        bid_id: &str,
        is_win: bool,
        endpoint: &str,
        app_key: &str,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            key: Self::event_key(auction_id, bid_id, is_win),
            auction_id: auction_id.to_string(),
            bid_id: bid_id.to_string(),
            is_win,
            endpoint: endpoint.to_string(),
            app_key: app_key.to_string(),
            payload,
            created_at: now_millis(),
            attempts: 0,
        }
    }

    /// Identity of a notification: one win or loss per bid per auction
    pub fn event_key(auction_id: &str, bid_id: &str, is_win: bool) -> String {
        format!(
            "{}:{}:{}",
            auction_id,
            bid_id,
            if is_win { "win" } else { "loss" }
        )
    }
}

/// Durable storage for undelivered notifications
pub trait PendingEventStore: Send + Sync {
    /// Insert or replace by key
    fn save(&self, event: PendingWinLossEvent) -> Result<(), StoreError>;

    /// Returns whether the key was present
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// All events, oldest first
    fn load_all(&self) -> Result<Vec<PendingWinLossEvent>, StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn upsert(events: &mut Vec<PendingWinLossEvent>, event: PendingWinLossEvent, max_events: usize) {
    if let Some(existing) = events.iter_mut().find(|e| e.key == event.key) {
        *existing = event;
        return;
    }
    events.push(event);
    if events.len() > max_events {
        let dropped = events.len() - max_events;
        events.drain(..dropped);
        warn!("Pending event store full, dropped {} oldest event(s)", dropped);
    }
}

/// Process-lifetime store
#[derive(Debug)]
pub struct MemoryEventStore {
    events: Mutex<Vec<PendingWinLossEvent>>,
    max_events: usize,
}

impl MemoryEventStore {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            max_events,
        }
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(500)
    }
}

impl PendingEventStore for MemoryEventStore {
    fn save(&self, event: PendingWinLossEvent) -> Result<(), StoreError> {
        upsert(&mut self.events.lock(), event, self.max_events);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let mut events = self.events.lock();
        let before = events.len();
        events.retain(|e| e.key != key);
        Ok(events.len() != before)
    }

    fn load_all(&self) -> Result<Vec<PendingWinLossEvent>, StoreError> {
        Ok(self.events.lock().clone())
    }

    fn len(&self) -> usize {
        self.events.lock().len()
    }
}

/// Store backed by a JSON array on disk.
///
/// The whole file is rewritten through a temporary sibling and renamed into
/// place on every change, so a crash leaves either the old or the new list.
#[derive(Debug)]
pub struct FileEventStore {
    path: PathBuf,
    events: Mutex<Vec<PendingWinLossEvent>>,
    max_events: usize,
}

impl FileEventStore {
    /// Open `path`, loading events left by a previous run. A missing file is
    /// an empty store.
    pub fn open(path: impl AsRef<Path>, max_events: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let events = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| StoreError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str::<Vec<PendingWinLossEvent>>(&raw).map_err(|e| {
                    StoreError::Corrupt {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?
            }
        } else {
            Vec::new()
        };

        debug!(
            "Opened pending event store {} with {} event(s)",
            path.display(),
            events.len()
        );

        Ok(Self {
            path,
            events: Mutex::new(events),
            max_events,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, events: &[PendingWinLossEvent]) -> Result<(), StoreError> {
        let write_err = |e: String| StoreError::Write {
            path: self.path.display().to_string(),
            reason: e,
        };

        let body = serde_json::to_vec_pretty(events).map_err(|e| write_err(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body).map_err(|e| write_err(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| write_err(e.to_string()))
    }
}

impl PendingEventStore for FileEventStore {
    fn save(&self, event: PendingWinLossEvent) -> Result<(), StoreError> {
        let mut events = self.events.lock();
        upsert(&mut events, event, self.max_events);
        self.persist(&events)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let mut events = self.events.lock();
        let before = events.len();
        events.retain(|e| e.key != key);
        if events.len() == before {
            return Ok(false);
        }
        self.persist(&events)?;
        Ok(true)
    }

    fn load_all(&self) -> Result<Vec<PendingWinLossEvent>, StoreError> {
        Ok(self.events.lock().clone())
    }

    fn len(&self) -> usize {
        self.events.lock().len()
    }
}
