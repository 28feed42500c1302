//! Room registry implementation
//!
//! The single source of truth for which session keys are live.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, RwLock};

use crate::error::Result;
use crate::stats::RoomStats;
use crate::worker::WorkerHandle;

use super::config::RegistryConfig;
use super::entry::{CloseReason, PublishedRoom, Room};
use super::error::RegistryError;
use super::key::{OutputMode, SessionKey};

/// Capacity of the room-created notification channel
const CREATED_CAPACITY: usize = 64;

/// Registry of live rooms
///
/// Publish reserves the key, starts the worker without holding the map
/// lock, then commits the room. A key that is live or reserved cannot be
/// published again, so two racing publishers never both spawn a worker.
pub struct RoomRegistry {
    /// Map of session key to live room
    rooms: RwLock<HashMap<SessionKey, Arc<Room>>>,

    /// Keys whose worker is starting
    starting: Mutex<HashSet<SessionKey>>,

    /// Wakes subscribers waiting for a key to go live
    created: broadcast::Sender<SessionKey>,

    next_room_id: AtomicU64,

    config: RegistryConfig,
}

impl RoomRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        let (created, _) = broadcast::channel(CREATED_CAPACITY);

        Self {
            rooms: RwLock::new(HashMap::new()),
            starting: Mutex::new(HashSet::new()),
            created,
            next_room_id: AtomicU64::new(1),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a new room for `key` and start its worker
    ///
    /// Fails with [`RegistryError::SessionConflict`] without touching the
    /// existing room when the key is already live.
    pub async fn publish(&self, key: &SessionKey, mode: OutputMode) -> Result<PublishedRoom> {
        let reservation = self.reserve(key).await?;

        // Released on failure or cancellation; the worker is killed on drop
        let (worker, io) = WorkerHandle::start(&self.config.worker, mode, key).await?;

        let room_id = self.next_room_id.fetch_add(1, Ordering::Relaxed);
        let room = Arc::new(Room::new(room_id, key.clone(), mode, worker));

        let mut rooms = self.rooms.write().await;
        rooms.insert(key.clone(), Arc::clone(&room));
        drop(reservation);
        drop(rooms);

        // No receivers simply means nobody is waiting
        let _ = self.created.send(key.clone());

        tracing::info!(key = %key, room_id = room_id, mode = %mode, "Room created");

        Ok(PublishedRoom {
            room,
            input: io.input,
            output: io.output,
        })
    }

    /// Claim `key` for a publish whose worker is about to start
    async fn reserve(&self, key: &SessionKey) -> Result<Reservation<'_>> {
        let rooms = self.rooms.read().await;
        let mut starting = self.starting.lock();

        if let Some(existing) = rooms.get(key) {
            tracing::warn!(
                key = %key,
                room_id = existing.id(),
                "Publish rejected, session already active"
            );
            return Err(RegistryError::SessionConflict(key.clone()).into());
        }
        if !starting.insert(key.clone()) {
            tracing::warn!(key = %key, "Publish rejected, session already starting");
            return Err(RegistryError::SessionConflict(key.clone()).into());
        }

        Ok(Reservation {
            starting: &self.starting,
            key: key.clone(),
        })
    }

    /// Find the live room for `key`
    ///
    /// Rooms whose teardown has begun are treated as gone.
    pub async fn lookup(&self, key: &SessionKey) -> Option<Arc<Room>> {
        let rooms = self.rooms.read().await;
        rooms.get(key).filter(|room| !room.is_closed()).cloned()
    }

    /// Wait up to `timeout` for `key` to go live
    ///
    /// Dropping the returned future (for example when the requesting
    /// connection goes away) abandons the wait.
    pub async fn wait_for_room(
        &self,
        key: &SessionKey,
        timeout: Duration,
    ) -> std::result::Result<Arc<Room>, RegistryError> {
        // Subscribe before the first lookup so a publish in between is not missed
        let mut created = self.created.subscribe();

        if let Some(room) = self.lookup(key).await {
            return Ok(room);
        }
        if timeout.is_zero() {
            return Err(RegistryError::SessionNotFound(key.clone()));
        }

        tracing::debug!(key = %key, timeout_ms = timeout.as_millis() as u64, "Waiting for room");

        let wait = async {
            loop {
                match created.recv().await {
                    Ok(created_key) if &created_key == key => {
                        if let Some(room) = self.lookup(key).await {
                            return Some(room);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if let Some(room) = self.lookup(key).await {
                            return Some(room);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Some(room)) => Ok(room),
            _ => Err(RegistryError::WaitTimedOut {
                key: key.clone(),
                waited: timeout,
            }),
        }
    }

    /// Tear a room down: kill its worker, drop its subscribers, remove it
    ///
    /// Idempotent. Returns `true` only for the call that performed the
    /// teardown.
    pub async fn close_room(&self, room: &Room, reason: CloseReason) -> bool {
        if !room.begin_close() {
            return false;
        }

        room.worker().terminate();
        let subscribers = room.fanout().close();
        let removed = self.remove(room).await;

        tracing::info!(
            key = %room.key(),
            room_id = room.id(),
            reason = %reason,
            subscribers = subscribers,
            bytes_in = room.bytes_in(),
            removed = removed,
            "Room closed"
        );

        true
    }

    /// Remove `room` from the map if it is still the entry for its key
    pub(crate) async fn remove(&self, room: &Room) -> bool {
        let mut rooms = self.rooms.write().await;

        match rooms.get(room.key()) {
            Some(current) if current.id() == room.id() => {
                rooms.remove(room.key());
                true
            }
            _ => false,
        }
    }

    /// Tear down every live room
    pub async fn close_all(&self) {
        let rooms: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();

        for room in rooms {
            self.close_room(&room, CloseReason::Shutdown).await;
        }
    }

    /// Number of live rooms
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Snapshot of every live room
    pub async fn stats(&self) -> Vec<RoomStats> {
        let rooms = self.rooms.read().await;
        rooms.values().map(|room| room.stats()).collect()
    }
}

/// A key held between the conflict check and the room insert
///
/// Commit drops it while holding the map's write lock.
struct Reservation<'a> {
    starting: &'a Mutex<HashSet<SessionKey>>,
    key: SessionKey,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.starting.lock().remove(&self.key);
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
