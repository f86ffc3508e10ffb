//! Connection registry for live connections and room membership.
//!
//! The registry maintains three maps under one lock: id → handle (every live
//! connection), room → member ids (for emit), and id → rooms (for cleanup on
//! disconnect). The last one is a back-index so removing a connection never
//! scans every room.
//!
//! Rooms are created lazily on first join and pruned when their last member
//! leaves, so an empty room and an absent room look the same to queries.
//! [`Registry::emit_to_room`] still reports an absent room as
//! [`RegistryError::UnknownRoom`] so callers can spot misspelled room names.
//!
//! # Concurrency
//!
//! Mutations take the write lock for the duration of the map updates only.
//! Broadcast and emit snapshot their targets under the read lock and release
//! it before calling into any transport, so a slow peer never stalls
//! unrelated registry operations.
//!
//! # Disconnects
//!
//! The registry has no lifecycle hooks. Whoever owns the transport must call
//! [`Registry::remove`] once when a connection closes.

#![allow(clippy::disallowed_types, reason = "Short, non-async critical sections")]

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    config::RegistryConfig,
    error::{DeliveryFailure, DeliveryReport, RegistryError},
    handle::{ConnectionHandle, ConnectionId},
    ids::{IdSource, SystemIds},
    outbound::Outbound,
};

#[derive(Debug, Default)]
struct State {
    /// Connection ID → handle
    connections: HashMap<ConnectionId, ConnectionHandle>,
    /// Room name → member connection IDs
    rooms: HashMap<String, HashSet<ConnectionId>>,
    /// Connection ID → rooms it is a member of
    memberships: HashMap<ConnectionId, HashSet<String>>,
}

impl State {
    /// True if `handle` is the live connection registered under its id.
    fn is_live(&self, handle: &ConnectionHandle) -> bool {
        self.connections.get(handle.id()).is_some_and(|live| live.same_connection(handle))
    }

    /// Drop `id` from `room`'s member set, pruning the room if it empties.
    /// Leaves the back-index alone.
    fn drop_member(&mut self, room: &str, id: &ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };

        let removed = members.remove(id);
        if members.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }
}

/// Registry of live connections and the rooms they belong to.
///
/// Construct one per server and share it as `Arc<Registry>`. Independent
/// registries never see each other's connections.
///
/// Generic over `S` (id source) so tests can replay connection ids.
pub struct Registry<S: IdSource = SystemIds> {
    state: RwLock<State>,
    config: RegistryConfig,
    ids: S,
}

impl Registry {
    /// Create an empty registry with default limits.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with the given limits.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_id_source(config, SystemIds)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: IdSource> Registry<S> {
    /// Create an empty registry drawing connection ids from `ids`.
    pub fn with_id_source(config: RegistryConfig, ids: S) -> Self {
        Self { state: RwLock::new(State::default()), config, ids }
    }

    /// Limits this registry enforces.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a new connection.
    ///
    /// Uses `id` if given, otherwise generates a random one. Fails with
    /// [`RegistryError::DuplicateId`] if `id` belongs to a live connection and
    /// with [`RegistryError::CapacityExceeded`] if the registry is full.
    pub fn add<O: Outbound + 'static>(
        &self,
        outbound: O,
        id: Option<ConnectionId>,
    ) -> Result<ConnectionHandle, RegistryError> {
        let mut state = self.write();

        if state.connections.len() >= self.config.max_connections {
            return Err(RegistryError::CapacityExceeded { limit: self.config.max_connections });
        }

        let id = match id {
            Some(id) if state.connections.contains_key(&id) => {
                return Err(RegistryError::DuplicateId(id));
            },
            Some(id) => id,
            None => self.fresh_id(&state),
        };

        let handle = ConnectionHandle::new(id.clone(), Box::new(outbound));
        state.connections.insert(id, handle.clone());
        drop(state);

        tracing::debug!(id = %handle.id(), "connection registered");
        Ok(handle)
    }

    /// Register a new connection under a generated id.
    pub fn add_generated<O: Outbound + 'static>(
        &self,
        outbound: O,
    ) -> Result<ConnectionHandle, RegistryError> {
        self.add(outbound, None)
    }

    /// Unregister a connection and drop all of its room memberships.
    ///
    /// Returns `false` if the handle was not live (already removed, never
    /// added, or superseded by a newer connection with the same id).
    pub fn remove(&self, handle: &ConnectionHandle) -> bool {
        let rooms = {
            let mut state = self.write();
            if !state.is_live(handle) {
                return false;
            }

            state.connections.remove(handle.id());
            let rooms = state.memberships.remove(handle.id()).unwrap_or_default();
            for room in &rooms {
                state.drop_member(room, handle.id());
            }
            rooms
        };

        tracing::debug!(id = %handle.id(), rooms = rooms.len(), "connection removed");
        true
    }

    /// Send `payload` to every live connection.
    ///
    /// Targets are the connections live when the call starts. Connections
    /// removed while the pass runs are skipped; connections added while it
    /// runs are not targeted. No connection receives the payload twice.
    pub fn broadcast(&self, payload: &str) -> DeliveryReport {
        let targets: Vec<ConnectionHandle> = self.read().connections.values().cloned().collect();
        self.deliver(&targets, payload)
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// Returns `true` if membership changed, `false` if the connection was
    /// already a member.
    pub fn join_room(&self, handle: &ConnectionHandle, room: &str) -> Result<bool, RegistryError> {
        let mut state = self.write();
        if !state.is_live(handle) {
            return Err(RegistryError::UnknownHandle(handle.id().clone()));
        }

        let State { rooms, memberships, .. } = &mut *state;
        let joined = memberships.entry(handle.id().clone()).or_default();
        if joined.contains(room) {
            return Ok(false);
        }
        if joined.len() >= self.config.max_rooms_per_connection {
            return Err(RegistryError::RoomLimitExceeded {
                id: handle.id().clone(),
                limit: self.config.max_rooms_per_connection,
            });
        }

        joined.insert(room.to_owned());
        rooms.entry(room.to_owned()).or_default().insert(handle.id().clone());
        drop(state);

        tracing::debug!(id = %handle.id(), room, "joined room");
        Ok(true)
    }

    /// Remove a connection from one room.
    ///
    /// Returns `true` if the connection was a member and is not anymore.
    pub fn leave_room(&self, handle: &ConnectionHandle, room: &str) -> bool {
        let mut state = self.write();
        if !state.is_live(handle) {
            return false;
        }

        let left = state.memberships.get_mut(handle.id()).is_some_and(|r| r.remove(room));
        if left {
            state.drop_member(room, handle.id());
        }
        drop(state);

        if left {
            tracing::debug!(id = %handle.id(), room, "left room");
        }
        left
    }

    /// Remove a connection from every room it is in.
    ///
    /// Returns the rooms it left, sorted.
    pub fn leave_all_rooms(&self, handle: &ConnectionHandle) -> Vec<String> {
        let mut left: Vec<String> = {
            let mut state = self.write();
            if !state.is_live(handle) {
                return Vec::new();
            }

            let rooms = state.memberships.get_mut(handle.id()).map(std::mem::take);
            let rooms = rooms.unwrap_or_default();
            for room in &rooms {
                state.drop_member(room, handle.id());
            }
            rooms.into_iter().collect()
        };
        left.sort_unstable();

        tracing::debug!(id = %handle.id(), rooms = left.len(), "left all rooms");
        left
    }

    /// Send `payload` to every member of `room` except `exclude`.
    ///
    /// `exclude` is compared by id. Fails with [`RegistryError::UnknownRoom`]
    /// and sends nothing if the room has no entry.
    pub fn emit_to_room(
        &self,
        room: &str,
        payload: &str,
        exclude: Option<&ConnectionHandle>,
    ) -> Result<DeliveryReport, RegistryError> {
        let targets: Vec<ConnectionHandle> = {
            let state = self.read();
            let Some(members) = state.rooms.get(room) else {
                tracing::warn!(room, "emit to unknown room");
                return Err(RegistryError::UnknownRoom(room.to_owned()));
            };

            members
                .iter()
                .filter(|id| exclude.is_none_or(|excluded| excluded.id() != *id))
                .filter_map(|id| state.connections.get(id).cloned())
                .collect()
        };

        Ok(self.deliver(&targets, payload))
    }

    /// Send `payload` to a single connection by id.
    pub fn send_to(&self, id: &ConnectionId, payload: &str) -> Result<(), RegistryError> {
        let handle = self.get(id).ok_or_else(|| RegistryError::UnknownHandle(id.clone()))?;

        handle.send(payload).map_err(|error| {
            tracing::warn!(%id, %error, "delivery failed");
            RegistryError::Delivery(DeliveryFailure { id: id.clone(), error })
        })
    }

    /// Live handle registered under `id`.
    pub fn get(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        self.read().connections.get(id).cloned()
    }

    /// Check if a handle is live in this registry.
    pub fn contains(&self, handle: &ConnectionHandle) -> bool {
        self.read().is_live(handle)
    }

    /// Check if a live handle is a member of `room`.
    pub fn is_member(&self, handle: &ConnectionHandle, room: &str) -> bool {
        let state = self.read();
        state.is_live(handle) && state.rooms.get(room).is_some_and(|m| m.contains(handle.id()))
    }

    /// Rooms with at least one member, sorted.
    pub fn room_ids(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.read().rooms.keys().cloned().collect();
        rooms.sort_unstable();
        rooms
    }

    /// Member ids of `room`, sorted. Empty for an unknown room.
    pub fn room_members(&self, room: &str) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> =
            self.read().rooms.get(room).into_iter().flatten().cloned().collect();
        members.sort_unstable();
        members
    }

    /// Rooms a live handle is a member of, sorted.
    pub fn rooms_of(&self, handle: &ConnectionHandle) -> Vec<String> {
        let state = self.read();
        if !state.is_live(handle) {
            return Vec::new();
        }

        let mut rooms: Vec<String> =
            state.memberships.get(handle.id()).into_iter().flatten().cloned().collect();
        rooms.sort_unstable();
        rooms
    }

    /// Total number of live connections.
    pub fn connection_count(&self) -> usize {
        self.read().connections.len()
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.read().rooms.len()
    }

    /// Number of members in `room`.
    pub fn room_size(&self, room: &str) -> usize {
        self.read().rooms.get(room).map_or(0, HashSet::len)
    }

    /// Send to each target that is still live, collecting failures.
    fn deliver(&self, targets: &[ConnectionHandle], payload: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for handle in targets {
            if !self.read().is_live(handle) {
                continue;
            }

            match handle.send(payload) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    tracing::warn!(id = %handle.id(), %error, "delivery failed");
                    report.failures.push(DeliveryFailure { id: handle.id().clone(), error });
                },
            }
        }

        report
    }

    fn fresh_id(&self, state: &State) -> ConnectionId {
        loop {
            let id = self.ids.connection_id();
            if !state.connections.contains_key(&id) {
                return id;
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: IdSource> fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("Registry")
            .field("connection_count", &state.connections.len())
            .field("room_count", &state.rooms.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
