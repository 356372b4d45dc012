//! Room registry and per-room variable store.
//!
//! A [`Room`] owns an append-only [`Variable`] vector (indices are stable for
//! the room's lifetime) and a capped set of subscriber wake handles. The
//! [`RoomRegistry`] maps project ids to rooms, enforcing the room-count cap
//! and freeing a room once its last subscriber departs (see `DESIGN.md` for
//! why this deviates from the original's "never freed until process exit").

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use crate::buffer::BufferError;
use crate::protocol::{MAX_ROOM_NAME_LENGTH, MAX_VARIABLE_NAME_LENGTH, MAX_VARIABLE_VALUE_LENGTH};
use crate::BoundedBuffer;

pub const MAX_ROOMS: usize = 2048;
pub const MAX_ROOM_VARIABLES: usize = 128;
pub const MAX_ROOM_SUBSCRIBERS: usize = 128;

/// A named value within a room. Append-only: once created its index never
/// changes for the room's lifetime.
pub struct Variable {
    pub name: String,
    pub value: BoundedBuffer,
    pub sequence_number: u64,
}

struct RoomInner {
    variables: Vec<Variable>,
    variable_index: HashMap<String, usize>,
    subscribers: HashMap<Uuid, Arc<Notify>>,
}

/// A room: a named set of variables and the sessions subscribed to it.
pub struct Room {
    pub name: String,
    max_variables: usize,
    max_subscribers: usize,
    inner: RwLock<RoomInner>,
}

impl Room {
    fn new(name: String, max_variables: usize, max_subscribers: usize) -> Self {
        Self {
            name,
            max_variables,
            max_subscribers,
            inner: RwLock::new(RoomInner {
                variables: Vec::new(),
                variable_index: HashMap::new(),
                subscribers: HashMap::new(),
            }),
        }
    }

    /// Add a subscriber's wake handle. Fails (returns `false`) if the room is
    /// already at its subscriber cap.
    pub async fn join(&self, session_id: Uuid, waker: Arc<Notify>) -> bool {
        let mut inner = self.inner.write().await;
        if inner.subscribers.len() >= self.max_subscribers {
            return false;
        }
        inner.subscribers.insert(session_id, waker);
        true
    }

    /// Remove a subscriber. Returns the number of subscribers remaining.
    pub async fn leave(&self, session_id: Uuid) -> usize {
        let mut inner = self.inner.write().await;
        inner.subscribers.remove(&session_id);
        inner.subscribers.len()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.read().await.subscribers.len()
    }

    /// Wake every subscriber except `except` so they run their catch-up pass.
    pub async fn wake_others(&self, except: Uuid) {
        let inner = self.inner.read().await;
        for (id, waker) in &inner.subscribers {
            if *id != except {
                waker.notify_one();
            }
        }
    }

    pub async fn variable_count(&self) -> usize {
        self.inner.read().await.variables.len()
    }

    /// Find or create the index of the variable named `name`. Returns `None`
    /// if `name` is too long or the room already holds its variable cap.
    pub async fn get_or_create_variable_index(&self, name: &str) -> Option<usize> {
        if name.len() > MAX_VARIABLE_NAME_LENGTH {
            return None;
        }
        let mut inner = self.inner.write().await;
        if let Some(&idx) = inner.variable_index.get(name) {
            return Some(idx);
        }
        if inner.variables.len() >= self.max_variables {
            return None;
        }
        let idx = inner.variables.len();
        inner.variables.push(Variable {
            name: name.to_string(),
            value: BoundedBuffer::new(MAX_VARIABLE_VALUE_LENGTH),
            sequence_number: 0,
        });
        inner.variable_index.insert(name.to_string(), idx);
        Some(idx)
    }

    /// Write a new value to the variable at `index`.
    ///
    /// The new value is built in a scratch buffer first; only on success does
    /// it replace the variable's stored value and bump its sequence number.
    /// This means a too-large `value` leaves the variable's prior value and
    /// sequence number untouched, unlike the original C implementation which
    /// cleared the value buffer before attempting the push.
    pub async fn write_value(&self, index: usize, value_bytes: &[u8]) -> Result<u64, BufferError> {
        let mut scratch = BoundedBuffer::new(MAX_VARIABLE_VALUE_LENGTH);
        scratch.push(value_bytes)?;

        let mut inner = self.inner.write().await;
        let var = &mut inner.variables[index];
        var.value = scratch;
        var.sequence_number += 1;
        Ok(var.sequence_number)
    }

    /// Run `f` with read access to the variable vector, e.g. to build a
    /// catch-up batch without cloning every value.
    pub async fn with_variables<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[Variable]) -> R,
    {
        let inner = self.inner.read().await;
        f(&inner.variables)
    }
}

/// Process-wide map of project id to [`Room`].
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    max_rooms: usize,
    max_room_variables: usize,
    max_room_subscribers: usize,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// A registry with the compiled-in defaults ([`MAX_ROOMS`],
    /// [`MAX_ROOM_VARIABLES`], [`MAX_ROOM_SUBSCRIBERS`]).
    pub fn new() -> Self {
        Self::with_caps(MAX_ROOMS, MAX_ROOM_VARIABLES, MAX_ROOM_SUBSCRIBERS)
    }

    /// A registry with caps taken from configuration.
    pub fn with_caps(max_rooms: usize, max_room_variables: usize, max_room_subscribers: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            max_rooms,
            max_room_variables,
            max_room_subscribers,
        }
    }

    /// Find the active room named `name`, creating it if it doesn't exist.
    /// Returns `None` if `name` is too long or the registry is at its room cap.
    pub async fn get_or_create(&self, name: &str) -> Option<Arc<Room>> {
        if name.len() > MAX_ROOM_NAME_LENGTH {
            return None;
        }

        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(name) {
                return Some(Arc::clone(room));
            }
        }

        let mut rooms = self.rooms.write().await;
        // Re-check under the write lock: another task may have created it
        // while we were waiting.
        if let Some(room) = rooms.get(name) {
            return Some(Arc::clone(room));
        }
        if rooms.len() >= self.max_rooms {
            return None;
        }
        let room = Arc::new(Room::new(
            name.to_string(),
            self.max_room_variables,
            self.max_room_subscribers,
        ));
        rooms.insert(name.to_string(), Arc::clone(&room));
        Some(room)
    }

    /// Remove `session_id` from `room`'s subscriber set, and drop the room
    /// from the registry if it is now empty.
    pub async fn leave(&self, room: &Arc<Room>, session_id: Uuid) {
        let remaining = room.leave(session_id).await;
        if remaining > 0 {
            return;
        }
        let mut rooms = self.rooms.write().await;
        if let Some(current) = rooms.get(&room.name) {
            if Arc::ptr_eq(current, room) && current.subscriber_count().await == 0 {
                rooms.remove(&room.name);
            }
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waker() -> Arc<Notify> {
        Arc::new(Notify::new())
    }

    #[tokio::test]
    async fn get_or_create_returns_same_room_for_same_name() {
        let registry = RoomRegistry::new();
        let a = registry.get_or_create("p1").await.unwrap();
        let b = registry.get_or_create("p1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn oversize_room_name_rejected() {
        let registry = RoomRegistry::new();
        let name = "x".repeat(MAX_ROOM_NAME_LENGTH + 1);
        assert!(registry.get_or_create(&name).await.is_none());
    }

    #[tokio::test]
    async fn room_count_cap_rejects_past_the_limit() {
        let registry = RoomRegistry::with_caps(2, MAX_ROOM_VARIABLES, MAX_ROOM_SUBSCRIBERS);
        assert!(registry.get_or_create("a").await.is_some());
        assert!(registry.get_or_create("b").await.is_some());
        assert!(registry.get_or_create("c").await.is_none());
        // Re-fetching an existing room never counts against the cap.
        assert!(registry.get_or_create("a").await.is_some());
    }

    #[tokio::test]
    async fn variable_indices_are_stable_and_append_only() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("p1").await.unwrap();
        let x = room.get_or_create_variable_index("x").await.unwrap();
        let y = room.get_or_create_variable_index("y").await.unwrap();
        let x_again = room.get_or_create_variable_index("x").await.unwrap();
        assert_eq!(x, 0);
        assert_eq!(y, 1);
        assert_eq!(x_again, x);
    }

    #[tokio::test]
    async fn write_value_increments_sequence_number() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("p1").await.unwrap();
        let idx = room.get_or_create_variable_index("x").await.unwrap();
        let seq1 = room.write_value(idx, b"\"42\"").await.unwrap();
        let seq2 = room.write_value(idx, b"\"43\"").await.unwrap();
        assert_eq!(seq1, 1);
        assert_eq!(seq2, 2);
    }

    #[tokio::test]
    async fn oversize_set_preserves_prior_value_and_sequence_number() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("p1").await.unwrap();
        let idx = room.get_or_create_variable_index("x").await.unwrap();
        let seq1 = room.write_value(idx, b"\"ok\"").await.unwrap();

        let too_big = vec![b'a'; MAX_VARIABLE_VALUE_LENGTH + 1];
        let err = room.write_value(idx, &too_big).await.unwrap_err();
        assert_eq!(err, BufferError::Full);

        room.with_variables(|vars| {
            assert_eq!(vars[idx].sequence_number, seq1);
            assert_eq!(vars[idx].value.as_slice(), b"\"ok\"");
        })
        .await;
    }

    #[tokio::test]
    async fn variable_cap_returns_none_past_128() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("p1").await.unwrap();
        for i in 0..MAX_ROOM_VARIABLES {
            assert!(room
                .get_or_create_variable_index(&format!("v{i}"))
                .await
                .is_some());
        }
        assert!(room.get_or_create_variable_index("one_too_many").await.is_none());
    }

    #[tokio::test]
    async fn subscriber_cap_returns_false_past_128() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("p1").await.unwrap();
        for _ in 0..MAX_ROOM_SUBSCRIBERS {
            assert!(room.join(Uuid::new_v4(), waker()).await);
        }
        assert!(!room.join(Uuid::new_v4(), waker()).await);
    }

    #[tokio::test]
    async fn room_is_freed_when_last_subscriber_leaves() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("p1").await.unwrap();
        let sid = Uuid::new_v4();
        room.join(sid, waker()).await;
        assert_eq!(registry.room_count().await, 1);

        registry.leave(&room, sid).await;
        assert_eq!(registry.room_count().await, 0);

        // A fresh join creates a brand new room, not the old (emptied) one.
        let fresh = registry.get_or_create("p1").await.unwrap();
        assert!(!Arc::ptr_eq(&room, &fresh));
    }

    #[tokio::test]
    async fn room_survives_while_other_subscribers_remain() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("p1").await.unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        room.join(a, waker()).await;
        room.join(b, waker()).await;

        registry.leave(&room, a).await;
        assert_eq!(registry.room_count().await, 1);
        let still_same = registry.get_or_create("p1").await.unwrap();
        assert!(Arc::ptr_eq(&room, &still_same));
    }
}
