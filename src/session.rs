//! Per-connection session state machine and catch-up writer.
//!
//! A [`Session`] starts in [`ConnState::Connected`] (handshake pending) and
//! transitions to [`ConnState::Joined`] once a handshake succeeds. The
//! catch-up writer ([`run_catch_up`]) is the async analogue of the original's
//! `LWS_CALLBACK_SERVER_WRITEABLE` handler: given the room's variables and the
//! session's own last-seen vector, it builds the next outbound batch.

use std::sync::Arc;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::buffer::BoundedBuffer;
use crate::room::Room;

/// Per-connection handshake state.
pub enum ConnState {
    /// Connected, header screen passed, handshake not yet received.
    Connected,
    /// Handshake succeeded; bound to `room` and allowed to send `set`.
    Joined(Arc<Room>),
}

/// Per-connection session state: handshake progress, room membership, and the
/// per-variable last-seen sequence vector used by the catch-up writer.
pub struct Session {
    pub id: Uuid,
    pub username: Option<String>,
    state: ConnState,
    /// `last_seen[i]` is the highest sequence number this session has been
    /// told about for variable index `i`. Grows lazily as the room's variable
    /// vector grows past what this session has seen.
    last_seen: Vec<u64>,
    waker: Arc<Notify>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            username: None,
            state: ConnState::Connected,
            last_seen: Vec::new(),
            waker: Arc::new(Notify::new()),
        }
    }

    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.waker)
    }

    pub fn is_joined(&self) -> bool {
        matches!(self.state, ConnState::Joined(_))
    }

    pub fn room(&self) -> Option<&Arc<Room>> {
        match &self.state {
            ConnState::Joined(room) => Some(room),
            ConnState::Connected => None,
        }
    }

    /// Transition to `Joined`. The caller is responsible for having already
    /// registered this session in the room's subscriber set.
    pub fn join(&mut self, username: String, room: Arc<Room>) {
        self.username = Some(username);
        self.state = ConnState::Joined(room);
    }

    /// Record that this session itself just wrote `sequence_number` for the
    /// variable at `index`, so its own catch-up pass never echoes it back.
    pub fn record_own_write(&mut self, index: usize, sequence_number: u64) {
        if index >= self.last_seen.len() {
            self.last_seen.resize(index + 1, 0);
        }
        self.last_seen[index] = sequence_number;
    }

    /// Run a catch-up pass for this session against its joined room. Returns
    /// `None` if the session hasn't joined a room yet.
    pub async fn catch_up(&mut self, tx: &mut BoundedBuffer) -> Option<CatchUpOutcome> {
        let room = match &self.state {
            ConnState::Joined(room) => Arc::clone(room),
            ConnState::Connected => return None,
        };
        Some(run_catch_up(&room, &mut self.last_seen, tx).await)
    }
}

/// Outcome of a single catch-up pass.
pub struct CatchUpOutcome {
    /// The batch to write as one WebSocket text frame, if anything was due.
    pub frame: Option<Vec<u8>>,
    /// Whether another catch-up pass should be scheduled immediately (a
    /// variable's update didn't fit and at least one other update did).
    pub reschedule: bool,
}

/// Build the next outbound batch for a session given `room`'s current
/// variables and the session's `last_seen` vector.
///
/// Mirrors the original's `LWS_CALLBACK_SERVER_WRITEABLE` handler: appends
/// `{"method":"set","name":"...","value":...}` for every out-of-date
/// variable, in index order, separated by `\n`. A mid-batch capacity failure
/// truncates back to the last fully-written variable and is retried on the
/// next pass; a capacity failure on the very first variable in the batch is
/// not retried (it would never succeed, and retrying would busy-loop).
pub async fn run_catch_up(room: &Room, last_seen: &mut Vec<u64>, tx: &mut BoundedBuffer) -> CatchUpOutcome {
    tx.clear();
    let mut truncate_to = 0usize;
    let mut hit_error = false;

    room.with_variables(|variables| {
        for (i, var) in variables.iter().enumerate() {
            if i >= last_seen.len() {
                last_seen.resize(i + 1, 0);
            }
            if last_seen[i] == var.sequence_number {
                continue;
            }

            let appended = (|| -> Result<(), crate::buffer::BufferError> {
                if truncate_to > 0 {
                    tx.push(b"\n")?;
                }
                tx.push(b"{\"method\":\"set\",\"name\":\"")?;
                tx.push(var.name.as_bytes())?;
                tx.push(b"\",\"value\":")?;
                tx.push(var.value.as_slice())?;
                tx.push(b"}")?;
                Ok(())
            })();

            match appended {
                Ok(()) => {
                    last_seen[i] = var.sequence_number;
                    truncate_to = tx.len();
                }
                Err(_) => {
                    hit_error = true;
                    break;
                }
            }
        }
    })
    .await;

    if truncate_to > 0 {
        tx.truncate(truncate_to);
        CatchUpOutcome {
            frame: Some(tx.as_slice().to_vec()),
            reschedule: hit_error,
        }
    } else {
        CatchUpOutcome {
            frame: None,
            reschedule: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoomRegistry;
    use crate::reassembly::MAX_MESSAGE_LENGTH;

    fn tx_buffer() -> BoundedBuffer {
        BoundedBuffer::new(MAX_MESSAGE_LENGTH)
    }

    #[tokio::test]
    async fn new_room_produces_no_catch_up() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("p1").await.unwrap();
        let mut last_seen = Vec::new();
        let mut tx = tx_buffer();
        let outcome = run_catch_up(&room, &mut last_seen, &mut tx).await;
        assert!(outcome.frame.is_none());
        assert!(!outcome.reschedule);
    }

    #[tokio::test]
    async fn join_snapshot_replays_all_variables_in_order() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("p1").await.unwrap();
        for (name, value) in [("x", "1"), ("y", "2"), ("z", "3")] {
            let idx = room.get_or_create_variable_index(name).await.unwrap();
            room.write_value(idx, value.as_bytes()).await.unwrap();
        }

        let mut last_seen = Vec::new();
        let mut tx = tx_buffer();
        let outcome = run_catch_up(&room, &mut last_seen, &mut tx).await;
        let frame = outcome.frame.unwrap();
        assert_eq!(
            String::from_utf8(frame).unwrap(),
            "{\"method\":\"set\",\"name\":\"x\",\"value\":1}\n\
             {\"method\":\"set\",\"name\":\"y\",\"value\":2}\n\
             {\"method\":\"set\",\"name\":\"z\",\"value\":3}"
        );
        assert_eq!(last_seen, vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn no_self_echo_after_writer_updates_its_own_last_seen() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("p1").await.unwrap();
        let idx = room.get_or_create_variable_index("x").await.unwrap();
        let seq = room.write_value(idx, b"\"42\"").await.unwrap();

        // Writer's own last_seen is set immediately to the new sequence number.
        let mut writer_last_seen = vec![seq];
        let mut tx = tx_buffer();
        let outcome = run_catch_up(&room, &mut writer_last_seen, &mut tx).await;
        assert!(outcome.frame.is_none());
    }

    #[tokio::test]
    async fn second_pass_with_no_new_writes_produces_nothing() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("p1").await.unwrap();
        let idx = room.get_or_create_variable_index("x").await.unwrap();
        room.write_value(idx, b"\"42\"").await.unwrap();

        let mut last_seen = Vec::new();
        let mut tx = tx_buffer();
        run_catch_up(&room, &mut last_seen, &mut tx).await;
        let second = run_catch_up(&room, &mut last_seen, &mut tx).await;
        assert!(second.frame.is_none());
    }

    #[tokio::test]
    async fn later_joiner_only_sees_new_variables_beyond_its_last_seen_len() {
        let registry = RoomRegistry::new();
        let room = registry.get_or_create("p1").await.unwrap();
        let idx_x = room.get_or_create_variable_index("x").await.unwrap();
        room.write_value(idx_x, b"\"1\"").await.unwrap();

        // A session that already caught up on x before y existed.
        let mut last_seen = vec![1];
        let idx_y = room.get_or_create_variable_index("y").await.unwrap();
        room.write_value(idx_y, b"\"2\"").await.unwrap();

        let mut tx = tx_buffer();
        let outcome = run_catch_up(&room, &mut last_seen, &mut tx).await;
        assert_eq!(
            String::from_utf8(outcome.frame.unwrap()).unwrap(),
            "{\"method\":\"set\",\"name\":\"y\",\"value\":\"2\"}"
        );
    }
}
