//! Chat room membership.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::events::Signal;
use crate::manager::ConnectionManager;

/// Joins and leaves chat rooms over the managed connection.
///
/// Tracks which rooms this client believes it has joined. Joining connects
/// on demand; leaving and marking read only use an already-live connection.
#[derive(Clone)]
pub struct RoomMembership {
    manager: ConnectionManager,
    joined: Arc<Mutex<BTreeSet<String>>>,
}

impl RoomMembership {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            joined: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    fn joined_set(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.joined.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send a join signal, connecting first if needed.
    ///
    /// Returns whether the signal was queued. Joining a room twice sends the
    /// signal twice; the server treats it as idempotent.
    pub async fn join_room(&self, room_id: &str) -> bool {
        let Some(handle) = self.manager.connect().await else {
            warn!("cannot join room {room_id}: no connection");
            return false;
        };
        // Held across the emit so wire order and the joined set agree
        let mut joined = self.joined_set();
        let sent = handle.emit(Signal::JoinChatRoom {
            chat_room_id: room_id.to_string(),
        });
        if sent {
            joined.insert(room_id.to_string());
            info!("joined room {room_id}");
        }
        sent
    }

    /// Resend joins for every room in the joined set on the live connection.
    ///
    /// Returns how many join signals were queued. Nothing is sent when there
    /// is no live connection.
    pub async fn rejoin_all(&self) -> usize {
        let Some(handle) = self.manager.live_handle().await else {
            debug!("not connected, skipping rejoin");
            return 0;
        };
        let joined = self.joined_set();
        let mut sent = 0;
        for room_id in joined.iter() {
            if handle.emit(Signal::JoinChatRoom {
                chat_room_id: room_id.clone(),
            }) {
                sent += 1;
            }
        }
        if sent > 0 {
            info!("rejoined {sent} room(s)");
        }
        sent
    }

    /// Send a leave signal on the live connection, if there is one.
    pub async fn leave_room(&self, room_id: &str) -> bool {
        let Some(handle) = self.manager.live_handle().await else {
            debug!("not connected, skipping leave for room {room_id}");
            return false;
        };
        let mut joined = self.joined_set();
        let sent = handle.emit(Signal::LeaveChatRoom {
            chat_room_id: room_id.to_string(),
        });
        if sent {
            joined.remove(room_id);
            info!("left room {room_id}");
        }
        sent
    }

    /// Tell the server this client has read the room, if connected.
    pub async fn mark_read(&self, room_id: &str) -> bool {
        let Some(handle) = self.manager.live_handle().await else {
            debug!("not connected, skipping mark-as-read for room {room_id}");
            return false;
        };
        handle.emit(Signal::MarkAsRead {
            chat_room_id: room_id.to_string(),
        })
    }

    /// Rooms joined and not yet left.
    pub fn joined(&self) -> Vec<String> {
        self.joined_set().iter().cloned().collect()
    }

    pub fn is_joined(&self, room_id: &str) -> bool {
        self.joined_set().contains(room_id)
    }

    /// Forget local membership. Sends nothing.
    pub fn clear(&self) {
        self.joined_set().clear();
    }
}
