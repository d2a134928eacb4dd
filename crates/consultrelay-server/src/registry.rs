//! Room membership and broadcast.
//!
//! A room is keyed by appointment id and holds the peers admitted to it.
//! Peers are never written to directly: each one owns an unbounded outbound
//! queue drained by its own writer task, so a broadcast only enqueues bytes
//! and a stalled recipient cannot hold up anyone else.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use consultrelay_protocol::encode_text;

/// Process-unique connection id.
pub type ConnectionId = u64;

/// Handle for one live connection.
#[derive(Debug)]
pub struct Peer {
    id: ConnectionId,
    /// Set once by the first accepted join.
    room: OnceLock<String>,
    outbox: UnboundedSender<Vec<u8>>,
}

impl Peer {
    pub fn new(id: ConnectionId, outbox: UnboundedSender<Vec<u8>>) -> Self {
        Self {
            id,
            room: OnceLock::new(),
            outbox,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The room this peer was admitted to, if any.
    pub fn room(&self) -> Option<&str> {
        self.room.get().map(String::as_str)
    }

    /// Binds the peer to `room_id`. Returns `false` if it is already bound
    /// to a room, which is left unchanged.
    pub fn assign_room(&self, room_id: &str) -> bool {
        self.room.set(room_id.to_string()).is_ok()
    }

    /// Queues raw frame bytes. Returns `false` once the writer has gone.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        self.outbox.send(frame).is_ok()
    }

    /// Queues `text` as a text frame.
    pub fn send_text(&self, text: &str) -> bool {
        self.send(encode_text(text))
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }
}

type Members = HashMap<ConnectionId, Arc<Peer>>;

/// All rooms of the running server.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Members>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section is a plain map update, so a poisoned lock
    // still guards consistent data.
    fn rooms(&self) -> MutexGuard<'_, HashMap<String, Members>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `peer` to `room_id`, creating the room if needed.
    ///
    /// Binds the peer to the room first. Returns `false` without changing
    /// membership if the peer already belongs to a different room.
    pub fn admit(&self, room_id: &str, peer: &Arc<Peer>) -> bool {
        if !peer.assign_room(room_id) && peer.room() != Some(room_id) {
            return false;
        }

        let mut rooms = self.rooms();
        let members = rooms.entry(room_id.to_string()).or_default();
        members.insert(peer.id(), Arc::clone(peer));
        debug!(
            conn_id = peer.id(),
            room_id,
            members = members.len(),
            "Peer admitted"
        );
        true
    }

    /// Sends `text` to every member of `room_id` except `sender`.
    ///
    /// Returns how many members the message was queued for. A member whose
    /// queue is closed is skipped with a warning.
    pub fn broadcast_except(&self, room_id: &str, sender: ConnectionId, text: &str) -> usize {
        let rooms = self.rooms();
        let Some(members) = rooms.get(room_id) else {
            return 0;
        };

        let frame = encode_text(text);
        let mut delivered = 0;
        for peer in members.values().filter(|p| p.id() != sender) {
            if peer.send(frame.clone()) {
                delivered += 1;
            } else {
                warn!(conn_id = peer.id(), room_id, "Peer write failed, skipping");
            }
        }
        delivered
    }

    /// Removes `peer` from the room it was admitted to.
    ///
    /// Safe to call for a peer that never joined. Returns `true` if the peer
    /// was a member. The room entry stays even when it becomes empty.
    pub fn remove(&self, peer: &Peer) -> bool {
        let Some(room_id) = peer.room() else {
            return false;
        };

        let removed = self
            .rooms()
            .get_mut(room_id)
            .and_then(|members| members.remove(&peer.id()))
            .is_some();
        if removed {
            debug!(conn_id = peer.id(), room_id, "Peer removed");
        }
        removed
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms().get(room_id).map_or(0, HashMap::len)
    }

    /// Number of room entries, including emptied ones.
    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }

    /// Drops every membership. Used on shutdown.
    pub fn clear(&self) {
        self.rooms().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consultrelay_protocol::decode_text;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    fn peer(id: ConnectionId) -> (Arc<Peer>, UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = unbounded_channel();
        (Arc::new(Peer::new(id, tx)), rx)
    }

    fn received(rx: &mut UnboundedReceiver<Vec<u8>>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(decode_text(&frame).unwrap());
        }
        out
    }

    #[test]
    fn broadcast_excludes_sender() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = peer(1);
        let (b, mut rx_b) = peer(2);
        assert!(registry.admit("room1", &a));
        assert!(registry.admit("room1", &b));

        let delivered = registry.broadcast_except("room1", a.id(), r#"{"type":"offer"}"#);

        assert_eq!(delivered, 1);
        assert_eq!(received(&mut rx_b), vec![r#"{"type":"offer"}"#]);
        assert!(received(&mut rx_a).is_empty());
    }

    #[test]
    fn broadcast_to_unknown_or_empty_room_is_noop() {
        let registry = RoomRegistry::new();
        assert_eq!(registry.broadcast_except("nowhere", 1, "{}"), 0);

        let (a, _rx) = peer(1);
        registry.admit("room1", &a);
        registry.remove(&a);
        assert_eq!(registry.broadcast_except("room1", 2, "{}"), 0);
    }

    #[test]
    fn closed_recipient_does_not_block_others() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = peer(1);
        let (b, rx_b) = peer(2);
        let (c, mut rx_c) = peer(3);
        for p in [&a, &b, &c] {
            registry.admit("room1", p);
        }
        drop(rx_b);
        assert!(b.is_closed());

        let delivered = registry.broadcast_except("room1", a.id(), "hello");

        assert_eq!(delivered, 1);
        assert_eq!(received(&mut rx_c), vec!["hello"]);
    }

    #[test]
    fn per_sender_order_is_preserved() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = peer(1);
        let (b, mut rx_b) = peer(2);
        registry.admit("room1", &a);
        registry.admit("room1", &b);

        for i in 0..5 {
            registry.broadcast_except("room1", a.id(), &i.to_string());
        }

        assert_eq!(received(&mut rx_b), vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn first_room_wins() {
        let registry = RoomRegistry::new();
        let (a, _rx) = peer(1);

        assert!(registry.admit("room1", &a));
        assert!(!registry.admit("room2", &a));
        assert_eq!(a.room(), Some("room1"));
        assert_eq!(registry.member_count("room2"), 0);

        // Re-admitting to the same room is harmless.
        assert!(registry.admit("room1", &a));
        assert_eq!(registry.member_count("room1"), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = peer(1);
        let (never_joined, _rx_n) = peer(2);

        assert!(!registry.remove(&never_joined));

        registry.admit("room1", &a);
        assert!(registry.remove(&a));
        assert!(!registry.remove(&a));
        assert_eq!(registry.member_count("room1"), 0);
        // Emptied rooms are kept.
        assert_eq!(registry.room_count(), 1);
    }

    #[test]
    fn removed_peer_gets_no_deliveries() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = peer(1);
        let (b, mut rx_b) = peer(2);
        registry.admit("room1", &a);
        registry.admit("room1", &b);
        registry.remove(&b);

        assert_eq!(registry.broadcast_except("room1", a.id(), "late"), 0);
        assert!(received(&mut rx_b).is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = peer(1);
        let (b, _rx_b) = peer(2);
        registry.admit("room1", &a);
        registry.admit("room2", &b);
        assert_eq!(registry.room_count(), 2);

        registry.clear();

        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.member_count("room1"), 0);
    }

    #[test]
    fn concurrent_admit_and_remove() {
        let registry = Arc::new(RoomRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|id| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let (p, _rx) = peer(id);
                    for _ in 0..100 {
                        registry.admit("room1", &p);
                        registry.broadcast_except("room1", p.id(), "x");
                        registry.remove(&p);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.member_count("room1"), 0);
    }
}
