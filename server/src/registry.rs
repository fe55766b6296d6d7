//! Authoritative tracking registry and metadata store access.
//!
//! One method per incoming event. Most "failure" cases here are expected
//! races with disconnecting clients and resolve to silent no-ops; the only
//! state that matters is what ends up in the store, and every multi-key
//! mutation goes through one atomic batch so the record triple (global set
//! membership, per-player set membership, metadata hash) is never partially
//! visible.

use crate::config::TrackerConfig;
use crate::network::Outbound;
use crate::sessions::SessionTable;
use crate::store::{keys, Store, StoreOp};
use log::{debug, info};
use shared::{is_reserved_field, Packet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Tracker {
    store: Arc<dyn Store>,
    config: TrackerConfig,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Tracker {
    pub fn new(
        store: Arc<dyn Store>,
        config: TrackerConfig,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Tracker {
            store,
            config,
            outbound,
        }
    }

    fn send_to(&self, addr: SocketAddr, packet: Packet) {
        // The sender task only dies on shutdown; nothing left to do then.
        let _ = self.outbound.send(Outbound { packet, addr });
    }

    /// Relays a tracking request back to the owning player's client with
    /// the server-chosen policy parameters.
    pub fn track(&self, sessions: &SessionTable, player_id: u32, handle: u32) {
        let session = match sessions.resolve(player_id) {
            Some(s) => s,
            None => return,
        };

        debug!("Relaying track of entity {} to player {}", handle, player_id);
        self.send_to(
            session.addr,
            Packet::StartTracking {
                handle,
                update_interval: self.config.update_interval,
                movement_threshold: self.config.movement_threshold,
            },
        );
    }

    /// Relays an untrack request back to the owning player's client.
    pub fn untrack(&self, sessions: &SessionTable, player_id: u32, handle: u32) {
        let session = match sessions.resolve(player_id) {
            Some(s) => s,
            None => return,
        };

        debug!(
            "Relaying untrack of entity {} to player {}",
            handle, player_id
        );
        self.send_to(session.addr, Packet::StopTracking { handle });
    }

    /// A client confirmed it started tracking: create the record triple.
    /// Re-registering an already-tracked pair just overwrites the fields.
    pub fn register(&self, player_id: u32, handle: u32, name: &str, entity_type: &str) {
        let meta = keys::meta(player_id, handle);

        self.store.apply(&[
            StoreOp::SAdd {
                set: keys::GLOBAL_SET.to_string(),
                member: keys::composite(player_id, handle),
            },
            StoreOp::SAdd {
                set: keys::player_set(player_id),
                member: handle.to_string(),
            },
            StoreOp::HSet {
                hash: meta.clone(),
                field: "name".to_string(),
                value: name.to_string(),
            },
            StoreOp::HSet {
                hash: meta.clone(),
                field: "pos".to_string(),
                value: "0,0".to_string(),
            },
            StoreOp::HSet {
                hash: meta,
                field: "icon".to_string(),
                value: entity_type.to_string(),
            },
        ]);

        info!(
            "Registered entity {} for player {} ({})",
            handle, player_id, entity_type
        );
    }

    /// Removes the record triple. Safe if the pair was never registered.
    pub fn unregister(&self, player_id: u32, handle: u32) {
        self.store.apply(&[
            StoreOp::Del {
                key: keys::meta(player_id, handle),
            },
            StoreOp::SRem {
                set: keys::player_set(player_id),
                member: handle.to_string(),
            },
            StoreOp::SRem {
                set: keys::GLOBAL_SET.to_string(),
                member: keys::composite(player_id, handle),
            },
        ]);

        info!("Unregistered entity {} for player {}", handle, player_id);
    }

    /// Reads one metadata field and replies to the requester. Blank keys
    /// and unresolvable sessions drop the request without a reply.
    pub fn metadata_get(
        &self,
        sessions: &SessionTable,
        player_id: u32,
        handle: u32,
        key: &str,
        request_id: u32,
        reply_addr: SocketAddr,
    ) {
        if key.trim().is_empty() {
            return;
        }
        if sessions.resolve(player_id).is_none() {
            return;
        }

        let value = self.store.hget(&keys::meta(player_id, handle), key);
        self.send_to(reply_addr, Packet::MetadataValue { request_id, value });
    }

    /// Writes one metadata field. A blank value deletes the field instead.
    /// Setting a field never materializes a tracking record: if the hash
    /// does not exist the write is dropped.
    pub fn metadata_set(
        &self,
        sessions: &SessionTable,
        player_id: u32,
        handle: u32,
        key: &str,
        value: &str,
    ) {
        if key.trim().is_empty() {
            return;
        }
        if sessions.resolve(player_id).is_none() {
            return;
        }

        let meta = keys::meta(player_id, handle);

        if value.trim().is_empty() {
            self.store.hdel(&meta, key);
            return;
        }

        if !self.store.exists(&meta) {
            debug!(
                "Dropping metadata write for untracked entity {} of player {}",
                handle, player_id
            );
            return;
        }

        self.store.hset(&meta, key, value);
    }

    /// Deletes a metadata field unless it is reserved.
    pub fn metadata_delete(&self, sessions: &SessionTable, player_id: u32, handle: u32, key: &str) {
        if is_reserved_field(key) {
            debug!("Refusing delete of reserved field {:?}", key);
            return;
        }

        // A blank value is the documented field-deletion path.
        self.metadata_set(sessions, player_id, handle, key, "");
    }

    /// Purges every tracking record a disconnected player owned, as one
    /// atomic batch so no intermediate state is externally visible.
    pub fn player_dropped(&self, player_id: u32) {
        let player_set = keys::player_set(player_id);
        let handles = self.store.smembers(&player_set);

        let mut batch = Vec::with_capacity(handles.len() * 2 + 1);
        for handle in &handles {
            let handle: u32 = match handle.parse() {
                Ok(h) => h,
                Err(_) => continue,
            };
            batch.push(StoreOp::SRem {
                set: keys::GLOBAL_SET.to_string(),
                member: keys::composite(player_id, handle),
            });
            batch.push(StoreOp::Del {
                key: keys::meta(player_id, handle),
            });
        }
        batch.push(StoreOp::Del { key: player_set });

        self.store.apply(&batch);

        info!(
            "Cleaned up {} tracked entities for dropped player {}",
            handles.len(),
            player_id
        );
    }
}
