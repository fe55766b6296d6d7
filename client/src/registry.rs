//! Client-side tracking registry.
//!
//! Holds at most one tracked entity per handle and drives each one from
//! its own cooperative task (sleep for the interval, query the runtime,
//! evaluate the gate). Tasks never touch the registry directly; a dead
//! entity reports back over the event channel and the owning loop calls
//! `untrack`, so self-termination and external untracking converge on the
//! same idempotent map removal and the unregistration event is sent
//! exactly once.

use crate::runtime::EntityRuntime;
use crate::tracked::{TickOutcome, TrackedEntity};
use log::{debug, info, warn};
use shared::Packet;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Notifications from per-entity tasks back to the loop that owns the
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    /// The entity's gate saw it dead; untrack it.
    EntityDied { handle: u32 },
}

pub struct ClientRegistry {
    player_id: u32,
    player_name: String,
    runtime: Arc<dyn EntityRuntime>,
    entities: HashMap<u32, JoinHandle<()>>,
    outgoing: mpsc::UnboundedSender<Packet>,
    events: mpsc::UnboundedSender<RegistryEvent>,
}

impl ClientRegistry {
    pub fn new(
        player_id: u32,
        player_name: &str,
        runtime: Arc<dyn EntityRuntime>,
        outgoing: mpsc::UnboundedSender<Packet>,
        events: mpsc::UnboundedSender<RegistryEvent>,
    ) -> Self {
        ClientRegistry {
            player_id,
            player_name: player_name.to_string(),
            runtime,
            entities: HashMap::new(),
            outgoing,
            events,
        }
    }

    /// Starts tracking `handle` with the server-assigned policy. Already
    /// tracked handles are a no-op; unresolvable handles are refused and
    /// never produce a registration event.
    pub fn track(&mut self, handle: u32, update_interval: u64, movement_threshold: u32) {
        if self.entities.contains_key(&handle) {
            debug!("Entity {} already tracked", handle);
            return;
        }

        let entity = match TrackedEntity::new(
            self.runtime.as_ref(),
            handle,
            update_interval,
            movement_threshold,
        ) {
            Ok(entity) => entity,
            Err(e) => {
                warn!("Refusing to track: {}", e);
                return;
            }
        };

        info!(
            "Tracking entity {} ({}) every {}ms",
            handle,
            entity.entity_type,
            update_interval
        );

        let name = format!("Entity #{} ({})", handle, self.player_name);
        let _ = self.outgoing.send(Packet::Register {
            handle,
            name,
            entity_type: entity.entity_type.to_string(),
        });

        let task = tokio::spawn(run_entity(
            entity,
            Arc::clone(&self.runtime),
            self.player_id,
            self.outgoing.clone(),
            self.events.clone(),
        ));
        self.entities.insert(handle, task);
    }

    /// Stops tracking `handle`. Idempotent: whichever of the two paths
    /// (gate self-termination or external request) removes the map entry
    /// first sends the single unregistration event.
    pub fn untrack(&mut self, handle: u32) {
        if let Some(task) = self.entities.remove(&handle) {
            task.abort();
            info!("Untracked entity {}", handle);
            let _ = self.outgoing.send(Packet::Unregister { handle });
        }
    }

    pub fn is_tracked(&self, handle: u32) -> bool {
        self.entities.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Per-entity evaluation loop: one cooperative task per tracked entity.
async fn run_entity(
    mut entity: TrackedEntity,
    runtime: Arc<dyn EntityRuntime>,
    player_id: u32,
    outgoing: mpsc::UnboundedSender<Packet>,
    events: mpsc::UnboundedSender<RegistryEvent>,
) {
    let handle = entity.handle;

    loop {
        sleep(entity.update_interval).await;

        let alive = runtime.is_alive(handle);
        let position = runtime.position(handle);

        match entity.evaluate(position, alive) {
            TickOutcome::Idle => {}
            TickOutcome::Emit(position) => {
                let _ = outgoing.send(Packet::MetadataSet {
                    player_id,
                    handle,
                    key: "pos".to_string(),
                    value: position.to_field(),
                });
            }
            TickOutcome::Dead => {
                debug!("Entity {} reported dead", handle);
                let _ = events.send(RegistryEvent::EntityDied { handle });
                return;
            }
        }
    }
}
