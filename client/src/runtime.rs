//! Seam to the game-simulation runtime.
//!
//! The real runtime (the thing that owns entity handles, positions, and
//! liveness) lives outside this crate; tracking code only talks to it
//! through `EntityRuntime`. `SimulatedRuntime` is the headless stand-in
//! used by the demo binary and the tests: a handful of entities wander
//! randomly and occasionally die.

use rand::Rng;
use shared::Vec2;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Classification of a resolved entity, mapped to the `icon` metadata
/// field on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Vehicle,
    Ped,
    Other,
}

impl EntityKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EntityKind::Vehicle => "vehicle",
            EntityKind::Ped => "ped",
            EntityKind::Other => "unknown",
        }
    }
}

/// What the tracking code needs from the game runtime.
pub trait EntityRuntime: Send + Sync {
    /// Resolves a handle to its kind. `None` means the handle is invalid
    /// and no tracked entity may be constructed for it.
    fn resolve(&self, handle: u32) -> Option<EntityKind>;

    /// Whether the entity is currently alive. Unknown handles are dead.
    fn is_alive(&self, handle: u32) -> bool;

    /// Current world position. Origin for unknown handles.
    fn position(&self, handle: u32) -> Vec2;
}

struct SimEntity {
    kind: EntityKind,
    pos: Vec2,
    vel: Vec2,
    alive: bool,
}

/// Headless demo runtime with randomly wandering entities.
#[derive(Default)]
pub struct SimulatedRuntime {
    entities: Mutex<HashMap<u32, SimEntity>>,
    next_handle: AtomicU32,
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        SimulatedRuntime {
            entities: Mutex::new(HashMap::new()),
            next_handle: AtomicU32::new(1),
        }
    }

    /// Spawns an entity at `pos` and returns its handle.
    pub fn spawn(&self, kind: EntityKind, pos: Vec2) -> u32 {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.entities.lock().unwrap().insert(
            handle,
            SimEntity {
                kind,
                pos,
                vel: Vec2::ZERO,
                alive: true,
            },
        );
        handle
    }

    /// Marks an entity dead; its tracked gate will notice on its next
    /// evaluation.
    pub fn kill(&self, handle: u32) {
        if let Some(entity) = self.entities.lock().unwrap().get_mut(&handle) {
            entity.alive = false;
        }
    }

    /// Advances the simulation by `dt` seconds with random steering.
    pub fn step(&self, dt: f32) {
        let mut rng = rand::thread_rng();
        let mut entities = self.entities.lock().unwrap();

        for entity in entities.values_mut() {
            if !entity.alive {
                continue;
            }
            entity.vel.x += rng.gen_range(-5.0..5.0);
            entity.vel.y += rng.gen_range(-5.0..5.0);
            entity.vel.x = entity.vel.x.clamp(-30.0, 30.0);
            entity.vel.y = entity.vel.y.clamp(-30.0, 30.0);
            entity.pos.x += entity.vel.x * dt;
            entity.pos.y += entity.vel.y * dt;
        }
    }

    /// Current speed in units per second, for the demo's `Speed` field.
    pub fn speed(&self, handle: u32) -> Option<f32> {
        let entities = self.entities.lock().unwrap();
        entities
            .get(&handle)
            .filter(|e| e.alive)
            .map(|e| (e.vel.x * e.vel.x + e.vel.y * e.vel.y).sqrt())
    }
}

impl EntityRuntime for SimulatedRuntime {
    fn resolve(&self, handle: u32) -> Option<EntityKind> {
        self.entities.lock().unwrap().get(&handle).map(|e| e.kind)
    }

    fn is_alive(&self, handle: u32) -> bool {
        self.entities
            .lock()
            .unwrap()
            .get(&handle)
            .map(|e| e.alive)
            .unwrap_or(false)
    }

    fn position(&self, handle: u32) -> Vec2 {
        self.entities
            .lock()
            .unwrap()
            .get(&handle)
            .map(|e| e.pos)
            .unwrap_or(Vec2::ZERO)
    }
}
