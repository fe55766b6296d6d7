//! Per-entity update gate.
//!
//! A `TrackedEntity` decides, once per evaluation interval, whether the
//! entity moved far enough since the last *reported* position to justify
//! sending an update. Distances stay squared end to end; the server
//! squares the threshold once at startup.

use crate::runtime::EntityRuntime;
use shared::Vec2;
use std::time::Duration;
use thiserror::Error;

/// The one construction-time failure: the runtime cannot resolve the
/// handle, so no tracked entity (and no registration) may exist for it.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid entity handle {0}")]
pub struct InvalidHandle(pub u32);

/// Result of one gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Not enough movement; nothing to send.
    Idle,
    /// Entity moved past the threshold; report this position.
    Emit(Vec2),
    /// Entity died or became invalid; stop tracking it.
    Dead,
}

/// Client-side state for one tracked entity handle.
#[derive(Debug)]
pub struct TrackedEntity {
    pub handle: u32,
    /// Minimum time between evaluations (server-assigned).
    pub update_interval: Duration,
    /// Squared distance an entity must move before an update is emitted
    /// (server-assigned, already squared).
    movement_threshold: f32,
    /// Last position actually reported, not last observed. Starts at the
    /// origin, so the first evaluation of any entity away from the origin
    /// emits immediately.
    last_reported: Vec2,
    /// Classification computed once at creation.
    pub entity_type: &'static str,
}

impl TrackedEntity {
    /// Resolves and classifies the handle. Fails if the runtime does not
    /// know it; a dead-but-resolvable entity is constructed normally and
    /// terminates on its first evaluation instead.
    pub fn new(
        runtime: &dyn EntityRuntime,
        handle: u32,
        update_interval: u64,
        movement_threshold: u32,
    ) -> Result<Self, InvalidHandle> {
        let kind = runtime.resolve(handle).ok_or(InvalidHandle(handle))?;

        Ok(TrackedEntity {
            handle,
            update_interval: Duration::from_millis(update_interval),
            movement_threshold: movement_threshold as f32,
            last_reported: Vec2::ZERO,
            entity_type: kind.type_name(),
        })
    }

    /// One gate evaluation. Only advances `last_reported` when emitting,
    /// so skipped movement accumulates toward the threshold.
    pub fn evaluate(&mut self, position: Vec2, alive: bool) -> TickOutcome {
        if !alive {
            return TickOutcome::Dead;
        }

        if position.distance_squared(self.last_reported) >= self.movement_threshold {
            self.last_reported = position;
            TickOutcome::Emit(position)
        } else {
            TickOutcome::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{EntityKind, SimulatedRuntime};

    fn tracked(threshold: u32) -> (SimulatedRuntime, TrackedEntity) {
        let runtime = SimulatedRuntime::new();
        let handle = runtime.spawn(EntityKind::Vehicle, Vec2::ZERO);
        let entity = TrackedEntity::new(&runtime, handle, 1000, threshold).unwrap();
        (runtime, entity)
    }

    #[test]
    fn test_invalid_handle_fails_construction() {
        let runtime = SimulatedRuntime::new();
        let result = TrackedEntity::new(&runtime, 999, 1000, 1);
        assert_eq!(result.unwrap_err(), InvalidHandle(999));
    }

    #[test]
    fn test_classification_at_creation() {
        let runtime = SimulatedRuntime::new();
        let vehicle = runtime.spawn(EntityKind::Vehicle, Vec2::ZERO);
        let ped = runtime.spawn(EntityKind::Ped, Vec2::ZERO);
        let other = runtime.spawn(EntityKind::Other, Vec2::ZERO);

        let v = TrackedEntity::new(&runtime, vehicle, 1000, 1).unwrap();
        let p = TrackedEntity::new(&runtime, ped, 1000, 1).unwrap();
        let o = TrackedEntity::new(&runtime, other, 1000, 1).unwrap();

        assert_eq!(v.entity_type, "vehicle");
        assert_eq!(p.entity_type, "ped");
        assert_eq!(o.entity_type, "unknown");
    }

    #[test]
    fn test_first_evaluation_emits_iff_away_from_origin() {
        let (_runtime, mut entity) = tracked(9);

        // Starting right at the origin: below threshold, no emit.
        assert_eq!(entity.evaluate(Vec2::ZERO, true), TickOutcome::Idle);

        // 3,4 is squared distance 25 from the origin: emits.
        let pos = Vec2::new(3.0, 4.0);
        assert_eq!(entity.evaluate(pos, true), TickOutcome::Emit(pos));
    }

    #[test]
    fn test_threshold_measured_from_last_reported() {
        let (_runtime, mut entity) = tracked(9);

        let first = Vec2::new(10.0, 0.0);
        assert_eq!(entity.evaluate(first, true), TickOutcome::Emit(first));

        // 2 units further: squared distance 4 from the last report, idle.
        assert_eq!(
            entity.evaluate(Vec2::new(12.0, 0.0), true),
            TickOutcome::Idle
        );

        // Another unit accumulates to 9 from the last *reported* position
        // even though it is only 1 from the last observed one.
        let third = Vec2::new(13.0, 0.0);
        assert_eq!(entity.evaluate(third, true), TickOutcome::Emit(third));
    }

    #[test]
    fn test_exact_threshold_emits() {
        let (_runtime, mut entity) = tracked(9);
        let pos = Vec2::new(3.0, 0.0);
        assert_eq!(entity.evaluate(pos, true), TickOutcome::Emit(pos));
    }

    #[test]
    fn test_dead_entity_terminates() {
        let (_runtime, mut entity) = tracked(1);
        assert_eq!(
            entity.evaluate(Vec2::new(100.0, 100.0), false),
            TickOutcome::Dead
        );
    }
}
