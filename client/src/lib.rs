//! # Tracking Client Library
//!
//! Client side of the entity tracking protocol. The hosting game runtime
//! owns entity handles, positions, and liveness; this crate decides when
//! a position update is worth sending and keeps the server informed about
//! which entities are tracked.
//!
//! ## Module Organization
//!
//! - [`runtime`]: the `EntityRuntime` seam to the game simulation, plus
//!   the headless `SimulatedRuntime` used by the demo binary and tests.
//! - [`tracked`]: the per-entity update gate, combining interval cadence
//!   with a squared-distance movement threshold against the last
//!   *reported* position.
//! - [`registry`]: at most one tracked entity per handle, each driven by
//!   its own cooperative task; self-termination and external untracking
//!   converge on one idempotent removal.
//! - [`network`]: UDP connection, handshake, and dispatch of
//!   server-directed tracking requests into the registry.

pub mod network;
pub mod registry;
pub mod runtime;
pub mod tracked;
