//! # Tracking Server Library
//!
//! Authoritative side of the entity tracking protocol. Clients ask the
//! server to track entities they control; the server relays each request
//! back with its own policy parameters (update interval, movement
//! threshold), indexes which entities belong to which player, and persists
//! the latest metadata in a shared key-value store for other consumers
//! (such as a map UI) to query.
//!
//! ## Module Organization
//!
//! - [`config`]: tracking policy (interval/threshold clamping and
//!   squaring) and store address parsing.
//! - [`store`]: key-value backend abstraction with sets, hashes, and atomic
//!   batches, plus the in-process `MemoryStore` implementation.
//! - [`sessions`]: player session table with timeout sweeping.
//! - [`registry`]: the tracking registry with register/unregister record
//!   triples, metadata field CRUD, and disconnect cleanup.
//! - [`network`]: UDP transport, handshake, and event dispatch.
//!
//! ## Consistency
//!
//! A tracking record is three structures mutated together: membership in
//! the global `entities` set, membership in the per-player handle set, and
//! the per-entity metadata hash. Every multi-key mutation is submitted as
//! one atomic store batch, so other store consumers never observe a
//! partial record.

pub mod config;
pub mod network;
pub mod registry;
pub mod sessions;
pub mod store;
