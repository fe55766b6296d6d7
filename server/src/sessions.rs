//! Player session table.
//!
//! Maps server-assigned player ids to their network addresses and tracks
//! activity for timeout cleanup. Every tracking and metadata operation
//! resolves the target player here first; an unresolvable id means the
//! player disconnected mid-flight and the operation is silently dropped.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One connected player.
#[derive(Debug)]
pub struct Session {
    pub id: u32,
    pub name: String,
    pub addr: SocketAddr,
    /// Last time any packet arrived from this player's address.
    pub last_seen: Instant,
}

impl Session {
    pub fn new(id: u32, name: String, addr: SocketAddr) -> Self {
        Session {
            id,
            name,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Returns true if no packets have arrived within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All connected players, indexed by id.
#[derive(Default)]
pub struct SessionTable {
    sessions: HashMap<u32, Session>,
    next_player_id: u32,
}

impl SessionTable {
    pub fn new() -> Self {
        SessionTable {
            sessions: HashMap::new(),
            next_player_id: 1,
        }
    }

    /// Admits a player and assigns their id.
    pub fn add(&mut self, name: &str, addr: SocketAddr) -> u32 {
        let player_id = self.next_player_id;
        self.next_player_id += 1;

        info!("Player {} ({}) connected from {}", player_id, name, addr);
        self.sessions
            .insert(player_id, Session::new(player_id, name.to_string(), addr));

        player_id
    }

    /// Removes a session. Returns it if the player was still known.
    pub fn remove(&mut self, player_id: u32) -> Option<Session> {
        let session = self.sessions.remove(&player_id);
        if let Some(ref s) = session {
            info!("Player {} ({}) disconnected", s.id, s.name);
        }
        session
    }

    /// Resolves a player id. `None` is an expected outcome, not an error:
    /// the player may have dropped between request and handling.
    pub fn resolve(&self, player_id: u32) -> Option<&Session> {
        self.sessions.get(&player_id)
    }

    /// Finds the player connected from `addr`, if any.
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.sessions
            .iter()
            .find(|(_, session)| session.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Marks the session behind `addr` as active.
    pub fn touch_addr(&mut self, addr: SocketAddr) {
        if let Some(session) = self.sessions.values_mut().find(|s| s.addr == addr) {
            session.last_seen = Instant::now();
        }
    }

    /// Removes and returns every session that exceeded `timeout`.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for player_id in &timed_out {
            self.remove(*player_id);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
