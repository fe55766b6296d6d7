//! Server network layer: UDP transport, session handshake, and event
//! dispatch into the tracking registry.

use crate::config::TrackerConfig;
use crate::registry::Tracker;
use crate::sessions::SessionTable;
use crate::store::Store;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Messages sent from background tasks to the main server loop.
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    SessionTimeout {
        player_id: u32,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// One outgoing packet queued for the sender task.
#[derive(Debug)]
pub struct Outbound {
    pub packet: Packet,
    pub addr: SocketAddr,
}

/// Main server coordinating the transport and the tracking registry.
pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: Arc<RwLock<SessionTable>>,
    tracker: Tracker,
    session_timeout: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    out_tx: mpsc::UnboundedSender<Outbound>,
    out_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Server {
    pub async fn new(
        addr: &str,
        store: Arc<dyn Store>,
        config: TrackerConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let tracker = Tracker::new(store, config, out_tx.clone());

        Ok(Server {
            socket,
            sessions: Arc::new(RwLock::new(SessionTable::new())),
            tracker,
            session_timeout: SESSION_TIMEOUT,
            server_tx,
            server_rx,
            out_tx,
            out_rx,
        })
    }

    /// Address the socket actually bound to (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Overrides how long a session may stay silent before the sweeper
    /// drops it. Must be called before `run`.
    pub fn set_session_timeout(&mut self, timeout: Duration) {
        self.session_timeout = timeout;
    }

    /// Spawns the task that listens for incoming packets.
    fn spawn_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outgoing packet queue.
    fn spawn_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(Outbound { packet, addr }) = out_rx.recv().await {
                match serialize(&packet) {
                    Ok(data) => {
                        if let Err(e) = socket.send_to(&data, addr).await {
                            error!("Failed to send {} to {}: {}", packet.name(), addr, e);
                        }
                    }
                    Err(e) => error!("Failed to serialize {}: {}", packet.name(), e),
                }
            }
        });
    }

    /// Spawns the task that sweeps out idle sessions.
    fn spawn_timeout_sweeper(&self) {
        let sessions = Arc::clone(&self.sessions);
        let server_tx = self.server_tx.clone();
        let timeout = self.session_timeout;
        let sweep_interval = Duration::from_secs(1).min(timeout);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut sessions_guard = sessions.write().await;
                    sessions_guard.check_timeouts(timeout)
                };

                for player_id in timed_out {
                    if server_tx
                        .send(ServerMessage::SessionTimeout { player_id })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    fn send(&self, packet: Packet, addr: SocketAddr) {
        let _ = self.out_tx.send(Outbound { packet, addr });
    }

    /// Dispatches one incoming event.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        debug!("{} from {}", packet.name(), addr);

        {
            let mut sessions = self.sessions.write().await;
            sessions.touch_addr(addr);
        }

        match packet {
            Packet::Hello {
                protocol_version,
                player_name,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    self.send(
                        Packet::Rejected {
                            reason: format!(
                                "protocol version mismatch (server {}, client {})",
                                PROTOCOL_VERSION, protocol_version
                            ),
                        },
                        addr,
                    );
                    return;
                }

                // A reconnect from the same address replaces the old
                // session, including its tracking records.
                let existing = {
                    let sessions = self.sessions.read().await;
                    sessions.find_by_addr(addr)
                };
                if let Some(old_id) = existing {
                    info!("Replacing existing session {} from {}", old_id, addr);
                    self.sessions.write().await.remove(old_id);
                    self.tracker.player_dropped(old_id);
                }

                let player_id = {
                    let mut sessions = self.sessions.write().await;
                    sessions.add(&player_name, addr)
                };
                self.send(Packet::Welcome { player_id }, addr);
            }

            Packet::Goodbye => {
                let player_id = {
                    let sessions = self.sessions.read().await;
                    sessions.find_by_addr(addr)
                };
                if let Some(player_id) = player_id {
                    self.sessions.write().await.remove(player_id);
                    self.tracker.player_dropped(player_id);
                }
            }

            Packet::Track { player_id, handle } => {
                let sessions = self.sessions.read().await;
                self.tracker.track(&sessions, player_id, handle);
            }

            Packet::Untrack { player_id, handle } => {
                let sessions = self.sessions.read().await;
                self.tracker.untrack(&sessions, player_id, handle);
            }

            Packet::Register {
                handle,
                name,
                entity_type,
            } => {
                // The owning player is the packet's source session.
                let source = {
                    let sessions = self.sessions.read().await;
                    sessions.find_by_addr(addr)
                };
                match source {
                    Some(player_id) => {
                        self.tracker.register(player_id, handle, &name, &entity_type)
                    }
                    None => debug!("Dropping register from unknown address {}", addr),
                }
            }

            Packet::Unregister { handle } => {
                let source = {
                    let sessions = self.sessions.read().await;
                    sessions.find_by_addr(addr)
                };
                match source {
                    Some(player_id) => self.tracker.unregister(player_id, handle),
                    None => debug!("Dropping unregister from unknown address {}", addr),
                }
            }

            Packet::MetadataGet {
                player_id,
                handle,
                key,
                request_id,
            } => {
                let sessions = self.sessions.read().await;
                self.tracker
                    .metadata_get(&sessions, player_id, handle, &key, request_id, addr);
            }

            Packet::MetadataSet {
                player_id,
                handle,
                key,
                value,
            } => {
                let sessions = self.sessions.read().await;
                self.tracker
                    .metadata_set(&sessions, player_id, handle, &key, &value);
            }

            Packet::MetadataDelete {
                player_id,
                handle,
                key,
            } => {
                let sessions = self.sessions.read().await;
                self.tracker
                    .metadata_delete(&sessions, player_id, handle, &key);
            }

            _ => {
                warn!("Unexpected {} from client at {}", packet.name(), addr);
            }
        }
    }

    /// Main server loop.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_receiver();
        self.spawn_sender();
        self.spawn_timeout_sweeper();

        info!("Server started");

        loop {
            match self.server_rx.recv().await {
                Some(ServerMessage::PacketReceived { packet, addr }) => {
                    self.handle_packet(packet, addr).await;
                }
                Some(ServerMessage::SessionTimeout { player_id }) => {
                    info!("Player {} timed out", player_id);
                    self.tracker.player_dropped(player_id);
                }
                Some(ServerMessage::Shutdown) | None => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn test_server() -> Server {
        let store = Arc::new(MemoryStore::new());
        let config = TrackerConfig::new(1000, 2);
        Server::new("127.0.0.1:0", store, config).await.unwrap()
    }

    fn hello(name: &str) -> Packet {
        Packet::Hello {
            protocol_version: PROTOCOL_VERSION,
            player_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_handshake_assigns_distinct_ids() {
        let mut server = test_server().await;

        let addr1: SocketAddr = "127.0.0.1:40001".parse().unwrap();
        let addr2: SocketAddr = "127.0.0.1:40002".parse().unwrap();

        server.handle_packet(hello("Bob"), addr1).await;
        server.handle_packet(hello("Alice"), addr2).await;

        let mut ids = Vec::new();
        for _ in 0..2 {
            match server.out_rx.try_recv().unwrap().packet {
                Packet::Welcome { player_id } => ids.push(player_id),
                other => panic!("Unexpected packet {:?}", other),
            }
        }
        assert_ne!(ids[0], ids[1]);
        assert_eq!(server.sessions.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_version_mismatch_is_rejected() {
        let mut server = test_server().await;
        let addr: SocketAddr = "127.0.0.1:40001".parse().unwrap();

        server
            .handle_packet(
                Packet::Hello {
                    protocol_version: PROTOCOL_VERSION + 1,
                    player_name: "Bob".to_string(),
                },
                addr,
            )
            .await;

        match server.out_rx.try_recv().unwrap().packet {
            Packet::Rejected { .. } => {}
            other => panic!("Unexpected packet {:?}", other),
        }
        assert!(server.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_goodbye_removes_session() {
        let mut server = test_server().await;
        let addr: SocketAddr = "127.0.0.1:40001".parse().unwrap();

        server.handle_packet(hello("Bob"), addr).await;
        server
            .handle_packet(
                Packet::Register {
                    handle: 7,
                    name: "Entity #7 (Bob)".to_string(),
                    entity_type: "vehicle".to_string(),
                },
                addr,
            )
            .await;
        server.handle_packet(Packet::Goodbye, addr).await;

        assert!(server.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_register_from_unknown_address_is_dropped() {
        let mut server = test_server().await;
        let addr: SocketAddr = "127.0.0.1:40001".parse().unwrap();

        server
            .handle_packet(
                Packet::Register {
                    handle: 7,
                    name: "Entity #7 (?)".to_string(),
                    entity_type: "vehicle".to_string(),
                },
                addr,
            )
            .await;

        // Nothing queued, nothing crashed.
        assert!(server.out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_track_round_trip_through_dispatch() {
        let mut server = test_server().await;
        let addr: SocketAddr = "127.0.0.1:40001".parse().unwrap();

        server.handle_packet(hello("Bob"), addr).await;
        let player_id = match server.out_rx.try_recv().unwrap().packet {
            Packet::Welcome { player_id } => player_id,
            other => panic!("Unexpected packet {:?}", other),
        };

        server
            .handle_packet(Packet::Track { player_id, handle: 7 }, addr)
            .await;

        let out = server.out_rx.try_recv().unwrap();
        assert_eq!(out.addr, addr);
        match out.packet {
            Packet::StartTracking {
                handle,
                update_interval,
                movement_threshold,
            } => {
                assert_eq!(handle, 7);
                assert_eq!(update_interval, 1000);
                assert_eq!(movement_threshold, 4);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session() {
        let mut server = test_server().await;
        let addr: SocketAddr = "127.0.0.1:40001".parse().unwrap();

        server.handle_packet(hello("Bob"), addr).await;
        server.handle_packet(hello("Bob"), addr).await;

        assert_eq!(server.sessions.read().await.len(), 1);

        let first = match server.out_rx.try_recv().unwrap().packet {
            Packet::Welcome { player_id } => player_id,
            other => panic!("Unexpected packet {:?}", other),
        };
        let second = match server.out_rx.try_recv().unwrap().packet {
            Packet::Welcome { player_id } => player_id,
            other => panic!("Unexpected packet {:?}", other),
        };
        assert_ne!(first, second);
    }
}
