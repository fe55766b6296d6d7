//! Client network layer: handshake, server-directed tracking requests,
//! and the outgoing packet queue fed by the registry's entity tasks.

use crate::registry::{ClientRegistry, RegistryEvent};
use crate::runtime::EntityRuntime;
use bincode::{deserialize, serialize};
use log::{error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Requests the application (the demo driver) can issue while the
/// network loop owns the connection.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// Ask the server to start tracking `handle` for this player.
    RequestTrack { handle: u32 },
    /// Ask the server to stop tracking `handle`.
    RequestUntrack { handle: u32 },
    /// Write a metadata field on one of this player's tracked entities.
    SetField {
        handle: u32,
        key: String,
        value: String,
    },
    /// Read a metadata field; the reply is logged when it arrives.
    GetField { handle: u32, key: String },
    /// Delete a non-reserved metadata field.
    DeleteField { handle: u32, key: String },
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    player_id: Option<u32>,
    player_name: String,
    runtime: Arc<dyn EntityRuntime>,

    registry: Option<ClientRegistry>,
    next_request_id: u32,

    outgoing_tx: mpsc::UnboundedSender<Packet>,
    outgoing_rx: mpsc::UnboundedReceiver<Packet>,
    events_tx: mpsc::UnboundedSender<RegistryEvent>,
    events_rx: mpsc::UnboundedReceiver<RegistryEvent>,
    command_rx: mpsc::UnboundedReceiver<ClientCommand>,
}

impl Client {
    /// Binds a local socket and returns the client plus the command
    /// handle the application drives it with.
    pub async fn new(
        server_addr: &str,
        player_name: &str,
        runtime: Arc<dyn EntityRuntime>,
    ) -> Result<(Self, mpsc::UnboundedSender<ClientCommand>), Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Ok((
            Client {
                socket,
                server_addr,
                player_id: None,
                player_name: player_name.to_string(),
                runtime,
                registry: None,
                next_request_id: 1,
                outgoing_tx,
                outgoing_rx,
                events_tx,
                events_rx,
                command_rx,
            },
            command_tx,
        ))
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to {}...", self.server_addr);
        self.send_packet(&Packet::Hello {
            protocol_version: PROTOCOL_VERSION,
            player_name: self.player_name.clone(),
        })
        .await
    }

    /// Handles a server-originated packet. Returns false when the
    /// connection is over.
    fn handle_packet(&mut self, packet: Packet) -> bool {
        match packet {
            Packet::Welcome { player_id } => {
                info!("Connected as player {}", player_id);
                self.player_id = Some(player_id);
                self.registry = Some(ClientRegistry::new(
                    player_id,
                    &self.player_name,
                    Arc::clone(&self.runtime),
                    self.outgoing_tx.clone(),
                    self.events_tx.clone(),
                ));
            }

            Packet::Rejected { reason } => {
                error!("Connection rejected: {}", reason);
                return false;
            }

            Packet::StartTracking {
                handle,
                update_interval,
                movement_threshold,
            } => match self.registry.as_mut() {
                Some(registry) => registry.track(handle, update_interval, movement_threshold),
                None => warn!("StartTracking before welcome, ignoring"),
            },

            Packet::StopTracking { handle } => {
                if let Some(registry) = self.registry.as_mut() {
                    registry.untrack(handle);
                }
            }

            Packet::MetadataValue { request_id, value } => {
                info!("Metadata reply #{}: {:?}", request_id, value);
            }

            _ => {
                warn!("Unexpected {} from server", packet.name());
            }
        }
        true
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        let player_id = match self.player_id {
            Some(id) => id,
            None => {
                warn!("Not connected yet, dropping command");
                return;
            }
        };

        let packet = match command {
            ClientCommand::RequestTrack { handle } => Packet::Track { player_id, handle },
            ClientCommand::RequestUntrack { handle } => Packet::Untrack { player_id, handle },
            ClientCommand::SetField { handle, key, value } => Packet::MetadataSet {
                player_id,
                handle,
                key,
                value,
            },
            ClientCommand::GetField { handle, key } => {
                let request_id = self.next_request_id;
                self.next_request_id += 1;
                Packet::MetadataGet {
                    player_id,
                    handle,
                    key,
                    request_id,
                }
            }
            ClientCommand::DeleteField { handle, key } => Packet::MetadataDelete {
                player_id,
                handle,
                key,
            },
        };

        if let Err(e) = self.send_packet(&packet).await {
            error!("Failed to send {}: {}", packet.name(), e);
        }
    }

    /// Main client loop.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut buffer = [0u8; 2048];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                if !self.handle_packet(packet) {
                                    break;
                                }
                            }
                        }
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                // Packets queued by the registry and its entity tasks.
                Some(packet) = self.outgoing_rx.recv() => {
                    if let Err(e) = self.send_packet(&packet).await {
                        error!("Failed to send {}: {}", packet.name(), e);
                    }
                },

                // Self-terminating entities funnel into the same untrack
                // path an external request would take.
                Some(event) = self.events_rx.recv() => {
                    let RegistryEvent::EntityDied { handle } = event;
                    if let Some(registry) = self.registry.as_mut() {
                        registry.untrack(handle);
                    }
                },

                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            // Application hung up; say goodbye.
                            let _ = self.send_packet(&Packet::Goodbye).await;
                            break;
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
