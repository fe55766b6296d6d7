//! Shared wire protocol for the entity tracking system.
//!
//! Both the server and the client speak this protocol: a single `Packet`
//! enum with one variant per named event, encoded with bincode over UDP.
//! The original event names carry the `tm:` prefix; `Packet::name` keeps
//! those names available for logging.

use serde::{Deserialize, Serialize};

/// Prefix carried by every event name at the transport boundary.
pub const EVENT_PREFIX: &str = "tm:";

/// Protocol version exchanged during the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Metadata fields that can be overwritten but never deleted.
pub const RESERVED_FIELDS: [&str; 3] = ["name", "icon", "pos"];

/// Returns true if `key` is one of the protected metadata fields.
pub fn is_reserved_field(key: &str) -> bool {
    RESERVED_FIELDS.contains(&key)
}

/// A 2D position in world units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Vec2 { x, y }
    }

    /// Squared Euclidean distance to `other`. Movement thresholds are
    /// pre-squared server-side so no square root is taken on the hot path.
    pub fn distance_squared(&self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Serializes the position as the `pos` metadata field value.
    pub fn to_field(&self) -> String {
        format!("{:.1},{:.1}", self.x, self.y)
    }
}

/// Every message exchanged between client and server.
///
/// Direction is noted per variant; the server drops client-bound variants
/// it receives and vice versa.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    /// client -> server: open a session.
    Hello {
        protocol_version: u32,
        player_name: String,
    },
    /// server -> client: session accepted, player id assigned.
    Welcome { player_id: u32 },
    /// server -> client: session refused.
    Rejected { reason: String },
    /// client -> server: explicit disconnect.
    Goodbye,

    /// client -> server: ask the server to start tracking `handle` for
    /// `player_id`. The server answers with `StartTracking` carrying its
    /// policy parameters.
    Track { player_id: u32, handle: u32 },
    /// client -> server: ask the server to stop tracking `handle`.
    Untrack { player_id: u32, handle: u32 },

    /// client -> server: confirmation that local tracking has begun.
    /// The owning player is implied by the packet's source session.
    Register {
        handle: u32,
        name: String,
        entity_type: String,
    },
    /// client -> server: local tracking has ended, clean up the record.
    Unregister { handle: u32 },

    /// client -> server: read a metadata field.
    MetadataGet {
        player_id: u32,
        handle: u32,
        key: String,
        request_id: u32,
    },
    /// server -> client: reply to `MetadataGet`. `None` means the field
    /// (or the tracking record) does not exist.
    MetadataValue {
        request_id: u32,
        value: Option<String>,
    },
    /// client -> server: write a metadata field. A blank value deletes
    /// the field instead.
    MetadataSet {
        player_id: u32,
        handle: u32,
        key: String,
        value: String,
    },
    /// client -> server: delete a non-reserved metadata field.
    MetadataDelete {
        player_id: u32,
        handle: u32,
        key: String,
    },

    /// server -> client: begin local tracking of `handle` with the
    /// server-chosen evaluation interval (ms) and pre-squared movement
    /// threshold.
    StartTracking {
        handle: u32,
        update_interval: u64,
        movement_threshold: u32,
    },
    /// server -> client: stop local tracking of `handle`.
    StopTracking { handle: u32 },
}

impl Packet {
    /// The prefixed event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Hello { .. } => "tm:Hello",
            Packet::Welcome { .. } => "tm:Welcome",
            Packet::Rejected { .. } => "tm:Rejected",
            Packet::Goodbye => "tm:Goodbye",
            Packet::Track { .. } => "tm:Track",
            Packet::Untrack { .. } => "tm:Untrack",
            Packet::Register { .. } => "tm:register",
            Packet::Unregister { .. } => "tm:unregister",
            Packet::MetadataGet { .. } => "tm:MetadataGet",
            Packet::MetadataValue { .. } => "tm:MetadataValue",
            Packet::MetadataSet { .. } => "tm:MetadataSet",
            Packet::MetadataDelete { .. } => "tm:MetadataDelete",
            Packet::StartTracking { .. } => "tm:Track",
            Packet::StopTracking { .. } => "tm:Untrack",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_distance_squared() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(4.0, 6.0);
        assert_eq!(a.distance_squared(b), 25.0);
        assert_eq!(b.distance_squared(a), 25.0);
        assert_eq!(a.distance_squared(a), 0.0);
        assert_approx_eq!(
            Vec2::new(0.1, 0.2).distance_squared(Vec2::new(0.4, 0.6)),
            0.25,
            1e-6
        );
    }

    #[test]
    fn test_distance_from_origin() {
        let p = Vec2::new(3.0, 4.0);
        assert_eq!(p.distance_squared(Vec2::ZERO), 25.0);
    }

    #[test]
    fn test_pos_field_format() {
        assert_eq!(Vec2::new(12.34, -5.0).to_field(), "12.3,-5.0");
        assert_eq!(Vec2::ZERO.to_field(), "0.0,0.0");
    }

    #[test]
    fn test_reserved_fields() {
        assert!(is_reserved_field("name"));
        assert!(is_reserved_field("icon"));
        assert!(is_reserved_field("pos"));
        assert!(!is_reserved_field("Speed"));
        assert!(!is_reserved_field(""));
    }

    #[test]
    fn test_event_names_are_prefixed() {
        let packets = vec![
            Packet::Hello {
                protocol_version: PROTOCOL_VERSION,
                player_name: "Bob".to_string(),
            },
            Packet::Track {
                player_id: 1,
                handle: 2,
            },
            Packet::Register {
                handle: 2,
                name: "Entity #2 (Bob)".to_string(),
                entity_type: "vehicle".to_string(),
            },
            Packet::StopTracking { handle: 2 },
        ];

        for packet in packets {
            assert!(packet.name().starts_with(EVENT_PREFIX));
        }
    }

    #[test]
    fn test_packet_serialization_track() {
        let packet = Packet::Track {
            player_id: 42,
            handle: 7,
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Track { player_id, handle } => {
                assert_eq!(player_id, 42);
                assert_eq!(handle, 7);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_start_tracking() {
        let packet = Packet::StartTracking {
            handle: 7,
            update_interval: 1000,
            movement_threshold: 9,
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::StartTracking {
                handle,
                update_interval,
                movement_threshold,
            } => {
                assert_eq!(handle, 7);
                assert_eq!(update_interval, 1000);
                assert_eq!(movement_threshold, 9);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_metadata_value() {
        let packet = Packet::MetadataValue {
            request_id: 3,
            value: None,
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::MetadataValue { request_id, value } => {
                assert_eq!(request_id, 3);
                assert_eq!(value, None);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_roundtrip_all_variants() {
        let packets = vec![
            Packet::Hello {
                protocol_version: 1,
                player_name: "Bob".to_string(),
            },
            Packet::Welcome { player_id: 42 },
            Packet::Rejected {
                reason: "version mismatch".to_string(),
            },
            Packet::Goodbye,
            Packet::Track {
                player_id: 42,
                handle: 7,
            },
            Packet::Untrack {
                player_id: 42,
                handle: 7,
            },
            Packet::Register {
                handle: 7,
                name: "Entity #7 (Bob)".to_string(),
                entity_type: "vehicle".to_string(),
            },
            Packet::Unregister { handle: 7 },
            Packet::MetadataGet {
                player_id: 42,
                handle: 7,
                key: "Speed".to_string(),
                request_id: 1,
            },
            Packet::MetadataValue {
                request_id: 1,
                value: Some("55 mph".to_string()),
            },
            Packet::MetadataSet {
                player_id: 42,
                handle: 7,
                key: "Speed".to_string(),
                value: "55 mph".to_string(),
            },
            Packet::MetadataDelete {
                player_id: 42,
                handle: 7,
                key: "Speed".to_string(),
            },
            Packet::StartTracking {
                handle: 7,
                update_interval: 1000,
                movement_threshold: 9,
            },
            Packet::StopTracking { handle: 7 },
        ];

        for packet in packets {
            let serialized = bincode::serialize(&packet).unwrap();
            let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
            assert_eq!(packet.name(), deserialized.name());
        }
    }
}
