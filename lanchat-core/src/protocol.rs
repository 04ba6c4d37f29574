//! LanChat wire protocol: well-known endpoints, message types, discovery literal.

use std::net::Ipv4Addr;
use std::time::Duration;

/// Server TCP port. Clients connect here after discovery.
pub const SERVER_PORT: u16 = 22222;

/// Multicast group the server announces on.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// UDP port for discovery announcements.
pub const MULTICAST_PORT: u16 = 1900;

/// Discovery datagram. Carries no address or port; clients use the sender IP and [`SERVER_PORT`].
pub const ANNOUNCEMENT: &[u8] = b"CHAT_SERVER_ANNOUNCEMENT";

/// Interval between two announcements.
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(5);

/// `message_type` of a chat text PDU.
pub const MSG_TYPE_CHAT: u8 = 1;

/// Input line that ends the local send loop. Never transmitted.
pub const EXIT_SENTINEL: &str = "exit";

/// True if a discovery datagram starts with the announcement literal.
/// Trailing bytes are ignored.
pub fn is_announcement(datagram: &[u8]) -> bool {
    datagram.starts_with(ANNOUNCEMENT)
}
