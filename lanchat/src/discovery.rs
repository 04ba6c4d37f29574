//! LAN discovery: UDP multicast announcement (server) and listener (client).

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use lanchat_core::{is_announcement, ANNOUNCEMENT};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::shutdown::{self, ShutdownRx};

/// Receive buffer for discovery datagrams. Longer datagrams are truncated.
const DATAGRAM_BUF: usize = 256;

/// Announce the server every `announce_interval` until shutdown.
pub async fn run_announcer(config: &Config, shutdown: ShutdownRx) -> Result<()> {
    let socket = make_announce_socket(config.multicast_ttl)?;
    let dest = SocketAddr::from((config.multicast_group, config.discovery_port));
    info!(%dest, interval = ?config.announce_interval(), "announcing server");
    announce_loop(&socket, dest, config.announce_interval(), shutdown).await;
    Ok(())
}

/// Send failures are logged; the loop keeps going.
pub async fn announce_loop(
    socket: &UdpSocket,
    dest: SocketAddr,
    interval: Duration,
    mut shutdown: ShutdownRx,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => match socket.send_to(ANNOUNCEMENT, dest).await {
                Ok(n) => trace!(%dest, bytes = n, "announcement sent"),
                Err(e) => warn!(%dest, error = %e, "announcement send failed"),
            },
            _ = shutdown::requested(&mut shutdown) => {
                debug!("announcer stopping");
                return;
            }
        }
    }
}

/// Join the group and wait for an announcement. Returns the server's TCP endpoint:
/// the announcement's source IP with the configured server port.
pub async fn discover_server(config: &Config, mut shutdown: ShutdownRx) -> Result<SocketAddr> {
    let socket = make_listen_socket(config.multicast_group, config.discovery_port)?;
    info!(
        group = %config.multicast_group,
        port = config.discovery_port,
        "waiting for server announcement"
    );
    let source = tokio::select! {
        r = wait_for_announcement(&socket, config.discovery_timeout()) => r?,
        _ = shutdown::requested(&mut shutdown) => return Err(ChatError::Cancelled),
    };
    let server = SocketAddr::new(source.ip(), config.server_port);
    info!(%server, "server discovered");
    Ok(server)
}

/// Wait for a datagram starting with the announcement literal; anything else is skipped.
/// `None` waits forever.
pub async fn wait_for_announcement(
    socket: &UdpSocket,
    timeout: Option<Duration>,
) -> Result<SocketAddr> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, recv_announcement(socket))
            .await
            .map_err(|_| ChatError::DiscoveryTimeout(limit))?,
        None => recv_announcement(socket).await,
    }
}

async fn recv_announcement(socket: &UdpSocket) -> Result<SocketAddr> {
    let mut buf = [0u8; DATAGRAM_BUF];
    loop {
        let (n, from) = socket.recv_from(&mut buf).await?;
        if is_announcement(&buf[..n]) {
            return Ok(from);
        }
        debug!(%from, bytes = n, "ignoring non-announcement datagram");
    }
}

fn make_announce_socket(ttl: u32) -> std::io::Result<UdpSocket> {
    let std_sock = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    std_sock.set_multicast_ttl_v4(ttl)?;
    std_sock.set_multicast_loop_v4(true)?;
    std_sock.set_nonblocking(true)?;
    UdpSocket::from_std(std_sock)
}

fn make_listen_socket(group: Ipv4Addr, port: u16) -> std::io::Result<UdpSocket> {
    let std_sock = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
    std_sock.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    std_sock.set_nonblocking(true)?;
    UdpSocket::from_std(std_sock)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn announcer_sends_literal_each_interval() {
        let rx = loopback().await;
        let tx = loopback().await;
        let dest = rx.local_addr().unwrap();
        let (stop, shutdown) = shutdown::channel();
        let task = tokio::spawn(async move {
            announce_loop(&tx, dest, Duration::from_millis(20), shutdown).await
        });

        let mut buf = [0u8; 64];
        for _ in 0..2 {
            let (n, _) = tokio::time::timeout(Duration::from_secs(2), rx.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&buf[..n], ANNOUNCEMENT);
        }

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn announcer_survives_send_failures() {
        let tx = loopback().await;
        // IPv6 destination from an IPv4 socket: every send fails.
        let dest: SocketAddr = "[::1]:9".parse().unwrap();
        let (stop, shutdown) = shutdown::channel();
        let task = tokio::spawn(async move {
            announce_loop(&tx, dest, Duration::from_millis(5), shutdown).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn listener_skips_noise_then_matches() {
        let listener = loopback().await;
        let addr = listener.local_addr().unwrap();
        let sender = loopback().await;
        sender.send_to(b"M-SEARCH * HTTP/1.1", addr).await.unwrap();
        sender.send_to(b"CHAT_SERVER", addr).await.unwrap();
        sender.send_to(ANNOUNCEMENT, addr).await.unwrap();

        let from = wait_for_announcement(&listener, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(from, sender.local_addr().unwrap());
    }

    #[tokio::test]
    async fn listener_times_out() {
        let listener = loopback().await;
        let limit = Duration::from_millis(50);
        let err = wait_for_announcement(&listener, Some(limit))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::DiscoveryTimeout(d) if d == limit));
    }

    #[tokio::test]
    #[ignore = "needs a multicast-capable interface"]
    async fn multicast_discovery_within_one_interval() {
        let config = Config {
            discovery_port: 41900,
            announce_interval_secs: 1,
            discovery_timeout_secs: 5,
            ..Config::default()
        };
        let (stop, shutdown) = shutdown::channel();
        let announcer_cfg = config.clone();
        let announcer_rx = shutdown.clone();
        let announcer =
            tokio::spawn(async move { run_announcer(&announcer_cfg, announcer_rx).await });
        let server = discover_server(&config, shutdown).await.unwrap();
        assert_eq!(server.port(), config.server_port);
        stop.send(true).unwrap();
        announcer.await.unwrap().unwrap();
    }
}
