// Async driver for one peer session
// Owns the UDP socket, gathers candidates (host + STUN) and pumps the sans-I/O session

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use str0m::Candidate;

use super::peer::{PeerError, PeerEvent, PeerOutput, PeerSession};
use super::protocol::SessionDescription;
use crate::config::NetworkConfig;

const STUN_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands accepted by a running driver
#[derive(Debug, Clone, PartialEq)]
pub enum PeerCommand {
    Signal {
        remote_id: String,
        description: SessionDescription,
    },
    Send(String),
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoticeKind {
    /// Description the owner must relay to the remote
    Signal(SessionDescription),
    Event(PeerEvent),
}

/// Everything a driver reports, tagged with its session key
#[derive(Debug, Clone, PartialEq)]
pub struct PeerNotice {
    pub session: String,
    pub remote_id: String,
    pub kind: NoticeKind,
}

/// Cheap handle to a driver task; dropping every clone closes the session
#[derive(Debug, Clone)]
pub struct PeerHandle {
    key: String,
    cmd_tx: mpsc::UnboundedSender<PeerCommand>,
}

impl PeerHandle {
    /// Handle plus the command stream a driver consumes
    pub fn channel(key: String) -> (Self, mpsc::UnboundedReceiver<PeerCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (Self { key, cmd_tx }, cmd_rx)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn signal(&self, remote_id: &str, description: SessionDescription) {
        self.command(PeerCommand::Signal {
            remote_id: remote_id.to_string(),
            description,
        });
    }

    pub fn send_message<T: Serialize>(&self, message: &T) -> Result<(), PeerError> {
        let text = serde_json::to_string(message)?;
        self.command(PeerCommand::Send(text));
        Ok(())
    }

    pub fn close(&self) {
        self.command(PeerCommand::Close);
    }

    fn command(&self, command: PeerCommand) {
        if self.cmd_tx.send(command).is_err() {
            debug!("Peer session {} already stopped", self.key);
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeerSettings {
    pub stun_server: Option<String>,
    pub reconnect_interval: Duration,
}

impl PeerSettings {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            stun_server: config.stun_server().map(str::to_string),
            reconnect_interval: config.peer_reconnect_interval(),
        }
    }
}

/// Start a session driver. Returns at once; socket setup happens in the task.
pub fn spawn_peer(
    settings: PeerSettings,
    remote_id: String,
    is_initiator: bool,
    notices: mpsc::UnboundedSender<PeerNotice>,
) -> PeerHandle {
    let key = uuid::Uuid::new_v4().to_string();
    let (handle, cmd_rx) = PeerHandle::channel(key.clone());

    tokio::spawn(async move {
        let notifier = Notifier {
            session: key,
            remote_id: remote_id.clone(),
            notices,
        };
        if let Err(e) = drive(&settings, remote_id, is_initiator, cmd_rx, &notifier).await {
            error!("Peer session {} stopped: {}", notifier.session, e);
            notifier.send(NoticeKind::Event(PeerEvent::Error(e.to_string())));
        }
    });

    handle
}

struct Notifier {
    session: String,
    remote_id: String,
    notices: mpsc::UnboundedSender<PeerNotice>,
}

impl Notifier {
    fn send(&self, kind: NoticeKind) {
        let _ = self.notices.send(PeerNotice {
            session: self.session.clone(),
            remote_id: self.remote_id.clone(),
            kind,
        });
    }
}

async fn drive(
    settings: &PeerSettings,
    remote_id: String,
    is_initiator: bool,
    mut cmd_rx: mpsc::UnboundedReceiver<PeerCommand>,
    notifier: &Notifier,
) -> Result<()> {
    let (socket, candidates) = bind_socket(settings).await?;
    let local_addr = socket.local_addr()?;

    let mut session = PeerSession::new(
        remote_id,
        is_initiator,
        candidates,
        settings.reconnect_interval,
        Instant::now(),
    );
    info!(
        "Peer session {} ({}) on {}",
        notifier.session,
        if is_initiator { "initiator" } else { "acceptor" },
        local_addr
    );

    let mut buf = vec![0u8; 65_535];

    loop {
        let deadline = loop {
            match session.poll_output() {
                Some(PeerOutput::Transmit(datagram)) => {
                    if let Err(e) = socket.send_to(&datagram.contents, datagram.destination).await {
                        warn!("Failed to send UDP packet to {}: {}", datagram.destination, e);
                    }
                }
                Some(PeerOutput::Signal(description)) => {
                    notifier.send(NoticeKind::Signal(description));
                }
                Some(PeerOutput::Event(event)) => {
                    notifier.send(NoticeKind::Event(event));
                }
                Some(PeerOutput::Timeout(deadline)) => break deadline,
                None => {
                    debug!("Peer session {} closed", notifier.session);
                    return Ok(());
                }
            }
        };

        tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, source)) => {
                    session.handle_receive(Instant::now(), source, local_addr, &buf[..n]);
                }
                Err(e) => warn!("UDP receive error: {}", e),
            },
            command = cmd_rx.recv() => match command {
                Some(PeerCommand::Signal { remote_id, description }) => {
                    session.handle_signal(&remote_id, description, Instant::now());
                }
                Some(PeerCommand::Send(text)) => {
                    if let Err(e) = session.send_text(&text) {
                        warn!("Peer session {} dropped outbound message: {}", notifier.session, e);
                    }
                }
                Some(PeerCommand::Close) | None => session.close(),
            },
            _ = tokio::time::sleep_until(deadline.into()) => {
                session.handle_timeout(Instant::now());
            }
        }
    }
}

/// Bind on the preferred interface and collect host and reflexive candidates
async fn bind_socket(settings: &PeerSettings) -> Result<(UdpSocket, Vec<Candidate>)> {
    let local_ip = discover_local_ip().unwrap_or_else(|e| {
        warn!("Local IP discovery failed ({}), using loopback", e);
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    });

    // Bound to the concrete address so str0m can match inbound destinations
    let std_socket = StdUdpSocket::bind(SocketAddr::new(local_ip, 0))?;
    let host_addr = std_socket.local_addr()?;

    let mut candidates = vec![Candidate::host(host_addr, "udp")
        .map_err(|e| anyhow!("Failed to create host candidate: {}", e))?];
    debug!("Host candidate {}", host_addr);

    if let Some(stun_server) = settings.stun_server.as_deref() {
        match query_stun_server(&std_socket, stun_server).await {
            Ok(public_addr) => match Candidate::server_reflexive(public_addr, host_addr, "udp") {
                Ok(candidate) => {
                    info!("Server reflexive candidate {}", public_addr);
                    candidates.push(candidate);
                }
                Err(e) => warn!("Failed to create server reflexive candidate: {}", e),
            },
            Err(e) => warn!("STUN query failed, using host candidate only: {}", e),
        }
    }

    std_socket.set_read_timeout(None)?;
    std_socket.set_nonblocking(true)?;
    Ok((UdpSocket::from_std(std_socket)?, candidates))
}

/// Preferred local IPv4 address. With both a 10.x (VPN) and a 192.168.x
/// interface up the VPN wins so STUN sees the routable side.
pub fn discover_local_ip() -> Result<IpAddr> {
    let interfaces =
        if_addrs::get_if_addrs().map_err(|e| anyhow!("Failed to get network interfaces: {}", e))?;

    let mut candidates: Vec<(String, Ipv4Addr)> = interfaces
        .into_iter()
        .filter_map(|iface| match iface.addr.ip() {
            IpAddr::V4(ipv4) if !ipv4.is_loopback() => Some((iface.name, ipv4)),
            _ => None,
        })
        .collect();

    if candidates.is_empty() {
        return Err(anyhow!("No suitable network interfaces found"));
    }

    let has_vpn = candidates.iter().any(|(_, ip)| ip.octets()[0] == 10);
    let has_home_network = candidates
        .iter()
        .any(|(_, ip)| ip.octets()[0] == 192 && ip.octets()[1] == 168);

    candidates.sort_by_key(|(_, ip)| interface_score(*ip, has_vpn, has_home_network));

    let (name, ip) = &candidates[0];
    debug!("Selected interface {} with IP {}", name, ip);
    Ok(IpAddr::V4(*ip))
}

fn interface_score(ip: Ipv4Addr, has_vpn: bool, has_home_network: bool) -> u8 {
    let octets = ip.octets();
    match octets {
        [10, ..] => {
            if has_home_network {
                0
            } else {
                2
            }
        }
        [192, 168, ..] => {
            if has_vpn {
                1
            } else {
                0
            }
        }
        [172, b, ..] if (16..=31).contains(&b) => 1,
        _ => 3,
    }
}

/// Ask the STUN server for our public address.
/// Must run on the socket ICE will use, or the NAT mapping differs.
async fn query_stun_server(socket: &StdUdpSocket, stun_server: &str) -> Result<SocketAddr> {
    let stun_addr = tokio::net::lookup_host(stun_server)
        .await?
        .find(|addr| addr.is_ipv4())
        .ok_or_else(|| anyhow!("Failed to resolve STUN server to IPv4 address"))?;

    let socket = socket.try_clone()?;
    let client = stunclient::StunClient::new(stun_addr);

    tokio::task::spawn_blocking(move || -> Result<SocketAddr> {
        socket.set_read_timeout(Some(STUN_TIMEOUT))?;
        client
            .query_external_address(&socket)
            .map_err(|e| anyhow!("STUN query failed: {}", e))
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_scoring() {
        let home: Ipv4Addr = "192.168.1.20".parse().unwrap();
        let vpn: Ipv4Addr = "10.8.0.2".parse().unwrap();
        let corporate: Ipv4Addr = "172.20.0.5".parse().unwrap();
        let other: Ipv4Addr = "100.64.0.1".parse().unwrap();

        // Home network alone wins
        assert!(interface_score(home, false, true) < interface_score(corporate, false, true));
        // VPN beats home network when both are up
        assert!(interface_score(vpn, true, true) < interface_score(home, true, true));
        assert_eq!(interface_score(other, false, false), 3);
    }

    #[test]
    fn test_handle_forwards_commands() {
        let (handle, mut commands) = PeerHandle::channel("k-1".to_string());

        handle.signal(
            "c-1",
            SessionDescription::Answer {
                sdp: "v=0".to_string(),
            },
        );
        handle
            .send_message(&serde_json::json!({"type": "leave-room"}))
            .unwrap();
        handle.close();

        assert_eq!(
            commands.try_recv().unwrap(),
            PeerCommand::Signal {
                remote_id: "c-1".to_string(),
                description: SessionDescription::Answer {
                    sdp: "v=0".to_string()
                },
            }
        );
        assert_eq!(
            commands.try_recv().unwrap(),
            PeerCommand::Send(r#"{"type":"leave-room"}"#.to_string())
        );
        assert_eq!(commands.try_recv().unwrap(), PeerCommand::Close);
    }

    #[test]
    fn test_settings_without_stun() {
        let config = NetworkConfig {
            stun_server: String::new(),
            ..NetworkConfig::default()
        };
        let settings = PeerSettings::from_config(&config);
        assert!(settings.stun_server.is_none());
        assert_eq!(settings.reconnect_interval, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_drivers_connect_over_loopback() {
        let settings = PeerSettings {
            stun_server: None,
            reconnect_interval: Duration::from_secs(15),
        };
        let (client_tx, mut client_rx) = mpsc::unbounded_channel();
        let (server_tx, mut server_rx) = mpsc::unbounded_channel();

        let client = spawn_peer(settings.clone(), "server".to_string(), true, client_tx);
        let mut server: Option<PeerHandle> = None;

        let connected = tokio::time::timeout(Duration::from_secs(10), async {
            let mut client_connected = false;
            let mut server_connected = false;
            while !(client_connected && server_connected) {
                tokio::select! {
                    Some(notice) = client_rx.recv() => match notice.kind {
                        NoticeKind::Signal(description) => {
                            let handle = server.get_or_insert_with(|| {
                                spawn_peer(
                                    settings.clone(),
                                    "client".to_string(),
                                    false,
                                    server_tx.clone(),
                                )
                            });
                            handle.signal("client", description);
                        }
                        NoticeKind::Event(PeerEvent::Connect) => client_connected = true,
                        NoticeKind::Event(_) => {}
                    },
                    Some(notice) = server_rx.recv() => match notice.kind {
                        NoticeKind::Signal(description) => client.signal("server", description),
                        NoticeKind::Event(PeerEvent::Connect) => server_connected = true,
                        NoticeKind::Event(_) => {}
                    },
                }
            }
        })
        .await;

        assert!(connected.is_ok(), "drivers did not connect");
    }
}
