//! UDP server: binds the auth/acct/coa ports, admits datagrams from known
//! hosts, and dispatches decoded packets to handler callbacks.
//!
//! Grounded on the shape `pyrad.server.Server` is exercised through in
//! `tests/testServer.py` (no production `server.py` ships in the source
//! this is distilled from, only the test harness and `proxy.py`'s subclass
//! of it): a `RemoteHost` table keyed by source address, one socket per
//! configured port, and a `select`-style dispatch loop. `select.poll()`
//! becomes `tokio::select!` over however many sockets are bound; a ready
//! datagram is decoded and handed to a handler on its own task so one slow
//! handler can't stall the accept loop, which `select.poll()` cannot do.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::dictionary::Dictionary;
use crate::error::{RadiusError, ServerPacketError};
use crate::host::{Host, Ports};
use crate::packet::{Packet, PacketCode};

/// A known peer this server will accept packets from, and the secret shared
/// with it. Grounded on `pyrad.server.RemoteHost`.
#[derive(Debug, Clone)]
pub struct RemoteHost {
    pub address: IpAddr,
    pub secret: Vec<u8>,
    pub name: String,
}

impl RemoteHost {
    pub fn new(address: IpAddr, secret: impl Into<Vec<u8>>, name: impl Into<String>) -> Self {
        Self {
            address,
            secret: secret.into(),
            name: name.into(),
        }
    }
}

/// A decoded packet plus enough context to reply to its sender.
pub struct Inbound {
    pub packet: Packet,
    pub source: SocketAddr,
    pub host_name: String,
}

/// An outbound reply, addressed back to where its request came from.
pub struct Outbound {
    pub packet: Packet,
    pub destination: SocketAddr,
    pub port: PortSocket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSocket {
    Auth,
    Acct,
    Coa,
}

/// A RADIUS server listening on the auth, accounting, and CoA/Disconnect
/// ports, dispatching decoded packets onto a channel for the caller to
/// drive handling and replies.
pub struct Server {
    auth_socket: Option<Arc<UdpSocket>>,
    acct_socket: Option<Arc<UdpSocket>>,
    coa_socket: Option<Arc<UdpSocket>>,
    hosts: HashMap<IpAddr, RemoteHost>,
    dict: Dictionary,
    ports: Ports,
}

impl Server {
    pub fn new(dict: Dictionary, hosts: Vec<RemoteHost>) -> Self {
        Self {
            auth_socket: None,
            acct_socket: None,
            coa_socket: None,
            hosts: hosts.into_iter().map(|h| (h.address, h)).collect(),
            dict,
            ports: Ports::default(),
        }
    }

    pub fn with_ports(mut self, ports: Ports) -> Self {
        self.ports = ports;
        self
    }

    /// Binds all three ports on `bind_addr`. Mirrors `Server.bind_to_address`
    /// opening one auth socket and one acct socket per address; this crate
    /// adds the CoA/Disconnect socket RFC 5176 introduced after that design.
    pub async fn bind(&mut self, bind_ip: IpAddr) -> std::io::Result<()> {
        self.auth_socket = Some(Arc::new(Self::bind_tuned(bind_ip, self.ports.auth).await?));
        self.acct_socket = Some(Arc::new(Self::bind_tuned(bind_ip, self.ports.acct).await?));
        self.coa_socket = Some(Arc::new(Self::bind_tuned(bind_ip, self.ports.coa).await?));
        Ok(())
    }

    /// Binds one UDP socket and widens its kernel buffers with `socket2`,
    /// since the default buffer size under sustained RADIUS traffic drops
    /// datagrams before `recv_from` ever sees them.
    async fn bind_tuned(bind_ip: IpAddr, port: u16) -> std::io::Result<UdpSocket> {
        let socket = UdpSocket::bind(SocketAddr::new(bind_ip, port)).await?;
        let socket_ref = socket2::Socket::from(socket.into_std()?);
        socket_ref.set_recv_buffer_size(1024 * 1024)?;
        socket_ref.set_send_buffer_size(1024 * 1024)?;
        UdpSocket::from_std(socket_ref.into())
    }

    fn remote_host(&self, addr: IpAddr) -> Result<&RemoteHost, ServerPacketError> {
        self.hosts
            .get(&addr)
            .ok_or_else(|| ServerPacketError::UnknownHost(addr.to_string()))
    }

    fn check_port(code: PacketCode, port: &'static str) -> Result<(), ServerPacketError> {
        let valid = matches!(
            (port, code),
            ("auth", PacketCode::AccessRequest | PacketCode::StatusServer | PacketCode::StatusClient)
                | ("acct", PacketCode::AccountingRequest)
                | ("coa", PacketCode::CoaRequest | PacketCode::DisconnectRequest)
        );
        if valid {
            Ok(())
        } else {
            Err(ServerPacketError::WrongPort {
                code: code.as_u8(),
                port,
            })
        }
    }

    /// Runs the accept loop, pushing each admitted, decoded packet to `tx`.
    /// Each datagram is decoded and admitted on its own spawned task so a
    /// slow or full `tx` (the caller hasn't drained its handler channel)
    /// can't stall the `tokio::select!` loop across the other two ports —
    /// `select.poll()`-based dispatch loops can't make that guarantee since
    /// they run the equivalent of `admit` inline between polls. Packets
    /// from unknown hosts or on the wrong port are logged and dropped
    /// rather than propagated, matching `Server.run`'s
    /// `except ServerPacketError: pass`.
    pub async fn run(self: &Arc<Self>, tx: mpsc::Sender<Inbound>) -> Result<(), RadiusError> {
        let auth = self.auth_socket.clone().expect("bind() not called");
        let acct = self.acct_socket.clone().expect("bind() not called");
        let coa = self.coa_socket.clone().expect("bind() not called");

        loop {
            let mut auth_buf = vec![0u8; 4096];
            let mut acct_buf = vec![0u8; 4096];
            let mut coa_buf = vec![0u8; 4096];

            tokio::select! {
                res = auth.recv_from(&mut auth_buf) => {
                    if let Ok((n, from)) = res {
                        self.spawn_admit(auth_buf[..n].to_vec(), from, "auth", tx.clone());
                    }
                }
                res = acct.recv_from(&mut acct_buf) => {
                    if let Ok((n, from)) = res {
                        self.spawn_admit(acct_buf[..n].to_vec(), from, "acct", tx.clone());
                    }
                }
                res = coa.recv_from(&mut coa_buf) => {
                    if let Ok((n, from)) = res {
                        self.spawn_admit(coa_buf[..n].to_vec(), from, "coa", tx.clone());
                    }
                }
            }
        }
    }

    fn spawn_admit(self: &Arc<Self>, raw: Vec<u8>, from: SocketAddr, port: &'static str, tx: mpsc::Sender<Inbound>) {
        let server = self.clone();
        tokio::spawn(async move {
            server.admit(&raw, from, port, &tx).await;
        });
    }

    async fn admit(&self, raw: &[u8], from: SocketAddr, port: &'static str, tx: &mpsc::Sender<Inbound>) {
        let host = match self.remote_host(from.ip()) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, source = %from, "dropping packet from unknown host");
                return;
            }
        };
        let packet = match Packet::decode(raw, &self.dict, host.secret.clone()) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, source = %from, "dropping undecodable packet");
                return;
            }
        };
        if let Err(e) = Self::check_port(packet.code, port) {
            tracing::warn!(error = %e, source = %from, "dropping packet on wrong port");
            return;
        }
        let inbound = Inbound {
            packet,
            source: from,
            host_name: host.name.clone(),
        };
        if tx.send(inbound).await.is_err() {
            tracing::warn!("inbound channel closed, dropping packet");
        }
    }

    /// Sends a reply datagram on the socket matching `outbound.port`.
    pub async fn reply(&self, outbound: Outbound) -> std::io::Result<()> {
        let socket = match outbound.port {
            PortSocket::Auth => self.auth_socket.as_ref(),
            PortSocket::Acct => self.acct_socket.as_ref(),
            PortSocket::Coa => self.coa_socket.as_ref(),
        }
        .expect("bind() not called");
        let mut packet = outbound.packet;
        let raw = packet
            .encode()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
        socket.send_to(&raw, outbound.destination).await?;
        Ok(())
    }
}

impl Host for Server {
    fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    fn ports(&self) -> Ports {
        self.ports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_port_rejects_access_request_on_acct_port() {
        assert!(Server::check_port(PacketCode::AccessRequest, "acct").is_err());
        assert!(Server::check_port(PacketCode::AccessRequest, "auth").is_ok());
    }

    #[test]
    fn check_port_accepts_coa_and_disconnect_on_coa_port() {
        assert!(Server::check_port(PacketCode::CoaRequest, "coa").is_ok());
        assert!(Server::check_port(PacketCode::DisconnectRequest, "coa").is_ok());
        assert!(Server::check_port(PacketCode::CoaRequest, "auth").is_err());
    }

    #[test]
    fn unknown_host_is_rejected() {
        let server = Server::new(Dictionary::standard(), Vec::new());
        let addr: IpAddr = "203.0.113.5".parse().unwrap();
        assert!(server.remote_host(addr).is_err());
    }
}
