//! Shared RADIUS port conventions and packet factories for clients and servers.
//!
//! Grounded on `pyrad.host.Host`: both ends of a RADIUS exchange agree on
//! which UDP port serves which packet code, and both build packets by
//! stamping a dictionary and secret onto a fresh [`Packet`]. Keeping that in
//! one place means a `Client` and a `Server` never drift on port numbers.

use crate::dictionary::Dictionary;
use crate::packet::{Packet, PacketCode};

/// The default RADIUS ports (RFC 2865 §2, RFC 2866 §2, RFC 5176 §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ports {
    pub auth: u16,
    pub acct: u16,
    pub coa: u16,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            auth: 1812,
            acct: 1813,
            coa: 3799,
        }
    }
}

/// Which port a packet code belongs on.
pub fn port_for(code: PacketCode) -> PortKind {
    use PacketCode::*;
    match code {
        AccessRequest | AccessAccept | AccessReject | AccessChallenge | StatusServer | StatusClient => {
            PortKind::Auth
        }
        AccountingRequest | AccountingResponse => PortKind::Acct,
        CoaRequest | CoaAck | CoaNak | DisconnectRequest | DisconnectAck | DisconnectNak => PortKind::Coa,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Auth,
    Acct,
    Coa,
}

impl PortKind {
    pub fn name(self) -> &'static str {
        match self {
            PortKind::Auth => "auth",
            PortKind::Acct => "acct",
            PortKind::Coa => "coa",
        }
    }

    pub fn select(self, ports: Ports) -> u16 {
        match self {
            PortKind::Auth => ports.auth,
            PortKind::Acct => ports.acct,
            PortKind::Coa => ports.coa,
        }
    }
}

/// Common packet-construction surface shared by [`crate::client::Client`]
/// and [`crate::server::Server`].
pub trait Host {
    fn dictionary(&self) -> &Dictionary;
    fn ports(&self) -> Ports;

    fn create_auth_packet(&self, secret: impl Into<Vec<u8>>) -> Packet {
        Packet::new(PacketCode::AccessRequest, secret)
    }

    fn create_acct_packet(&self, secret: impl Into<Vec<u8>>) -> Packet {
        Packet::new(PacketCode::AccountingRequest, secret)
    }

    fn create_coa_packet(&self, secret: impl Into<Vec<u8>>) -> Packet {
        Packet::new(PacketCode::CoaRequest, secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_default_to_rfc_values() {
        let ports = Ports::default();
        assert_eq!(ports.auth, 1812);
        assert_eq!(ports.acct, 1813);
        assert_eq!(ports.coa, 3799);
    }

    #[test]
    fn port_for_routes_coa_and_disconnect_together() {
        assert_eq!(port_for(PacketCode::CoaRequest), PortKind::Coa);
        assert_eq!(port_for(PacketCode::DisconnectRequest), PortKind::Coa);
        assert_eq!(port_for(PacketCode::AccountingRequest), PortKind::Acct);
        assert_eq!(port_for(PacketCode::AccessRequest), PortKind::Auth);
    }
}
