//! UDP client: one outstanding request at a time, retried with backoffless
//! fixed timeouts, grounded on `pyrad.client.Client`.
//!
//! A `Client` owns a single socket and sends one request, waits for its
//! reply (discarding replies that don't verify against the outstanding
//! request), and retries up to a fixed count. It does not pipeline; a second
//! call to [`Client::send`] before the first returns would race on the same
//! socket, so callers serialize their own requests (a connection pool of
//! `Client`s is the scaling knob, not concurrency inside one `Client`).

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use md5::{Digest, Md5};
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::dictionary::Dictionary;
use crate::error::{RadiusError, TimeoutError, VerificationError};
use crate::host::{self, Host, Ports};
use crate::packet::{AttrValue, Key, Packet, PacketCode, RawValue};

const EAP_CODE_REQUEST: u8 = 1;
const EAP_CODE_RESPONSE: u8 = 2;
const EAP_TYPE_IDENTITY: u8 = 1;
const EAP_TYPE_MD5_CHALLENGE: u8 = 4;

/// A RADIUS client bound to one server and secret.
pub struct Client {
    server_ip: IpAddr,
    ports: Ports,
    secret: Vec<u8>,
    dict: Dictionary,
    retries: u32,
    timeout: Duration,
    socket: UdpSocket,
    next_id: AtomicU8,
}

impl Client {
    /// Binds an ephemeral local socket and targets `server_ip`. `retries`
    /// and `timeout` mirror pyrad's defaults (3 attempts, 5 second budget
    /// each).
    pub async fn new(server_ip: IpAddr, secret: Vec<u8>, dict: Dictionary) -> std::io::Result<Self> {
        let bind_addr: SocketAddr = if server_ip.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        Ok(Self {
            server_ip,
            ports: Ports::default(),
            secret,
            dict,
            retries: 3,
            timeout: Duration::from_secs(5),
            socket,
            next_id: AtomicU8::new(rand::random()),
        })
    }

    pub fn with_ports(mut self, ports: Ports) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn next_id(&self) -> u8 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends `request` and returns its verified reply, retrying on timeout.
    /// Replies that fail id or authenticator verification are discarded and
    /// the client keeps waiting out the current attempt's deadline, the way
    /// `Client._send_packet` ignores anything that doesn't `verify_reply`.
    pub async fn send(&self, request: &mut Packet) -> Result<Packet, RadiusError> {
        if request.id.is_none() {
            request.id = Some(self.next_id());
        }
        let id = request.id.unwrap();
        let port = host::port_for(request.code).select(self.ports);
        let addr = SocketAddr::new(self.server_ip, port);

        let mut attempt = 0u32;
        loop {
            if attempt > 0 && request.code == PacketCode::AccountingRequest {
                let current = match request.get(&self.dict, "Acct-Delay-Time")?.into_iter().next() {
                    Some(AttrValue::Int(v)) => v,
                    _ => 0,
                };
                request.set(&self.dict, "Acct-Delay-Time", AttrValue::Int(current + self.timeout.as_secs() as u32))?;
            }

            let raw = request.encode()?;
            self.socket.send_to(&raw, addr).await?;

            let deadline = Instant::now() + self.timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let mut buf = vec![0u8; 4096];
                let recv = tokio::time::timeout(remaining, self.socket.recv_from(&mut buf)).await;
                let Ok(Ok((n, from))) = recv else { break };
                if from.ip() != self.server_ip {
                    continue;
                }
                let Ok(reply) = Packet::decode(&buf[..n], &self.dict, self.secret.clone()) else {
                    continue;
                };
                let request_auth = request.authenticator.unwrap_or([0u8; 16]);
                if reply.verify_reply(id, request_auth).is_ok() {
                    return Ok(reply);
                }
            }

            attempt += 1;
            if attempt > self.retries {
                return Err(TimeoutError { attempts: attempt }.into());
            }
        }
    }

    /// Performs the two-flight EAP-MD5 exchange: an Access-Request carrying
    /// an EAP-Identity response, then (on Access-Challenge) an EAP-MD5
    /// response built from the challenge's `State`, returning the final
    /// Access-Accept/Reject. Grounded on `Client.send_packet`'s eap-md5
    /// branch.
    pub async fn authenticate_eap_md5(&self, username: &str, password: &[u8]) -> Result<Packet, RadiusError> {
        let id = self.next_id();
        let mut identity_payload = vec![EAP_CODE_RESPONSE, id];
        let len = (5 + username.len()) as u16;
        identity_payload.extend_from_slice(&len.to_be_bytes());
        identity_payload.push(EAP_TYPE_IDENTITY);
        identity_payload.extend_from_slice(username.as_bytes());

        let mut request = Packet::new(PacketCode::AccessRequest, self.secret.clone());
        request.id = Some(id);
        request.message_authenticator = true;
        request.set(&self.dict, "User-Name", AttrValue::Text(username.to_string()))?;
        request.raw_set(Key::Standard(79), vec![identity_payload]);

        let challenge = self.send(&mut request).await?;
        if challenge.code != PacketCode::AccessChallenge {
            return Ok(challenge);
        }

        let Some(RawValue::Plain(eap_values)) = challenge.attributes.get(Key::Standard(79)) else {
            return Err(VerificationError::MessageAuthenticatorAbsent.into());
        };
        let eap_md5 = eap_values.first().ok_or(VerificationError::MessageAuthenticatorAbsent)?;
        if eap_md5.len() < 6 || eap_md5[0] != EAP_CODE_REQUEST || eap_md5[4] != EAP_TYPE_MD5_CHALLENGE {
            return Err(VerificationError::MessageAuthenticatorAbsent.into());
        }
        let challenge_eap_id = eap_md5[1];
        let value_size = eap_md5[5] as usize;
        let md5_challenge_value = &eap_md5[6..6 + value_size.min(eap_md5.len() - 6)];

        let mut hasher = Md5::new();
        hasher.update([challenge_eap_id]);
        hasher.update(password);
        hasher.update(md5_challenge_value);
        let response_hash = hasher.finalize();

        let mut response_payload = vec![EAP_CODE_RESPONSE, challenge_eap_id];
        let rlen = (6 + response_hash.len()) as u16;
        response_payload.extend_from_slice(&rlen.to_be_bytes());
        response_payload.push(EAP_TYPE_MD5_CHALLENGE);
        response_payload.push(response_hash.len() as u8);
        response_payload.extend_from_slice(&response_hash);

        let mut response = Packet::new(PacketCode::AccessRequest, self.secret.clone());
        response.message_authenticator = true;
        response.set(&self.dict, "User-Name", AttrValue::Text(username.to_string()))?;
        response.raw_set(Key::Standard(79), vec![response_payload]);
        if let Some(state) = challenge.raw_get(Key::Standard(24)) {
            response.raw_set(Key::Standard(24), state.to_vec());
        }

        self.send(&mut response).await
    }
}

impl Host for Client {
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
    fn next_id_wraps_mod_256() {
        let counter = AtomicU8::new(255);
        let a = counter.fetch_add(1, Ordering::Relaxed);
        let b = counter.fetch_add(1, Ordering::Relaxed);
        assert_eq!(a, 255);
        assert_eq!(b, 0);
    }
}
