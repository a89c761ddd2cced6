//! Error taxonomy for the dictionary, packet codec, and client/server I/O layers.
//!
//! Each kind below maps to one failure mode the protocol core can produce. Call
//! sites that need a single error type (the public client/server API) fold
//! these into [`RadiusError`].

use thiserror::Error;

/// Malformed datagram or attribute framing encountered while decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet header is corrupt")]
    CorruptHeader,
    #[error("declared length {declared} does not match actual length {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("packet length {0} exceeds the 4096 octet maximum")]
    PacketTooLong(usize),
    #[error("attribute length {0} is smaller than the 2 octet minimum")]
    AttributeTooShort(u8),
    #[error("unknown attribute {0}")]
    UnknownAttribute(String),
}

/// Raised synchronously to the caller attempting to encode a value; never
/// surfaces on the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("value does not match the type of attribute {0}")]
    TypeMismatch(String),
    #[error("strings and octet values are limited to 253 octets, got {0}")]
    ValueTooLong(usize),
    #[error("unknown attribute type tag {0}")]
    UnknownType(String),
    #[error("attribute {0} is not present in the dictionary")]
    UnknownAttribute(String),
}

/// A decoded packet could not be routed to a handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServerPacketError {
    #[error("unknown host {0}")]
    UnknownHost(String),
    #[error("packet code {code} is not valid on the {port} port")]
    WrongPort { code: u8, port: &'static str },
}

/// The client exhausted its retry budget without a verified reply.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no verified reply after {attempts} attempt(s)")]
pub struct TimeoutError {
    pub attempts: u32,
}

/// Response-Authenticator or Message-Authenticator mismatch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("response authenticator mismatch")]
    ResponseAuthenticator,
    #[error("message-authenticator mismatch")]
    MessageAuthenticator,
    #[error("no Message-Authenticator attribute present to verify")]
    MessageAuthenticatorAbsent,
    #[error("reply id {reply_id} does not match outstanding request id {request_id}")]
    IdMismatch { request_id: u8, reply_id: u8 },
}

/// Top-level error type for call sites that need one error across the codec,
/// packet, and I/O layers.
#[derive(Debug, Error)]
pub enum RadiusError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    ServerPacket(#[from] ServerPacketError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RadiusError>;
