//! RADIUS (RFC 2865/2866/3576/5176/3579) protocol core: a dictionary, a
//! packet codec with request/response/message authenticators, and client
//! and server UDP I/O.
//!
//! This crate covers the wire protocol and the two ends of a UDP exchange.
//! Loading dictionary files, reading a config format, and exposing a CLI
//! are left to callers — see each module's docs for exactly where the
//! boundary sits.

pub mod client;
pub mod codec;
pub mod dictionary;
pub mod error;
pub mod host;
pub mod packet;
pub mod server;

pub use client::Client;
pub use dictionary::Dictionary;
pub use error::{RadiusError, Result};
pub use packet::{AttrValue, Packet, PacketCode};

/// Library version, exposed for diagnostics and `User-Agent`-style logging.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
