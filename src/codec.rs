//! Scalar attribute codec primitives.
//!
//! Each function here encodes one value to the fixed octet layout RFC 2865
//! §5 assigns to its declared type, or decodes the inverse. Failures are
//! [`EncodingError`]; these never touch the network, they only guard values
//! supplied by the caller.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::EncodingError;

/// The closed set of attribute wire types a [`crate::dictionary::Dictionary`]
/// entry can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    String,
    Octets,
    Integer,
    Integer64,
    Date,
    IpAddr,
    Ipv6Addr,
    Ipv6Prefix,
    Abinary,
    Signed,
    Short,
    Byte,
    Tlv,
}

impl AttributeType {
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Octets => "octets",
            Self::Integer => "integer",
            Self::Integer64 => "integer64",
            Self::Date => "date",
            Self::IpAddr => "ipaddr",
            Self::Ipv6Addr => "ipv6addr",
            Self::Ipv6Prefix => "ipv6prefix",
            Self::Abinary => "abinary",
            Self::Signed => "signed",
            Self::Short => "short",
            Self::Byte => "byte",
            Self::Tlv => "tlv",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Self::String,
            "octets" => Self::Octets,
            "integer" => Self::Integer,
            "integer64" => Self::Integer64,
            "date" => Self::Date,
            "ipaddr" => Self::IpAddr,
            "ipv6addr" => Self::Ipv6Addr,
            "ipv6prefix" => Self::Ipv6Prefix,
            "abinary" => Self::Abinary,
            "signed" => Self::Signed,
            "short" => Self::Short,
            "byte" => Self::Byte,
            "tlv" => Self::Tlv,
            _ => return None,
        })
    }
}

const MAX_STRING_LEN: usize = 253;

pub fn encode_string(value: &str) -> Result<Vec<u8>, EncodingError> {
    if value.len() > MAX_STRING_LEN {
        return Err(EncodingError::ValueTooLong(value.len()));
    }
    Ok(value.as_bytes().to_vec())
}

pub fn decode_string(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

/// Raw octets; a `0x`-prefixed ASCII string is accepted on encode and
/// unhexed, matching `pyrad.tools.encode_octets`.
pub fn encode_octets(value: &[u8]) -> Result<Vec<u8>, EncodingError> {
    if value.len() > MAX_STRING_LEN {
        return Err(EncodingError::ValueTooLong(value.len()));
    }
    if let Some(hex) = value.strip_prefix(b"0x") {
        let hex = std::str::from_utf8(hex).map_err(|_| EncodingError::TypeMismatch("octets".into()))?;
        decode_hex(hex).ok_or_else(|| EncodingError::TypeMismatch("octets".into()))
    } else {
        Ok(value.to_vec())
    }
}

pub fn decode_octets(value: &[u8]) -> Vec<u8> {
    value.to_vec()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

pub fn encode_integer(value: u32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn decode_integer(value: &[u8]) -> Result<u32, EncodingError> {
    let arr: [u8; 4] = value
        .try_into()
        .map_err(|_| EncodingError::TypeMismatch("integer".into()))?;
    Ok(u32::from_be_bytes(arr))
}

pub fn encode_signed(value: i32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn decode_signed(value: &[u8]) -> Result<i32, EncodingError> {
    let arr: [u8; 4] = value
        .try_into()
        .map_err(|_| EncodingError::TypeMismatch("signed".into()))?;
    Ok(i32::from_be_bytes(arr))
}

pub fn encode_short(value: u16) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn decode_short(value: &[u8]) -> Result<u16, EncodingError> {
    let arr: [u8; 2] = value
        .try_into()
        .map_err(|_| EncodingError::TypeMismatch("short".into()))?;
    Ok(u16::from_be_bytes(arr))
}

pub fn encode_byte(value: u8) -> Vec<u8> {
    vec![value]
}

pub fn decode_byte(value: &[u8]) -> Result<u8, EncodingError> {
    value
        .first()
        .copied()
        .ok_or_else(|| EncodingError::TypeMismatch("byte".into()))
}

pub fn encode_integer64(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn decode_integer64(value: &[u8]) -> Result<u64, EncodingError> {
    let arr: [u8; 8] = value
        .try_into()
        .map_err(|_| EncodingError::TypeMismatch("integer64".into()))?;
    Ok(u64::from_be_bytes(arr))
}

pub fn encode_date(value: u32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn decode_date(value: &[u8]) -> Result<u32, EncodingError> {
    decode_integer(value)
}

pub fn encode_ipv4_address(addr: Ipv4Addr) -> Vec<u8> {
    addr.octets().to_vec()
}

pub fn decode_ipv4_address(value: &[u8]) -> Result<Ipv4Addr, EncodingError> {
    let arr: [u8; 4] = value
        .try_into()
        .map_err(|_| EncodingError::TypeMismatch("ipaddr".into()))?;
    Ok(Ipv4Addr::from(arr))
}

pub fn encode_ipv6_address(addr: Ipv6Addr) -> Vec<u8> {
    addr.octets().to_vec()
}

pub fn decode_ipv6_address(value: &[u8]) -> Result<Ipv6Addr, EncodingError> {
    let mut buf = [0u8; 16];
    let n = value.len().min(16);
    buf[..n].copy_from_slice(&value[..n]);
    Ok(Ipv6Addr::from(buf))
}

/// `0 | prefix-len | network bytes`, matching `pyrad.tools.encode_ipv6_prefix`.
pub fn encode_ipv6_prefix(addr: Ipv6Addr, prefix_len: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 16);
    out.push(0);
    out.push(prefix_len);
    out.extend_from_slice(&addr.octets());
    out
}

/// Zero-pads to 18 octets before parsing, matching `decode_ipv6_prefix`'s
/// tolerance of truncated network bytes.
pub fn decode_ipv6_prefix(value: &[u8]) -> Result<(Ipv6Addr, u8), EncodingError> {
    let mut padded = value.to_vec();
    padded.resize(18, 0);
    let prefix_len = padded[1];
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&padded[2..18]);
    Ok((Ipv6Addr::from(buf), prefix_len))
}

/// Ascend filter rule (RFC-adjacent vendor format). Fixed 32-octet layout;
/// unspecified terms default to zero. Ported from
/// `pyrad.tools.encode_ascend_binary`.
#[derive(Debug, Clone, Default)]
pub struct AscendFilterRule {
    pub family_ipv6: bool,
    pub action_accept: bool,
    pub direction_out: bool,
    pub src: Option<(std::net::IpAddr, u8)>,
    pub dst: Option<(std::net::IpAddr, u8)>,
    pub proto: u8,
    pub sport: u16,
    pub dport: u16,
    pub sportq: u8,
    pub dportq: u8,
}

pub fn encode_ascend_binary(rule: &AscendFilterRule) -> Vec<u8> {
    let width = if rule.family_ipv6 { 16 } else { 4 };
    let mut src = vec![0u8; width];
    let mut srcl = 0u8;
    let mut dst = vec![0u8; width];
    let mut dstl = 0u8;

    if let Some((addr, len)) = rule.src {
        src = ip_to_bytes(addr, width);
        srcl = len;
    }
    if let Some((addr, len)) = rule.dst {
        dst = ip_to_bytes(addr, width);
        dstl = len;
    }

    let mut out = Vec::with_capacity(32);
    out.push(if rule.family_ipv6 { 0x03 } else { 0x01 });
    out.push(if rule.action_accept { 0x01 } else { 0x00 });
    out.push(if rule.direction_out { 0x00 } else { 0x01 });
    out.push(0);
    out.extend_from_slice(&src);
    out.extend_from_slice(&dst);
    out.push(srcl);
    out.push(dstl);
    out.push(rule.proto);
    out.push(0);
    out.extend_from_slice(&rule.sport.to_be_bytes());
    out.extend_from_slice(&rule.dport.to_be_bytes());
    out.push(rule.sportq);
    out.push(rule.dportq);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&[0u8; 8]);
    out
}

fn ip_to_bytes(addr: std::net::IpAddr, width: usize) -> Vec<u8> {
    let mut bytes = match addr {
        std::net::IpAddr::V4(v4) => v4.octets().to_vec(),
        std::net::IpAddr::V6(v6) => v6.octets().to_vec(),
    };
    bytes.resize(width, 0);
    bytes
}

/// Bug-compatible identity decode. `pyrad.tools.decode_ascend_binary` never
/// reconstructs an [`AscendFilterRule`]; real deployments that consume this
/// attribute treat the 32 raw octets as opaque, so this crate keeps that
/// behavior rather than inventing a symmetric decode with no consumer to
/// validate it against.
pub fn decode_ascend_binary(value: &[u8]) -> Vec<u8> {
    value.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_round_trips() {
        let addr: Ipv4Addr = "10.10.255.254".parse().unwrap();
        let encoded = encode_ipv4_address(addr);
        assert_eq!(encoded, vec![10, 10, 255, 254]);
        assert_eq!(decode_ipv4_address(&encoded).unwrap(), addr);
    }

    #[test]
    fn ipv6_prefix_zero_pads_network_bytes() {
        let addr: Ipv6Addr = "fc66::".parse().unwrap();
        let encoded = encode_ipv6_prefix(addr, 64);
        assert_eq!(encoded[0], 0);
        assert_eq!(encoded[1], 64);
        let (decoded_addr, decoded_len) = decode_ipv6_prefix(&encoded).unwrap();
        assert_eq!(decoded_addr, addr);
        assert_eq!(decoded_len, 64);
    }

    #[test]
    fn string_over_253_octets_rejected() {
        let s = "a".repeat(254);
        assert_eq!(encode_string(&s), Err(EncodingError::ValueTooLong(254)));
    }

    #[test]
    fn octets_hex_prefix_is_unhexed() {
        assert_eq!(encode_octets(b"0x0a0b").unwrap(), vec![0x0a, 0x0b]);
    }

    #[test]
    fn ascend_binary_defaults_to_ipv4_discard_in() {
        let rule = AscendFilterRule::default();
        let encoded = encode_ascend_binary(&rule);
        assert_eq!(encoded.len(), 32);
        assert_eq!(encoded[0], 0x01); // family ipv4
        assert_eq!(encoded[1], 0x00); // action discard
        assert_eq!(encoded[2], 0x01); // direction in
    }

    #[test]
    fn integer_round_trips() {
        assert_eq!(decode_integer(&encode_integer(4096)).unwrap(), 4096);
    }
}
