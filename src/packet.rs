//! RADIUS packet framing, authenticators, obfuscation, and attribute storage.
//!
//! This is the core of the crate. A [`Packet`] is a tagged value rather than
//! a class hierarchy: `code` alone selects which authenticator derivation
//! rule applies and which port a client would use, matching RFC 2865/2866/
//! 3576/5176's actual discriminator (the source this crate is grounded on
//! used `AuthPacket`/`AcctPacket`/`CoAPacket` subclasses; Rust has no reason
//! to repeat that split since the behavior is a pure function of `code`).

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::RngCore;

use crate::codec::{self, AscendFilterRule};
use crate::dictionary::Dictionary;
use crate::error::{DecodeError, EncodingError, VerificationError};

type HmacMd5 = Hmac<Md5>;

/// RADIUS packet codes (RFC 2865/2866/3576/5176).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketCode {
    AccessRequest = 1,
    AccessAccept = 2,
    AccessReject = 3,
    AccountingRequest = 4,
    AccountingResponse = 5,
    AccessChallenge = 11,
    StatusServer = 12,
    StatusClient = 13,
    DisconnectRequest = 40,
    DisconnectAck = 41,
    DisconnectNak = 42,
    CoaRequest = 43,
    CoaAck = 44,
    CoaNak = 45,
}

impl PacketCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        use PacketCode::*;
        Some(match code {
            1 => AccessRequest,
            2 => AccessAccept,
            3 => AccessReject,
            4 => AccountingRequest,
            5 => AccountingResponse,
            11 => AccessChallenge,
            12 => StatusServer,
            13 => StatusClient,
            40 => DisconnectRequest,
            41 => DisconnectAck,
            42 => DisconnectNak,
            43 => CoaRequest,
            44 => CoaAck,
            45 => CoaNak,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this code's frame is a request rather than a reply.
    pub fn is_request(self) -> bool {
        use PacketCode::*;
        matches!(
            self,
            AccessRequest | AccountingRequest | DisconnectRequest | CoaRequest | StatusServer | StatusClient
        )
    }

    /// The Request-Authenticator on this code's frame is computed over a
    /// zero-filled 16 octet placeholder rather than drawn fresh. RFC 2866 §4.1
    /// (accounting) and RFC 5176 §3 (CoA/Disconnect).
    pub fn authenticator_input_is_zero(self) -> bool {
        use PacketCode::*;
        matches!(
            self,
            AccountingRequest | DisconnectRequest | CoaRequest | AccountingResponse
        )
    }
}

/// Attribute key, normalized from either a dictionary name or a raw
/// numeric/vendor pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Standard(u8),
    Vendor(u32, u8),
}

/// The value a single attribute key holds. TLV sub-attributes are stored
/// nested rather than flattened, per the ordering invariant in §3.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Plain(Vec<Vec<u8>>),
    Tlv(Vec<(u8, Vec<Vec<u8>>)>),
}

/// Insertion-order-preserving attribute store.
///
/// RADIUS permits repeated attributes and their relative order is semantic,
/// so this is not a `HashMap` — it is a small ordered map built the way
/// `pyrad.packet.Packet` relies on `OrderedDict` for the same invariant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap {
    order: Vec<Key>,
    entries: HashMap<Key, RawValue>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: Key) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn get(&self, key: Key) -> Option<&RawValue> {
        self.entries.get(&key)
    }

    pub fn remove(&mut self, key: Key) {
        if self.entries.remove(&key).is_some() {
            self.order.retain(|k| *k != key);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &RawValue)> {
        self.order.iter().map(move |k| (*k, self.entries.get(k).unwrap()))
    }

    /// Appends a raw octet value to a plain (non-TLV) attribute, creating it
    /// if absent. Mirrors `Packet.add_attribute`'s `setdefault(...).extend(...)`.
    pub fn push_plain(&mut self, key: Key, value: Vec<u8>) {
        match self.entries.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut e) => match e.get_mut() {
                RawValue::Plain(v) => v.push(value),
                RawValue::Tlv(_) => {
                    *e.get_mut() = RawValue::Plain(vec![value]);
                }
            },
            std::collections::hash_map::Entry::Vacant(e) => {
                self.order.push(key);
                e.insert(RawValue::Plain(vec![value]));
            }
        }
    }

    /// Appends a sub-attribute octet value under a TLV parent key.
    pub fn push_tlv(&mut self, key: Key, sub_code: u8, value: Vec<u8>) {
        let entry = self.entries.entry(key).or_insert_with(|| RawValue::Tlv(Vec::new()));
        if !self.order.contains(&key) {
            self.order.push(key);
        }
        if let RawValue::Tlv(subs) = entry {
            if let Some((_, v)) = subs.iter_mut().find(|(c, _)| *c == sub_code) {
                v.push(value);
            } else {
                subs.push((sub_code, vec![value]));
            }
        } else {
            *entry = RawValue::Tlv(vec![(sub_code, vec![value])]);
        }
    }

    pub fn set_plain(&mut self, key: Key, values: Vec<Vec<u8>>) {
        if !self.entries.contains_key(&key) {
            self.order.push(key);
        }
        self.entries.insert(key, RawValue::Plain(values));
    }
}

/// Decoded attribute value, typed by the dictionary entry that produced it.
/// Generalizes the teacher's `Attribute` enum (which carried a redundant
/// name inside each variant) to a value-only shape since the key already
/// carries the name via the dictionary lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Bytes(Vec<u8>),
    Int(u32),
    SignedInt(i32),
    Int64(u64),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Ipv6Prefix(Ipv6Addr, u8),
    Abinary(Vec<u8>),
}

impl AttrValue {
    fn encode(&self, ty: codec::AttributeType) -> Result<Vec<u8>, EncodingError> {
        use codec::AttributeType as T;
        match (ty, self) {
            (T::String, AttrValue::Text(s)) => codec::encode_string(s),
            (T::Octets, AttrValue::Bytes(b)) => codec::encode_octets(b),
            (T::Integer, AttrValue::Int(v)) => Ok(codec::encode_integer(*v)),
            (T::Signed, AttrValue::SignedInt(v)) => Ok(codec::encode_signed(*v)),
            (T::Short, AttrValue::Int(v)) => Ok(codec::encode_short(*v as u16)),
            (T::Byte, AttrValue::Int(v)) => Ok(codec::encode_byte(*v as u8)),
            (T::Integer64, AttrValue::Int64(v)) => Ok(codec::encode_integer64(*v)),
            (T::Date, AttrValue::Int(v)) => Ok(codec::encode_date(*v)),
            (T::IpAddr, AttrValue::Ipv4(a)) => Ok(codec::encode_ipv4_address(*a)),
            (T::Ipv6Addr, AttrValue::Ipv6(a)) => Ok(codec::encode_ipv6_address(*a)),
            (T::Ipv6Prefix, AttrValue::Ipv6Prefix(a, len)) => Ok(codec::encode_ipv6_prefix(*a, *len)),
            (T::Abinary, AttrValue::Abinary(raw)) => Ok(raw.clone()),
            _ => Err(EncodingError::TypeMismatch(ty.name().to_string())),
        }
    }

    fn decode(ty: codec::AttributeType, raw: &[u8]) -> Result<Self, EncodingError> {
        use codec::AttributeType as T;
        Ok(match ty {
            T::String => AttrValue::Text(codec::decode_string(raw)),
            T::Octets => AttrValue::Bytes(codec::decode_octets(raw)),
            T::Integer | T::Date => AttrValue::Int(codec::decode_integer(raw)?),
            T::Signed => AttrValue::SignedInt(codec::decode_signed(raw)?),
            T::Short => AttrValue::Int(codec::decode_short(raw)? as u32),
            T::Byte => AttrValue::Int(codec::decode_byte(raw)? as u32),
            T::Integer64 => AttrValue::Int64(codec::decode_integer64(raw)?),
            T::IpAddr => AttrValue::Ipv4(codec::decode_ipv4_address(raw)?),
            T::Ipv6Addr => AttrValue::Ipv6(codec::decode_ipv6_address(raw)?),
            T::Ipv6Prefix => {
                let (addr, len) = codec::decode_ipv6_prefix(raw)?;
                AttrValue::Ipv6Prefix(addr, len)
            }
            T::Abinary => AttrValue::Abinary(codec::decode_ascend_binary(raw)),
            T::Tlv => return Err(EncodingError::TypeMismatch("tlv".into())),
        })
    }
}

const MESSAGE_AUTHENTICATOR_CODE: u8 = 80;
const VENDOR_SPECIFIC_CODE: u8 = 26;

/// A RADIUS packet: header fields plus an ordered attribute map.
///
/// `authenticator` is `None` until the first call that needs one (request
/// serialization fills it in; decode fills it from the wire). On a reply
/// packet built with [`Packet::reply`], `authenticator` holds the *request's*
/// authenticator, as RFC 2865 requires it survive into the Response-
/// Authenticator computation.
#[derive(Debug, Clone)]
pub struct Packet {
    pub code: PacketCode,
    pub id: Option<u8>,
    pub secret: Vec<u8>,
    pub authenticator: Option<[u8; 16]>,
    pub message_authenticator: bool,
    pub attributes: AttributeMap,
}

impl Packet {
    pub fn new(code: PacketCode, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            id: None,
            secret: secret.into(),
            authenticator: None,
            message_authenticator: false,
            attributes: AttributeMap::new(),
        }
    }

    /// Builds a reply packet inheriting id, authenticator, and secret from
    /// the request it answers, per `Packet.create_reply`.
    pub fn reply(&self, code: PacketCode) -> Self {
        Self {
            code,
            id: self.id,
            secret: self.secret.clone(),
            authenticator: self.authenticator,
            message_authenticator: false,
            attributes: AttributeMap::new(),
        }
    }

    fn key_for<'a>(dict: &'a Dictionary, name: &str) -> Result<(Key, &'a crate::dictionary::AttributeDef), EncodingError> {
        let attr = dict
            .lookup_attribute(name)
            .ok_or_else(|| EncodingError::UnknownAttribute(name.to_string()))?;
        let key = match attr.vendor {
            Some(v) => Key::Vendor(v, attr.code),
            None => Key::Standard(attr.code),
        };
        Ok((key, attr))
    }

    /// Sets (replacing any existing values) a named attribute.
    pub fn set(&mut self, dict: &Dictionary, name: &str, value: AttrValue) -> Result<(), EncodingError> {
        self.set_tagged(dict, name, None, value)
    }

    /// Sets a named attribute with an explicit RFC 2868 tag. `tag = None`
    /// encodes tag `0` for tagged attributes, matching
    /// `Packet._encode_key_values`'s `tag = '0' if tag == '' else tag`.
    pub fn set_tagged(
        &mut self,
        dict: &Dictionary,
        name: &str,
        tag: Option<u8>,
        value: AttrValue,
    ) -> Result<(), EncodingError> {
        let (key, attr) = Self::key_for(dict, name)?;
        let attr = attr.clone();
        let mut encoded = value.encode(attr.attr_type)?;

        // Encrypt before tagging: RFC 2868's Tag octet sits outside the
        // salt-encrypted blob (Tag, then Salt, then the encrypted String),
        // so tagging the ciphertext instead of the plaintext would shift
        // every offset a receiver expects.
        if attr.encrypt == 1 || attr.encrypt == 2 {
            self.ensure_authenticator();
        }
        if attr.encrypt == 1 {
            encoded = self.pw_crypt(&encoded);
        } else if attr.encrypt == 2 {
            encoded = self.salt_crypt(&encoded);
        }

        if attr.has_tag {
            let tag_byte = tag.unwrap_or(0);
            if attr.attr_type == codec::AttributeType::Integer {
                encoded = std::iter::once(tag_byte).chain(encoded.into_iter().skip(1)).collect();
            } else {
                encoded = std::iter::once(tag_byte).chain(encoded).collect();
            }
        }

        self.attributes.set_plain(key, vec![encoded]);
        Ok(())
    }

    pub fn add(&mut self, dict: &Dictionary, name: &str, value: AttrValue) -> Result<(), EncodingError> {
        let (key, attr) = Self::key_for(dict, name)?;
        let attr = attr.clone();
        let mut encoded = value.encode(attr.attr_type)?;
        if attr.encrypt == 1 || attr.encrypt == 2 {
            self.ensure_authenticator();
        }
        if attr.encrypt == 1 {
            encoded = self.pw_crypt(&encoded);
        } else if attr.encrypt == 2 {
            encoded = self.salt_crypt(&encoded);
        }
        self.attributes.push_plain(key, encoded);
        Ok(())
    }

    /// Generates and persists a real Request-Authenticator if one isn't set
    /// yet, so `pw_crypt`/`salt_crypt` never encrypt under a throwaway value
    /// that differs from the authenticator the packet is eventually sent
    /// with. Mirrors `pyrad.packet.Packet.PwCrypt`'s
    /// `if self.authenticator is None: self.authenticator = self.CreateAuthenticator()`.
    fn ensure_authenticator(&mut self) {
        if self.authenticator.is_none() {
            let mut auth = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut auth);
            self.authenticator = Some(auth);
        }
    }

    /// Decodes and returns every value stored under `name`, in insertion order.
    pub fn get(&self, dict: &Dictionary, name: &str) -> Result<Vec<AttrValue>, EncodingError> {
        let (key, attr) = Self::key_for(dict, name)?;
        let Some(RawValue::Plain(values)) = self.attributes.get(key) else {
            return Ok(Vec::new());
        };
        values
            .iter()
            .map(|raw| {
                let raw = if attr.encrypt == 1 {
                    self.pw_decrypt(raw)
                } else {
                    raw.clone()
                };
                let raw = if attr.has_tag && !raw.is_empty() { raw[1..].to_vec() } else { raw };
                AttrValue::decode(attr.attr_type, &raw)
            })
            .collect()
    }

    pub fn contains(&self, dict: &Dictionary, name: &str) -> bool {
        match Self::key_for(dict, name) {
            Ok((key, _)) => self.attributes.contains(key),
            Err(_) => false,
        }
    }

    pub fn delete(&mut self, dict: &Dictionary, name: &str) {
        if let Ok((key, _)) = Self::key_for(dict, name) {
            self.attributes.remove(key);
        }
    }

    pub fn raw_get(&self, key: Key) -> Option<&[Vec<u8>]> {
        match self.attributes.get(key) {
            Some(RawValue::Plain(v)) => Some(v),
            _ => None,
        }
    }

    pub fn raw_set(&mut self, key: Key, values: Vec<Vec<u8>>) {
        self.attributes.set_plain(key, values);
    }

    // ---- Authenticators -------------------------------------------------

    fn encode_header(code: PacketCode, id: u8, total_len: usize) -> [u8; 4] {
        let len = (total_len as u16).to_be_bytes();
        [code.as_u8(), id, len[0], len[1]]
    }

    fn encode_attributes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in self.attributes.iter() {
            match value {
                RawValue::Plain(values) => {
                    for v in values {
                        out.extend(Self::encode_attribute(key, v));
                    }
                }
                RawValue::Tlv(subs) => {
                    out.extend(Self::encode_tlv(key, subs));
                }
            }
        }
        out
    }

    fn encode_attribute(key: Key, value: &[u8]) -> Vec<u8> {
        match key {
            Key::Standard(code) => {
                let mut out = vec![code, (value.len() + 2) as u8];
                out.extend_from_slice(value);
                out
            }
            Key::Vendor(vendor, code) => {
                let mut inner = vec![code, (value.len() + 2) as u8];
                inner.extend_from_slice(value);
                let mut out = vec![VENDOR_SPECIFIC_CODE, (inner.len() + 6) as u8];
                out.extend_from_slice(&vendor.to_be_bytes());
                out.extend_from_slice(&inner);
                out
            }
        }
    }

    /// Packs sub-attributes greedily into as few parent AVPs as possible,
    /// splitting before 245 octets of packed sub-attribute value. Threshold
    /// and packing order are bug-compatible with `Packet._pkt_encode_tlv`.
    fn encode_tlv(key: Key, subs: &[(u8, Vec<Vec<u8>>)]) -> Vec<u8> {
        let parent_code = match key {
            Key::Standard(c) => c,
            Key::Vendor(_, c) => c,
        };
        let max_len = subs.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        let mut avps: Vec<Vec<u8>> = Vec::new();
        let mut current = Vec::new();
        for i in 0..max_len {
            let mut sub_encoding = Vec::new();
            for (code, values) in subs {
                if let Some(v) = values.get(i) {
                    sub_encoding.extend(Self::encode_attribute(Key::Standard(*code), v));
                }
            }
            if sub_encoding.len() + current.len() < 245 {
                current.extend(sub_encoding);
            } else {
                avps.push(std::mem::take(&mut current));
                current = sub_encoding;
            }
        }
        avps.push(current);

        let tlv_avps: Vec<Vec<u8>> = avps
            .into_iter()
            .map(|avp| {
                let mut out = vec![parent_code, (avp.len() + 2) as u8];
                out.extend_from_slice(&avp);
                out
            })
            .collect();

        if let Key::Vendor(vendor, _) = key {
            let mut out = Vec::new();
            for avp in tlv_avps {
                out.push(VENDOR_SPECIFIC_CODE);
                out.push((avp.len() + 6) as u8);
                out.extend_from_slice(&vendor.to_be_bytes());
                out.extend_from_slice(&avp);
            }
            out
        } else {
            tlv_avps.concat()
        }
    }

    /// Encodes this packet for transmission, filling in `id` and
    /// `authenticator` per RFC 2865/2866/5176 rules if they are unset, and
    /// refreshing the Message-Authenticator attribute if enabled.
    ///
    /// For reply codes (Access-Accept/Reject/Challenge, Accounting-Response,
    /// Disconnect/CoA-ACK/NAK), `self.authenticator` must already hold the
    /// request's authenticator (set by [`Packet::reply`]) — it is read but
    /// not overwritten, since the field's role on a reply object is to carry
    /// the *request's* authenticator into the Response-Authenticator hash.
    pub fn encode(&mut self) -> Result<Vec<u8>, EncodingError> {
        if self.id.is_none() {
            self.id = Some(rand::random());
        }
        let id = self.id.unwrap();

        if self.code.is_request() && !self.code.authenticator_input_is_zero() && self.authenticator.is_none() {
            let mut auth = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut auth);
            self.authenticator = Some(auth);
        }

        if self.message_authenticator {
            self.refresh_message_authenticator(id)?;
        }

        let attrs = self.encode_attributes();
        let header = Self::encode_header(self.code, id, 20 + attrs.len());

        let authenticator = if self.code.authenticator_input_is_zero() && self.code.is_request() {
            let hash = Self::md5_authenticator(&header, &[0u8; 16], &attrs, &self.secret);
            self.authenticator = Some(hash);
            hash
        } else if !self.code.is_request() {
            let request_auth = self
                .authenticator
                .ok_or_else(|| EncodingError::TypeMismatch("authenticator".into()))?;
            Self::md5_authenticator(&header, &request_auth, &attrs, &self.secret)
        } else {
            self.authenticator.unwrap()
        };

        let mut out = bytes::BytesMut::with_capacity(20 + attrs.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&authenticator);
        out.extend_from_slice(&attrs);
        Ok(out.to_vec())
    }

    fn md5_authenticator(header: &[u8; 4], input: &[u8; 16], attrs: &[u8], secret: &[u8]) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(header);
        hasher.update(input);
        hasher.update(attrs);
        hasher.update(secret);
        hasher.finalize().into()
    }

    /// Decodes a raw datagram. The frame header and attribute framing rules
    /// are per §4.3; `dict` resolves TLV/VSA sub-attribute structure.
    pub fn decode(raw: &[u8], dict: &Dictionary, secret: impl Into<Vec<u8>>) -> Result<Self, DecodeError> {
        if raw.len() < 20 {
            return Err(DecodeError::CorruptHeader);
        }
        let code = PacketCode::from_u8(raw[0]).ok_or(DecodeError::CorruptHeader)?;
        let id = raw[1];
        let declared_len = u16::from_be_bytes([raw[2], raw[3]]) as usize;
        if declared_len != raw.len() {
            return Err(DecodeError::LengthMismatch {
                declared: declared_len,
                actual: raw.len(),
            });
        }
        if declared_len > 4096 {
            return Err(DecodeError::PacketTooLong(declared_len));
        }
        let mut authenticator = [0u8; 16];
        authenticator.copy_from_slice(&raw[4..20]);

        let mut packet = Packet {
            code,
            id: Some(id),
            secret: secret.into(),
            authenticator: Some(authenticator),
            message_authenticator: false,
            attributes: AttributeMap::new(),
        };

        let mut rest = &raw[20..];
        while !rest.is_empty() {
            if rest.len() < 2 {
                return Err(DecodeError::CorruptHeader);
            }
            let attr_type = rest[0];
            let attr_len = rest[1];
            if attr_len < 2 {
                return Err(DecodeError::AttributeTooShort(attr_len));
            }
            let attr_len = attr_len as usize;
            if rest.len() < attr_len {
                return Err(DecodeError::CorruptHeader);
            }
            let value = &rest[2..attr_len];

            if attr_type == VENDOR_SPECIFIC_CODE {
                packet.decode_vendor_attribute(dict, value);
            } else if attr_type == MESSAGE_AUTHENTICATOR_CODE {
                packet.message_authenticator = true;
                packet.attributes.push_plain(Key::Standard(attr_type), value.to_vec());
            } else if dict
                .lookup_attribute_by_code(None, attr_type)
                .map(|a| a.attr_type == codec::AttributeType::Tlv)
                .unwrap_or(false)
            {
                packet.decode_tlv_attribute(Key::Standard(attr_type), value);
            } else {
                packet.attributes.push_plain(Key::Standard(attr_type), value.to_vec());
            }

            rest = &rest[attr_len..];
        }

        Ok(packet)
    }

    /// Parses a VSA container. Malformed/short VSAs (< 6 octets) are
    /// retained as an opaque attribute 26, matching
    /// `_pkt_decode_vendor_attribute`'s fallback.
    fn decode_vendor_attribute(&mut self, dict: &Dictionary, data: &[u8]) {
        if data.len() < 6 {
            self.attributes.push_plain(Key::Standard(VENDOR_SPECIFIC_CODE), data.to_vec());
            return;
        }
        let vendor = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let sub_type = data[4];
        let sub_len = data[5] as usize;
        if sub_len < 2 || data.len() < sub_len + 4 {
            self.attributes.push_plain(Key::Standard(VENDOR_SPECIFIC_CODE), data.to_vec());
            return;
        }

        let is_tlv = dict
            .lookup_attribute_by_code(Some(vendor), sub_type)
            .map(|a| a.attr_type == codec::AttributeType::Tlv)
            .unwrap_or(false);

        if is_tlv {
            self.decode_tlv_attribute(Key::Vendor(vendor, sub_type), &data[6..sub_len + 4]);
        } else {
            self.attributes
                .push_plain(Key::Vendor(vendor, sub_type), data[6..sub_len + 4].to_vec());
        }

        let mut offset = 4 + sub_len;
        while data.len() > offset + 1 {
            let atype = data[offset];
            let length = data[offset + 1] as usize;
            if length < 2 || data.len() < offset + length {
                self.attributes.push_plain(Key::Standard(VENDOR_SPECIFIC_CODE), data.to_vec());
                return;
            }
            self.attributes
                .push_plain(Key::Vendor(vendor, atype), data[offset + 2..offset + length].to_vec());
            offset += length;
        }
    }

    fn decode_tlv_attribute(&mut self, key: Key, data: &[u8]) {
        let mut loc = 0;
        while loc + 1 < data.len() {
            let atype = data[loc];
            let length = data[loc + 1] as usize;
            if length < 2 || loc + length > data.len() {
                break;
            }
            self.attributes.push_tlv(key, atype, data[loc + 2..loc + length].to_vec());
            loc += length;
        }
    }

    // ---- Message-Authenticator (RFC 3579) --------------------------------

    /// RFC 3579 §3.2's `AuthenticatorInput`: zero for accounting/CoA/
    /// disconnect, else the packet's own (Access-Request/Status-Server) or
    /// inherited (Access-Accept/Reject/Challenge) authenticator.
    fn message_authenticator_input(&self) -> Result<[u8; 16], EncodingError> {
        if self.code.authenticator_input_is_zero() {
            return Ok([0u8; 16]);
        }
        self.authenticator
            .ok_or_else(|| EncodingError::TypeMismatch("authenticator".into()))
    }

    fn refresh_message_authenticator(&mut self, id: u8) -> Result<(), EncodingError> {
        self.attributes
            .set_plain(Key::Standard(MESSAGE_AUTHENTICATOR_CODE), vec![vec![0u8; 16]]);
        let attrs = self.encode_attributes();
        let header = Self::encode_header(self.code, id, 20 + attrs.len());
        let input = self.message_authenticator_input()?;

        let mut mac = HmacMd5::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(&header);
        mac.update(&input);
        mac.update(&attrs);
        let digest = mac.finalize().into_bytes();

        self.attributes
            .set_plain(Key::Standard(MESSAGE_AUTHENTICATOR_CODE), vec![digest.to_vec()]);
        Ok(())
    }

    /// Verifies the decoded Message-Authenticator attribute, if present.
    pub fn verify_message_authenticator(&self) -> Result<(), VerificationError> {
        if !self.message_authenticator {
            return Err(VerificationError::MessageAuthenticatorAbsent);
        }
        let id = self.id.ok_or(VerificationError::MessageAuthenticatorAbsent)?;
        let Some(RawValue::Plain(values)) = self.attributes.get(Key::Standard(MESSAGE_AUTHENTICATOR_CODE)) else {
            return Err(VerificationError::MessageAuthenticatorAbsent);
        };
        let received = values.first().ok_or(VerificationError::MessageAuthenticatorAbsent)?;

        let mut zeroed = self.clone();
        zeroed
            .attributes
            .set_plain(Key::Standard(MESSAGE_AUTHENTICATOR_CODE), vec![vec![0u8; 16]]);
        let attrs = zeroed.encode_attributes();
        let header = Self::encode_header(self.code, id, 20 + attrs.len());
        let input = self
            .message_authenticator_input()
            .map_err(|_| VerificationError::MessageAuthenticatorAbsent)?;

        let mut mac = HmacMd5::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(&header);
        mac.update(&input);
        mac.update(&attrs);

        mac.verify_slice(received)
            .map_err(|_| VerificationError::MessageAuthenticator)
    }

    /// Client-side reply verification: recomputes the Response-Authenticator
    /// over the reply's own encoded attributes and compares it against the
    /// authenticator carried in `self` (set from the wire by [`Packet::decode`]).
    pub fn verify_reply(&self, request_id: u8, request_authenticator: [u8; 16]) -> Result<(), VerificationError> {
        let id = self.id.ok_or(VerificationError::IdMismatch {
            request_id,
            reply_id: 0,
        })?;
        if id != request_id {
            return Err(VerificationError::IdMismatch {
                request_id,
                reply_id: id,
            });
        }
        let attrs = self.encode_attributes();
        let header = Self::encode_header(self.code, id, 20 + attrs.len());
        let expected = Self::md5_authenticator(&header, &request_authenticator, &attrs, &self.secret);
        let actual = self.authenticator.ok_or(VerificationError::ResponseAuthenticator)?;
        if expected == actual {
            Ok(())
        } else {
            Err(VerificationError::ResponseAuthenticator)
        }
    }

    // ---- User-Password obfuscation (RFC 2865 §5.2) -----------------------

    /// Assumes `self.authenticator` is already set. [`Packet::set_tagged`]
    /// and [`Packet::add`] call [`Packet::ensure_authenticator`] before
    /// reaching here for any `encrypt=1`/`2` attribute, so the ciphertext is
    /// always produced under the same authenticator the packet is
    /// eventually transmitted with — not a throwaway local default.
    fn pw_crypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let authenticator = self.authenticator.unwrap_or([0u8; 16]);
        let mut buf = plaintext.to_vec();
        let pad = (16 - buf.len() % 16) % 16;
        buf.extend(std::iter::repeat(0u8).take(pad));
        Self::pseudo_hash(&self.secret, &authenticator, &buf, true)
    }

    fn pw_decrypt(&self, ciphertext: &[u8]) -> Vec<u8> {
        let authenticator = self.authenticator.unwrap_or([0u8; 16]);
        let mut out = Self::pseudo_hash(&self.secret, &authenticator, ciphertext, false);
        while out.last() == Some(&0) {
            out.pop();
        }
        out
    }

    /// RFC 2865 §5.2's `c(i) = p(i) XOR MD5(secret + c(i-1))` chain, with
    /// `c(0)` the Request Authenticator. `c(i-1)` is the *previous
    /// ciphertext* block, not the plaintext one — encrypting chains on the
    /// block it just produced (`encrypting = true`), decrypting chains on
    /// the ciphertext block it just consumed (`buf` is already ciphertext
    /// there, so the just-read `chunk` doubles as that block).
    fn pseudo_hash(secret: &[u8], seed: &[u8; 16], buf: &[u8], encrypting: bool) -> Vec<u8> {
        let mut result = Vec::with_capacity(buf.len());
        let mut last = seed.to_vec();
        for chunk in buf.chunks(16) {
            let mut hasher = Md5::new();
            hasher.update(secret);
            hasher.update(&last);
            let hash = hasher.finalize();
            let mut out_chunk = Vec::with_capacity(chunk.len());
            for (b, h) in chunk.iter().zip(hash.iter()) {
                out_chunk.push(b ^ h);
            }
            last = if encrypting { out_chunk.clone() } else { chunk.to_vec() };
            result.extend(out_chunk);
        }
        result
    }

    /// Tunnel-Password-style salt encryption (`encrypt=2`).
    fn salt_crypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let authenticator = self.authenticator.unwrap_or([0u8; 16]);
        let salt = 0x8000u16 | (rand::random::<u16>() & 0x7fff);
        let mut result = salt.to_be_bytes().to_vec();

        let mut buf = vec![plaintext.len() as u8];
        buf.extend_from_slice(plaintext);
        let pad = (16 - buf.len() % 16) % 16;
        buf.extend(std::iter::repeat(0u8).take(pad));

        // Seed is authenticator || salt; each subsequent block is keyed by the
        // previous ciphertext block instead.
        let mut seed = authenticator.to_vec();
        seed.extend_from_slice(&salt.to_be_bytes());

        let mut prev = seed;
        for chunk in buf.chunks(16) {
            let mut hasher = Md5::new();
            hasher.update(&self.secret);
            hasher.update(&prev);
            let hash = hasher.finalize();
            let mut block = Vec::with_capacity(16);
            for (b, h) in chunk.iter().zip(hash.iter()) {
                block.push(b ^ h);
            }
            result.extend_from_slice(&block);
            prev = block;
        }
        result
    }

    // ---- CHAP (RFC 2865 §5.3) --------------------------------------------

    /// Verifies attribute 3 (CHAP-Password = `Id(1) || Response(16)`)
    /// against `password`, using CHAP-Challenge if present or else the
    /// Request-Authenticator as the challenge.
    pub fn verify_chap_password(&self, password: &[u8]) -> bool {
        let Some(RawValue::Plain(values)) = self.attributes.get(Key::Standard(3)) else {
            return false;
        };
        let Some(chap) = values.first() else { return false };
        if chap.len() != 17 {
            return false;
        }
        let chap_id = chap[0];
        let response = &chap[1..];

        let challenge: Vec<u8> = match self.attributes.get(Key::Standard(60)) {
            Some(RawValue::Plain(v)) => v.first().cloned().unwrap_or_default(),
            _ => self.authenticator.map(|a| a.to_vec()).unwrap_or_default(),
        };

        let mut hasher = Md5::new();
        hasher.update([chap_id]);
        hasher.update(password);
        hasher.update(&challenge);
        let expected = hasher.finalize();
        expected.as_slice() == response
    }

    // ---- Ascend filter rule convenience -----------------------------------

    pub fn set_abinary(&mut self, dict: &Dictionary, name: &str, rule: &AscendFilterRule) -> Result<(), EncodingError> {
        self.set(dict, name, AttrValue::Abinary(codec::encode_ascend_binary(rule)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> Dictionary {
        Dictionary::standard()
    }

    #[test]
    fn user_password_matches_rfc2865_example() {
        let mut pkt = Packet::new(PacketCode::AccessRequest, b"Kah3sohd".to_vec());
        pkt.authenticator = Some([0u8; 16]);
        let dict = dict();
        pkt.set(&dict, "User-Name", AttrValue::Text("wichert".into())).unwrap();
        pkt.set(&dict, "User-Password", AttrValue::Text("password".into())).unwrap();

        let RawValue::Plain(values) = pkt.attributes.get(Key::Standard(2)).unwrap() else {
            panic!("expected plain value");
        };
        let encoded = &values[0];

        let mut hasher = Md5::new();
        hasher.update(b"Kah3sohd");
        hasher.update([0u8; 16]);
        let expected_mask = hasher.finalize();
        let mut expected_block = b"password".to_vec();
        expected_block.extend_from_slice(&[0u8; 8]);
        let expected: Vec<u8> = expected_block.iter().zip(expected_mask.iter()).map(|(a, b)| a ^ b).collect();

        assert_eq!(encoded, &expected);
    }

    #[test]
    fn user_password_round_trips() {
        let mut pkt = Packet::new(PacketCode::AccessRequest, b"secret".to_vec());
        pkt.authenticator = Some([7u8; 16]);
        let dict = dict();
        pkt.set(&dict, "User-Password", AttrValue::Text("hunter2".into())).unwrap();
        let decoded = pkt.get(&dict, "User-Password").unwrap();
        assert_eq!(decoded, vec![AttrValue::Text("hunter2".into())]);
    }

    #[test]
    fn user_password_round_trips_across_multiple_blocks() {
        // Longer than one 16-octet block, so a correct round trip requires
        // each block to chain on the ciphertext it just produced rather
        // than the plaintext it consumed.
        let mut pkt = Packet::new(PacketCode::AccessRequest, b"secret".to_vec());
        pkt.authenticator = Some([9u8; 16]);
        let dict = dict();
        let password = "this-password-is-longer-than-sixteen-octets";
        pkt.set(&dict, "User-Password", AttrValue::Text(password.into())).unwrap();
        let decoded = pkt.get(&dict, "User-Password").unwrap();
        assert_eq!(decoded, vec![AttrValue::Text(password.into())]);
    }

    #[test]
    fn accounting_request_authenticator_matches_formula() {
        let dict = dict();
        let mut pkt = Packet::new(PacketCode::AccountingRequest, b"testing123".to_vec());
        pkt.set(&dict, "Acct-Status-Type", AttrValue::Int(1)).unwrap();
        let bytes = pkt.encode().unwrap();

        let attrs = &bytes[20..];
        let mut hasher = Md5::new();
        hasher.update(&bytes[0..4]);
        hasher.update([0u8; 16]);
        hasher.update(attrs);
        hasher.update(b"testing123");
        let expected: [u8; 16] = hasher.finalize().into();
        assert_eq!(&bytes[4..20], &expected);
        assert_eq!(pkt.authenticator, Some(expected));
    }

    #[test]
    fn decode_then_encode_preserves_attribute_order() {
        let dict = dict();
        let mut pkt = Packet::new(PacketCode::AccessRequest, b"secret".to_vec());
        pkt.authenticator = Some([1u8; 16]);
        pkt.set(&dict, "User-Name", AttrValue::Text("alice".into())).unwrap();
        pkt.add(&dict, "Reply-Message", AttrValue::Text("first".into())).unwrap();
        pkt.add(&dict, "Reply-Message", AttrValue::Text("second".into())).unwrap();
        let bytes = pkt.encode().unwrap();

        let decoded = Packet::decode(&bytes, &dict, b"secret".to_vec()).unwrap();
        let messages = decoded.get(&dict, "Reply-Message").unwrap();
        assert_eq!(
            messages,
            vec![AttrValue::Text("first".into()), AttrValue::Text("second".into())]
        );
    }

    #[test]
    fn short_vsa_is_retained_as_opaque_attribute_26() {
        let dict = dict();
        let raw = vec![VENDOR_SPECIFIC_CODE, 2 + 3, 1, 2, 3];
        let mut pkt = Packet {
            code: PacketCode::AccessRequest,
            id: Some(1),
            secret: b"s".to_vec(),
            authenticator: Some([0; 16]),
            message_authenticator: false,
            attributes: AttributeMap::new(),
        };
        pkt.decode_vendor_attribute(&dict, &raw[2..]);
        let RawValue::Plain(values) = pkt.attributes.get(Key::Standard(VENDOR_SPECIFIC_CODE)).unwrap() else {
            panic!("expected opaque plain fallback");
        };
        assert_eq!(values[0], vec![1, 2, 3]);
    }

    #[test]
    fn message_authenticator_verifies_after_round_trip() {
        let dict = dict();
        let mut pkt = Packet::new(PacketCode::AccessRequest, b"secret".to_vec());
        pkt.message_authenticator = true;
        pkt.set(&dict, "User-Name", AttrValue::Text("bob".into())).unwrap();
        let bytes = pkt.encode().unwrap();

        let decoded = Packet::decode(&bytes, &dict, b"secret".to_vec()).unwrap();
        assert!(decoded.verify_message_authenticator().is_ok());
    }

    #[test]
    fn chap_verification_matches_rfc_example() {
        let mut hasher = Md5::new();
        let req_auth = [9u8; 16];
        hasher.update([5u8]);
        hasher.update(b"secret");
        hasher.update(req_auth);
        let response = hasher.finalize();

        let mut chap_attr = vec![5u8];
        chap_attr.extend_from_slice(&response);

        let mut pkt = Packet::new(PacketCode::AccessRequest, b"shared".to_vec());
        pkt.authenticator = Some(req_auth);
        pkt.raw_set(Key::Standard(3), vec![chap_attr]);

        assert!(pkt.verify_chap_password(b"secret"));
        assert!(!pkt.verify_chap_password(b"wrong"));
    }

    #[test]
    fn reply_inherits_request_authenticator_and_id() {
        let dict = dict();
        let mut request = Packet::new(PacketCode::AccessRequest, b"secret".to_vec());
        request.id = Some(42);
        request.authenticator = Some([3u8; 16]);

        let mut reply = request.reply(PacketCode::AccessAccept);
        reply.set(&dict, "Reply-Message", AttrValue::Text("welcome".into())).unwrap();
        let bytes = reply.encode().unwrap();

        assert_eq!(bytes[1], 42);
        assert!(reply.verify_reply(42, [3u8; 16]).is_ok());
    }
}
