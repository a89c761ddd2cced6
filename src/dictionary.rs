//! Attribute/vendor/value name↔code tables with bidirectional lookup.
//!
//! The dictionary's *shape* is specified here; parsing the `ATTRIBUTE`/
//! `VALUE`/`VENDOR`/`BEGIN-VENDOR`/`END-VENDOR` text format used by real
//! deployments is left to a file loader outside this crate — the core only
//! contracts that whatever populates a [`Dictionary`] keeps the forward and
//! reverse indexes in agreement.

use std::collections::HashMap;

use crate::codec::AttributeType;

/// One attribute definition: numeric code, wire type, and the handful of
/// flags that change how [`crate::packet`] encodes values under it.
#[derive(Debug, Clone)]
pub struct AttributeDef {
    pub name: String,
    pub code: u8,
    pub vendor: Option<u32>,
    pub attr_type: AttributeType,
    pub has_tag: bool,
    /// 0 = none, 1 = RFC 2865 User-Password style, 2 = salt encryption.
    pub encrypt: u8,
    /// Present only when `attr_type == Tlv`: sub-code → definition.
    pub sub_attributes: HashMap<u8, AttributeDef>,
}

impl AttributeDef {
    fn new(name: &str, code: u8, attr_type: AttributeType) -> Self {
        Self {
            name: name.to_string(),
            code,
            vendor: None,
            attr_type,
            has_tag: false,
            encrypt: 0,
            sub_attributes: HashMap::new(),
        }
    }

    fn tagged(mut self) -> Self {
        self.has_tag = true;
        self
    }

    fn encrypted(mut self, mode: u8) -> Self {
        self.encrypt = mode;
        self
    }

    fn vendored(mut self, vendor: u32) -> Self {
        self.vendor = Some(vendor);
        self
    }
}

#[derive(Debug, Clone)]
pub struct VendorDef {
    pub name: String,
    pub code: u32,
}

/// Bidirectional attribute/vendor/value tables.
///
/// Construction is programmatic (`new` + `add_*`); [`Dictionary::standard`]
/// is a convenience seed of the RFC 2865/2866/2868 attributes exercised by
/// this crate's own tests and by consumers that don't need a custom
/// dictionary file.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    by_name: HashMap<String, AttributeDef>,
    by_code: HashMap<(Option<u32>, u8), String>,
    vendors_by_name: HashMap<String, VendorDef>,
    vendors_by_code: HashMap<u32, String>,
    /// (attribute name, value name) -> value int, and the reverse.
    values_forward: HashMap<(String, String), i64>,
    values_backward: HashMap<(String, i64), String>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics on a name or code collision rather than silently overwriting
    /// the earlier entry, so the forward and reverse indexes can never
    /// drift out of agreement with each other.
    pub fn add_vendor(&mut self, name: &str, code: u32) {
        assert!(
            !self.vendors_by_name.contains_key(name),
            "duplicate vendor name {name:?}"
        );
        assert!(
            !self.vendors_by_code.contains_key(&code),
            "duplicate vendor code {code}"
        );
        self.vendors_by_name.insert(
            name.to_string(),
            VendorDef {
                name: name.to_string(),
                code,
            },
        );
        self.vendors_by_code.insert(code, name.to_string());
    }

    /// Panics on a name or (vendor, code) collision; see [`Dictionary::add_vendor`].
    pub fn add_attribute(&mut self, attr: AttributeDef) {
        assert!(
            !self.by_name.contains_key(&attr.name),
            "duplicate attribute name {:?}",
            attr.name
        );
        assert!(
            !self.by_code.contains_key(&(attr.vendor, attr.code)),
            "duplicate attribute code {:?}/{}",
            attr.vendor,
            attr.code
        );
        self.by_code
            .insert((attr.vendor, attr.code), attr.name.clone());
        self.by_name.insert(attr.name.clone(), attr);
    }

    /// Panics on a (attribute, value-name) or (attribute, value) collision;
    /// see [`Dictionary::add_vendor`].
    pub fn add_value(&mut self, attr_name: &str, value_name: &str, value: i64) {
        let forward_key = (attr_name.to_string(), value_name.to_string());
        assert!(
            !self.values_forward.contains_key(&forward_key),
            "duplicate value name {value_name:?} for attribute {attr_name:?}"
        );
        let backward_key = (attr_name.to_string(), value);
        assert!(
            !self.values_backward.contains_key(&backward_key),
            "duplicate value {value} for attribute {attr_name:?}"
        );
        self.values_forward.insert(forward_key, value);
        self.values_backward.insert(backward_key, value_name.to_string());
    }

    pub fn lookup_attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.by_name.get(name)
    }

    pub fn lookup_attribute_by_code(&self, vendor: Option<u32>, code: u8) -> Option<&AttributeDef> {
        self.by_code
            .get(&(vendor, code))
            .and_then(|name| self.by_name.get(name))
    }

    pub fn lookup_vendor(&self, name: &str) -> Option<u32> {
        self.vendors_by_name.get(name).map(|v| v.code)
    }

    pub fn lookup_vendor_name(&self, code: u32) -> Option<&str> {
        self.vendors_by_code.get(&code).map(String::as_str)
    }

    pub fn lookup_value(&self, attr_name: &str, value_name: &str) -> Option<i64> {
        self.values_forward
            .get(&(attr_name.to_string(), value_name.to_string()))
            .copied()
    }

    pub fn lookup_value_name(&self, attr_name: &str, value: i64) -> Option<&str> {
        self.values_backward
            .get(&(attr_name.to_string(), value))
            .map(String::as_str)
    }

    /// Seeds the RFC 2865 (auth), RFC 2866 (accounting), and RFC 2868
    /// (tunnel, tagged) attributes this crate's tests and demos exercise.
    /// Grounded on `RadiusDictionary::default()`'s standard-attribute table,
    /// widened to cover `encrypt`/`has_tag`/type info that table dropped.
    pub fn standard() -> Self {
        let mut dict = Self::new();

        use AttributeType::*;
        let string_attrs: &[(&str, u8)] = &[
            ("User-Name", 1),
            ("Filter-Id", 11),
            ("Reply-Message", 18),
            ("Callback-Number", 19),
            ("Callback-Id", 20),
            ("Framed-Route", 22),
            ("Called-Station-Id", 30),
            ("Calling-Station-Id", 31),
            ("NAS-Identifier", 32),
            ("Proxy-State", 33),
            ("Login-LAT-Service", 34),
            ("Login-LAT-Node", 35),
            ("Connect-Info", 77),
            ("Acct-Session-Id", 44),
            ("Acct-Multi-Session-Id", 50),
        ];
        for (name, code) in string_attrs {
            dict.add_attribute(AttributeDef::new(name, *code, String));
        }

        dict.add_attribute(AttributeDef::new("User-Password", 2, String).encrypted(1));
        dict.add_attribute(AttributeDef::new("CHAP-Password", 3, Octets));
        dict.add_attribute(AttributeDef::new("CHAP-Challenge", 60, Octets));
        dict.add_attribute(AttributeDef::new("State", 24, Octets));
        dict.add_attribute(AttributeDef::new("Class", 25, Octets));
        dict.add_attribute(AttributeDef::new("Message-Authenticator", 80, Octets));
        dict.add_attribute(AttributeDef::new("EAP-Message", 79, Octets));
        dict.add_attribute(AttributeDef::new("Tunnel-Password", 69, String).encrypted(2).tagged());
        dict.add_attribute(AttributeDef::new("Tunnel-Type", 64, Integer).tagged());
        dict.add_attribute(AttributeDef::new("Tunnel-Medium-Type", 65, Integer).tagged());

        let integer_attrs: &[(&str, u8)] = &[
            ("NAS-Port", 5),
            ("Service-Type", 6),
            ("Framed-Protocol", 7),
            ("Framed-Routing", 10),
            ("Framed-MTU", 12),
            ("Framed-Compression", 13),
            ("Login-Service", 15),
            ("Login-TCP-Port", 16),
            ("Framed-IPX-Network", 23),
            ("Session-Timeout", 27),
            ("Idle-Timeout", 28),
            ("Termination-Action", 29),
            ("NAS-Port-Type", 61),
            ("Port-Limit", 62),
            ("Acct-Status-Type", 40),
            ("Acct-Delay-Time", 41),
            ("Acct-Input-Octets", 42),
            ("Acct-Output-Octets", 43),
            ("Acct-Authentic", 45),
            ("Acct-Session-Time", 46),
            ("Acct-Input-Packets", 47),
            ("Acct-Output-Packets", 48),
            ("Acct-Terminate-Cause", 49),
        ];
        for (name, code) in integer_attrs {
            dict.add_attribute(AttributeDef::new(name, *code, Integer));
        }

        dict.add_attribute(AttributeDef::new("NAS-IP-Address", 4, IpAddr));
        dict.add_attribute(AttributeDef::new("Framed-IP-Address", 8, IpAddr));
        dict.add_attribute(AttributeDef::new("Framed-IP-Netmask", 9, IpAddr));
        dict.add_attribute(AttributeDef::new("Login-IP-Host", 14, IpAddr));
        dict.add_attribute(AttributeDef::new("NAS-IPv6-Address", 95, Ipv6Addr));
        dict.add_attribute(AttributeDef::new("Framed-IPv6-Prefix", 97, Ipv6Prefix));

        dict.add_value("Service-Type", "Login-User", 1);
        dict.add_value("Service-Type", "Framed-User", 2);
        dict.add_value("Service-Type", "Callback-Login-User", 3);
        dict.add_value("Service-Type", "Administrative-User", 6);
        dict.add_value("Service-Type", "Authenticate-Only", 8);
        dict.add_value("Acct-Status-Type", "Start", 1);
        dict.add_value("Acct-Status-Type", "Stop", 2);
        dict.add_value("Acct-Status-Type", "Interim-Update", 3);
        dict.add_value("Tunnel-Type", "L2TP", 3);
        dict.add_value("Tunnel-Medium-Type", "IPv4", 1);

        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_and_reverse_agree() {
        let dict = Dictionary::standard();
        let attr = dict.lookup_attribute("User-Name").unwrap();
        assert_eq!(attr.code, 1);
        let looked_up = dict.lookup_attribute_by_code(None, 1).unwrap();
        assert_eq!(looked_up.name, "User-Name");
    }

    #[test]
    fn value_table_round_trips() {
        let dict = Dictionary::standard();
        assert_eq!(dict.lookup_value("Acct-Status-Type", "Start"), Some(1));
        assert_eq!(
            dict.lookup_value_name("Acct-Status-Type", 1),
            Some("Start")
        );
    }

    #[test]
    fn user_password_is_flagged_for_rfc2865_obfuscation() {
        let dict = Dictionary::standard();
        let attr = dict.lookup_attribute("User-Password").unwrap();
        assert_eq!(attr.encrypt, 1);
    }

    #[test]
    fn tunnel_password_is_tagged_and_salt_encrypted() {
        let dict = Dictionary::standard();
        let attr = dict.lookup_attribute("Tunnel-Password").unwrap();
        assert!(attr.has_tag);
        assert_eq!(attr.encrypt, 2);
    }

    #[test]
    #[should_panic(expected = "duplicate attribute name")]
    fn duplicate_attribute_name_panics_instead_of_overwriting() {
        let mut dict = Dictionary::new();
        dict.add_attribute(AttributeDef::new("Foo", 200, AttributeType::String));
        dict.add_attribute(AttributeDef::new("Foo", 201, AttributeType::String));
    }

    #[test]
    #[should_panic(expected = "duplicate attribute code")]
    fn duplicate_attribute_code_panics_instead_of_overwriting() {
        let mut dict = Dictionary::new();
        dict.add_attribute(AttributeDef::new("Foo", 200, AttributeType::String));
        dict.add_attribute(AttributeDef::new("Bar", 200, AttributeType::String));
    }

    #[test]
    #[should_panic(expected = "duplicate vendor code")]
    fn duplicate_vendor_code_panics_instead_of_overwriting() {
        let mut dict = Dictionary::new();
        dict.add_vendor("Acme", 9);
        dict.add_vendor("Zorp", 9);
    }
}
