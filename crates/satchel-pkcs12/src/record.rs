#![forbid(unsafe_code)]

//! Decoded keystore records: the flat, ordered view of a container.

use yasna::models::ObjectIdentifier;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::model::Attribute;

/// What a record's payload holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// DER X.509 certificate.
    Certificate,
    /// PKCS#8 PrivateKeyInfo.
    PrivateKey,
    /// PKCS#1 RSAPrivateKey.
    LegacyPrivateKey,
    /// SEC1 ECPrivateKey with named-curve parameters.
    EcPrivateKey,
    /// Secret bag contents.
    Secret,
    /// DER X.509 CRL.
    Crl,
    /// A bag type this library does not interpret; the payload is the raw
    /// DER bag value.
    Opaque(ObjectIdentifier),
}

impl RecordKind {
    /// PEM label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Certificate => "CERTIFICATE",
            Self::PrivateKey => "PRIVATE KEY",
            Self::LegacyPrivateKey => "RSA PRIVATE KEY",
            Self::EcPrivateKey => "EC PRIVATE KEY",
            Self::Secret => "SECRET BAG",
            Self::Crl => "X509 CRL",
            Self::Opaque(_) => "PKCS12 BAG",
        }
    }

    pub fn is_private_key(&self) -> bool {
        matches!(
            self,
            Self::PrivateKey | Self::LegacyPrivateKey | Self::EcPrivateKey
        )
    }
}

/// One keystore entry.
///
/// The payload is wiped on drop, since for keys and secrets it is the
/// plaintext key material.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Record {
    #[zeroize(skip)]
    pub kind: RecordKind,
    #[zeroize(skip)]
    pub attributes: Vec<Attribute>,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(kind: RecordKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            attributes: Vec::new(),
            payload,
        }
    }

    pub fn certificate(der: Vec<u8>) -> Self {
        Self::new(RecordKind::Certificate, der)
    }

    pub fn private_key(pkcs8: Vec<u8>) -> Self {
        Self::new(RecordKind::PrivateKey, pkcs8)
    }

    pub fn secret(value: Vec<u8>) -> Self {
        Self::new(RecordKind::Secret, value)
    }

    pub fn crl(der: Vec<u8>) -> Self {
        Self::new(RecordKind::Crl, der)
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_friendly_name(self, name: &str) -> Self {
        self.with_attribute(Attribute::FriendlyName(name.to_owned()))
    }

    pub fn with_local_key_id(self, key_id: &[u8]) -> Self {
        self.with_attribute(Attribute::LocalKeyId(key_id.to_vec()))
    }

    /// First friendlyName attribute, if any.
    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::FriendlyName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// First localKeyId attribute, if any.
    pub fn local_key_id(&self) -> Option<&[u8]> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::LocalKeyId(id) => Some(id.as_slice()),
            _ => None,
        })
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Record");
        s.field("kind", &self.kind).field("attributes", &self.attributes);
        if self.kind.is_private_key() || self.kind == RecordKind::Secret {
            s.field("payload", &format_args!("<{} bytes>", self.payload.len()));
        } else {
            s.field("payload_len", &self.payload.len());
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookups() {
        let rec = Record::private_key(vec![0x30, 0x00])
            .with_friendly_name("alias")
            .with_local_key_id(b"id-1");
        assert_eq!(rec.friendly_name(), Some("alias"));
        assert_eq!(rec.local_key_id(), Some(&b"id-1"[..]));
        assert!(rec.kind.is_private_key());
    }

    #[test]
    fn test_lookups_absent() {
        let rec = Record::certificate(vec![0x30, 0x00]);
        assert_eq!(rec.friendly_name(), None);
        assert_eq!(rec.local_key_id(), None);
        assert!(!rec.kind.is_private_key());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let rec = Record::secret(b"hunter2".to_vec());
        let shown = format!("{rec:?}");
        assert!(!shown.contains("104"), "payload bytes leaked: {shown}");
        assert!(shown.contains("<7 bytes>"));
    }

    #[test]
    fn test_labels() {
        assert_eq!(RecordKind::Certificate.label(), "CERTIFICATE");
        assert_eq!(RecordKind::LegacyPrivateKey.label(), "RSA PRIVATE KEY");
        assert_eq!(RecordKind::Crl.label(), "X509 CRL");
    }
}
