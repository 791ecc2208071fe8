#![forbid(unsafe_code)]

//! Structural model of PKCS#12 (RFC 7292) and its BER/DER mapping.
//!
//! Decoding uses `yasna::parse_ber` since PKCS#12 files in the wild are BER
//! (indefinite lengths, constructed OCTET STRINGs), not strict DER. Encoding
//! emits DER, except that attribute SETs keep the caller's order.
//!
//! These types carry no behaviour beyond the mapping: decryption, MAC
//! checking and bag interpretation live in `pbe`, `mac` and `bags`.

use satchel_core::{oid, Error};
use yasna::models::ObjectIdentifier;
use yasna::tags::{TAG_BMPSTRING, TAG_SET, TAG_UTF8STRING};
use yasna::{ASN1Error, ASN1ErrorKind, ASN1Result, BERReader, BERReaderSeq, DERWriter, Tag};

pub(crate) fn oid_of(arcs: &[u64]) -> ObjectIdentifier {
    ObjectIdentifier::from_slice(arcs)
}

pub(crate) fn is_oid(id: &ObjectIdentifier, arcs: &[u64]) -> bool {
    id.components().as_slice() == arcs
}

/// Consume any elements left in a SEQUENCE so later revisions of a
/// structure still decode.
fn skip_trailing(r: &mut BERReaderSeq) -> ASN1Result<()> {
    while r.read_optional(|r| r.read_der())?.is_some() {}
    Ok(())
}

fn invalid() -> ASN1Error {
    ASN1Error::new(ASN1ErrorKind::Invalid)
}

// ── AlgorithmIdentifier ──────────────────────────────────────────────

/// `AlgorithmIdentifier ::= SEQUENCE { algorithm OID, parameters ANY OPTIONAL }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmIdentifier {
    pub oid: ObjectIdentifier,
    /// Raw DER of the parameters, if present.
    pub parameters: Option<Vec<u8>>,
}

impl AlgorithmIdentifier {
    pub fn new(arcs: &[u64], parameters: Option<Vec<u8>>) -> Self {
        Self {
            oid: oid_of(arcs),
            parameters,
        }
    }

    pub(crate) fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let oid = r.next().read_oid()?;
            let parameters = r.read_optional(|r| r.read_der())?;
            skip_trailing(r)?;
            Ok(Self { oid, parameters })
        })
    }

    pub(crate) fn write(&self, w: DERWriter) {
        w.write_sequence(|w| {
            w.next().write_oid(&self.oid);
            if let Some(params) = &self.parameters {
                w.next().write_der(params);
            }
        })
    }
}

// ── PFX ──────────────────────────────────────────────────────────────

/// `PFX ::= SEQUENCE { version INTEGER, authSafe ContentInfo, macData MacData OPTIONAL }`
#[derive(Debug, Clone)]
pub struct Pfx {
    pub version: u64,
    pub auth_safe: ContentInfo,
    pub mac_data: Option<MacData>,
}

impl Pfx {
    pub const VERSION: u64 = 3;

    pub fn from_ber(data: &[u8]) -> Result<Self, Error> {
        yasna::parse_ber(data, |r| {
            r.read_sequence(|r| {
                let version = r.next().read_u64()?;
                let auth_safe = ContentInfo::read(r.next())?;
                let mac_data = r.read_optional(MacData::read)?;
                skip_trailing(r)?;
                Ok(Self {
                    version,
                    auth_safe,
                    mac_data,
                })
            })
        })
        .map_err(|e| Error::structural("PFX", e))
    }

    pub fn to_der(&self) -> Vec<u8> {
        yasna::construct_der(|w| {
            w.write_sequence(|w| {
                w.next().write_u64(self.version);
                self.auth_safe.write(w.next());
                if let Some(mac) = &self.mac_data {
                    mac.write(w.next());
                }
            })
        })
    }
}

// ── MacData ──────────────────────────────────────────────────────────

/// `MacData ::= SEQUENCE { mac DigestInfo, macSalt OCTET STRING, iterations INTEGER DEFAULT 1 }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacData {
    pub digest_algorithm: AlgorithmIdentifier,
    pub digest: Vec<u8>,
    pub salt: Vec<u8>,
    pub iterations: u64,
}

impl MacData {
    pub(crate) fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let (digest_algorithm, digest) = r.next().read_sequence(|r| {
                let alg = AlgorithmIdentifier::read(r.next())?;
                let digest = r.next().read_bytes()?;
                Ok((alg, digest))
            })?;
            let salt = r.next().read_bytes()?;
            let iterations = r.read_optional(|r| r.read_u64())?.unwrap_or(1);
            skip_trailing(r)?;
            Ok(Self {
                digest_algorithm,
                digest,
                salt,
                iterations,
            })
        })
    }

    pub(crate) fn write(&self, w: DERWriter) {
        w.write_sequence(|w| {
            w.next().write_sequence(|w| {
                self.digest_algorithm.write(w.next());
                w.next().write_bytes(&self.digest);
            });
            w.next().write_bytes(&self.salt);
            // DEFAULT 1 is omitted in DER
            if self.iterations != 1 {
                w.next().write_u64(self.iterations);
            }
        })
    }
}

// ── ContentInfo ──────────────────────────────────────────────────────

/// One block of the authenticated safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentInfo {
    /// `id-data`: the OCTET STRING payload.
    Data(Vec<u8>),
    /// `id-encryptedData`: password-encrypted SafeContents.
    EncryptedData(EncryptedContent),
    /// Any other content type (e.g. public-key integrity `signedData`),
    /// kept with the raw DER of its `[0]` element.
    Other {
        content_type: ObjectIdentifier,
        content: Option<Vec<u8>>,
    },
}

/// `EncryptedContentInfo` of an `EncryptedData` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContent {
    pub algorithm: AlgorithmIdentifier,
    pub ciphertext: Vec<u8>,
}

impl ContentInfo {
    pub(crate) fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let content_type = r.next().read_oid()?;

            let info = if is_oid(&content_type, oid::DATA) {
                // [0] EXPLICIT OCTET STRING
                let data = r.next().read_tagged(Tag::context(0), |r| r.read_bytes())?;
                ContentInfo::Data(data)
            } else if is_oid(&content_type, oid::ENCRYPTED_DATA) {
                // [0] EXPLICIT EncryptedData
                r.next().read_tagged(Tag::context(0), |r| {
                    r.read_sequence(|r| {
                        let _version = r.next().read_u64()?;
                        let content = r.next().read_sequence(|r| {
                            let _content_type = r.next().read_oid()?;
                            let algorithm = AlgorithmIdentifier::read(r.next())?;
                            // [0] IMPLICIT OCTET STRING, optional in CMS but
                            // required to mean anything here
                            let ciphertext = r
                                .read_optional(|r| {
                                    r.read_tagged_implicit(Tag::context(0), |r| r.read_bytes())
                                })?
                                .ok_or_else(invalid)?;
                            skip_trailing(r)?;
                            Ok(EncryptedContent {
                                algorithm,
                                ciphertext,
                            })
                        })?;
                        // unprotectedAttrs [1] IMPLICIT
                        skip_trailing(r)?;
                        Ok(ContentInfo::EncryptedData(content))
                    })
                })?
            } else {
                let content = r.read_optional(|r| r.read_der())?;
                ContentInfo::Other {
                    content_type,
                    content,
                }
            };

            skip_trailing(r)?;
            Ok(info)
        })
    }

    pub(crate) fn write(&self, w: DERWriter) {
        w.write_sequence(|w| match self {
            ContentInfo::Data(data) => {
                w.next().write_oid(&oid_of(oid::DATA));
                w.next()
                    .write_tagged(Tag::context(0), |w| w.write_bytes(data));
            }
            ContentInfo::EncryptedData(content) => {
                w.next().write_oid(&oid_of(oid::ENCRYPTED_DATA));
                w.next().write_tagged(Tag::context(0), |w| {
                    w.write_sequence(|w| {
                        w.next().write_u64(0);
                        w.next().write_sequence(|w| {
                            w.next().write_oid(&oid_of(oid::DATA));
                            content.algorithm.write(w.next());
                            w.next().write_tagged_implicit(Tag::context(0), |w| {
                                w.write_bytes(&content.ciphertext)
                            });
                        });
                    })
                });
            }
            ContentInfo::Other {
                content_type,
                content,
            } => {
                w.next().write_oid(content_type);
                if let Some(content) = content {
                    w.next().write_der(content);
                }
            }
        })
    }
}

/// `AuthenticatedSafe ::= SEQUENCE OF ContentInfo`
pub fn parse_authenticated_safe(data: &[u8]) -> Result<Vec<ContentInfo>, Error> {
    yasna::parse_ber(data, |r| r.collect_sequence_of(ContentInfo::read))
        .map_err(|e| Error::structural("authenticated safe", e))
}

pub fn write_authenticated_safe(blocks: &[ContentInfo]) -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            for block in blocks {
                block.write(w.next());
            }
        })
    })
}

// ── SafeContents / SafeBag ───────────────────────────────────────────

/// `SafeBag ::= SEQUENCE { bagId OID, bagValue [0] EXPLICIT ANY, bagAttributes SET OF PKCS12Attribute OPTIONAL }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeBag {
    pub bag_id: ObjectIdentifier,
    /// Raw DER of the bag value, interpreted by the bag codec.
    pub value: Vec<u8>,
    pub attributes: Vec<Attribute>,
}

impl SafeBag {
    pub(crate) fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let bag_id = r.next().read_oid()?;
            let value = r.next().read_tagged(Tag::context(0), |r| r.read_der())?;
            let attributes = r.read_optional(read_attributes)?.unwrap_or_default();
            skip_trailing(r)?;
            Ok(Self {
                bag_id,
                value,
                attributes,
            })
        })
    }

    pub(crate) fn write(&self, w: DERWriter) {
        w.write_sequence(|w| {
            w.next().write_oid(&self.bag_id);
            w.next()
                .write_tagged(Tag::context(0), |w| w.write_der(&self.value));
            if !self.attributes.is_empty() {
                write_ordered_set(w.next(), |w| {
                    for attr in &self.attributes {
                        attr.write(w.next());
                    }
                });
            }
        })
    }
}

/// `SafeContents ::= SEQUENCE OF SafeBag`
pub fn parse_safe_contents(data: &[u8]) -> Result<Vec<SafeBag>, Error> {
    yasna::parse_ber(data, |r| r.collect_sequence_of(SafeBag::read))
        .map_err(|e| Error::structural("SafeContents", e))
}

pub fn write_safe_contents(bags: &[SafeBag]) -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            for bag in bags {
                bag.write(w.next());
            }
        })
    })
}

/// Write a SET whose elements keep their given order.
fn write_ordered_set<F>(w: DERWriter, callback: F)
where
    F: FnOnce(&mut yasna::DERWriterSeq),
{
    w.write_tagged_implicit(TAG_SET, |w| w.write_sequence(callback))
}

// ── Attributes ───────────────────────────────────────────────────────

/// A bag attribute (`PKCS12Attribute ::= SEQUENCE { attrId OID, attrValues SET OF ANY }`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// PKCS#9 friendlyName, a BMPString.
    FriendlyName(String),
    /// PKCS#9 localKeyId, correlating a certificate with its private key.
    LocalKeyId(Vec<u8>),
    /// Any other attribute, preserved as raw DER values.
    Other {
        oid: ObjectIdentifier,
        values: Vec<Vec<u8>>,
    },
}

impl Attribute {
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            Self::FriendlyName(_) => oid_of(oid::FRIENDLY_NAME),
            Self::LocalKeyId(_) => oid_of(oid::LOCAL_KEY_ID),
            Self::Other { oid, .. } => oid.clone(),
        }
    }

    /// Interpret raw attribute values. Anything that does not fit the
    /// well-known shapes is kept verbatim as `Other`.
    fn from_raw(id: ObjectIdentifier, values: Vec<Vec<u8>>) -> Self {
        if values.len() == 1 {
            if is_oid(&id, oid::FRIENDLY_NAME) {
                if let Ok(name) = yasna::parse_ber(&values[0], read_directory_string) {
                    return Self::FriendlyName(name);
                }
            } else if is_oid(&id, oid::LOCAL_KEY_ID) {
                if let Ok(key_id) = yasna::parse_ber(&values[0], |r| r.read_bytes()) {
                    return Self::LocalKeyId(key_id);
                }
            }
        }
        Self::Other { oid: id, values }
    }

    fn write(&self, w: DERWriter) {
        w.write_sequence(|w| {
            w.next().write_oid(&self.oid());
            match self {
                Self::FriendlyName(name) => {
                    let bmp = string_to_bmp(name);
                    w.next().write_set_of(|w| {
                        w.next()
                            .write_tagged_implicit(TAG_BMPSTRING, |w| w.write_bytes(&bmp))
                    });
                }
                Self::LocalKeyId(key_id) => {
                    w.next().write_set_of(|w| w.next().write_bytes(key_id));
                }
                Self::Other { values, .. } => {
                    write_ordered_set(w.next(), |w| {
                        for value in values {
                            w.next().write_der(value);
                        }
                    });
                }
            }
        })
    }
}

fn read_attributes(r: BERReader) -> ASN1Result<Vec<Attribute>> {
    let mut attributes = Vec::new();
    r.read_set_of(|r| {
        attributes.push(r.read_sequence(|r| {
            let id = r.next().read_oid()?;
            let mut values = Vec::new();
            r.next().read_set_of(|r| {
                values.push(r.read_der()?);
                Ok(())
            })?;
            Ok(Attribute::from_raw(id, values))
        })?);
        Ok(())
    })?;
    Ok(attributes)
}

/// Friendly names are BMPStrings; a few producers use UTF8String instead.
fn read_directory_string(r: BERReader) -> ASN1Result<String> {
    let tag = r.lookahead_tag()?;
    if tag == TAG_BMPSTRING {
        let bytes = r.read_tagged_implicit(TAG_BMPSTRING, |r| r.read_bytes())?;
        bmp_to_string(&bytes).ok_or_else(invalid)
    } else if tag == TAG_UTF8STRING {
        r.read_utf8string()
    } else {
        Err(invalid())
    }
}

fn string_to_bmp(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|c| c.to_be_bytes()).collect()
}

/// Decode UTF-16BE, dropping one trailing NUL if the producer added one.
fn bmp_to_string(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    if units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16(&units).ok()
}

// ── EncryptedPrivateKeyInfo / PBE parameters ─────────────────────────

/// `EncryptedPrivateKeyInfo ::= SEQUENCE { encryptionAlgorithm AlgorithmIdentifier, encryptedData OCTET STRING }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPrivateKeyInfo {
    pub algorithm: AlgorithmIdentifier,
    pub ciphertext: Vec<u8>,
}

impl EncryptedPrivateKeyInfo {
    pub fn from_ber(data: &[u8]) -> Result<Self, Error> {
        yasna::parse_ber(data, |r| {
            r.read_sequence(|r| {
                let algorithm = AlgorithmIdentifier::read(r.next())?;
                let ciphertext = r.next().read_bytes()?;
                skip_trailing(r)?;
                Ok(Self {
                    algorithm,
                    ciphertext,
                })
            })
        })
        .map_err(|e| Error::structural("EncryptedPrivateKeyInfo", e))
    }

    pub fn to_der(&self) -> Vec<u8> {
        yasna::construct_der(|w| {
            w.write_sequence(|w| {
                self.algorithm.write(w.next());
                w.next().write_bytes(&self.ciphertext);
            })
        })
    }
}

/// `pkcs-12PbeParams ::= SEQUENCE { salt OCTET STRING, iterations INTEGER }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbeParams {
    pub salt: Vec<u8>,
    pub iterations: u64,
}

impl PbeParams {
    pub fn from_ber(data: &[u8]) -> Result<Self, Error> {
        yasna::parse_ber(data, |r| {
            r.read_sequence(|r| {
                let salt = r.next().read_bytes()?;
                let iterations = r.next().read_u64()?;
                skip_trailing(r)?;
                Ok(Self { salt, iterations })
            })
        })
        .map_err(|e| Error::structural("PBE parameters", e))
    }

    pub fn to_der(&self) -> Vec<u8> {
        yasna::construct_der(|w| {
            w.write_sequence(|w| {
                w.next().write_bytes(&self.salt);
                w.next().write_u64(self.iterations);
            })
        })
    }
}
