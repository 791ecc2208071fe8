#![forbid(unsafe_code)]

//! PKCS#8 inspection and conversion to and from the traditional
//! RSA (PKCS#1) and EC (SEC1) private key encodings.

use satchel_core::{oid, Error};
use yasna::{ASN1Result, BERReader, Tag};
use zeroize::Zeroizing;

use crate::context::KeyFormat;
use crate::model::{is_oid, AlgorithmIdentifier};
use crate::record::RecordKind;

/// The parts of a PKCS#8 `PrivateKeyInfo` this crate looks at.
///
/// ```text
/// PrivateKeyInfo ::= SEQUENCE {
///     version             INTEGER,
///     privateKeyAlgorithm AlgorithmIdentifier,
///     privateKey          OCTET STRING,
///     attributes          [0] IMPLICIT Attributes OPTIONAL,
///     publicKey           [1] IMPLICIT BIT STRING OPTIONAL }
/// ```
pub struct PrivateKeyInfo {
    pub algorithm: AlgorithmIdentifier,
    pub private_key: Zeroizing<Vec<u8>>,
}

impl PrivateKeyInfo {
    pub fn from_der(data: &[u8]) -> Result<Self, Error> {
        yasna::parse_ber(data, |r| {
            r.read_sequence(|r| {
                let _version = r.next().read_u64()?;
                let algorithm = AlgorithmIdentifier::read(r.next())?;
                let private_key = Zeroizing::new(r.next().read_bytes()?);
                while r.read_optional(|r| r.read_der())?.is_some() {}
                Ok(Self {
                    algorithm,
                    private_key,
                })
            })
        })
        .map_err(|e| Error::structural("PrivateKeyInfo", e))
    }

    fn to_der(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(yasna::construct_der(|w| {
            w.write_sequence(|w| {
                w.next().write_u64(0);
                self.algorithm.write(w.next());
                w.next().write_bytes(&self.private_key);
            })
        }))
    }
}

/// Produce the record for a decrypted or plain PKCS#8 key.
pub(crate) fn key_record(pkcs8: &[u8], format: KeyFormat) -> Result<(RecordKind, Vec<u8>), Error> {
    let info = PrivateKeyInfo::from_der(pkcs8)?;
    if format == KeyFormat::Pkcs8 {
        return Ok((RecordKind::PrivateKey, pkcs8.to_vec()));
    }

    if is_oid(&info.algorithm.oid, oid::RSA_ENCRYPTION) {
        Ok((RecordKind::LegacyPrivateKey, info.private_key.to_vec()))
    } else if is_oid(&info.algorithm.oid, oid::EC_PUBLIC_KEY) {
        let curve = info.algorithm.parameters.as_deref().ok_or_else(|| {
            Error::structural("PrivateKeyInfo", "EC key without curve parameters")
        })?;
        Ok((RecordKind::EcPrivateKey, sec1_with_curve(&info.private_key, curve)?))
    } else {
        // No traditional form for other algorithms
        Ok((RecordKind::PrivateKey, pkcs8.to_vec()))
    }
}

/// Wrap a key record's payload back into PKCS#8 for storage.
pub(crate) fn to_pkcs8(kind: &RecordKind, payload: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
    match kind {
        RecordKind::PrivateKey => {
            PrivateKeyInfo::from_der(payload)
                .map_err(|e| Error::Encoding(format!("private key is not PKCS#8: {e}")))?;
            Ok(Zeroizing::new(payload.to_vec()))
        }
        RecordKind::LegacyPrivateKey => {
            let info = PrivateKeyInfo {
                algorithm: AlgorithmIdentifier::new(oid::RSA_ENCRYPTION, Some(vec![0x05, 0x00])),
                private_key: Zeroizing::new(payload.to_vec()),
            };
            Ok(info.to_der())
        }
        RecordKind::EcPrivateKey => {
            let sec1 = Sec1Key::from_der(payload)
                .map_err(|e| Error::Encoding(format!("EC private key is not SEC1: {e}")))?;
            let curve = sec1.curve.ok_or_else(|| {
                Error::Encoding("EC private key has no named-curve parameters".into())
            })?;
            let info = PrivateKeyInfo {
                algorithm: AlgorithmIdentifier::new(oid::EC_PUBLIC_KEY, Some(curve)),
                private_key: Zeroizing::new(payload.to_vec()),
            };
            Ok(info.to_der())
        }
        other => Err(Error::Encoding(format!("{other:?} is not a private key"))),
    }
}

/// Key octets of a PrivateKeyInfo, as Java stores secret keys.
pub(crate) fn key_octets(pkcs8: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
    Ok(PrivateKeyInfo::from_der(pkcs8)?.private_key)
}

// ── SEC1 ─────────────────────────────────────────────────────────────

/// ```text
/// ECPrivateKey ::= SEQUENCE {
///     version        INTEGER { ecPrivkeyVer1(1) },
///     privateKey     OCTET STRING,
///     parameters [0] ECParameters OPTIONAL,
///     publicKey  [1] BIT STRING OPTIONAL }
/// ```
struct Sec1Key {
    version: u64,
    private_key: Zeroizing<Vec<u8>>,
    curve: Option<Vec<u8>>,
    /// Raw DER of the `[1]` element.
    public_key: Option<Vec<u8>>,
}

impl Sec1Key {
    fn from_der(data: &[u8]) -> Result<Self, Error> {
        yasna::parse_ber(data, |r| {
            r.read_sequence(|r| {
                let version = r.next().read_u64()?;
                let private_key = Zeroizing::new(r.next().read_bytes()?);
                let curve = r.read_optional(|r| r.read_tagged(Tag::context(0), read_raw))?;
                let public_key = r.read_optional(|r| r.read_der())?;
                Ok(Self {
                    version,
                    private_key,
                    curve,
                    public_key,
                })
            })
        })
        .map_err(|e| Error::structural("ECPrivateKey", e))
    }

    fn to_der(&self) -> Vec<u8> {
        yasna::construct_der(|w| {
            w.write_sequence(|w| {
                w.next().write_u64(self.version);
                w.next().write_bytes(&self.private_key);
                if let Some(curve) = &self.curve {
                    w.next().write_tagged(Tag::context(0), |w| w.write_der(curve));
                }
                if let Some(public_key) = &self.public_key {
                    w.next().write_der(public_key);
                }
            })
        })
    }
}

fn read_raw(r: BERReader) -> ASN1Result<Vec<u8>> {
    r.read_der()
}

/// SEC1 key with the named curve filled in from the PKCS#8 algorithm
/// parameters when the inner structure omits it.
fn sec1_with_curve(sec1: &[u8], curve: &[u8]) -> Result<Vec<u8>, Error> {
    let mut key = Sec1Key::from_der(sec1)?;
    if key.curve.is_some() {
        return Ok(sec1.to_vec());
    }
    key.curve = Some(curve.to_vec());
    Ok(key.to_der())
}
