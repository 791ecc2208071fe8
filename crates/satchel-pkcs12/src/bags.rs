#![forbid(unsafe_code)]

//! Per-bag-type decode and encode, dispatched through a static table.

use satchel_core::{oid, Error};
use yasna::models::ObjectIdentifier;
use yasna::Tag;
use zeroize::Zeroizing;

use crate::context::{DecodeContext, EncodeContext};
use crate::kdf::Password;
use crate::keyformat;
use crate::model::{self, is_oid, oid_of, Attribute, EncryptedPrivateKeyInfo, SafeBag};
use crate::pbe::{self, PbeAlgorithm};
use crate::record::{Record, RecordKind};

/// Nesting limit for safeContentsBag inside safeContentsBag.
pub(crate) const MAX_NESTING: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BagKind {
    Key,
    ShroudedKey,
    Cert,
    Crl,
    Secret,
    SafeContents,
}

static BAG_TABLE: &[(&[u64], BagKind)] = &[
    (oid::KEY_BAG, BagKind::Key),
    (oid::PKCS8_SHROUDED_KEY_BAG, BagKind::ShroudedKey),
    (oid::CERT_BAG, BagKind::Cert),
    (oid::CRL_BAG, BagKind::Crl),
    (oid::SECRET_BAG, BagKind::Secret),
    (oid::SAFE_CONTENTS_BAG, BagKind::SafeContents),
];

fn bag_kind(id: &ObjectIdentifier) -> Option<BagKind> {
    BAG_TABLE
        .iter()
        .find(|(arcs, _)| is_oid(id, arcs))
        .map(|(_, kind)| *kind)
}

// ── Typed bag values ─────────────────────────────────────────────────

/// `CertBag`, `CRLBag` and `SecretBag` share one shape:
/// `SEQUENCE { typeId OID, value [0] EXPLICIT ANY }`.
fn read_typed_value(layer: &'static str, data: &[u8]) -> Result<(ObjectIdentifier, Vec<u8>), Error> {
    yasna::parse_ber(data, |r| {
        r.read_sequence(|r| {
            let type_id = r.next().read_oid()?;
            let value = r.next().read_tagged(Tag::context(0), |r| r.read_der())?;
            while r.read_optional(|r| r.read_der())?.is_some() {}
            Ok((type_id, value))
        })
    })
    .map_err(|e| Error::structural(layer, e))
}

fn write_typed_value(type_arcs: &[u64], value_der: &[u8]) -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_oid(&oid_of(type_arcs));
            w.next()
                .write_tagged(Tag::context(0), |w| w.write_der(value_der));
        })
    })
}

fn read_octets(layer: &'static str, der: &[u8]) -> Result<Vec<u8>, Error> {
    yasna::parse_ber(der, |r| r.read_bytes()).map_err(|e| Error::structural(layer, e))
}

fn octet_string(bytes: &[u8]) -> Vec<u8> {
    yasna::construct_der(|w| w.write_bytes(bytes))
}

// ── Decode ───────────────────────────────────────────────────────────

/// Decodes bags into records, carrying the password and policy.
pub(crate) struct BagDecoder<'a> {
    pub password: &'a Password,
    pub ctx: &'a DecodeContext,
}

impl BagDecoder<'_> {
    /// Decode one bag, appending its record(s) to `out` in order.
    pub fn decode(&self, bag: SafeBag, depth: usize, out: &mut Vec<Record>) -> Result<(), Error> {
        let Some(kind) = bag_kind(&bag.bag_id) else {
            tracing::debug!(bag_id = %bag.bag_id, "passing through unrecognised bag type");
            out.push(Record {
                kind: RecordKind::Opaque(bag.bag_id),
                attributes: bag.attributes,
                payload: bag.value,
            });
            return Ok(());
        };

        let (kind, payload) = match kind {
            BagKind::Key => keyformat::key_record(&bag.value, self.ctx.key_format)?,
            BagKind::ShroudedKey => {
                let plain = self.decrypt_shrouded(&bag.value)?;
                keyformat::key_record(&plain, self.ctx.key_format)?
            }
            BagKind::Cert => {
                let (cert_type, value) = read_typed_value("CertBag", &bag.value)?;
                if !is_oid(&cert_type, oid::X509_CERTIFICATE) {
                    return Err(Error::Unsupported(format!(
                        "certificate type {cert_type} (only X.509 is supported)"
                    )));
                }
                (RecordKind::Certificate, read_octets("CertBag", &value)?)
            }
            BagKind::Crl => {
                let (crl_type, value) = read_typed_value("CRLBag", &bag.value)?;
                if !is_oid(&crl_type, oid::X509_CRL) {
                    return Err(Error::Unsupported(format!(
                        "CRL type {crl_type} (only X.509 is supported)"
                    )));
                }
                (RecordKind::Crl, read_octets("CRLBag", &value)?)
            }
            BagKind::Secret => (RecordKind::Secret, self.decode_secret(&bag.value)?),
            BagKind::SafeContents => {
                if depth >= MAX_NESTING {
                    return Err(Error::structural(
                        "SafeContents",
                        format!("nesting deeper than {MAX_NESTING}"),
                    ));
                }
                tracing::debug!(depth, "descending into nested safe contents");
                // Attributes on the container bag itself have nowhere to go
                for inner in model::parse_safe_contents(&bag.value)? {
                    self.decode(inner, depth + 1, out)?;
                }
                return Ok(());
            }
        };

        out.push(Record {
            kind,
            attributes: bag.attributes,
            payload,
        });
        Ok(())
    }

    /// Decrypt an `EncryptedPrivateKeyInfo` and check the result is a
    /// `PrivateKeyInfo`. A parse failure on the plaintext means the padding
    /// happened to look valid under a wrong key.
    fn decrypt_shrouded(&self, der: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
        let epki = EncryptedPrivateKeyInfo::from_ber(der)?;
        let plain = pbe::decrypt(
            &epki.algorithm,
            &epki.ciphertext,
            self.password,
            self.ctx.max_iterations,
        )?;
        keyformat::PrivateKeyInfo::from_der(&plain).map_err(|_| {
            Error::Decryption("decrypted key is not a PrivateKeyInfo (wrong password?)".into())
        })?;
        Ok(plain)
    }

    /// Secret bag value.
    ///
    /// Java keystores put secret keys in a secretBag whose type is
    /// pkcs8ShroudedKeyBag (or keyBag) and whose value is an OCTET STRING
    /// wrapping the corresponding structure; the key octets of the inner
    /// PrivateKeyInfo are the secret. Any other type yields the OCTET STRING
    /// contents, or the raw DER value if it is not an OCTET STRING.
    fn decode_secret(&self, der: &[u8]) -> Result<Vec<u8>, Error> {
        let (secret_type, value) = read_typed_value("SecretBag", der)?;

        if is_oid(&secret_type, oid::PKCS8_SHROUDED_KEY_BAG) {
            let inner = read_octets("SecretBag", &value)?;
            let plain = self.decrypt_shrouded(&inner)?;
            return Ok(keyformat::key_octets(&plain)?.to_vec());
        }
        if is_oid(&secret_type, oid::KEY_BAG) {
            let inner = read_octets("SecretBag", &value)?;
            return Ok(keyformat::key_octets(&inner)?.to_vec());
        }

        Ok(yasna::parse_ber(&value, |r| r.read_bytes()).unwrap_or(value))
    }
}

// ── Encode ───────────────────────────────────────────────────────────

/// Encode one record as a SafeBag.
pub(crate) fn encode_record(
    record: &Record,
    password: &Password,
    ctx: &EncodeContext,
) -> Result<SafeBag, Error> {
    check_attributes(&record.attributes)?;
    let (bag_arcs, value): (&[u64], Vec<u8>) = match &record.kind {
        RecordKind::PrivateKey | RecordKind::LegacyPrivateKey | RecordKind::EcPrivateKey => {
            let pkcs8 = keyformat::to_pkcs8(&record.kind, &record.payload)?;
            match ctx.key_encryption {
                Some(suite) => (
                    oid::PKCS8_SHROUDED_KEY_BAG,
                    shroud_key(suite, &pkcs8, password, ctx)?,
                ),
                None => (oid::KEY_BAG, pkcs8.to_vec()),
            }
        }
        RecordKind::Certificate => (
            oid::CERT_BAG,
            write_typed_value(oid::X509_CERTIFICATE, &octet_string(&record.payload)),
        ),
        RecordKind::Crl => (
            oid::CRL_BAG,
            write_typed_value(oid::X509_CRL, &octet_string(&record.payload)),
        ),
        RecordKind::Secret => (
            oid::SECRET_BAG,
            write_typed_value(oid::DATA, &octet_string(&record.payload)),
        ),
        RecordKind::Opaque(bag_id) => {
            // The payload goes back verbatim as the bag value, so it must
            // be a single DER element.
            yasna::parse_ber(&record.payload, |r| r.read_der()).map_err(|e| {
                Error::Encoding(format!("opaque bag {bag_id} payload is not DER: {e}"))
            })?;
            return Ok(SafeBag {
                bag_id: bag_id.clone(),
                value: record.payload.clone(),
                attributes: record.attributes.clone(),
            });
        }
    };

    Ok(SafeBag {
        bag_id: oid_of(bag_arcs),
        value,
        attributes: record.attributes.clone(),
    })
}

/// Decoding drops one trailing NUL from a friendly name, so a name that
/// ends in one cannot be stored faithfully.
fn check_attributes(attributes: &[Attribute]) -> Result<(), Error> {
    for attribute in attributes {
        if let Attribute::FriendlyName(name) = attribute {
            if name.ends_with('\0') {
                return Err(Error::Encoding(format!(
                    "friendly name {name:?} ends with a NUL character"
                )));
            }
        }
    }
    Ok(())
}

fn shroud_key(
    suite: PbeAlgorithm,
    pkcs8: &[u8],
    password: &Password,
    ctx: &EncodeContext,
) -> Result<Vec<u8>, Error> {
    let (algorithm, ciphertext) = pbe::encrypt(suite, pkcs8, password, ctx.iterations, ctx.salt_len)?;
    Ok(EncryptedPrivateKeyInfo {
        algorithm,
        ciphertext,
    }
    .to_der())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::KeyFormat;
    use crate::model::AlgorithmIdentifier;
    use satchel_core::ErrorKind;

    fn test_pkcs8() -> Vec<u8> {
        yasna::construct_der(|w| {
            w.write_sequence(|w| {
                w.next().write_u64(0);
                AlgorithmIdentifier::new(oid::RSA_ENCRYPTION, Some(vec![0x05, 0x00])).write(w.next());
                w.next().write_bytes(&[0x30, 0x03, 0x02, 0x01, 0x00]);
            })
        })
    }

    fn decode_one(bag: SafeBag, password: &Password) -> Result<Vec<Record>, Error> {
        let ctx = DecodeContext::new();
        let decoder = BagDecoder {
            password,
            ctx: &ctx,
        };
        let mut out = Vec::new();
        decoder.decode(bag, 0, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_bag_table_is_exhaustive() {
        for (arcs, kind) in BAG_TABLE {
            assert_eq!(bag_kind(&oid_of(arcs)), Some(*kind));
        }
        assert_eq!(BAG_TABLE.len(), 6);
    }

    #[test]
    fn test_shrouded_key_round_trip() {
        let password = Password::new("pw");
        let record = Record::private_key(test_pkcs8()).with_friendly_name("k");
        let bag = encode_record(&record, &password, &EncodeContext::new()).unwrap();
        assert!(is_oid(&bag.bag_id, oid::PKCS8_SHROUDED_KEY_BAG));
        let out = decode_one(bag, &password).unwrap();
        assert_eq!(out, vec![record]);
    }

    #[test]
    fn test_plain_key_bag() {
        let password = Password::new("pw");
        let record = Record::private_key(test_pkcs8());
        let bag = encode_record(&record, &password, &EncodeContext::plain()).unwrap();
        assert!(is_oid(&bag.bag_id, oid::KEY_BAG));
        assert_eq!(bag.value, test_pkcs8());
        assert_eq!(decode_one(bag, &password).unwrap(), vec![record]);
    }

    #[test]
    fn test_shrouded_key_wrong_password() {
        let record = Record::private_key(test_pkcs8());
        let bag = encode_record(&record, &Password::new("right"), &EncodeContext::new()).unwrap();
        let err = decode_one(bag, &Password::new("wrong")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decryption);
    }

    #[test]
    fn test_cert_crl_secret_round_trip() {
        let password = Password::new("pw");
        let records = vec![
            Record::certificate(vec![0x30, 0x03, 0x02, 0x01, 0x07]),
            Record::crl(vec![0x30, 0x00]),
            Record::secret(b"raw secret".to_vec()),
        ];
        for record in records {
            let bag = encode_record(&record, &password, &EncodeContext::new()).unwrap();
            assert_eq!(decode_one(bag, &password).unwrap(), vec![record]);
        }
    }

    #[test]
    fn test_non_x509_cert_unsupported() {
        let bag = SafeBag {
            bag_id: oid_of(oid::CERT_BAG),
            value: write_typed_value(oid::SDSI_CERTIFICATE, &octet_string(b"sdsi")),
            attributes: Vec::new(),
        };
        let err = decode_one(bag, &Password::new("")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_non_x509_crl_unsupported() {
        let bag = SafeBag {
            bag_id: oid_of(oid::CRL_BAG),
            value: write_typed_value(&[1, 3, 6, 1, 4, 1, 99999, 2], &octet_string(b"crl")),
            attributes: Vec::new(),
        };
        let err = decode_one(bag, &Password::new("")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(err.to_string().contains("CRL type"), "{err}");
    }

    #[test]
    fn test_malformed_cert_bag_names_layer() {
        let bag = SafeBag {
            bag_id: oid_of(oid::CERT_BAG),
            value: octet_string(b"junk"),
            attributes: Vec::new(),
        };
        assert!(matches!(
            decode_one(bag, &Password::new("")),
            Err(Error::Structural { layer: "CertBag", .. })
        ));
    }

    #[test]
    fn test_unknown_bag_passes_through() {
        let bag = SafeBag {
            bag_id: oid_of(&[1, 2, 3, 4, 5]),
            value: octet_string(b"opaque"),
            attributes: vec![model::Attribute::FriendlyName("x".into())],
        };
        let out = decode_one(bag.clone(), &Password::new("")).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, RecordKind::Opaque(oid_of(&[1, 2, 3, 4, 5])));
        assert_eq!(out[0].friendly_name(), Some("x"));

        let again = encode_record(&out[0], &Password::new(""), &EncodeContext::new()).unwrap();
        assert_eq!(again, bag);
    }

    #[test]
    fn test_opaque_payload_must_be_der() {
        let record = Record::new(RecordKind::Opaque(oid_of(&[1, 2, 3])), b"\x04\x05ab".to_vec());
        let err = encode_record(&record, &Password::new(""), &EncodeContext::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_nested_safe_contents() {
        let inner = SafeBag {
            bag_id: oid_of(oid::SECRET_BAG),
            value: write_typed_value(oid::DATA, &octet_string(b"s")),
            attributes: Vec::new(),
        };
        let mut bag = inner.clone();
        for _ in 0..3 {
            bag = SafeBag {
                bag_id: oid_of(oid::SAFE_CONTENTS_BAG),
                value: model::write_safe_contents(&[bag, inner.clone()]),
                attributes: Vec::new(),
            };
        }
        let out = decode_one(bag, &Password::new("")).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|r| r.payload == b"s"));
    }

    #[test]
    fn test_nesting_limit() {
        let mut bag = SafeBag {
            bag_id: oid_of(oid::SECRET_BAG),
            value: write_typed_value(oid::DATA, &octet_string(b"s")),
            attributes: Vec::new(),
        };
        for _ in 0..=MAX_NESTING {
            bag = SafeBag {
                bag_id: oid_of(oid::SAFE_CONTENTS_BAG),
                value: model::write_safe_contents(&[bag]),
                attributes: Vec::new(),
            };
        }
        let err = decode_one(bag, &Password::new("")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);
    }

    #[test]
    fn test_java_key_bag_secret() {
        // secretBag{ keyBag, OCTET STRING(PrivateKeyInfo) } yields the key octets
        let value = write_typed_value(oid::KEY_BAG, &octet_string(&test_pkcs8()));
        let bag = SafeBag {
            bag_id: oid_of(oid::SECRET_BAG),
            value,
            attributes: Vec::new(),
        };
        let out = decode_one(bag, &Password::new("")).unwrap();
        assert_eq!(out[0].payload, vec![0x30, 0x03, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_secret_non_octet_value_is_raw_der() {
        let value = write_typed_value(&[1, 2, 3], &[0x02, 0x01, 0x05]);
        let bag = SafeBag {
            bag_id: oid_of(oid::SECRET_BAG),
            value,
            attributes: Vec::new(),
        };
        let out = decode_one(bag, &Password::new("")).unwrap();
        assert_eq!(out[0].payload, vec![0x02, 0x01, 0x05]);
    }

    #[test]
    fn test_traditional_key_format_applied() {
        let password = Password::new("pw");
        let bag = encode_record(&Record::private_key(test_pkcs8()), &password, &EncodeContext::new()).unwrap();
        let ctx = DecodeContext {
            key_format: KeyFormat::Traditional,
            ..DecodeContext::new()
        };
        let decoder = BagDecoder {
            password: &password,
            ctx: &ctx,
        };
        let mut out = Vec::new();
        decoder.decode(bag, 0, &mut out).unwrap();
        assert_eq!(out[0].kind, RecordKind::LegacyPrivateKey);
        assert_eq!(out[0].payload, vec![0x30, 0x03, 0x02, 0x01, 0x00]);
    }
}
