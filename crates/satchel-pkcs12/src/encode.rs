#![forbid(unsafe_code)]

//! Container encoding: records → bags → content blocks → MAC → PFX.
//!
//! Consecutive records of the same class share one content block. Private
//! keys go in plain data blocks as (usually shrouded) key bags; everything
//! else goes in a password-encrypted block. Stored order equals input order.

use rand::RngCore;
use satchel_core::Error;

use crate::bags;
use crate::context::EncodeContext;
use crate::kdf::Password;
use crate::mac;
use crate::model::{self, ContentInfo, EncryptedContent, Pfx, SafeBag};
use crate::pbe;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockClass {
    Keys,
    Content,
}

fn class_of(record: &Record) -> BlockClass {
    if record.kind.is_private_key() {
        BlockClass::Keys
    } else {
        BlockClass::Content
    }
}

/// Encode records into a DER PKCS#12 container with the default context.
pub fn encode(records: &[Record], password: &str) -> Result<Vec<u8>, Error> {
    encode_with(records, password, &EncodeContext::new())
}

/// Encode records into a DER PKCS#12 container.
pub fn encode_with(
    records: &[Record],
    password: &str,
    ctx: &EncodeContext,
) -> Result<Vec<u8>, Error> {
    encode_with_password(records, &Password::new(password), ctx)
}

pub(crate) fn encode_with_password(
    records: &[Record],
    password: &Password,
    ctx: &EncodeContext,
) -> Result<Vec<u8>, Error> {
    let mut blocks = Vec::new();
    let mut run: Vec<SafeBag> = Vec::new();
    let mut run_class = None;

    for record in records {
        let class = class_of(record);
        if run_class.is_some_and(|c| c != class) {
            blocks.push(seal_block(run_class, &run, password, ctx)?);
            run.clear();
        }
        run_class = Some(class);
        run.push(bags::encode_record(record, password, ctx)?);
    }
    if !run.is_empty() {
        blocks.push(seal_block(run_class, &run, password, ctx)?);
    }

    let auth_safe = model::write_authenticated_safe(&blocks);
    let mac_data = match ctx.mac {
        Some(digest) => {
            let mut salt = vec![0u8; ctx.salt_len];
            rand::thread_rng().fill_bytes(&mut salt);
            Some(mac::compute(digest, &auth_safe, password, salt, ctx.mac_iterations)?)
        }
        None => None,
    };

    tracing::debug!(
        records = records.len(),
        blocks = blocks.len(),
        mac = mac_data.is_some(),
        "encoded PKCS#12 container"
    );

    Ok(Pfx {
        version: Pfx::VERSION,
        auth_safe: ContentInfo::Data(auth_safe),
        mac_data,
    }
    .to_der())
}

fn seal_block(
    class: Option<BlockClass>,
    bags: &[SafeBag],
    password: &Password,
    ctx: &EncodeContext,
) -> Result<ContentInfo, Error> {
    let contents = model::write_safe_contents(bags);
    match (class, ctx.content_encryption) {
        (Some(BlockClass::Content), Some(suite)) => {
            let (algorithm, ciphertext) =
                pbe::encrypt(suite, &contents, password, ctx.iterations, ctx.salt_len)?;
            Ok(ContentInfo::EncryptedData(EncryptedContent {
                algorithm,
                ciphertext,
            }))
        }
        _ => Ok(ContentInfo::Data(contents)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{DecodeContext, KeyFormat};
    use crate::decode::{decode, decode_with, Integrity};
    use crate::kdf::DigestAlgorithm;
    use crate::model::{oid_of, AlgorithmIdentifier, Attribute};
    use crate::pbe::PbeAlgorithm;
    use crate::record::RecordKind;
    use satchel_core::{oid, ErrorKind};

    fn rsa_pkcs8(tag: u8) -> Vec<u8> {
        yasna::construct_der(|w| {
            w.write_sequence(|w| {
                w.next().write_u64(0);
                AlgorithmIdentifier::new(oid::RSA_ENCRYPTION, Some(vec![0x05, 0x00])).write(w.next());
                w.next().write_bytes(&[0x30, 0x03, 0x02, 0x01, tag]);
            })
        })
    }

    fn sample_records() -> Vec<Record> {
        vec![
            Record::private_key(rsa_pkcs8(1))
                .with_friendly_name("server")
                .with_local_key_id(&[1, 1]),
            Record::certificate(vec![0x30, 0x03, 0x02, 0x01, 0x01])
                .with_friendly_name("server")
                .with_local_key_id(&[1, 1]),
            Record::secret(b"api token".to_vec()).with_friendly_name("token"),
            Record::crl(vec![0x30, 0x00]),
            Record::private_key(rsa_pkcs8(2)).with_local_key_id(&[2, 2]),
            Record::certificate(vec![0x30, 0x03, 0x02, 0x01, 0x02]),
        ]
    }

    fn fast() -> EncodeContext {
        EncodeContext {
            iterations: 16,
            mac_iterations: 16,
            ..EncodeContext::new()
        }
    }

    #[test]
    fn test_round_trip_default_context() {
        let records = sample_records();
        let data = encode(&records, "s3cret").unwrap();
        let contents = decode(&data, "s3cret").unwrap();
        assert_eq!(contents.integrity, Integrity::Verified);
        assert_eq!(contents.records, records);
    }

    #[test]
    fn test_runs_share_blocks() {
        let data = encode_with(&sample_records(), "pw", &fast()).unwrap();
        let pfx = Pfx::from_ber(&data).unwrap();
        let ContentInfo::Data(auth_safe) = pfx.auth_safe else {
            panic!("authSafe is not data");
        };
        let blocks = model::parse_authenticated_safe(&auth_safe).unwrap();
        let shape: Vec<bool> = blocks
            .iter()
            .map(|b| matches!(b, ContentInfo::EncryptedData(_)))
            .collect();
        assert_eq!(shape, vec![false, true, false, true]);
    }

    #[test]
    fn test_round_trip_every_suite_and_digest() {
        let records = sample_records();
        let suites = [
            PbeAlgorithm::Sha1And3KeyTripleDesCbc,
            PbeAlgorithm::Sha1And2KeyTripleDesCbc,
            PbeAlgorithm::Sha1And128BitRc2Cbc,
            PbeAlgorithm::Sha1And40BitRc2Cbc,
        ];
        let digests = [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha224,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
        ];
        for (suite, digest) in suites.into_iter().zip(digests) {
            let ctx = EncodeContext {
                key_encryption: Some(suite),
                content_encryption: Some(suite),
                mac: Some(digest),
                ..fast()
            };
            let data = encode_with(&records, "pässwörd", &ctx).unwrap();
            let contents = decode(&data, "pässwörd").unwrap();
            assert_eq!(contents.records, records, "{suite:?} / {digest:?}");
        }
    }

    #[test]
    fn test_plain_container_is_unauthenticated() {
        let records = sample_records();
        let data = encode_with(&records, "", &EncodeContext::plain()).unwrap();
        let contents = decode(&data, "").unwrap();
        assert_eq!(contents.integrity, Integrity::Unauthenticated);
        assert_eq!(contents.records, records);
    }

    #[test]
    fn test_wrong_password() {
        let data = encode_with(&sample_records(), "right", &fast()).unwrap();
        let err = decode(&data, "wrong").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decryption, "{err}");
    }

    #[test]
    fn test_mac_only_wrong_password_is_integrity() {
        // Nothing encrypted: only the MAC can notice the wrong password
        let ctx = EncodeContext {
            key_encryption: None,
            content_encryption: None,
            ..fast()
        };
        let data = encode_with(&sample_records(), "right", &ctx).unwrap();
        let err = decode(&data, "wrong").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_empty_password_round_trip() {
        let records = sample_records();
        let data = encode_with(&records, "", &fast()).unwrap();
        let contents = decode(&data, "").unwrap();
        assert_eq!(contents.integrity, Integrity::Verified);
        assert_eq!(contents.records, records);
    }

    #[test]
    fn test_absent_password_fallback() {
        let records = sample_records();
        let data = encode_with_password(&records, &Password::absent(), &fast()).unwrap();
        let contents = decode(&data, "").unwrap();
        assert_eq!(contents.integrity, Integrity::Verified);
        assert_eq!(contents.records, records);
    }

    #[test]
    fn test_traditional_keys_round_trip() {
        let ctx = DecodeContext {
            key_format: KeyFormat::Traditional,
            ..DecodeContext::new()
        };
        let data = encode_with(&sample_records(), "pw", &fast()).unwrap();
        let first = decode_with(&data, "pw", &ctx).unwrap().into_records();
        assert_eq!(first[0].kind, RecordKind::LegacyPrivateKey);

        let again = encode_with(&first, "pw", &fast()).unwrap();
        let second = decode_with(&again, "pw", &ctx).unwrap().into_records();
        assert_eq!(second, first);
    }

    #[test]
    fn test_opaque_and_other_attributes_survive() {
        let extra = Attribute::Other {
            oid: oid_of(&[2, 16, 840, 1, 113894, 746875, 1, 1]),
            values: vec![yasna::construct_der(|w| w.write_oid(&oid_of(&[2, 5, 29, 37, 0])))],
        };
        let records = vec![
            Record::new(
                RecordKind::Opaque(oid_of(&[1, 3, 6, 1, 4, 1, 99999, 1])),
                vec![0x04, 0x02, 0xAB, 0xCD],
            ),
            Record::certificate(vec![0x30, 0x00]).with_attribute(extra),
        ];
        let data = encode_with(&records, "pw", &fast()).unwrap();
        assert_eq!(decode(&data, "pw").unwrap().records, records);
    }

    #[test]
    fn test_empty_record_list() {
        let data = encode_with(&[], "pw", &fast()).unwrap();
        let contents = decode(&data, "pw").unwrap();
        assert!(contents.records.is_empty());
        assert_eq!(contents.integrity, Integrity::Verified);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let ctx = EncodeContext {
            iterations: 0,
            ..EncodeContext::new()
        };
        let err = encode_with(&sample_records(), "pw", &ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_friendly_name_with_trailing_nul_rejected() {
        let records = vec![Record::secret(b"s".to_vec()).with_friendly_name("name\0")];
        let err = encode_with(&records, "pw", &fast()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);

        // An interior NUL survives the round trip
        let records = vec![Record::secret(b"s".to_vec()).with_friendly_name("na\0me")];
        let data = encode_with(&records, "pw", &fast()).unwrap();
        let back = decode(&data, "pw").unwrap().into_records();
        assert_eq!(back, records);
        assert_eq!(back[0].friendly_name(), Some("na\0me"));
    }

    #[test]
    fn test_invalid_key_payload_rejected() {
        let records = vec![Record::private_key(b"not der".to_vec())];
        let err = encode(&records, "pw").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_fixture_reencodes() {
        use base64::Engine;
        let b64: String = include_str!("../testdata/changeit.p12.b64")
            .split_whitespace()
            .collect();
        let data = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .unwrap();
        let original = decode(&data, "changeit").unwrap().into_records();

        let reencoded = encode_with(&original, "new password", &fast()).unwrap();
        let again = decode(&reencoded, "new password").unwrap().into_records();
        assert_eq!(again, original);
    }
}
