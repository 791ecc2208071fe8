#![forbid(unsafe_code)]

//! Container decoding: PFX → MAC check → content blocks → bags → records.

use satchel_core::{Error, ErrorKind};

use crate::bags::BagDecoder;
use crate::context::{DecodeContext, MacPolicy};
use crate::kdf::Password;
use crate::mac::{self, MacVerdict};
use crate::model::{self, ContentInfo, Pfx};
use crate::pbe;
use crate::record::{Record, RecordKind};

/// How far the container's integrity was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    /// The MAC matched.
    Verified,
    /// The container carries no MAC.
    Unauthenticated,
    /// The MAC did not match and the policy allowed decoding anyway.
    Mismatch,
}

/// Everything decoded from one container, in stored order.
#[derive(Debug)]
pub struct Pkcs12Contents {
    pub records: Vec<Record>,
    pub integrity: Integrity,
}

impl Pkcs12Contents {
    pub fn certificates(&self) -> impl Iterator<Item = &Record> {
        self.records
            .iter()
            .filter(|r| r.kind == RecordKind::Certificate)
    }

    pub fn private_keys(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.kind.is_private_key())
    }

    pub fn by_friendly_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Record> {
        self.records
            .iter()
            .filter(move |r| r.friendly_name() == Some(name))
    }

    pub fn by_local_key_id<'a>(&'a self, key_id: &'a [u8]) -> impl Iterator<Item = &'a Record> {
        self.records
            .iter()
            .filter(move |r| r.local_key_id() == Some(key_id))
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Decode a PKCS#12 container with the default context.
pub fn decode(data: &[u8], password: &str) -> Result<Pkcs12Contents, Error> {
    decode_with(data, password, &DecodeContext::new())
}

/// Decode a PKCS#12 container.
///
/// `""` is the empty password. If its MAC check fails, the absent password
/// is tried as well, since some producers derive keys from it for `""`.
pub fn decode_with(
    data: &[u8],
    password: &str,
    ctx: &DecodeContext,
) -> Result<Pkcs12Contents, Error> {
    let pfx = Pfx::from_ber(data)?;
    if pfx.version != Pfx::VERSION {
        return Err(Error::structural(
            "PFX",
            format!("version {} (expected {})", pfx.version, Pfx::VERSION),
        ));
    }

    let auth_safe = match &pfx.auth_safe {
        ContentInfo::Data(bytes) => bytes.as_slice(),
        ContentInfo::EncryptedData(_) => {
            return Err(Error::structural("PFX", "authSafe is encryptedData"));
        }
        ContentInfo::Other { content_type, .. } => {
            return Err(Error::Unsupported(format!(
                "authSafe content type {content_type} (public-key integrity mode)"
            )));
        }
    };

    let mut password = Password::new(password);
    let verdict = match &pfx.mac_data {
        Some(mac_data) => {
            let mut verdict = mac::verify(mac_data, auth_safe, &password, ctx.max_iterations)?;
            if verdict == MacVerdict::Invalid && password.is_empty() {
                let absent = Password::absent();
                if mac::verify(mac_data, auth_safe, &absent, ctx.max_iterations)? == MacVerdict::Valid {
                    tracing::warn!("MAC matched the absent password; using it in place of \"\"");
                    password = absent;
                    verdict = MacVerdict::Valid;
                }
            }
            Some(verdict)
        }
        None if ctx.mac_policy == MacPolicy::Strict => {
            return Err(Error::Integrity("container has no MAC".into()));
        }
        None => None,
    };

    // Bags are decoded even after a MAC failure so that a wrong password
    // surfaces as a decryption error rather than as tampering.
    let records = match decode_contents(auth_safe, &password, ctx) {
        Ok(records) => records,
        Err(e) if verdict == Some(MacVerdict::Invalid) && e.kind() == ErrorKind::Structural => {
            return Err(Error::Integrity(format!(
                "MAC verification failed and content is malformed: {e}"
            )));
        }
        Err(e) => return Err(e),
    };

    let integrity = match verdict {
        Some(MacVerdict::Valid) => Integrity::Verified,
        Some(MacVerdict::Invalid) => {
            if ctx.mac_policy != MacPolicy::Lenient {
                return Err(Error::Integrity("MAC verification failed".into()));
            }
            tracing::warn!("MAC verification failed; continuing under lenient policy");
            Integrity::Mismatch
        }
        None => {
            tracing::warn!("container has no MAC; contents are unauthenticated");
            Integrity::Unauthenticated
        }
    };

    Ok(Pkcs12Contents {
        records,
        integrity,
    })
}

fn decode_contents(
    auth_safe: &[u8],
    password: &Password,
    ctx: &DecodeContext,
) -> Result<Vec<Record>, Error> {
    let blocks = model::parse_authenticated_safe(auth_safe)?;
    let decoder = BagDecoder { password, ctx };
    let mut records = Vec::new();

    for block in blocks {
        let bags = match block {
            ContentInfo::Data(bytes) => model::parse_safe_contents(&bytes)?,
            ContentInfo::EncryptedData(content) => {
                let plain = pbe::decrypt(
                    &content.algorithm,
                    &content.ciphertext,
                    password,
                    ctx.max_iterations,
                )?;
                model::parse_safe_contents(&plain).map_err(|e| {
                    Error::Decryption(format!(
                        "decrypted block is not SafeContents (wrong password?): {e}"
                    ))
                })?
            }
            ContentInfo::Other { content_type, .. } => {
                return Err(Error::Unsupported(format!(
                    "content type {content_type} in authenticated safe (public-key privacy mode)"
                )));
            }
        };
        for bag in bags {
            decoder.decode(bag, 0, &mut records)?;
        }
    }

    Ok(records)
}
