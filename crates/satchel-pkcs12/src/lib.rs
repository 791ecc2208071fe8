#![forbid(unsafe_code)]

//! PKCS#12 (.p12/.pfx) keystore decoder and encoder.
//!
//! Decoding supports the legacy PKCS#12 PBE suites (SHA-1 + 3DES/RC2-CBC)
//! and PBES2 (PBKDF2 + AES-CBC) as written by OpenSSL 3.x. Encoding writes
//! the legacy suites, which every PKCS#12 consumer understands.
//!
//! ```no_run
//! let data = std::fs::read("keystore.p12").unwrap();
//! let contents = satchel_pkcs12::decode(&data, "changeit").unwrap();
//! for cert in contents.certificates() {
//!     println!("{:?}: {} bytes", cert.friendly_name(), cert.payload.len());
//! }
//! ```

mod bags;
pub mod context;
mod decode;
mod encode;
pub mod kdf;
mod keyformat;
pub mod mac;
pub mod model;
pub mod pbe;
mod pem;
mod record;

pub use context::{DecodeContext, EncodeContext, KeyFormat, MacPolicy};
pub use decode::{decode, decode_with, Integrity, Pkcs12Contents};
pub use encode::{encode, encode_with};
pub use kdf::{DigestAlgorithm, Password};
pub use keyformat::PrivateKeyInfo;
pub use model::Attribute;
pub use pbe::PbeAlgorithm;
pub use pem::{decode_to_pem, to_pem, PemBlock};
pub use record::{Record, RecordKind};
pub use satchel_core::{Error, ErrorKind, Result};
pub use yasna::models::ObjectIdentifier;
