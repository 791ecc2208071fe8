#![forbid(unsafe_code)]

//! Core types for the satchel PKCS#12 codec: the shared error type and the
//! object identifier tables from RFC 7292 and the PKCS standards it references.

pub mod error;
pub mod oid;

pub use error::{Error, ErrorKind, Result};
