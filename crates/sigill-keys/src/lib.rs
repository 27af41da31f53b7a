#![forbid(unsafe_code)]

//! Key material codecs for the Sigill XML-DSig library.
//!
//! Covers the `<KeyInfo>` subtree: `<KeyName>`, `<KeyValue>` (RSA, DSA and
//! EC P-256), `<X509Data>`, `<RetrievalMethod>` and `<DEREncodedKeyValue>`.
//! [`KeyInfoFactory`] is the entry point for building and parsing them.

pub mod crypto_binary;
pub mod factory;
pub mod keyinfo;
pub mod keyvalue;
pub mod retrieval;
pub mod x509data;

pub use factory::KeyInfoFactory;
pub use keyinfo::{KeyInfo, KeyInfoContent};
pub use keyvalue::{DsaKeyValue, KeyValue, KeyValueContent};
pub use retrieval::RetrievalMethod;
pub use x509data::{X509Content, X509Data, X509IssuerSerial};

use base64::Engine;
use sigill_core::Error;

/// Decode base64 element text, ignoring embedded whitespace.
pub(crate) fn decode_base64(text: &str, what: &str) -> Result<Vec<u8>, Error> {
    let clean: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(&clean)
        .map_err(|e| Error::MalformedData(format!("{what}: invalid base64: {e}")))
}

pub(crate) fn encode_base64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}
