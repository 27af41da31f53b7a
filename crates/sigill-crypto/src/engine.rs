#![forbid(unsafe_code)]

//! The signature engine abstraction.
//!
//! An engine is a stateful sign-or-verify object in the classic
//! init/update/final style. Engines are obtained by identifier from an
//! [`EngineProvider`]; identifiers follow the `SHA256withECDSA` naming, with
//! an `inP1363Format` suffix for DSA/ECDSA engines that consume and produce
//! the fixed-width `r || s` layout instead of ASN.1 DER.

use crate::digest::HashType;
use crate::key::SigningKey;
use sigill_core::Error;
use std::fmt;

/// A stateful signature engine.
pub trait SignatureEngine: Send {
    /// Prepare to sign with `key`, discarding any buffered data.
    fn init_sign(&mut self, key: &SigningKey) -> Result<(), Error>;
    /// Prepare to verify with `key`, discarding any buffered data.
    fn init_verify(&mut self, key: &SigningKey) -> Result<(), Error>;
    /// Feed data to be signed or verified.
    fn update(&mut self, data: &[u8]) -> Result<(), Error>;
    /// Produce a signature over everything fed since initialization.
    fn sign(&mut self) -> Result<Vec<u8>, Error>;
    /// Check `signature` over everything fed since initialization.
    ///
    /// A well-formed signature that does not match returns `Ok(false)`.
    fn verify(&mut self, signature: &[u8]) -> Result<bool, Error>;
}

/// A source of signature engines.
pub trait EngineProvider: Send + Sync + fmt::Debug {
    /// Create an engine for `id`, or fail with
    /// [`Error::UnsupportedAlgorithm`] if the provider has none.
    fn engine(&self, id: &str) -> Result<Box<dyn SignatureEngine>, Error>;
}

/// Algorithm family of a signature method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFamily {
    Rsa,
    Dsa,
    Ecdsa,
    Hmac,
}

/// A parsed engine identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSpec {
    pub family: SignatureFamily,
    pub hash: HashType,
    /// DSA/ECDSA only: signatures use the fixed-width `r || s` layout.
    pub p1363: bool,
}

const P1363_SUFFIX: &str = "inP1363Format";

impl EngineSpec {
    /// Parse identifiers such as `SHA1withRSA`, `SHA256withECDSAinP1363Format`
    /// or `HmacSHA512`.
    pub fn parse(id: &str) -> Option<Self> {
        if let Some(hash) = id.strip_prefix("Hmac") {
            return Some(Self {
                family: SignatureFamily::Hmac,
                hash: HashType::from_engine_name(hash)?,
                p1363: false,
            });
        }
        let (hash, rest) = id.split_once("with")?;
        let hash = HashType::from_engine_name(hash)?;
        let (family, p1363) = match rest.strip_suffix(P1363_SUFFIX) {
            Some(family) => (family, true),
            None => (rest, false),
        };
        let family = match family {
            "RSA" if !p1363 => SignatureFamily::Rsa,
            "DSA" => SignatureFamily::Dsa,
            "ECDSA" => SignatureFamily::Ecdsa,
            _ => return None,
        };
        Some(Self { family, hash, p1363 })
    }

    /// The identifier this spec was parsed from.
    pub fn id(&self) -> String {
        let hash = self.hash.engine_name();
        let suffix = if self.p1363 { P1363_SUFFIX } else { "" };
        match self.family {
            SignatureFamily::Rsa => format!("{hash}withRSA"),
            SignatureFamily::Dsa => format!("{hash}withDSA{suffix}"),
            SignatureFamily::Ecdsa => format!("{hash}withECDSA{suffix}"),
            SignatureFamily::Hmac => format!("Hmac{hash}"),
        }
    }
}
