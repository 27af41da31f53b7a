#![forbid(unsafe_code)]

//! Cryptographic building blocks for the Sigill XML-DSig library.
//!
//! Provides key types, digests, the [`SignatureEngine`] abstraction with a
//! RustCrypto-backed provider, and DSA/ECDSA signature format conversion.

pub mod convert;
pub mod digest;
pub mod engine;
pub mod key;
pub mod sign;

pub use crate::digest::HashType;
pub use engine::{EngineProvider, EngineSpec, SignatureEngine, SignatureFamily};
pub use key::{PublicKey, SigningKey};
pub use sign::RustCryptoProvider;
