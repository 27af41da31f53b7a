#![forbid(unsafe_code)]

//! XML Digital Signature (XML-DSig) implementation.
//!
//! [`SignatureMethod`] resolves signature algorithm URIs to engines and
//! handles the DSA/ECDSA signature layout. [`SignedInfo`] and
//! [`Reference`] model the signed content, and [`XmlSignature`] ties them
//! to a document for enveloped signing and validation.

pub mod context;
pub mod reference;
pub mod signature;
pub mod signature_method;
pub mod signed_info;

pub use context::DsigContext;
pub use reference::Reference;
pub use signature::{ValidationResult, XmlSignature};
pub use signature_method::{SignatureMethod, SignatureMethodDescriptor};
pub use signed_info::SignedInfo;
