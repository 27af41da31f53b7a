#![forbid(unsafe_code)]

//! Core types for the Sigill XML Digital Signature library.

pub mod algorithm;
pub mod error;
pub mod ns;
pub mod policy;

pub use error::{Error, Result};
pub use policy::ValidationPolicy;
