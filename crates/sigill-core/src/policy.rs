#![forbid(unsafe_code)]

//! Validation policy consumed by unmarshal and dereference operations.

use crate::{algorithm, Error, Result};
use serde::Deserialize;

/// Limits applied while processing untrusted signatures.
///
/// The policy is read-only input: it is never mutated by the code that
/// enforces it. When `secure_validation` is off, none of the limits apply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Master switch for every check below.
    pub secure_validation: bool,
    /// Maximum number of `<Reference>` elements in a `<SignedInfo>`.
    pub max_references: usize,
    /// Maximum number of transforms per `<Reference>` or `<RetrievalMethod>`.
    pub max_transforms: usize,
    /// Smallest RSA modulus accepted for verification, in bits.
    pub min_rsa_key_bits: usize,
    /// Smallest DSA prime accepted for verification, in bits.
    pub min_dsa_key_bits: usize,
    /// Smallest `HMACOutputLength` accepted, in bits.
    pub min_hmac_output_bits: u32,
    /// Signature and digest algorithm URIs that are refused outright.
    pub denied_algorithms: Vec<String>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            secure_validation: true,
            max_references: 30,
            max_transforms: 5,
            min_rsa_key_bits: 1024,
            min_dsa_key_bits: 1024,
            min_hmac_output_bits: 128,
            denied_algorithms: vec![
                algorithm::RSA_MD5.to_owned(),
                algorithm::HMAC_MD5.to_owned(),
                algorithm::MD5.to_owned(),
            ],
        }
    }
}

impl ValidationPolicy {
    /// A policy with secure validation switched off.
    pub fn permissive() -> Self {
        Self {
            secure_validation: false,
            ..Self::default()
        }
    }

    /// Reject `uri` if it is on the deny-list.
    pub fn check_algorithm(&self, uri: &str) -> Result<()> {
        if self.secure_validation && self.denied_algorithms.iter().any(|a| a == uri) {
            return Err(Error::PolicyViolation(format!(
                "algorithm {uri} is forbidden when secure validation is enabled"
            )));
        }
        Ok(())
    }

    /// Reject a `<SignedInfo>` carrying more than `max_references` references.
    pub fn check_reference_count(&self, count: usize) -> Result<()> {
        if self.secure_validation && count > self.max_references {
            return Err(Error::PolicyViolation(format!(
                "{count} references exceed the maximum of {}",
                self.max_references
            )));
        }
        Ok(())
    }

    /// Reject a transform chain longer than `max_transforms`.
    pub fn check_transform_count(&self, count: usize) -> Result<()> {
        if self.secure_validation && count > self.max_transforms {
            return Err(Error::PolicyViolation(format!(
                "{count} transforms exceed the maximum of {}",
                self.max_transforms
            )));
        }
        Ok(())
    }

    /// Reject an HMAC output length below `min_hmac_output_bits`.
    pub fn check_hmac_output_length(&self, bits: u32) -> Result<()> {
        if self.secure_validation && bits < self.min_hmac_output_bits {
            return Err(Error::PolicyViolation(format!(
                "HMACOutputLength {bits} is below the minimum of {}",
                self.min_hmac_output_bits
            )));
        }
        Ok(())
    }

    /// Reject an RSA key smaller than `min_rsa_key_bits`.
    pub fn check_rsa_key_size(&self, bits: usize) -> Result<()> {
        if self.secure_validation && bits < self.min_rsa_key_bits {
            return Err(Error::PolicyViolation(format!(
                "RSA key of {bits} bits is below the minimum of {}",
                self.min_rsa_key_bits
            )));
        }
        Ok(())
    }

    /// Reject a DSA key smaller than `min_dsa_key_bits`.
    pub fn check_dsa_key_size(&self, bits: usize) -> Result<()> {
        if self.secure_validation && bits < self.min_dsa_key_bits {
            return Err(Error::PolicyViolation(format!(
                "DSA key of {bits} bits is below the minimum of {}",
                self.min_dsa_key_bits
            )));
        }
        Ok(())
    }
}
