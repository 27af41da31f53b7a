#![forbid(unsafe_code)]

//! Conversion between the two DSA/ECDSA signature encodings.
//!
//! XML-DSig carries `r || s` as two fixed-width big-endian integers (the
//! IEEE P1363 layout). General purpose engines usually speak ASN.1 DER:
//! `SEQUENCE { INTEGER r, INTEGER s }`.

use der::asn1::UintRef;
use der::{Decode, Encode, Sequence};
use sigill_core::Error;

/// `SEQUENCE { r INTEGER, s INTEGER }` as produced by DSA and ECDSA engines.
#[derive(Sequence)]
struct DerSignature<'a> {
    r: UintRef<'a>,
    s: UintRef<'a>,
}

fn conversion_error(e: der::Error) -> Error {
    Error::FormatConversion(format!("DER signature: {e}"))
}

/// Convert a DER `SEQUENCE { r, s }` into `r || s`, each left-padded to `size` bytes.
pub fn asn1_to_p1363(der: &[u8], size: usize) -> Result<Vec<u8>, Error> {
    let sig = DerSignature::from_der(der).map_err(conversion_error)?;
    let (r, s) = (sig.r.as_bytes(), sig.s.as_bytes());
    if r.len() > size || s.len() > size {
        return Err(Error::FormatConversion(format!(
            "signature component longer than {size} bytes"
        )));
    }
    let mut out = vec![0u8; 2 * size];
    out[size - r.len()..size].copy_from_slice(r);
    out[2 * size - s.len()..].copy_from_slice(s);
    Ok(out)
}

/// Convert `r || s` (two halves of equal width) into a DER `SEQUENCE { r, s }`.
pub fn p1363_to_asn1(sig: &[u8]) -> Result<Vec<u8>, Error> {
    if sig.is_empty() || sig.len() % 2 != 0 {
        return Err(Error::FormatConversion(format!(
            "fixed-width signature has invalid length {}",
            sig.len()
        )));
    }
    let (r, s) = sig.split_at(sig.len() / 2);
    DerSignature {
        r: UintRef::new(r).map_err(conversion_error)?,
        s: UintRef::new(s).map_err(conversion_error)?,
    }
    .to_der()
    .map_err(conversion_error)
}
