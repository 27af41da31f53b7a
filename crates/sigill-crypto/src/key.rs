#![forbid(unsafe_code)]

//! Public and signing key types.

use rsa::traits::PublicKeyParts;
use rsa::BigUint;
use sigill_core::Error;
use spki::{DecodePublicKey, EncodePublicKey};
use std::fmt;

/// Byte length of a P-256 field element (and of each half of a P-256 signature).
pub const P256_FIELD_LEN: usize = 32;

/// A public key usable for verification and for `<KeyValue>` encoding.
#[derive(Clone, PartialEq)]
pub enum PublicKey {
    Rsa(rsa::RsaPublicKey),
    Dsa(dsa::VerifyingKey),
    EcP256(p256::PublicKey),
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa(_) => write!(f, "RSA public key ({} bits)", self.key_bits()),
            Self::Dsa(_) => write!(f, "DSA public key ({} bits)", self.key_bits()),
            Self::EcP256(_) => write!(f, "EC P-256 public key"),
        }
    }
}

impl PublicKey {
    /// Build an RSA key from modulus and public exponent.
    pub fn rsa_from_components(modulus: BigUint, exponent: BigUint) -> Result<Self, Error> {
        rsa::RsaPublicKey::new(modulus, exponent)
            .map(Self::Rsa)
            .map_err(|e| Error::InvalidKey(format!("RSA public key: {e}")))
    }

    /// Build a DSA key from domain parameters and the public value.
    ///
    /// The DSA implementation validates the parameters against each other.
    pub fn dsa_from_components(p: BigUint, q: BigUint, g: BigUint, y: BigUint) -> Result<Self, Error> {
        let components = dsa::Components::from_components(p, q, g)
            .map_err(|_| Error::InvalidKey("inconsistent DSA domain parameters".into()))?;
        dsa::VerifyingKey::from_components(components, y)
            .map(Self::Dsa)
            .map_err(|_| Error::InvalidKey("DSA public value out of range".into()))
    }

    /// Build a P-256 key from an uncompressed SEC1 point (`0x04 || X || Y`).
    ///
    /// Points that are not on the curve are rejected.
    pub fn ec_p256_from_sec1(point: &[u8]) -> Result<Self, Error> {
        p256::PublicKey::from_sec1_bytes(point)
            .map(Self::EcP256)
            .map_err(|_| Error::InvalidKey("EC point is not on the P-256 curve".into()))
    }

    /// Parse SubjectPublicKeyInfo DER.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, Error> {
        if let Ok(pk) = rsa::RsaPublicKey::from_public_key_der(der) {
            return Ok(Self::Rsa(pk));
        }
        if let Ok(pk) = p256::PublicKey::from_public_key_der(der) {
            return Ok(Self::EcP256(pk));
        }
        if let Ok(vk) = dsa::VerifyingKey::from_public_key_der(der) {
            return Ok(Self::Dsa(vk));
        }
        Err(Error::InvalidKey(
            "unsupported public key algorithm in SPKI DER".into(),
        ))
    }

    /// Parse a PEM `PUBLIC KEY` block.
    pub fn from_spki_pem(pem: &str) -> Result<Self, Error> {
        if let Ok(pk) = rsa::RsaPublicKey::from_public_key_pem(pem) {
            return Ok(Self::Rsa(pk));
        }
        if let Ok(pk) = p256::PublicKey::from_public_key_pem(pem) {
            return Ok(Self::EcP256(pk));
        }
        if let Ok(vk) = dsa::VerifyingKey::from_public_key_pem(pem) {
            return Ok(Self::Dsa(vk));
        }
        Err(Error::InvalidKey(
            "unsupported public key algorithm in PEM".into(),
        ))
    }

    /// Encode as SubjectPublicKeyInfo DER.
    pub fn to_spki_der(&self) -> Result<Vec<u8>, Error> {
        let doc = match self {
            Self::Rsa(pk) => pk.to_public_key_der(),
            Self::Dsa(vk) => vk.to_public_key_der(),
            Self::EcP256(pk) => pk.to_public_key_der(),
        }
        .map_err(|e| Error::Marshal(format!("SubjectPublicKeyInfo encoding: {e}")))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// Key size in bits: RSA modulus, DSA prime, or EC field size.
    pub fn key_bits(&self) -> usize {
        match self {
            Self::Rsa(pk) => pk.n().bits(),
            Self::Dsa(vk) => vk.components().p().bits(),
            Self::EcP256(_) => 256,
        }
    }

    /// Width in bytes of each of `r` and `s` in the fixed-width (P1363)
    /// signature format, for DSA and ECDSA keys.
    pub fn signature_component_len(&self) -> Option<usize> {
        match self {
            Self::Rsa(_) => None,
            Self::Dsa(vk) => Some(vk.components().q().bits().div_ceil(8)),
            Self::EcP256(_) => Some(P256_FIELD_LEN),
        }
    }

    /// Short family name used in log and error messages.
    pub fn family(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RSA",
            Self::Dsa(_) => "DSA",
            Self::EcP256(_) => "EC",
        }
    }

    /// Uncompressed SEC1 encoding of an EC key's point.
    pub fn ec_point_uncompressed(&self) -> Option<Vec<u8>> {
        use p256::elliptic_curve::sec1::ToEncodedPoint;
        match self {
            Self::EcP256(pk) => Some(pk.to_encoded_point(false).as_bytes().to_vec()),
            _ => None,
        }
    }
}

/// Key material for signature operations.
#[derive(Clone)]
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    Dsa(dsa::SigningKey),
    DsaPublic(dsa::VerifyingKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
    Hmac(Vec<u8>),
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa(_) => write!(f, "RSA private key"),
            Self::RsaPublic(_) => write!(f, "RSA public key"),
            Self::Dsa(_) => write!(f, "DSA private key"),
            Self::DsaPublic(_) => write!(f, "DSA public key"),
            Self::EcP256(_) => write!(f, "EC P-256 private key"),
            Self::EcP256Public(_) => write!(f, "EC P-256 public key"),
            Self::Hmac(k) => write!(f, "HMAC key ({} bytes)", k.len()),
        }
    }
}

impl From<PublicKey> for SigningKey {
    fn from(key: PublicKey) -> Self {
        match key {
            PublicKey::Rsa(pk) => Self::RsaPublic(pk),
            PublicKey::Dsa(vk) => Self::DsaPublic(vk),
            PublicKey::EcP256(pk) => Self::EcP256Public(pk.into()),
        }
    }
}

impl SigningKey {
    /// Load a private key from a PEM `PRIVATE KEY` (PKCS#8) block.
    ///
    /// Tries RSA, then EC P-256, then DSA.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, Error> {
        use pkcs8::DecodePrivateKey;

        if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_pem(pem) {
            return Ok(Self::Rsa(pk));
        }
        if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self::EcP256(sk));
        }
        if let Ok(sk) = dsa::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self::Dsa(sk));
        }
        Err(Error::InvalidKey(
            "unable to parse PKCS#8 private key (tried RSA, P-256, DSA)".into(),
        ))
    }

    /// The public half of an asymmetric key. `None` for HMAC keys.
    pub fn public_key(&self) -> Option<PublicKey> {
        match self {
            Self::Rsa(pk) => Some(PublicKey::Rsa(pk.to_public_key())),
            Self::RsaPublic(pk) => Some(PublicKey::Rsa(pk.clone())),
            Self::Dsa(sk) => Some(PublicKey::Dsa(sk.verifying_key().clone())),
            Self::DsaPublic(vk) => Some(PublicKey::Dsa(vk.clone())),
            Self::EcP256(sk) => Some(PublicKey::EcP256(sk.verifying_key().into())),
            Self::EcP256Public(vk) => Some(PublicKey::EcP256(vk.into())),
            Self::Hmac(_) => None,
        }
    }

    /// True if the key can produce signatures.
    pub fn can_sign(&self) -> bool {
        matches!(self, Self::Rsa(_) | Self::Dsa(_) | Self::EcP256(_) | Self::Hmac(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ec_spki_round_trip() {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let public = SigningKey::EcP256(sk).public_key().unwrap();
        let der = public.to_spki_der().unwrap();
        assert_eq!(PublicKey::from_spki_der(&der).unwrap(), public);
        assert_eq!(public.signature_component_len(), Some(32));
        assert_eq!(public.ec_point_uncompressed().unwrap().len(), 65);
    }

    #[test]
    fn test_rsa_components_and_bits() {
        let sk = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pk = sk.to_public_key();
        let rebuilt = PublicKey::rsa_from_components(pk.n().clone(), pk.e().clone()).unwrap();
        assert_eq!(rebuilt, PublicKey::Rsa(pk));
        assert_eq!(rebuilt.key_bits(), 1024);
        assert_eq!(rebuilt.signature_component_len(), None);
    }

    #[test]
    fn test_point_off_curve_is_rejected() {
        let mut point = vec![0x04];
        point.extend_from_slice(&[1u8; 64]);
        assert!(matches!(
            PublicKey::ec_p256_from_sec1(&point),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_debug_hides_material() {
        let key = SigningKey::Hmac(b"secret".to_vec());
        assert_eq!(format!("{key:?}"), "HMAC key (6 bytes)");
    }
}
