#![forbid(unsafe_code)]

//! RustCrypto-backed signature engines (RSA PKCS#1 v1.5, DSA, ECDSA P-256, HMAC).

use crate::convert;
use crate::digest::HashType;
use crate::engine::{EngineProvider, EngineSpec, SignatureEngine, SignatureFamily};
use crate::key::{SigningKey, P256_FIELD_LEN};
use digest::Digest;
use sigill_core::Error;
use signature::SignatureEncoding;

/// Engine provider backed by the RustCrypto crates.
#[derive(Debug, Clone)]
pub struct RustCryptoProvider {
    p1363_native: bool,
}

impl RustCryptoProvider {
    /// A provider offering both DER and fixed-width DSA/ECDSA engines.
    pub fn new() -> Self {
        Self { p1363_native: true }
    }

    /// A provider that only offers DER DSA/ECDSA engines, like many general
    /// purpose crypto providers.
    pub fn der_only() -> Self {
        Self {
            p1363_native: false,
        }
    }
}

impl Default for RustCryptoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineProvider for RustCryptoProvider {
    fn engine(&self, id: &str) -> Result<Box<dyn SignatureEngine>, Error> {
        let spec = EngineSpec::parse(id)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("signature engine {id}")))?;
        if spec.p1363 && !self.p1363_native {
            tracing::debug!(engine = id, "fixed-width engine not offered");
            return Err(Error::UnsupportedAlgorithm(format!("signature engine {id}")));
        }
        tracing::debug!(engine = id, family = ?spec.family, hash = ?spec.hash, "created signature engine");
        Ok(Box::new(RustCryptoEngine::new(spec)))
    }
}

enum Mode {
    Idle,
    Sign(SigningKey),
    Verify(SigningKey),
}

/// A buffering engine for one [`EngineSpec`].
pub struct RustCryptoEngine {
    spec: EngineSpec,
    mode: Mode,
    data: Vec<u8>,
}

impl RustCryptoEngine {
    pub fn new(spec: EngineSpec) -> Self {
        Self {
            spec,
            mode: Mode::Idle,
            data: Vec::new(),
        }
    }

    fn check_family(&self, key: &SigningKey, signing: bool) -> Result<(), Error> {
        let ok = match (self.spec.family, key) {
            (SignatureFamily::Rsa, SigningKey::Rsa(_)) => true,
            (SignatureFamily::Rsa, SigningKey::RsaPublic(_)) => !signing,
            (SignatureFamily::Dsa, SigningKey::Dsa(_)) => true,
            (SignatureFamily::Dsa, SigningKey::DsaPublic(_)) => !signing,
            (SignatureFamily::Ecdsa, SigningKey::EcP256(_)) => true,
            (SignatureFamily::Ecdsa, SigningKey::EcP256Public(_)) => !signing,
            (SignatureFamily::Hmac, SigningKey::Hmac(_)) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            let purpose = if signing { "signing" } else { "verification" };
            Err(Error::InvalidKey(format!(
                "{key:?} cannot be used for {purpose} with {}",
                self.spec.id()
            )))
        }
    }
}

impl SignatureEngine for RustCryptoEngine {
    fn init_sign(&mut self, key: &SigningKey) -> Result<(), Error> {
        self.check_family(key, true)?;
        self.mode = Mode::Sign(key.clone());
        self.data.clear();
        Ok(())
    }

    fn init_verify(&mut self, key: &SigningKey) -> Result<(), Error> {
        self.check_family(key, false)?;
        self.mode = Mode::Verify(key.clone());
        self.data.clear();
        Ok(())
    }

    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        if matches!(self.mode, Mode::Idle) {
            return Err(Error::SignatureEngine("engine not initialized".into()));
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn sign(&mut self) -> Result<Vec<u8>, Error> {
        let Mode::Sign(key) = &self.mode else {
            return Err(Error::SignatureEngine("engine not initialized for signing".into()));
        };
        let data = std::mem::take(&mut self.data);
        let hash = self.spec.hash;
        tracing::debug!(engine = %self.spec.id(), len = data.len(), "signing");
        match key {
            SigningKey::Rsa(pk) => rsa_sign(hash, pk, &data),
            SigningKey::Dsa(sk) => dsa_sign(hash, sk, &data, self.spec.p1363),
            SigningKey::EcP256(sk) => ecdsa_sign(hash, sk, &data, self.spec.p1363),
            SigningKey::Hmac(k) => compute_hmac(hash, k, &data),
            _ => Err(Error::InvalidKey("private key required for signing".into())),
        }
    }

    fn verify(&mut self, signature: &[u8]) -> Result<bool, Error> {
        let Mode::Verify(key) = &self.mode else {
            return Err(Error::SignatureEngine("engine not initialized for verification".into()));
        };
        let data = std::mem::take(&mut self.data);
        let hash = self.spec.hash;
        let p1363 = self.spec.p1363;
        tracing::debug!(engine = %self.spec.id(), len = data.len(), "verifying");
        match key {
            SigningKey::Rsa(pk) => rsa_verify(hash, &pk.to_public_key(), &data, signature),
            SigningKey::RsaPublic(pk) => rsa_verify(hash, pk, &data, signature),
            SigningKey::Dsa(sk) => dsa_verify(hash, sk.verifying_key(), &data, signature, p1363),
            SigningKey::DsaPublic(vk) => dsa_verify(hash, vk, &data, signature, p1363),
            SigningKey::EcP256(sk) => ecdsa_verify(hash, sk.verifying_key(), &data, signature, p1363),
            SigningKey::EcP256Public(vk) => ecdsa_verify(hash, vk, &data, signature, p1363),
            SigningKey::Hmac(k) => {
                if signature.is_empty() {
                    return Ok(false);
                }
                let expected = compute_hmac(hash, k, &data)?;
                Ok(constant_time_eq(&expected, signature))
            }
        }
    }
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

fn rsa_sign(hash: HashType, private_key: &rsa::RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, Error> {
    use signature::Signer;
    macro_rules! do_sign {
        ($hasher:ty) => {{
            let sk = rsa::pkcs1v15::SigningKey::<$hasher>::new(private_key.clone());
            sk.try_sign(data)
                .map(|sig| sig.to_vec())
                .map_err(|e| Error::SignatureEngine(format!("RSA signing failed: {e}")))
        }};
    }
    match hash {
        HashType::Sha1 => do_sign!(sha1::Sha1),
        HashType::Sha256 => do_sign!(sha2::Sha256),
        HashType::Sha384 => do_sign!(sha2::Sha384),
        HashType::Sha512 => do_sign!(sha2::Sha512),
    }
}

fn rsa_verify(
    hash: HashType,
    public_key: &rsa::RsaPublicKey,
    data: &[u8],
    sig_bytes: &[u8],
) -> Result<bool, Error> {
    use signature::Verifier;
    let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
        .map_err(|e| Error::SignatureEngine(format!("invalid RSA signature: {e}")))?;
    macro_rules! do_verify {
        ($hasher:ty) => {{
            let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key.clone());
            Ok(vk.verify(data, &sig).is_ok())
        }};
    }
    match hash {
        HashType::Sha1 => do_verify!(sha1::Sha1),
        HashType::Sha256 => do_verify!(sha2::Sha256),
        HashType::Sha384 => do_verify!(sha2::Sha384),
        HashType::Sha512 => do_verify!(sha2::Sha512),
    }
}

// ── DSA ──────────────────────────────────────────────────────────────

fn dsa_component_len(vk: &dsa::VerifyingKey) -> usize {
    vk.components().q().bits().div_ceil(8)
}

fn dsa_sign(hash: HashType, sk: &dsa::SigningKey, data: &[u8], p1363: bool) -> Result<Vec<u8>, Error> {
    use signature::DigestSigner;
    macro_rules! do_sign {
        ($hasher:ty) => {{
            let digest = <$hasher>::new_with_prefix(data);
            sk.try_sign_digest(digest)
                .map_err(|e| Error::SignatureEngine(format!("DSA signing failed: {e}")))?
        }};
    }
    let sig: dsa::Signature = match hash {
        HashType::Sha1 => do_sign!(sha1::Sha1),
        HashType::Sha256 => do_sign!(sha2::Sha256),
        HashType::Sha384 => do_sign!(sha2::Sha384),
        HashType::Sha512 => do_sign!(sha2::Sha512),
    };

    let size = dsa_component_len(sk.verifying_key());
    let mut fixed = vec![0u8; 2 * size];
    let r = sig.r().to_bytes_be();
    let s = sig.s().to_bytes_be();
    if r.len() > size || s.len() > size {
        return Err(Error::SignatureEngine("DSA signature component exceeds subgroup size".into()));
    }
    fixed[size - r.len()..size].copy_from_slice(&r);
    fixed[2 * size - s.len()..].copy_from_slice(&s);

    if p1363 {
        Ok(fixed)
    } else {
        convert::p1363_to_asn1(&fixed)
    }
}

fn dsa_verify(
    hash: HashType,
    vk: &dsa::VerifyingKey,
    data: &[u8],
    sig_bytes: &[u8],
    p1363: bool,
) -> Result<bool, Error> {
    use der::Decode;
    use signature::DigestVerifier;

    let der_bytes = if p1363 {
        if sig_bytes.len() != 2 * dsa_component_len(vk) {
            return Err(Error::SignatureEngine(format!(
                "DSA signature must be {} bytes, got {}",
                2 * dsa_component_len(vk),
                sig_bytes.len()
            )));
        }
        convert::p1363_to_asn1(sig_bytes)?
    } else {
        sig_bytes.to_vec()
    };
    // Out-of-range r or s cannot verify
    let Ok(sig) = dsa::Signature::from_der(&der_bytes) else {
        return Ok(false);
    };
    macro_rules! do_verify {
        ($hasher:ty) => {{
            let digest = <$hasher>::new_with_prefix(data);
            Ok(vk.verify_digest(digest, &sig).is_ok())
        }};
    }
    match hash {
        HashType::Sha1 => do_verify!(sha1::Sha1),
        HashType::Sha256 => do_verify!(sha2::Sha256),
        HashType::Sha384 => do_verify!(sha2::Sha384),
        HashType::Sha512 => do_verify!(sha2::Sha512),
    }
}

// ── ECDSA P-256 ──────────────────────────────────────────────────────

fn ecdsa_sign(
    hash: HashType,
    sk: &p256::ecdsa::SigningKey,
    data: &[u8],
    p1363: bool,
) -> Result<Vec<u8>, Error> {
    use signature::hazmat::PrehashSigner;
    let prehash = hash.hash(data);
    let sig: p256::ecdsa::Signature = sk
        .sign_prehash(&prehash)
        .map_err(|e| Error::SignatureEngine(format!("ECDSA signing failed: {e}")))?;
    if p1363 {
        Ok(sig.to_bytes().to_vec())
    } else {
        Ok(sig.to_der().as_bytes().to_vec())
    }
}

fn ecdsa_verify(
    hash: HashType,
    vk: &p256::ecdsa::VerifyingKey,
    data: &[u8],
    sig_bytes: &[u8],
    p1363: bool,
) -> Result<bool, Error> {
    use signature::hazmat::PrehashVerifier;
    let sig = if p1363 {
        if sig_bytes.len() != 2 * P256_FIELD_LEN {
            return Err(Error::SignatureEngine(format!(
                "P-256 signature must be {} bytes, got {}",
                2 * P256_FIELD_LEN,
                sig_bytes.len()
            )));
        }
        p256::ecdsa::Signature::from_slice(sig_bytes)
    } else {
        p256::ecdsa::Signature::from_der(sig_bytes)
    };
    // Zero or out-of-range scalars cannot verify
    let Ok(sig) = sig else {
        return Ok(false);
    };
    let prehash = hash.hash(data);
    Ok(vk.verify_prehash(&prehash, &sig).is_ok())
}

// ── HMAC ─────────────────────────────────────────────────────────────

fn compute_hmac(hash: HashType, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    use hmac::{Hmac, Mac};
    macro_rules! hmac_compute {
        ($hasher:ty) => {{
            let mut mac = <Hmac<$hasher>>::new_from_slice(key)
                .map_err(|_| Error::InvalidKey("unusable HMAC key".into()))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }};
    }
    match hash {
        HashType::Sha1 => hmac_compute!(sha1::Sha1),
        HashType::Sha256 => hmac_compute!(sha2::Sha256),
        HashType::Sha384 => hmac_compute!(sha2::Sha384),
        HashType::Sha512 => hmac_compute!(sha2::Sha512),
    }
}

/// Compare a MAC with a candidate that may be truncated.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if b.len() > a.len() {
        return false;
    }
    a[..b.len()].iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
