#![forbid(unsafe_code)]

//! `<SignatureMethod>`: the algorithm registry and signature formatting.
//!
//! Each algorithm URI maps to an engine identifier. DSA and ECDSA methods
//! first ask the provider for an engine that speaks the fixed-width
//! `r || s` layout XML-DSig uses; a provider without one is asked for the
//! plain DER engine instead and signatures are converted in both
//! directions. Which of the two is in use is decided once per instance.

use crate::signed_info::SignedInfo;
use sigill_core::{algorithm, ns, Error, ValidationPolicy};
use sigill_crypto::convert;
use sigill_crypto::{EngineProvider, HashType, SignatureEngine, SignatureFamily, SigningKey};
use sigill_xml::{ChildCursor, Element};
use std::fmt;
use std::sync::Mutex;

/// Static description of one signature algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureMethodDescriptor {
    pub uri: &'static str,
    pub engine_id: &'static str,
    /// DER engine tried when `engine_id` is not offered.
    pub fallback_engine_id: Option<&'static str>,
    pub family: SignatureFamily,
    pub hash: HashType,
}

const fn method(
    uri: &'static str,
    engine_id: &'static str,
    fallback_engine_id: Option<&'static str>,
    family: SignatureFamily,
    hash: HashType,
) -> SignatureMethodDescriptor {
    SignatureMethodDescriptor {
        uri,
        engine_id,
        fallback_engine_id,
        family,
        hash,
    }
}

const REGISTRY: &[SignatureMethodDescriptor] = &[
    method(algorithm::RSA_SHA1, "SHA1withRSA", None, SignatureFamily::Rsa, HashType::Sha1),
    method(algorithm::RSA_SHA256, "SHA256withRSA", None, SignatureFamily::Rsa, HashType::Sha256),
    method(algorithm::RSA_SHA384, "SHA384withRSA", None, SignatureFamily::Rsa, HashType::Sha384),
    method(algorithm::RSA_SHA512, "SHA512withRSA", None, SignatureFamily::Rsa, HashType::Sha512),
    method(
        algorithm::DSA_SHA1,
        "SHA1withDSAinP1363Format",
        Some("SHA1withDSA"),
        SignatureFamily::Dsa,
        HashType::Sha1,
    ),
    method(
        algorithm::DSA_SHA256,
        "SHA256withDSAinP1363Format",
        Some("SHA256withDSA"),
        SignatureFamily::Dsa,
        HashType::Sha256,
    ),
    method(
        algorithm::ECDSA_SHA1,
        "SHA1withECDSAinP1363Format",
        Some("SHA1withECDSA"),
        SignatureFamily::Ecdsa,
        HashType::Sha1,
    ),
    method(
        algorithm::ECDSA_SHA256,
        "SHA256withECDSAinP1363Format",
        Some("SHA256withECDSA"),
        SignatureFamily::Ecdsa,
        HashType::Sha256,
    ),
    method(
        algorithm::ECDSA_SHA384,
        "SHA384withECDSAinP1363Format",
        Some("SHA384withECDSA"),
        SignatureFamily::Ecdsa,
        HashType::Sha384,
    ),
    method(
        algorithm::ECDSA_SHA512,
        "SHA512withECDSAinP1363Format",
        Some("SHA512withECDSA"),
        SignatureFamily::Ecdsa,
        HashType::Sha512,
    ),
    method(algorithm::HMAC_SHA1, "HmacSHA1", None, SignatureFamily::Hmac, HashType::Sha1),
    method(algorithm::HMAC_SHA256, "HmacSHA256", None, SignatureFamily::Hmac, HashType::Sha256),
    method(algorithm::HMAC_SHA384, "HmacSHA384", None, SignatureFamily::Hmac, HashType::Sha384),
    method(algorithm::HMAC_SHA512, "HmacSHA512", None, SignatureFamily::Hmac, HashType::Sha512),
];

/// Look up the descriptor for `uri`.
pub fn descriptor(uri: &str) -> Result<&'static SignatureMethodDescriptor, Error> {
    REGISTRY
        .iter()
        .find(|d| d.uri == uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("signature method {uri}")))
}

/// A signature method instance.
pub fn resolve(uri: &str) -> Result<SignatureMethod, Error> {
    descriptor(uri).map(SignatureMethod::new)
}

struct EngineHandle {
    engine: Box<dyn SignatureEngine>,
    using_fallback: bool,
}

pub struct SignatureMethod {
    descriptor: &'static SignatureMethodDescriptor,
    hmac_output_length: Option<u32>,
    engine: Mutex<Option<EngineHandle>>,
}

impl fmt::Debug for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureMethod")
            .field("uri", &self.descriptor.uri)
            .field("hmac_output_length", &self.hmac_output_length)
            .field(
                "using_fallback",
                &self
                    .engine
                    .try_lock()
                    .ok()
                    .and_then(|guard| guard.as_ref().map(|h| h.using_fallback)),
            )
            .finish()
    }
}

impl PartialEq for SignatureMethod {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor && self.hmac_output_length == other.hmac_output_length
    }
}

impl SignatureMethod {
    pub fn new(descriptor: &'static SignatureMethodDescriptor) -> Self {
        Self {
            descriptor,
            hmac_output_length: None,
            engine: Mutex::new(None),
        }
    }

    /// Truncate HMAC output to `bits`. Ignored by other families.
    pub fn with_hmac_output_length(mut self, bits: u32) -> Self {
        self.hmac_output_length = Some(bits);
        self
    }

    pub fn uri(&self) -> &'static str {
        self.descriptor.uri
    }

    pub fn descriptor(&self) -> &'static SignatureMethodDescriptor {
        self.descriptor
    }

    pub fn family(&self) -> SignatureFamily {
        self.descriptor.family
    }

    pub fn hmac_output_length(&self) -> Option<u32> {
        self.hmac_output_length
    }

    /// Whether the DER fallback engine is in use. `None` until an engine
    /// has been acquired.
    pub fn using_fallback(&self) -> Option<bool> {
        self.engine
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| h.using_fallback))
    }

    // ── Marshalling ──────────────────────────────────────────────────

    pub fn to_element(&self) -> Element {
        let mut el = Element::dsig(ns::node::SIGNATURE_METHOD).with_attribute(ns::attr::ALGORITHM, self.uri());
        if let Some(bits) = self.hmac_output_length {
            el.push_element(Element::dsig(ns::node::HMAC_OUTPUT_LENGTH).with_text(&bits.to_string()));
        }
        el
    }

    /// Decode `<SignatureMethod>`. The algorithm deny-list and the HMAC
    /// output length floor are enforced here.
    pub fn unmarshal(element: &Element, policy: &ValidationPolicy) -> Result<Self, Error> {
        let uri = element
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute("Algorithm on SignatureMethod".into()))?;
        policy.check_algorithm(uri)?;
        let mut method = resolve(uri)?;

        let mut children = ChildCursor::new(element);
        if method.family() == SignatureFamily::Hmac {
            if let Some(el) = children.optional(ns::DSIG, ns::node::HMAC_OUTPUT_LENGTH) {
                let text = el.text();
                let bits: u32 = text.trim().parse().map_err(|_| {
                    Error::MalformedData(format!("HMACOutputLength {text:?} is not a number"))
                })?;
                policy.check_hmac_output_length(bits)?;
                method.hmac_output_length = Some(bits);
            }
        }
        children.finish()?;
        Ok(method)
    }

    // ── Engine ───────────────────────────────────────────────────────

    fn acquire(&self, provider: &dyn EngineProvider) -> Result<EngineHandle, Error> {
        let d = self.descriptor;
        match provider.engine(d.engine_id) {
            Ok(engine) => {
                tracing::debug!(engine = d.engine_id, "acquired signature engine");
                Ok(EngineHandle {
                    engine,
                    using_fallback: false,
                })
            }
            Err(Error::UnsupportedAlgorithm(reason)) => {
                let Some(fallback) = d.fallback_engine_id else {
                    return Err(Error::UnsupportedAlgorithm(reason));
                };
                tracing::debug!(
                    engine = d.engine_id,
                    fallback,
                    "fixed-width engine unavailable, converting signatures"
                );
                Ok(EngineHandle {
                    engine: provider.engine(fallback)?,
                    using_fallback: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Run `f` with this instance's engine, acquiring it on first use.
    fn with_engine<T>(
        &self,
        provider: &dyn EngineProvider,
        f: impl FnOnce(&mut EngineHandle) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut guard = self
            .engine
            .lock()
            .map_err(|_| Error::SignatureEngine("signature engine lock poisoned".into()))?;
        let handle = match &mut *guard {
            Some(handle) => handle,
            slot => slot.insert(self.acquire(provider)?),
        };
        f(handle)
    }

    fn component_len(key: &SigningKey) -> Result<usize, Error> {
        key.public_key()
            .and_then(|pk| pk.signature_component_len())
            .ok_or_else(|| Error::InvalidKey(format!("{key:?} has no DSA/ECDSA parameters")))
    }

    fn hmac_len(&self) -> usize {
        match self.hmac_output_length {
            Some(bits) => (bits as usize).div_ceil(8),
            None => self.descriptor.hash.output_len(),
        }
    }

    // ── Sign / verify ────────────────────────────────────────────────

    /// Sign raw bytes, returning the signature in XML-DSig layout.
    pub fn sign_bytes(
        &self,
        key: &SigningKey,
        data: &[u8],
        provider: &dyn EngineProvider,
    ) -> Result<Vec<u8>, Error> {
        let family = self.family();
        self.with_engine(provider, |handle| {
            handle.engine.init_sign(key)?;
            handle.engine.update(data)?;
            let mut raw = handle.engine.sign()?;
            match family {
                SignatureFamily::Rsa => Ok(raw),
                SignatureFamily::Hmac => {
                    raw.truncate(self.hmac_len());
                    Ok(raw)
                }
                SignatureFamily::Dsa | SignatureFamily::Ecdsa => {
                    if handle.using_fallback {
                        convert::asn1_to_p1363(&raw, Self::component_len(key)?)
                    } else {
                        Ok(raw)
                    }
                }
            }
        })
    }

    /// Verify an XML-DSig layout signature over raw bytes.
    ///
    /// Under secure validation, RSA and DSA keys below the policy floor are
    /// refused before any cryptography runs.
    pub fn verify_bytes(
        &self,
        key: &SigningKey,
        data: &[u8],
        signature: &[u8],
        provider: &dyn EngineProvider,
        policy: &ValidationPolicy,
    ) -> Result<bool, Error> {
        policy.check_algorithm(self.uri())?;
        match (self.family(), key.public_key()) {
            (SignatureFamily::Rsa, Some(pk)) => policy.check_rsa_key_size(pk.key_bits())?,
            (SignatureFamily::Dsa, Some(pk)) => policy.check_dsa_key_size(pk.key_bits())?,
            (SignatureFamily::Hmac, _) => {
                if let Some(bits) = self.hmac_output_length {
                    policy.check_hmac_output_length(bits)?;
                }
                if signature.len() != self.hmac_len() {
                    return Ok(false);
                }
            }
            _ => {}
        }

        let family = self.family();
        self.with_engine(provider, |handle| {
            let signature = match family {
                SignatureFamily::Dsa | SignatureFamily::Ecdsa => {
                    let size = Self::component_len(key)?;
                    if signature.len() != 2 * size {
                        return Err(Error::FormatConversion(format!(
                            "signature value is {} bytes, expected {}",
                            signature.len(),
                            2 * size
                        )));
                    }
                    if handle.using_fallback {
                        convert::p1363_to_asn1(signature)?
                    } else {
                        signature.to_vec()
                    }
                }
                SignatureFamily::Rsa | SignatureFamily::Hmac => signature.to_vec(),
            };
            handle.engine.init_verify(key)?;
            handle.engine.update(data)?;
            handle.engine.verify(&signature)
        })
    }

    /// Sign the canonical form of `signed_info`.
    pub fn sign(
        &self,
        key: &SigningKey,
        signed_info: &SignedInfo,
        provider: &dyn EngineProvider,
    ) -> Result<Vec<u8>, Error> {
        let canonical = signed_info.canonicalize()?;
        self.sign_bytes(key, &canonical, provider)
    }

    /// Verify `signature` over the canonical form of `signed_info`.
    pub fn verify(
        &self,
        key: &SigningKey,
        signed_info: &SignedInfo,
        signature: &[u8],
        provider: &dyn EngineProvider,
        policy: &ValidationPolicy,
    ) -> Result<bool, Error> {
        let canonical = signed_info.canonicalize()?;
        self.verify_bytes(key, &canonical, signature, provider, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigill_crypto::RustCryptoProvider;
    use sigill_xml::XmlDocument;

    fn ec_key() -> SigningKey {
        SigningKey::EcP256(p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng))
    }

    #[test]
    fn test_registry() {
        for uri in [
            algorithm::RSA_SHA1,
            algorithm::RSA_SHA512,
            algorithm::DSA_SHA256,
            algorithm::ECDSA_SHA384,
            algorithm::HMAC_SHA256,
        ] {
            assert_eq!(resolve(uri).unwrap().uri(), uri);
        }
        assert!(matches!(resolve(algorithm::RSA_MD5), Err(Error::UnsupportedAlgorithm(_))));
        assert!(matches!(
            resolve("http://example.com/unknown"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_native_and_fallback_produce_the_same_layout() {
        let key = ec_key();
        let public: SigningKey = key.public_key().unwrap().into();

        let native = resolve(algorithm::ECDSA_SHA256).unwrap();
        let provider = RustCryptoProvider::new();
        let sig = native.sign_bytes(&key, b"data", &provider).unwrap();
        assert_eq!(native.using_fallback(), Some(false));
        assert_eq!(sig.len(), 64);

        let fallback = resolve(algorithm::ECDSA_SHA256).unwrap();
        let der_only = RustCryptoProvider::der_only();
        assert_eq!(fallback.using_fallback(), None);
        let sig2 = fallback.sign_bytes(&key, b"data", &der_only).unwrap();
        assert_eq!(fallback.using_fallback(), Some(true));
        assert_eq!(sig2.len(), 64);

        let policy = ValidationPolicy::default();
        assert!(fallback.verify_bytes(&public, b"data", &sig, &der_only, &policy).unwrap());
        assert!(native.verify_bytes(&public, b"data", &sig2, &provider, &policy).unwrap());
        assert!(!native.verify_bytes(&public, b"other", &sig2, &provider, &policy).unwrap());
    }

    #[test]
    fn test_fallback_decision_is_remembered() {
        let key = ec_key();
        let method = resolve(algorithm::ECDSA_SHA256).unwrap();
        method.sign_bytes(&key, b"x", &RustCryptoProvider::der_only()).unwrap();
        // A later call with a capable provider keeps the engine it has.
        method.sign_bytes(&key, b"x", &RustCryptoProvider::new()).unwrap();
        assert_eq!(method.using_fallback(), Some(true));
    }

    #[test]
    fn test_wrong_length_is_a_conversion_error() {
        let key = ec_key();
        let public: SigningKey = key.public_key().unwrap().into();
        let method = resolve(algorithm::ECDSA_SHA256).unwrap();
        let err = method
            .verify_bytes(&public, b"x", &[1u8; 63], &RustCryptoProvider::new(), &ValidationPolicy::default())
            .unwrap_err();
        assert!(matches!(err, Error::FormatConversion(_)));
    }

    #[test]
    fn test_key_family_mismatch() {
        let method = resolve(algorithm::RSA_SHA256).unwrap();
        let err = method
            .sign_bytes(&ec_key(), b"x", &RustCryptoProvider::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn test_small_rsa_key_is_refused_under_secure_validation() {
        let sk = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 512).unwrap();
        let key = SigningKey::Rsa(sk);
        let method = resolve(algorithm::RSA_SHA256).unwrap();
        let provider = RustCryptoProvider::new();
        let sig = method.sign_bytes(&key, b"x", &provider).unwrap();

        let err = method
            .verify_bytes(&key, b"x", &sig, &provider, &ValidationPolicy::default())
            .unwrap_err();
        assert!(err.is_policy_violation());
        assert!(method
            .verify_bytes(&key, b"x", &sig, &provider, &ValidationPolicy::permissive())
            .unwrap());
    }

    #[test]
    fn test_hmac_output_length() {
        let key = SigningKey::Hmac(b"secret".to_vec());
        let provider = RustCryptoProvider::new();
        let policy = ValidationPolicy::default();

        let method = resolve(algorithm::HMAC_SHA256).unwrap().with_hmac_output_length(128);
        let sig = method.sign_bytes(&key, b"x", &provider).unwrap();
        assert_eq!(sig.len(), 16);
        assert!(method.verify_bytes(&key, b"x", &sig, &provider, &policy).unwrap());

        // A truncated MAC is only accepted when the method says so.
        let full = resolve(algorithm::HMAC_SHA256).unwrap();
        assert!(!full.verify_bytes(&key, b"x", &sig, &provider, &policy).unwrap());
        assert!(!full.verify_bytes(&key, b"x", &[], &provider, &policy).unwrap());
    }

    #[test]
    fn test_unmarshal_hmac_output_length_policy() {
        let xml = r#"<SignatureMethod xmlns="http://www.w3.org/2000/09/xmldsig#"
            Algorithm="http://www.w3.org/2000/09/xmldsig#hmac-sha1"><HMACOutputLength>40</HMACOutputLength></SignatureMethod>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        assert!(matches!(
            SignatureMethod::unmarshal(doc.root(), &ValidationPolicy::default()),
            Err(Error::PolicyViolation(_))
        ));
        let method = SignatureMethod::unmarshal(doc.root(), &ValidationPolicy::permissive()).unwrap();
        assert_eq!(method.hmac_output_length(), Some(40));

        let reparsed = XmlDocument::parse(&sigill_xml::writer::to_xml(&method.to_element())).unwrap();
        let back = SignatureMethod::unmarshal(reparsed.root(), &ValidationPolicy::permissive()).unwrap();
        assert_eq!(back, method);
    }

    #[test]
    fn test_unmarshal_denied_algorithm() {
        let xml = r#"<SignatureMethod xmlns="http://www.w3.org/2000/09/xmldsig#"
            Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-md5"/>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        assert!(matches!(
            SignatureMethod::unmarshal(doc.root(), &ValidationPolicy::default()),
            Err(Error::PolicyViolation(_))
        ));
    }
}
