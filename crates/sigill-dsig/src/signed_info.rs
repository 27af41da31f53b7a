#![forbid(unsafe_code)]

//! `<SignedInfo>`: the signed part of a signature.
//!
//! The canonical form is always taken from the element as it sits in the
//! owning document, never from a freshly built tree. A `SignedInfo` is
//! therefore bound to its in-document element (after marshalling for
//! signing, or as parsed for verification) before it can be
//! canonicalized, signed or verified.

use crate::reference::Reference;
use crate::signature_method::SignatureMethod;
use sigill_c14n::CanonicalizationMethod;
use sigill_core::{ns, Error, ValidationPolicy};
use sigill_crypto::{EngineProvider, SigningKey};
use sigill_transforms::TransformContext;
use sigill_xml::{ChildCursor, Element, NodePath, XmlDocument};
use std::fmt;
use std::sync::{Arc, OnceLock};

pub struct SignedInfo {
    id: Option<String>,
    canonicalization: Arc<dyn CanonicalizationMethod>,
    signature_method: SignatureMethod,
    references: Vec<Reference>,
    /// The in-document element, detached with its namespace scope.
    element: Option<Element>,
    canonical: OnceLock<Vec<u8>>,
}

impl fmt::Debug for SignedInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedInfo")
            .field("id", &self.id)
            .field("canonicalization", &self.canonicalization.uri())
            .field("signature_method", &self.signature_method)
            .field("references", &self.references)
            .field("bound", &self.element.is_some())
            .finish()
    }
}

impl SignedInfo {
    /// Build a `SignedInfo`. At least one reference is required.
    pub fn new(
        canonicalization: Arc<dyn CanonicalizationMethod>,
        signature_method: SignatureMethod,
        references: Vec<Reference>,
        id: Option<&str>,
    ) -> Result<Self, Error> {
        if references.is_empty() {
            return Err(Error::MissingElement(
                "SignedInfo requires at least one Reference".into(),
            ));
        }
        Ok(Self {
            id: id.map(str::to_owned),
            canonicalization,
            signature_method,
            references,
            element: None,
            canonical: OnceLock::new(),
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn canonicalization(&self) -> &dyn CanonicalizationMethod {
        self.canonicalization.as_ref()
    }

    pub fn signature_method(&self) -> &SignatureMethod {
        &self.signature_method
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn is_bound(&self) -> bool {
        self.element.is_some()
    }

    // ── Marshalling ──────────────────────────────────────────────────

    pub fn to_element(&self) -> Element {
        let mut el = Element::dsig(ns::node::SIGNED_INFO);
        if let Some(id) = &self.id {
            el.set_attribute(ns::attr::ID, id);
        }
        let mut c14n = Element::dsig(ns::node::CANONICALIZATION_METHOD)
            .with_attribute(ns::attr::ALGORITHM, self.canonicalization.uri());
        self.canonicalization.marshal_params(&mut c14n);
        el.push_element(c14n);
        el.push_element(self.signature_method.to_element());
        for reference in &self.references {
            el.push_element(reference.to_element());
        }
        el
    }

    /// Append the marshalled element below `parent` in `document` and bind
    /// to it. Returns the path of the new element.
    pub fn marshal_into(&mut self, document: &mut XmlDocument, parent: &NodePath) -> Result<NodePath, Error> {
        let path = document.root_mut().append_at(parent, self.to_element())?;
        self.bind(document.detach(&path)?);
        Ok(path)
    }

    /// Record the in-document element used for canonicalization, dropping
    /// any cached canonical form.
    pub fn bind(&mut self, element: Element) {
        self.element = Some(element);
        self.canonical = OnceLock::new();
    }

    /// Decode a detached `<SignedInfo>` and bind to it.
    ///
    /// Children must appear as `CanonicalizationMethod`, `SignatureMethod`,
    /// then one or more `Reference`. Under secure validation the signature
    /// algorithm and the reference count are checked while parsing.
    pub fn unmarshal(element: &Element, policy: &ValidationPolicy) -> Result<Self, Error> {
        let id = element.attribute(ns::attr::ID).map(str::to_owned);
        let mut children = ChildCursor::new(element);

        let c14n_el = children.required(ns::DSIG, ns::node::CANONICALIZATION_METHOD)?;
        let c14n_uri = c14n_el
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute("Algorithm on CanonicalizationMethod".into()))?;
        policy.check_algorithm(c14n_uri)?;
        let canonicalization = sigill_c14n::from_element(c14n_el)?.into_shared();

        let method_el = children.required(ns::DSIG, ns::node::SIGNATURE_METHOD)?;
        let signature_method = SignatureMethod::unmarshal(method_el, policy)?;

        let mut references = Vec::new();
        while let Some(reference) = children.optional(ns::DSIG, ns::node::REFERENCE) {
            policy.check_reference_count(references.len() + 1)?;
            references.push(Reference::unmarshal(reference, policy)?);
        }
        if references.is_empty() {
            return Err(Error::MissingElement("Reference".into()));
        }
        children.finish()?;

        tracing::debug!(
            c14n = c14n_uri,
            method = signature_method.uri(),
            references = references.len(),
            "parsed SignedInfo"
        );
        Ok(Self {
            id,
            canonicalization,
            signature_method,
            references,
            element: Some(element.clone()),
            canonical: OnceLock::new(),
        })
    }

    // ── Canonicalize / sign / verify ─────────────────────────────────

    /// Canonical bytes of the bound element, computed once.
    pub fn canonicalize(&self) -> Result<Vec<u8>, Error> {
        if let Some(bytes) = self.canonical.get() {
            return Ok(bytes.clone());
        }
        let element = self.element.as_ref().ok_or_else(|| {
            Error::Canonicalization("SignedInfo is not attached to a document".into())
        })?;
        let bytes = self.canonicalization.canonicalize(element)?;
        tracing::debug!(len = bytes.len(), c14n = self.canonicalization.uri(), "canonicalized SignedInfo");
        Ok(self.canonical.get_or_init(|| bytes).clone())
    }

    /// Digest every reference, storing the digest values.
    pub fn digest_references(&mut self, ctx: &TransformContext<'_>) -> Result<(), Error> {
        for reference in &mut self.references {
            reference.digest(ctx)?;
        }
        self.element = None;
        self.canonical = OnceLock::new();
        Ok(())
    }

    pub fn sign(&self, key: &SigningKey, provider: &dyn EngineProvider) -> Result<Vec<u8>, Error> {
        self.signature_method.sign(key, self, provider)
    }

    pub fn verify(
        &self,
        key: &SigningKey,
        signature: &[u8],
        provider: &dyn EngineProvider,
        policy: &ValidationPolicy,
    ) -> Result<bool, Error> {
        self.signature_method.verify(key, self, signature, provider, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature_method;
    use sigill_c14n::{C14nMethod, C14nMode};
    use sigill_core::algorithm;
    use sigill_crypto::{HashType, RustCryptoProvider};
    use sigill_transforms::TransformPipeline;

    fn reference() -> Reference {
        Reference::new("#d1", HashType::Sha256, TransformPipeline::new())
    }

    fn exclusive() -> Arc<dyn CanonicalizationMethod> {
        C14nMethod::new(C14nMode::Exclusive).into_shared()
    }

    fn rsa_sha256() -> SignatureMethod {
        signature_method::resolve(algorithm::RSA_SHA256).unwrap()
    }

    #[test]
    fn test_zero_references_is_rejected() {
        assert!(matches!(
            SignedInfo::new(exclusive(), rsa_sha256(), Vec::new(), None),
            Err(Error::MissingElement(_))
        ));
    }

    #[test]
    fn test_canonicalize_requires_binding() {
        let mut si = SignedInfo::new(exclusive(), rsa_sha256(), vec![reference()], None).unwrap();
        assert!(matches!(si.canonicalize(), Err(Error::Canonicalization(_))));

        let mut doc = XmlDocument::parse("<root/>").unwrap();
        si.marshal_into(&mut doc, &NodePath::root()).unwrap();
        let first = si.canonicalize().unwrap();
        assert!(first.starts_with(b"<ds:SignedInfo xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">"));
        assert_eq!(si.canonicalize().unwrap(), first);
    }

    #[test]
    fn test_canonical_form_matches_after_reparse() {
        let mut si = SignedInfo::new(
            C14nMethod::new(C14nMode::Inclusive).into_shared(),
            rsa_sha256(),
            vec![reference().with_id("r1")],
            Some("si"),
        )
        .unwrap();
        let mut doc = XmlDocument::parse(r#"<root xmlns="urn:outer" xmlns:o="urn:o"/>"#).unwrap();
        let path = si.marshal_into(&mut doc, &NodePath::root()).unwrap();
        let signed = si.canonicalize().unwrap();

        let reparsed = XmlDocument::parse(&doc.to_xml_string()).unwrap();
        let parsed = SignedInfo::unmarshal(&reparsed.detach(&path).unwrap(), &ValidationPolicy::default())
            .unwrap();
        assert_eq!(parsed.id(), Some("si"));
        assert_eq!(parsed.references().len(), 1);
        assert_eq!(parsed.canonicalize().unwrap(), signed);
    }

    #[test]
    fn test_unmarshal_state_machine() {
        let policy = ValidationPolicy::default();
        let cases = [
            // SignatureMethod before CanonicalizationMethod
            (
                r#"<SignedInfo xmlns="http://www.w3.org/2000/09/xmldsig#">
                    <SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>
                    <CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
                </SignedInfo>"#,
                "XmlStructure",
            ),
            // no Reference
            (
                r#"<SignedInfo xmlns="http://www.w3.org/2000/09/xmldsig#">
                    <CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
                    <SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>
                </SignedInfo>"#,
                "MissingElement",
            ),
            // trailing foreign element
            (
                r#"<SignedInfo xmlns="http://www.w3.org/2000/09/xmldsig#">
                    <CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
                    <SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>
                    <Reference URI=""><DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><DigestValue>AA==</DigestValue></Reference>
                    <Extra/>
                </SignedInfo>"#,
                "XmlStructure",
            ),
            // denied signature algorithm
            (
                r#"<SignedInfo xmlns="http://www.w3.org/2000/09/xmldsig#">
                    <CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
                    <SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-md5"/>
                    <Reference URI=""><DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><DigestValue>AA==</DigestValue></Reference>
                </SignedInfo>"#,
                "PolicyViolation",
            ),
        ];
        for (xml, expected) in cases {
            let doc = XmlDocument::parse(xml).unwrap();
            let err = SignedInfo::unmarshal(doc.root(), &policy).unwrap_err();
            let kind = match err {
                Error::XmlStructure(_) => "XmlStructure",
                Error::MissingElement(_) => "MissingElement",
                Error::PolicyViolation(_) => "PolicyViolation",
                other => panic!("unexpected error {other:?}"),
            };
            assert_eq!(kind, expected, "{xml}");
        }
    }

    #[test]
    fn test_reference_count_is_bounded() {
        let reference = r#"<Reference URI=""><DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><DigestValue>AA==</DigestValue></Reference>"#;
        let xml = format!(
            r#"<SignedInfo xmlns="http://www.w3.org/2000/09/xmldsig#">
                <CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
                <SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>{}</SignedInfo>"#,
            reference.repeat(31)
        );
        let doc = XmlDocument::parse(&xml).unwrap();
        assert!(matches!(
            SignedInfo::unmarshal(doc.root(), &ValidationPolicy::default()),
            Err(Error::PolicyViolation(_))
        ));
        let si = SignedInfo::unmarshal(doc.root(), &ValidationPolicy::permissive()).unwrap();
        assert_eq!(si.references().len(), 31);
    }

    #[test]
    fn test_hmac_sign_and_verify() {
        let method = signature_method::resolve(algorithm::HMAC_SHA256).unwrap();
        let mut si = SignedInfo::new(exclusive(), method, vec![reference()], None).unwrap();
        let mut doc = XmlDocument::parse("<root/>").unwrap();
        si.marshal_into(&mut doc, &NodePath::root()).unwrap();

        let key = SigningKey::Hmac(b"0123456789abcdef0123456789abcdef".to_vec());
        let provider = RustCryptoProvider::new();
        let signature = si.sign(&key, &provider).unwrap();
        assert_eq!(signature.len(), 32);
        let policy = ValidationPolicy::default();
        assert!(si.verify(&key, &signature, &provider, &policy).unwrap());

        let other = SigningKey::Hmac(b"fedcba9876543210fedcba9876543210".to_vec());
        assert!(!si.verify(&other, &signature, &provider, &policy).unwrap());
    }
}
