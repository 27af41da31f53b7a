#![forbid(unsafe_code)]

//! The `<Signature>` element: creation of enveloped signatures and
//! validation of existing ones.

use crate::context::DsigContext;
use crate::signed_info::SignedInfo;
use base64::Engine;
use sigill_core::{ns, Error};
use sigill_crypto::SigningKey;
use sigill_keys::KeyInfo;
use sigill_xml::{ChildCursor, Element, NodePath, XmlDocument};
use std::fmt;

/// Outcome of validating a signature whose structure was sound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// SignatureValue and every reference digest matched.
    Valid,
    /// The SignatureValue does not match SignedInfo.
    InvalidSignature,
    /// The digest of reference `index` does not match.
    InvalidReference { index: usize, uri: Option<String> },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::InvalidSignature => write!(f, "signature value mismatch"),
            Self::InvalidReference { index, uri } => write!(
                f,
                "digest mismatch in reference {index} ({})",
                uri.as_deref().unwrap_or("no URI")
            ),
        }
    }
}

#[derive(Debug)]
pub struct XmlSignature {
    id: Option<String>,
    signed_info: SignedInfo,
    signature_value: Option<Vec<u8>>,
    key_info: Option<KeyInfo>,
    /// Where the `<Signature>` sits in its document once signed or parsed.
    location: Option<NodePath>,
}

impl XmlSignature {
    pub fn new(signed_info: SignedInfo, key_info: Option<KeyInfo>, id: Option<&str>) -> Self {
        Self {
            id: id.map(str::to_owned),
            signed_info,
            signature_value: None,
            key_info,
            location: None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn signed_info(&self) -> &SignedInfo {
        &self.signed_info
    }

    pub fn signature_value(&self) -> Option<&[u8]> {
        self.signature_value.as_deref()
    }

    pub fn key_info(&self) -> Option<&KeyInfo> {
        self.key_info.as_ref()
    }

    pub fn location(&self) -> Option<&NodePath> {
        self.location.as_ref()
    }

    /// Path of the first `<ds:Signature>` in `document`.
    pub fn find(document: &XmlDocument) -> Option<NodePath> {
        document
            .find_element(ns::DSIG, ns::node::SIGNATURE)
            .map(|(path, _)| path)
    }

    // ── Signing ──────────────────────────────────────────────────────

    /// Sign `document` with an enveloped signature appended to its root
    /// element. Returns the path of the new `<Signature>`.
    ///
    /// The signature is assembled on a copy of the document; on error
    /// `document` is left exactly as it was.
    pub fn sign_enveloped(
        &mut self,
        document: &mut XmlDocument,
        key: &SigningKey,
        ctx: &DsigContext,
    ) -> Result<NodePath, Error> {
        if !key.can_sign() {
            return Err(Error::InvalidKey(format!("{key:?} cannot sign")));
        }

        let mut working = document.clone();
        let (path, value) = self.assemble(&mut working, key, ctx)?;
        *document = working;

        self.signature_value = Some(value);
        self.location = Some(path.clone());
        Ok(path)
    }

    fn assemble(
        &mut self,
        document: &mut XmlDocument,
        key: &SigningKey,
        ctx: &DsigContext,
    ) -> Result<(NodePath, Vec<u8>), Error> {
        let mut shell = Element::dsig(ns::node::SIGNATURE);
        shell.declare_namespace(Some(ns::DSIG_PREFIX), ns::DSIG);
        if let Some(id) = &self.id {
            shell.set_attribute(ns::attr::ID, id);
        }
        let path = document.root_mut().append_at(&NodePath::root(), shell)?;

        {
            let tc = ctx.transform_context(document, &path);
            self.signed_info.digest_references(&tc)?;
        }
        self.signed_info.marshal_into(document, &path)?;
        let value = self.signed_info.sign(key, ctx.provider())?;
        tracing::debug!(method = self.signed_info.signature_method().uri(), "signed SignedInfo");

        let encoded = base64::engine::general_purpose::STANDARD.encode(&value);
        document
            .root_mut()
            .append_at(&path, Element::dsig(ns::node::SIGNATURE_VALUE).with_text(&encoded))?;
        if let Some(key_info) = &self.key_info {
            document.root_mut().append_at(&path, key_info.to_element()?)?;
        }
        Ok((path, value))
    }

    // ── Parsing ──────────────────────────────────────────────────────

    /// Parse the `<Signature>` at `path` in `document`.
    ///
    /// Children must be `SignedInfo`, `SignatureValue`, an optional
    /// `KeyInfo` and any number of `Object` elements, in that order.
    pub fn unmarshal(document: &XmlDocument, path: &NodePath, ctx: &DsigContext) -> Result<Self, Error> {
        let element = document
            .get(path)
            .ok_or_else(|| Error::XmlStructure("signature path does not resolve".into()))?;
        if !element.is(ns::DSIG, ns::node::SIGNATURE) {
            return Err(Error::XmlStructure(format!(
                "expected ds:Signature, found {}",
                element.qualified_name()
            )));
        }

        let (signed_info_index, _) = element
            .indexed_child_elements()
            .next()
            .ok_or_else(|| Error::MissingElement(ns::node::SIGNED_INFO.into()))?;
        let mut children = ChildCursor::new(element);
        children.required(ns::DSIG, ns::node::SIGNED_INFO)?;
        let signed_info = SignedInfo::unmarshal(
            &document.detach(&path.child(signed_info_index))?,
            &ctx.policy,
        )?;

        let value_text = children.required(ns::DSIG, ns::node::SIGNATURE_VALUE)?.text();
        let clean: String = value_text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let signature_value = base64::engine::general_purpose::STANDARD
            .decode(&clean)
            .map_err(|e| Error::MalformedData(format!("SignatureValue: {e}")))?;

        let key_info = children
            .optional(ns::DSIG, ns::node::KEY_INFO)
            .map(|el| KeyInfo::unmarshal(el, &ctx.policy))
            .transpose()?;
        while children.optional(ns::DSIG, ns::node::OBJECT).is_some() {}
        children.finish()?;

        Ok(Self {
            id: element.attribute(ns::attr::ID).map(str::to_owned),
            signed_info,
            signature_value: Some(signature_value),
            key_info,
            location: Some(path.clone()),
        })
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Validate with a caller-supplied key: the SignatureValue first, then
    /// every reference in order.
    pub fn validate(
        &self,
        key: &SigningKey,
        document: &XmlDocument,
        ctx: &DsigContext,
    ) -> Result<ValidationResult, Error> {
        let location = self
            .location
            .as_ref()
            .ok_or_else(|| Error::XmlStructure("signature is not attached to a document".into()))?;
        let value = self
            .signature_value
            .as_deref()
            .ok_or_else(|| Error::MissingElement(ns::node::SIGNATURE_VALUE.into()))?;

        if !self.signed_info.verify(key, value, ctx.provider(), &ctx.policy)? {
            tracing::info!("signature value does not match");
            return Ok(ValidationResult::InvalidSignature);
        }

        let tc = ctx.transform_context(document, location);
        for (index, reference) in self.signed_info.references().iter().enumerate() {
            if !reference.validate(&tc)? {
                tracing::info!(index, uri = reference.uri().unwrap_or(""), "reference digest does not match");
                return Ok(ValidationResult::InvalidReference {
                    index,
                    uri: reference.uri().map(str::to_owned),
                });
            }
        }
        Ok(ValidationResult::Valid)
    }

    /// Resolve the verification key from `<KeyInfo>`.
    pub fn resolve_key(&self, document: &XmlDocument, ctx: &DsigContext) -> Result<SigningKey, Error> {
        let key_info = self
            .key_info
            .as_ref()
            .ok_or_else(|| Error::MissingElement(ns::node::KEY_INFO.into()))?;
        let location = self.location.clone().unwrap_or_default();
        let tc = ctx.transform_context(document, &location);
        key_info.resolve_public_key(&tc).map(SigningKey::from)
    }

    /// Validate with the key carried in `<KeyInfo>`.
    pub fn validate_with_key_info(
        &self,
        document: &XmlDocument,
        ctx: &DsigContext,
    ) -> Result<ValidationResult, Error> {
        let key = self.resolve_key(document, ctx)?;
        self.validate(&key, document, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;
    use crate::signature_method;
    use sigill_c14n::{C14nMethod, C14nMode};
    use sigill_core::algorithm;
    use sigill_crypto::HashType;
    use sigill_keys::{KeyInfoContent, KeyInfoFactory};
    use sigill_transforms::enveloped::EnvelopedSignatureTransform;
    use sigill_transforms::TransformPipeline;

    const DOC: &str = r#"<invoice xmlns="urn:example:invoice"><total>42</total></invoice>"#;

    fn enveloped_signature(key_info: Option<KeyInfo>) -> XmlSignature {
        let reference = Reference::new(
            "",
            HashType::Sha256,
            TransformPipeline::new()
                .with(Box::new(EnvelopedSignatureTransform))
                .with(Box::new(sigill_transforms::C14nTransform::new(C14nMethod::new(
                    C14nMode::Exclusive,
                )))),
        );
        let signed_info = SignedInfo::new(
            C14nMethod::new(C14nMode::Exclusive).into_shared(),
            signature_method::resolve(algorithm::ECDSA_SHA256).unwrap(),
            vec![reference],
            None,
        )
        .unwrap();
        XmlSignature::new(signed_info, key_info, Some("sig"))
    }

    #[test]
    fn test_sign_then_validate_in_place() {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let key = SigningKey::EcP256(sk);
        let public = key.public_key().unwrap();
        let factory = KeyInfoFactory::new();
        let key_info = factory
            .new_key_info(
                vec![KeyInfoContent::KeyValue(factory.new_key_value(&public).unwrap())],
                None,
            )
            .unwrap();

        let ctx = DsigContext::new();
        let mut doc = XmlDocument::parse(DOC).unwrap();
        let mut signature = enveloped_signature(Some(key_info));
        let path = signature.sign_enveloped(&mut doc, &key, &ctx).unwrap();
        assert_eq!(signature.signature_value().unwrap().len(), 64);

        let parsed = XmlSignature::unmarshal(&doc, &path, &ctx).unwrap();
        assert_eq!(parsed.id(), Some("sig"));
        assert_eq!(
            parsed.validate(&SigningKey::from(public), &doc, &ctx).unwrap(),
            ValidationResult::Valid
        );
        assert!(parsed.validate_with_key_info(&doc, &ctx).unwrap().is_valid());
    }

    #[test]
    fn test_unmarshal_rejects_misordered_children() {
        let xml = r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
            <ds:SignatureValue>AA==</ds:SignatureValue>
            <ds:SignedInfo/>
        </ds:Signature>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        assert!(matches!(
            XmlSignature::unmarshal(&doc, &NodePath::root(), &DsigContext::new()),
            Err(Error::XmlStructure(_))
        ));
    }

    #[test]
    fn test_unmarshal_requires_signature_element() {
        let doc = XmlDocument::parse(DOC).unwrap();
        assert!(matches!(
            XmlSignature::unmarshal(&doc, &NodePath::root(), &DsigContext::new()),
            Err(Error::XmlStructure(_))
        ));
        assert!(XmlSignature::find(&doc).is_none());
    }

    #[test]
    fn test_failed_signing_leaves_document_untouched() {
        let reference = Reference::new(
            "",
            HashType::Sha256,
            TransformPipeline::new().with(Box::new(EnvelopedSignatureTransform)),
        );
        let signed_info = SignedInfo::new(
            C14nMethod::new(C14nMode::Exclusive).into_shared(),
            signature_method::resolve(algorithm::RSA_SHA256).unwrap(),
            vec![reference],
            None,
        )
        .unwrap();
        let mut signature = XmlSignature::new(signed_info, None, None);

        let ctx = DsigContext::new();
        let mut doc = XmlDocument::parse(DOC).unwrap();
        let before = doc.clone();
        let key = SigningKey::EcP256(p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng));
        assert!(matches!(
            signature.sign_enveloped(&mut doc, &key, &ctx),
            Err(Error::InvalidKey(_))
        ));
        assert_eq!(doc, before);
        assert!(XmlSignature::find(&doc).is_none());
        assert!(signature.signature_value().is_none());
        assert!(signature.location().is_none());
    }

    #[test]
    fn test_validate_requires_location() {
        let signature = enveloped_signature(None);
        let doc = XmlDocument::parse(DOC).unwrap();
        let key = SigningKey::EcP256(p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng));
        assert!(signature.validate(&key, &doc, &DsigContext::new()).is_err());
    }
}
