#![forbid(unsafe_code)]

//! `<Reference>`: a digested pointer to signed data.

use base64::Engine;
use sigill_core::{ns, Error, ValidationPolicy};
use sigill_crypto::HashType;
use sigill_transforms::{TransformContext, TransformPipeline};
use sigill_xml::{ChildCursor, Element};

#[derive(Debug)]
pub struct Reference {
    id: Option<String>,
    uri: Option<String>,
    type_: Option<String>,
    transforms: TransformPipeline,
    digest_method: HashType,
    digest_value: Option<Vec<u8>>,
}

impl Reference {
    pub fn new(uri: &str, digest_method: HashType, transforms: TransformPipeline) -> Self {
        Self {
            id: None,
            uri: Some(uri.to_owned()),
            type_: None,
            transforms,
            digest_method,
            digest_value: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_owned());
        self
    }

    pub fn with_type(mut self, type_: &str) -> Self {
        self.type_ = Some(type_.to_owned());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn type_(&self) -> Option<&str> {
        self.type_.as_deref()
    }

    pub fn transforms(&self) -> &TransformPipeline {
        &self.transforms
    }

    pub fn digest_method(&self) -> HashType {
        self.digest_method
    }

    pub fn digest_value(&self) -> Option<&[u8]> {
        self.digest_value.as_deref()
    }

    /// Dereference, transform and digest the referenced data.
    pub fn compute_digest(&self, ctx: &TransformContext<'_>) -> Result<Vec<u8>, Error> {
        let uri = self
            .uri
            .as_deref()
            .ok_or_else(|| Error::InvalidUri("Reference without URI".into()))?;
        let data = ctx.dereference(uri)?;
        let data = self.transforms.execute(data, ctx)?;
        let octets = data.to_binary()?;
        tracing::debug!(uri, len = octets.len(), digest = self.digest_method.digest_uri(), "digesting reference");
        Ok(self.digest_method.hash(&octets))
    }

    /// Compute and store the digest value.
    pub fn digest(&mut self, ctx: &TransformContext<'_>) -> Result<(), Error> {
        self.digest_value = Some(self.compute_digest(ctx)?);
        Ok(())
    }

    /// Recompute the digest and compare it with the stored value.
    pub fn validate(&self, ctx: &TransformContext<'_>) -> Result<bool, Error> {
        let expected = self
            .digest_value
            .as_deref()
            .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
        let valid = self.compute_digest(ctx)? == expected;
        if !valid {
            tracing::debug!(uri = self.uri.as_deref().unwrap_or(""), "reference digest mismatch");
        }
        Ok(valid)
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::dsig(ns::node::REFERENCE);
        if let Some(id) = &self.id {
            el.set_attribute(ns::attr::ID, id);
        }
        if let Some(uri) = &self.uri {
            el.set_attribute(ns::attr::URI, uri);
        }
        if let Some(t) = &self.type_ {
            el.set_attribute(ns::attr::TYPE, t);
        }
        if !self.transforms.is_empty() {
            el.push_element(self.transforms.to_element());
        }
        el.push_element(
            Element::dsig(ns::node::DIGEST_METHOD)
                .with_attribute(ns::attr::ALGORITHM, self.digest_method.digest_uri()),
        );
        let mut value = Element::dsig(ns::node::DIGEST_VALUE);
        if let Some(digest) = &self.digest_value {
            value.set_text(&base64::engine::general_purpose::STANDARD.encode(digest));
        }
        el.push_element(value);
        el
    }

    /// Decode `<Reference>`: `Transforms?`, `DigestMethod`, `DigestValue`.
    pub fn unmarshal(element: &Element, policy: &ValidationPolicy) -> Result<Self, Error> {
        let mut children = ChildCursor::new(element);

        let transforms = match children.optional(ns::DSIG, ns::node::TRANSFORMS) {
            Some(el) => TransformPipeline::from_element(el, policy)?,
            None => TransformPipeline::new(),
        };

        let method = children.required(ns::DSIG, ns::node::DIGEST_METHOD)?;
        let digest_uri = method
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute("Algorithm on DigestMethod".into()))?;
        policy.check_algorithm(digest_uri)?;
        let digest_method = HashType::from_digest_uri(digest_uri)?;

        let value = children.required(ns::DSIG, ns::node::DIGEST_VALUE)?.text();
        let clean: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let digest_value = base64::engine::general_purpose::STANDARD
            .decode(&clean)
            .map_err(|e| Error::MalformedData(format!("DigestValue: {e}")))?;
        children.finish()?;

        Ok(Self {
            id: element.attribute(ns::attr::ID).map(str::to_owned),
            uri: element.attribute(ns::attr::URI).map(str::to_owned),
            type_: element.attribute(ns::attr::TYPE).map(str::to_owned),
            transforms,
            digest_method,
            digest_value: Some(digest_value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigill_transforms::DefaultDereferencer;
    use sigill_xml::XmlDocument;

    const DOC: &str = r#"<root><data Id="d1">hello</data></root>"#;

    #[test]
    fn test_digest_then_validate() {
        let doc = XmlDocument::parse(DOC).unwrap();
        let policy = ValidationPolicy::default();
        let ctx = TransformContext::new(&policy, &DefaultDereferencer).with_document(&doc);

        let mut reference = Reference::new("#d1", HashType::Sha256, TransformPipeline::new());
        reference.digest(&ctx).unwrap();
        assert_eq!(
            reference.digest_value().unwrap(),
            HashType::Sha256.hash(br#"<data Id="d1">hello</data>"#).as_slice()
        );
        assert!(reference.validate(&ctx).unwrap());

        let tampered = XmlDocument::parse(r#"<root><data Id="d1">hellO</data></root>"#).unwrap();
        let ctx = TransformContext::new(&policy, &DefaultDereferencer).with_document(&tampered);
        assert!(!reference.validate(&ctx).unwrap());
    }

    #[test]
    fn test_marshal_round_trip() {
        let doc = XmlDocument::parse(DOC).unwrap();
        let policy = ValidationPolicy::default();
        let ctx = TransformContext::new(&policy, &DefaultDereferencer).with_document(&doc);
        let mut reference = Reference::new("#d1", HashType::Sha1, TransformPipeline::new())
            .with_id("r1")
            .with_type("urn:type");
        reference.digest(&ctx).unwrap();

        let xml = sigill_xml::writer::to_xml(&reference.to_element());
        let parsed = XmlDocument::parse(&xml).unwrap();
        let back = Reference::unmarshal(parsed.root(), &policy).unwrap();
        assert_eq!(back.id(), Some("r1"));
        assert_eq!(back.uri(), Some("#d1"));
        assert_eq!(back.type_(), Some("urn:type"));
        assert_eq!(back.digest_method(), HashType::Sha1);
        assert_eq!(back.digest_value(), reference.digest_value());
    }

    #[test]
    fn test_child_order_is_enforced() {
        let xml = r#"<Reference xmlns="http://www.w3.org/2000/09/xmldsig#" URI="">
            <DigestValue>AA==</DigestValue>
            <DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
        </Reference>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        assert!(matches!(
            Reference::unmarshal(doc.root(), &ValidationPolicy::default()),
            Err(Error::XmlStructure(_))
        ));
    }

    #[test]
    fn test_denied_digest_is_a_policy_violation() {
        let xml = r#"<Reference xmlns="http://www.w3.org/2000/09/xmldsig#" URI="">
            <DigestMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#md5"/>
            <DigestValue>AA==</DigestValue>
        </Reference>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        assert!(matches!(
            Reference::unmarshal(doc.root(), &ValidationPolicy::default()),
            Err(Error::PolicyViolation(_))
        ));
        assert!(matches!(
            Reference::unmarshal(doc.root(), &ValidationPolicy::permissive()),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}
