#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Removes the `<Signature>` element being processed (recorded in the
//! [`TransformContext`]) from the XML data.

use crate::pipeline::{Transform, TransformData};
use crate::uri::TransformContext;
use sigill_core::{algorithm, Error};

/// The enveloped signature transform.
#[derive(Debug)]
pub struct EnvelopedSignatureTransform;

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, input: TransformData, ctx: &TransformContext<'_>) -> Result<TransformData, Error> {
        let TransformData::Xml { mut element, location } = input else {
            return Err(Error::Transform(
                "enveloped-signature transform requires XML input".into(),
            ));
        };
        let signature = ctx.signature_location.ok_or_else(|| {
            Error::Transform("enveloped-signature transform used outside a signature".into())
        })?;

        // Data that does not contain the signature passes through unchanged
        if let Some(relative) = location.as_ref().and_then(|loc| signature.strip_prefix(loc)) {
            if relative.is_root() {
                return Err(Error::Transform(
                    "enveloped-signature transform would remove the whole input".into(),
                ));
            }
            element.remove_at(&relative);
        }
        Ok(TransformData::Xml { element, location })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::DefaultDereferencer;
    use sigill_core::{ns, ValidationPolicy};
    use sigill_xml::{NodePath, XmlDocument};

    #[test]
    fn test_removes_signature_subtree() {
        let doc = XmlDocument::parse(
            r#"<doc><item>1</item><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"/></doc>"#,
        )
        .unwrap();
        let (sig_path, _) = doc.find_element(ns::DSIG, ns::node::SIGNATURE).unwrap();
        let policy = ValidationPolicy::default();
        let deref = DefaultDereferencer;
        let ctx = TransformContext::new(&policy, &deref)
            .with_document(&doc)
            .with_signature_location(&sig_path);
        let input = TransformData::Xml {
            element: doc.root().clone(),
            location: Some(NodePath::root()),
        };
        let out = EnvelopedSignatureTransform.execute(input, &ctx).unwrap();
        assert_eq!(out.to_binary().unwrap(), b"<doc><item>1</item></doc>".to_vec());
    }

    #[test]
    fn test_requires_signature_location() {
        let policy = ValidationPolicy::default();
        let deref = DefaultDereferencer;
        let ctx = TransformContext::new(&policy, &deref);
        let input = TransformData::xml(sigill_xml::Element::new("doc"));
        assert!(EnvelopedSignatureTransform.execute(input, &ctx).is_err());
    }
}
