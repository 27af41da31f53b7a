#![forbid(unsafe_code)]

//! Entry point for building and parsing `<KeyInfo>` structures.
//!
//! Decoding dispatches through a fixed table keyed by namespace and local
//! name. Elements with no entry are kept as opaque content.

use crate::decode_base64;
use crate::keyinfo::{KeyInfo, KeyInfoContent};
use crate::keyvalue::KeyValue;
use crate::retrieval::RetrievalMethod;
use crate::x509data::{X509Content, X509Data, X509IssuerSerial};
use rsa::BigUint;
use sigill_core::{ns, Error, ValidationPolicy};
use sigill_crypto::PublicKey;
use sigill_transforms::TransformPipeline;
use sigill_xml::Element;

type ContentDecoder = fn(&Element, &ValidationPolicy) -> Result<KeyInfoContent, Error>;

const CONTENT_DECODERS: &[(&str, &str, ContentDecoder)] = &[
    (ns::DSIG, ns::node::KEY_NAME, decode_key_name),
    (ns::DSIG, ns::node::KEY_VALUE, decode_key_value),
    (ns::DSIG, ns::node::RETRIEVAL_METHOD, decode_retrieval_method),
    (ns::DSIG, ns::node::X509_DATA, decode_x509_data),
    (ns::DSIG11, ns::node::DER_ENCODED_KEY_VALUE, decode_der_encoded_key_value),
];

/// Decode one child of `<KeyInfo>`.
pub(crate) fn decode_content(element: &Element, policy: &ValidationPolicy) -> Result<KeyInfoContent, Error> {
    let decoder = CONTENT_DECODERS
        .iter()
        .find(|(namespace, local_name, _)| element.is(namespace, local_name))
        .map(|(_, _, decoder)| decoder);
    match decoder {
        Some(decode) => decode(element, policy),
        None => {
            tracing::debug!(element = element.local_name(), "keeping unrecognized KeyInfo content");
            Ok(KeyInfoContent::Opaque(element.clone()))
        }
    }
}

fn decode_key_name(el: &Element, _: &ValidationPolicy) -> Result<KeyInfoContent, Error> {
    Ok(KeyInfoContent::KeyName(el.text()))
}

fn decode_key_value(el: &Element, _: &ValidationPolicy) -> Result<KeyInfoContent, Error> {
    KeyValue::unmarshal(el).map(KeyInfoContent::KeyValue)
}

fn decode_retrieval_method(el: &Element, policy: &ValidationPolicy) -> Result<KeyInfoContent, Error> {
    RetrievalMethod::unmarshal(el, policy).map(KeyInfoContent::RetrievalMethod)
}

fn decode_x509_data(el: &Element, _: &ValidationPolicy) -> Result<KeyInfoContent, Error> {
    X509Data::unmarshal(el).map(KeyInfoContent::X509Data)
}

fn decode_der_encoded_key_value(el: &Element, _: &ValidationPolicy) -> Result<KeyInfoContent, Error> {
    decode_base64(&el.text(), "DEREncodedKeyValue").map(KeyInfoContent::DerEncodedKeyValue)
}

/// Builds `<KeyInfo>` content and parses `<KeyInfo>` elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyInfoFactory;

impl KeyInfoFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn new_key_info(&self, content: Vec<KeyInfoContent>, id: Option<&str>) -> Result<KeyInfo, Error> {
        KeyInfo::new(content, id)
    }

    pub fn new_key_name(&self, name: &str) -> KeyInfoContent {
        KeyInfoContent::KeyName(name.to_owned())
    }

    /// `<KeyValue>` for a live RSA, DSA or EC P-256 key.
    pub fn new_key_value(&self, key: &PublicKey) -> Result<KeyValue, Error> {
        KeyValue::from_public_key(key)
    }

    pub fn new_der_encoded_key_value(&self, key: &PublicKey) -> Result<KeyInfoContent, Error> {
        key.to_spki_der().map(KeyInfoContent::DerEncodedKeyValue)
    }

    pub fn new_x509_data(&self, content: Vec<X509Content>) -> Result<X509Data, Error> {
        X509Data::new(content)
    }

    pub fn new_x509_issuer_serial(&self, issuer_name: &str, serial_number: BigUint) -> X509IssuerSerial {
        X509IssuerSerial::new(issuer_name, serial_number)
    }

    pub fn new_retrieval_method(
        &self,
        uri: &str,
        type_: Option<&str>,
        transforms: TransformPipeline,
    ) -> RetrievalMethod {
        RetrievalMethod::new(uri, type_, transforms)
    }

    /// Parse a `<KeyInfo>` element.
    pub fn unmarshal_key_info(&self, element: &Element, policy: &ValidationPolicy) -> Result<KeyInfo, Error> {
        if !element.is(ns::DSIG, ns::node::KEY_INFO) {
            return Err(Error::XmlStructure(format!(
                "expected <KeyInfo>, found <{}>",
                element.local_name()
            )));
        }
        KeyInfo::unmarshal(element, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvalue::KeyValueContent;
    use sigill_xml::XmlDocument;

    const KEY_INFO: &str = r##"<ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xmlns:dsig11="http://www.w3.org/2009/xmldsig11#" Id="k">
        <ds:KeyName>alice</ds:KeyName>
        <ds:KeyValue><ds:RSAKeyValue><ds:Modulus>AQAB</ds:Modulus><ds:Exponent>AQAB</ds:Exponent></ds:RSAKeyValue></ds:KeyValue>
        <ds:PGPData><ds:PGPKeyID>AA==</ds:PGPKeyID></ds:PGPData>
        <dsig11:DEREncodedKeyValue>AAEC</dsig11:DEREncodedKeyValue>
        <ds:RetrievalMethod URI="#x"/>
    </ds:KeyInfo>"##;

    #[test]
    fn test_dispatch_by_element_name() {
        let doc = XmlDocument::parse(KEY_INFO).unwrap();
        let info = KeyInfoFactory::new()
            .unmarshal_key_info(doc.root(), &ValidationPolicy::default())
            .unwrap();
        let content = info.content();
        assert_eq!(content.len(), 5);
        assert_eq!(content[0], KeyInfoContent::KeyName("alice".into()));
        match &content[1] {
            KeyInfoContent::KeyValue(kv) => {
                assert!(matches!(kv.content(), KeyValueContent::Rsa { .. }))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&content[2], KeyInfoContent::Opaque(el) if el.local_name() == "PGPData"));
        assert_eq!(content[3], KeyInfoContent::DerEncodedKeyValue(vec![0, 1, 2]));
        match &content[4] {
            KeyInfoContent::RetrievalMethod(rm) => assert_eq!(rm.uri(), "#x"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejects_other_elements() {
        let doc = XmlDocument::parse(r#"<KeyName xmlns="http://www.w3.org/2000/09/xmldsig#">a</KeyName>"#).unwrap();
        assert!(KeyInfoFactory::new()
            .unmarshal_key_info(doc.root(), &ValidationPolicy::default())
            .is_err());
    }

    #[test]
    fn test_structural_errors_abort_unmarshal() {
        let xml = r#"<ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
            <ds:KeyName>a</ds:KeyName>
            <ds:KeyValue><ds:RSAKeyValue><ds:Modulus>AQAB</ds:Modulus></ds:RSAKeyValue></ds:KeyValue>
        </ds:KeyInfo>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        assert!(matches!(
            KeyInfoFactory::new().unmarshal_key_info(doc.root(), &ValidationPolicy::default()),
            Err(Error::MissingElement(_))
        ));
    }

    #[test]
    fn test_builders() {
        let factory = KeyInfoFactory::new();
        let serial = factory.new_x509_issuer_serial("CN=ca", BigUint::from(5u32));
        let data = factory
            .new_x509_data(vec![X509Content::IssuerSerial(serial)])
            .unwrap();
        let rm = factory.new_retrieval_method("#d", None, TransformPipeline::new());
        let info = factory
            .new_key_info(
                vec![
                    factory.new_key_name("n"),
                    KeyInfoContent::X509Data(data),
                    KeyInfoContent::RetrievalMethod(rm),
                ],
                None,
            )
            .unwrap();
        let el = info.to_element().unwrap();
        let names: Vec<&str> = el.child_elements().map(|c| c.local_name()).collect();
        assert_eq!(names, ["KeyName", "X509Data", "RetrievalMethod"]);
        assert!(factory.new_key_info(Vec::new(), None).is_err());
    }
}
