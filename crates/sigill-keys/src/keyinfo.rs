#![forbid(unsafe_code)]

//! The `<KeyInfo>` element and public key resolution from it.

use crate::encode_base64;
use crate::factory;
use crate::keyvalue::{KeyValue, KeyValueContent};
use crate::retrieval::RetrievalMethod;
use crate::x509data::X509Data;
use der::{Decode, Encode};
use sigill_core::{algorithm, ns, Error, ValidationPolicy};
use sigill_crypto::PublicKey;
use sigill_transforms::TransformContext;
use sigill_xml::Element;

/// One child of `<KeyInfo>`.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyInfoContent {
    KeyName(String),
    KeyValue(KeyValue),
    RetrievalMethod(RetrievalMethod),
    X509Data(X509Data),
    /// `<dsig11:DEREncodedKeyValue>`: SubjectPublicKeyInfo DER.
    DerEncodedKeyValue(Vec<u8>),
    /// PGPData, SPKIData, MgmtData and foreign elements, kept verbatim.
    Opaque(Element),
}

impl KeyInfoContent {
    pub fn to_element(&self) -> Result<Element, Error> {
        match self {
            Self::KeyName(name) => Ok(Element::dsig(ns::node::KEY_NAME).with_text(name)),
            Self::KeyValue(kv) => kv.to_element(),
            Self::RetrievalMethod(rm) => Ok(rm.to_element()),
            Self::X509Data(data) => data.to_element(),
            Self::DerEncodedKeyValue(der) => {
                Ok(Element::dsig11(ns::node::DER_ENCODED_KEY_VALUE).with_text(&encode_base64(der)))
            }
            Self::Opaque(el) => Ok(el.clone()),
        }
    }
}

/// A `<KeyInfo>` with a non-empty, ordered content list.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInfo {
    id: Option<String>,
    content: Vec<KeyInfoContent>,
}

impl KeyInfo {
    pub fn new(content: Vec<KeyInfoContent>, id: Option<&str>) -> Result<Self, Error> {
        if content.is_empty() {
            return Err(Error::XmlStructure("KeyInfo content must not be empty".into()));
        }
        Ok(Self {
            id: id.map(str::to_owned),
            content,
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn content(&self) -> &[KeyInfoContent] {
        &self.content
    }

    /// Decode a `<KeyInfo>` element.
    pub fn unmarshal(element: &Element, policy: &ValidationPolicy) -> Result<Self, Error> {
        let content = element
            .child_elements()
            .map(|child| factory::decode_content(child, policy))
            .collect::<Result<Vec<_>, _>>()?;
        if content.is_empty() {
            return Err(Error::MissingElement("KeyInfo content".into()));
        }
        Ok(Self {
            id: element.attribute(ns::attr::ID).map(str::to_owned),
            content,
        })
    }

    /// Encode as `<ds:KeyInfo>`.
    pub fn to_element(&self) -> Result<Element, Error> {
        let mut el = Element::dsig(ns::node::KEY_INFO);
        if let Some(id) = &self.id {
            el.set_attribute(ns::attr::ID, id);
        }
        for item in &self.content {
            el.push_element(item.to_element()?);
        }
        Ok(el)
    }

    /// Find a verification key, trying the content in document order.
    ///
    /// Key names and opaque content are skipped; an entry that should hold a
    /// key but cannot be turned into one is an error.
    pub fn resolve_public_key(&self, ctx: &TransformContext<'_>) -> Result<PublicKey, Error> {
        for item in &self.content {
            let key = match item {
                KeyInfoContent::KeyValue(kv) => match kv.content() {
                    KeyValueContent::Unknown(_) => None,
                    _ => Some(kv.public_key()?),
                },
                KeyInfoContent::DerEncodedKeyValue(der) => Some(PublicKey::from_spki_der(der)?),
                KeyInfoContent::X509Data(data) => data.public_key()?,
                KeyInfoContent::RetrievalMethod(rm) => resolve_retrieved(rm, ctx)?,
                KeyInfoContent::KeyName(_) | KeyInfoContent::Opaque(_) => None,
            };
            if let Some(key) = key {
                tracing::debug!(family = key.family(), bits = key.key_bits(), "resolved key from KeyInfo");
                return Ok(key);
            }
        }
        Err(Error::InvalidKey("KeyInfo holds no usable public key".into()))
    }
}

fn resolve_retrieved(rm: &RetrievalMethod, ctx: &TransformContext<'_>) -> Result<Option<PublicKey>, Error> {
    match rm.type_() {
        None | Some(algorithm::X509_DATA) => match rm.dereference_as_xml_structure(ctx)? {
            Some(data) => data.public_key(),
            None => Ok(None),
        },
        Some(algorithm::RSA_KEY_VALUE | algorithm::DSA_KEY_VALUE | algorithm::EC_KEY_VALUE) => {
            let element = rm.dereference(ctx)?.into_element()?;
            KeyValue::from_content_element(&element)?.public_key().map(Some)
        }
        Some(algorithm::RAW_X509_CERT) => {
            let der = rm.dereference(ctx)?.to_binary()?;
            let cert = x509_cert::Certificate::from_der(&der)
                .map_err(|e| Error::MalformedData(format!("raw X.509 certificate: {e}")))?;
            let spki = cert
                .tbs_certificate
                .subject_public_key_info
                .to_der()
                .map_err(|e| Error::MalformedData(format!("certificate public key: {e}")))?;
            PublicKey::from_spki_der(&spki).map(Some)
        }
        Some(other) => {
            tracing::debug!(kind = other, "skipping RetrievalMethod of unsupported type");
            Ok(None)
        }
    }
}
