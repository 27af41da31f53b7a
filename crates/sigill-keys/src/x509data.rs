#![forbid(unsafe_code)]

//! `<X509Data>` encoding and decoding.
//!
//! The content is an ordered list; encoding preserves that order exactly
//! and unrecognized children are carried through as opaque elements.

use crate::{decode_base64, encode_base64};
use der::{Decode, Encode};
use rsa::BigUint;
use sigill_core::{ns, Error};
use sigill_crypto::PublicKey;
use sigill_xml::{ChildCursor, Element};
use x509_cert::crl::CertificateList;
use x509_cert::Certificate;

/// `<X509IssuerSerial>`: issuer distinguished name and serial number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509IssuerSerial {
    pub issuer_name: String,
    pub serial_number: BigUint,
}

impl X509IssuerSerial {
    pub fn new(issuer_name: &str, serial_number: BigUint) -> Self {
        Self {
            issuer_name: issuer_name.to_owned(),
            serial_number,
        }
    }

    /// Issuer and serial of `cert`.
    pub fn from_certificate(cert: &Certificate) -> Self {
        let tbs = &cert.tbs_certificate;
        Self {
            issuer_name: tbs.issuer.to_string(),
            serial_number: BigUint::from_bytes_be(tbs.serial_number.as_bytes()),
        }
    }

    fn unmarshal(el: &Element) -> Result<Self, Error> {
        let mut children = ChildCursor::new(el);
        let issuer_name = children
            .required(ns::DSIG, ns::node::X509_ISSUER_NAME)?
            .text();
        let serial_text = children
            .required(ns::DSIG, ns::node::X509_SERIAL_NUMBER)?
            .text();
        children.finish()?;

        let serial_number = BigUint::parse_bytes(serial_text.trim().as_bytes(), 10)
            .ok_or_else(|| {
                Error::MalformedData(format!("X509SerialNumber {serial_text:?} is not a decimal integer"))
            })?;
        Ok(Self {
            issuer_name,
            serial_number,
        })
    }

    fn to_element(&self) -> Element {
        Element::dsig(ns::node::X509_ISSUER_SERIAL)
            .with_child(Element::dsig(ns::node::X509_ISSUER_NAME).with_text(&self.issuer_name))
            .with_child(
                Element::dsig(ns::node::X509_SERIAL_NUMBER)
                    .with_text(&self.serial_number.to_str_radix(10)),
            )
    }
}

/// One entry of `<X509Data>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum X509Content {
    SubjectName(String),
    /// Subject key identifier, compared by value.
    Ski(Vec<u8>),
    Certificate(Box<Certificate>),
    Crl(Box<CertificateList>),
    IssuerSerial(X509IssuerSerial),
    Opaque(Element),
}

impl X509Content {
    fn unmarshal(el: &Element) -> Result<Self, Error> {
        if el.namespace() != Some(ns::DSIG) {
            return Ok(Self::Opaque(el.clone()));
        }
        let content = match el.local_name() {
            ns::node::X509_SUBJECT_NAME => Self::SubjectName(el.text()),
            ns::node::X509_SKI => Self::Ski(decode_base64(&el.text(), "X509SKI")?),
            ns::node::X509_CERTIFICATE => {
                let der = decode_base64(&el.text(), "X509Certificate")?;
                let cert = Certificate::from_der(&der)
                    .map_err(|e| Error::MalformedData(format!("X509Certificate: {e}")))?;
                Self::Certificate(Box::new(cert))
            }
            ns::node::X509_CRL => {
                let der = decode_base64(&el.text(), "X509CRL")?;
                let crl = CertificateList::from_der(&der)
                    .map_err(|e| Error::MalformedData(format!("X509CRL: {e}")))?;
                Self::Crl(Box::new(crl))
            }
            ns::node::X509_ISSUER_SERIAL => Self::IssuerSerial(X509IssuerSerial::unmarshal(el)?),
            _ => Self::Opaque(el.clone()),
        };
        Ok(content)
    }

    fn to_element(&self) -> Result<Element, Error> {
        let el = match self {
            Self::SubjectName(name) => Element::dsig(ns::node::X509_SUBJECT_NAME).with_text(name),
            Self::Ski(ski) => Element::dsig(ns::node::X509_SKI).with_text(&encode_base64(ski)),
            Self::Certificate(cert) => {
                let der = cert
                    .to_der()
                    .map_err(|e| Error::Marshal(format!("X509Certificate: {e}")))?;
                Element::dsig(ns::node::X509_CERTIFICATE).with_text(&encode_base64(&der))
            }
            Self::Crl(crl) => {
                let der = crl
                    .to_der()
                    .map_err(|e| Error::Marshal(format!("X509CRL: {e}")))?;
                Element::dsig(ns::node::X509_CRL).with_text(&encode_base64(&der))
            }
            Self::IssuerSerial(is) => is.to_element(),
            Self::Opaque(el) => el.clone(),
        };
        Ok(el)
    }
}

/// A non-empty, ordered `<X509Data>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509Data {
    content: Vec<X509Content>,
}

impl X509Data {
    pub fn new(content: Vec<X509Content>) -> Result<Self, Error> {
        if content.is_empty() {
            return Err(Error::XmlStructure("X509Data content must not be empty".into()));
        }
        Ok(Self { content })
    }

    pub fn content(&self) -> &[X509Content] {
        &self.content
    }

    pub fn certificates(&self) -> impl Iterator<Item = &Certificate> {
        self.content.iter().filter_map(|c| match c {
            X509Content::Certificate(cert) => Some(cert.as_ref()),
            _ => None,
        })
    }

    /// Public key of the first certificate.
    pub fn public_key(&self) -> Result<Option<PublicKey>, Error> {
        let Some(cert) = self.certificates().next() else {
            return Ok(None);
        };
        let spki = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::MalformedData(format!("certificate public key: {e}")))?;
        PublicKey::from_spki_der(&spki).map(Some)
    }

    /// Decode an `<X509Data>` element.
    pub fn unmarshal(element: &Element) -> Result<Self, Error> {
        let content = element
            .child_elements()
            .map(X509Content::unmarshal)
            .collect::<Result<Vec<_>, _>>()?;
        if content.is_empty() {
            return Err(Error::MissingElement("X509Data content".into()));
        }
        Ok(Self { content })
    }

    /// Encode as `<ds:X509Data>`, preserving content order.
    pub fn to_element(&self) -> Result<Element, Error> {
        let mut el = Element::dsig(ns::node::X509_DATA);
        for item in &self.content {
            el.push_element(item.to_element()?);
        }
        Ok(el)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use der::asn1::{BitString, ObjectIdentifier};
    use sigill_xml::XmlDocument;
    use std::str::FromStr;
    use std::time::Duration;
    use x509_cert::certificate::{TbsCertificate, Version};
    use x509_cert::name::Name;
    use x509_cert::serial_number::SerialNumber;
    use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
    use x509_cert::time::Validity;

    /// A structurally valid certificate for `key`. The signature is filler.
    pub(crate) fn test_certificate(key: &PublicKey, serial: &[u8]) -> Certificate {
        let spki = SubjectPublicKeyInfoOwned::from_der(&key.to_spki_der().unwrap()).unwrap();
        let algorithm = AlgorithmIdentifierOwned {
            oid: ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2"),
            parameters: None,
        };
        Certificate {
            tbs_certificate: TbsCertificate {
                version: Version::V3,
                serial_number: SerialNumber::new(serial).unwrap(),
                signature: algorithm.clone(),
                issuer: Name::from_str("CN=Sigill Test CA,O=Sigill").unwrap(),
                validity: Validity::from_now(Duration::from_secs(3600)).unwrap(),
                subject: Name::from_str("CN=signer").unwrap(),
                subject_public_key_info: spki,
                issuer_unique_id: None,
                subject_unique_id: None,
                extensions: None,
            },
            signature_algorithm: algorithm,
            signature: BitString::from_bytes(&[0u8; 8]).unwrap(),
        }
    }

    fn p256_key() -> PublicKey {
        PublicKey::EcP256(p256::SecretKey::random(&mut rand::rngs::OsRng).public_key())
    }

    fn round_trip(data: &X509Data) -> X509Data {
        let xml = sigill_xml::writer::to_xml(&data.to_element().unwrap());
        let doc = XmlDocument::parse(&xml).unwrap();
        X509Data::unmarshal(doc.root()).unwrap()
    }

    #[test]
    fn test_order_is_preserved() {
        let key = p256_key();
        let data = X509Data::new(vec![
            X509Content::Certificate(Box::new(test_certificate(&key, &[0x01, 0x02]))),
            X509Content::Ski(vec![0xde, 0xad, 0xbe, 0xef]),
            X509Content::SubjectName("CN=signer".into()),
        ])
        .unwrap();
        let back = round_trip(&data);
        assert_eq!(back, data);
        assert!(matches!(back.content()[0], X509Content::Certificate(_)));
        assert!(matches!(back.content()[1], X509Content::Ski(_)));
        assert!(matches!(back.content()[2], X509Content::SubjectName(_)));
        assert_eq!(back.public_key().unwrap(), Some(key));
    }

    #[test]
    fn test_issuer_serial() {
        let cert = test_certificate(&p256_key(), &[0x01, 0x00]);
        let is = X509IssuerSerial::from_certificate(&cert);
        assert_eq!(is.serial_number, BigUint::from(256u32));
        assert!(is.issuer_name.contains("CN=Sigill Test CA"));

        let data = X509Data::new(vec![X509Content::IssuerSerial(is.clone())]).unwrap();
        let el = data.to_element().unwrap();
        let serial = el
            .find_descendant(ns::DSIG, ns::node::X509_SERIAL_NUMBER)
            .unwrap()
            .1
            .text();
        assert_eq!(serial, "256");
        assert_eq!(round_trip(&data).content(), &[X509Content::IssuerSerial(is)]);
    }

    #[test]
    fn test_unknown_children_are_kept() {
        let xml = r#"<X509Data xmlns="http://www.w3.org/2000/09/xmldsig#" xmlns:x="urn:x">
            <X509SubjectName>CN=a</X509SubjectName><x:Ext>1</x:Ext><X509Digest>AA==</X509Digest></X509Data>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let data = X509Data::unmarshal(doc.root()).unwrap();
        assert_eq!(data.content().len(), 3);
        assert!(matches!(&data.content()[1], X509Content::Opaque(el) if el.local_name() == "Ext"));
        assert!(matches!(&data.content()[2], X509Content::Opaque(el) if el.local_name() == "X509Digest"));
        assert_eq!(data.public_key().unwrap(), None);
    }

    #[test]
    fn test_malformed_content() {
        let bad_serial = r#"<X509Data xmlns="http://www.w3.org/2000/09/xmldsig#"><X509IssuerSerial>
            <X509IssuerName>CN=a</X509IssuerName><X509SerialNumber>12ab</X509SerialNumber></X509IssuerSerial></X509Data>"#;
        let doc = XmlDocument::parse(bad_serial).unwrap();
        assert!(matches!(X509Data::unmarshal(doc.root()), Err(Error::MalformedData(_))));

        let bad_cert = r#"<X509Data xmlns="http://www.w3.org/2000/09/xmldsig#"><X509Certificate>AAAA</X509Certificate></X509Data>"#;
        let doc = XmlDocument::parse(bad_cert).unwrap();
        assert!(matches!(X509Data::unmarshal(doc.root()), Err(Error::MalformedData(_))));

        let empty = XmlDocument::parse(r#"<X509Data xmlns="http://www.w3.org/2000/09/xmldsig#"/>"#).unwrap();
        assert!(X509Data::unmarshal(empty.root()).is_err());
        assert!(X509Data::new(Vec::new()).is_err());
    }
}
