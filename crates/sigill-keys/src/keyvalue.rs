#![forbid(unsafe_code)]

//! `<KeyValue>` encoding and decoding.
//!
//! Supported key values:
//! - `<RSAKeyValue>`: Modulus, Exponent
//! - `<DSAKeyValue>`: (P, Q)?, G, Y, J?, (Seed, PgenCounter)?
//! - `<dsig11:ECKeyValue>`: NamedCurve (P-256 only), PublicKey
//!
//! Anything else inside `<KeyValue>` is carried through untouched.

use crate::crypto_binary;
use crate::decode_base64;
use crate::encode_base64;
use rsa::traits::PublicKeyParts;
use rsa::BigUint;
use sigill_core::{algorithm, ns, Error};
use sigill_crypto::key::P256_FIELD_LEN;
use sigill_crypto::PublicKey;
use sigill_xml::{ChildCursor, Element};
use std::sync::OnceLock;

const OID_URN_PREFIX: &str = "urn:oid:";

/// DSA key value fields. P and Q, and Seed and PgenCounter, come in pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsaKeyValue {
    pub p_q: Option<(BigUint, BigUint)>,
    pub g: BigUint,
    pub y: BigUint,
    pub j: Option<BigUint>,
    pub seed_pgen_counter: Option<(BigUint, BigUint)>,
}

/// The content of a `<KeyValue>`: exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValueContent {
    Rsa { modulus: BigUint, exponent: BigUint },
    Dsa(DsaKeyValue),
    /// `curve_oid` is the dotted OID; `point` the uncompressed SEC1 encoding.
    Ec { curve_oid: String, point: Vec<u8> },
    Unknown(Element),
}

/// A `<KeyValue>` element with its lazily resolved public key.
#[derive(Debug, Clone)]
pub struct KeyValue {
    content: KeyValueContent,
    resolved: OnceLock<PublicKey>,
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content
    }
}

impl KeyValue {
    pub fn new(content: KeyValueContent) -> Self {
        Self {
            content,
            resolved: OnceLock::new(),
        }
    }

    /// Build a key value from a live public key.
    pub fn from_public_key(key: &PublicKey) -> Result<Self, Error> {
        let content = match key {
            PublicKey::Rsa(pk) => KeyValueContent::Rsa {
                modulus: pk.n().clone(),
                exponent: pk.e().clone(),
            },
            PublicKey::Dsa(vk) => {
                let c = vk.components();
                KeyValueContent::Dsa(DsaKeyValue {
                    p_q: Some((c.p().clone(), c.q().clone())),
                    g: c.g().clone(),
                    y: vk.y().clone(),
                    j: None,
                    seed_pgen_counter: None,
                })
            }
            PublicKey::EcP256(_) => {
                let raw = key
                    .ec_point_uncompressed()
                    .ok_or_else(|| Error::Marshal("EC key has no point encoding".into()))?;
                let (x, y) = decode_point(&raw, P256_FIELD_LEN)?;
                KeyValueContent::Ec {
                    curve_oid: algorithm::SECP256R1_OID.to_owned(),
                    point: encode_point(&x, &y, P256_FIELD_LEN)?,
                }
            }
        };
        Ok(Self {
            content,
            resolved: OnceLock::from(key.clone()),
        })
    }

    pub fn content(&self) -> &KeyValueContent {
        &self.content
    }

    /// Decode a `<KeyValue>` element.
    pub fn unmarshal(element: &Element) -> Result<Self, Error> {
        let inner = element
            .first_child_element()
            .ok_or_else(|| Error::MissingElement("KeyValue content".into()))?;
        Self::from_content_element(inner)
    }

    /// Decode the element inside `<KeyValue>` (for example a bare
    /// `<RSAKeyValue>` reached through a RetrievalMethod).
    pub fn from_content_element(inner: &Element) -> Result<Self, Error> {
        let content = if inner.is(ns::DSIG, ns::node::RSA_KEY_VALUE) {
            decode_rsa(inner)?
        } else if inner.is(ns::DSIG, ns::node::DSA_KEY_VALUE) {
            decode_dsa(inner)?
        } else if inner.is(ns::DSIG11, ns::node::EC_KEY_VALUE) {
            decode_ec(inner)?
        } else {
            KeyValueContent::Unknown(inner.clone())
        };
        Ok(Self::new(content))
    }

    /// Encode as a `<ds:KeyValue>` element.
    pub fn to_element(&self) -> Result<Element, Error> {
        let inner = match &self.content {
            KeyValueContent::Rsa { modulus, exponent } => Element::dsig(ns::node::RSA_KEY_VALUE)
                .with_child(crypto_binary::to_element(
                    Element::dsig(ns::node::RSA_MODULUS),
                    modulus,
                ))
                .with_child(crypto_binary::to_element(
                    Element::dsig(ns::node::RSA_EXPONENT),
                    exponent,
                )),
            KeyValueContent::Dsa(dsa) => encode_dsa(dsa),
            KeyValueContent::Ec { curve_oid, point } => {
                if curve_oid != algorithm::SECP256R1_OID {
                    return Err(Error::Marshal(format!("unsupported EC curve OID {curve_oid}")));
                }
                Element::dsig11(ns::node::EC_KEY_VALUE)
                    .with_child(
                        Element::dsig11(ns::node::NAMED_CURVE)
                            .with_attribute(ns::attr::URI, &format!("{OID_URN_PREFIX}{curve_oid}")),
                    )
                    .with_child(Element::dsig11(ns::node::PUBLIC_KEY).with_text(&encode_base64(point)))
            }
            KeyValueContent::Unknown(el) => el.clone(),
        };
        Ok(Element::dsig(ns::node::KEY_VALUE).with_child(inner))
    }

    /// The public key this value describes, built on first use.
    pub fn public_key(&self) -> Result<PublicKey, Error> {
        if let Some(key) = self.resolved.get() {
            return Ok(key.clone());
        }
        let key = match &self.content {
            KeyValueContent::Rsa { modulus, exponent } => {
                PublicKey::rsa_from_components(modulus.clone(), exponent.clone())?
            }
            KeyValueContent::Dsa(dsa) => {
                let (p, q) = dsa.p_q.clone().ok_or_else(|| {
                    Error::InvalidKey("DSAKeyValue without P and Q cannot be used on its own".into())
                })?;
                PublicKey::dsa_from_components(p, q, dsa.g.clone(), dsa.y.clone())?
            }
            KeyValueContent::Ec { point, .. } => PublicKey::ec_p256_from_sec1(point)?,
            KeyValueContent::Unknown(el) => {
                return Err(Error::UnsupportedAlgorithm(format!(
                    "unrecognized key value <{}>",
                    el.local_name()
                )))
            }
        };
        Ok(self.resolved.get_or_init(|| key).clone())
    }
}

// ── Decoding ─────────────────────────────────────────────────────────

fn decode_rsa(el: &Element) -> Result<KeyValueContent, Error> {
    let mut children = ChildCursor::new(el);
    let modulus = crypto_binary::from_element(children.required(ns::DSIG, ns::node::RSA_MODULUS)?)?;
    let exponent = crypto_binary::from_element(children.required(ns::DSIG, ns::node::RSA_EXPONENT)?)?;
    children.finish()?;
    Ok(KeyValueContent::Rsa { modulus, exponent })
}

fn decode_dsa(el: &Element) -> Result<KeyValueContent, Error> {
    let mut children = ChildCursor::new(el);

    let p_q = match children.optional(ns::DSIG, ns::node::DSA_P) {
        Some(p) => {
            let q = children.required(ns::DSIG, ns::node::DSA_Q)?;
            Some((crypto_binary::from_element(p)?, crypto_binary::from_element(q)?))
        }
        None => None,
    };
    let g = crypto_binary::from_element(children.required(ns::DSIG, ns::node::DSA_G)?)?;
    let y = crypto_binary::from_element(children.required(ns::DSIG, ns::node::DSA_Y)?)?;
    let j = children
        .optional(ns::DSIG, ns::node::DSA_J)
        .map(crypto_binary::from_element)
        .transpose()?;
    let seed_pgen_counter = match children.optional(ns::DSIG, ns::node::DSA_SEED) {
        Some(seed) => {
            let counter = children.required(ns::DSIG, ns::node::DSA_PGEN_COUNTER)?;
            Some((
                crypto_binary::from_element(seed)?,
                crypto_binary::from_element(counter)?,
            ))
        }
        None => None,
    };
    children.finish()?;

    Ok(KeyValueContent::Dsa(DsaKeyValue {
        p_q,
        g,
        y,
        j,
        seed_pgen_counter,
    }))
}

fn decode_ec(el: &Element) -> Result<KeyValueContent, Error> {
    let mut children = ChildCursor::new(el);

    if children.optional(ns::DSIG11, ns::node::EC_PARAMETERS).is_some() {
        return Err(Error::UnsupportedAlgorithm(
            "explicit ECParameters are not supported".into(),
        ));
    }
    let named_curve = children.required(ns::DSIG11, ns::node::NAMED_CURVE)?;
    let uri = named_curve
        .attribute(ns::attr::URI)
        .ok_or_else(|| Error::MissingAttribute("URI on NamedCurve".into()))?;
    let oid = uri
        .strip_prefix(OID_URN_PREFIX)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("NamedCurve URI {uri}")))?;
    if oid != algorithm::SECP256R1_OID {
        return Err(Error::UnsupportedAlgorithm(format!("EC curve {oid}")));
    }

    let public_key = children.required(ns::DSIG11, ns::node::PUBLIC_KEY)?;
    let point = decode_base64(&public_key.text(), "ECKeyValue PublicKey")?;
    decode_point(&point, P256_FIELD_LEN)?;
    children.finish()?;

    Ok(KeyValueContent::Ec {
        curve_oid: oid.to_owned(),
        point,
    })
}

fn encode_dsa(dsa: &DsaKeyValue) -> Element {
    let field = |name: &str, value: &BigUint| crypto_binary::to_element(Element::dsig(name), value);

    let mut el = Element::dsig(ns::node::DSA_KEY_VALUE);
    if let Some((p, q)) = &dsa.p_q {
        el.push_element(field(ns::node::DSA_P, p));
        el.push_element(field(ns::node::DSA_Q, q));
    }
    el.push_element(field(ns::node::DSA_G, &dsa.g));
    el.push_element(field(ns::node::DSA_Y, &dsa.y));
    if let Some(j) = &dsa.j {
        el.push_element(field(ns::node::DSA_J, j));
    }
    if let Some((seed, counter)) = &dsa.seed_pgen_counter {
        el.push_element(field(ns::node::DSA_SEED, seed));
        el.push_element(field(ns::node::DSA_PGEN_COUNTER, counter));
    }
    el
}

// ── EC points ────────────────────────────────────────────────────────

/// Uncompressed point `0x04 || X || Y` with both coordinates left-padded to
/// `field_len` bytes. Fails if a coordinate does not fit.
pub fn encode_point(x: &[u8], y: &[u8], field_len: usize) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(1 + 2 * field_len);
    out.push(0x04);
    for coord in [x, y] {
        let start = coord.iter().position(|&b| b != 0).unwrap_or(coord.len());
        let natural = &coord[start..];
        if natural.len() > field_len {
            return Err(Error::Marshal(format!(
                "EC coordinate of {} bytes exceeds field size {field_len}",
                natural.len()
            )));
        }
        out.resize(out.len() + field_len - natural.len(), 0);
        out.extend_from_slice(natural);
    }
    Ok(out)
}

/// Split an uncompressed point into its fixed-width coordinates.
pub fn decode_point(point: &[u8], field_len: usize) -> Result<(Vec<u8>, Vec<u8>), Error> {
    if point.len() != 1 + 2 * field_len {
        return Err(Error::MalformedData(format!(
            "EC point is {} bytes, expected {}",
            point.len(),
            1 + 2 * field_len
        )));
    }
    if point[0] != 0x04 {
        return Err(Error::MalformedData(format!(
            "EC point tag 0x{:02x} is not the uncompressed form",
            point[0]
        )));
    }
    let (x, y) = point[1..].split_at(field_len);
    Ok((x.to_vec(), y.to_vec()))
}
