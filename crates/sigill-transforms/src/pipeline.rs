#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use crate::base64_transform::Base64DecodeTransform;
use crate::enveloped::EnvelopedSignatureTransform;
use crate::uri::TransformContext;
use sigill_c14n::{C14nMethod, CanonicalizationMethod};
use sigill_core::{algorithm, ns, Error, ValidationPolicy};
use sigill_xml::{Element, NodePath, XmlDocument};
use std::fmt;

/// Data flowing through the transform pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformData {
    /// An XML subtree, detached with its inherited namespaces.
    Xml {
        element: Element,
        /// Where `element` sits in the source document, if it came from one.
        location: Option<NodePath>,
    },
    /// Raw binary data.
    Binary(Vec<u8>),
}

impl TransformData {
    /// Wrap a subtree that does not belong to a document.
    pub fn xml(element: Element) -> Self {
        TransformData::Xml {
            element,
            location: None,
        }
    }

    /// Convert to binary, applying inclusive C14N without comments to XML.
    pub fn to_binary(&self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data.clone()),
            TransformData::Xml { element, .. } => {
                C14nMethod::new(sigill_c14n::C14nMode::Inclusive).canonicalize(element)
            }
        }
    }

    /// The root element of XML data.
    pub fn root_element(&self) -> Option<&Element> {
        match self {
            TransformData::Xml { element, .. } => Some(element),
            TransformData::Binary(_) => None,
        }
    }

    /// Interpret the data as an XML element, parsing octets if needed.
    pub fn into_element(self) -> Result<Element, Error> {
        match self {
            TransformData::Xml { element, .. } => Ok(element),
            TransformData::Binary(data) => {
                Ok(XmlDocument::parse_bytes(&data)?.root().clone())
            }
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send + Sync + fmt::Debug {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform on the given data.
    fn execute(&self, input: TransformData, ctx: &TransformContext<'_>) -> Result<TransformData, Error>;

    /// Append algorithm parameters as children of the `<Transform>` element.
    fn marshal_params(&self, _transform: &mut Element) {}
}

/// Create a transform from a `<Transform>` element.
pub fn transform_from_element(element: &Element) -> Result<Box<dyn Transform>, Error> {
    let uri = element
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute(format!("{}/@Algorithm", ns::node::TRANSFORM)))?;
    match uri {
        algorithm::ENVELOPED_SIGNATURE => Ok(Box::new(EnvelopedSignatureTransform)),
        algorithm::BASE64 => Ok(Box::new(Base64DecodeTransform)),
        algorithm::C14N
        | algorithm::C14N_WITH_COMMENTS
        | algorithm::EXC_C14N
        | algorithm::EXC_C14N_WITH_COMMENTS => {
            Ok(Box::new(C14nTransform::new(sigill_c14n::from_element(element)?)))
        }
        _ => Err(Error::UnsupportedAlgorithm(format!("transform: {uri}"))),
    }
}

/// A pipeline of transforms executed in sequence.
#[derive(Debug, Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
        }
    }

    /// Add a transform to the pipeline.
    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Builder form of [`TransformPipeline::push`].
    pub fn with(mut self, transform: Box<dyn Transform>) -> Self {
        self.push(transform);
        self
    }

    /// Execute all transforms in order.
    pub fn execute(&self, input: TransformData, ctx: &TransformContext<'_>) -> Result<TransformData, Error> {
        let mut data = input;
        for transform in &self.transforms {
            tracing::debug!(transform = transform.uri(), "applying transform");
            data = transform.execute(data, ctx)?;
        }
        Ok(data)
    }

    /// Number of transforms in the pipeline.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Check if pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Transform> {
        self.transforms.iter().map(|t| t.as_ref())
    }

    /// Read a `<Transforms>` element. The transform count is checked against
    /// the policy before any transform is instantiated.
    pub fn from_element(transforms: &Element, policy: &ValidationPolicy) -> Result<Self, Error> {
        let children: Vec<&Element> = transforms.child_elements().collect();
        policy.check_transform_count(children.len())?;
        let mut pipeline = Self::new();
        for child in children {
            if !child.is(ns::DSIG, ns::node::TRANSFORM) {
                return Err(Error::XmlStructure(format!(
                    "unexpected <{}> in <Transforms>",
                    child.local_name()
                )));
            }
            pipeline.push(transform_from_element(child)?);
        }
        if pipeline.is_empty() {
            return Err(Error::MissingElement(ns::node::TRANSFORM.into()));
        }
        Ok(pipeline)
    }

    /// Build the `<Transforms>` element.
    pub fn to_element(&self) -> Element {
        let mut transforms = Element::dsig(ns::node::TRANSFORMS);
        for transform in &self.transforms {
            let mut el = Element::dsig(ns::node::TRANSFORM).with_attribute(ns::attr::ALGORITHM, transform.uri());
            transform.marshal_params(&mut el);
            transforms.push_element(el);
        }
        transforms
    }
}

// ── C14N Transform ───────────────────────────────────────────────────

/// A canonicalization transform.
#[derive(Debug)]
pub struct C14nTransform {
    method: C14nMethod,
}

impl C14nTransform {
    pub fn new(method: C14nMethod) -> Self {
        Self { method }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.method.uri()
    }

    fn execute(&self, input: TransformData, _ctx: &TransformContext<'_>) -> Result<TransformData, Error> {
        let element = match input {
            TransformData::Xml { element, .. } => element,
            TransformData::Binary(data) => {
                let doc = XmlDocument::parse_bytes(&data)
                    .map_err(|e| Error::Transform(format!("C14N input is not XML: {e}")))?;
                doc.root().clone()
            }
        };
        Ok(TransformData::Binary(self.method.canonicalize(&element)?))
    }

    fn marshal_params(&self, transform: &mut Element) {
        self.method.marshal_params(transform);
    }
}
