#![forbid(unsafe_code)]

//! `<RetrievalMethod>`: key information stored elsewhere, fetched by URI
//! and passed through a transform chain.

use crate::x509data::X509Data;
use sigill_core::{ns, Error, ValidationPolicy};
use sigill_transforms::{TransformContext, TransformData, TransformPipeline};
use sigill_xml::{ChildCursor, Element};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RetrievalMethod {
    uri: String,
    type_: Option<String>,
    transforms: Arc<TransformPipeline>,
}

impl PartialEq for RetrievalMethod {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
            && self.type_ == other.type_
            && self.transforms.to_element() == other.transforms.to_element()
    }
}

impl RetrievalMethod {
    pub fn new(uri: &str, type_: Option<&str>, transforms: TransformPipeline) -> Self {
        Self {
            uri: uri.to_owned(),
            type_: type_.map(str::to_owned),
            transforms: Arc::new(transforms),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The `Type` attribute, for example the X509Data type URI.
    pub fn type_(&self) -> Option<&str> {
        self.type_.as_deref()
    }

    pub fn transforms(&self) -> &TransformPipeline {
        &self.transforms
    }

    /// Decode a `<RetrievalMethod>` element. The transform count is checked
    /// against `policy` before the transforms are built.
    pub fn unmarshal(element: &Element, policy: &ValidationPolicy) -> Result<Self, Error> {
        let uri = element
            .attribute(ns::attr::URI)
            .ok_or_else(|| Error::MissingAttribute("URI on RetrievalMethod".into()))?;
        let type_ = element.attribute(ns::attr::TYPE);

        let mut children = ChildCursor::new(element);
        let transforms = match children.optional(ns::DSIG, ns::node::TRANSFORMS) {
            Some(el) => TransformPipeline::from_element(el, policy)?,
            None => TransformPipeline::new(),
        };
        children.finish()?;

        Ok(Self::new(uri, type_, transforms))
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::dsig(ns::node::RETRIEVAL_METHOD).with_attribute(ns::attr::URI, &self.uri);
        if let Some(t) = &self.type_ {
            el.set_attribute(ns::attr::TYPE, t);
        }
        if !self.transforms.is_empty() {
            el.push_element(self.transforms.to_element());
        }
        el
    }

    /// Fetch the referenced data and run it through the transforms.
    ///
    /// Under secure validation the transform count is bounded and the
    /// result may not be another `<RetrievalMethod>`.
    pub fn dereference(&self, ctx: &TransformContext<'_>) -> Result<TransformData, Error> {
        ctx.policy.check_transform_count(self.transforms.len())?;

        let data = ctx.dereference(&self.uri)?;
        let data = self.transforms.execute(data, ctx)?;

        if ctx.policy.secure_validation {
            if let Some(root) = data.root_element() {
                if root.local_name() == ns::node::RETRIEVAL_METHOD {
                    tracing::warn!(uri = %self.uri, "RetrievalMethod points to another RetrievalMethod");
                    return Err(Error::RetrievalLoop(format!(
                        "RetrievalMethod {} resolves to another RetrievalMethod",
                        self.uri
                    )));
                }
            }
        }
        Ok(data)
    }

    /// Dereference and read the result as `<X509Data>`.
    ///
    /// Returns `Ok(None)` when the data is some other structure, so the
    /// caller can interpret it differently.
    pub fn dereference_as_xml_structure(
        &self,
        ctx: &TransformContext<'_>,
    ) -> Result<Option<X509Data>, Error> {
        let element = self.dereference(ctx)?.into_element()?;
        if element.is(ns::DSIG, ns::node::X509_DATA) {
            return X509Data::unmarshal(&element).map(Some);
        }
        tracing::debug!(root = element.local_name(), "retrieved structure is not X509Data");
        Ok(None)
    }
}
