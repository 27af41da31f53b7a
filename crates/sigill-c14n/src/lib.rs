#![forbid(unsafe_code)]

//! XML Canonicalization (C14N) for the Sigill XML-DSig library.
//!
//! Implements four W3C canonicalization variants over owned element trees:
//! - Canonical XML 1.0 (with and without comments)
//! - Exclusive Canonical XML 1.0 (with and without comments)
//!
//! Callers hold canonicalizers as [`CanonicalizationMethod`] trait objects,
//! so other algorithms can be plugged in without touching this crate.

pub mod exclusive;
pub mod inclusive;
pub mod render;

use sigill_core::{algorithm, ns, Error};
use sigill_xml::Element;
use std::fmt;
use std::sync::Arc;

/// A canonicalization algorithm producing canonical bytes from a subtree.
pub trait CanonicalizationMethod: Send + Sync + fmt::Debug {
    /// Algorithm URI written to the `Algorithm` attribute.
    fn uri(&self) -> &str;

    /// Canonicalize the subtree rooted at `element`.
    ///
    /// `element` must carry the namespace declarations inherited from its
    /// ancestors (see [`Element::detach`]).
    fn canonicalize(&self, element: &Element) -> Result<Vec<u8>, Error>;

    /// Append algorithm parameters as children of the method element.
    fn marshal_params(&self, _method: &mut Element) {}
}

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    /// Canonical XML 1.0
    Inclusive,
    /// Canonical XML 1.0 with comments
    InclusiveWithComments,
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    /// Get the algorithm URI for this mode.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => algorithm::C14N,
            Self::InclusiveWithComments => algorithm::C14N_WITH_COMMENTS,
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a C14N mode from an algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::C14N => Some(Self::Inclusive),
            algorithm::C14N_WITH_COMMENTS => Some(Self::InclusiveWithComments),
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(self, Self::InclusiveWithComments | Self::ExclusiveWithComments)
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }
}

/// Canonicalize the subtree rooted at `element`.
///
/// `inclusive_prefixes` only applies to the exclusive modes.
pub fn canonicalize(element: &Element, mode: C14nMode, inclusive_prefixes: &[String]) -> Vec<u8> {
    let out = if mode.is_exclusive() {
        exclusive::canonicalize(element, mode.with_comments(), inclusive_prefixes)
    } else {
        inclusive::canonicalize(element, mode.with_comments())
    };
    tracing::debug!(mode = mode.uri(), len = out.len(), "canonicalized subtree");
    out
}

/// One of the built-in canonicalization algorithms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct C14nMethod {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nMethod {
    pub fn new(mode: C14nMode) -> Self {
        Self {
            mode,
            inclusive_prefixes: Vec::new(),
        }
    }

    /// Exclusive C14N with an InclusiveNamespaces PrefixList.
    pub fn exclusive_with_prefixes(with_comments: bool, prefixes: Vec<String>) -> Self {
        let mode = if with_comments {
            C14nMode::ExclusiveWithComments
        } else {
            C14nMode::Exclusive
        };
        Self {
            mode,
            inclusive_prefixes: prefixes,
        }
    }

    /// Look up a built-in algorithm by URI.
    pub fn from_uri(uri: &str) -> Result<Self, Error> {
        C14nMode::from_uri(uri)
            .map(Self::new)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("canonicalization method {uri}")))
    }

    pub fn mode(&self) -> C14nMode {
        self.mode
    }

    pub fn inclusive_prefixes(&self) -> &[String] {
        &self.inclusive_prefixes
    }

    pub fn into_shared(self) -> Arc<dyn CanonicalizationMethod> {
        Arc::new(self)
    }
}

impl CanonicalizationMethod for C14nMethod {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn canonicalize(&self, element: &Element) -> Result<Vec<u8>, Error> {
        Ok(canonicalize(element, self.mode, &self.inclusive_prefixes))
    }

    fn marshal_params(&self, method: &mut Element) {
        if self.mode.is_exclusive() && !self.inclusive_prefixes.is_empty() {
            let list = Element::new_ns(ns::EXC_C14N, Some("ec"), ns::node::INCLUSIVE_NAMESPACES)
                .with_attribute(ns::attr::PREFIX_LIST, &self.inclusive_prefixes.join(" "));
            method.push_element(list);
        }
    }
}

/// Read a method element carrying an `Algorithm` attribute (a
/// `CanonicalizationMethod` or a `Transform`) into a canonicalizer.
pub fn from_element(method: &Element) -> Result<C14nMethod, Error> {
    let uri = method
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute(ns::attr::ALGORITHM.into()))?;
    let mut c14n = C14nMethod::from_uri(uri)?;
    if c14n.mode.is_exclusive() {
        if let Some(list) = method.find_child(ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES) {
            c14n.inclusive_prefixes = list
                .attribute(ns::attr::PREFIX_LIST)
                .unwrap_or("")
                .split_whitespace()
                .map(str::to_owned)
                .collect();
        }
    }
    Ok(c14n)
}
