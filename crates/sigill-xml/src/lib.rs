#![forbid(unsafe_code)]

//! XML document abstraction for the Sigill XML-DSig library.
//!
//! Documents are parsed with `roxmltree` and converted into an owned
//! [`Element`] tree that can be inspected, mutated, marshalled and
//! canonicalized. Subtrees are addressed by [`NodePath`].

pub mod cursor;
pub mod document;
pub mod element;
pub mod escape;
pub mod writer;
pub mod xpath;

pub use cursor::ChildCursor;
pub use document::XmlDocument;
pub use element::{Attribute, Element, Namespace, Node, NodePath};

/// Return roxmltree parsing options that allow DTD.
///
/// DTD is allowed because roxmltree does not expand external entities or
/// perform entity substitution beyond the five predefined XML entities.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}
