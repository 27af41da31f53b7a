#![forbid(unsafe_code)]

//! XML document wrapper with ID attribute registration.

use crate::element::{Element, NodePath};
use crate::writer;
use sigill_core::Error;

/// ID attribute names recognized on every document.
pub const DEFAULT_ID_ATTRS: [&str; 3] = ["Id", "ID", "id"];

/// An owned, mutable XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    root: Element,
    /// Additional ID attribute names to register (beyond the default `Id`, `ID`, `id`).
    extra_id_attrs: Vec<String>,
}

impl XmlDocument {
    /// Parse XML text.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let doc = roxmltree::Document::parse_with_options(text, crate::parsing_options())
            .map_err(|e| Error::XmlParse(e.to_string()))?;
        Ok(Self {
            root: Element::from_node(doc.root_element())?,
            extra_id_attrs: Vec::new(),
        })
    }

    /// Parse XML from bytes.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?;
        Self::parse(text)
    }

    /// Wrap an element tree as a document.
    pub fn from_root(root: Element) -> Self {
        Self {
            root,
            extra_id_attrs: Vec::new(),
        }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Register an additional ID attribute name.
    pub fn add_id_attr(&mut self, name: &str) {
        if !self.extra_id_attrs.iter().any(|a| a == name) {
            self.extra_id_attrs.push(name.to_owned());
        }
    }

    /// Every ID attribute name recognized on this document.
    pub fn id_attrs(&self) -> Vec<&str> {
        DEFAULT_ID_ATTRS
            .iter()
            .copied()
            .chain(self.extra_id_attrs.iter().map(String::as_str))
            .collect()
    }

    /// Find an element by ID value.
    pub fn find_by_id(&self, id: &str) -> Option<(NodePath, &Element)> {
        self.root.find_by_id(id, &self.id_attrs())
    }

    /// Find the first element with the given namespace and local name.
    pub fn find_element(&self, namespace: &str, local_name: &str) -> Option<(NodePath, &Element)> {
        self.root.find_descendant(namespace, local_name)
    }

    /// Element at `path`.
    pub fn get(&self, path: &NodePath) -> Option<&Element> {
        self.root.at_path(path)
    }

    /// Copy of the element at `path` carrying its inherited namespace scope.
    pub fn detach(&self, path: &NodePath) -> Result<Element, Error> {
        self.root
            .detach(path)
            .ok_or_else(|| Error::XmlStructure("node path does not resolve to an element".into()))
    }

    /// Serialize the document with an XML declaration.
    pub fn to_xml_string(&self) -> String {
        writer::to_document_string(&self.root)
    }
}
