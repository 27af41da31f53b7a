#![forbid(unsafe_code)]

//! Shared rendering utilities for C14N output.

use sigill_core::ns;
use sigill_xml::escape;
use sigill_xml::Element;
use std::collections::BTreeMap;

/// Prefix → URI bindings, with `""` standing for the default namespace.
pub type Scope = BTreeMap<String, String>;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// The prefix ("" for default namespace).
    pub prefix: String,
    /// The namespace URI.
    pub uri: String,
}

impl NsDecl {
    pub fn render(&self, out: &mut String) {
        if self.prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(&self.prefix);
            out.push_str("=\"");
        }
        escape::write_attr(out, &self.uri);
        out.push('"');
    }
}

impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Default namespace (empty prefix) sorts first, then by prefix.
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// The namespace URI of the attribute ("" for no namespace).
    pub ns_uri: String,
    pub local_name: String,
    /// The qualified name (prefix:local or just local).
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    pub fn render(&self, out: &mut String) {
        out.push(' ');
        out.push_str(&self.qualified_name);
        out.push_str("=\"");
        escape::write_attr(out, &self.value);
        out.push('"');
    }
}

impl Ord for Attr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Unqualified attributes first, then by (namespace URI, local name).
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then(self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The namespace scope of `element` given the scope of its parent.
///
/// Explicit declarations come first. A prefix used by the element or its
/// attributes but bound nowhere (trees built in code) is treated as declared
/// on the element itself. An empty default namespace undeclares it.
pub fn element_scope(element: &Element, parent: &Scope) -> Scope {
    let mut scope = parent.clone();
    for decl in element.namespaces() {
        let prefix = decl.prefix.clone().unwrap_or_default();
        if decl.uri.is_empty() {
            scope.remove(&prefix);
        } else {
            scope.insert(prefix, decl.uri.clone());
        }
    }
    match element.namespace() {
        Some(uri) => {
            let prefix = element.prefix().unwrap_or("").to_owned();
            if scope.get(&prefix).map(String::as_str) != Some(uri) {
                scope.insert(prefix, uri.to_owned());
            }
        }
        None => {
            scope.remove("");
        }
    }
    for attr in element.attributes() {
        if let (Some(prefix), Some(uri)) = (attr.prefix.as_deref(), attr.namespace.as_deref()) {
            if prefix != "xml" && scope.get(prefix).map(String::as_str) != Some(uri) {
                scope.insert(prefix.to_owned(), uri.to_owned());
            }
        }
    }
    scope
}

/// Sorted attributes of `element` ready for rendering.
pub fn sorted_attributes(element: &Element) -> Vec<Attr> {
    let mut attrs: Vec<Attr> = element
        .attributes()
        .iter()
        .map(|a| {
            let ns_uri = a.namespace.clone().unwrap_or_default();
            let qualified_name = if ns_uri == ns::XML {
                format!("xml:{}", a.local_name)
            } else {
                a.qualified_name()
            };
            Attr {
                ns_uri,
                local_name: a.local_name.clone(),
                qualified_name,
                value: a.value.clone(),
            }
        })
        .collect();
    attrs.sort();
    attrs
}

/// Write a start tag with the given declarations and the element's attributes.
pub fn write_start_tag(out: &mut String, element: &Element, decls: &mut [NsDecl]) {
    decls.sort();
    out.push('<');
    out.push_str(&element.qualified_name());
    for decl in decls.iter() {
        decl.render(out);
    }
    for attr in sorted_attributes(element) {
        attr.render(out);
    }
    out.push('>');
}

pub fn write_end_tag(out: &mut String, element: &Element) {
    out.push_str("</");
    out.push_str(&element.qualified_name());
    out.push('>');
}

pub fn write_comment(out: &mut String, text: &str) {
    out.push_str("<!--");
    out.push_str(text);
    out.push_str("-->");
}

pub fn write_pi(out: &mut String, target: &str, data: Option<&str>) {
    out.push_str("<?");
    out.push_str(target);
    if let Some(value) = data.filter(|d| !d.is_empty()) {
        out.push(' ');
        escape::write_pi(out, value);
    }
    out.push_str("?>");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_declarations_sort_default_first() {
        let mut decls = vec![
            NsDecl { prefix: "b".into(), uri: "urn:b".into() },
            NsDecl { prefix: "".into(), uri: "urn:d".into() },
            NsDecl { prefix: "a".into(), uri: "urn:a".into() },
        ];
        decls.sort();
        let order: Vec<&str> = decls.iter().map(|d| d.prefix.as_str()).collect();
        assert_eq!(order, vec!["", "a", "b"]);
    }

    #[test]
    fn test_implicit_prefix_binding() {
        let el = Element::dsig("SignedInfo");
        let scope = element_scope(&el, &Scope::new());
        assert_eq!(scope.get("ds").map(String::as_str), Some(ns::DSIG));
    }
}
