#![forbid(unsafe_code)]

//! Serialization of an owned [`Element`] tree back to XML text.
//!
//! The writer adds a namespace declaration wherever an element or attribute
//! uses a prefix that is not bound to the same URI by an enclosing element,
//! so trees built in code (without explicit declarations) serialize to
//! namespace-well-formed XML.

use crate::element::{Element, Namespace, Node};
use crate::escape::{write_attr, write_pi, write_text};

/// Serialize `element` with no namespaces in scope.
pub fn to_xml(element: &Element) -> String {
    to_xml_in_scope(element, &[])
}

/// Serialize `element` as if it were placed below ancestors declaring `scope`.
pub fn to_xml_in_scope(element: &Element, scope: &[Namespace]) -> String {
    let mut out = String::new();
    let mut scope = scope.to_vec();
    write_element(&mut out, element, &mut scope);
    out
}

/// Serialize `element` as a standalone document with an XML declaration.
pub fn to_document_string(element: &Element) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&to_xml(element));
    out
}

fn bound(scope: &[Namespace], prefix: Option<&str>) -> Option<String> {
    scope
        .iter()
        .rev()
        .find(|n| n.prefix.as_deref() == prefix)
        .map(|n| n.uri.clone())
}

fn write_element(out: &mut String, element: &Element, scope: &mut Vec<Namespace>) {
    let mark = scope.len();
    let outer: &[Namespace] = scope;
    let mut declared: Vec<Namespace> = Vec::new();

    for decl in element.namespaces() {
        if bound(outer, decl.prefix.as_deref()).as_deref() != Some(decl.uri.as_str()) {
            declared.push(decl.clone());
        }
    }

    let require = |prefix: Option<&str>, uri: &str, declared: &mut Vec<Namespace>| {
        if prefix == Some("xml") {
            return;
        }
        let visible = declared
            .iter()
            .rev()
            .find(|n| n.prefix.as_deref() == prefix)
            .map(|n| n.uri.clone())
            .or_else(|| bound(outer, prefix));
        if visible.as_deref() != Some(uri) {
            declared.retain(|n| n.prefix.as_deref() != prefix);
            declared.push(Namespace::new(prefix, uri));
        }
    };

    match element.namespace() {
        Some(uri) => require(element.prefix(), uri, &mut declared),
        None => {
            // An unqualified element must not inherit a default namespace
            if bound(outer, None).is_some_and(|u| !u.is_empty())
                || declared.iter().any(|n| n.prefix.is_none() && !n.uri.is_empty())
            {
                declared.retain(|n| n.prefix.is_some());
                declared.push(Namespace::new(None, ""));
            }
        }
    }
    for attr in element.attributes() {
        if let (Some(prefix), Some(uri)) = (attr.prefix.as_deref(), attr.namespace.as_deref()) {
            require(Some(prefix), uri, &mut declared);
        }
    }

    out.push('<');
    out.push_str(&element.qualified_name());
    for decl in &declared {
        match &decl.prefix {
            Some(p) => {
                out.push_str(" xmlns:");
                out.push_str(p);
            }
            None => out.push_str(" xmlns"),
        }
        out.push_str("=\"");
        write_attr(out, &decl.uri);
        out.push('"');
    }
    for attr in element.attributes() {
        out.push(' ');
        out.push_str(&attr.qualified_name());
        out.push_str("=\"");
        write_attr(out, &attr.value);
        out.push('"');
    }

    if element.children().is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');

    scope.extend(declared);
    for child in element.children() {
        match child {
            Node::Element(e) => write_element(out, e, scope),
            Node::Text(t) => write_text(out, t),
            Node::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            Node::ProcessingInstruction { target, data } => {
                out.push_str("<?");
                out.push_str(target);
                if let Some(d) = data {
                    out.push(' ');
                    write_pi(out, d);
                }
                out.push_str("?>");
            }
        }
    }
    scope.truncate(mark);

    out.push_str("</");
    out.push_str(&element.qualified_name());
    out.push('>');
}
