#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! The key difference from inclusive C14N: only "visibly utilized" namespace
//! declarations are output.  A namespace is visibly utilized if:
//! 1. Its prefix is used by the element's tag name, OR
//! 2. Its prefix is used by one of the element's attributes, OR
//! 3. The prefix appears in the InclusiveNamespaces PrefixList, OR
//! 4. It's the default namespace and the element is in that namespace.

use crate::render::{self, NsDecl, Scope};
use sigill_xml::{escape, Element, Node};
use std::collections::BTreeSet;

/// Canonicalize the subtree rooted at `apex` using Exclusive C14N 1.0.
///
/// `inclusive_prefixes` is the InclusiveNamespaces PrefixList; `#default`
/// names the default namespace.
pub fn canonicalize(apex: &Element, with_comments: bool, inclusive_prefixes: &[String]) -> Vec<u8> {
    let mut out = String::new();
    let ctx = ExcC14nContext {
        with_comments,
        inclusive_prefixes: inclusive_prefixes
            .iter()
            .map(|p| if p == "#default" { String::new() } else { p.clone() })
            .collect(),
    };
    ctx.process_element(apex, &Scope::new(), &Scope::new(), &mut out);
    out.into_bytes()
}

struct ExcC14nContext {
    with_comments: bool,
    inclusive_prefixes: BTreeSet<String>,
}

impl ExcC14nContext {
    fn utilized_prefixes(&self, element: &Element) -> BTreeSet<String> {
        let mut utilized = self.inclusive_prefixes.clone();
        utilized.insert(element.prefix().unwrap_or("").to_owned());
        for attr in element.attributes() {
            if let Some(prefix) = attr.prefix.as_deref() {
                if attr.namespace.is_some() && !prefix.is_empty() {
                    utilized.insert(prefix.to_owned());
                }
            }
        }
        utilized.remove("xml");
        utilized
    }

    fn process_element(&self, element: &Element, parent_scope: &Scope, rendered: &Scope, out: &mut String) {
        let scope = render::element_scope(element, parent_scope);

        let mut decls: Vec<NsDecl> = Vec::new();
        for prefix in self.utilized_prefixes(element) {
            match scope.get(&prefix) {
                Some(uri) => {
                    if rendered.get(&prefix) != Some(uri) {
                        decls.push(NsDecl {
                            prefix,
                            uri: uri.clone(),
                        });
                    }
                }
                None if prefix.is_empty() => {
                    // The default namespace was rendered non-empty by an ancestor
                    if rendered.get("").is_some_and(|u| !u.is_empty()) {
                        decls.push(NsDecl {
                            prefix,
                            uri: String::new(),
                        });
                    }
                }
                None => {}
            }
        }

        render::write_start_tag(out, element, &mut decls);

        let mut child_rendered = rendered.clone();
        for decl in &decls {
            child_rendered.insert(decl.prefix.clone(), decl.uri.clone());
        }

        for child in element.children() {
            match child {
                Node::Element(e) => self.process_element(e, &scope, &child_rendered, out),
                Node::Text(t) => escape::write_text(out, t),
                Node::Comment(c) => {
                    if self.with_comments {
                        render::write_comment(out, c);
                    }
                }
                Node::ProcessingInstruction { target, data } => {
                    render::write_pi(out, target, data.as_deref());
                }
            }
        }

        render::write_end_tag(out, element);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subtree(xml: &str, ns: &str, local: &str) -> Element {
        let doc = roxmltree::Document::parse(xml).unwrap();
        let root = Element::from_node(doc.root_element()).unwrap();
        let (path, _) = root.find_descendant(ns, local).unwrap();
        root.detach(&path).unwrap()
    }

    #[test]
    fn test_only_visibly_utilized_namespaces() {
        let apex = subtree(
            r#"<a xmlns:ds="urn:ds" xmlns:x="urn:x" xmlns="urn:default"><ds:Info><ds:Ref/></ds:Info></a>"#,
            "urn:ds",
            "Info",
        );
        assert_eq!(
            String::from_utf8(canonicalize(&apex, false, &[])).unwrap(),
            r#"<ds:Info xmlns:ds="urn:ds"><ds:Ref></ds:Ref></ds:Info>"#
        );
    }

    #[test]
    fn test_inclusive_prefix_list() {
        let apex = subtree(
            r#"<a xmlns:ds="urn:ds" xmlns:x="urn:x"><ds:Info/></a>"#,
            "urn:ds",
            "Info",
        );
        let out = canonicalize(&apex, false, &["x".to_owned()]);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<ds:Info xmlns:ds="urn:ds" xmlns:x="urn:x"></ds:Info>"#
        );
    }

    #[test]
    fn test_attribute_prefix_is_utilized() {
        let apex = subtree(
            r#"<a xmlns:p="urn:p"><b p:at="v"/></a>"#,
            "",
            "b",
        );
        assert_eq!(
            String::from_utf8(canonicalize(&apex, false, &[])).unwrap(),
            r#"<b xmlns:p="urn:p" p:at="v"></b>"#
        );
    }

    #[test]
    fn test_code_built_tree_matches_parsed_form() {
        let built = Element::dsig("SignedInfo").with_child(Element::dsig("Reference").with_attribute("URI", ""));
        let parsed = subtree(
            r#"<ds:SignedInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:Reference URI=""/></ds:SignedInfo>"#,
            "http://www.w3.org/2000/09/xmldsig#",
            "SignedInfo",
        );
        assert_eq!(canonicalize(&built, false, &[]), canonicalize(&parsed, false, &[]));
    }
}
