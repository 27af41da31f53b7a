#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 (C14N 1.0).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! The canonical form:
//! - Outputs namespace declarations sorted by prefix (default first)
//! - Outputs attributes sorted by (namespace-URI, local-name)
//! - Escapes text and attribute values per C14N rules
//! - Optionally preserves or strips comments
//!
//! The apex element renders every namespace in scope at it, which is what
//! canonicalizing a subtree of a larger document requires.

use crate::render::{self, NsDecl, Scope};
use sigill_xml::{escape, Element, Node};

/// Canonicalize the subtree rooted at `apex`.
pub fn canonicalize(apex: &Element, with_comments: bool) -> Vec<u8> {
    let mut out = String::new();
    let ctx = C14nContext { with_comments };
    ctx.process_element(apex, &Scope::new(), &Scope::new(), &mut out);
    out.into_bytes()
}

struct C14nContext {
    with_comments: bool,
}

impl C14nContext {
    fn process_element(&self, element: &Element, parent_scope: &Scope, rendered: &Scope, out: &mut String) {
        let scope = render::element_scope(element, parent_scope);

        let mut decls: Vec<NsDecl> = scope
            .iter()
            .filter(|(prefix, uri)| rendered.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl {
                prefix: prefix.clone(),
                uri: uri.clone(),
            })
            .collect();
        if !scope.contains_key("") && rendered.get("").is_some_and(|u| !u.is_empty()) {
            decls.push(NsDecl {
                prefix: String::new(),
                uri: String::new(),
            });
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
