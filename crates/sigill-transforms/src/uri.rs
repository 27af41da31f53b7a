#![forbid(unsafe_code)]

//! URI resolution for XML-DSig references.
//!
//! Handles:
//! - Empty URI (""): the entire document minus comments
//! - Same-document references ("#id"): the identified subtree minus comments
//! - `#xpointer(/)` and `#xpointer(id('...'))`: as above, comments kept
//! - External references mapped to local files (url maps, base directory)

use crate::pipeline::TransformData;
use sigill_core::{Error, ValidationPolicy};
use sigill_xml::{xpath, NodePath, XmlDocument};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Resolves a URI to data.
pub trait Dereferencer: Send + Sync + fmt::Debug {
    fn dereference(&self, uri: &str, ctx: &TransformContext<'_>) -> Result<TransformData, Error>;
}

/// Everything transforms and dereferencers may consult while processing
/// one signature.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub policy: &'a ValidationPolicy,
    pub dereferencer: &'a dyn Dereferencer,
    /// The document holding the signature, for same-document references.
    pub document: Option<&'a XmlDocument>,
    /// Location of the `<Signature>` being processed within `document`.
    pub signature_location: Option<&'a NodePath>,
    /// Additional ID attribute names.
    pub id_attrs: &'a [String],
    /// External URI → local file.
    pub url_maps: Option<&'a HashMap<String, PathBuf>>,
    /// Directory relative URIs are resolved against.
    pub base_dir: Option<&'a Path>,
}

impl<'a> TransformContext<'a> {
    pub fn new(policy: &'a ValidationPolicy, dereferencer: &'a dyn Dereferencer) -> Self {
        Self {
            policy,
            dereferencer,
            document: None,
            signature_location: None,
            id_attrs: &[],
            url_maps: None,
            base_dir: None,
        }
    }

    pub fn with_document(mut self, document: &'a XmlDocument) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_signature_location(mut self, location: &'a NodePath) -> Self {
        self.signature_location = Some(location);
        self
    }

    pub fn with_id_attrs(mut self, id_attrs: &'a [String]) -> Self {
        self.id_attrs = id_attrs;
        self
    }

    pub fn with_url_maps(mut self, url_maps: &'a HashMap<String, PathBuf>) -> Self {
        self.url_maps = Some(url_maps);
        self
    }

    pub fn with_base_dir(mut self, base_dir: &'a Path) -> Self {
        self.base_dir = Some(base_dir);
        self
    }

    /// Resolve `uri` with the context's dereferencer.
    pub fn dereference(&self, uri: &str) -> Result<TransformData, Error> {
        self.dereferencer.dereference(uri, self)
    }

    fn require_document(&self, uri: &str) -> Result<&'a XmlDocument, Error> {
        self.document
            .ok_or_else(|| Error::InvalidUri(format!("no document to resolve {uri:?} against")))
    }

    fn find_by_id(&self, id: &str) -> Result<(NodePath, &'a XmlDocument), Error> {
        let document = self.require_document(id)?;
        let mut names = document.id_attrs();
        names.extend(self.id_attrs.iter().map(String::as_str));
        let (path, _) = document
            .root()
            .find_by_id(id, &names)
            .ok_or_else(|| Error::InvalidUri(format!("ID not found: {id}")))?;
        Ok((path, document))
    }
}

/// The built-in dereferencer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDereferencer;

impl Dereferencer for DefaultDereferencer {
    fn dereference(&self, uri: &str, ctx: &TransformContext<'_>) -> Result<TransformData, Error> {
        tracing::debug!(uri, "dereferencing");
        if uri.is_empty() {
            // Whole document minus comments
            let document = ctx.require_document(uri)?;
            return subtree(document, NodePath::root(), false);
        }
        if let Some(fragment) = xpath::parse_same_document_ref(uri) {
            if xpath::is_xpointer_root(fragment) {
                let document = ctx.require_document(uri)?;
                return subtree(document, NodePath::root(), true);
            }
            if let Some(id) = xpath::parse_xpointer_id(fragment) {
                let (path, document) = ctx.find_by_id(id)?;
                return subtree(document, path, true);
            }
            if fragment.starts_with("xpointer(") {
                return Err(Error::InvalidUri(format!("unsupported XPointer: {uri}")));
            }
            let (path, document) = ctx.find_by_id(fragment)?;
            return subtree(document, path, false);
        }
        if let Some(file) = ctx.url_maps.and_then(|maps| maps.get(uri)) {
            return read_file(file);
        }
        if !uri.contains(':') {
            if let Some(base) = ctx.base_dir {
                return read_file(&base.join(uri));
            }
        }
        Err(Error::InvalidUri(format!("external URI not supported: {uri}")))
    }
}

fn subtree(document: &XmlDocument, path: NodePath, with_comments: bool) -> Result<TransformData, Error> {
    let mut element = document.detach(&path)?;
    if !with_comments {
        element.strip_comments();
    }
    Ok(TransformData::Xml {
        element,
        location: Some(path),
    })
}

fn read_file(path: &Path) -> Result<TransformData, Error> {
    let data = std::fs::read(path).map_err(|e| {
        Error::InvalidUri(format!("cannot read {}: {e}", path.display()))
    })?;
    Ok(TransformData::Binary(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigill_c14n::{C14nMethod, C14nMode, CanonicalizationMethod};
    use sigill_xml::Node;

    const DOC: &str = r#"<root xmlns:p="urn:p"><!--c--><p:item Id="i1"><!--inner-->x</p:item><other wsu:Id="w" xmlns:wsu="urn:wsu"/></root>"#;

    fn canonical(data: TransformData) -> String {
        String::from_utf8(data.to_binary().unwrap()).unwrap()
    }

    /// Canonical XML 1.0 with comments, so retained comments show up.
    fn canonical_with_comments(data: TransformData) -> String {
        let element = data.root_element().unwrap();
        let method = C14nMethod::new(C14nMode::InclusiveWithComments);
        String::from_utf8(method.canonicalize(element).unwrap()).unwrap()
    }

    #[test]
    fn test_empty_uri_is_whole_document_without_comments() {
        let doc = XmlDocument::parse(DOC).unwrap();
        let policy = ValidationPolicy::default();
        let ctx = TransformContext::new(&policy, &DefaultDereferencer).with_document(&doc);
        let out = canonical(ctx.dereference("").unwrap());
        assert!(!out.contains("<!--"));
        assert!(out.starts_with("<root xmlns:p=\"urn:p\">"));
    }

    #[test]
    fn test_id_and_xpointer_id() {
        let doc = XmlDocument::parse(DOC).unwrap();
        let policy = ValidationPolicy::default();
        let ctx = TransformContext::new(&policy, &DefaultDereferencer).with_document(&doc);
        // A bare ID reference drops comments
        assert_eq!(
            canonical_with_comments(ctx.dereference("#i1").unwrap()),
            r#"<p:item xmlns:p="urn:p" Id="i1">x</p:item>"#
        );

        // The XPointer form keeps them
        let data = ctx.dereference("#xpointer(id('i1'))").unwrap();
        assert!(matches!(
            data.root_element().unwrap().children().first(),
            Some(Node::Comment(text)) if text == "inner"
        ));
        assert_eq!(
            canonical_with_comments(data.clone()),
            r#"<p:item xmlns:p="urn:p" Id="i1"><!--inner-->x</p:item>"#
        );
        // Octet conversion for digesting is always without comments
        assert_eq!(canonical(data), r#"<p:item xmlns:p="urn:p" Id="i1">x</p:item>"#);
        assert!(matches!(ctx.dereference("#nope"), Err(Error::InvalidUri(_))));
    }

    #[test]
    fn test_namespaced_id_attribute_is_not_matched() {
        let doc = XmlDocument::parse(DOC).unwrap();
        let policy = ValidationPolicy::default();
        let extra = vec!["Id".to_owned()];
        let ctx = TransformContext::new(&policy, &DefaultDereferencer)
            .with_document(&doc)
            .with_id_attrs(&extra);
        // Namespaced ID attributes are not matched by local name
        assert!(ctx.dereference("#w").is_err());
    }

    #[test]
    fn test_external_uri_rejected_without_mapping() {
        let policy = ValidationPolicy::default();
        let ctx = TransformContext::new(&policy, &DefaultDereferencer);
        assert!(matches!(
            ctx.dereference("http://example.com/doc.xml"),
            Err(Error::InvalidUri(_))
        ));
    }

    #[test]
    fn test_url_map_reads_file() {
        let dir = std::env::temp_dir().join(format!("sigill-uri-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("data.bin");
        std::fs::write(&file, b"payload").unwrap();
        let mut maps = HashMap::new();
        maps.insert("http://example.com/data".to_owned(), file.clone());

        let policy = ValidationPolicy::default();
        let ctx = TransformContext::new(&policy, &DefaultDereferencer).with_url_maps(&maps);
        assert_eq!(
            ctx.dereference("http://example.com/data").unwrap(),
            TransformData::Binary(b"payload".to_vec())
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
