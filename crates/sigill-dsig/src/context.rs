#![forbid(unsafe_code)]

//! DSig context: policy, collaborators and URI resolution settings for
//! signature operations.

use sigill_core::ValidationPolicy;
use sigill_crypto::{EngineProvider, RustCryptoProvider};
use sigill_transforms::{DefaultDereferencer, Dereferencer, TransformContext};
use sigill_xml::{NodePath, XmlDocument};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Context for XML-DSig operations.
#[derive(Debug, Clone)]
pub struct DsigContext {
    /// Validation policy applied while parsing and verifying.
    pub policy: ValidationPolicy,
    /// Source of signature engines.
    pub provider: Arc<dyn EngineProvider>,
    /// Resolves reference and retrieval URIs.
    pub dereferencer: Arc<dyn Dereferencer>,
    /// Additional ID attribute names to register.
    pub id_attrs: Vec<String>,
    /// URL-to-file mappings for external URI resolution.
    pub url_maps: HashMap<String, PathBuf>,
    /// Base directory for resolving relative external URI references.
    pub base_dir: Option<PathBuf>,
}

impl Default for DsigContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DsigContext {
    /// A context with the default policy, the RustCrypto engines and the
    /// built-in dereferencer.
    pub fn new() -> Self {
        Self {
            policy: ValidationPolicy::default(),
            provider: Arc::new(RustCryptoProvider::new()),
            dereferencer: Arc::new(DefaultDereferencer),
            id_attrs: Vec::new(),
            url_maps: HashMap::new(),
            base_dir: None,
        }
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn EngineProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_dereferencer(mut self, dereferencer: Arc<dyn Dereferencer>) -> Self {
        self.dereferencer = dereferencer;
        self
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Add an ID attribute name to register during processing.
    pub fn add_id_attr(&mut self, name: &str) {
        if !self.id_attrs.iter().any(|a| a == name) {
            self.id_attrs.push(name.to_owned());
        }
    }

    /// Map an external URI to a local file path.
    pub fn add_url_map(&mut self, url: &str, file_path: impl AsRef<Path>) {
        self.url_maps.insert(url.to_owned(), file_path.as_ref().to_path_buf());
    }

    pub fn provider(&self) -> &dyn EngineProvider {
        self.provider.as_ref()
    }

    /// Transform context for processing the signature at `signature` in
    /// `document`.
    pub fn transform_context<'a>(
        &'a self,
        document: &'a XmlDocument,
        signature: &'a NodePath,
    ) -> TransformContext<'a> {
        let ctx = TransformContext::new(&self.policy, self.dereferencer.as_ref())
            .with_document(document)
            .with_signature_location(signature)
            .with_id_attrs(&self.id_attrs)
            .with_url_maps(&self.url_maps);
        match &self.base_dir {
            Some(dir) => ctx.with_base_dir(dir),
            None => ctx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_context_carries_settings() {
        let mut ctx = DsigContext::new().with_base_dir("/tmp/data");
        ctx.add_id_attr("wsu:Id");
        ctx.add_id_attr("wsu:Id");
        ctx.add_url_map("http://example.com/a.xml", "/tmp/a.xml");

        let doc = XmlDocument::parse("<root/>").unwrap();
        let path = NodePath::root();
        let tc = ctx.transform_context(&doc, &path);
        assert_eq!(tc.id_attrs, &["wsu:Id".to_owned()]);
        assert_eq!(tc.base_dir, Some(Path::new("/tmp/data")));
        assert_eq!(
            tc.url_maps.and_then(|m| m.get("http://example.com/a.xml")),
            Some(&PathBuf::from("/tmp/a.xml"))
        );
        assert!(tc.policy.secure_validation);
    }
}
