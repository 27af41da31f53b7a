#![forbid(unsafe_code)]

//! Owned XML element tree.
//!
//! Elements remember their own prefix, namespace and namespace
//! declarations, so a subtree detached from its document can still be
//! canonicalized once the declarations inherited from its ancestors have
//! been materialized on it (see [`Element::detach`]).

use sigill_core::{ns, Error};

/// A namespace binding. `prefix` is `None` for the default namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub prefix: Option<String>,
    pub uri: String,
}

impl Namespace {
    pub fn new(prefix: Option<&str>, uri: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_owned),
            uri: uri.to_owned(),
        }
    }
}

/// An attribute. Namespace declarations are never stored as attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub local_name: String,
    pub value: String,
}

impl Attribute {
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.local_name),
            None => self.local_name.clone(),
        }
    }
}

/// A child node of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: Option<String> },
}

/// Location of a node below some root element: child indices, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    /// The path of the root element itself.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of the `index`-th child of the node at this path.
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Path of the parent, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// The remainder of `self` below `ancestor`, if `ancestor` is a prefix.
    pub fn strip_prefix(&self, ancestor: &NodePath) -> Option<NodePath> {
        self.0
            .strip_prefix(ancestor.0.as_slice())
            .map(|rest| NodePath(rest.to_vec()))
    }
}

/// An XML element and its subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    prefix: Option<String>,
    local_name: String,
    namespace: Option<String>,
    namespaces: Vec<Namespace>,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

impl Element {
    /// Create an element with no namespace.
    pub fn new(local_name: &str) -> Self {
        Self {
            prefix: None,
            local_name: local_name.to_owned(),
            namespace: None,
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create an element in `namespace`, written with `prefix`.
    ///
    /// No declaration is added; the serializer and canonicalizers bind the
    /// prefix where it is not already in scope.
    pub fn new_ns(namespace: &str, prefix: Option<&str>, local_name: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_owned),
            local_name: local_name.to_owned(),
            namespace: Some(namespace.to_owned()),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create an element in the XML-DSig namespace with the `ds` prefix.
    pub fn dsig(local_name: &str) -> Self {
        Self::new_ns(ns::DSIG, Some(ns::DSIG_PREFIX), local_name)
    }

    /// Create an element in the XML-DSig 1.1 namespace with the `dsig11` prefix.
    pub fn dsig11(local_name: &str) -> Self {
        Self::new_ns(ns::DSIG11, Some(ns::DSIG11_PREFIX), local_name)
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.local_name),
            None => self.local_name.clone(),
        }
    }

    /// Namespace declarations made on this element.
    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    /// True if this element has the given namespace and local name.
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref().unwrap_or("") == namespace
    }

    /// Value of an attribute without namespace.
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Direct child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Direct child elements with their index in [`Element::children`].
    pub fn indexed_child_elements(&self) -> impl Iterator<Item = (usize, &Element)> {
        self.children.iter().enumerate().filter_map(|(i, c)| match c {
            Node::Element(e) => Some((i, e)),
            _ => None,
        })
    }

    pub fn first_child_element(&self) -> Option<&Element> {
        self.child_elements().next()
    }

    /// First direct child with the given namespace and local name.
    pub fn find_child(&self, namespace: &str, local_name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.is(namespace, local_name))
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Set (or replace) an attribute without namespace.
    pub fn set_attribute(&mut self, local_name: &str, value: &str) {
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.namespace.is_none() && a.local_name == local_name)
        {
            existing.value = value.to_owned();
            return;
        }
        self.attributes.push(Attribute {
            prefix: None,
            namespace: None,
            local_name: local_name.to_owned(),
            value: value.to_owned(),
        });
    }

    /// Add an attribute, namespaced or not.
    pub fn push_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Declare a namespace on this element, replacing a declaration of the
    /// same prefix.
    pub fn declare_namespace(&mut self, prefix: Option<&str>, uri: &str) {
        let prefix = prefix.map(str::to_owned);
        if let Some(existing) = self.namespaces.iter_mut().find(|n| n.prefix == prefix) {
            existing.uri = uri.to_owned();
            return;
        }
        self.namespaces.push(Namespace {
            prefix,
            uri: uri.to_owned(),
        });
    }

    pub fn push_element(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn push_text(&mut self, text: &str) {
        self.children.push(Node::Text(text.to_owned()));
    }

    /// Builder form of [`Element::set_attribute`].
    pub fn with_attribute(mut self, local_name: &str, value: &str) -> Self {
        self.set_attribute(local_name, value);
        self
    }

    /// Builder form of [`Element::push_element`].
    pub fn with_child(mut self, child: Element) -> Self {
        self.push_element(child);
        self
    }

    /// Builder form of [`Element::push_text`].
    pub fn with_text(mut self, text: &str) -> Self {
        self.push_text(text);
        self
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children = vec![Node::Text(text.to_owned())];
    }

    /// Drop comment nodes from the whole subtree.
    pub fn strip_comments(&mut self) {
        self.children.retain(|c| !matches!(c, Node::Comment(_)));
        for child in &mut self.children {
            if let Node::Element(e) = child {
                e.strip_comments();
            }
        }
    }

    // ── Paths ────────────────────────────────────────────────────────

    /// The element at `path` below (or equal to) this one.
    pub fn at_path(&self, path: &NodePath) -> Option<&Element> {
        let mut current = self;
        for &index in path.indices() {
            match current.children.get(index) {
                Some(Node::Element(e)) => current = e,
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn at_path_mut(&mut self, path: &NodePath) -> Option<&mut Element> {
        let mut current = self;
        for &index in path.indices() {
            match current.children.get_mut(index) {
                Some(Node::Element(e)) => current = e,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Remove and return the node at `path`. The root cannot be removed.
    pub fn remove_at(&mut self, path: &NodePath) -> Option<Node> {
        let parent_path = path.parent()?;
        let index = *path.indices().last()?;
        let parent = self.at_path_mut(&parent_path)?;
        if index < parent.children.len() {
            Some(parent.children.remove(index))
        } else {
            None
        }
    }

    /// Append `child` to the element at `parent` and return the new path.
    pub fn append_at(&mut self, parent: &NodePath, child: Element) -> Result<NodePath, Error> {
        let target = self
            .at_path_mut(parent)
            .ok_or_else(|| Error::XmlStructure("append target does not exist".into()))?;
        target.children.push(Node::Element(child));
        Ok(parent.child(target.children.len() - 1))
    }

    /// Namespace declarations visible to the element at `path` from its
    /// ancestors (not including its own declarations). Inner declarations
    /// shadow outer ones.
    pub fn inherited_scope(&self, path: &NodePath) -> Vec<Namespace> {
        let mut scope: Vec<Namespace> = Vec::new();
        let mut current = self;
        for &index in path.indices() {
            merge_scope(&mut scope, &current.namespaces);
            match current.children.get(index) {
                Some(Node::Element(e)) => current = e,
                _ => break,
            }
        }
        scope
    }

    /// Clone the element at `path` with every inherited declaration
    /// materialized on the copy, so it canonicalizes as it would in place.
    pub fn detach(&self, path: &NodePath) -> Option<Element> {
        let target = self.at_path(path)?;
        let mut copy = target.clone();
        copy.inherit_namespaces(&self.inherited_scope(path));
        Some(copy)
    }

    /// Declare each binding of `scope` that this element does not already
    /// declare itself.
    pub fn inherit_namespaces(&mut self, scope: &[Namespace]) {
        for binding in scope {
            if !self.namespaces.iter().any(|n| n.prefix == binding.prefix) {
                self.namespaces.push(binding.clone());
            }
        }
    }

    /// First element (document order, including `self`) whose ID attribute
    /// equals `id`.
    pub fn find_by_id(&self, id: &str, id_attrs: &[&str]) -> Option<(NodePath, &Element)> {
        let mut stack: Vec<(NodePath, &Element)> = vec![(NodePath::root(), self)];
        while let Some((path, element)) = stack.pop() {
            if id_attrs.iter().any(|name| element.attribute(name) == Some(id)) {
                return Some((path, element));
            }
            let children: Vec<(usize, &Element)> = element.indexed_child_elements().collect();
            for (index, child) in children.into_iter().rev() {
                stack.push((path.child(index), child));
            }
        }
        None
    }

    /// First descendant-or-self element with the given name, in document order.
    pub fn find_descendant(&self, namespace: &str, local_name: &str) -> Option<(NodePath, &Element)> {
        let mut stack: Vec<(NodePath, &Element)> = vec![(NodePath::root(), self)];
        while let Some((path, element)) = stack.pop() {
            if element.is(namespace, local_name) {
                return Some((path, element));
            }
            let children: Vec<(usize, &Element)> = element.indexed_child_elements().collect();
            for (index, child) in children.into_iter().rev() {
                stack.push((path.child(index), child));
            }
        }
        None
    }

    // ── Parsing ──────────────────────────────────────────────────────

    /// Convert a `roxmltree` element (and its subtree) into an owned tree.
    ///
    /// Every namespace in scope at `node` is declared on the returned root.
    pub fn from_node(node: roxmltree::Node<'_, '_>) -> Result<Element, Error> {
        if !node.is_element() {
            return Err(Error::XmlStructure("expected an element node".into()));
        }
        let mut root = convert(node, None);
        root.namespaces = node
            .namespaces()
            .filter(|n| n.name() != Some("xml"))
            .map(|n| Namespace::new(n.name(), n.uri()))
            .collect();
        Ok(root)
    }
}

fn merge_scope(scope: &mut Vec<Namespace>, declarations: &[Namespace]) {
    for decl in declarations {
        if let Some(existing) = scope.iter_mut().find(|n| n.prefix == decl.prefix) {
            existing.uri = decl.uri.clone();
        } else {
            scope.push(decl.clone());
        }
    }
}

fn convert(node: roxmltree::Node<'_, '_>, parent: Option<roxmltree::Node<'_, '_>>) -> Element {
    let tag = node.tag_name();
    let namespaces = node
        .namespaces()
        .filter(|n| n.name() != Some("xml"))
        .filter(|n| match parent {
            Some(p) => !p
                .namespaces()
                .any(|pn| pn.name() == n.name() && pn.uri() == n.uri()),
            None => true,
        })
        .map(|n| Namespace::new(n.name(), n.uri()))
        .collect();

    let attributes = node
        .attributes()
        .map(|a| Attribute {
            prefix: a.namespace().and_then(|uri| attribute_prefix(node, uri)),
            namespace: a.namespace().map(str::to_owned),
            local_name: a.name().to_owned(),
            value: a.value().to_owned(),
        })
        .collect();

    let mut children = Vec::new();
    for child in node.children() {
        match child.node_type() {
            roxmltree::NodeType::Element => {
                children.push(Node::Element(convert(child, Some(node))));
            }
            roxmltree::NodeType::Text => {
                children.push(Node::Text(child.text().unwrap_or("").to_owned()));
            }
            roxmltree::NodeType::Comment => {
                children.push(Node::Comment(child.text().unwrap_or("").to_owned()));
            }
            roxmltree::NodeType::PI => {
                if let Some(pi) = child.pi() {
                    children.push(Node::ProcessingInstruction {
                        target: pi.target.to_owned(),
                        data: pi.value.map(str::to_owned),
                    });
                }
            }
            roxmltree::NodeType::Root => {}
        }
    }

    Element {
        prefix: element_prefix(node),
        local_name: tag.name().to_owned(),
        namespace: tag.namespace().map(str::to_owned),
        namespaces,
        attributes,
        children,
    }
}

/// Read the prefix of an element's start tag from the source text.
fn element_prefix(node: roxmltree::Node<'_, '_>) -> Option<String> {
    let text = node.document().input_text();
    let start = node.range().start + 1;
    let qname: &str = text
        .get(start..)?
        .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .next()?;
    qname.split_once(':').map(|(prefix, _)| prefix.to_owned())
}

fn attribute_prefix(node: roxmltree::Node<'_, '_>, uri: &str) -> Option<String> {
    if uri == ns::XML {
        return Some("xml".to_owned());
    }
    node.namespaces()
        .find(|n| n.uri() == uri && n.name().is_some())
        .and_then(|n| n.name())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Element {
        let doc = roxmltree::Document::parse(xml).unwrap();
        Element::from_node(doc.root_element()).unwrap()
    }

    #[test]
    fn test_parse_keeps_prefix_and_declarations() {
        let root = parse(r#"<ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#" Id="k1"><ds:KeyName>alice</ds:KeyName></ds:KeyInfo>"#);
        assert_eq!(root.prefix(), Some("ds"));
        assert!(root.is(ns::DSIG, "KeyInfo"));
        assert_eq!(root.attribute("Id"), Some("k1"));
        assert_eq!(root.namespaces().len(), 1);
        let name = root.find_child(ns::DSIG, "KeyName").unwrap();
        assert_eq!(name.text(), "alice");
        // Inherited declarations are not repeated on children
        assert!(name.namespaces().is_empty());
    }

    #[test]
    fn test_detach_materializes_inherited_scope() {
        let root = parse(r#"<a xmlns="urn:a" xmlns:p="urn:p"><b xmlns:q="urn:q"><p:c/></b></a>"#);
        let (path, _) = root.find_descendant("urn:p", "c").unwrap();
        let detached = root.detach(&path).unwrap();
        let prefixes: Vec<Option<&str>> =
            detached.namespaces().iter().map(|n| n.prefix.as_deref()).collect();
        assert!(prefixes.contains(&None));
        assert!(prefixes.contains(&Some("p")));
        assert!(prefixes.contains(&Some("q")));
    }

    #[test]
    fn test_find_by_id_in_document_order() {
        let root = parse(r#"<r><x Id="one"><y ID="two"/></x><z id="three"/></r>"#);
        let (path, el) = root.find_by_id("two", &["Id", "ID", "id"]).unwrap();
        assert_eq!(el.local_name(), "y");
        assert_eq!(path.indices(), &[0, 0]);
        assert!(root.find_by_id("missing", &["Id"]).is_none());
    }

    #[test]
    fn test_remove_and_append_by_path() {
        let mut root = parse("<r><a/><b/></r>");
        let removed = root.remove_at(&NodePath::from_indices(vec![0])).unwrap();
        assert!(matches!(removed, Node::Element(ref e) if e.local_name() == "a"));
        let path = root.append_at(&NodePath::root(), Element::new("c")).unwrap();
        assert_eq!(root.at_path(&path).unwrap().local_name(), "c");
        assert!(root.remove_at(&NodePath::root()).is_none());
    }

    #[test]
    fn test_strip_prefix_of_paths() {
        let outer = NodePath::from_indices(vec![1, 2]);
        let inner = NodePath::from_indices(vec![1, 2, 0, 3]);
        assert_eq!(inner.strip_prefix(&outer).unwrap().indices(), &[0, 3]);
        assert!(outer.strip_prefix(&inner).is_none());
    }
}
