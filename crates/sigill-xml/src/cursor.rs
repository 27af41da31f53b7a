#![forbid(unsafe_code)]

//! Ordered reading of child elements.
//!
//! XML-DSig fixes the order of most child elements. [`ChildCursor`] walks
//! the element children of a parent front to back so decoders can take
//! optional and required children in schema order and reject leftovers.

use crate::element::Element;
use sigill_core::Error;
use std::iter::Peekable;

type ElementIter<'a> = Box<dyn Iterator<Item = &'a Element> + 'a>;

pub struct ChildCursor<'a> {
    parent: &'a Element,
    children: Peekable<ElementIter<'a>>,
}

impl<'a> ChildCursor<'a> {
    pub fn new(parent: &'a Element) -> Self {
        let children: ElementIter<'a> = Box::new(parent.child_elements());
        Self {
            parent,
            children: children.peekable(),
        }
    }

    /// The next child without consuming it.
    pub fn peek(&mut self) -> Option<&'a Element> {
        self.children.peek().copied()
    }

    /// Consume the next child if it has the given name.
    pub fn optional(&mut self, namespace: &str, local_name: &str) -> Option<&'a Element> {
        match self.peek() {
            Some(child) if child.is(namespace, local_name) => self.children.next(),
            _ => None,
        }
    }

    /// Consume the next child, which must have the given name.
    pub fn required(&mut self, namespace: &str, local_name: &str) -> Result<&'a Element, Error> {
        match self.peek() {
            Some(child) if child.is(namespace, local_name) => {
                self.children.next();
                Ok(child)
            }
            Some(child) => Err(Error::XmlStructure(format!(
                "expected <{local_name}> in <{}>, found <{}>",
                self.parent.local_name(),
                child.local_name()
            ))),
            None => Err(Error::MissingElement(format!(
                "{local_name} in {}",
                self.parent.local_name()
            ))),
        }
    }

    /// Fail if any child is left.
    pub fn finish(mut self) -> Result<(), Error> {
        match self.children.next() {
            Some(child) => Err(Error::XmlStructure(format!(
                "unexpected <{}> in <{}>",
                child.local_name(),
                self.parent.local_name()
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> Element {
        Element::new("p")
            .with_child(Element::new("a"))
            .with_child(Element::new("b"))
    }

    #[test]
    fn test_schema_order() {
        let p = parent();
        let mut cursor = ChildCursor::new(&p);
        assert!(cursor.optional("", "x").is_none());
        assert_eq!(cursor.required("", "a").unwrap().local_name(), "a");
        assert!(cursor.optional("", "b").is_some());
        cursor.finish().unwrap();
    }

    #[test]
    fn test_out_of_order_and_leftovers() {
        let p = parent();
        let mut cursor = ChildCursor::new(&p);
        assert!(matches!(cursor.required("", "b"), Err(Error::XmlStructure(_))));
        cursor.required("", "a").unwrap();
        assert!(matches!(cursor.finish(), Err(Error::XmlStructure(_))));

        let empty = Element::new("p");
        let mut cursor = ChildCursor::new(&empty);
        assert!(matches!(cursor.required("", "a"), Err(Error::MissingElement(_))));
    }
}
