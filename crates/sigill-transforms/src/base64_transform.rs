#![forbid(unsafe_code)]

//! Base64 decode transform.

use crate::pipeline::{Transform, TransformData};
use crate::uri::TransformContext;
use sigill_core::{algorithm, Error};
use sigill_xml::{Element, Node};

/// Base64 decode transform. XML input is reduced to its text content first.
#[derive(Debug)]
pub struct Base64DecodeTransform;

impl Transform for Base64DecodeTransform {
    fn uri(&self) -> &str {
        algorithm::BASE64
    }

    fn execute(&self, input: TransformData, _ctx: &TransformContext<'_>) -> Result<TransformData, Error> {
        use base64::Engine;
        let engine = base64::engine::general_purpose::STANDARD;

        let text = match &input {
            TransformData::Binary(data) => std::str::from_utf8(data)
                .map_err(|e| Error::Transform(format!("base64 input not UTF-8: {e}")))?
                .to_owned(),
            TransformData::Xml { element, .. } => {
                let mut text = String::new();
                collect_text(element, &mut text);
                text
            }
        };

        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();

        let decoded = engine
            .decode(&cleaned)
            .map_err(|e| Error::MalformedData(format!("base64 decode error: {e}")))?;

        Ok(TransformData::Binary(decoded))
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for child in element.children() {
        match child {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
            _ => {}
        }
    }
}
