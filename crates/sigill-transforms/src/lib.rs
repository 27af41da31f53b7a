#![forbid(unsafe_code)]

//! Transform pipeline engine for the Sigill XML-DSig library.
//!
//! Implements the transform chain model from XML-DSig: each reference (and
//! each `RetrievalMethod`) contains a sequence of transforms that are
//! applied in order to the data its URI dereferences to.

pub mod base64_transform;
pub mod enveloped;
pub mod pipeline;
pub mod uri;

pub use pipeline::{C14nTransform, Transform, TransformData, TransformPipeline};
pub use uri::{DefaultDereferencer, Dereferencer, TransformContext};
