#![forbid(unsafe_code)]

/// Errors produced by the Sigill XML-DSig library.
///
/// Structural problems (the document is broken) and policy problems (the
/// document is well-formed but not allowed) are kept apart; see
/// [`Error::is_policy_violation`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("signature engine error: {0}")]
    SignatureEngine(String),

    #[error("signature format conversion error: {0}")]
    FormatConversion(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("retrieval method loop: {0}")]
    RetrievalLoop(String),

    #[error("marshal error: {0}")]
    Marshal(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the input was rejected by the validation policy rather
    /// than for being malformed.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Error::PolicyViolation(_) | Error::RetrievalLoop(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
