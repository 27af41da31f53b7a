#![forbid(unsafe_code)]

//! The few XPointer forms used by XML-DSig same-document references:
//! - `#id-value`
//! - `#xpointer(/)`
//! - `#xpointer(id('id-value'))`

/// Parse a same-document reference (e.g., `#foo` → `foo`).
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    uri.strip_prefix('#')
}

/// Parse an `xpointer(id('...'))` expression and return the ID value.
///
/// Both quote styles are accepted.
pub fn parse_xpointer_id(expr: &str) -> Option<&str> {
    let inner = expr.strip_prefix("xpointer(id(")?.strip_suffix("))")?;
    inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
}

/// True for the whole-document pointer `xpointer(/)`.
pub fn is_xpointer_root(expr: &str) -> bool {
    expr == "xpointer(/)"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xpointer_forms() {
        assert_eq!(parse_same_document_ref("#abc"), Some("abc"));
        assert_eq!(parse_same_document_ref("abc"), None);
        assert_eq!(parse_xpointer_id("xpointer(id('k1'))"), Some("k1"));
        assert_eq!(parse_xpointer_id("xpointer(id(\"k1\"))"), Some("k1"));
        assert_eq!(parse_xpointer_id("xpointer(id('k1\"))"), None);
        assert!(is_xpointer_root("xpointer(/)"));
        assert!(!is_xpointer_root("xpointer(//)"));
    }
}
