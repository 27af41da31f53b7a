#![forbid(unsafe_code)]

//! Character escaping shared by the serializer and canonicalization.
//!
//! The rules are the Canonical XML ones, which also produce well-formed
//! output for plain serialization:
//! - text: `&`, `<`, `>` and `\r`
//! - attribute values: `&`, `<`, `"`, `\t`, `\n` and `\r`
//! - processing instruction data: `\r`

/// Append `s` to `out`, escaped as text node content.
pub fn write_text(out: &mut String, s: &str) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
}

/// Append `s` to `out`, escaped as a double-quoted attribute value.
pub fn write_attr(out: &mut String, s: &str) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
}

/// Append processing instruction data to `out`.
pub fn write_pi(out: &mut String, s: &str) {
    out.push_str(&s.replace('\r', "&#xD;"));
}

/// Escape text node content into a new string.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    write_text(&mut out, s);
    out
}

/// Escape an attribute value into a new string.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    write_attr(&mut out, s);
    out
}
