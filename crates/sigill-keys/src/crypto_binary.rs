#![forbid(unsafe_code)]

//! The `ds:CryptoBinary` type: an unsigned big integer as base64 of its
//! big-endian magnitude.

use crate::{decode_base64, encode_base64};
use rsa::BigUint;
use sigill_core::Error;
use sigill_xml::Element;

/// Base64 of the minimal big-endian bytes of `value`. No sign byte is ever
/// prepended, since the value is unsigned.
pub fn encode(value: &BigUint) -> String {
    encode_base64(&value.to_bytes_be())
}

/// Parse base64 text (whitespace allowed) into an unsigned integer.
pub fn decode(text: &str) -> Result<BigUint, Error> {
    let bytes = decode_base64(text, "CryptoBinary")?;
    if bytes.is_empty() {
        return Err(Error::MalformedData("CryptoBinary: empty value".into()));
    }
    Ok(BigUint::from_bytes_be(&bytes))
}

/// Decode the text content of `element`.
pub fn from_element(element: &Element) -> Result<BigUint, Error> {
    decode(&element.text()).map_err(|e| match e {
        Error::MalformedData(msg) => {
            Error::MalformedData(format!("<{}>: {msg}", element.local_name()))
        }
        other => other,
    })
}

/// Set the text content of `element` to the encoding of `value`.
pub fn to_element(mut element: Element, value: &BigUint) -> Element {
    element.set_text(&encode(value));
    element
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_sign_byte() {
        // 0x80 would need a leading zero as a two's complement integer.
        let value = BigUint::from(0x80u32);
        assert_eq!(encode(&value), "gA==");
        assert_eq!(decode("gA==").unwrap(), value);
    }

    #[test]
    fn test_leading_zeros_and_whitespace_are_accepted() {
        assert_eq!(decode("AAEA").unwrap(), BigUint::from(256u32));
        assert_eq!(decode(" AQ\n AB\t").unwrap(), BigUint::from(0x0100_01u32));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(decode("!!"), Err(Error::MalformedData(_))));
        assert!(matches!(decode(""), Err(Error::MalformedData(_))));
        let el = Element::dsig("Modulus").with_text("%%");
        let err = from_element(&el).unwrap_err();
        assert!(err.to_string().contains("Modulus"));
    }

    #[test]
    fn test_exponent_encoding() {
        let el = to_element(Element::dsig("Exponent"), &BigUint::from(65537u32));
        assert_eq!(el.text(), "AQAB");
        assert_eq!(from_element(&el).unwrap(), BigUint::from(65537u32));
    }
}
