//! Typed decoding of element and attribute text.

use std::any::type_name;

use ibig::IBig;
use rust_decimal::Decimal;

use crate::cursor::{is_xml_space, CursorError, CursorResult, TreeCursor};
use crate::tree::QName;

/// Conversion from the lexical form of an XML value.
///
/// `text` arrives with surrounding XML whitespace already removed. `None`
/// means the text is not in the type's lexical space; the cursor turns that
/// into a [`CursorError::Decode`] carrying the raw text.
pub trait FromXmlText: Sized {
    fn from_xml_text(text: &str) -> Option<Self>;
}

impl FromXmlText for bool {
    // XML Schema boolean: true | false | 1 | 0
    fn from_xml_text(text: &str) -> Option<bool> {
        match text {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

macro_rules! from_str_lexical {
    ($($t:ty),+) => {
        $(impl FromXmlText for $t {
            fn from_xml_text(text: &str) -> Option<$t> {
                text.parse().ok()
            }
        })+
    };
}

from_str_lexical!(i32, i64, u32, u64, f32, f64, IBig, Decimal);

// Whitespace-separated list with exactly N entries.
impl<T: FromXmlText, const N: usize> FromXmlText for [T; N] {
    fn from_xml_text(text: &str) -> Option<[T; N]> {
        let mut values = Vec::with_capacity(N);
        for token in text.split(is_xml_space).filter(|token| !token.is_empty()) {
            if values.len() == N {
                return None;
            }
            values.push(T::from_xml_text(token)?);
        }
        values.try_into().ok()
    }
}

impl<'t> TreeCursor<'t> {
    fn decode_error<T>(&self, raw: String) -> CursorError {
        CursorError::Decode {
            target: type_name::<T>(),
            raw,
            pos: self.position(),
        }
    }

    /// Decodes the text content of the current element.
    ///
    /// Reads like [`read_element_text`](TreeCursor::read_element_text): the
    /// cursor must be on the element's StartElement and rests on its
    /// EndElement afterwards. Surrounding whitespace is ignored.
    pub fn decode_element_as<T: FromXmlText>(&mut self) -> CursorResult<T> {
        let raw = self.read_element_text()?;
        match T::from_xml_text(raw.trim_matches(is_xml_space)) {
            Some(value) => Ok(value),
            None => Err(self.decode_error::<T>(raw)),
        }
    }

    /// Decodes the value of the `index`th ordinary attribute of the current
    /// start element.
    pub fn decode_attribute_as<T: FromXmlText>(&mut self, index: usize) -> CursorResult<T> {
        let raw = self.attribute(index)?.value;
        match T::from_xml_text(raw.trim_matches(is_xml_space)) {
            Some(value) => Ok(value),
            None => Err(self.decode_error::<T>(raw.to_string())),
        }
    }

    /// Decodes the element text as a qualified name, resolving its prefix
    /// against the namespace declarations in scope at this element. An
    /// unprefixed name picks up the default namespace when one applies.
    pub fn decode_element_as_qname(&mut self) -> CursorResult<QName> {
        let raw = self.read_element_text()?;
        self.qname_from_text(raw)
    }

    /// Decodes an attribute value as a qualified name, like
    /// [`decode_element_as_qname`](TreeCursor::decode_element_as_qname).
    pub fn decode_attribute_as_qname(&mut self, index: usize) -> CursorResult<QName> {
        let raw = self.attribute(index)?.value.to_string();
        self.qname_from_text(raw)
    }

    fn qname_from_text(&self, raw: String) -> CursorResult<QName> {
        let text = raw.trim_matches(is_xml_space);
        let qname = match text.split_once(':') {
            Some((prefix, local)) => {
                if prefix.is_empty() || local.is_empty() || local.contains(':') {
                    return Err(self.decode_error::<QName>(raw));
                }
                if !self.options().namespace_aware {
                    QName::with_prefix(prefix, local)
                } else {
                    match self.namespace_for_prefix(prefix)? {
                        Some(uri) => QName::prefixed(prefix, local, uri),
                        // a prefix with no binding has no interpretation
                        None => return Err(self.decode_error::<QName>(raw)),
                    }
                }
            }
            None => {
                if text.is_empty() {
                    return Err(self.decode_error::<QName>(raw));
                }
                match self.namespace_for_prefix("")? {
                    Some(uri) => QName::with_namespace(text, uri),
                    None => QName::local(text),
                }
            }
        };
        Ok(qname)
    }
}

#[test]
fn test_boolean_lexical_space() {
    assert_eq!(bool::from_xml_text("true"), Some(true));
    assert_eq!(bool::from_xml_text("1"), Some(true));
    assert_eq!(bool::from_xml_text("false"), Some(false));
    assert_eq!(bool::from_xml_text("0"), Some(false));
    assert_eq!(bool::from_xml_text("TRUE"), None);
    assert_eq!(bool::from_xml_text(""), None);
}

#[test]
fn test_numeric_lexical_forms() {
    assert_eq!(i32::from_xml_text("-42"), Some(-42));
    assert_eq!(i64::from_xml_text("+7"), Some(7));
    assert_eq!(u32::from_xml_text("-1"), None);
    assert_eq!(f64::from_xml_text("1.5e3"), Some(1500.0));
    assert_eq!(f32::from_xml_text("half"), None);
}

#[test]
fn test_bignum_lexical_forms() {
    let big = IBig::from_xml_text("123456789012345678901234567890").unwrap();
    assert_eq!(big.to_string(), "123456789012345678901234567890");
    assert_eq!(IBig::from_xml_text("12.5"), None);
    let dec = Decimal::from_xml_text("12.340").unwrap();
    assert_eq!(dec.to_string(), "12.340");
}

#[test]
fn test_array_token_counts() {
    assert_eq!(<[i32; 3]>::from_xml_text("1 2 3"), Some([1, 2, 3]));
    assert_eq!(<[i32; 3]>::from_xml_text("1\t2\n3"), Some([1, 2, 3]));
    assert_eq!(<[i32; 3]>::from_xml_text("1 2"), None);
    assert_eq!(<[i32; 3]>::from_xml_text("1 2 3 4"), None);
    assert_eq!(<[f32; 2]>::from_xml_text("0.5  1.5"), Some([0.5, 1.5]));
}
