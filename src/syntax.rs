/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The per-line grammar of `certdata.txt`.
//!
//! Lines are split into `field type [value]` by `split_line`; the small
//! sub-languages inside a value (octal groups of a `MULTILINE_OCTAL` block,
//! quoted `UTF8` strings) are `nom` parsers.

use nom::IResult;

pub const BEGINDATA: &'static str = "BEGINDATA";
pub const END: &'static str = "END";
pub const UTF8_TYPE: &'static str = "UTF8";
pub const MULTILINE_PREFIX: &'static str = "MULTILINE_";
pub const OCTAL_SUFFIX: &'static str = "OCTAL";

named!(octal_digit<u8>, map!(one_of!("01234567"), |b| b as u8 - b'0'));
named!(quad_digit<u8>, map!(one_of!("0123"), |b| b as u8 - b'0'));

named!(hex_digit<u8>,
       map!(one_of!(b"0123456789abcdefABCDEF"), |b| match b {
           '0'..='9' => b as u8 - b'0',
           'a'..='f' => b as u8 - b'a' + 10,
           'A'..='F' => b as u8 - b'A' + 10,
           _ => unreachable!()
       }));

named!(pub octal_esc<u8>,
       chain!(tag!("\\") ~
              a: quad_digit ~
              b: octal_digit ~
              c: octal_digit,
              || { a << 6 | b << 3 | c }));

named!(hex_esc<u8>,
       chain!(tag!("\\x") ~
              a: hex_digit ~
              b: hex_digit,
              || { a << 4 | b }));

named!(char_esc<u8>,
       chain!(tag!("\\") ~
              c: one_of!("\\\"'abfnrtv"),
              || match c {
                  'a' => 0x07,
                  'b' => 0x08,
                  'f' => 0x0c,
                  'n' => b'\n',
                  'r' => b'\r',
                  't' => b'\t',
                  'v' => 0x0b,
                  _ => c as u8,
              }));

named!(quoted_string<String>,
       delimited!(tag!("\""),
                  map_res!(many0!(alt!(map!(none_of!("\\\""), |b| b as u8) |
                                       hex_esc |
                                       octal_esc |
                                       char_esc)),
                           String::from_utf8),
                  tag!("\"")));

named!(octal_run<Vec<u8> >, many0!(octal_esc));

/// Splits a data line into field, type tag and the verbatim remainder.
///
/// Returns `None` for lines that don't have both a field and a type; the
/// tokenizer treats those as noise.
pub fn split_line(line: &str) -> Option<(&str, &str, Option<&str>)> {
    let mut parts = line.splitn(3, ' ');
    let field = parts.next()?;
    let type_tag = parts.next()?;
    if field.is_empty() || type_tag.is_empty() {
        return None;
    }
    Some((field, type_tag, parts.next()))
}

/// Decodes one line of a `MULTILINE_OCTAL` block, four characters per byte.
pub fn decode_octal_line(line: &str) -> Option<Vec<u8>> {
    if line.is_empty() {
        return Some(Vec::new());
    }
    match octal_run(line.as_bytes()) {
        IResult::Done(rest, bytes) => if rest.is_empty() { Some(bytes) } else { None },
        _ => None,
    }
}

/// Inverse of `decode_octal_line`, sixteen groups per line as certdata.txt
/// itself is laid out.
pub fn encode_octal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4 + bytes.len() / 16);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 && i % 16 == 0 {
            out.push('\n');
        }
        out.push_str(&format!("\\{:03o}", b));
    }
    out
}

/// Unquotes the inline region of a `UTF8` attribute.
///
/// Text that isn't a well-formed quoted string keeps its content with the
/// surrounding quote characters stripped.
pub fn unquote(region: &str) -> String {
    if let IResult::Done(rest, s) = quoted_string(region.as_bytes()) {
        if rest.is_empty() {
            return s;
        }
    }
    let inner = if region.starts_with('"') { &region[1..] } else { region };
    let inner = if inner.ends_with('"') { &inner[..inner.len() - 1] } else { inner };
    inner.to_owned()
}

pub type Key = String;
pub type Type = String;
pub type Attr = (Key, Value);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// A single-line value of any type other than UTF8; the text is verbatim.
    Token(Type, String),
    String(String),
    Binary(Vec<u8>), // Type is always MULTILINE_OCTAL
    /// Another MULTILINE_* encoding, lines joined with '\n' and not decoded.
    Multiline(Type, String),
}

impl Value {
    pub fn get_type(&self) -> &str {
        match *self {
            Value::Token(ref ttype, _) => ttype,
            Value::String(_) => UTF8_TYPE,
            Value::Binary(_) => "MULTILINE_OCTAL",
            Value::Multiline(ref ttype, _) => ttype,
        }
    }

    /// The value as text, for everything but binary blobs.
    pub fn as_text(&self) -> Option<&str> {
        match *self {
            Value::Token(_, ref s) | Value::String(ref s) | Value::Multiline(_, ref s) => Some(s),
            Value::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match *self {
            Value::Binary(ref b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{quad_digit, octal_digit, hex_digit, octal_esc, hex_esc, char_esc, quoted_string,
                split_line, decode_octal_line, encode_octal, unquote, Value};
    use nom::IResult::*;
    use nom::{Needed, ErrorKind, Err};

    #[test]
    fn test_digits() {
        assert_eq!(quad_digit(b"0"), Done(&b""[..], 0));
        assert_eq!(octal_digit(b"76"), Done(&b"6"[..], 7));
        assert_eq!(hex_digit(b"98"), Done(&b"8"[..], 9));

        assert_eq!(quad_digit(b"4"), Error(Err::Position(ErrorKind::OneOf, &b"4"[..])));
        assert_eq!(octal_digit(b"8"), Error(Err::Position(ErrorKind::OneOf, &b"8"[..])));
        assert_eq!(hex_digit(b"g"), Error(Err::Position(ErrorKind::OneOf, &b"g"[..])));

        assert_eq!(hex_digit(b"a"), Done(&b""[..], 10));
        assert_eq!(hex_digit(b"F"), Done(&b""[..], 15));
    }

    #[test]
    fn test_octal_esc() {
        assert_eq!(octal_esc(b"\\000"), Done(&b""[..], 0o000));
        assert_eq!(octal_esc(b"\\077"), Done(&b""[..], 0o077));
        assert_eq!(octal_esc(b"\\377"), Done(&b""[..], 0o377));
        assert_eq!(octal_esc(b"\\3765"), Done(&b"5"[..], 0o376));

        assert_eq!(octal_esc(b"\\0"), Incomplete(Needed::Size(3)));
        assert_eq!(octal_esc(b"\\080"), Error(Err::Position(ErrorKind::OneOf, &b"80"[..])));
        assert_eq!(octal_esc(b"\\400"), Error(Err::Position(ErrorKind::OneOf, &b"400"[..])));
        assert_eq!(octal_esc(b"A"), Error(Err::Position(ErrorKind::Tag, &b"A"[..])));
    }

    #[test]
    fn test_hex_esc() {
        assert_eq!(hex_esc(b"\\x0f"), Done(&b""[..], 0x0f));
        assert_eq!(hex_esc(b"\\xba9"), Done(&b"9"[..], 0xba));
        assert_eq!(hex_esc(b"\\x0g"), Error(Err::Position(ErrorKind::OneOf, &b"g"[..])));
    }

    #[test]
    fn test_char_esc() {
        assert_eq!(char_esc(b"\\\\"), Done(&b""[..], b'\\'));
        assert_eq!(char_esc(b"\\\"x"), Done(&b"x"[..], b'"'));
        assert_eq!(char_esc(b"\\n"), Done(&b""[..], b'\n'));
        assert_eq!(char_esc(b"\\q"), Error(Err::Position(ErrorKind::OneOf, &b"q"[..])));
    }

    #[test]
    fn test_quoted_string() {
        assert_eq!(quoted_string(b"\"Stuff\""), Done(&b""[..], "Stuff".to_owned()));
        assert_eq!(quoted_string("\"Stũff\"".as_bytes()), Done(&b""[..], "Stũff".to_owned()));
        assert_eq!(quoted_string(b"\"A\\x42\""), Done(&b""[..], "AB".to_owned()));
        assert_eq!(quoted_string(b"\"A\\102\""), Done(&b""[..], "AB".to_owned()));
        assert_eq!(quoted_string(b"\"A\\\\B\""), Done(&b""[..], "A\\B".to_owned()));
        assert_eq!(quoted_string(b"\"A\\\"B\""), Done(&b""[..], "A\"B".to_owned()));
        assert_eq!(quoted_string(b"\"AC Ra\\xC3\\xADz\""), Done(&b""[..], "AC Raíz".to_owned()));
        assert_eq!(quoted_string(b"\"a\"\"b\""), Done(&b"\"b\""[..], "a".to_owned()));
        assert!(quoted_string(b"\"A\\xce\"").is_err());
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"Bogus Mozilla Addons\""), "Bogus Mozilla Addons");
        assert_eq!(unquote("\"Yen \\xC2\\xA5 sign\""), "Yen ¥ sign");
        assert_eq!(unquote("\"Főtanúsítvány\""), "Főtanúsítvány");
        assert_eq!(unquote("\"\""), "");

        // Not valid quoted strings: quotes are stripped and the rest kept as is.
        assert_eq!(unquote("\"A\\xce\""), "A\\xce");
        assert_eq!(unquote("\"a\"\"b\""), "a\"\"b");
        assert_eq!(unquote("\"trailing\\"), "trailing\\");
        assert_eq!(unquote("bare"), "bare");
        assert_eq!(unquote("\""), "");
    }

    #[test]
    fn test_split_line() {
        assert_eq!(split_line("CKA_CLASS CK_OBJECT_CLASS CKO_CERTIFICATE"),
                   Some(("CKA_CLASS", "CK_OBJECT_CLASS", Some("CKO_CERTIFICATE"))));
        assert_eq!(split_line("FIELD_FIVE TYPE3 VALUE1 VALUE2"),
                   Some(("FIELD_FIVE", "TYPE3", Some("VALUE1 VALUE2"))));
        assert_eq!(split_line("CKA_VALUE MULTILINE_OCTAL"),
                   Some(("CKA_VALUE", "MULTILINE_OCTAL", None)));
        assert_eq!(split_line("FIELD TYPE "), Some(("FIELD", "TYPE", Some(""))));
        assert_eq!(split_line("LONELY"), None);
        assert_eq!(split_line(" LEADING SPACE"), None);
        assert_eq!(split_line("A  B"), None);
    }

    #[test]
    fn test_decode_octal_line() {
        assert_eq!(decode_octal_line("\\101"), Some(vec![65]));
        assert_eq!(decode_octal_line("\\101\\033"), Some(vec![65, 27]));
        assert_eq!(decode_octal_line("\\000\\001\\002\\010\\011\\012"),
                   Some(vec![0, 1, 2, 8, 9, 10]));
        assert_eq!(decode_octal_line(""), Some(vec![]));

        assert_eq!(decode_octal_line("\\101 \\033"), None);
        assert_eq!(decode_octal_line("\\10"), None);
        assert_eq!(decode_octal_line("\\1019"), None);
        assert_eq!(decode_octal_line("\\400"), None);
        assert_eq!(decode_octal_line("101\\033"), None);
    }

    #[test]
    fn test_octal_reencode_is_stable() {
        let all: Vec<u8> = (0..=255).collect();
        let text = encode_octal(&all);
        assert_eq!(text.lines().count(), 16);
        let decoded: Vec<u8> = text.lines()
            .flat_map(|l| decode_octal_line(l).unwrap())
            .collect();
        assert_eq!(decoded, all);
        assert_eq!(encode_octal(&decoded), text);
    }

    #[test]
    fn test_value_types() {
        assert_eq!(Value::Token("CK_BBOOL".to_owned(), "CK_TRUE".to_owned()).get_type(),
                   "CK_BBOOL");
        assert_eq!(Value::String("x".to_owned()).get_type(), "UTF8");
        assert_eq!(Value::Binary(vec![1]).get_type(), "MULTILINE_OCTAL");
        assert_eq!(Value::Multiline("MULTILINE_HEX".to_owned(), String::new()).get_type(),
                   "MULTILINE_HEX");
        assert_eq!(Value::Binary(vec![1]).as_text(), None);
        assert_eq!(Value::Binary(vec![1]).as_bytes(), Some(&[1u8][..]));
        assert_eq!(Value::String("x".to_owned()).as_text(), Some("x"));
    }
}
