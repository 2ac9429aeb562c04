//! `Set-Cookie` header parsing (RFC 6265 §5.2).

use std::time::SystemTime;

use crate::cookies::date::parse_http_date;
use crate::Error;

/// A parsed `Set-Cookie` header value.
///
/// Attribute values are normalized (leading dot stripped from `Domain`,
/// domain lowercased) but nothing is resolved against the request yet. That
/// happens when the value is stored in a [`CookieJar`][crate::CookieJar].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// `Expires` attribute.
    pub expires: Option<SystemTime>,
    /// `Max-Age` attribute in seconds. Takes precedence over `expires`.
    pub max_age: Option<i64>,
    /// `Domain` attribute, lowercased, without leading dot. Empty if unset.
    pub domain: String,
    /// `Path` attribute. Empty if unset.
    pub path: String,
    /// `Secure` attribute.
    pub secure: bool,
    /// `HttpOnly` attribute.
    pub http_only: bool,
    /// Attributes this parser does not know, kept verbatim.
    pub extensions: Vec<String>,
}

/// Parse one `Set-Cookie` header value.
pub fn parse_set_cookie(input: &str) -> Result<SetCookie, Error> {
    let mut parts = input.split(';');

    let pair = parts.next().unwrap_or("").trim();
    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| Error::parse(format!("set-cookie without '=': {}", pair)))?;
    let name = name.trim();
    let value = value.trim();

    if name.is_empty() || !is_token(name) {
        return Err(Error::parse(format!("bad cookie name: {}", name)));
    }
    if !is_cookie_value(value) {
        return Err(Error::parse(format!("bad cookie value: {}", value)));
    }

    let mut sc = SetCookie {
        name: name.to_string(),
        value: value.to_string(),
        ..Default::default()
    };

    for attr in parts {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (attr, None),
        };

        if key.eq_ignore_ascii_case("secure") && val.is_none() {
            sc.secure = true;
        } else if key.eq_ignore_ascii_case("httponly") && val.is_none() {
            sc.http_only = true;
        } else if key.eq_ignore_ascii_case("expires") {
            let val = val.ok_or_else(|| Error::parse("expires without value"))?;
            sc.expires = Some(parse_http_date(val)?);
        } else if key.eq_ignore_ascii_case("max-age") {
            let val = val.ok_or_else(|| Error::parse("max-age without value"))?;
            sc.max_age = Some(parse_max_age(val)?);
        } else if key.eq_ignore_ascii_case("domain") {
            let val = val.ok_or_else(|| Error::parse("domain without value"))?;
            // a leading dot is tolerated and ignored
            let val = val.strip_prefix('.').unwrap_or(val);
            if !is_domain(val) {
                return Err(Error::parse(format!("bad cookie domain: {}", val)));
            }
            sc.domain = val.to_ascii_lowercase();
        } else if key.eq_ignore_ascii_case("path") {
            let val = val.ok_or_else(|| Error::parse("path without value"))?;
            if !val.bytes().all(is_path_byte) {
                return Err(Error::parse(format!("bad cookie path: {}", val)));
            }
            sc.path = val.to_string();
        } else {
            sc.extensions.push(attr.to_string());
        }
    }

    Ok(sc)
}

fn parse_max_age(val: &str) -> Result<i64, Error> {
    let digits = val.strip_prefix('-').unwrap_or(val);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::parse(format!("bad max-age: {}", val)));
    }
    val.parse()
        .map_err(|_| Error::parse(format!("max-age out of range: {}", val)))
}

fn is_token(s: &str) -> bool {
    s.bytes().all(|b| {
        b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
    })
}

// cookie-octet, plus we allow the optional surrounding DQUOTEs inline
fn is_cookie_value(s: &str) -> bool {
    s.bytes()
        .all(|b| !b.is_ascii_control() && b != b';' && b != b' ')
}

fn is_path_byte(b: u8) -> bool {
    !b.is_ascii_control() && b != b';'
}

// RFC 1034 label: starts with a letter, ends with a letter or digit,
// hyphens only in between.
fn is_domain(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|label| {
            let bytes = label.as_bytes();
            match (bytes.first(), bytes.last()) {
                (Some(first), Some(last)) => {
                    first.is_ascii_alphabetic()
                        && last.is_ascii_alphanumeric()
                        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
                }
                _ => false,
            }
        })
}
