//! Key and query normalization.
//!
//! Shard keys arrive in the generator's escaped form: the lower-cased symbol
//! name with every non-alphanumeric byte written as `_xx` (two hex digits) and
//! a `_<n>` disambiguating counter appended. Queries are normalized into the
//! same decoded, lower-cased space so that a prefix of the query text is a
//! prefix of the stored key.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z]+);").expect("valid entity pattern")
});

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<>]*>").expect("valid markup pattern"));

/// Normalize user or label text for matching: trimmed, lower-cased, with runs
/// of whitespace collapsed to a single space.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Decode a raw shard key (`train_5fintegrated_5`) into its normalized search
/// key (`train_integrated`).
///
/// Returns `None` when an escape sequence is truncated, is not hexadecimal, or
/// decodes to invalid UTF-8.
pub fn decode_key(raw: &str) -> Option<String> {
    let body = strip_counter(raw);
    let bytes = body.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' {
            let hex = bytes.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    let text = String::from_utf8(decoded).ok()?;
    Some(text.chars().flat_map(char::to_lowercase).collect())
}

/// Remove the trailing `_<digits>` counter, if present.
fn strip_counter(raw: &str) -> &str {
    match raw.rsplit_once('_') {
        Some((body, counter))
            if !body.is_empty()
                && !counter.is_empty()
                && counter.bytes().all(|b| b.is_ascii_digit()) =>
        {
            body
        }
        _ => raw,
    }
}

/// Decode the HTML character references the generator emits in labels.
///
/// Unknown named references are left untouched.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    ENTITY.replace_all(text, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        let decoded = if let Some(num) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X"))
        {
            u32::from_str_radix(num, 16).ok().and_then(char::from_u32)
        } else if let Some(num) = name.strip_prefix('#') {
            num.parse().ok().and_then(char::from_u32)
        } else {
            match name {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => None,
            }
        };
        decoded.map_or_else(|| caps[0].to_string(), String::from)
    })
}

/// Strip markup tags (`<span class="...">`, `<em>`) from a label.
pub fn strip_markup(text: &str) -> Cow<'_, str> {
    if !text.contains('<') {
        return Cow::Borrowed(text);
    }
    MARKUP.replace_all(text, "")
}

/// Plain-text form of a generator label: tags removed first (so that encoded
/// `&lt;` in template arguments is not mistaken for markup), then entities
/// decoded.
pub fn plain_label(text: &str) -> String {
    decode_entities(&strip_markup(text)).into_owned()
}
