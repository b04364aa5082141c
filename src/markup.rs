//! Chat markup to plain text.
//!
//! Chat messages arrive as HTML-ish markup. [`strip_markup`] drops the
//! tags, interpolates `src`/`href` attribute values (so links and images
//! survive as text), and unescapes entities.

use std::sync::OnceLock;

use regex::Regex;

/// `src`/`href` attribute values inside a tag body.
fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:src|href)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("valid attribute pattern")
    })
}

/// Convert chat markup to plain text.
#[must_use]
pub fn strip_markup(msg: &str) -> String {
    let mut out = String::with_capacity(msg.len());
    let mut rest = msg;
    while let Some(lt) = rest.find('<') {
        push_unescaped(&mut out, &rest[..lt]);
        let Some(gt) = rest[lt..].find('>') else {
            // Unterminated tag -- keep the rest as text.
            push_unescaped(&mut out, &rest[lt..]);
            return out;
        };
        let tag = &rest[lt + 1..lt + gt];
        for capture in attr_regex().captures_iter(tag) {
            let value = capture
                .get(1)
                .or_else(|| capture.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            out.push(' ');
            out.push_str(value);
            out.push(' ');
        }
        rest = &rest[lt + gt + 1..];
    }
    push_unescaped(&mut out, rest);
    out
}

/// Append `text` with HTML entities decoded.
fn push_unescaped(out: &mut String, text: &str) {
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match decode_entity(tail) {
            Some((decoded, consumed)) => {
                out.push_str(&decoded);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
}

/// Decode one entity at the start of `text`; returns the replacement and
/// the number of bytes consumed.
fn decode_entity(text: &str) -> Option<(String, usize)> {
    let end = text[..text.len().min(12)].find(';')?;
    let body = &text[1..end];
    let decoded = match body {
        "amp" => "&".to_string(),
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        "nbsp" => " ".to_string(),
        _ => {
            let code = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            char::from_u32(code)?.to_string()
        }
    };
    Some((decoded, end + 1))
}
