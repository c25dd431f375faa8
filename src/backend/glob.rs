//! Glob Matching
//!
//! Redis-style key patterns (`*`, `?`, `[abc]`, `[^a-z]`, `\x`) compiled to
//! anchored regular expressions so every backend matches keys identically.

use regex::Regex;

use crate::error::{CacheError, Result};

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let translated = translate(pattern);
        let regex = Regex::new(&translated).map_err(|e| {
            CacheError::InvalidRequest(format!("invalid key pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Escapes glob metacharacters so `text` matches only itself.
pub fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("(?s)^");

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                push_literal(&mut out, chars[i]);
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    push_class(&mut out, &chars[i + 1..end]);
                    i = end;
                }
                None => push_literal(&mut out, '['),
            },
            c => push_literal(&mut out, c),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Index of the `]` closing the class opened at `start`, if any.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if i < chars.len() && (chars[i] == '^' || chars[i] == '!') {
        i += 1;
    }
    // An empty class has nothing to match; treat the bracket literally.
    if i < chars.len() && chars[i] == ']' {
        return None;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            ']' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn push_class(out: &mut String, body: &[char]) {
    out.push('[');
    let mut i = 0;
    if !body.is_empty() && (body[0] == '^' || body[0] == '!') {
        out.push('^');
        i = 1;
    }
    while i < body.len() {
        let c = body[i];
        if c == '\\' && i + 1 < body.len() {
            i += 1;
            push_class_char(out, body[i]);
        } else if c == '-' {
            out.push('-');
        } else {
            push_class_char(out, c);
        }
        i += 1;
    }
    out.push(']');
}

fn push_class_char(out: &mut String, c: char) {
    if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~' | '-') {
        out.push('\\');
    }
    out.push(c);
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}
