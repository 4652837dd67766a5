//! Byte-addressed strings and bytes values.
//!
//! Strings are immutable byte sequences interpreted as UTF-8 where that
//! matters (quoting, character methods); indexing and slicing are byte
//! operations, so an index into a multi-byte character yields the raw byte.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Str(Arc<[u8]>);

impl Str {
    pub fn from_bytes(bytes: Vec<u8>) -> Str {
        Str(Arc::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// UTF-8 view; invalid sequences are replaced.
    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// Quoted form with escapes for control and non-UTF-8 bytes.
    pub fn quoted(&self) -> String {
        quote_bytes(&self.0, '"')
    }

    pub fn concat(&self, other: &Str) -> Str {
        let mut out = Vec::with_capacity(self.len() + other.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&other.0);
        Str(Arc::from(out))
    }

    pub fn repeat(&self, n: usize) -> Str {
        let mut out = Vec::with_capacity(self.len() * n);
        for _ in 0..n {
            out.extend_from_slice(&self.0);
        }
        Str(Arc::from(out))
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Str {
        Str(Arc::from(s.as_bytes()))
    }
}

impl From<String> for Str {
    fn from(s: String) -> Str {
        Str(Arc::from(s.into_bytes()))
    }
}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bytes(Arc<[u8]>);

impl Bytes {
    pub fn from_bytes(bytes: Vec<u8>) -> Bytes {
        Bytes(Arc::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn quoted(&self) -> String {
        let mut out = String::from("b");
        out.push_str(&quote_bytes(&self.0, '"'));
        out
    }

    pub fn concat(&self, other: &Bytes) -> Bytes {
        let mut out = Vec::with_capacity(self.len() + other.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&other.0);
        Bytes(Arc::from(out))
    }

    pub fn repeat(&self, n: usize) -> Bytes {
        let mut out = Vec::with_capacity(self.len() * n);
        for _ in 0..n {
            out.extend_from_slice(&self.0);
        }
        Bytes(Arc::from(out))
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}

/// Quote a byte sequence. Valid UTF-8 runs are emitted as text with the
/// usual escapes; stray bytes become `\xHH`.
pub fn quote_bytes(bytes: &[u8], quote: char) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push(quote);
    let mut rest = bytes;
    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(s) => {
                push_escaped(&mut out, s, quote);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                // Safety of unwrap: split at valid_up_to is valid UTF-8.
                push_escaped(&mut out, std::str::from_utf8(valid).expect("valid prefix"), quote);
                let bad_len = e.error_len().unwrap_or(after.len()).max(1);
                for b in &after[..bad_len.min(after.len())] {
                    out.push_str(&format!("\\x{:02x}", b));
                }
                rest = &after[bad_len.min(after.len())..];
            }
        }
    }
    out.push(quote);
    out
}

fn push_escaped(out: &mut String, s: &str, quote: char) {
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
}
