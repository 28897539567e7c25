use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Escape marker used in encoded file stems.
const ESCAPE: char = '%';

/// Longest encoded stem that still fits a 255-byte file name once the
/// `.cache` extension is appended.
pub const MAX_STEM_LEN: usize = 249;

/// Identifier for a stash entry.
///
/// Keys are case-preserved strings; two keys are equal iff their strings are
/// equal. A key maps to a file stem through [`Key::to_file_stem`], which is a
/// bijection onto canonical stems (see [`Key::from_file_stem`]).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Create a key from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The canonical string form of this key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning its string form.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Encode the key as a file stem safe on any common filesystem.
    ///
    /// ASCII lowercase letters, digits, `-`, `_`, and `.` (except in first
    /// position) are kept as-is. Every other byte, uppercase letters
    /// included, becomes `%XX` with uppercase hex digits. Escaping uppercase
    /// letters keeps `Av` and `av` apart on case-insensitive filesystems.
    /// The first byte of a Windows device name (`con`, `nul.txt`, `com1`) is
    /// escaped as well.
    pub fn to_file_stem(&self) -> Result<String, TypeError> {
        if self.0.is_empty() {
            return Err(TypeError::InvalidKey {
                key: self.0.clone(),
                reason: "key must not be empty".into(),
            });
        }

        let escape_first = is_device_name(&self.0);
        let mut stem = String::with_capacity(self.0.len());
        for (idx, byte) in self.0.bytes().enumerate() {
            if is_verbatim(byte, idx) && !(idx == 0 && escape_first) {
                stem.push(byte as char);
            } else {
                stem.push(ESCAPE);
                stem.push_str(&hex::encode_upper([byte]));
            }
        }

        if stem.len() > MAX_STEM_LEN {
            return Err(TypeError::InvalidKey {
                key: self.0.clone(),
                reason: format!(
                    "encoded name is {} bytes, limit is {MAX_STEM_LEN}",
                    stem.len()
                ),
            });
        }
        Ok(stem)
    }

    /// Decode a file stem produced by [`Key::to_file_stem`].
    ///
    /// Only canonical encodings are accepted, so every file stem maps back to
    /// exactly one key and vice versa.
    pub fn from_file_stem(stem: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidFileName {
            name: stem.to_string(),
            reason: reason.to_string(),
        };

        let raw = stem.as_bytes();
        let mut bytes = Vec::with_capacity(raw.len());
        let mut idx = 0;
        while idx < raw.len() {
            if raw[idx] == ESCAPE as u8 {
                let digits = raw
                    .get(idx + 1..idx + 3)
                    .ok_or_else(|| invalid("truncated escape sequence"))?;
                let decoded = hex::decode(digits).map_err(|_| invalid("bad escape sequence"))?;
                bytes.extend_from_slice(&decoded);
                idx += 3;
            } else {
                bytes.push(raw[idx]);
                idx += 1;
            }
        }

        let name = String::from_utf8(bytes).map_err(|_| invalid("not valid UTF-8"))?;
        let key = Self(name);
        match key.to_file_stem() {
            Ok(canonical) if canonical == stem => Ok(key),
            Ok(_) => Err(invalid("not a canonical encoding")),
            Err(_) => Err(invalid("does not encode a valid key")),
        }
    }
}

/// Whether `name`, up to its first `.`, is a reserved Windows device name.
/// Such names cannot be used as file names with any extension.
fn is_device_name(name: &str) -> bool {
    let base = name.split('.').next().unwrap_or(name);
    match base.as_bytes() {
        b"con" | b"prn" | b"aux" | b"nul" => true,
        [b'c', b'o', b'm', digit] | [b'l', b'p', b't', digit] => {
            matches!(*digit, b'1'..=b'9')
        }
        _ => false,
    }
}

fn is_verbatim(byte: u8, idx: usize) -> bool {
    match byte {
        b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => true,
        b'.' => idx > 0,
        _ => false,
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&String> for Key {
    fn from(name: &String) -> Self {
        Self(name.clone())
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}
