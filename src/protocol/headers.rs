//! Ordered, case-insensitive HTTP header collection for the opening handshake.

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Headers that must appear at most once in an upgrade request.
const SINGLETON_HEADERS: &[&str] = &[
    "host",
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
];

/// HTTP headers keyed by lower-cased name.
///
/// Each entry keeps the name as it was supplied, so serialization reproduces
/// the caller's casing. Insertion order is preserved; replacing an existing
/// header keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: IndexMap<String, (String, String)>,
}

impl HeaderMap {
    /// Create an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any existing value with the same name.
    ///
    /// Returns the previous value, if any.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        self.entries
            .insert(key, (name, value.into()))
            .map(|(_, old)| old)
    }

    /// Look up a header value by name, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    /// Whether a header with this name is present, ignoring case.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Remove a header, keeping the order of the remaining entries.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .shift_remove(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Parse header lines (everything after the request or status line).
    ///
    /// Parsing stops at the first empty line. Lines without a colon are
    /// ignored. A repeated handshake-critical header (`Host`, `Upgrade`,
    /// `Connection`, `Sec-WebSocket-Key`, `Sec-WebSocket-Version`) is
    /// rejected; other repeated headers are joined with `", "`.
    ///
    /// # Errors
    ///
    /// Returns a handshake error on a duplicated handshake-critical header.
    pub fn parse_lines<'a, I>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut headers = Self::new();

        for line in lines {
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            let key = name.to_ascii_lowercase();

            match headers.entries.get_mut(&key) {
                Some(_) if SINGLETON_HEADERS.contains(&key.as_str()) => {
                    return Err(Error::handshake(format!("Duplicate header: {}", name)));
                }
                Some((_, existing)) => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                None => {
                    headers.insert(name, value);
                }
            }
        }

        Ok(headers)
    }

    /// Append `Name: value\r\n` for every header to `buf`.
    ///
    /// # Errors
    ///
    /// Returns a handshake error if a name or value contains CR or LF.
    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        for (name, value) in self.iter() {
            validate_header_value(name, name)?;
            validate_header_value(name, value)?;
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Self::new();
        headers.extend(iter);
        headers
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for HeaderMap {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

/// Reject header text that would break the line structure of the message.
fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::handshake(format!(
            "Invalid value for header {}: contains CR or LF characters",
            header_name.escape_debug()
        )));
    }
    Ok(())
}
