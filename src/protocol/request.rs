//! Filter request metadata and payload.

use bytes::Bytes;

use crate::error::{FilterError, Result};

/// Operation requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Working tree content to repository content.
    Clean,
    /// Repository content to working tree content.
    Smudge,
}

impl Command {
    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Clean => "clean",
            Command::Smudge => "smudge",
        }
    }
}

/// Key/value metadata sent ahead of a request payload.
///
/// Keys are unique and kept in arrival order; a repeated key replaces the
/// earlier value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: Vec<(String, String)>,
}

impl RequestHeaders {
    /// Build headers from `key=value` list entries.
    ///
    /// Each entry is split on its first `=`, so values may contain `=`.
    pub fn parse<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut headers = Self::default();
        for entry in entries {
            let entry = entry.as_ref();
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| FilterError::MalformedRequestEntry(entry.to_string()))?;
            headers.insert(key, value);
        }
        Ok(headers)
    }

    fn insert(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A complete request: metadata plus the reassembled payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub headers: RequestHeaders,
    pub payload: Bytes,
}

impl Request {
    pub fn new(headers: RequestHeaders, payload: Bytes) -> Self {
        Self { headers, payload }
    }

    /// The operation named by the `command` header.
    pub fn command(&self) -> Result<Command> {
        match self.headers.get("command") {
            Some("clean") => Ok(Command::Clean),
            Some("smudge") => Ok(Command::Smudge),
            Some(other) => Err(FilterError::UnknownCommand(other.to_string())),
            None => Err(FilterError::MissingCommand),
        }
    }

    /// Path of the file being filtered, if the host sent one.
    pub fn pathname(&self) -> Option<&str> {
        self.headers.get("pathname")
    }
}
