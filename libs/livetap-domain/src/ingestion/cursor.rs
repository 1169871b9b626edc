//! Cursor - Resume position in the upstream listing

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position in the upstream result sequence
///
/// A Cursor is opaque to the loop: it only ever comes from the upstream
/// (`Page::next_cursor`) or from the cursor store, and is handed back to the
/// upstream unchanged on the next fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cursor {
    /// Start of the listing (first page)
    #[default]
    Beginning,
    /// Upstream continuation token
    At(String),
}

impl Cursor {
    /// Create a cursor from an upstream continuation token
    pub fn at(token: impl Into<String>) -> Self {
        Self::At(token.into())
    }

    /// Get the continuation token, `None` for the beginning of the listing
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Beginning => None,
            Self::At(token) => Some(token),
        }
    }

    pub fn is_beginning(&self) -> bool {
        matches!(self, Self::Beginning)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Beginning => write!(f, "<beginning>"),
            Self::At(token) => write!(f, "{}", token),
        }
    }
}

impl From<String> for Cursor {
    fn from(token: String) -> Self {
        Self::At(token)
    }
}

impl From<&str> for Cursor {
    fn from(token: &str) -> Self {
        Self::At(token.to_string())
    }
}
