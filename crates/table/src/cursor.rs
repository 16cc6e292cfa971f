//! Continuation state of a paged read.
//!
//! A cursor is in one of three states:
//! - not started: no value, the next read begins at the start
//! - more available: a non-empty key, the next read resumes after it
//! - over: an empty key, the store reported no further rows

use crate::error::{TableError, TableResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use satchel_store::Key;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cursor {
    value: Option<Key>,
}

impl Cursor {
    /// A cursor that has not fetched anything yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> Option<&Key> {
        self.value.as_ref()
    }

    /// Record the continuation key of a store response. An absent key means
    /// the read is exhausted, so it is stored as an empty key.
    pub fn set(&mut self, value: Option<Key>) {
        self.value = Some(value.unwrap_or_default());
    }

    pub fn is_over(&self) -> bool {
        self.value.as_ref().is_some_and(|key| key.is_empty())
    }

    pub fn is_started(&self) -> bool {
        self.value.is_some()
    }

    pub fn reset(&mut self) {
        self.value = None;
    }

    /// Key to resume after, if the cursor points into the middle of a read.
    pub fn exclusive_start(&self) -> Option<Key> {
        self.value.as_ref().filter(|key| !key.is_empty()).cloned()
    }

    /// Encode as an opaque URL-safe token.
    pub fn to_token(&self) -> String {
        // A map of JSON values always serializes.
        let json = serde_json::to_vec(&self.value).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a token produced by [`Cursor::to_token`].
    pub fn from_token(token: &str) -> TableResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| TableError::InvalidCursor(e.to_string()))?;
        let value: Option<Key> =
            serde_json::from_slice(&bytes).map_err(|e| TableError::InvalidCursor(e.to_string()))?;
        Ok(Self { value })
    }
}
