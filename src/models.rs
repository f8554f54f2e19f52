//! Core data models used throughout the archive.
//!
//! These types represent the catalog documents and the content-addressed
//! snapshots that flow between the fetcher, the scanner and the store.

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Date format used for every date persisted in SQLite.
pub const STORED_DATE_FORMAT: &str = "%Y-%m-%d";

/// A document registered in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub id: String,
    pub official_title: String,
    pub title: String,
    pub status: String,
    pub kind: String,
    pub start_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
}

impl Document {
    /// A catalog entry carrying only an identifier.
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            official_title: String::new(),
            title: String::new(),
            status: String::new(),
            kind: String::new(),
            start_date: None,
            expiry_date: None,
        }
    }
}

/// SHA-256 digest of a document's raw fetched bytes, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(content: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(content)))
    }

    /// Wrap a digest read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One archived version of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub hash: ContentHash,
    pub document_id: String,
    /// Probe date at which this content was first observed.
    pub pub_date: NaiveDate,
    pub content: Vec<u8>,
}

impl Snapshot {
    pub fn new(document_id: impl Into<String>, pub_date: NaiveDate, content: Vec<u8>) -> Self {
        Self {
            hash: ContentHash::of(&content),
            document_id: document_id.into(),
            pub_date,
            content,
        }
    }
}

pub fn format_stored_date(date: NaiveDate) -> String {
    date.format(STORED_DATE_FORMAT).to_string()
}

pub fn parse_stored_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, STORED_DATE_FORMAT).ok()
}

/// Parse a user-supplied date, accepting `YYYY-MM-DD` or `DD-MM-YYYY`.
pub fn parse_user_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d-%m-%Y"))
        .ok()
}
