//! Shared type definitions for the database layer.

use rusqlite::ffi;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

impl DbError {
    /// True when SQLite rejected a write because a unique or primary key
    /// constraint already holds a row with the same key.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.extended_code,
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            ),
            _ => false,
        }
    }
}

/// Where a link row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSource {
    /// Written by the auto-linker.
    Auto,
    /// Created by the user.
    Manual,
    /// Written by a content scan.
    Scan,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkSource::Auto => "auto",
            LinkSource::Manual => "manual",
            LinkSource::Scan => "scan",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(LinkSource::Auto),
            "manual" => Some(LinkSource::Manual),
            "scan" => Some(LinkSource::Scan),
            _ => None,
        }
    }
}

/// Message channel of a stored communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Imessage,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Imessage => "imessage",
        }
    }
}

/// A row from the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbUser {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// A contact together with its identifier rows, as handed in by contact CRUD.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbContact {
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub emails: Vec<String>,
    /// Phone numbers as entered; the canonical form is derived on write.
    #[serde(default)]
    pub phones: Vec<String>,
}

/// A row from the `transactions` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTransaction {
    pub id: String,
    pub user_id: String,
    pub property_address: Option<String>,
    pub status: String,
    pub started_at: Option<String>,
    pub created_at: String,
    pub closed_at: Option<String>,
}

/// A contact assigned to a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTransactionContact {
    pub contact_id: String,
    pub role: String,
}

/// A row from the `emails` table, as written by ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbEmail {
    pub id: String,
    pub user_id: String,
    pub external_id: Option<String>,
    pub thread_id: Option<String>,
    pub sender: Option<String>,
    pub recipients: Option<String>,
    pub cc: Option<String>,
    pub subject: Option<String>,
    pub body_plain: Option<String>,
    pub sent_at: Option<String>,
}

/// A row from the `messages` table, as written by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMessage {
    pub id: String,
    pub user_id: String,
    pub channel: Channel,
    pub external_id: Option<String>,
    pub thread_id: Option<String>,
    /// Structured participants payload (JSON).
    pub participants: Option<String>,
    /// Denormalized, searchable participant handles.
    pub participants_flat: Option<String>,
    pub body_text: Option<String>,
    pub sent_at: Option<String>,
    pub transaction_id: Option<String>,
    pub is_duplicate: bool,
}

/// A row from the `communications` junction table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbLink {
    pub id: String,
    pub user_id: String,
    pub transaction_id: String,
    pub email_id: Option<String>,
    pub message_id: Option<String>,
    pub thread_id: Option<String>,
    pub link_source: LinkSource,
    pub link_confidence: Option<f64>,
    pub linked_at: String,
}

/// Subject and body of one email, for address content filtering.
#[derive(Debug, Clone)]
pub struct EmailContent {
    pub id: String,
    pub subject: Option<String>,
    pub body: Option<String>,
}

/// A text message matched by the denormalized participant search.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: String,
    pub thread_id: Option<String>,
}

/// A text message that only carries the structured participants payload.
#[derive(Debug, Clone)]
pub struct StructuredMessageRow {
    pub id: String,
    pub thread_id: Option<String>,
    pub participants: Option<String>,
}

/// A junction row about to be written.
#[derive(Debug, Clone)]
pub struct NewLink<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub transaction_id: &'a str,
    pub email_id: Option<&'a str>,
    pub message_id: Option<&'a str>,
    pub thread_id: Option<&'a str>,
    pub source: LinkSource,
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_detected_by_extended_code() {
        let err = DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT_UNIQUE),
            Some("UNIQUE constraint failed".to_string()),
        ));
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_trigger_abort_is_not_unique_violation() {
        let err = DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT_TRIGGER),
            Some("UNIQUE constraint failed (but not really)".to_string()),
        ));
        assert!(!err.is_unique_violation());
        assert!(!DbError::Migration("boom".into()).is_unique_violation());
    }

    #[test]
    fn test_link_source_round_trip() {
        for source in [LinkSource::Auto, LinkSource::Manual, LinkSource::Scan] {
            assert_eq!(LinkSource::parse(source.as_str()), Some(source));
        }
        assert_eq!(LinkSource::parse("guess"), None);
    }
}
