//! Authentication attempt records as stored in `auth_logs`.

use crate::error::ParseStatusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failed,
}

impl AttemptStatus {
    pub const ALL: [AttemptStatus; 2] = [AttemptStatus::Success, AttemptStatus::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for AttemptStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record before the store has assigned `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogRecord {
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub username: String,
    /// Raw credential bytes or base64 RSA-OAEP ciphertext (`encrypted_password` column).
    pub encrypted_credential: Option<Vec<u8>>,
    pub status: AttemptStatus,
    /// Free text (`attempt_details` column).
    pub detail: Option<String>,
}

impl NewLogRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        source_ip: impl Into<String>,
        username: impl Into<String>,
        status: AttemptStatus,
    ) -> Self {
        Self {
            timestamp,
            source_ip: source_ip.into(),
            username: username.into(),
            encrypted_credential: None,
            status,
            detail: None,
        }
    }

    pub fn with_credential(mut self, credential: Option<Vec<u8>>) -> Self {
        self.encrypted_credential = credential;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach the store-assigned fields.
    pub fn into_record(self, id: i64, created_at: DateTime<Utc>) -> LogRecord {
        LogRecord {
            id,
            timestamp: self.timestamp,
            source_ip: self.source_ip,
            username: self.username,
            encrypted_credential: self.encrypted_credential,
            status: self.status,
            detail: self.detail,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub username: String,
    pub encrypted_credential: Option<Vec<u8>>,
    pub status: AttemptStatus,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    /// The caller-supplied part of the record, without store-assigned fields.
    pub fn to_new_record(&self) -> NewLogRecord {
        NewLogRecord {
            timestamp: self.timestamp,
            source_ip: self.source_ip.clone(),
            username: self.username.clone(),
            encrypted_credential: self.encrypted_credential.clone(),
            status: self.status,
            detail: self.detail.clone(),
        }
    }
}
