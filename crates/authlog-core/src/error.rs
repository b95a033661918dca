use std::path::PathBuf;
use thiserror::Error;

/// Failures loading, generating or persisting the RSA key pair.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Key I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key material in {}: {reason}", path.display())]
    InvalidKeyMaterial { path: PathBuf, reason: String },

    #[error("Incomplete key pair: {} is missing", missing.display())]
    PartialKeyPair { missing: PathBuf },

    #[error("Public key does not belong to the stored private key")]
    KeyMismatch,

    #[error("Key generation failed: {0}")]
    Generation(String),

    #[error("Key encoding failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Schema setup failed: {0}")]
    Schema(#[source] rusqlite::Error),

    #[error("Insert failed: {0}")]
    Insert(#[source] rusqlite::Error),

    #[error("Log record not found: {0}")]
    NotFound(i64),

    #[error("Query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Database connection is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Invalid rate {0}: entries per second must be a positive finite number")]
    InvalidRate(f64),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Raised when a status column holds something other than `success`/`failed`.
#[derive(Debug, Error)]
#[error("Unknown attempt status: {0:?}")]
pub struct ParseStatusError(pub String);
