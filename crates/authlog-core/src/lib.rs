//! authlog-core: simulated SSH authentication logs
//!
//! # Data flow
//! `AttemptSimulator` builds a synthetic login attempt, optionally encrypts
//! the attempted password with `CredentialCipher` (RSA-OAEP, key pair from
//! `KeyStore`), and appends it to `auth_logs` through `LogStore`. Retrieval
//! reads a row back and decrypts the credential with the same key pair.
//!
//! The stored ciphertext carries no key identifier: records can only be
//! decrypted with the single key pair that is current for the key directory.

pub mod cipher;
pub mod config;
pub mod error;
pub mod keystore;
pub mod models;
pub mod paths;
pub mod simulator;
pub mod store;

pub use cipher::CredentialCipher;
pub use config::{AppConfig, ConfigOverrides, DatabaseConfig, SimulatorConfig};
pub use error::{CipherError, KeyError, SimulatorError, StoreError};
pub use keystore::{KeyPair, KeyStore};
pub use models::{AttemptStatus, LogRecord, NewLogRecord};
pub use simulator::{AttemptSimulator, RunSummary, StopReason};
pub use store::LogStore;
