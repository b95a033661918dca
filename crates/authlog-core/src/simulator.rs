//! Synthetic SSH login attempt generator.

use crate::cipher::CredentialCipher;
use crate::error::{SimulatorError, StoreError};
use crate::models::{AttemptStatus, LogRecord, NewLogRecord};
use crate::store::LogStore;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub const DEFAULT_USERNAMES: [&str; 6] = ["admin", "root", "user", "jenkins", "ubuntu", "system"];
pub const DEFAULT_PASSWORDS: [&str; 5] = ["password123", "admin123", "root123", "123456", "qwerty"];
pub const DEFAULT_SUCCESS_RATE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DurationElapsed,
    CountReached,
    Interrupted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub generated: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Attempts that could not be stored.
    pub errors: u64,
    pub stop_reason: Option<StopReason>,
}

impl RunSummary {
    fn record(&mut self, outcome: &Result<LogRecord, SimulatorError>) {
        match outcome {
            Ok(record) => {
                self.generated += 1;
                match record.status {
                    AttemptStatus::Success => self.succeeded += 1,
                    AttemptStatus::Failed => self.failed += 1,
                }
            }
            Err(_) => self.errors += 1,
        }
    }
}

pub struct AttemptSimulator<R = StdRng> {
    store: LogStore,
    cipher: Option<CredentialCipher>,
    usernames: Vec<String>,
    passwords: Vec<String>,
    success_rate: f64,
    rng: R,
}

impl AttemptSimulator<StdRng> {
    pub fn new(store: LogStore) -> Self {
        Self {
            store,
            cipher: None,
            usernames: DEFAULT_USERNAMES.iter().map(|s| s.to_string()).collect(),
            passwords: DEFAULT_PASSWORDS.iter().map(|s| s.to_string()).collect(),
            success_rate: DEFAULT_SUCCESS_RATE,
            rng: StdRng::from_entropy(),
        }
    }
}

impl<R: Rng> AttemptSimulator<R> {
    pub fn with_rng<R2: Rng>(self, rng: R2) -> AttemptSimulator<R2> {
        AttemptSimulator {
            store: self.store,
            cipher: self.cipher,
            usernames: self.usernames,
            passwords: self.passwords,
            success_rate: self.success_rate,
            rng,
        }
    }

    /// Encrypt credentials before storing them instead of writing raw bytes.
    pub fn with_cipher(mut self, cipher: CredentialCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Probability of an attempt being recorded as `success`, clamped to `[0, 1]`.
    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = if rate.is_nan() {
            DEFAULT_SUCCESS_RATE
        } else {
            rate.clamp(0.0, 1.0)
        };
        self
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    /// Uniform over the whole IPv4 space, reserved ranges included.
    pub fn generate_random_address(&mut self) -> String {
        Ipv4Addr::from(self.rng.gen::<u32>()).to_string()
    }

    /// Build one attempt and insert it. A failed insert is rolled back by the
    /// store, logged here, and handed back to the caller.
    pub fn generate_attempt(&mut self) -> Result<LogRecord, SimulatorError> {
        let timestamp = Utc::now();
        let source_ip = self.generate_random_address();
        let username = pick(&self.usernames, &mut self.rng);
        let password = pick(&self.passwords, &mut self.rng);
        let status = if self.rng.gen::<f64>() < self.success_rate {
            AttemptStatus::Success
        } else {
            AttemptStatus::Failed
        };

        let credential = match &self.cipher {
            Some(cipher) => cipher.encrypt(&password).map_err(|e| {
                warn!(error = %e, "failed to encrypt credential");
                SimulatorError::from(e)
            })?,
            None => Some(password.into_bytes()).filter(|bytes| !bytes.is_empty()),
        };

        let record = NewLogRecord::new(timestamp, source_ip.clone(), username, status)
            .with_credential(credential)
            .with_detail(format!("SSH login attempt from {source_ip}"));

        let id = self.store.insert(&record).map_err(|e| {
            warn!(error = %e, "error inserting log entry");
            SimulatorError::from(e)
        })?;
        // The row is committed at this point; a failed read-back is not a lost attempt.
        let stored = match self.store.get_by_id(id) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(id, error = %e, "stored log entry could not be read back");
                record.into_record(id, Utc::now())
            }
        };

        info!(
            status = %stored.status,
            source_ip = %stored.source_ip,
            username = %stored.username,
            "login attempt recorded"
        );
        Ok(stored)
    }

    /// Generate `count` attempts back to back, without pacing.
    pub fn generate_batch(&mut self, count: usize) -> RunSummary {
        let mut summary = RunSummary::default();
        for _ in 0..count {
            let outcome = self.generate_attempt();
            summary.record(&outcome);
        }
        summary
    }

    /// Generate `count` attempts unpaced, stopping early on Ctrl-C. The store is closed on exit.
    pub async fn run_batch(&mut self, count: usize) -> RunSummary {
        self.run_batch_until(count, ctrl_c_or_pending()).await
    }

    /// Same as [`run_batch`](Self::run_batch) with a caller-supplied shutdown signal.
    pub async fn run_batch_until<F>(&mut self, count: usize, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();
        let mut reason = StopReason::CountReached;
        for _ in 0..count {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    reason = StopReason::Interrupted;
                    break;
                }
                _ = tokio::task::yield_now() => {}
            }
            let outcome = self.generate_attempt();
            summary.record(&outcome);
        }
        if reason == StopReason::Interrupted {
            info!(generated = summary.generated, "batch stopped by user");
        }
        summary.stop_reason = Some(reason);
        self.cleanup();
        summary
    }

    /// Run until `duration` elapses or Ctrl-C arrives. The store is closed on exit.
    pub async fn run(
        &mut self,
        duration: Option<Duration>,
        entries_per_second: f64,
    ) -> Result<RunSummary, SimulatorError> {
        self.run_until(duration, entries_per_second, ctrl_c_or_pending())
            .await
    }

    /// Same loop as [`run`](Self::run) with a caller-supplied shutdown signal.
    pub async fn run_until<F>(
        &mut self,
        duration: Option<Duration>,
        entries_per_second: f64,
        shutdown: F,
    ) -> Result<RunSummary, SimulatorError>
    where
        F: Future<Output = ()>,
    {
        let result = self.drive(duration, entries_per_second, shutdown).await;
        self.cleanup();
        result
    }

    async fn drive<F>(
        &mut self,
        duration: Option<Duration>,
        entries_per_second: f64,
        shutdown: F,
    ) -> Result<RunSummary, SimulatorError>
    where
        F: Future<Output = ()>,
    {
        if !entries_per_second.is_finite() || entries_per_second <= 0.0 {
            return Err(SimulatorError::InvalidRate(entries_per_second));
        }
        if !self.store.is_open() {
            return Err(StoreError::Closed.into());
        }

        let interval = Duration::try_from_secs_f64(1.0 / entries_per_second)
            .map_err(|_| SimulatorError::InvalidRate(entries_per_second))?;
        let started = Instant::now();
        tokio::pin!(shutdown);
        info!(
            duration = ?duration,
            entries_per_second,
            encrypted = self.cipher.is_some(),
            "starting SSH log simulation"
        );

        let mut summary = RunSummary::default();
        let reason = loop {
            let outcome = self.generate_attempt();
            summary.record(&outcome);

            tokio::select! {
                biased;
                _ = &mut shutdown => break StopReason::Interrupted,
                _ = tokio::time::sleep(interval) => {}
            }

            if let Some(limit) = duration {
                if started.elapsed() >= limit {
                    break StopReason::DurationElapsed;
                }
            }
        };

        match reason {
            StopReason::Interrupted => info!("simulation stopped by user"),
            StopReason::DurationElapsed => info!("simulation duration elapsed"),
            StopReason::CountReached => {}
        }
        summary.stop_reason = Some(reason);
        Ok(summary)
    }

    /// Close the database connection. Safe to call more than once.
    pub fn cleanup(&mut self) {
        if self.store.is_open() {
            self.store.close();
            info!("simulation ended, database connection closed");
        }
    }
}

async fn ctrl_c_or_pending() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn pick<R: Rng>(candidates: &[String], rng: &mut R) -> String {
    candidates.choose(rng).cloned().unwrap_or_default()
}
