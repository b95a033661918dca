use anyhow::{anyhow, Context, Result};
use authlog_core::{
    AppConfig, AttemptSimulator, AttemptStatus, ConfigOverrides, CredentialCipher,
    KeyStore, LogRecord, LogStore, RunSummary, StoreError,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "authlog-cli")]
#[command(author, version, about = "Simulated SSH authentication log database", long_about = None)]
struct Cli {
    /// Base directory for the database and key files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// SQLite database file (defaults to <data-dir>/ssh_logs.db)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Directory holding private_key.pem / public_key.pem
    #[arg(long, global = true)]
    keys_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the auth_logs table and its indexes
    InitDb,

    /// Generate synthetic login attempts
    Simulate {
        /// Seconds to run for (default: one hour)
        #[arg(long, conflicts_with = "until_interrupted")]
        duration: Option<u64>,

        /// Run until Ctrl-C
        #[arg(long)]
        until_interrupted: bool,

        /// Attempts per second
        #[arg(long)]
        rate: Option<f64>,

        /// Generate exactly this many attempts, without pacing
        #[arg(long, conflicts_with_all = ["duration", "until_interrupted", "rate"])]
        count: Option<usize>,

        /// Store passwords as raw bytes instead of encrypting them
        #[arg(long)]
        plain: bool,
    },

    /// List the most recent attempts
    Recent {
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Only attempts for this username
        #[arg(short, long)]
        user: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show one attempt with its credential decrypted
    Show {
        id: i64,

        #[arg(long)]
        json: bool,
    },

    /// Attempt totals by status and the busiest source addresses
    Stats {
        #[arg(long, default_value = "3")]
        top: usize,
    },

    /// Manage the RSA key pair
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Print the resolved configuration
    Config,
}

#[derive(Subcommand, Debug)]
enum KeyCommands {
    /// Generate the key pair if it does not exist yet
    Init,
    /// Print the public key and its fingerprint
    Show,
}

#[derive(Serialize)]
struct RecordView {
    id: i64,
    timestamp: DateTime<Utc>,
    source_ip: String,
    username: String,
    status: AttemptStatus,
    details: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

impl RecordView {
    fn new(record: &LogRecord, password: Option<String>) -> Self {
        Self {
            id: record.id,
            timestamp: record.timestamp,
            source_ip: record.source_ip.clone(),
            username: record.username.clone(),
            status: record.status,
            details: record.detail.clone(),
            created_at: record.created_at,
            password,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::resolve(ConfigOverrides {
        data_dir: cli.data_dir,
        database: cli.database,
        keys_dir: cli.keys_dir,
    })?;

    match cli.command {
        Commands::InitDb => init_db_command(&config),
        Commands::Simulate {
            duration,
            until_interrupted,
            rate,
            count,
            plain,
        } => {
            let duration = if until_interrupted {
                None
            } else {
                duration.or(config.simulator.duration_secs)
            };
            let rate = rate.unwrap_or(config.simulator.entries_per_second);
            let encrypt = config.simulator.encrypt_credentials && !plain;
            simulate_command(&config, duration, rate, count, encrypt).await
        }
        Commands::Recent { limit, user, json } => recent_command(&config, limit, user, json),
        Commands::Show { id, json } => show_command(&config, id, json),
        Commands::Stats { top } => stats_command(&config, top),
        Commands::Keys { command } => keys_command(&config, command),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn open_store(config: &AppConfig) -> Result<LogStore> {
    let store = LogStore::connect(&config.database).with_context(|| {
        format!(
            "cannot open database at {}",
            config.database.path.display()
        )
    })?;
    store.ensure_schema()?;
    Ok(store)
}

fn load_cipher(config: &AppConfig) -> Result<CredentialCipher> {
    let keys = KeyStore::new(&config.keys_dir)
        .load_or_create()
        .with_context(|| format!("cannot load key pair from {}", config.keys_dir.display()))?;
    Ok(CredentialCipher::new(keys))
}

fn init_db_command(config: &AppConfig) -> Result<()> {
    open_store(config)?;
    println!(
        "Database and tables created successfully at {}",
        config.database.path.display()
    );
    Ok(())
}

async fn simulate_command(
    config: &AppConfig,
    duration: Option<u64>,
    rate: f64,
    count: Option<usize>,
    encrypt: bool,
) -> Result<()> {
    let store = open_store(config)?;
    let mut simulator =
        AttemptSimulator::new(store).with_success_rate(config.simulator.success_rate);
    if encrypt {
        simulator = simulator.with_cipher(load_cipher(config)?);
    }

    let summary = match count {
        Some(count) => simulator.run_batch(count).await,
        None => {
            info!("press Ctrl-C to stop");
            simulator
                .run(duration.map(Duration::from_secs), rate)
                .await?
        }
    };
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Generated {} attempts ({} success, {} failed, {} errors)",
        summary.generated, summary.succeeded, summary.failed, summary.errors
    );
}

fn recent_command(
    config: &AppConfig,
    limit: usize,
    user: Option<String>,
    json: bool,
) -> Result<()> {
    let store = open_store(config)?;
    let records = match user {
        Some(user) => store.list_by_username(&user, limit)?,
        None => store.list_recent(limit)?,
    };

    if json {
        let views: Vec<RecordView> = records.iter().map(|r| RecordView::new(r, None)).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    println!("Recent Log Entries:");
    println!("ID\tTimestamp\t\t\tSource IP\tUsername\tStatus");
    println!("{}", "-".repeat(80));
    for record in &records {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            record.id,
            record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            record.source_ip,
            record.username,
            record.status
        );
    }
    Ok(())
}

fn show_command(config: &AppConfig, id: i64, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let record = match store.get_by_id(id) {
        Ok(record) => record,
        Err(StoreError::NotFound(_)) => return Err(anyhow!("No entry found with ID {id}")),
        Err(e) => return Err(e.into()),
    };

    let password = match record.encrypted_credential.as_deref() {
        Some(blob) if !blob.is_empty() => Some(describe_credential(config, blob)?),
        _ => None,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&RecordView::new(&record, password))?
        );
        return Ok(());
    }

    println!("Decrypted Log Entry:");
    println!("ID: {}", record.id);
    println!("Timestamp: {}", record.timestamp);
    println!("Source IP: {}", record.source_ip);
    println!("Username: {}", record.username);
    println!("Original Password: {}", password.unwrap_or_default());
    println!("Status: {}", record.status);
    println!("Details: {}", record.detail.unwrap_or_default());
    println!("Created: {}", record.created_at);
    Ok(())
}

/// Decrypt a stored credential; rows written with `--plain` hold raw bytes instead.
///
/// Keys are only read, never generated, and only for blobs shaped like ciphertext.
fn describe_credential(config: &AppConfig, blob: &[u8]) -> Result<String> {
    if !looks_like_ciphertext(blob) {
        return Ok(match std::str::from_utf8(blob) {
            Ok(raw) => format!("{raw} (stored unencrypted)"),
            Err(_) => format!("<{} bytes, not UTF-8>", blob.len()),
        });
    }

    let store = KeyStore::new(&config.keys_dir);
    let keys = store
        .load()
        .with_context(|| format!("cannot load key pair from {}", store.dir().display()))?;
    Ok(match CredentialCipher::new(keys).decrypt(blob) {
        Ok(plaintext) => plaintext.unwrap_or_default(),
        Err(e) => format!("<cannot decrypt: {e}>"),
    })
}

// Base64 of a 2048-bit RSA block is always 344 characters.
fn looks_like_ciphertext(blob: &[u8]) -> bool {
    blob.len() == 344
}

fn stats_command(config: &AppConfig, top: usize) -> Result<()> {
    let store = open_store(config)?;
    println!("Total attempts: {}", store.count_all()?);
    for status in AttemptStatus::ALL {
        println!("{}: {}", status, store.count_by_status(status)?);
    }
    let busiest = store.top_source_ips(top)?;
    if !busiest.is_empty() {
        println!("Top source IPs:");
        for (ip, attempts) in busiest {
            println!("  {ip}\t{attempts}");
        }
    }
    Ok(())
}

fn keys_command(config: &AppConfig, command: KeyCommands) -> Result<()> {
    let store = KeyStore::new(&config.keys_dir);
    let keys = store
        .load_or_create()
        .with_context(|| format!("cannot load key pair from {}", store.dir().display()))?;
    match command {
        KeyCommands::Init => {
            println!("Private key: {}", store.private_key_path().display());
            println!("Public key: {}", store.public_key_path().display());
        }
        KeyCommands::Show => {
            print!("{}", keys.public_key_pem()?);
        }
    }
    println!("Fingerprint: {}", keys.fingerprint()?);
    Ok(())
}
