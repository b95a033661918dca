use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DATA_DIR_ENV: &str = "AUTHLOG_DATA_DIR";
pub const DATABASE_ENV: &str = "AUTHLOG_DATABASE";
pub const KEYS_DIR_ENV: &str = "AUTHLOG_KEYS_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file; parent directories are created on connect.
    pub path: PathBuf,
}

impl DatabaseConfig {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// `None` runs until interrupted.
    pub duration_secs: Option<u64>,
    pub entries_per_second: f64,
    pub success_rate: f64,
    pub encrypt_credentials: bool,
}

impl SimulatorConfig {
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            duration_secs: Some(3600),
            entries_per_second: 2.0,
            success_rate: 0.7,
            encrypt_credentials: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub database: DatabaseConfig,
    pub keys_dir: PathBuf,
    pub simulator: SimulatorConfig,
}

/// Values supplied on the command line. They win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub keys_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Default layout rooted at `data_dir`.
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            database: DatabaseConfig::new(paths::database_path(data_dir)),
            keys_dir: paths::keys_dir(data_dir),
            simulator: SimulatorConfig::default(),
        }
    }

    pub fn resolve(overrides: ConfigOverrides) -> anyhow::Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Precedence: explicit override, then environment, then the platform data directory.
    pub fn resolve_with<F>(overrides: ConfigOverrides, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_path = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
        };

        let data_dir = match overrides.data_dir.or_else(|| env_path(DATA_DIR_ENV)) {
            Some(dir) => dir,
            None => paths::data_dir()?,
        };
        let mut config = Self::for_data_dir(&data_dir);
        if let Some(path) = overrides.database.or_else(|| env_path(DATABASE_ENV)) {
            config.database.path = path;
        }
        if let Some(dir) = overrides.keys_dir.or_else(|| env_path(KEYS_DIR_ENV)) {
            config.keys_dir = dir;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn data_dir_derives_database_and_keys() {
        let config = AppConfig::resolve_with(
            ConfigOverrides {
                data_dir: Some(PathBuf::from("/tmp/authlog-data")),
                ..Default::default()
            },
            lookup(&[]),
        )
        .unwrap();
        assert_eq!(
            config.database.path,
            PathBuf::from("/tmp/authlog-data/ssh_logs.db")
        );
        assert_eq!(config.keys_dir, PathBuf::from("/tmp/authlog-data/keys"));
        assert_eq!(config.simulator, SimulatorConfig::default());
    }

    #[test]
    fn overrides_beat_environment() {
        let env = lookup(&[
            (DATA_DIR_ENV, "/env/data"),
            (DATABASE_ENV, "/env/logs.db"),
            (KEYS_DIR_ENV, "/env/keys"),
        ]);
        let config = AppConfig::resolve_with(
            ConfigOverrides {
                database: Some(PathBuf::from("/cli/logs.db")),
                ..Default::default()
            },
            env,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/env/data"));
        assert_eq!(config.database.path, PathBuf::from("/cli/logs.db"));
        assert_eq!(config.keys_dir, PathBuf::from("/env/keys"));
    }

    #[test]
    fn blank_environment_values_are_ignored() {
        let config = AppConfig::resolve_with(
            ConfigOverrides {
                data_dir: Some(PathBuf::from("/srv/authlog")),
                ..Default::default()
            },
            lookup(&[(DATABASE_ENV, "  ")]),
        )
        .unwrap();
        assert_eq!(config.database.path, PathBuf::from("/srv/authlog/ssh_logs.db"));
    }

    #[test]
    fn default_simulator_runs_an_hour_at_two_per_second() {
        let sim = SimulatorConfig::default();
        assert_eq!(sim.duration(), Some(Duration::from_secs(3600)));
        assert_eq!(sim.entries_per_second, 2.0);
        assert!(sim.encrypt_credentials);
    }
}
