//! Configuration system for the `taskboard` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use taskboard_proto::session::Session;
use taskboard_proto::task::Priority;

use crate::reminders::ReminderConfig;
use crate::sync::SyncConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    session: SessionFileConfig,
    sync: SyncFileConfig,
    reminders: RemindersFileConfig,
    data: DataFileConfig,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    user_id: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
    role: Option<String>,
    department: Option<String>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    cache_freshness_secs: Option<u64>,
}

/// `[reminders]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RemindersFileConfig {
    minutes_before: Option<u64>,
    countdown_tick_ms: Option<u64>,
    urgent_window_hours: Option<u64>,
    max_daily_reminders: Option<usize>,
}

/// `[data]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DataFileConfig {
    seed_file: Option<PathBuf>,
    cache_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Session --
    /// Stable user identifier.
    pub user_id: String,
    /// Login email.
    pub email: String,
    /// Display name.
    pub display_name: String,
    /// Raw role value; anything unrecognized means no access.
    pub role: Option<String>,
    /// Department for department leads.
    pub department: Option<String>,

    // -- Sync --
    /// Maximum age of cached tasks shown before the store answers.
    pub cache_freshness: Duration,

    // -- Reminders --
    /// Reminder timing.
    pub reminders: ReminderConfig,

    // -- Data --
    /// JSON file of task documents loaded into the store at startup.
    pub seed_file: Option<PathBuf>,
    /// File the task cache is persisted to between runs.
    pub cache_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            email: String::new(),
            display_name: String::new(),
            role: None,
            department: None,
            cache_freshness: Duration::from_secs(30),
            reminders: ReminderConfig::default(),
            seed_file: None,
            cache_file: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path
    /// (`~/.config/taskboard/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let reminders = &file.reminders;

        Self {
            user_id: cli
                .user_id
                .clone()
                .or_else(|| file.session.user_id.clone())
                .unwrap_or(defaults.user_id),
            email: cli
                .email
                .clone()
                .or_else(|| file.session.email.clone())
                .unwrap_or(defaults.email),
            display_name: cli
                .display_name
                .clone()
                .or_else(|| file.session.display_name.clone())
                .unwrap_or(defaults.display_name),
            role: cli.role.clone().or_else(|| file.session.role.clone()),
            department: cli
                .department
                .clone()
                .or_else(|| file.session.department.clone()),
            cache_freshness: file
                .sync
                .cache_freshness_secs
                .map_or(defaults.cache_freshness, Duration::from_secs),
            reminders: ReminderConfig {
                minutes_before: reminders
                    .minutes_before
                    .unwrap_or(defaults.reminders.minutes_before),
                countdown_tick: reminders
                    .countdown_tick_ms
                    .map_or(defaults.reminders.countdown_tick, Duration::from_millis),
                urgent_window: reminders
                    .urgent_window_hours
                    .map_or(defaults.reminders.urgent_window, |h| {
                        Duration::from_secs(h * 3_600)
                    }),
                max_daily_reminders: reminders
                    .max_daily_reminders
                    .unwrap_or(defaults.reminders.max_daily_reminders),
            },
            seed_file: cli
                .seed_file
                .clone()
                .or_else(|| file.data.seed_file.clone()),
            cache_file: cli
                .cache_file
                .clone()
                .or_else(|| file.data.cache_file.clone()),
        }
    }

    /// The session described by this configuration.
    #[must_use]
    pub fn session(&self) -> Session {
        Session::new(
            self.user_id.clone(),
            self.email.clone(),
            self.role.as_deref().unwrap_or_default(),
            self.department.clone().filter(|d| !d.is_empty()),
        )
        .with_display_name(self.display_name.clone())
    }

    /// Settings for the sync core.
    #[must_use]
    pub const fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            cache_freshness: self.cache_freshness,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Role-scoped task board")]
pub struct CliArgs {
    /// Session role (`admin`, `jefe`, `operativo`).
    #[arg(long, env = "TASKBOARD_ROLE")]
    pub role: Option<String>,

    /// Session email.
    #[arg(long, env = "TASKBOARD_EMAIL")]
    pub email: Option<String>,

    /// Session user identifier.
    #[arg(long, env = "TASKBOARD_USER_ID")]
    pub user_id: Option<String>,

    /// Session display name.
    #[arg(long)]
    pub display_name: Option<String>,

    /// Session department.
    #[arg(long, env = "TASKBOARD_DEPARTMENT")]
    pub department: Option<String>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON file of task documents to load into the store.
    #[arg(long)]
    pub seed_file: Option<PathBuf>,

    /// File the task cache is persisted to between runs.
    #[arg(long)]
    pub cache_file: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskboard.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do (default: `list`).
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands of the `taskboard` binary.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List visible tasks, optionally filtered.
    List {
        /// Case-insensitive title search.
        #[arg(long)]
        search: Option<String>,
        /// Only this area.
        #[arg(long)]
        area: Option<String>,
        /// Only tasks assigned to this user.
        #[arg(long)]
        responsible: Option<String>,
        /// Only this priority (`alta`, `media`, `baja`).
        #[arg(long)]
        priority: Option<Priority>,
        /// Only tasks past their due date.
        #[arg(long)]
        overdue: bool,
    },
    /// Per-area report, critical and urgent tasks, daily digest.
    Report,
    /// Print the visible tasks (or the report with `--stats`) as CSV.
    Export {
        /// Export the statistics report instead of the task list.
        #[arg(long)]
        stats: bool,
    },
    /// Follow the live task list and the nearest countdown.
    Watch {
        /// Seconds to keep watching.
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// Schedule due-date reminders for the visible open tasks.
    Remind {
        /// Minutes before the due date (default from config).
        #[arg(long)]
        minutes_before: Option<u64>,
        /// Also schedule daily reminders.
        #[arg(long)]
        daily: bool,
    },
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("taskboard").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
