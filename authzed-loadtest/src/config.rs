//! Configuration for the load generator.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line overrides (see [`Overrides`])
//! 2. Environment variables (prefixed with `LT__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `LT__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `LT__AUTHZED__API=http://localhost:8443` sets the AuthZed HTTP endpoint
//! - `LT__WORKLOAD__READ_RATIO=100` issues 100 permission checks per written relationship
//! - `LT__WORKLOAD__DURATION=5m` runs the workload for five minutes
//!
//! # YAML Configuration File
//!
//! ```yaml
//! authzed:
//!   api: http://localhost:8443
//!   key: somerandomkeyhere
//!
//! workload:
//!   read_ratio: 100
//!   duration_sec: 300
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::fake::Vocabulary;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "LT__";

/// Newtype around `String` that protects against accidental logging of the AuthZed key. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Returns the secret value. Only call this where the key is actually sent.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Consistency requirement of permission checks.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    /// Every check is evaluated at the latest revision.
    #[default]
    Full,
    /// The service may pick a slightly stale revision to answer faster.
    MinimizeLatency,
}

impl From<ConsistencyMode> for authzed_client::Consistency {
    fn from(mode: ConsistencyMode) -> Self {
        match mode {
            ConsistencyMode::Full => authzed_client::Consistency::FullyConsistent,
            ConsistencyMode::MinimizeLatency => authzed_client::Consistency::MinimizeLatency,
        }
    }
}

/// Connection to the AuthZed HTTP API.
///
/// Used in: [`Config::authzed`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthZed {
    /// Base URL of the AuthZed HTTP API, for example `http://localhost:8443`.
    ///
    /// Required unless running in dry-run mode.
    ///
    /// # Environment Variable
    ///
    /// `LT__AUTHZED__API`
    pub api: Option<String>,

    /// Pre-shared key sent as bearer token.
    ///
    /// Required unless running in dry-run mode. The key is redacted from logs.
    ///
    /// # Environment Variable
    ///
    /// `LT__AUTHZED__KEY`
    pub key: Option<SecretBox<ConfigSecret>>,

    /// Schema to write before the workload starts.
    ///
    /// When unset, the schema already present in the permission system is used as-is.
    pub schema: Option<String>,

    /// Connect and read timeout of every request.
    ///
    /// # Default
    ///
    /// `3s`
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Number of attempts per request, including the first one.
    ///
    /// # Default
    ///
    /// `3`
    pub retry_attempts: u32,

    /// Fixed delay between two attempts of the same request.
    ///
    /// # Default
    ///
    /// `1s`
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Consistency requirement of permission checks.
    ///
    /// # Default
    ///
    /// `full`
    pub consistency: ConsistencyMode,
}

impl Default for AuthZed {
    fn default() -> Self {
        Self {
            api: None,
            key: None,
            schema: None,
            timeout: Duration::from_secs(3),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            consistency: ConsistencyMode::default(),
        }
    }
}

/// Shape of the generated load.
///
/// Used in: [`Config::workload`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Workload {
    /// Wall-clock duration of the run.
    ///
    /// # Default
    ///
    /// `60s`
    ///
    /// # Environment Variable
    ///
    /// `LT__WORKLOAD__DURATION`
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Duration of the run in whole seconds.
    ///
    /// Takes precedence over [`duration`](Self::duration) when set.
    pub duration_sec: Option<u64>,

    /// Number of permission checks queued per successfully written relationship.
    ///
    /// `0` results in a write-only workload without any read workers.
    ///
    /// # Default
    ///
    /// `1`
    pub read_ratio: usize,

    /// Number of concurrent write workers.
    ///
    /// # Default
    ///
    /// `1`
    pub write_workers: usize,

    /// Upper bound for the number of concurrent read workers.
    ///
    /// One read worker is started per unit of `read_ratio`, capped at this value.
    ///
    /// # Default
    ///
    /// `None` (uncapped)
    pub max_readers: Option<usize>,

    /// Capacity of the queue between write and read workers.
    ///
    /// # Default
    ///
    /// `10000`
    pub queue_capacity: usize,

    /// Time a dry-run write worker spends per iteration in place of the API call.
    ///
    /// # Default
    ///
    /// `5ms`
    #[serde(with = "humantime_serde")]
    pub idle_backoff: Duration,

    /// Seed for all generated identifiers.
    ///
    /// # Default
    ///
    /// `None` (random seed per run)
    pub seed: Option<u64>,

    /// Object type of written resources.
    pub object_type: String,

    /// Prefix of generated resource identifiers.
    pub object_prefix: String,

    /// Object type of subjects.
    pub subject_type: String,

    /// Relations to pick from when writing relationships.
    pub relations: Vec<String>,

    /// Permissions to pick from when checking.
    pub permissions: Vec<String>,
}

impl Workload {
    /// Returns the effective duration of the run.
    pub fn effective_duration(&self) -> Duration {
        match self.duration_sec {
            Some(secs) => Duration::from_secs(secs),
            None => self.duration,
        }
    }

    /// Returns the identifiers used to generate relationships and checks.
    pub fn vocabulary(&self) -> Vocabulary {
        Vocabulary {
            object_type: self.object_type.clone(),
            object_prefix: self.object_prefix.clone(),
            subject_type: self.subject_type.clone(),
            relations: self.relations.clone(),
            permissions: self.permissions.clone(),
        }
    }
}

impl Default for Workload {
    fn default() -> Self {
        let vocabulary = Vocabulary::default();
        Self {
            duration: Duration::from_secs(60),
            duration_sec: None,
            read_ratio: 1,
            write_workers: 1,
            max_readers: None,
            queue_capacity: 10_000,
            idle_backoff: Duration::from_millis(5),
            seed: None,
            object_type: vocabulary.object_type,
            object_prefix: vocabulary.object_prefix,
            subject_type: vocabulary.subject_type,
            relations: vocabulary.relations,
            permissions: vocabulary.permissions,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Compact output with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable takes precedence if set. At `DEBUG`, every single
    /// relationship write and permission check is logged.
    ///
    /// # Default
    ///
    /// `INFO`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    pub format: LogFormat,

    /// Whether to log to stderr.
    ///
    /// # Default
    ///
    /// `true`
    pub stderr: bool,

    /// Additionally write logs to this file, truncating it first.
    pub file: Option<PathBuf>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            stderr: true,
            file: None,
        }
    }
}

/// Prometheus metrics configuration.
///
/// Used in: [`Config::metrics`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Metrics {
    /// Whether to expose metrics on [`addr`](Self::addr) while the workload runs.
    pub enabled: bool,

    /// Socket address of the Prometheus scrape endpoint.
    ///
    /// # Default
    ///
    /// `0.0.0.0:2112`
    pub addr: SocketAddr,

    /// Keep the endpoint alive after the run until interrupted.
    pub serve: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: SocketAddr::from(([0, 0, 0, 0], 2112)),
            serve: false,
        }
    }
}

/// Main configuration struct of the load generator.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Connection to the AuthZed HTTP API.
    pub authzed: AuthZed,

    /// Shape of the generated load.
    pub workload: Workload,

    /// Log verbosity, format and destinations.
    pub logging: Logging,

    /// Prometheus metrics export.
    pub metrics: Metrics,
}

/// Command line values that take precedence over all other configuration sources.
#[derive(Debug, Default)]
pub struct Overrides {
    /// Replaces the run duration if greater than zero.
    pub duration_sec: Option<u64>,
    /// Replaces the read ratio if greater than zero.
    pub read_ratio: Option<usize>,
    /// Additional log file.
    pub log_file: Option<PathBuf>,
    /// Keep the metrics endpoint alive after the run.
    pub serve_metrics: bool,
    /// Disable logging to stderr.
    pub quiet: bool,
}

impl Config {
    /// Loads configuration from defaults, the optional YAML file at `path` and the environment.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if `path` is given; a missing file is skipped)
    /// 3. Environment variables (prefixed with `LT__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Applies command line overrides.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(secs) = overrides.duration_sec.filter(|secs| *secs > 0) {
            self.workload.duration_sec = Some(secs);
        }
        if let Some(ratio) = overrides.read_ratio.filter(|ratio| *ratio > 0) {
            self.workload.read_ratio = ratio;
        }
        if overrides.log_file.is_some() {
            self.logging.file = overrides.log_file;
        }
        if overrides.serve_metrics {
            self.metrics.enabled = true;
            self.metrics.serve = true;
        }
        if overrides.quiet {
            self.logging.stderr = false;
        }
    }

    /// Checks the configuration for values the load generator cannot run with.
    ///
    /// The AuthZed endpoint and key are only required when `dry_run` is `false`.
    pub fn validate(&self, dry_run: bool) -> Result<()> {
        let workload = &self.workload;
        if workload.effective_duration().is_zero() {
            bail!("workload duration must be greater than zero");
        }
        if workload.write_workers == 0 {
            bail!("at least one write worker is required");
        }
        if workload.max_readers == Some(0) {
            bail!("max_readers must be greater than zero if set");
        }
        if workload.queue_capacity == 0 {
            bail!("queue capacity must be greater than zero");
        }
        if workload.relations.is_empty() {
            bail!("at least one relation is required");
        }
        if workload.permissions.is_empty() {
            bail!("at least one permission is required");
        }

        if !dry_run {
            if self.authzed.api.is_none() {
                bail!("AuthZed endpoint is missing (authzed.api)");
            }
            if self.authzed.key.is_none() {
                bail!("AuthZed bearer (pre-shared) key is missing (authzed.key)");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults_are_valid_for_dry_run() {
        let config = Config::default();

        assert_eq!(config.workload.effective_duration(), Duration::from_secs(60));
        assert_eq!(config.workload.read_ratio, 1);
        assert_eq!(config.workload.queue_capacity, 10_000);
        config.validate(true).unwrap();
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LT__AUTHZED__API", "http://localhost:8443");
            jail.set_env("LT__AUTHZED__KEY", "abcde");
            jail.set_env("LT__AUTHZED__CONSISTENCY", "minimize_latency");
            jail.set_env("LT__WORKLOAD__READ_RATIO", "100");
            jail.set_env("LT__WORKLOAD__DURATION", "5m");
            jail.set_env("LT__WORKLOAD__RELATIONS", "[owner, reader]");

            let config = Config::load(None).unwrap();

            assert_eq!(config.authzed.api.as_deref(), Some("http://localhost:8443"));
            assert_eq!(
                config.authzed.key.as_ref().unwrap().expose_secret().as_str(),
                "abcde"
            );
            assert_eq!(config.authzed.consistency, ConsistencyMode::MinimizeLatency);
            assert_eq!(config.workload.read_ratio, 100);
            assert_eq!(config.workload.effective_duration(), Duration::from_secs(300));
            assert_eq!(config.workload.relations, ["owner", "reader"]);
            config.validate(false).unwrap();

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            authzed:
                api: http://localhost:8443
                key: somerandomkeyhere
                retry_delay: 250ms
            workload:
                read_ratio: 10
                duration_sec: 30
            logging:
                level: debug
                format: json
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.authzed.retry_delay, Duration::from_millis(250));
            assert_eq!(config.authzed.retry_attempts, 3);
            assert_eq!(config.workload.read_ratio, 10);
            assert_eq!(config.workload.effective_duration(), Duration::from_secs(30));
            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(config.logging.format, LogFormat::Json);

            Ok(())
        });
    }

    #[test]
    fn env_overrides_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            workload:
                read_ratio: 10
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("LT__WORKLOAD__READ_RATIO", "20");

            let config = Config::load(Some(tempfile.path())).unwrap();
            assert_eq!(config.workload.read_ratio, 20);

            Ok(())
        });
    }

    #[test]
    fn overrides_only_apply_when_positive() {
        let mut config = Config::default();
        config.workload.read_ratio = 10;

        config.apply(Overrides {
            duration_sec: Some(0),
            read_ratio: Some(0),
            ..Default::default()
        });
        assert_eq!(config.workload.effective_duration(), Duration::from_secs(60));
        assert_eq!(config.workload.read_ratio, 10);

        config.apply(Overrides {
            duration_sec: Some(5),
            read_ratio: Some(3),
            serve_metrics: true,
            quiet: true,
            ..Default::default()
        });
        assert_eq!(config.workload.effective_duration(), Duration::from_secs(5));
        assert_eq!(config.workload.read_ratio, 3);
        assert!(config.metrics.serve);
        assert!(!config.logging.stderr);
    }

    #[test]
    fn rejects_invalid_workloads() {
        let mut config = Config::default();
        config.workload.duration_sec = Some(0);
        assert!(config.validate(true).is_err());

        let mut config = Config::default();
        config.workload.write_workers = 0;
        assert!(config.validate(true).is_err());

        let mut config = Config::default();
        config.workload.permissions.clear();
        assert!(config.validate(true).is_err());
    }

    #[test]
    fn key_is_redacted() {
        let config = Config {
            authzed: AuthZed {
                key: Some(SecretBox::new(Box::new("hunter2".into()))),
                ..Default::default()
            },
            ..Default::default()
        };

        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
    }
}
