use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sbs::SbsFeedConfig;

pub const CONFIG_ENV_VAR: &str = "SBS_RELAY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./sbs-relay.toml";

pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";
pub const DEFAULT_SUBJECT: &str = "adsb.sbs.compact";
pub const DEFAULT_BATCH_WINDOW_SECS: u64 = 3;
pub const DEFAULT_OUTPUT_DIR: &str = "./data";
pub const DEFAULT_FILE_PREFIX: &str = "fr";

/// `[nats]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NatsSection {
    pub url: Option<String>,
    pub subject: Option<String>,
}

/// `[feed]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub batch_window_secs: Option<u64>,
}

/// `[store]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    pub output_dir: Option<PathBuf>,
    pub file_prefix: Option<String>,
}

/// Optional TOML configuration file. Every value may be omitted; command line
/// flags take precedence over anything set here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub nats: NatsSection,
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub store: StoreSection,
}

impl ConfigFile {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: ConfigFile =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(config)
    }

    /// Load the file named by [`config_path`], or an empty config when there
    /// is none
    pub fn load_resolved(explicit: Option<&Path>) -> Result<Self> {
        match config_path(explicit) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

/// Resolve the config file path.
///
/// Priority:
/// 1. `--config` on the command line
/// 2. `SBS_RELAY_CONFIG` env var
/// 3. `./sbs-relay.toml`, only if it exists
///
/// An explicitly named file is always returned so a missing file is reported.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    default.exists().then_some(default)
}

/// Settings for the ingestion/publish side
#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub feed: SbsFeedConfig,
    pub batch_window: Duration,
    pub nats_url: String,
    pub subject: String,
}

/// Command line values for `publish`; `None` falls back to the file
#[derive(Debug, Clone, Default)]
pub struct PublishOverrides {
    pub feed_host: Option<String>,
    pub feed_port: Option<u16>,
    pub batch_window_secs: Option<u64>,
    pub nats_url: Option<String>,
    pub subject: Option<String>,
}

impl PublishConfig {
    pub fn resolve(file: &ConfigFile, overrides: PublishOverrides) -> Result<Self> {
        let defaults = SbsFeedConfig::default();
        let batch_window_secs = overrides
            .batch_window_secs
            .or(file.feed.batch_window_secs)
            .unwrap_or(DEFAULT_BATCH_WINDOW_SECS);
        if batch_window_secs == 0 {
            bail!("batch window must be at least one second");
        }

        Ok(Self {
            feed: SbsFeedConfig {
                host: overrides
                    .feed_host
                    .or_else(|| file.feed.host.clone())
                    .unwrap_or(defaults.host),
                port: overrides.feed_port.or(file.feed.port).unwrap_or(defaults.port),
            },
            batch_window: Duration::from_secs(batch_window_secs),
            nats_url: nats_url(file, overrides.nats_url),
            subject: subject(file, overrides.subject)?,
        })
    }
}

/// Settings for the hourly file store consumer
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub nats_url: String,
    pub subject: String,
    pub output_dir: PathBuf,
    pub file_prefix: String,
}

/// Command line values for `store`
#[derive(Debug, Clone, Default)]
pub struct StoreOverrides {
    pub nats_url: Option<String>,
    pub subject: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub file_prefix: Option<String>,
}

impl StoreConfig {
    pub fn resolve(file: &ConfigFile, overrides: StoreOverrides) -> Result<Self> {
        let file_prefix = overrides
            .file_prefix
            .or_else(|| file.store.file_prefix.clone())
            .unwrap_or_else(|| DEFAULT_FILE_PREFIX.to_string());
        if file_prefix.is_empty() || file_prefix.contains(['/', '\\']) {
            bail!("invalid file prefix '{}'", file_prefix);
        }

        Ok(Self {
            nats_url: nats_url(file, overrides.nats_url),
            subject: subject(file, overrides.subject)?,
            output_dir: overrides
                .output_dir
                .or_else(|| file.store.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            file_prefix,
        })
    }
}

/// Settings for the stdout dump consumer
#[derive(Debug, Clone)]
pub struct DumpConfig {
    pub nats_url: String,
    pub subject: String,
    pub json: bool,
}

impl DumpConfig {
    pub fn resolve(
        file: &ConfigFile,
        nats_url_override: Option<String>,
        subject_override: Option<String>,
        json: bool,
    ) -> Result<Self> {
        Ok(Self {
            nats_url: nats_url(file, nats_url_override),
            subject: subject(file, subject_override)?,
            json,
        })
    }
}

fn nats_url(file: &ConfigFile, flag: Option<String>) -> String {
    flag.or_else(|| file.nats.url.clone())
        .unwrap_or_else(|| DEFAULT_NATS_URL.to_string())
}

fn subject(file: &ConfigFile, flag: Option<String>) -> Result<String> {
    let subject = flag
        .or_else(|| file.nats.subject.clone())
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
    if subject.is_empty() || subject.contains(char::is_whitespace) {
        bail!("invalid NATS subject '{}'", subject);
    }
    Ok(subject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config(
            r#"
metrics_port = 9100

[nats]
url = "nats://bus:4222"
subject = "adsb.compact"

[feed]
host = "radar.local"
port = 30005
batch_window_secs = 5

[store]
output_dir = "/var/lib/sbs"
file_prefix = "radar"
"#,
        );

        let config = ConfigFile::load(file.path()).unwrap();
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.nats.url.as_deref(), Some("nats://bus:4222"));
        assert_eq!(config.feed.port, Some(30005));
        assert_eq!(config.store.file_prefix.as_deref(), Some("radar"));
    }

    #[test]
    fn test_empty_file_is_valid() {
        let file = write_config("");
        let config = ConfigFile::load(file.path()).unwrap();
        assert!(config.nats.url.is_none());
        assert!(config.feed.host.is_none());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let file = write_config("[feed]\nhostname = \"radar.local\"\n");
        assert!(ConfigFile::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(ConfigFile::load(&dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let path = Path::new("/etc/sbs-relay/custom.toml");
        assert_eq!(config_path(Some(path)), Some(path.to_path_buf()));
    }

    #[test]
    fn test_publish_defaults() {
        let config = PublishConfig::resolve(&ConfigFile::default(), PublishOverrides::default())
            .unwrap();

        assert_eq!(config.feed.host, "localhost");
        assert_eq!(config.feed.port, 30003);
        assert_eq!(config.batch_window, Duration::from_secs(3));
        assert_eq!(config.nats_url, DEFAULT_NATS_URL);
        assert_eq!(config.subject, DEFAULT_SUBJECT);
    }

    #[test]
    fn test_flags_override_file_values() {
        let file = ConfigFile {
            feed: FeedSection {
                host: Some("radar.local".to_string()),
                port: Some(30005),
                batch_window_secs: Some(10),
            },
            ..Default::default()
        };
        let overrides = PublishOverrides {
            feed_port: Some(40000),
            batch_window_secs: Some(1),
            ..Default::default()
        };

        let config = PublishConfig::resolve(&file, overrides).unwrap();
        assert_eq!(config.feed.host, "radar.local");
        assert_eq!(config.feed.port, 40000);
        assert_eq!(config.batch_window, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_batch_window_is_rejected() {
        let overrides = PublishOverrides {
            batch_window_secs: Some(0),
            ..Default::default()
        };
        assert!(PublishConfig::resolve(&ConfigFile::default(), overrides).is_err());
    }

    #[test]
    fn test_store_defaults_and_overrides() {
        let config = StoreConfig::resolve(&ConfigFile::default(), StoreOverrides::default())
            .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("./data"));
        assert_eq!(config.file_prefix, "fr");

        let file = ConfigFile {
            store: StoreSection {
                output_dir: Some(PathBuf::from("/srv/sbs")),
                file_prefix: None,
            },
            ..Default::default()
        };
        let config = StoreConfig::resolve(
            &file,
            StoreOverrides {
                file_prefix: Some("radar".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/srv/sbs"));
        assert_eq!(config.file_prefix, "radar");
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let bad_prefix = StoreOverrides {
            file_prefix: Some("../fr".to_string()),
            ..Default::default()
        };
        assert!(StoreConfig::resolve(&ConfigFile::default(), bad_prefix).is_err());

        assert!(
            DumpConfig::resolve(
                &ConfigFile::default(),
                None,
                Some("has space".to_string()),
                false
            )
            .is_err()
        );
    }
}
