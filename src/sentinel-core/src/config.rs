//! Configuration management
//!
//! Settings come from a flat TOML file. A missing or malformed file falls
//! back to built-in defaults, while values that parse but make no sense are
//! rejected.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use sentinel_delivery::{parse_broker, DeliveryMethod, HttpDelivery, PoolConfig, SftpDelivery};
use sentinel_processing::{AnalyzerConfig, ClassifierConfig, Roi};

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

const MAX_PATH_LEN: usize = 4096;
const MAX_FIELD_LEN: usize = 255;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// `input = 0` and `input = "rtsp://..."` are both accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Index(u32),
    Name(String),
}

impl std::fmt::Display for InputValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputValue::Index(i) => write!(f, "{}", i),
            InputValue::Name(s) => f.write_str(s),
        }
    }
}

/// `headless = true` and `headless = 1` are both accepted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Switch {
    Bool(bool),
    Int(i64),
}

impl Switch {
    pub fn enabled(self) -> bool {
        match self {
            Switch::Bool(b) => b,
            Switch::Int(i) => i != 0,
        }
    }
}

/// Config file contents before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub min_area: i64,
    pub threshold: i64,
    pub headless: Switch,
    pub input: InputValue,
    pub roi: String,
    pub blur_sigma: f64,
    pub dilate_iterations: i64,

    pub output_dir: PathBuf,
    pub log_file: PathBuf,
    pub pid_file: PathBuf,
    pub preview_path: Option<PathBuf>,

    pub workers: i64,
    pub queue_size: i64,
    pub shutdown_grace_secs: i64,

    /// `http` or `sftp`
    pub method: String,
    pub url: String,
    pub timeout_secs: i64,
    pub sftp_host: String,
    pub sftp_port: i64,
    pub sftp_user: String,
    pub sftp_pass: String,
    pub sftp_remote_path: String,

    /// MQTT broker as `host[:port]`, empty disables notifications
    pub broker: String,
    pub topic: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            min_area: 800,
            threshold: 25,
            headless: Switch::Bool(false),
            input: InputValue::Name("0".to_string()),
            roi: String::new(),
            blur_sigma: 1.0,
            dilate_iterations: 2,
            output_dir: PathBuf::from("."),
            log_file: PathBuf::from("motion.log"),
            pid_file: PathBuf::from("/tmp/sentinel.pid"),
            preview_path: None,
            workers: 2,
            queue_size: 32,
            shutdown_grace_secs: 30,
            method: "http".to_string(),
            url: "http://example.com/upload".to_string(),
            timeout_secs: 30,
            sftp_host: String::new(),
            sftp_port: 22,
            sftp_user: String::new(),
            sftp_pass: String::new(),
            sftp_remote_path: ".".to_string(),
            broker: "localhost".to_string(),
            topic: "motion".to_string(),
        }
    }
}

impl RawConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            message: e.message().to_string(),
        })
    }

    /// Apply command-line overrides on top of the file values
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(input) = &overrides.input {
            self.input = InputValue::Name(input.clone());
        }
        if overrides.headless || overrides.daemon {
            self.headless = Switch::Bool(true);
        }
        if let Some(pid_file) = &overrides.pid_file {
            self.pid_file = pid_file.clone();
        }
        if let Some(output_dir) = &overrides.output_dir {
            self.output_dir = output_dir.clone();
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub input: Option<String>,
    pub headless: bool,
    pub daemon: bool,
    pub pid_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryConfig {
    Http {
        url: String,
        timeout_secs: u64,
    },
    Sftp {
        host: String,
        port: u16,
        user: String,
        pass: String,
        remote_path: String,
    },
}

impl DeliveryConfig {
    /// Build the transport once, shared by every delivery job
    pub fn build(&self) -> Arc<DeliveryMethod> {
        let method = match self {
            DeliveryConfig::Http { url, timeout_secs } => {
                DeliveryMethod::Http(HttpDelivery::new(url.clone(), *timeout_secs))
            }
            DeliveryConfig::Sftp {
                host,
                port,
                user,
                pass,
                remote_path,
            } => DeliveryMethod::Sftp(SftpDelivery::new(
                host.clone(),
                *port,
                user.clone(),
                pass.clone(),
                remote_path.clone(),
            )),
        };
        Arc::new(method)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationConfig {
    pub broker: String,
    pub topic: String,
}

/// Validated run parameters, fixed for the lifetime of a run
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub min_area: u32,
    pub threshold: u8,
    pub headless: bool,
    pub input: String,
    pub roi: Option<Roi>,
    pub blur_sigma: f32,
    pub dilate_iterations: u8,
    pub output_dir: PathBuf,
    pub log_file: PathBuf,
    pub pid_file: PathBuf,
    pub preview_path: Option<PathBuf>,
    pub workers: usize,
    pub queue_size: usize,
    pub shutdown_grace_secs: u64,
    pub delivery: DeliveryConfig,
    pub notification: Option<NotificationConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_area: 800,
            threshold: 25,
            headless: false,
            input: "0".to_string(),
            roi: None,
            blur_sigma: 1.0,
            dilate_iterations: 2,
            output_dir: PathBuf::from("."),
            log_file: PathBuf::from("motion.log"),
            pid_file: PathBuf::from("/tmp/sentinel.pid"),
            preview_path: None,
            workers: 2,
            queue_size: 32,
            shutdown_grace_secs: 30,
            delivery: DeliveryConfig::Http {
                url: "http://example.com/upload".to_string(),
                timeout_secs: 30,
            },
            notification: Some(NotificationConfig {
                broker: "localhost".to_string(),
                topic: "motion".to_string(),
            }),
        }
    }
}

/// Result of [`load`]: the config plus the error that forced a fallback, if any
#[derive(Debug)]
pub struct Loaded {
    pub config: Config,
    pub fallback: Option<ConfigError>,
}

/// Read `path`, apply overrides and validate
///
/// Read and parse failures fall back to defaults and are reported in
/// [`Loaded::fallback`]. Validation failures are returned as errors.
pub fn load(path: &Path, overrides: &Overrides) -> Result<Loaded, ConfigError> {
    let (mut raw, fallback) = match RawConfig::from_file(path) {
        Ok(raw) => (raw, None),
        Err(e) => (RawConfig::default(), Some(e)),
    };
    raw.apply(overrides);
    let config = Config::try_from(raw)?;
    Ok(Loaded { config, fallback })
}

fn int_in_range<T: TryFrom<i64>>(name: &str, value: i64, min: i64, max: i64) -> Result<T, ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Invalid(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    T::try_from(value).map_err(|_| ConfigError::Invalid(format!("{} out of range: {}", name, value)))
}

fn check_len(name: &str, value: &str, max: usize) -> Result<(), ConfigError> {
    if value.len() > max {
        return Err(ConfigError::Invalid(format!(
            "{} is {} bytes, limit is {}",
            name,
            value.len(),
            max
        )));
    }
    Ok(())
}

fn check_path(name: &str, path: &Path) -> Result<(), ConfigError> {
    check_len(name, &path.to_string_lossy(), MAX_PATH_LEN)
}

fn require(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
    }
    Ok(())
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let threshold = int_in_range("threshold", raw.threshold, 0, 255)?;
        let min_area = int_in_range("min_area", raw.min_area, 0, u32::MAX as i64)?;
        let dilate_iterations = int_in_range("dilate_iterations", raw.dilate_iterations, 0, 255)?;
        let workers = int_in_range("workers", raw.workers, 1, 256)?;
        let queue_size = int_in_range("queue_size", raw.queue_size, 1, 1 << 16)?;
        let shutdown_grace_secs = int_in_range("shutdown_grace_secs", raw.shutdown_grace_secs, 0, 3600)?;

        if !raw.blur_sigma.is_finite() || raw.blur_sigma < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "blur_sigma must be a non-negative number, got {}",
                raw.blur_sigma
            )));
        }

        let input = raw.input.to_string();
        require("input", &input)?;
        check_len("input", &input, MAX_PATH_LEN)?;

        let roi = if raw.roi.trim().is_empty() {
            None
        } else {
            let roi: Roi = raw
                .roi
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("roi: {}", e)))?;
            Some(roi).filter(|r| !r.is_empty())
        };

        check_path("output_dir", &raw.output_dir)?;
        check_path("log_file", &raw.log_file)?;
        check_path("pid_file", &raw.pid_file)?;
        if let Some(preview) = &raw.preview_path {
            check_path("preview_path", preview)?;
        }

        let delivery = match raw.method.trim().to_ascii_lowercase().as_str() {
            "http" => {
                require("url", &raw.url)?;
                check_len("url", &raw.url, MAX_PATH_LEN)?;
                if !(raw.url.starts_with("http://") || raw.url.starts_with("https://")) {
                    return Err(ConfigError::Invalid(format!(
                        "url must start with http:// or https://, got {:?}",
                        raw.url
                    )));
                }
                DeliveryConfig::Http {
                    url: raw.url,
                    timeout_secs: int_in_range("timeout_secs", raw.timeout_secs, 1, 3600)?,
                }
            }
            "sftp" => {
                require("sftp_host", &raw.sftp_host)?;
                require("sftp_user", &raw.sftp_user)?;
                require("sftp_remote_path", &raw.sftp_remote_path)?;
                check_len("sftp_host", &raw.sftp_host, MAX_FIELD_LEN)?;
                check_len("sftp_user", &raw.sftp_user, MAX_FIELD_LEN)?;
                check_len("sftp_pass", &raw.sftp_pass, MAX_FIELD_LEN)?;
                check_len("sftp_remote_path", &raw.sftp_remote_path, MAX_PATH_LEN)?;
                DeliveryConfig::Sftp {
                    host: raw.sftp_host,
                    port: int_in_range("sftp_port", raw.sftp_port, 1, 65535)?,
                    user: raw.sftp_user,
                    pass: raw.sftp_pass,
                    remote_path: raw.sftp_remote_path,
                }
            }
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown delivery method {:?}, expected http or sftp",
                    other
                )))
            }
        };

        let notification = if raw.broker.trim().is_empty() {
            None
        } else {
            check_len("broker", &raw.broker, MAX_PATH_LEN)?;
            parse_broker(&raw.broker).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            require("topic", &raw.topic)?;
            check_len("topic", &raw.topic, MAX_FIELD_LEN)?;
            Some(NotificationConfig {
                broker: raw.broker.trim().to_string(),
                topic: raw.topic,
            })
        };

        Ok(Config {
            min_area,
            threshold,
            headless: raw.headless.enabled(),
            input,
            roi,
            blur_sigma: raw.blur_sigma as f32,
            dilate_iterations,
            output_dir: raw.output_dir,
            log_file: raw.log_file,
            pid_file: raw.pid_file,
            preview_path: raw.preview_path,
            workers,
            queue_size,
            shutdown_grace_secs,
            delivery,
            notification,
        })
    }
}

impl Config {
    pub fn analyzer(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            classifier: ClassifierConfig {
                threshold: self.threshold,
                min_area: self.min_area,
                dilate_iterations: self.dilate_iterations,
            },
            roi: self.roi,
            blur_sigma: self.blur_sigma,
        }
    }

    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            queue_size: self.queue_size,
        }
    }

    /// Rebase relative file locations onto `base`
    ///
    /// Needed before detaching, since the daemon changes directory.
    pub fn absolutize(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.output_dir);
        rebase(&mut self.log_file);
        rebase(&mut self.pid_file);
        if let Some(preview) = self.preview_path.as_mut() {
            rebase(preview);
        }
        if Path::new(&self.input).is_relative() && base.join(&self.input).exists() {
            self.input = base.join(&self.input).to_string_lossy().into_owned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sentinel-config-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.min_area, 800);
        assert_eq!(config.threshold, 25);
        assert!(!config.headless);
        assert_eq!(config.input, "0");
        assert_eq!(config.roi, None);
        assert_eq!(
            config.delivery,
            DeliveryConfig::Http {
                url: "http://example.com/upload".to_string(),
                timeout_secs: 30
            }
        );
        assert_eq!(
            config.notification,
            Some(NotificationConfig {
                broker: "localhost".to_string(),
                topic: "motion".to_string()
            })
        );
        assert_eq!(config.workers, 2);
        assert_eq!(config.queue_size, 32);
        assert_eq!(Config::try_from(RawConfig::default()).unwrap(), config);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let loaded = load(Path::new("/nonexistent/sentinel/config.toml"), &Overrides::default()).unwrap();
        assert!(matches!(loaded.fallback, Some(ConfigError::Read { .. })));
        assert_eq!(loaded.config, Config::default());
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = temp_dir("malformed");
        let path = dir.join("config.toml");
        std::fs::write(&path, "min_area = [this is not toml").unwrap();

        let loaded = load(&path, &Overrides::default()).unwrap();
        assert!(matches!(loaded.fallback, Some(ConfigError::Parse { .. })));
        assert_eq!(loaded.config.min_area, 800);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_file_values_are_used() {
        let dir = temp_dir("values");
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
min_area = 500
threshold = 40
headless = 1
input = 2
roi = "10,20,300,200"
method = "sftp"
sftp_host = "files.local"
sftp_user = "cam"
sftp_pass = "secret"
sftp_remote_path = "/incoming"
broker = ""
"#,
        )
        .unwrap();

        let loaded = load(&path, &Overrides::default()).unwrap();
        assert!(loaded.fallback.is_none());
        let config = loaded.config;
        assert_eq!(config.min_area, 500);
        assert_eq!(config.threshold, 40);
        assert!(config.headless);
        assert_eq!(config.input, "2");
        assert_eq!(config.roi, Some(Roi::new(10, 20, 300, 200)));
        assert!(matches!(config.delivery, DeliveryConfig::Sftp { port: 22, .. }));
        assert_eq!(config.notification, None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_cli_input_overrides_file() {
        let mut raw = RawConfig::from_toml(r#"input = "/videos/a.mp4""#).unwrap();
        raw.apply(&Overrides {
            input: Some("rtsp://cam/stream".to_string()),
            ..Default::default()
        });
        let config = Config::try_from(raw).unwrap();
        assert_eq!(config.input, "rtsp://cam/stream");
    }

    #[test]
    fn test_daemon_implies_headless() {
        let mut raw = RawConfig::default();
        raw.apply(&Overrides {
            daemon: true,
            ..Default::default()
        });
        assert!(Config::try_from(raw).unwrap().headless);
    }

    #[test]
    fn test_zero_area_roi_means_none() {
        let raw = RawConfig::from_toml(r#"roi = "5,5,0,0""#).unwrap();
        assert_eq!(Config::try_from(raw).unwrap().roi, None);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases = [
            "threshold = 300",
            "min_area = -1",
            "workers = 0",
            "queue_size = 0",
            "roi = \"1,2,3\"",
            "method = \"ftp\"",
            "url = \"\"",
            "url = \"ftp://host\"",
            "method = \"sftp\"",
            "blur_sigma = -2.0",
            "broker = \"host:99999\"",
            "topic = \"\"",
        ];
        for case in cases {
            let raw = RawConfig::from_toml(case).unwrap();
            assert!(
                matches!(Config::try_from(raw), Err(ConfigError::Invalid(_))),
                "{} should be rejected",
                case
            );
        }
    }

    #[test]
    fn test_overlong_fields_are_rejected() {
        let mut raw = RawConfig::default();
        raw.topic = "t".repeat(256);
        assert!(Config::try_from(raw).is_err());

        let mut raw = RawConfig::default();
        raw.pid_file = PathBuf::from("p".repeat(4097));
        assert!(Config::try_from(raw).is_err());

        let mut raw = RawConfig::default();
        raw.topic = "t".repeat(255);
        assert!(Config::try_from(raw).is_ok());
    }

    #[test]
    fn test_absolutize_rebases_relative_paths() {
        let mut config = Config::default();
        config.pid_file = PathBuf::from("/run/sentinel.pid");
        config.absolutize(Path::new("/srv/cam"));
        assert_eq!(config.output_dir, PathBuf::from("/srv/cam/."));
        assert_eq!(config.log_file, PathBuf::from("/srv/cam/motion.log"));
        assert_eq!(config.pid_file, PathBuf::from("/run/sentinel.pid"));
        assert_eq!(config.input, "0");
    }
}
