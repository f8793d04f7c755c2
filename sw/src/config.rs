//! svnwatch configuration types and loading

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};

use crate::domain::{Credentials, DetectionMode, RepositoryDescriptor};
use crate::notify::Encryption;
use crate::vcs::ClientOptions;

/// Main svnwatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// svn client settings
    pub svn: SvnConfig,

    /// Watched repositories
    pub repositories: Vec<RepositoryDescriptor>,

    /// Mail settings
    pub email: EmailConfig,

    /// Recipient table keyed by repository id or display name
    pub recipients: BTreeMap<String, Vec<String>>,

    /// Polling loop settings
    pub scheduler: SchedulerConfig,

    /// Watermark storage
    pub storage: StorageConfig,

    /// Log settings
    pub logging: LoggingConfig,

    /// Hook invocation settings
    pub hook: HookConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .svnwatch.yml
        let local_config = PathBuf::from(".svnwatch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/svnwatch/svnwatch.yml
        if let Some(user_config) = user_config_path() {
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.resolve_working_copies();

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Read only `logging.level` so logging can start before the full load
    ///
    /// Uses the same fallback chain as [`Config::load`] and ignores any error.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => [Some(PathBuf::from(".svnwatch.yml")), user_config_path()]
                .into_iter()
                .flatten()
                .collect(),
        };

        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct LevelOnly {
            logging: LoggingConfig,
        }

        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| {
                let content = fs::read_to_string(p).ok()?;
                serde_yaml::from_str::<LevelOnly>(&content).ok()
            })
            .and_then(|c| c.logging.level)
    }

    /// Give local-mode repositories without a working copy a default one
    pub fn resolve_working_copies(&mut self) {
        let root = self.svn.working_copy_root.clone();
        for repo in &mut self.repositories {
            repo.resolve_working_copy(&root);
        }
    }

    /// Check the configuration before use
    ///
    /// Problems the monitor can live with come back as warnings; duplicate
    /// repository ids are an error because they would share a watermark.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();
        let mut seen = BTreeSet::new();

        if self.repositories.is_empty() {
            warnings.push("No repositories configured".to_string());
        }

        for repo in &self.repositories {
            if repo.id.trim().is_empty() {
                return Err(eyre!("Repository with URL {} has an empty id", repo.url));
            }
            if !seen.insert(repo.id.as_str()) {
                return Err(eyre!("Duplicate repository id: {}", repo.id));
            }
            if repo.url.trim().is_empty() {
                warnings.push(format!("Repository {} has no URL", repo.id));
            }
            if repo.mode == DetectionMode::Local && repo.working_copy.is_none() {
                warnings.push(format!(
                    "Repository {} uses local mode without a working copy, using {}",
                    repo.id,
                    self.svn.working_copy_root.join(&repo.id).display()
                ));
            }
            if repo.poll_interval_secs == 0 {
                warnings.push(format!("Repository {} has a zero poll interval", repo.id));
            }
        }

        if self.email.host.is_none() || self.email.from.is_none() {
            warnings.push("Mail configuration incomplete, notifications will be skipped".to_string());
        } else if self.email.username.is_none() || self.email.password.is_none() {
            warnings.push("No SMTP credentials, running in detect-only mode".to_string());
        }

        if self.email.to.is_empty() && self.recipients.is_empty() && self.repositories.iter().all(|r| r.recipients.is_empty()) {
            warnings.push("No recipients configured anywhere".to_string());
        }

        if self.scheduler.max_concurrent_checks == 0 {
            warnings.push("scheduler.max-concurrent-checks is 0, using 1".to_string());
        }

        Ok(warnings)
    }

    /// Options for the repository client
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            page_size: self.svn.page_size.max(1),
            page_delay: Duration::from_millis(self.svn.page_delay_ms),
            command_timeout: Duration::from_secs(self.svn.command_timeout_secs),
            checkout_timeout: Duration::from_secs(self.svn.checkout_timeout_secs),
            trust_server_cert: self.svn.trust_server_cert,
            credentials: Credentials::from_parts(self.svn.username.as_deref(), self.svn.password.as_deref()),
        }
    }

    /// Look up a repository by id
    pub fn repository(&self, id: &str) -> Option<&RepositoryDescriptor> {
        self.repositories.iter().find(|r| r.id == id)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("svnwatch").join("svnwatch.yml"))
}

/// Base directory for svnwatch data (~/.local/share/svnwatch on Linux)
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("svnwatch")
}

/// svn client settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SvnConfig {
    /// svn executable
    pub binary: PathBuf,

    /// Global username, used when a repository has none
    pub username: Option<String>,

    /// Global password
    pub password: Option<String>,

    /// Accept untrusted server certificates
    #[serde(rename = "trust-server-cert")]
    pub trust_server_cert: bool,

    /// Timeout for info/log/update/cleanup in seconds
    #[serde(rename = "command-timeout-secs")]
    pub command_timeout_secs: u64,

    /// Timeout for a fresh checkout in seconds
    #[serde(rename = "checkout-timeout-secs")]
    pub checkout_timeout_secs: u64,

    /// Revisions per log request
    #[serde(rename = "page-size")]
    pub page_size: u64,

    /// Pause between log requests in milliseconds
    #[serde(rename = "page-delay-ms")]
    pub page_delay_ms: u64,

    /// Where default working copies are created
    #[serde(rename = "working-copy-root")]
    pub working_copy_root: PathBuf,
}

impl Default for SvnConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("svn"),
            username: None,
            password: None,
            trust_server_cert: true,
            command_timeout_secs: 60,
            checkout_timeout_secs: 1800,
            page_size: crate::vcs::DEFAULT_PAGE_SIZE,
            page_delay_ms: 500,
            working_copy_root: data_dir().join("wc"),
        }
    }
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "***")
}

impl fmt::Debug for SvnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SvnConfig")
            .field("binary", &self.binary)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("trust_server_cert", &self.trust_server_cert)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .field("checkout_timeout_secs", &self.checkout_timeout_secs)
            .field("page_size", &self.page_size)
            .field("page_delay_ms", &self.page_delay_ms)
            .field("working_copy_root", &self.working_copy_root)
            .finish()
    }
}

/// Mail settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// SMTP server
    pub host: Option<String>,

    pub port: u16,

    pub encryption: Encryption,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Sender address
    pub from: Option<String>,

    /// Default recipients when nothing more specific matches
    pub to: Vec<String>,

    /// Per-attempt timeout in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Extra attempts after a transient failure
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Pause between attempts in seconds
    #[serde(rename = "retry-backoff-secs")]
    pub retry_backoff_secs: u64,

    /// Recipients of the per-cycle status report
    #[serde(rename = "status-recipients")]
    pub status_recipients: Vec<String>,

    /// Mail the status recipients when the monitor starts
    #[serde(rename = "startup-notice")]
    pub startup_notice: bool,

    /// Directory with `<name>.hbs` overrides for the mail templates
    #[serde(rename = "templates-dir")]
    pub templates_dir: Option<PathBuf>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 465,
            encryption: Encryption::Tls,
            username: None,
            password: None,
            from: None,
            to: Vec::new(),
            timeout_secs: 30,
            max_retries: crate::notify::DEFAULT_MAX_RETRIES,
            retry_backoff_secs: 2,
            status_recipients: Vec::new(),
            startup_notice: false,
            templates_dir: None,
        }
    }
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("encryption", &self.encryption)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("from", &self.from)
            .field("to", &self.to)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_secs", &self.retry_backoff_secs)
            .field("status_recipients", &self.status_recipients)
            .field("startup_notice", &self.startup_notice)
            .field("templates_dir", &self.templates_dir)
            .finish()
    }
}

/// Polling loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Repositories checked at the same time
    #[serde(rename = "max-concurrent-checks", default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,

    /// Wait between cycles when no repository sets its own interval
    #[serde(rename = "default-interval-secs", default = "default_interval_secs")]
    pub default_interval_secs: u64,
}

fn default_max_concurrent_checks() -> usize {
    4
}

fn default_interval_secs() -> u64 {
    crate::DEFAULT_POLL_INTERVAL_SECS
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_checks: default_max_concurrent_checks(),
            default_interval_secs: default_interval_secs(),
        }
    }
}

impl SchedulerConfig {
    /// Wait between cycles: the smallest repository interval, or the default
    pub fn cycle_interval(&self, repositories: &[RepositoryDescriptor]) -> Duration {
        let secs = repositories
            .iter()
            .map(|r| r.poll_interval_secs)
            .filter(|s| *s > 0)
            .min()
            .unwrap_or(self.default_interval_secs)
            .max(1);
        Duration::from_secs(secs)
    }
}

/// Watermark storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "revisions-file")]
    pub revisions_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            revisions_file: revstore::default_revisions_path(),
        }
    }
}

/// Log settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: Option<String>,
}

/// Hook invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Use the first repository when the hook path matches none
    #[serde(rename = "fallback-to-first-repository")]
    pub fallback_to_first_repository: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            fallback_to_first_repository: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const FULL: &str = r#"
svn:
  username: builder
  password: s3cret
  trust-server-cert: false
  page-size: 100
  page-delay-ms: 0
  working-copy-root: /srv/svnwatch/wc

repositories:
  - id: core
    name: Core Platform
    url: https://svn.example.com/core
    poll-interval-secs: 120
    recipients: ["core@example.com"]
  - id: tools
    url: file:///srv/svn/tools
    mode: local
    notify: false
    credentials:
      username: tools
      password: t00ls

email:
  host: smtp.example.com
  port: 587
  encryption: starttls
  username: svnwatch
  password: mailpw
  from: svnwatch@example.com
  to: ["ops@example.com"]
  status-recipients: ["admin@example.com"]

recipients:
  REPO_web: ["web@example.com; web2@example.com"]

scheduler:
  max-concurrent-checks: 2

logging:
  level: debug

hook:
  fallback-to-first-repository: false
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.svn.binary, PathBuf::from("svn"));
        assert!(config.svn.trust_server_cert);
        assert_eq!(config.svn.page_size, 500);
        assert_eq!(config.email.port, 465);
        assert_eq!(config.email.encryption, Encryption::Tls);
        assert_eq!(config.email.max_retries, 2);
        assert_eq!(config.scheduler.max_concurrent_checks, 4);
        assert!(config.hook.fallback_to_first_repository);
        assert!(config.storage.revisions_file.ends_with(revstore::DEFAULT_FILE_NAME));
    }

    #[test]
    fn test_deserialize_config() {
        let mut config: Config = serde_yaml::from_str(FULL).unwrap();
        config.resolve_working_copies();

        assert_eq!(config.svn.page_size, 100);
        assert!(!config.svn.trust_server_cert);
        assert_eq!(config.repositories.len(), 2);

        let core = config.repository("core").unwrap();
        assert_eq!(core.display_name(), "Core Platform");
        assert_eq!(core.poll_interval_secs, 120);
        assert_eq!(core.mode, DetectionMode::Remote);

        let tools = config.repository("tools").unwrap();
        assert!(!tools.notify);
        assert_eq!(tools.working_copy, Some(PathBuf::from("/srv/svnwatch/wc/tools")));
        assert_eq!(tools.credentials.as_ref().unwrap().username, "tools");

        assert_eq!(config.email.encryption, Encryption::Starttls);
        assert_eq!(config.email.port, 587);
        assert_eq!(config.email.timeout_secs, 30);
        assert_eq!(config.recipients["REPO_web"], vec!["web@example.com; web2@example.com"]);
        assert_eq!(config.scheduler.max_concurrent_checks, 2);
        assert_eq!(config.scheduler.default_interval_secs, 300);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert!(!config.hook.fallback_to_first_repository);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
email:
  host: smtp.example.com
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.email.host.as_deref(), Some("smtp.example.com"));
        assert_eq!(config.email.port, 465);
        assert_eq!(config.svn.command_timeout_secs, 60);
        assert_eq!(config.svn.checkout_timeout_secs, 1800);
        assert!(config.repositories.is_empty());
    }

    #[test]
    fn test_client_options() {
        let config: Config = serde_yaml::from_str(FULL).unwrap();
        let options = config.client_options();

        assert_eq!(options.page_size, 100);
        assert_eq!(options.page_delay, Duration::ZERO);
        assert!(!options.trust_server_cert);
        assert_eq!(options.credentials.unwrap().username, "builder");
        assert_eq!(options.checkout_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn test_debug_hides_passwords() {
        let config: Config = serde_yaml::from_str(FULL).unwrap();
        let debug = format!("{:?}", config);

        assert!(debug.contains("builder"));
        for secret in ["s3cret", "t00ls", "mailpw"] {
            assert!(!debug.contains(secret), "{} leaked", secret);
        }
    }

    #[test]
    fn test_cycle_interval() {
        let scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.cycle_interval(&[]), Duration::from_secs(300));

        let repos = vec![
            RepositoryDescriptor::new("a", "u").with_poll_interval(600),
            RepositoryDescriptor::new("b", "u").with_poll_interval(90),
            RepositoryDescriptor::new("c", "u").with_poll_interval(0),
        ];
        assert_eq!(scheduler.cycle_interval(&repos), Duration::from_secs(90));
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn test_validate_warnings() {
        let warnings = Config::default().validate().unwrap();
        assert!(warnings.iter().any(|w| w.contains("No repositories")));
        assert!(warnings.iter().any(|w| w.contains("Mail configuration incomplete")));

        let config: Config = serde_yaml::from_str(FULL).unwrap();
        let warnings = config.validate().unwrap();
        // tools is local mode and was not resolved yet
        assert!(warnings.iter().any(|w| w.contains("tools uses local mode")));
        assert!(!warnings.iter().any(|w| w.contains("Mail configuration")));
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let mut config = Config::default();
        config.repositories = vec![
            RepositoryDescriptor::new("core", "https://a"),
            RepositoryDescriptor::new("core", "https://b"),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate repository id: core"));
    }

    // =========================================================================
    // Loading
    // =========================================================================

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("svnwatch.yml");
        fs::write(&path, FULL).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.repositories.len(), 2);
        // Loading resolves default working copies
        assert!(config.repository("tools").unwrap().working_copy.is_some());
    }

    #[test]
    fn test_load_explicit_path_errors() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.yml");
        assert!(Config::load(Some(&missing)).is_err());

        let broken = temp.path().join("broken.yml");
        fs::write(&broken, "repositories: [").unwrap();
        assert!(Config::load(Some(&broken)).is_err());
    }

    #[test]
    #[serial]
    fn test_load_project_local_config() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".svnwatch.yml"), "scheduler:\n  max-concurrent-checks: 9\n").unwrap();

        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp.path()).unwrap();
        let config = Config::load(None);
        let level = Config::load_log_level(None);
        std::env::set_current_dir(original).unwrap();

        assert_eq!(config.unwrap().scheduler.max_concurrent_checks, 9);
        assert_eq!(level, None);
    }

    #[test]
    fn test_load_log_level() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("svnwatch.yml");
        fs::write(&path, FULL).unwrap();
        assert_eq!(Config::load_log_level(Some(&path)), Some("debug".to_string()));

        // Broken files are ignored
        fs::write(&path, "logging: [").unwrap();
        assert_eq!(Config::load_log_level(Some(&path)), None);
    }
}
