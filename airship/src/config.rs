//! Engine configuration.
//!
//! `EngineConfig` is the read-only view of the host's configuration and
//! token store. It can be built in code with the `with_*` setters or loaded
//! from an INI file:
//!
//! ```ini
//! [engine]
//! app_version = 1.4.0
//! project_id = 6650f1c2
//! platform = android
//! files_dir = /data/user/0/com.example/files
//! release_check_url = https://api.example.com/api/v1/promoted/get-update-meta
//!
//! [auth]
//! app_token = ...
//! sdk_token = ...
//!
//! [download]
//! timeout_secs = 300
//! fallback_bundle_size = 104857600
//! bundle_entry = build/index.bundle
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

/// Default HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Name of the temporary archive inside the download directory.
pub const DEFAULT_ARCHIVE_NAME: &str = "build.zip";

/// Folder the archive extracts its bundle into.
pub const BUNDLE_FOLDER_NAME: &str = "build";

/// Bundle file expected inside [`BUNDLE_FOLDER_NAME`].
pub const BUNDLE_FILE_NAME: &str = "index.bundle";

/// Default release-check endpoint.
pub const DEFAULT_RELEASE_CHECK_URL: &str =
    "http://localhost:8000/api/v1/promoted/get-update-meta";

const PROD_DIRECTORY: &str = "prod";
const TEMP_FOLDER_SLOT: &str = "temp";
const SLOT_RECORD_FILE: &str = "slot_record.json";
const DOWNLOAD_CACHE_FILE: &str = "download_cache.json";
const PENDING_RELEASE_FILE: &str = "pending_release.json";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The INI file could not be read or parsed.
    #[error("failed to load config {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// A required key is absent.
    #[error("missing required key [{section}] {key}")]
    MissingKey { section: String, key: String },

    /// A key holds a value of the wrong shape.
    #[error("invalid value for [{section}] {key}: {value}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Configuration for the update engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Token identifying the application to the release service.
    pub app_token: String,

    /// Token identifying the SDK installation.
    pub sdk_token: String,

    /// Version of the host application binary.
    pub app_version: String,

    /// Release-service project identifier.
    pub project_id: String,

    /// Platform identifier sent with release checks.
    pub platform: String,

    /// Base directory under which slots and engine state live.
    pub files_dir: PathBuf,

    /// Endpoint of the release-check call.
    pub release_check_url: String,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Size assumed when neither the release offer nor the size probe
    /// yields one. `None` makes an unknown size a hard error.
    pub fallback_bundle_size: Option<u64>,

    /// Name of the temporary archive file.
    pub archive_name: String,

    /// Bundle entry, relative to the download directory, that must exist
    /// after extraction.
    pub bundle_entry: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let files_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("airship");

        Self {
            app_token: String::new(),
            sdk_token: String::new(),
            app_version: String::new(),
            project_id: String::new(),
            platform: std::env::consts::OS.to_string(),
            files_dir,
            release_check_url: DEFAULT_RELEASE_CHECK_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            fallback_bundle_size: None,
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            bundle_entry: Path::new(BUNDLE_FOLDER_NAME).join(BUNDLE_FILE_NAME),
        }
    }
}

impl EngineConfig {
    /// Create a configuration for the given app version and project.
    pub fn new(app_version: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
            project_id: project_id.into(),
            ..Default::default()
        }
    }

    /// Set the base files directory.
    pub fn with_files_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.files_dir = path.into();
        self
    }

    /// Set the app and SDK tokens.
    pub fn with_tokens(
        mut self,
        app_token: impl Into<String>,
        sdk_token: impl Into<String>,
    ) -> Self {
        self.app_token = app_token.into();
        self.sdk_token = sdk_token.into();
        self
    }

    /// Set the platform identifier.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Set the release-check endpoint.
    pub fn with_release_check_url(mut self, url: impl Into<String>) -> Self {
        self.release_check_url = url.into();
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the size assumed when no size is known.
    pub fn with_fallback_bundle_size(mut self, size: Option<u64>) -> Self {
        self.fallback_bundle_size = size.filter(|s| *s > 0);
        self
    }

    /// Set the expected bundle entry.
    pub fn with_bundle_entry(mut self, entry: impl Into<PathBuf>) -> Self {
        self.bundle_entry = entry.into();
        self
    }

    /// Directory the next bundle is downloaded and extracted into.
    pub fn temp_slot_dir(&self) -> PathBuf {
        self.files_dir.join(PROD_DIRECTORY).join(TEMP_FOLDER_SLOT)
    }

    /// File holding the durable slot record.
    pub fn slot_record_path(&self) -> PathBuf {
        self.files_dir.join(SLOT_RECORD_FILE)
    }

    /// File holding resumable download offsets.
    pub fn download_cache_path(&self) -> PathBuf {
        self.files_dir.join(DOWNLOAD_CACHE_FILE)
    }

    /// File holding a deferred release.
    pub fn pending_release_path(&self) -> PathBuf {
        self.files_dir.join(PENDING_RELEASE_FILE)
    }

    /// Load configuration from an INI file.
    pub fn from_ini(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini_document(&ini)
    }

    /// Load configuration from INI text.
    pub fn from_ini_str(contents: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(contents).map_err(|e| ConfigError::Load {
            path: PathBuf::from("<string>"),
            reason: e.to_string(),
        })?;
        Self::from_ini_document(&ini)
    }

    fn from_ini_document(ini: &Ini) -> Result<Self, ConfigError> {
        let get = |section: &str, key: &str| -> Option<String> {
            ini.section(Some(section))
                .and_then(|s| s.get(key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |section: &str, key: &str| -> Result<String, ConfigError> {
            get(section, key).ok_or_else(|| ConfigError::MissingKey {
                section: section.to_string(),
                key: key.to_string(),
            })
        };
        let parse_u64 = |section: &str, key: &str| -> Result<Option<u64>, ConfigError> {
            get(section, key)
                .map(|v| {
                    v.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                        section: section.to_string(),
                        key: key.to_string(),
                        value: v.clone(),
                    })
                })
                .transpose()
        };

        let mut config = Self::new(
            require("engine", "app_version")?,
            require("engine", "project_id")?,
        );

        if let Some(platform) = get("engine", "platform") {
            config.platform = platform;
        }
        if let Some(dir) = get("engine", "files_dir") {
            config.files_dir = PathBuf::from(dir);
        }
        if let Some(url) = get("engine", "release_check_url") {
            config.release_check_url = url;
        }
        config.app_token = get("auth", "app_token").unwrap_or_default();
        config.sdk_token = get("auth", "sdk_token").unwrap_or_default();

        if let Some(secs) = parse_u64("download", "timeout_secs")? {
            config.timeout = Duration::from_secs(secs);
        }
        config.fallback_bundle_size =
            parse_u64("download", "fallback_bundle_size")?.filter(|s| *s > 0);
        if let Some(entry) = get("download", "bundle_entry") {
            config.bundle_entry = PathBuf::from(entry);
        }
        if let Some(name) = get("download", "archive_name") {
            config.archive_name = name;
        }

        Ok(config)
    }
}
