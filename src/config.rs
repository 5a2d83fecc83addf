//! Runtime configuration.
//!
//! Compiled-in defaults are overridden by `issue2epub.toml` (or the file
//! passed with `--config`), which is overridden by command line flags. The
//! resulting [`Config`] is built once at startup and handed to every
//! component.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "issue2epub.toml";

const USER_AGENT: &str = concat!("issue2epub/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the page cache; each issue gets `<cache_dir>/<YYYY>/<NN>`.
    pub cache_dir: PathBuf,
    /// Directory the EPUB is written to.
    pub output_dir: PathBuf,
    pub site: SiteConfig,
    pub book: BookConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            output_dir: PathBuf::from("."),
            site: SiteConfig::default(),
            book: BookConfig::default(),
        }
    }
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    /// Path prefix of the issue index pages, `<base_url><index_path>/YYYY/NN`.
    pub index_path: String,
    /// Per-request timeout in seconds, `0` disables it.
    pub timeout_secs: f64,
    pub user_agent: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://jungle.world".to_string(),
            index_path: "/inhalt".to_string(),
            timeout_secs: 30.0,
            user_agent: USER_AGENT.to_string(),
            username: None,
            password: None,
        }
    }
}

impl SiteConfig {
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|source| Error::Url {
            input: self.base_url.clone(),
            source,
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0.0).then(|| Duration::from_secs_f64(self.timeout_secs))
    }

    /// Basic auth credentials, only when both halves are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user, password))
            }
            _ => None,
        }
    }
}

/// `[book]` section: naming and metadata of the generated EPUB.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    /// Output file is `<file_prefix>-<YYYY.NN>.epub`.
    pub file_prefix: String,
    /// Book title is `<title_prefix> <YYYY/NN>`.
    pub title_prefix: String,
    pub author: String,
    /// BCP 47 language code.
    pub language: String,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            file_prefix: "JW".to_string(),
            title_prefix: "Jungle World".to_string(),
            author: "Redaktion Jungle World".to_string(),
            language: "de".to_string(),
        }
    }
}

impl Config {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, `issue2epub.toml` in the
    /// working directory is used when present, the defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    debug!("No {} found, using defaults", CONFIG_FILE_NAME);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        debug!("Loaded configuration from {}", path.display());
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.site.base_url()?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "base_url must be an http(s) URL, got {}",
                self.site.base_url
            )));
        }
        if !self.site.timeout_secs.is_finite() || self.site.timeout_secs < 0.0 {
            return Err(Error::config("timeout_secs must be zero or positive"));
        }
        let prefix = &self.book.file_prefix;
        if prefix.is_empty() || prefix.contains(['/', '\\']) {
            return Err(Error::config(format!(
                "file_prefix must be a plain file name prefix, got {:?}",
                prefix
            )));
        }
        Ok(())
    }
}
