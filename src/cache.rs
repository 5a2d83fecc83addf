//! Write-once page cache.
//!
//! Every fetched page or image of an issue lands in that issue's cache
//! directory under a path derived from its URL by [`cache_key`]. An existing
//! file is ground truth for its URL: it is never refreshed or expired (apart
//! from an explicit [`Cache::refresh`]). Delete the directory to start over.

use std::path::{Path, PathBuf};

use colored::*;
use slug::slugify;
use tokio::fs;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::fetcher::Fetcher;

/// Relative cache path for `url`.
///
/// Only the path counts: host, query (the site signs image URLs with a
/// token there) and fragment are ignored. Directory segments are slugified;
/// the last segment keeps its extension, or gets `.html` when it has none.
/// A segment that already ends in `.html` is stored as `<slug>.html.html`,
/// so `/a/b` and `/a/b.html` stay apart.
///
/// Slugs fold case and turn `_` into `-`, so `/a/Foo_Bar` and `/a/foo-bar`
/// share one entry. Paths on the site are lower-case slugs already.
pub fn cache_key(url: &Url) -> PathBuf {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let mut path = PathBuf::new();
    match segments.split_last() {
        None => path.push("index.html"),
        Some((last, dirs)) => {
            for dir in dirs {
                path.push(slug_or_placeholder(dir));
            }
            path.push(file_name(last));
        }
    }
    path
}

fn file_name(segment: &str) -> String {
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && is_extension(ext) => {
            let ext = ext.to_ascii_lowercase();
            // slugs have no dots, so this never meets an extensionless key
            let ext = if ext == "html" { "html.html".to_string() } else { ext };
            format!("{}.{}", slug_or_placeholder(stem), ext)
        }
        _ => format!("{}.html", slug_or_placeholder(segment)),
    }
}

fn is_extension(ext: &str) -> bool {
    (1..=5).contains(&ext.len()) && ext.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn slug_or_placeholder(segment: &str) -> String {
    let slug = slugify(segment);
    if slug.is_empty() {
        "_".to_string()
    } else {
        slug
    }
}

/// Cache directory of one issue in front of a [`Fetcher`].
pub struct Cache<F> {
    dir: PathBuf,
    fetcher: F,
}

impl<F: Fetcher> Cache<F> {
    pub fn new(dir: impl Into<PathBuf>, fetcher: F) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn path_for(&self, url: &Url) -> PathBuf {
        self.dir.join(cache_key(url))
    }

    /// Cached bytes for `url`, fetching and storing them on a miss.
    pub async fn get_or_fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let path = self.path_for(url);
        match fs::read(&path).await {
            Ok(data) => {
                debug!("Cache hit for {} at {}", url, path.display());
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.fetch_into(url, &path).await,
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    /// Fetch `url` regardless of the cache and overwrite the entry.
    pub async fn refresh(&self, url: &Url) -> Result<Vec<u8>> {
        let path = self.path_for(url);
        self.fetch_into(url, &path).await
    }

    async fn fetch_into(&self, url: &Url, path: &Path) -> Result<Vec<u8>> {
        let data = self.fetcher.fetch(url).await?;
        store(path, &data).await?;
        info!("Cached \"{}\"", path.display().to_string().blue());
        Ok(data)
    }
}

/// Write through a `.part` file so an interrupted run never leaves a
/// truncated entry behind.
async fn store(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent, e))?;
    }

    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    fs::write(&partial, data)
        .await
        .map_err(|e| Error::io(&partial, e))?;
    fs::rename(&partial, path)
        .await
        .map_err(|e| Error::io(path, e))
}
