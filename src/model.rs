use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::Serialize;
use url::Url;

use crate::cache::cache_key;
use crate::issue::IssueId;

/// One story of an issue, reduced to what goes into the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub source: Url,
    pub title: String,
    /// XHTML fragment; `img` elements point at the absolute image URLs.
    pub body: String,
    /// Images referenced by `body`, in document order, without duplicates.
    pub images: Vec<Url>,
}

impl Article {
    /// An article without the content region.
    pub fn empty(source: Url) -> Self {
        Self {
            source,
            title: String::new(),
            body: String::new(),
            images: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.body.trim().is_empty()
    }

    /// Title for the table of contents; falls back to the last URL segment.
    pub fn display_title(&self) -> String {
        let title = self.title.trim();
        if !title.is_empty() {
            return title.to_string();
        }
        self.source
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .unwrap_or("untitled")
            .to_string()
    }
}

/// An image ready to be embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Resource name inside the book, unique per source URL.
    pub file_name: String,
    pub media_type: &'static str,
    pub data: Vec<u8>,
}

impl Image {
    pub fn new(url: &Url, data: Vec<u8>) -> Self {
        let key = cache_key(url);
        let media_type = sniff_media_type(&data)
            .or_else(|| media_type_from_extension(&key))
            .unwrap_or("application/octet-stream");

        let flat = flatten(&key);
        let file_name = match (flat.strip_suffix(".html"), extension_for(media_type)) {
            (Some(stem), Some(ext)) => format!("{}.{}", stem, ext),
            _ => flat.clone(),
        };

        Self {
            file_name,
            media_type,
            data,
        }
    }

    /// Extension matching the media type, `bin` when unknown.
    pub fn extension(&self) -> &'static str {
        extension_for(self.media_type).unwrap_or("bin")
    }
}

// slugified segments never contain '_', so joining with it stays unique
fn flatten(key: &Path) -> String {
    key.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Identify common web image formats by their magic bytes.
pub fn sniff_media_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(&[0xff, 0xd8, 0xff]) {
        Some("image/jpeg")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        let head = String::from_utf8_lossy(&data[..data.len().min(256)]);
        let head = head.trim_start();
        (head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")))
            .then_some("image/svg+xml")
    }
}

fn media_type_from_extension(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()? {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

fn extension_for(media_type: &str) -> Option<&'static str> {
    match media_type {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        _ => None,
    }
}

/// Everything the packager needs for one issue.
#[derive(Debug, Clone)]
pub struct Issue {
    pub id: IssueId,
    pub title: String,
    pub cover: Image,
    pub articles: Vec<Article>,
    /// Fetched article images keyed by absolute URL.
    pub images: BTreeMap<String, Image>,
}

/// What happened to one article link of the index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArticleOutcome {
    Produced { url: String, title: String },
    Skipped { url: String, reason: String },
}

/// Per-link outcomes of one assembly run, in index page order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssemblyReport {
    pub issue: String,
    pub articles: Vec<ArticleOutcome>,
    pub missing_images: Vec<String>,
}

impl AssemblyReport {
    pub fn new(issue: IssueId) -> Self {
        Self {
            issue: issue.to_string(),
            ..Self::default()
        }
    }

    pub fn produced(&self) -> usize {
        self.articles
            .iter()
            .filter(|o| matches!(o, ArticleOutcome::Produced { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.articles.len() - self.produced()
    }
}
