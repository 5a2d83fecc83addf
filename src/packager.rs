//! EPUB packaging.
//!
//! Uses `epub-builder` for the container itself (OPF manifest, NCX and nav
//! documents, ZIP layout). Each article becomes one XHTML document and one
//! table of contents entry. Identifier and dates are derived from the issue
//! and the archive timestamps are fixed, so the same input always gives
//! the same bytes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use colored::*;
use epub_builder::{EpubBuilder, EpubContent, EpubVersion, ReferenceType};
use html_escape::encode_text;
use scraper::Html;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::archive::StableZip;
use crate::config::BookConfig;
use crate::error::{Error, Result};
use crate::issue::IssueId;
use crate::model::{Article, Image, Issue};
use crate::xhtml::{self, Rewrite};

const STYLESHEET: &str = r#"body { font-family: serif; line-height: 1.4; }
h1.chapter { margin-top: 0.5em; }
div.dateline { margin-top: 0.5em; font-size: 0.9em; color: #555; }
div.lead { margin-top: 0.5em; font-weight: bold; }
div.author { margin-top: 0.5em; font-style: italic; }
div.body { margin-top: 0.5em; }
div.cover { text-align: center; }
div.cover img { max-width: 100%; max-height: 100%; }
img { max-width: 100%; }
"#;

fn package_error(what: &str, err: impl std::fmt::Display) -> Error {
    Error::Package(format!("{}: {}", what, err))
}

/// Points article images at the embedded copies; drops the ones that
/// could not be fetched.
struct EmbeddedImages<'a> {
    images: &'a BTreeMap<String, Image>,
}

impl Rewrite for EmbeddedImages<'_> {
    fn image(&self, src: &str) -> Option<String> {
        self.images
            .get(src)
            .map(|image| format!("images/{}", image.file_name))
    }
}

pub struct EpubPackager<'a> {
    book: &'a BookConfig,
}

impl<'a> EpubPackager<'a> {
    pub fn new(book: &'a BookConfig) -> Self {
        Self { book }
    }

    /// `JW-2017.05.epub`
    pub fn file_name(&self, id: IssueId) -> String {
        format!("{}-{}.epub", self.book.file_prefix, id.file_stem())
    }

    pub fn book_title(&self, id: IssueId) -> String {
        format!("{} {}", self.book.title_prefix, id)
    }

    /// Render `issue` as EPUB bytes.
    pub fn render(&self, issue: &Issue) -> Result<Vec<u8>> {
        let title = self.book_title(issue.id);

        let zip = StableZip::new().map_err(|e| package_error("failed to create ZIP archive", e))?;
        let mut builder =
            EpubBuilder::new(zip).map_err(|e| package_error("failed to create EPUB builder", e))?;
        builder.epub_version(EpubVersion::V30);

        builder
            .metadata("title", &title)
            .map_err(|e| package_error("failed to set title", e))?;
        builder
            .metadata("author", &self.book.author)
            .map_err(|e| package_error("failed to set author", e))?;
        builder
            .metadata("lang", &self.book.language)
            .map_err(|e| package_error("failed to set language", e))?;
        builder
            .metadata("generator", env!("CARGO_PKG_NAME"))
            .map_err(|e| package_error("failed to set generator", e))?;
        builder
            .metadata("description", &issue.title)
            .map_err(|e| package_error("failed to set description", e))?;

        builder.set_uuid(Uuid::new_v5(&Uuid::NAMESPACE_URL, title.as_bytes()));
        if let Some(date) = Utc
            .with_ymd_and_hms(i32::from(issue.id.year()), 1, 1, 0, 0, 0)
            .single()
        {
            builder.set_publication_date(date);
            builder.set_modified_date(date);
        }

        builder
            .stylesheet(STYLESHEET.as_bytes())
            .map_err(|e| package_error("failed to add stylesheet", e))?;

        info!("Adding cover image ...");
        // Article images all live in images/, the cover stays out of there.
        let cover_path = format!("cover.{}", issue.cover.extension());
        builder
            .add_cover_image(&cover_path, issue.cover.data.as_slice(), issue.cover.media_type)
            .map_err(|e| package_error("failed to add cover image", e))?;
        let cover_page = page(
            &title,
            &self.book.language,
            &format!(
                "<div class=\"cover\"><img src=\"{}\" alt=\"{}\"/></div>",
                cover_path,
                encode_text(&title)
            ),
        );
        builder
            .add_content(
                EpubContent::new("cover.xhtml", cover_page.as_bytes()).reftype(ReferenceType::Cover),
            )
            .map_err(|e| package_error("failed to add cover page", e))?;

        for image in issue.images.values() {
            debug!("Embedding images/{}", image.file_name);
            builder
                .add_resource(
                    format!("images/{}", image.file_name),
                    image.data.as_slice(),
                    image.media_type,
                )
                .map_err(|e| package_error("failed to add image", e))?;
        }

        let embedded = EmbeddedImages {
            images: &issue.images,
        };
        for (i, article) in issue.articles.iter().enumerate() {
            let title = article.display_title();
            info!("Adding story \"{}\" ...", title);
            let html = page(&title, &self.book.language, &article_body(article, &embedded));
            let mut content =
                EpubContent::new(format!("article-{:03}.xhtml", i + 1), html.as_bytes()).title(&title);
            if i == 0 {
                content = content.reftype(ReferenceType::Text);
            }
            builder
                .add_content(content)
                .map_err(|e| package_error("failed to add article", e))?;
        }

        let mut epub = Vec::new();
        builder
            .generate(&mut epub)
            .map_err(|e| package_error("failed to generate EPUB", e))?;
        Ok(epub)
    }

    /// Render `issue` and write it to `out_dir`, returning the file path.
    pub async fn write(&self, issue: &Issue, out_dir: &Path) -> Result<PathBuf> {
        let epub = self.render(issue)?;

        fs::create_dir_all(out_dir)
            .await
            .map_err(|e| Error::io(out_dir, e))?;
        let path = out_dir.join(self.file_name(issue.id));
        fs::write(&path, epub)
            .await
            .map_err(|e| Error::io(&path, e))?;

        info!("Wrote \"{}\"", path.display().to_string().blue());
        Ok(path)
    }
}

fn article_body(article: &Article, embedded: &EmbeddedImages<'_>) -> String {
    let fragment = Html::parse_fragment(&article.body);
    let mut body = String::new();
    xhtml::write_children(fragment.root_element(), embedded, &mut body);
    body
}

fn page(title: &str, lang: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{lang}" xml:lang="{lang}">
<head>
<meta charset="UTF-8"/>
<title>{title}</title>
<link rel="stylesheet" type="text/css" href="stylesheet.css"/>
</head>
<body>
{body}
</body>
</html>
"#,
        lang = html_escape::encode_double_quoted_attribute(lang),
        title = encode_text(title),
        body = body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use url::Url;

    const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";

    fn issue() -> Issue {
        let url = |s: &str| Url::parse(s).unwrap();
        let image_url = "https://jungle.world/files/karte.gif";
        let article = |slug: &str, title: &str, body: &str| Article {
            source: url(&format!("https://jungle.world/artikel/2017/05/{}", slug)),
            title: title.to_string(),
            body: body.to_string(),
            images: Vec::new(),
        };

        let mut images = BTreeMap::new();
        images.insert(image_url.to_string(), Image::new(&url(image_url), GIF.to_vec()));

        Issue {
            id: "2017/05".parse().unwrap(),
            title: "Jungle World 2017/05".to_string(),
            cover: Image::new(&url("https://jungle.world/files/cover.gif"), GIF.to_vec()),
            articles: vec![
                article(
                    "erster",
                    "Erster Text",
                    &format!("<p>Eins<img alt=\"\" src=\"{}\"/></p>", image_url),
                ),
                article(
                    "zweiter",
                    "Zweiter Text",
                    "<p>Zwei<img alt=\"\" src=\"https://jungle.world/files/fehlt.gif\"/></p>",
                ),
                article("dritter", "", "<p>Drei</p>"),
            ],
            images,
        }
    }

    fn entries(epub: &[u8]) -> BTreeMap<String, Vec<u8>> {
        let mut archive = zip::ZipArchive::new(Cursor::new(epub)).unwrap();
        let mut entries = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            entries.insert(file.name().to_string(), data);
        }
        entries
    }

    fn entry<'e>(entries: &'e BTreeMap<String, Vec<u8>>, suffix: &str) -> &'e str {
        let (_, data) = entries
            .iter()
            .find(|(name, _)| name.ends_with(suffix))
            .unwrap_or_else(|| panic!("no entry ending in {}", suffix));
        std::str::from_utf8(data).unwrap()
    }

    #[test]
    fn names_the_file_after_the_issue() {
        let book = BookConfig::default();
        let packager = EpubPackager::new(&book);
        let id = "2017/05".parse().unwrap();
        assert_eq!(packager.file_name(id), "JW-2017.05.epub");
        assert_eq!(packager.book_title(id), "Jungle World 2017/05");
    }

    #[test]
    fn toc_lists_articles_in_order() {
        let book = BookConfig::default();
        let epub = EpubPackager::new(&book).render(&issue()).unwrap();
        let entries = entries(&epub);

        let ncx = entry(&entries, "toc.ncx");
        assert_eq!(ncx.matches("<navPoint").count(), 3);
        let first = ncx.find("Erster Text").unwrap();
        let second = ncx.find("Zweiter Text").unwrap();
        let third = ncx.find("dritter").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn embeds_cover_and_fetched_images_only() {
        let book = BookConfig::default();
        let epub = EpubPackager::new(&book).render(&issue()).unwrap();
        let entries = entries(&epub);

        assert!(entries.contains_key("OEBPS/cover.gif"));
        assert!(entries.keys().any(|name| name.ends_with("images/files_karte.gif")));
        assert!(entry(&entries, "content.opf").contains("href=\"cover.gif\""));

        let first = entry(&entries, "article-001.xhtml");
        assert!(first.contains("<img alt=\"\" src=\"images/files_karte.gif\"/>"));
        let second = entry(&entries, "article-002.xhtml");
        assert!(second.contains("<p>Zwei</p>"));
        assert!(!second.contains("fehlt.gif"));
    }

    #[test]
    fn article_image_named_like_the_cover_gets_its_own_entry() {
        let book = BookConfig::default();
        let mut issue = issue();
        let lookalike = "https://jungle.world/cover.gif";
        issue.images.insert(
            lookalike.to_string(),
            Image::new(&Url::parse(lookalike).unwrap(), GIF.to_vec()),
        );
        assert_eq!(issue.images[lookalike].file_name, "cover.gif");

        let entries = entries(&EpubPackager::new(&book).render(&issue).unwrap());
        assert!(entries.contains_key("OEBPS/cover.gif"));
        assert!(entries.contains_key("OEBPS/images/cover.gif"));

        let opf = entry(&entries, "content.opf");
        assert_eq!(opf.matches("href=\"cover.gif\"").count(), 1);
        assert_eq!(opf.matches("href=\"images/cover.gif\"").count(), 1);
    }

    #[test]
    fn rendering_is_deterministic() {
        let book = BookConfig::default();
        let packager = EpubPackager::new(&book);
        let issue = issue();
        let first = packager.render(&issue).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2100));
        assert_eq!(first, packager.render(&issue).unwrap());
    }

    #[tokio::test]
    async fn writes_into_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let book = BookConfig::default();
        let path = EpubPackager::new(&book)
            .write(&issue(), &dir.path().join("books"))
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("books").join("JW-2017.05.epub"));
        assert!(std::fs::read(&path).unwrap().starts_with(b"PK"));
    }
}
