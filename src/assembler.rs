use std::collections::BTreeMap;

use colored::*;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::Cache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::issue::IssueId;
use crate::model::{Article, ArticleOutcome, AssemblyReport, Image, Issue};
use crate::parser;

/// An issue ready for packaging, plus what was left out on the way.
#[derive(Debug, Clone)]
pub struct AssembledIssue {
    pub issue: Issue,
    pub report: AssemblyReport,
}

/// Collects the pages of one issue through the cache.
///
/// Everything runs strictly in sequence. The index page and the cover are
/// required; an article or image that cannot be fetched is reported and
/// left out.
pub struct IssueAssembler<'a, F> {
    config: &'a Config,
    fetcher: F,
    base_url: Url,
    refresh_index: bool,
}

impl<'a, F: Fetcher + Sync> IssueAssembler<'a, F> {
    pub fn new(config: &'a Config, fetcher: F) -> Result<Self> {
        Ok(Self {
            base_url: config.site.base_url()?,
            config,
            fetcher,
            refresh_index: false,
        })
    }

    /// Fetch the index page even when it is cached.
    pub fn refresh_index(mut self, refresh: bool) -> Self {
        self.refresh_index = refresh;
        self
    }

    /// Ask the front page which issue is current. Never cached.
    pub async fn current_issue(&self) -> Result<IssueId> {
        info!("Looking up the current issue on \"{}\"", self.base_url.as_str().green());
        let html = self.fetcher.fetch(&self.base_url).await?;
        let issue = parser::parse_current_issue(&String::from_utf8_lossy(&html))?;
        info!("Current issue is {}", issue.to_string().green());
        Ok(issue)
    }

    pub fn index_url(&self, issue: IssueId) -> Result<Url> {
        let path = format!(
            "{}/{}",
            self.config.site.index_path.trim_end_matches('/'),
            issue
        );
        self.base_url.join(&path).map_err(|source| Error::Url {
            input: path,
            source,
        })
    }

    pub fn cache_for(&self, issue: IssueId) -> Cache<&F> {
        Cache::new(self.config.cache_dir.join(issue.cache_dir()), &self.fetcher)
    }

    /// Assemble `issue`, or the current issue when `None`.
    pub async fn assemble(&self, issue: Option<IssueId>) -> Result<AssembledIssue> {
        let id = match issue {
            Some(id) => id,
            None => self.current_issue().await?,
        };
        let cache = self.cache_for(id);
        let mut report = AssemblyReport::new(id);

        let index_url = self.index_url(id)?;
        info!("Reading index of issue {} from \"{}\"", id, index_url.as_str().green());
        let html = if self.refresh_index {
            cache.refresh(&index_url).await?
        } else {
            cache.get_or_fetch(&index_url).await?
        };
        let index = parser::parse_index(&String::from_utf8_lossy(&html), &index_url);

        if let Some(listed) = index.issue.filter(|listed| *listed != id) {
            warn!("Index page of {} calls itself issue {}, keeping {}", id, listed, id);
        }
        let title = index
            .title
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.config.book.title_prefix, id));
        info!("Title: {}", title);

        let cover_url = index
            .cover
            .clone()
            .ok_or_else(|| Error::parse(format!("index page {} has no cover image", index_url)))?;
        info!("Downloading cover image \"{}\"", cover_url.as_str().green());
        let cover = Image::new(&cover_url, cache.get_or_fetch(&cover_url).await?);

        let mut articles = Vec::new();
        for url in &index.articles {
            match self.fetch_article(&cache, url).await {
                Ok(article) if article.is_empty() => {
                    warn!("Skipping {}: no article content found", url);
                    report.articles.push(ArticleOutcome::Skipped {
                        url: url.to_string(),
                        reason: "no article content found".to_string(),
                    });
                }
                Ok(article) => {
                    info!("Added story \"{}\"", article.display_title());
                    report.articles.push(ArticleOutcome::Produced {
                        url: url.to_string(),
                        title: article.display_title(),
                    });
                    articles.push(article);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", url, e);
                    report.articles.push(ArticleOutcome::Skipped {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let images = self.fetch_images(&cache, &articles, &mut report).await;

        info!(
            "Assembled issue {}: {} articles, {} skipped, {} images",
            id.to_string().green(),
            report.produced(),
            report.skipped(),
            images.len()
        );

        Ok(AssembledIssue {
            issue: Issue {
                id,
                title,
                cover,
                articles,
                images,
            },
            report,
        })
    }

    async fn fetch_article(&self, cache: &Cache<&F>, url: &Url) -> Result<Article> {
        let html = cache.get_or_fetch(url).await?;
        Ok(parser::parse_article(&String::from_utf8_lossy(&html), url))
    }

    async fn fetch_images(
        &self,
        cache: &Cache<&F>,
        articles: &[Article],
        report: &mut AssemblyReport,
    ) -> BTreeMap<String, Image> {
        let mut images = BTreeMap::new();
        for url in articles.iter().flat_map(|a| &a.images) {
            let key = url.to_string();
            if images.contains_key(&key) || report.missing_images.contains(&key) {
                continue;
            }
            match cache.get_or_fetch(url).await {
                Ok(data) => {
                    debug!("Image {} ({} bytes)", url, data.len());
                    images.insert(key, Image::new(url, data));
                }
                Err(e) => {
                    warn!("Leaving out image {}: {}", url, e);
                    report.missing_images.push(key);
                }
            }
        }
        images
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";

    /// Serves canned pages by URL and records every request.
    struct FakeSite {
        pages: HashMap<String, Vec<u8>>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeSite {
        fn new(pages: &[(&str, &[u8])]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.to_vec()))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Fetcher for FakeSite {
        async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages.get(url.as_str()).cloned().ok_or(Error::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn config(cache_dir: &Path) -> Config {
        let mut config = Config::default();
        config.cache_dir = cache_dir.to_path_buf();
        config
    }

    fn article_page(title: &str, image: Option<&str>) -> Vec<u8> {
        let img = image
            .map(|src| format!("<img src=\"{}\">", src))
            .unwrap_or_default();
        format!(
            "<html><body><div class=\"view-mode-full\"><h1 class=\"page-title\">{}</h1>\
             <div class=\"field-name-body\"><p>Text</p>{}</div></div></body></html>",
            title, img
        )
        .into_bytes()
    }

    const INDEX: &str = r#"<html><head><title>Inhalt - Ausgabe 2017/05 - Jungle World</title></head><body>
        <div class="field-name-field-ref-bilder"><img src="/files/cover.gif?itok=1"></div>
        <h4 class="public"><a href="/artikel/eins">1</a></h4>
        <h4 class="public"><a href="/artikel/kaputt">2</a></h4>
        <h4 class="public"><a href="/artikel/leer">3</a></h4>
        <h4 class="public"><a href="/artikel/zwei">4</a></h4>
        </body></html>"#;

    #[tokio::test]
    async fn skips_failed_and_empty_articles_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let eins = article_page("Eins", Some("/files/a.gif"));
        let zwei = article_page("Zwei", Some("/files/fehlt.gif"));
        let site = FakeSite::new(&[
            ("https://jungle.world/inhalt/2017/05", INDEX.as_bytes()),
            ("https://jungle.world/files/cover.gif", GIF),
            ("https://jungle.world/artikel/eins", &eins),
            ("https://jungle.world/artikel/leer", b"<html><body>Leer</body></html>"),
            ("https://jungle.world/artikel/zwei", &zwei),
            ("https://jungle.world/files/a.gif", GIF),
        ]);

        let assembler = IssueAssembler::new(&config, &site).unwrap();
        let assembled = assembler.assemble(Some("2017/05".parse().unwrap())).await.unwrap();
        let issue = assembled.issue;

        assert_eq!(issue.title, "Ausgabe 2017/05");
        let titles: Vec<&str> = issue.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["Eins", "Zwei"]);
        assert_eq!(issue.cover.media_type, "image/gif");
        assert_eq!(
            issue.images.keys().collect::<Vec<_>>(),
            ["https://jungle.world/files/a.gif"]
        );

        let report = assembled.report;
        assert_eq!(report.produced(), 2);
        assert_eq!(report.skipped(), 2);
        assert!(matches!(
            &report.articles[1],
            ArticleOutcome::Skipped { url, reason }
                if url == "https://jungle.world/artikel/kaputt" && reason.contains("404")
        ));
        assert!(matches!(
            &report.articles[2],
            ArticleOutcome::Skipped { reason, .. } if reason == "no article content found"
        ));
        assert_eq!(report.missing_images, ["https://jungle.world/files/fehlt.gif"]);
        assert!(dir.path().join("2017/05/artikel/eins.html").exists());
    }

    #[tokio::test]
    async fn resolves_the_current_issue() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let front = r#"<div class="view-mode-teaser"><time>2017/06</time></div>"#;
        let index = INDEX.replace("<h4", "<h5");
        let site = FakeSite::new(&[
            ("https://jungle.world/", front.as_bytes()),
            ("https://jungle.world/inhalt/2017/06", index.as_bytes()),
            ("https://jungle.world/files/cover.gif", GIF),
        ]);

        let assembler = IssueAssembler::new(&config, &site).unwrap();
        let assembled = assembler.assemble(None).await.unwrap();

        assert_eq!(assembled.issue.id.to_string(), "2017/06");
        assert!(assembled.issue.articles.is_empty());
        assert!(dir.path().join("2017/06/inhalt/2017/06.html").exists());
        assert!(dir.path().join("2017/06/files/cover.gif").exists());
    }

    #[tokio::test]
    async fn missing_cover_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let site = FakeSite::new(&[(
            "https://jungle.world/inhalt/2017/05",
            b"<html><body><h4 class=\"public\"><a href=\"/a\">a</a></h4></body></html>",
        )]);

        let assembler = IssueAssembler::new(&config, &site).unwrap();
        let result = assembler.assemble(Some("2017/05".parse().unwrap())).await;
        assert!(matches!(result, Err(Error::Parse { .. })));
    }

    #[tokio::test]
    async fn unreachable_index_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let site = FakeSite::new(&[]);

        let assembler = IssueAssembler::new(&config, &site).unwrap();
        let result = assembler.assemble(Some("2017/05".parse().unwrap())).await;
        assert!(matches!(result, Err(Error::Status { status: 404, .. })));
        assert_eq!(site.requests(), ["https://jungle.world/inhalt/2017/05"]);
    }

    #[tokio::test]
    async fn refresh_index_bypasses_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let index = INDEX.replace("<h4", "<h5");
        let site = FakeSite::new(&[
            ("https://jungle.world/inhalt/2017/05", index.as_bytes()),
            ("https://jungle.world/files/cover.gif", GIF),
        ]);
        let id: IssueId = "2017/05".parse().unwrap();

        let assembler = IssueAssembler::new(&config, &site).unwrap();
        assembler.assemble(Some(id)).await.unwrap();
        assembler.assemble(Some(id)).await.unwrap();
        assert_eq!(site.requests().len(), 2);

        let assembler = assembler.refresh_index(true);
        assembler.assemble(Some(id)).await.unwrap();
        assert_eq!(
            site.requests().last().map(String::as_str),
            Some("https://jungle.world/inhalt/2017/05")
        );
        assert_eq!(site.requests().len(), 3);
    }
}
