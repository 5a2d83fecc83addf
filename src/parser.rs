//! Extraction rules for the pages of jungle.world.
//!
//! Everything here is best effort: markup that does not match yields empty
//! fields, never an error. Only [`parse_current_issue`] fails, because
//! without an issue identifier there is nothing to download.

use std::cell::RefCell;
use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::issue::IssueId;
use crate::model::Article;
use crate::xhtml::{self, Rewrite};

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

fn text_of(element: ElementRef<'_>) -> String {
    let text = element.text().collect::<String>();
    xhtml::xml_chars(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Absolute form of `href` relative to `base`, without query and fragment.
fn resolve_resource(base: &Url, href: &str) -> Option<Url> {
    let mut url = base.join(href.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_query(None);
    url.set_fragment(None);
    Some(url)
}

/// Read the identifier of the current issue off the front page.
pub fn parse_current_issue(html: &str) -> Result<IssueId> {
    let document = Html::parse_document(html);
    let time = document
        .select(&selector(".view-mode-teaser time"))
        .next()
        .ok_or_else(|| Error::parse("front page has no current issue teaser"))?;
    text_of(time).parse()
}

/// What the index page of an issue tells about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueIndex {
    pub title: Option<String>,
    /// Identifier printed in the breadcrumb.
    pub issue: Option<IssueId>,
    pub cover: Option<Url>,
    /// Article pages in page order, without duplicates.
    pub articles: Vec<Url>,
}

pub fn parse_index(html: &str, page_url: &Url) -> IssueIndex {
    let document = Html::parse_document(html);

    // "<section> - <issue title> - <site>"
    let title = document
        .select(&selector("title"))
        .next()
        .and_then(|t| text_of(t).split('-').nth(1).map(|s| s.trim().to_string()))
        .filter(|t| !t.is_empty());

    let issue = document
        .select(&selector("ul.breadcrumb time"))
        .next()
        .and_then(|t| text_of(t).parse().ok());

    let cover = document
        .select(&selector("div.field-name-field-ref-bilder img[src]"))
        .next()
        .and_then(|img| img.value().attr("src"))
        .and_then(|src| resolve_resource(page_url, src));

    let mut seen = HashSet::new();
    let mut articles = Vec::new();
    for link in document.select(&selector("h4.public a[href]")) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Ok(mut url) = page_url.join(href.trim()) else {
            debug!("Ignoring unparsable article link {:?}", href);
            continue;
        };
        url.set_fragment(None);
        if seen.insert(url.clone()) {
            articles.push(url);
        }
    }

    debug!("Index {} lists {} articles", page_url, articles.len());
    IssueIndex {
        title,
        issue,
        cover,
        articles,
    }
}

/// Makes image and link references of an article absolute and remembers
/// the images it let through.
struct Absolute<'a> {
    base: &'a Url,
    images: RefCell<Vec<Url>>,
}

impl Rewrite for Absolute<'_> {
    fn image(&self, src: &str) -> Option<String> {
        let url = resolve_resource(self.base, src)?;
        let mut images = self.images.borrow_mut();
        if !images.contains(&url) {
            images.push(url.clone());
        }
        Some(url.into())
    }

    fn link(&self, href: &str) -> String {
        self.base
            .join(href.trim())
            .map(String::from)
            .unwrap_or_else(|_| href.to_string())
    }
}

/// Extract one article.
///
/// The story is the first `.view-mode-full` element. The dateline, title,
/// lead, author line and body found inside it are kept in that order, and
/// the images are those the kept parts show. A page without that region
/// gives an empty article.
pub fn parse_article(html: &str, page_url: &Url) -> Article {
    let document = Html::parse_document(html);
    let Some(story) = document.select(&selector(".view-mode-full")).next() else {
        debug!("No story found in {}", page_url);
        return Article::empty(page_url.clone());
    };

    let rewrite = Absolute {
        base: page_url,
        images: RefCell::new(Vec::new()),
    };
    let first = |css: &'static str| story.select(&selector(css)).next();
    let mut body = String::new();

    if let Some(date) = first("#ausgabe-wrapper span") {
        let date = text_of(date);
        if !date.is_empty() {
            body.push_str("<div class=\"dateline\">");
            body.push_str(&html_escape::encode_text(&date));
            body.push_str("</div>");
        }
    }

    let title = first(".page-title").map(text_of).unwrap_or_default();
    if !title.is_empty() {
        body.push_str("<h1 class=\"chapter\">");
        body.push_str(&html_escape::encode_text(&title));
        body.push_str("</h1>");
    }

    for (css, class) in [
        (".lead", "lead"),
        (".autor-wrapper", "author"),
        (".field-name-body", "body"),
    ] {
        if let Some(part) = first(css) {
            body.push_str("<div class=\"");
            body.push_str(class);
            body.push_str("\">");
            xhtml::write_children(part, &rewrite, &mut body);
            body.push_str("</div>");
        }
    }

    Article {
        source: page_url.clone(),
        title,
        body,
        images: rewrite.images.into_inner(),
    }
}
