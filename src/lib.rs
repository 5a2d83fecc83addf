//! # issue2epub
//!
//! Download an issue of the Jungle World magazine (<https://jungle.world>)
//! and package it as an EPUB.
//!
//! The pipeline is strictly sequential: resolve the issue, read its index
//! page, fetch every article and image through an on-disk cache, then write
//! one EPUB with a table of contents and the issue's cover.
//!
//! ## Usage
//!
//! ```bash
//! issue2epub run 2017/05
//! issue2epub run            # current issue
//! ```

mod archive;
mod assembler;
mod cache;
mod config;
mod error;
mod fetcher;
mod issue;
mod model;
mod packager;
mod parser;
mod pipeline;
mod xhtml;

pub use assembler::{AssembledIssue, IssueAssembler};
pub use cache::{cache_key, Cache};
pub use config::{BookConfig, Config, SiteConfig, CONFIG_FILE_NAME};
pub use error::{Error, Result};
pub use fetcher::{Fetcher, HttpFetcher, OfflineFetcher};
pub use issue::IssueId;
pub use model::{Article, ArticleOutcome, AssemblyReport, Image, Issue};
pub use packager::EpubPackager;
pub use parser::{parse_article, parse_current_issue, parse_index, IssueIndex};
pub use pipeline::{run, RunOptions, RunSummary, REPORT_FILE_NAME};
