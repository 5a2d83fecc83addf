use std::path::{Path, PathBuf};

use colored::*;
use tokio::fs;
use tracing::{info, warn};

use crate::assembler::IssueAssembler;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::issue::IssueId;
use crate::model::AssemblyReport;
use crate::packager::EpubPackager;

/// File next to the cached pages of an issue describing the last run.
pub const REPORT_FILE_NAME: &str = "report.json";

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Fetch the index page even when it is cached.
    pub refresh_index: bool,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub issue: IssueId,
    pub output: PathBuf,
    pub report: AssemblyReport,
}

/// Download `issue` (the current one when `None`) and write its EPUB.
pub async fn run<F: Fetcher + Sync>(
    config: &Config,
    fetcher: F,
    issue: Option<IssueId>,
    options: RunOptions,
) -> Result<RunSummary> {
    let assembler = IssueAssembler::new(config, fetcher)?.refresh_index(options.refresh_index);
    let assembled = assembler.assemble(issue).await?;
    let id = assembled.issue.id;

    save_report(&assembled.report, &config.cache_dir.join(id.cache_dir())).await?;
    if assembled.report.skipped() > 0 {
        warn!(
            "{} of {} articles were skipped, see {}",
            assembled.report.skipped(),
            assembled.report.articles.len(),
            REPORT_FILE_NAME
        );
    }

    let output = EpubPackager::new(&config.book)
        .write(&assembled.issue, &config.output_dir)
        .await?;
    info!(
        "Issue {} saved to \"{}\"",
        id.to_string().green(),
        output.display().to_string().blue()
    );

    Ok(RunSummary {
        issue: id,
        output,
        report: assembled.report,
    })
}

async fn save_report(report: &AssemblyReport, dir: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(report)
        .map_err(|e| Error::Package(format!("failed to serialize report: {}", e)))?;
    fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::io(dir, e))?;
    let path = dir.join(REPORT_FILE_NAME);
    fs::write(&path, json)
        .await
        .map_err(|e| Error::io(&path, e))
}
