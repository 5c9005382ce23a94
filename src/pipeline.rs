//! Crawl, extract, normalize, persist. One article at a time, in listing order.

use crate::scraper::listing::{DEFAULT_LATEST_LIMIT, DEFAULT_PER_PAGE_TAIL};
use crate::scraper::{
    ArticleExtractor, CrawlScope, FetchCoordinator, PageWalk, ScraperError, SkipReason, Stage,
};
use crate::sink::CsvSink;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_MAINTENANCE_PAUSE_SECS: u64 = 300;

/// What to crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Newest `limit` articles from the first listing page.
    Latest { limit: usize },
    /// Every listing page, last `per_page_tail` articles of each.
    Paginate { per_page_tail: usize },
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Latest {
            limit: DEFAULT_LATEST_LIMIT,
        }
    }
}

impl Mode {
    pub fn paginate() -> Self {
        Mode::Paginate {
            per_page_tail: DEFAULT_PER_PAGE_TAIL,
        }
    }

    fn scope(self) -> CrawlScope {
        match self {
            Mode::Latest { limit } => CrawlScope::FirstPage { limit },
            Mode::Paginate { per_page_tail } => CrawlScope::AllPages { per_page_tail },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub seed: String,
    pub mode: Mode,
    /// Wait after the site reports maintenance, before the next article.
    pub maintenance_pause: Duration,
}

impl PipelineOptions {
    pub fn new(seed: impl Into<String>, mode: Mode) -> Self {
        Self {
            seed: seed.into(),
            mode,
            maintenance_pause: Duration::from_secs(DEFAULT_MAINTENANCE_PAUSE_SECS),
        }
    }
}

/// Overall result of a run that got past the first listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    /// Some articles were skipped or the walk ended on a listing error.
    Partial,
    /// Articles were found but none could be persisted.
    Failed,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub discovered: usize,
    pub persisted: usize,
    pub skipped: usize,
    pub maintenance_pauses: usize,
    pub listing_pages: usize,
    /// Error that ended the walk after the first page, if any.
    pub listing_error: Option<String>,
}

impl RunReport {
    pub fn outcome(&self) -> RunOutcome {
        if self.discovered > 0 && self.persisted == 0 {
            RunOutcome::Failed
        } else if self.skipped > 0 || self.listing_error.is_some() {
            RunOutcome::Partial
        } else {
            RunOutcome::Success
        }
    }
}

pub struct Pipeline {
    fetcher: FetchCoordinator,
    extractor: ArticleExtractor,
    sink: CsvSink,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        fetcher: FetchCoordinator,
        extractor: ArticleExtractor,
        sink: CsvSink,
        options: PipelineOptions,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            sink,
            options,
        }
    }

    /// Run to completion. `progress` is called with (processed, discovered so far) after
    /// each article. A failed first listing page and any persistence error are returned
    /// as errors; everything else is counted in the report.
    pub fn run(
        &mut self,
        progress: Option<&dyn Fn(u32, u32)>,
    ) -> Result<RunReport, ScraperError> {
        let mut report = RunReport::default();
        let mut walk = PageWalk::new(&self.options.seed, self.options.mode.scope());

        while let Some(batch) = walk.next_batch(&mut self.fetcher) {
            let batch = match batch {
                Ok(b) => b,
                Err(e) if report.listing_pages == 0 => return Err(e),
                Err(ScraperError::EmptyListing { url }) => {
                    info!(url = %url, "listing exhausted");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "listing walk stopped early");
                    report.listing_error = Some(e.to_string());
                    break;
                }
            };
            report.listing_pages += 1;
            report.discovered += batch.stubs.len();
            info!(
                page = batch.page_number,
                articles = batch.stubs.len(),
                "processing listing page"
            );

            for stub in &batch.stubs {
                match self.extractor.extract(&mut self.fetcher, stub) {
                    Stage::Ok(mut record) => {
                        record.normalize();
                        self.sink.append(&record)?;
                        report.persisted += 1;
                        info!(title = %record.title, "saved article");
                    }
                    Stage::Skip(SkipReason::SiteMaintenance) => {
                        report.skipped += 1;
                        report.maintenance_pauses += 1;
                        warn!(
                            pause_secs = self.options.maintenance_pause.as_secs(),
                            link = %stub.link,
                            "site under maintenance; pausing"
                        );
                        std::thread::sleep(self.options.maintenance_pause);
                    }
                    Stage::Skip(SkipReason::Exhausted {
                        attempts,
                        last_error,
                    }) => {
                        report.skipped += 1;
                        warn!(attempts, link = %stub.link, error = %last_error, "skipping article");
                    }
                    Stage::Fatal(e) => return Err(e),
                }
                if let Some(cb) = progress {
                    cb(
                        (report.persisted + report.skipped) as u32,
                        report.discovered as u32,
                    );
                }
            }
        }

        info!(
            persisted = report.persisted,
            skipped = report.skipped,
            pages = report.listing_pages,
            output = %self.sink.path().display(),
            "run finished"
        );
        debug!(visited = walk.visited().len(), "listing pages visited");
        Ok(report)
    }
}
