//! fxscrape: investing.com news scraper. HTTP first with a headless Chrome fallback,
//! output appended to CSV.

pub mod cli;
pub mod config;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod scraper;
pub mod session;
pub mod sink;

// Re-exports for CLI and consumers.
pub use model::{ArticleRecord, ArticleStub, RelatedInstrument};
pub use pipeline::{Mode, Pipeline, PipelineOptions, RunOutcome, RunReport};
pub use scraper::{
    ArticleExtractor, BypassClient, BypassClientBuilder, FetchCoordinator, FetchMode,
    ScraperError,
};
pub use session::{SessionCache, SessionTokens};
pub use sink::CsvSink;
