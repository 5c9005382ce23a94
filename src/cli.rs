//! CLI parsing and orchestration. Merges flags with the config file, wires the fetch
//! strategies, runs the pipeline, and maps the outcome to an exit code.

use crate::config::{self, Config};
use crate::pipeline::{Mode, Pipeline, PipelineOptions, RunOutcome};
use crate::scraper::listing::{DEFAULT_LATEST_LIMIT, DEFAULT_PER_PAGE_TAIL};
use crate::scraper::{
    build_coordinator, resolve_seed, ArticleExtractor, BrowserFamily, BrowserOptions,
    BrowserSignature, BrowserStrategy, BypassClient, ChallengePolicy, FetchMode, HttpStrategy,
    Platform, ScraperError, DEFAULT_LISTING_URL,
};
use crate::session::SessionCache;
use crate::sink::CsvSink;
use clap::Parser;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const DEFAULT_OUTPUT: &str = "articles.csv";
const DEFAULT_SESSION_CACHE: &str = "cookies.json";
const DEFAULT_DELAY_SECS: u64 = 2;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ARTICLE_ATTEMPTS: u32 = 3;
const DEFAULT_ARTICLE_RETRY_SECS: u64 = 5;
const DEFAULT_MAINTENANCE_PAUSE_SECS: u64 = 300;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Scraper(#[from] ScraperError),

    #[error("Saved {persisted} article(s); {skipped} skipped")]
    Partial { persisted: usize, skipped: usize },

    #[error("No articles saved; all {skipped} found were skipped")]
    NothingSaved { skipped: usize },
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Scraper(ScraperError::Persistence { .. }) => 3,
            CliRunError::Scraper(_) | CliRunError::NothingSaved { .. } => 2,
            CliRunError::Partial { .. } => 4,
        }
    }
}

/// Crawl style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Latest,
    Paginate,
}

#[derive(Parser, Debug)]
#[command(name = "fxscrape")]
#[command(about = "Scrape investing.com forex news into a CSV file")]
#[command(
    after_help = "Config file keys (output, session_cache, listing_url, user_agent, browser_family, platform, mobile, request_delay_secs, timeout_secs, article_attempts, article_retry_secs, challenge_attempts, challenge_timeout_secs, maintenance_pause_secs, headless, fetch, mode, limit, per_page) are read from ./fxscrape.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    /// Listing page to start from. Default: https://www.investing.com/news/forex-news
    #[arg(long)]
    pub url: Option<String>,

    /// CSV output path. Appended to if it exists. Default: articles.csv
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Cookie cache path. Default: cookies.json
    #[arg(long)]
    pub cookies: Option<PathBuf>,

    /// latest (newest articles on the first page) or paginate (walk every page).
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<ModeKind>,

    /// Number of articles in latest mode (default 5).
    #[arg(long)]
    pub limit: Option<usize>,

    /// Articles kept from the end of each listing page in paginate mode (default 35).
    #[arg(long)]
    pub per_page: Option<usize>,

    /// http, browser, or chain (HTTP first, browser fallback; default).
    #[arg(long, value_parser = parse_fetch)]
    pub fetch: Option<FetchMode>,

    /// Show the browser window.
    #[arg(long)]
    pub headful: bool,

    /// HTTP and browser User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between HTTP requests in seconds (overrides config; default 2).
    #[arg(long)]
    pub delay: Option<u64>,

    /// HTTP request timeout in seconds (overrides config; default 60).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Warnings and errors only; no progress bar.
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and the full error chain.
    #[arg(long)]
    pub verbose: bool,

    /// Print the resolved settings without fetching anything.
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_mode(s: &str) -> Result<ModeKind, String> {
    match s.trim().to_lowercase().as_str() {
        "latest" => Ok(ModeKind::Latest),
        "paginate" | "all" => Ok(ModeKind::Paginate),
        _ => Err(format!(
            "Invalid --mode value: '{}'. Use latest or paginate.",
            s
        )),
    }
}

fn parse_fetch(s: &str) -> Result<FetchMode, String> {
    FetchMode::parse(s).ok_or_else(|| {
        format!(
            "Invalid --fetch value: '{}'. Use http, browser, or chain.",
            s
        )
    })
}

/// Effective settings after merging flags, config, and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub seed: String,
    pub output: PathBuf,
    pub session_cache: PathBuf,
    pub mode: Mode,
    pub fetch: FetchMode,
    pub headless: bool,
    pub user_agent: Option<String>,
    /// Browser the HTTP client presents as.
    pub signature: BrowserSignature,
    pub delay_secs: u64,
    pub timeout_secs: u64,
    pub article_attempts: u32,
    pub article_retry: Duration,
    pub challenge: ChallengePolicy,
    pub maintenance_pause: Duration,
}

impl Settings {
    /// Flags win over config, config over defaults. Invalid config values are input errors.
    pub fn resolve(args: &Args, config: Option<&Config>) -> Result<Self, CliRunError> {
        let cfg = |f: fn(&Config) -> Option<u64>| config.and_then(f);

        let mode_kind = match args.mode {
            Some(m) => m,
            None => match config.and_then(|c| c.mode.as_deref()) {
                Some(s) => parse_mode(s).map_err(|e| CliRunError::InvalidInput(format!("config: {}", e)))?,
                None => ModeKind::Latest,
            },
        };
        let mode = match mode_kind {
            ModeKind::Latest => Mode::Latest {
                limit: args
                    .limit
                    .or_else(|| config.and_then(|c| c.limit))
                    .unwrap_or(DEFAULT_LATEST_LIMIT),
            },
            ModeKind::Paginate => Mode::Paginate {
                per_page_tail: args
                    .per_page
                    .or_else(|| config.and_then(|c| c.per_page))
                    .unwrap_or(DEFAULT_PER_PAGE_TAIL),
            },
        };

        let fetch = match args.fetch {
            Some(f) => f,
            None => match config.and_then(|c| c.fetch.as_deref()) {
                Some(s) => parse_fetch(s).map_err(|e| CliRunError::InvalidInput(format!("config: {}", e)))?,
                None => FetchMode::default(),
            },
        };

        let default_signature = BrowserSignature::default();
        let family = match config.and_then(|c| c.browser_family.as_deref()) {
            Some(s) => BrowserFamily::parse(s).ok_or_else(|| {
                CliRunError::InvalidInput(format!(
                    "config: invalid browser_family '{}'. Use chrome or firefox.",
                    s
                ))
            })?,
            None => default_signature.family,
        };
        let platform = match config.and_then(|c| c.platform.as_deref()) {
            Some(s) => Platform::parse(s).ok_or_else(|| {
                CliRunError::InvalidInput(format!(
                    "config: invalid platform '{}'. Use windows, darwin, or linux.",
                    s
                ))
            })?,
            None => default_signature.platform,
        };
        let signature = BrowserSignature {
            family,
            platform,
            mobile: config
                .and_then(|c| c.mobile)
                .unwrap_or(default_signature.mobile),
        };

        let defaults = ChallengePolicy::default();
        let challenge = ChallengePolicy {
            attempts: config
                .and_then(|c| c.challenge_attempts)
                .unwrap_or(defaults.attempts),
            probe_timeout: cfg(|c| c.challenge_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.probe_timeout),
            ..defaults
        };

        Ok(Self {
            seed: args
                .url
                .clone()
                .or_else(|| config.and_then(|c| c.listing_url.clone()))
                .unwrap_or_else(|| DEFAULT_LISTING_URL.to_string()),
            output: args
                .output
                .clone()
                .or_else(|| config.and_then(|c| c.output.clone()))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            session_cache: args
                .cookies
                .clone()
                .or_else(|| config.and_then(|c| c.session_cache.clone()))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_CACHE)),
            mode,
            fetch,
            headless: !args.headful && config.and_then(|c| c.headless).unwrap_or(true),
            user_agent: args
                .user_agent
                .clone()
                .or_else(|| config.and_then(|c| c.user_agent.clone())),
            signature,
            delay_secs: args
                .delay
                .or_else(|| cfg(|c| c.request_delay_secs))
                .unwrap_or(DEFAULT_DELAY_SECS),
            timeout_secs: args
                .timeout
                .or_else(|| cfg(|c| c.timeout_secs))
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            article_attempts: config
                .and_then(|c| c.article_attempts)
                .unwrap_or(DEFAULT_ARTICLE_ATTEMPTS)
                .max(1),
            article_retry: Duration::from_secs(
                cfg(|c| c.article_retry_secs).unwrap_or(DEFAULT_ARTICLE_RETRY_SECS),
            ),
            challenge,
            maintenance_pause: Duration::from_secs(
                cfg(|c| c.maintenance_pause_secs).unwrap_or(DEFAULT_MAINTENANCE_PAUSE_SECS),
            ),
        })
    }
}

/// Output parent directory must already exist.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

fn progress_bar(total: u64) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new(total);
    if let Ok(style) =
        indicatif::ProgressStyle::default_bar().template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
    {
        bar.set_style(
            style
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
    }
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Entry point for the CLI. Returns Ok(()) on full success; Err with exit code and message otherwise.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let settings = Settings::resolve(args, config.as_ref())?;

    let seed = resolve_seed(&settings.seed).map_err(|e| match &e {
        ScraperError::InvalidUrl { input, reason } => CliRunError::InvalidInput(format!(
            "Expected a listing URL. Example: {} Invalid: {}: {}",
            DEFAULT_LISTING_URL, input, reason
        )),
        _ => CliRunError::Scraper(e),
    })?;
    validate_output_path(&settings.output)?;

    if args.dry_run {
        eprintln!("Listing: {}", seed);
        eprintln!("Mode: {:?}", settings.mode);
        eprintln!("Fetch: {:?}", settings.fetch);
        eprintln!("Signature: {:?}", settings.signature);
        eprintln!("Output: {}", settings.output.display());
        eprintln!("Session cache: {}", settings.session_cache.display());
        return Ok(());
    }

    let cache = SessionCache::new(&settings.session_cache);
    let mut builder = BypassClient::builder()
        .signature(settings.signature)
        .delay_secs(settings.delay_secs)
        .timeout_secs(settings.timeout_secs);
    if let Some(ua) = &settings.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    if let Some(tokens) = cache.load() {
        info!(
            path = %cache.path().display(),
            count = tokens.len(),
            "restored session cookies"
        );
        builder = builder.session(seed.clone(), tokens);
    }
    let client = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    let browser = BrowserStrategy::new(BrowserOptions {
        headless: settings.headless,
        user_agent: settings.user_agent.clone(),
        challenge: settings.challenge,
        ..BrowserOptions::default()
    });
    let fetcher = build_coordinator(
        settings.fetch,
        HttpStrategy::new(client, Some(cache)),
        browser,
    );
    let sink = CsvSink::open(&settings.output)?;
    let mut options = PipelineOptions::new(seed.as_str(), settings.mode);
    options.maintenance_pause = settings.maintenance_pause;
    let mut pipeline = Pipeline::new(
        fetcher,
        ArticleExtractor::new(settings.article_attempts, settings.article_retry),
        sink,
        options,
    );

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u32, total: u32| {
        if total == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| progress_bar(total as u64));
        pb.set_length(total as u64);
        pb.set_position(n as u64);
        pb.set_message(format!("Article {}/{}", n, total));
    };
    let progress: Option<&dyn Fn(u32, u32)> = if args.quiet { None } else { Some(&progress_cb) };

    let result = pipeline.run(progress);

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }
    let report = result?;

    if !args.quiet {
        eprintln!(
            "Wrote {} article(s) to {}",
            report.persisted,
            settings.output.display()
        );
    }
    match report.outcome() {
        RunOutcome::Success => Ok(()),
        RunOutcome::Partial => Err(CliRunError::Partial {
            persisted: report.persisted,
            skipped: report.skipped,
        }),
        RunOutcome::Failed => Err(CliRunError::NothingSaved {
            skipped: report.skipped,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["fxscrape"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_without_flags_or_config() -> Result<(), CliRunError> {
        let s = Settings::resolve(&args(&[]), None)?;
        assert_eq!(s.seed, DEFAULT_LISTING_URL);
        assert_eq!(s.output, PathBuf::from("articles.csv"));
        assert_eq!(s.session_cache, PathBuf::from("cookies.json"));
        assert_eq!(s.mode, Mode::Latest { limit: 5 });
        assert_eq!(s.fetch, FetchMode::Chain);
        assert!(s.headless);
        assert_eq!(s.delay_secs, 2);
        assert_eq!(s.timeout_secs, 60);
        assert_eq!(s.article_attempts, 3);
        assert_eq!(s.article_retry, Duration::from_secs(5));
        assert_eq!(s.challenge, ChallengePolicy::default());
        assert_eq!(s.signature, BrowserSignature::default());
        assert_eq!(s.maintenance_pause, Duration::from_secs(300));
        Ok(())
    }

    #[test]
    fn flags_override_config() -> Result<(), Box<dyn std::error::Error>> {
        let config: Config = toml::from_str(
            r#"
            output = "from-config.csv"
            mode = "latest"
            limit = 8
            fetch = "http"
            request_delay_secs = 9
            headless = true
            "#,
        )?;
        let a = args(&[
            "--output",
            "cli.csv",
            "--mode",
            "paginate",
            "--per-page",
            "10",
            "--fetch",
            "browser",
            "--headful",
        ]);
        let s = Settings::resolve(&a, Some(&config))?;
        assert_eq!(s.output, PathBuf::from("cli.csv"));
        assert_eq!(s.mode, Mode::Paginate { per_page_tail: 10 });
        assert_eq!(s.fetch, FetchMode::Browser);
        assert!(!s.headless);
        assert_eq!(s.delay_secs, 9);
        Ok(())
    }

    #[test]
    fn config_fills_unset_flags() -> Result<(), Box<dyn std::error::Error>> {
        let config: Config = toml::from_str(
            r#"
            listing_url = "https://www.investing.com/news/economy"
            mode = "paginate"
            challenge_attempts = 5
            challenge_timeout_secs = 12
            maintenance_pause_secs = 30
            article_attempts = 0
            "#,
        )?;
        let s = Settings::resolve(&args(&[]), Some(&config))?;
        assert_eq!(s.seed, "https://www.investing.com/news/economy");
        assert_eq!(s.mode, Mode::Paginate { per_page_tail: 35 });
        assert_eq!(s.challenge.attempts, 5);
        assert_eq!(s.challenge.probe_timeout, Duration::from_secs(12));
        assert_eq!(s.challenge.backoff, ChallengePolicy::default().backoff);
        assert_eq!(s.maintenance_pause, Duration::from_secs(30));
        assert_eq!(s.article_attempts, 1);
        Ok(())
    }

    #[test]
    fn config_selects_browser_signature() -> Result<(), Box<dyn std::error::Error>> {
        let config: Config = toml::from_str(
            r#"
            browser_family = "firefox"
            platform = "darwin"
            mobile = false
            "#,
        )?;
        let s = Settings::resolve(&args(&[]), Some(&config))?;
        assert_eq!(
            s.signature,
            BrowserSignature {
                family: BrowserFamily::Firefox,
                platform: Platform::Darwin,
                mobile: false,
            }
        );

        let bad: Config = toml::from_str(r#"platform = "plan9""#)?;
        assert!(matches!(
            Settings::resolve(&args(&[]), Some(&bad)),
            Err(CliRunError::InvalidInput(_))
        ));
        Ok(())
    }

    #[test]
    fn invalid_config_mode_is_input_error() -> Result<(), Box<dyn std::error::Error>> {
        let config: Config = toml::from_str(r#"fetch = "curl""#)?;
        let result = Settings::resolve(&args(&[]), Some(&config));
        assert!(matches!(result, Err(CliRunError::InvalidInput(_))));
        Ok(())
    }

    #[test]
    fn parse_mode_values() {
        assert_eq!(parse_mode("latest").unwrap(), ModeKind::Latest);
        assert_eq!(parse_mode("PAGINATE").unwrap(), ModeKind::Paginate);
        assert_eq!(parse_mode("all").unwrap(), ModeKind::Paginate);
        assert!(parse_mode("newest").is_err());
    }

    #[test]
    fn parse_fetch_values() {
        assert_eq!(parse_fetch("http").unwrap(), FetchMode::Http);
        assert!(parse_fetch("wget").is_err());
    }

    #[test]
    fn validate_output_path_parent_missing() {
        let path = PathBuf::from("/nonexistent_dir_fxscrape_xyz/articles.csv");
        match validate_output_path(&path) {
            Err(CliRunError::InvalidInput(msg)) => {
                assert!(msg.contains("parent directory does not exist"))
            }
            other => panic!("expected InvalidInput, got {:?}", other),
        }
        assert!(validate_output_path(Path::new("articles.csv")).is_ok());
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(CliRunError::Scraper(ScraperError::NoStrategy).exit_code(), 2);
        let persistence = ScraperError::Persistence {
            path: PathBuf::from("articles.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into(),
        };
        assert_eq!(CliRunError::Scraper(persistence).exit_code(), 3);
        assert_eq!(
            CliRunError::Partial {
                persisted: 3,
                skipped: 1
            }
            .exit_code(),
            4
        );
        assert_eq!(CliRunError::NothingSaved { skipped: 2 }.exit_code(), 2);
    }
}
