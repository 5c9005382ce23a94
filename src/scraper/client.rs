//! Blocking HTTP client that presents a desktop-browser signature, keeps a cookie jar
//! that can be seeded from and exported to [SessionTokens], and enforces a delay
//! between requests.

use crate::session::SessionTokens;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Url;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_DELAY_SECS: u64 = 2;
const MAX_REDIRECTS: usize = 10;

/// Browser family the client impersonates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFamily {
    Chrome,
    Firefox,
}

/// Operating system the client impersonates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Darwin,
    Linux,
}

/// Browser family, platform, and device class used for User-Agent and client hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserSignature {
    pub family: BrowserFamily,
    pub platform: Platform,
    pub mobile: bool,
}

impl BrowserFamily {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" => Some(BrowserFamily::Chrome),
            "firefox" => Some(BrowserFamily::Firefox),
            _ => None,
        }
    }
}

impl Platform {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" => Some(Platform::Windows),
            "darwin" | "macos" => Some(Platform::Darwin),
            "linux" => Some(Platform::Linux),
            _ => None,
        }
    }
}

impl Default for BrowserSignature {
    fn default() -> Self {
        Self {
            family: BrowserFamily::Chrome,
            platform: Platform::Windows,
            mobile: false,
        }
    }
}

impl BrowserSignature {
    pub fn user_agent(&self) -> String {
        let os = match (self.platform, self.mobile) {
            (Platform::Windows, _) => "Windows NT 10.0; Win64; x64",
            (Platform::Darwin, false) => "Macintosh; Intel Mac OS X 10_15_7",
            (Platform::Darwin, true) => "iPhone; CPU iPhone OS 17_4 like Mac OS X",
            (Platform::Linux, false) => "X11; Linux x86_64",
            (Platform::Linux, true) => "Linux; Android 14; Pixel 8",
        };
        match self.family {
            BrowserFamily::Chrome => {
                let mobile = if self.mobile { " Mobile" } else { "" };
                format!(
                    "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0{} Safari/537.36",
                    os, mobile
                )
            }
            BrowserFamily::Firefox => {
                format!("Mozilla/5.0 ({}; rv:121.0) Gecko/20100101 Firefox/121.0", os)
            }
        }
    }

    /// Default headers a real browser of this kind sends with a navigation request.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(
            header::UPGRADE_INSECURE_REQUESTS,
            HeaderValue::from_static("1"),
        );
        if self.family == BrowserFamily::Chrome {
            let platform = match self.platform {
                Platform::Windows => "\"Windows\"",
                Platform::Darwin => "\"macOS\"",
                Platform::Linux => "\"Linux\"",
            };
            headers.insert(
                "sec-ch-ua",
                HeaderValue::from_static(
                    "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
                ),
            );
            headers.insert(
                "sec-ch-ua-mobile",
                HeaderValue::from_static(if self.mobile { "?1" } else { "?0" }),
            );
            headers.insert("sec-ch-ua-platform", HeaderValue::from_static(platform));
        }
        headers
    }
}

/// Blocking HTTP client with a browser signature, shared cookie jar, and request delay.
#[derive(Debug)]
pub struct BypassClient {
    inner: reqwest::blocking::Client,
    jar: Arc<Jar>,
    delay: Duration,
    last_request: Option<Instant>,
}

impl BypassClient {
    /// Build a client with the default Chrome-on-Windows signature and no cookies.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> BypassClientBuilder {
        BypassClientBuilder::default()
    }

    /// Perform a GET request. Sleeps until the configured delay has passed since the last request.
    pub fn get(&mut self, url: &str) -> Result<reqwest::blocking::Response, reqwest::Error> {
        self.wait_delay();
        let result = self.inner.get(url).send();
        self.last_request = Some(Instant::now());
        result
    }

    /// Cookies the jar would send to `url`.
    pub fn tokens_for(&self, url: &Url) -> SessionTokens {
        self.jar
            .cookies(url)
            .and_then(|v| v.to_str().ok().map(SessionTokens::from_cookie_header))
            .unwrap_or_default()
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

/// Builder for BypassClient: signature, User-Agent override, delay, timeout, and seed cookies.
#[derive(Debug)]
pub struct BypassClientBuilder {
    signature: BrowserSignature,
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
    seed: Option<(Url, SessionTokens)>,
}

impl Default for BypassClientBuilder {
    fn default() -> Self {
        Self {
            signature: BrowserSignature::default(),
            user_agent: None,
            delay_secs: DEFAULT_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            seed: None,
        }
    }
}

impl BypassClientBuilder {
    pub fn signature(mut self, signature: BrowserSignature) -> Self {
        self.signature = signature;
        self
    }

    /// Override the User-Agent derived from the signature.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Delay between requests in seconds. Default 2.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Connect + read timeout in seconds. Default 60.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Pre-load cookies for `origin` (typically restored from the session cache).
    pub fn session(mut self, origin: Url, tokens: SessionTokens) -> Self {
        self.seed = Some((origin, tokens));
        self
    }

    pub fn build(self) -> Result<BypassClient, reqwest::Error> {
        let jar = Arc::new(Jar::default());
        if let Some((origin, tokens)) = &self.seed {
            for (name, value) in tokens.iter() {
                jar.add_cookie_str(&format!("{}={}; Path=/", name, value), origin);
            }
        }
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| self.signature.user_agent());
        let inner = reqwest::blocking::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(user_agent)
            .default_headers(self.signature.headers())
            .timeout(Duration::from_secs(self.timeout_secs))
            .connect_timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(BypassClient {
            inner,
            jar,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
        })
    }
}
