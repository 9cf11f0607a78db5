use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use std::ops::RangeInclusive;
use std::time::Duration;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use url::Url;
use crate::config::ProxyConfig;
use crate::delay_manager;
use crate::error::FetchError;
use crate::models::{Recency, WorkTypeFilter};

pub const SEARCH_ENDPOINT: &str = "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search";
/// Postings per result page; the offset advances by this much.
pub const PAGE_SIZE: u32 = 10;
pub const MAX_RATE_LIMIT_ATTEMPTS: u32 = 3;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:136.0) Gecko/20100101 Firefox/136.0";

/// One page-level search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub keyword: String,
    pub location: String,
    pub recency: Recency,
    pub work_type: WorkTypeFilter,
    pub offset: u32,
}

impl FetchRequest {
    pub fn page(&self) -> u32 {
        self.offset / PAGE_SIZE
    }

    pub fn next_page(&self) -> Self {
        FetchRequest {
            offset: self.offset + PAGE_SIZE,
            ..self.clone()
        }
    }

    pub fn url(&self) -> Result<Url, FetchError> {
        let offset = self.offset.to_string();
        let recency = self.recency.to_param();
        let params = [
            ("keywords", self.keyword.as_str()),
            ("location", self.location.as_str()),
            ("start", offset.as_str()),
            ("f_TPR", recency.as_str()),
            ("f_WT", self.work_type.to_param()),
        ];
        Ok(Url::parse_with_params(SEARCH_ENDPOINT, &params)?)
    }
}

/// Raw body of one successful page.
#[derive(Debug, Clone)]
pub struct ResponsePage {
    pub offset: u32,
    pub page: u32,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Proxy,
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Connection-level failure: nothing usable came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The network seam under the fetcher.
pub trait Transport {
    fn has_proxy(&self) -> bool;

    fn get(&self, route: Route, url: &Url) -> Result<RawResponse, TransportError>;
}

/// Blocking reqwest transport with an optional proxied client.
pub struct HttpTransport {
    direct: Client,
    proxied: Option<Client>,
}

impl HttpTransport {
    pub fn new(proxy: Option<&ProxyConfig>) -> Result<Self, FetchError> {
        let direct = Self::build_client(None)?;
        let proxied = match proxy {
            Some(proxy) => {
                info!("Using proxy {}", proxy.url);
                Some(Self::build_client(Some(proxy))?)
            }
            None => None,
        };
        Ok(HttpTransport { direct, proxied })
    }

    fn build_client(proxy: Option<&ProxyConfig>) -> Result<Client, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.linkedin.com/jobs"));
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .cookie_store(true);

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy.endpoint())
                .map_err(FetchError::ClientSetup)?
                .basic_auth(&proxy.username, &proxy.password);
            builder = builder.proxy(proxy);
        }

        builder.build().map_err(FetchError::ClientSetup)
    }
}

impl Transport for HttpTransport {
    fn has_proxy(&self) -> bool {
        self.proxied.is_some()
    }

    fn get(&self, route: Route, url: &Url) -> Result<RawResponse, TransportError> {
        let client = match route {
            Route::Direct => &self.direct,
            Route::Proxy => self
                .proxied
                .as_ref()
                .ok_or_else(|| TransportError("no proxy configured".to_string()))?,
        };
        let resp = client
            .get(url.clone())
            .send()
            .map_err(|e| TransportError(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| TransportError(e.to_string()))?;
        Ok(RawResponse { status, body })
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub page_delay_ms: RangeInclusive<u64>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            max_attempts: MAX_RATE_LIMIT_ATTEMPTS,
            backoff_base: Duration::from_secs(1),
            page_delay_ms: 1000..=2500,
        }
    }
}

impl FetchSettings {
    /// No sleeping at all. Used by tests.
    pub fn immediate() -> Self {
        FetchSettings {
            backoff_base: Duration::ZERO,
            page_delay_ms: 0..=0,
            ..FetchSettings::default()
        }
    }
}

/// Per-page request states.
///
/// `RateLimited` loops back to `Requesting` until the attempt ceiling,
/// `ProxyFailed` moves to a direct `Requesting` exactly once, and
/// `Success`/`BadResponse` end the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Requesting { route: Route, attempt: u32 },
    RateLimited { route: Route, attempt: u32 },
    ProxyFailed { reason: String, attempt: u32 },
    Success(String),
    BadResponse(String),
}

/// Maps one response (or transport failure) to the next page state.
pub fn classify(route: Route, attempt: u32, response: Result<RawResponse, TransportError>) -> PageState {
    let response = match response {
        Ok(response) => response,
        Err(e) if route == Route::Proxy => {
            return PageState::ProxyFailed { reason: e.to_string(), attempt }
        }
        Err(e) => return PageState::BadResponse(format!("request failed: {}", e)),
    };

    match response.status {
        429 => PageState::RateLimited { route, attempt },
        407 if route == Route::Proxy => PageState::ProxyFailed {
            reason: "proxy authentication required (407)".to_string(),
            attempt,
        },
        status if !(200..300).contains(&status) => {
            PageState::BadResponse(format!("HTTP status {}", status))
        }
        _ if response.body.trim().is_empty() => PageState::BadResponse("empty body".to_string()),
        _ if response.body.to_lowercase().contains("captcha") => {
            PageState::BadResponse("captcha challenge".to_string())
        }
        _ => PageState::Success(response.body),
    }
}

pub struct Fetcher<T: Transport = HttpTransport> {
    transport: T,
    settings: FetchSettings,
}

impl Fetcher<HttpTransport> {
    pub fn connect(proxy: Option<&ProxyConfig>) -> Result<Self, FetchError> {
        Ok(Fetcher::new(HttpTransport::new(proxy)?, FetchSettings::default()))
    }
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, settings: FetchSettings) -> Self {
        Fetcher { transport, settings }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn fetch(&self, request: &FetchRequest) -> Result<ResponsePage, FetchError> {
        let url = request.url()?;
        let offset = request.offset;
        let first_route = if self.transport.has_proxy() { Route::Proxy } else { Route::Direct };
        let mut state = PageState::Requesting { route: first_route, attempt: 1 };

        loop {
            state = match state {
                PageState::Requesting { route, attempt } => {
                    debug!("GET {} via {:?} (attempt {})", url, route, attempt);
                    classify(route, attempt, self.transport.get(route, &url))
                }
                PageState::RateLimited { route, attempt } => {
                    warn!("Rate limited at offset {} (attempt {}/{})", offset, attempt, self.settings.max_attempts);
                    if attempt >= self.settings.max_attempts {
                        return Err(FetchError::RateLimited { offset, attempts: attempt });
                    }
                    delay_manager::rate_limit_delay(self.settings.backoff_base, attempt);
                    PageState::Requesting { route, attempt: attempt + 1 }
                }
                PageState::ProxyFailed { reason, attempt } => {
                    let failure = FetchError::ProxyFailed { offset, reason };
                    warn!("{}; falling back to direct connection", failure);
                    PageState::Requesting { route: Route::Direct, attempt }
                }
                PageState::Success(body) => {
                    return Ok(ResponsePage {
                        offset,
                        page: request.page(),
                        body,
                        fetched_at: Utc::now(),
                    });
                }
                PageState::BadResponse(reason) => {
                    return Err(FetchError::BadResponse { offset, reason });
                }
            };
        }
    }

    /// Sleeps between two consecutive pages.
    pub fn pace(&self) {
        delay_manager::random_page_delay(&self.settings.page_delay_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Scripted {
        proxy: bool,
        replies: RefCell<VecDeque<Result<RawResponse, TransportError>>>,
        routes: RefCell<Vec<Route>>,
    }

    impl Scripted {
        fn new(proxy: bool, replies: Vec<Result<RawResponse, TransportError>>) -> Self {
            Scripted {
                proxy,
                replies: RefCell::new(replies.into()),
                routes: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for Scripted {
        fn has_proxy(&self) -> bool {
            self.proxy
        }

        fn get(&self, route: Route, _url: &Url) -> Result<RawResponse, TransportError> {
            self.routes.borrow_mut().push(route);
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError("script exhausted".into())))
        }
    }

    fn status(code: u16) -> Result<RawResponse, TransportError> {
        Ok(RawResponse { status: code, body: String::new() })
    }

    fn ok(body: &str) -> Result<RawResponse, TransportError> {
        Ok(RawResponse { status: 200, body: body.to_string() })
    }

    fn request() -> FetchRequest {
        FetchRequest {
            keyword: "rust developer".to_string(),
            location: "Paris, France".to_string(),
            recency: Recency::Hours(24),
            work_type: WorkTypeFilter::Remote,
            offset: 20,
        }
    }

    #[test]
    fn builds_provider_query() {
        let url = request().url().unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("keywords".to_string(), "rust developer".to_string()),
                ("location".to_string(), "Paris, France".to_string()),
                ("start".to_string(), "20".to_string()),
                ("f_TPR".to_string(), "r86400".to_string()),
                ("f_WT".to_string(), "2".to_string()),
            ]
        );
        assert_eq!(request().page(), 2);
        assert_eq!(request().next_page().offset, 30);
    }

    #[test]
    fn classify_covers_every_terminal_and_retry_state() {
        assert_eq!(
            classify(Route::Direct, 2, status(429)),
            PageState::RateLimited { route: Route::Direct, attempt: 2 }
        );
        assert!(matches!(classify(Route::Proxy, 1, status(407)), PageState::ProxyFailed { .. }));
        assert!(matches!(classify(Route::Direct, 1, status(407)), PageState::BadResponse(_)));
        assert!(matches!(classify(Route::Direct, 1, status(500)), PageState::BadResponse(_)));
        assert!(matches!(classify(Route::Direct, 1, ok("   ")), PageState::BadResponse(_)));
        assert!(matches!(classify(Route::Direct, 1, ok("<div>Please solve this CAPTCHA</div>")), PageState::BadResponse(_)));
        assert!(matches!(
            classify(Route::Proxy, 1, Err(TransportError("connection refused".into()))),
            PageState::ProxyFailed { .. }
        ));
        assert!(matches!(
            classify(Route::Direct, 1, Err(TransportError("connection refused".into()))),
            PageState::BadResponse(_)
        ));
        assert_eq!(classify(Route::Direct, 1, ok("<li>job</li>")), PageState::Success("<li>job</li>".to_string()));
    }

    #[test]
    fn three_rate_limits_give_up_after_exactly_three_attempts() {
        let fetcher = Fetcher::new(
            Scripted::new(false, vec![status(429), status(429), status(429), ok("<li/>")]),
            FetchSettings::immediate(),
        );
        match fetcher.fetch(&request()) {
            Err(FetchError::RateLimited { offset, attempts }) => {
                assert_eq!(offset, 20);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert_eq!(fetcher.transport().routes.borrow().len(), 3);
    }

    #[test]
    fn rate_limit_then_success_recovers() {
        let fetcher = Fetcher::new(
            Scripted::new(false, vec![status(429), ok("<li>job</li>")]),
            FetchSettings::immediate(),
        );
        let page = fetcher.fetch(&request()).unwrap();
        assert_eq!(page.body, "<li>job</li>");
        assert_eq!(page.page, 2);
    }

    #[test]
    fn proxy_failure_falls_back_to_direct_once() {
        let fetcher = Fetcher::new(
            Scripted::new(true, vec![Err(TransportError("proxy refused".into())), ok("<li>job</li>")]),
            FetchSettings::immediate(),
        );
        assert!(fetcher.fetch(&request()).is_ok());
        assert_eq!(*fetcher.transport().routes.borrow(), vec![Route::Proxy, Route::Direct]);
    }

    #[test]
    fn direct_failure_after_fallback_is_bad_response() {
        let fetcher = Fetcher::new(
            Scripted::new(
                true,
                vec![
                    Err(TransportError("proxy refused".into())),
                    Err(TransportError("dns failure".into())),
                ],
            ),
            FetchSettings::immediate(),
        );
        assert!(matches!(fetcher.fetch(&request()), Err(FetchError::BadResponse { offset: 20, .. })));
        assert_eq!(*fetcher.transport().routes.borrow(), vec![Route::Proxy, Route::Direct]);
    }

    #[test]
    fn rate_limit_attempts_survive_proxy_fallback() {
        let fetcher = Fetcher::new(
            Scripted::new(
                true,
                vec![status(429), status(407), status(429), status(429)],
            ),
            FetchSettings::immediate(),
        );
        assert!(matches!(
            fetcher.fetch(&request()),
            Err(FetchError::RateLimited { attempts: 3, .. })
        ));
        assert_eq!(
            *fetcher.transport().routes.borrow(),
            vec![Route::Proxy, Route::Proxy, Route::Direct, Route::Direct]
        );
    }
}
