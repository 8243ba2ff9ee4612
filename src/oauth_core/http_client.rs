use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// HTTP methods the OAuth flows need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    GET,
    POST,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::GET => f.write_str("GET"),
            HttpMethod::POST => f.write_str("POST"),
        }
    }
}

/// HTTP request for executing a call.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method (GET, POST).
    pub method: HttpMethod,
    /// Target URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<Vec<u8>>,
    /// Optional timeout duration.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decodes an `application/x-www-form-urlencoded` body into pairs.
    pub fn form_params(&self) -> Vec<(String, String)> {
        match &self.body {
            Some(body) => url::form_urlencoded::parse(body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Value of one form field, if present.
    pub fn form_param(&self, name: &str) -> Option<String> {
        self.form_params().into_iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// HTTP response from executing a call.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Response with a JSON body and the matching content type.
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        HttpResponse {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: value.to_string().into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, with invalid UTF-8 replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Error type for HTTP client operations.
pub type HttpClientError = Box<dyn Error + Send + Sync>;

/// Generic HTTP client interface for OAuth flows.
///
/// Implementations must not follow redirects and must not retry on their own.
pub trait OAuthHttpClient: Send + Sync + Clone + 'static {
    /// Execute an HTTP request asynchronously.
    fn execute(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpClientError>> + Send + 'static>>;
}

#[derive(Debug, Clone)]
enum MockReply {
    Response(HttpResponse),
    Failure(String),
}

/// In-memory HTTP client stub for testing.
///
/// Replies are looked up by exact URL. Every executed request is recorded,
/// including the ones that end in a mocked failure.
#[derive(Clone, Default)]
pub struct InMemoryHttpClient {
    replies: Arc<DashMap<String, MockReply>>,
    default_response: Option<HttpResponse>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl InMemoryHttpClient {
    /// Creates a new in-memory HTTP client with no default response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory HTTP client with a default response on miss.
    pub fn with_default(response: HttpResponse) -> Self {
        Self { default_response: Some(response), ..Self::default() }
    }

    /// Sleeps this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Register a mock response for a specific URL.
    pub fn insert_response(&self, url: impl Into<String>, response: HttpResponse) {
        self.replies.insert(url.into(), MockReply::Response(response));
    }

    /// Make requests to `url` fail as if the connection broke.
    pub fn insert_failure(&self, url: impl Into<String>, message: impl Into<String>) {
        self.replies.insert(url.into(), MockReply::Failure(message.into()));
    }

    /// Snapshot of every request executed so far, oldest first.
    pub async fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl OAuthHttpClient for InMemoryHttpClient {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpClientError>> + Send + 'static>> {
        let replies = self.replies.clone();
        let default = self.default_response.clone();
        let delay = self.delay;
        let log = self.requests.clone();
        Box::pin(async move {
            let url = request.url.clone();
            log.lock().await.push(request);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let reply = replies.get(&url).map(|entry| entry.value().clone());
            let result: Result<HttpResponse, HttpClientError> = match reply {
                Some(MockReply::Response(resp)) => Ok(resp),
                Some(MockReply::Failure(msg)) => Err(msg.into()),
                None => default.ok_or_else(|| "no mock response for url".into()),
            };
            result
        })
    }
}

/// Transport backed by a shared, pooled `reqwest::Client`.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
    /// Builds a client that never follows redirects.
    pub fn new() -> Result<Self, HttpClientError> {
        let inner = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { inner })
    }

    /// Wraps an existing client. The caller is responsible for its redirect policy.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

#[cfg(feature = "reqwest")]
impl OAuthHttpClient for ReqwestHttpClient {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpClientError>> + Send + 'static>> {
        Box::pin(send_reqwest(self.inner.clone(), request))
    }
}

#[cfg(feature = "reqwest")]
async fn send_reqwest(client: reqwest::Client, request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
    let method = match request.method {
        HttpMethod::GET => reqwest::Method::GET,
        HttpMethod::POST => reqwest::Method::POST,
    };
    let mut builder = client.request(method, &request.url);
    for (k, v) in &request.headers {
        builder = builder.header(k.as_str(), v.as_str());
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }
    if let Some(timeout) = request.timeout {
        builder = builder.timeout(timeout);
    }
    let resp = builder.send().await?;
    let status = resp.status().as_u16();
    let headers = resp
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();
    let body = resp.bytes().await?.to_vec();
    Ok(HttpResponse { status, headers, body })
}
