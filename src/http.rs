//! HTTP transport boundary.
//!
//! The report client only ever issues GETs through [`HttpTransport`], so tests
//! can swap the network for an in-memory script.

use async_trait::async_trait;
use thiserror::Error;

/// HTTP headers represented as key/value pairs.
pub type HttpHeaders = Vec<(String, String)>;

/// A GET request, fully resolved (query string included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HttpHeaders,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Connection-level failure: nothing usable came back from the server.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connection error: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("http transport error: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl HttpError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, HttpError::InvalidRequest(_))
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: std::time::Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

fn classify(e: reqwest::Error) -> HttpError {
    if e.is_builder() {
        HttpError::InvalidRequest(e.to_string())
    } else if e.is_timeout() {
        HttpError::Timeout(e.to_string())
    } else if e.is_connect() {
        HttpError::Connect(e.to_string())
    } else {
        HttpError::Transport(e.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self.client.get(&request.url);
        for (k, v) in request.headers {
            builder = builder.header(&k, &v);
        }

        let resp = builder.send().await.map_err(classify)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(classify)?.to_vec();

        Ok(HttpResponse { status, body })
    }
}

// ---------- Test-only mock transport ----------

#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// Scripted transport: replies are handed out in FIFO order regardless of URL.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[cfg(test)]
#[derive(Default)]
struct MockTransportInner {
    replies: VecDeque<Result<HttpResponse, HttpError>>,
    requests: Vec<HttpRequest>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, status: u16, body: impl Into<Vec<u8>>) {
        self.push(Ok(HttpResponse {
            status,
            body: body.into(),
        }));
    }

    pub fn push_error(&self, error: HttpError) {
        self.push(Err(error));
    }

    fn push(&self, reply: Result<HttpResponse, HttpError>) {
        self.inner
            .lock()
            .expect("mock transport lock should not be poisoned")
            .replies
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner
            .lock()
            .expect("mock transport lock should not be poisoned")
            .requests
            .clone()
    }
}

#[cfg(test)]
#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        let url = request.url.clone();
        inner.requests.push(request);
        inner
            .replies
            .pop_front()
            .unwrap_or_else(|| Err(HttpError::Transport(format!("no mock reply for {url}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> HttpRequest {
        HttpRequest {
            url: url.to_string(),
            headers: Vec::new(),
        }
    }

    #[test]
    fn test_response_helpers() {
        let ok = HttpResponse {
            status: 200,
            body: b"a,b\n".to_vec(),
        };
        assert!(!ok.is_error());
        assert_eq!(ok.text(), "a,b\n");

        let rejected = HttpResponse {
            status: 403,
            body: Vec::new(),
        };
        assert!(rejected.is_error());
    }

    #[tokio::test]
    async fn test_mock_transport_replays_in_order_and_records() {
        let transport = MockTransport::new();
        transport.push_error(HttpError::Connect("refused".into()));
        transport.push_response(200, "h\nv\n");

        assert!(matches!(
            transport.get(request("https://example.com/a")).await,
            Err(HttpError::Connect(_))
        ));
        let resp = transport.get(request("https://example.com/b")).await.unwrap();
        assert_eq!(resp.status, 200);

        let urls: Vec<_> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[tokio::test]
    async fn test_mock_transport_errors_when_script_exhausted() {
        let transport = MockTransport::new();
        let err = transport.get(request("https://example.com/x")).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport(msg) if msg.contains("example.com/x")));
    }

    #[tokio::test]
    async fn test_reqwest_transport_reports_invalid_url() {
        let transport = ReqwestTransport::new(reqwest::Client::new());
        let err = transport.get(request("not a url")).await.unwrap_err();
        assert!(matches!(err, HttpError::InvalidRequest(_)));
        assert!(!err.is_transient());
    }
}
