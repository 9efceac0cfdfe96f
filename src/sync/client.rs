use std::sync::Arc;

use url::Url;

use crate::catalog::ReportDescriptor;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::{HttpError, HttpRequest, HttpTransport, ReqwestTransport};
use crate::sync::rate_limit::{RequestRateLimiter, RetryPolicy};
use crate::sync::window::TimeWindow;

/// Longest response body excerpt kept in a rejection error.
const MAX_ERROR_BODY_CHARS: usize = 2000;

/// Pull API client for `{base}/export/{app_id}/{report}/{version}`.
///
/// Every attempt, retries included, waits on the shared rate limiter first.
/// Connection-level failures are retried per the [`RetryPolicy`]; any HTTP
/// status >= 400 is returned immediately as [`Error::RemoteRejection`].
pub struct ReportClient {
    transport: Arc<dyn HttpTransport>,
    limiter: RequestRateLimiter,
    retry: RetryPolicy,
    base_url: String,
    app_id: String,
    api_token: String,
    user_agent: Option<String>,
}

impl ReportClient {
    pub fn new(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        limiter: RequestRateLimiter,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry: config.retry_policy(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            api_token: config.api_token.clone(),
            user_agent: config.user_agent.clone(),
        }
    }

    /// Client over reqwest with the configured timeout and rate limit.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::with_timeout(config.request_timeout())
            .map_err(|e| Error::Config(e.to_string()))?;
        let limiter =
            RequestRateLimiter::new(config.max_requests_per_window, config.rate_limit_window());
        Ok(Self::new(config, Arc::new(transport), limiter))
    }

    /// Endpoint for a report, without query parameters.
    pub fn report_url(&self, report: &ReportDescriptor) -> Result<Url> {
        let raw = format!(
            "{}/export/{}/{}/{}",
            self.base_url, self.app_id, report.report_id, report.version
        );
        Url::parse(&raw).map_err(|e| Error::Config(format!("invalid report url '{raw}': {e}")))
    }

    pub fn request_url(
        &self,
        report: &ReportDescriptor,
        window: &TimeWindow,
        retargeting: bool,
    ) -> Result<Url> {
        let fmt = report.category.query_format();
        let mut url = self.report_url(report)?;
        url.query_pairs_mut()
            .append_pair("from", &window.from.format(fmt).to_string())
            .append_pair("to", &window.to.format(fmt).to_string())
            .append_pair("api_token", &self.api_token)
            .append_pair("reattr", if retargeting { "true" } else { "false" });
        Ok(url)
    }

    /// Fetch one window of a report and return the raw response body.
    pub async fn fetch(
        &self,
        report: &ReportDescriptor,
        window: &TimeWindow,
        retargeting: bool,
    ) -> Result<Vec<u8>> {
        let endpoint = self.report_url(report)?.to_string();
        let url = self.request_url(report, window, retargeting)?;
        let fmt = report.category.query_format();

        let mut headers = Vec::new();
        if let Some(ua) = &self.user_agent {
            headers.push(("User-Agent".to_string(), ua.clone()));
        }
        let request = HttpRequest {
            url: url.to_string(),
            headers,
        };

        log::info!(
            "GET {endpoint} from={} to={} reattr={retargeting}",
            window.from.format(fmt),
            window.to.format(fmt)
        );

        let transport = &self.transport;
        let limiter = &self.limiter;
        let response = self
            .retry
            .run(HttpError::is_transient, move || {
                let request = request.clone();
                async move {
                    limiter.acquire().await;
                    transport.get(request).await
                }
            })
            .await
            .map_err(|failure| {
                log::error!(
                    "GET {endpoint} failed after {} attempts: {}",
                    failure.attempts,
                    failure.error
                );
                Error::Transport {
                    url: endpoint.clone(),
                    attempts: failure.attempts,
                    message: failure.error.to_string(),
                }
            })?;

        if response.is_error() {
            let body: String = response.text().chars().take(MAX_ERROR_BODY_CHARS).collect();
            log::error!("GET {endpoint} status={} body={body}", response.status);
            return Err(Error::RemoteRejection {
                url: endpoint,
                status: response.status,
                body,
            });
        }

        log::debug!("GET {endpoint} status={} bytes={}", response.status, response.body.len());
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::http::MockTransport;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::time::Instant;

    fn window() -> TimeWindow {
        TimeWindow {
            from: Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap(),
            to: Utc.with_ymd_and_hms(2024, 1, 6, 12, 30, 0).unwrap(),
        }
    }

    fn client_with(transport: &MockTransport, config: &Config) -> ReportClient {
        ReportClient::new(
            config,
            Arc::new(transport.clone()),
            RequestRateLimiter::new(100, Duration::from_secs(60)),
        )
    }

    fn query(url: &str) -> HashMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn test_raw_request_url() {
        let transport = MockTransport::new();
        let client = client_with(&transport, &Config::new("secret", "id123"));
        let report = catalog::report("installs_report").unwrap();

        let url = client.request_url(report, &window(), true).unwrap();
        assert_eq!(url.path(), "/export/id123/installs_report/v5");
        let q = query(url.as_str());
        assert_eq!(q["from"], "2024-01-01 00:05");
        assert_eq!(q["to"], "2024-01-06 12:30");
        assert_eq!(q["api_token"], "secret");
        assert_eq!(q["reattr"], "true");
    }

    #[test]
    fn test_daily_request_uses_day_precision() {
        let transport = MockTransport::new();
        let client = client_with(&transport, &Config::new("secret", "id123"));
        let report = catalog::report("partners_by_date_report").unwrap();

        let q = query(client.request_url(report, &window(), false).unwrap().as_str());
        assert_eq!(q["from"], "2024-01-01");
        assert_eq!(q["to"], "2024-01-06");
        assert_eq!(q["reattr"], "false");
    }

    #[test]
    fn test_trailing_slash_in_base_url() {
        let transport = MockTransport::new();
        let mut config = Config::new("t", "app");
        config.base_url = "http://localhost:8080/".into();
        let client = client_with(&transport, &config);
        let report = catalog::report("installs_report").unwrap();
        assert_eq!(
            client.report_url(report).unwrap().as_str(),
            "http://localhost:8080/export/app/installs_report/v5"
        );
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_sends_user_agent() {
        let transport = MockTransport::new();
        transport.push_response(200, "h1,h2\na,b\n");
        let mut config = Config::new("t", "app");
        config.user_agent = Some("extractor/1.0".into());
        let client = client_with(&transport, &config);
        let report = catalog::report("installs_report").unwrap();

        let body = client.fetch(report, &window(), false).await.unwrap();
        assert_eq!(body, b"h1,h2\na,b\n");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].headers,
            vec![("User-Agent".to_string(), "extractor/1.0".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_retries_transient_failures() {
        let transport = MockTransport::new();
        transport.push_error(HttpError::Connect("refused".into()));
        transport.push_error(HttpError::Timeout("slow".into()));
        transport.push_response(200, "h\n");
        let client = client_with(&transport, &Config::new("t", "app"));
        let report = catalog::report("installs_report").unwrap();

        let start = Instant::now();
        client.fetch(report, &window(), false).await.unwrap();
        assert_eq!(transport.requests().len(), 3);
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_gives_up_after_five_attempts() {
        let transport = MockTransport::new();
        for _ in 0..6 {
            transport.push_error(HttpError::Connect("refused".into()));
        }
        let client = client_with(&transport, &Config::new("t", "app"));
        let report = catalog::report("installs_report").unwrap();

        let err = client.fetch(report, &window(), false).await.unwrap_err();
        match err {
            Error::Transport { attempts, url, .. } => {
                assert_eq!(attempts, 5);
                assert!(!url.contains("api_token"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.requests().len(), 5);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        for status in [401u16, 403, 404, 500] {
            let transport = MockTransport::new();
            transport.push_response(status, "bad token");
            transport.push_response(200, "h\n");
            let client = client_with(&transport, &Config::new("t", "app"));
            let report = catalog::report("installs_report").unwrap();

            let err = client.fetch(report, &window(), false).await.unwrap_err();
            match err {
                Error::RemoteRejection { status: s, body, .. } => {
                    assert_eq!(s, status);
                    assert_eq!(body, "bad token");
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(transport.requests().len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_share_rate_limit() {
        let transport = MockTransport::new();
        for _ in 0..3 {
            transport.push_response(200, "h\n");
        }
        let client = ReportClient::new(
            &Config::new("t", "app"),
            Arc::new(transport.clone()),
            RequestRateLimiter::new(2, Duration::from_secs(60)),
        );
        let installs = catalog::report("installs_report").unwrap();
        let uninstalls = catalog::report("uninstall_events_report").unwrap();

        let start = Instant::now();
        client.fetch(installs, &window(), false).await.unwrap();
        client.fetch(uninstalls, &window(), false).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        client.fetch(installs, &window(), true).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(60));
    }
}
