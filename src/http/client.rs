use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Method};
use url::Url;

use super::breaker::CircuitBreaker;
use super::throttle::Throttle;
use super::HttpError;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub custom_headers: HashMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 2,
            custom_headers: HashMap::new(),
        }
    }
}

/// A fully-read HTTP response. Bodies are decoded to text up front; every
/// detector oracle works on text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
    /// Final URL after any redirects.
    pub url: String,
}

impl HttpResponse {
    /// First value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of a header (Set-Cookie is the multi-valued case).
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok().map(|s| s.to_string()))
            .collect()
    }

    /// Headers rendered one per line, for evidence attachments.
    pub fn headers_text(&self) -> String {
        self.headers
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v.to_str().unwrap_or("<binary>")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// reqwest wrapper enforcing the egress policy: breaker check, throttle
/// slot, default browser-like headers, bounded redirects, retries with
/// linear backoff. Certificate validity is intentionally not enforced here;
/// scan targets routinely present self-signed or expired certificates and
/// the TLS detector reports on them instead.
pub struct HttpClient {
    redirecting: Client,
    direct: Client,
    throttle: Throttle,
    breaker: CircuitBreaker,
    max_retries: u32,
}

impl HttpClient {
    pub fn new(
        throttle: Throttle,
        breaker: CircuitBreaker,
        config: HttpConfig,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("User-Agent", HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert("Accept", HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(
            "Accept-Language",
            HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE),
        );
        for (name, value) in &config.custom_headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => {
                    headers.insert(n, v);
                }
                _ => tracing::warn!(header = %name, "skipping invalid custom header"),
            }
        }

        let build = |policy: reqwest::redirect::Policy| -> reqwest::Result<Client> {
            ClientBuilder::new()
                .default_headers(headers.clone())
                .timeout(config.timeout)
                .redirect(policy)
                .use_rustls_tls()
                .danger_accept_invalid_certs(true)
                .gzip(true)
                .brotli(true)
                .build()
        };

        Ok(Self {
            redirecting: build(reqwest::redirect::Policy::limited(5))?,
            direct: build(reqwest::redirect::Policy::none())?,
            throttle,
            breaker,
            max_retries: config.max_retries,
        })
    }

    /// Client with defaults and pacing disabled; for tests against local
    /// fixtures.
    pub fn unthrottled() -> anyhow::Result<Self> {
        Self::new(
            Throttle::none(),
            CircuitBreaker::default(),
            HttpConfig::default(),
        )
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.request(Method::GET, url, &[], None, true).await
    }

    /// GET without following redirects; used by oracles that inspect the
    /// Location header directly.
    pub async fn get_no_redirect(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.request(Method::GET, url, &[], None, false).await
    }

    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, HttpError> {
        self.request(Method::GET, url, headers, None, true).await
    }

    pub async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<HttpResponse, HttpError> {
        let body = {
            let mut ser = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in fields {
                ser.append_pair(k, v);
            }
            ser.finish()
        };
        self.request(
            Method::POST,
            url,
            &[],
            Some((body, "application/x-www-form-urlencoded".into())),
            true,
        )
        .await
    }

    /// POST a raw body with an explicit content type (XML and GraphQL
    /// probes).
    pub async fn post_body(
        &self,
        url: &str,
        body: &str,
        content_type: &str,
    ) -> Result<HttpResponse, HttpError> {
        self.request(
            Method::POST,
            url,
            &[],
            Some((body.to_string(), content_type.to_string())),
            true,
        )
        .await
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<(String, String)>,
        follow_redirects: bool,
    ) -> Result<HttpResponse, HttpError> {
        let parsed = Url::parse(url).map_err(|_| HttpError::InvalidUrl(url.to_string()))?;
        let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();

        if self.breaker.is_open(&host) {
            return Err(HttpError::BreakerOpen(host));
        }

        self.throttle.wait(&host).await;

        let client = if follow_redirects {
            &self.redirecting
        } else {
            &self.direct
        };

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            let mut req = client.request(method.clone(), parsed.clone());
            for (name, value) in headers {
                req = req.header(name.as_str(), value.as_str());
            }
            if let Some((payload, content_type)) = &body {
                req = req
                    .header(CONTENT_TYPE, content_type.as_str())
                    .body(payload.clone());
            }

            match req.send().await {
                Ok(resp) => {
                    // Any HTTP status counts as a live host.
                    self.breaker.record_success(&host);
                    let status = resp.status().as_u16();
                    let resp_headers = resp.headers().clone();
                    let final_url = resp.url().to_string();
                    let text = resp.text().await.map_err(|e| HttpError::Network {
                        url: url.to_string(),
                        attempts: attempt + 1,
                        source: e,
                    })?;
                    return Ok(HttpResponse {
                        status,
                        headers: resp_headers,
                        body: text,
                        url: final_url,
                    });
                }
                Err(e) => {
                    self.breaker.record_failure(&host);
                    tracing::debug!(url = %url, attempt, error = %e, "request failed");
                    last_err = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs((attempt + 1) as u64)).await;
                    }
                }
            }
        }

        Err(HttpError::Network {
            url: url.to_string(),
            attempts: self.max_retries + 1,
            source: last_err.expect("retry loop always records an error"),
        })
    }
}
