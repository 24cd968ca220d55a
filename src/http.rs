use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderValue, LAST_MODIFIED, USER_AGENT};

use crate::error::EdgeError;

/// Metadata a remote exposes about a file without transferring it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMeta {
    pub content_length: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

pub trait HttpTransport: Send + Sync {
    fn get_text(&self, url: &str) -> Result<String, EdgeError>;
    fn head(&self, url: &str) -> Result<RemoteMeta, EdgeError>;
    /// Streams the body to `destination` and returns the number of bytes written.
    fn download(&self, url: &str, destination: &Path) -> Result<u64, EdgeError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, EdgeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-edges/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| EdgeError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| EdgeError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, EdgeError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .map(|body| body.chars().take(200).collect())
            .unwrap_or_else(|_| "request failed".to_string());
        Err(EdgeError::HttpStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, EdgeError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(status, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Self::handle_status(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(error = %err, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(EdgeError::Http(err.to_string()));
                }
            }
        }
    }
}

impl HttpTransport for ReqwestTransport {
    fn get_text(&self, url: &str) -> Result<String, EdgeError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        response
            .text()
            .map_err(|err| EdgeError::Http(err.to_string()))
    }

    fn head(&self, url: &str) -> Result<RemoteMeta, EdgeError> {
        let response = self.send_with_retries(|| self.client.head(url))?;
        Ok(remote_meta(response.headers()))
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64, EdgeError> {
        let mut response = self.send_with_retries(|| self.client.get(url))?;
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|err| EdgeError::Filesystem(err.to_string()))?;
        }
        let mut file =
            File::create(destination).map_err(|err| EdgeError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file).map_err(|err| EdgeError::Http(err.to_string()))
    }
}

pub fn remote_meta(headers: &HeaderMap) -> RemoteMeta {
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let last_modified = headers
        .get(LAST_MODIFIED)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_http_date);
    RemoteMeta {
        content_length,
        last_modified,
    }
}

/// Parses an HTTP-date such as `Wed, 21 Oct 2015 07:28:00 GMT`.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn reads_length_and_modified_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1024"));
        headers.insert(
            LAST_MODIFIED,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        let meta = remote_meta(&headers);
        assert_eq!(meta.content_length, Some(1024));
        assert_eq!(
            meta.last_modified,
            Some(Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap())
        );
    }

    #[test]
    fn missing_headers_are_none() {
        assert_eq!(remote_meta(&HeaderMap::new()), RemoteMeta::default());
    }
}
