//! Shared HTTP client configuration, retry with backoff and JSON helpers.

use std::io::{self, Read};
use std::sync::OnceLock;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::elide::elide;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(120);
const WRITE_TIMEOUT: Duration = Duration::from_secs(120);

/// Upper bound for any response body; job documents with inline blobs get large.
pub const MAX_RESPONSE_BYTES: usize = 256 * 1024 * 1024;

/// Retry settings for network operations with exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first try.
    pub max_attempts: usize,
    /// Base delay used for the exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay allowed between attempts.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_secs(15),
            max_delay: Duration::from_secs(600),
        }
    }
}

/// Errors raised while talking to the source or destination API.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The server could not be reached; worth retrying.
    #[error("Connection to {url} failed: {message}")]
    Connection { url: String, message: String },
    /// Any other transport-level failure.
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },
    /// The server answered outside the 2xx range.
    #[error("HTTP {status} from {url}: '{body}'")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    /// The response body could not be read.
    #[error("Failed to read response from {url}: {source}")]
    Read { url: String, source: io::Error },
    /// The response body was not valid JSON.
    #[error("Invalid JSON from {url}: {source}; text '{body}'")]
    Decode {
        url: String,
        source: serde_json::Error,
        body: String,
    },
}

impl HttpError {
    /// True for connection-level faults that a retry may cure, including a
    /// connection that drops or stalls while the body is still arriving.
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Read { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }

    fn from_ureq(url: &str, error: ureq::Error) -> Self {
        match error {
            ureq::Error::Status(status, response) => {
                let body = read_body(url, response).unwrap_or_else(|err| err.to_string());
                Self::Status {
                    url: url.to_string(),
                    status,
                    body: elide(&body).into_owned(),
                }
            }
            ureq::Error::Transport(transport) => {
                let message = transport.to_string();
                match transport.kind() {
                    ureq::ErrorKind::Dns
                    | ureq::ErrorKind::ConnectionFailed
                    | ureq::ErrorKind::Io => Self::Connection {
                        url: url.to_string(),
                        message,
                    },
                    _ => Self::Transport {
                        url: url.to_string(),
                        message,
                    },
                }
            }
        }
    }
}

/// JSON client bound to one API base URL.
///
/// Every call is synchronous; GETs retry connection faults with the
/// configured backoff, POSTs are attempted once.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    authorization: Option<String>,
    retry: RetryConfig,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authorized", &self.authorization.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: &str, retry: RetryConfig) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: None,
            retry,
        }
    }

    /// Attach an `Authorization` header value to every request.
    pub fn with_authorization(mut self, value: String) -> Self {
        self.authorization = Some(value);
        self
    }

    pub fn is_authorized(&self) -> bool {
        self.authorization.is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path` below the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET `url` and decode the body as JSON, retrying connection faults.
    pub fn get_json(&self, url: &str) -> Result<Value, HttpError> {
        retry_with_backoff(
            self.retry,
            || self.get_json_once(url),
            |err| {
                let retry = err.is_connection();
                if retry {
                    warn!("{err}; retrying");
                }
                retry
            },
        )
    }

    /// POST `body` as JSON to `url` and decode the JSON reply.
    pub fn post_json(&self, url: &str, body: &Value) -> Result<Value, HttpError> {
        let response = self
            .request("POST", url)
            .send_json(body)
            .map_err(|err| HttpError::from_ureq(url, err))?;
        let status = response.status();
        if !(200..=299).contains(&status) {
            let body = read_body(url, response)?;
            return Err(HttpError::Status {
                url: url.to_string(),
                status,
                body: elide(&body).into_owned(),
            });
        }
        decode_json(url, response)
    }

    fn get_json_once(&self, url: &str) -> Result<Value, HttpError> {
        let response = self
            .request("GET", url)
            .call()
            .map_err(|err| HttpError::from_ureq(url, err))?;
        decode_json(url, response)
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let request = agent()
            .request(method, url)
            .set("Accept", "application/json");
        match &self.authorization {
            Some(value) => request.set("Authorization", value),
            None => request,
        }
    }
}

/// Return a shared HTTP agent with consistent timeouts.
pub(crate) fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(WRITE_TIMEOUT)
            .build()
    })
}

/// Retry an operation with bounded exponential backoff when the predicate allows it.
pub(crate) fn retry_with_backoff<T, E, F, R>(
    config: RetryConfig,
    mut action: F,
    mut should_retry: R,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    R: FnMut(&E) -> bool,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match action() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_attempts || !should_retry(&err) {
                    return Err(err);
                }
                std::thread::sleep(backoff_delay(
                    config.base_delay,
                    config.max_delay,
                    attempt,
                ));
            }
        }
    }
}

/// Read a response into memory, enforcing a maximum byte size.
pub(crate) fn read_response_bytes(
    response: ureq::Response,
    max_bytes: usize,
) -> Result<Vec<u8>, io::Error> {
    check_content_length(&response, max_bytes)?;
    let reader = response.into_reader();
    let mut limited = reader.take(max_bytes as u64 + 1);
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes)?;
    if bytes.len() > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Response exceeded {max_bytes} bytes"),
        ));
    }
    Ok(bytes)
}

fn read_body(url: &str, response: ureq::Response) -> Result<String, HttpError> {
    let bytes =
        read_response_bytes(response, MAX_RESPONSE_BYTES).map_err(|source| HttpError::Read {
            url: url.to_string(),
            source,
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn decode_json(url: &str, response: ureq::Response) -> Result<Value, HttpError> {
    let text = read_body(url, response)?;
    serde_json::from_str(&text).map_err(|source| HttpError::Decode {
        url: url.to_string(),
        source,
        body: elide(&text).into_owned(),
    })
}

fn check_content_length(response: &ureq::Response, max_bytes: usize) -> Result<(), io::Error> {
    let Some(length) = response.header("Content-Length") else {
        return Ok(());
    };
    let Ok(length) = length.parse::<u64>() else {
        return Ok(());
    };
    if length > max_bytes as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Response too large: {length} bytes"),
        ));
    }
    Ok(())
}

fn backoff_delay(base: Duration, max: Duration, attempt: usize) -> Duration {
    let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    let delay = base.checked_mul(factor).unwrap_or(max);
    if delay > max {
        max
    } else {
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}", addr)
    }

    fn serve_each(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for response in responses {
                if let Ok((mut stream, _)) = listener.accept() {
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf);
                    let _ = stream.write_all(response.as_bytes());
                }
            }
        });
        format!("http://{}", addr)
    }

    fn no_delay(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
        }
    }

    #[test]
    fn read_response_bytes_rejects_content_length_over_max() {
        let response = concat!(
            "HTTP/1.1 200 OK\r\n",
            "Content-Length: 100\r\n",
            "\r\n",
            "ok"
        )
        .to_string();
        let url = serve_once(response);
        let response = agent().get(&url).call().unwrap();
        let err = read_response_bytes(response, 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn read_response_bytes_rejects_body_over_max() {
        let body = "a".repeat(32);
        let response = format!("HTTP/1.0 200 OK\r\n\r\n{body}");
        let url = serve_once(response);
        let response = agent().get(&url).call().unwrap();
        let err = read_response_bytes(response, 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn get_json_decodes_body() {
        let body = r#"{"count": 1, "results": []}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let base = serve_once(response);
        let client = ApiClient::new(&base, no_delay(1));
        let value = client.get_json(&client.endpoint("/metrics/")).unwrap();
        assert_eq!(value["count"], 1);
    }

    #[test]
    fn get_json_reports_malformed_body_as_decode_error() {
        let body = "<html>nope</html>";
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let base = serve_once(response);
        let client = ApiClient::new(&base, no_delay(1));
        let err = client.get_json(&base).unwrap_err();
        assert!(matches!(err, HttpError::Decode { ref body, .. } if body == "<html>nope</html>"));
    }

    #[test]
    fn error_status_keeps_body() {
        let body = "gone";
        let response = format!(
            "HTTP/1.1 404 Not Found\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let base = serve_once(response);
        let client = ApiClient::new(&base, no_delay(1));
        let err = client.get_json(&base).unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 404, ref body, .. } if body == "gone"));
        assert!(!err.is_connection());
    }

    #[test]
    fn refused_connection_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = ApiClient::new(&format!("http://{addr}"), no_delay(2));
        let err = client.get_json(&client.endpoint("jobs")).unwrap_err();
        assert!(err.is_connection(), "unexpected error: {err}");
    }

    #[test]
    fn body_cut_short_is_retried_on_a_fresh_connection() {
        let body = r#"{"count": 2}"#;
        let truncated = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{{\"cou",
            body.len()
        );
        let complete = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let base = serve_each(vec![truncated, complete]);
        let client = ApiClient::new(&base, no_delay(3));
        let value = client.get_json(&client.endpoint("jobs")).unwrap();
        assert_eq!(value["count"], 2);
    }

    #[test]
    fn oversized_body_is_not_retryable() {
        let err = HttpError::Read {
            url: "http://example.invalid".to_string(),
            source: io::Error::new(io::ErrorKind::InvalidData, "too large"),
        };
        assert!(!err.is_connection());
    }

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let client = ApiClient::new("http://example.invalid/api/", RetryConfig::default());
        assert_eq!(client.endpoint("/jobs"), "http://example.invalid/api/jobs");
        assert_eq!(client.endpoint("metrics/"), "http://example.invalid/api/metrics/");
    }

    #[test]
    fn default_backoff_doubles_from_fifteen_seconds_up_to_ten_minutes() {
        let config = RetryConfig::default();
        let delays: Vec<u64> = (1..=8)
            .map(|attempt| backoff_delay(config.base_delay, config.max_delay, attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![15, 30, 60, 120, 240, 480, 600, 600]);
    }

    #[test]
    fn retry_with_backoff_stops_after_success() {
        let mut attempts = 0usize;
        let result: Result<u32, &'static str> = retry_with_backoff(
            no_delay(4),
            || {
                attempts += 1;
                if attempts < 3 { Err("fail") } else { Ok(7) }
            },
            |_| true,
        );
        assert_eq!(result, Ok(7));
        assert_eq!(attempts, 3);
    }

    #[test]
    fn retry_with_backoff_honors_should_retry() {
        let mut attempts = 0usize;
        let result: Result<u32, &'static str> = retry_with_backoff(
            no_delay(3),
            || {
                attempts += 1;
                Err("fail")
            },
            |_| false,
        );
        assert_eq!(result, Err("fail"));
        assert_eq!(attempts, 1);
    }
}
