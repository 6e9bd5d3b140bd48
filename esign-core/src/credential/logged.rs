//! Request/response capture.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, StatusCode};
use url::Url;

use super::Credential;
use crate::error::Result;
use crate::request::{ApiRequest, RequestBody};

/// Placeholder recorded for upload bodies that are streamed rather than buffered.
const STREAMED_BODY: &[u8] = b"<streamed body>";

/// One completed call, as seen by a [`RequestLogger`].
#[derive(Debug, Clone)]
pub struct CallLog {
    pub method: Method,
    pub url: Option<Url>,
    pub request_body: Bytes,
    /// `None` when no response arrived.
    pub status: Option<StatusCode>,
    pub response_body: Bytes,
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// Receives a record of every call made through a [`LoggedCredential`].
pub trait RequestLogger: Send + Sync {
    fn log(&self, call: &CallLog);
}

/// Emits each call at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl RequestLogger for TracingLogger {
    fn log(&self, call: &CallLog) {
        let url = call.url.as_ref().map(Url::as_str).unwrap_or("<unresolved>");
        match (&call.status, &call.error) {
            (_, Some(error)) => tracing::debug!(
                "{} {} failed after {:?}: {}",
                call.method,
                url,
                call.elapsed,
                error
            ),
            (Some(status), None) => tracing::debug!(
                "{} {} -> {} in {:?}\nrequest: {}\nresponse: {}",
                call.method,
                url,
                status,
                call.elapsed,
                String::from_utf8_lossy(&call.request_body),
                String::from_utf8_lossy(&call.response_body)
            ),
            (None, None) => tracing::debug!("{} {} sent", call.method, url),
        }
    }
}

/// Wraps a credential and hands every call to a [`RequestLogger`] once it
/// completes, successful or not.
///
/// The response body is read in full so it can be logged, then handed back
/// to the caller as a fresh response with the same status and headers.
///
/// # Example
///
/// ```no_run
/// use esign_core::{LoggedCredential, OAuth2Config, Token, TracingLogger};
///
/// # fn example() -> esign_core::Result<()> {
/// let config = OAuth2Config::new("key", "secret", "https://example.com/cb");
/// let credential = LoggedCredential::new(config.credential(Token::new("saved"))?, TracingLogger);
/// # Ok(())
/// # }
/// ```
pub struct LoggedCredential<C> {
    inner: C,
    logger: Arc<dyn RequestLogger>,
}

impl<C: Credential> LoggedCredential<C> {
    pub fn new(inner: C, logger: impl RequestLogger + 'static) -> Self {
        Self {
            inner,
            logger: Arc::new(logger),
        }
    }

    /// The wrapped credential.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

fn request_payload(body: &RequestBody) -> Bytes {
    match body {
        RequestBody::Empty => Bytes::new(),
        RequestBody::Bytes(bytes) => bytes.clone(),
        RequestBody::Stream(_) => Bytes::from_static(STREAMED_BODY),
    }
}

#[async_trait]
impl<C: Credential> Credential for LoggedCredential<C> {
    async fn authorize(&self, request: &mut ApiRequest) -> Result<()> {
        self.inner.authorize(request).await
    }

    fn http_client(&self) -> &reqwest::Client {
        self.inner.http_client()
    }

    async fn execute(&self, request: ApiRequest) -> Result<reqwest::Response> {
        let started = Instant::now();
        let mut call = CallLog {
            method: request.method.clone(),
            url: request.url.clone(),
            request_body: request_payload(&request.body),
            status: None,
            response_body: Bytes::new(),
            error: None,
            elapsed: Duration::ZERO,
        };

        let result = match self.inner.execute(request).await {
            Ok(response) => {
                let status = response.status();
                let version = response.version();
                let headers = response.headers().clone();
                call.status = Some(status);

                match response.bytes().await {
                    Ok(body) => {
                        call.response_body = body.clone();
                        let mut rebuilt = http::Response::new(body);
                        *rebuilt.status_mut() = status;
                        *rebuilt.version_mut() = version;
                        *rebuilt.headers_mut() = headers;
                        Ok(reqwest::Response::from(rebuilt))
                    }
                    Err(e) => {
                        call.error = Some(e.to_string());
                        Err(e.into())
                    }
                }
            }
            Err(e) => {
                call.error = Some(e.to_string());
                Err(e)
            }
        };

        call.elapsed = started.elapsed();
        self.logger.log(&call);
        result
    }
}
