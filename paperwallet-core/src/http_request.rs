use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};

use crate::registration::RegistrationError;

/// A simple wrapper on an HTTP client for making requests. Sets sensible defaults such as
/// timeouts and user-agent, and retries requests that never reached the server.
pub(crate) struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl Request {
    /// Initializes a new `Request` instance.
    pub(crate) fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::new();
        let max_retries = 3; // total attempts = 4
        Self {
            client,
            timeout,
            max_retries,
        }
    }

    /// Creates a request builder with defaults applied.
    pub(crate) fn req(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("paperwallet-core/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Creates a POST request builder with defaults applied.
    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.req(Method::POST, url)
    }

    /// Sends a request built by `req`/`post`, retrying only connect failures.
    ///
    /// Timeouts, 429 and 5xx are reported without a retry: the server may already have acted
    /// on the request.
    pub(crate) async fn handle(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, RegistrationError> {
        let Some(template) = request_builder.try_clone() else {
            return execute_request_builder(request_builder)
                .await
                .map_err(Into::into);
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        (|| async {
            let request_builder = template.try_clone().ok_or_else(|| {
                RequestHandleError::new(
                    "<unknown>".to_string(),
                    None,
                    "request cannot be retried because it is not cloneable".to_string(),
                    Failure::Permanent,
                )
            })?;
            execute_request_builder(request_builder).await
        })
        .retry(backoff)
        .when(RequestHandleError::is_retryable)
        .notify(|err: &RequestHandleError, delay: Duration| {
            log::debug!("retrying {} in {delay:?}: {}", err.url, err.error);
        })
        .await
        .map_err(Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// The connection was never established; the server saw nothing.
    Connect,
    /// Anything else, including timeouts, 429 and 5xx.
    Permanent,
}

#[derive(Debug)]
struct RequestHandleError {
    url: String,
    status: Option<u16>,
    error: String,
    failure: Failure,
}

impl RequestHandleError {
    const fn new(url: String, status: Option<u16>, error: String, failure: Failure) -> Self {
        Self {
            url,
            status,
            error,
            failure,
        }
    }

    const fn is_retryable(&self) -> bool {
        matches!(self.failure, Failure::Connect)
    }
}

impl From<RequestHandleError> for RegistrationError {
    fn from(value: RequestHandleError) -> Self {
        Self::Network {
            url: value.url,
            status: value.status,
            error: value.error,
        }
    }
}

async fn execute_request_builder(
    request_builder: RequestBuilder,
) -> Result<Response, RequestHandleError> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| {
        RequestHandleError::new(
            err.url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            None,
            format!("request build failed: {err}"),
            Failure::Permanent,
        )
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(RequestHandleError::new(
                    url,
                    Some(status),
                    format!("request error with bad status code {status}"),
                    Failure::Permanent,
                ));
            }
            Ok(resp)
        }
        Err(err) if err.is_connect() => Err(RequestHandleError::new(
            url,
            None,
            format!("request connect error: {err}"),
            Failure::Connect,
        )),
        Err(err) if err.is_timeout() => Err(RequestHandleError::new(
            url,
            None,
            format!("request timeout: {err}"),
            Failure::Permanent,
        )),
        Err(err) => Err(RequestHandleError::new(
            url,
            None,
            format!("request failed: {err}"),
            Failure::Permanent,
        )),
    }
}
