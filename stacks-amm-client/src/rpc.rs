//! # Read-only call client
//!
//! Evaluates read-only Clarity functions through a Stacks node's
//! `/v2/contracts/call-read` endpoint. Arguments and results travel as hex encoded Clarity
//! values; the node wraps the result in an `{"okay": .., "result" | "cause": ..}` envelope.
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use backoff::{exponential::ExponentialBackoffBuilder, ExponentialBackoff};
#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;
use reqwest::{header, Client, ClientBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use stacks_amm_common::{models::Network, ClarityValue, StandardPrincipal};
use thiserror::Error;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use tokio::{sync::RwLock, time::sleep};
use tracing::{debug, instrument, trace, warn};

use crate::config::RetryConfiguration;

/// A read-only function invocation against a deployed contract.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadOnlyCall {
    pub contract_address: StandardPrincipal,
    pub contract_name: String,
    pub function_name: String,
    pub arguments: Vec<ClarityValue>,
    /// Address the function is evaluated as (`tx-sender`).
    pub sender: StandardPrincipal,
}

#[derive(Error, Debug)]
pub enum RPCError {
    /// The passed node url failed to parse.
    #[error("Failed to parse URL: {0}. Error: {1}")]
    UrlParsing(String, String),

    /// The request data is not correctly formed.
    #[error("Failed to format request: {0}")]
    FormatRequest(String),

    /// Errors forwarded from the HTTP protocol.
    #[error("Unexpected HTTP client error: {0}")]
    HttpClient(String, #[source] reqwest::Error),

    /// The node answered with a non-success status.
    #[error("Error calling read-only function. Response {0}: {1}")]
    HttpStatus(u16, String),

    /// The response from the node could not be parsed correctly.
    #[error("Failed to parse response: {0}")]
    ParseResponse(String),

    /// The node evaluated the call and reported a failure, e.g. a runtime error in the
    /// contract. Carries the node's cause verbatim.
    #[error("{0}")]
    CallFailed(String),

    #[error("Rate limited until {0:?}")]
    RateLimited(Option<SystemTime>),

    #[error("Server unreachable: {0}")]
    ServerUnreachable(String),
}

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait ReadOnlyClient: Send + Sync {
    /// Evaluates a read-only function and returns its (undecoded) Clarity result.
    async fn call_read_only(&self, call: &ReadOnlyCall) -> Result<ClarityValue, RPCError>;
}

#[derive(Serialize, Debug, PartialEq)]
struct CallReadRequestBody {
    sender: String,
    arguments: Vec<String>,
}

impl TryFrom<&ReadOnlyCall> for CallReadRequestBody {
    type Error = RPCError;

    fn try_from(call: &ReadOnlyCall) -> Result<Self, Self::Error> {
        let arguments = call
            .arguments
            .iter()
            .map(ClarityValue::to_hex)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RPCError::FormatRequest(format!("Invalid Clarity argument: {e}")))?;
        Ok(Self { sender: call.sender.to_string(), arguments })
    }
}

#[derive(Deserialize, Debug)]
struct CallReadResponse {
    okay: bool,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    cause: Option<String>,
}

/// Configuration options for HttpReadOnlyClient
#[derive(Debug, Clone, Default)]
pub struct HttpReadOnlyClientOptions {
    /// Optional API key, sent as `x-api-key`
    pub api_key: Option<String>,
    /// Overall timeout for a single HTTP request
    pub timeout: Option<Duration>,
    /// Handling of rate limits and gateway errors
    pub retry: RetryConfiguration,
}

impl HttpReadOnlyClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Set the per request timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry behaviour for transient failures
    pub fn with_retry(mut self, retry: RetryConfiguration) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpReadOnlyClient {
    http_client: Client,
    url: Url,
    retry_after: Arc<RwLock<Option<SystemTime>>>,
    backoff_policy: Option<ExponentialBackoff>,
}

impl HttpReadOnlyClient {
    pub fn new(base_uri: &str, options: HttpReadOnlyClientOptions) -> Result<Self, RPCError> {
        let uri = base_uri
            .parse::<Url>()
            .map_err(|e| RPCError::UrlParsing(base_uri.to_string(), e.to_string()))?;

        // Add default headers
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        let user_agent =
            format!("stacks-amm-client-{version}", version = env!("CARGO_PKG_VERSION"));
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&user_agent)
                .map_err(|e| RPCError::FormatRequest(format!("Invalid user agent format: {e}")))?,
        );

        if let Some(key) = options.api_key.as_deref() {
            let mut key_value = header::HeaderValue::from_str(key)
                .map_err(|e| RPCError::FormatRequest(format!("Invalid API key format: {e}")))?;
            key_value.set_sensitive(true);
            headers.insert("x-api-key", key_value);
        }

        let mut builder = ClientBuilder::new().default_headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RPCError::HttpClient(e.to_string(), e))?;

        let backoff_policy = match options.retry {
            RetryConfiguration::Disabled => None,
            RetryConfiguration::Exponential(config) => Some(
                ExponentialBackoffBuilder::new()
                    .with_initial_interval(config.initial_interval())
                    .with_multiplier(config.multiplier())
                    .with_max_interval(config.max_interval())
                    .with_max_elapsed_time(config.max_elapsed_time())
                    .build(),
            ),
        };

        Ok(Self {
            http_client: client,
            url: uri,
            retry_after: Arc::new(RwLock::new(None)),
            backoff_policy,
        })
    }

    /// Creates a client for the default API endpoint of `network`.
    pub fn for_network(
        network: Network,
        options: HttpReadOnlyClientOptions,
    ) -> Result<Self, RPCError> {
        Self::new(network.default_api_url(), options)
    }

    #[cfg(test)]
    pub fn with_test_backoff_policy(mut self) -> Self {
        // Extremely short intervals for very fast testing
        self.backoff_policy = Some(
            ExponentialBackoffBuilder::new()
                .with_initial_interval(Duration::from_millis(1))
                .with_multiplier(1.1)
                .with_max_interval(Duration::from_millis(5))
                .with_max_elapsed_time(Some(Duration::from_millis(50)))
                .build(),
        );
        self
    }

    fn call_uri(&self, call: &ReadOnlyCall) -> String {
        format!(
            "{}/v2/contracts/call-read/{}/{}/{}",
            self.url
                .to_string()
                .trim_end_matches('/'),
            call.contract_address,
            call.contract_name,
            call.function_name
        )
    }

    /// Converts a error response to a Result.
    ///
    /// Raises an error if the response status code is 429, 502, 503 or 504. In the 429
    /// case it will try to look for a retry-after header and parse it accordingly. The
    /// parsed value is then passed as part of the error.
    async fn error_for_response(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RPCError> {
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_raw = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|h| h.to_str().ok())
                    .and_then(parse_retry_value);

                Err(RPCError::RateLimited(retry_after_raw))
            }
            StatusCode::BAD_GATEWAY |
            StatusCode::SERVICE_UNAVAILABLE |
            StatusCode::GATEWAY_TIMEOUT => Err(RPCError::ServerUnreachable(
                response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Server Unreachable".to_string()),
            )),
            _ => Ok(response),
        }
    }

    /// Classifies errors into transient or permanent ones.
    ///
    /// Transient errors are retried with a potential backoff, permanent ones are not.
    /// If the error is RateLimited, this method will set the self.retry_after value so
    /// future requests wait until the rate limit has been reset.
    async fn handle_error_for_backoff(&self, e: RPCError) -> backoff::Error<RPCError> {
        match e {
            RPCError::ServerUnreachable(_) => backoff::Error::transient(e),
            RPCError::RateLimited(Some(until)) => {
                let mut retry_after_guard = self.retry_after.write().await;
                *retry_after_guard = Some(
                    retry_after_guard
                        .unwrap_or(until)
                        .max(until),
                );

                if let Ok(duration) = until.duration_since(SystemTime::now()) {
                    backoff::Error::retry_after(e, duration)
                } else {
                    e.into()
                }
            }
            RPCError::RateLimited(None) => e.into(),
            _ => backoff::Error::permanent(e),
        }
    }

    /// Waits until the current rate limit time has passed.
    ///
    /// Only waits if there is a time and that time is in the future, else return
    /// immediately.
    async fn wait_until_retry_after(&self) {
        if let Some(&until) = self.retry_after.read().await.as_ref() {
            let now = SystemTime::now();
            if until > now {
                if let Ok(duration) = until.duration_since(now) {
                    sleep(duration).await
                }
            }
        }
    }

    async fn send_once<T: Serialize + ?Sized>(
        &self,
        request: &T,
        uri: &str,
    ) -> Result<Response, RPCError> {
        let server_response = self
            .http_client
            .post(uri)
            .json(request)
            .send()
            .await
            .map_err(|e| RPCError::HttpClient(e.to_string(), e))?;
        self.error_for_response(server_response)
            .await
    }

    /// Makes a post request handling transient failures.
    ///
    /// If a retry-after header is received it will be respected. Else the configured
    /// backoff policy is used to deal with transient network or server errors. Without a
    /// policy the request is attempted once.
    async fn make_post_request<T: Serialize + ?Sized>(
        &self,
        request: &T,
        uri: &str,
    ) -> Result<Response, RPCError> {
        self.wait_until_retry_after().await;
        let Some(policy) = self.backoff_policy.clone() else {
            return self.send_once(request, uri).await;
        };
        let response = backoff::future::retry(policy, || async {
            match self.send_once(request, uri).await {
                Ok(response) => Ok(response),
                Err(e) => {
                    warn!(error = %e, "Read-only call failed, retrying if transient");
                    Err(self.handle_error_for_backoff(e).await)
                }
            }
        })
        .await?;
        Ok(response)
    }
}

fn parse_retry_value(val: &str) -> Option<SystemTime> {
    if let Ok(secs) = val.parse::<u64>() {
        return Some(SystemTime::now() + Duration::from_secs(secs));
    }
    if let Ok(date) = OffsetDateTime::parse(val, &Rfc2822) {
        return Some(date.into());
    }
    None
}

#[async_trait]
impl ReadOnlyClient for HttpReadOnlyClient {
    #[instrument(skip(self, call), fields(function = %call.function_name))]
    async fn call_read_only(&self, call: &ReadOnlyCall) -> Result<ClarityValue, RPCError> {
        let uri = self.call_uri(call);
        let body = CallReadRequestBody::try_from(call)?;
        debug!(%uri, "Sending call-read request to Stacks node");
        trace!(?body, "Sending request to Stacks node");

        let response = self
            .make_post_request(&body, &uri)
            .await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RPCError::ParseResponse(e.to_string()))?;
        trace!(%status, %text, "Received response from Stacks node");

        if !status.is_success() {
            return Err(RPCError::HttpStatus(status.as_u16(), text));
        }

        let envelope = serde_json::from_str::<CallReadResponse>(&text)
            .map_err(|err| RPCError::ParseResponse(format!("Error: {err}, Body: {text}")))?;

        match envelope {
            CallReadResponse { okay: true, result: Some(result), .. } => {
                ClarityValue::from_hex(&result).map_err(|err| {
                    RPCError::ParseResponse(format!("Invalid Clarity value {result}: {err}"))
                })
            }
            CallReadResponse { okay: true, result: None, .. } => {
                Err(RPCError::ParseResponse(format!("Missing result, Body: {text}")))
            }
            CallReadResponse { okay: false, cause, .. } => Err(RPCError::CallFailed(
                cause.unwrap_or_else(|| "Read-only call failed without a cause".to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    const CONTRACT: &str = "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7";
    const CALL_PATH: &str =
        "/v2/contracts/call-read/SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7/amm/get-swap-quote";
    // (ok (tuple (fee-amount u5) (output-amount u995)))
    const QUOTE_RESULT: &str = "0x070c000000020a6665652d616d6f756e7401000000000000000000000000000000050d6f75747075742d616d6f756e7401000000000000000000000000000003e3";

    fn quote_call() -> ReadOnlyCall {
        let contract: StandardPrincipal = CONTRACT.parse().unwrap();
        ReadOnlyCall {
            contract_address: contract,
            contract_name: "amm".to_string(),
            function_name: "get-swap-quote".to_string(),
            arguments: vec![ClarityValue::UInt(1000), ClarityValue::Bool(true)],
            sender: contract,
        }
    }

    fn client(url: &str) -> HttpReadOnlyClient {
        HttpReadOnlyClient::new(url, HttpReadOnlyClientOptions::default())
            .unwrap()
            .with_test_backoff_policy()
    }

    #[test]
    fn test_quote_result_fixture_is_valid() {
        let expected = ClarityValue::ok(ClarityValue::tuple([
            ("output-amount", ClarityValue::UInt(995)),
            ("fee-amount", ClarityValue::UInt(5)),
        ]));
        assert_eq!(expected.to_hex().unwrap(), QUOTE_RESULT);
    }

    #[test]
    fn test_request_body_encodes_arguments_as_hex() {
        let body = CallReadRequestBody::try_from(&quote_call()).unwrap();

        assert_eq!(
            body,
            CallReadRequestBody {
                sender: CONTRACT.to_string(),
                arguments: vec![
                    "0x01000000000000000000000000000003e8".to_string(),
                    "0x03".to_string()
                ],
            }
        );
    }

    #[tokio::test]
    async fn test_call_read_only() {
        let mut server = Server::new_async().await;
        let mocked_server = server
            .mock("POST", CALL_PATH)
            .match_body(Matcher::Json(json!({
                "sender": CONTRACT,
                "arguments": ["0x01000000000000000000000000000003e8", "0x03"],
            })))
            .expect(1)
            .with_body(json!({"okay": true, "result": QUOTE_RESULT}).to_string())
            .create_async()
            .await;

        let result = client(server.url().as_str())
            .call_read_only(&quote_call())
            .await
            .expect("call read only");

        mocked_server.assert();
        assert_eq!(result, ClarityValue::from_hex(QUOTE_RESULT).unwrap());
    }

    #[tokio::test]
    async fn test_call_read_only_not_okay_surfaces_cause() {
        let mut server = Server::new_async().await;
        let mocked_server = server
            .mock("POST", CALL_PATH)
            .with_body(r#"{"okay": false, "cause": "Unchecked(NoSuchContract(\"amm\"))"}"#)
            .create_async()
            .await;

        let err = client(server.url().as_str())
            .call_read_only(&quote_call())
            .await
            .unwrap_err();

        mocked_server.assert();
        assert!(matches!(err, RPCError::CallFailed(_)));
        assert_eq!(err.to_string(), r#"Unchecked(NoSuchContract("amm"))"#);
    }

    #[tokio::test]
    async fn test_call_read_only_invalid_result_hex() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", CALL_PATH)
            .with_body(r#"{"okay": true, "result": "0x7f"}"#)
            .create_async()
            .await;

        let err = client(server.url().as_str())
            .call_read_only(&quote_call())
            .await
            .unwrap_err();

        assert!(matches!(err, RPCError::ParseResponse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_call_read_only_http_error_is_permanent() {
        let mut server = Server::new_async().await;
        let mocked_server = server
            .mock("POST", CALL_PATH)
            .with_status(400)
            .with_body("bad request")
            .expect(1)
            .create_async()
            .await;

        let err = client(server.url().as_str())
            .call_read_only(&quote_call())
            .await
            .unwrap_err();

        mocked_server.assert();
        match err {
            RPCError::HttpStatus(status, body) => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad request");
            }
            other => panic!("Expected HttpStatus error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_read_only_rejects_unencodable_argument() {
        let mut server = Server::new_async().await;
        let mocked_server = server
            .mock("POST", CALL_PATH)
            .expect(0)
            .create_async()
            .await;
        let mut call = quote_call();
        call.arguments
            .push(ClarityValue::tuple([("k".repeat(256), ClarityValue::UInt(1))]));

        let err = client(server.url().as_str())
            .call_read_only(&call)
            .await
            .unwrap_err();

        mocked_server.assert();
        assert!(matches!(err, RPCError::FormatRequest(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_call_read_only_retries_server_errors() {
        let mut server = Server::new_async().await;
        let error_mock = server
            .mock("POST", CALL_PATH)
            .with_status(503)
            .with_body("Service Unavailable")
            .expect(1)
            .create_async()
            .await;
        let success_mock = server
            .mock("POST", CALL_PATH)
            .with_body(json!({"okay": true, "result": "0x03"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let result = client(server.url().as_str())
            .call_read_only(&quote_call())
            .await;

        error_mock.assert();
        success_mock.assert();
        assert_eq!(result.unwrap(), ClarityValue::Bool(true));
    }

    #[tokio::test]
    async fn test_retry_disabled_attempts_once() {
        let mut server = Server::new_async().await;
        let mocked_server = server
            .mock("POST", CALL_PATH)
            .with_status(503)
            .with_body("Service Unavailable")
            .expect(1)
            .create_async()
            .await;

        let client = HttpReadOnlyClient::new(
            server.url().as_str(),
            HttpReadOnlyClientOptions::new().with_retry(RetryConfiguration::disabled()),
        )
        .unwrap();
        let err = client
            .call_read_only(&quote_call())
            .await
            .unwrap_err();

        mocked_server.assert();
        assert!(matches!(err, RPCError::ServerUnreachable(_)));
    }

    #[tokio::test]
    async fn test_api_key_header() {
        let mut server = Server::new_async().await;
        let mocked_server = server
            .mock("POST", CALL_PATH)
            .match_header("x-api-key", "secret")
            .with_body(json!({"okay": true, "result": "0x04"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = HttpReadOnlyClient::new(
            server.url().as_str(),
            HttpReadOnlyClientOptions::new().with_api_key(Some("secret".to_string())),
        )
        .unwrap();
        let result = client
            .call_read_only(&quote_call())
            .await
            .unwrap();

        mocked_server.assert();
        assert_eq!(result, ClarityValue::Bool(false));
    }

    #[test]
    fn test_invalid_url() {
        let result = HttpReadOnlyClient::new("not a url", HttpReadOnlyClientOptions::default());

        assert!(matches!(result, Err(RPCError::UrlParsing(_, _))));
    }

    #[test]
    fn test_call_uri_trims_trailing_slash() {
        let client =
            HttpReadOnlyClient::new("http://localhost:3999/", HttpReadOnlyClientOptions::default())
                .unwrap();

        assert_eq!(client.call_uri(&quote_call()), format!("http://localhost:3999{CALL_PATH}"));
    }

    #[test]
    fn test_parse_retry_value() {
        assert!(parse_retry_value("60").unwrap() > SystemTime::now());
        assert!(parse_retry_value("Sat, 01 Jan 2050 12:00:00 +0000").unwrap() > SystemTime::now());
        assert!(parse_retry_value("invalid").is_none());
        assert!(parse_retry_value("").is_none());
    }

    #[tokio::test]
    async fn test_error_for_response_rate_limited() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/test")
            .with_status(429)
            .with_header("Retry-After", "60")
            .create_async()
            .await;

        let response = reqwest::Client::new()
            .get(format!("{}/test", server.url()))
            .send()
            .await
            .unwrap();

        let result = client(server.url().as_str())
            .error_for_response(response)
            .await;

        mock.assert();
        assert!(matches!(result, Err(RPCError::RateLimited(Some(_)))));
    }

    #[tokio::test]
    async fn test_handle_error_for_backoff_rate_limited_stores_retry_after() {
        let http_client = client("http://localhost:3999");
        let future_time = SystemTime::now() + Duration::from_secs(30);

        let backoff_error = http_client
            .handle_error_for_backoff(RPCError::RateLimited(Some(future_time)))
            .await;

        assert!(matches!(
            backoff_error,
            backoff::Error::Transient { err: RPCError::RateLimited(_), .. }
        ));
        assert_eq!(*http_client.retry_after.read().await, Some(future_time));
    }

    #[tokio::test]
    async fn test_handle_error_for_backoff_call_failed_is_permanent() {
        let backoff_error = client("http://localhost:3999")
            .handle_error_for_backoff(RPCError::CallFailed("runtime error".to_string()))
            .await;

        assert!(matches!(backoff_error, backoff::Error::Permanent(RPCError::CallFailed(_))));
    }
}
