use crate::core::errors::BybitError;
use crate::core::kernel::signer::Signer;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{instrument, trace};

/// `retCode` the exchange uses for "too many visits"
pub const RATE_LIMIT_RET_CODE: i64 = 10006;

const HEADER_LIMIT: &str = "X-Bapi-Limit";
const HEADER_LIMIT_STATUS: &str = "X-Bapi-Limit-Status";
const HEADER_LIMIT_RESET: &str = "X-Bapi-Limit-Reset-Timestamp";

/// REST client trait for making HTTP requests
///
/// Every call returns the `result` member of the response envelope on
/// success; non-zero `retCode` values and HTTP failures are surfaced as typed
/// errors and never retried here.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Make a GET request
    ///
    /// # Arguments
    /// * `endpoint` - The API endpoint path
    /// * `query_params` - Query parameters as key-value pairs, sent in order
    /// * `authenticated` - Whether to sign the request
    async fn get(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, BybitError>;

    /// Make a POST request with a JSON body
    async fn post(
        &self,
        endpoint: &str,
        body: &Value,
        authenticated: bool,
    ) -> Result<Value, BybitError>;

    /// Make a GET request with strongly-typed response
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, BybitError> {
        let value = self.get(endpoint, query_params, authenticated).await?;
        decode_result(value)
    }

    /// Make a POST request with strongly-typed response
    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Value,
        authenticated: bool,
    ) -> Result<T, BybitError> {
        let value = self.post(endpoint, body, authenticated).await?;
        decode_result(value)
    }
}

fn decode_result<T: DeserializeOwned>(value: Value) -> Result<T, BybitError> {
    serde_json::from_value(value)
        .map_err(|e| BybitError::DecodeError(format!("Failed to deserialize result: {}", e)))
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
}

impl RestClientConfig {
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            timeout_seconds: 30,
            user_agent: "bybitx/0.1".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Set the signer for authenticated requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn build(self) -> Result<ReqwestRest, BybitError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .build()?;

        Ok(ReqwestRest {
            client,
            config: self.config,
            signer: self.signer,
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    fn build_url(&self, endpoint: &str, query_string: &str) -> String {
        if query_string.is_empty() {
            format!("{}{}", self.config.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.config.base_url, endpoint, query_string)
        }
    }

    #[instrument(
        skip(self, body),
        fields(exchange = %self.config.exchange_name, method = %method, endpoint = %endpoint)
    )]
    async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        body: &[u8],
        authenticated: bool,
    ) -> Result<Value, BybitError> {
        // The signed string and the URL must carry byte-identical query strings.
        let query_string = create_query_string(query_params);
        let mut request = self
            .client
            .request(method.clone(), self.build_url(endpoint, &query_string));

        if authenticated {
            let signer = self.signer.as_ref().ok_or_else(|| {
                BybitError::AuthError(
                    "Authentication required but no signer provided".to_string(),
                )
            })?;

            let timestamp = current_timestamp_ms();
            let headers = signer.sign_request(method.as_str(), &query_string, body, timestamp)?;
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        if !body.is_empty() {
            request = request
                .header("Content-Type", "application/json")
                .body(body.to_vec());
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        trace!("Response body: {}", text);

        classify_response(status, &headers, &text)
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    async fn get(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, BybitError> {
        self.make_request(Method::GET, endpoint, query_params, &[], authenticated)
            .await
    }

    async fn post(
        &self,
        endpoint: &str,
        body: &Value,
        authenticated: bool,
    ) -> Result<Value, BybitError> {
        let body_bytes = serde_json::to_vec(body).map_err(|e| {
            BybitError::InvalidParameters(format!("Failed to serialize request body: {}", e))
        })?;

        self.make_request(Method::POST, endpoint, &[], &body_bytes, authenticated)
            .await
    }
}

/// URL-encode query parameters in the order given
pub fn create_query_string(params: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

pub fn current_timestamp_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// The JSON envelope wrapping every REST response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub rate_limit: Option<u64>,
    #[serde(default)]
    pub rate_limit_status: Option<u64>,
    #[serde(default)]
    pub rate_limit_reset_ms: Option<u64>,
}

/// Turn an HTTP response into the envelope's `result` or a typed error
pub fn classify_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> Result<Value, BybitError> {
    if status == StatusCode::NOT_FOUND {
        return Err(BybitError::PathNotFound(body.to_string()));
    }

    let envelope = match serde_json::from_str::<Envelope>(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return Err(match status {
                StatusCode::FORBIDDEN => BybitError::AccessDenied(body.to_string()),
                s if s.is_success() => {
                    BybitError::DecodeError(format!("Failed to parse response envelope: {}", e))
                }
                s => BybitError::NetworkError(format!("Unexpected HTTP status {}: {}", s, body)),
            });
        }
    };

    match envelope.ret_code {
        0 => Ok(envelope.result),
        RATE_LIMIT_RET_CODE => Err(BybitError::RateLimitError {
            message: envelope.ret_msg,
            limit: header_u64(headers, HEADER_LIMIT).or(envelope.rate_limit),
            remaining: header_u64(headers, HEADER_LIMIT_STATUS).or(envelope.rate_limit_status),
            reset_at_ms: header_u64(headers, HEADER_LIMIT_RESET).or(envelope.rate_limit_reset_ms),
        }),
        code => Err(BybitError::BusinessError {
            code,
            message: envelope.ret_msg,
        }),
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
