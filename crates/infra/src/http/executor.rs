//! Request executor over the pinned TLS context.
//!
//! One call is one HTTP exchange: the session continuity fields are merged
//! into the body, the request is sent, the status is checked, the JSON
//! envelope is parsed and the `meta` directives are applied to the session
//! store. Retries live one layer up.

use std::sync::Arc;

use parking_lot::RwLock;
use pinpost_core::{apply_response_meta, merge_session_fields, AppConfig, SessionChange, SessionStore};
use pinpost_domain::constants::CONTENT_TYPE_JSON;
use pinpost_domain::{ApiRequest, HttpMethod, NetworkError, NetworkResponse, Result, TransportConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client as ReqwestClient, Method};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::errors::IntoNetworkError;
use crate::tls::TrustContext;

/// Executes [`ApiRequest`]s against a runtime-switchable base URL.
pub struct RequestExecutor {
    client: ReqwestClient,
    base_url: RwLock<String>,
    user_agent: String,
    allow_plaintext: bool,
    app_config: Arc<AppConfig>,
    session: Arc<dyn SessionStore>,
}

impl RequestExecutor {
    /// Build an executor whose HTTPS connections trust only `trust`.
    ///
    /// # Errors
    /// `NetworkError::TrustStore` if the HTTP client cannot be constructed,
    /// `NetworkError::Unsupported` if the base URL is unusable.
    pub fn new(
        config: &TransportConfig,
        trust: &TrustContext,
        app_config: Arc<AppConfig>,
        session: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        parse_base_url(&config.base_url)?;

        let client = ReqwestClient::builder()
            .use_preconfigured_tls((*trust.tls_config()).clone())
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .redirect(Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| NetworkError::trust_store(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: RwLock::new(config.base_url.clone()),
            user_agent: config.user_agent.clone(),
            allow_plaintext: config.allow_plaintext,
            app_config,
            session,
        })
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().clone()
    }

    /// Switch environments. Takes effect for the next request.
    pub fn set_base_url(&self, base_url: impl Into<String>) -> Result<()> {
        let base_url = base_url.into();
        parse_base_url(&base_url)?;
        info!(%base_url, "base URL updated");
        *self.base_url.write() = base_url;
        Ok(())
    }

    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    pub fn app_config(&self) -> &Arc<AppConfig> {
        &self.app_config
    }

    /// Send one request and return the parsed response.
    ///
    /// # Errors
    /// - `Unsupported` for plaintext URLs when plaintext is not allowed
    /// - `Transport` for DNS, connect, timeout and socket failures
    /// - `PinValidation` when the server chain fails the pinned trust policy
    /// - `HttpStatus` for status 400 and above
    /// - `MalformedResponse` when the body is not a JSON object
    #[instrument(skip_all, fields(path = request.path()))]
    pub async fn execute(&self, request: &ApiRequest) -> Result<NetworkResponse> {
        let url = self.resolve_url(request.path())?;
        let headers = self.headers(request)?;
        let body = merge_session_fields(
            request.body(),
            self.app_config.application_id().as_ref(),
            self.session.as_ref(),
        );
        let body = Value::Object(body);
        debug!(%url, %body, "sending request");

        let response = self
            .client
            .request(method(request.method()), url.clone())
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(IntoNetworkError::into_network)?;

        let status = response.status();
        if status.as_u16() >= 400 {
            warn!(%url, status = status.as_u16(), "request rejected");
            let detail = response.text().await.unwrap_or_default();
            debug!(body = %detail, "rejected response body");
            return Err(NetworkError::HttpStatus { status_code: status.as_u16() });
        }

        let bytes = response.bytes().await.map_err(IntoNetworkError::into_network)?;
        let parsed: Value = serde_json::from_slice(&bytes)
            .map_err(|e| NetworkError::malformed(format!("response is not valid JSON: {e}")))?;
        let Value::Object(object) = parsed else {
            return Err(NetworkError::malformed("response body is not a JSON object"));
        };

        let response = NetworkResponse::new(status.as_u16(), object);
        let update = apply_response_meta(response.meta(), self.session.as_ref());
        if update.session == SessionChange::Cleared {
            info!("server invalidated the session; local session data cleared");
        }
        debug!(status = status.as_u16(), ?update, "request completed");

        Ok(response)
    }

    fn resolve_url(&self, path: &str) -> Result<Url> {
        let base = self.base_url.read().clone();
        let joined = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let url = Url::parse(&joined)
            .map_err(|e| NetworkError::unsupported(format!("invalid request URL {joined}: {e}")))?;

        match url.scheme() {
            "https" => Ok(url),
            "http" if self.allow_plaintext => Ok(url),
            "http" => Err(NetworkError::unsupported(format!(
                "certificate pinning is unavailable over plaintext; refusing {url}"
            ))),
            other => Err(NetworkError::unsupported(format!("unsupported URL scheme '{other}'"))),
        }
    }

    fn headers(&self, request: &ApiRequest) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        headers.insert(ACCEPT, HeaderValue::from_static(CONTENT_TYPE_JSON));
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);

        for (name, value) in request.headers() {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                NetworkError::unsupported(format!("invalid header name {name:?}: {e}"))
            })?;
            headers.insert(name, header_value(value)?);
        }
        Ok(headers)
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &*self.base_url.read())
            .field("user_agent", &self.user_agent)
            .field("allow_plaintext", &self.allow_plaintext)
            .finish_non_exhaustive()
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Post => Method::POST,
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| NetworkError::unsupported(format!("invalid header value: {e}")))
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    Url::parse(base_url)
        .map_err(|e| NetworkError::unsupported(format!("invalid base URL {base_url:?}: {e}")))
}
