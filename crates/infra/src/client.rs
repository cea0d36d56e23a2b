//! `ApiClient`: the context object that wires the transport together.
//!
//! One client owns the application configuration, the session store, the
//! pinned trust context, the executor, the retry settings and the task
//! queue. Build as many as needed; nothing here is global.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pinpost_domain::{ApiRequest, NetworkError, NetworkResponse, TransportConfig};
//! use pinpost_infra::ApiClient;
//!
//! struct Log;
//!
//! impl pinpost_core::Listener<NetworkResponse> for Log {
//!     fn on_complete(&self, response: NetworkResponse) {
//!         tracing::info!(status = response.status_code, "order reported");
//!     }
//!
//!     fn on_error(&self, error: NetworkError) {
//!         tracing::warn!(%error, "order not reported");
//!     }
//! }
//!
//! # async fn example() -> Result<(), NetworkError> {
//! let client = ApiClient::builder().config(TransportConfig::default()).build()?;
//! client.post(ApiRequest::post("/v1/activity/order").field("order_id", "abc").build(), Arc::new(Log));
//! client.configure("app-123abc")?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use pinpost_common::{RetryError, RetryExecutor};
use pinpost_core::{AppConfig, AttributionListener, KeyValueSessionStore, Listener, SessionStore};
use pinpost_domain::{ApiRequest, ApplicationId, NetworkError, NetworkResponse, Result, TransportConfig};
use tracing::{debug, info};

use crate::http::{
    execute_with_retry, retry_config, send_with_retry, NetworkRetryPolicy, PostTask, RequestExecutor,
};
use crate::queue::TaskQueue;
use crate::tls::{AmazonRootsProvider, CertificateProvider, TrustContext, TrustContextBuilder, TrustSecret};

/// Builder for [`ApiClient`].
#[derive(Default)]
pub struct ApiClientBuilder {
    config: Option<TransportConfig>,
    provider: Option<Arc<dyn CertificateProvider>>,
    secret: Option<TrustSecret>,
    session: Option<Arc<dyn SessionStore>>,
}

impl ApiClientBuilder {
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Trust anchors and pins. Defaults to [`AmazonRootsProvider`].
    pub fn certificate_provider(mut self, provider: Arc<dyn CertificateProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn trust_secret(mut self, secret: TrustSecret) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Where session state lives. Defaults to an in-memory store.
    pub fn session_store(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    /// Build the client and start its task queue. Must run inside a Tokio
    /// runtime.
    ///
    /// # Errors
    /// - `Unsupported` for an invalid configuration or a missing runtime
    /// - `TrustStore` / `CertificateFormat` if the trust context cannot be built
    /// - `InvalidApplicationId` if the configured application id is malformed
    pub fn build(self) -> Result<ApiClient> {
        let config = self.config.unwrap_or_default();
        config
            .validate()
            .map_err(|e| NetworkError::unsupported(format!("invalid transport configuration: {e}")))?;

        let provider = self.provider.unwrap_or_else(|| Arc::new(AmazonRootsProvider::new()));
        let trust_builder = TrustContextBuilder::new();
        let trust = trust_builder.build(provider.as_ref(), self.secret.as_ref())?;

        let app_config = Arc::new(AppConfig::new());
        let session = self
            .session
            .unwrap_or_else(|| Arc::new(KeyValueSessionStore::in_memory()));

        let executor = Arc::new(RequestExecutor::new(
            &config,
            &trust,
            Arc::clone(&app_config),
            Arc::clone(&session),
        )?);
        let retry = Arc::new(RetryExecutor::new(retry_config(&config), NetworkRetryPolicy));
        let queue = TaskQueue::new(config.worker_count, Arc::clone(&app_config))?;

        if let Some(application_id) = config.application_id.as_deref() {
            queue.set_application_id(application_id)?;
        }

        info!(
            provider = trust.provider_name(),
            anchors = trust.anchors().len(),
            base_url = %config.base_url,
            workers = config.worker_count,
            "api client ready"
        );

        Ok(ApiClient {
            app_config,
            session,
            trust_builder,
            trust,
            executor,
            retry,
            queue,
            attribution_listeners: RwLock::new(Vec::new()),
        })
    }
}

/// Pinned, retrying, session-aware API client.
pub struct ApiClient {
    app_config: Arc<AppConfig>,
    session: Arc<dyn SessionStore>,
    trust_builder: TrustContextBuilder,
    trust: Arc<TrustContext>,
    executor: Arc<RequestExecutor>,
    retry: Arc<RetryExecutor<NetworkRetryPolicy>>,
    queue: TaskQueue,
    attribution_listeners: RwLock<Vec<Arc<dyn AttributionListener>>>,
}

impl ApiClient {
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Set the application id and release requests that were waiting for it.
    ///
    /// # Errors
    /// `InvalidApplicationId`; queued requests stay queued.
    pub fn configure(&self, application_id: &str) -> Result<ApplicationId> {
        self.queue.set_application_id(application_id)
    }

    pub fn application_id(&self) -> Option<ApplicationId> {
        self.app_config.application_id()
    }

    /// Queue `request`; it is sent (with retries) once an application id is
    /// configured.
    pub fn post(&self, request: ApiRequest, listener: Arc<dyn Listener<NetworkResponse>>) {
        self.queue.submit_task(self.post_task(request), listener, false);
    }

    /// Like [`ApiClient::post`] but skips the configuration gate.
    pub fn post_immediately(&self, request: ApiRequest, listener: Arc<dyn Listener<NetworkResponse>>) {
        self.queue.submit_task(self.post_task(request), listener, true);
    }

    /// Send `request` on the caller's task, with retries, bypassing the queue.
    pub async fn post_now(&self, request: &ApiRequest) -> Result<NetworkResponse> {
        execute_with_retry(&self.executor, &self.retry, request).await
    }

    /// [`ApiClient::post_now`] keeping the retry verdict: whether the
    /// attempts ran out or the failure was permanent, and how many were made.
    pub async fn try_post_now(
        &self,
        request: &ApiRequest,
    ) -> std::result::Result<NetworkResponse, RetryError<NetworkError>> {
        send_with_retry(&self.executor, &self.retry, request).await
    }

    fn post_task(&self, request: ApiRequest) -> PostTask {
        PostTask::new(Arc::clone(&self.executor), Arc::clone(&self.retry), request)
    }

    pub fn source_token(&self) -> Option<String> {
        self.session.source_token()
    }

    /// Store an attribution token. Empty tokens are ignored; listeners hear
    /// about the token only when it differs from the stored one.
    pub fn set_source_token(&self, token: &str) {
        if token.is_empty() {
            debug!("ignoring empty source token");
            return;
        }

        let changed = self.session.source_token().as_deref() != Some(token);
        self.session.set_source_token(token);

        if changed {
            let listeners = self.attribution_listeners.read().clone();
            debug!(listeners = listeners.len(), "source token changed");
            for listener in listeners {
                listener.on_attribution_changed(token);
            }
        }
    }

    pub fn add_attribution_listener(&self, listener: Arc<dyn AttributionListener>) {
        self.attribution_listeners.write().push(listener);
    }

    /// Returns whether `listener` was registered.
    pub fn remove_attribution_listener(&self, listener: &Arc<dyn AttributionListener>) -> bool {
        let mut listeners = self.attribution_listeners.write();
        let before = listeners.len();
        listeners.retain(|registered| !Arc::ptr_eq(registered, listener));
        listeners.len() != before
    }

    /// Forget the session id, source token and deferred-link flag. The
    /// application id is kept.
    pub fn clear_all_data(&self) {
        info!("clearing session data");
        self.session.clear_all_data();
    }

    /// Switch environments for subsequent requests.
    ///
    /// # Errors
    /// `Unsupported` if `base_url` does not parse.
    pub fn set_base_url(&self, base_url: impl Into<String>) -> Result<()> {
        self.executor.set_base_url(base_url)
    }

    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    pub fn trust_context(&self) -> &Arc<TrustContext> {
        &self.trust
    }

    /// Rebuild the trust context for a new provider or secret.
    ///
    /// The running executor keeps its context; use this to validate a
    /// candidate provider before building a new client with it.
    ///
    /// # Errors
    /// Same as [`TrustContextBuilder::build`].
    pub fn rebuild_trust(
        &self,
        provider: &dyn CertificateProvider,
        secret: Option<&TrustSecret>,
    ) -> Result<Arc<TrustContext>> {
        self.trust_builder.build(provider, secret)
    }

    /// Requests still waiting for an application id.
    pub fn pending_requests(&self) -> usize {
        self.queue.backlog_len()
    }

    /// Stop the task queue. See [`TaskQueue::shutdown`].
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.queue.shutdown(timeout).await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("application_id", &self.app_config.application_id())
            .field("executor", &self.executor)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::tls::PemCertificateProvider;

    const ROOT: &str = include_str!("../tests/fixtures/root.pem");

    #[derive(Default)]
    struct Recorder {
        tokens: Mutex<Vec<String>>,
    }

    impl AttributionListener for Recorder {
        fn on_attribution_changed(&self, source_token: &str) {
            self.tokens.lock().push(source_token.to_string());
        }
    }

    fn client() -> ApiClient {
        ApiClient::builder()
            .certificate_provider(Arc::new(PemCertificateProvider::new(
                "local",
                vec![ROOT.as_bytes().to_vec()],
            )))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_source_token_notifies_only_on_change() {
        let client = client();
        let recorder = Arc::new(Recorder::default());
        client.add_attribution_listener(recorder.clone());

        client.set_source_token("srctok-1");
        client.set_source_token("srctok-1");
        client.set_source_token("");
        client.set_source_token("srctok-2");

        assert_eq!(*recorder.tokens.lock(), vec!["srctok-1", "srctok-2"]);
        assert_eq!(client.source_token().as_deref(), Some("srctok-2"));
    }

    #[tokio::test]
    async fn test_removed_listener_is_not_notified() {
        let client = client();
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn AttributionListener> = recorder.clone();
        client.add_attribution_listener(Arc::clone(&listener));

        assert!(client.remove_attribution_listener(&listener));
        assert!(!client.remove_attribution_listener(&listener));
        client.set_source_token("srctok-1");

        assert!(recorder.tokens.lock().is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_data_keeps_application_id() {
        let client = client();
        client.configure("app-123").unwrap();
        client.set_source_token("srctok-1");
        client.session_store().set_session_id("sess-1");

        client.clear_all_data();

        assert_eq!(client.source_token(), None);
        assert_eq!(client.session_store().session_id(), None);
        assert_eq!(client.application_id().unwrap().as_str(), "app-123");
    }

    #[tokio::test]
    async fn test_configured_application_id_opens_gate() {
        let client = ApiClient::builder()
            .config(TransportConfig {
                application_id: Some("app-abc".into()),
                ..TransportConfig::default()
            })
            .certificate_provider(Arc::new(PemCertificateProvider::new(
                "local",
                vec![ROOT.as_bytes().to_vec()],
            )))
            .build()
            .unwrap();

        assert_eq!(client.application_id().unwrap().as_str(), "app-abc");
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_build_rejects_bad_configuration() {
        let zero_workers = ApiClient::builder()
            .config(TransportConfig { worker_count: 0, ..TransportConfig::default() })
            .build();
        assert!(matches!(zero_workers, Err(NetworkError::Unsupported { .. })));

        let bad_id = ApiClient::builder()
            .config(TransportConfig {
                application_id: Some("nope".into()),
                ..TransportConfig::default()
            })
            .build();
        assert!(matches!(bad_id, Err(NetworkError::InvalidApplicationId { .. })));
    }

    #[tokio::test]
    async fn test_rebuild_trust_reuses_cached_context() {
        let client = client();
        let provider = PemCertificateProvider::new("local", vec![ROOT.as_bytes().to_vec()]);

        let first = client.rebuild_trust(&provider, None).unwrap();
        let second = client.rebuild_trust(&provider, None).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.provider_name(), "local");
    }

    #[tokio::test]
    async fn test_pending_requests_count_until_configured() {
        struct Ignore(AtomicUsize);

        impl Listener<NetworkResponse> for Ignore {
            fn on_complete(&self, _: NetworkResponse) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }

            fn on_error(&self, _: NetworkError) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let client = client();
        let listener = Arc::new(Ignore(AtomicUsize::new(0)));
        client.post(ApiRequest::post("/v1/activity/order").build(), listener.clone());
        client.post(ApiRequest::post("/v1/activity/order").build(), listener.clone());

        assert_eq!(client.pending_requests(), 2);
        assert!(client.shutdown(Duration::from_secs(1)).await);
        assert_eq!(listener.0.load(Ordering::SeqCst), 2);
    }
}
