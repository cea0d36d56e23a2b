//! Example: posting an event through the pinned transport
//!
//! Builds an `ApiClient` from the environment (or a `pinpost.toml`), queues a
//! request before the application id is known, then configures the id and
//! waits for the outcome.
//!
//! # Usage
//!
//! ```bash
//! export PINPOST_BASE_URL=https://api.usebutton.com
//! export PINPOST_LOG=pinpost_infra=debug
//! cargo run --example post_event -- app-123abc
//! ```
//!
//! Set `PINPOST_CA_CERT=/path/to/root.pem` to trust a local CA instead of
//! the built-in Amazon roots.

use std::sync::Arc;
use std::time::Duration;

use pinpost_core::Listener;
use pinpost_domain::{ApiRequest, NetworkError, NetworkResponse};
use pinpost_infra::{config, observability, ApiClient, PemCertificateProvider};
use tokio::sync::oneshot;

struct Reply(parking_lot::Mutex<Option<oneshot::Sender<Result<NetworkResponse, NetworkError>>>>);

impl Listener<NetworkResponse> for Reply {
    fn on_complete(&self, response: NetworkResponse) {
        if let Some(tx) = self.0.lock().take() {
            let _ = tx.send(Ok(response));
        }
    }

    fn on_error(&self, error: NetworkError) {
        if let Some(tx) = self.0.lock().take() {
            let _ = tx.send(Err(error));
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_tracing("info");

    let application_id = std::env::args().nth(1).unwrap_or_else(|| "app-example".to_string());
    let config = config::load()?;

    let mut builder = ApiClient::builder().config(config);
    if let Ok(ca_cert) = std::env::var("PINPOST_CA_CERT") {
        tracing::info!(%ca_cert, "trusting local CA");
        builder = builder
            .certificate_provider(Arc::new(PemCertificateProvider::from_files("local", &[ca_cert])?));
    }
    let client = builder.build()?;

    let (tx, rx) = oneshot::channel();
    let request = ApiRequest::post("/v1/app/events")
        .field("name", "example-event")
        .field("value", 1)
        .build();
    client.post(request, Arc::new(Reply(parking_lot::Mutex::new(Some(tx)))));
    tracing::info!(pending = client.pending_requests(), "request queued until configured");

    client.configure(&application_id)?;

    match rx.await? {
        Ok(response) => tracing::info!(status = response.status_code, body = ?response.body, "delivered"),
        Err(error) => tracing::warn!(%error, "delivery failed"),
    }

    client.shutdown(Duration::from_secs(5)).await;
    Ok(())
}
