//! Pinned TLS trust context construction.
//!
//! The trust store holds only the provider's anchors; the platform's default
//! CA set is never consulted. Contexts are cached per (provider identity,
//! secret) and rebuilt when either changes.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::Mutex;
use pinpost_domain::{NetworkError, Result};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, RootCertStore};
use tracing::{debug, info, instrument, warn};

use super::pin_validator::PinnedServerVerifier;
use super::provider::{CertificateProvider, ParsedCertificate};

/// Optional secret protecting the trust material.
///
/// It takes part in cache identity only and is never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct TrustSecret(String);

impl TrustSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }
}

impl fmt::Debug for TrustSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TrustSecret(<redacted>)")
    }
}

/// A trust anchor stored under `"{provider}_{index}"`.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    pub alias: String,
    pub certificate: ParsedCertificate,
}

/// Immutable pinned TLS context.
pub struct TrustContext {
    provider_name: String,
    anchors: Vec<TrustAnchor>,
    pins: Arc<BTreeSet<String>>,
    tls_config: Arc<ClientConfig>,
}

impl TrustContext {
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn anchors(&self) -> &[TrustAnchor] {
        &self.anchors
    }

    pub fn pins(&self) -> &BTreeSet<String> {
        &self.pins
    }

    /// rustls client configuration with the pinning verifier installed.
    pub fn tls_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.tls_config)
    }
}

impl fmt::Debug for TrustContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustContext")
            .field("provider_name", &self.provider_name)
            .field("anchors", &self.anchors)
            .field("pins", &self.pins)
            .finish_non_exhaustive()
    }
}

#[derive(PartialEq, Eq)]
struct CacheKey {
    provider_name: String,
    certificates: Vec<Vec<u8>>,
    pins: BTreeSet<String>,
    secret: Option<TrustSecret>,
}

impl CacheKey {
    fn new(provider: &dyn CertificateProvider, secret: Option<&TrustSecret>) -> Self {
        Self {
            provider_name: provider.name().to_string(),
            certificates: provider.pem_certificates().into_iter().map(<[u8]>::to_vec).collect(),
            pins: provider.pins(),
            secret: secret.cloned(),
        }
    }
}

/// Builds and caches [`TrustContext`]s.
#[derive(Default)]
pub struct TrustContextBuilder {
    cached: Mutex<Option<(CacheKey, Arc<TrustContext>)>>,
}

impl TrustContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached context for `(provider, secret)` or build a new one.
    ///
    /// A previously returned context stays usable; it is simply no longer
    /// handed out once the inputs change.
    ///
    /// # Errors
    /// - `CertificateFormat` if a provider certificate is malformed
    /// - `TrustStore` if the provider has no certificates, its pins are
    ///   inconsistent with its anchors, or rustls rejects the material
    pub fn build(
        &self,
        provider: &dyn CertificateProvider,
        secret: Option<&TrustSecret>,
    ) -> Result<Arc<TrustContext>> {
        let key = CacheKey::new(provider, secret);
        let mut cached = self.cached.lock();

        if let Some((cached_key, context)) = cached.as_ref() {
            if *cached_key == key {
                debug!(provider = provider.name(), "reusing cached trust context");
                return Ok(Arc::clone(context));
            }
        }

        let context = Arc::new(build_context(provider)?);
        *cached = Some((key, Arc::clone(&context)));
        Ok(context)
    }
}

impl fmt::Debug for TrustContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustContextBuilder")
            .field("cached", &self.cached.lock().is_some())
            .finish()
    }
}

#[instrument(skip_all, fields(provider = provider.name()))]
fn build_context(provider: &dyn CertificateProvider) -> Result<TrustContext> {
    let chain = provider.certificate_chain()?;
    if chain.is_empty() {
        return Err(NetworkError::trust_store(format!(
            "provider '{}' supplied no certificates; refusing to pin to an empty anchor set",
            provider.name()
        )));
    }

    let pins = provider.pins();
    check_pin_consistency(provider.name(), &chain, &pins)?;

    let mut roots = RootCertStore::empty();
    let mut anchors = Vec::with_capacity(chain.len());
    for (index, certificate) in chain.into_iter().enumerate() {
        let alias = format!("{}_{}", provider.name(), index);
        roots.add(certificate.der().clone()).map_err(|e| {
            NetworkError::trust_store(format!("failed to add trust anchor {alias}: {e}"))
        })?;
        debug!(%alias, subject = certificate.subject(), "added trust anchor");
        anchors.push(TrustAnchor { alias, certificate });
    }

    let crypto = Arc::new(rustls::crypto::ring::default_provider());
    let tls_config = client_config(roots, &anchors, Arc::new(pins.clone()), crypto)?;

    info!(anchors = anchors.len(), pins = pins.len(), "built pinned trust context");

    Ok(TrustContext {
        provider_name: provider.name().to_string(),
        anchors,
        pins: Arc::new(pins),
        tls_config: Arc::new(tls_config),
    })
}

fn client_config(
    roots: RootCertStore,
    anchors: &[TrustAnchor],
    pins: Arc<BTreeSet<String>>,
    crypto: Arc<CryptoProvider>,
) -> Result<ClientConfig> {
    let path_roots = roots.roots.clone();
    let algorithms = crypto.signature_verification_algorithms.all;
    let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&crypto))
        .build()
        .map_err(|e| NetworkError::trust_store(format!("failed to build verifier: {e}")))?;

    let verifier = PinnedServerVerifier::new(
        webpki,
        path_roots,
        anchors.iter().map(|a| a.certificate.clone()).collect(),
        algorithms,
        pins,
    );

    let config = ClientConfig::builder_with_provider(crypto)
        .with_safe_default_protocol_versions()
        .map_err(|e| NetworkError::trust_store(format!("unsupported protocol versions: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Ok(config)
}

/// Pins must be well-formed SHA-256 digests and at least one of them must
/// belong to the provider's own anchors.
fn check_pin_consistency(
    provider: &str,
    chain: &[ParsedCertificate],
    pins: &BTreeSet<String>,
) -> Result<()> {
    if pins.is_empty() {
        return Err(NetworkError::trust_store(format!("provider '{provider}' has no pins")));
    }

    for pin in pins {
        let decoded = STANDARD.decode(pin).map_err(|e| {
            NetworkError::trust_store(format!("pin {pin:?} is not valid base64: {e}"))
        })?;
        if decoded.len() != 32 {
            return Err(NetworkError::trust_store(format!(
                "pin {pin:?} is {} bytes, expected a 32-byte SHA-256 digest",
                decoded.len()
            )));
        }
    }

    let anchor_pins: BTreeSet<&str> = chain.iter().map(ParsedCertificate::spki_pin).collect();
    if !pins.iter().any(|p| anchor_pins.contains(p.as_str())) {
        return Err(NetworkError::trust_store(format!(
            "none of the pins of provider '{provider}' match its trust anchors"
        )));
    }

    let extra = pins.iter().filter(|p| !anchor_pins.contains(p.as_str())).count();
    if extra > 0 {
        warn!(provider, extra, "pin set includes keys that are not trust anchors");
    }
    Ok(())
}
