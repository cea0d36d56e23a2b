//! Public-key pin validation.
//!
//! Runs after the standard WebPKI chain and hostname checks succeeded. The
//! path WebPKI validated (leaf first, anchor last) is taken from the path
//! builder itself, never reconstructed by name, and each certificate's SPKI
//! digest is tested against the pin set. The first match accepts the connection; no
//! match fails the handshake, so not a single request byte is written.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{
    CertificateDer, ServerName, SignatureVerificationAlgorithm, TrustAnchor, UnixTime,
};
use rustls::{CertificateError, DigitallySignedStruct, OtherError, SignatureScheme};
use tracing::{debug, warn};

use super::provider::{describe_certificate, ParsedCertificate};

/// One certificate of a chain that failed pin validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub subject: String,
    pub spki_pin: String,
}

/// No certificate in the verified chain matched a pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinValidationFailure {
    pub chain: Vec<ChainEntry>,
    pub pins: Vec<String>,
}

impl PinValidationFailure {
    /// Human-readable dump of the chain and the pins tried.
    pub fn report(&self) -> String {
        let mut out = String::from("certificate chain matched no configured pin");
        for (position, entry) in self.chain.iter().enumerate() {
            out.push_str(&format!(
                "\n  [{position}] subject: {}\n      sha256/{}",
                entry.subject, entry.spki_pin
            ));
        }
        out.push_str("\n  pins:");
        for pin in &self.pins {
            out.push_str(&format!("\n    sha256/{pin}"));
        }
        out
    }
}

impl fmt::Display for PinValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.report())
    }
}

impl std::error::Error for PinValidationFailure {}

/// Pure pin check over an ordered chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct PinValidator;

impl PinValidator {
    /// Succeed as soon as any certificate's SPKI digest is in `pins`.
    ///
    /// `chain` is ordered leaf first. Certificates that cannot be decoded
    /// never match.
    pub fn validate(
        chain: &[CertificateDer<'_>],
        pins: &BTreeSet<String>,
    ) -> Result<(), PinValidationFailure> {
        let mut tried = Vec::with_capacity(chain.len());

        for (position, cert) in chain.iter().enumerate() {
            let (subject, spki_pin) = describe_certificate(cert.as_ref())
                .unwrap_or_else(|e| ("<undecodable certificate>".to_string(), format!("<{e}>")));
            if pins.contains(&spki_pin) {
                debug!(position, %subject, "certificate pin matched");
                return Ok(());
            }
            tried.push(ChainEntry { subject, spki_pin });
        }

        Err(PinValidationFailure { chain: tried, pins: pins.iter().cloned().collect() })
    }
}

/// The path WebPKI validates for `end_entity`: leaf, the intermediates it
/// actually chained through, then the anchor certificate.
///
/// `roots` and `anchors` are parallel: `roots[i]` was derived from
/// `anchors[i]`.
pub(crate) fn verified_chain(
    end_entity: &CertificateDer<'_>,
    intermediates: &[CertificateDer<'_>],
    roots: &[TrustAnchor<'static>],
    anchors: &[ParsedCertificate],
    algorithms: &[&dyn SignatureVerificationAlgorithm],
    now: UnixTime,
) -> Result<Vec<CertificateDer<'static>>, webpki::Error> {
    let leaf = webpki::EndEntityCert::try_from(end_entity)?;
    let path = leaf.verify_for_usage(
        algorithms,
        roots,
        intermediates,
        now,
        webpki::KeyUsage::server_auth(),
        None,
        None,
    )?;

    let mut chain = vec![end_entity.clone().into_owned()];
    chain.extend(path.intermediate_certificates().map(|cert| cert.der().into_owned()));

    let anchor = path.anchor();
    let matched = roots
        .iter()
        .position(|root| {
            root.subject.as_ref() == anchor.subject.as_ref()
                && root.subject_public_key_info.as_ref() == anchor.subject_public_key_info.as_ref()
        })
        .and_then(|index| anchors.get(index));
    if let Some(certificate) = matched {
        if chain.last() != Some(certificate.der()) {
            chain.push(certificate.der().clone());
        }
    }

    Ok(chain)
}

/// rustls verifier enforcing WebPKI validation followed by pin validation.
pub struct PinnedServerVerifier {
    inner: Arc<WebPkiServerVerifier>,
    roots: Vec<TrustAnchor<'static>>,
    anchors: Vec<ParsedCertificate>,
    algorithms: &'static [&'static dyn SignatureVerificationAlgorithm],
    pins: Arc<BTreeSet<String>>,
}

impl PinnedServerVerifier {
    /// `roots[i]` must be the trust anchor derived from `anchors[i]`.
    pub fn new(
        inner: Arc<WebPkiServerVerifier>,
        roots: Vec<TrustAnchor<'static>>,
        anchors: Vec<ParsedCertificate>,
        algorithms: &'static [&'static dyn SignatureVerificationAlgorithm],
        pins: Arc<BTreeSet<String>>,
    ) -> Self {
        Self { inner, roots, anchors, algorithms, pins }
    }
}

impl fmt::Debug for PinnedServerVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedServerVerifier")
            .field("anchors", &self.anchors.len())
            .field("pins", &self.pins)
            .finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PinnedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verified = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        )?;

        let chain = verified_chain(
            end_entity,
            intermediates,
            &self.roots,
            &self.anchors,
            self.algorithms,
            now,
        )
        .map_err(|e| {
            warn!(server = ?server_name, error = %e, "could not recover verified path");
            rustls::Error::InvalidCertificate(CertificateError::Other(OtherError(Arc::new(e))))
        })?;
        match PinValidator::validate(&chain, &self.pins) {
            Ok(()) => Ok(verified),
            Err(failure) => {
                warn!(
                    server = ?server_name,
                    chain_length = chain.len(),
                    "rejecting connection: {}",
                    failure.report()
                );
                Err(rustls::Error::Other(OtherError(Arc::new(failure))))
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
