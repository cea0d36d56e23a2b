//! Certificate providers
//!
//! A provider is a named set of trust anchors (PEM certificates) plus the
//! base64 SHA-256 digests of their SubjectPublicKeyInfo ("pins"). The name is
//! only used to namespace trust-store aliases and error messages.

use std::collections::BTreeSet;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use pinpost_domain::{NetworkError, Result};
use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use x509_parser::prelude::{FromDer, X509Certificate};

const AMAZON_ROOT_CA_1: &str = include_str!("certs/amazon_root_ca_1.pem");
const AMAZON_ROOT_CA_2: &str = include_str!("certs/amazon_root_ca_2.pem");
const AMAZON_ROOT_CA_3: &str = include_str!("certs/amazon_root_ca_3.pem");

/// SPKI pins of Amazon Root CA 1, 2 and 3, in that order.
pub const AMAZON_ROOT_PINS: [&str; 3] = [
    "++MBgDH5WGvL9Bcn5Be30cRcL0f5O+NyoXuWtQdX1aI=",
    "f0KW/FtqTjs108NpYj42SrGvOB2PpxIVM8nWxjPqJGE=",
    "NqvDJlas/GRcYbcWE8S/IceH9cq77kg0jVhZeAPXq8k=",
];

/// A decoded trust anchor.
#[derive(Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    der: CertificateDer<'static>,
    subject: String,
    spki_pin: String,
}

impl ParsedCertificate {
    /// Decode a DER certificate and compute its pin.
    pub fn from_der(der: CertificateDer<'static>) -> std::result::Result<Self, String> {
        let (subject, spki_pin) = describe_certificate(der.as_ref())?;
        Ok(Self { der, subject, spki_pin })
    }

    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    /// RFC 4514 rendering of the subject name.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// base64(SHA-256(SubjectPublicKeyInfo))
    pub fn spki_pin(&self) -> &str {
        &self.spki_pin
    }
}

impl fmt::Debug for ParsedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedCertificate")
            .field("subject", &self.subject)
            .field("spki_pin", &self.spki_pin)
            .finish_non_exhaustive()
    }
}

/// Subject and SPKI pin of a DER certificate.
pub(crate) fn describe_certificate(der: &[u8]) -> std::result::Result<(String, String), String> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| e.to_string())?;
    let digest = Sha256::digest(cert.public_key().raw);
    Ok((cert.subject().to_string(), STANDARD.encode(digest)))
}

/// Named trust-anchor set with its pins.
pub trait CertificateProvider: Send + Sync {
    /// Namespace for trust-store aliases.
    fn name(&self) -> &str;

    /// One PEM certificate per entry, in order.
    fn pem_certificates(&self) -> Vec<&[u8]>;

    fn pins(&self) -> BTreeSet<String>;

    /// Decode every PEM entry.
    ///
    /// # Errors
    /// `NetworkError::CertificateFormat` naming the first malformed entry.
    fn certificate_chain(&self) -> Result<Vec<ParsedCertificate>> {
        self.pem_certificates()
            .into_iter()
            .enumerate()
            .map(|(index, pem)| parse_pem_entry(self.name(), index, pem))
            .collect()
    }
}

fn parse_pem_entry(provider: &str, index: usize, pem: &[u8]) -> Result<ParsedCertificate> {
    let format_error = |message: String| NetworkError::CertificateFormat {
        provider: provider.to_string(),
        index,
        message,
    };

    let mut reader = pem;
    let mut certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format_error(e.to_string()))?;

    if certs.len() != 1 {
        return Err(format_error(format!("expected one certificate, found {}", certs.len())));
    }
    let der = certs.remove(0);
    ParsedCertificate::from_der(der).map_err(format_error)
}

/// Pins for every certificate that parses. Malformed entries contribute
/// nothing; they surface through [`CertificateProvider::certificate_chain`].
fn derived_pins(provider: &dyn CertificateProvider) -> BTreeSet<String> {
    provider
        .certificate_chain()
        .map(|chain| chain.iter().map(|c| c.spki_pin().to_string()).collect())
        .unwrap_or_default()
}

/// Production anchors: Amazon Root CA 1-3.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmazonRootsProvider;

impl AmazonRootsProvider {
    pub const NAME: &'static str = "amazon";

    pub fn new() -> Self {
        Self
    }
}

impl CertificateProvider for AmazonRootsProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn pem_certificates(&self) -> Vec<&[u8]> {
        vec![AMAZON_ROOT_CA_1.as_bytes(), AMAZON_ROOT_CA_2.as_bytes(), AMAZON_ROOT_CA_3.as_bytes()]
    }

    fn pins(&self) -> BTreeSet<String> {
        AMAZON_ROOT_PINS.iter().map(|p| (*p).to_string()).collect()
    }
}

/// Arbitrary PEM anchors, e.g. a local or staging CA.
///
/// Pins are derived from the certificates unless supplied explicitly with
/// [`PemCertificateProvider::with_pins`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemCertificateProvider {
    name: String,
    certificates: Vec<Vec<u8>>,
    pins: Option<BTreeSet<String>>,
}

impl PemCertificateProvider {
    pub fn new(name: impl Into<String>, certificates: Vec<Vec<u8>>) -> Self {
        Self { name: name.into(), certificates, pins: None }
    }

    /// Use `pins` instead of the digests of `certificates`.
    pub fn with_pins(
        name: impl Into<String>,
        certificates: Vec<Vec<u8>>,
        pins: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            certificates,
            pins: Some(pins.into_iter().map(Into::into).collect()),
        }
    }

    /// Read each file as one PEM entry.
    ///
    /// # Errors
    /// `NetworkError::TrustStore` if a file cannot be read.
    pub fn from_files<P: AsRef<std::path::Path>>(
        name: impl Into<String>,
        paths: &[P],
    ) -> Result<Self> {
        let certificates = paths
            .iter()
            .map(|path| {
                std::fs::read(path.as_ref()).map_err(|e| {
                    NetworkError::trust_store(format!(
                        "failed to read certificate {}: {e}",
                        path.as_ref().display()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(name, certificates))
    }
}

impl CertificateProvider for PemCertificateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn pem_certificates(&self) -> Vec<&[u8]> {
        self.certificates.iter().map(Vec::as_slice).collect()
    }

    fn pins(&self) -> BTreeSet<String> {
        match &self.pins {
            Some(pins) => pins.clone(),
            None => derived_pins(self),
        }
    }
}
