//! Pinned TLS: certificate providers, the trust context and the verifier
//! that enforces public-key pins on every handshake.

pub mod pin_validator;
pub mod provider;
pub mod trust_context;

pub use pin_validator::{ChainEntry, PinValidationFailure, PinValidator, PinnedServerVerifier};
pub use provider::{
    AmazonRootsProvider, CertificateProvider, ParsedCertificate, PemCertificateProvider,
    AMAZON_ROOT_PINS,
};
pub use trust_context::{TrustAnchor, TrustContext, TrustContextBuilder, TrustSecret};
