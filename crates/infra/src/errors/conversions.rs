//! Conversions from external infrastructure errors into domain errors.

use std::error::Error as StdError;

use pinpost_domain::NetworkError;
use reqwest::Error as HttpError;
use rustls::{Error as TlsError, OtherError};

use crate::tls::PinValidationFailure;

/// Extension trait to make the conversion logic explicit at call sites.
pub trait IntoNetworkError {
    fn into_network(self) -> NetworkError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → NetworkError */
/* -------------------------------------------------------------------------- */

impl IntoNetworkError for HttpError {
    fn into_network(self) -> NetworkError {
        if let Some(failure) = find_pin_failure(&self) {
            return NetworkError::PinValidation { message: failure.report() };
        }

        if let Some(tls) = find_certificate_error(&self) {
            return NetworkError::PinValidation {
                message: format!("server certificate rejected: {tls}"),
            };
        }

        if self.is_timeout() {
            return NetworkError::transport(format!("request timed out: {}", describe(&self)));
        }

        if self.is_connect() {
            return NetworkError::transport(format!("connection failed: {}", describe(&self)));
        }

        if self.is_builder() {
            return NetworkError::unsupported(format!("invalid request: {}", describe(&self)));
        }

        if self.is_decode() {
            return NetworkError::malformed(describe(&self));
        }

        if let Some(status) = self.status() {
            return NetworkError::HttpStatus { status_code: status.as_u16() };
        }

        NetworkError::transport(describe(&self))
    }
}

/// Walk the source chain (including errors boxed inside `io::Error`) looking
/// for a pin mismatch raised by the verifier.
pub fn find_pin_failure(error: &(dyn StdError + 'static)) -> Option<PinValidationFailure> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(failure) = err.downcast_ref::<PinValidationFailure>() {
            return Some(failure.clone());
        }
        if let Some(TlsError::Other(OtherError(inner))) = err.downcast_ref::<TlsError>() {
            if let Some(failure) = inner.as_ref().downcast_ref::<PinValidationFailure>() {
                return Some(failure.clone());
            }
        }
        if let Some(inner) = io_inner(err) {
            if let Some(failure) = find_pin_failure(inner) {
                return Some(failure);
            }
        }
        current = err.source();
    }
    None
}

/// A rustls certificate rejection (unknown issuer, expired, wrong host).
fn find_certificate_error(error: &(dyn StdError + 'static)) -> Option<TlsError> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(tls) = err.downcast_ref::<TlsError>() {
            if matches!(tls, TlsError::InvalidCertificate(_)) {
                return Some(tls.clone());
            }
        }
        if let Some(inner) = io_inner(err) {
            if let Some(found) = find_certificate_error(inner) {
                return Some(found);
            }
        }
        current = err.source();
    }
    None
}

fn io_inner<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a (dyn StdError + 'static)> {
    let io = err.downcast_ref::<std::io::Error>()?;
    let inner: &(dyn StdError + 'static) = io.get_ref()?;
    Some(inner)
}

/// Error text with its causes, `a: b: c`.
fn describe(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(cause) = current {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        current = cause.source();
    }
    message
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
