//! Error conversions from infrastructure crates into [`NetworkError`].
//!
//! [`NetworkError`]: pinpost_domain::NetworkError

pub mod conversions;

pub use conversions::{find_pin_failure, IntoNetworkError};
