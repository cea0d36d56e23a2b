//! Session continuity: persisted identifiers echoed on every request and
//! refreshed from every response.

pub mod continuity;
pub mod key_value;
pub mod ports;
