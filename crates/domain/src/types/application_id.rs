//! Validated application identifier

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::APPLICATION_ID_PATTERN;
use crate::errors::{NetworkError, Result};

static APPLICATION_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(APPLICATION_ID_PATTERN).expect("APPLICATION_ID_RE should compile - this is a bug")
});

/// Identifier issued to an integrating application, e.g. `app-1a2b3c`.
///
/// Only values matching `^app-[0-9a-zA-Z]+$` can be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if APPLICATION_ID_RE.is_match(&value) {
            Ok(Self(value))
        } else {
            Err(NetworkError::InvalidApplicationId { value })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ApplicationId {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ApplicationId> for String {
    fn from(id: ApplicationId) -> Self {
        id.0
    }
}

impl AsRef<str> for ApplicationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
