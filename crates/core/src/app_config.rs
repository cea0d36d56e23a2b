//! In-memory application configuration shared by every worker.

use parking_lot::RwLock;
use pinpost_domain::ApplicationId;

/// Holds the application id once the host has configured it.
///
/// Readers take a snapshot; the id is never observed half-written.
#[derive(Debug, Default)]
pub struct AppConfig {
    application_id: RwLock<Option<ApplicationId>>,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_application_id(id: ApplicationId) -> Self {
        Self { application_id: RwLock::new(Some(id)) }
    }

    pub fn application_id(&self) -> Option<ApplicationId> {
        self.application_id.read().clone()
    }

    /// Returns the previous id, if any.
    pub fn set_application_id(&self, id: ApplicationId) -> Option<ApplicationId> {
        self.application_id.write().replace(id)
    }

    pub fn is_configured(&self) -> bool {
        self.application_id.read().is_some()
    }
}
