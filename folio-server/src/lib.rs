pub mod config;
pub mod github;
pub mod handlers;
pub mod provisioner;
pub mod store;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::broadcast;

use folio_core::retry::RetryEvent;

use crate::github::GitHubClient;
use crate::store::RecordStore;

pub struct AppState {
    pub store: RecordStore<GitHubClient>,
    pub verification_secret: String,
    pub verification_ttl: Duration,
    /// Bearer token required for admin/ban mutations. When unset, those
    /// routes answer 403 for every request.
    pub admin_auth_token: Option<String>,
    pub retry_events: broadcast::Sender<RetryEvent>,
}

pub type SharedState = Arc<AppState>;

pub fn service_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
