//! Read-modify-write record operations on index-issue bodies.
//!
//! A record lives as a JSON payload fenced inside its index issue's body
//! (verification codes use one comment per entry instead, see
//! [`verification`]). There is no optimistic-concurrency token on updates:
//! concurrent writers to the same record are last-writer-wins, which the
//! 5-second provisioner cache and the small write surface make acceptable.
//! Record operations are not retried here; callers wrap them in the retry
//! engine.

pub mod achievements;
pub mod admins;
pub mod bans;
pub mod verification;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use folio_core::error::{ApiError, StatusCarrier};
use folio_core::payload::{self, ExtractedPayload};

use crate::github::{Issue, IssueHost};
use crate::provisioner::{IssueKind, IssueProvisioner};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Domain rule violation. Never retried: repeating the request cannot
    /// change a business-rule outcome.
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("failed to serialize record payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl StatusCarrier for StoreError {
    fn status(&self) -> Option<u16> {
        match self {
            Self::Api(e) => e.status(),
            Self::Forbidden(_) | Self::Serialize(_) => None,
        }
    }
}

/// Record operations over a provisioned set of index issues.
pub struct RecordStore<H: IssueHost + ?Sized> {
    host: Arc<H>,
    provisioner: IssueProvisioner<H>,
}

impl<H: IssueHost + ?Sized> RecordStore<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            provisioner: IssueProvisioner::new(host.clone()),
            host,
        }
    }

    pub fn provisioner(&self) -> &IssueProvisioner<H> {
        &self.provisioner
    }

    pub(crate) fn host(&self) -> &H {
        self.host.as_ref()
    }

    /// Resolve the index issue and parse its payload, leaving the
    /// missing/malformed decision to the caller.
    pub(crate) async fn read_payload<T: DeserializeOwned>(
        &self,
        kind: IssueKind,
    ) -> Result<(Issue, ExtractedPayload<T>), StoreError> {
        let issue = self.provisioner.get_or_create(kind).await?;
        let parsed = payload::extract(issue.body.as_deref().unwrap_or(""));
        Ok((issue, parsed))
    }

    /// Fail-open read: a missing or unreadable payload becomes the default
    /// record. First use and hand-mangled bodies both land here.
    pub(crate) async fn read_record<T: DeserializeOwned + Default>(
        &self,
        kind: IssueKind,
    ) -> Result<(Issue, T), StoreError> {
        let (issue, parsed) = self.read_payload(kind).await?;
        let record = match parsed {
            ExtractedPayload::Ok(record) => record,
            ExtractedPayload::Missing => T::default(),
            ExtractedPayload::Malformed(e) => {
                warn!(
                    "Malformed payload in issue #{}: {}; treating as empty",
                    issue.number, e
                );
                T::default()
            }
        };
        Ok((issue, record))
    }

    pub(crate) async fn write_record<T: Serialize>(
        &self,
        kind: IssueKind,
        issue_number: u64,
        record: &T,
    ) -> Result<(), StoreError> {
        let body = payload::embed(kind.heading(), record)?;
        let updated = self.host.update_issue_body(issue_number, &body).await?;
        self.provisioner.refresh(kind, updated).await;
        Ok(())
    }
}
